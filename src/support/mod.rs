mod models;
pub mod policy;
mod sqlite_support_store;
mod store;

pub use models::{CaseMessage, CaseMessageView, CaseStatus, SupportCase};
pub use policy::Actor;
pub use sqlite_support_store::SqliteSupportStore;
pub use store::SupportStore;
