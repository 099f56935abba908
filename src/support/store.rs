use anyhow::Result;

use super::models::{CaseMessage, CaseStatus, SupportCase};

pub trait SupportStore: Send + Sync {
    /// Creates a case together with its first message in one transaction;
    /// either both rows exist afterwards or neither does.
    fn create_case_with_message(
        &self,
        user_id: usize,
        subject: &str,
        message: &str,
    ) -> Result<SupportCase>;

    /// Returns `Ok(None)` if the case does not exist.
    fn get_case(&self, case_id: usize) -> Result<Option<SupportCase>>;

    /// Cases owned by the user, most recently updated first.
    fn get_user_cases(&self, user_id: usize) -> Result<Vec<SupportCase>>;

    /// Every case in the store, most recently updated first.
    fn get_all_cases(&self) -> Result<Vec<SupportCase>>;

    /// Appends a message and bumps the case's `updated_at` in the same
    /// transaction. Fails if the case does not exist.
    fn add_message(&self, case_id: usize, user_id: usize, message: &str) -> Result<CaseMessage>;

    /// Messages of a case in the order they were written.
    fn get_case_messages(&self, case_id: usize) -> Result<Vec<CaseMessage>>;

    /// Returns `Ok(false)` if the case does not exist.
    fn set_case_status(&self, case_id: usize, status: CaseStatus) -> Result<bool>;
}
