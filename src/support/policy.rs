//! Case access rules, shared by the session and API key surfaces.
//!
//! The rules are pure functions over an [`Actor`] snapshot so both HTTP
//! extractors and tests exercise exactly the same decisions.

use super::models::{CaseStatus, SupportCase};

/// The principal a decision is made for: who they are and whether they
/// hold the admin role right now.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: usize,
    pub is_admin: bool,
}

/// A case is visible to its owner and to admins, nobody else.
pub fn can_view_case(actor: &Actor, case: &SupportCase) -> bool {
    actor.is_admin || case.user_id == actor.user_id
}

/// Posting requires visibility, and a resolved case only accepts replies
/// from admins.
pub fn can_post_message(actor: &Actor, case: &SupportCase) -> bool {
    if !can_view_case(actor, case) {
        return false;
    }
    case.status != CaseStatus::Resolved || actor.is_admin
}
