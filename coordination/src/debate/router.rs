//! Conditional edge out of the moderator.

use super::state::{DebateState, DebateStatus};

/// Where the workflow goes after a moderator pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Another proposer → critic → moderator round.
    Continue,
    End,
}

/// Decide the next step from the current status.
///
/// The context gatherer is never re-entered from here.
pub fn route(state: &DebateState) -> Route {
    match state.status {
        DebateStatus::Approved | DebateStatus::MaxRoundsReached => Route::End,
        _ => Route::Continue,
    }
}
