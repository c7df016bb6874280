use std::fmt;

/// Where the current authenticated session stands.
///
/// `Unauthenticated -> Pulling -> Synced`, and back to `Unauthenticated` on
/// logout. `Synced` has no automatic transitions; pushes do not change it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Pulling,
    Synced,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Unauthenticated => write!(f, "unauthenticated"),
            SessionState::Pulling => write!(f, "pulling"),
            SessionState::Synced => write!(f, "synced"),
        }
    }
}

/// Session context shared by the coordinator and its observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<String>,
    pub state: SessionState,
}

impl Session {
    pub fn unauthenticated() -> Self {
        Self {
            user_id: None,
            state: SessionState::Unauthenticated,
        }
    }

    pub fn is_synced_as(&self, user_id: &str) -> bool {
        self.state == SessionState::Synced && self.user_id.as_deref() == Some(user_id)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::unauthenticated()
    }
}
