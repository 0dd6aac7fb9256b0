//! Login state of a source client session

use std::fmt;

/// Where a session stands in the login sequence
///
/// `NeedToken -> HaveToken -> Authenticated`; a logout observed on any page
/// drops the session back to `NeedToken`. `Failed` is terminal for the
/// current logical request only: the next request starts over.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    NeedToken,
    HaveToken(String),
    Authenticated,
    Failed,
}

impl SessionState {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the token itself
        match self {
            Self::NeedToken => write!(f, "need-token"),
            Self::HaveToken(_) => write!(f, "have-token"),
            Self::Authenticated => write!(f, "authenticated"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
