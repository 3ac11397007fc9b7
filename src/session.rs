//! Signed-in user session

use crate::{source::UserContext, Error, Result};

/// Session of a signed-in user
///
/// Created at sign-in and handed to the listener. When the user changes,
/// stop the listener and start it again with a new session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user_id: String,
}

impl Session {
    /// Create a session for `user_id`
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }

    /// Resolve the signed-in user from a [`UserContext`]
    ///
    /// # Errors
    /// Returns `Error::Session` when nobody is signed in.
    pub fn from_context(context: &dyn UserContext) -> Result<Self> {
        match context.current_user_id() {
            Some(user_id) if !user_id.is_empty() => Ok(Self::new(user_id)),
            _ => Err(Error::Session("no user is signed in".to_string())),
        }
    }

    /// ID of the session's user
    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}
