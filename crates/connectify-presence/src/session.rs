//! Authentication state supplied by the session collaborator.

/// What the presence tracker needs to know about the signed-in session.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub is_authenticated: bool,
    /// Bearer token presented when joining the presence channel.
    pub token: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("is_authenticated", &self.is_authenticated)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl Session {
    pub fn authenticated(token: impl Into<String>) -> Self {
        Self {
            is_authenticated: true,
            token: Some(token.into()),
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    /// The token, if the session is authenticated and actually has one.
    pub fn usable_token(&self) -> Option<&str> {
        if !self.is_authenticated {
            return None;
        }
        self.token.as_deref().filter(|t| !t.is_empty())
    }
}
