use std::sync::RwLock;

/// Source of the signed-in user's bearer token.
pub trait SessionProvider: Send + Sync {
    fn access_token(&self) -> Option<String>;
}

/// In-memory session, updated by the host on sign in / sign out.
#[derive(Debug, Default)]
pub struct StaticSession {
    token: RwLock<Option<String>>,
}

impl StaticSession {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: RwLock::new(token),
        }
    }

    pub fn sign_in(&self, token: impl Into<String>) {
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token.into());
        }
    }

    pub fn sign_out(&self) {
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
    }
}

impl SessionProvider for StaticSession {
    fn access_token(&self) -> Option<String> {
        let guard = self.token.read().ok()?;
        let token = guard
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string);
        token
    }
}
