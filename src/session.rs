//! Session context: the signed-in account identity and bearer credential.
//!
//! This is the explicitly injected replacement for ambient auth state: one
//! provider mutates it (`sign_in` / `sign_out` / `set_token`), every
//! component reads it through a shared `Arc<Session>`.  No component reaches
//! into process-global state.

use std::sync::RwLock;

use crate::types::EntityType;

#[derive(Debug, Clone, Default)]
struct SessionState {
    account_id: Option<String>,
    entity_type: EntityType,
    token: Option<String>,
}

/// Shared, read-mostly session context.
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<SessionState>,
}

impl Session {
    /// A session with no signed-in account.  Every operation that requires
    /// an identity or credential short-circuits against it.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(
        account_id: impl Into<String>,
        entity_type: EntityType,
        token: impl Into<String>,
    ) -> Self {
        let session = Self::default();
        session.sign_in(account_id, entity_type, token);
        session
    }

    pub fn sign_in(
        &self,
        account_id: impl Into<String>,
        entity_type: EntityType,
        token: impl Into<String>,
    ) {
        let mut state = self.state.write().unwrap();
        state.account_id = Some(account_id.into());
        state.entity_type = entity_type;
        state.token = Some(token.into());
    }

    pub fn sign_out(&self) {
        *self.state.write().unwrap() = SessionState::default();
    }

    /// Replace the bearer credential (e.g. after a token refresh) without
    /// touching the identity.
    pub fn set_token(&self, token: Option<String>) {
        self.state.write().unwrap().token = token;
    }

    pub fn account_id(&self) -> Option<String> {
        self.state.read().unwrap().account_id.clone()
    }

    pub fn entity_type(&self) -> EntityType {
        self.state.read().unwrap().entity_type.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.state.read().unwrap().token.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn anonymous_session_has_no_identity() {
        let session = Session::anonymous();
        assert!(session.account_id().is_none());
        assert!(session.token().is_none());
    }

    #[test]
    fn sign_out_clears_everything() {
        let session = Session::signed_in("acct_1", EntityType::Bar, "tok");
        assert_eq!(session.account_id().as_deref(), Some("acct_1"));
        assert_eq!(session.entity_type(), EntityType::Bar);

        session.sign_out();
        assert!(session.account_id().is_none());
        assert!(session.token().is_none());
        assert_eq!(session.entity_type(), EntityType::User);
    }

    #[test]
    fn token_refresh_keeps_identity() {
        let session = Session::signed_in("acct_1", EntityType::User, "old");
        session.set_token(Some("new".to_string()));
        assert_eq!(session.account_id().as_deref(), Some("acct_1"));
        assert_eq!(session.token().as_deref(), Some("new"));
    }
}
