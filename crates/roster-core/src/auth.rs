//! Phone-code sign-in flow:
//! `Unauthenticated -> CodeSent -> [TwoFactorRequired ->] Authenticated`.
//!
//! A failed verification leaves the session where it was, so the caller can retry.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::{
    domain::Phone,
    errors::{AuthError, Error, PlatformError},
    registry::{AuthState, SessionRegistry},
    Result,
};

/// Outcome of a successful `verify_code` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VerifyOutcome {
    Authenticated,
    NeedTwoFactor,
}

pub struct AuthStateMachine {
    registry: Arc<SessionRegistry>,
}

impl AuthStateMachine {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// Create (or reuse) the session for `phone` and ask the platform for a code.
    ///
    /// Fails with `AlreadyAuthenticated` once sign-in has completed.
    pub async fn request_code(&self, phone: &Phone) -> Result<()> {
        let session = self.registry.get_or_create(phone).await?;
        let mut st = session.lock_state().await;
        if st.auth == AuthState::Authenticated {
            return Err(AuthError::AlreadyAuthenticated.into());
        }

        let req = session.client().send_code(phone).await?;
        st.pending_code_hash = Some(req.phone_code_hash);
        st.auth = AuthState::CodeSent;
        info!(phone = %phone.tag(), "code sent");
        Ok(())
    }

    pub async fn verify_code(&self, phone: &Phone, code: &str) -> Result<VerifyOutcome> {
        let code = code.trim();
        if code.is_empty() {
            return Err(Error::Validation("code must not be empty".to_string()));
        }

        let session = self
            .registry
            .get(phone)
            .await
            .ok_or(AuthError::SessionMissing)?;
        let mut st = session.lock_state().await;
        match st.auth {
            AuthState::CodeSent => {}
            AuthState::Authenticated => return Err(AuthError::AlreadyAuthenticated.into()),
            AuthState::TwoFactorRequired => return Err(AuthError::TwoFactorRequired.into()),
            other => return Err(AuthError::WrongState(other).into()),
        }
        let hash = st
            .pending_code_hash
            .clone()
            .ok_or(AuthError::WrongState(st.auth))?;

        match session.client().sign_in(phone, code, &hash).await {
            Ok(()) => {
                st.auth = AuthState::Authenticated;
                st.pending_code_hash = None;
                info!(phone = %phone.tag(), "signed in");
                Ok(VerifyOutcome::Authenticated)
            }
            Err(PlatformError::PasswordRequired) => {
                st.auth = AuthState::TwoFactorRequired;
                info!(phone = %phone.tag(), "second factor required");
                Ok(VerifyOutcome::NeedTwoFactor)
            }
            Err(e) => {
                warn!(phone = %phone.tag(), error = %e, "code verification failed");
                Err(e.into())
            }
        }
    }

    pub async fn verify_two_factor(&self, phone: &Phone, password: &str) -> Result<()> {
        if password.is_empty() {
            return Err(Error::Validation("password must not be empty".to_string()));
        }

        let session = self
            .registry
            .get(phone)
            .await
            .ok_or(AuthError::SessionMissing)?;
        let mut st = session.lock_state().await;
        match st.auth {
            AuthState::TwoFactorRequired => {}
            AuthState::Authenticated => return Err(AuthError::AlreadyAuthenticated.into()),
            other => return Err(AuthError::WrongState(other).into()),
        }

        match session.client().check_password(password).await {
            Ok(()) => {
                st.auth = AuthState::Authenticated;
                st.pending_code_hash = None;
                info!(phone = %phone.tag(), "signed in with second factor");
                Ok(())
            }
            Err(e) => {
                warn!(phone = %phone.tag(), error = %e, "password verification failed");
                Err(e.into())
            }
        }
    }

    /// Tear down the session regardless of state. Always succeeds.
    pub async fn logout(&self, phone: &Phone) {
        if !self.registry.destroy(phone).await {
            info!(phone = %phone.tag(), "logout without session");
        }
    }
}
