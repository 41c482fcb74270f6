use crate::domain::models::{AuthState, Credentials};
use crate::infrastructure::booking_client::BookingServiceClient;
use crate::infrastructure::credential_store::TokenStore;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::payloads::LoginReply;
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated,
    TwoFactorRequired,
}

/// Read that was interrupted by a rescue challenge and must be replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockedRead {
    VenueWindow,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub token: String,
    pub username: Option<String>,
    pub notify_email: Option<String>,
    pub epoch: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub auth_state: AuthState,
    pub username: Option<String>,
    pub has_token: bool,
    pub last_error: Option<String>,
    pub rescue_username: Option<String>,
    pub epoch: u64,
}

#[derive(Debug, Clone)]
struct RescueChallenge {
    username: String,
    blocked: BlockedRead,
}

#[derive(Debug, Default)]
struct SessionState {
    token: Option<String>,
    auth_state: AuthState,
    username: Option<String>,
    credentials_echo: Option<Credentials>,
    pending_two_factor: Option<String>,
    rescue: Option<RescueChallenge>,
    last_error: Option<String>,
    epoch: u64,
}

impl SessionState {
    fn activate(&mut self, token: String) {
        self.token = Some(token);
        self.auth_state = AuthState::Active;
        self.pending_two_factor = None;
        self.rescue = None;
        self.last_error = None;
    }

    fn reset(&mut self, last_error: Option<String>) {
        self.token = None;
        self.auth_state = AuthState::Idle;
        self.username = None;
        self.credentials_echo = None;
        self.pending_two_factor = None;
        self.rescue = None;
        self.last_error = last_error;
        self.epoch += 1;
    }
}

/// Owns the session token. Every other component reads it through here.
pub struct SessionManager {
    client: Arc<dyn BookingServiceClient>,
    token_store: Arc<dyn TokenStore>,
    state: Mutex<SessionState>,
    reconnect_gate: AsyncMutex<()>,
}

impl SessionManager {
    pub fn new(client: Arc<dyn BookingServiceClient>, token_store: Arc<dyn TokenStore>) -> Self {
        Self {
            client,
            token_store,
            state: Mutex::new(SessionState::default()),
            reconnect_gate: AsyncMutex::new(()),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SessionState>, InfraError> {
        self.state
            .lock()
            .map_err(|error| InfraError::InvalidConfig(format!("session lock poisoned: {error}")))
    }

    /// Loads a persisted token. Returns whether the session came back active.
    pub fn restore(&self) -> Result<bool, InfraError> {
        let Some(token) = self.token_store.load_token()? else {
            return Ok(false);
        };
        let mut state = self.lock_state()?;
        state.epoch += 1;
        state.activate(token);
        info!("restored persisted session token");
        Ok(true)
    }

    /// Sets the username for a restored session; the token alone does not carry it.
    pub fn set_username(&self, username: &str) -> Result<(), InfraError> {
        let username = username.trim();
        if username.is_empty() {
            return Ok(());
        }
        self.lock_state()?.username = Some(username.to_string());
        Ok(())
    }

    pub fn snapshot(&self) -> Result<SessionSnapshot, InfraError> {
        let state = self.lock_state()?;
        Ok(SessionSnapshot {
            auth_state: state.auth_state,
            username: state.username.clone(),
            has_token: state.token.is_some(),
            last_error: state.last_error.clone(),
            rescue_username: state.rescue.as_ref().map(|rescue| rescue.username.clone()),
            epoch: state.epoch,
        })
    }

    pub fn auth_state(&self) -> Result<AuthState, InfraError> {
        Ok(self.lock_state()?.auth_state)
    }

    pub fn token(&self) -> Result<Option<String>, InfraError> {
        Ok(self.lock_state()?.token.clone())
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.lock_state()
            .map(|state| state.epoch == epoch)
            .unwrap_or(false)
    }

    pub fn is_authenticated(&self) -> bool {
        self.lock_state()
            .map(|state| state.token.is_some() && state.auth_state.is_authenticated())
            .unwrap_or(false)
    }

    pub fn request_context(&self) -> Result<RequestContext, InfraError> {
        let state = self.lock_state()?;
        match state.token.as_ref() {
            Some(token) if state.auth_state.is_authenticated() => Ok(RequestContext {
                token: token.clone(),
                username: state.username.clone(),
                notify_email: state
                    .credentials_echo
                    .as_ref()
                    .and_then(|credentials| credentials.notify_email.clone()),
                epoch: state.epoch,
            }),
            _ if state.auth_state == AuthState::TwoFactorNeeded => {
                Err(InfraError::TwoFactorRequired)
            }
            _ => Err(InfraError::NotAuthenticated),
        }
    }

    pub async fn login(&self, credentials: Credentials) -> Result<LoginOutcome, InfraError> {
        credentials.validate().map_err(InfraError::InvalidInput)?;
        let epoch = {
            let mut state = self.lock_state()?;
            state.reset(None);
            state.auth_state = AuthState::Checking;
            state.epoch
        };

        let reply = self.client.login(&credentials).await;

        let mut state = self.lock_state()?;
        if state.epoch != epoch {
            return Err(InfraError::StaleResponse);
        }
        match reply {
            Ok(LoginReply::Authenticated { token }) => {
                state.username = Some(credentials.username.clone());
                state.credentials_echo = Some(credentials);
                state.activate(token.clone());
                drop(state);
                self.persist_token(&token);
                info!("login succeeded");
                Ok(LoginOutcome::Authenticated)
            }
            Ok(LoginReply::TwoFactorRequired) => {
                state.auth_state = AuthState::TwoFactorNeeded;
                state.pending_two_factor = Some(credentials.username.clone());
                state.username = Some(credentials.username.clone());
                state.credentials_echo = Some(credentials);
                info!("login requires a two-factor code");
                Ok(LoginOutcome::TwoFactorRequired)
            }
            Ok(LoginReply::Forbidden(message)) => {
                state.auth_state = AuthState::Idle;
                state.last_error = Some(message.clone());
                warn!("login forbidden for this account");
                Err(InfraError::AccessForbidden(message))
            }
            Ok(LoginReply::Rejected(message)) => {
                state.auth_state = AuthState::Error;
                state.last_error = Some(message.clone());
                Err(InfraError::CredentialsRejected(message))
            }
            Err(error) => {
                state.auth_state = AuthState::Error;
                state.last_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    pub async fn submit_two_factor(&self, code: &str) -> Result<(), InfraError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(InfraError::InvalidInput("two-factor code must not be empty".to_string()));
        }
        let (username, epoch) = {
            let state = self.lock_state()?;
            match (state.auth_state, state.pending_two_factor.clone()) {
                (AuthState::TwoFactorNeeded, Some(username)) => (username, state.epoch),
                _ => {
                    return Err(InfraError::InvalidInput(
                        "no login is waiting for a two-factor code".to_string(),
                    ));
                }
            }
        };

        let reply = self.client.submit_two_factor(&username, code).await;

        let mut state = self.lock_state()?;
        if state.epoch != epoch {
            return Err(InfraError::StaleResponse);
        }
        match reply {
            Ok(LoginReply::Authenticated { token }) => {
                state.activate(token.clone());
                drop(state);
                self.persist_token(&token);
                info!("two-factor login completed");
                Ok(())
            }
            Ok(LoginReply::Forbidden(message)) => {
                state.reset(Some(message.clone()));
                Err(InfraError::AccessForbidden(message))
            }
            Ok(LoginReply::TwoFactorRequired) => {
                let message = "service asked for another two-factor code".to_string();
                state.last_error = Some(message.clone());
                Err(InfraError::TwoFactorRejected(message))
            }
            Ok(LoginReply::Rejected(message)) => {
                state.last_error = Some(message.clone());
                Err(InfraError::TwoFactorRejected(message))
            }
            Err(error) => {
                state.last_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    /// Re-issues login with the cached credentials after `failed_token` was
    /// rejected. Callers arriving while a reconnect is running wait for it and
    /// reuse its token.
    pub async fn silent_reconnect(&self, failed_token: &str) -> Result<String, InfraError> {
        let _gate = self.reconnect_gate.lock().await;

        let (credentials, epoch) = {
            let mut state = self.lock_state()?;
            if !state.auth_state.is_authenticated() {
                return Err(InfraError::NotAuthenticated);
            }
            if let Some(current) = state.token.as_ref() {
                if current != failed_token && state.auth_state == AuthState::Active {
                    return Ok(current.clone());
                }
            }
            let Some(credentials) = state.credentials_echo.clone() else {
                let message = "session expired and no credentials are cached; sign in again";
                state.reset(Some(message.to_string()));
                drop(state);
                self.forget_persisted_token();
                warn!("silent reconnect impossible without cached credentials");
                return Err(InfraError::ReconnectFailed(message.to_string()));
            };
            state.auth_state = AuthState::Reconnecting;
            (credentials, state.epoch)
        };

        info!("session token rejected; re-issuing login");
        let reply = self.client.login(&credentials).await;

        let mut state = self.lock_state()?;
        if state.epoch != epoch {
            return Err(InfraError::StaleResponse);
        }
        let failure = match reply {
            Ok(LoginReply::Authenticated { token }) => {
                state.activate(token.clone());
                drop(state);
                self.persist_token(&token);
                info!("silent reconnect succeeded");
                return Ok(token);
            }
            Ok(LoginReply::TwoFactorRequired) => {
                "re-login needs a two-factor code; sign in again".to_string()
            }
            Ok(LoginReply::Forbidden(message)) | Ok(LoginReply::Rejected(message)) => message,
            Err(error) => error.to_string(),
        };
        state.reset(Some(failure.clone()));
        drop(state);
        self.forget_persisted_token();
        warn!(reason = %failure, "silent reconnect failed; session reset");
        Err(InfraError::ReconnectFailed(failure))
    }

    /// Records a backend-raised two-factor challenge without leaving the session.
    /// Returns the account the challenge is for.
    pub fn enter_rescue(&self, username: &str, blocked: BlockedRead) -> Result<String, InfraError> {
        let mut state = self.lock_state()?;
        let username = Some(username.trim())
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .or_else(|| state.username.clone())
            .unwrap_or_default();
        state.auth_state = AuthState::RescueTwoFactorNeeded;
        state.rescue = Some(RescueChallenge {
            username: username.clone(),
            blocked,
        });
        info!("booking service raised a rescue two-factor challenge");
        Ok(username)
    }

    /// Answers a rescue challenge. On success returns the read to replay.
    pub async fn rescue_two_factor(&self, code: &str) -> Result<BlockedRead, InfraError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(InfraError::InvalidInput("two-factor code must not be empty".to_string()));
        }
        let (challenge, epoch) = {
            let state = self.lock_state()?;
            match (state.auth_state, state.rescue.clone()) {
                (AuthState::RescueTwoFactorNeeded, Some(challenge)) => (challenge, state.epoch),
                _ => {
                    return Err(InfraError::InvalidInput(
                        "no rescue two-factor challenge is pending".to_string(),
                    ));
                }
            }
        };

        let reply = self.client.submit_two_factor(&challenge.username, code).await;

        let mut state = self.lock_state()?;
        if state.epoch != epoch {
            return Err(InfraError::StaleResponse);
        }
        match reply {
            Ok(LoginReply::Authenticated { token }) => {
                state.activate(token.clone());
                drop(state);
                self.persist_token(&token);
                info!("rescue two-factor accepted");
                Ok(challenge.blocked)
            }
            Ok(LoginReply::Forbidden(message)) => {
                state.reset(Some(message.clone()));
                drop(state);
                self.forget_persisted_token();
                Err(InfraError::AccessForbidden(message))
            }
            Ok(LoginReply::TwoFactorRequired) => {
                let message = "service asked for another two-factor code".to_string();
                state.last_error = Some(message.clone());
                Err(InfraError::TwoFactorRejected(message))
            }
            Ok(LoginReply::Rejected(message)) => {
                state.last_error = Some(message.clone());
                Err(InfraError::TwoFactorRejected(message))
            }
            Err(error) => {
                state.last_error = Some(error.to_string());
                Err(error)
            }
        }
    }

    pub fn logout(&self) -> Result<(), InfraError> {
        self.lock_state()?.reset(None);
        self.token_store.delete_token()?;
        info!("logged out");
        Ok(())
    }

    fn persist_token(&self, token: &str) {
        if let Err(error) = self.token_store.save_token(token) {
            warn!(%error, "failed to persist session token");
        }
    }

    fn forget_persisted_token(&self) {
        if let Err(error) = self.token_store.delete_token() {
            warn!(%error, "failed to delete persisted session token");
        }
    }
}
