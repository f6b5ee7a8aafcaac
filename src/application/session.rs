//! Process-wide authentication state.
//!
//! The store starts unhydrated and becomes hydrated on the first auth event,
//! whether or not that event carries a session. It never returns to the
//! unhydrated state. Readers observe it through a `tokio::sync::watch` channel.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::application::error::{LoginError, SessionError};
use crate::application::gateway::{
    AuthEvent, AuthSubscription, Gateway, GatewayError, Identity, Session,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub user: Option<Identity>,
    pub is_authenticated: bool,
    pub is_hydrated: bool,
}

/// Route guard outcome for admin views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    /// Auth state is not known yet; render nothing.
    Pending,
    Granted,
    RedirectToLogin,
}

pub struct SessionStore {
    state: watch::Sender<SessionState>,
    listening: AtomicBool,
}

impl SessionStore {
    pub fn new() -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::default());
        Arc::new(Self {
            state,
            listening: AtomicBool::new(false),
        })
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn access(&self) -> AccessDecision {
        let state = self.state.borrow();
        if !state.is_hydrated {
            AccessDecision::Pending
        } else if state.is_authenticated {
            AccessDecision::Granted
        } else {
            AccessDecision::RedirectToLogin
        }
    }

    /// Record an explicit sign-in.
    pub fn login(&self, user: Identity) {
        info!(user_id = %user.id, "Session authenticated");
        self.state.send_replace(SessionState {
            user: Some(user),
            is_authenticated: true,
            is_hydrated: true,
        });
    }

    /// Clear the session. A no-op when nobody is signed in.
    pub fn logout(&self) {
        self.state.send_if_modified(|state| {
            if !state.is_authenticated && state.user.is_none() {
                return false;
            }
            state.user = None;
            state.is_authenticated = false;
            state.is_hydrated = true;
            true
        });
    }

    /// Fold one auth event into the state. Authentication follows the presence of a session.
    pub fn apply_auth_event(&self, event: AuthEvent, session: Option<&Session>) {
        let next = SessionState {
            user: session.map(|session| session.user.clone()),
            is_authenticated: session.is_some(),
            is_hydrated: true,
        };
        let changed = self.state.send_if_modified(|state| {
            if *state == next {
                return false;
            }
            *state = next;
            true
        });
        debug!(event = ?event, changed, "Auth event applied");
    }

    /// Subscribe to the gateway's auth events for as long as the returned guard lives.
    ///
    /// Only one listener may be active per store.
    pub fn listen(self: &Arc<Self>, gateway: &dyn Gateway) -> Result<AuthListener, SessionError> {
        if self.listening.swap(true, Ordering::SeqCst) {
            warn!("Rejected duplicate auth event listener");
            return Err(SessionError::AlreadyListening);
        }

        let store = Arc::downgrade(self);
        let subscription = gateway.subscribe_auth_events(Arc::new(
            move |event: AuthEvent, session: Option<&Session>| {
                if let Some(store) = store.upgrade() {
                    store.apply_auth_event(event, session);
                }
            },
        ));
        debug!("Auth event listener registered");

        Ok(AuthListener {
            store: self.clone(),
            subscription: Some(subscription),
        })
    }

    /// Sign in through the gateway and record the session.
    pub async fn sign_in(
        &self,
        gateway: &dyn Gateway,
        email: &str,
        password: &str,
    ) -> Result<Identity, LoginError> {
        match gateway.sign_in_with_password(email, password).await {
            Ok(session) => {
                self.login(session.user.clone());
                Ok(session.user)
            }
            Err(GatewayError::Unauthorized)
            | Err(GatewayError::Rejected {
                status: 400 | 401, ..
            }) => {
                warn!("Sign-in rejected: invalid credentials");
                Err(LoginError::InvalidCredentials)
            }
            Err(err) => Err(LoginError::Gateway(err)),
        }
    }

    /// Sign out through the gateway. Local state is cleared even if the backend call fails.
    pub async fn sign_out(&self, gateway: &dyn Gateway) -> Result<(), GatewayError> {
        let result = gateway.sign_out().await;
        if let Err(err) = &result {
            warn!(error = %err, "Backend sign-out failed; clearing local session anyway");
        }
        self.logout();
        result
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("state", &*self.state.borrow())
            .field("listening", &self.listening.load(Ordering::SeqCst))
            .finish()
    }
}

/// Active auth-event subscription. Dropping it releases the gateway listener.
pub struct AuthListener {
    store: Arc<SessionStore>,
    subscription: Option<AuthSubscription>,
}

impl AuthListener {
    pub fn release(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.unsubscribe();
            self.store.listening.store(false, Ordering::SeqCst);
            debug!("Auth event listener released");
        }
    }
}

impl Drop for AuthListener {
    fn drop(&mut self) {
        self.close();
    }
}

impl fmt::Debug for AuthListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthListener")
            .field("active", &self.subscription.is_some())
            .finish()
    }
}
