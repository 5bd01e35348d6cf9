//! Session state machine
//!
//! Holds the current token pair behind a watch channel so views can gate on
//! "logged in" without touching the token store's persistence.

use std::sync::Arc;

use autot_model::TokenPair;
use tokio::sync::watch;

/// Authentication state machine
///
/// `LoggedOut -> LoggedIn` on login, `LoggedIn -> LoggedIn` when the access
/// token is refreshed, `LoggedIn -> LoggedOut` on logout or refresh failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No token pair; the UI must show the login view
    #[default]
    LoggedOut,

    /// A complete token pair is present
    LoggedIn(TokenPair),
}

impl SessionState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, SessionState::LoggedIn(_))
    }

    pub fn tokens(&self) -> Option<&TokenPair> {
        match self {
            SessionState::LoggedIn(pair) => Some(pair),
            SessionState::LoggedOut => None,
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.tokens().map(TokenPair::access)
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens().map(TokenPair::refresh)
    }
}

/// Session state store using a watch channel
/// This provides efficient read access without locks
#[derive(Clone, Debug)]
pub struct SessionStateStore {
    sender: Arc<watch::Sender<SessionState>>,
}

impl SessionStateStore {
    pub fn new(initial: SessionState) -> Self {
        let (sender, _receiver) = watch::channel(initial);
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Get the current session state
    pub fn current(&self) -> SessionState {
        self.sender.borrow().clone()
    }

    /// Check if logged in without cloning
    pub fn is_logged_in(&self) -> bool {
        self.sender.borrow().is_logged_in()
    }

    /// Access state without cloning
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SessionState) -> R,
    {
        f(&self.sender.borrow())
    }

    /// Subscribe to session changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.sender.subscribe()
    }

    /// Transition to logged in with a fresh pair
    pub fn log_in(&self, pair: TokenPair) {
        self.sender.send_replace(SessionState::LoggedIn(pair));
    }

    /// Mutate the pair in place if logged in; notifies only when `f`
    /// reports a change.
    pub fn update_tokens<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut TokenPair) -> bool,
    {
        self.sender.send_if_modified(|state| match state {
            SessionState::LoggedIn(pair) => f(pair),
            SessionState::LoggedOut => false,
        })
    }

    /// Transition to logged out. Returns false when already logged out.
    pub fn log_out(&self) -> bool {
        self.sender.send_if_modified(|state| {
            if state.is_logged_in() {
                *state = SessionState::LoggedOut;
                true
            } else {
                false
            }
        })
    }
}

impl Default for SessionStateStore {
    fn default() -> Self {
        Self::new(SessionState::LoggedOut)
    }
}
