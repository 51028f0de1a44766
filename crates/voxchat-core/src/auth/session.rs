use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::credentials::{CredentialRecord, CredentialStore};

/// Buffer time before expiry to report that a refresh is due (5 minutes)
const TOKEN_REFRESH_BUFFER_MINUTES: i64 = 5;

/// Snapshot of the current session.
///
/// `access_token` is present only while logged in, and never without a
/// `refresh_token`. Only `SessionState` constructs non-empty sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub account_id: Option<String>,
    /// When the access token expires, if the backend said so
    pub expires_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Check if the access token will expire soon and should be refreshed.
    /// Sessions without a known expiry never report this.
    pub fn needs_refresh(&self) -> bool {
        match self.expires_at {
            Some(expires_at) => {
                Utc::now() > expires_at - Duration::minutes(TOKEN_REFRESH_BUFFER_MINUTES)
            }
            None => false,
        }
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> Option<i64> {
        self.expires_at
            .map(|expires_at| (expires_at - Utc::now()).num_minutes().max(0))
    }

    fn to_record(&self) -> CredentialRecord {
        CredentialRecord {
            access_token: self.access_token.clone(),
            refresh_token: self.refresh_token.clone(),
            account_id: self.account_id.clone(),
        }
    }

    fn from_record(record: CredentialRecord) -> Option<Self> {
        if record.access_token.is_some() && record.refresh_token.is_none() {
            return None;
        }
        Some(Self {
            access_token: record.access_token,
            refresh_token: record.refresh_token,
            account_id: record.account_id,
            expires_at: None,
        })
    }
}

/// Shared handle to the session.
///
/// Created once at startup and passed to every consumer. Clones share
/// the same state. Reads never block on a writer; writes are serialized
/// and mirrored to the credential store in the order they are published.
#[derive(Clone)]
pub struct SessionState {
    inner: Arc<Inner>,
}

struct Inner {
    current: watch::Sender<Session>,
    store: Arc<dyn CredentialStore>,
    // Doubles as the writer lock so subscribers see updates in publish order
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Session>>>,
}

impl SessionState {
    /// Load the persisted session from `store`, if any.
    pub fn load(store: Arc<dyn CredentialStore>) -> Self {
        let session = match store.load() {
            Ok(Some(record)) => match Session::from_record(record) {
                Some(session) => session,
                None => {
                    warn!("Stored access token has no refresh token, discarding session");
                    if let Err(e) = store.clear() {
                        warn!(error = %e, "Failed to clear inconsistent credentials");
                    }
                    Session::default()
                }
            },
            Ok(None) => Session::default(),
            Err(e) => {
                warn!(error = %e, "Failed to load credentials, starting logged out");
                Session::default()
            }
        };
        info!(
            authenticated = session.is_authenticated(),
            account = session.account_id.as_deref().unwrap_or("none"),
            "Session loaded"
        );

        let (current, _) = watch::channel(session);
        Self {
            inner: Arc::new(Inner {
                current,
                store,
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Latest session snapshot.
    pub fn current(&self) -> Session {
        self.inner.current.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.current.borrow().access_token.is_some()
    }

    pub fn access_token(&self) -> Option<String> {
        self.inner.current.borrow().access_token.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.current.borrow().refresh_token.clone()
    }

    /// Receiver of the latest value, for consumers that only render the present.
    pub fn watch(&self) -> watch::Receiver<Session> {
        self.inner.current.subscribe()
    }

    /// Ordered stream of every update published after this call.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Session> {
        let (tx, rx) = mpsc::unbounded_channel();
        match self.inner.subscribers.lock() {
            Ok(mut subscribers) => subscribers.push(tx),
            Err(poisoned) => poisoned.into_inner().push(tx),
        }
        rx
    }

    /// Seed the session from a successful login.
    pub fn login(&self, access_token: String, refresh_token: String, account_id: String) {
        let session = Session {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            account_id: Some(account_id),
            expires_at: None,
        };
        info!(account = session.account_id.as_deref().unwrap_or(""), "User logged in");
        self.publish(session);
    }

    /// Replace the token pair after a refresh, keeping the account.
    pub fn apply_refresh(
        &self,
        access_token: String,
        refresh_token: String,
        expires_in: Option<i64>,
    ) {
        let account_id = self.inner.current.borrow().account_id.clone();
        let session = Session {
            access_token: Some(access_token),
            refresh_token: Some(refresh_token),
            account_id,
            expires_at: expires_in.map(|secs| Utc::now() + Duration::seconds(secs)),
        };
        debug!(expires_in = ?expires_in, "Tokens refreshed");
        self.publish(session);
    }

    /// Drop all credentials, in memory and in the store.
    pub fn logout(&self) {
        let account = self.inner.current.borrow().account_id.clone();
        info!(account = account.as_deref().unwrap_or("unknown"), "Session cleared");
        self.publish(Session::default());
    }

    /// Store I/O runs under the writer lock so the persisted record always
    /// matches the last published session. Stores must return promptly: a
    /// refresh publishes from a runtime worker.
    fn publish(&self, session: Session) {
        let mut subscribers = match self.inner.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let persisted = if session.is_authenticated() || session.account_id.is_some() {
            self.inner.store.save(&session.to_record())
        } else {
            self.inner.store.clear()
        };
        if let Err(e) = persisted {
            warn!(error = %e, "Credential store unavailable, session kept in memory only");
        }

        self.inner.current.send_replace(session.clone());
        subscribers.retain(|tx| tx.send(session.clone()).is_ok());
    }
}
