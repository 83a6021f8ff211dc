use std::{
    collections::HashMap,
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    domain::Phone,
    errors::Error,
    platform::port::{PlatformClient, PlatformConnector},
    Result,
};

/// Authentication progress of one session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthState {
    #[default]
    Unauthenticated,
    CodeSent,
    TwoFactorRequired,
    Authenticated,
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuthState::Unauthenticated => "unauthenticated",
            AuthState::CodeSent => "code_sent",
            AuthState::TwoFactorRequired => "two_factor_required",
            AuthState::Authenticated => "authenticated",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) auth: AuthState,
    pub(crate) pending_code_hash: Option<String>,
}

/// A live connection for one phone plus its authentication state.
pub struct Session {
    phone: Phone,
    client: Arc<dyn PlatformClient>,
    state: Mutex<SessionState>,
    running: AtomicBool,
    cancel: CancellationToken,
    created_at: DateTime<Utc>,
}

impl Session {
    fn new(phone: Phone, client: Arc<dyn PlatformClient>) -> Self {
        Self {
            phone,
            client,
            state: Mutex::new(SessionState::default()),
            running: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            created_at: Utc::now(),
        }
    }

    pub fn phone(&self) -> &Phone {
        &self.phone
    }

    pub fn client(&self) -> &dyn PlatformClient {
        self.client.as_ref()
    }

    pub async fn auth_state(&self) -> AuthState {
        self.state.lock().await.auth
    }

    pub async fn is_authenticated(&self) -> bool {
        self.auth_state().await == AuthState::Authenticated
    }

    /// Token cancelled when the session is torn down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Claim the single parse slot of this session.
    pub fn try_begin_run(self: &Arc<Self>) -> Result<RunGuard> {
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::Conflict(
                "a parse is already running for this phone".to_string(),
            ));
        }
        Ok(RunGuard {
            session: Arc::clone(self),
        })
    }

    pub(crate) async fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().await
    }

    async fn teardown(&self) {
        self.cancel.cancel();
        if let Err(e) = self.client.disconnect().await {
            warn!(phone = %self.phone.tag(), error = %e, "disconnect failed");
        }
        let age = Utc::now().signed_duration_since(self.created_at);
        info!(phone = %self.phone.tag(), age_secs = age.num_seconds(), "session closed");
    }
}

/// Releases the session's parse slot on drop.
pub struct RunGuard {
    session: Arc<Session>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.session.running.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Slot {
    session: Option<Arc<Session>>,
    retired: bool,
}

type SlotRef = Arc<Mutex<Slot>>;

/// Process-scoped table of live sessions, keyed by phone.
///
/// Each phone gets its own slot lock, held across connection establishment, so
/// two near-simultaneous `get_or_create` calls for the same phone open one
/// connection: the second caller waits on the slot and sees the first's session.
///
/// Slot locks are never awaited by whole-registry operations (`len`, `shutdown`),
/// so a slow connect for one phone only blocks callers for that same phone.
pub struct SessionRegistry {
    connector: Arc<dyn PlatformConnector>,
    slots: Mutex<HashMap<Phone, SlotRef>>,
    live: AtomicUsize,
    closing: AtomicBool,
}

impl SessionRegistry {
    pub fn new(connector: Arc<dyn PlatformConnector>) -> Self {
        Self {
            connector,
            slots: Mutex::new(HashMap::new()),
            live: AtomicUsize::new(0),
            closing: AtomicBool::new(false),
        }
    }

    /// Drop `slot` from the table unless it was already replaced.
    async fn forget_slot(&self, phone: &Phone, slot: &SlotRef) {
        let mut map = self.slots.lock().await;
        if map.get(phone).is_some_and(|s| Arc::ptr_eq(s, slot)) {
            map.remove(phone);
        }
    }

    async fn slot_for(&self, phone: &Phone) -> SlotRef {
        let mut map = self.slots.lock().await;
        map.entry(phone.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::default())))
            .clone()
    }

    /// Existing session for `phone`, if any. Never connects.
    pub async fn get(&self, phone: &Phone) -> Option<Arc<Session>> {
        let slot = {
            let map = self.slots.lock().await;
            map.get(phone)?.clone()
        };
        let guard = slot.lock().await;
        guard.session.clone()
    }

    /// Existing session for `phone`, or a freshly connected one.
    pub async fn get_or_create(&self, phone: &Phone) -> Result<Arc<Session>> {
        loop {
            let slot = self.slot_for(phone).await;
            let mut guard = slot.lock().await;
            if guard.retired {
                // Removed while we waited; pick up the replacement slot.
                continue;
            }
            if let Some(existing) = &guard.session {
                return Ok(existing.clone());
            }

            if self.closing.load(Ordering::SeqCst) {
                guard.retired = true;
                drop(guard);
                self.forget_slot(phone, &slot).await;
                return Err(Error::Cancelled);
            }

            debug!(phone = %phone.tag(), "connecting");
            let client = match self.connector.connect(phone).await {
                Ok(client) => client,
                Err(e) => {
                    guard.retired = true;
                    drop(guard);
                    self.forget_slot(phone, &slot).await;
                    return Err(e.into());
                }
            };

            // Shutdown skipped this slot while it was connecting.
            if self.closing.load(Ordering::SeqCst) {
                guard.retired = true;
                drop(guard);
                self.forget_slot(phone, &slot).await;
                if let Err(e) = client.disconnect().await {
                    warn!(phone = %phone.tag(), error = %e, "disconnect failed");
                }
                return Err(Error::Cancelled);
            }

            let session = Arc::new(Session::new(phone.clone(), client));
            guard.session = Some(session.clone());
            self.live.fetch_add(1, Ordering::SeqCst);
            info!(phone = %phone.tag(), "session created");
            return Ok(session);
        }
    }

    pub async fn is_authenticated(&self, phone: &Phone) -> bool {
        match self.get(phone).await {
            Some(session) => session.is_authenticated().await,
            None => false,
        }
    }

    /// Detach the session for `phone` from the registry. The caller owns teardown.
    pub async fn remove(&self, phone: &Phone) -> Option<Arc<Session>> {
        let slot = {
            let mut map = self.slots.lock().await;
            map.remove(phone)?
        };
        let mut guard = slot.lock().await;
        guard.retired = true;
        let session = guard.session.take();
        if session.is_some() {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        session
    }

    /// Remove and tear down the session for `phone`. Missing sessions are fine.
    pub async fn destroy(&self, phone: &Phone) -> bool {
        let Some(session) = self.remove(phone).await else {
            return false;
        };
        session.teardown().await;
        true
    }

    /// Number of connected sessions.
    pub fn len(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tear down every session (process shutdown).
    ///
    /// Slots still connecting are skipped; their `get_or_create` sees the
    /// registry closing and disconnects the new client itself.
    pub async fn shutdown(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let slots: Vec<(Phone, SlotRef)> = self.slots.lock().await.drain().collect();
        for (phone, slot) in slots {
            let session = match slot.try_lock() {
                Ok(mut guard) => {
                    guard.retired = true;
                    guard.session.take()
                }
                Err(_) => {
                    debug!(phone = %phone.tag(), "skipping slot still connecting");
                    continue;
                }
            };
            if let Some(session) = session {
                self.live.fetch_sub(1, Ordering::SeqCst);
                session.teardown().await;
            }
        }
    }

    #[cfg(test)]
    async fn slot_count(&self) -> usize {
        self.slots.lock().await.len()
    }
}
