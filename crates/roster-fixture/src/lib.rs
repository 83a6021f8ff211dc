//! Offline implementation of the platform port, backed by a JSON world file.
//!
//! Every connection sees the same world; accounts only decide the sign-in
//! code, the optional second-factor password and which dialogs are listed.

mod world;

use std::{
    path::Path,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info};

use roster_core::{
    domain::Phone,
    errors::{Error, PlatformError},
    platform::{
        port::{PlatformClient, PlatformConnector, PlatformResult},
        types::{CodeRequest, Dialog, Entity, HistoryMessage, PeerId, UserProfile},
    },
    Result,
};

pub use world::{Account, FixtureChat, FixtureMessage, WorldFile};
use world::World;

/// Demo world shipped with the crate.
pub const DEMO_WORLD: &str = include_str!("../fixtures/demo.json");

pub struct FixturePlatform {
    world: Arc<World>,
    hashes: Arc<AtomicU64>,
}

impl FixturePlatform {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let platform = Self::from_json(&raw)?;
        info!(
            path = %path.display(),
            chats = platform.world.chats.len(),
            users = platform.world.users.len(),
            "fixture world loaded"
        );
        Ok(platform)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: WorldFile = serde_json::from_str(raw)?;
        Self::from_world(file)
    }

    pub fn from_world(file: WorldFile) -> Result<Self> {
        Ok(Self {
            world: Arc::new(World::from_file(file)?),
            hashes: Arc::new(AtomicU64::new(1)),
        })
    }
}

#[async_trait]
impl PlatformConnector for FixturePlatform {
    async fn connect(&self, phone: &Phone) -> PlatformResult<Arc<dyn PlatformClient>> {
        let account = self.world.accounts.get(phone.as_str()).cloned();
        debug!(phone = %phone.tag(), known = account.is_some(), "fixture connect");
        Ok(Arc::new(FixtureClient {
            world: self.world.clone(),
            hashes: self.hashes.clone(),
            account,
            pending_hash: Mutex::new(None),
            authorized: AtomicBool::new(false),
            connected: AtomicBool::new(true),
        }))
    }
}

pub struct FixtureClient {
    world: Arc<World>,
    hashes: Arc<AtomicU64>,
    account: Option<Account>,
    pending_hash: Mutex<Option<String>>,
    authorized: AtomicBool,
    connected: AtomicBool,
}

impl FixtureClient {
    fn ensure_connected(&self) -> PlatformResult<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(PlatformError::Other("client is disconnected".to_string()));
        }
        Ok(())
    }

    fn ensure_authorized(&self) -> PlatformResult<()> {
        self.ensure_connected()?;
        if !self.authorized.load(Ordering::SeqCst) {
            return Err(PlatformError::Other("AUTH_KEY_UNREGISTERED".to_string()));
        }
        Ok(())
    }

    fn expected_code(&self) -> &str {
        self.account
            .as_ref()
            .map(|a| a.code.as_str())
            .unwrap_or(self.world.default_code.as_str())
    }

    fn password(&self) -> Option<&str> {
        self.account.as_ref().and_then(|a| a.password.as_deref())
    }

    fn chat(&self, chat: &Entity) -> PlatformResult<&FixtureChat> {
        self.world.chats.get(&chat.id()).ok_or(PlatformError::NotFound)
    }

    fn visible(&self, id: i64) -> bool {
        match &self.account {
            Some(a) if !a.dialogs.is_empty() => a.dialogs.contains(&id),
            _ => true,
        }
    }
}

#[async_trait]
impl PlatformClient for FixtureClient {
    async fn send_code(&self, phone: &Phone) -> PlatformResult<CodeRequest> {
        self.ensure_connected()?;
        let n = self.hashes.fetch_add(1, Ordering::SeqCst);
        let hash = format!("fixture-{n:08x}");
        *self.pending_hash.lock().await = Some(hash.clone());
        debug!(phone = %phone.tag(), "fixture code issued");
        Ok(CodeRequest {
            phone_code_hash: hash,
        })
    }

    async fn sign_in(
        &self,
        _phone: &Phone,
        code: &str,
        phone_code_hash: &str,
    ) -> PlatformResult<()> {
        self.ensure_connected()?;
        let pending = self.pending_hash.lock().await;
        if pending.as_deref() != Some(phone_code_hash) {
            return Err(PlatformError::CodeExpired);
        }
        if code != self.expected_code() {
            return Err(PlatformError::InvalidCode);
        }
        if self.password().is_some() {
            return Err(PlatformError::PasswordRequired);
        }
        self.authorized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn check_password(&self, password: &str) -> PlatformResult<()> {
        self.ensure_connected()?;
        match self.password() {
            Some(expected) if expected == password => {
                self.authorized.store(true, Ordering::SeqCst);
                Ok(())
            }
            _ => Err(PlatformError::InvalidPassword),
        }
    }

    async fn dialogs(&self) -> PlatformResult<Vec<Dialog>> {
        self.ensure_authorized()?;
        Ok(self
            .world
            .chat_order
            .iter()
            .filter(|id| self.visible(**id))
            .filter_map(|id| self.world.chats.get(id))
            .map(|c| Dialog {
                id: c.entity.id(),
                name: World::dialog_name(&c.entity),
                entity: c.entity.clone(),
            })
            .collect())
    }

    async fn resolve_chat(&self, chat_id: i64) -> PlatformResult<Entity> {
        self.ensure_authorized()?;
        if !self.visible(chat_id) {
            return Err(PlatformError::NotFound);
        }
        self.world
            .chats
            .get(&chat_id)
            .map(|c| c.entity.clone())
            .ok_or(PlatformError::NotFound)
    }

    async fn participants(
        &self,
        chat: &Entity,
        offset: usize,
        limit: usize,
    ) -> PlatformResult<Vec<UserProfile>> {
        self.ensure_authorized()?;
        let chat = self.chat(chat)?;
        if chat.admin_required {
            return Err(PlatformError::AdminRequired);
        }
        Ok(chat
            .participants
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|id| self.world.users.get(id).cloned())
            .collect())
    }

    async fn history(
        &self,
        chat: &Entity,
        offset_id: i32,
        limit: usize,
    ) -> PlatformResult<Vec<HistoryMessage>> {
        self.ensure_authorized()?;
        let chat = self.chat(chat)?;
        Ok(chat
            .messages
            .iter()
            .filter(|m| offset_id == 0 || m.id < offset_id)
            .take(limit)
            .map(|m| HistoryMessage {
                id: m.id,
                sender: m.sender,
            })
            .collect())
    }

    async fn resolve_sender(
        &self,
        _chat: &Entity,
        message: &HistoryMessage,
    ) -> PlatformResult<Option<Entity>> {
        self.ensure_authorized()?;
        match message.sender {
            None => Ok(None),
            Some(PeerId::User(id)) => {
                if self.world.flaky_senders.contains(&id) {
                    return Err(PlatformError::Transient(format!(
                        "sender {id} of message {} could not be fetched",
                        message.id
                    )));
                }
                Ok(self.world.users.get(&id).cloned().map(Entity::User))
            }
            Some(PeerId::Chat(id)) | Some(PeerId::Channel(id)) => {
                Ok(self.world.chats.get(&id).map(|c| c.entity.clone()))
            }
        }
    }

    async fn disconnect(&self) -> PlatformResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.authorized.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Shorthand used by callers that only hold a path from configuration.
pub fn connector_from_path(path: &Path) -> Result<Arc<dyn PlatformConnector>> {
    if !path.exists() {
        return Err(Error::Config(format!(
            "fixture file not found: {}",
            path.display()
        )));
    }
    Ok(Arc::new(FixturePlatform::load(path)?))
}
