//! In-memory platform fakes for unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::Phone,
    errors::PlatformError,
    platform::{
        port::{PlatformClient, PlatformConnector, PlatformResult},
        types::{CodeRequest, Dialog, Entity, HistoryMessage, PeerId, UserProfile},
    },
};

pub fn phone(raw: &str) -> Phone {
    Phone::parse(raw).unwrap()
}

pub fn user(id: i64, first: &str, last: &str, username: Option<&str>) -> UserProfile {
    UserProfile {
        id,
        first_name: first.to_string(),
        last_name: last.to_string(),
        username: username.map(str::to_string),
        phone: None,
        bot: false,
        deleted: false,
    }
}

pub fn msg(id: i32, sender: Option<PeerId>) -> HistoryMessage {
    HistoryMessage { id, sender }
}

#[derive(Clone, Debug)]
pub struct FakeChat {
    pub entity: Entity,
    pub participants: Vec<UserProfile>,
    pub admin_required: bool,
    /// Newest first.
    pub messages: Vec<HistoryMessage>,
}

#[derive(Clone, Debug)]
pub struct FakeWorld {
    pub code: String,
    pub password: Option<String>,
    pub dialogs: Vec<Dialog>,
    pub chats: HashMap<i64, FakeChat>,
    pub users: HashMap<i64, UserProfile>,
    pub transient_senders: HashSet<i64>,
    pub broken_senders: HashSet<i64>,
    pub history_delay: Option<Duration>,
}

impl Default for FakeWorld {
    fn default() -> Self {
        Self {
            code: "11111".to_string(),
            password: None,
            dialogs: Vec::new(),
            chats: HashMap::new(),
            users: HashMap::new(),
            transient_senders: HashSet::new(),
            broken_senders: HashSet::new(),
            history_delay: None,
        }
    }
}

pub const CHAT: i64 = -100500;

impl FakeWorld {
    /// Participants A(1), B(2); messages (newest first) sent by C(3), B(2).
    pub fn scenario() -> Self {
        let a = user(1, "Ann", "", Some("ann"));
        let b = user(2, "Bob", "Stone", None);
        let c = user(3, "Cid", "", Some("cid"));
        let mut world = Self::default();
        world.add_chat(FakeChat {
            entity: Entity::Channel {
                id: CHAT,
                title: "Team".to_string(),
                megagroup: true,
            },
            participants: vec![a.clone(), b.clone()],
            admin_required: false,
            messages: vec![
                msg(11, Some(PeerId::User(3))),
                msg(10, Some(PeerId::User(2))),
            ],
        });
        for u in [a, b, c] {
            world.users.insert(u.id, u);
        }
        world
    }

    pub fn add_chat(&mut self, chat: FakeChat) {
        let (id, name) = match &chat.entity {
            Entity::Chat { id, title } | Entity::Channel { id, title, .. } => (*id, title.clone()),
            Entity::User(u) => (u.id, u.first_name.clone()),
            Entity::Other { id } => (*id, String::new()),
        };
        self.dialogs.push(Dialog {
            id,
            name,
            entity: chat.entity.clone(),
        });
        self.chats.insert(id, chat);
    }
}

#[derive(Default)]
pub struct CallCounts {
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub sender_lookups: AtomicUsize,
    pub history_pages: AtomicUsize,
}

pub struct FakeConnector {
    world: Arc<FakeWorld>,
    delay: Option<Duration>,
    fail: bool,
    counters: Arc<CallCounts>,
}

impl FakeConnector {
    pub fn new(world: FakeWorld) -> Self {
        Self {
            world: Arc::new(world),
            delay: None,
            fail: false,
            counters: Arc::new(CallCounts::default()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn connects(&self) -> usize {
        self.counters.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.counters.disconnects.load(Ordering::SeqCst)
    }

    pub fn sender_lookups(&self) -> usize {
        self.counters.sender_lookups.load(Ordering::SeqCst)
    }

    pub fn history_pages(&self) -> usize {
        self.counters.history_pages.load(Ordering::SeqCst)
    }

    pub fn client(&self) -> FakeClient {
        FakeClient {
            world: self.world.clone(),
            counters: self.counters.clone(),
        }
    }
}

#[async_trait]
impl PlatformConnector for FakeConnector {
    async fn connect(&self, _phone: &Phone) -> PlatformResult<Arc<dyn PlatformClient>> {
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        if self.fail {
            return Err(PlatformError::Other("connection refused".to_string()));
        }
        self.counters.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.client()))
    }
}

pub struct FakeClient {
    world: Arc<FakeWorld>,
    counters: Arc<CallCounts>,
}

impl FakeClient {
    fn chat(&self, chat: &Entity) -> PlatformResult<&FakeChat> {
        self.world.chats.get(&chat.id()).ok_or(PlatformError::NotFound)
    }
}

#[async_trait]
impl PlatformClient for FakeClient {
    async fn send_code(&self, _phone: &Phone) -> PlatformResult<CodeRequest> {
        Ok(CodeRequest {
            phone_code_hash: "hash-1".to_string(),
        })
    }

    async fn sign_in(
        &self,
        _phone: &Phone,
        code: &str,
        phone_code_hash: &str,
    ) -> PlatformResult<()> {
        if phone_code_hash != "hash-1" {
            return Err(PlatformError::CodeExpired);
        }
        if code != self.world.code {
            return Err(PlatformError::InvalidCode);
        }
        if self.world.password.is_some() {
            return Err(PlatformError::PasswordRequired);
        }
        Ok(())
    }

    async fn check_password(&self, password: &str) -> PlatformResult<()> {
        match &self.world.password {
            Some(p) if p == password => Ok(()),
            _ => Err(PlatformError::InvalidPassword),
        }
    }

    async fn dialogs(&self) -> PlatformResult<Vec<Dialog>> {
        Ok(self.world.dialogs.clone())
    }

    async fn resolve_chat(&self, chat_id: i64) -> PlatformResult<Entity> {
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
        let chat = self.chat(chat)?;
        if chat.admin_required {
            return Err(PlatformError::AdminRequired);
        }
        Ok(chat
            .participants
            .iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn history(
        &self,
        chat: &Entity,
        offset_id: i32,
        limit: usize,
    ) -> PlatformResult<Vec<HistoryMessage>> {
        self.counters.history_pages.fetch_add(1, Ordering::SeqCst);
        if let Some(d) = self.world.history_delay {
            tokio::time::sleep(d).await;
        }
        let chat = self.chat(chat)?;
        Ok(chat
            .messages
            .iter()
            .filter(|m| offset_id == 0 || m.id < offset_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn resolve_sender(
        &self,
        _chat: &Entity,
        message: &HistoryMessage,
    ) -> PlatformResult<Option<Entity>> {
        self.counters.sender_lookups.fetch_add(1, Ordering::SeqCst);
        let Some(PeerId::User(id)) = message.sender else {
            return Ok(None);
        };
        if self.world.transient_senders.contains(&id) {
            return Err(PlatformError::Transient(format!("user {id} unavailable")));
        }
        if self.world.broken_senders.contains(&id) {
            return Err(PlatformError::Other(format!("user {id} lookup crashed")));
        }
        Ok(self.world.users.get(&id).cloned().map(Entity::User))
    }

    async fn disconnect(&self) -> PlatformResult<()> {
        self.counters.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
