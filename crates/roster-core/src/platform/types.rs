use serde::{Deserialize, Serialize};

/// A platform user as returned by participant lists and sender lookups.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub bot: bool,
    /// Deleted accounts stay in member lists as empty placeholders.
    #[serde(default)]
    pub deleted: bool,
}

impl UserProfile {
    /// A real person: neither a bot nor a deleted-account placeholder.
    pub fn is_individual(&self) -> bool {
        !self.bot && !self.deleted
    }
}

/// Closed set of entity shapes the platform can hand back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    User(UserProfile),
    /// Legacy small group.
    Chat { id: i64, title: String },
    /// Broadcast-style entity; `megagroup` marks a supergroup.
    Channel {
        id: i64,
        title: String,
        #[serde(default)]
        megagroup: bool,
    },
    Other { id: i64 },
}

impl Entity {
    pub fn id(&self) -> i64 {
        match self {
            Entity::User(u) => u.id,
            Entity::Chat { id, .. } | Entity::Channel { id, .. } | Entity::Other { id } => *id,
        }
    }
}

/// One entry of the dialog list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Dialog {
    pub id: i64,
    pub name: String,
    pub entity: Entity,
}

/// Sender reference carried by a history message before resolution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum PeerId {
    User(i64),
    Chat(i64),
    Channel(i64),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryMessage {
    pub id: i32,
    pub sender: Option<PeerId>,
}

/// Result of a one-time-code request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeRequest {
    pub phone_code_hash: String,
}
