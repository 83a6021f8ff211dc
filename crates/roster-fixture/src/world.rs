//! Serde model of a fixture world file.

use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use roster_core::{
    errors::Error,
    platform::types::{Entity, PeerId, UserProfile},
    Result,
};

const DEFAULT_CODE: &str = "12345";

#[derive(Clone, Debug, Deserialize)]
pub struct Account {
    pub phone: String,
    pub code: String,
    #[serde(default)]
    pub password: Option<String>,
    /// Conversation ids visible to this account; empty means all of them.
    #[serde(default)]
    pub dialogs: Vec<i64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FixtureMessage {
    pub id: i32,
    #[serde(default)]
    pub sender: Option<PeerId>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FixtureChat {
    pub entity: Entity,
    /// User ids, in the order the platform lists them.
    #[serde(default)]
    pub participants: Vec<i64>,
    #[serde(default)]
    pub admin_required: bool,
    #[serde(default)]
    pub messages: Vec<FixtureMessage>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct WorldFile {
    #[serde(default)]
    pub default_code: Option<String>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub users: Vec<UserProfile>,
    #[serde(default)]
    pub chats: Vec<FixtureChat>,
    /// Senders whose lookup fails transiently.
    #[serde(default)]
    pub flaky_senders: Vec<i64>,
}

/// Indexed, validated world.
#[derive(Debug)]
pub struct World {
    pub default_code: String,
    pub accounts: HashMap<String, Account>,
    pub users: HashMap<i64, UserProfile>,
    /// Dialog order follows the file.
    pub chat_order: Vec<i64>,
    pub chats: HashMap<i64, FixtureChat>,
    pub flaky_senders: HashSet<i64>,
}

impl World {
    pub fn from_file(file: WorldFile) -> Result<Self> {
        let users: HashMap<i64, UserProfile> =
            file.users.into_iter().map(|u| (u.id, u)).collect();

        let mut chat_order = Vec::with_capacity(file.chats.len());
        let mut chats = HashMap::with_capacity(file.chats.len());
        for mut chat in file.chats {
            let id = chat.entity.id();
            if let Some(missing) = chat.participants.iter().find(|p| !users.contains_key(p)) {
                return Err(Error::Config(format!(
                    "fixture chat {id} lists unknown participant {missing}"
                )));
            }
            // History is served newest first.
            chat.messages.sort_by(|a, b| b.id.cmp(&a.id));
            if chats.insert(id, chat).is_some() {
                return Err(Error::Config(format!("fixture chat {id} is defined twice")));
            }
            chat_order.push(id);
        }

        let mut accounts = HashMap::new();
        for acc in file.accounts {
            let phone = roster_core::domain::Phone::parse(&acc.phone)?;
            accounts.insert(phone.as_str().to_string(), acc);
        }

        Ok(Self {
            default_code: file
                .default_code
                .unwrap_or_else(|| DEFAULT_CODE.to_string()),
            accounts,
            users,
            chat_order,
            chats,
            flaky_senders: file.flaky_senders.into_iter().collect(),
        })
    }

    pub fn dialog_name(entity: &Entity) -> String {
        match entity {
            Entity::User(u) => {
                roster_core::domain::UserRecord::display_name_of(&u.first_name, &u.last_name)
            }
            Entity::Chat { title, .. } | Entity::Channel { title, .. } => title.clone(),
            Entity::Other { id } => format!("#{id}"),
        }
    }
}
