use std::{fmt, str::FromStr, sync::OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{errors::Error, Result};

/// Platform user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Conversation id as reported by the dialog list (numeric, may be negative).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Normalized phone number. This is the identity a session is keyed by.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Phone(String);

impl Phone {
    /// Strip common separators and validate the digit count.
    pub fn parse(raw: &str) -> Result<Self> {
        static SHAPE: OnceLock<Regex> = OnceLock::new();
        let shape = SHAPE.get_or_init(|| Regex::new(r"^\+?[0-9]{5,15}$").expect("valid regex"));

        let cleaned: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')' | '\t'))
            .collect();
        if !shape.is_match(&cleaned) {
            return Err(Error::Validation(format!("invalid phone number: {raw:?}")));
        }
        Ok(Self(cleaned))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short stable tag for log lines; phone numbers are never logged in clear.
    pub fn tag(&self) -> String {
        let digest = Sha256::digest(self.0.as_bytes());
        digest[..4].iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Phone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============== Conversations ==============

/// Closed classification of a conversation, decided once when it is listed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Personal,
    Group,
    Supergroup,
    Channel,
    Unknown,
}

impl ConversationKind {
    pub fn is_group(self) -> bool {
        matches!(
            self,
            ConversationKind::Group | ConversationKind::Supergroup | ConversationKind::Channel
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ConversationSummary {
    pub id: ChatId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ConversationKind,
    pub is_group: bool,
}

// ============== Users ==============

/// Which enumeration source(s) discovered a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    Members,
    Messages,
    Both,
}

impl Provenance {
    pub fn as_str(self) -> &'static str {
        match self {
            Provenance::Members => "members",
            Provenance::Messages => "messages",
            Provenance::Both => "both",
        }
    }
}

/// Which sources a parse run enumerates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    Members,
    Messages,
    Both,
}

impl ParseMethod {
    pub fn includes_members(self) -> bool {
        matches!(self, ParseMethod::Members | ParseMethod::Both)
    }

    pub fn includes_messages(self) -> bool {
        matches!(self, ParseMethod::Messages | ParseMethod::Both)
    }
}

impl FromStr for ParseMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "members" => Ok(ParseMethod::Members),
            "messages" => Ok(ParseMethod::Messages),
            "both" => Ok(ParseMethod::Both),
            other => Err(Error::Validation(format!("unknown parse method: {other:?}"))),
        }
    }
}

pub const NO_NAME: &str = "No name";

/// One discovered user. `id` is the deduplication key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    #[serde(rename = "name")]
    pub display_name: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(rename = "username")]
    pub handle: Option<String>,
    pub phone: Option<String>,
    #[serde(rename = "source")]
    pub provenance: Provenance,
}

impl UserRecord {
    pub fn display_name_of(first: &str, last: &str) -> String {
        let joined = format!("{first} {last}");
        let trimmed = joined.trim();
        if trimmed.is_empty() {
            NO_NAME.to_string()
        } else {
            trimmed.to_string()
        }
    }
}

/// Cumulative counters for one run (never reset between sources).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    pub members_seen: u64,
    pub messages_processed: u64,
    pub users_found: u64,
    pub senders_skipped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub members_error: Option<String>,
}

/// Final output of a parse run. `users` is in discovery order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AggregationResult {
    pub conversation_id: ChatId,
    pub method: ParseMethod,
    pub users: Vec<UserRecord>,
    pub counters: Counters,
}

impl AggregationResult {
    pub fn total(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_normalization() {
        assert_eq!(Phone::parse(" +7 (912) 345-67-89 ").unwrap().as_str(), "+79123456789");
        assert_eq!(Phone::parse("15551234567").unwrap().as_str(), "15551234567");
        assert!(Phone::parse("").is_err());
        assert!(Phone::parse("+12ab").is_err());
        assert!(Phone::parse("1234").is_err());
    }

    #[test]
    fn phone_tag_is_stable_and_opaque() {
        let p = Phone::parse("+15551234567").unwrap();
        assert_eq!(p.tag(), p.tag());
        assert_eq!(p.tag().len(), 8);
        assert!(!p.tag().contains("5551234567"));
    }

    #[test]
    fn parse_method_from_str() {
        assert_eq!("Both".parse::<ParseMethod>().unwrap(), ParseMethod::Both);
        assert_eq!(" members ".parse::<ParseMethod>().unwrap(), ParseMethod::Members);
        assert!("everything".parse::<ParseMethod>().is_err());
    }

    #[test]
    fn display_name_falls_back() {
        assert_eq!(UserRecord::display_name_of("Ann", ""), "Ann");
        assert_eq!(UserRecord::display_name_of("", "Lee"), "Lee");
        assert_eq!(UserRecord::display_name_of("Ann", "Lee"), "Ann Lee");
        assert_eq!(UserRecord::display_name_of(" ", ""), NO_NAME);
    }

    #[test]
    fn group_kinds() {
        assert!(!ConversationKind::Personal.is_group());
        assert!(ConversationKind::Group.is_group());
        assert!(ConversationKind::Supergroup.is_group());
        assert!(ConversationKind::Channel.is_group());
        assert!(!ConversationKind::Unknown.is_group());
    }
}
