use std::sync::Arc;

use async_trait::async_trait;

use crate::{
    domain::Phone,
    errors::PlatformError,
    platform::types::{CodeRequest, Dialog, Entity, HistoryMessage, UserProfile},
};

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// Opens connections to the platform. Connecting suspends.
#[async_trait]
pub trait PlatformConnector: Send + Sync {
    async fn connect(&self, phone: &Phone) -> PlatformResult<Arc<dyn PlatformClient>>;
}

/// One live connection, bound to a single phone identity.
///
/// Enumerations are paged: a page shorter than `limit` marks the end of the list.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    async fn send_code(&self, phone: &Phone) -> PlatformResult<CodeRequest>;

    async fn sign_in(&self, phone: &Phone, code: &str, phone_code_hash: &str)
        -> PlatformResult<()>;

    async fn check_password(&self, password: &str) -> PlatformResult<()>;

    async fn dialogs(&self) -> PlatformResult<Vec<Dialog>>;

    async fn resolve_chat(&self, chat_id: i64) -> PlatformResult<Entity>;

    async fn participants(
        &self,
        chat: &Entity,
        offset: usize,
        limit: usize,
    ) -> PlatformResult<Vec<UserProfile>>;

    /// Newest first. `offset_id == 0` starts at the newest message; otherwise
    /// only messages with an id strictly below `offset_id` are returned.
    async fn history(
        &self,
        chat: &Entity,
        offset_id: i32,
        limit: usize,
    ) -> PlatformResult<Vec<HistoryMessage>>;

    async fn resolve_sender(
        &self,
        chat: &Entity,
        message: &HistoryMessage,
    ) -> PlatformResult<Option<Entity>>;

    async fn disconnect(&self) -> PlatformResult<()>;
}
