use std::sync::Arc;

use tracing::debug;

use crate::{
    domain::{ChatId, ConversationKind, ConversationSummary, Phone},
    errors::{AuthError, NotFoundError, PlatformError},
    platform::types::Entity,
    registry::{Session, SessionRegistry},
    Result,
};

/// Map a platform entity onto the closed set of conversation kinds.
pub fn classify(entity: &Entity) -> ConversationKind {
    match entity {
        Entity::User(_) => ConversationKind::Personal,
        Entity::Channel {
            megagroup: true, ..
        } => ConversationKind::Supergroup,
        Entity::Channel { .. } => ConversationKind::Channel,
        Entity::Chat { .. } => ConversationKind::Group,
        Entity::Other { .. } => ConversationKind::Unknown,
    }
}

pub struct ChatCatalog {
    registry: Arc<SessionRegistry>,
}

impl ChatCatalog {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }

    /// The session for `phone`, provided it has completed sign-in.
    pub async fn authenticated_session(&self, phone: &Phone) -> Result<Arc<Session>> {
        let session = self
            .registry
            .get(phone)
            .await
            .ok_or(AuthError::SessionMissing)?;
        if !session.is_authenticated().await {
            return Err(AuthError::NotAuthenticated.into());
        }
        Ok(session)
    }

    pub async fn list_conversations(&self, phone: &Phone) -> Result<Vec<ConversationSummary>> {
        let session = self.authenticated_session(phone).await?;
        let dialogs = session.client().dialogs().await?;

        let out: Vec<ConversationSummary> = dialogs
            .into_iter()
            .map(|d| {
                let kind = classify(&d.entity);
                ConversationSummary {
                    id: ChatId(d.id),
                    name: d.name,
                    kind,
                    is_group: kind.is_group(),
                }
            })
            .collect();
        debug!(phone = %phone.tag(), count = out.len(), "listed conversations");
        Ok(out)
    }

    /// Resolve a conversation id into the entity the enumerations run against.
    pub async fn resolve(&self, session: &Session, id: ChatId) -> Result<Entity> {
        match session.client().resolve_chat(id.0).await {
            Ok(entity) => Ok(entity),
            Err(PlatformError::NotFound) => Err(NotFoundError::ConversationNotFound(id.0).into()),
            Err(e) => Err(e.into()),
        }
    }
}
