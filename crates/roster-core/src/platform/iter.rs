//! Cursor-based iterators over paged platform enumerations.

use std::collections::VecDeque;

use crate::platform::{
    port::{PlatformClient, PlatformResult},
    types::{Entity, HistoryMessage, UserProfile},
};

/// Iterates a conversation's participant list page by page.
pub struct ParticipantIter {
    chat: Entity,
    offset: usize,
    page_size: usize,
    done: bool,
    buffer: VecDeque<UserProfile>,
}

impl ParticipantIter {
    pub fn new(chat: Entity, page_size: usize) -> Self {
        Self {
            chat,
            offset: 0,
            page_size: page_size.max(1),
            done: false,
            buffer: VecDeque::new(),
        }
    }

    /// Next participant, or `None` once the list is exhausted.
    pub async fn next(
        &mut self,
        client: &dyn PlatformClient,
    ) -> PlatformResult<Option<UserProfile>> {
        if let Some(p) = self.buffer.pop_front() {
            return Ok(Some(p));
        }
        if self.done {
            return Ok(None);
        }

        let page = client
            .participants(&self.chat, self.offset, self.page_size)
            .await?;
        if page.len() < self.page_size {
            self.done = true;
        }
        self.offset += page.len();

        self.buffer.extend(page);
        Ok(self.buffer.pop_front())
    }
}

/// Iterates message history newest-first.
pub struct HistoryIter {
    chat: Entity,
    offset_id: i32,
    page_size: usize,
    done: bool,
    buffer: VecDeque<HistoryMessage>,
}

impl HistoryIter {
    pub fn new(chat: Entity, page_size: usize) -> Self {
        Self {
            chat,
            offset_id: 0,
            page_size: page_size.max(1),
            done: false,
            buffer: VecDeque::new(),
        }
    }

    pub async fn next(
        &mut self,
        client: &dyn PlatformClient,
    ) -> PlatformResult<Option<HistoryMessage>> {
        if let Some(m) = self.buffer.pop_front() {
            return Ok(Some(m));
        }
        if self.done {
            return Ok(None);
        }

        let page = client
            .history(&self.chat, self.offset_id, self.page_size)
            .await?;
        if page.len() < self.page_size {
            self.done = true;
        }
        if let Some(last) = page.last() {
            self.offset_id = last.id;
        }

        self.buffer.extend(page);
        Ok(self.buffer.pop_front())
    }
}
