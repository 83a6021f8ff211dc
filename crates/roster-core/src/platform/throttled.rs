use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::Phone,
    platform::{
        port::{PlatformClient, PlatformConnector, PlatformResult},
        types::{CodeRequest, Dialog, Entity, HistoryMessage, UserProfile},
    },
};

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// PlatformClient decorator that spaces out enumeration calls.
///
/// Long history walks are the calls that trip platform flood limits, so only
/// `participants`, `history` and `resolve_sender` are paced. Nothing is retried.
pub struct ThrottledPlatform {
    inner: Arc<dyn PlatformClient>,
    limiter: Mutex<IntervalLimiter>,
}

impl ThrottledPlatform {
    pub fn new(inner: Arc<dyn PlatformClient>, min_interval: Duration) -> Self {
        Self {
            inner,
            limiter: Mutex::new(IntervalLimiter::new(min_interval)),
        }
    }

    async fn throttle(&self) {
        let wait = { self.limiter.lock().await.reserve() };
        if wait > Duration::from_millis(0) {
            sleep(wait).await;
        }
    }
}

#[async_trait]
impl PlatformClient for ThrottledPlatform {
    async fn send_code(&self, phone: &Phone) -> PlatformResult<CodeRequest> {
        self.inner.send_code(phone).await
    }

    async fn sign_in(
        &self,
        phone: &Phone,
        code: &str,
        phone_code_hash: &str,
    ) -> PlatformResult<()> {
        self.inner.sign_in(phone, code, phone_code_hash).await
    }

    async fn check_password(&self, password: &str) -> PlatformResult<()> {
        self.inner.check_password(password).await
    }

    async fn dialogs(&self) -> PlatformResult<Vec<Dialog>> {
        self.inner.dialogs().await
    }

    async fn resolve_chat(&self, chat_id: i64) -> PlatformResult<Entity> {
        self.inner.resolve_chat(chat_id).await
    }

    async fn participants(
        &self,
        chat: &Entity,
        offset: usize,
        limit: usize,
    ) -> PlatformResult<Vec<UserProfile>> {
        self.throttle().await;
        self.inner.participants(chat, offset, limit).await
    }

    async fn history(
        &self,
        chat: &Entity,
        offset_id: i32,
        limit: usize,
    ) -> PlatformResult<Vec<HistoryMessage>> {
        self.throttle().await;
        self.inner.history(chat, offset_id, limit).await
    }

    async fn resolve_sender(
        &self,
        chat: &Entity,
        message: &HistoryMessage,
    ) -> PlatformResult<Option<Entity>> {
        self.throttle().await;
        self.inner.resolve_sender(chat, message).await
    }

    async fn disconnect(&self) -> PlatformResult<()> {
        self.inner.disconnect().await
    }
}

/// Connector decorator: every client it hands out is wrapped in a `ThrottledPlatform`.
pub struct ThrottledConnector {
    inner: Arc<dyn PlatformConnector>,
    min_interval: Duration,
}

impl ThrottledConnector {
    pub fn new(inner: Arc<dyn PlatformConnector>, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
        }
    }
}

#[async_trait]
impl PlatformConnector for ThrottledConnector {
    async fn connect(&self, phone: &Phone) -> PlatformResult<Arc<dyn PlatformClient>> {
        let client = self.inner.connect(phone).await?;
        Ok(Arc::new(ThrottledPlatform::new(client, self.min_interval)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_spaces_consecutive_reservations() {
        let interval = Duration::from_millis(200);
        let mut lim = IntervalLimiter::new(interval);

        assert_eq!(lim.reserve(), Duration::from_millis(0));
        let second = lim.reserve();
        assert!(second > Duration::from_millis(0));
        assert!(second <= interval);
        let third = lim.reserve();
        assert!(third > second);
    }

    #[test]
    fn zero_interval_never_waits() {
        let mut lim = IntervalLimiter::new(Duration::from_millis(0));
        for _ in 0..5 {
            assert_eq!(lim.reserve(), Duration::from_millis(0));
        }
    }
}
