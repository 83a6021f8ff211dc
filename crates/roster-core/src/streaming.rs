//! Progress frames for a parse run and the channel that carries them.
//!
//! The engine is the only producer; the transport is the only consumer. When the
//! consumer goes away (or the session is torn down) the producer notices at its
//! next checkpoint and stops with `Error::Cancelled`.

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{
    domain::{Counters, UserRecord},
    errors::Error,
    Result,
};

/// Enumeration source a progress frame refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Members,
    Messages,
}

/// One typed event of a parse run, serialized as `{"type": "...", ...}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressFrame {
    ParsingMembers,
    ParsingMessages,
    Progress {
        kind: SourceKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        count: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        processed: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        found: Option<u64>,
    },
    MembersDone {
        count: u64,
    },
    MessagesDone {
        processed: u64,
        found: u64,
    },
    /// Source-level failure that did not end the run.
    Warning {
        source: SourceKind,
        message: String,
    },
    Complete {
        users: Vec<UserRecord>,
        total: usize,
        counters: Counters,
    },
    Error {
        message: String,
    },
}

impl ProgressFrame {
    pub fn members_progress(count: u64) -> Self {
        ProgressFrame::Progress {
            kind: SourceKind::Members,
            count: Some(count),
            processed: None,
            found: None,
        }
    }

    pub fn messages_progress(processed: u64, found: u64) -> Self {
        ProgressFrame::Progress {
            kind: SourceKind::Messages,
            count: None,
            processed: Some(processed),
            found: Some(found),
        }
    }

    /// `complete` and `error` end the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProgressFrame::Complete { .. } | ProgressFrame::Error { .. }
        )
    }
}

/// Producer half. Owned by the run; dropping it ends the stream.
pub struct ProgressEmitter {
    tx: mpsc::Sender<ProgressFrame>,
    cancel: CancellationToken,
}

impl ProgressEmitter {
    /// Fails with `Cancelled` when the run should stop instead of continuing.
    pub fn checkpoint(&self) -> Result<()> {
        if self.tx.is_closed() || self.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Deliver a frame, waiting for buffer space. A full buffer never outlives
    /// the consumer or the session.
    pub async fn emit(&self, frame: ProgressFrame) -> Result<()> {
        self.checkpoint()?;
        tokio::select! {
            res = self.tx.send(frame) => res.map_err(|_| Error::Cancelled),
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
        }
    }

    /// Deliver the terminal frame. Ignores session cancellation so a consumer
    /// that is still listening learns why the run ended.
    pub async fn finish(self, frame: ProgressFrame) -> bool {
        debug_assert!(frame.is_terminal());
        self.tx.send(frame).await.is_ok()
    }

    pub fn is_consumer_gone(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer half: frames in emission order.
pub struct ParseStream {
    rx: mpsc::Receiver<ProgressFrame>,
}

impl ParseStream {
    pub async fn recv(&mut self) -> Option<ProgressFrame> {
        self.rx.recv().await
    }

    pub fn into_inner(self) -> mpsc::Receiver<ProgressFrame> {
        self.rx
    }

    /// Drain every remaining frame (until the producer drops).
    pub async fn collect(mut self) -> Vec<ProgressFrame> {
        let mut out = Vec::new();
        while let Some(f) = self.rx.recv().await {
            out.push(f);
        }
        out
    }
}

pub fn channel(capacity: usize, cancel: CancellationToken) -> (ProgressEmitter, ParseStream) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (ProgressEmitter { tx, cancel }, ParseStream { rx })
}
