//! Transport-facing facade: one method per logical operation.
//!
//! Transports hand in raw caller input (phone strings, ids); normalization and
//! every state check happen here.

use std::sync::Arc;

use tracing::{debug, info, info_span, warn, Instrument};

use crate::{
    aggregate::{AggregationEngine, EngineConfig},
    auth::{AuthStateMachine, VerifyOutcome},
    catalog::ChatCatalog,
    config::Config,
    domain::{AggregationResult, ChatId, ConversationSummary, ParseMethod, Phone},
    errors::{Error, NotFoundError},
    export::{self, Artifact, ExportFormat},
    platform::{port::PlatformConnector, types::Entity},
    registry::{RunGuard, Session, SessionRegistry},
    results::ResultStore,
    streaming::{self, ParseStream, ProgressEmitter, ProgressFrame},
    utils::truncate_text,
    Result,
};

const ERROR_FRAME_MAX_CHARS: usize = 500;

pub struct RosterService {
    registry: Arc<SessionRegistry>,
    auth: AuthStateMachine,
    catalog: ChatCatalog,
    engine: Arc<AggregationEngine>,
    results: Arc<ResultStore>,
    stream_buffer: usize,
}

/// Everything a run needs, checked before the first frame is produced.
struct PreparedRun {
    phone: Phone,
    session: Arc<Session>,
    guard: RunGuard,
    conversation_id: ChatId,
    chat: Entity,
}

impl RosterService {
    pub fn new(connector: Arc<dyn PlatformConnector>, cfg: &Config) -> Self {
        Self::with_engine(connector, cfg.engine_config(), cfg.stream_buffer)
    }

    pub fn with_engine(
        connector: Arc<dyn PlatformConnector>,
        engine: EngineConfig,
        stream_buffer: usize,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(connector));
        Self {
            auth: AuthStateMachine::new(registry.clone()),
            catalog: ChatCatalog::new(registry.clone()),
            registry,
            engine: Arc::new(AggregationEngine::new(engine)),
            results: Arc::new(ResultStore::new()),
            stream_buffer: stream_buffer.max(1),
        }
    }

    pub fn active_sessions(&self) -> usize {
        self.registry.len()
    }

    // ============== Authentication ==============

    pub async fn request_code(&self, phone: &str) -> Result<()> {
        let phone = Phone::parse(phone)?;
        self.auth.request_code(&phone).await
    }

    pub async fn verify_code(&self, phone: &str, code: &str) -> Result<VerifyOutcome> {
        let phone = Phone::parse(phone)?;
        self.auth.verify_code(&phone, code).await
    }

    pub async fn verify_two_factor(&self, phone: &str, password: &str) -> Result<()> {
        let phone = Phone::parse(phone)?;
        self.auth.verify_two_factor(&phone, password).await
    }

    /// Tear down the session and forget its last result. Always succeeds; input
    /// that is not a phone number cannot have a session.
    pub async fn logout(&self, phone: &str) -> Result<()> {
        let Ok(phone) = Phone::parse(phone) else {
            debug!("logout for malformed phone; nothing to do");
            return Ok(());
        };
        self.auth.logout(&phone).await;
        self.results.remove(&phone).await;
        Ok(())
    }

    // ============== Conversations ==============

    pub async fn list_conversations(&self, phone: &str) -> Result<Vec<ConversationSummary>> {
        let phone = Phone::parse(phone)?;
        self.catalog.list_conversations(&phone).await
    }

    // ============== Parsing ==============

    async fn prepare(&self, phone: &str, conversation_id: i64) -> Result<PreparedRun> {
        let phone = Phone::parse(phone)?;
        let session = self.catalog.authenticated_session(&phone).await?;
        let guard = session.try_begin_run()?;
        let conversation_id = ChatId(conversation_id);
        let chat = self.catalog.resolve(&session, conversation_id).await?;
        Ok(PreparedRun {
            phone,
            session,
            guard,
            conversation_id,
            chat,
        })
    }

    /// Start a run in the background and hand back its frame stream.
    ///
    /// Session, conversation and single-run checks fail here, before any frame.
    /// Once the stream is returned, every outcome arrives as a terminal frame.
    pub async fn parse_stream(
        &self,
        phone: &str,
        conversation_id: i64,
        method: ParseMethod,
    ) -> Result<ParseStream> {
        let run = self.prepare(phone, conversation_id).await?;
        let (emitter, stream) =
            streaming::channel(self.stream_buffer, run.session.cancel_token());

        let span = info_span!(
            "parse",
            phone = %run.phone.tag(),
            conversation = %run.conversation_id,
        );
        let engine = self.engine.clone();
        let results = self.results.clone();
        tokio::spawn(drive(engine, results, run, method, emitter).instrument(span));

        Ok(stream)
    }

    /// Run to completion and return the stored result.
    pub async fn parse(
        &self,
        phone: &str,
        conversation_id: i64,
        method: ParseMethod,
    ) -> Result<Arc<AggregationResult>> {
        let run = self.prepare(phone, conversation_id).await?;
        let (emitter, stream) =
            streaming::channel(self.stream_buffer, run.session.cancel_token());
        let drain = tokio::spawn(async move {
            let mut stream = stream;
            while stream.recv().await.is_some() {}
        });

        let res = self
            .engine
            .run(
                run.session.client(),
                run.conversation_id,
                &run.chat,
                method,
                &emitter,
            )
            .await;
        drop(emitter);
        if let Err(e) = drain.await {
            debug!(error = %e, "progress drain task ended abnormally");
        }

        let result = res?;
        if run.session.cancel_token().is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(self.results.put(&run.phone, result).await)
    }

    // ============== Export ==============

    pub async fn export(&self, phone: &str, format: ExportFormat) -> Result<Artifact> {
        let phone = Phone::parse(phone)?;
        let result = self
            .results
            .get(&phone)
            .await
            .ok_or(NotFoundError::ResultNotFound)?;
        let artifact = export::encode(&result, format)?;
        info!(
            phone = %phone.tag(),
            %format,
            users = result.total(),
            bytes = artifact.body.len(),
            "export rendered"
        );
        Ok(artifact)
    }

    /// Disconnect every session (process shutdown).
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
    }
}

/// Producer task of a streamed run.
async fn drive(
    engine: Arc<AggregationEngine>,
    results: Arc<ResultStore>,
    run: PreparedRun,
    method: ParseMethod,
    emitter: ProgressEmitter,
) {
    let PreparedRun {
        phone,
        session,
        guard,
        conversation_id,
        chat,
    } = run;

    let res = engine
        .run(session.client(), conversation_id, &chat, method, &emitter)
        .await
        .and_then(|r| {
            // A logout that raced the last page must not leave a result behind.
            if session.cancel_token().is_cancelled() {
                Err(Error::Cancelled)
            } else {
                Ok(r)
            }
        });

    let frame = match res {
        Ok(result) => {
            let stored = results.put(&phone, result).await;
            ProgressFrame::Complete {
                users: stored.users.clone(),
                total: stored.total(),
                counters: stored.counters.clone(),
            }
        }
        Err(Error::Cancelled) if emitter.is_consumer_gone() => {
            info!("consumer disconnected; run abandoned");
            return;
        }
        Err(e) => {
            warn!(error = %e, kind = e.kind(), "parse failed");
            ProgressFrame::Error {
                message: truncate_text(&e.to_string(), ERROR_FRAME_MAX_CHARS),
            }
        }
    };

    // Release the run slot before the stream closes.
    drop(guard);
    if !emitter.finish(frame).await {
        debug!("consumer gone before terminal frame");
    }
}
