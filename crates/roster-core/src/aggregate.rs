//! Multi-source roster aggregation.
//!
//! One run enumerates the members list, the message history, or both (members
//! first), and keeps a single deduplicated list of users in discovery order.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::{
    domain::{AggregationResult, ChatId, Counters, ParseMethod, Provenance, UserId, UserRecord},
    errors::{Error, PlatformError},
    platform::{
        iter::{HistoryIter, ParticipantIter},
        port::PlatformClient,
        types::{Entity, HistoryMessage, PeerId, UserProfile},
    },
    streaming::{ProgressEmitter, ProgressFrame, SourceKind},
    Result,
};

#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub participants_page_size: usize,
    pub messages_page_size: usize,
    /// Emit a members progress frame every N participants.
    pub members_progress_every: u64,
    /// Emit a messages progress frame every N messages.
    pub messages_progress_every: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            participants_page_size: 200,
            messages_page_size: 100,
            members_progress_every: 50,
            messages_progress_every: 100,
        }
    }
}

/// Per-run state. Lives exactly as long as one `run` call.
struct RunState {
    method: ParseMethod,
    /// user id -> index into `users`
    seen: HashMap<UserId, usize>,
    /// Senders already known not to be individual users.
    ignored: HashSet<PeerId>,
    users: Vec<UserRecord>,
    counters: Counters,
}

impl RunState {
    fn new(method: ParseMethod) -> Self {
        Self {
            method,
            seen: HashMap::new(),
            ignored: HashSet::new(),
            users: Vec::new(),
            counters: Counters::default(),
        }
    }

    /// Record a discovery. Returns true when the user is new to this run.
    ///
    /// First-seen field values win; a later discovery by the other source only
    /// upgrades provenance (and only when both sources were requested).
    fn observe(&mut self, profile: &UserProfile, source: Provenance) -> bool {
        let id = UserId(profile.id);
        if let Some(&idx) = self.seen.get(&id) {
            self.upgrade(idx, source);
            return false;
        }

        self.seen.insert(id, self.users.len());
        self.users.push(record_from(profile, source));
        self.counters.users_found = self.users.len() as u64;
        true
    }

    fn observe_known(&mut self, id: UserId, source: Provenance) -> bool {
        match self.seen.get(&id) {
            Some(&idx) => {
                self.upgrade(idx, source);
                true
            }
            None => false,
        }
    }

    fn upgrade(&mut self, idx: usize, source: Provenance) {
        if self.method != ParseMethod::Both {
            return;
        }
        let rec = &mut self.users[idx];
        if rec.provenance != source {
            rec.provenance = Provenance::Both;
        }
    }

    fn found(&self) -> u64 {
        self.users.len() as u64
    }
}

fn record_from(p: &UserProfile, source: Provenance) -> UserRecord {
    UserRecord {
        id: UserId(p.id),
        display_name: UserRecord::display_name_of(&p.first_name, &p.last_name),
        first_name: p.first_name.trim().to_string(),
        last_name: p.last_name.trim().to_string(),
        handle: p
            .username
            .as_deref()
            .map(|u| u.trim().trim_start_matches('@').to_string())
            .filter(|u| !u.is_empty()),
        phone: p
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        provenance: source,
    }
}

pub struct AggregationEngine {
    cfg: EngineConfig,
}

impl AggregationEngine {
    pub fn new(mut cfg: EngineConfig) -> Self {
        cfg.members_progress_every = cfg.members_progress_every.max(1);
        cfg.messages_progress_every = cfg.messages_progress_every.max(1);
        Self { cfg }
    }

    /// Run the requested sources against `chat`, reporting progress on `emitter`.
    ///
    /// The final `complete` frame is left to the caller so it can persist the
    /// result first.
    pub async fn run(
        &self,
        client: &dyn PlatformClient,
        conversation_id: ChatId,
        chat: &Entity,
        method: ParseMethod,
        emitter: &ProgressEmitter,
    ) -> Result<AggregationResult> {
        info!(conversation = %conversation_id, ?method, "parse started");
        let mut st = RunState::new(method);

        if method.includes_members() {
            match self.members(client, chat, &mut st, emitter).await {
                Ok(()) => {}
                Err(Error::Permission(e)) if method == ParseMethod::Both => {
                    warn!(conversation = %conversation_id, error = %e, "members source unavailable");
                    st.counters.members_error = Some(e.to_string());
                    emitter
                        .emit(ProgressFrame::Warning {
                            source: SourceKind::Members,
                            message: e.to_string(),
                        })
                        .await?;
                }
                Err(e) => return Err(e),
            }
        }

        if method.includes_messages() {
            self.messages(client, chat, &mut st, emitter).await?;
        }

        info!(
            conversation = %conversation_id,
            users = st.users.len(),
            members_seen = st.counters.members_seen,
            messages = st.counters.messages_processed,
            skipped = st.counters.senders_skipped,
            "parse finished"
        );

        Ok(AggregationResult {
            conversation_id,
            method,
            users: st.users,
            counters: st.counters,
        })
    }

    async fn members(
        &self,
        client: &dyn PlatformClient,
        chat: &Entity,
        st: &mut RunState,
        emitter: &ProgressEmitter,
    ) -> Result<()> {
        emitter.emit(ProgressFrame::ParsingMembers).await?;

        let mut it = ParticipantIter::new(chat.clone(), self.cfg.participants_page_size);
        let mut added: u64 = 0;
        while let Some(p) = it.next(client).await? {
            st.counters.members_seen += 1;
            if p.is_individual() && st.observe(&p, Provenance::Members) {
                added += 1;
            }

            emitter.checkpoint()?;
            if st.counters.members_seen % self.cfg.members_progress_every == 0 {
                emitter
                    .emit(ProgressFrame::members_progress(st.counters.members_seen))
                    .await?;
            }
        }

        emitter.emit(ProgressFrame::MembersDone { count: added }).await
    }

    async fn messages(
        &self,
        client: &dyn PlatformClient,
        chat: &Entity,
        st: &mut RunState,
        emitter: &ProgressEmitter,
    ) -> Result<()> {
        emitter.emit(ProgressFrame::ParsingMessages).await?;

        let mut it = HistoryIter::new(chat.clone(), self.cfg.messages_page_size);
        while let Some(msg) = it.next(client).await? {
            st.counters.messages_processed += 1;
            self.sender_of(client, chat, &msg, st).await?;

            emitter.checkpoint()?;
            if st.counters.messages_processed % self.cfg.messages_progress_every == 0 {
                emitter
                    .emit(ProgressFrame::messages_progress(
                        st.counters.messages_processed,
                        st.found(),
                    ))
                    .await?;
            }
        }

        emitter
            .emit(ProgressFrame::MessagesDone {
                processed: st.counters.messages_processed,
                found: st.found(),
            })
            .await
    }

    async fn sender_of(
        &self,
        client: &dyn PlatformClient,
        chat: &Entity,
        msg: &HistoryMessage,
        st: &mut RunState,
    ) -> Result<()> {
        // Channel posts and anonymous admins are never individual users.
        let Some(peer @ PeerId::User(id)) = msg.sender else {
            return Ok(());
        };
        if st.observe_known(UserId(id), Provenance::Messages) || st.ignored.contains(&peer) {
            return Ok(());
        }

        match client.resolve_sender(chat, msg).await {
            Ok(Some(Entity::User(p))) if p.is_individual() => {
                st.observe(&p, Provenance::Messages);
            }
            Ok(_) => {
                st.ignored.insert(peer);
            }
            Err(PlatformError::Transient(reason)) => {
                st.counters.senders_skipped += 1;
                debug!(message_id = msg.id, %reason, "sender lookup skipped");
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }
}
