// The authoritative session store.
//
// One tokio mutex per session serializes all mutation (single writer);
// different sessions are fully independent. Every applied mutation is
// persisted as a snapshot and announced on the event channel with the new
// sequence number, so any transport can wake waiting clients.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{info, warn};

use crate::bot::engine::{self, WeightOverrides};
use crate::cards::CardPool;
use crate::db::Database;
use crate::draft::deckbuild;
use crate::draft::format::FormatDefinition;
use crate::draft::pack::{check_format, generate};
use crate::draft::rng::SessionRng;
use crate::draft::session::{DrafterState, DraftSession, PackInstance, SelectionKind};
use crate::draft::DraftError;

/// Event published whenever a session's sequence number advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionEvent {
    pub session: String,
    pub sequence: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum EventKind {
    SessionCreated,
    SeatAssigned { seat: usize },
    SelectionMade { seat: usize },
    DraftFinished,
    DeckFinalized { seat: usize },
}

/// What a `try_bot_picks` poll accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BotPickStatus {
    /// The draft continues; `picks_applied` bot selections were made.
    InProgress { picks_applied: usize },
    /// Every pack is spent and the session is finished.
    Done,
}

pub struct SessionStore {
    pool: Arc<CardPool>,
    db: Arc<Database>,
    overrides: WeightOverrides,
    mainboard_size: usize,
    next_id: AtomicU64,
    sessions: RwLock<HashMap<String, Arc<Mutex<DraftSession>>>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    pub fn new(
        pool: Arc<CardPool>,
        db: Arc<Database>,
        overrides: WeightOverrides,
        mainboard_size: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        SessionStore {
            pool,
            db,
            overrides,
            mainboard_size,
            next_id: AtomicU64::new(1),
            sessions: RwLock::new(HashMap::new()),
            events,
        }
    }

    pub fn pool(&self) -> &CardPool {
        &self.pool
    }

    /// Subscribe to sequence-tagged session events. Any transport can sit
    /// on this: WebSocket push, SSE, a polling bridge.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn emit(&self, session: &str, sequence: u64, kind: EventKind) {
        // No subscribers is fine; events are advisory.
        let _ = self.events.send(SessionEvent {
            session: session.to_string(),
            sequence,
            kind,
        });
    }

    /// Best-effort persistence: the in-memory session is authoritative, and
    /// a failed snapshot write is retried on the next mutation.
    fn persist(&self, session: &DraftSession) {
        if let Err(e) = self.db.save_session(&session.snapshot()) {
            warn!(session = %session.id, error = %e, "failed to persist session snapshot");
        }
    }

    async fn session(&self, id: &str) -> Result<Arc<Mutex<DraftSession>>, DraftError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| DraftError::UnknownSession { id: id.to_string() })
    }

    pub async fn active_sessions(&self) -> Vec<String> {
        self.sessions.read().await.keys().cloned().collect()
    }

    // -- operations --------------------------------------------------------

    /// Validate the format against the pool, generate packs, and open the
    /// session. A filter that matches nothing fails here, before any seat
    /// exists. `seed` defaults to the current time; pass one for
    /// reproducible drafts.
    pub async fn create_session(
        &self,
        format: FormatDefinition,
        seat_count: usize,
        host: &str,
        seed: Option<u64>,
    ) -> Result<String, DraftError> {
        if seat_count < 2 {
            return Err(DraftError::InvalidSeatCount { seats: seat_count });
        }
        check_format(&format, &self.pool)?;

        let seed = seed.unwrap_or_else(|| chrono::Utc::now().timestamp_millis() as u64);
        let mut rng = SessionRng::from_seed(seed);
        let packs = generate(&self.pool, &format, seat_count, &mut rng)?;

        let id = format!("draft-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
        let session = DraftSession::new(
            id.clone(),
            host.to_string(),
            format,
            packs,
            seat_count,
            rng,
        );
        let sequence = session.sequence;
        self.persist(&session);
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(session)));

        info!(session = %id, seats = seat_count, host, seed, "session created");
        self.emit(&id, sequence, EventKind::SessionCreated);
        Ok(id)
    }

    pub async fn assign_seat(&self, id: &str, name: &str) -> Result<usize, DraftError> {
        let session = self.session(id).await?;
        let mut session = session.lock().await;
        let seat = session.assign_seat(name)?;
        self.persist(&session);
        self.emit(id, session.sequence, EventKind::SeatAssigned { seat });
        Ok(seat)
    }

    /// Idempotent read of a seat's current pack and derived state.
    pub async fn get_current_pack(
        &self,
        id: &str,
        seat: usize,
    ) -> Result<(PackInstance, DrafterState), DraftError> {
        let session = self.session(id).await?;
        let session = session.lock().await;
        if seat >= session.seat_count() {
            return Err(DraftError::UnknownSeat { seat });
        }
        let state = session.drafter_state(seat);
        Ok((state.cards_in_pack.clone(), state))
    }

    pub async fn submit_pick(
        &self,
        id: &str,
        seat: usize,
        index: usize,
        sequence: u64,
    ) -> Result<DrafterState, DraftError> {
        self.submit(id, seat, index, sequence, SelectionKind::Pick)
            .await
    }

    pub async fn submit_trash(
        &self,
        id: &str,
        seat: usize,
        index: usize,
        sequence: u64,
    ) -> Result<DrafterState, DraftError> {
        self.submit(id, seat, index, sequence, SelectionKind::Trash)
            .await
    }

    async fn submit(
        &self,
        id: &str,
        seat: usize,
        index: usize,
        sequence: u64,
        kind: SelectionKind,
    ) -> Result<DrafterState, DraftError> {
        let session = self.session(id).await?;
        let mut session = session.lock().await;
        let state = match kind {
            SelectionKind::Pick => session.submit_pick(seat, index, sequence)?,
            SelectionKind::Trash => session.submit_trash(seat, index, sequence)?,
        };
        self.persist(&session);
        self.emit(id, session.sequence, EventKind::SelectionMade { seat });
        if session.finished {
            self.emit(id, session.sequence, EventKind::DraftFinished);
        }
        Ok(state)
    }

    /// Make one pass over all bot seats that are due, applying each bot's
    /// choice through the same submission path humans use. Evaluation
    /// errors are logged and retried on the next poll tick.
    pub async fn try_bot_picks(&self, id: &str) -> Result<BotPickStatus, DraftError> {
        let session = self.session(id).await?;
        let mut session = session.lock().await;
        if session.finished {
            return Ok(BotPickStatus::Done);
        }

        let mut picks_applied = 0usize;
        for seat in 0..session.seat_count() {
            if !session.bot_seat_due(seat) {
                continue;
            }
            let drafter = session.drafter_state(seat);
            let Some(action) = drafter.step else { continue };

            let evaluation = engine::evaluate(&self.pool, &drafter, &self.overrides);
            let Some(choice) = engine::select(&evaluation, action, session.rng_mut()) else {
                continue;
            };

            let sequence = session.sequence;
            let result = if action.is_pick() {
                session.submit_pick(seat, choice, sequence)
            } else {
                session.submit_trash(seat, choice, sequence)
            };
            match result {
                Ok(_) => {
                    picks_applied += 1;
                    self.emit(id, session.sequence, EventKind::SelectionMade { seat });
                }
                Err(e) => {
                    warn!(session = %id, seat, error = %e, "bot selection rejected; will retry");
                }
            }
        }

        // Normally apply_selection advances the round itself; this covers a
        // session restored in a state where the round was already spent.
        if !session.finished && session.round_done() {
            session.open_next_round();
        }

        if picks_applied > 0 {
            self.persist(&session);
        }
        if session.finished {
            self.persist(&session);
            self.emit(id, session.sequence, EventKind::DraftFinished);
            return Ok(BotPickStatus::Done);
        }
        Ok(BotPickStatus::InProgress { picks_applied })
    }

    /// Build and persist the seat's deck. Only valid once the draft has
    /// finished. When every seat has finalized, the session is archived and
    /// dropped from the active map.
    pub async fn finalize_deck(&self, id: &str, seat: usize) -> Result<i64, DraftError> {
        let session_arc = self.session(id).await?;
        let mut session = session_arc.lock().await;
        if !session.finished {
            return Err(DraftError::DraftInProgress);
        }
        if seat >= session.seat_count() {
            return Err(DraftError::UnknownSeat { seat });
        }

        let deck = deckbuild::partition(
            &self.pool,
            &session.seats[seat].pick_log,
            self.mainboard_size,
        );
        let player = session.seats[seat].name.clone();
        let deck_id = self
            .db
            .save_deck(id, seat, &player, &deck)
            .map_err(|e| DraftError::Persistence(e.to_string()))?;

        session.seats[seat].deck_finalized = true;
        session.sequence += 1;
        self.persist(&session);
        self.emit(id, session.sequence, EventKind::DeckFinalized { seat });

        let all_done = session.seats.iter().all(|s| s.deck_finalized);
        drop(session);
        if all_done {
            self.sessions.write().await.remove(id);
            info!(session = %id, "all decks finalized; session archived");
        }
        Ok(deck_id)
    }

    /// Reload every unfinished session from the database, for crash
    /// recovery at startup. Returns how many sessions were restored.
    pub async fn restore_from_db(&self) -> anyhow::Result<usize> {
        let snapshots = self.db.load_unfinished_sessions()?;
        let mut restored = 0;
        let mut max_id = 0u64;
        let mut sessions = self.sessions.write().await;
        for snapshot in snapshots {
            if let Some(n) = snapshot
                .id
                .strip_prefix("draft-")
                .and_then(|n| n.parse::<u64>().ok())
            {
                max_id = max_id.max(n);
            }
            let id = snapshot.id.clone();
            sessions.insert(
                id,
                Arc::new(Mutex::new(DraftSession::from_snapshot(snapshot))),
            );
            restored += 1;
        }
        drop(sessions);

        // Keep new ids unique past everything restored.
        let floor = max_id + 1;
        self.next_id.fetch_max(floor, Ordering::Relaxed);
        if restored > 0 {
            info!(restored, "sessions restored from database");
        }
        Ok(restored)
    }
}
