// Server orchestration: request dispatch, event fan-out, bot polling.
//
// The store owns the authoritative state; this layer turns wire requests
// into store calls, forwards sequence-tagged events to subscribers, and
// runs the per-session bot loop with its idle backoff.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::draft::format::FormatDefinition;
use crate::draft::store::{BotPickStatus, SessionEvent, SessionStore};
use crate::draft::DraftError;
use crate::protocol::{ClientRequest, ServerResponse};

/// Sessions one connection wants push events for.
pub type Subscriptions = Arc<RwLock<HashSet<String>>>;

pub struct Server {
    pub config: Config,
    pub store: Arc<SessionStore>,
}

impl Server {
    pub fn new(config: Config, store: Arc<SessionStore>) -> Self {
        Server { config, store }
    }

    /// Parse one wire message and dispatch it. Never fails: malformed input
    /// becomes an error response.
    pub async fn handle_message(
        &self,
        text: &str,
        subscriptions: &Subscriptions,
    ) -> ServerResponse {
        match serde_json::from_str::<ClientRequest>(text) {
            Ok(request) => self.handle_request(request, subscriptions).await,
            Err(e) => {
                debug!(error = %e, "unparseable client request");
                ServerResponse::bad_request(format!("invalid request: {e}"))
            }
        }
    }

    /// `handle_message`, serialized for transports that speak raw text.
    pub async fn handle_text(
        &self,
        text: &str,
        subscriptions: &Subscriptions,
    ) -> String {
        let response = self.handle_message(text, subscriptions).await;
        serde_json::to_string(&response).unwrap_or_else(|e| {
            warn!(error = %e, "failed to serialize response");
            r#"{"type":"error","code":"internal","message":"serialization failure"}"#.to_string()
        })
    }

    pub async fn handle_request(
        &self,
        request: ClientRequest,
        subscriptions: &Subscriptions,
    ) -> ServerResponse {
        match request {
            ClientRequest::CreateSession {
                seats,
                name,
                format,
                packs,
                cards,
                seed,
            } => {
                let format = format.unwrap_or_else(|| {
                    FormatDefinition::standard(
                        packs.unwrap_or(self.config.draft.default_packs),
                        cards.unwrap_or(self.config.draft.default_cards),
                    )
                });
                match self.store.create_session(format, seats, &name, seed).await {
                    Ok(session) => {
                        subscriptions.write().await.insert(session.clone());
                        self.spawn_bot_loop(session.clone());
                        ServerResponse::SessionCreated { session }
                    }
                    Err(e) => ServerResponse::from_error(&e),
                }
            }
            ClientRequest::AssignSeat { session, name } => {
                match self.store.assign_seat(&session, &name).await {
                    Ok(seat) => ServerResponse::SeatAssigned { session, seat },
                    Err(e) => ServerResponse::from_error(&e),
                }
            }
            ClientRequest::Subscribe { session } => {
                subscriptions.write().await.insert(session.clone());
                ServerResponse::Subscribed { session }
            }
            ClientRequest::GetCurrentPack { session, seat } => {
                match self.store.get_current_pack(&session, seat).await {
                    Ok((pack, state)) => ServerResponse::CurrentPack { pack, state },
                    Err(e) => ServerResponse::from_error(&e),
                }
            }
            ClientRequest::SubmitPick {
                session,
                seat,
                index,
                sequence,
            } => match self.store.submit_pick(&session, seat, index, sequence).await {
                Ok(state) => ServerResponse::Submitted { state },
                Err(e) => ServerResponse::from_error(&e),
            },
            ClientRequest::SubmitTrash {
                session,
                seat,
                index,
                sequence,
            } => match self
                .store
                .submit_trash(&session, seat, index, sequence)
                .await
            {
                Ok(state) => ServerResponse::Submitted { state },
                Err(e) => ServerResponse::from_error(&e),
            },
            ClientRequest::TryBotPicks { session } => {
                match self.store.try_bot_picks(&session).await {
                    Ok(status) => ServerResponse::BotPicks { status },
                    Err(e) => ServerResponse::from_error(&e),
                }
            }
            ClientRequest::FinalizeDeck { session, seat } => {
                match self.store.finalize_deck(&session, seat).await {
                    Ok(deck) => ServerResponse::DeckFinalized { deck },
                    Err(e) => ServerResponse::from_error(&e),
                }
            }
        }
    }

    /// Start the polling loop that keeps a session's bot seats picking.
    pub fn spawn_bot_loop(&self, session: String) -> JoinHandle<()> {
        let store = self.store.clone();
        let poll = self.config.poll_interval();
        let idle = self.config.idle_interval();
        tokio::spawn(bot_loop(store, session, poll, idle))
    }
}

/// Poll `try_bot_picks` until the session finishes. A tick that applied
/// picks polls again quickly; an idle tick backs off. Errors are logged and
/// retried on the next tick rather than killing the loop.
pub async fn bot_loop(
    store: Arc<SessionStore>,
    session: String,
    poll: Duration,
    idle: Duration,
) {
    info!(session = %session, "bot loop started");
    loop {
        match store.try_bot_picks(&session).await {
            Ok(BotPickStatus::Done) => {
                info!(session = %session, "bot loop finished");
                break;
            }
            Ok(BotPickStatus::InProgress { picks_applied }) => {
                let wait = if picks_applied > 0 { poll } else { idle };
                tokio::time::sleep(wait).await;
            }
            Err(DraftError::UnknownSession { .. }) => {
                // Archived out from under us; nothing left to do.
                break;
            }
            Err(e) => {
                warn!(session = %session, error = %e, "bot tick failed; retrying");
                tokio::time::sleep(idle).await;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Subscriber contract
// ---------------------------------------------------------------------------

/// Anything that can receive push events: a WebSocket writer, an SSE
/// stream, a polling bridge, a test probe.
#[async_trait]
pub trait Subscriber: Send + Sync {
    /// Deliver one event. Return false to drop the subscription.
    async fn notify(&self, event: &SessionEvent) -> bool;
}

/// Subscriber that forwards events into an outgoing message channel.
pub struct ChannelSubscriber {
    tx: mpsc::Sender<ServerResponse>,
}

impl ChannelSubscriber {
    pub fn new(tx: mpsc::Sender<ServerResponse>) -> Self {
        ChannelSubscriber { tx }
    }
}

#[async_trait]
impl Subscriber for ChannelSubscriber {
    async fn notify(&self, event: &SessionEvent) -> bool {
        self.tx
            .send(ServerResponse::Event {
                event: event.clone(),
            })
            .await
            .is_ok()
    }
}

/// Forward store events matching the connection's subscriptions until the
/// subscriber goes away. Lagged receivers skip ahead; clients resynchronize
/// from the sequence number on the next event.
pub async fn pump_events(
    mut events: broadcast::Receiver<SessionEvent>,
    subscriptions: Subscriptions,
    subscriber: impl Subscriber,
) {
    loop {
        match events.recv().await {
            Ok(event) => {
                if subscriptions.read().await.contains(&event.session)
                    && !subscriber.notify(&event).await
                {
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "event receiver lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
