// WebSocket transport for the synchronization layer.
//
// One connection serves one client: requests come in as JSON text frames,
// responses go back on the same socket, and push events for subscribed
// sessions are interleaved by a pump task. The message-processing core is
// generic over the stream type so it can be tested on in-memory streams.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::Stream;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::app::{pump_events, ChannelSubscriber, Server, Subscriptions};
use crate::protocol::ServerResponse;

/// Bind the listener on localhost.
pub async fn bind(port: u16) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(format!("127.0.0.1:{port}")).await?;
    info!("WebSocket server listening on {}", listener.local_addr()?);
    Ok(listener)
}

/// Accept connections forever, one task per client.
pub async fn run(listener: TcpListener, server: Arc<Server>) -> anyhow::Result<()> {
    loop {
        let (stream, addr) = listener.accept().await?;
        let server = server.clone();
        tokio::spawn(async move {
            match tokio_tungstenite::accept_async(stream).await {
                Ok(ws) => handle_connection(ws, server, addr.to_string()).await,
                Err(e) => warn!("WebSocket handshake failed for {addr}: {e}"),
            }
        });
    }
}

async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<TcpStream>,
    server: Arc<Server>,
    addr: String,
) {
    info!("client connected: {addr}");
    let (mut write, read) = ws.split();
    let subscriptions: Subscriptions = Arc::new(RwLock::new(HashSet::new()));

    // All outgoing traffic (responses and pushed events) funnels through one
    // channel so the socket has a single writer.
    let (out_tx, mut out_rx) = mpsc::channel::<ServerResponse>(64);

    let pump = tokio::spawn(pump_events(
        server.store.subscribe(),
        subscriptions.clone(),
        ChannelSubscriber::new(out_tx.clone()),
    ));

    let writer = tokio::spawn(async move {
        while let Some(response) = out_rx.recv().await {
            let text = match serde_json::to_string(&response) {
                Ok(text) => text,
                Err(e) => {
                    warn!("failed to serialize outgoing message: {e}");
                    continue;
                }
            };
            if write.send(Message::text(text)).await.is_err() {
                break;
            }
        }
    });

    let _ = process_message_stream(read, &server, &subscriptions, &out_tx, &addr).await;

    pump.abort();
    drop(out_tx);
    let _ = writer.await;
    info!("client disconnected: {addr}");
}

/// Read messages from any WebSocket stream, dispatch text frames, and queue
/// responses. Returns `Err(())` when the outgoing channel is gone.
pub async fn process_message_stream<St>(
    mut stream: St,
    server: &Arc<Server>,
    subscriptions: &Subscriptions,
    tx: &mpsc::Sender<ServerResponse>,
    addr: &str,
) -> Result<(), ()>
where
    St: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(message) = stream.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let response = server.handle_message(&text, subscriptions).await;
                if tx.send(response).await.is_err() {
                    return Err(());
                }
            }
            Ok(Message::Close(_)) => {
                info!("client {addr} sent close frame");
                break;
            }
            Err(e) => {
                warn!("WebSocket error from {addr}: {e}");
                break;
            }
            _ => {
                // Ignore Binary, Ping, Pong, Frame variants.
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::engine::WeightOverrides;
    use crate::cards::{CardPool, CardRecord, ColorSet, Rarity};
    use crate::config::Config;
    use crate::db::Database;
    use crate::draft::store::SessionStore;
    use futures_util::stream;
    use tokio_tungstenite::tungstenite::Error as WsError;

    fn make_server() -> Arc<Server> {
        let pool = Arc::new(
            CardPool::new(
                (0..30)
                    .map(|i| CardRecord {
                        name: format!("Card {i}"),
                        type_line: "Creature - Test".into(),
                        mana_value: (i % 8) as u32,
                        colors: ColorSet::parse("W").unwrap(),
                        rarity: Rarity::Common,
                        tags: Vec::new(),
                        elo: 1200.0,
                        embedding: Vec::new(),
                    })
                    .collect(),
            )
            .unwrap(),
        );
        let db = Arc::new(Database::open(":memory:").unwrap());
        let store = Arc::new(SessionStore::new(pool, db, WeightOverrides::default(), 40));
        Arc::new(Server::new(Config::default(), store))
    }

    fn subs() -> Subscriptions {
        Arc::new(RwLock::new(HashSet::new()))
    }

    fn mock_stream(
        messages: Vec<Result<Message, WsError>>,
    ) -> impl Stream<Item = Result<Message, WsError>> + Unpin {
        stream::iter(messages)
    }

    #[tokio::test]
    async fn text_request_produces_response() {
        let server = make_server();
        let (tx, mut rx) = mpsc::channel(16);
        let messages = vec![Ok(Message::text(
            r#"{"type":"get_current_pack","session":"nope","seat":0}"#,
        ))];

        process_message_stream(mock_stream(messages), &server, &subs(), &tx, "test")
            .await
            .unwrap();

        let response = rx.recv().await.unwrap();
        assert!(matches!(
            response,
            ServerResponse::Error {
                code: crate::protocol::ErrorCode::UnknownSession,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn invalid_json_produces_bad_request() {
        let server = make_server();
        let (tx, mut rx) = mpsc::channel(16);
        let messages = vec![Ok(Message::text("{{{{"))];

        process_message_stream(mock_stream(messages), &server, &subs(), &tx, "test")
            .await
            .unwrap();

        let response = rx.recv().await.unwrap();
        assert!(matches!(
            response,
            ServerResponse::Error {
                code: crate::protocol::ErrorCode::BadRequest,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn close_frame_stops_processing() {
        let server = make_server();
        let (tx, mut rx) = mpsc::channel(16);
        let messages = vec![
            Ok(Message::text(r#"{"type":"subscribe","session":"draft-9"}"#)),
            Ok(Message::Close(None)),
            Ok(Message::text(
                r#"{"type":"get_current_pack","session":"draft-9","seat":0}"#,
            )),
        ];

        process_message_stream(mock_stream(messages), &server, &subs(), &tx, "test")
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerResponse::Subscribed { .. }
        ));
        assert!(rx.try_recv().is_err(), "nothing after the close frame");
    }

    #[tokio::test]
    async fn stream_error_stops_processing() {
        let server = make_server();
        let (tx, mut rx) = mpsc::channel(16);
        let messages = vec![
            Err(WsError::ConnectionClosed),
            Ok(Message::text(r#"{"type":"subscribe","session":"x"}"#)),
        ];

        process_message_stream(mock_stream(messages), &server, &subs(), &tx, "test")
            .await
            .unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn binary_and_ping_ignored() {
        let server = make_server();
        let (tx, mut rx) = mpsc::channel(16);
        let messages = vec![
            Ok(Message::Binary(vec![1, 2, 3].into())),
            Ok(Message::Ping(vec![].into())),
            Ok(Message::text(r#"{"type":"subscribe","session":"x"}"#)),
        ];

        process_message_stream(mock_stream(messages), &server, &subs(), &tx, "test")
            .await
            .unwrap();

        assert!(matches!(
            rx.recv().await.unwrap(),
            ServerResponse::Subscribed { .. }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_channel_returns_err() {
        let server = make_server();
        let (tx, rx) = mpsc::channel(16);
        drop(rx);
        let messages = vec![Ok(Message::text(r#"{"type":"subscribe","session":"x"}"#))];

        let result =
            process_message_stream(mock_stream(messages), &server, &subs(), &tx, "test").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn full_draft_flow_over_the_wire() {
        let server = make_server();
        let subscriptions = subs();
        let (tx, mut rx) = mpsc::channel(64);

        let create = r#"{"type":"create_session","seats":2,"name":"host","packs":1,"cards":2,"seed":3}"#;
        process_message_stream(
            mock_stream(vec![Ok(Message::text(create))]),
            &server,
            &subscriptions,
            &tx,
            "test",
        )
        .await
        .unwrap();

        let session = match rx.recv().await.unwrap() {
            ServerResponse::SessionCreated { session } => session,
            other => panic!("unexpected response {other:?}"),
        };
        assert!(subscriptions.read().await.contains(&session));

        let get = format!(r#"{{"type":"get_current_pack","session":"{session}","seat":0}}"#);
        process_message_stream(
            mock_stream(vec![Ok(Message::text(get))]),
            &server,
            &subscriptions,
            &tx,
            "test",
        )
        .await
        .unwrap();
        match rx.recv().await.unwrap() {
            ServerResponse::CurrentPack { pack, state } => {
                assert_eq!(pack.len(), 2);
                assert_eq!(state.seat, 0);
            }
            other => panic!("unexpected response {other:?}"),
        }
    }
}
