// End-to-end draft scenarios.
//
// These tests exercise the full system through the library's public API:
// session creation, pack rotation, bot-driven picks, the synchronization
// protocol, and deck finalization.

use std::collections::HashSet;
use std::sync::Arc;

use packrat::app::{Server, Subscriptions};
use packrat::bot::engine::{self, WeightOverrides};
use packrat::cards::{CardPool, CardRecord, ColorSet, Rarity};
use packrat::config::Config;
use packrat::db::Database;
use packrat::draft::format::{FormatDefinition, PackSpec, Step, StepAction};
use packrat::draft::pack::generate;
use packrat::draft::rng::SessionRng;
use packrat::draft::store::{BotPickStatus, SessionStore};
use packrat::draft::DraftError;
use packrat::protocol::{ClientRequest, ServerResponse};

use tokio::sync::RwLock;

// ===========================================================================
// Test helpers
// ===========================================================================

const COLOR_CYCLE: [&str; 5] = ["W", "U", "B", "R", "G"];

/// A pool with rotating colors, a spread of mana values, and mild elo
/// variance, large enough for an 8-seat, 3x15 draft.
fn big_pool(size: usize) -> Arc<CardPool> {
    Arc::new(
        CardPool::new(
            (0..size)
                .map(|i| {
                    let type_line = if i % 3 == 0 {
                        "Creature - Soldier".to_string()
                    } else {
                        "Instant".to_string()
                    };
                    CardRecord {
                        name: format!("Card {i}"),
                        type_line,
                        mana_value: (i % 8) as u32,
                        colors: ColorSet::parse(COLOR_CYCLE[i % 5]).unwrap(),
                        rarity: if i % 16 == 0 {
                            Rarity::Rare
                        } else {
                            Rarity::Common
                        },
                        tags: Vec::new(),
                        elo: 1100.0 + ((i * 37) % 400) as f64,
                        embedding: Vec::new(),
                    }
                })
                .collect(),
        )
        .unwrap(),
    )
}

fn make_store(pool: Arc<CardPool>) -> Arc<SessionStore> {
    Arc::new(SessionStore::new(
        pool,
        Arc::new(Database::open(":memory:").unwrap()),
        WeightOverrides::default(),
        40,
    ))
}

/// Drive a draft to completion: the human host picks its first card
/// whenever due, and the bot pass runs after every human action.
async fn run_draft(store: &SessionStore, id: &str) {
    let mut guard = 0;
    loop {
        let (pack, state) = store.get_current_pack(id, 0).await.unwrap();
        if state.step.is_some_and(|a| a.is_selection()) && !pack.is_empty() {
            store.submit_pick(id, 0, 0, state.sequence).await.unwrap();
        }
        match store.try_bot_picks(id).await.unwrap() {
            BotPickStatus::Done => break,
            BotPickStatus::InProgress { .. } => {}
        }
        guard += 1;
        assert!(guard < 2000, "draft did not complete");
    }
}

// ===========================================================================
// Scenario: the standard 8-seat draft
// ===========================================================================

#[tokio::test]
async fn eight_seat_standard_draft_completes_with_360_picks() {
    let store = make_store(big_pool(400));
    let id = store
        .create_session(FormatDefinition::standard(3, 15), 8, "host", Some(99))
        .await
        .unwrap();

    run_draft(&store, &id).await;

    let mut total_picks = 0;
    for seat in 0..8 {
        let (_, state) = store.get_current_pack(&id, seat).await.unwrap();
        assert!(state.finished);
        assert_eq!(
            state.picked.len(),
            45,
            "seat {seat} should pick 45 cards, got {}",
            state.picked.len()
        );
        assert!(state.trashed.is_empty());
        total_picks += state.picked.len();
    }
    assert_eq!(total_picks, 360);
}

#[tokio::test]
async fn no_card_is_lost_or_duplicated_across_the_draft() {
    let store = make_store(big_pool(200));
    let id = store
        .create_session(FormatDefinition::standard(3, 8), 4, "host", Some(5))
        .await
        .unwrap();

    run_draft(&store, &id).await;

    let mut seen = HashSet::new();
    let mut count = 0;
    for seat in 0..4 {
        let (_, state) = store.get_current_pack(&id, seat).await.unwrap();
        for &card in state.picked.iter().chain(state.trashed.iter()) {
            assert!(seen.insert(card), "card {card} appears twice");
            count += 1;
        }
    }
    assert_eq!(count, 3 * 8 * 4, "every dealt card must end in some log");
}

// ===========================================================================
// Determinism
// ===========================================================================

#[tokio::test]
async fn same_seed_reproduces_the_same_draft() {
    let pool = big_pool(200);

    let mut pick_logs = Vec::new();
    for _ in 0..2 {
        let store = make_store(pool.clone());
        let id = store
            .create_session(FormatDefinition::standard(2, 6), 4, "host", Some(1234))
            .await
            .unwrap();
        run_draft(&store, &id).await;

        let mut logs = Vec::new();
        for seat in 0..4 {
            let (_, state) = store.get_current_pack(&id, seat).await.unwrap();
            logs.push(state.picked.clone());
        }
        pick_logs.push(logs);
    }

    assert_eq!(
        pick_logs[0], pick_logs[1],
        "a fixed seed must reproduce every pick, bot picks included"
    );
}

// ===========================================================================
// Scenario: random selection uniformity
// ===========================================================================

#[test]
fn single_slot_generation_is_uniform_over_the_pool() {
    let pool = CardPool::new(
        (0..5)
            .map(|i| CardRecord {
                name: format!("Card {i}"),
                type_line: "Instant".into(),
                mana_value: 2,
                colors: ColorSet::parse("U").unwrap(),
                rarity: Rarity::Common,
                tags: Vec::new(),
                elo: 1200.0,
                embedding: Vec::new(),
            })
            .collect(),
    )
    .unwrap();

    let format = FormatDefinition {
        title: String::new(),
        packs: vec![PackSpec {
            slots: vec!["*".into()],
            steps: Some(vec![Step {
                action: StepAction::PickRandom,
                amount: Some(1),
            }]),
        }],
        multiples: false,
    };

    let mut counts = [0usize; 5];
    for trial in 0..10_000u64 {
        let mut rng = SessionRng::from_seed(trial);
        let packs = generate(&pool, &format, 1, &mut rng).unwrap();
        counts[packs.rows[0][0][0]] += 1;
    }

    // Expected 2000 per card; 20% tolerance.
    for (card, &count) in counts.iter().enumerate() {
        assert!(
            (1600..=2400).contains(&count),
            "card {card} chosen {count} times, outside tolerance"
        );
    }
}

#[test]
fn random_step_selection_is_uniform_within_a_pack() {
    let pool = big_pool(10);
    let drafter = packrat::draft::session::DrafterState {
        seat: 0,
        cards_in_pack: vec![0, 1, 2, 3, 4],
        picked: Vec::new(),
        trashed: Vec::new(),
        seen: Vec::new(),
        pack_num: 0,
        pick_num: 1,
        num_packs: 1,
        pack_size: 5,
        step: Some(StepAction::PickRandom),
        step_amount: 1,
        title: String::new(),
        sequence: 0,
        finished: false,
    };
    let evaluation = engine::evaluate(&pool, &drafter, &WeightOverrides::default());

    let mut rng = SessionRng::from_seed(77);
    let mut counts = [0usize; 5];
    for _ in 0..10_000 {
        let choice = engine::select(&evaluation, StepAction::PickRandom, &mut rng).unwrap();
        counts[choice] += 1;
    }
    for (slot, &count) in counts.iter().enumerate() {
        assert!(
            (1600..=2400).contains(&count),
            "slot {slot} chosen {count} times, outside tolerance"
        );
    }
}

// ===========================================================================
// Scenario: hopeless filters fail at creation
// ===========================================================================

#[tokio::test]
async fn mythic_filter_with_no_mythics_fails_at_creation() {
    let store = make_store(big_pool(60)); // rares and commons only
    let mut format = FormatDefinition::standard(1, 3);
    format.packs[0].slots[2] = "rarity:Mythic".into();

    let err = store
        .create_session(format, 2, "host", Some(1))
        .await
        .unwrap_err();
    match err {
        DraftError::EmptySlotFilter { filter } => assert_eq!(filter, "rarity:Mythic"),
        other => panic!("expected EmptySlotFilter, got {other:?}"),
    }
    assert!(store.active_sessions().await.is_empty());
}

// ===========================================================================
// Trash steps
// ===========================================================================

#[tokio::test]
async fn trash_step_draft_fills_trash_logs() {
    let store = make_store(big_pool(60));
    // Each pack: pick one, pass, trash one, pass, pick one.
    let format = FormatDefinition {
        title: "pick-trash-pick".into(),
        packs: vec![PackSpec {
            slots: vec!["*".into(), "*".into(), "*".into()],
            steps: Some(vec![
                Step::pick(1),
                Step::pass(),
                Step::trash(1),
                Step::pass(),
                Step::pick(1),
            ]),
        }],
        multiples: false,
    };
    let id = store
        .create_session(format, 2, "host", Some(11))
        .await
        .unwrap();

    let mut guard = 0;
    loop {
        let (pack, state) = store.get_current_pack(&id, 0).await.unwrap();
        if !pack.is_empty() {
            match state.step {
                Some(StepAction::Pick) => {
                    store.submit_pick(&id, 0, 0, state.sequence).await.unwrap();
                }
                Some(StepAction::Trash) => {
                    store
                        .submit_trash(&id, 0, 0, state.sequence)
                        .await
                        .unwrap();
                }
                _ => {}
            }
        }
        match store.try_bot_picks(&id).await.unwrap() {
            BotPickStatus::Done => break,
            BotPickStatus::InProgress { .. } => {}
        }
        guard += 1;
        assert!(guard < 100);
    }

    for seat in 0..2 {
        let (_, state) = store.get_current_pack(&id, seat).await.unwrap();
        assert_eq!(state.picked.len(), 2, "seat {seat} picks");
        assert_eq!(state.trashed.len(), 1, "seat {seat} trashes");
    }
}

#[tokio::test]
async fn pick_on_trash_step_is_rejected() {
    let store = make_store(big_pool(60));
    let format = FormatDefinition {
        title: String::new(),
        packs: vec![PackSpec {
            slots: vec!["*".into(), "*".into()],
            steps: Some(vec![Step::trash(1), Step::pass(), Step::pick(1)]),
        }],
        multiples: false,
    };
    let id = store
        .create_session(format, 2, "host", Some(12))
        .await
        .unwrap();

    let (_, state) = store.get_current_pack(&id, 0).await.unwrap();
    assert_eq!(state.step, Some(StepAction::Trash));
    let err = store
        .submit_pick(&id, 0, 0, state.sequence)
        .await
        .unwrap_err();
    assert!(matches!(err, DraftError::NotYourTurn));
}

// ===========================================================================
// Deck finalization
// ===========================================================================

#[tokio::test]
async fn finalized_deck_preserves_the_pick_log() {
    let pool = big_pool(200);
    let db = Arc::new(Database::open(":memory:").unwrap());
    let store = Arc::new(SessionStore::new(
        pool.clone(),
        db.clone(),
        WeightOverrides::default(),
        10,
    ));
    let id = store
        .create_session(FormatDefinition::standard(2, 8), 2, "host", Some(21))
        .await
        .unwrap();
    run_draft(&store, &id).await;

    let (_, state) = store.get_current_pack(&id, 0).await.unwrap();
    assert_eq!(state.picked.len(), 16);

    let deck_id = store.finalize_deck(&id, 0).await.unwrap();
    let row = db.load_deck(deck_id).unwrap().unwrap();

    // 10-card mainboard, the rest sideboarded; nothing lost or duplicated.
    assert_eq!(row.deck.mainboard_count(), 10);
    assert_eq!(row.deck.sideboard_count(), 6);
    let mut flattened = row.deck.flatten();
    flattened.sort_unstable();
    let mut expected = state.picked.clone();
    expected.sort_unstable();
    assert_eq!(flattened, expected);
}

// ===========================================================================
// Protocol flow
// ===========================================================================

fn make_server(pool: Arc<CardPool>) -> Arc<Server> {
    let mut config = Config::default();
    config.bot.poll_interval_ms = 1;
    config.bot.idle_interval_ms = 1;
    Arc::new(Server::new(config, make_store(pool)))
}

fn subscriptions() -> Subscriptions {
    Arc::new(RwLock::new(HashSet::new()))
}

#[tokio::test]
async fn lobby_flow_over_the_protocol() {
    let server = make_server(big_pool(200));
    let subs = subscriptions();

    let response = server
        .handle_request(
            ClientRequest::CreateSession {
                seats: 4,
                name: "host".into(),
                format: None,
                packs: Some(1),
                cards: Some(4),
                seed: Some(31),
            },
            &subs,
        )
        .await;
    let session = match response {
        ServerResponse::SessionCreated { session } => session,
        other => panic!("unexpected response {other:?}"),
    };

    // Two more humans join the lobby; they take the lowest bot seats.
    let response = server
        .handle_request(
            ClientRequest::AssignSeat {
                session: session.clone(),
                name: "alice".into(),
            },
            &subs,
        )
        .await;
    assert!(matches!(
        response,
        ServerResponse::SeatAssigned { seat: 1, .. }
    ));

    let response = server
        .handle_request(
            ClientRequest::AssignSeat {
                session: session.clone(),
                name: "bob".into(),
            },
            &subs,
        )
        .await;
    assert!(matches!(
        response,
        ServerResponse::SeatAssigned { seat: 2, .. }
    ));

    // Reconnecting under the same name lands on the same seat.
    let response = server
        .handle_request(
            ClientRequest::AssignSeat {
                session: session.clone(),
                name: "alice".into(),
            },
            &subs,
        )
        .await;
    assert!(matches!(
        response,
        ServerResponse::SeatAssigned { seat: 1, .. }
    ));
}

#[tokio::test]
async fn rejected_pick_leaves_authoritative_state_untouched() {
    let server = make_server(big_pool(60));
    let subs = subscriptions();
    let response = server
        .handle_request(
            ClientRequest::CreateSession {
                seats: 2,
                name: "host".into(),
                format: None,
                packs: Some(1),
                cards: Some(3),
                seed: Some(41),
            },
            &subs,
        )
        .await;
    let session = match response {
        ServerResponse::SessionCreated { session } => session,
        other => panic!("unexpected response {other:?}"),
    };

    let (pack_before, state) = server
        .store
        .get_current_pack(&session, 0)
        .await
        .unwrap();

    // Out-of-bounds pick: rejected, and a refetch shows the same pack.
    let err = server
        .store
        .submit_pick(&session, 0, 99, state.sequence)
        .await
        .unwrap_err();
    assert!(matches!(err, DraftError::InvalidPickIndex { .. }));

    let (pack_after, _) = server.store.get_current_pack(&session, 0).await.unwrap();
    assert_eq!(pack_before, pack_after);
}

// ===========================================================================
// Reconnect from a snapshot
// ===========================================================================

#[tokio::test]
async fn mid_draft_state_survives_a_restart() {
    let pool = big_pool(200);
    let db = Arc::new(Database::open(":memory:").unwrap());
    let store = Arc::new(SessionStore::new(
        pool.clone(),
        db.clone(),
        WeightOverrides::default(),
        40,
    ));
    let id = store
        .create_session(FormatDefinition::standard(2, 5), 4, "host", Some(51))
        .await
        .unwrap();

    // Progress the draft partway.
    for _ in 0..3 {
        let (pack, state) = store.get_current_pack(&id, 0).await.unwrap();
        if state.step.is_some_and(|a| a.is_selection()) && !pack.is_empty() {
            store.submit_pick(&id, 0, 0, state.sequence).await.unwrap();
        }
        store.try_bot_picks(&id).await.unwrap();
    }
    let mut states_before = Vec::new();
    for seat in 0..4 {
        states_before.push(store.get_current_pack(&id, seat).await.unwrap());
    }

    // Simulate a restart: a new store over the same database.
    let revived = Arc::new(SessionStore::new(
        pool,
        db,
        WeightOverrides::default(),
        40,
    ));
    assert_eq!(revived.restore_from_db().await.unwrap(), 1);

    for (seat, before) in states_before.iter().enumerate() {
        let after = revived.get_current_pack(&id, seat).await.unwrap();
        assert_eq!(*before, after, "seat {seat} state must survive restart");
    }

    // And the revived session still plays to completion.
    run_draft(&revived, &id).await;
    let (_, state) = revived.get_current_pack(&id, 0).await.unwrap();
    assert!(state.finished);
    assert_eq!(state.picked.len(), 10);
}
