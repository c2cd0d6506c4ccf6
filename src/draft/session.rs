// A single draft session: seats, pack rotation, pick/trash application.
//
// The session is the aggregate root. All mutation goes through
// `submit_pick`/`submit_trash` (humans, with a staleness check) or
// `apply_selection` (the shared inner path bots also use), and every applied
// mutation bumps the sequence number clients synchronize on.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::draft::format::{step_list, step_title, FormatDefinition, StepAction};
use crate::draft::pack::GeneratedPacks;
use crate::draft::rng::{RngState, SessionRng};
use crate::draft::DraftError;

/// An ordered run of pool indices offered to a seat. Shrinks by removal,
/// never reordered.
pub type PackInstance = Vec<usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    Pick,
    Trash,
}

// ---------------------------------------------------------------------------
// Seats
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Seat {
    pub name: String,
    pub is_bot: bool,
    /// Packs waiting on this seat; the front pack is the one in play.
    pub pack_queue: VecDeque<PackInstance>,
    pub pick_log: Vec<usize>,
    pub trash_log: Vec<usize>,
    /// Unit actions remaining for this seat, front first.
    pub step_queue: VecDeque<StepAction>,
    /// Every card index this seat has been shown, in arrival order.
    pub seen: Vec<usize>,
    pub deck_finalized: bool,
}

impl Seat {
    fn new(name: String, is_bot: bool, steps: VecDeque<StepAction>) -> Self {
        Seat {
            name,
            is_bot,
            pack_queue: VecDeque::new(),
            pick_log: Vec::new(),
            trash_log: Vec::new(),
            step_queue: steps,
            seen: Vec::new(),
            deck_finalized: false,
        }
    }

    pub fn current_pack(&self) -> Option<&PackInstance> {
        self.pack_queue.front()
    }

    pub fn selections_made(&self) -> usize {
        self.pick_log.len() + self.trash_log.len()
    }

    fn note_seen(&mut self, pack: &[usize]) {
        for &card in pack {
            if !self.seen.contains(&card) {
                self.seen.push(card);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Derived state
// ---------------------------------------------------------------------------

/// The recomputable view of where a seat stands. Never stored; always
/// projected from the session on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrafterState {
    pub seat: usize,
    pub cards_in_pack: Vec<usize>,
    pub picked: Vec<usize>,
    pub trashed: Vec<usize>,
    pub seen: Vec<usize>,
    /// 0-based pack index.
    pub pack_num: usize,
    /// 1-based pick number within the pack.
    pub pick_num: u32,
    pub num_packs: usize,
    pub pack_size: u32,
    pub step: Option<StepAction>,
    pub step_amount: u32,
    pub title: String,
    pub sequence: u64,
    pub finished: bool,
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct DraftSession {
    pub id: String,
    pub host: String,
    pub format: FormatDefinition,
    pub seats: Vec<Seat>,
    /// The deal as generated, kept for audit and restore.
    pub initial_packs: GeneratedPacks,
    /// How many rounds have been opened so far.
    pub rounds_opened: usize,
    pub sequence: u64,
    pub finished: bool,
    rng: SessionRng,
}

impl DraftSession {
    /// Build a session over a generated deal. Seat 0 is the host; every
    /// other seat starts as a bot until someone claims it in the lobby.
    /// Opens the first round immediately.
    pub fn new(
        id: String,
        host: String,
        format: FormatDefinition,
        packs: GeneratedPacks,
        seat_count: usize,
        rng: SessionRng,
    ) -> Self {
        let steps: VecDeque<StepAction> =
            step_list(&format).iter().map(|s| s.action).collect();

        let seats = (0..seat_count)
            .map(|i| {
                if i == 0 {
                    Seat::new(host.clone(), false, steps.clone())
                } else {
                    Seat::new(format!("Bot {i}"), true, steps.clone())
                }
            })
            .collect();

        let mut session = DraftSession {
            id,
            host,
            format,
            seats,
            initial_packs: packs,
            rounds_opened: 0,
            sequence: 0,
            finished: false,
            rng,
        };
        session.open_next_round();
        session
    }

    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }

    /// Pass direction for the round currently in play: left on even rounds,
    /// right on odd.
    pub fn direction(&self) -> isize {
        if self.rounds_opened == 0 || (self.rounds_opened - 1) % 2 == 0 {
            1
        } else {
            -1
        }
    }

    fn neighbor(&self, seat: usize) -> usize {
        let n = self.seat_count() as isize;
        ((seat as isize + n + self.direction()) % n) as usize
    }

    /// Claim the lowest-numbered bot seat for a named player. The host
    /// already holds seat 0.
    pub fn assign_seat(&mut self, name: &str) -> Result<usize, DraftError> {
        if let Some(existing) = self.seats.iter().position(|s| !s.is_bot && s.name == name) {
            return Ok(existing);
        }
        let index = self
            .seats
            .iter()
            .position(|s| s.is_bot)
            .ok_or(DraftError::NoFreeSeat)?;
        self.seats[index].is_bot = false;
        self.seats[index].name = name.to_string();
        self.sequence += 1;
        info!(session = %self.id, seat = index, name, "seat assigned");
        Ok(index)
    }

    /// Deal the next round's packs, or flip the completion flag when no
    /// rounds remain. Requesting this on a spent session is a no-op beyond
    /// the flag.
    pub fn open_next_round(&mut self) {
        if self.rounds_opened >= self.format.num_packs() {
            if !self.finished {
                self.finished = true;
                self.sequence += 1;
                info!(session = %self.id, "draft finished");
            }
            return;
        }
        let round = self.rounds_opened;
        for (seat_index, seat) in self.seats.iter_mut().enumerate() {
            let pack = self.initial_packs.rows[round][seat_index].clone();
            seat.note_seen(&pack);
            seat.pack_queue.push_back(pack);
        }
        self.rounds_opened += 1;
        self.sequence += 1;
        debug!(session = %self.id, round, "round opened");
    }

    /// Whether every pack dealt so far has been fully consumed.
    pub fn round_done(&self) -> bool {
        self.seats.iter().all(|s| s.pack_queue.is_empty())
    }

    /// A bot seat is due when it holds a non-empty pack and its next step
    /// is a selection.
    pub fn bot_seat_due(&self, seat: usize) -> bool {
        let seat = &self.seats[seat];
        seat.is_bot
            && seat
                .step_queue
                .front()
                .is_some_and(|a| a.is_selection())
            && seat.current_pack().is_some_and(|p| !p.is_empty())
    }

    pub fn rng_mut(&mut self) -> &mut SessionRng {
        &mut self.rng
    }

    // -- mutation ----------------------------------------------------------

    /// Client-facing pick submission with the staleness check.
    pub fn submit_pick(
        &mut self,
        seat: usize,
        index: usize,
        sequence: u64,
    ) -> Result<DrafterState, DraftError> {
        self.check_sequence(sequence)?;
        self.apply_selection(seat, index, SelectionKind::Pick)?;
        Ok(self.drafter_state(seat))
    }

    /// Client-facing trash submission with the staleness check.
    pub fn submit_trash(
        &mut self,
        seat: usize,
        index: usize,
        sequence: u64,
    ) -> Result<DrafterState, DraftError> {
        self.check_sequence(sequence)?;
        self.apply_selection(seat, index, SelectionKind::Trash)?;
        Ok(self.drafter_state(seat))
    }

    fn check_sequence(&self, submitted: u64) -> Result<(), DraftError> {
        if submitted != self.sequence {
            return Err(DraftError::StaleSession {
                submitted,
                authoritative: self.sequence,
            });
        }
        Ok(())
    }

    /// The one path every selection takes, human or bot: validate, remove
    /// the card, log it, consume the step, rotate on pass, advance the
    /// round when spent. A rejected selection leaves the session untouched.
    pub fn apply_selection(
        &mut self,
        seat_index: usize,
        pick_index: usize,
        kind: SelectionKind,
    ) -> Result<(), DraftError> {
        if self.finished {
            return Err(DraftError::DraftFinished);
        }
        if seat_index >= self.seats.len() {
            return Err(DraftError::UnknownSeat { seat: seat_index });
        }

        // Validate the step before touching anything.
        let step = *self.seats[seat_index]
            .step_queue
            .front()
            .ok_or(DraftError::NotYourTurn)?;
        let allowed = match kind {
            SelectionKind::Pick => step.is_pick() && step.is_selection(),
            SelectionKind::Trash => !step.is_pick() && step.is_selection(),
        };
        if !allowed {
            return Err(DraftError::NotYourTurn);
        }

        let pack_len = self.seats[seat_index]
            .current_pack()
            .map(|p| p.len())
            .unwrap_or(0);
        if pick_index >= pack_len {
            return Err(DraftError::InvalidPickIndex {
                index: pick_index,
                pack_len,
            });
        }

        // Commit.
        let seat = &mut self.seats[seat_index];
        let Some(pack) = seat.pack_queue.front_mut() else {
            return Err(DraftError::InvalidPickIndex {
                index: pick_index,
                pack_len: 0,
            });
        };
        let card = pack.remove(pick_index);
        let retired = pack.is_empty();
        match kind {
            SelectionKind::Pick => seat.pick_log.push(card),
            SelectionKind::Trash => seat.trash_log.push(card),
        }
        seat.step_queue.pop_front();
        if retired {
            seat.pack_queue.pop_front();
        }

        // Consume trailing passes, handing the current pack along for each.
        while self.seats[seat_index].step_queue.front() == Some(&StepAction::Pass) {
            self.seats[seat_index].step_queue.pop_front();
            self.pass_current_pack(seat_index);
        }

        self.sequence += 1;
        debug!(
            session = %self.id,
            seat = seat_index,
            card,
            ?kind,
            sequence = self.sequence,
            "selection applied"
        );

        if self.round_done() {
            self.open_next_round();
        }
        Ok(())
    }

    /// Hand the seat's current pack to its neighbor. An empty or absent
    /// pack is retired rather than passed.
    fn pass_current_pack(&mut self, seat_index: usize) {
        let Some(pack) = self.seats[seat_index].pack_queue.pop_front() else {
            return;
        };
        if pack.is_empty() {
            return;
        }
        let target = self.neighbor(seat_index);
        self.seats[target].note_seen(&pack);
        self.seats[target].pack_queue.push_back(pack);
    }

    // -- projection --------------------------------------------------------

    /// Project the derived view for one seat from authoritative state.
    pub fn drafter_state(&self, seat_index: usize) -> DrafterState {
        let seat = &self.seats[seat_index];
        let position =
            crate::draft::format::position_after(&self.format, seat.selections_made());
        let upcoming: Vec<StepAction> = seat.step_queue.iter().copied().collect();

        let cards_in_pack = seat.current_pack().cloned().unwrap_or_default();
        let title = if cards_in_pack.is_empty() && !upcoming.is_empty() {
            "Waiting for cards...".to_string()
        } else {
            step_title(&upcoming)
        };

        DrafterState {
            seat: seat_index,
            cards_in_pack,
            picked: seat.pick_log.clone(),
            trashed: seat.trash_log.clone(),
            seen: seat.seen.clone(),
            pack_num: position.pack_num,
            pick_num: position.pick_num,
            num_packs: position.num_packs,
            pack_size: position.pack_size,
            step: upcoming.first().copied(),
            step_amount: position.amount,
            title,
            sequence: self.sequence,
            finished: self.finished,
        }
    }

    /// Cards currently sitting in pack queues, session-wide.
    pub fn cards_in_flight(&self) -> usize {
        self.seats
            .iter()
            .flat_map(|s| s.pack_queue.iter())
            .map(|p| p.len())
            .sum()
    }

    /// Cards removed from circulation via pick or trash, session-wide.
    pub fn cards_selected(&self) -> usize {
        self.seats
            .iter()
            .map(|s| s.pick_log.len() + s.trash_log.len())
            .sum()
    }

    // -- snapshot ----------------------------------------------------------

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id.clone(),
            host: self.host.clone(),
            format: self.format.clone(),
            seats: self.seats.clone(),
            initial_packs: self.initial_packs.clone(),
            rounds_opened: self.rounds_opened,
            sequence: self.sequence,
            finished: self.finished,
            rng: self.rng.state(),
        }
    }

    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        DraftSession {
            id: snapshot.id,
            host: snapshot.host,
            format: snapshot.format,
            seats: snapshot.seats,
            initial_packs: snapshot.initial_packs,
            rounds_opened: snapshot.rounds_opened,
            sequence: snapshot.sequence,
            finished: snapshot.finished,
            rng: SessionRng::from_state(&snapshot.rng),
        }
    }
}

/// The serializable form of a session. Everything a reconnecting client or
/// a restarted server needs; DrafterState is reprojected, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub id: String,
    pub host: String,
    pub format: FormatDefinition,
    pub seats: Vec<Seat>,
    pub initial_packs: GeneratedPacks,
    pub rounds_opened: usize,
    pub sequence: u64,
    pub finished: bool,
    pub rng: RngState,
}
