//! Scripted session played against a frame-stepped motion host.

use std::{
    collections::{BTreeMap, VecDeque},
    time::Duration,
};

use glam::Vec3;
use queue_match_core::{ColorTag, CompletionTicket, MotionHost, UnitId};
use queue_match_session::Session;
use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Frames a unit spends moving between neighbouring slots.
const SLOT_MOVE_FRAMES: u32 = 2;

/// Parameters of a scripted run.
#[derive(Clone, Debug)]
pub(crate) struct DemoSettings {
    pub(crate) seed: u64,
    pub(crate) units: u32,
    pub(crate) colors: Vec<ColorTag>,
    pub(crate) tick: Duration,
    pub(crate) removal_frames: u32,
    pub(crate) max_frames: u32,
}

/// Outcome of a scripted run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub(crate) struct DemoReport {
    pub(crate) seed: u64,
    pub(crate) frames: u32,
    pub(crate) queued: u32,
    /// Units for which no free slot or no walkable route existed.
    pub(crate) unreachable: u32,
    pub(crate) rejected: u32,
    pub(crate) runs_cleared: u64,
    pub(crate) cycles_completed: u64,
    pub(crate) slots: Vec<String>,
}

/// Motion host that advances every animation by one step per frame.
#[derive(Debug, Default)]
struct FrameHost {
    next_ticket: u64,
    remaining: BTreeMap<CompletionTicket, u32>,
    moving: BTreeMap<UnitId, CompletionTicket>,
    walk_frames: BTreeMap<UnitId, u32>,
    removal_frames: u32,
    destroyed: Vec<UnitId>,
}

impl FrameHost {
    fn new(removal_frames: u32) -> Self {
        Self {
            removal_frames,
            ..Self::default()
        }
    }

    fn start(&mut self, frames: u32) -> CompletionTicket {
        self.next_ticket += 1;
        let ticket = CompletionTicket::new(self.next_ticket);
        let _ = self.remaining.insert(ticket, frames.max(1));
        ticket
    }

    /// Uses the planned route length as the duration of the unit's next move.
    fn plan_walk(&mut self, unit: UnitId, steps: usize) {
        let frames = u32::try_from(steps).unwrap_or(u32::MAX);
        let _ = self.walk_frames.insert(unit, frames);
    }

    fn is_busy(&self) -> bool {
        !self.remaining.is_empty()
    }

    /// Steps every animation and returns the units that reached their slot.
    fn advance(&mut self) -> Vec<UnitId> {
        self.remaining.retain(|_, frames| {
            *frames -= 1;
            *frames > 0
        });

        let arrived: Vec<UnitId> = self
            .moving
            .iter()
            .filter(|(_, ticket)| !self.remaining.contains_key(ticket))
            .map(|(unit, _)| *unit)
            .collect();
        for unit in &arrived {
            let _ = self.moving.remove(unit);
        }
        arrived
    }
}

impl MotionHost for FrameHost {
    fn animate_removal(&mut self, units: [UnitId; 3]) -> CompletionTicket {
        for unit in units {
            let _ = self.moving.remove(&unit);
        }
        self.destroyed.extend(units);
        self.start(self.removal_frames)
    }

    fn animate_move(&mut self, unit: UnitId, to_slot: usize) -> CompletionTicket {
        let frames = self
            .walk_frames
            .remove(&unit)
            .unwrap_or(SLOT_MOVE_FRAMES);
        let ticket = self.start(frames);
        debug!(%unit, to_slot, frames, "unit moving");
        let _ = self.moving.insert(unit, ticket);
        ticket
    }

    fn is_complete(&self, ticket: CompletionTicket) -> bool {
        !self.remaining.contains_key(&ticket)
    }

    fn is_unit_moving(&self, unit: UnitId) -> bool {
        self.moving.contains_key(&unit)
    }
}

/// Spawns units on random walkable cells and walks them into the queue one
/// at a time until every unit has been handled or the frame budget runs out.
pub(crate) fn run(session: &mut Session, settings: &DemoSettings) -> DemoReport {
    let mut rng = ChaCha8Rng::seed_from_u64(settings.seed);
    let mut host = FrameHost::new(settings.removal_frames);
    let mut waiting = spawn_units(session, settings, &mut rng);
    let mut report = DemoReport {
        seed: settings.seed,
        frames: 0,
        queued: 0,
        unreachable: 0,
        rejected: 0,
        runs_cleared: 0,
        cycles_completed: 0,
        slots: Vec::new(),
    };

    info!(units = waiting.len(), seed = settings.seed, "demo started");

    while report.frames < settings.max_frames {
        for unit in host.advance() {
            session.on_unit_arrived(unit, &mut host);
        }

        if !session.is_board_locked() && !host.is_busy() {
            let Some((unit, color, position)) = waiting.pop_front() else {
                break;
            };
            dispatch(session, &mut host, &mut report, unit, color, position);
        }

        session.tick(settings.tick, &mut host);
        report.frames += 1;
    }

    if !waiting.is_empty() {
        warn!(left = waiting.len(), "demo stopped with units still waiting");
    }

    report.runs_cleared = session.engine().runs_cleared();
    report.cycles_completed = session.engine().cycles_completed();
    report.slots = session
        .slots()
        .iter()
        .map(|slot| slot.map_or_else(|| "_".to_owned(), |occupant| occupant.color.to_string()))
        .collect();
    info!(
        frames = report.frames,
        destroyed = host.destroyed.len(),
        "demo finished"
    );
    report
}

fn dispatch(
    session: &mut Session,
    host: &mut FrameHost,
    report: &mut DemoReport,
    unit: UnitId,
    color: ColorTag,
    position: Vec3,
) {
    let Some(route) = session.route_to_queue(position, &color) else {
        debug!(%unit, %color, "no route into the queue");
        report.unreachable += 1;
        return;
    };

    host.plan_walk(unit, route.path.step_count());
    match session.try_insert(unit, color, host) {
        Ok(slot) => {
            debug!(%unit, slot, steps = route.path.step_count(), "unit walking to queue");
            report.queued += 1;
        }
        Err(reason) => {
            let _ = host.walk_frames.remove(&unit);
            debug!(%unit, %reason, "unit turned away");
            report.rejected += 1;
        }
    }
}

fn spawn_units(
    session: &Session,
    settings: &DemoSettings,
    rng: &mut ChaCha8Rng,
) -> VecDeque<(UnitId, ColorTag, Vec3)> {
    let grid = *session.grid();
    let walkability = session.walkability();
    let open: Vec<_> = grid
        .cells()
        .filter(|cell| walkability.is_walkable(*cell))
        .collect();

    (1..=settings.units)
        .filter_map(|id| {
            let cell = open.choose(rng)?;
            let color = settings.colors.choose(rng)?.clone();
            let jitter = Vec3::new(
                rng.gen_range(0.0..0.5),
                0.0,
                rng.gen_range(0.0..0.5),
            ) * grid.cell_size();
            Some((UnitId::new(id), color, grid.grid_to_world(*cell) + jitter))
        })
        .collect()
}
