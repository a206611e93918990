#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Game session that wires the world and systems together for a host.
//!
//! A [`Session`] owns the authoritative world, the path planner and the match
//! engine. Hosts drive it by reporting arrivals, requesting insertions and
//! advancing time; every call pumps commands and events until the world is
//! quiescent again.

use std::time::Duration;

use glam::Vec3;
use queue_match_core::{
    Cell, ColorTag, Command, Event, GridConfig, GridIndex, InsertError, MotionHost, SlotView,
    UnitId, WalkabilityView,
};
use queue_match_system_matching::{self as matching, EngineState, MatchEngine};
use queue_match_system_pathfinding::{self as pathfinding, Path, PathPlanner};
use queue_match_world::{self as world, query, World, DEFAULT_QUEUE_CAPACITY};
use thiserror::Error;
use tracing::{debug, error, warn};

/// Errors raised while validating a queue layout.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum QueueConfigError {
    /// At least one queue anchor is required.
    #[error("the queue needs at least one anchor")]
    NoAnchors,
    /// An anchor lies outside the grid footprint.
    #[error("queue anchor {index} at {position} lies outside the grid")]
    AnchorOutsideGrid {
        /// Position of the anchor in the configured list.
        index: usize,
        /// World position of the anchor.
        position: Vec3,
    },
}

/// Everything required to build a [`Session`].
#[derive(Clone, Debug)]
pub struct SessionConfig {
    grid: GridConfig,
    anchors: Vec<Vec3>,
    planner: pathfinding::Config,
    engine: matching::Config,
    blocked_cells: Vec<Cell>,
}

impl SessionConfig {
    /// Creates a configuration with one queue slot per anchor.
    pub fn new(grid: GridConfig, anchors: Vec<Vec3>) -> Result<Self, QueueConfigError> {
        if anchors.is_empty() {
            return Err(QueueConfigError::NoAnchors);
        }

        let footprint = GridIndex::new(grid);
        if let Some((index, position)) = anchors
            .iter()
            .enumerate()
            .find(|(_, anchor)| !footprint.contains_point(**anchor))
        {
            return Err(QueueConfigError::AnchorOutsideGrid {
                index,
                position: *position,
            });
        }

        Ok(Self {
            grid,
            anchors,
            planner: pathfinding::Config::default(),
            engine: matching::Config::default(),
            blocked_cells: Vec::new(),
        })
    }

    /// Replaces the path planner configuration.
    #[must_use]
    pub fn with_planner(mut self, planner: pathfinding::Config) -> Self {
        self.planner = planner;
        self
    }

    /// Replaces the match engine configuration.
    #[must_use]
    pub fn with_engine(mut self, engine: matching::Config) -> Self {
        self.engine = engine;
        self
    }

    /// Cells that start blocked regardless of the obstacle oracle.
    #[must_use]
    pub fn with_blocked_cells(mut self, cells: Vec<Cell>) -> Self {
        self.blocked_cells = cells;
        self
    }

    /// Grid the session plans over.
    #[must_use]
    pub const fn grid(&self) -> &GridConfig {
        &self.grid
    }

    /// World positions of the queue slots, left to right.
    #[must_use]
    pub fn anchors(&self) -> &[Vec3] {
        &self.anchors
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        let grid = GridConfig::default();
        let index = GridIndex::new(grid);
        let anchors = (0..DEFAULT_QUEUE_CAPACITY)
            .filter_map(|slot| u32::try_from(slot + 1).ok())
            .map(|x| index.grid_to_world(Cell::new(x, 0)))
            .collect();

        Self {
            grid,
            anchors,
            planner: pathfinding::Config::default(),
            engine: matching::Config::default(),
            blocked_cells: Vec::new(),
        }
    }
}

/// Slot a unit would join together with the route to that slot's anchor.
#[derive(Clone, Debug, PartialEq)]
pub struct QueueRoute {
    /// Slot the unit would take.
    pub slot: usize,
    /// World position of the slot's anchor.
    pub anchor: Vec3,
    /// Path from the unit to the anchor.
    pub path: Path,
}

/// Owns the world and systems for one game session.
#[derive(Debug)]
pub struct Session {
    world: World,
    planner: PathPlanner,
    engine: MatchEngine,
    anchors: Vec<Vec3>,
}

impl Session {
    /// Builds a session from a validated configuration.
    #[must_use]
    pub fn new(config: SessionConfig) -> Self {
        let SessionConfig {
            grid,
            anchors,
            planner,
            engine,
            blocked_cells,
        } = config;

        let mut world = World::with_layout(grid, anchors.len());
        let mut events = Vec::new();
        world::block_cells(&mut world, &blocked_cells, &mut events);
        debug!(
            slots = anchors.len(),
            blocked = events.len(),
            "session created"
        );

        Self {
            world,
            planner: PathPlanner::new(planner),
            engine: MatchEngine::new(engine),
            anchors,
        }
    }

    /// Advances simulated time, letting the match engine poll the host.
    pub fn tick<H>(&mut self, dt: Duration, host: &mut H)
    where
        H: MotionHost + ?Sized,
    {
        let _ = self.execute(vec![Command::Tick { dt }], host);
    }

    /// Reports that a queued unit reached its slot anchor.
    ///
    /// Hosts call this whenever a queued unit finishes moving, including
    /// units that were shifted or compacted.
    pub fn on_unit_arrived<H>(&mut self, unit: UnitId, host: &mut H)
    where
        H: MotionHost + ?Sized,
    {
        let _ = self.execute(vec![Command::ReportArrival { unit }], host);
    }

    /// Asks for `unit` to join the queue, returning the slot it was given.
    ///
    /// The host is asked to move the unit and any units it displaced.
    pub fn try_insert<H>(
        &mut self,
        unit: UnitId,
        color: ColorTag,
        host: &mut H,
    ) -> Result<usize, InsertError>
    where
        H: MotionHost + ?Sized,
    {
        if host.is_unit_locked(unit) {
            warn!(%unit, %color, "queue insertion rejected for locked unit");
            return Err(InsertError::UnitLocked);
        }

        let events = self.execute(vec![Command::InsertUnit { unit, color }], host);
        let outcome = events.iter().find_map(|event| match event {
            Event::UnitInserted {
                unit: inserted,
                index,
                ..
            } if *inserted == unit => Some(Ok(*index)),
            Event::InsertionRejected {
                unit: rejected,
                reason,
                ..
            } if *rejected == unit => Some(Err(*reason)),
            _ => None,
        });

        debug_assert!(outcome.is_some(), "insertion of {unit} produced no outcome");
        outcome.unwrap_or_else(|| {
            error!(%unit, "world emitted no insertion outcome");
            Err(InsertError::QueueFull)
        })
    }

    /// Plans a path between two world positions using the configured strategy.
    pub fn find_path(&mut self, start: Vec3, target: Vec3) -> Option<Path> {
        self.planner.find_path(
            query::grid_index(&self.world),
            query::walkability_view(&self.world),
            start,
            target,
        )
    }

    /// Breadth-first search for any walkable route between two positions.
    pub fn find_alternative_path(&mut self, start: Vec3, target: Vec3) -> Option<Path> {
        self.planner.find_alternative_path(
            query::grid_index(&self.world),
            query::walkability_view(&self.world),
            start,
            target,
        )
    }

    /// Previews where a unit of `color` standing at `start` would queue and
    /// how it would get there.
    ///
    /// Returns `None` while the board is locked, when the queue has no slot
    /// for the color, or when the anchor cannot be reached.
    pub fn route_to_queue(&mut self, start: Vec3, color: &ColorTag) -> Option<QueueRoute> {
        if query::is_board_locked(&self.world) {
            debug!(%color, "queue route requested while the board is locked");
            return None;
        }

        let slot = query::insertion_index(&self.world, color)?;
        let anchor = *self.anchors.get(slot)?;
        let path = self.find_path(start, anchor)?;
        Some(QueueRoute { slot, anchor, path })
    }

    /// Re-queries the obstacle oracle for every cell, returning how many
    /// cells changed.
    pub fn refresh_walkability<F>(&mut self, is_obstacle_present: F) -> usize
    where
        F: FnMut(Vec3) -> bool,
    {
        let mut events = Vec::new();
        world::refresh_walkability(&mut self.world, is_obstacle_present, &mut events);
        count_walkability_changes(&events)
    }

    /// Re-queries the obstacle oracle for the cell addressing `point`,
    /// returning whether it changed.
    pub fn refresh_cell_walkability<F>(&mut self, point: Vec3, is_obstacle_present: F) -> bool
    where
        F: FnMut(Vec3) -> bool,
    {
        let mut events = Vec::new();
        world::refresh_cell_walkability(&mut self.world, point, is_obstacle_present, &mut events);
        count_walkability_changes(&events) > 0
    }

    /// Banner adapters may display when the session starts.
    #[must_use]
    pub fn welcome_banner(&self) -> &'static str {
        query::welcome_banner(&self.world)
    }

    /// Read-only view of the queue slots.
    #[must_use]
    pub fn slots(&self) -> SlotView<'_> {
        query::slot_view(&self.world)
    }

    /// Read-only view of the walkability grid.
    #[must_use]
    pub fn walkability(&self) -> WalkabilityView<'_> {
        query::walkability_view(&self.world)
    }

    /// Coordinate transform of the session grid.
    #[must_use]
    pub fn grid(&self) -> &GridIndex {
        query::grid_index(&self.world)
    }

    /// World positions of the queue slots, left to right.
    #[must_use]
    pub fn anchors(&self) -> &[Vec3] {
        &self.anchors
    }

    /// Reports whether a match cycle holds the board lock.
    #[must_use]
    pub fn is_board_locked(&self) -> bool {
        query::is_board_locked(&self.world)
    }

    /// Coarse state of the match engine.
    #[must_use]
    pub fn engine_state(&self) -> EngineState {
        self.engine.state()
    }

    /// Match engine counters.
    #[must_use]
    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    /// Simulated time accumulated across all ticks.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        query::elapsed(&self.world)
    }

    /// Applies commands and pumps the resulting events through the engine
    /// until it stops emitting commands. Returns the events produced by the
    /// initial commands.
    fn execute<H>(&mut self, commands: Vec<Command>, host: &mut H) -> Vec<Event>
    where
        H: MotionHost + ?Sized,
    {
        let mut initial = Vec::new();
        for command in commands {
            world::apply(&mut self.world, command, &mut initial);
        }

        let mut events = initial.clone();
        loop {
            if events.is_empty() {
                break;
            }

            let mut commands = Vec::new();
            self.engine.handle(
                &events,
                query::slot_view(&self.world),
                query::is_board_locked(&self.world),
                host,
                &mut commands,
            );

            if commands.is_empty() {
                break;
            }

            events.clear();
            for command in commands {
                world::apply(&mut self.world, command, &mut events);
            }
        }

        initial
    }
}

fn count_walkability_changes(events: &[Event]) -> usize {
    events
        .iter()
        .filter(|event| matches!(event, Event::CellWalkabilityChanged { .. }))
        .count()
}
