#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative world state management for Queue Match.

mod slots;
mod walkability;

use std::time::Duration;

use glam::Vec3;
use queue_match_core::{
    Cell, ColorTag, Command, Event, GridConfig, GridIndex, InsertError, UnitId, WELCOME_BANNER,
};
use tracing::{debug, error, warn};

pub use slots::{Insertion, QueueSlots};
pub use walkability::WalkabilityMap;

/// Number of queue anchors used when no layout is supplied.
pub const DEFAULT_QUEUE_CAPACITY: usize = 7;

/// Represents the authoritative Queue Match world state.
#[derive(Debug)]
pub struct World {
    banner: &'static str,
    grid: GridIndex,
    walkability: WalkabilityMap,
    slots: QueueSlots,
    board_locked: bool,
    tick_index: u64,
    elapsed: Duration,
}

impl World {
    /// Creates a world with the default grid and queue layout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_layout(GridConfig::default(), DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a world over the provided grid with `queue_capacity` slots.
    #[must_use]
    pub fn with_layout(grid: GridConfig, queue_capacity: usize) -> Self {
        let grid = GridIndex::new(grid);
        Self {
            banner: WELCOME_BANNER,
            walkability: WalkabilityMap::new(grid),
            slots: QueueSlots::new(queue_capacity),
            grid,
            board_locked: false,
            tick_index: 0,
            elapsed: Duration::ZERO,
        }
    }

    fn insert_unit(&mut self, unit: UnitId, color: ColorTag, out_events: &mut Vec<Event>) {
        let result = if self.board_locked {
            Err(InsertError::BoardLocked)
        } else {
            self.slots.insert(unit, color.clone())
        };

        match result {
            Ok(insertion) => {
                debug!(%unit, %color, index = insertion.index, shifted = insertion.shifted.len(), "unit joined queue");
                out_events.push(Event::UnitInserted {
                    unit,
                    color,
                    index: insertion.index,
                    shifted: insertion.shifted,
                });
            }
            Err(reason) => {
                warn!(%unit, %color, %reason, "queue insertion rejected");
                out_events.push(Event::InsertionRejected {
                    unit,
                    color,
                    reason,
                });
            }
        }
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

/// Applies the provided command to the world, mutating state deterministically.
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Tick { dt } => {
            world.tick_index = world.tick_index.saturating_add(1);
            world.elapsed = world.elapsed.saturating_add(dt);
            out_events.push(Event::TimeAdvanced { dt });
        }
        Command::InsertUnit { unit, color } => world.insert_unit(unit, color, out_events),
        Command::ReportArrival { unit } => match world.slots.position_of(unit) {
            Some(index) => out_events.push(Event::UnitArrived { unit, index }),
            None => debug!(%unit, "arrival ignored for unit outside the queue"),
        },
        Command::LockBoard => {
            if world.board_locked {
                warn!("board lock requested while already held");
            } else {
                world.board_locked = true;
                out_events.push(Event::BoardLocked);
            }
        }
        Command::UnlockBoard => {
            if world.board_locked {
                world.board_locked = false;
                out_events.push(Event::BoardUnlocked);
            }
        }
        Command::ClearRun { start } => match world.slots.clear_run(start) {
            Ok([first, second, third]) => {
                debug!(start, color = %first.color, "run cleared");
                out_events.push(Event::RunCleared {
                    start,
                    color: first.color,
                    units: [first.unit, second.unit, third.unit],
                });
            }
            Err(reason) => {
                error!(start, %reason, "run removal rejected");
                out_events.push(Event::RunRejected { start, reason });
            }
        },
        Command::CompactQueue => {
            let moves = world.slots.compact_left();
            debug!(moved = moves.len(), "queue compacted");
            out_events.push(Event::QueueCompacted { moves });
        }
    }
}

/// Re-queries the obstacle oracle for every cell of the grid.
///
/// Each cell whose walkability flipped is reported individually, followed by
/// a summary of the blocked cell count.
pub fn refresh_walkability<F>(world: &mut World, is_obstacle_present: F, out_events: &mut Vec<Event>)
where
    F: FnMut(Vec3) -> bool,
{
    for (cell, walkable) in world.walkability.refresh_all(is_obstacle_present) {
        out_events.push(Event::CellWalkabilityChanged { cell, walkable });
    }
    let blocked = world.walkability.blocked_count();
    debug!(blocked, "walkability refreshed");
    out_events.push(Event::WalkabilityRefreshed { blocked });
}

/// Re-queries the obstacle oracle for the cell addressing `point`.
pub fn refresh_cell_walkability<F>(
    world: &mut World,
    point: Vec3,
    is_obstacle_present: F,
    out_events: &mut Vec<Event>,
) where
    F: FnMut(Vec3) -> bool,
{
    let cell = world.grid.world_to_grid(point);
    if let Some(walkable) = world.walkability.refresh_cell(cell, is_obstacle_present) {
        out_events.push(Event::CellWalkabilityChanged { cell, walkable });
    }
}

/// Marks the provided cells as blocked without consulting the oracle.
///
/// Cells outside the grid are skipped with a warning.
pub fn block_cells(world: &mut World, cells: &[Cell], out_events: &mut Vec<Event>) {
    for &cell in cells {
        if !world.grid.contains(cell) {
            warn!(%cell, "blocked cell lies outside the grid");
            continue;
        }
        if world.walkability.set_walkable(cell, false) {
            out_events.push(Event::CellWalkabilityChanged {
                cell,
                walkable: false,
            });
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::time::Duration;

    use super::World;
    use queue_match_core::{ColorTag, GridIndex, SlotView, WalkabilityView};

    /// Retrieves the welcome banner that adapters may display to players.
    #[must_use]
    pub fn welcome_banner(world: &World) -> &'static str {
        world.banner
    }

    /// Provides the coordinate transform of the world grid.
    #[must_use]
    pub fn grid_index(world: &World) -> &GridIndex {
        &world.grid
    }

    /// Captures a read-only view of the queue slots.
    #[must_use]
    pub fn slot_view(world: &World) -> SlotView<'_> {
        world.slots.view()
    }

    /// Slot a unit of `color` would take if it joined the queue now.
    ///
    /// The slot may currently be occupied; insertion shifts its occupant
    /// right. Returns `None` when the insertion would be rejected as full.
    #[must_use]
    pub fn insertion_index(world: &World, color: &ColorTag) -> Option<usize> {
        world.slots.can_insert(color)
    }

    /// Captures a read-only view of the walkability grid.
    #[must_use]
    pub fn walkability_view(world: &World) -> WalkabilityView<'_> {
        world.walkability.view()
    }

    /// Reports whether a match-resolution cycle holds the board lock.
    #[must_use]
    pub fn is_board_locked(world: &World) -> bool {
        world.board_locked
    }

    /// Number of ticks applied so far.
    #[must_use]
    pub fn tick_index(world: &World) -> u64 {
        world.tick_index
    }

    /// Simulated time accumulated across all ticks.
    #[must_use]
    pub fn elapsed(world: &World) -> Duration {
        world.elapsed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use queue_match_core::{RunError, SlotMove};

    fn tag(value: &str) -> ColorTag {
        ColorTag::new(value).expect("non-empty tag")
    }

    fn insert(world: &mut World, unit: u32, color: &str) -> Vec<Event> {
        let mut events = Vec::new();
        apply(
            world,
            Command::InsertUnit {
                unit: UnitId::new(unit),
                color: tag(color),
            },
            &mut events,
        );
        events
    }

    fn colors(world: &World) -> Vec<String> {
        query::slot_view(world)
            .iter()
            .map(|slot| slot.map_or_else(|| "_".to_owned(), |o| o.color.to_string()))
            .collect()
    }

    #[test]
    fn tick_advances_clock() {
        let mut world = World::new();
        let mut events = Vec::new();

        apply(
            &mut world,
            Command::Tick {
                dt: Duration::from_millis(16),
            },
            &mut events,
        );

        assert_eq!(
            events,
            vec![Event::TimeAdvanced {
                dt: Duration::from_millis(16)
            }]
        );
        assert_eq!(query::tick_index(&world), 1);
        assert_eq!(query::elapsed(&world), Duration::from_millis(16));
    }

    #[test]
    fn insertion_reports_shifted_units() {
        let mut world = World::with_layout(GridConfig::default(), 5);
        let _ = insert(&mut world, 1, "R");
        let _ = insert(&mut world, 2, "G");

        let events = insert(&mut world, 3, "R");

        assert_eq!(
            events,
            vec![Event::UnitInserted {
                unit: UnitId::new(3),
                color: tag("R"),
                index: 1,
                shifted: vec![SlotMove {
                    unit: UnitId::new(2),
                    from: 1,
                    to: 2,
                }],
            }]
        );
        assert_eq!(colors(&world), vec!["R", "R", "G", "_", "_"]);
        assert_eq!(query::insertion_index(&world, &tag("R")), Some(2));
        assert_eq!(query::insertion_index(&world, &tag("K")), Some(3));

        let _ = insert(&mut world, 4, "K");
        let _ = insert(&mut world, 5, "Y");
        assert_eq!(colors(&world), vec!["R", "R", "G", "K", "Y"]);
        assert_eq!(query::insertion_index(&world, &tag("R")), None);
    }

    #[test]
    fn locked_board_rejects_insertions() {
        let mut world = World::with_layout(GridConfig::default(), 5);
        let mut events = Vec::new();
        apply(&mut world, Command::LockBoard, &mut events);
        assert_eq!(events, vec![Event::BoardLocked]);

        let events = insert(&mut world, 1, "R");

        assert_eq!(
            events,
            vec![Event::InsertionRejected {
                unit: UnitId::new(1),
                color: tag("R"),
                reason: InsertError::BoardLocked,
            }]
        );
        assert_eq!(query::slot_view(&world).units().count(), 0);
    }

    #[test]
    fn every_insertion_reports_exactly_one_outcome() {
        let mut world = World::with_layout(GridConfig::default(), 3);
        let attempts = [(1, "R"), (2, "G"), (1, "R"), (3, "R"), (4, "R"), (5, "Y")];

        for (unit, color) in attempts {
            let events = insert(&mut world, unit, color);
            let outcomes = events
                .iter()
                .filter(|event| {
                    matches!(
                        event,
                        Event::UnitInserted { .. } | Event::InsertionRejected { .. }
                    )
                })
                .count();
            assert_eq!(outcomes, 1, "unit {unit} as {color}");
        }
        assert_eq!(colors(&world), vec!["R", "R", "G"]);
    }

    #[test]
    fn lock_is_not_reacquired_while_held() {
        let mut world = World::new();
        let mut events = Vec::new();

        apply(&mut world, Command::LockBoard, &mut events);
        apply(&mut world, Command::LockBoard, &mut events);
        apply(&mut world, Command::UnlockBoard, &mut events);
        apply(&mut world, Command::UnlockBoard, &mut events);

        assert_eq!(events, vec![Event::BoardLocked, Event::BoardUnlocked]);
        assert!(!query::is_board_locked(&world));
    }

    #[test]
    fn clear_and_compact_emit_structural_events() {
        let mut world = World::with_layout(GridConfig::default(), 5);
        for (unit, color) in [(1, "R"), (2, "R"), (3, "R"), (4, "G"), (5, "Y")] {
            let _ = insert(&mut world, unit, color);
        }
        let mut events = Vec::new();

        apply(&mut world, Command::ClearRun { start: 0 }, &mut events);
        apply(&mut world, Command::CompactQueue, &mut events);

        assert_eq!(
            events,
            vec![
                Event::RunCleared {
                    start: 0,
                    color: tag("R"),
                    units: [UnitId::new(1), UnitId::new(2), UnitId::new(3)],
                },
                Event::QueueCompacted {
                    moves: vec![
                        SlotMove {
                            unit: UnitId::new(4),
                            from: 3,
                            to: 0,
                        },
                        SlotMove {
                            unit: UnitId::new(5),
                            from: 4,
                            to: 1,
                        },
                    ],
                },
            ]
        );
        assert_eq!(colors(&world), vec!["G", "Y", "_", "_", "_"]);
    }

    #[test]
    fn invalid_run_is_rejected_without_mutation() {
        let mut world = World::with_layout(GridConfig::default(), 3);
        let _ = insert(&mut world, 1, "R");
        let mut events = Vec::new();

        apply(&mut world, Command::ClearRun { start: 1 }, &mut events);
        apply(&mut world, Command::ClearRun { start: 0 }, &mut events);

        assert_eq!(
            events,
            vec![
                Event::RunRejected {
                    start: 1,
                    reason: RunError::OutOfBounds {
                        start: 1,
                        capacity: 3
                    },
                },
                Event::RunRejected {
                    start: 0,
                    reason: RunError::NotAMatch { start: 0 },
                },
            ]
        );
        assert_eq!(colors(&world), vec!["R", "_", "_"]);
    }

    #[test]
    fn arrivals_are_reported_only_for_queued_units() {
        let mut world = World::new();
        let _ = insert(&mut world, 4, "K");
        let mut events = Vec::new();

        apply(
            &mut world,
            Command::ReportArrival {
                unit: UnitId::new(4),
            },
            &mut events,
        );
        apply(
            &mut world,
            Command::ReportArrival {
                unit: UnitId::new(5),
            },
            &mut events,
        );

        assert_eq!(
            events,
            vec![Event::UnitArrived {
                unit: UnitId::new(4),
                index: 0,
            }]
        );
    }

    #[test]
    fn walkability_refresh_reports_changes() {
        let mut world = World::new();
        let mut events = Vec::new();
        let obstacle = Cell::new(2, 3);
        let grid = *query::grid_index(&world);

        refresh_walkability(
            &mut world,
            |point| grid.world_to_grid(point) == obstacle,
            &mut events,
        );

        assert_eq!(
            events,
            vec![
                Event::CellWalkabilityChanged {
                    cell: obstacle,
                    walkable: false,
                },
                Event::WalkabilityRefreshed { blocked: 1 },
            ]
        );
        assert!(!query::walkability_view(&world).is_walkable(obstacle));

        events.clear();
        refresh_cell_walkability(
            &mut world,
            grid.grid_to_world(obstacle),
            |_| false,
            &mut events,
        );
        assert_eq!(
            events,
            vec![Event::CellWalkabilityChanged {
                cell: obstacle,
                walkable: true,
            }]
        );
    }

    #[test]
    fn block_cells_skips_cells_outside_grid() {
        let mut world = World::new();
        let mut events = Vec::new();

        block_cells(
            &mut world,
            &[Cell::new(1, 1), Cell::new(40, 1), Cell::new(1, 1)],
            &mut events,
        );

        assert_eq!(
            events,
            vec![Event::CellWalkabilityChanged {
                cell: Cell::new(1, 1),
                walkable: false,
            }]
        );
    }
}
