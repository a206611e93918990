#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the Queue Match engine.
//!
//! This crate defines the message surface that connects the session, the
//! authoritative world, and pure systems. The session submits [`Command`]
//! values describing desired mutations, the world executes those commands via
//! its `apply` entry point, and then broadcasts [`Event`] values for systems to
//! react to deterministically. Systems consume event streams, query immutable
//! views, and respond exclusively with new command batches. Presentation work
//! (animations, destroying units) is delegated to a [`MotionHost`].

use std::{fmt, time::Duration};

use glam::Vec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Canonical banner emitted when the experience boots.
pub const WELCOME_BANNER: &str = "Welcome to Queue Match.";

/// Number of identical adjacent slots that form a match.
pub const MATCH_RUN_LENGTH: usize = 3;

/// Fraction of a cell added before flooring so cell centres survive rounding.
const CENTER_TOLERANCE: f32 = 1e-4;

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Advances the simulation clock by the provided delta time.
    Tick {
        /// Duration of simulated time that elapsed since the previous tick.
        dt: Duration,
    },
    /// Requests that a unit joins the queue at its color-aware position.
    InsertUnit {
        /// Unit asking to join the queue.
        unit: UnitId,
        /// Color tag carried by the unit.
        color: ColorTag,
    },
    /// Reports that a queued unit finished moving onto its slot anchor.
    ReportArrival {
        /// Unit that reached its slot.
        unit: UnitId,
    },
    /// Acquires the board lock for a match-resolution cycle.
    LockBoard,
    /// Releases the board lock once a resolution cycle ends.
    UnlockBoard,
    /// Removes the three-slot run that starts at the provided index.
    ClearRun {
        /// Index of the leftmost slot of the run.
        start: usize,
    },
    /// Left-packs the queue, preserving the order of the surviving units.
    CompactQueue,
}

/// Events broadcast by the world after processing commands.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Event {
    /// Indicates that the simulation clock advanced.
    TimeAdvanced {
        /// Duration of simulated time that elapsed in the tick.
        dt: Duration,
    },
    /// Confirms that a unit was written into a queue slot.
    UnitInserted {
        /// Unit that joined the queue.
        unit: UnitId,
        /// Color tag carried by the unit.
        color: ColorTag,
        /// Slot the unit now owns.
        index: usize,
        /// Units pushed one slot to the right to make room, if any.
        shifted: Vec<SlotMove>,
    },
    /// Reports that an insertion request was refused without mutation.
    InsertionRejected {
        /// Unit that asked to join.
        unit: UnitId,
        /// Color tag carried by the unit.
        color: ColorTag,
        /// Specific reason the insertion failed.
        reason: InsertError,
    },
    /// Announces that a queued unit reached its slot anchor.
    UnitArrived {
        /// Unit that arrived.
        unit: UnitId,
        /// Slot the unit occupies.
        index: usize,
    },
    /// Confirms that the board lock was acquired.
    BoardLocked,
    /// Confirms that the board lock was released.
    BoardUnlocked,
    /// Confirms that a three-slot run was removed from the queue.
    RunCleared {
        /// Index of the leftmost cleared slot.
        start: usize,
        /// Color shared by the cleared units.
        color: ColorTag,
        /// Units that occupied the run, left to right.
        units: [UnitId; MATCH_RUN_LENGTH],
    },
    /// Reports that a run removal was refused because the queue state did not
    /// support it.
    RunRejected {
        /// Index supplied in the removal request.
        start: usize,
        /// Specific reason the removal failed.
        reason: RunError,
    },
    /// Confirms that the queue was left-packed.
    QueueCompacted {
        /// Units whose slot changed, in left-to-right order.
        moves: Vec<SlotMove>,
    },
    /// Announces that the walkability of a single cell flipped.
    CellWalkabilityChanged {
        /// Cell whose state changed.
        cell: Cell,
        /// Walkability after the refresh.
        walkable: bool,
    },
    /// Confirms that every cell was re-queried against the obstacle oracle.
    WalkabilityRefreshed {
        /// Number of cells that are blocked after the refresh.
        blocked: usize,
    },
}

/// Location of a single grid cell expressed as `x` and `z` indices.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Cell {
    x: u32,
    z: u32,
}

impl Cell {
    /// Creates a new grid cell coordinate.
    #[must_use]
    pub const fn new(x: u32, z: u32) -> Self {
        Self { x, z }
    }

    /// Zero-based index along the world x axis.
    #[must_use]
    pub const fn x(&self) -> u32 {
        self.x
    }

    /// Zero-based index along the world z axis.
    #[must_use]
    pub const fn z(&self) -> u32 {
        self.z
    }

    /// Computes the Manhattan distance between two cells.
    #[must_use]
    pub fn manhattan_distance(self, other: Cell) -> u32 {
        self.x.abs_diff(other.x) + self.z.abs_diff(other.z)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.z)
    }
}

/// Reasons a grid configuration may be refused.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum GridConfigError {
    /// Cells must have a strictly positive, finite edge length.
    #[error("cell size must be positive and finite, got {0}")]
    InvalidCellSize(f32),
    /// The grid must contain at least one cell.
    #[error("grid must contain at least one cell, got {width}x{height}")]
    Empty {
        /// Requested width in cells.
        width: u32,
        /// Requested height in cells.
        height: u32,
    },
}

/// Immutable description of the pathfinding grid laid over the world.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridConfig {
    origin: Vec3,
    cell_size: f32,
    width: u32,
    height: u32,
}

impl GridConfig {
    /// Validates and creates a grid configuration.
    pub fn new(
        origin: Vec3,
        cell_size: f32,
        width: u32,
        height: u32,
    ) -> Result<Self, GridConfigError> {
        if !cell_size.is_finite() || cell_size <= 0.0 {
            return Err(GridConfigError::InvalidCellSize(cell_size));
        }
        if width == 0 || height == 0 {
            return Err(GridConfigError::Empty { width, height });
        }

        Ok(Self {
            origin,
            cell_size,
            width,
            height,
        })
    }

    /// World position of the grid corner with the lowest x and z.
    #[must_use]
    pub const fn origin(&self) -> Vec3 {
        self.origin
    }

    /// Edge length of a single square cell in world units.
    #[must_use]
    pub const fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Number of cells along the x axis.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Number of cells along the z axis.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            origin: Vec3::ZERO,
            cell_size: 1.0,
            width: 10,
            height: 10,
        }
    }
}

/// Pure coordinate transform between world positions and grid cells.
///
/// Cells are addressed by their centres: [`GridIndex::grid_to_world`] returns
/// `origin + cell_size * (x + 0.5, 0, z + 0.5)`, and
/// [`GridIndex::world_to_grid`] subtracts the same half-cell offset before
/// flooring. Positions outside the grid clamp onto the nearest edge cell, so
/// the conversion is lossy for anything that is not a cell centre.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GridIndex {
    config: GridConfig,
}

impl GridIndex {
    /// Creates an index over the provided configuration.
    #[must_use]
    pub const fn new(config: GridConfig) -> Self {
        Self { config }
    }

    /// Configuration backing the index.
    #[must_use]
    pub const fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Number of cells along the x axis.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.config.width
    }

    /// Number of cells along the z axis.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.config.height
    }

    /// Edge length of a single cell in world units.
    #[must_use]
    pub const fn cell_size(&self) -> f32 {
        self.config.cell_size
    }

    /// Total number of cells covered by the grid.
    #[must_use]
    pub fn cell_count(&self) -> usize {
        let width = usize::try_from(self.config.width).unwrap_or(0);
        let height = usize::try_from(self.config.height).unwrap_or(0);
        width.saturating_mul(height)
    }

    /// Converts a world position into the clamped cell that addresses it.
    #[must_use]
    pub fn world_to_grid(&self, position: Vec3) -> Cell {
        let local = position - self.config.origin;
        Cell::new(
            self.axis_index(local.x, self.config.width),
            self.axis_index(local.z, self.config.height),
        )
    }

    /// Returns the world-space centre of the provided cell.
    #[must_use]
    pub fn grid_to_world(&self, cell: Cell) -> Vec3 {
        let size = self.config.cell_size;
        self.config.origin
            + Vec3::new(
                size * (cell.x() as f32 + 0.5),
                0.0,
                size * (cell.z() as f32 + 0.5),
            )
    }

    /// Reports whether the cell lies inside the grid.
    #[must_use]
    pub const fn contains(&self, cell: Cell) -> bool {
        cell.x() < self.config.width && cell.z() < self.config.height
    }

    /// Reports whether a raw world position lies on the grid's footprint.
    ///
    /// Only the x and z axes are considered. The upper edges are exclusive.
    #[must_use]
    pub fn contains_point(&self, position: Vec3) -> bool {
        let local = position - self.config.origin;
        let extent_x = self.config.width as f32 * self.config.cell_size;
        let extent_z = self.config.height as f32 * self.config.cell_size;
        (0.0..extent_x).contains(&local.x) && (0.0..extent_z).contains(&local.z)
    }

    /// Row-major offset of the cell, or `None` when it lies outside the grid.
    #[must_use]
    pub fn offset(&self, cell: Cell) -> Option<usize> {
        if !self.contains(cell) {
            return None;
        }
        let width = usize::try_from(self.config.width).ok()?;
        let x = usize::try_from(cell.x()).ok()?;
        let z = usize::try_from(cell.z()).ok()?;
        z.checked_mul(width)?.checked_add(x)
    }

    /// Inverse of [`GridIndex::offset`].
    #[must_use]
    pub fn cell_at(&self, offset: usize) -> Option<Cell> {
        if offset >= self.cell_count() {
            return None;
        }
        let width = usize::try_from(self.config.width).ok()?;
        let x = u32::try_from(offset % width).ok()?;
        let z = u32::try_from(offset / width).ok()?;
        Some(Cell::new(x, z))
    }

    /// Iterates every cell in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = Cell> {
        let width = self.config.width;
        let height = self.config.height;
        (0..height).flat_map(move |z| (0..width).map(move |x| Cell::new(x, z)))
    }

    fn axis_index(&self, offset: f32, extent: u32) -> u32 {
        let scaled = (offset / self.config.cell_size - 0.5 + CENTER_TOLERANCE).floor();
        let max = extent.saturating_sub(1);
        if scaled.is_nan() || scaled <= 0.0 {
            0
        } else if scaled >= max as f32 {
            max
        } else {
            scaled as u32
        }
    }
}

impl Default for GridIndex {
    fn default() -> Self {
        Self::new(GridConfig::default())
    }
}

/// Error returned when deserialising an empty color tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[error("color tags must not be empty")]
pub struct EmptyColorTag;

/// Non-empty color label carried by a unit, such as `"K"` or `"Y"`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ColorTag(String);

impl ColorTag {
    /// Creates a color tag, returning `None` for the empty string.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.is_empty() {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Borrows the tag as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ColorTag {
    type Error = EmptyColorTag;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(EmptyColorTag)
    }
}

impl From<ColorTag> for String {
    fn from(tag: ColorTag) -> Self {
        tag.0
    }
}

impl fmt::Display for ColorTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque identifier of a unit owned by the host.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(u32);

impl UnitId {
    /// Creates a new unit identifier with the provided numeric value.
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the identifier.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// Contents of an occupied queue slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SlotOccupant {
    /// Unit parked in the slot.
    pub unit: UnitId,
    /// Color tag the slot is matched on.
    pub color: ColorTag,
}

impl SlotOccupant {
    /// Pairs a unit with its color tag.
    #[must_use]
    pub const fn new(unit: UnitId, color: ColorTag) -> Self {
        Self { unit, color }
    }
}

/// Records that a unit changed slots during a shift or compaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotMove {
    /// Unit that moved.
    pub unit: UnitId,
    /// Slot the unit occupied before the move.
    pub from: usize,
    /// Slot the unit occupies after the move.
    pub to: usize,
}

/// Reasons an insertion request may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum InsertError {
    /// A match-resolution cycle holds the board lock.
    #[error("the board is locked while matches resolve")]
    BoardLocked,
    /// No slot is free for the unit, even after shifting.
    #[error("the queue has no free slot")]
    QueueFull,
    /// The unit already owns a slot.
    #[error("the unit is already queued")]
    AlreadyQueued,
    /// The host reports that the unit may not move right now.
    #[error("the unit's movement is locked")]
    UnitLocked,
}

/// Reasons a run removal may be rejected by the world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Error)]
pub enum RunError {
    /// The run would extend beyond the last slot.
    #[error("run starting at {start} exceeds queue capacity {capacity}")]
    OutOfBounds {
        /// Requested start index.
        start: usize,
        /// Number of slots in the queue.
        capacity: usize,
    },
    /// The slots at the requested index no longer hold a match.
    #[error("slots starting at {start} do not hold a match")]
    NotAMatch {
        /// Requested start index.
        start: usize,
    },
}

/// Read-only view over the queue slots.
#[derive(Clone, Copy, Debug)]
pub struct SlotView<'a> {
    slots: &'a [Option<SlotOccupant>],
}

impl<'a> SlotView<'a> {
    /// Captures a new view backed by the provided slots.
    #[must_use]
    pub const fn new(slots: &'a [Option<SlotOccupant>]) -> Self {
        Self { slots }
    }

    /// Number of slots in the queue.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Occupant of the slot at `index`, if any.
    #[must_use]
    pub fn occupant(&self, index: usize) -> Option<&'a SlotOccupant> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Iterates every slot from left to right.
    pub fn iter(&self) -> impl Iterator<Item = Option<&'a SlotOccupant>> + 'a {
        self.slots.iter().map(Option::as_ref)
    }

    /// Iterates the units currently parked in the queue, left to right.
    pub fn units(&self) -> impl Iterator<Item = UnitId> + 'a {
        self.slots.iter().flatten().map(|occupant| occupant.unit)
    }

    /// Slot owned by `unit`, if it is queued.
    #[must_use]
    pub fn position_of(&self, unit: UnitId) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|occupant| occupant.unit == unit))
    }

    /// Leftmost index that starts three identical, occupied slots.
    ///
    /// Longer runs report only their first three slots; the remainder is
    /// picked up by the next scan after compaction.
    #[must_use]
    pub fn first_match_run(&self) -> Option<usize> {
        self.slots
            .windows(MATCH_RUN_LENGTH)
            .position(|window| match &window[0] {
                Some(first) => window[1..]
                    .iter()
                    .all(|slot| slot.as_ref().is_some_and(|other| other.color == first.color)),
                None => false,
            })
    }
}

/// Read-only view into the dense walkability grid.
#[derive(Clone, Copy, Debug)]
pub struct WalkabilityView<'a> {
    cells: &'a [bool],
    width: u32,
    height: u32,
}

impl<'a> WalkabilityView<'a> {
    /// Captures a new view backed by the provided row-major cells.
    #[must_use]
    pub const fn new(cells: &'a [bool], width: u32, height: u32) -> Self {
        Self {
            cells,
            width,
            height,
        }
    }

    /// Reports whether the cell can be walked on. Cells outside the grid never
    /// are.
    #[must_use]
    pub fn is_walkable(&self, cell: Cell) -> bool {
        self.index(cell)
            .and_then(|index| self.cells.get(index).copied())
            .unwrap_or(false)
    }

    /// Provides the dimensions of the underlying grid.
    #[must_use]
    pub const fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Returns an iterator over all cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + 'a {
        self.cells.iter().copied()
    }

    /// Number of cells that are currently blocked.
    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.cells.iter().filter(|walkable| !**walkable).count()
    }

    fn index(&self, cell: Cell) -> Option<usize> {
        if cell.x() < self.width && cell.z() < self.height {
            let z = usize::try_from(cell.z()).ok()?;
            let x = usize::try_from(cell.x()).ok()?;
            let width = usize::try_from(self.width).ok()?;
            Some(z * width + x)
        } else {
            None
        }
    }
}

/// Handle identifying an animation requested from the [`MotionHost`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompletionTicket(u64);

impl CompletionTicket {
    /// Wraps a host-assigned ticket number.
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Retrieves the numeric representation of the ticket.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Presentation layer that animates units on behalf of the core.
///
/// The core never moves or destroys units itself. It asks the host to start
/// an animation, keeps the returned ticket, and polls until the host reports
/// completion on a later tick.
pub trait MotionHost {
    /// Plays the removal effect for a cleared run and destroys the units once
    /// it finishes.
    fn animate_removal(&mut self, units: [UnitId; MATCH_RUN_LENGTH]) -> CompletionTicket;

    /// Moves a unit onto the anchor of the provided slot.
    fn animate_move(&mut self, unit: UnitId, to_slot: usize) -> CompletionTicket;

    /// Reports whether the animation behind `ticket` has finished.
    fn is_complete(&self, ticket: CompletionTicket) -> bool;

    /// Reports whether the unit is currently in motion.
    fn is_unit_moving(&self, unit: UnitId) -> bool;

    /// Reports whether the host forbids the unit from moving at all.
    fn is_unit_locked(&self, _unit: UnitId) -> bool {
        false
    }
}
