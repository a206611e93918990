#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Deterministic grid path planner that routes units across walkable cells.
//!
//! The planner converts both endpoints to cells, then tries its primary
//! strategy (four-connected A* or an axis-sequential walk). When that fails
//! and the flood-fill fallback is enabled, a breadth-first search over the
//! walkable cells looks for any route at all. Absence of a route is an
//! ordinary outcome reported as `None`.

use std::{
    cmp::{Ordering, Reverse},
    collections::{BinaryHeap, VecDeque},
};

use glam::Vec3;
use queue_match_core::{Cell, GridIndex, WalkabilityView};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Search used before any fallback.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Four-connected A* with a Manhattan heuristic.
    #[default]
    AStar,
    /// Walks one axis fully, then the other, aborting on the first blocked cell.
    AxisWalk,
}

/// Axis order used by [`Strategy::AxisWalk`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AxisOrder {
    /// Cover the whole x delta before moving along z.
    #[default]
    XThenZ,
    /// Cover the whole z delta before moving along x.
    ZThenX,
}

/// Search that produced a [`Path`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SearchKind {
    /// Produced by A*.
    AStar,
    /// Produced by the axis-sequential walk.
    AxisWalk,
    /// Produced by the breadth-first fallback.
    FloodFill,
}

/// Configuration parameters required to construct the planner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    strategy: Strategy,
    axis_order: AxisOrder,
    flood_fill_fallback: bool,
}

impl Config {
    /// Creates a configuration from explicit values.
    #[must_use]
    pub const fn new(strategy: Strategy, axis_order: AxisOrder, flood_fill_fallback: bool) -> Self {
        Self {
            strategy,
            axis_order,
            flood_fill_fallback,
        }
    }

    /// Primary strategy.
    #[must_use]
    pub const fn strategy(&self) -> Strategy {
        self.strategy
    }

    /// Axis order used by the axis walk.
    #[must_use]
    pub const fn axis_order(&self) -> AxisOrder {
        self.axis_order
    }

    /// Whether the breadth-first fallback runs after the primary strategy fails.
    #[must_use]
    pub const fn flood_fill_fallback(&self) -> bool {
        self.flood_fill_fallback
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(Strategy::AStar, AxisOrder::XThenZ, true)
    }
}

/// Route between two cells expressed as world-space cell centres.
///
/// The first and last waypoints are the centres of the start and target
/// cells. Consecutive waypoints are exactly one cell apart along x or z.
#[derive(Clone, Debug, PartialEq)]
pub struct Path {
    cells: Vec<Cell>,
    waypoints: Vec<Vec3>,
    search: SearchKind,
}

impl Path {
    fn from_cells(grid: &GridIndex, cells: Vec<Cell>, search: SearchKind) -> Self {
        let waypoints = cells.iter().map(|cell| grid.grid_to_world(*cell)).collect();
        Self {
            cells,
            waypoints,
            search,
        }
    }

    /// Cells visited from start to target inclusive.
    #[must_use]
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    /// Cell centres visited from start to target inclusive.
    #[must_use]
    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    /// Waypoint at `index`, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Vec3> {
        self.waypoints.get(index).copied()
    }

    /// Number of waypoints. A path always holds at least one.
    #[must_use]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    /// Always `false`; planners never return empty paths.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    /// Number of single-cell steps along the path.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.cells.len().saturating_sub(1)
    }

    /// Search that produced the path.
    #[must_use]
    pub fn search(&self) -> SearchKind {
        self.search
    }

    /// Waypoints with the first and last cell centres replaced by the raw
    /// endpoints.
    ///
    /// A single-cell path yields `[start, target]`.
    #[must_use]
    pub fn with_endpoints(&self, start: Vec3, target: Vec3) -> Vec<Vec3> {
        if self.waypoints.len() < 2 {
            return vec![start, target];
        }

        let mut waypoints = self.waypoints.clone();
        let last = waypoints.len() - 1;
        waypoints[0] = start;
        waypoints[last] = target;
        waypoints
    }

    /// Waypoints with an extra point half a cell past every interior
    /// waypoint except the last one, for smoother walking.
    #[must_use]
    pub fn densified(&self, cell_size: f32) -> Vec<Vec3> {
        let count = self.waypoints.len();
        if count <= 2 {
            return self.waypoints.clone();
        }

        let mut waypoints = Vec::with_capacity(count * 2);
        waypoints.push(self.waypoints[0]);
        for index in 1..count - 1 {
            let current = self.waypoints[index];
            waypoints.push(current);
            if index < count - 2 {
                let direction = (self.waypoints[index + 1] - current).normalize_or_zero();
                waypoints.push(current + direction * (cell_size * 0.5));
            }
        }
        waypoints.push(self.waypoints[count - 1]);
        waypoints
    }
}

/// Stateful planner that reuses its search workspace across calls.
#[derive(Debug, Default)]
pub struct PathPlanner {
    config: Config,
    nodes: Vec<Node>,
    open: BinaryHeap<Reverse<OpenEntry>>,
    frontier: VecDeque<usize>,
    last_expanded: usize,
}

impl PathPlanner {
    /// Creates a planner using the supplied configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Configuration the planner was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Number of cells expanded by the most recent search.
    #[must_use]
    pub const fn last_expanded(&self) -> usize {
        self.last_expanded
    }

    /// Plans a route between two world positions.
    ///
    /// Returns `None` when either position lies outside the grid, when either
    /// endpoint cell is blocked, or when no strategy finds a route.
    pub fn find_path(
        &mut self,
        grid: &GridIndex,
        walkability: WalkabilityView<'_>,
        start: Vec3,
        target: Vec3,
    ) -> Option<Path> {
        let (start_cell, target_cell) = endpoints(grid, walkability, start, target)?;

        let primary = match self.config.strategy {
            Strategy::AStar => self
                .a_star(grid, walkability, start_cell, target_cell)
                .map(|cells| (cells, SearchKind::AStar)),
            Strategy::AxisWalk => {
                axis_walk(walkability, start_cell, target_cell, self.config.axis_order)
                    .map(|cells| (cells, SearchKind::AxisWalk))
            }
        };

        let found = match primary {
            Some(found) => Some(found),
            None if self.config.flood_fill_fallback => {
                debug!(start = %start_cell, target = %target_cell, "primary search failed, flooding");
                self.flood_fill(grid, walkability, start_cell, target_cell)
                    .map(|cells| (cells, SearchKind::FloodFill))
            }
            None => None,
        };

        match found {
            Some((cells, search)) => {
                debug!(
                    start = %start_cell,
                    target = %target_cell,
                    steps = cells.len().saturating_sub(1),
                    expanded = self.last_expanded,
                    ?search,
                    "path planned"
                );
                Some(Path::from_cells(grid, cells, search))
            }
            None => {
                debug!(start = %start_cell, target = %target_cell, "no path found");
                None
            }
        }
    }

    /// Breadth-first search for any walkable route, ignoring the configured
    /// strategy.
    pub fn find_alternative_path(
        &mut self,
        grid: &GridIndex,
        walkability: WalkabilityView<'_>,
        start: Vec3,
        target: Vec3,
    ) -> Option<Path> {
        let (start_cell, target_cell) = endpoints(grid, walkability, start, target)?;
        self.flood_fill(grid, walkability, start_cell, target_cell)
            .map(|cells| Path::from_cells(grid, cells, SearchKind::FloodFill))
    }

    fn reset(&mut self, cell_count: usize) {
        self.nodes.clear();
        self.nodes.resize(cell_count, Node::UNVISITED);
        self.open.clear();
        self.frontier.clear();
        self.last_expanded = 0;
    }

    fn a_star(
        &mut self,
        grid: &GridIndex,
        walkability: WalkabilityView<'_>,
        start: Cell,
        target: Cell,
    ) -> Option<Vec<Cell>> {
        self.reset(grid.cell_count());
        let start_offset = grid.offset(start)?;
        let target_offset = grid.offset(target)?;

        let h_cost = start.manhattan_distance(target);
        self.nodes[start_offset].g_cost = 0;
        self.nodes[start_offset].h_cost = h_cost;
        self.open.push(Reverse(OpenEntry {
            f_cost: h_cost,
            h_cost,
            offset: start_offset,
        }));

        while let Some(Reverse(entry)) = self.open.pop() {
            let current = self.nodes[entry.offset];
            if current.closed {
                continue;
            }
            self.nodes[entry.offset].closed = true;
            self.last_expanded += 1;

            if entry.offset == target_offset {
                return self.retrace(grid, start_offset, target_offset);
            }

            let Some(cell) = grid.cell_at(entry.offset) else {
                continue;
            };
            let next_g = current.g_cost.saturating_add(1);

            for neighbor in neighbors(cell, grid.width(), grid.height()) {
                if !walkability.is_walkable(neighbor) {
                    continue;
                }
                let Some(neighbor_offset) = grid.offset(neighbor) else {
                    continue;
                };

                let node = &mut self.nodes[neighbor_offset];
                if node.closed || next_g >= node.g_cost {
                    continue;
                }

                node.g_cost = next_g;
                node.h_cost = neighbor.manhattan_distance(target);
                node.parent = Some(entry.offset);
                self.open.push(Reverse(OpenEntry {
                    f_cost: next_g.saturating_add(node.h_cost),
                    h_cost: node.h_cost,
                    offset: neighbor_offset,
                }));
            }
        }

        None
    }

    fn flood_fill(
        &mut self,
        grid: &GridIndex,
        walkability: WalkabilityView<'_>,
        start: Cell,
        target: Cell,
    ) -> Option<Vec<Cell>> {
        self.reset(grid.cell_count());
        let start_offset = grid.offset(start)?;
        let target_offset = grid.offset(target)?;

        self.nodes[start_offset].closed = true;
        self.frontier.push_back(start_offset);

        while let Some(offset) = self.frontier.pop_front() {
            self.last_expanded += 1;
            if offset == target_offset {
                return self.retrace(grid, start_offset, target_offset);
            }

            let Some(cell) = grid.cell_at(offset) else {
                continue;
            };

            for neighbor in neighbors(cell, grid.width(), grid.height()) {
                if !walkability.is_walkable(neighbor) {
                    continue;
                }
                let Some(neighbor_offset) = grid.offset(neighbor) else {
                    continue;
                };

                let node = &mut self.nodes[neighbor_offset];
                if node.closed {
                    continue;
                }
                node.closed = true;
                node.parent = Some(offset);
                self.frontier.push_back(neighbor_offset);
            }
        }

        None
    }

    fn retrace(&self, grid: &GridIndex, start: usize, target: usize) -> Option<Vec<Cell>> {
        let mut cells = Vec::new();
        let mut cursor = Some(target);

        while let Some(offset) = cursor {
            cells.push(grid.cell_at(offset)?);
            if offset == start {
                cells.reverse();
                return Some(cells);
            }
            if cells.len() > self.nodes.len() {
                return None;
            }
            cursor = self.nodes.get(offset)?.parent;
        }

        None
    }
}

#[derive(Clone, Copy, Debug)]
struct Node {
    g_cost: u32,
    h_cost: u32,
    parent: Option<usize>,
    closed: bool,
}

impl Node {
    const UNVISITED: Self = Self {
        g_cost: u32::MAX,
        h_cost: 0,
        parent: None,
        closed: false,
    };
}

/// Frontier entry ordered by `f`, then `h`, then cell offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct OpenEntry {
    f_cost: u32,
    h_cost: u32,
    offset: usize,
}

impl Ord for OpenEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.f_cost, self.h_cost, self.offset).cmp(&(other.f_cost, other.h_cost, other.offset))
    }
}

impl PartialOrd for OpenEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn endpoints(
    grid: &GridIndex,
    walkability: WalkabilityView<'_>,
    start: Vec3,
    target: Vec3,
) -> Option<(Cell, Cell)> {
    if !grid.contains_point(start) || !grid.contains_point(target) {
        debug!(?start, ?target, "path endpoint outside the grid");
        return None;
    }

    let start_cell = grid.world_to_grid(start);
    let target_cell = grid.world_to_grid(target);
    if !walkability.is_walkable(start_cell) || !walkability.is_walkable(target_cell) {
        debug!(start = %start_cell, target = %target_cell, "path endpoint not walkable");
        return None;
    }

    Some((start_cell, target_cell))
}

#[derive(Clone, Copy, Debug)]
enum Axis {
    X,
    Z,
}

fn axis_walk(
    walkability: WalkabilityView<'_>,
    start: Cell,
    target: Cell,
    order: AxisOrder,
) -> Option<Vec<Cell>> {
    let legs = match order {
        AxisOrder::XThenZ => [Axis::X, Axis::Z],
        AxisOrder::ZThenX => [Axis::Z, Axis::X],
    };

    let mut cells = vec![start];
    let mut current = start;
    for axis in legs {
        while let Some(next) = step_toward(current, target, axis) {
            if !walkability.is_walkable(next) {
                return None;
            }
            cells.push(next);
            current = next;
        }
    }

    Some(cells)
}

fn step_toward(current: Cell, target: Cell, axis: Axis) -> Option<Cell> {
    match axis {
        Axis::X => match current.x().cmp(&target.x()) {
            Ordering::Less => Some(Cell::new(current.x() + 1, current.z())),
            Ordering::Greater => Some(Cell::new(current.x() - 1, current.z())),
            Ordering::Equal => None,
        },
        Axis::Z => match current.z().cmp(&target.z()) {
            Ordering::Less => Some(Cell::new(current.x(), current.z() + 1)),
            Ordering::Greater => Some(Cell::new(current.x(), current.z() - 1)),
            Ordering::Equal => None,
        },
    }
}

fn neighbors(cell: Cell, width: u32, height: u32) -> impl Iterator<Item = Cell> {
    let mut candidates = [None; 4];
    let mut count = 0;

    if let Some(z) = cell.z().checked_sub(1) {
        candidates[count] = Some(Cell::new(cell.x(), z));
        count += 1;
    }

    if let Some(x) = cell.x().checked_add(1) {
        if x < width {
            candidates[count] = Some(Cell::new(x, cell.z()));
            count += 1;
        }
    }

    if let Some(z) = cell.z().checked_add(1) {
        if z < height {
            candidates[count] = Some(Cell::new(cell.x(), z));
            count += 1;
        }
    }

    if let Some(x) = cell.x().checked_sub(1) {
        candidates[count] = Some(Cell::new(x, cell.z()));
        count += 1;
    }

    candidates.into_iter().take(count).flatten()
}
