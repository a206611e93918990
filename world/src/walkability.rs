//! Per-cell walkability flags refreshed from the host's obstacle oracle.

use glam::Vec3;
use queue_match_core::{Cell, GridIndex, WalkabilityView};

/// Dense walkability grid laid over the world.
///
/// Cells start walkable and only change when the obstacle oracle is queried
/// again or a layout explicitly blocks them. Refreshing is O(width × height)
/// oracle calls, so callers decide when it is worth doing.
#[derive(Clone, Debug)]
pub struct WalkabilityMap {
    index: GridIndex,
    cells: Vec<bool>,
}

impl WalkabilityMap {
    /// Creates a fully walkable map covering the provided grid.
    #[must_use]
    pub fn new(index: GridIndex) -> Self {
        Self {
            index,
            cells: vec![true; index.cell_count()],
        }
    }

    /// Reports whether the cell can be walked on. Out-of-bounds cells cannot.
    #[must_use]
    pub fn is_walkable(&self, cell: Cell) -> bool {
        self.index
            .offset(cell)
            .and_then(|offset| self.cells.get(offset).copied())
            .unwrap_or(false)
    }

    /// Re-queries the oracle at the cell centre.
    ///
    /// Returns the new value when it differs from the previous one.
    pub fn refresh_cell<F>(&mut self, cell: Cell, mut is_obstacle_present: F) -> Option<bool>
    where
        F: FnMut(Vec3) -> bool,
    {
        let centre = self.index.grid_to_world(cell);
        let walkable = !is_obstacle_present(centre);
        self.set_walkable(cell, walkable).then_some(walkable)
    }

    /// Re-queries the oracle for every cell, returning the cells that changed.
    pub fn refresh_all<F>(&mut self, mut is_obstacle_present: F) -> Vec<(Cell, bool)>
    where
        F: FnMut(Vec3) -> bool,
    {
        let mut changed = Vec::new();
        for cell in self.index.cells() {
            if let Some(walkable) = self.refresh_cell(cell, &mut is_obstacle_present) {
                changed.push((cell, walkable));
            }
        }
        changed
    }

    /// Overrides the walkability of a single cell, returning whether it changed.
    pub fn set_walkable(&mut self, cell: Cell, walkable: bool) -> bool {
        let Some(slot) = self
            .index
            .offset(cell)
            .and_then(|offset| self.cells.get_mut(offset))
        else {
            return false;
        };

        let changed = *slot != walkable;
        *slot = walkable;
        changed
    }

    /// Number of cells that are currently blocked.
    #[must_use]
    pub fn blocked_count(&self) -> usize {
        self.view().blocked_count()
    }

    /// Read-only view handed to planners.
    #[must_use]
    pub fn view(&self) -> WalkabilityView<'_> {
        WalkabilityView::new(&self.cells, self.index.width(), self.index.height())
    }
}
