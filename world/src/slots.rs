//! Fixed-capacity queue slot storage owned by the world.

use queue_match_core::{
    ColorTag, InsertError, RunError, SlotMove, SlotOccupant, SlotView, UnitId, MATCH_RUN_LENGTH,
};

/// Outcome of a successful insertion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Insertion {
    /// Slot the new unit was written into.
    pub index: usize,
    /// Units pushed one slot to the right to vacate `index`, left to right.
    pub shifted: Vec<SlotMove>,
}

/// Ordered, fixed-size sequence of queue slots.
///
/// The slot count never changes after construction. Every operation either
/// completes or leaves the slots untouched.
#[derive(Clone, Debug, Default)]
pub struct QueueSlots {
    slots: Vec<Option<SlotOccupant>>,
}

impl QueueSlots {
    /// Creates `capacity` empty slots.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    /// Number of slots in the queue.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Read-only view over the slots.
    #[must_use]
    pub fn view(&self) -> SlotView<'_> {
        SlotView::new(&self.slots)
    }

    /// Occupant of the slot at `index`, if any.
    #[must_use]
    pub fn occupant(&self, index: usize) -> Option<&SlotOccupant> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// Iterates every slot from left to right.
    pub fn iter(&self) -> impl Iterator<Item = Option<&SlotOccupant>> + '_ {
        self.slots.iter().map(Option::as_ref)
    }

    /// Slot owned by `unit`, if it is queued.
    #[must_use]
    pub fn position_of(&self, unit: UnitId) -> Option<usize> {
        self.view().position_of(unit)
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Reports whether every slot is occupied.
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    /// Slot a unit of `color` would be written into.
    ///
    /// Units join directly right of the last unit sharing their color, even
    /// when that slot is occupied; otherwise they take the first empty slot.
    #[must_use]
    pub fn find_insertion_index(&self, color: &ColorTag) -> Option<usize> {
        let last_same = self
            .slots
            .iter()
            .rposition(|slot| slot.as_ref().is_some_and(|occupant| &occupant.color == color));

        match last_same {
            Some(index) => {
                let target = index + 1;
                (target < self.slots.len()).then_some(target)
            }
            None => self.slots.iter().position(Option::is_none),
        }
    }

    /// Slot a unit of `color` would actually be given by [`Self::insert`].
    ///
    /// Unlike [`Self::find_insertion_index`], an occupied target only counts
    /// when an empty slot right of it leaves room for the shift.
    #[must_use]
    pub fn can_insert(&self, color: &ColorTag) -> Option<usize> {
        let target = self.find_insertion_index(color)?;
        if self.slots[target].is_none() {
            return Some(target);
        }
        self.last_empty_index()
            .filter(|empty| *empty > target)
            .map(|_| target)
    }

    /// Writes `unit` into its color-aware slot, shifting occupants right when
    /// the slot is taken.
    pub fn insert(&mut self, unit: UnitId, color: ColorTag) -> Result<Insertion, InsertError> {
        if self.position_of(unit).is_some() {
            return Err(InsertError::AlreadyQueued);
        }

        let target = self.can_insert(&color).ok_or(InsertError::QueueFull)?;

        let mut shifted = Vec::new();
        if self.slots[target].is_some() {
            let last_empty = self.last_empty_index().ok_or(InsertError::QueueFull)?;

            for index in (target + 1..=last_empty).rev() {
                let moved = self.slots[index - 1].take();
                if let Some(occupant) = &moved {
                    shifted.push(SlotMove {
                        unit: occupant.unit,
                        from: index - 1,
                        to: index,
                    });
                }
                self.slots[index] = moved;
            }
            shifted.reverse();
        }

        self.slots[target] = Some(SlotOccupant::new(unit, color));
        Ok(Insertion {
            index: target,
            shifted,
        })
    }

    /// Stable left-pack of the occupied slots.
    ///
    /// Returns the units whose slot changed, left to right.
    pub fn compact_left(&mut self) -> Vec<SlotMove> {
        let mut moves = Vec::new();
        let mut write = 0;

        for read in 0..self.slots.len() {
            if self.slots[read].is_none() {
                continue;
            }

            if write != read {
                let occupant = self.slots[read].take();
                if let Some(occupant) = &occupant {
                    moves.push(SlotMove {
                        unit: occupant.unit,
                        from: read,
                        to: write,
                    });
                }
                self.slots[write] = occupant;
            }
            write += 1;
        }

        debug_assert!(self.slots[write..].iter().all(Option::is_none));
        moves
    }

    /// Leftmost index that starts a run of three identical colors.
    #[must_use]
    pub fn first_match_run(&self) -> Option<usize> {
        self.view().first_match_run()
    }

    /// Empties the three slots of the run starting at `start`.
    pub fn clear_run(
        &mut self,
        start: usize,
    ) -> Result<[SlotOccupant; MATCH_RUN_LENGTH], RunError> {
        let capacity = self.slots.len();
        let end = start
            .checked_add(MATCH_RUN_LENGTH)
            .filter(|end| *end <= capacity)
            .ok_or(RunError::OutOfBounds { start, capacity })?;

        if !self.is_run_at(start, end) {
            return Err(RunError::NotAMatch { start });
        }

        let cleared: Vec<SlotOccupant> = self.slots[start..end]
            .iter_mut()
            .filter_map(Option::take)
            .collect();
        <[SlotOccupant; MATCH_RUN_LENGTH]>::try_from(cleared)
            .map_err(|_| RunError::NotAMatch { start })
    }

    fn is_run_at(&self, start: usize, end: usize) -> bool {
        let run = &self.slots[start..end];
        match run.first() {
            Some(Some(first)) => run
                .iter()
                .all(|slot| slot.as_ref().is_some_and(|other| other.color == first.color)),
            _ => false,
        }
    }

    fn last_empty_index(&self) -> Option<usize> {
        self.slots.iter().rposition(Option::is_none)
    }
}
