#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Match-resolution system that clears runs of three and compacts the queue.
//!
//! The engine is a tick-driven state machine. It reacts to world events,
//! emits world commands, and asks the [`MotionHost`] to animate units. Phases
//! that wait on animations persist across ticks and are re-polled whenever
//! the engine handles a new batch of events.

use std::time::Duration;

use queue_match_core::{Command, CompletionTicket, Event, MotionHost, SlotView, UnitId};
use tracing::{debug, error};

/// Delay between the triggering arrival and the first scan.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(50);

/// Configuration parameters required to construct the engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Config {
    settle_delay: Duration,
}

impl Config {
    /// Creates a configuration with the provided settle delay.
    #[must_use]
    pub const fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    /// Time the engine waits after locking the board before it scans.
    #[must_use]
    pub const fn settle_delay(&self) -> Duration {
        self.settle_delay
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}

/// Coarse state reported to callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// No cycle is running and the board is unlocked.
    Idle,
    /// A cycle holds the board lock.
    Resolving,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Phase {
    Settling { remaining: Duration },
    Scanning,
    AwaitingClear,
    Removing { ticket: CompletionTicket },
    AwaitingCompaction,
    Repositioning { units: Vec<UnitId> },
}

/// Pure system that resolves matches in the queue.
#[derive(Debug, Default)]
pub struct MatchEngine {
    config: Config,
    phase: Option<Phase>,
    cycles_completed: u64,
    runs_cleared: u64,
}

impl MatchEngine {
    /// Creates an idle engine.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Reports whether a cycle is running.
    #[must_use]
    pub fn state(&self) -> EngineState {
        if self.phase.is_some() {
            EngineState::Resolving
        } else {
            EngineState::Idle
        }
    }

    /// Number of cycles that ran to completion and released the board.
    #[must_use]
    pub const fn cycles_completed(&self) -> u64 {
        self.cycles_completed
    }

    /// Number of runs removed across all cycles.
    #[must_use]
    pub const fn runs_cleared(&self) -> u64 {
        self.runs_cleared
    }

    /// Consumes world events and the current queue view to emit commands.
    ///
    /// `slots` and `board_locked` must reflect the world after the commands
    /// that produced `events` were applied.
    pub fn handle<H>(
        &mut self,
        events: &[Event],
        slots: SlotView<'_>,
        board_locked: bool,
        host: &mut H,
        out: &mut Vec<Command>,
    ) where
        H: MotionHost + ?Sized,
    {
        for event in events {
            self.observe(event, slots, board_locked, host, out);
        }

        self.advance(slots, host, out);
    }

    fn observe<H>(
        &mut self,
        event: &Event,
        slots: SlotView<'_>,
        board_locked: bool,
        host: &mut H,
        out: &mut Vec<Command>,
    ) where
        H: MotionHost + ?Sized,
    {
        match event {
            Event::UnitArrived { unit, index } => {
                if self.phase.is_some() || board_locked {
                    return;
                }
                if let Some(moving) = slots.units().find(|queued| host.is_unit_moving(*queued)) {
                    debug!(%unit, %moving, "arrival deferred while a queued unit moves");
                    return;
                }
                debug!(%unit, index, "match cycle started");
                out.push(Command::LockBoard);
                self.phase = Some(Phase::Settling {
                    remaining: self.config.settle_delay,
                });
            }
            Event::TimeAdvanced { dt } => {
                if let Some(Phase::Settling { remaining }) = &mut self.phase {
                    *remaining = remaining.saturating_sub(*dt);
                }
            }
            Event::UnitInserted {
                unit,
                index,
                shifted,
                ..
            } => {
                for moved in shifted {
                    let _ = host.animate_move(moved.unit, moved.to);
                }
                let _ = host.animate_move(*unit, *index);
            }
            Event::RunCleared { start, units, .. } => {
                if self.phase != Some(Phase::AwaitingClear) {
                    return;
                }
                let ticket = host.animate_removal(*units);
                self.runs_cleared = self.runs_cleared.saturating_add(1);
                debug!(start, ticket = ticket.get(), "run removal animating");
                self.phase = Some(Phase::Removing { ticket });
            }
            Event::QueueCompacted { moves } => {
                if self.phase != Some(Phase::AwaitingCompaction) {
                    return;
                }
                let units = moves
                    .iter()
                    .map(|moved| {
                        let _ = host.animate_move(moved.unit, moved.to);
                        moved.unit
                    })
                    .collect();
                self.phase = Some(Phase::Repositioning { units });
            }
            Event::RunRejected { start, reason } => {
                if self.phase.is_none() {
                    return;
                }
                error!(start, %reason, "match cycle aborted");
                out.push(Command::UnlockBoard);
                self.phase = None;
            }
            _ => {}
        }
    }

    fn advance<H>(&mut self, slots: SlotView<'_>, host: &mut H, out: &mut Vec<Command>)
    where
        H: MotionHost + ?Sized,
    {
        loop {
            let Some(phase) = self.phase.take() else {
                return;
            };

            let next = match phase {
                Phase::Settling { remaining } if remaining.is_zero() => Phase::Scanning,
                Phase::Scanning => {
                    match slots.first_match_run() {
                        Some(start) => {
                            debug!(start, "match found");
                            out.push(Command::ClearRun { start });
                            self.phase = Some(Phase::AwaitingClear);
                        }
                        None => {
                            self.cycles_completed = self.cycles_completed.saturating_add(1);
                            debug!(cycles = self.cycles_completed, "match cycle finished");
                            out.push(Command::UnlockBoard);
                        }
                    }
                    return;
                }
                Phase::Removing { ticket } if host.is_complete(ticket) => {
                    out.push(Command::CompactQueue);
                    self.phase = Some(Phase::AwaitingCompaction);
                    return;
                }
                Phase::Repositioning { units }
                    if !units.iter().any(|unit| host.is_unit_moving(*unit)) =>
                {
                    Phase::Scanning
                }
                waiting => {
                    self.phase = Some(waiting);
                    return;
                }
            };

            self.phase = Some(next);
        }
    }
}
