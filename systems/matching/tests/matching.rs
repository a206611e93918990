use std::{collections::BTreeSet, time::Duration};

use queue_match_core::{
    ColorTag, Command, CompletionTicket, Event, GridConfig, InsertError, MotionHost, UnitId,
};
use queue_match_system_matching::{EngineState, MatchEngine};
use queue_match_world::{self as world, query, World};

const SETTLE: Duration = Duration::from_millis(50);

#[derive(Debug, Default)]
struct ScriptedHost {
    next_ticket: u64,
    running: BTreeSet<CompletionTicket>,
    moving: BTreeSet<UnitId>,
    removals: Vec<[UnitId; 3]>,
    moves: Vec<(UnitId, usize)>,
}

impl ScriptedHost {
    fn issue(&mut self) -> CompletionTicket {
        self.next_ticket += 1;
        let ticket = CompletionTicket::new(self.next_ticket);
        let _ = self.running.insert(ticket);
        ticket
    }

    fn finish_all(&mut self) {
        self.running.clear();
        self.moving.clear();
    }
}

impl MotionHost for ScriptedHost {
    fn animate_removal(&mut self, units: [UnitId; 3]) -> CompletionTicket {
        self.removals.push(units);
        self.issue()
    }

    fn animate_move(&mut self, unit: UnitId, to_slot: usize) -> CompletionTicket {
        self.moves.push((unit, to_slot));
        let _ = self.moving.insert(unit);
        self.issue()
    }

    fn is_complete(&self, ticket: CompletionTicket) -> bool {
        !self.running.contains(&ticket)
    }

    fn is_unit_moving(&self, unit: UnitId) -> bool {
        self.moving.contains(&unit)
    }
}

struct Harness {
    world: World,
    engine: MatchEngine,
    host: ScriptedHost,
    commands: Vec<Command>,
}

impl Harness {
    fn new(capacity: usize) -> Self {
        Self {
            world: World::with_layout(GridConfig::default(), capacity),
            engine: MatchEngine::default(),
            host: ScriptedHost::default(),
            commands: Vec::new(),
        }
    }

    fn apply(&mut self, commands: Vec<Command>) -> Vec<Event> {
        let mut events = Vec::new();
        for command in commands {
            world::apply(&mut self.world, command, &mut events);
        }
        self.pump(events.clone());
        events
    }

    fn pump(&mut self, mut events: Vec<Event>) {
        loop {
            if events.is_empty() {
                break;
            }

            let mut commands = Vec::new();
            self.engine.handle(
                &events,
                query::slot_view(&self.world),
                query::is_board_locked(&self.world),
                &mut self.host,
                &mut commands,
            );

            if commands.is_empty() {
                break;
            }

            self.commands.extend(commands.iter().cloned());
            events.clear();
            for command in commands {
                world::apply(&mut self.world, command, &mut events);
            }
        }
    }

    fn insert(&mut self, unit: u32, color: &str) -> Vec<Event> {
        self.apply(vec![Command::InsertUnit {
            unit: UnitId::new(unit),
            color: ColorTag::new(color).expect("tag"),
        }])
    }

    fn arrive(&mut self, unit: u32) {
        let _ = self.apply(vec![Command::ReportArrival {
            unit: UnitId::new(unit),
        }]);
    }

    fn tick(&mut self, dt: Duration) {
        let _ = self.apply(vec![Command::Tick { dt }]);
    }

    fn settle(&mut self) {
        for _ in 0..16 {
            self.host.finish_all();
            self.tick(SETTLE);
            if self.engine.state() == EngineState::Idle {
                return;
            }
        }
        panic!("engine did not return to idle");
    }

    fn colors(&self) -> Vec<String> {
        query::slot_view(&self.world)
            .iter()
            .map(|slot| slot.map_or_else(|| "_".to_owned(), |o| o.color.to_string()))
            .collect()
    }

    fn lock_requests(&self) -> usize {
        self.commands
            .iter()
            .filter(|command| matches!(command, Command::LockBoard))
            .count()
    }
}

fn fill(harness: &mut Harness, colors: &[&str]) {
    for (unit, color) in colors.iter().enumerate() {
        let _ = harness.insert(unit as u32 + 1, color);
    }
    harness.host.finish_all();
}

#[test]
fn match_and_compact_cycle_returns_to_idle() {
    let mut harness = Harness::new(5);
    fill(&mut harness, &["R", "R", "R", "G", "Y"]);

    harness.arrive(3);
    assert_eq!(harness.engine.state(), EngineState::Resolving);
    assert!(query::is_board_locked(&harness.world));

    harness.tick(SETTLE);
    assert_eq!(
        harness.host.removals,
        vec![[UnitId::new(1), UnitId::new(2), UnitId::new(3)]]
    );
    assert_eq!(harness.colors(), vec!["_", "_", "_", "G", "Y"]);

    harness.settle();

    assert_eq!(harness.colors(), vec!["G", "Y", "_", "_", "_"]);
    assert!(!query::is_board_locked(&harness.world));
    assert_eq!(harness.engine.cycles_completed(), 1);
    assert_eq!(harness.engine.runs_cleared(), 1);
    assert!(harness
        .host
        .moves
        .ends_with(&[(UnitId::new(4), 0), (UnitId::new(5), 1)]));
}

#[test]
fn removal_waits_for_host_completion() {
    let mut harness = Harness::new(5);
    fill(&mut harness, &["R", "R", "R"]);

    harness.arrive(1);
    harness.tick(SETTLE);
    harness.tick(SETTLE);
    harness.tick(SETTLE);

    assert_eq!(harness.engine.state(), EngineState::Resolving);
    assert!(!harness.commands.contains(&Command::CompactQueue));

    harness.settle();
    assert!(harness.commands.contains(&Command::CompactQueue));
    assert_eq!(harness.colors(), vec!["_", "_", "_", "_", "_"]);
}

#[test]
fn insertion_while_resolving_is_rejected() {
    let mut harness = Harness::new(5);
    fill(&mut harness, &["R", "G", "G"]);

    harness.arrive(2);
    let events = harness.insert(9, "K");

    assert_eq!(
        events,
        vec![Event::InsertionRejected {
            unit: UnitId::new(9),
            color: ColorTag::new("K").expect("tag"),
            reason: InsertError::BoardLocked,
        }]
    );
    assert_eq!(harness.colors(), vec!["R", "G", "G", "_", "_"]);

    harness.settle();
    let _ = harness.insert(9, "K");
    assert_eq!(harness.colors(), vec!["R", "G", "G", "K", "_"]);
}

#[test]
fn back_to_back_arrivals_start_one_cycle() {
    let mut harness = Harness::new(5);
    fill(&mut harness, &["R", "R", "R"]);

    let _ = harness.apply(vec![
        Command::ReportArrival {
            unit: UnitId::new(2),
        },
        Command::ReportArrival {
            unit: UnitId::new(3),
        },
    ]);
    harness.arrive(1);

    assert_eq!(harness.lock_requests(), 1);
    harness.settle();
    assert_eq!(harness.engine.cycles_completed(), 1);
    assert_eq!(harness.engine.runs_cleared(), 1);
}

#[test]
fn run_of_four_leaves_one_unit_behind() {
    let mut harness = Harness::new(6);
    fill(&mut harness, &["R", "R", "R", "R", "G"]);

    harness.arrive(4);
    harness.settle();

    assert_eq!(harness.colors(), vec!["R", "G", "_", "_", "_", "_"]);
    assert_eq!(harness.engine.runs_cleared(), 1);
}

#[test]
fn consecutive_runs_resolve_within_one_cycle() {
    let mut harness = Harness::new(7);
    fill(&mut harness, &["R", "R", "R", "G", "G", "G", "Y"]);

    harness.arrive(7);
    harness.settle();

    assert_eq!(harness.colors(), vec!["Y", "_", "_", "_", "_", "_", "_"]);
    assert_eq!(harness.engine.runs_cleared(), 2);
    assert_eq!(harness.engine.cycles_completed(), 1);
    assert_eq!(harness.lock_requests(), 1);
}

#[test]
fn moving_units_defer_the_cycle() {
    let mut harness = Harness::new(5);
    let _ = harness.insert(1, "R");
    let _ = harness.insert(2, "R");
    let _ = harness.insert(3, "R");
    let _ = harness.host.moving.remove(&UnitId::new(1));

    harness.arrive(1);
    assert_eq!(harness.engine.state(), EngineState::Idle);
    assert_eq!(harness.lock_requests(), 0);

    harness.host.finish_all();
    harness.arrive(3);
    assert_eq!(harness.engine.state(), EngineState::Resolving);
}

#[test]
fn queue_without_match_unlocks_after_settling() {
    let mut harness = Harness::new(5);
    fill(&mut harness, &["R", "G", "Y"]);

    harness.arrive(3);
    harness.settle();

    assert_eq!(harness.engine.cycles_completed(), 1);
    assert_eq!(harness.engine.runs_cleared(), 0);
    assert!(!query::is_board_locked(&harness.world));
    assert_eq!(harness.colors(), vec!["R", "G", "Y", "_", "_"]);
}
