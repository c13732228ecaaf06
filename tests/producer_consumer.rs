//! Bounded-buffer producer/consumer integration tests.
//!
//! The scenario: two producers each push 8 items through a capacity-5 buffer
//! (one lock, an `empty` semaphore starting at 5, a `filled` semaphore
//! starting at 0, a mailbox as the buffer) to three consumers. Exactly 16
//! items must be consumed, every thread must terminate, and the outcome must
//! be identical under every scheduling policy and seed — correctly
//! synchronized programs are schedule-independent.

use weftvm::prelude::*;

const NUM_PRODUCERS: usize = 2;
const NUM_CONSUMERS: usize = 3;
const ITEMS_PER_PRODUCER: i64 = 8;
const BUFFER_CAPACITY: i64 = 5;
const TOTAL_ITEMS: i64 = ITEMS_PER_PRODUCER * (NUM_PRODUCERS as i64);

fn load(name: &str) -> Instruction {
    Instruction::Load(name.to_string())
}

/// Producer: loop ITEMS_PER_PRODUCER times, each time taking an empty slot,
/// pushing a uniquely numbered item into the buffer under the lock, then
/// signalling a filled slot.
fn producer_program() -> Program {
    Program::new(vec![
        /*  0 */ Instruction::Push(Value::Int(ITEMS_PER_PRODUCER)),
        /*  1 */ Instruction::Store("remaining".to_string()),
        // Loop head: exit once remaining <= 0.
        /*  2 */ Instruction::Push(Value::Int(0)),
        /*  3 */ load("remaining"),
        /*  4 */ Instruction::Sub,
        /*  5 */ Instruction::JumpIf(25),
        /*  6 */ load("empty_sem"),
        /*  7 */ Instruction::SemaphoreAcquire,
        /*  8 */ load("buffer_lock"),
        /*  9 */ Instruction::LockAcquire,
        /* 10 */ load("item_counter"),
        /* 11 */ Instruction::AtomicIncrement,
        /* 12 */ Instruction::Store("item".to_string()),
        /* 13 */ load("buffer_queue"),
        /* 14 */ load("item"),
        /* 15 */ Instruction::QueueSend,
        /* 16 */ load("buffer_lock"),
        /* 17 */ Instruction::LockRelease,
        /* 18 */ load("filled_sem"),
        /* 19 */ Instruction::SemaphoreRelease,
        /* 20 */ load("remaining"),
        /* 21 */ Instruction::Push(Value::Int(1)),
        /* 22 */ Instruction::Sub,
        /* 23 */ Instruction::Store("remaining".to_string()),
        /* 24 */ Instruction::Jump(2),
        /* 25 */ Instruction::Print(Some("producer finished".to_string())),
    ])
}

/// Consumer: claim an item number first; once the claim exceeds the total
/// there is nothing left to consume and the consumer exits, so every thread
/// terminates. Claims at or below the total take a filled slot, receive one
/// item under the lock, free an empty slot and count it consumed.
fn consumer_program() -> Program {
    Program::new(vec![
        // Loop head: claim the next item number.
        /*  0 */ load("claim_counter"),
        /*  1 */ Instruction::AtomicIncrement,
        /*  2 */ Instruction::Store("claim".to_string()),
        // Exit when claim > total (claim - total - 1 >= 0).
        /*  3 */ load("claim"),
        /*  4 */ load("total_items"),
        /*  5 */ Instruction::Sub,
        /*  6 */ Instruction::Push(Value::Int(1)),
        /*  7 */ Instruction::Sub,
        /*  8 */ Instruction::JumpIf(24),
        /*  9 */ load("filled_sem"),
        /* 10 */ Instruction::SemaphoreAcquire,
        /* 11 */ load("buffer_lock"),
        /* 12 */ Instruction::LockAcquire,
        /* 13 */ load("buffer_queue"),
        /* 14 */ Instruction::QueueReceive,
        /* 15 */ Instruction::Store("item".to_string()),
        /* 16 */ load("buffer_lock"),
        /* 17 */ Instruction::LockRelease,
        /* 18 */ load("empty_sem"),
        /* 19 */ Instruction::SemaphoreRelease,
        /* 20 */ load("consumed_counter"),
        /* 21 */ Instruction::AtomicIncrement,
        /* 22 */ Instruction::Pop,
        /* 23 */ Instruction::Jump(0),
        /* 24 */ Instruction::Print(Some("consumer finished".to_string())),
    ])
}

fn build_machine(config: MachineConfig) -> Machine {
    let mut vm = Machine::new(config);

    vm.create_lock(Some("buffer_lock")).unwrap();
    vm.create_semaphore(BUFFER_CAPACITY, Some("empty_sem")).unwrap();
    vm.create_semaphore(0, Some("filled_sem")).unwrap();
    vm.create_mailbox(Some("buffer_queue")).unwrap();
    vm.create_counter(0, Some("item_counter")).unwrap();
    vm.create_counter(0, Some("consumed_counter")).unwrap();
    vm.create_counter(0, Some("claim_counter")).unwrap();

    for name in [
        "buffer_lock",
        "empty_sem",
        "filled_sem",
        "buffer_queue",
        "item_counter",
        "consumed_counter",
        "claim_counter",
    ] {
        vm.set_global(name, Value::from(name));
    }
    vm.set_global("total_items", Value::Int(TOTAL_ITEMS));

    let producer = vm.define_program(producer_program());
    let consumer = vm.define_program(consumer_program());

    for i in 1..=NUM_PRODUCERS {
        vm.spawn(producer, Some(&format!("Producer-{i}")), 0).unwrap();
    }
    for i in 1..=NUM_CONSUMERS {
        vm.spawn(consumer, Some(&format!("Consumer-{i}")), 0).unwrap();
    }

    vm
}

/// Runs the scenario and checks every invariant the buffer must uphold.
fn assert_scenario_holds(config: MachineConfig) {
    let policy = config.policy;
    let seed = config.seed;
    let mut vm = build_machine(config);

    let report = vm.run();
    assert_eq!(
        report.outcome,
        RunOutcome::Completed,
        "policy {policy} seed {seed}: run did not complete"
    );

    // Exactly 16 items produced and consumed, exactly once each.
    assert_eq!(vm.counter_value("item_counter"), Some(TOTAL_ITEMS));
    assert_eq!(vm.counter_value("consumed_counter"), Some(TOTAL_ITEMS));

    // The buffer drained and both semaphores returned to their initial
    // levels: no slot was leaked.
    assert!(vm.sync().mailbox("buffer_queue").unwrap().messages().is_empty());
    assert_eq!(vm.sync().semaphore("empty_sem").unwrap().count(), BUFFER_CAPACITY);
    assert_eq!(vm.sync().semaphore("filled_sem").unwrap().count(), 0);
    assert!(!vm.sync().lock("buffer_lock").unwrap().is_locked());

    // Every producer and consumer terminated normally.
    let reports = vm.thread_reports();
    assert_eq!(reports.len(), NUM_PRODUCERS + NUM_CONSUMERS);
    for thread in &reports {
        assert_eq!(
            thread.state, "terminated",
            "policy {policy} seed {seed}: {} ended {}",
            thread.name, thread.state
        );
    }

    // Each thread announced completion.
    let finished = |needle: &str| {
        vm.output()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    };
    assert_eq!(finished("producer finished"), NUM_PRODUCERS);
    assert_eq!(finished("consumer finished"), NUM_CONSUMERS);
}

#[test]
fn round_robin_consumes_all_items() {
    assert_scenario_holds(MachineConfig::testing());
}

#[test]
fn priority_policy_consumes_all_items() {
    assert_scenario_holds(MachineConfig::testing().with_policy(SchedulePolicy::Priority));
}

#[test]
fn random_policy_is_schedule_independent() {
    for seed in [1, 7, 42, 1337, 0xDEAD_BEEF] {
        assert_scenario_holds(
            MachineConfig::testing()
                .with_policy(SchedulePolicy::Random)
                .with_seed(seed),
        );
    }
}

#[test]
fn mixed_priorities_do_not_change_the_outcome() {
    // Give producers and consumers different priorities; starvation of the
    // low tier would deadlock (producers fill the buffer, nobody drains it),
    // so completion shows the tie-break keeps everyone running.
    let mut vm = {
        let mut vm = Machine::new(MachineConfig::testing().with_policy(SchedulePolicy::Priority));
        vm.create_lock(Some("buffer_lock")).unwrap();
        vm.create_semaphore(BUFFER_CAPACITY, Some("empty_sem")).unwrap();
        vm.create_semaphore(0, Some("filled_sem")).unwrap();
        vm.create_mailbox(Some("buffer_queue")).unwrap();
        vm.create_counter(0, Some("item_counter")).unwrap();
        vm.create_counter(0, Some("consumed_counter")).unwrap();
        vm.create_counter(0, Some("claim_counter")).unwrap();
        for name in [
            "buffer_lock",
            "empty_sem",
            "filled_sem",
            "buffer_queue",
            "item_counter",
            "consumed_counter",
            "claim_counter",
        ] {
            vm.set_global(name, Value::from(name));
        }
        vm.set_global("total_items", Value::Int(TOTAL_ITEMS));

        let producer = vm.define_program(producer_program());
        let consumer = vm.define_program(consumer_program());
        vm.spawn(producer, Some("Producer-1"), 3).unwrap();
        vm.spawn(producer, Some("Producer-2"), 3).unwrap();
        vm.spawn(consumer, Some("Consumer-1"), 1).unwrap();
        vm.spawn(consumer, Some("Consumer-2"), 1).unwrap();
        vm.spawn(consumer, Some("Consumer-3"), 1).unwrap();
        vm
    };

    let report = vm.run();
    assert_eq!(report.outcome, RunOutcome::Completed);
    assert_eq!(vm.counter_value("consumed_counter"), Some(TOTAL_ITEMS));
}
