//! Scheduling behavior of the timer daemon.

mod common;

use breakwater::clock;
use breakwater::job::JobDispatcher;
use breakwater::timer::TimerDaemon;
use common::init_tracing;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

fn services() -> (TimerDaemon, Arc<JobDispatcher>) {
    init_tracing();
    let dispatcher = JobDispatcher::start(1);
    (TimerDaemon::start(dispatcher.clone()), dispatcher)
}

#[test]
fn periodic_timer_respects_its_period() {
    let (timers, dispatcher) = services();
    let (tx, rx) = mpsc::channel();
    let registered_at = clock::now_ms();
    let _timer = timers.register_relative(
        100,
        50,
        Arc::new(move |_, fired_at, period| {
            tx.send((fired_at, period)).ok();
        }),
    );

    let mut fired = Vec::new();
    for _ in 0..3 {
        fired.push(rx.recv_timeout(Duration::from_secs(3)).expect("firing"));
    }
    // First firing no earlier than the requested offset.
    assert!(fired[0].0 >= registered_at + 100);
    // Every callback sees the current period.
    assert!(fired.iter().all(|&(_, period)| period == 50));
    // Three firings span at least two full periods.
    assert!(fired[2].0 >= fired[0].0 + 100 - 10);

    timers.stop();
    dispatcher.stop();
}

#[test]
fn reschedule_cancels_the_old_cadence() {
    let (timers, dispatcher) = services();
    let (tx, rx) = mpsc::channel();
    let start = clock::now_ms();
    let timer = timers.register_relative(
        100,
        50,
        Arc::new(move |_, fired_at, period| {
            tx.send((fired_at, period)).ok();
        }),
    );

    // Firing #1 arrives on the original schedule (~start+100).
    let (first_at, first_period) = rx.recv_timeout(Duration::from_secs(3)).expect("first");
    assert_eq!(first_period, 50);
    assert!(first_at >= start + 100);

    // Reschedule to +10ms with a 1000ms period before the old +150 firing.
    timers.set_time(&timer, 10, Some(1000));
    let (second_at, second_period) = rx
        .recv_timeout(Duration::from_secs(3))
        .expect("rescheduled firing");
    assert_eq!(second_period, 1000);

    // No firing from the superseded 50ms cadence: the next one after the
    // reschedule is a full second out.
    assert!(
        rx.recv_timeout(Duration::from_millis(500)).is_err(),
        "stale schedule fired after set_time"
    );
    assert!(second_at < start + 1000);

    timers.stop();
    dispatcher.stop();
}

#[test]
fn dropped_timer_fires_at_most_once_more() {
    let (timers, dispatcher) = services();
    let (tx, rx) = mpsc::channel();
    let timer = timers.register_relative(
        10,
        20,
        Arc::new(move |_, fired_at, _| {
            tx.send(fired_at).ok();
        }),
    );
    rx.recv_timeout(Duration::from_secs(3)).expect("first firing");
    drop(timer);
    // One in-flight firing may still be queued; beyond that, silence.
    let _ = rx.recv_timeout(Duration::from_millis(100));
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    timers.stop();
    dispatcher.stop();
}

#[test]
fn one_shot_absolute_timer_fires_exactly_once() {
    let (timers, dispatcher) = services();
    let (tx, rx) = mpsc::channel();
    let _timer = timers.register_absolute(
        clock::now_ms() + 30,
        0,
        Arc::new(move |_, fired_at, _| {
            tx.send(fired_at).ok();
        }),
    );
    rx.recv_timeout(Duration::from_secs(3)).expect("fired");
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    timers.stop();
    dispatcher.stop();
}

#[test]
fn far_future_periods_do_not_overflow() {
    let (timers, dispatcher) = services();
    let (tx, rx) = mpsc::channel();
    // A period near the u64 ceiling: the next fire time saturates instead of
    // wrapping to the past.
    let _timer = timers.register_relative(
        10,
        u64::MAX,
        Arc::new(move |_, _, _| {
            tx.send(()).ok();
        }),
    );
    rx.recv_timeout(Duration::from_secs(3)).expect("first firing");
    assert!(
        rx.recv_timeout(Duration::from_millis(300)).is_err(),
        "saturated schedule fired again"
    );
    timers.stop();
    dispatcher.stop();
}

#[test]
fn stop_is_idempotent_and_joins_the_thread() {
    let (timers, dispatcher) = services();
    let _timer = timers.register_relative(50_000, 0, Arc::new(|_, _, _| {}));
    timers.stop();
    timers.stop();
    dispatcher.stop();
}
