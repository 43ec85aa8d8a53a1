use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver};

use pvabridge::data::{Member, ScalarKind, Store, TypeDef, Value};
use pvabridge::{BridgeConfig, Context, MemoryClient, OutputMode};

fn strict_context() -> (Arc<MemoryClient>, Context) {
    let cfg = BridgeConfig {
        output: OutputMode::Strict,
        ..BridgeConfig::default()
    };
    let client = Arc::new(MemoryClient::from_config(&cfg));
    let ctx = Context::new(cfg, client.clone());
    (client, ctx)
}

fn counter(n: i64) -> Value {
    let ty = TypeDef::structure("demo:counter", [Member::scalar(ScalarKind::Int64, "n")])
        .build()
        .unwrap();
    let mut value = Value::create(&ty);
    value.set("n", n).unwrap();
    value
}

fn next_n(rx: &Receiver<String>) -> i64 {
    let text = rx.recv_timeout(Duration::from_secs(2)).expect("update");
    let parsed: serde_json::Value = serde_json::from_str(&text).expect("strict json");
    parsed["n"].as_i64().expect("n")
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(2);
    while !done() {
        assert!(Instant::now() < deadline, "condition not reached");
        std::thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn monitor_delivers_updates_in_arrival_order() {
    let (client, ctx) = strict_context();
    client.open("demo:counter", counter(0)).unwrap();

    let (tx, rx) = unbounded();
    let monitor = ctx
        .monitor("demo:counter", move |text: &str| {
            let _ = tx.send(text.to_string());
        })
        .unwrap();

    assert_eq!(next_n(&rx), 0);
    for n in 1..=20 {
        client.post("demo:counter", counter(n)).unwrap();
        assert_eq!(next_n(&rx), n);
    }

    wait_until(|| monitor.stats().delivered == 21);
    assert!(rx.try_recv().is_err());
    assert_eq!(monitor.name(), "demo:counter");
}

#[test]
fn monitor_before_channel_exists_waits_for_first_value() {
    let (client, ctx) = strict_context();
    let (tx, rx) = unbounded();
    let _monitor = ctx
        .monitor("late:pv", move |text: &str| {
            let _ = tx.send(text.to_string());
        })
        .unwrap();

    assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    client.open("late:pv", counter(7)).unwrap();
    assert_eq!(next_n(&rx), 7);
}

#[test]
fn fault_in_one_update_does_not_stop_the_next() {
    let (client, ctx) = strict_context();
    client.open("demo:counter", counter(0)).unwrap();

    let (tx, rx) = unbounded();
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    let monitor = ctx
        .monitor("demo:counter", move |text: &str| {
            if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                panic!("callback failure on first update");
            }
            let _ = tx.send(text.to_string());
        })
        .unwrap();

    wait_until(|| monitor.stats().faults == 1);
    client.post("demo:counter", counter(1)).unwrap();
    assert_eq!(next_n(&rx), 1);

    wait_until(|| monitor.stats().delivered == 1);
    assert_eq!(monitor.stats().faults, 1);
}

#[test]
fn connection_events_do_not_reach_the_callback() {
    let (client, ctx) = strict_context();
    client.open("demo:counter", counter(0)).unwrap();

    let (tx, rx) = unbounded();
    let monitor = ctx
        .monitor("demo:counter", move |text: &str| {
            let _ = tx.send(text.to_string());
        })
        .unwrap();
    assert_eq!(next_n(&rx), 0);

    client.close_channel("demo:counter").unwrap();
    client.open("demo:counter", counter(5)).unwrap();
    assert_eq!(next_n(&rx), 5);

    wait_until(|| monitor.stats().skipped == 3);
    assert!(rx.try_recv().is_err());
}

#[test]
fn close_stops_callbacks_and_is_idempotent() {
    let (client, ctx) = strict_context();
    client.open("demo:counter", counter(0)).unwrap();

    let (tx, rx) = unbounded();
    let monitor = ctx
        .monitor("demo:counter", move |text: &str| {
            let _ = tx.send(text.to_string());
        })
        .unwrap();
    assert_eq!(next_n(&rx), 0);

    monitor.close();
    monitor.close();
    assert!(monitor.is_closed());

    client.post("demo:counter", counter(1)).unwrap();
    // The callback, and with it the sender, is gone once the worker exits.
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    let current = client.current("demo:counter").unwrap().unwrap();
    assert_eq!(current.get("n").and_then(Store::as_i64), Some(1));
}

#[test]
fn independent_monitors_on_one_channel() {
    let (client, ctx) = strict_context();
    client.open("demo:counter", counter(0)).unwrap();

    let (tx_a, rx_a) = unbounded();
    let (tx_b, rx_b) = unbounded();
    let a = ctx
        .monitor("demo:counter", move |t: &str| {
            let _ = tx_a.send(t.to_string());
        })
        .unwrap();
    let b = ctx
        .monitor("demo:counter", move |t: &str| {
            let _ = tx_b.send(t.to_string());
        })
        .unwrap();
    assert_ne!(a.id(), b.id());

    assert_eq!(next_n(&rx_a), 0);
    assert_eq!(next_n(&rx_b), 0);

    drop(a);
    client.post("demo:counter", counter(2)).unwrap();
    assert_eq!(next_n(&rx_b), 2);
    assert!(rx_a.recv_timeout(Duration::from_millis(50)).is_err());
}

#[test]
fn literal_mode_text_reaches_callback() {
    let client = Arc::new(MemoryClient::new());
    let ctx = Context::new(BridgeConfig::default(), client.clone());
    client.open("demo:counter", counter(3)).unwrap();

    let (tx, rx) = unbounded();
    let _monitor = ctx
        .monitor("demo:counter", move |t: &str| {
            let _ = tx.send(t.to_string());
        })
        .unwrap();

    let text = rx.recv_timeout(Duration::from_secs(2)).unwrap();
    let flat: String = text.lines().map(str::trim).collect();
    assert_eq!(flat, "{\"id\": \"demo:counter\",\"n\": 3,}");
}
