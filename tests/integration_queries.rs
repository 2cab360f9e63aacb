//! End-to-end flows against the local WMI service.

#![cfg(windows)]

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use wbem_bridge::{
    ComRuntime, EventTarget, QueryMode, Row, SubscriptionStatus, WbemConnection, WbemError,
    WbemValue,
};

fn connect() -> WbemConnection {
    // No explicit security context: the tests share one process, and
    // `CoInitializeSecurity` can only ever succeed once in it.
    let com = ComRuntime::without_security().expect("failed to initialize COM");

    WbemConnection::localhost(com).expect("failed to connect to ROOT\\CIMV2")
}

/// Collects everything a subscription delivers; equality is by name.
struct CollectingTarget {
    name: String,
    rows: Mutex<Vec<Row>>,
    status_reports: AtomicUsize,
    completed: AtomicBool,
}

impl CollectingTarget {
    fn new(name: &str) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            rows: Mutex::new(Vec::new()),
            status_reports: AtomicUsize::new(0),
            completed: AtomicBool::new(false),
        })
    }

    fn wait_for_completion(&self, timeout: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < timeout {
            if self.completed.load(Ordering::SeqCst) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        false
    }
}

impl EventTarget for CollectingTarget {
    fn row_available(&self, row: Row) {
        self.rows.lock().unwrap().push(row);
    }

    fn status(&self, _status: SubscriptionStatus) {
        self.status_reports.fetch_add(1, Ordering::SeqCst);
    }

    fn completed(&self, _hres: i32) {
        self.completed.store(true, Ordering::SeqCst);
    }

    fn same_target(&self, other: &dyn EventTarget) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| other.name == self.name)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn it_runs_a_blocking_query_end_to_end() {
    let con = connect();

    let rows = con
        .exec_query("SELECT * FROM Win32_Processor", QueryMode::Blocking)
        .unwrap();

    assert!(!rows.is_empty());

    for row in &rows {
        match row.get("Name") {
            Some(WbemValue::String(name)) => assert!(!name.is_empty()),
            other => panic!("expected a processor name, got {:?}", other),
        }
    }
}

#[test]
fn it_streams_an_async_query_to_completion() {
    let con = connect();
    let target = CollectingTarget::new("os-query");

    con.exec_query_async(
        "SELECT Caption FROM Win32_OperatingSystem",
        target.clone(),
        true,
    )
    .unwrap();

    assert!(
        target.wait_for_completion(Duration::from_secs(10)),
        "the stream did not complete in time"
    );

    let rows = target.rows.lock().unwrap();
    assert_eq!(rows.len(), 1);
    assert!(matches!(rows[0].get("Caption"), Some(WbemValue::String(_))));

    // Completion removed the subscription from the registry.
    assert_eq!(con.active_subscriptions(), 0);
}

#[test]
fn it_cancels_with_a_value_equal_target() {
    let con = connect();
    let target = CollectingTarget::new("driver-query");

    con.exec_query_async("SELECT * FROM Win32_SystemDriver", target.clone(), false)
        .unwrap();

    // A different wrapper instance that refers to the same logical target.
    let probe = CollectingTarget::new("driver-query");

    // Cancellation is best effort: a short stream may have completed (and
    // deregistered itself) before the cancel call finds it.
    match con.cancel_async(probe.as_ref()) {
        Ok(()) => assert_eq!(con.active_subscriptions(), 0),
        Err(WbemError::SinkNotFound) => {
            assert!(target.completed.load(Ordering::SeqCst));
        }
        Err(e) => panic!("unexpected cancel failure: {}", e),
    }
}

#[test]
fn it_fails_to_cancel_an_unknown_target() {
    let con = connect();
    let probe = CollectingTarget::new("never-submitted");

    let res = con.cancel_async(probe.as_ref());

    assert!(matches!(res, Err(WbemError::SinkNotFound)));
}

#[test]
fn it_stops_subscriptions_when_the_connection_closes() {
    let mut con = connect();
    let target = CollectingTarget::new("close-query");

    con.exec_query_async("SELECT * FROM Win32_Service", target.clone(), false)
        .unwrap();

    con.close();

    assert!(con.is_closed());
    assert_eq!(con.active_subscriptions(), 0);
}
