//! Threaded service wrapper around the correlator.
//!
//! Collectors enqueue raw JSON events through a cloneable sender; a single
//! consumer thread owns the write side of the correlator and runs the core
//! loop. The host reads alerts, graphs, and stats through short read-lock
//! snapshots that never hold the writer up for long.
//!
//! Shutdown finishes the in-flight event, drains the queue up to a
//! deadline, then discards whatever is left and exits.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::alert::Alert;
use crate::correlator::Correlator;
use crate::error::EngineError;
use crate::graph::DecisionGraph;
use crate::stats::StatsSnapshot;

/// How long `recv` waits before re-checking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default time allowed to drain queued events during shutdown.
pub const DEFAULT_DRAIN_DEADLINE: Duration = Duration::from_secs(5);

/// A running correlation service.
pub struct Service {
    sender: mpsc::Sender<Value>,
    shared: Arc<RwLock<Correlator>>,
    stop: Arc<AtomicBool>,
    drain_deadline: Duration,
    worker: Option<thread::JoinHandle<()>>,
}

impl Service {
    /// Spawn the consumer thread with the default drain deadline.
    pub fn spawn(correlator: Correlator) -> Self {
        Self::spawn_with_deadline(correlator, DEFAULT_DRAIN_DEADLINE)
    }

    /// Spawn the consumer thread with an explicit drain deadline.
    pub fn spawn_with_deadline(correlator: Correlator, drain_deadline: Duration) -> Self {
        let shared = Arc::new(RwLock::new(correlator));
        let stop = Arc::new(AtomicBool::new(false));
        let (sender, receiver) = mpsc::channel::<Value>();

        let worker_shared = Arc::clone(&shared);
        let worker_stop = Arc::clone(&stop);
        let worker = thread::Builder::new()
            .name("correl-core".into())
            .spawn(move || run_loop(worker_shared, receiver, worker_stop, drain_deadline))
            .expect("failed to spawn correlator thread");

        Service {
            sender,
            shared,
            stop,
            drain_deadline,
            worker: Some(worker),
        }
    }

    /// A cloneable handle for producers. Enqueue is thread-safe; events
    /// are processed in enqueue order by the single consumer.
    pub fn sender(&self) -> mpsc::Sender<Value> {
        self.sender.clone()
    }

    /// Signal shutdown and wait for the consumer thread to exit.
    ///
    /// The loop finishes the current event, drains the queue up to the
    /// drain deadline, then discards the remainder. Returns the final
    /// stats snapshot.
    pub fn stop(mut self) -> StatsSnapshot {
        self.stop.store(true, Ordering::Release);
        self.join_worker();
        self.shared.read().stats()
    }

    pub fn alerts(&self) -> Vec<Alert> {
        self.shared.read().alerts()
    }

    pub fn graphs(&self) -> Vec<DecisionGraph> {
        self.shared.read().graphs()
    }

    pub fn export_graph(&self, index: usize) -> Option<String> {
        self.shared.read().export_graph(index)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.read().stats()
    }

    /// The configured drain deadline.
    pub fn drain_deadline(&self) -> Duration {
        self.drain_deadline
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.join_worker();
    }
}

fn run_loop(
    shared: Arc<RwLock<Correlator>>,
    receiver: mpsc::Receiver<Value>,
    stop: Arc<AtomicBool>,
    drain_deadline: Duration,
) {
    debug!("correlator loop started");
    loop {
        if stop.load(Ordering::Acquire) {
            drain(&shared, &receiver, drain_deadline);
            break;
        }
        match receiver.recv_timeout(POLL_INTERVAL) {
            Ok(value) => {
                // Schema errors are counted inside the correlator; the
                // loop keeps consuming either way.
                let _ = shared.write().process_json(&value);
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
    info!("correlator loop stopped");
}

/// Process queued events until the queue is empty or the deadline passes;
/// count and discard anything left after that.
fn drain(shared: &Arc<RwLock<Correlator>>, receiver: &mpsc::Receiver<Value>, deadline: Duration) {
    let started = Instant::now();
    loop {
        match receiver.try_recv() {
            Ok(value) => {
                if started.elapsed() > deadline {
                    let discarded = 1 + receiver.try_iter().count();
                    warn!("{}", EngineError::ShutdownDeadlineExceeded { discarded });
                    return;
                }
                let _ = shared.write().process_json(&value);
            }
            Err(_) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlator::CorrelatorConfig;
    use correl_rules::parse_rules_yaml;
    use serde_json::json;

    fn burst_correlator() -> Correlator {
        let mut correlator = Correlator::new(CorrelatorConfig::default());
        let doc = parse_rules_yaml(
            r#"
rules:
  - id: CNT-001
    name: Failed Login Burst
    severity: MEDIUM
    conditions:
      - type: auth_fail
        window: 120
        count: ">= 3"
        group_by: [user]
    actions:
      - alert: {}
"#,
        )
        .unwrap();
        correlator.load_rules(doc).unwrap();
        correlator
    }

    #[test]
    fn test_service_processes_enqueued_events() {
        let service = Service::spawn(burst_correlator());
        let sender = service.sender();

        for ts in [100, 101, 102] {
            sender
                .send(json!({"type": "auth_fail", "timestamp": ts, "user": "alice"}))
                .unwrap();
        }

        // Wait for the consumer to catch up.
        let deadline = Instant::now() + Duration::from_secs(5);
        while service.stats().events_processed < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }

        assert_eq!(service.stats().events_processed, 3);
        assert_eq!(service.alerts().len(), 1);
        service.stop();
    }

    #[test]
    fn test_stop_drains_queue() {
        let service = Service::spawn(burst_correlator());
        let sender = service.sender();
        let shared = Arc::clone(&service.shared);

        for ts in [200, 201, 202] {
            sender
                .send(json!({"type": "auth_fail", "timestamp": ts, "user": "bob"}))
                .unwrap();
        }
        // Stop immediately: everything queued must still be processed
        // within the drain deadline.
        let stats = service.stop();
        assert_eq!(stats.events_processed, 3);
        assert_eq!(shared.read().alerts().len(), 1);
    }

    #[test]
    fn test_multiple_producers() {
        let service = Service::spawn(burst_correlator());

        let handles: Vec<_> = (0..3)
            .map(|i| {
                let sender = service.sender();
                thread::spawn(move || {
                    sender
                        .send(json!({
                            "type": "auth_fail",
                            "timestamp": 300 + i,
                            "user": "carol"
                        }))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while service.stats().events_processed < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(service.stats().events_processed, 3);
        service.stop();
    }
}
