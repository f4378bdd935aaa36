mod common;

use common::{config, entries, init_tracing, Log, Recorder, IDLE};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use strand_core::{Chain, Condition, EventType, JobState, Stream};
use strand_runtime::{Descriptor, MemoryEndpoint, Multiplexer};

/// Marks the start (bottom) or end (top) of a dispatch, flags overlaps
struct Gate {
    name: &'static str,
    log: Log,
    busy: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
    opens: bool,
}

impl Stream for Gate {
    fn name(&self) -> &str {
        self.name
    }

    fn event(&mut self, event: EventType, _chain: &mut Chain<'_>) -> Condition {
        if event != EventType::Readable {
            return Condition::Ok;
        }
        if self.opens {
            if self.busy.swap(true, Ordering::SeqCst) {
                self.overlaps.fetch_add(1, Ordering::SeqCst);
            }
            self.log.lock().push(format!("{}:readable", self.name));
            thread::sleep(Duration::from_micros(200));
        } else {
            self.log.lock().push(format!("{}:readable", self.name));
            self.busy.store(false, Ordering::SeqCst);
        }
        Condition::Ok
    }
}

/// Holds a Readable dispatch open until released
struct Stall {
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
    finished: Arc<AtomicBool>,
}

impl Stream for Stall {
    fn name(&self) -> &str {
        "stall"
    }

    fn event(&mut self, event: EventType, _chain: &mut Chain<'_>) -> Condition {
        if event == EventType::Readable {
            let _ = self.entered.send(());
            let _ = self.release.recv_timeout(IDLE);
            self.finished.store(true, Ordering::SeqCst);
        }
        Condition::Ok
    }
}

struct Stalled {
    entered: mpsc::Receiver<()>,
    release: mpsc::Sender<()>,
    finished: Arc<AtomicBool>,
}

fn stalled_chain(log: &Log) -> (Descriptor, Stalled, strand_runtime::MemoryPeer) {
    let (entered_tx, entered) = mpsc::channel();
    let (release, release_rx) = mpsc::channel();
    let finished = Arc::new(AtomicBool::new(false));
    let (ep, peer) = MemoryEndpoint::new();
    let mut d = Descriptor::new(ep);
    d.add_stream(Stall { entered: entered_tx, release: release_rx, finished: finished.clone() }).unwrap();
    d.add_stream(Recorder::new("top", log)).unwrap();
    (d, Stalled { entered, release, finished }, peer)
}

#[test]
fn test_dispatches_follow_chain_order_and_never_overlap() {
    init_tracing();
    let mux = Multiplexer::new(config(8)).unwrap();
    let log = Log::default();
    let busy = Arc::new(AtomicBool::new(false));
    let overlaps = Arc::new(AtomicUsize::new(0));

    let (ep, _peer) = MemoryEndpoint::new();
    let mut d = Descriptor::new(ep);
    d.add_stream(Gate { name: "s1", log: log.clone(), busy: busy.clone(), overlaps: overlaps.clone(), opens: true })
        .unwrap();
    d.add_stream(Recorder::new("s2", &log)).unwrap();
    d.add_stream(Gate { name: "s3", log: log.clone(), busy: busy.clone(), overlaps: overlaps.clone(), opens: false })
        .unwrap();
    let id = mux.register(d).unwrap();
    assert!(mux.wait_idle(IDLE));
    log.lock().clear();

    const N: usize = 200;
    let handle = mux.handle();
    let pushers: Vec<_> = (0..4)
        .map(|_| {
            let handle = handle.clone();
            thread::spawn(move || {
                for _ in 0..N / 4 {
                    handle.notify(id, EventType::Readable).unwrap();
                }
            })
        })
        .collect();
    for p in pushers {
        p.join().unwrap();
    }
    assert!(mux.wait_idle(IDLE));

    let seen = entries(&log, "readable");
    assert!(!seen.is_empty());
    assert!(seen.len() <= 3 * N);
    assert_eq!(seen.len() % 3, 0);
    for dispatch in seen.chunks(3) {
        assert_eq!(dispatch, ["s1:readable", "s2:readable", "s3:readable"]);
    }
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert_eq!(mux.job_state(id), Some(JobState::Waiting));
}

#[test]
fn test_closing_runs_last_added_first() {
    init_tracing();
    let mux = Multiplexer::new(config(4)).unwrap();
    let log = Log::default();
    let (ep, peer) = MemoryEndpoint::new();
    let mut d = Descriptor::new(ep);
    for name in ["s1", "s2", "s3"] {
        d.add_stream(Recorder::new(name, &log)).unwrap();
    }
    let id = mux.register(d).unwrap();
    assert!(mux.wait_idle(IDLE));

    mux.notify(id, EventType::Closing).unwrap();
    assert!(mux.wait_idle(IDLE));

    assert_eq!(entries(&log, "closing"), ["s3:closing", "s2:closing", "s1:closing"]);
    assert_eq!(entries(&log, "opened"), ["s1:opened", "s2:opened", "s3:opened"]);
    assert_eq!(mux.job_state(id), Some(JobState::Purged));
    assert!(peer.is_released());
}

#[test]
fn test_unregister_closes_in_reverse_order() {
    init_tracing();
    let mux = Multiplexer::new(config(2)).unwrap();
    let log = Log::default();
    let (ep, _peer) = MemoryEndpoint::new();
    let mut d = Descriptor::new(ep);
    d.add_stream(Recorder::new("s1", &log)).unwrap();
    d.add_stream(Recorder::new("s2", &log)).unwrap();
    let descriptor = d.id();
    let id = mux.register(d).unwrap();
    assert!(mux.wait_idle(IDLE));

    mux.unregister(descriptor).unwrap();
    assert!(mux.wait_idle(IDLE));
    assert_eq!(entries(&log, "closing"), ["s2:closing", "s1:closing"]);
    assert_eq!(mux.job_state(id), Some(JobState::Purged));
    assert!(mux.unregister(descriptor).is_err());
}

#[test]
fn test_purged_job_is_never_dispatched_again() {
    init_tracing();
    let mux = Multiplexer::new(config(4)).unwrap();
    let log = Log::default();
    let (ep, _peer) = MemoryEndpoint::new();
    let id = mux.register(Descriptor::new(ep).with_stream(Recorder::new("s1", &log)).unwrap()).unwrap();
    assert!(mux.wait_idle(IDLE));
    mux.cancel(id).unwrap();
    assert!(mux.wait_idle(IDLE));

    let before = log.lock().len();
    for _ in 0..10 {
        assert!(mux.notify(id, EventType::Readable).is_err());
        mux.tick(Duration::ZERO).unwrap();
        assert_eq!(mux.job_state(id), Some(JobState::Purged));
    }
    assert!(mux.wait_idle(IDLE));
    assert_eq!(log.lock().len(), before);

    mux.shutdown();
    mux.shutdown();
    assert_eq!(mux.job_state(id), Some(JobState::Purged));
}

#[test]
fn test_cancel_while_running_waits_for_dispatch() {
    init_tracing();
    let mux = Multiplexer::new(config(2)).unwrap();
    let log = Log::default();
    let (d, stalled, peer) = stalled_chain(&log);
    let id = mux.register(d).unwrap();
    assert!(mux.wait_idle(IDLE));

    mux.notify(id, EventType::Readable).unwrap();
    stalled.entered.recv_timeout(IDLE).unwrap();
    assert_eq!(mux.job_state(id), Some(JobState::Running));

    mux.cancel(id).unwrap();
    // No preemption: the dispatch is still in flight
    assert_eq!(mux.job_state(id), Some(JobState::Running));
    assert!(entries(&log, "closing").is_empty());
    assert!(!peer.is_released());

    stalled.release.send(()).unwrap();
    assert!(mux.wait_idle(IDLE));
    assert!(stalled.finished.load(Ordering::SeqCst));
    assert_eq!(mux.job_state(id), Some(JobState::Purged));
    assert_eq!(entries(&log, "readable"), ["top:readable"]);
    assert_eq!(entries(&log, "closing"), ["top:closing"]);
    assert!(peer.is_released());
}

#[test]
fn test_shutdown_lets_running_dispatch_finish() {
    init_tracing();
    let mux = Multiplexer::new(config(2)).unwrap();
    let log = Log::default();
    let (d, stalled, peer) = stalled_chain(&log);
    let id = mux.register(d).unwrap();
    assert!(mux.wait_idle(IDLE));

    mux.notify(id, EventType::Readable).unwrap();
    stalled.entered.recv_timeout(IDLE).unwrap();

    let release = stalled.release.clone();
    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        let _ = release.send(());
    });
    mux.shutdown();
    releaser.join().unwrap();

    // shutdown joined the worker, so the dispatch completed first
    assert!(stalled.finished.load(Ordering::SeqCst));
    assert_eq!(mux.job_state(id), Some(JobState::Purged));
    assert_eq!(entries(&log, "closing"), ["top:closing"]);
    assert!(peer.is_released());
    assert!(mux.notify(id, EventType::Readable).is_err());
    mux.shutdown();
}
