#![allow(dead_code)]

use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::Once;
use std::time::Duration;

use strand_core::{Chain, Condition, EventType, Stream};
use strand_runtime::MultiplexerConfig;

pub const IDLE: Duration = Duration::from_secs(10);

static INIT: Once = Once::new();

/// Route logs through the test harness so `--nocapture` shows them
pub fn init_tracing() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn config(workers: usize) -> MultiplexerConfig {
    MultiplexerConfig::new()
        .num_workers(workers)
        .poll_timeout(Duration::from_millis(20))
        .park_timeout(Duration::from_millis(5))
}

pub type Log = Arc<Mutex<Vec<String>>>;

/// Records "name:event" for every event it sees
pub struct Recorder {
    pub name: &'static str,
    pub log: Log,
}

impl Recorder {
    pub fn new(name: &'static str, log: &Log) -> Self {
        Self { name, log: Arc::clone(log) }
    }
}

impl Stream for Recorder {
    fn name(&self) -> &str {
        self.name
    }

    fn event(&mut self, event: EventType, _chain: &mut Chain<'_>) -> Condition {
        self.log.lock().push(format!("{}:{}", self.name, event));
        Condition::Ok
    }
}

pub fn entries(log: &Log, suffix: &str) -> Vec<String> {
    log.lock().iter().filter(|e| e.ends_with(suffix)).cloned().collect()
}
