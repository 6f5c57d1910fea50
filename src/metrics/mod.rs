mod types;

pub use types::{MetricsSnapshot, SequenceMetrics, SystemMetrics};

use std::sync::Arc;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Mutex;

const MAX_RECENT_SEQUENCES: usize = 20;

/// Rolling record of recent capture sequences plus this process's own
/// CPU and memory use.
#[derive(Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsState>>,
}

struct MetricsState {
    recent_sequences: Vec<SequenceMetrics>,
    sequence_count: u64,
    failure_count: u64,
    notes_count: u64,
    system: System,
    pid: Pid,
}

impl MetricsState {
    fn sample(&mut self) -> SystemMetrics {
        let pid = self.pid;
        self.system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        match self.system.process(pid) {
            Some(process) => SystemMetrics {
                cpu_percent: process.cpu_usage(),
                memory_mb: process.memory() as f64 / 1024.0 / 1024.0,
            },
            None => SystemMetrics::default(),
        }
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());

        // CPU usage is a delta between refreshes; take the baseline now.
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));

        Self {
            inner: Arc::new(Mutex::new(MetricsState {
                recent_sequences: Vec::with_capacity(MAX_RECENT_SEQUENCES),
                sequence_count: 0,
                failure_count: 0,
                notes_count: 0,
                system,
                pid,
            })),
        }
    }

    pub async fn sample_system_metrics(&self) -> SystemMetrics {
        self.inner.lock().await.sample()
    }

    pub async fn record_sequence(&self, metrics: SequenceMetrics) {
        let mut state = self.inner.lock().await;

        state.sequence_count += 1;
        if !metrics.succeeded {
            state.failure_count += 1;
        }
        if metrics.post_process_ms.is_some() {
            state.notes_count += 1;
        }

        state.recent_sequences.push(metrics);
        if state.recent_sequences.len() > MAX_RECENT_SEQUENCES {
            state.recent_sequences.remove(0);
        }
    }

    pub async fn get_snapshot(&self) -> MetricsSnapshot {
        let mut state = self.inner.lock().await;
        let system = state.sample();

        MetricsSnapshot {
            system,
            recent_sequences: state.recent_sequences.clone(),
            sequence_count: state.sequence_count,
            failure_count: state.failure_count,
            notes_count: state.notes_count,
        }
    }

}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
