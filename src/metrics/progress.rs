use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Terminal state of one symbol within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolOutcome {
    /// Fetched and written to the cache
    Written,
    /// Cache entry was fresh, no fetch made
    Skipped,
    /// Fetch or cache write failed
    Failed,
}

/// Failure recorded against a symbol
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolFailure {
    pub symbol: String,
    pub message: String,
}

/// Point-in-time view of a run
///
/// Invariant: `successful + failed + skipped == completed <= total`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub completed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Symbol most recently completed
    pub current_symbol: Option<String>,
    pub last_outcome: Option<SymbolOutcome>,
    /// One entry per failed symbol, in completion order
    pub errors: Vec<SymbolFailure>,
    pub time_elapsed_ms: u64,
    /// `None` until at least one symbol has completed
    pub estimated_time_remaining_ms: Option<u64>,
}

impl ProgressSnapshot {
    pub fn remaining(&self) -> usize {
        self.total.saturating_sub(self.completed)
    }

    pub fn is_complete(&self) -> bool {
        self.completed >= self.total
    }

    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        self.completed as f64 * 100.0 / self.total as f64
    }

    pub fn time_elapsed(&self) -> Duration {
        Duration::from_millis(self.time_elapsed_ms)
    }
}

/// Receives a snapshot after every symbol completes
///
/// Called inline from the run loop; implementations must not block.
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressObserver for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot)
    }
}

/// Forwards snapshots to an unbounded channel
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<ProgressSnapshot>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressSnapshot>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressObserver for ChannelObserver {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        // Receiver gone means nobody is listening anymore
        let _ = self.tx.send(snapshot.clone());
    }
}

/// Logs each snapshot at debug level
#[derive(Debug, Default)]
pub struct TracingObserver;

impl ProgressObserver for TracingObserver {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        tracing::debug!(
            completed = snapshot.completed,
            total = snapshot.total,
            successful = snapshot.successful,
            failed = snapshot.failed,
            skipped = snapshot.skipped,
            symbol = snapshot.current_symbol.as_deref().unwrap_or(""),
            eta_ms = snapshot.estimated_time_remaining_ms,
            "Population progress"
        );
    }
}

/// Linear extrapolation of the average per-symbol time
pub fn estimate_remaining(elapsed: Duration, completed: usize, total: usize) -> Option<Duration> {
    if completed == 0 {
        return None;
    }
    let remaining = total.saturating_sub(completed) as u32;
    let per_symbol = elapsed / completed as u32;
    Some(per_symbol.saturating_mul(remaining))
}

/// Accumulates per-symbol outcomes and notifies observers
pub struct ProgressReporter {
    total: usize,
    completed: usize,
    successful: usize,
    failed: usize,
    skipped: usize,
    current_symbol: Option<String>,
    last_outcome: Option<SymbolOutcome>,
    errors: Vec<SymbolFailure>,
    started: Instant,
    observers: Vec<Arc<dyn ProgressObserver>>,
}

impl ProgressReporter {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            completed: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
            current_symbol: None,
            last_outcome: None,
            errors: Vec::new(),
            started: Instant::now(),
            observers: Vec::new(),
        }
    }

    pub fn with_observers(mut self, observers: Vec<Arc<dyn ProgressObserver>>) -> Self {
        self.observers = observers;
        self
    }

    pub fn record_written(&mut self, symbol: &str) -> ProgressSnapshot {
        self.successful += 1;
        self.complete(symbol, SymbolOutcome::Written)
    }

    pub fn record_skipped(&mut self, symbol: &str) -> ProgressSnapshot {
        self.skipped += 1;
        self.complete(symbol, SymbolOutcome::Skipped)
    }

    pub fn record_failed(&mut self, symbol: &str, message: impl Into<String>) -> ProgressSnapshot {
        self.failed += 1;
        self.errors.push(SymbolFailure {
            symbol: symbol.to_string(),
            message: message.into(),
        });
        self.complete(symbol, SymbolOutcome::Failed)
    }

    fn complete(&mut self, symbol: &str, outcome: SymbolOutcome) -> ProgressSnapshot {
        self.completed += 1;
        self.current_symbol = Some(symbol.to_string());
        self.last_outcome = Some(outcome);

        let snapshot = self.snapshot();
        for observer in &self.observers {
            observer.on_progress(&snapshot);
        }
        snapshot
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let elapsed = self.started.elapsed();
        ProgressSnapshot {
            total: self.total,
            completed: self.completed,
            successful: self.successful,
            failed: self.failed,
            skipped: self.skipped,
            current_symbol: self.current_symbol.clone(),
            last_outcome: self.last_outcome,
            errors: self.errors.clone(),
            time_elapsed_ms: elapsed.as_millis() as u64,
            estimated_time_remaining_ms: estimate_remaining(elapsed, self.completed, self.total)
                .map(|d| d.as_millis() as u64),
        }
    }
}
