use serde::Serialize;

/// Aggregate outcome of one operation, worst first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Success,
    PartialSuccess,
    PartialError,
    Error,
}

/// One per-identifier failure, preserved for diagnosis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailureEntry {
    pub identifier: String,
    pub message: String,
}

/// Audit trail for a whole operation. Mutated incrementally, never rolled
/// back; the status always reflects the worst per-record outcome observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationResult {
    pub status: OperationStatus,
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub failures: Vec<FailureEntry>,
}

impl Default for OperationResult {
    fn default() -> Self {
        Self {
            status: OperationStatus::Success,
            processed: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }
}

impl OperationResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fully successful write.
    pub fn record_success(&mut self) {
        self.processed += 1;
        self.succeeded += 1;
    }

    /// Record a degraded write: data landed, but not all of it.
    pub fn record_partial(&mut self, identifier: impl Into<String>, message: impl Into<String>) {
        self.processed += 1;
        self.succeeded += 1;
        self.failures.push(FailureEntry {
            identifier: identifier.into(),
            message: message.into(),
        });
        self.degrade_to(OperationStatus::PartialSuccess);
    }

    /// Record a per-identifier failure. The operation continues.
    pub fn record_failure(&mut self, identifier: impl Into<String>, message: impl Into<String>) {
        self.processed += 1;
        self.failed += 1;
        self.failures.push(FailureEntry {
            identifier: identifier.into(),
            message: message.into(),
        });
        self.degrade_to(OperationStatus::PartialError);
    }

    /// Record an operation-level failure (store connectivity, auth).
    pub fn record_fatal(&mut self, identifier: impl Into<String>, message: impl Into<String>) {
        self.failed += 1;
        self.failures.push(FailureEntry {
            identifier: identifier.into(),
            message: message.into(),
        });
        self.degrade_to(OperationStatus::Error);
    }

    /// Lower the status, never raise it.
    pub fn degrade_to(&mut self, status: OperationStatus) {
        if status > self.status {
            self.status = status;
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.status == OperationStatus::Error
    }
}
