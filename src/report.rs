use std::fmt::Write as _;
use std::sync::Arc;

use alloy::primitives::{utils::format_ether, Address, B256, U256};
use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOpKind {
    Receive,
    Split,
}

/// One confirmed ledger mutation. Created only after the transaction is
/// confirmed; dry-run skips and failed submissions never appear here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOperation {
    pub kind: WriteOpKind,
    pub account_id: U256,
    pub token: Address,
    pub amount: U256,
    pub tx_hash: B256,
}

/// Aggregated outcome of one run. Created at run start, mutated throughout,
/// finalized and emitted exactly once — including on abnormal termination,
/// where it still carries whatever partial work completed.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: Uuid,
    pub network: String,
    pub symbol: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub operations: Vec<WriteOperation>,
    /// Rendered per-operation failures; each already carries kind, account id
    /// and error message.
    pub failures: Vec<String>,
    pub start_balance: Option<U256>,
    pub end_balance: Option<U256>,
    /// Set only when the run aborted.
    pub fatal: Option<String>,
}

impl RunReport {
    pub fn new(network: &str, symbol: &str, dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            network: network.to_string(),
            symbol: symbol.to_string(),
            dry_run,
            started_at: Utc::now(),
            finished_at: None,
            operations: Vec::new(),
            failures: Vec::new(),
            start_balance: None,
            end_balance: None,
            fatal: None,
        }
    }

    /// Report for a run that aborted before the orchestrator loop started,
    /// e.g. on a failed treasury top-up.
    pub fn aborted(network: &str, symbol: &str, dry_run: bool, fatal: String) -> Self {
        let mut report = Self::new(network, symbol, dry_run);
        report.finalize(Some(fatal));
        report
    }

    pub fn record_operation(&mut self, op: WriteOperation) {
        self.operations.push(op);
    }

    pub fn record_failure(&mut self, message: String) {
        self.failures.push(message);
    }

    pub fn finalize(&mut self, fatal: Option<String>) {
        self.finished_at = Some(Utc::now());
        self.fatal = fatal;
    }

    pub fn succeeded(&self) -> bool {
        self.fatal.is_none()
    }

    /// Total fee cost measured around the whole run. `None` without a wallet.
    pub fn fee_cost(&self) -> Option<U256> {
        match (self.start_balance, self.end_balance) {
            (Some(start), Some(end)) => Some(start.saturating_sub(end)),
            _ => None,
        }
    }

    pub fn duration_minutes(&self) -> f64 {
        let end = self.finished_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds() as f64 / 1000.0 / 60.0
    }

    fn count(&self, kind: WriteOpKind) -> usize {
        self.operations.iter().filter(|op| op.kind == kind).count()
    }

    /// Human-readable summary. Partial progress is always visible: both the
    /// success and the failure variant list every completed operation.
    pub fn summary(&self) -> String {
        let mut out = String::new();

        if self.succeeded() {
            let _ = writeln!(out, "✅ Distribution run {} completed.", self.run_id);
        } else {
            let _ = writeln!(
                out,
                "❌ Distribution run {} FAILED: {}",
                self.run_id,
                self.fatal.as_deref().unwrap_or("unknown error")
            );
        }

        let _ = writeln!(out, "Total operations: {}", self.operations.len());
        let _ = writeln!(out, "Receive operations: {}", self.count(WriteOpKind::Receive));
        let _ = writeln!(out, "Split operations: {}", self.count(WriteOpKind::Split));

        for op in &self.operations {
            let _ = writeln!(
                out,
                "Account {}: {} {} {} (tx: {})",
                op.account_id,
                match op.kind {
                    WriteOpKind::Receive => "Received",
                    WriteOpKind::Split => "Split",
                },
                format_ether(op.amount),
                op.token,
                op.tx_hash
            );
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "Recoverable failures ({}):", self.failures.len());
            for failure in &self.failures {
                let _ = writeln!(out, "- {failure}");
            }
        }

        match self.fee_cost() {
            Some(cost) => {
                let _ = writeln!(out, "Total cost: {} {}", format_ether(cost), self.symbol);
            }
            None => {
                let reason = if self.start_balance.is_some() || self.end_balance.is_some() {
                    "balance unavailable"
                } else {
                    "no wallet configured"
                };
                let _ = writeln!(out, "Total cost: unknown ({reason})");
            }
        }
        let _ = write!(
            out,
            "Total execution time: {:.2} minutes",
            self.duration_minutes()
        );

        out
    }
}

/// Emits a finalized report to structured logs and the operator channel.
pub struct RunReporter {
    notifier: Arc<Notifier>,
}

impl RunReporter {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }

    pub async fn emit(&self, report: &RunReport) {
        let summary = report.summary();

        if report.succeeded() {
            info!(
                run_id = %report.run_id,
                network = %report.network,
                operations = report.operations.len(),
                failures = report.failures.len(),
                "Run completed"
            );
            info!("\n=== Write Operations Summary ===\n{summary}");
        } else {
            error!(
                run_id = %report.run_id,
                network = %report.network,
                operations = report.operations.len(),
                failures = report.failures.len(),
                fatal = report.fatal.as_deref().unwrap_or(""),
                "Run aborted"
            );
            error!("\n=== Write Operations Summary ===\n{summary}");
        }

        self.notifier.post(&summary).await;
    }
}
