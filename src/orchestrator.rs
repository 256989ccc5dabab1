use std::sync::Arc;

use alloy::primitives::{utils::format_ether, Address, U256};
use tracing::{info, warn};

use crate::account::AccountKind;
use crate::error::{AppResult, OpResult, OperationError};
use crate::ledger::{await_confirmation, ChainWallet, LedgerClient, RetryPolicy};
use crate::notify::Notifier;
use crate::report::{RunReport, WriteOpKind, WriteOperation};
use crate::splits::SplitsReceiverResolver;
use crate::store::DistributionStore;

#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Full passes over the account×token cross-product. A receive in one
    /// pass can unlock value that only becomes splittable in the next.
    pub iterations: u32,
    /// Gas bound on receive reads and executions.
    pub max_receive_cycles: u32,
    /// Reads only; no mutating call is ever submitted.
    pub dry_run: bool,
}

/// The core control loop: cross-products accounts and tokens, decides which
/// operations are owed, executes them with retry-until-confirmed semantics,
/// and aggregates outcomes.
///
/// Strictly sequential: one in-flight transaction at a time keeps wallet
/// nonce management and cost accounting deterministic.
pub struct DistributionOrchestrator {
    store: Arc<dyn DistributionStore>,
    ledger: Arc<dyn LedgerClient>,
    wallet: Option<Arc<dyn ChainWallet>>,
    resolver: SplitsReceiverResolver,
    notifier: Arc<Notifier>,
    retry: RetryPolicy,
    settings: RunSettings,
    network_name: String,
    symbol: String,
}

impl DistributionOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn DistributionStore>,
        ledger: Arc<dyn LedgerClient>,
        wallet: Option<Arc<dyn ChainWallet>>,
        notifier: Arc<Notifier>,
        retry: RetryPolicy,
        settings: RunSettings,
        network_name: &str,
        symbol: &str,
    ) -> Self {
        Self {
            resolver: SplitsReceiverResolver::new(store.clone()),
            store,
            ledger,
            wallet,
            notifier,
            retry,
            settings,
            network_name: network_name.to_string(),
            symbol: symbol.to_string(),
        }
    }

    /// Runs the configured number of passes and always returns a finalized
    /// report: fatal errors abort the loop but still produce the report with
    /// whatever partial work completed.
    pub async fn run(&self) -> RunReport {
        let mut report = RunReport::new(&self.network_name, &self.symbol, self.settings.dry_run);
        info!("Starting distribution run {}...", report.run_id);

        let outcome = self.run_inner(&mut report).await;

        // Read the closing balance even when the loop aborted, so the
        // summary can still price whatever partial work confirmed.
        self.record_end_balance(&mut report).await;

        match outcome {
            Ok(()) => report.finalize(None),
            Err(e) => {
                warn!("Distribution run aborted: {e}");
                report.finalize(Some(e.to_string()));
            }
        }

        report
    }

    async fn record_end_balance(&self, report: &mut RunReport) {
        if let Some(wallet) = &self.wallet {
            match wallet.balance().await {
                Ok(balance) => report.end_balance = Some(balance),
                Err(e) => warn!("Could not read the final wallet balance: {e}"),
            }
        }
    }

    async fn run_inner(&self, report: &mut RunReport) -> AppResult<()> {
        if let Some(wallet) = &self.wallet {
            let start = wallet.balance().await?;
            info!(
                "Initial wallet balance: {} {}",
                format_ether(start),
                self.symbol
            );
            report.start_balance = Some(start);
        }

        // Assets are required to proceed; a discovery failure is fatal.
        let tokens = self.store.distinct_tokens().await?;
        info!("Found {} tokens to process", tokens.len());

        for pass in 1..=self.settings.iterations {
            info!("=== Starting iteration {pass}/{} ===", self.settings.iterations);

            self.process_accounts(AccountKind::DripList, &tokens, report)
                .await?;
            self.process_accounts(AccountKind::Project, &tokens, report)
                .await?;

            info!("=== Completed iteration {pass}/{} ===", self.settings.iterations);
        }

        Ok(())
    }

    async fn process_accounts(
        &self,
        kind: AccountKind,
        tokens: &[Address],
        report: &mut RunReport,
    ) -> AppResult<()> {
        // Listing failures are fatal; without the work set there is nothing
        // safe to skip.
        let accounts = match kind {
            AccountKind::DripList => self.store.drip_lists().await?,
            AccountKind::Project => self.store.claimed_projects().await?,
        };

        info!("Processing {} {kind}s...", accounts.len());

        for account in &accounts {
            for token in tokens {
                self.process_token(account.id, kind, *token, report).await;
            }
        }

        info!("Completed processing {kind}s");
        Ok(())
    }

    /// One (account, token) unit of work. Failures here are isolated: a
    /// failed receive never blocks the split step, and neither blocks the
    /// rest of the loop.
    async fn process_token(
        &self,
        account_id: U256,
        kind: AccountKind,
        token: Address,
        report: &mut RunReport,
    ) {
        info!("Processing token {token} for {kind} {account_id}...");

        match self.try_receive(account_id, kind, token).await {
            Ok(Some(op)) => report.record_operation(op),
            Ok(None) => {}
            Err(e) => self.report_failure(report, e).await,
        }

        match self.try_split(account_id, kind, token).await {
            Ok(Some(op)) => report.record_operation(op),
            Ok(None) => {}
            Err(e) => self.report_failure(report, e).await,
        }
    }

    async fn try_receive(
        &self,
        account_id: U256,
        kind: AccountKind,
        token: Address,
    ) -> OpResult<Option<WriteOperation>> {
        let receivable = self
            .ledger
            .receivable(account_id, token, self.settings.max_receive_cycles)
            .await
            .map_err(|e| submission("receiveStreamsResult", account_id, token, e))?;

        if receivable.is_zero() {
            return Ok(None);
        }

        if self.settings.dry_run {
            info!(
                "[DRY RUN] Would receive {} tokens for {kind} {account_id}; skipping submission",
                format_ether(receivable)
            );
            return Ok(None);
        }

        let pending = self
            .ledger
            .receive_streams(account_id, token, self.settings.max_receive_cycles)
            .await
            .map_err(|e| submission("receiveStreams", account_id, token, e))?;

        info!(
            "Awaiting 'receiveStreams' transaction {} for {kind} {account_id}...",
            pending.hash()
        );
        let tx_hash = await_confirmation(pending.as_ref(), &self.retry).await?;

        info!(
            "Received {} tokens for {kind} {account_id}. Transaction: {tx_hash}",
            format_ether(receivable)
        );

        Ok(Some(WriteOperation {
            kind: WriteOpKind::Receive,
            account_id,
            token,
            amount: receivable,
            tx_hash,
        }))
    }

    async fn try_split(
        &self,
        account_id: U256,
        kind: AccountKind,
        token: Address,
    ) -> OpResult<Option<WriteOperation>> {
        let splittable = self
            .ledger
            .splittable(account_id, token)
            .await
            .map_err(|e| submission("splittable", account_id, token, e))?;

        if splittable.is_zero() {
            return Ok(None);
        }

        // Resolved fresh per pass, and validated even in dry-run so operators
        // can vet the invariant against production data without spending gas.
        let receivers = self.resolver.resolve(account_id, kind).await?;

        if self.settings.dry_run {
            info!(
                "[DRY RUN] Would split {} tokens for {kind} {account_id} across {} receivers; \
                 skipping submission",
                format_ether(splittable),
                receivers.len()
            );
            return Ok(None);
        }

        let pending = self
            .ledger
            .split(account_id, token, &receivers)
            .await
            .map_err(|e| submission("split", account_id, token, e))?;

        info!(
            "Awaiting 'split' transaction {} for {kind} {account_id}...",
            pending.hash()
        );
        let tx_hash = await_confirmation(pending.as_ref(), &self.retry).await?;

        info!(
            "Split {} tokens for {kind} {account_id}. Transaction: {tx_hash}",
            format_ether(splittable)
        );

        Ok(Some(WriteOperation {
            kind: WriteOpKind::Split,
            account_id,
            token,
            amount: splittable,
            tx_hash,
        }))
    }

    /// Recoverable failures are logged, recorded, and surfaced on the
    /// operator channel — never swallowed, never run-aborting.
    async fn report_failure(&self, report: &mut RunReport, error: OperationError) {
        warn!("{error}");
        report.record_failure(error.to_string());
        self.notifier.post(&format!("⚠️ {error}")).await;
    }
}

fn submission(
    call: &'static str,
    account_id: U256,
    token: Address,
    error: crate::error::AppError,
) -> OperationError {
    OperationError::Submission {
        call,
        account_id,
        token,
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use alloy::primitives::B256;
    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::account::Account;
    use crate::error::{AppError, AppResult};
    use crate::ledger::PendingTx;
    use crate::splits::SplitsReceiver;

    // ---- in-memory collaborators -------------------------------------------

    #[derive(Default)]
    struct MemoryStore {
        drip_lists: Vec<Account>,
        projects: Vec<Account>,
        tokens: Vec<Address>,
        receivers: HashMap<U256, Vec<SplitsReceiver>>,
        fail_token_discovery: bool,
    }

    #[async_trait]
    impl DistributionStore for MemoryStore {
        async fn drip_lists(&self) -> AppResult<Vec<Account>> {
            Ok(self.drip_lists.clone())
        }

        async fn claimed_projects(&self) -> AppResult<Vec<Account>> {
            Ok(self.projects.clone())
        }

        async fn distinct_tokens(&self) -> AppResult<Vec<Address>> {
            if self.fail_token_discovery {
                return Err(AppError::Decode("token discovery went sideways".into()));
            }
            Ok(self.tokens.clone())
        }

        async fn splits_receiver_rows(
            &self,
            funder: U256,
            _kind: AccountKind,
        ) -> AppResult<Vec<SplitsReceiver>> {
            Ok(self.receivers.get(&funder).cloned().unwrap_or_default())
        }
    }

    struct StubWallet {
        balances: Mutex<Vec<U256>>,
    }

    #[async_trait]
    impl ChainWallet for StubWallet {
        fn address(&self) -> Address {
            Address::with_last_byte(0x99)
        }

        async fn balance(&self) -> AppResult<U256> {
            let mut balances = self.balances.lock().unwrap();
            Ok(if balances.len() > 1 {
                balances.remove(0)
            } else {
                balances[0]
            })
        }
    }

    struct StubPendingTx {
        hash: B256,
        failures_left: AtomicU32,
    }

    #[async_trait]
    impl PendingTx for StubPendingTx {
        fn hash(&self) -> B256 {
            self.hash
        }

        async fn check_confirmed(&self) -> AppResult<bool> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(AppError::Ledger("transient".into()));
            }
            Ok(true)
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Submitted {
        Receive { account_id: U256, token: Address },
        Split { account_id: U256, token: Address, receivers: Vec<SplitsReceiver> },
    }

    #[derive(Default)]
    struct MemoryLedger {
        receivable: HashMap<(U256, Address), U256>,
        splittable: HashMap<(U256, Address), U256>,
        submissions: Mutex<Vec<Submitted>>,
        confirmation_failures: u32,
    }

    impl MemoryLedger {
        fn submissions(&self) -> Vec<Submitted> {
            self.submissions.lock().unwrap().clone()
        }

        fn pending(&self) -> Box<dyn PendingTx> {
            Box::new(StubPendingTx {
                hash: B256::with_last_byte(0xaa),
                failures_left: AtomicU32::new(self.confirmation_failures),
            })
        }
    }

    #[async_trait]
    impl LedgerClient for MemoryLedger {
        async fn receivable(
            &self,
            account_id: U256,
            token: Address,
            _max_cycles: u32,
        ) -> AppResult<U256> {
            Ok(self
                .receivable
                .get(&(account_id, token))
                .copied()
                .unwrap_or(U256::ZERO))
        }

        async fn splittable(&self, account_id: U256, token: Address) -> AppResult<U256> {
            Ok(self
                .splittable
                .get(&(account_id, token))
                .copied()
                .unwrap_or(U256::ZERO))
        }

        async fn receive_streams(
            &self,
            account_id: U256,
            token: Address,
            _max_cycles: u32,
        ) -> AppResult<Box<dyn PendingTx>> {
            self.submissions
                .lock()
                .unwrap()
                .push(Submitted::Receive { account_id, token });
            Ok(self.pending())
        }

        async fn split(
            &self,
            account_id: U256,
            token: Address,
            receivers: &[SplitsReceiver],
        ) -> AppResult<Box<dyn PendingTx>> {
            self.submissions.lock().unwrap().push(Submitted::Split {
                account_id,
                token,
                receivers: receivers.to_vec(),
            });
            Ok(self.pending())
        }
    }

    // ---- helpers -----------------------------------------------------------

    fn account(id: u64) -> Account {
        Account {
            id: U256::from(id),
            created_at: Utc::now(),
        }
    }

    fn token() -> Address {
        Address::with_last_byte(0x11)
    }

    fn receiver(id: u64, weight: u32) -> SplitsReceiver {
        SplitsReceiver {
            account_id: U256::from(id),
            weight,
        }
    }

    fn valid_receivers() -> Vec<SplitsReceiver> {
        vec![receiver(5, 300_000), receiver(9, 700_000)]
    }

    fn orchestrator(
        store: MemoryStore,
        ledger: MemoryLedger,
        dry_run: bool,
    ) -> (DistributionOrchestrator, Arc<MemoryLedger>) {
        let ledger = Arc::new(ledger);
        let orchestrator = DistributionOrchestrator::new(
            Arc::new(store),
            ledger.clone(),
            None,
            Arc::new(Notifier::new(None, "testnet", dry_run)),
            RetryPolicy {
                max_attempts: 5,
                base_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(2),
            },
            RunSettings {
                iterations: 1,
                max_receive_cycles: 1000,
                dry_run,
            },
            "testnet",
            "ETH",
        );
        (orchestrator, ledger)
    }

    // ---- tests -------------------------------------------------------------

    #[tokio::test]
    async fn receivable_without_splittable_yields_one_receive_operation() {
        let store = MemoryStore {
            drip_lists: vec![account(77)],
            tokens: vec![token()],
            ..Default::default()
        };
        let ledger = MemoryLedger {
            receivable: HashMap::from([((U256::from(77u64), token()), U256::from(500u64))]),
            ..Default::default()
        };

        let (orchestrator, ledger) = orchestrator(store, ledger, false);
        let report = orchestrator.run().await;

        assert!(report.succeeded());
        assert_eq!(report.operations.len(), 1);
        assert_eq!(report.operations[0].kind, WriteOpKind::Receive);
        assert_eq!(report.operations[0].amount, U256::from(500u64));
        assert_eq!(
            ledger.submissions(),
            vec![Submitted::Receive {
                account_id: U256::from(77u64),
                token: token()
            }]
        );
    }

    #[tokio::test]
    async fn zero_amounts_submit_nothing() {
        let store = MemoryStore {
            drip_lists: vec![account(1)],
            projects: vec![account(2)],
            tokens: vec![token()],
            ..Default::default()
        };

        let (orchestrator, ledger) = orchestrator(store, MemoryLedger::default(), false);
        let report = orchestrator.run().await;

        assert!(report.succeeded());
        assert!(report.operations.is_empty());
        assert!(ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn dry_run_never_submits_despite_nonzero_amounts() {
        let id = U256::from(42u64);
        let store = MemoryStore {
            drip_lists: vec![account(42)],
            tokens: vec![token()],
            receivers: HashMap::from([(id, valid_receivers())]),
            ..Default::default()
        };
        let ledger = MemoryLedger {
            receivable: HashMap::from([((id, token()), U256::from(500u64))]),
            splittable: HashMap::from([((id, token()), U256::from(900u64))]),
            ..Default::default()
        };

        let (orchestrator, ledger) = orchestrator(store, ledger, true);
        let report = orchestrator.run().await;

        assert!(report.succeeded());
        assert!(report.operations.is_empty());
        assert!(report.failures.is_empty());
        assert!(ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn split_submits_deduplicated_ordered_receivers() {
        let id = U256::from(10u64);
        let store = MemoryStore {
            projects: vec![Account {
                id,
                created_at: Utc::now(),
            }],
            tokens: vec![token()],
            receivers: HashMap::from([(
                id,
                vec![receiver(9, 700_000), receiver(5, 300_000), receiver(5, 300_000)],
            )]),
            ..Default::default()
        };
        let ledger = MemoryLedger {
            splittable: HashMap::from([((id, token()), U256::from(1_000u64))]),
            ..Default::default()
        };

        let (orchestrator, ledger) = orchestrator(store, ledger, false);
        let report = orchestrator.run().await;

        assert!(report.succeeded());
        assert_eq!(report.operations.len(), 1);
        assert_eq!(report.operations[0].kind, WriteOpKind::Split);
        match &ledger.submissions()[0] {
            Submitted::Split { receivers, .. } => {
                assert_eq!(*receivers, valid_receivers());
            }
            other => panic!("unexpected submission: {other:?}"),
        }
    }

    #[tokio::test]
    async fn weight_mismatch_skips_the_split_and_continues() {
        let bad = U256::from(1u64);
        let good = U256::from(2u64);
        let store = MemoryStore {
            drip_lists: vec![account(1), account(2)],
            tokens: vec![token()],
            receivers: HashMap::from([
                (bad, vec![receiver(5, 300_000), receiver(9, 699_999)]),
                (good, valid_receivers()),
            ]),
            ..Default::default()
        };
        let ledger = MemoryLedger {
            splittable: HashMap::from([
                ((bad, token()), U256::from(100u64)),
                ((good, token()), U256::from(200u64)),
            ]),
            ..Default::default()
        };

        let (orchestrator, ledger) = orchestrator(store, ledger, false);
        let report = orchestrator.run().await;

        // The bad account is reported and skipped; the good one still splits.
        assert!(report.succeeded());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("999999"));
        assert_eq!(report.operations.len(), 1);
        assert_eq!(report.operations[0].account_id, good);
    }

    #[tokio::test]
    async fn transient_confirmation_failures_do_not_resubmit() {
        let id = U256::from(7u64);
        let store = MemoryStore {
            drip_lists: vec![account(7)],
            tokens: vec![token()],
            ..Default::default()
        };
        let ledger = MemoryLedger {
            receivable: HashMap::from([((id, token()), U256::from(333u64))]),
            confirmation_failures: 3, // below the 5-attempt budget
            ..Default::default()
        };

        let (orchestrator, ledger) = orchestrator(store, ledger, false);
        let report = orchestrator.run().await;

        assert!(report.succeeded());
        assert_eq!(report.operations.len(), 1);
        // Exactly one submission despite the flaky confirmation waits.
        assert_eq!(ledger.submissions().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_confirmation_budget_is_recoverable_not_fatal() {
        let id = U256::from(8u64);
        let store = MemoryStore {
            drip_lists: vec![account(8)],
            tokens: vec![token()],
            ..Default::default()
        };
        let ledger = MemoryLedger {
            receivable: HashMap::from([((id, token()), U256::from(10u64))]),
            confirmation_failures: 100, // beyond the budget
            ..Default::default()
        };

        let (orchestrator, ledger) = orchestrator(store, ledger, false);
        let report = orchestrator.run().await;

        assert!(report.succeeded());
        assert!(report.operations.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].contains("not confirmed"));
        assert_eq!(ledger.submissions().len(), 1);
    }

    #[tokio::test]
    async fn token_discovery_failure_is_fatal_but_still_reported() {
        let store = MemoryStore {
            drip_lists: vec![account(1)],
            fail_token_discovery: true,
            ..Default::default()
        };

        let (orchestrator, ledger) = orchestrator(store, MemoryLedger::default(), false);
        let report = orchestrator.run().await;

        assert!(!report.succeeded());
        assert!(report.fatal.as_deref().unwrap().contains("token discovery"));
        assert!(report.operations.is_empty());
        assert!(ledger.submissions().is_empty());
    }

    #[tokio::test]
    async fn aborted_run_still_prices_the_partial_work() {
        let store = MemoryStore {
            drip_lists: vec![account(1)],
            fail_token_discovery: true,
            ..Default::default()
        };
        let wallet = Arc::new(StubWallet {
            balances: Mutex::new(vec![U256::from(1_000u64), U256::from(400u64)]),
        });

        let orchestrator = DistributionOrchestrator::new(
            Arc::new(store),
            Arc::new(MemoryLedger::default()),
            Some(wallet),
            Arc::new(Notifier::new(None, "testnet", false)),
            RetryPolicy {
                max_attempts: 2,
                base_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(1),
            },
            RunSettings {
                iterations: 1,
                max_receive_cycles: 1000,
                dry_run: false,
            },
            "testnet",
            "ETH",
        );

        let report = orchestrator.run().await;

        // The abort still yields a priced report: both balances were read.
        assert!(!report.succeeded());
        assert_eq!(report.fee_cost(), Some(U256::from(600u64)));
        assert!(!report.summary().contains("Total cost: unknown"));
    }

    #[tokio::test]
    async fn multiple_passes_revisit_every_pair() {
        let id = U256::from(3u64);
        let store = MemoryStore {
            drip_lists: vec![account(3)],
            tokens: vec![token()],
            ..Default::default()
        };
        let ledger = Arc::new(MemoryLedger {
            receivable: HashMap::from([((id, token()), U256::from(50u64))]),
            ..Default::default()
        });

        let orchestrator = DistributionOrchestrator::new(
            Arc::new(store),
            ledger.clone(),
            None,
            Arc::new(Notifier::new(None, "testnet", false)),
            RetryPolicy {
                max_attempts: 2,
                base_delay: std::time::Duration::from_millis(1),
                max_delay: std::time::Duration::from_millis(1),
            },
            RunSettings {
                iterations: 3,
                max_receive_cycles: 1000,
                dry_run: false,
            },
            "testnet",
            "ETH",
        );

        let report = orchestrator.run().await;

        // Static receivable in the stub, so each of the 3 passes receives.
        assert_eq!(report.operations.len(), 3);
        assert_eq!(ledger.submissions().len(), 3);
    }
}
