//! The refresh state machine.
//!
//! One orchestrator owns the engine gateway, the cached wallet data and the
//! current [`SyncProgress`]. `refresh` is the long operation: it issues the
//! engine's sync command, then drives a poll loop that feeds status
//! snapshots through the [`PollTracker`] and performs the side effects the
//! tracker requests (reloads and saves). Everything here is fire-and-forget
//! from the caller's point of view; failures are logged and retried on the
//! next scheduled pass rather than surfaced.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::SeqCst};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::engine::EngineGateway;
use crate::wallet::aggregator::aggregate_summaries;
use crate::wallet::types::{
    Address, AddressKind, Info, SyncProgress, TotalBalance, Transaction, WalletSettings,
    zats_to_decimal,
};
use crate::wallet::WalletError;

use super::poll_tracker::{PollTracker, TickContext, TickEffect};

/// Fee assumed when the engine has not reported one, in base units.
const FALLBACK_FEE_ZATS: i64 = 10_000;

#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// How often the poll loop samples `syncstatus` during a refresh.
    pub poll_interval: Duration,
    /// How long the derived block may sit still before the run is flagged
    /// as stalled.
    pub stall_threshold: Duration,
    /// Blocks the engine scans per batch; used to reconstruct run bounds.
    pub blocks_per_batch: u64,
    /// Wallet opened from a viewing key: no seed to query.
    pub read_only: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            stall_threshold: Duration::from_secs(300),
            blocks_per_batch: 100,
            read_only: false,
        }
    }
}

/// Everything the orchestrator caches between engine calls.
#[derive(Default)]
struct WalletCache {
    balance: TotalBalance,
    addresses: Vec<Address>,
    transactions: Vec<Transaction>,
    settings: WalletSettings,
    info: Option<Info>,
    wallet_height: u64,
    server_height: u64,
    birthday: u64,
}

pub struct SyncOrchestrator {
    gateway: Arc<EngineGateway>,
    config: SyncConfig,
    cache: Mutex<WalletCache>,
    progress: Mutex<SyncProgress>,
    /// Mirrors the engine's `in_progress` while a refresh runs.
    in_refresh: AtomicBool,
    /// Claimed for the whole lifetime of a poll loop; this is the
    /// single-flight guard for `refresh`.
    poll_active: AtomicBool,
    /// Shared with the send monitor so data updates back off during a send.
    in_send: Arc<AtomicBool>,
    update_busy: AtomicBool,
    update_ctr: AtomicU64,
}

impl SyncOrchestrator {
    pub fn new(gateway: Arc<EngineGateway>, config: SyncConfig) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            config,
            cache: Mutex::new(WalletCache::default()),
            progress: Mutex::new(SyncProgress::default()),
            in_refresh: AtomicBool::new(false),
            poll_active: AtomicBool::new(false),
            in_send: Arc::new(AtomicBool::new(false)),
            update_busy: AtomicBool::new(false),
            update_ctr: AtomicU64::new(0),
        })
    }

    /// Bring the wallet up to date with the chain tip.
    ///
    /// `full_refresh` forces a sync run even when the wallet already sits at
    /// the tip; `full_rescan` clears cached history and replays from the
    /// birthday. Returns once the run (if any) has completed; concurrent
    /// calls while a run is active return immediately.
    pub async fn refresh(&self, full_refresh: bool, full_rescan: bool) {
        if self.in_refresh.load(SeqCst) || self.poll_active.load(SeqCst) {
            debug!("refresh already in progress, skipping");
            return;
        }

        let wallet_height = self.fetch_wallet_height().await;
        let server_height = self.fetch_info_and_server_height().await;
        self.fetch_wallet_birthday().await;

        if server_height == 0 {
            warn!("server height unknown, refresh deferred");
            return;
        }

        if !full_refresh && !full_rescan && wallet_height >= server_height {
            debug!(wallet_height, "wallet already at the chain tip");
            let mut progress = self.progress.lock().unwrap();
            progress.in_progress = false;
            progress.stalled = false;
            progress.current_block = wallet_height;
            progress.last_block_wallet = wallet_height;
            progress.last_block_server = server_height;
            return;
        }

        // Both checks above are advisory; this swap is the actual claim.
        if self.poll_active.swap(true, SeqCst) {
            debug!("lost the refresh race, skipping");
            return;
        }
        self.in_refresh.store(true, SeqCst);

        if full_rescan {
            let mut cache = self.cache.lock().unwrap();
            cache.transactions.clear();
            cache.balance = TotalBalance::default();
        }

        info!(wallet_height, server_height, full_rescan, "starting sync run");

        // The sync command resolves only when the engine's run ends, so it
        // gets its own task; the poll loop below watches the run from the
        // outside. Once the command returns, the then-current chain tip
        // pins the run's end for progress reconstruction.
        let latest_block = Arc::new(AtomicU64::new(0));
        {
            let gateway = Arc::clone(&self.gateway);
            let latest_block = Arc::clone(&latest_block);
            tokio::spawn(async move {
                let result = if full_rescan {
                    gateway.rescan().await
                } else {
                    gateway.sync().await
                };
                match result {
                    Ok(_) => {
                        if let Ok(info) = gateway.info().await {
                            latest_block.store(info.latest_block_height, SeqCst);
                        }
                    }
                    Err(e) => error!(error = %e, "sync command failed"),
                }
            });
        }

        self.run_poll_loop(latest_block).await;
    }

    /// Convenience wrapper: clear cached history and replay from scratch.
    pub async fn rescan(&self) {
        self.refresh(false, true).await;
    }

    async fn run_poll_loop(&self, latest_block: Arc<AtomicU64>) {
        let mut tracker = PollTracker::new(
            self.config.blocks_per_batch,
            self.config.stall_threshold.as_secs(),
        );
        let mut interval = tokio::time::interval(self.config.poll_interval);
        // The zeroth tick fires immediately; skip it so the engine has one
        // interval to get going.
        interval.tick().await;

        loop {
            interval.tick().await;

            let status = match self.gateway.sync_status().await {
                Ok(status) => status,
                Err(e) => {
                    warn!(error = %e, "sync status poll failed");
                    continue;
                }
            };
            self.in_refresh.store(status.in_progress, SeqCst);

            let (wallet_height, server_height) = {
                let cache = self.cache.lock().unwrap();
                (cache.wallet_height, cache.server_height)
            };
            let pinned_tip = latest_block.load(SeqCst);
            let outcome = tracker.observe(
                &status,
                &TickContext {
                    wallet_height,
                    server_height,
                    latest_block: (pinned_tip > 0).then_some(pinned_tip),
                    tick_secs: self.config.poll_interval.as_secs(),
                },
            );

            *self.progress.lock().unwrap() = outcome.progress.clone();

            for effect in &outcome.effects {
                match effect {
                    TickEffect::SyncIdChanged => {
                        info!("reloading after engine sync restart");
                        self.load_wallet_data().await;
                        self.save_wallet().await;
                    }
                    TickEffect::BatchBoundary => {
                        debug!("persisting at batch boundary");
                        self.load_wallet_data().await;
                        self.save_wallet().await;
                    }
                }
            }

            if outcome.finished {
                let wallet_height = self.fetch_wallet_height().await;
                let server_height = self.fetch_info_and_server_height().await;
                self.load_wallet_data().await;
                self.save_wallet().await;
                *self.progress.lock().unwrap() = SyncProgress {
                    sync_id: outcome.progress.sync_id,
                    current_block: wallet_height,
                    last_block_wallet: wallet_height,
                    last_block_server: server_height,
                    last_error: outcome.progress.last_error.clone(),
                    ..SyncProgress::default()
                };
                self.in_refresh.store(false, SeqCst);
                self.poll_active.store(false, SeqCst);
                info!(wallet_height, server_height, "sync run complete");
                return;
            }
        }
    }

    /// Light periodic pass: re-fetch heights and cached data without
    /// touching the sync machinery. While a refresh or send is active only
    /// every fifth call goes through, to keep engine contention down.
    pub async fn update_data(&self) {
        if self.update_busy.load(SeqCst) {
            return;
        }
        let ctr = self.update_ctr.fetch_add(1, SeqCst) + 1;
        if (self.in_refresh.load(SeqCst) || self.in_send.load(SeqCst)) && ctr % 5 != 0 {
            return;
        }
        // The load above is advisory; this swap is the claim.
        if self.update_busy.swap(true, SeqCst) {
            return;
        }

        self.fetch_wallet_height().await;
        self.fetch_info_and_server_height().await;
        self.fetch_wallet_birthday().await;
        self.load_wallet_data().await;

        self.update_busy.store(false, SeqCst);
    }

    /// Ask the engine to wind down its current run at the next batch
    /// boundary, then re-arm it for future runs.
    pub async fn stop_sync_process(&self) {
        loop {
            match self.gateway.sync_status().await {
                Ok(status) if status.in_progress => {
                    if let Err(e) = self.gateway.interrupt_sync_after_batch(true).await {
                        warn!(error = %e, "failed to request sync interrupt");
                        break;
                    }
                    tokio::time::sleep(Duration::from_millis(500)).await;
                }
                Ok(_) => break,
                Err(e) => {
                    warn!(error = %e, "sync status poll failed during stop");
                    break;
                }
            }
        }
        if let Err(e) = self.gateway.interrupt_sync_after_batch(false).await {
            warn!(error = %e, "failed to re-arm sync after stop");
        }
    }

    pub async fn set_wallet_option(&self, name: &str, value: &str) -> Result<(), WalletError> {
        self.gateway.set_option(name, value).await?;
        self.fetch_wallet_settings().await;
        Ok(())
    }

    pub async fn parse_address(&self, address: &str) -> Result<serde_json::Value, WalletError> {
        Ok(self.gateway.parse_address(address).await?)
    }

    // Cached-state accessors. Each returns a clone of the current snapshot.

    pub fn total_balance(&self) -> TotalBalance {
        self.cache.lock().unwrap().balance.clone()
    }

    pub fn addresses(&self) -> Vec<Address> {
        self.cache.lock().unwrap().addresses.clone()
    }

    pub fn transactions(&self) -> Vec<Transaction> {
        self.cache.lock().unwrap().transactions.clone()
    }

    pub fn wallet_settings(&self) -> WalletSettings {
        self.cache.lock().unwrap().settings.clone()
    }

    pub fn info(&self) -> Option<Info> {
        self.cache.lock().unwrap().info.clone()
    }

    pub fn wallet_height(&self) -> u64 {
        self.cache.lock().unwrap().wallet_height
    }

    pub fn server_height(&self) -> u64 {
        self.cache.lock().unwrap().server_height
    }

    pub fn birthday(&self) -> u64 {
        self.cache.lock().unwrap().birthday
    }

    pub fn sync_progress(&self) -> SyncProgress {
        self.progress.lock().unwrap().clone()
    }

    pub fn is_refreshing(&self) -> bool {
        self.in_refresh.load(SeqCst) || self.poll_active.load(SeqCst)
    }

    pub fn default_fee(&self) -> rust_decimal::Decimal {
        self.cache
            .lock()
            .unwrap()
            .info
            .as_ref()
            .map(|info| info.default_fee)
            .unwrap_or_else(|| zats_to_decimal(FALLBACK_FEE_ZATS))
    }

    pub(crate) fn sending_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.in_send)
    }

    // Engine fetch helpers. Each logs and keeps the previous cached value on
    // failure so one bad poll never blanks the UI.

    async fn load_wallet_data(&self) {
        self.fetch_total_balance().await;
        self.fetch_transactions().await;
        self.fetch_wallet_settings().await;
    }

    async fn fetch_wallet_height(&self) -> u64 {
        match self.gateway.wallet_height().await {
            Ok(height) => {
                self.cache.lock().unwrap().wallet_height = height;
                height
            }
            Err(e) => {
                warn!(error = %e, "wallet height fetch failed");
                self.cache.lock().unwrap().wallet_height
            }
        }
    }

    async fn fetch_info_and_server_height(&self) -> u64 {
        let raw = match self.gateway.info().await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "server info fetch failed");
                return self.cache.lock().unwrap().server_height;
            }
        };
        let fee_zats = match self.gateway.default_fee().await {
            Ok(fee) if fee > 0 => fee as i64,
            Ok(_) => FALLBACK_FEE_ZATS,
            Err(e) => {
                warn!(error = %e, "default fee fetch failed");
                FALLBACK_FEE_ZATS
            }
        };

        let commit = raw.git_commit.get(..6).unwrap_or(&raw.git_commit);
        let info = Info {
            chain_name: raw.chain_name.clone(),
            latest_block: raw.latest_block_height,
            server_uri: raw.server_uri.unwrap_or_else(|| "<none>".to_string()),
            version: format!("{}/{}/{}", raw.vendor, commit, raw.version),
            currency_name: if raw.chain_name == "main" {
                "ZEC".to_string()
            } else {
                "TAZ".to_string()
            },
            default_fee: zats_to_decimal(fee_zats),
        };

        let mut cache = self.cache.lock().unwrap();
        cache.server_height = info.latest_block;
        cache.info = Some(info);
        cache.server_height
    }

    async fn fetch_wallet_birthday(&self) {
        let birthday = if self.config.read_only {
            match self.gateway.export_ufvk().await {
                Ok(response) => response.birthday,
                Err(e) => {
                    warn!(error = %e, "viewing key export failed");
                    None
                }
            }
        } else {
            match self.gateway.seed().await {
                Ok(response) => response.birthday,
                Err(e) => {
                    warn!(error = %e, "seed fetch failed");
                    None
                }
            }
        };
        if let Some(birthday) = birthday {
            self.cache.lock().unwrap().birthday = birthday;
        }
    }

    async fn fetch_total_balance(&self) {
        let balance = match self.gateway.balance().await {
            Ok(balance) => balance,
            Err(e) => {
                warn!(error = %e, "balance fetch failed");
                return;
            }
        };
        let notes = match self.gateway.notes().await {
            Ok(notes) => notes,
            Err(e) => {
                warn!(error = %e, "notes fetch failed");
                return;
            }
        };
        let entries = match self.gateway.addresses().await {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "addresses fetch failed");
                return;
            }
        };

        let total =
            balance.orchard_balance + balance.sapling_balance + balance.transparent_balance;
        let total_balance = TotalBalance {
            orchard: zats_to_decimal(balance.orchard_balance as i64),
            sapling: zats_to_decimal(balance.sapling_balance as i64),
            transparent: zats_to_decimal(balance.transparent_balance as i64),
            spendable_orchard: zats_to_decimal(balance.spendable_orchard_balance as i64),
            spendable_sapling: zats_to_decimal(balance.spendable_sapling_balance as i64),
            total: zats_to_decimal(total as i64),
        };

        let pending: HashSet<&str> = notes
            .pending_orchard_notes
            .iter()
            .chain(&notes.pending_sapling_notes)
            .chain(&notes.pending_utxos)
            .map(|note| note.address.as_str())
            .collect();

        let mut addresses = Vec::new();
        for entry in &entries {
            let receivers = {
                let mut r = String::new();
                if entry.receivers.orchard_exists {
                    r.push('o');
                }
                if entry.receivers.sapling.is_some() {
                    r.push('z');
                }
                if entry.receivers.transparent.is_some() {
                    r.push('t');
                }
                r
            };
            addresses.push(Address {
                ua: entry.address.clone(),
                address: entry.address.clone(),
                kind: AddressKind::Unified,
                receivers: receivers.clone(),
                contains_pending: pending.contains(entry.address.as_str()),
            });
            if let Some(sapling) = &entry.receivers.sapling {
                addresses.push(Address {
                    ua: entry.address.clone(),
                    address: sapling.clone(),
                    kind: AddressKind::Sapling,
                    receivers: receivers.clone(),
                    contains_pending: pending.contains(sapling.as_str()),
                });
            }
            if let Some(transparent) = &entry.receivers.transparent {
                addresses.push(Address {
                    ua: entry.address.clone(),
                    address: transparent.clone(),
                    kind: AddressKind::Transparent,
                    receivers,
                    contains_pending: pending.contains(transparent.as_str()),
                });
            }
        }

        let mut cache = self.cache.lock().unwrap();
        cache.balance = total_balance;
        cache.addresses = addresses;
    }

    async fn fetch_transactions(&self) {
        let lines = match self.gateway.summaries().await {
            Ok(lines) => lines,
            Err(e) => {
                warn!(error = %e, "transaction summaries fetch failed");
                return;
            }
        };
        let (server_height, wallet_height) = {
            let cache = self.cache.lock().unwrap();
            (cache.server_height, cache.wallet_height)
        };
        let transactions = aggregate_summaries(&lines, server_height, wallet_height);
        self.cache.lock().unwrap().transactions = transactions;
    }

    async fn fetch_wallet_settings(&self) {
        let download_memos = match self.gateway.get_option("download_memos").await {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "download_memos option fetch failed");
                return;
            }
        };
        let transaction_filter_threshold = match self
            .gateway
            .get_option("transaction_filter_threshold")
            .await
        {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "transaction_filter_threshold option fetch failed");
                return;
            }
        };
        self.cache.lock().unwrap().settings = WalletSettings {
            download_memos,
            transaction_filter_threshold,
        };
    }

    async fn save_wallet(&self) {
        if let Err(e) = self.gateway.save().await {
            warn!(error = %e, "wallet save failed");
        }
    }
}
