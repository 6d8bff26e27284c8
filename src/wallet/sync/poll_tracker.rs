//! Pure bookkeeping over raw sync-status snapshots.
//!
//! One `PollTracker` lives for the duration of a refresh. Each poll tick
//! feeds it the engine's raw status plus ambient context (heights, tick
//! length); it answers with a [`SyncProgress`] snapshot, the side effects
//! the shell should perform, and whether the run is over. Keeping this free
//! of I/O and timers is what makes the stall, clamp and batch-boundary rules
//! testable with plain snapshots.

use tracing::{debug, info, warn};

use crate::engine::SyncStatus;
use crate::wallet::types::SyncProgress;

/// Side effect the shell must perform after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickEffect {
    /// The engine restarted its run (new sync id): reload cached data, save
    /// the wallet, and treat per-batch counters as fresh.
    SyncIdChanged,
    /// One or more batches completed since the last tick: persist now so a
    /// crash does not lose the scanned range.
    BatchBoundary,
}

/// Ambient inputs for one tick that do not come from the status payload.
#[derive(Debug, Clone, Copy)]
pub struct TickContext {
    pub wallet_height: u64,
    pub server_height: u64,
    /// Chain tip fetched right after the sync command was issued, if any.
    pub latest_block: Option<u64>,
    pub tick_secs: u64,
}

/// What one tick produced.
#[derive(Debug, Clone)]
pub struct TickOutcome {
    pub progress: SyncProgress,
    pub effects: Vec<TickEffect>,
    pub finished: bool,
}

/// Derives display progress and persistence points from raw status
/// snapshots. All counters are relative to the run it was created for.
pub struct PollTracker {
    blocks_per_batch: u64,
    stall_threshold_secs: u64,
    prev_sync_id: Option<u64>,
    prev_batch_num: Option<u64>,
    prev_current_block: Option<u64>,
    seconds_in_batch: u64,
    seconds_on_block: u64,
}

impl PollTracker {
    pub fn new(blocks_per_batch: u64, stall_threshold_secs: u64) -> Self {
        Self {
            blocks_per_batch,
            stall_threshold_secs,
            prev_sync_id: None,
            prev_batch_num: None,
            prev_current_block: None,
            seconds_in_batch: 0,
            seconds_on_block: 0,
        }
    }

    /// Fold one raw status snapshot into the tracker.
    pub fn observe(&mut self, status: &SyncStatus, ctx: &TickContext) -> TickOutcome {
        let mut effects = Vec::new();

        if let Some(prev_id) = self.prev_sync_id {
            if status.sync_id != prev_id {
                info!(
                    prev_id,
                    sync_id = status.sync_id,
                    "engine restarted its sync run"
                );
                effects.push(TickEffect::SyncIdChanged);
                self.prev_batch_num = None;
                self.prev_current_block = None;
                self.seconds_in_batch = 0;
                self.seconds_on_block = 0;
            }
        }
        self.prev_sync_id = Some(status.sync_id);

        let finished = !status.in_progress;

        // Stage counters can momentarily overshoot the batch size while the
        // engine rolls over; clamp before averaging.
        let clamp = |v: i64| -> u64 { v.clamp(0, self.blocks_per_batch as i64) as u64 };
        let stage_sum = clamp(status.synced_blocks)
            + clamp(status.trial_decryptions_blocks)
            + clamp(status.witnesses_updated);

        // First block of the whole run, reconstructed from the batch
        // numbering. Early ticks may predate the engine filling these in.
        let process_end_block = if status.end_block == 0 && status.batch_num == 0 {
            ctx.latest_block.unwrap_or(ctx.server_height)
        } else {
            status
                .end_block
                .saturating_sub(status.batch_num * self.blocks_per_batch)
        };

        let mut current_block = status.end_block + stage_sum / 3;
        if ctx.server_height > 0 {
            current_block = current_block.min(ctx.server_height);
        }

        // Stall detection runs on the raw derived block, before the
        // monotonic clamp, so a genuinely frozen engine is not masked by
        // the clamp holding the displayed value steady.
        let mut stalled = false;
        if !finished {
            match self.prev_current_block {
                Some(prev) if prev == current_block && current_block != 0 => {
                    self.seconds_on_block += ctx.tick_secs;
                    stalled = self.seconds_on_block >= self.stall_threshold_secs;
                    if stalled {
                        warn!(
                            current_block,
                            seconds = self.seconds_on_block,
                            "sync appears stalled"
                        );
                    }
                }
                _ => self.seconds_on_block = 0,
            }
        }

        // Displayed progress never moves backwards within a run; a dip in
        // the derived value shows as a one-block advance instead.
        if let Some(prev) = self.prev_current_block {
            if current_block < prev {
                current_block = prev + 1;
            }
        }
        self.prev_current_block = Some(current_block);

        self.seconds_in_batch += ctx.tick_secs;

        // Persist at every batch boundary, before the progress snapshot is
        // built, so the boundary tick already shows a fresh batch timer.
        if !finished {
            if let Some(prev_batch) = self.prev_batch_num {
                if status.batch_num != prev_batch {
                    self.seconds_in_batch = 0;
                    self.seconds_on_block = 0;
                    debug!(batch = status.batch_num, "crossed a batch boundary");
                    effects.push(TickEffect::BatchBoundary);
                }
            }
            self.prev_batch_num = Some(status.batch_num);
        }

        let progress = if finished {
            SyncProgress {
                sync_id: status.sync_id,
                total_batches: 0,
                current_batch: 0,
                current_block,
                process_end_block,
                last_block_wallet: ctx.wallet_height,
                last_block_server: ctx.server_height,
                in_progress: false,
                stalled: false,
                seconds_in_batch: 0,
                last_error: status.last_error.clone(),
            }
        } else {
            SyncProgress {
                sync_id: status.sync_id,
                total_batches: status.batch_total,
                current_batch: status.batch_num + 1,
                current_block,
                process_end_block,
                last_block_wallet: ctx.wallet_height,
                last_block_server: ctx.server_height,
                in_progress: true,
                stalled,
                seconds_in_batch: self.seconds_in_batch,
                last_error: status.last_error.clone(),
            }
        };

        TickOutcome {
            progress,
            effects,
            finished,
        }
    }
}
