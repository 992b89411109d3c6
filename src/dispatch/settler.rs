//! Payout Settler
//!
//! Settles one completed bucket: customer debit, worker credit, platform
//! accrual, all recorded while the caller holds the task's writer lock.
//! The `payout_issued` flag makes retried terminal updates idempotent;
//! failed and skipped buckets never pay.

use crate::tasks::types::{now_ms, BucketResult, BucketStatus, Task};
use crate::wallet::ledger::WalletLedger;
use crate::wallet::types::{Credits, TxMeta, TxType};

use serde::Serialize;
use std::sync::Arc;

/// The three-way split applied for one bucket.
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutSummary {
    pub amount: Credits,
    pub worker_share: Credits,
    pub platform_share: Credits,
}

pub struct Settler {
    ledger: Arc<WalletLedger>,
}

impl Settler {
    pub fn new(ledger: Arc<WalletLedger>) -> Arc<Self> {
        Arc::new(Self { ledger })
    }

    /// Applies the payout for a completed bucket and marks it issued.
    ///
    /// Mutates `task` (budget counters) and `result` (payout flags) in
    /// place; the caller persists both and holds the task's writer lock.
    /// A missing customer account defers the payout: the result stays
    /// completed without `payout_issued`, eligible for retry on the next
    /// terminal update.
    pub fn settle_bucket_locked(
        &self,
        task: &mut Task,
        result: &mut BucketResult,
    ) -> Option<PayoutSummary> {
        if result.payout_issued || result.status != BucketStatus::Completed {
            return None;
        }
        if task.budget.chunks_paid >= task.budget.max_billable_buckets {
            tracing::debug!(
                "Bucket {}#{} completed past the billable cap; no payout",
                task.id.0,
                result.bucket_index
            );
            return None;
        }

        let Some(customer) = self.ledger.user_by_session(&task.creator_id) else {
            tracing::warn!(
                "Payout for {}#{} deferred: customer account {} not resolvable",
                task.id.0,
                result.bucket_index,
                task.creator_id
            );
            return None;
        };

        let cost = task.budget.cost_per_bucket;
        let platform_share = cost.percent_share(task.budget.platform_fee_percent);
        let worker_share = cost.saturating_sub(platform_share);
        let meta = TxMeta::for_bucket(&task.id.0, result.bucket_index);

        if let Err(e) = self
            .ledger
            .adjust(&customer.id, cost.neg(), TxType::ChunkDebit, meta.clone())
        {
            tracing::warn!(
                "Payout for {}#{} failed on customer debit: {}",
                task.id.0,
                result.bucket_index,
                e
            );
            return None;
        }

        let worker = self.ledger.ensure_worker_account(&result.worker_id);
        if let Err(e) = self
            .ledger
            .adjust(&worker.id, worker_share, TxType::ChunkCredit, meta.clone())
        {
            // The debit already landed; surface loudly rather than unwind.
            tracing::error!(
                "Worker credit failed for {}#{} after customer debit: {}",
                task.id.0,
                result.bucket_index,
                e
            );
        }
        self.ledger.accrue_platform(platform_share, meta);

        result.payout_issued = true;
        result.payout_at = Some(now_ms());
        task.budget.chunks_paid += 1;
        task.budget.budget_spent = task.budget.budget_spent.saturating_add(cost);

        tracing::info!(
            "Settled bucket {}#{}: {} to worker, {} platform fee",
            task.id.0,
            result.bucket_index,
            worker_share,
            platform_share
        );

        Some(PayoutSummary {
            amount: cost,
            worker_share,
            platform_share,
        })
    }
}
