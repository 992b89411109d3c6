//! Bucket Planner
//!
//! Computes the next contiguous range of input items to hand out, under the
//! task's planning limits, and normalises those limits so that every single
//! item fits in some bucket.
//!
//! ## Mechanism
//! - **Sizing**: an item's size is the byte length of its canonical JSON
//!   serialisation.
//! - **Normalisation**: while the largest item exceeds the byte cap, halve
//!   the bucket count (floor, min 1) and double the cap. Capacity only ever
//!   grows, bucket count only ever shrinks.
//! - **Selection**: find the smallest uncovered index and extend the range
//!   while it stays uncovered, within the byte cap and the per-bucket item
//!   share. At least one item is always included.

use crate::tasks::types::BucketConfig;
use serde_json::Value;

/// A half-open range of items ready to be leased.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedBucket {
    pub range_start: usize,
    pub range_end: usize,
    pub bytes_used: u64,
}

/// Canonical serialised byte length of one item.
pub fn item_size(item: &Value) -> u64 {
    serde_json::to_string(item)
        .map(|encoded| encoded.len() as u64)
        .unwrap_or(0)
}

pub fn largest_item_size(items: &[Value]) -> u64 {
    items.iter().map(item_size).max().unwrap_or(0)
}

/// Grows `config` until the largest item fits.
///
/// Monotone in both directions: `max_buckets` is never raised and
/// `max_bucket_bytes` never lowered. Returns true when the config changed.
pub fn normalize_config(items: &[Value], config: &mut BucketConfig) -> bool {
    let largest = largest_item_size(items);
    let original = *config;

    while largest > config.max_bucket_bytes && config.max_buckets > 1 {
        config.max_buckets = (config.max_buckets / 2).max(1);
        config.max_bucket_bytes = config.max_bucket_bytes.saturating_mul(2);
    }
    if largest > config.max_bucket_bytes {
        config.max_bucket_bytes = largest.saturating_mul(2);
    }

    let changed = *config != original;
    if changed {
        tracing::debug!(
            "Normalised bucket config: {}x{}B -> {}x{}B (largest item {}B)",
            original.max_buckets,
            original.max_bucket_bytes,
            config.max_buckets,
            config.max_bucket_bytes,
            largest
        );
    }
    changed
}

fn is_covered(covered: &[(usize, usize)], index: usize) -> bool {
    covered
        .iter()
        .any(|&(start, end)| index >= start && index < end)
}

/// Computes the next free bucket, or `None` when every item is covered.
///
/// `covered` is the union of terminal result ranges and active lease
/// ranges. The caller is expected to have normalised `config` first so the
/// first free item always fits.
pub fn plan_next_bucket(
    items: &[Value],
    config: &BucketConfig,
    covered: &[(usize, usize)],
) -> Option<PlannedBucket> {
    let total = items.len();
    let range_start = (0..total).find(|&index| !is_covered(covered, index))?;

    // Aim for an even split across the configured bucket count.
    let per_bucket = total
        .div_ceil(config.max_buckets.max(1) as usize)
        .max(1);

    let mut range_end = range_start;
    let mut bytes_used = 0u64;
    while range_end < total
        && !is_covered(covered, range_end)
        && range_end - range_start < per_bucket
    {
        let size = item_size(&items[range_end]);
        if range_end > range_start && bytes_used + size > config.max_bucket_bytes {
            break;
        }
        bytes_used += size;
        range_end += 1;
    }

    Some(PlannedBucket {
        range_start,
        range_end,
        bytes_used,
    })
}
