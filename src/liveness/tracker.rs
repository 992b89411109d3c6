use crate::tasks::types::now_ms;
use dashmap::DashMap;
use std::sync::Arc;

pub struct HeartbeatTracker {
    last_seen: DashMap<String, u64>,
    timeout_ms: u64,
}

impl HeartbeatTracker {
    pub fn new(timeout_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            last_seen: DashMap::new(),
            timeout_ms,
        })
    }

    /// Records a heartbeat and returns the server time written.
    /// Stale entries are swept opportunistically on the same call.
    pub fn heartbeat(&self, worker_id: &str) -> u64 {
        let now = now_ms();
        self.last_seen.insert(worker_id.to_string(), now);
        self.sweep(now);
        now
    }

    pub fn is_online(&self, worker_id: &str) -> bool {
        let now = now_ms();
        match self.last_seen.get(worker_id) {
            Some(entry) => now.saturating_sub(*entry) <= self.timeout_ms,
            None => false,
        }
    }

    pub fn last_heartbeat(&self, worker_id: &str) -> Option<u64> {
        let last = *self.last_seen.get(worker_id)?;
        if now_ms().saturating_sub(last) > self.timeout_ms {
            return None;
        }
        Some(last)
    }

    /// Drops entries older than the liveness window.
    pub fn sweep(&self, now: u64) -> usize {
        let before = self.last_seen.len();
        self.last_seen
            .retain(|_, last| now.saturating_sub(*last) <= self.timeout_ms);
        let removed = before - self.last_seen.len();
        if removed > 0 {
            tracing::debug!("Swept {} stale heartbeat entries", removed);
        }
        removed
    }

    pub fn online_count(&self) -> usize {
        let now = now_ms();
        self.last_seen
            .iter()
            .filter(|entry| now.saturating_sub(*entry.value()) <= self.timeout_ms)
            .count()
    }
}
