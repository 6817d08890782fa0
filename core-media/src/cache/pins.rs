//! Reference-counted asset pins.
//!
//! A pinned asset is never chosen for eviction. Each consumer holds its own
//! [`PinGuard`]; the pin is released when the last guard drops.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct PinTable {
    counts: Mutex<HashMap<String, usize>>,
}

impl PinTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn pin(self: &Arc<Self>, asset_id: &str) -> PinGuard {
        *self
            .counts
            .lock()
            .entry(asset_id.to_string())
            .or_insert(0) += 1;
        PinGuard {
            table: Arc::clone(self),
            asset_id: asset_id.to_string(),
        }
    }

    pub fn is_pinned(&self, asset_id: &str) -> bool {
        self.counts.lock().contains_key(asset_id)
    }

    pub fn pin_count(&self, asset_id: &str) -> usize {
        self.counts.lock().get(asset_id).copied().unwrap_or(0)
    }

    fn release(&self, asset_id: &str) {
        let mut counts = self.counts.lock();
        if let Some(count) = counts.get_mut(asset_id) {
            *count -= 1;
            if *count == 0 {
                counts.remove(asset_id);
            }
        }
    }
}

/// Keeps an asset pinned while alive.
#[derive(Debug)]
pub struct PinGuard {
    table: Arc<PinTable>,
    asset_id: String,
}

impl PinGuard {
    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        self.table.release(&self.asset_id);
    }
}
