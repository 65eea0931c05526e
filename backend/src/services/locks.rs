//! Per-SKU write serialisation inside one process

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::models::Barcode;

/// Registry of one async mutex per barcode.
///
/// Mutations for the same barcode queue up behind each other; different
/// barcodes never contend. Entries are created on first use and kept.
#[derive(Clone, Default)]
pub struct SkuLocks {
    locks: Arc<Mutex<HashMap<Barcode, Arc<AsyncMutex<()>>>>>,
}

/// Held for the duration of one mutation
pub type SkuGuard = OwnedMutexGuard<()>;

impl SkuLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, barcode: Barcode) -> SkuGuard {
        let lock = self.locks.lock().entry(barcode).or_default().clone();
        lock.lock_owned().await
    }
}
