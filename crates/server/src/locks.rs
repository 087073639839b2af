use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Per-key async locks serialising the open-lead check and insert for one phone number.
///
/// Entries no longer held by any guard are pruned on the next acquisition.
#[derive(Default)]
pub struct PhoneLocks {
    entries: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl PhoneLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, phone_number: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            entries.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(entries.entry(phone_number.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    pub fn tracked(&self) -> usize {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
