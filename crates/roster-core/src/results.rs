use std::{collections::HashMap, sync::Arc};

use tokio::sync::Mutex;

use crate::domain::{AggregationResult, Phone};

/// Last completed parse result per phone, kept in memory for export.
#[derive(Default)]
pub struct ResultStore {
    inner: Mutex<HashMap<Phone, Arc<AggregationResult>>>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace whatever was stored for `phone`.
    pub async fn put(&self, phone: &Phone, result: AggregationResult) -> Arc<AggregationResult> {
        let result = Arc::new(result);
        self.inner
            .lock()
            .await
            .insert(phone.clone(), Arc::clone(&result));
        result
    }

    pub async fn get(&self, phone: &Phone) -> Option<Arc<AggregationResult>> {
        self.inner.lock().await.get(phone).cloned()
    }

    pub async fn remove(&self, phone: &Phone) -> bool {
        self.inner.lock().await.remove(phone).is_some()
    }
}
