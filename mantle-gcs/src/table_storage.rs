// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS table storage — typed wrappers over the raw store client.
//!
//! Each GCS table (jobs, nodes, actors, placement groups, workers) stores
//! prost-encoded values keyed by the hex form of the entity id. Transient
//! store errors are retried here with exponential backoff so callers only
//! ever see permanent failures.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use prost::Message;

use mantle_util::backoff::ExponentialBackoff;

use crate::store_client::{StoreClient, StoreError, StoreResult};

/// Table names used by the GCS.
pub mod table_names {
    pub const JOB: &str = "Job";
    pub const NODE: &str = "Node";
    pub const ACTOR: &str = "Actor";
    pub const PLACEMENT_GROUP: &str = "PlacementGroup";
    pub const WORKER: &str = "Worker";
}

const MAX_RETRIES: u32 = 5;

/// Re-evaluates `$op` until it succeeds, fails permanently, or transient
/// retries are exhausted.
macro_rules! retry_transient {
    ($table:expr, $op:expr) => {{
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(100), 2.0, Duration::from_secs(5));
        let mut attempt: u32 = 0;
        loop {
            match $op {
                Ok(v) => break Ok(v),
                Err(e) if e.is_transient() && attempt < MAX_RETRIES => {
                    attempt += 1;
                    let delay = backoff.next_delay_with_jitter();
                    tracing::warn!(table = $table, attempt, %e, "Transient store error, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(StoreError::Transient(msg)) => {
                    break Err(StoreError::Permanent(format!(
                        "{}: retries exhausted: {msg}",
                        $table
                    )))
                }
                Err(e) => break Err(e),
            }
        }
    }};
}

/// Generic typed table backed by a StoreClient.
///
/// Keys are hex strings of the entity id's binary form; values are
/// prost-encoded messages.
pub struct GcsTable<V: Message + Default> {
    table_name: String,
    store_client: Arc<dyn StoreClient>,
    _phantom: std::marker::PhantomData<V>,
}

impl<V: Message + Default> GcsTable<V> {
    pub fn new(table_name: &str, store_client: Arc<dyn StoreClient>) -> Self {
        Self {
            table_name: table_name.to_string(),
            store_client,
            _phantom: std::marker::PhantomData,
        }
    }

    /// Store a value by key.
    pub async fn put(&self, key: &str, value: &V) -> StoreResult<bool> {
        let data = value.encode_to_vec();
        retry_transient!(
            &self.table_name,
            self.store_client
                .put(&self.table_name, key, data.clone(), true)
                .await
        )
    }

    /// Get a value by key.
    pub async fn get(&self, key: &str) -> StoreResult<Option<V>> {
        let raw: Option<Vec<u8>> = retry_transient!(
            &self.table_name,
            self.store_client.get(&self.table_name, key).await
        )?;
        match raw {
            Some(data) => {
                let value = V::decode(data.as_slice())
                    .map_err(|e| StoreError::Permanent(format!("record decode error: {e}")))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// Get all entries in the table.
    pub async fn get_all(&self) -> StoreResult<HashMap<String, V>> {
        let raw: HashMap<String, Vec<u8>> = retry_transient!(
            &self.table_name,
            self.store_client.get_all(&self.table_name).await
        )?;
        let mut result = HashMap::new();
        for (key, data) in raw {
            let value = V::decode(data.as_slice())
                .map_err(|e| StoreError::Permanent(format!("record decode error: {e}")))?;
            result.insert(key, value);
        }
        Ok(result)
    }

    /// Delete a value by key.
    pub async fn delete(&self, key: &str) -> StoreResult<bool> {
        retry_transient!(
            &self.table_name,
            self.store_client.delete(&self.table_name, key).await
        )
    }

    /// Delete multiple values.
    pub async fn batch_delete(&self, keys: &[String]) -> StoreResult<i64> {
        retry_transient!(
            &self.table_name,
            self.store_client.batch_delete(&self.table_name, keys).await
        )
    }
}

/// All GCS tables in one struct, created during server initialization.
pub struct GcsTableStorage {
    store_client: Arc<dyn StoreClient>,
}

impl GcsTableStorage {
    pub fn new(store_client: Arc<dyn StoreClient>) -> Self {
        Self { store_client }
    }

    pub fn store_client(&self) -> &Arc<dyn StoreClient> {
        &self.store_client
    }

    pub fn job_table(&self) -> GcsTable<mantle_proto::rpc::JobTableData> {
        GcsTable::new(table_names::JOB, self.store_client.clone())
    }

    pub fn node_table(&self) -> GcsTable<mantle_proto::rpc::NodeInfo> {
        GcsTable::new(table_names::NODE, self.store_client.clone())
    }

    pub fn actor_table(&self) -> GcsTable<mantle_proto::rpc::ActorTableData> {
        GcsTable::new(table_names::ACTOR, self.store_client.clone())
    }

    pub fn placement_group_table(&self) -> GcsTable<mantle_proto::rpc::PlacementGroupTableData> {
        GcsTable::new(table_names::PLACEMENT_GROUP, self.store_client.clone())
    }

    pub fn worker_table(&self) -> GcsTable<mantle_proto::rpc::WorkerTableData> {
        GcsTable::new(table_names::WORKER, self.store_client.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_client::InMemoryStoreClient;
    use parking_lot::Mutex;
    use std::collections::HashMap as StdHashMap;

    #[tokio::test]
    async fn test_gcs_table_put_get() {
        let store = Arc::new(InMemoryStoreClient::new());
        let storage = GcsTableStorage::new(store);
        let table = storage.job_table();

        let job_data = mantle_proto::rpc::JobTableData {
            job_id: b"\x01\x00\x00\x00".to_vec(),
            is_dead: false,
            ..Default::default()
        };

        table.put("job1", &job_data).await.unwrap();
        let retrieved = table.get("job1").await.unwrap().unwrap();
        assert_eq!(retrieved.job_id, b"\x01\x00\x00\x00".to_vec());
        assert!(!retrieved.is_dead);
    }

    #[tokio::test]
    async fn test_gcs_table_get_all() {
        let store = Arc::new(InMemoryStoreClient::new());
        let storage = GcsTableStorage::new(store);
        let table = storage.node_table();

        let node1 = mantle_proto::rpc::NodeInfo {
            node_id: b"\x01".to_vec(),
            ..Default::default()
        };
        let node2 = mantle_proto::rpc::NodeInfo {
            node_id: b"\x02".to_vec(),
            ..Default::default()
        };

        table.put("n1", &node1).await.unwrap();
        table.put("n2", &node2).await.unwrap();

        let all = table.get_all().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_gcs_table_delete() {
        let store = Arc::new(InMemoryStoreClient::new());
        let storage = GcsTableStorage::new(store);
        let table = storage.job_table();

        let job = mantle_proto::rpc::JobTableData::default();
        table.put("j1", &job).await.unwrap();
        assert!(table.delete("j1").await.unwrap());
        assert!(table.get("j1").await.unwrap().is_none());
    }

    /// Store that fails transiently N times before succeeding.
    struct FlakyStore {
        inner: InMemoryStoreClient,
        failures_left: Mutex<u32>,
    }

    impl FlakyStore {
        fn new(failures: u32) -> Self {
            Self {
                inner: InMemoryStoreClient::new(),
                failures_left: Mutex::new(failures),
            }
        }

        fn maybe_fail(&self) -> StoreResult<()> {
            let mut left = self.failures_left.lock();
            if *left > 0 {
                *left -= 1;
                Err(StoreError::Transient("flaky".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait::async_trait]
    impl StoreClient for FlakyStore {
        async fn put(
            &self,
            table: &str,
            key: &str,
            data: Vec<u8>,
            overwrite: bool,
        ) -> StoreResult<bool> {
            self.maybe_fail()?;
            self.inner.put(table, key, data, overwrite).await
        }
        async fn get(&self, table: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
            self.maybe_fail()?;
            self.inner.get(table, key).await
        }
        async fn get_all(&self, table: &str) -> StoreResult<StdHashMap<String, Vec<u8>>> {
            self.maybe_fail()?;
            self.inner.get_all(table).await
        }
        async fn delete(&self, table: &str, key: &str) -> StoreResult<bool> {
            self.maybe_fail()?;
            self.inner.delete(table, key).await
        }
        async fn batch_delete(&self, table: &str, keys: &[String]) -> StoreResult<i64> {
            self.maybe_fail()?;
            self.inner.batch_delete(table, keys).await
        }
        async fn get_keys(&self, table: &str, prefix: &str) -> StoreResult<Vec<String>> {
            self.maybe_fail()?;
            self.inner.get_keys(table, prefix).await
        }
        async fn exists(&self, table: &str, key: &str) -> StoreResult<bool> {
            self.maybe_fail()?;
            self.inner.exists(table, key).await
        }
        async fn get_next_job_id(&self) -> StoreResult<i32> {
            self.maybe_fail()?;
            self.inner.get_next_job_id().await
        }
        async fn ping(&self) -> StoreResult<()> {
            self.maybe_fail()
        }
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let store = Arc::new(FlakyStore::new(2));
        let storage = GcsTableStorage::new(store);
        let table = storage.job_table();

        let job = mantle_proto::rpc::JobTableData {
            job_id: vec![9, 0, 0, 0],
            ..Default::default()
        };
        // Two transient failures, then success — the retry loop absorbs them.
        table.put("j9", &job).await.unwrap();
        let got = table.get("j9").await.unwrap().unwrap();
        assert_eq!(got.job_id, vec![9, 0, 0, 0]);
    }

    #[tokio::test]
    async fn test_retries_exhausted_becomes_permanent() {
        let store = Arc::new(FlakyStore::new(u32::MAX));
        let storage = GcsTableStorage::new(store);
        let table = storage.job_table();

        let err = table
            .put("j1", &mantle_proto::rpc::JobTableData::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Permanent(_)));
    }
}
