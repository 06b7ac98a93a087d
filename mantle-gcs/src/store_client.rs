// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Store client abstraction — the durable persistence layer behind the GCS.
//!
//! Two backends:
//! - `InMemoryStoreClient` — single-node / non-HA setups and tests
//! - `RedisStoreClient` — durable backend for restartable GCS
//!
//! Errors are split into transient (connection-level; retried by the typed
//! table layer) and permanent (data-level or exhausted retries; surfaced and
//! eventually fatal via the failure detector).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use thiserror::Error;

use mantle_common::runtime::PeriodicalRunner;

/// Errors from store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("key not found")]
    NotFound,
    /// Connection-level failure. Safe to retry with backoff.
    #[error("transient store error: {0}")]
    Transient(String),
    /// Unrecoverable failure (corrupt data, protocol error, retries
    /// exhausted). Surfaces to the caller and may trigger server stop.
    #[error("permanent store error: {0}")]
    Permanent(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Transient(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

fn classify_redis_error(e: redis::RedisError) -> StoreError {
    if e.is_connection_refusal() || e.is_connection_dropped() || e.is_timeout() || e.is_io_error() {
        StoreError::Transient(e.to_string())
    } else {
        StoreError::Permanent(e.to_string())
    }
}

/// The store client interface — async KV operations organized by logical
/// table ("Job", "Node", "Actor", ...). Each table is an independent
/// key-value map.
#[async_trait::async_trait]
pub trait StoreClient: Send + Sync {
    /// Put a key-value pair. Returns true if the key already existed.
    async fn put(
        &self,
        table: &str,
        key: &str,
        data: Vec<u8>,
        overwrite: bool,
    ) -> StoreResult<bool>;

    /// Get a value by key.
    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Get all key-value pairs in a table.
    async fn get_all(&self, table: &str) -> StoreResult<HashMap<String, Vec<u8>>>;

    /// Delete a key. Returns true if the key existed.
    async fn delete(&self, table: &str, key: &str) -> StoreResult<bool>;

    /// Delete multiple keys. Returns the count of deleted keys.
    async fn batch_delete(&self, table: &str, keys: &[String]) -> StoreResult<i64>;

    /// Get all keys in a table matching a prefix.
    async fn get_keys(&self, table: &str, prefix: &str) -> StoreResult<Vec<String>>;

    /// Check if a key exists.
    async fn exists(&self, table: &str, key: &str) -> StoreResult<bool>;

    /// Get the next auto-incrementing job ID.
    async fn get_next_job_id(&self) -> StoreResult<i32>;

    /// Liveness probe used by the failure detector.
    async fn ping(&self) -> StoreResult<()>;
}

/// Internal KV interface — namespaced key-value store behind the
/// InternalKV service. Separate from `StoreClient` because it is keyed by a
/// free-form namespace and supports prefix deletion.
#[async_trait::async_trait]
pub trait InternalKVInterface: Send + Sync {
    async fn get(&self, ns: &str, key: &str) -> StoreResult<Option<Vec<u8>>>;

    async fn put(&self, ns: &str, key: &str, value: Vec<u8>, overwrite: bool)
        -> StoreResult<bool>;

    /// Delete a key or, with `del_by_prefix`, all keys under a prefix.
    async fn del(&self, ns: &str, key: &str, del_by_prefix: bool) -> StoreResult<i64>;

    async fn exists(&self, ns: &str, key: &str) -> StoreResult<bool>;

    async fn keys(&self, ns: &str, prefix: &str) -> StoreResult<Vec<String>>;
}

// ─── In-memory backend ──────────────────────────────────────────────────────

/// Thread-safe in-memory store client for non-HA deployments.
pub struct InMemoryStoreClient {
    /// Table name → (key → value).
    tables: DashMap<String, DashMap<String, Vec<u8>>>,
    next_job_id: AtomicI64,
}

impl InMemoryStoreClient {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            next_job_id: AtomicI64::new(1),
        }
    }
}

impl Default for InMemoryStoreClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl StoreClient for InMemoryStoreClient {
    async fn put(
        &self,
        table: &str,
        key: &str,
        data: Vec<u8>,
        overwrite: bool,
    ) -> StoreResult<bool> {
        let tbl = self.tables.entry(table.to_string()).or_default();
        let existed = tbl.contains_key(key);
        if existed && !overwrite {
            return Ok(true);
        }
        tbl.insert(key.to_string(), data);
        Ok(existed)
    }

    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if let Some(tbl) = self.tables.get(table) {
            Ok(tbl.get(key).map(|v| v.value().clone()))
        } else {
            Ok(None)
        }
    }

    async fn get_all(&self, table: &str) -> StoreResult<HashMap<String, Vec<u8>>> {
        if let Some(tbl) = self.tables.get(table) {
            Ok(tbl
                .iter()
                .map(|e| (e.key().clone(), e.value().clone()))
                .collect())
        } else {
            Ok(HashMap::new())
        }
    }

    async fn delete(&self, table: &str, key: &str) -> StoreResult<bool> {
        if let Some(tbl) = self.tables.get(table) {
            Ok(tbl.remove(key).is_some())
        } else {
            Ok(false)
        }
    }

    async fn batch_delete(&self, table: &str, keys: &[String]) -> StoreResult<i64> {
        let mut count = 0i64;
        if let Some(tbl) = self.tables.get(table) {
            for key in keys {
                if tbl.remove(key.as_str()).is_some() {
                    count += 1;
                }
            }
        }
        Ok(count)
    }

    async fn get_keys(&self, table: &str, prefix: &str) -> StoreResult<Vec<String>> {
        if let Some(tbl) = self.tables.get(table) {
            Ok(tbl
                .iter()
                .filter(|e| e.key().starts_with(prefix))
                .map(|e| e.key().clone())
                .collect())
        } else {
            Ok(Vec::new())
        }
    }

    async fn exists(&self, table: &str, key: &str) -> StoreResult<bool> {
        if let Some(tbl) = self.tables.get(table) {
            Ok(tbl.contains_key(key))
        } else {
            Ok(false)
        }
    }

    async fn get_next_job_id(&self) -> StoreResult<i32> {
        Ok(self.next_job_id.fetch_add(1, Ordering::SeqCst) as i32)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// In-memory implementation of the InternalKV interface.
pub struct InMemoryInternalKV {
    /// Namespace → (key → value).
    data: DashMap<String, DashMap<String, Vec<u8>>>,
}

impl InMemoryInternalKV {
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }
}

impl Default for InMemoryInternalKV {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl InternalKVInterface for InMemoryInternalKV {
    async fn get(&self, ns: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if let Some(ns_map) = self.data.get(ns) {
            Ok(ns_map.get(key).map(|v| v.value().clone()))
        } else {
            Ok(None)
        }
    }

    async fn put(
        &self,
        ns: &str,
        key: &str,
        value: Vec<u8>,
        overwrite: bool,
    ) -> StoreResult<bool> {
        let ns_map = self.data.entry(ns.to_string()).or_default();
        let existed = ns_map.contains_key(key);
        if existed && !overwrite {
            return Ok(false);
        }
        ns_map.insert(key.to_string(), value);
        Ok(!existed)
    }

    async fn del(&self, ns: &str, key: &str, del_by_prefix: bool) -> StoreResult<i64> {
        if let Some(ns_map) = self.data.get(ns) {
            if del_by_prefix {
                let keys_to_delete: Vec<String> = ns_map
                    .iter()
                    .filter(|e| e.key().starts_with(key))
                    .map(|e| e.key().clone())
                    .collect();
                let count = keys_to_delete.len() as i64;
                for k in keys_to_delete {
                    ns_map.remove(&k);
                }
                Ok(count)
            } else {
                Ok(if ns_map.remove(key).is_some() { 1 } else { 0 })
            }
        } else {
            Ok(0)
        }
    }

    async fn exists(&self, ns: &str, key: &str) -> StoreResult<bool> {
        if let Some(ns_map) = self.data.get(ns) {
            Ok(ns_map.contains_key(key))
        } else {
            Ok(false)
        }
    }

    async fn keys(&self, ns: &str, prefix: &str) -> StoreResult<Vec<String>> {
        if let Some(ns_map) = self.data.get(ns) {
            Ok(ns_map
                .iter()
                .filter(|e| e.key().starts_with(prefix))
                .map(|e| e.key().clone())
                .collect())
        } else {
            Ok(Vec::new())
        }
    }
}

// ─── Redis backend ──────────────────────────────────────────────────────────

/// Redis-backed store client for restartable GCS deployments. Each logical
/// table maps to one Redis hash.
pub struct RedisStoreClient {
    client: redis::Client,
    namespace: String,
}

impl RedisStoreClient {
    pub fn new(redis_url: &str, namespace: String) -> StoreResult<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Permanent(e.to_string()))?;
        Ok(Self { client, namespace })
    }

    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(classify_redis_error)
    }

    fn table_key(&self, table: &str) -> String {
        format!("MANTLE{}@{}", self.namespace, table)
    }
}

#[async_trait::async_trait]
impl StoreClient for RedisStoreClient {
    async fn put(
        &self,
        table: &str,
        key: &str,
        data: Vec<u8>,
        overwrite: bool,
    ) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let table_key = self.table_key(table);
        if overwrite {
            let existed: bool = redis::cmd("HEXISTS")
                .arg(&table_key)
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(classify_redis_error)?;
            let _: () = redis::cmd("HSET")
                .arg(&table_key)
                .arg(key)
                .arg(data)
                .query_async(&mut conn)
                .await
                .map_err(classify_redis_error)?;
            Ok(existed)
        } else {
            let added: bool = redis::cmd("HSETNX")
                .arg(&table_key)
                .arg(key)
                .arg(data)
                .query_async(&mut conn)
                .await
                .map_err(classify_redis_error)?;
            // HSETNX returns 1 if set (new), so !added = existed
            Ok(!added)
        }
    }

    async fn get(&self, table: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let result: Option<Vec<u8>> = redis::cmd("HGET")
            .arg(self.table_key(table))
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(result)
    }

    async fn get_all(&self, table: &str) -> StoreResult<HashMap<String, Vec<u8>>> {
        let mut conn = self.conn().await?;
        let result: HashMap<String, Vec<u8>> = redis::cmd("HGETALL")
            .arg(self.table_key(table))
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(result)
    }

    async fn delete(&self, table: &str, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = redis::cmd("HDEL")
            .arg(self.table_key(table))
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(removed > 0)
    }

    async fn batch_delete(&self, table: &str, keys: &[String]) -> StoreResult<i64> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("HDEL");
        cmd.arg(self.table_key(table));
        for key in keys {
            cmd.arg(key.as_str());
        }
        let removed: i64 = cmd
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(removed)
    }

    async fn get_keys(&self, table: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let all = self.get_all(table).await?;
        Ok(all.into_keys().filter(|k| k.starts_with(prefix)).collect())
    }

    async fn exists(&self, table: &str, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = redis::cmd("HEXISTS")
            .arg(self.table_key(table))
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(exists)
    }

    async fn get_next_job_id(&self) -> StoreResult<i32> {
        let mut conn = self.conn().await?;
        let id: i64 = redis::cmd("INCR")
            .arg(format!("MANTLE{}@NextJobID", self.namespace))
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(id as i32)
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(())
    }
}

/// Redis-backed internal KV. Namespaces map to Redis hashes.
pub struct RedisInternalKV {
    client: redis::Client,
    prefix: String,
}

impl RedisInternalKV {
    pub fn new(redis_url: &str, prefix: String) -> StoreResult<Self> {
        let client =
            redis::Client::open(redis_url).map_err(|e| StoreError::Permanent(e.to_string()))?;
        Ok(Self { client, prefix })
    }

    async fn conn(&self) -> StoreResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(classify_redis_error)
    }

    fn ns_key(&self, ns: &str) -> String {
        format!("MANTLE{}@KV@{}", self.prefix, ns)
    }
}

#[async_trait::async_trait]
impl InternalKVInterface for RedisInternalKV {
    async fn get(&self, ns: &str, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        let result: Option<Vec<u8>> = redis::cmd("HGET")
            .arg(self.ns_key(ns))
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(result)
    }

    async fn put(
        &self,
        ns: &str,
        key: &str,
        value: Vec<u8>,
        overwrite: bool,
    ) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let cmd_name = if overwrite { "HSET" } else { "HSETNX" };
        let added: i64 = redis::cmd(cmd_name)
            .arg(self.ns_key(ns))
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(added > 0)
    }

    async fn del(&self, ns: &str, key: &str, del_by_prefix: bool) -> StoreResult<i64> {
        let mut conn = self.conn().await?;
        let ns_key = self.ns_key(ns);
        if del_by_prefix {
            let all_keys: Vec<String> = redis::cmd("HKEYS")
                .arg(&ns_key)
                .query_async(&mut conn)
                .await
                .map_err(classify_redis_error)?;
            let matches: Vec<String> =
                all_keys.into_iter().filter(|k| k.starts_with(key)).collect();
            if matches.is_empty() {
                return Ok(0);
            }
            let mut cmd = redis::cmd("HDEL");
            cmd.arg(&ns_key);
            for k in &matches {
                cmd.arg(k.as_str());
            }
            let removed: i64 = cmd
                .query_async(&mut conn)
                .await
                .map_err(classify_redis_error)?;
            Ok(removed)
        } else {
            let removed: i64 = redis::cmd("HDEL")
                .arg(&ns_key)
                .arg(key)
                .query_async(&mut conn)
                .await
                .map_err(classify_redis_error)?;
            Ok(removed)
        }
    }

    async fn exists(&self, ns: &str, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let exists: bool = redis::cmd("HEXISTS")
            .arg(self.ns_key(ns))
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(exists)
    }

    async fn keys(&self, ns: &str, prefix: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        let all_keys: Vec<String> = redis::cmd("HKEYS")
            .arg(self.ns_key(ns))
            .query_async(&mut conn)
            .await
            .map_err(classify_redis_error)?;
        Ok(all_keys
            .into_iter()
            .filter(|k| k.starts_with(prefix))
            .collect())
    }
}

// ─── Store failure detector ─────────────────────────────────────────────────

/// Periodically pings the backing store. After `failure_threshold`
/// consecutive transient failures (or a single permanent one) the fatal
/// callback fires once; the GCS treats the backing store as lost and stops.
pub struct GcsStoreFailureDetector {
    store: Arc<dyn StoreClient>,
    on_failure: Arc<dyn Fn() + Send + Sync>,
    failure_threshold: u32,
    consecutive_failures: Arc<AtomicU32>,
    fired: Arc<AtomicBool>,
    runner: parking_lot::Mutex<Option<PeriodicalRunner>>,
}

impl GcsStoreFailureDetector {
    pub fn new(
        store: Arc<dyn StoreClient>,
        failure_threshold: u32,
        on_failure: Arc<dyn Fn() + Send + Sync>,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            on_failure,
            failure_threshold,
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            fired: Arc::new(AtomicBool::new(false)),
            runner: parking_lot::Mutex::new(None),
        })
    }

    /// Start the periodic probe.
    pub fn start(self: &Arc<Self>, period: Duration) {
        let this = Arc::clone(self);
        let runner = PeriodicalRunner::start(period, move || {
            let this = Arc::clone(&this);
            tokio::spawn(async move {
                this.probe_once().await;
            });
        });
        *self.runner.lock() = Some(runner);
    }

    async fn probe_once(&self) {
        match self.store.ping().await {
            Ok(()) => {
                self.consecutive_failures.store(0, Ordering::SeqCst);
            }
            Err(e) => {
                let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::warn!(%e, failures, "Backing store probe failed");
                let over_threshold = failures >= self.failure_threshold || !e.is_transient();
                if over_threshold && !self.fired.swap(true, Ordering::SeqCst) {
                    tracing::error!("Backing store declared lost, stopping GCS");
                    (self.on_failure)();
                }
            }
        }
    }

    pub fn stop(&self) {
        if let Some(mut runner) = self.runner.lock().take() {
            runner.stop();
        }
    }
}


// ─── Tests ──────────────────────────────────────────────────────────────────
