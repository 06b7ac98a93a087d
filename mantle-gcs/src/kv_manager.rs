// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Internal KV Manager — handlers for the InternalKV service.

use std::sync::Arc;

use crate::store_client::InternalKVInterface;

/// Maximum key length accepted by internal KV operations.
const MAX_KEY_LENGTH: usize = 8192;

pub struct GcsInternalKVManager {
    kv: Arc<dyn InternalKVInterface>,
}

impl GcsInternalKVManager {
    pub fn new(kv: Arc<dyn InternalKVInterface>) -> Self {
        Self { kv }
    }

    pub fn kv(&self) -> &Arc<dyn InternalKVInterface> {
        &self.kv
    }

    /// Validate a key: non-empty and within length limits.
    pub fn validate_key(key: &str) -> Result<(), String> {
        if key.is_empty() {
            return Err("key must not be empty".to_string());
        }
        if key.len() > MAX_KEY_LENGTH {
            return Err(format!(
                "key length {} exceeds maximum {}",
                key.len(),
                MAX_KEY_LENGTH
            ));
        }
        Ok(())
    }

    // ── RPC handlers ──────────────────────────────────────────────────

    pub async fn handle_get(
        &self,
        namespace: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, tonic::Status> {
        Self::validate_key(key).map_err(tonic::Status::invalid_argument)?;
        self.kv
            .get(namespace, key)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))
    }

    pub async fn handle_put(
        &self,
        namespace: &str,
        key: &str,
        value: Vec<u8>,
        overwrite: bool,
    ) -> Result<bool, tonic::Status> {
        Self::validate_key(key).map_err(tonic::Status::invalid_argument)?;
        self.kv
            .put(namespace, key, value, overwrite)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))
    }

    pub async fn handle_del(
        &self,
        namespace: &str,
        key: &str,
        del_by_prefix: bool,
    ) -> Result<i64, tonic::Status> {
        Self::validate_key(key).map_err(tonic::Status::invalid_argument)?;
        self.kv
            .del(namespace, key, del_by_prefix)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))
    }

    pub async fn handle_exists(&self, namespace: &str, key: &str) -> Result<bool, tonic::Status> {
        Self::validate_key(key).map_err(tonic::Status::invalid_argument)?;
        self.kv
            .exists(namespace, key)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))
    }

    pub async fn handle_keys(
        &self,
        namespace: &str,
        prefix: &str,
    ) -> Result<Vec<String>, tonic::Status> {
        self.kv
            .keys(namespace, prefix)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_client::InMemoryInternalKV;

    #[tokio::test]
    async fn test_kv_manager_crud() {
        let kv = Arc::new(InMemoryInternalKV::new());
        let mgr = GcsInternalKVManager::new(kv);

        let added = mgr
            .handle_put("ns", "key1", b"val1".to_vec(), true)
            .await
            .unwrap();
        assert!(added);

        let val = mgr.handle_get("ns", "key1").await.unwrap();
        assert_eq!(val, Some(b"val1".to_vec()));

        assert!(mgr.handle_exists("ns", "key1").await.unwrap());

        let count = mgr.handle_del("ns", "key1", false).await.unwrap();
        assert_eq!(count, 1);
        assert!(!mgr.handle_exists("ns", "key1").await.unwrap());
    }

    #[tokio::test]
    async fn test_kv_manager_keys_by_prefix() {
        let kv = Arc::new(InMemoryInternalKV::new());
        let mgr = GcsInternalKVManager::new(kv);

        mgr.handle_put("ns", "pkg/a", b"1".to_vec(), true).await.unwrap();
        mgr.handle_put("ns", "pkg/b", b"2".to_vec(), true).await.unwrap();
        mgr.handle_put("ns", "other", b"3".to_vec(), true).await.unwrap();

        let keys = mgr.handle_keys("ns", "pkg/").await.unwrap();
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_kv_manager_validate_key() {
        assert!(GcsInternalKVManager::validate_key("valid").is_ok());
        assert!(GcsInternalKVManager::validate_key("").is_err());
        let long_key = "x".repeat(MAX_KEY_LENGTH + 1);
        assert!(GcsInternalKVManager::validate_key(&long_key).is_err());
    }
}
