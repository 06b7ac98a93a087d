// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Runtime environment manager — reference counting for runtime-env URIs.
//!
//! Jobs and actors reference packaged environments by URI. When the last
//! owner of a URI goes away, URIs under the `gcs://` scheme are deleted
//! from the internal KV store; other schemes are someone else's storage
//! and are ignored. Malformed URIs are logged and skipped.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use mantle_common::constants::GCS_URI_SCHEME;

use crate::kv_manager::GcsInternalKVManager;

/// KV namespace holding runtime-env packages.
const RUNTIME_ENV_KV_NAMESPACE: &str = "runtime_env";

pub struct RuntimeEnvManager {
    /// Owner id (job/actor hex) → URIs it references.
    uris_by_owner: Mutex<HashMap<String, Vec<String>>>,
    /// URI → reference count.
    ref_counts: Mutex<HashMap<String, usize>>,
    kv_manager: Arc<GcsInternalKVManager>,
}

impl RuntimeEnvManager {
    pub fn new(kv_manager: Arc<GcsInternalKVManager>) -> Self {
        Self {
            uris_by_owner: Mutex::new(HashMap::new()),
            ref_counts: Mutex::new(HashMap::new()),
            kv_manager,
        }
    }

    /// Record that `owner` references `uris`.
    pub fn add_uri_references(&self, owner: &str, uris: &[String]) {
        if uris.is_empty() {
            return;
        }
        let mut by_owner = self.uris_by_owner.lock();
        let mut counts = self.ref_counts.lock();
        let entry = by_owner.entry(owner.to_string()).or_default();
        for uri in uris {
            entry.push(uri.clone());
            *counts.entry(uri.clone()).or_insert(0) += 1;
        }
    }

    /// Drop all of `owner`'s references; URIs that hit zero are cleaned up.
    pub fn remove_uri_references(self: &Arc<Self>, owner: &str) {
        let uris = { self.uris_by_owner.lock().remove(owner) };
        let Some(uris) = uris else {
            return;
        };

        let mut dead_uris = Vec::new();
        {
            let mut counts = self.ref_counts.lock();
            for uri in uris {
                if let Some(count) = counts.get_mut(&uri) {
                    *count -= 1;
                    if *count == 0 {
                        counts.remove(&uri);
                        dead_uris.push(uri);
                    }
                }
            }
        }

        for uri in dead_uris {
            self.delete_uri(uri);
        }
    }

    /// Delete a dereferenced URI if it lives in the GCS store.
    fn delete_uri(self: &Arc<Self>, uri: String) {
        let Some((scheme, _rest)) = uri.split_once("://") else {
            tracing::error!(uri, "Invalid runtime-env URI");
            return;
        };
        if scheme != GCS_URI_SCHEME {
            // Not ours to clean up.
            return;
        }
        let kv = Arc::clone(&self.kv_manager);
        tokio::spawn(async move {
            match kv.handle_del(RUNTIME_ENV_KV_NAMESPACE, &uri, false).await {
                Ok(0) => tracing::warn!(uri, "Runtime-env URI was already gone"),
                Ok(_) => tracing::debug!(uri, "Deleted runtime-env URI"),
                Err(e) => tracing::warn!(uri, %e, "Failed to delete runtime-env URI"),
            }
        });
    }

    pub fn num_tracked_uris(&self) -> usize {
        self.ref_counts.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_client::{InMemoryInternalKV, InternalKVInterface};

    fn make_manager() -> (Arc<InMemoryInternalKV>, Arc<RuntimeEnvManager>) {
        let kv = Arc::new(InMemoryInternalKV::new());
        let kv_manager = Arc::new(GcsInternalKVManager::new(
            Arc::clone(&kv) as Arc<dyn InternalKVInterface>
        ));
        (kv, Arc::new(RuntimeEnvManager::new(kv_manager)))
    }

    #[tokio::test]
    async fn test_gcs_uri_deleted_on_last_dereference() {
        let (kv, mgr) = make_manager();
        let uri = "gcs://pkg-abc.zip".to_string();
        kv.put(RUNTIME_ENV_KV_NAMESPACE, &uri, b"blob".to_vec(), true)
            .await
            .unwrap();

        mgr.add_uri_references("job1", std::slice::from_ref(&uri));
        mgr.add_uri_references("job2", std::slice::from_ref(&uri));

        mgr.remove_uri_references("job1");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        // Still referenced by job2.
        assert!(kv.exists(RUNTIME_ENV_KV_NAMESPACE, &uri).await.unwrap());

        mgr.remove_uri_references("job2");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!kv.exists(RUNTIME_ENV_KV_NAMESPACE, &uri).await.unwrap());
        assert_eq!(mgr.num_tracked_uris(), 0);
    }

    #[tokio::test]
    async fn test_other_schemes_are_ignored() {
        let (kv, mgr) = make_manager();
        let uri = "s3://bucket/pkg.zip".to_string();
        kv.put(RUNTIME_ENV_KV_NAMESPACE, &uri, b"blob".to_vec(), true)
            .await
            .unwrap();

        mgr.add_uri_references("job1", std::slice::from_ref(&uri));
        mgr.remove_uri_references("job1");
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        // Left alone: not a gcs:// URI.
        assert!(kv.exists(RUNTIME_ENV_KV_NAMESPACE, &uri).await.unwrap());
    }

    #[tokio::test]
    async fn test_malformed_uri_is_skipped() {
        let (_kv, mgr) = make_manager();
        mgr.add_uri_references("job1", &["no-scheme-here".to_string()]);
        // Must not panic.
        mgr.remove_uri_references("job1");
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    #[tokio::test]
    async fn test_unknown_owner_is_noop() {
        let (_kv, mgr) = make_manager();
        mgr.remove_uri_references("nobody");
    }
}
