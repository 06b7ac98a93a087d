// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Worker Manager — worker death notifications.
//!
//! Persists worker failure reports, classifies crashes for stats, publishes
//! a worker delta and notifies listeners (the actor manager reacts to the
//! hosted actors).

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use mantle_common::id::WorkerID;
use mantle_proto::rpc;
use mantle_proto::rpc::{ChannelType, WorkerExitType};

use crate::pubsub::GcsPublisher;
use crate::table_storage::GcsTableStorage;

/// Callback invoked when a worker dies unexpectedly.
pub type WorkerDeadCallback = Box<dyn Fn(&rpc::WorkerTableData) + Send + Sync>;

pub struct GcsWorkerManager {
    dead_listeners: RwLock<Vec<WorkerDeadCallback>>,
    system_error_count: AtomicI64,
    oom_count: AtomicI64,
    table_storage: Arc<GcsTableStorage>,
    publisher: RwLock<Option<Arc<GcsPublisher>>>,
}

impl GcsWorkerManager {
    pub fn new(table_storage: Arc<GcsTableStorage>) -> Self {
        Self {
            dead_listeners: RwLock::new(Vec::new()),
            system_error_count: AtomicI64::new(0),
            oom_count: AtomicI64::new(0),
            table_storage,
            publisher: RwLock::new(None),
        }
    }

    /// Set the event-bus publisher (called during server initialization).
    pub fn set_publisher(&self, publisher: Arc<GcsPublisher>) {
        *self.publisher.write() = Some(publisher);
    }

    fn worker_key(worker_data: &rpc::WorkerTableData) -> String {
        let worker_id = worker_data
            .worker_address
            .as_ref()
            .map(|addr| addr.worker_id.clone())
            .unwrap_or_default();
        hex::encode(worker_id)
    }

    fn publish_worker_failure(&self, worker_data: &rpc::WorkerTableData) {
        if let Some(ref publisher) = *self.publisher.read() {
            let key_id = worker_data
                .worker_address
                .as_ref()
                .map(|addr| addr.worker_id.clone())
                .unwrap_or_default();
            publisher.publish(ChannelType::WorkerDeltaChannel, key_id, worker_data);
        }
    }

    /// Handle ReportWorkerFailure RPC.
    pub async fn handle_report_worker_failure(
        &self,
        mut worker_data: rpc::WorkerTableData,
    ) -> Result<(), tonic::Status> {
        worker_data.is_alive = false;
        if worker_data.timestamp == 0 {
            worker_data.timestamp = mantle_util::time::current_time_ms();
        }

        self.table_storage
            .worker_table()
            .put(&Self::worker_key(&worker_data), &worker_data)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))?;

        match worker_data
            .exit_type
            .and_then(|v| WorkerExitType::try_from(v).ok())
        {
            Some(WorkerExitType::SystemError) => {
                self.system_error_count.fetch_add(1, Ordering::Relaxed);
            }
            Some(WorkerExitType::NodeOutOfMemory) => {
                self.oom_count.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        self.publish_worker_failure(&worker_data);

        let listeners = self.dead_listeners.read();
        for listener in listeners.iter() {
            listener(&worker_data);
        }

        if let Some(addr) = &worker_data.worker_address {
            let worker_id = WorkerID::try_from_binary(&addr.worker_id);
            tracing::info!(?worker_id, exit_type = ?worker_data.exit_type, "Worker failure reported");
        }
        Ok(())
    }

    /// Handle AddWorkerInfo RPC.
    pub async fn handle_add_worker_info(
        &self,
        worker_data: rpc::WorkerTableData,
    ) -> Result<(), tonic::Status> {
        self.table_storage
            .worker_table()
            .put(&Self::worker_key(&worker_data), &worker_data)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))?;
        Ok(())
    }

    /// Handle GetAllWorkerInfo RPC.
    pub async fn handle_get_all_worker_info(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<rpc::WorkerTableData>, tonic::Status> {
        let all = self
            .table_storage
            .worker_table()
            .get_all()
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))?;

        if let Some(limit) = limit {
            Ok(all.into_values().take(limit).collect())
        } else {
            Ok(all.into_values().collect())
        }
    }

    /// Register a dead-worker listener.
    pub fn add_worker_dead_listener(&self, callback: WorkerDeadCallback) {
        self.dead_listeners.write().push(callback);
    }

    pub fn system_error_count(&self) -> i64 {
        self.system_error_count.load(Ordering::Relaxed)
    }

    pub fn oom_count(&self) -> i64 {
        self.oom_count.load(Ordering::Relaxed)
    }

    pub fn debug_string(&self) -> String {
        format!(
            "GcsWorkerManager: {{system errors: {}, oom kills: {}}}",
            self.system_error_count(),
            self.oom_count()
        )
    }
}
