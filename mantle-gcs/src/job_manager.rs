// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Job Manager — job registration and finish notification.
//!
//! Owns the job → actor-namespace mapping: a job that sets no namespace
//! gets an anonymous per-job one, so unnamed jobs never collide on actor
//! names.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use mantle_common::constants::ANONYMOUS_NAMESPACE_PREFIX;
use mantle_common::id::JobID;
use mantle_proto::rpc;
use mantle_proto::rpc::ChannelType;

use crate::init_data::GcsInitData;
use crate::pubsub::GcsPublisher;
use crate::runtime_env_manager::RuntimeEnvManager;
use crate::table_storage::GcsTableStorage;

/// Callback invoked when a job finishes.
pub type JobFinishCallback = Box<dyn Fn(&JobID) + Send + Sync>;

pub struct GcsJobManager {
    /// All job records, running and finished.
    job_data: RwLock<HashMap<JobID, rpc::JobTableData>>,
    /// Currently running jobs: job_id → start_time_ms.
    running_jobs: RwLock<HashMap<JobID, u64>>,
    finish_listeners: RwLock<Vec<JobFinishCallback>>,
    finished_jobs_count: AtomicI64,
    table_storage: Arc<GcsTableStorage>,
    runtime_env_manager: Arc<RuntimeEnvManager>,
    publisher: RwLock<Option<Arc<GcsPublisher>>>,
}

impl GcsJobManager {
    pub fn new(
        table_storage: Arc<GcsTableStorage>,
        runtime_env_manager: Arc<RuntimeEnvManager>,
    ) -> Self {
        Self {
            job_data: RwLock::new(HashMap::new()),
            running_jobs: RwLock::new(HashMap::new()),
            finish_listeners: RwLock::new(Vec::new()),
            finished_jobs_count: AtomicI64::new(0),
            table_storage,
            runtime_env_manager,
            publisher: RwLock::new(None),
        }
    }

    /// Set the event-bus publisher (called during server initialization).
    pub fn set_publisher(&self, publisher: Arc<GcsPublisher>) {
        *self.publisher.write() = Some(publisher);
    }

    fn publish_job(&self, job: &rpc::JobTableData) {
        if let Some(ref publisher) = *self.publisher.read() {
            publisher.publish(ChannelType::JobChannel, job.job_id.clone(), job);
        }
    }

    /// Rebuild job state from the initial snapshot.
    pub fn initialize(&self, init_data: &GcsInitData) {
        let mut data = self.job_data.write();
        let mut running = self.running_jobs.write();
        for (job_id, job) in &init_data.jobs {
            if !job.is_dead {
                running.insert(*job_id, job.start_time);
                if let Some(config) = &job.config {
                    self.runtime_env_manager
                        .add_uri_references(&job_id.hex(), &config.runtime_env_uris);
                }
            }
            data.insert(*job_id, job.clone());
        }
    }

    /// Handle AddJob RPC.
    pub async fn handle_add_job(
        &self,
        mut job_data: rpc::JobTableData,
    ) -> Result<(), tonic::Status> {
        let job_id = JobID::try_from_binary(&job_data.job_id);
        if job_id.is_nil() {
            return Err(tonic::Status::invalid_argument("malformed job id"));
        }
        if job_data.start_time == 0 {
            job_data.start_time = mantle_util::time::current_time_ms();
        }

        self.table_storage
            .job_table()
            .put(&job_id.hex(), &job_data)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))?;

        if let Some(config) = &job_data.config {
            self.runtime_env_manager
                .add_uri_references(&job_id.hex(), &config.runtime_env_uris);
        }

        self.running_jobs.write().insert(job_id, job_data.start_time);
        self.job_data.write().insert(job_id, job_data.clone());

        self.publish_job(&job_data);

        tracing::info!(?job_id, "Job added");
        Ok(())
    }

    /// Handle MarkJobFinished RPC. Finishing an unknown or already-finished
    /// job is a no-op.
    pub async fn handle_mark_job_finished(&self, job_id_bytes: &[u8]) -> Result<(), tonic::Status> {
        let job_id = JobID::try_from_binary(job_id_bytes);

        if self.running_jobs.write().remove(&job_id).is_none() {
            return Ok(());
        }
        self.finished_jobs_count.fetch_add(1, Ordering::Relaxed);

        let updated = {
            let mut job_data = self.job_data.write();
            if let Some(data) = job_data.get_mut(&job_id) {
                data.is_dead = true;
                data.end_time = mantle_util::time::current_time_ms();
                Some(data.clone())
            } else {
                None
            }
        };

        if let Some(updated) = updated {
            self.table_storage
                .job_table()
                .put(&job_id.hex(), &updated)
                .await
                .map_err(|e| tonic::Status::internal(e.to_string()))?;
            self.publish_job(&updated);
        }

        self.runtime_env_manager.remove_uri_references(&job_id.hex());

        let listeners = self.finish_listeners.read();
        for listener in listeners.iter() {
            listener(&job_id);
        }

        tracing::info!(?job_id, "Job finished");
        Ok(())
    }

    /// Handle GetAllJobInfo RPC.
    pub fn handle_get_all_job_info(&self, limit: Option<usize>) -> Vec<rpc::JobTableData> {
        let data = self.job_data.read();
        if let Some(limit) = limit {
            data.values().take(limit).cloned().collect()
        } else {
            data.values().cloned().collect()
        }
    }

    /// Handle GetNextJobID RPC.
    pub async fn handle_get_next_job_id(&self) -> Result<i32, tonic::Status> {
        self.table_storage
            .store_client()
            .get_next_job_id()
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))
    }

    /// Resolve the actor-name namespace of a job. Jobs without an explicit
    /// namespace get an anonymous one scoped to the job id.
    pub fn get_namespace(&self, job_id: &JobID) -> String {
        let data = self.job_data.read();
        let configured = data
            .get(job_id)
            .and_then(|job| job.config.as_ref())
            .map(|config| config.namespace.clone())
            .unwrap_or_default();
        if configured.is_empty() {
            format!("{ANONYMOUS_NAMESPACE_PREFIX}{}", job_id.hex())
        } else {
            configured
        }
    }

    /// Register a listener for job completion.
    pub fn add_job_finished_listener(&self, callback: JobFinishCallback) {
        self.finish_listeners.write().push(callback);
    }

    pub fn num_running_jobs(&self) -> usize {
        self.running_jobs.read().len()
    }

    pub fn finished_jobs_count(&self) -> i64 {
        self.finished_jobs_count.load(Ordering::Relaxed)
    }

    pub fn debug_string(&self) -> String {
        format!(
            "GcsJobManager: {{total: {}, running: {}, finished since start: {}}}",
            self.job_data.read().len(),
            self.running_jobs.read().len(),
            self.finished_jobs_count()
        )
    }
}
