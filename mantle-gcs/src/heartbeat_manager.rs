// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Heartbeat Manager — the cluster failure detector.
//!
//! Runs on its own OS thread with a current-thread runtime so that RPC
//! server shutdown (which can block for seconds) never delays the sweep,
//! and so heartbeat handling keeps working while the main loop is busy.
//! Each alive node holds a countdown of missed intervals; a node whose
//! countdown reaches zero is reported through the death callback, which is
//! posted back onto the main loop so the membership mutation serializes
//! with everything else.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mantle_common::id::NodeID;
use mantle_proto::rpc;

use crate::init_data::GcsInitData;

/// Callback invoked (on the heartbeat thread) when a node misses too many
/// heartbeats. The installer re-posts onto the main loop.
pub type NodeDeathCallback = Arc<dyn Fn(NodeID) + Send + Sync>;

pub struct GcsHeartbeatManager {
    period: Duration,
    num_heartbeats_timeout: u32,
    /// node_id → remaining intervals before the node is declared dead.
    heartbeats: Arc<Mutex<HashMap<NodeID, u32>>>,
    on_node_death: NodeDeathCallback,
    running: Arc<AtomicBool>,
    thread: Mutex<Option<std::thread::JoinHandle<()>>>,
}

impl GcsHeartbeatManager {
    pub fn new(
        period: Duration,
        num_heartbeats_timeout: u32,
        on_node_death: NodeDeathCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            period,
            num_heartbeats_timeout,
            heartbeats: Arc::new(Mutex::new(HashMap::new())),
            on_node_death,
            running: Arc::new(AtomicBool::new(false)),
            thread: Mutex::new(None),
        })
    }

    /// Arm timers for every node that was alive in the snapshot.
    pub fn initialize(&self, init_data: &GcsInitData) {
        let mut heartbeats = self.heartbeats.lock();
        for (node_id, _) in init_data.alive_nodes() {
            heartbeats.insert(*node_id, self.num_heartbeats_timeout);
        }
    }

    /// Start monitoring. Must be called strictly after the RPC server is
    /// up, so nodes can re-register before their first heartbeat is due.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let period = self.period;
        let heartbeats = Arc::clone(&self.heartbeats);
        let on_node_death = Arc::clone(&self.on_node_death);
        let running = Arc::clone(&self.running);

        let spawned = std::thread::Builder::new()
            .name("gcs-heartbeat".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_time()
                    .build()
                {
                    Ok(rt) => rt,
                    Err(e) => {
                        tracing::error!(%e, "Failed to build heartbeat runtime");
                        return;
                    }
                };
                runtime.block_on(async move {
                    let mut ticker = tokio::time::interval(period);
                    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    // The first tick completes immediately.
                    ticker.tick().await;
                    while running.load(Ordering::SeqCst) {
                        ticker.tick().await;
                        let expired: Vec<NodeID> = {
                            let mut map = heartbeats.lock();
                            let mut expired = Vec::new();
                            for (node_id, remaining) in map.iter_mut() {
                                *remaining = remaining.saturating_sub(1);
                                if *remaining == 0 {
                                    expired.push(*node_id);
                                }
                            }
                            for node_id in &expired {
                                map.remove(node_id);
                            }
                            expired
                        };
                        for node_id in expired {
                            tracing::warn!(?node_id, "Node missed heartbeat deadline");
                            on_node_death(node_id);
                        }
                    }
                });
            });

        match spawned {
            Ok(handle) => {
                *self.thread.lock() = Some(handle);
                tracing::info!(
                    period_ms = self.period.as_millis() as u64,
                    "Heartbeat manager started"
                );
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                tracing::error!(%e, "Failed to spawn heartbeat thread");
            }
        }
    }

    /// Stop the sweep. Idempotent; called before RPC server shutdown so
    /// live nodes are not marked dead while the server drains.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.thread.lock().take() {
            let _ = handle.join();
        }
        tracing::info!("Heartbeat manager stopped");
    }

    /// Arm the timer for a newly added node.
    pub fn add_node(&self, node_id: NodeID) {
        self.heartbeats
            .lock()
            .insert(node_id, self.num_heartbeats_timeout);
    }

    /// Disarm the timer for a removed node.
    pub fn remove_node(&self, node_id: &NodeID) {
        self.heartbeats.lock().remove(node_id);
    }

    /// Handle a heartbeat RPC: extend the node's deadline. An unknown node
    /// gets NotFound so the nodelet knows to re-register.
    pub fn handle_report_heartbeat(
        &self,
        request: &rpc::ReportHeartbeatRequest,
    ) -> Result<rpc::ReportHeartbeatReply, tonic::Status> {
        let node_id = NodeID::try_from_binary(&request.node_id);
        let mut heartbeats = self.heartbeats.lock();
        match heartbeats.get_mut(&node_id) {
            Some(remaining) => {
                *remaining = self.num_heartbeats_timeout;
                Ok(rpc::ReportHeartbeatReply {})
            }
            None => Err(tonic::Status::not_found(format!(
                "node {node_id} is not being monitored; re-register"
            ))),
        }
    }

    pub fn num_monitored_nodes(&self) -> usize {
        self.heartbeats.lock().len()
    }
}

impl Drop for GcsHeartbeatManager {
    fn drop(&mut self) {
        self.stop();
    }
}
