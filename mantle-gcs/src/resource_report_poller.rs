// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Resource Report Poller — pull-mode resource updates.
//!
//! Periodically fans `get_resource_load` out to every tracked nodelet and
//! feeds the replies into a report callback. An unreachable node is just
//! skipped; the heartbeat manager owns the death decision.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mantle_common::id::NodeID;
use mantle_common::runtime::PeriodicalRunner;
use mantle_proto::rpc;

use crate::client_pool::NodeletClientPool;
use crate::init_data::GcsInitData;

/// Consumes one polled resource report.
pub type ReportCallback = Arc<dyn Fn(rpc::ResourcesData) + Send + Sync>;

pub struct GcsResourceReportPoller {
    client_pool: Arc<NodeletClientPool>,
    report_callback: ReportCallback,
    poll_period: Duration,
    /// Nodes to poll: node_id → nodelet address.
    nodes: Arc<Mutex<HashMap<NodeID, String>>>,
    runner: Mutex<Option<PeriodicalRunner>>,
}

impl GcsResourceReportPoller {
    pub fn new(
        client_pool: Arc<NodeletClientPool>,
        poll_period: Duration,
        report_callback: ReportCallback,
    ) -> Arc<Self> {
        Arc::new(Self {
            client_pool,
            report_callback,
            poll_period,
            nodes: Arc::new(Mutex::new(HashMap::new())),
            runner: Mutex::new(None),
        })
    }

    pub fn initialize(&self, init_data: &GcsInitData) {
        let mut nodes = self.nodes.lock();
        for (node_id, node) in init_data.alive_nodes() {
            nodes.insert(
                *node_id,
                format!("{}:{}", node.nodelet_address, node.nodelet_port),
            );
        }
    }

    pub fn start(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let runner = PeriodicalRunner::start(self.poll_period, move || {
            let this = Arc::clone(&this);
            tokio::spawn(async move {
                this.poll_all_nodes().await;
            });
        });
        *self.runner.lock() = Some(runner);
    }

    pub fn stop(&self) {
        if let Some(mut runner) = self.runner.lock().take() {
            runner.stop();
        }
    }

    async fn poll_all_nodes(self: Arc<Self>) {
        let targets: Vec<(NodeID, String)> = {
            let nodes = self.nodes.lock();
            nodes.iter().map(|(id, addr)| (*id, addr.clone())).collect()
        };

        for (node_id, addr) in targets {
            let client = self.client_pool.get_or_connect(&node_id, &addr);
            let callback = Arc::clone(&self.report_callback);
            tokio::spawn(async move {
                match client.get_resource_load(rpc::GetResourceLoadRequest {}).await {
                    Ok(reply) => {
                        if let Some(resources) = reply.resources {
                            callback(resources);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(?node_id, %e, "Resource poll failed");
                    }
                }
            });
        }
    }

    /// Poll every node once, synchronously (exposed for tests and for the
    /// first sweep right after startup).
    pub async fn poll_once(self: &Arc<Self>) {
        let targets: Vec<(NodeID, String)> = {
            let nodes = self.nodes.lock();
            nodes.iter().map(|(id, addr)| (*id, addr.clone())).collect()
        };
        for (node_id, addr) in targets {
            let client = self.client_pool.get_or_connect(&node_id, &addr);
            match client.get_resource_load(rpc::GetResourceLoadRequest {}).await {
                Ok(reply) => {
                    if let Some(resources) = reply.resources {
                        (self.report_callback)(resources);
                    }
                }
                Err(e) => {
                    tracing::debug!(?node_id, %e, "Resource poll failed");
                }
            }
        }
    }

    pub fn handle_node_added(&self, node: &rpc::NodeInfo) {
        let node_id = NodeID::try_from_binary(&node.node_id);
        self.nodes.lock().insert(
            node_id,
            format!("{}:{}", node.nodelet_address, node.nodelet_port),
        );
    }

    pub fn handle_node_removed(&self, node_id: &NodeID) {
        self.nodes.lock().remove(node_id);
    }

    pub fn num_polled_nodes(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn debug_string(&self) -> String {
        format!(
            "GcsResourceReportPoller: {{polled nodes: {}}}",
            self.nodes.lock().len()
        )
    }
}
