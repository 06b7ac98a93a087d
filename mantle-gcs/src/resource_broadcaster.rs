// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Resource Broadcaster — push-mode resource updates.
//!
//! Only constructed when `grpc_based_resource_broadcast` is set (the pull
//! poller's event-bus publishing is disabled in that case). Periodically
//! drains the resource manager's delta buffer and rebroadcasts the batch to
//! every alive node.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mantle_common::id::NodeID;
use mantle_common::runtime::PeriodicalRunner;
use mantle_proto::rpc;

use crate::client_pool::NodeletClientPool;
use crate::init_data::GcsInitData;

/// Produces the next batch of resource deltas to broadcast.
pub type BatchSource = Arc<dyn Fn() -> rpc::ResourceUsageBatchData + Send + Sync>;

pub struct GcsResourceBroadcaster {
    client_pool: Arc<NodeletClientPool>,
    batch_source: BatchSource,
    broadcast_period: Duration,
    /// Broadcast targets: node_id → nodelet address.
    nodes: Arc<Mutex<HashMap<NodeID, String>>>,
    runner: Mutex<Option<PeriodicalRunner>>,
}

impl GcsResourceBroadcaster {
    pub fn new(
        client_pool: Arc<NodeletClientPool>,
        broadcast_period: Duration,
        batch_source: BatchSource,
    ) -> Arc<Self> {
        Arc::new(Self {
            client_pool,
            batch_source,
            broadcast_period,
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
        let runner = PeriodicalRunner::start(self.broadcast_period, move || {
            let this = Arc::clone(&this);
            tokio::spawn(async move {
                this.broadcast_once().await;
            });
        });
        *self.runner.lock() = Some(runner);
    }

    pub fn stop(&self) {
        if let Some(mut runner) = self.runner.lock().take() {
            runner.stop();
        }
    }

    /// Drain the delta buffer and push it to every tracked node. Skips the
    /// send entirely when there is nothing new.
    pub async fn broadcast_once(self: &Arc<Self>) {
        let batch = (self.batch_source)();
        if batch.batch.is_empty() {
            return;
        }

        let targets: Vec<(NodeID, String)> = {
            let nodes = self.nodes.lock();
            nodes.iter().map(|(id, addr)| (*id, addr.clone())).collect()
        };

        for (node_id, addr) in targets {
            let client = self.client_pool.get_or_connect(&node_id, &addr);
            let request = rpc::UpdateResourceUsageRequest {
                batch: Some(batch.clone()),
            };
            tokio::spawn(async move {
                if let Err(e) = client.update_resource_usage(request).await {
                    // Unreachable is a hint only; the heartbeat manager
                    // adjudicates death.
                    tracing::debug!(?node_id, %e, "Resource broadcast failed");
                }
            });
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

    pub fn num_broadcast_targets(&self) -> usize {
        self.nodes.lock().len()
    }

    pub fn debug_string(&self) -> String {
        format!(
            "GcsResourceBroadcaster: {{targets: {}}}",
            self.nodes.lock().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodelet_client::test_support::MockNodeletClient;
    use crate::nodelet_client::NodeletClient;

    fn node_id(v: u8) -> NodeID {
        let mut data = [0u8; 28];
        data[0] = v;
        NodeID::from_binary(&data)
    }

    fn make_node(v: u8) -> rpc::NodeInfo {
        rpc::NodeInfo {
            node_id: node_id(v).binary(),
            nodelet_address: "127.0.0.1".to_string(),
            nodelet_port: 9100 + v as i32,
            state: rpc::NodeState::Alive as i32,
            ..Default::default()
        }
    }

    fn non_empty_batch() -> rpc::ResourceUsageBatchData {
        rpc::ResourceUsageBatchData {
            batch: vec![rpc::ResourcesData {
                node_id: node_id(1).binary(),
                ..Default::default()
            }],
        }
    }

    #[tokio::test]
    async fn test_broadcast_sends_batch_to_all_nodes() {
        let mock = Arc::new(MockNodeletClient::new());
        let mock_clone = Arc::clone(&mock);
        let pool = NodeletClientPool::new(Arc::new(move |_| {
            Arc::clone(&mock_clone) as Arc<dyn NodeletClient>
        }));

        let broadcaster = GcsResourceBroadcaster::new(
            pool,
            Duration::from_millis(100),
            Arc::new(non_empty_batch),
        );
        broadcaster.handle_node_added(&make_node(1));
        broadcaster.handle_node_added(&make_node(2));

        broadcaster.broadcast_once().await;
        // The sends are spawned; wait for them to land.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(mock.usage_requests.lock().len(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_is_not_sent() {
        let mock = Arc::new(MockNodeletClient::new());
        let mock_clone = Arc::clone(&mock);
        let pool = NodeletClientPool::new(Arc::new(move |_| {
            Arc::clone(&mock_clone) as Arc<dyn NodeletClient>
        }));

        let broadcaster = GcsResourceBroadcaster::new(
            pool,
            Duration::from_millis(100),
            Arc::new(|| rpc::ResourceUsageBatchData { batch: vec![] }),
        );
        broadcaster.handle_node_added(&make_node(1));

        broadcaster.broadcast_once().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(mock.usage_requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_membership_tracking() {
        let pool = NodeletClientPool::new(Arc::new(|_| {
            Arc::new(MockNodeletClient::new()) as Arc<dyn NodeletClient>
        }));
        let broadcaster = GcsResourceBroadcaster::new(
            pool,
            Duration::from_millis(100),
            Arc::new(non_empty_batch),
        );

        broadcaster.handle_node_added(&make_node(1));
        assert_eq!(broadcaster.num_broadcast_targets(), 1);
        broadcaster.handle_node_removed(&node_id(1));
        assert_eq!(broadcaster.num_broadcast_targets(), 0);
    }
}
