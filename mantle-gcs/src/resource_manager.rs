// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Resource Manager — per-node view of advertised and available
//! resources.
//!
//! The view is derived state: seeded from the resources a node advertises
//! at registration, then overwritten by periodic reports (pull or push
//! mode). `acquire`/`release` adjust the view when the GCS itself commits
//! a placement so back-to-back scheduling decisions see the updated
//! availability before the next report lands.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use mantle_common::id::NodeID;
use mantle_common::scheduling::ResourceSet;
use mantle_proto::rpc;
use mantle_proto::rpc::ChannelType;

use crate::init_data::GcsInitData;
use crate::pubsub::GcsPublisher;

/// Mutable resource view of one alive node.
#[derive(Debug, Clone, Default)]
pub struct NodeResources {
    pub total: ResourceSet,
    pub available: ResourceSet,
    pub load: ResourceSet,
}

impl NodeResources {
    fn from_advertised(advertised: &HashMap<String, f64>) -> Self {
        let total = ResourceSet::from_map(advertised);
        Self {
            available: total.clone(),
            total,
            load: ResourceSet::new(),
        }
    }
}

pub struct GcsResourceManager {
    cluster_resources: RwLock<HashMap<NodeID, NodeResources>>,
    /// Deltas pending rebroadcast in push mode.
    broadcast_buffer: Mutex<HashMap<NodeID, rpc::ResourcesData>>,
    /// Publish per-node usage on the event bus (pull mode only; push mode
    /// rebroadcasts through the broadcaster instead).
    publish_resource_changes: bool,
    publisher: RwLock<Option<Arc<GcsPublisher>>>,
}

impl GcsResourceManager {
    pub fn new(publish_resource_changes: bool) -> Self {
        Self {
            cluster_resources: RwLock::new(HashMap::new()),
            broadcast_buffer: Mutex::new(HashMap::new()),
            publish_resource_changes,
            publisher: RwLock::new(None),
        }
    }

    /// Set the event-bus publisher (called during server initialization).
    pub fn set_publisher(&self, publisher: Arc<GcsPublisher>) {
        *self.publisher.write() = Some(publisher);
    }

    /// Seed the view from the initial snapshot's alive nodes.
    pub fn initialize(&self, init_data: &GcsInitData) {
        let mut cluster = self.cluster_resources.write();
        for (node_id, node) in init_data.alive_nodes() {
            cluster.insert(*node_id, NodeResources::from_advertised(&node.resources_total));
        }
    }

    /// A node joined: seed total = available = advertised.
    pub fn on_node_add(&self, node: &rpc::NodeInfo) {
        let node_id = NodeID::try_from_binary(&node.node_id);
        self.cluster_resources
            .write()
            .insert(node_id, NodeResources::from_advertised(&node.resources_total));
    }

    /// A node died: drop its view and any pending delta.
    pub fn on_node_dead(&self, node_id: &NodeID) {
        self.cluster_resources.write().remove(node_id);
        self.broadcast_buffer.lock().remove(node_id);
    }

    /// Ingest a periodic resource report from a node. Reports from unknown
    /// (dead) nodes are dropped.
    pub fn update_from_resource_report(&self, report: rpc::ResourcesData) {
        let node_id = NodeID::try_from_binary(&report.node_id);
        {
            let mut cluster = self.cluster_resources.write();
            let Some(view) = cluster.get_mut(&node_id) else {
                tracing::debug!(?node_id, "Dropping resource report from unknown node");
                return;
            };
            if !report.resources_total.is_empty() {
                view.total = ResourceSet::from_map(&report.resources_total);
            }
            if report.resources_available_changed {
                view.available = ResourceSet::from_map(&report.resources_available);
            }
            view.load = ResourceSet::from_map(&report.resource_load);
        }

        self.broadcast_buffer.lock().insert(node_id, report.clone());

        if self.publish_resource_changes {
            if let Some(ref publisher) = *self.publisher.read() {
                publisher.publish(
                    ChannelType::NodeResourceUsageChannel,
                    report.node_id.clone(),
                    &report,
                );
            }
        }
    }

    /// Deduct `resources` from a node's availability. Fails without
    /// mutation when the node is unknown or lacks capacity.
    pub fn acquire_resources(&self, node_id: &NodeID, resources: &ResourceSet) -> bool {
        let mut cluster = self.cluster_resources.write();
        let Some(view) = cluster.get_mut(node_id) else {
            return false;
        };
        if !view.available.is_superset_of(resources) {
            return false;
        }
        view.available.subtract(resources);
        true
    }

    /// Return `resources` to a node's availability, clamped to its total.
    pub fn release_resources(&self, node_id: &NodeID, resources: &ResourceSet) {
        let mut cluster = self.cluster_resources.write();
        if let Some(view) = cluster.get_mut(node_id) {
            view.available.add(resources);
            for (name, total) in view.total.clone().iter() {
                if view.available.get(name) > total {
                    view.available.set(name.to_string(), total);
                }
            }
        }
    }

    /// Snapshot of the whole cluster view for the resource scheduler.
    pub fn cluster_snapshot(&self) -> HashMap<NodeID, NodeResources> {
        self.cluster_resources.read().clone()
    }

    /// Resource view of a single node.
    pub fn get_node_resources(&self, node_id: &NodeID) -> Option<NodeResources> {
        self.cluster_resources.read().get(node_id).cloned()
    }

    /// Drain the pending deltas for the push-mode broadcaster.
    pub fn resource_usage_batch_for_broadcast(&self) -> rpc::ResourceUsageBatchData {
        let mut buffer = self.broadcast_buffer.lock();
        let batch = buffer.drain().map(|(_, v)| v).collect();
        rpc::ResourceUsageBatchData { batch }
    }

    /// Handle GetAllAvailableResources RPC.
    pub fn handle_get_all_available_resources(&self) -> Vec<rpc::ResourcesData> {
        let cluster = self.cluster_resources.read();
        cluster
            .iter()
            .map(|(node_id, view)| rpc::ResourcesData {
                node_id: node_id.binary(),
                resources_total: view.total.to_map(),
                resources_available: view.available.to_map(),
                resource_load: view.load.to_map(),
                resources_available_changed: false,
            })
            .collect()
    }

    /// Handle GetAllResourceUsage RPC: full view, not just deltas.
    pub fn handle_get_all_resource_usage(&self) -> rpc::ResourceUsageBatchData {
        rpc::ResourceUsageBatchData {
            batch: self.handle_get_all_available_resources(),
        }
    }

    pub fn num_tracked_nodes(&self) -> usize {
        self.cluster_resources.read().len()
    }

    pub fn debug_string(&self) -> String {
        format!(
            "GcsResourceManager: {{tracked nodes: {}, pending broadcast: {}}}",
            self.cluster_resources.read().len(),
            self.broadcast_buffer.lock().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantle_common::scheduling::FixedPoint;

    fn node_id(v: u8) -> NodeID {
        let mut data = [0u8; 28];
        data[0] = v;
        NodeID::from_binary(&data)
    }

    fn make_node(v: u8, cpus: f64) -> rpc::NodeInfo {
        rpc::NodeInfo {
            node_id: node_id(v).binary(),
            resources_total: HashMap::from([("CPU".to_string(), cpus)]),
            state: rpc::NodeState::Alive as i32,
            ..Default::default()
        }
    }

    fn cpus(n: f64) -> ResourceSet {
        let mut set = ResourceSet::new();
        set.set("CPU".to_string(), FixedPoint::from_f64(n));
        set
    }

    #[test]
    fn test_node_add_seeds_view() {
        let mgr = GcsResourceManager::new(true);
        mgr.on_node_add(&make_node(1, 8.0));

        let view = mgr.get_node_resources(&node_id(1)).unwrap();
        assert_eq!(view.total.get("CPU").to_f64(), 8.0);
        assert_eq!(view.available.get("CPU").to_f64(), 8.0);
    }

    #[test]
    fn test_acquire_release() {
        let mgr = GcsResourceManager::new(true);
        mgr.on_node_add(&make_node(1, 8.0));

        assert!(mgr.acquire_resources(&node_id(1), &cpus(4.0)));
        let view = mgr.get_node_resources(&node_id(1)).unwrap();
        assert_eq!(view.available.get("CPU").to_f64(), 4.0);

        // Over-acquire fails without mutation.
        assert!(!mgr.acquire_resources(&node_id(1), &cpus(5.0)));
        let view = mgr.get_node_resources(&node_id(1)).unwrap();
        assert_eq!(view.available.get("CPU").to_f64(), 4.0);

        mgr.release_resources(&node_id(1), &cpus(4.0));
        let view = mgr.get_node_resources(&node_id(1)).unwrap();
        assert_eq!(view.available.get("CPU").to_f64(), 8.0);
    }

    #[test]
    fn test_release_is_clamped_to_total() {
        let mgr = GcsResourceManager::new(true);
        mgr.on_node_add(&make_node(1, 8.0));
        mgr.release_resources(&node_id(1), &cpus(100.0));
        let view = mgr.get_node_resources(&node_id(1)).unwrap();
        assert_eq!(view.available.get("CPU").to_f64(), 8.0);
    }

    #[test]
    fn test_acquire_unknown_node_fails() {
        let mgr = GcsResourceManager::new(true);
        assert!(!mgr.acquire_resources(&node_id(9), &cpus(1.0)));
    }

    #[test]
    fn test_update_from_resource_report() {
        let mgr = GcsResourceManager::new(true);
        mgr.on_node_add(&make_node(1, 8.0));

        mgr.update_from_resource_report(rpc::ResourcesData {
            node_id: node_id(1).binary(),
            resources_available: HashMap::from([("CPU".to_string(), 2.0)]),
            resource_load: HashMap::from([("CPU".to_string(), 6.0)]),
            resources_available_changed: true,
            ..Default::default()
        });

        let view = mgr.get_node_resources(&node_id(1)).unwrap();
        assert_eq!(view.available.get("CPU").to_f64(), 2.0);
        assert_eq!(view.load.get("CPU").to_f64(), 6.0);
        // Total untouched by a report without totals.
        assert_eq!(view.total.get("CPU").to_f64(), 8.0);
    }

    #[test]
    fn test_report_from_unknown_node_is_dropped() {
        let mgr = GcsResourceManager::new(true);
        mgr.update_from_resource_report(rpc::ResourcesData {
            node_id: node_id(1).binary(),
            resources_available_changed: true,
            ..Default::default()
        });
        assert_eq!(mgr.num_tracked_nodes(), 0);
        assert!(mgr.resource_usage_batch_for_broadcast().batch.is_empty());
    }

    #[test]
    fn test_node_dead_clears_state() {
        let mgr = GcsResourceManager::new(true);
        mgr.on_node_add(&make_node(1, 8.0));
        mgr.update_from_resource_report(rpc::ResourcesData {
            node_id: node_id(1).binary(),
            resources_available_changed: true,
            ..Default::default()
        });

        mgr.on_node_dead(&node_id(1));
        assert_eq!(mgr.num_tracked_nodes(), 0);
        assert!(mgr.resource_usage_batch_for_broadcast().batch.is_empty());
    }

    #[test]
    fn test_broadcast_batch_drains() {
        let mgr = GcsResourceManager::new(false);
        mgr.on_node_add(&make_node(1, 8.0));
        mgr.on_node_add(&make_node(2, 4.0));
        for v in [1u8, 2] {
            mgr.update_from_resource_report(rpc::ResourcesData {
                node_id: node_id(v).binary(),
                resources_available_changed: true,
                ..Default::default()
            });
        }

        let batch = mgr.resource_usage_batch_for_broadcast();
        assert_eq!(batch.batch.len(), 2);
        // Second drain is empty.
        assert!(mgr.resource_usage_batch_for_broadcast().batch.is_empty());
    }

    #[tokio::test]
    async fn test_pull_mode_publishes_usage() {
        use crate::pubsub::{GcsPublisher, InternalPubSub};

        let mgr = GcsResourceManager::new(true);
        let broker = Arc::new(InternalPubSub::new());
        mgr.set_publisher(Arc::new(GcsPublisher::InProcess(Arc::clone(&broker))));
        let mut rx = broker
            .subscribe(ChannelType::NodeResourceUsageChannel)
            .unwrap();

        mgr.on_node_add(&make_node(1, 8.0));
        mgr.update_from_resource_report(rpc::ResourcesData {
            node_id: node_id(1).binary(),
            resources_available_changed: true,
            ..Default::default()
        });

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.key_id, node_id(1).binary());
    }
}
