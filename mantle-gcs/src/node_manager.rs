// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Node Manager — source of truth for cluster membership.
//!
//! Every state change is persisted before it is applied in memory and
//! published. NodeAdded / NodeRemoved listeners fire exactly once per
//! transition, in registration order. A node that enters DEAD never goes
//! back to ALIVE; a restarted host registers under a fresh id.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use mantle_common::id::NodeID;
use mantle_proto::rpc;
use mantle_proto::rpc::ChannelType;

use crate::init_data::GcsInitData;
use crate::pubsub::GcsPublisher;
use crate::table_storage::GcsTableStorage;

/// Callback invoked when a node is added to the cluster.
pub type NodeAddedCallback = Box<dyn Fn(&rpc::NodeInfo) + Send + Sync>;
/// Callback invoked when a node is removed from the cluster.
pub type NodeRemovedCallback = Box<dyn Fn(&rpc::NodeInfo) + Send + Sync>;

pub struct GcsNodeManager {
    /// Currently alive nodes.
    alive_nodes: RwLock<HashMap<NodeID, Arc<rpc::NodeInfo>>>,
    /// Dead nodes (kept for queries).
    dead_nodes: RwLock<HashMap<NodeID, Arc<rpc::NodeInfo>>>,
    /// Nodes being drained: node_id → deadline_ms.
    draining_nodes: RwLock<HashMap<NodeID, i64>>,
    /// Cluster ID (raw 28-byte binary).
    cluster_id: RwLock<Vec<u8>>,
    node_added_listeners: RwLock<Vec<NodeAddedCallback>>,
    node_removed_listeners: RwLock<Vec<NodeRemovedCallback>>,
    table_storage: Arc<GcsTableStorage>,
    publisher: RwLock<Option<Arc<GcsPublisher>>>,
}

impl GcsNodeManager {
    pub fn new(table_storage: Arc<GcsTableStorage>) -> Self {
        Self {
            alive_nodes: RwLock::new(HashMap::new()),
            dead_nodes: RwLock::new(HashMap::new()),
            draining_nodes: RwLock::new(HashMap::new()),
            cluster_id: RwLock::new(Vec::new()),
            node_added_listeners: RwLock::new(Vec::new()),
            node_removed_listeners: RwLock::new(Vec::new()),
            table_storage,
            publisher: RwLock::new(None),
        }
    }

    /// Set the event-bus publisher (called during server initialization).
    pub fn set_publisher(&self, publisher: Arc<GcsPublisher>) {
        *self.publisher.write() = Some(publisher);
    }

    fn publish_node_state(&self, node_info: &rpc::NodeInfo) {
        if let Some(ref publisher) = *self.publisher.read() {
            publisher.publish(
                ChannelType::NodeInfoChannel,
                node_info.node_id.clone(),
                node_info,
            );
        }
    }

    /// Rebuild membership from the initial snapshot.
    pub fn initialize(&self, init_data: &GcsInitData) {
        let mut alive = self.alive_nodes.write();
        let mut dead = self.dead_nodes.write();
        for (node_id, node) in &init_data.nodes {
            let node = Arc::new(node.clone());
            if node.state == rpc::NodeState::Dead as i32 {
                dead.insert(*node_id, node);
            } else {
                alive.insert(*node_id, node);
            }
        }
    }

    /// Set the cluster ID (raw binary).
    pub fn set_cluster_id(&self, cluster_id: Vec<u8>) {
        *self.cluster_id.write() = cluster_id;
    }

    /// Handle RegisterNode RPC. Idempotent on node_id for alive nodes;
    /// re-registering a dead id is rejected since DEAD is terminal.
    pub async fn handle_register_node(
        &self,
        mut node_info: rpc::NodeInfo,
    ) -> Result<(), tonic::Status> {
        let node_id = NodeID::try_from_binary(&node_info.node_id);
        if node_id.is_nil() {
            return Err(tonic::Status::invalid_argument("malformed node id"));
        }

        if self.dead_nodes.read().contains_key(&node_id) {
            return Err(tonic::Status::invalid_argument(format!(
                "node {node_id} is already dead; a restarted node must register with a new id"
            )));
        }
        if self.alive_nodes.read().contains_key(&node_id) {
            // Same observable state as a single registration.
            tracing::debug!(?node_id, "Duplicate node registration ignored");
            return Ok(());
        }

        node_info.state = rpc::NodeState::Alive as i32;
        if node_info.start_time_ms == 0 {
            node_info.start_time_ms = mantle_util::time::current_time_ms();
        }

        // Persist, then apply, then publish.
        self.table_storage
            .node_table()
            .put(&node_id.hex(), &node_info)
            .await
            .map_err(|e| tonic::Status::internal(e.to_string()))?;

        let node = Arc::new(node_info);
        self.alive_nodes.write().insert(node_id, Arc::clone(&node));

        self.publish_node_state(&node);

        let listeners = self.node_added_listeners.read();
        for listener in listeners.iter() {
            listener(&node);
        }

        tracing::info!(?node_id, address = %node.nodelet_address, "Node registered");
        Ok(())
    }

    /// Handle UnregisterNode RPC (graceful drain completed).
    pub async fn handle_unregister_node(&self, node_id_bytes: &[u8]) -> Result<(), tonic::Status> {
        let node_id = NodeID::try_from_binary(node_id_bytes);
        self.remove_node(&node_id).await
    }

    /// Handle node failure, posted from the heartbeat manager.
    pub async fn on_node_failure(&self, node_id: &NodeID) -> Result<(), tonic::Status> {
        self.remove_node(node_id).await
    }

    /// Transition a node to DEAD. Emission is single-shot: a node not in
    /// the alive set is ignored.
    async fn remove_node(&self, node_id: &NodeID) -> Result<(), tonic::Status> {
        let node = { self.alive_nodes.write().remove(node_id) };

        if let Some(node) = node {
            let mut dead_node = (*node).clone();
            dead_node.state = rpc::NodeState::Dead as i32;
            dead_node.end_time_ms = mantle_util::time::current_time_ms();

            if let Err(e) = self
                .table_storage
                .node_table()
                .put(&node_id.hex(), &dead_node)
                .await
            {
                tracing::error!(?node_id, %e, "Failed to persist node death");
            }

            let dead_node = Arc::new(dead_node);
            self.dead_nodes.write().insert(*node_id, Arc::clone(&dead_node));
            self.draining_nodes.write().remove(node_id);

            self.publish_node_state(&dead_node);

            let listeners = self.node_removed_listeners.read();
            for listener in listeners.iter() {
                listener(&dead_node);
            }

            tracing::info!(?node_id, "Node removed");
        }
        Ok(())
    }

    /// Handle DrainNode RPC.
    pub fn handle_drain_node(&self, node_id: &NodeID, deadline_ms: i64) {
        if self.alive_nodes.read().contains_key(node_id) {
            self.draining_nodes.write().insert(*node_id, deadline_ms);
            tracing::info!(?node_id, deadline_ms, "Node draining");
        }
    }

    /// Handle GetAllNodeInfo RPC — alive and dead.
    pub fn handle_get_all_node_info(&self) -> Vec<rpc::NodeInfo> {
        let alive = self.alive_nodes.read();
        let dead = self.dead_nodes.read();
        alive
            .values()
            .chain(dead.values())
            .map(|n| (**n).clone())
            .collect()
    }

    /// Handle GetClusterId RPC.
    pub fn handle_get_cluster_id(&self) -> Vec<u8> {
        self.cluster_id.read().clone()
    }

    pub fn is_node_alive(&self, node_id: &NodeID) -> bool {
        self.alive_nodes.read().contains_key(node_id)
    }

    pub fn is_node_dead(&self, node_id: &NodeID) -> bool {
        self.dead_nodes.read().contains_key(node_id)
    }

    pub fn get_alive_node(&self, node_id: &NodeID) -> Option<Arc<rpc::NodeInfo>> {
        self.alive_nodes.read().get(node_id).cloned()
    }

    pub fn get_all_alive_nodes(&self) -> HashMap<NodeID, Arc<rpc::NodeInfo>> {
        self.alive_nodes.read().clone()
    }

    pub fn get_draining_nodes(&self) -> HashMap<NodeID, i64> {
        self.draining_nodes.read().clone()
    }

    pub fn num_alive_nodes(&self) -> usize {
        self.alive_nodes.read().len()
    }

    /// Register a node-added listener. Listener lists are only mutated
    /// during startup.
    pub fn add_node_added_listener(&self, callback: NodeAddedCallback) {
        self.node_added_listeners.write().push(callback);
    }

    /// Register a node-removed listener.
    pub fn add_node_removed_listener(&self, callback: NodeRemovedCallback) {
        self.node_removed_listeners.write().push(callback);
    }

    pub fn debug_string(&self) -> String {
        format!(
            "GcsNodeManager: {{alive: {}, dead: {}, draining: {}}}",
            self.alive_nodes.read().len(),
            self.dead_nodes.read().len(),
            self.draining_nodes.read().len()
        )
    }
}
