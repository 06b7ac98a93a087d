// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Object Location Manager — location index for large shared objects.
//!
//! Soft state: locations are rebuilt from nodelet re-announcements after a
//! restart, so nothing here is persisted. A lookup miss is an empty reply,
//! not an error. Every mutation publishes on the object-location channel.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use mantle_common::id::{NodeID, ObjectID};
use mantle_proto::rpc;
use mantle_proto::rpc::ChannelType;

use crate::pubsub::GcsPublisher;

#[derive(Debug, Clone, Default)]
struct LocationSet {
    nodes: HashSet<NodeID>,
    size: u64,
    spilled_url: String,
}

pub struct GcsObjectManager {
    object_locations: RwLock<HashMap<ObjectID, LocationSet>>,
    /// Reverse index for node-death cleanup.
    objects_by_node: RwLock<HashMap<NodeID, HashSet<ObjectID>>>,
    publisher: RwLock<Option<Arc<GcsPublisher>>>,
}

impl GcsObjectManager {
    pub fn new() -> Self {
        Self {
            object_locations: RwLock::new(HashMap::new()),
            objects_by_node: RwLock::new(HashMap::new()),
            publisher: RwLock::new(None),
        }
    }

    /// Set the event-bus publisher (called during server initialization).
    pub fn set_publisher(&self, publisher: Arc<GcsPublisher>) {
        *self.publisher.write() = Some(publisher);
    }

    fn location_info(&self, object_id: &ObjectID) -> rpc::ObjectLocationInfo {
        let locations = self.object_locations.read();
        match locations.get(object_id) {
            Some(set) => {
                let mut node_ids: Vec<Vec<u8>> =
                    set.nodes.iter().map(|node| node.binary()).collect();
                node_ids.sort();
                rpc::ObjectLocationInfo {
                    object_id: object_id.binary(),
                    node_ids,
                    size: set.size,
                    spilled_url: set.spilled_url.clone(),
                }
            }
            None => rpc::ObjectLocationInfo {
                object_id: object_id.binary(),
                ..Default::default()
            },
        }
    }

    fn publish_locations(&self, object_id: &ObjectID) {
        if let Some(ref publisher) = *self.publisher.read() {
            let info = self.location_info(object_id);
            publisher.publish(ChannelType::ObjectLocationChannel, object_id.binary(), &info);
        }
    }

    /// Handle AddObjectLocation RPC.
    pub fn handle_add_object_location(
        &self,
        object_id_bytes: &[u8],
        node_id_bytes: &[u8],
        size: u64,
        spilled_url: &str,
    ) -> Result<(), tonic::Status> {
        let object_id = ObjectID::try_from_binary(object_id_bytes);
        let node_id = NodeID::try_from_binary(node_id_bytes);

        {
            let mut locations = self.object_locations.write();
            let set = locations.entry(object_id).or_default();
            if !node_id.is_nil() {
                set.nodes.insert(node_id);
            }
            if size > 0 {
                set.size = size;
            }
            if !spilled_url.is_empty() {
                set.spilled_url = spilled_url.to_string();
            }
        }
        if !node_id.is_nil() {
            self.objects_by_node
                .write()
                .entry(node_id)
                .or_default()
                .insert(object_id);
        }

        self.publish_locations(&object_id);
        Ok(())
    }

    /// Handle RemoveObjectLocation RPC. Removing an absent location is a
    /// no-op.
    pub fn handle_remove_object_location(
        &self,
        object_id_bytes: &[u8],
        node_id_bytes: &[u8],
    ) -> Result<(), tonic::Status> {
        let object_id = ObjectID::try_from_binary(object_id_bytes);
        let node_id = NodeID::try_from_binary(node_id_bytes);

        let changed = {
            let mut locations = self.object_locations.write();
            if let Some(set) = locations.get_mut(&object_id) {
                let removed = set.nodes.remove(&node_id);
                if set.nodes.is_empty() && set.spilled_url.is_empty() {
                    locations.remove(&object_id);
                }
                removed
            } else {
                false
            }
        };
        if changed {
            if let Some(objects) = self.objects_by_node.write().get_mut(&node_id) {
                objects.remove(&object_id);
            }
            self.publish_locations(&object_id);
        }
        Ok(())
    }

    /// Handle GetObjectLocations RPC.
    pub fn handle_get_object_locations(&self, object_id_bytes: &[u8]) -> rpc::ObjectLocationInfo {
        let object_id = ObjectID::try_from_binary(object_id_bytes);
        self.location_info(&object_id)
    }

    /// Handle GetAllObjectLocations RPC.
    pub fn handle_get_all_object_locations(&self) -> Vec<rpc::ObjectLocationInfo> {
        let ids: Vec<ObjectID> = self.object_locations.read().keys().copied().collect();
        ids.iter().map(|id| self.location_info(id)).collect()
    }

    /// A node died: drop it from every location set it appeared in.
    pub fn on_node_removed(&self, node_id: &NodeID) {
        let objects = { self.objects_by_node.write().remove(node_id) };
        let Some(objects) = objects else {
            return;
        };

        for object_id in objects {
            {
                let mut locations = self.object_locations.write();
                if let Some(set) = locations.get_mut(&object_id) {
                    set.nodes.remove(node_id);
                    if set.nodes.is_empty() && set.spilled_url.is_empty() {
                        locations.remove(&object_id);
                    }
                }
            }
            self.publish_locations(&object_id);
        }
        tracing::debug!(?node_id, "Dropped object locations for dead node");
    }

    pub fn num_tracked_objects(&self) -> usize {
        self.object_locations.read().len()
    }

    pub fn debug_string(&self) -> String {
        format!(
            "GcsObjectManager: {{objects: {}, nodes with objects: {}}}",
            self.object_locations.read().len(),
            self.objects_by_node.read().len()
        )
    }
}

impl Default for GcsObjectManager {
    fn default() -> Self {
        Self::new()
    }
}
