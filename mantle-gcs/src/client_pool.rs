// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Shared pool of per-node RPC clients.
//!
//! One client per node id, created lazily through an injected factory so
//! tests can substitute mocks. Entries are discarded when the node manager
//! marks the node DEAD.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use mantle_common::id::NodeID;

use crate::nodelet_client::NodeletClient;

/// Creates a client for a nodelet address "<ip>:<port>".
pub type NodeletClientFactory = Arc<dyn Fn(&str) -> Arc<dyn NodeletClient> + Send + Sync>;

pub struct NodeletClientPool {
    factory: NodeletClientFactory,
    clients: Mutex<HashMap<NodeID, Arc<dyn NodeletClient>>>,
}

impl NodeletClientPool {
    pub fn new(factory: NodeletClientFactory) -> Arc<Self> {
        Arc::new(Self {
            factory,
            clients: Mutex::new(HashMap::new()),
        })
    }

    /// Get the cached client for a node, creating one on first use.
    pub fn get_or_connect(&self, node_id: &NodeID, addr: &str) -> Arc<dyn NodeletClient> {
        let mut clients = self.clients.lock();
        if let Some(client) = clients.get(node_id) {
            return Arc::clone(client);
        }
        let client = (self.factory)(addr);
        clients.insert(*node_id, Arc::clone(&client));
        client
    }

    /// Get the cached client for a node, if any.
    pub fn get(&self, node_id: &NodeID) -> Option<Arc<dyn NodeletClient>> {
        self.clients.lock().get(node_id).cloned()
    }

    /// Drop the entry for a node (called when the node is marked DEAD).
    pub fn disconnect(&self, node_id: &NodeID) {
        self.clients.lock().remove(node_id);
    }

    pub fn num_clients(&self) -> usize {
        self.clients.lock().len()
    }
}
