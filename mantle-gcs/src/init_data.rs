// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS init loader — reads every table at startup into an immutable
//! snapshot consumed by the managers before any RPC is accepted.

use std::collections::HashMap;

use mantle_common::id::{ActorID, JobID, NodeID, PlacementGroupID, WorkerID};
use mantle_proto::rpc;

use crate::store_client::StoreResult;
use crate::table_storage::GcsTableStorage;

/// Immutable initial-state snapshot of the backing store.
#[derive(Default)]
pub struct GcsInitData {
    pub jobs: HashMap<JobID, rpc::JobTableData>,
    pub nodes: HashMap<NodeID, rpc::NodeInfo>,
    pub actors: HashMap<ActorID, rpc::ActorTableData>,
    pub placement_groups: HashMap<PlacementGroupID, rpc::PlacementGroupTableData>,
    pub workers: HashMap<WorkerID, rpc::WorkerTableData>,
}

impl GcsInitData {
    /// Load all tables. Any error here is fatal to server startup.
    pub async fn load(storage: &GcsTableStorage) -> StoreResult<Self> {
        let jobs = storage
            .job_table()
            .get_all()
            .await?
            .into_iter()
            .map(|(k, v)| (JobID::from_hex(&k), v))
            .collect();
        let nodes = storage
            .node_table()
            .get_all()
            .await?
            .into_iter()
            .map(|(k, v)| (NodeID::from_hex(&k), v))
            .collect();
        let actors = storage
            .actor_table()
            .get_all()
            .await?
            .into_iter()
            .map(|(k, v)| (ActorID::from_hex(&k), v))
            .collect();
        let placement_groups = storage
            .placement_group_table()
            .get_all()
            .await?
            .into_iter()
            .map(|(k, v)| (PlacementGroupID::from_hex(&k), v))
            .collect();
        let workers = storage
            .worker_table()
            .get_all()
            .await?
            .into_iter()
            .map(|(k, v)| (WorkerID::from_hex(&k), v))
            .collect();

        let data = Self {
            jobs,
            nodes,
            actors,
            placement_groups,
            workers,
        };
        tracing::info!(
            jobs = data.jobs.len(),
            nodes = data.nodes.len(),
            actors = data.actors.len(),
            placement_groups = data.placement_groups.len(),
            workers = data.workers.len(),
            "Loaded initial GCS state"
        );
        Ok(data)
    }

    /// Nodes that were alive at the time of the snapshot.
    pub fn alive_nodes(&self) -> impl Iterator<Item = (&NodeID, &rpc::NodeInfo)> {
        self.nodes
            .iter()
            .filter(|(_, n)| n.state == rpc::NodeState::Alive as i32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_client::InMemoryStoreClient;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_load_empty_store() {
        let storage = GcsTableStorage::new(Arc::new(InMemoryStoreClient::new()));
        let data = GcsInitData::load(&storage).await.unwrap();
        assert!(data.jobs.is_empty());
        assert!(data.nodes.is_empty());
        assert!(data.actors.is_empty());
    }

    #[tokio::test]
    async fn test_load_replays_persisted_state() {
        let storage = GcsTableStorage::new(Arc::new(InMemoryStoreClient::new()));

        let node_id = NodeID::from_random();
        let alive = rpc::NodeInfo {
            node_id: node_id.binary(),
            state: rpc::NodeState::Alive as i32,
            ..Default::default()
        };
        storage
            .node_table()
            .put(&node_id.hex(), &alive)
            .await
            .unwrap();

        let dead_id = NodeID::from_random();
        let dead = rpc::NodeInfo {
            node_id: dead_id.binary(),
            state: rpc::NodeState::Dead as i32,
            ..Default::default()
        };
        storage
            .node_table()
            .put(&dead_id.hex(), &dead)
            .await
            .unwrap();

        let actor_id = ActorID::from_random();
        storage
            .actor_table()
            .put(
                &actor_id.hex(),
                &rpc::ActorTableData {
                    actor_id: actor_id.binary(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let data = GcsInitData::load(&storage).await.unwrap();
        assert_eq!(data.nodes.len(), 2);
        assert_eq!(data.alive_nodes().count(), 1);
        assert_eq!(data.actors.len(), 1);
        assert!(data.actors.contains_key(&actor_id));
    }
}
