// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Placement Group Scheduler — two-phase bundle placement.
//!
//! An assignment from the resource scheduler is committed with a
//! prepare/commit protocol against each target nodelet: every bundle is
//! prepared first, and only when all prepares succeed are the bundles
//! committed. Any failure cancels everything already prepared, so a group
//! is never left partially bound — mandatory for the STRICT_* strategies.

use std::sync::Arc;

use mantle_common::id::{NodeID, PlacementGroupID};
use mantle_common::scheduling::ResourceSet;
use mantle_proto::rpc;
use mantle_proto::rpc::PlacementStrategy;

use crate::client_pool::NodeletClientPool;
use crate::node_manager::GcsNodeManager;
use crate::resource_manager::GcsResourceManager;
use crate::resource_scheduler::{GcsResourceScheduler, SchedulingResult};

/// Outcome of one placement attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PgScheduleOutcome {
    /// All bundles prepared and committed; `(bundle_index, node)` pairs.
    Success(Vec<(i64, NodeID)>),
    /// Feasible but not currently placeable (capacity or RPC failure).
    Failed,
    /// Some bundle can never fit the current cluster.
    Infeasible,
}

pub struct GcsPlacementGroupScheduler {
    node_manager: Arc<GcsNodeManager>,
    resource_scheduler: Arc<GcsResourceScheduler>,
    resource_manager: Arc<GcsResourceManager>,
    client_pool: Arc<NodeletClientPool>,
}

impl GcsPlacementGroupScheduler {
    pub fn new(
        node_manager: Arc<GcsNodeManager>,
        resource_scheduler: Arc<GcsResourceScheduler>,
        resource_manager: Arc<GcsResourceManager>,
        client_pool: Arc<NodeletClientPool>,
    ) -> Self {
        Self {
            node_manager,
            resource_scheduler,
            resource_manager,
            client_pool,
        }
    }

    fn client_for(&self, node_id: &NodeID) -> Option<Arc<dyn crate::nodelet_client::NodeletClient>> {
        let node = self.node_manager.get_alive_node(node_id)?;
        let addr = format!("{}:{}", node.nodelet_address, node.nodelet_port);
        Some(self.client_pool.get_or_connect(node_id, &addr))
    }

    /// Place every bundle of a group. Surviving bindings from a previous
    /// incarnation are released first so the whole group is placed from a
    /// clean slate.
    pub async fn schedule(&self, pg: &rpc::PlacementGroupTableData) -> PgScheduleOutcome {
        self.release_bundles(pg).await;

        let pg_id = PlacementGroupID::try_from_binary(&pg.placement_group_id);
        let required: Vec<ResourceSet> = pg
            .bundles
            .iter()
            .map(|b| ResourceSet::from_map(&b.resources))
            .collect();
        let strategy = PlacementStrategy::try_from(pg.strategy).unwrap_or(PlacementStrategy::Pack);

        let nodes = match self.resource_scheduler.schedule(&required, strategy) {
            SchedulingResult::Success(nodes) => nodes,
            SchedulingResult::Failed => return PgScheduleOutcome::Failed,
            SchedulingResult::Infeasible => return PgScheduleOutcome::Infeasible,
        };

        // Charge the GCS view before talking to the nodelets.
        let mut acquired: Vec<(NodeID, ResourceSet)> = Vec::new();
        for (node_id, resources) in nodes.iter().zip(required.iter()) {
            if !self.resource_manager.acquire_resources(node_id, resources) {
                self.rollback_acquired(&acquired);
                return PgScheduleOutcome::Failed;
            }
            acquired.push((*node_id, resources.clone()));
        }

        let assignment: Vec<(i64, NodeID)> = pg
            .bundles
            .iter()
            .map(|b| b.bundle_index)
            .zip(nodes.iter().copied())
            .collect();

        // Phase one: prepare every bundle.
        let mut prepared: Vec<(i64, NodeID)> = Vec::new();
        for (bundle, (bundle_index, node_id)) in pg.bundles.iter().zip(assignment.iter()) {
            let ok = match self.client_for(node_id) {
                Some(client) => client
                    .prepare_bundle(rpc::PrepareBundleRequest {
                        placement_group_id: pg.placement_group_id.clone(),
                        bundle_index: *bundle_index,
                        resources: bundle.resources.clone(),
                    })
                    .await
                    .map(|reply| reply.success)
                    .unwrap_or(false),
                None => false,
            };
            if !ok {
                tracing::info!(?pg_id, bundle_index, ?node_id, "Bundle prepare failed");
                self.cancel_bundles(&pg.placement_group_id, &prepared).await;
                self.rollback_acquired(&acquired);
                return PgScheduleOutcome::Failed;
            }
            prepared.push((*bundle_index, *node_id));
        }

        // Phase two: commit.
        for (bundle_index, node_id) in &assignment {
            let committed = match self.client_for(node_id) {
                Some(client) => client
                    .commit_bundle(rpc::CommitBundleRequest {
                        placement_group_id: pg.placement_group_id.clone(),
                        bundle_index: *bundle_index,
                    })
                    .await
                    .is_ok(),
                None => false,
            };
            if !committed {
                // A strict group must never stay half bound.
                tracing::error!(
                    ?pg_id,
                    bundle_index,
                    ?node_id,
                    "Bundle commit failed after prepare; rolling the group back"
                );
                self.cancel_bundles(&pg.placement_group_id, &prepared).await;
                self.rollback_acquired(&acquired);
                return PgScheduleOutcome::Failed;
            }
        }

        PgScheduleOutcome::Success(assignment)
    }

    /// Cancel every bound bundle of a group and return its resources to the
    /// view. Used on removal and before rescheduling.
    pub async fn release_bundles(&self, pg: &rpc::PlacementGroupTableData) {
        let bound: Vec<(i64, NodeID, ResourceSet)> = pg
            .bundles
            .iter()
            .filter(|b| !b.node_id.is_empty())
            .map(|b| {
                (
                    b.bundle_index,
                    NodeID::try_from_binary(&b.node_id),
                    ResourceSet::from_map(&b.resources),
                )
            })
            .collect();

        for (bundle_index, node_id, resources) in bound {
            self.resource_manager.release_resources(&node_id, &resources);
            if let Some(client) = self.client_for(&node_id) {
                let request = rpc::CancelBundleRequest {
                    placement_group_id: pg.placement_group_id.clone(),
                    bundle_index,
                };
                if let Err(e) = client.cancel_bundle(request).await {
                    tracing::debug!(?node_id, bundle_index, %e, "Bundle cancel failed");
                }
            }
        }
    }

    async fn cancel_bundles(&self, pg_id: &[u8], prepared: &[(i64, NodeID)]) {
        for (bundle_index, node_id) in prepared {
            if let Some(client) = self.client_for(node_id) {
                let request = rpc::CancelBundleRequest {
                    placement_group_id: pg_id.to_vec(),
                    bundle_index: *bundle_index,
                };
                if let Err(e) = client.cancel_bundle(request).await {
                    tracing::debug!(?node_id, bundle_index, %e, "Bundle cancel failed");
                }
            }
        }
    }

    fn rollback_acquired(&self, acquired: &[(NodeID, ResourceSet)]) {
        for (node_id, resources) in acquired {
            self.resource_manager.release_resources(node_id, resources);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor_scheduler::tests::{make_node_info, node_id};
    use crate::nodelet_client::test_support::MockNodeletClient;
    use crate::nodelet_client::NodeletClient;
    use crate::store_client::InMemoryStoreClient;
    use crate::table_storage::GcsTableStorage;
    use std::collections::HashMap;
    use tonic::Status;

    struct Fixture {
        resource_manager: Arc<GcsResourceManager>,
        mock_nodelet: Arc<MockNodeletClient>,
        scheduler: GcsPlacementGroupScheduler,
    }

    async fn make_fixture(nodes: &[(u8, f64)]) -> Fixture {
        let storage = Arc::new(GcsTableStorage::new(Arc::new(InMemoryStoreClient::new())));
        let node_manager = Arc::new(GcsNodeManager::new(storage));
        let resource_manager = Arc::new(GcsResourceManager::new(true));
        for (v, cpus) in nodes {
            let info = make_node_info(*v, *cpus);
            node_manager.handle_register_node(info.clone()).await.unwrap();
            resource_manager.on_node_add(&info);
        }
        let resource_scheduler = Arc::new(GcsResourceScheduler::new(Arc::clone(&resource_manager)));

        let mock_nodelet = Arc::new(MockNodeletClient::new());
        let mock_clone = Arc::clone(&mock_nodelet);
        let client_pool = NodeletClientPool::new(Arc::new(move |_addr| {
            Arc::clone(&mock_clone) as Arc<dyn NodeletClient>
        }));

        let scheduler = GcsPlacementGroupScheduler::new(
            node_manager,
            resource_scheduler,
            Arc::clone(&resource_manager),
            client_pool,
        );
        Fixture {
            resource_manager,
            mock_nodelet,
            scheduler,
        }
    }

    fn make_pg(
        id: u8,
        strategy: PlacementStrategy,
        bundle_cpus: &[f64],
    ) -> rpc::PlacementGroupTableData {
        let mut pg_id = vec![0u8; 18];
        pg_id[0] = id;
        rpc::PlacementGroupTableData {
            placement_group_id: pg_id,
            name: format!("pg-{id}"),
            namespace: "default".to_string(),
            strategy: strategy as i32,
            state: rpc::PlacementGroupState::Pending as i32,
            bundles: bundle_cpus
                .iter()
                .enumerate()
                .map(|(i, cpus)| rpc::Bundle {
                    bundle_index: i as i64,
                    resources: HashMap::from([("CPU".to_string(), *cpus)]),
                    node_id: vec![],
                })
                .collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_prepare_then_commit_on_success() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        let pg = make_pg(1, PlacementStrategy::Pack, &[1.0, 1.0]);

        let outcome = fixture.scheduler.schedule(&pg).await;
        match outcome {
            PgScheduleOutcome::Success(assignment) => {
                assert_eq!(assignment.len(), 2);
            }
            other => panic!("expected success, got {other:?}"),
        }

        assert_eq!(fixture.mock_nodelet.prepare_requests.lock().len(), 2);
        assert_eq!(fixture.mock_nodelet.commit_requests.lock().len(), 2);
        assert!(fixture.mock_nodelet.cancel_requests.lock().is_empty());

        // Both bundles charged to the view.
        let view = fixture
            .resource_manager
            .get_node_resources(&node_id(1))
            .unwrap();
        assert_eq!(view.available.get("CPU").to_f64(), 6.0);
    }

    #[tokio::test]
    async fn test_prepare_failure_cancels_prepared() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        // First prepare OK, second rejected.
        fixture
            .mock_nodelet
            .push_prepare_reply(Ok(rpc::PrepareBundleReply { success: true }));
        fixture
            .mock_nodelet
            .push_prepare_reply(Ok(rpc::PrepareBundleReply { success: false }));

        let pg = make_pg(1, PlacementStrategy::Pack, &[1.0, 1.0]);
        let outcome = fixture.scheduler.schedule(&pg).await;
        assert_eq!(outcome, PgScheduleOutcome::Failed);

        // The one prepared bundle was cancelled and nothing stayed charged.
        assert_eq!(fixture.mock_nodelet.cancel_requests.lock().len(), 1);
        let view = fixture
            .resource_manager
            .get_node_resources(&node_id(1))
            .unwrap();
        assert_eq!(view.available.get("CPU").to_f64(), 8.0);
    }

    #[tokio::test]
    async fn test_commit_failure_rolls_back_everything() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        fixture
            .mock_nodelet
            .push_commit_reply(Err(Status::unavailable("nodelet restarting")));

        let pg = make_pg(1, PlacementStrategy::StrictPack, &[1.0, 1.0]);
        let outcome = fixture.scheduler.schedule(&pg).await;
        assert_eq!(outcome, PgScheduleOutcome::Failed);

        // All prepared bundles cancelled; no partial binding survives.
        assert_eq!(fixture.mock_nodelet.cancel_requests.lock().len(), 2);
        let view = fixture
            .resource_manager
            .get_node_resources(&node_id(1))
            .unwrap();
        assert_eq!(view.available.get("CPU").to_f64(), 8.0);
    }

    #[tokio::test]
    async fn test_strict_spread_needs_enough_nodes() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        let pg = make_pg(1, PlacementStrategy::StrictSpread, &[1.0, 1.0]);
        let outcome = fixture.scheduler.schedule(&pg).await;
        assert_eq!(outcome, PgScheduleOutcome::Infeasible);
        assert!(fixture.mock_nodelet.prepare_requests.lock().is_empty());
    }

    #[tokio::test]
    async fn test_strict_spread_lands_on_distinct_nodes() {
        let fixture = make_fixture(&[(1, 8.0), (2, 8.0)]).await;
        let pg = make_pg(1, PlacementStrategy::StrictSpread, &[1.0, 1.0]);
        let outcome = fixture.scheduler.schedule(&pg).await;
        match outcome {
            PgScheduleOutcome::Success(assignment) => {
                assert_ne!(assignment[0].1, assignment[1].1);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_release_bundles_returns_resources() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        let mut pg = make_pg(1, PlacementStrategy::Pack, &[2.0]);

        let outcome = fixture.scheduler.schedule(&pg).await;
        let assignment = match outcome {
            PgScheduleOutcome::Success(assignment) => assignment,
            other => panic!("expected success, got {other:?}"),
        };
        for (bundle, (_, node)) in pg.bundles.iter_mut().zip(assignment.iter()) {
            bundle.node_id = node.binary();
        }

        fixture.scheduler.release_bundles(&pg).await;

        let view = fixture
            .resource_manager
            .get_node_resources(&node_id(1))
            .unwrap();
        assert_eq!(view.available.get("CPU").to_f64(), 8.0);
        assert_eq!(fixture.mock_nodelet.cancel_requests.lock().len(), 1);
    }
}
