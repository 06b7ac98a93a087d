// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Actor Scheduler — places one actor on the cluster.
//!
//! Flow: pick a node through the resource scheduler → charge the actor's
//! resources against the GCS view → lease a worker from that node's
//! nodelet (following spillback redirects) → start the actor on the leased
//! worker. Any failure releases whatever was charged; the caller decides
//! whether to park or retry.

use std::sync::Arc;

use tonic::Status;

use mantle_common::id::{LeaseID, NodeID, WorkerID};
use mantle_common::scheduling::ResourceSet;
use mantle_proto::rpc;

use crate::client_pool::NodeletClientPool;
use crate::node_manager::GcsNodeManager;
use crate::nodelet_client::WorkerClient;
use crate::resource_manager::GcsResourceManager;
use crate::resource_scheduler::GcsResourceScheduler;

/// Maximum spillback redirects followed for one lease.
const MAX_SPILLBACK_HOPS: u32 = 10;

/// Why a scheduling attempt did not place the actor.
#[derive(Debug)]
pub enum ScheduleError {
    /// No alive node currently satisfies the demand. Park the actor; a
    /// future NodeAdded or resource report unblocks it.
    NoAvailableNode,
    /// An outbound RPC failed. Retry with backoff; node death is decided
    /// by the heartbeat manager, not here.
    Rpc(Status),
}

impl std::fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScheduleError::NoAvailableNode => write!(f, "no available node"),
            ScheduleError::Rpc(status) => write!(f, "rpc failure: {status}"),
        }
    }
}

/// Result of a successful placement.
#[derive(Debug)]
pub struct ScheduleResult {
    pub node_id: NodeID,
    pub worker_address: rpc::Address,
    pub worker_pid: u32,
    /// Resources charged against the node; released when the actor dies.
    pub acquired_resources: ResourceSet,
}

pub struct GcsActorScheduler {
    node_manager: Arc<GcsNodeManager>,
    resource_scheduler: Arc<GcsResourceScheduler>,
    resource_manager: Arc<GcsResourceManager>,
    client_pool: Arc<NodeletClientPool>,
    worker_client: Arc<dyn WorkerClient>,
}

impl GcsActorScheduler {
    pub fn new(
        node_manager: Arc<GcsNodeManager>,
        resource_scheduler: Arc<GcsResourceScheduler>,
        resource_manager: Arc<GcsResourceManager>,
        client_pool: Arc<NodeletClientPool>,
        worker_client: Arc<dyn WorkerClient>,
    ) -> Self {
        Self {
            node_manager,
            resource_scheduler,
            resource_manager,
            client_pool,
            worker_client,
        }
    }

    /// Schedule one actor. On success the actor's resources remain charged
    /// to the returned node.
    pub async fn schedule(
        &self,
        spec: &rpc::ActorCreationSpec,
    ) -> Result<ScheduleResult, ScheduleError> {
        let required = ResourceSet::from_map(&spec.required_resources);

        let node_id = self
            .resource_scheduler
            .select_node(&required)
            .ok_or(ScheduleError::NoAvailableNode)?;

        // Charge the view before leasing so concurrent placements see it.
        if !self.resource_manager.acquire_resources(&node_id, &required) {
            return Err(ScheduleError::NoAvailableNode);
        }

        match self.lease_and_start(spec, node_id, &required).await {
            Ok((final_node_id, worker_address, worker_pid)) => {
                if final_node_id != node_id {
                    // Spilled: move the charge to where the actor landed.
                    self.resource_manager.release_resources(&node_id, &required);
                    self.resource_manager
                        .acquire_resources(&final_node_id, &required);
                }
                Ok(ScheduleResult {
                    node_id: final_node_id,
                    worker_address,
                    worker_pid,
                    acquired_resources: required,
                })
            }
            Err(e) => {
                self.resource_manager.release_resources(&node_id, &required);
                Err(e)
            }
        }
    }

    async fn lease_and_start(
        &self,
        spec: &rpc::ActorCreationSpec,
        initial_node_id: NodeID,
        required: &ResourceSet,
    ) -> Result<(NodeID, rpc::Address, u32), ScheduleError> {
        let mut node_id = initial_node_id;
        let lease_id = LeaseID::from_worker(&WorkerID::from_random(), 0);

        for hop in 0..MAX_SPILLBACK_HOPS {
            let node = self
                .node_manager
                .get_alive_node(&node_id)
                .ok_or(ScheduleError::NoAvailableNode)?;
            let addr = format!("{}:{}", node.nodelet_address, node.nodelet_port);
            let client = self.client_pool.get_or_connect(&node_id, &addr);

            let reply = client
                .request_worker_lease(rpc::RequestWorkerLeaseRequest {
                    spec: Some(spec.clone()),
                    lease_id: lease_id.binary(),
                })
                .await
                .map_err(ScheduleError::Rpc)?;

            if reply.canceled {
                return Err(ScheduleError::Rpc(Status::cancelled(
                    "worker lease request was canceled",
                )));
            }
            if reply.rejected {
                // Resources were gone by the time the nodelet saw the
                // lease; treat as currently-unavailable.
                return Err(ScheduleError::NoAvailableNode);
            }

            if let Some(worker_address) = reply.worker_address {
                let worker_addr_str =
                    format!("{}:{}", worker_address.ip_address, worker_address.port);
                self.worker_client
                    .start_actor(
                        &worker_addr_str,
                        rpc::StartActorRequest {
                            spec: Some(spec.clone()),
                            intended_worker_id: worker_address.worker_id.clone(),
                        },
                    )
                    .await
                    .map_err(ScheduleError::Rpc)?;
                return Ok((node_id, worker_address, reply.worker_pid));
            }

            if let Some(retry_addr) = reply.retry_at_nodelet_address {
                let next = NodeID::try_from_binary(&retry_addr.node_id);
                tracing::debug!(hop, from = ?node_id, to = ?next, "Lease spilled to another node");
                node_id = next;
                continue;
            }

            if !reply.failure_message.is_empty() {
                return Err(ScheduleError::Rpc(Status::internal(reply.failure_message)));
            }
            return Err(ScheduleError::Rpc(Status::internal(
                "nodelet returned empty lease reply with no spillback address",
            )));
        }

        tracing::warn!(
            required = ?required.to_map(),
            "Exceeded spillback budget while leasing a worker"
        );
        Err(ScheduleError::Rpc(Status::deadline_exceeded(format!(
            "exceeded maximum spillback hops ({MAX_SPILLBACK_HOPS})"
        ))))
    }
}
