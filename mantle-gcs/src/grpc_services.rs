// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! gRPC service implementations for the GCS.
//!
//! Each `*GcsServiceImpl` struct implements the unary handlers of one
//! exposed service, delegating to the owning manager; handlers never touch
//! manager state on transport threads beyond re-entering the shared
//! runtime. The `gcs_grpc_service!` wrappers at the bottom put each impl
//! on the wire: hand-written `tower::Service` dispatch over
//! `tonic::server::Grpc` + `ProstCodec`, the server-side mirror of the
//! hand-written clients in `nodelet_client`.

use std::sync::Arc;

use tonic::Status;

use mantle_common::id::NodeID;
use mantle_proto::rpc;

use crate::actor_manager::GcsActorManager;
use crate::heartbeat_manager::GcsHeartbeatManager;
use crate::job_manager::GcsJobManager;
use crate::kv_manager::GcsInternalKVManager;
use crate::node_manager::GcsNodeManager;
use crate::object_manager::GcsObjectManager;
use crate::placement_group_manager::GcsPlacementGroupManager;
use crate::pubsub::InternalPubSub;
use crate::resource_manager::GcsResourceManager;
use crate::stats_handler::GcsStatsHandler;
use crate::task_manager::GcsTaskManager;
use crate::worker_manager::GcsWorkerManager;

fn positive_limit(limit: Option<i64>) -> Option<usize> {
    limit.filter(|&l| l > 0).map(|l| l as usize)
}

// ─── JobInfoGcsService ─────────────────────────────────────────────────────

pub struct JobInfoGcsServiceImpl {
    pub job_manager: Arc<GcsJobManager>,
}

impl JobInfoGcsServiceImpl {
    pub async fn add_job(&self, request: rpc::AddJobRequest) -> Result<rpc::AddJobReply, Status> {
        if let Some(data) = request.data {
            self.job_manager.handle_add_job(data).await?;
        }
        Ok(rpc::AddJobReply {})
    }

    pub async fn mark_job_finished(
        &self,
        request: rpc::MarkJobFinishedRequest,
    ) -> Result<rpc::MarkJobFinishedReply, Status> {
        self.job_manager
            .handle_mark_job_finished(&request.job_id)
            .await?;
        Ok(rpc::MarkJobFinishedReply {})
    }

    pub async fn get_all_job_info(
        &self,
        request: rpc::GetAllJobInfoRequest,
    ) -> Result<rpc::GetAllJobInfoReply, Status> {
        let jobs = self
            .job_manager
            .handle_get_all_job_info(positive_limit(request.limit));
        Ok(rpc::GetAllJobInfoReply { job_info_list: jobs })
    }

    pub async fn get_next_job_id(
        &self,
        _request: rpc::GetNextJobIdRequest,
    ) -> Result<rpc::GetNextJobIdReply, Status> {
        let job_id = self.job_manager.handle_get_next_job_id().await?;
        Ok(rpc::GetNextJobIdReply { job_id })
    }
}

// ─── NodeInfoGcsService ────────────────────────────────────────────────────

pub struct NodeInfoGcsServiceImpl {
    pub node_manager: Arc<GcsNodeManager>,
}

impl NodeInfoGcsServiceImpl {
    pub async fn register_node(
        &self,
        request: rpc::RegisterNodeRequest,
    ) -> Result<rpc::RegisterNodeReply, Status> {
        if let Some(node_info) = request.node_info {
            self.node_manager.handle_register_node(node_info).await?;
        }
        Ok(rpc::RegisterNodeReply {})
    }

    pub async fn unregister_node(
        &self,
        request: rpc::UnregisterNodeRequest,
    ) -> Result<rpc::UnregisterNodeReply, Status> {
        self.node_manager
            .handle_unregister_node(&request.node_id)
            .await?;
        Ok(rpc::UnregisterNodeReply {})
    }

    pub async fn get_all_node_info(
        &self,
        _request: rpc::GetAllNodeInfoRequest,
    ) -> Result<rpc::GetAllNodeInfoReply, Status> {
        Ok(rpc::GetAllNodeInfoReply {
            node_info_list: self.node_manager.handle_get_all_node_info(),
        })
    }

    pub async fn get_cluster_id(
        &self,
        _request: rpc::GetClusterIdRequest,
    ) -> Result<rpc::GetClusterIdReply, Status> {
        Ok(rpc::GetClusterIdReply {
            cluster_id: self.node_manager.handle_get_cluster_id(),
        })
    }

    pub async fn drain_node(
        &self,
        request: rpc::DrainNodeRequest,
    ) -> Result<rpc::DrainNodeReply, Status> {
        let node_id = NodeID::try_from_binary(&request.node_id);
        self.node_manager
            .handle_drain_node(&node_id, request.deadline_ms);
        Ok(rpc::DrainNodeReply {})
    }
}

// ─── HeartbeatInfoGcsService ───────────────────────────────────────────────

/// The handler only touches the failure detector's own countdown map, so a
/// heartbeat never waits on main-loop manager work even while the main
/// runtime is saturated.
pub struct HeartbeatInfoGcsServiceImpl {
    pub heartbeat_manager: Arc<GcsHeartbeatManager>,
}

impl HeartbeatInfoGcsServiceImpl {
    pub async fn report_heartbeat(
        &self,
        request: rpc::ReportHeartbeatRequest,
    ) -> Result<rpc::ReportHeartbeatReply, Status> {
        self.heartbeat_manager.handle_report_heartbeat(&request)
    }
}

// ─── NodeResourceInfoGcsService ────────────────────────────────────────────

pub struct NodeResourceInfoGcsServiceImpl {
    pub resource_manager: Arc<GcsResourceManager>,
}

impl NodeResourceInfoGcsServiceImpl {
    pub async fn report_resource_usage(
        &self,
        request: rpc::ReportResourceUsageRequest,
    ) -> Result<rpc::ReportResourceUsageReply, Status> {
        if let Some(resources) = request.resources {
            self.resource_manager.update_from_resource_report(resources);
        }
        Ok(rpc::ReportResourceUsageReply {})
    }

    pub async fn get_all_available_resources(
        &self,
        _request: rpc::GetAllAvailableResourcesRequest,
    ) -> Result<rpc::GetAllAvailableResourcesReply, Status> {
        Ok(rpc::GetAllAvailableResourcesReply {
            resources_list: self.resource_manager.handle_get_all_available_resources(),
        })
    }

    pub async fn get_all_resource_usage(
        &self,
        _request: rpc::GetAllResourceUsageRequest,
    ) -> Result<rpc::GetAllResourceUsageReply, Status> {
        Ok(rpc::GetAllResourceUsageReply {
            resource_usage_data: Some(self.resource_manager.handle_get_all_resource_usage()),
        })
    }
}

// ─── ActorInfoGcsService ───────────────────────────────────────────────────

pub struct ActorInfoGcsServiceImpl {
    pub actor_manager: Arc<GcsActorManager>,
}

impl ActorInfoGcsServiceImpl {
    pub async fn register_actor(
        &self,
        request: rpc::RegisterActorRequest,
    ) -> Result<rpc::RegisterActorReply, Status> {
        if let Some(spec) = request.spec {
            self.actor_manager.handle_register_actor(spec).await?;
        }
        Ok(rpc::RegisterActorReply {})
    }

    pub async fn create_actor(
        &self,
        request: rpc::CreateActorRequest,
    ) -> Result<rpc::CreateActorReply, Status> {
        let spec = request
            .spec
            .ok_or_else(|| Status::invalid_argument("missing actor creation spec"))?;
        let rx = self.actor_manager.handle_create_actor(&spec.actor_id).await?;
        rx.await
            .map_err(|_| Status::internal("actor creation dropped"))?
    }

    pub async fn get_actor_info(
        &self,
        request: rpc::GetActorInfoRequest,
    ) -> Result<rpc::GetActorInfoReply, Status> {
        Ok(rpc::GetActorInfoReply {
            actor_table_data: self.actor_manager.handle_get_actor_info(&request.actor_id),
        })
    }

    pub async fn get_named_actor_info(
        &self,
        request: rpc::GetNamedActorInfoRequest,
    ) -> Result<rpc::GetNamedActorInfoReply, Status> {
        Ok(rpc::GetNamedActorInfoReply {
            actor_table_data: self
                .actor_manager
                .handle_get_named_actor_info(&request.name, &request.namespace),
        })
    }

    pub async fn list_named_actors(
        &self,
        request: rpc::ListNamedActorsRequest,
    ) -> Result<rpc::ListNamedActorsReply, Status> {
        let named = self
            .actor_manager
            .handle_list_named_actors(&request.namespace, request.all_namespaces);
        Ok(rpc::ListNamedActorsReply {
            named_actors: named
                .into_iter()
                .map(|(namespace, name)| rpc::NamedActorEntry { namespace, name })
                .collect(),
        })
    }

    pub async fn get_all_actor_info(
        &self,
        request: rpc::GetAllActorInfoRequest,
    ) -> Result<rpc::GetAllActorInfoReply, Status> {
        let state_filter = request
            .state_filter
            .and_then(|v| rpc::ActorState::try_from(v).ok());
        Ok(rpc::GetAllActorInfoReply {
            actor_table_data: self
                .actor_manager
                .handle_get_all_actor_info(positive_limit(request.limit), state_filter),
        })
    }

    pub async fn kill_actor(
        &self,
        request: rpc::KillActorRequest,
    ) -> Result<rpc::KillActorReply, Status> {
        self.actor_manager
            .handle_kill_actor(&request.actor_id, request.no_restart)
            .await?;
        Ok(rpc::KillActorReply {})
    }
}

// ─── PlacementGroupInfoGcsService ──────────────────────────────────────────

pub struct PlacementGroupInfoGcsServiceImpl {
    pub placement_group_manager: Arc<GcsPlacementGroupManager>,
}

impl PlacementGroupInfoGcsServiceImpl {
    pub async fn create_placement_group(
        &self,
        request: rpc::CreatePlacementGroupRequest,
    ) -> Result<rpc::CreatePlacementGroupReply, Status> {
        if let Some(data) = request.data {
            self.placement_group_manager
                .handle_create_placement_group(data)
                .await?;
        }
        Ok(rpc::CreatePlacementGroupReply {})
    }

    pub async fn remove_placement_group(
        &self,
        request: rpc::RemovePlacementGroupRequest,
    ) -> Result<rpc::RemovePlacementGroupReply, Status> {
        self.placement_group_manager
            .handle_remove_placement_group(&request.placement_group_id)
            .await?;
        Ok(rpc::RemovePlacementGroupReply {})
    }

    pub async fn get_placement_group(
        &self,
        request: rpc::GetPlacementGroupRequest,
    ) -> Result<rpc::GetPlacementGroupReply, Status> {
        Ok(rpc::GetPlacementGroupReply {
            placement_group_table_data: self
                .placement_group_manager
                .handle_get_placement_group(&request.placement_group_id),
        })
    }

    pub async fn get_all_placement_group(
        &self,
        request: rpc::GetAllPlacementGroupRequest,
    ) -> Result<rpc::GetAllPlacementGroupReply, Status> {
        Ok(rpc::GetAllPlacementGroupReply {
            placement_group_table_data: self
                .placement_group_manager
                .handle_get_all_placement_groups(positive_limit(request.limit)),
        })
    }

    pub async fn wait_placement_group_until_ready(
        &self,
        request: rpc::WaitPlacementGroupUntilReadyRequest,
    ) -> Result<rpc::WaitPlacementGroupUntilReadyReply, Status> {
        let rx = self
            .placement_group_manager
            .handle_wait_until_ready(&request.placement_group_id)?;
        rx.await
            .map_err(|_| Status::internal("placement group wait dropped"))??;
        Ok(rpc::WaitPlacementGroupUntilReadyReply {})
    }
}

// ─── ObjectInfoGcsService ──────────────────────────────────────────────────

pub struct ObjectInfoGcsServiceImpl {
    pub object_manager: Arc<GcsObjectManager>,
}

impl ObjectInfoGcsServiceImpl {
    pub async fn add_object_location(
        &self,
        request: rpc::AddObjectLocationRequest,
    ) -> Result<rpc::AddObjectLocationReply, Status> {
        self.object_manager.handle_add_object_location(
            &request.object_id,
            &request.node_id,
            request.size,
            &request.spilled_url,
        )?;
        Ok(rpc::AddObjectLocationReply {})
    }

    pub async fn remove_object_location(
        &self,
        request: rpc::RemoveObjectLocationRequest,
    ) -> Result<rpc::RemoveObjectLocationReply, Status> {
        self.object_manager
            .handle_remove_object_location(&request.object_id, &request.node_id)?;
        Ok(rpc::RemoveObjectLocationReply {})
    }

    pub async fn get_object_locations(
        &self,
        request: rpc::GetObjectLocationsRequest,
    ) -> Result<rpc::GetObjectLocationsReply, Status> {
        Ok(rpc::GetObjectLocationsReply {
            location_info: Some(
                self.object_manager
                    .handle_get_object_locations(&request.object_id),
            ),
        })
    }

    pub async fn get_all_object_locations(
        &self,
        _request: rpc::GetAllObjectLocationsRequest,
    ) -> Result<rpc::GetAllObjectLocationsReply, Status> {
        Ok(rpc::GetAllObjectLocationsReply {
            location_info_list: self.object_manager.handle_get_all_object_locations(),
        })
    }
}

// ─── WorkerInfoGcsService ──────────────────────────────────────────────────

pub struct WorkerInfoGcsServiceImpl {
    pub worker_manager: Arc<GcsWorkerManager>,
}

impl WorkerInfoGcsServiceImpl {
    pub async fn report_worker_failure(
        &self,
        request: rpc::ReportWorkerFailureRequest,
    ) -> Result<rpc::ReportWorkerFailureReply, Status> {
        if let Some(worker_failure) = request.worker_failure {
            self.worker_manager
                .handle_report_worker_failure(worker_failure)
                .await?;
        }
        Ok(rpc::ReportWorkerFailureReply {})
    }

    pub async fn add_worker_info(
        &self,
        request: rpc::AddWorkerInfoRequest,
    ) -> Result<rpc::AddWorkerInfoReply, Status> {
        if let Some(worker_data) = request.worker_data {
            self.worker_manager.handle_add_worker_info(worker_data).await?;
        }
        Ok(rpc::AddWorkerInfoReply {})
    }

    pub async fn get_all_worker_info(
        &self,
        request: rpc::GetAllWorkerInfoRequest,
    ) -> Result<rpc::GetAllWorkerInfoReply, Status> {
        let workers = self
            .worker_manager
            .handle_get_all_worker_info(positive_limit(request.limit))
            .await?;
        Ok(rpc::GetAllWorkerInfoReply {
            worker_table_data: workers,
        })
    }
}

// ─── TaskInfoGcsService ────────────────────────────────────────────────────

pub struct TaskInfoGcsServiceImpl {
    pub task_manager: Arc<GcsTaskManager>,
}

impl TaskInfoGcsServiceImpl {
    pub async fn record_task_events(
        &self,
        request: rpc::RecordTaskEventsRequest,
    ) -> Result<rpc::RecordTaskEventsReply, Status> {
        let num_dropped = self.task_manager.handle_record_task_events(request.events);
        Ok(rpc::RecordTaskEventsReply { num_dropped })
    }
}

// ─── StatsGcsService ───────────────────────────────────────────────────────

pub struct StatsGcsServiceImpl {
    pub stats_handler: Arc<GcsStatsHandler>,
}

impl StatsGcsServiceImpl {
    pub async fn add_profile_data(
        &self,
        request: rpc::AddProfileDataRequest,
    ) -> Result<rpc::AddProfileDataReply, Status> {
        if let Some(data) = request.profile_data {
            self.stats_handler.handle_add_profile_data(data);
        }
        Ok(rpc::AddProfileDataReply {})
    }
}

// ─── InternalKVGcsService ──────────────────────────────────────────────────

pub struct InternalKVGcsServiceImpl {
    pub kv_manager: Arc<GcsInternalKVManager>,
}

impl InternalKVGcsServiceImpl {
    pub async fn internal_kv_get(
        &self,
        request: rpc::InternalKvGetRequest,
    ) -> Result<rpc::InternalKvGetReply, Status> {
        let ns = String::from_utf8_lossy(&request.namespace).to_string();
        let key = String::from_utf8_lossy(&request.key).to_string();
        let value = self.kv_manager.handle_get(&ns, &key).await?;
        Ok(rpc::InternalKvGetReply { value })
    }

    pub async fn internal_kv_put(
        &self,
        request: rpc::InternalKvPutRequest,
    ) -> Result<rpc::InternalKvPutReply, Status> {
        let ns = String::from_utf8_lossy(&request.namespace).to_string();
        let key = String::from_utf8_lossy(&request.key).to_string();
        let added = self
            .kv_manager
            .handle_put(&ns, &key, request.value, request.overwrite)
            .await?;
        Ok(rpc::InternalKvPutReply { added })
    }

    pub async fn internal_kv_del(
        &self,
        request: rpc::InternalKvDelRequest,
    ) -> Result<rpc::InternalKvDelReply, Status> {
        let ns = String::from_utf8_lossy(&request.namespace).to_string();
        let key = String::from_utf8_lossy(&request.key).to_string();
        let deleted_num = self
            .kv_manager
            .handle_del(&ns, &key, request.del_by_prefix)
            .await?;
        Ok(rpc::InternalKvDelReply { deleted_num })
    }

    pub async fn internal_kv_exists(
        &self,
        request: rpc::InternalKvExistsRequest,
    ) -> Result<rpc::InternalKvExistsReply, Status> {
        let ns = String::from_utf8_lossy(&request.namespace).to_string();
        let key = String::from_utf8_lossy(&request.key).to_string();
        let exists = self.kv_manager.handle_exists(&ns, &key).await?;
        Ok(rpc::InternalKvExistsReply { exists })
    }

    pub async fn internal_kv_keys(
        &self,
        request: rpc::InternalKvKeysRequest,
    ) -> Result<rpc::InternalKvKeysReply, Status> {
        let ns = String::from_utf8_lossy(&request.namespace).to_string();
        let prefix = String::from_utf8_lossy(&request.prefix).to_string();
        let keys = self.kv_manager.handle_keys(&ns, &prefix).await?;
        Ok(rpc::InternalKvKeysReply {
            results: keys.into_iter().map(|k| k.into_bytes()).collect(),
        })
    }
}

// ─── InternalPubSubGcsService ──────────────────────────────────────────────

/// Cap on a single long poll so a silent cluster still answers.
const SUBSCRIBER_POLL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);

/// Exposed only when the in-process event bus is active.
pub struct InternalPubSubGcsServiceImpl {
    pub broker: Arc<InternalPubSub>,
}

impl InternalPubSubGcsServiceImpl {
    pub async fn gcs_subscribe(
        &self,
        request: rpc::GcsSubscribeRequest,
    ) -> Result<rpc::GcsSubscribeReply, Status> {
        self.broker.handle_subscribe_command(
            request.subscriber_id,
            request.channel_type,
            request.key_id,
        );
        Ok(rpc::GcsSubscribeReply {})
    }

    pub async fn gcs_unsubscribe(
        &self,
        request: rpc::GcsUnsubscribeRequest,
    ) -> Result<rpc::GcsUnsubscribeReply, Status> {
        self.broker.handle_unsubscribe_command(&request.subscriber_id);
        Ok(rpc::GcsUnsubscribeReply {})
    }

    pub async fn gcs_subscriber_poll(
        &self,
        request: rpc::GcsSubscriberPollRequest,
    ) -> Result<rpc::GcsSubscriberPollReply, Status> {
        let poll = self.broker.handle_subscriber_poll(
            &request.subscriber_id,
            request.max_processed_sequence_id,
        );
        let pub_messages = tokio::time::timeout(SUBSCRIBER_POLL_TIMEOUT, poll)
            .await
            .unwrap_or_default();
        Ok(rpc::GcsSubscriberPollReply { pub_messages })
    }
}

// ─── Wire dispatch ─────────────────────────────────────────────────────────

/// Adapts one `*GcsServiceImpl` handler to `tonic::server::UnaryService`.
/// Routes pass non-capturing closures, so the handler is a plain fn pointer
/// returning a boxed future.
struct UnaryHandler<I, Req, Reply> {
    inner: Arc<I>,
    handler: fn(
        Arc<I>,
        Req,
    ) -> std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Reply, Status>> + Send + 'static>,
    >,
}

impl<I, Req, Reply> tonic::server::UnaryService<Req> for UnaryHandler<I, Req, Reply>
where
    I: Send + Sync + 'static,
    Req: Send + 'static,
    Reply: Send + 'static,
{
    type Response = Reply;
    type Future = tonic::codegen::BoxFuture<tonic::Response<Reply>, Status>;

    fn call(&mut self, request: tonic::Request<Req>) -> Self::Future {
        let fut = (self.handler)(Arc::clone(&self.inner), request.into_inner());
        Box::pin(async move { fut.await.map(tonic::Response::new) })
    }
}

/// Generates the transport-facing wrapper for one GCS service: a
/// `NamedService` tower service routing each method path to the impl's
/// handler, unary-encoded with `ProstCodec`. Unknown methods get the
/// standard Unimplemented reply.
macro_rules! gcs_grpc_service {
    (
        $service:ident, $impl_ty:ty, $name:literal, {
            $($path:literal => $method:ident($req:ty) -> $reply:ty;)+
        }
    ) => {
        #[derive(Clone)]
        pub struct $service {
            inner: Arc<$impl_ty>,
        }

        impl $service {
            pub fn new(inner: Arc<$impl_ty>) -> Self {
                Self { inner }
            }
        }

        impl tonic::server::NamedService for $service {
            const NAME: &'static str = $name;
        }

        impl<B> tonic::codegen::Service<http::Request<B>> for $service
        where
            B: tonic::codegen::Body + Send + 'static,
            B::Error: Into<tonic::codegen::StdError> + Send + 'static,
        {
            type Response = http::Response<tonic::body::BoxBody>;
            type Error = std::convert::Infallible;
            type Future = tonic::codegen::BoxFuture<Self::Response, Self::Error>;

            fn poll_ready(
                &mut self,
                _cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<Result<(), Self::Error>> {
                std::task::Poll::Ready(Ok(()))
            }

            fn call(&mut self, req: http::Request<B>) -> Self::Future {
                match req.uri().path() {
                    $(
                        $path => {
                            let inner = Arc::clone(&self.inner);
                            Box::pin(async move {
                                let method = UnaryHandler::<$impl_ty, $req, $reply> {
                                    inner,
                                    handler: |svc, request| {
                                        Box::pin(async move { svc.$method(request).await })
                                    },
                                };
                                let codec =
                                    tonic::codec::ProstCodec::<$reply, $req>::default();
                                let mut grpc = tonic::server::Grpc::new(codec);
                                Ok(grpc.unary(method, req).await)
                            })
                        }
                    )+
                    _ => Box::pin(async move {
                        Ok(http::Response::builder()
                            .status(200)
                            .header("grpc-status", tonic::Code::Unimplemented as i32)
                            .header("content-type", "application/grpc")
                            .body(tonic::codegen::empty_body())
                            .unwrap())
                    }),
                }
            }
        }
    };
}

gcs_grpc_service!(JobInfoGcsService, JobInfoGcsServiceImpl, "mantle.rpc.JobInfoGcsService", {
    "/mantle.rpc.JobInfoGcsService/AddJob" =>
        add_job(rpc::AddJobRequest) -> rpc::AddJobReply;
    "/mantle.rpc.JobInfoGcsService/MarkJobFinished" =>
        mark_job_finished(rpc::MarkJobFinishedRequest) -> rpc::MarkJobFinishedReply;
    "/mantle.rpc.JobInfoGcsService/GetAllJobInfo" =>
        get_all_job_info(rpc::GetAllJobInfoRequest) -> rpc::GetAllJobInfoReply;
    "/mantle.rpc.JobInfoGcsService/GetNextJobID" =>
        get_next_job_id(rpc::GetNextJobIdRequest) -> rpc::GetNextJobIdReply;
});

gcs_grpc_service!(NodeInfoGcsService, NodeInfoGcsServiceImpl, "mantle.rpc.NodeInfoGcsService", {
    "/mantle.rpc.NodeInfoGcsService/RegisterNode" =>
        register_node(rpc::RegisterNodeRequest) -> rpc::RegisterNodeReply;
    "/mantle.rpc.NodeInfoGcsService/UnregisterNode" =>
        unregister_node(rpc::UnregisterNodeRequest) -> rpc::UnregisterNodeReply;
    "/mantle.rpc.NodeInfoGcsService/GetAllNodeInfo" =>
        get_all_node_info(rpc::GetAllNodeInfoRequest) -> rpc::GetAllNodeInfoReply;
    "/mantle.rpc.NodeInfoGcsService/GetClusterId" =>
        get_cluster_id(rpc::GetClusterIdRequest) -> rpc::GetClusterIdReply;
    "/mantle.rpc.NodeInfoGcsService/DrainNode" =>
        drain_node(rpc::DrainNodeRequest) -> rpc::DrainNodeReply;
});

gcs_grpc_service!(HeartbeatInfoGcsService, HeartbeatInfoGcsServiceImpl, "mantle.rpc.HeartbeatInfoGcsService", {
    "/mantle.rpc.HeartbeatInfoGcsService/ReportHeartbeat" =>
        report_heartbeat(rpc::ReportHeartbeatRequest) -> rpc::ReportHeartbeatReply;
});

gcs_grpc_service!(NodeResourceInfoGcsService, NodeResourceInfoGcsServiceImpl, "mantle.rpc.NodeResourceInfoGcsService", {
    "/mantle.rpc.NodeResourceInfoGcsService/ReportResourceUsage" =>
        report_resource_usage(rpc::ReportResourceUsageRequest) -> rpc::ReportResourceUsageReply;
    "/mantle.rpc.NodeResourceInfoGcsService/GetAllAvailableResources" =>
        get_all_available_resources(rpc::GetAllAvailableResourcesRequest) -> rpc::GetAllAvailableResourcesReply;
    "/mantle.rpc.NodeResourceInfoGcsService/GetAllResourceUsage" =>
        get_all_resource_usage(rpc::GetAllResourceUsageRequest) -> rpc::GetAllResourceUsageReply;
});

gcs_grpc_service!(ActorInfoGcsService, ActorInfoGcsServiceImpl, "mantle.rpc.ActorInfoGcsService", {
    "/mantle.rpc.ActorInfoGcsService/RegisterActor" =>
        register_actor(rpc::RegisterActorRequest) -> rpc::RegisterActorReply;
    "/mantle.rpc.ActorInfoGcsService/CreateActor" =>
        create_actor(rpc::CreateActorRequest) -> rpc::CreateActorReply;
    "/mantle.rpc.ActorInfoGcsService/GetActorInfo" =>
        get_actor_info(rpc::GetActorInfoRequest) -> rpc::GetActorInfoReply;
    "/mantle.rpc.ActorInfoGcsService/GetNamedActorInfo" =>
        get_named_actor_info(rpc::GetNamedActorInfoRequest) -> rpc::GetNamedActorInfoReply;
    "/mantle.rpc.ActorInfoGcsService/ListNamedActors" =>
        list_named_actors(rpc::ListNamedActorsRequest) -> rpc::ListNamedActorsReply;
    "/mantle.rpc.ActorInfoGcsService/GetAllActorInfo" =>
        get_all_actor_info(rpc::GetAllActorInfoRequest) -> rpc::GetAllActorInfoReply;
    "/mantle.rpc.ActorInfoGcsService/KillActor" =>
        kill_actor(rpc::KillActorRequest) -> rpc::KillActorReply;
});

gcs_grpc_service!(PlacementGroupInfoGcsService, PlacementGroupInfoGcsServiceImpl, "mantle.rpc.PlacementGroupInfoGcsService", {
    "/mantle.rpc.PlacementGroupInfoGcsService/CreatePlacementGroup" =>
        create_placement_group(rpc::CreatePlacementGroupRequest) -> rpc::CreatePlacementGroupReply;
    "/mantle.rpc.PlacementGroupInfoGcsService/RemovePlacementGroup" =>
        remove_placement_group(rpc::RemovePlacementGroupRequest) -> rpc::RemovePlacementGroupReply;
    "/mantle.rpc.PlacementGroupInfoGcsService/GetPlacementGroup" =>
        get_placement_group(rpc::GetPlacementGroupRequest) -> rpc::GetPlacementGroupReply;
    "/mantle.rpc.PlacementGroupInfoGcsService/GetAllPlacementGroup" =>
        get_all_placement_group(rpc::GetAllPlacementGroupRequest) -> rpc::GetAllPlacementGroupReply;
    "/mantle.rpc.PlacementGroupInfoGcsService/WaitPlacementGroupUntilReady" =>
        wait_placement_group_until_ready(rpc::WaitPlacementGroupUntilReadyRequest) -> rpc::WaitPlacementGroupUntilReadyReply;
});

gcs_grpc_service!(ObjectInfoGcsService, ObjectInfoGcsServiceImpl, "mantle.rpc.ObjectInfoGcsService", {
    "/mantle.rpc.ObjectInfoGcsService/AddObjectLocation" =>
        add_object_location(rpc::AddObjectLocationRequest) -> rpc::AddObjectLocationReply;
    "/mantle.rpc.ObjectInfoGcsService/RemoveObjectLocation" =>
        remove_object_location(rpc::RemoveObjectLocationRequest) -> rpc::RemoveObjectLocationReply;
    "/mantle.rpc.ObjectInfoGcsService/GetObjectLocations" =>
        get_object_locations(rpc::GetObjectLocationsRequest) -> rpc::GetObjectLocationsReply;
    "/mantle.rpc.ObjectInfoGcsService/GetAllObjectLocations" =>
        get_all_object_locations(rpc::GetAllObjectLocationsRequest) -> rpc::GetAllObjectLocationsReply;
});

gcs_grpc_service!(WorkerInfoGcsService, WorkerInfoGcsServiceImpl, "mantle.rpc.WorkerInfoGcsService", {
    "/mantle.rpc.WorkerInfoGcsService/ReportWorkerFailure" =>
        report_worker_failure(rpc::ReportWorkerFailureRequest) -> rpc::ReportWorkerFailureReply;
    "/mantle.rpc.WorkerInfoGcsService/AddWorkerInfo" =>
        add_worker_info(rpc::AddWorkerInfoRequest) -> rpc::AddWorkerInfoReply;
    "/mantle.rpc.WorkerInfoGcsService/GetAllWorkerInfo" =>
        get_all_worker_info(rpc::GetAllWorkerInfoRequest) -> rpc::GetAllWorkerInfoReply;
});

gcs_grpc_service!(TaskInfoGcsService, TaskInfoGcsServiceImpl, "mantle.rpc.TaskInfoGcsService", {
    "/mantle.rpc.TaskInfoGcsService/RecordTaskEvents" =>
        record_task_events(rpc::RecordTaskEventsRequest) -> rpc::RecordTaskEventsReply;
});

gcs_grpc_service!(StatsGcsService, StatsGcsServiceImpl, "mantle.rpc.StatsGcsService", {
    "/mantle.rpc.StatsGcsService/AddProfileData" =>
        add_profile_data(rpc::AddProfileDataRequest) -> rpc::AddProfileDataReply;
});

gcs_grpc_service!(InternalKVGcsService, InternalKVGcsServiceImpl, "mantle.rpc.InternalKVGcsService", {
    "/mantle.rpc.InternalKVGcsService/InternalKVGet" =>
        internal_kv_get(rpc::InternalKvGetRequest) -> rpc::InternalKvGetReply;
    "/mantle.rpc.InternalKVGcsService/InternalKVPut" =>
        internal_kv_put(rpc::InternalKvPutRequest) -> rpc::InternalKvPutReply;
    "/mantle.rpc.InternalKVGcsService/InternalKVDel" =>
        internal_kv_del(rpc::InternalKvDelRequest) -> rpc::InternalKvDelReply;
    "/mantle.rpc.InternalKVGcsService/InternalKVExists" =>
        internal_kv_exists(rpc::InternalKvExistsRequest) -> rpc::InternalKvExistsReply;
    "/mantle.rpc.InternalKVGcsService/InternalKVKeys" =>
        internal_kv_keys(rpc::InternalKvKeysRequest) -> rpc::InternalKvKeysReply;
});

gcs_grpc_service!(InternalPubSubGcsService, InternalPubSubGcsServiceImpl, "mantle.rpc.InternalPubSubGcsService", {
    "/mantle.rpc.InternalPubSubGcsService/GcsSubscribe" =>
        gcs_subscribe(rpc::GcsSubscribeRequest) -> rpc::GcsSubscribeReply;
    "/mantle.rpc.InternalPubSubGcsService/GcsUnsubscribe" =>
        gcs_unsubscribe(rpc::GcsUnsubscribeRequest) -> rpc::GcsUnsubscribeReply;
    "/mantle.rpc.InternalPubSubGcsService/GcsSubscriberPoll" =>
        gcs_subscriber_poll(rpc::GcsSubscriberPollRequest) -> rpc::GcsSubscriberPollReply;
});

/// Every service impl the transport exposes, built by the bootstrap
/// sequencer and registered on the gRPC server before it accepts a call.
pub struct GcsServices {
    pub job_info: Arc<JobInfoGcsServiceImpl>,
    pub node_info: Arc<NodeInfoGcsServiceImpl>,
    pub heartbeat_info: Arc<HeartbeatInfoGcsServiceImpl>,
    pub node_resource_info: Arc<NodeResourceInfoGcsServiceImpl>,
    pub actor_info: Arc<ActorInfoGcsServiceImpl>,
    pub placement_group_info: Arc<PlacementGroupInfoGcsServiceImpl>,
    pub object_info: Arc<ObjectInfoGcsServiceImpl>,
    pub worker_info: Arc<WorkerInfoGcsServiceImpl>,
    pub task_info: Arc<TaskInfoGcsServiceImpl>,
    pub stats: Arc<StatsGcsServiceImpl>,
    pub internal_kv: Arc<InternalKVGcsServiceImpl>,
    /// Present only when the in-process event bus is active.
    pub internal_pubsub: Option<Arc<InternalPubSubGcsServiceImpl>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store_client::{InMemoryInternalKV, InMemoryStoreClient, InternalKVInterface};
    use crate::table_storage::GcsTableStorage;
    use mantle_proto::rpc::ChannelType;

    #[tokio::test]
    async fn test_kv_grpc_service() {
        let kv = Arc::new(GcsInternalKVManager::new(
            Arc::new(InMemoryInternalKV::new()) as Arc<dyn InternalKVInterface>,
        ));
        let svc = InternalKVGcsServiceImpl { kv_manager: kv };

        let reply = svc
            .internal_kv_put(rpc::InternalKvPutRequest {
                namespace: b"ns".to_vec(),
                key: b"key1".to_vec(),
                value: b"val1".to_vec(),
                overwrite: true,
            })
            .await
            .unwrap();
        assert!(reply.added);

        let reply = svc
            .internal_kv_get(rpc::InternalKvGetRequest {
                namespace: b"ns".to_vec(),
                key: b"key1".to_vec(),
            })
            .await
            .unwrap();
        assert_eq!(reply.value, Some(b"val1".to_vec()));

        let reply = svc
            .internal_kv_exists(rpc::InternalKvExistsRequest {
                namespace: b"ns".to_vec(),
                key: b"key1".to_vec(),
            })
            .await
            .unwrap();
        assert!(reply.exists);
    }

    #[tokio::test]
    async fn test_node_grpc_service() {
        let storage = Arc::new(GcsTableStorage::new(Arc::new(InMemoryStoreClient::new())));
        let node_manager = Arc::new(GcsNodeManager::new(storage));
        let svc = NodeInfoGcsServiceImpl { node_manager };

        svc.register_node(rpc::RegisterNodeRequest {
            node_info: Some(rpc::NodeInfo {
                node_id: vec![42u8; 28],
                state: rpc::NodeState::Alive as i32,
                ..Default::default()
            }),
        })
        .await
        .unwrap();

        let reply = svc
            .get_all_node_info(rpc::GetAllNodeInfoRequest {})
            .await
            .unwrap();
        assert_eq!(reply.node_info_list.len(), 1);

        svc.unregister_node(rpc::UnregisterNodeRequest {
            node_id: vec![42u8; 28],
        })
        .await
        .unwrap();

        let reply = svc
            .get_all_node_info(rpc::GetAllNodeInfoRequest {})
            .await
            .unwrap();
        assert_eq!(reply.node_info_list[0].state, rpc::NodeState::Dead as i32);
    }

    #[tokio::test]
    async fn test_object_grpc_service() {
        let object_manager = Arc::new(GcsObjectManager::new());
        let svc = ObjectInfoGcsServiceImpl { object_manager };

        svc.add_object_location(rpc::AddObjectLocationRequest {
            object_id: vec![1u8; 28],
            node_id: vec![2u8; 28],
            size: 99,
            spilled_url: String::new(),
        })
        .await
        .unwrap();

        let reply = svc
            .get_object_locations(rpc::GetObjectLocationsRequest {
                object_id: vec![1u8; 28],
            })
            .await
            .unwrap();
        let info = reply.location_info.unwrap();
        assert_eq!(info.node_ids.len(), 1);
        assert_eq!(info.size, 99);
    }

    #[tokio::test]
    async fn test_pubsub_grpc_service() {
        let broker = Arc::new(InternalPubSub::new());
        let svc = InternalPubSubGcsServiceImpl {
            broker: Arc::clone(&broker),
        };

        svc.gcs_subscribe(rpc::GcsSubscribeRequest {
            subscriber_id: b"sub1".to_vec(),
            channel_type: ChannelType::ActorChannel as i32,
            key_id: vec![],
        })
        .await
        .unwrap();

        broker.publish(rpc::PubMessage {
            channel_type: ChannelType::ActorChannel as i32,
            key_id: b"actor1".to_vec(),
            ..Default::default()
        });

        let reply = svc
            .gcs_subscriber_poll(rpc::GcsSubscriberPollRequest {
                subscriber_id: b"sub1".to_vec(),
                max_processed_sequence_id: 0,
            })
            .await
            .unwrap();
        assert_eq!(reply.pub_messages.len(), 1);
        assert_eq!(reply.pub_messages[0].key_id, b"actor1");

        svc.gcs_unsubscribe(rpc::GcsUnsubscribeRequest {
            subscriber_id: b"sub1".to_vec(),
        })
        .await
        .unwrap();
    }
}
