// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Outbound RPC clients for nodelets and workers.
//!
//! The GCS talks to each node's local manager (nodelet) for worker leasing,
//! bundle reservation and resource reporting, and to leased workers to start
//! actors. Both surfaces are traits so schedulers and pollers can be tested
//! against mocks.

use std::time::Duration;

use tonic::Status;

use mantle_proto::rpc;

/// Deadline applied to every outbound unary call. On expiry the caller
/// treats the call as failed and applies its retry policy; the heartbeat
/// manager stays the authority on node death.
pub const OUTBOUND_RPC_TIMEOUT: Duration = Duration::from_secs(30);

/// RPC surface of a node's local manager.
#[async_trait::async_trait]
pub trait NodeletClient: Send + Sync {
    async fn request_worker_lease(
        &self,
        request: rpc::RequestWorkerLeaseRequest,
    ) -> Result<rpc::RequestWorkerLeaseReply, Status>;

    async fn prepare_bundle(
        &self,
        request: rpc::PrepareBundleRequest,
    ) -> Result<rpc::PrepareBundleReply, Status>;

    async fn commit_bundle(
        &self,
        request: rpc::CommitBundleRequest,
    ) -> Result<rpc::CommitBundleReply, Status>;

    async fn cancel_bundle(
        &self,
        request: rpc::CancelBundleRequest,
    ) -> Result<rpc::CancelBundleReply, Status>;

    async fn get_resource_load(
        &self,
        request: rpc::GetResourceLoadRequest,
    ) -> Result<rpc::GetResourceLoadReply, Status>;

    async fn update_resource_usage(
        &self,
        request: rpc::UpdateResourceUsageRequest,
    ) -> Result<rpc::UpdateResourceUsageReply, Status>;
}

/// RPC surface of a worker process (actor startup).
#[async_trait::async_trait]
pub trait WorkerClient: Send + Sync {
    async fn start_actor(
        &self,
        addr: &str,
        request: rpc::StartActorRequest,
    ) -> Result<rpc::StartActorReply, Status>;
}

async fn connect(addr: &str) -> Result<tonic::transport::Channel, Status> {
    let endpoint = tonic::transport::Endpoint::from_shared(format!("http://{addr}"))
        .map_err(|e| Status::internal(format!("invalid address '{addr}': {e}")))?
        .timeout(OUTBOUND_RPC_TIMEOUT)
        .connect_timeout(OUTBOUND_RPC_TIMEOUT);
    endpoint
        .connect()
        .await
        .map_err(|e| Status::unavailable(format!("failed to connect to '{addr}': {e}")))
}

async fn unary<Req, Reply>(
    addr: &str,
    path: &'static str,
    request: Req,
) -> Result<Reply, Status>
where
    Req: prost::Message + Send + Sync + 'static,
    Reply: prost::Message + Default + Send + Sync + 'static,
{
    let channel = connect(addr).await?;
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| Status::unavailable(format!("nodelet '{addr}' not ready: {e}")))?;
    let codec = tonic::codec::ProstCodec::default();
    let path = http::uri::PathAndQuery::from_static(path);
    let response = grpc.unary(tonic::Request::new(request), path, codec).await?;
    Ok(response.into_inner())
}

/// Real gRPC implementation of `NodeletClient`, bound to one nodelet
/// address.
pub struct GrpcNodeletClient {
    addr: String,
}

impl GrpcNodeletClient {
    pub fn new(addr: String) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }
}

#[async_trait::async_trait]
impl NodeletClient for GrpcNodeletClient {
    async fn request_worker_lease(
        &self,
        request: rpc::RequestWorkerLeaseRequest,
    ) -> Result<rpc::RequestWorkerLeaseReply, Status> {
        unary(
            &self.addr,
            "/mantle.rpc.NodeletService/RequestWorkerLease",
            request,
        )
        .await
    }

    async fn prepare_bundle(
        &self,
        request: rpc::PrepareBundleRequest,
    ) -> Result<rpc::PrepareBundleReply, Status> {
        unary(
            &self.addr,
            "/mantle.rpc.NodeletService/PrepareBundle",
            request,
        )
        .await
    }

    async fn commit_bundle(
        &self,
        request: rpc::CommitBundleRequest,
    ) -> Result<rpc::CommitBundleReply, Status> {
        unary(
            &self.addr,
            "/mantle.rpc.NodeletService/CommitBundle",
            request,
        )
        .await
    }

    async fn cancel_bundle(
        &self,
        request: rpc::CancelBundleRequest,
    ) -> Result<rpc::CancelBundleReply, Status> {
        unary(
            &self.addr,
            "/mantle.rpc.NodeletService/CancelBundle",
            request,
        )
        .await
    }

    async fn get_resource_load(
        &self,
        request: rpc::GetResourceLoadRequest,
    ) -> Result<rpc::GetResourceLoadReply, Status> {
        unary(
            &self.addr,
            "/mantle.rpc.NodeletService/GetResourceLoad",
            request,
        )
        .await
    }

    async fn update_resource_usage(
        &self,
        request: rpc::UpdateResourceUsageRequest,
    ) -> Result<rpc::UpdateResourceUsageReply, Status> {
        unary(
            &self.addr,
            "/mantle.rpc.NodeletService/UpdateResourceUsage",
            request,
        )
        .await
    }
}

/// Real gRPC implementation of `WorkerClient`.
pub struct GrpcWorkerClient;

#[async_trait::async_trait]
impl WorkerClient for GrpcWorkerClient {
    async fn start_actor(
        &self,
        addr: &str,
        request: rpc::StartActorRequest,
    ) -> Result<rpc::StartActorReply, Status> {
        unary(addr, "/mantle.rpc.WorkerService/StartActor", request).await
    }
}
