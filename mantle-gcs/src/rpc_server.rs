// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! gRPC server lifecycle wrapper around tonic.
//!
//! Binds the configured port (0 = pick a free port), registers the health
//! service plus every GCS service wrapper, and reports the bound address.
//! `run` returns once the socket is bound so the caller can sequence
//! startup; `shutdown` drains gracefully and may block for seconds.

use std::net::SocketAddr;

use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;

use crate::grpc_services::{
    ActorInfoGcsService, GcsServices, HeartbeatInfoGcsService, InternalKVGcsService,
    InternalPubSubGcsService, JobInfoGcsService, NodeInfoGcsService, NodeResourceInfoGcsService,
    ObjectInfoGcsService, PlacementGroupInfoGcsService, StatsGcsService, TaskInfoGcsService,
    WorkerInfoGcsService,
};

/// Configuration for the GCS gRPC server.
#[derive(Debug, Clone)]
pub struct GrpcServerConfig {
    /// Name of this server (for logging).
    pub name: String,
    /// Port to listen on (0 = pick a free port).
    pub port: u16,
    /// Worker threads of the transport; informational, the runtime owns
    /// the actual pool.
    pub thread_num: usize,
}

impl Default for GrpcServerConfig {
    fn default() -> Self {
        Self {
            name: "GcsServer".to_string(),
            port: 0,
            thread_num: 1,
        }
    }
}

pub struct GrpcServer {
    config: GrpcServerConfig,
    bound_addr: Mutex<Option<SocketAddr>>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    join_handle: Mutex<Option<JoinHandle<()>>>,
}

impl GrpcServer {
    pub fn new(config: GrpcServerConfig) -> Self {
        Self {
            config,
            bound_addr: Mutex::new(None),
            shutdown_tx: Mutex::new(None),
            join_handle: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GrpcServerConfig {
        &self.config
    }

    /// Bind, register every service, and start serving. Returns the bound
    /// address.
    pub async fn run(&self, services: GcsServices) -> anyhow::Result<SocketAddr> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.port)).await?;
        let bound_addr = listener.local_addr()?;
        *self.bound_addr.lock() = Some(bound_addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        *self.shutdown_tx.lock() = Some(shutdown_tx);

        let (_health_reporter, health_service) = tonic_health::server::health_reporter();

        let mut router = tonic::transport::Server::builder()
            .add_service(health_service)
            .add_service(JobInfoGcsService::new(services.job_info))
            .add_service(NodeInfoGcsService::new(services.node_info))
            .add_service(HeartbeatInfoGcsService::new(services.heartbeat_info))
            .add_service(NodeResourceInfoGcsService::new(services.node_resource_info))
            .add_service(ActorInfoGcsService::new(services.actor_info))
            .add_service(PlacementGroupInfoGcsService::new(
                services.placement_group_info,
            ))
            .add_service(ObjectInfoGcsService::new(services.object_info))
            .add_service(WorkerInfoGcsService::new(services.worker_info))
            .add_service(TaskInfoGcsService::new(services.task_info))
            .add_service(StatsGcsService::new(services.stats))
            .add_service(InternalKVGcsService::new(services.internal_kv));
        if let Some(pubsub) = services.internal_pubsub {
            router = router.add_service(InternalPubSubGcsService::new(pubsub));
        }

        let name = self.config.name.clone();
        let handle = tokio::spawn(async move {
            let result = router
                .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(%e, name, "gRPC server exited with error");
            }
        });
        *self.join_handle.lock() = Some(handle);

        tracing::info!(name = %self.config.name, %bound_addr, "gRPC server listening");
        Ok(bound_addr)
    }

    pub fn bound_addr(&self) -> Option<SocketAddr> {
        *self.bound_addr.lock()
    }

    pub fn port(&self) -> u16 {
        self.bound_addr().map(|a| a.port()).unwrap_or(self.config.port)
    }

    /// Graceful shutdown; idempotent.
    pub async fn shutdown(&self) {
        let tx = self.shutdown_tx.lock().take();
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
        let handle = self.join_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        tracing::info!(name = %self.config.name, "gRPC server stopped");
    }
}
