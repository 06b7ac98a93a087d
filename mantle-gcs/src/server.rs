// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS server startup, wiring and shutdown.
//!
//! Startup order matters: the store must be reachable and the initial
//! snapshot loaded before any manager exists; managers are built leaves
//! first; event listeners are installed before the RPC server accepts a
//! single call; and the heartbeat manager starts strictly after the RPC
//! server so nodes can re-register before their first deadline.
//!
//! Shutdown reverses the critical ordering: the heartbeat manager stops
//! first so live nodes are not declared dead while the RPC server drains.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use mantle_common::config::MantleConfig;
use mantle_common::constants::{CLUSTER_ID_KEY, GCS_SERVER_ADDRESS_KEY};
use mantle_common::id::{ClusterID, NodeID, WorkerID};
use mantle_common::runtime::PeriodicalRunner;

use crate::actor_manager::GcsActorManager;
use crate::actor_scheduler::GcsActorScheduler;
use crate::client_pool::{NodeletClientFactory, NodeletClientPool};
use crate::grpc_services::{
    ActorInfoGcsServiceImpl, GcsServices, HeartbeatInfoGcsServiceImpl, InternalKVGcsServiceImpl,
    InternalPubSubGcsServiceImpl, JobInfoGcsServiceImpl, NodeInfoGcsServiceImpl,
    NodeResourceInfoGcsServiceImpl, ObjectInfoGcsServiceImpl, PlacementGroupInfoGcsServiceImpl,
    StatsGcsServiceImpl, TaskInfoGcsServiceImpl, WorkerInfoGcsServiceImpl,
};
use crate::heartbeat_manager::GcsHeartbeatManager;
use crate::init_data::GcsInitData;
use crate::job_manager::GcsJobManager;
use crate::kv_manager::GcsInternalKVManager;
use crate::node_manager::GcsNodeManager;
use crate::nodelet_client::{GrpcNodeletClient, GrpcWorkerClient, NodeletClient, WorkerClient};
use crate::object_manager::GcsObjectManager;
use crate::placement_group_manager::GcsPlacementGroupManager;
use crate::placement_group_scheduler::GcsPlacementGroupScheduler;
use crate::pubsub::{GcsPublisher, InternalPubSub, StorePubSub};
use crate::resource_broadcaster::GcsResourceBroadcaster;
use crate::resource_manager::GcsResourceManager;
use crate::resource_report_poller::GcsResourceReportPoller;
use crate::resource_scheduler::GcsResourceScheduler;
use crate::rpc_server::{GrpcServer, GrpcServerConfig};
use crate::runtime_env_manager::RuntimeEnvManager;
use crate::stats_handler::GcsStatsHandler;
use crate::store_client::{
    GcsStoreFailureDetector, InMemoryInternalKV, InMemoryStoreClient, InternalKVInterface,
    RedisInternalKV, RedisStoreClient, StoreClient,
};
use crate::table_storage::GcsTableStorage;
use crate::task_manager::GcsTaskManager;
use crate::worker_manager::GcsWorkerManager;

/// KV namespace for cluster-level session keys.
const SESSION_KV_NAMESPACE: &str = "session";

/// Configuration for starting the GCS server.
#[derive(Debug, Clone)]
pub struct GcsServerConfig {
    pub grpc_server_name: String,
    pub grpc_server_port: u16,
    pub grpc_server_thread_num: usize,
    pub node_ip_address: String,
    /// Store URL (e.g. "redis://host:port"). None selects the in-memory
    /// backend.
    pub store_address: Option<String>,
    pub store_password: Option<String>,
    /// Session name namespacing all store keys.
    pub session_name: String,
    pub config: MantleConfig,
}

impl Default for GcsServerConfig {
    fn default() -> Self {
        Self {
            grpc_server_name: "GcsServer".to_string(),
            grpc_server_port: 0,
            grpc_server_thread_num: 1,
            node_ip_address: String::new(),
            store_address: None,
            store_password: None,
            session_name: "default".to_string(),
            config: MantleConfig::default(),
        }
    }
}

pub struct GcsServer {
    config: GcsServerConfig,
    store_client: Arc<dyn StoreClient>,
    kv_manager: Arc<GcsInternalKVManager>,
    publisher: Arc<GcsPublisher>,
    node_manager: Arc<GcsNodeManager>,
    heartbeat_manager: Arc<GcsHeartbeatManager>,
    resource_manager: Arc<GcsResourceManager>,
    job_manager: Arc<GcsJobManager>,
    placement_group_manager: Arc<GcsPlacementGroupManager>,
    actor_manager: Arc<GcsActorManager>,
    object_manager: Arc<GcsObjectManager>,
    worker_manager: Arc<GcsWorkerManager>,
    task_manager: Arc<GcsTaskManager>,
    stats_handler: Arc<GcsStatsHandler>,
    resource_report_poller: Arc<GcsResourceReportPoller>,
    resource_broadcaster: Option<Arc<GcsResourceBroadcaster>>,
    store_failure_detector: Arc<GcsStoreFailureDetector>,
    rpc_server: Arc<GrpcServer>,
    bound_addr: SocketAddr,
    debug_runner: Mutex<Option<PeriodicalRunner>>,
    stats_runner: Mutex<Option<PeriodicalRunner>>,
    is_stopped: AtomicBool,
}

impl GcsServer {
    /// Start a GCS server with real gRPC clients for nodelets and workers.
    pub async fn start(config: GcsServerConfig) -> anyhow::Result<Arc<Self>> {
        let nodelet_factory: NodeletClientFactory =
            Arc::new(|addr| Arc::new(GrpcNodeletClient::new(addr.to_string())) as Arc<dyn NodeletClient>);
        Self::start_with_clients(config, nodelet_factory, Arc::new(GrpcWorkerClient)).await
    }

    /// Start a GCS server with injected outbound clients (used by tests).
    pub async fn start_with_clients(
        config: GcsServerConfig,
        nodelet_factory: NodeletClientFactory,
        worker_client: Arc<dyn WorkerClient>,
    ) -> anyhow::Result<Arc<Self>> {
        // ── Backing store: connect or die. ──────────────────────────
        let (store_client, internal_kv): (Arc<dyn StoreClient>, Arc<dyn InternalKVInterface>) =
            match &config.store_address {
                Some(url) => {
                    let url = match &config.store_password {
                        Some(password) if !password.is_empty() => url
                            .replacen("redis://", &format!("redis://:{password}@"), 1),
                        _ => url.clone(),
                    };
                    let store = Arc::new(RedisStoreClient::new(&url, config.session_name.clone())?);
                    store
                        .ping()
                        .await
                        .map_err(|e| anyhow::anyhow!("failed to connect backing store: {e}"))?;
                    let kv = Arc::new(RedisInternalKV::new(&url, config.session_name.clone())?);
                    (store, kv)
                }
                None => (
                    Arc::new(InMemoryStoreClient::new()),
                    Arc::new(InMemoryInternalKV::new()),
                ),
            };

        // ── Store failure detector: permanent store loss stops the
        // server. The fatal signal is forwarded once the server exists. ──
        let (fatal_tx, fatal_rx) = tokio::sync::oneshot::channel::<()>();
        let fatal_tx = Mutex::new(Some(fatal_tx));
        let store_failure_detector = GcsStoreFailureDetector::new(
            Arc::clone(&store_client),
            config.config.store_reconnect_attempts,
            Arc::new(move || {
                if let Some(tx) = fatal_tx.lock().take() {
                    let _ = tx.send(());
                }
            }),
        );
        store_failure_detector.start(Duration::from_millis(config.config.store_ping_period_ms));

        // ── Event bus. ──────────────────────────────────────────────
        let publisher = Arc::new(if config.config.grpc_pubsub_enabled {
            GcsPublisher::InProcess(Arc::new(InternalPubSub::new()))
        } else {
            match &config.store_address {
                Some(url) => GcsPublisher::Store(
                    StorePubSub::new(url, config.session_name.clone())
                        .map_err(|e| anyhow::anyhow!("failed to init store pubsub: {e}"))?,
                ),
                None => {
                    tracing::warn!("No store pub/sub without a store; using in-process broker");
                    GcsPublisher::InProcess(Arc::new(InternalPubSub::new()))
                }
            }
        });

        // ── Table storage and initial snapshot: load or die. ────────
        let table_storage = Arc::new(GcsTableStorage::new(Arc::clone(&store_client)));
        let init_data = GcsInitData::load(&table_storage)
            .await
            .map_err(|e| anyhow::anyhow!("failed to load initial GCS state: {e}"))?;

        // ── Managers, leaves first. ─────────────────────────────────
        let resource_manager = Arc::new(GcsResourceManager::new(
            !config.config.grpc_based_resource_broadcast,
        ));
        resource_manager.set_publisher(Arc::clone(&publisher));
        resource_manager.initialize(&init_data);

        let resource_scheduler = Arc::new(GcsResourceScheduler::new(Arc::clone(&resource_manager)));

        let node_manager = Arc::new(GcsNodeManager::new(Arc::clone(&table_storage)));
        node_manager.set_publisher(Arc::clone(&publisher));
        node_manager.initialize(&init_data);

        let heartbeat_manager = {
            let node_manager = Arc::clone(&node_manager);
            let main_handle = tokio::runtime::Handle::current();
            GcsHeartbeatManager::new(
                Duration::from_millis(config.config.heartbeat_period_ms),
                config.config.num_heartbeats_timeout,
                // The sweep runs on the heartbeat loop; the membership
                // mutation is posted back onto the main loop.
                Arc::new(move |node_id| {
                    let node_manager = Arc::clone(&node_manager);
                    main_handle.spawn(async move {
                        let _ = node_manager.on_node_failure(&node_id).await;
                    });
                }),
            )
        };
        heartbeat_manager.initialize(&init_data);

        let kv_manager = Arc::new(GcsInternalKVManager::new(internal_kv));
        let runtime_env_manager = Arc::new(RuntimeEnvManager::new(Arc::clone(&kv_manager)));

        let job_manager = Arc::new(GcsJobManager::new(
            Arc::clone(&table_storage),
            Arc::clone(&runtime_env_manager),
        ));
        job_manager.set_publisher(Arc::clone(&publisher));
        job_manager.initialize(&init_data);

        let client_pool = NodeletClientPool::new(nodelet_factory);

        let placement_group_scheduler = Arc::new(GcsPlacementGroupScheduler::new(
            Arc::clone(&node_manager),
            Arc::clone(&resource_scheduler),
            Arc::clone(&resource_manager),
            Arc::clone(&client_pool),
        ));
        let placement_group_manager =
            Arc::new(GcsPlacementGroupManager::new(Arc::clone(&table_storage)));
        placement_group_manager.set_scheduler(placement_group_scheduler);
        placement_group_manager.initialize(&init_data);

        let actor_scheduler = Arc::new(GcsActorScheduler::new(
            Arc::clone(&node_manager),
            Arc::clone(&resource_scheduler),
            Arc::clone(&resource_manager),
            Arc::clone(&client_pool),
            worker_client,
        ));
        let actor_manager = Arc::new(GcsActorManager::new(
            Arc::clone(&table_storage),
            Arc::clone(&resource_manager),
            Arc::clone(&runtime_env_manager),
            {
                let job_manager = Arc::clone(&job_manager);
                Box::new(move |job_id| job_manager.get_namespace(job_id))
            },
            Duration::from_millis(config.config.actor_gc_delay_ms),
        ));
        actor_manager.set_scheduler(actor_scheduler);
        actor_manager.set_publisher(Arc::clone(&publisher));
        actor_manager.initialize(&init_data);

        let object_manager = Arc::new(GcsObjectManager::new());
        object_manager.set_publisher(Arc::clone(&publisher));

        let worker_manager = Arc::new(GcsWorkerManager::new(Arc::clone(&table_storage)));
        worker_manager.set_publisher(Arc::clone(&publisher));

        let task_manager = Arc::new(GcsTaskManager::new());
        let stats_handler = Arc::new(GcsStatsHandler::new());

        let resource_report_poller = {
            let resource_manager = Arc::clone(&resource_manager);
            GcsResourceReportPoller::new(
                Arc::clone(&client_pool),
                Duration::from_millis(config.config.gcs_pull_resource_loads_period_ms),
                Arc::new(move |report| resource_manager.update_from_resource_report(report)),
            )
        };
        resource_report_poller.initialize(&init_data);
        resource_report_poller.start();

        let resource_broadcaster = if config.config.grpc_based_resource_broadcast {
            let resource_manager = Arc::clone(&resource_manager);
            let broadcaster = GcsResourceBroadcaster::new(
                Arc::clone(&client_pool),
                Duration::from_millis(config.config.resource_broadcast_period_ms),
                Arc::new(move || resource_manager.resource_usage_batch_for_broadcast()),
            );
            broadcaster.initialize(&init_data);
            broadcaster.start();
            Some(broadcaster)
        } else {
            None
        };

        // ── Cross-component event wiring. ───────────────────────────
        Self::install_event_listeners(
            &node_manager,
            &heartbeat_manager,
            &resource_manager,
            &placement_group_manager,
            &actor_manager,
            &object_manager,
            &worker_manager,
            &job_manager,
            &resource_report_poller,
            resource_broadcaster.as_ref(),
            &client_pool,
        );

        // ── RPC server: register every service, only now accept calls. ──
        let services = GcsServices {
            job_info: Arc::new(JobInfoGcsServiceImpl {
                job_manager: Arc::clone(&job_manager),
            }),
            node_info: Arc::new(NodeInfoGcsServiceImpl {
                node_manager: Arc::clone(&node_manager),
            }),
            heartbeat_info: Arc::new(HeartbeatInfoGcsServiceImpl {
                heartbeat_manager: Arc::clone(&heartbeat_manager),
            }),
            node_resource_info: Arc::new(NodeResourceInfoGcsServiceImpl {
                resource_manager: Arc::clone(&resource_manager),
            }),
            actor_info: Arc::new(ActorInfoGcsServiceImpl {
                actor_manager: Arc::clone(&actor_manager),
            }),
            placement_group_info: Arc::new(PlacementGroupInfoGcsServiceImpl {
                placement_group_manager: Arc::clone(&placement_group_manager),
            }),
            object_info: Arc::new(ObjectInfoGcsServiceImpl {
                object_manager: Arc::clone(&object_manager),
            }),
            worker_info: Arc::new(WorkerInfoGcsServiceImpl {
                worker_manager: Arc::clone(&worker_manager),
            }),
            task_info: Arc::new(TaskInfoGcsServiceImpl {
                task_manager: Arc::clone(&task_manager),
            }),
            stats: Arc::new(StatsGcsServiceImpl {
                stats_handler: Arc::clone(&stats_handler),
            }),
            internal_kv: Arc::new(InternalKVGcsServiceImpl {
                kv_manager: Arc::clone(&kv_manager),
            }),
            internal_pubsub: publisher.in_process().map(|broker| {
                Arc::new(InternalPubSubGcsServiceImpl {
                    broker: Arc::clone(broker),
                })
            }),
        };
        let rpc_server = Arc::new(GrpcServer::new(GrpcServerConfig {
            name: config.grpc_server_name.clone(),
            port: config.grpc_server_port,
            thread_num: config.grpc_server_thread_num,
        }));
        let bound_addr = rpc_server.run(services).await?;

        // ── Publish the GCS address and cluster id. ─────────────────
        let ip = if config.node_ip_address.is_empty() {
            mantle_util::network::get_local_ip().to_string()
        } else {
            config.node_ip_address.clone()
        };
        let gcs_address = format!("{}:{}", ip, bound_addr.port());
        kv_manager
            .handle_put(
                SESSION_KV_NAMESPACE,
                GCS_SERVER_ADDRESS_KEY,
                gcs_address.clone().into_bytes(),
                true,
            )
            .await
            .map_err(|e| anyhow::anyhow!("failed to publish GCS address: {e}"))?;
        tracing::info!(%gcs_address, "GCS server address published");

        let cluster_id = match kv_manager
            .handle_get(SESSION_KV_NAMESPACE, CLUSTER_ID_KEY)
            .await
        {
            Ok(Some(existing)) => existing,
            _ => {
                let fresh = ClusterID::from_random().binary();
                let _ = kv_manager
                    .handle_put(SESSION_KV_NAMESPACE, CLUSTER_ID_KEY, fresh.clone(), false)
                    .await;
                fresh
            }
        };
        node_manager.set_cluster_id(cluster_id);

        // ── Heartbeat manager starts strictly after the RPC server so
        // nodes can re-register before their first deadline. ──────────
        heartbeat_manager.start();

        let server = Arc::new(Self {
            config,
            store_client,
            kv_manager,
            publisher,
            node_manager,
            heartbeat_manager,
            resource_manager,
            job_manager,
            placement_group_manager,
            actor_manager,
            object_manager,
            worker_manager,
            task_manager,
            stats_handler,
            resource_report_poller,
            resource_broadcaster,
            store_failure_detector,
            rpc_server,
            bound_addr,
            debug_runner: Mutex::new(None),
            stats_runner: Mutex::new(None),
            is_stopped: AtomicBool::new(false),
        });

        // Forward a fatal store failure into a server stop.
        {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                if fatal_rx.await.is_ok() {
                    server.stop().await;
                }
            });
        }

        server.start_periodic_tasks();
        tracing::info!(addr = %server.bound_addr, "GCS server started");
        Ok(server)
    }

    #[allow(clippy::too_many_arguments)]
    fn install_event_listeners(
        node_manager: &Arc<GcsNodeManager>,
        heartbeat_manager: &Arc<GcsHeartbeatManager>,
        resource_manager: &Arc<GcsResourceManager>,
        placement_group_manager: &Arc<GcsPlacementGroupManager>,
        actor_manager: &Arc<GcsActorManager>,
        object_manager: &Arc<GcsObjectManager>,
        worker_manager: &Arc<GcsWorkerManager>,
        job_manager: &Arc<GcsJobManager>,
        resource_report_poller: &Arc<GcsResourceReportPoller>,
        resource_broadcaster: Option<&Arc<GcsResourceBroadcaster>>,
        client_pool: &Arc<NodeletClientPool>,
    ) {
        // A new node can host pending placement groups and actors.
        {
            let resource_manager = Arc::clone(resource_manager);
            let placement_group_manager = Arc::clone(placement_group_manager);
            let actor_manager = Arc::clone(actor_manager);
            let heartbeat_manager = Arc::clone(heartbeat_manager);
            let resource_report_poller = Arc::clone(resource_report_poller);
            let resource_broadcaster = resource_broadcaster.map(Arc::clone);
            node_manager.add_node_added_listener(Box::new(move |node| {
                resource_manager.on_node_add(node);
                heartbeat_manager.add_node(NodeID::try_from_binary(&node.node_id));
                resource_report_poller.handle_node_added(node);
                if let Some(broadcaster) = &resource_broadcaster {
                    broadcaster.handle_node_added(node);
                }
                placement_group_manager.schedule_pending_placement_groups();
                actor_manager.schedule_pending_actors();
            }));
        }

        // A dead node invalidates everything placed on it.
        {
            let resource_manager = Arc::clone(resource_manager);
            let placement_group_manager = Arc::clone(placement_group_manager);
            let actor_manager = Arc::clone(actor_manager);
            let object_manager = Arc::clone(object_manager);
            let heartbeat_manager = Arc::clone(heartbeat_manager);
            let resource_report_poller = Arc::clone(resource_report_poller);
            let resource_broadcaster = resource_broadcaster.map(Arc::clone);
            let client_pool = Arc::clone(client_pool);
            node_manager.add_node_removed_listener(Box::new(move |node| {
                let node_id = NodeID::try_from_binary(&node.node_id);
                resource_manager.on_node_dead(&node_id);
                heartbeat_manager.remove_node(&node_id);
                client_pool.disconnect(&node_id);
                resource_report_poller.handle_node_removed(&node_id);
                if let Some(broadcaster) = &resource_broadcaster {
                    broadcaster.handle_node_removed(&node_id);
                }
                object_manager.on_node_removed(&node_id);
                // Lifecycle reactions do store I/O; post them as follow-ups.
                let placement_group_manager = Arc::clone(&placement_group_manager);
                let actor_manager = Arc::clone(&actor_manager);
                tokio::spawn(async move {
                    placement_group_manager.on_node_dead(&node_id).await;
                    actor_manager.on_node_dead(&node_id).await;
                });
            }));
        }

        // A dead worker takes its actors with it.
        {
            let actor_manager = Arc::clone(actor_manager);
            worker_manager.add_worker_dead_listener(Box::new(move |worker_data| {
                let Some(address) = &worker_data.worker_address else {
                    return;
                };
                let node_id = NodeID::try_from_binary(&address.node_id);
                let worker_id = WorkerID::try_from_binary(&address.worker_id);
                let creation_exception = worker_data.creation_task_exception.clone();
                let actor_manager = Arc::clone(&actor_manager);
                tokio::spawn(async move {
                    actor_manager
                        .on_worker_dead(&node_id, &worker_id, creation_exception)
                        .await;
                });
            }));
        }

        // A finished job takes its non-detached actors and groups with it.
        {
            let actor_manager = Arc::clone(actor_manager);
            let placement_group_manager = Arc::clone(placement_group_manager);
            job_manager.add_job_finished_listener(Box::new(move |job_id| {
                let job_id = *job_id;
                let actor_manager = Arc::clone(&actor_manager);
                let placement_group_manager = Arc::clone(&placement_group_manager);
                tokio::spawn(async move {
                    actor_manager.on_job_finished(&job_id).await;
                    placement_group_manager
                        .clean_placement_group_if_needed_when_job_dead(&job_id)
                        .await;
                });
            }));
        }

        // A dead actor may own a placement group.
        {
            let placement_group_manager = Arc::clone(placement_group_manager);
            actor_manager.add_destroy_listener(Box::new(move |actor_id| {
                let actor_id = *actor_id;
                let placement_group_manager = Arc::clone(&placement_group_manager);
                tokio::spawn(async move {
                    placement_group_manager
                        .clean_placement_group_if_needed_when_actor_dead(&actor_id)
                        .await;
                });
            }));
        }
    }

    fn start_periodic_tasks(self: &Arc<Self>) {
        if self.config.config.debug_dump_period_ms > 0 {
            let server = Arc::clone(self);
            let runner = PeriodicalRunner::start(
                Duration::from_millis(self.config.config.debug_dump_period_ms),
                move || {
                    tracing::info!("{}", server.debug_string());
                },
            );
            *self.debug_runner.lock() = Some(runner);
        }

        if self.config.config.event_stats && self.config.config.metrics_report_interval_ms > 0 {
            let server = Arc::clone(self);
            let runner = PeriodicalRunner::start(
                Duration::from_millis(self.config.config.metrics_report_interval_ms),
                move || {
                    tracing::debug!(
                        actors = ?server.actor_manager.state_counts(),
                        placement_groups = ?server.placement_group_manager.state_counts(),
                        "GCS state counts"
                    );
                },
            );
            *self.stats_runner.lock() = Some(runner);
        }
    }

    /// Stop the server. Idempotent. The heartbeat manager stops before the
    /// RPC server drains so live nodes are not marked dead meanwhile.
    pub async fn stop(&self) {
        if self.is_stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("Stopping GCS server");

        self.heartbeat_manager.stop();
        self.resource_report_poller.stop();
        if let Some(broadcaster) = &self.resource_broadcaster {
            broadcaster.stop();
        }
        self.rpc_server.shutdown().await;

        if let Some(mut runner) = self.debug_runner.lock().take() {
            runner.stop();
        }
        if let Some(mut runner) = self.stats_runner.lock().take() {
            runner.stop();
        }
        self.store_failure_detector.stop();

        tracing::info!("GCS server stopped");
    }

    pub fn debug_string(&self) -> String {
        let mut parts = vec![
            self.node_manager.debug_string(),
            self.resource_manager.debug_string(),
            self.job_manager.debug_string(),
            self.actor_manager.debug_string(),
            self.placement_group_manager.debug_string(),
            self.object_manager.debug_string(),
            self.worker_manager.debug_string(),
            self.task_manager.debug_string(),
            self.resource_report_poller.debug_string(),
        ];
        if let Some(broadcaster) = &self.resource_broadcaster {
            parts.push(broadcaster.debug_string());
        }
        parts.join("\n")
    }

    // ── Accessors used by the RPC service impls and tests. ───────────

    pub fn bound_addr(&self) -> SocketAddr {
        self.bound_addr
    }

    pub fn store_client(&self) -> &Arc<dyn StoreClient> {
        &self.store_client
    }

    pub fn kv_manager(&self) -> &Arc<GcsInternalKVManager> {
        &self.kv_manager
    }

    pub fn publisher(&self) -> &Arc<GcsPublisher> {
        &self.publisher
    }

    pub fn node_manager(&self) -> &Arc<GcsNodeManager> {
        &self.node_manager
    }

    pub fn heartbeat_manager(&self) -> &Arc<GcsHeartbeatManager> {
        &self.heartbeat_manager
    }

    pub fn resource_manager(&self) -> &Arc<GcsResourceManager> {
        &self.resource_manager
    }

    pub fn job_manager(&self) -> &Arc<GcsJobManager> {
        &self.job_manager
    }

    pub fn placement_group_manager(&self) -> &Arc<GcsPlacementGroupManager> {
        &self.placement_group_manager
    }

    pub fn actor_manager(&self) -> &Arc<GcsActorManager> {
        &self.actor_manager
    }

    pub fn object_manager(&self) -> &Arc<GcsObjectManager> {
        &self.object_manager
    }

    pub fn worker_manager(&self) -> &Arc<GcsWorkerManager> {
        &self.worker_manager
    }

    pub fn task_manager(&self) -> &Arc<GcsTaskManager> {
        &self.task_manager
    }

    pub fn stats_handler(&self) -> &Arc<GcsStatsHandler> {
        &self.stats_handler
    }
}
