// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Global Control Store (GCS) server for Mantle.
//!
//! The GCS is the cluster-wide authoritative control plane: it tracks
//! membership (nodes, workers), owns the lifecycle of jobs, actors and
//! placement groups, mediates cluster-wide resource accounting and
//! scheduling, and fans cluster events out through publish/subscribe.

pub mod actor_manager;
pub mod actor_scheduler;
pub mod client_pool;
pub mod grpc_services;
pub mod heartbeat_manager;
pub mod init_data;
pub mod job_manager;
pub mod kv_manager;
pub mod node_manager;
pub mod nodelet_client;
pub mod object_manager;
pub mod placement_group_manager;
pub mod placement_group_scheduler;
pub mod pubsub;
pub mod resource_broadcaster;
pub mod resource_manager;
pub mod resource_report_poller;
pub mod resource_scheduler;
pub mod rpc_server;
pub mod runtime_env_manager;
pub mod server;
pub mod stats_handler;
pub mod store_client;
pub mod table_storage;
pub mod task_manager;
pub mod worker_manager;
