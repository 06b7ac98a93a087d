// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS record and RPC message definitions.
//!
//! IDs travel as raw binary bytes; maps of resource name to quantity use
//! doubles and are converted to fixed-point at the scheduling boundary.

use std::collections::HashMap;

// ─── Enums ──────────────────────────────────────────────────────────────────

/// Lifecycle state of a cluster node. DEAD is terminal: a restarted
/// physical host joins under a fresh node id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum NodeState {
    Alive = 0,
    Dead = 1,
}

/// Lifecycle state of an actor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ActorState {
    DependenciesUnready = 0,
    PendingCreation = 1,
    Alive = 2,
    Restarting = 3,
    Dead = 4,
}

/// Co-location strategy of a placement group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PlacementStrategy {
    Pack = 0,
    Spread = 1,
    StrictPack = 2,
    StrictSpread = 3,
}

/// Lifecycle state of a placement group.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum PlacementGroupState {
    Pending = 0,
    Created = 1,
    Removed = 2,
    Rescheduling = 3,
}

/// How a worker process exited.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WorkerExitType {
    IdleExit = 0,
    IntendedSystemExit = 1,
    UserError = 2,
    SystemError = 3,
    NodeOutOfMemory = 4,
    CreationTaskError = 5,
}

/// Pub/sub channels fanned out by the GCS.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ChannelType {
    NodeInfoChannel = 0,
    JobChannel = 1,
    ActorChannel = 2,
    WorkerDeltaChannel = 3,
    ObjectLocationChannel = 4,
    NodeResourceUsageChannel = 5,
    ErrorInfoChannel = 6,
}

// ─── Common records ─────────────────────────────────────────────────────────

/// Network address of a worker or driver process.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Address {
    #[prost(bytes = "vec", tag = "1")]
    pub node_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub ip_address: String,
    #[prost(int32, tag = "3")]
    pub port: i32,
    #[prost(bytes = "vec", tag = "4")]
    pub worker_id: Vec<u8>,
}

/// Exception captured when an actor's creation task fails on a worker.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ExceptionData {
    #[prost(string, tag = "1")]
    pub error_message: String,
    #[prost(string, tag = "2")]
    pub traceback: String,
}

// ─── Node ───────────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NodeInfo {
    #[prost(bytes = "vec", tag = "1")]
    pub node_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub node_name: String,
    /// Address of the node's local manager (nodelet).
    #[prost(string, tag = "3")]
    pub nodelet_address: String,
    #[prost(int32, tag = "4")]
    pub nodelet_port: i32,
    /// Resources advertised by the node at registration time.
    #[prost(map = "string, double", tag = "5")]
    pub resources_total: HashMap<String, f64>,
    #[prost(enumeration = "NodeState", tag = "6")]
    pub state: i32,
    #[prost(map = "string, string", tag = "7")]
    pub labels: HashMap<String, String>,
    #[prost(uint64, tag = "8")]
    pub start_time_ms: u64,
    #[prost(uint64, tag = "9")]
    pub end_time_ms: u64,
}

// ─── Job ────────────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JobConfig {
    /// Visibility scope for named actors created by this job.
    #[prost(string, tag = "1")]
    pub namespace: String,
    #[prost(map = "string, string", tag = "2")]
    pub metadata: HashMap<String, String>,
    #[prost(string, repeated, tag = "3")]
    pub runtime_env_uris: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct JobTableData {
    #[prost(bytes = "vec", tag = "1")]
    pub job_id: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub is_dead: bool,
    #[prost(message, optional, tag = "3")]
    pub driver_address: Option<Address>,
    #[prost(message, optional, tag = "4")]
    pub config: Option<JobConfig>,
    #[prost(uint64, tag = "5")]
    pub start_time: u64,
    #[prost(uint64, tag = "6")]
    pub end_time: u64,
}

// ─── Actor ──────────────────────────────────────────────────────────────────

/// Registration payload describing how to create an actor.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActorCreationSpec {
    #[prost(bytes = "vec", tag = "1")]
    pub actor_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub job_id: Vec<u8>,
    #[prost(string, tag = "3")]
    pub name: String,
    /// Empty means "resolve from the owning job's config".
    #[prost(string, tag = "4")]
    pub namespace: String,
    #[prost(bool, tag = "5")]
    pub is_detached: bool,
    /// -1 means unlimited restarts.
    #[prost(int64, tag = "6")]
    pub max_restarts: i64,
    #[prost(map = "string, double", tag = "7")]
    pub required_resources: HashMap<String, f64>,
    #[prost(bytes = "vec", tag = "8")]
    pub placement_group_id: Vec<u8>,
    #[prost(message, optional, tag = "9")]
    pub owner_address: Option<Address>,
    #[prost(string, repeated, tag = "10")]
    pub runtime_env_uris: Vec<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ActorTableData {
    #[prost(bytes = "vec", tag = "1")]
    pub actor_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub job_id: Vec<u8>,
    #[prost(enumeration = "ActorState", tag = "3")]
    pub state: i32,
    #[prost(string, tag = "4")]
    pub name: String,
    #[prost(string, tag = "5")]
    pub namespace: String,
    /// Address of the worker currently hosting the actor.
    #[prost(message, optional, tag = "6")]
    pub address: Option<Address>,
    /// Node currently hosting the actor; absent while unplaced.
    #[prost(bytes = "vec", optional, tag = "7")]
    pub node_id: Option<Vec<u8>>,
    #[prost(uint32, tag = "8")]
    pub pid: u32,
    #[prost(int64, tag = "9")]
    pub max_restarts: i64,
    #[prost(int64, tag = "10")]
    pub num_restarts: i64,
    #[prost(bool, tag = "11")]
    pub is_detached: bool,
    #[prost(map = "string, double", tag = "12")]
    pub required_resources: HashMap<String, f64>,
    #[prost(bytes = "vec", tag = "13")]
    pub placement_group_id: Vec<u8>,
    #[prost(string, tag = "14")]
    pub death_cause: String,
    #[prost(message, optional, tag = "15")]
    pub creation_task_exception: Option<ExceptionData>,
    #[prost(message, optional, tag = "16")]
    pub owner_address: Option<Address>,
}

// ─── Placement group ────────────────────────────────────────────────────────

/// One indivisible resource unit of a placement group.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Bundle {
    #[prost(int64, tag = "1")]
    pub bundle_index: i64,
    #[prost(map = "string, double", tag = "2")]
    pub resources: HashMap<String, f64>,
    /// Node the bundle is bound to; empty while unbound.
    #[prost(bytes = "vec", tag = "3")]
    pub node_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PlacementGroupTableData {
    #[prost(bytes = "vec", tag = "1")]
    pub placement_group_id: Vec<u8>,
    #[prost(string, tag = "2")]
    pub name: String,
    #[prost(string, tag = "3")]
    pub namespace: String,
    #[prost(enumeration = "PlacementStrategy", tag = "4")]
    pub strategy: i32,
    #[prost(enumeration = "PlacementGroupState", tag = "5")]
    pub state: i32,
    #[prost(message, repeated, tag = "6")]
    pub bundles: Vec<Bundle>,
    #[prost(bytes = "vec", tag = "7")]
    pub creator_job_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "8")]
    pub creator_actor_id: Vec<u8>,
    #[prost(bool, tag = "9")]
    pub is_detached: bool,
    #[prost(uint64, tag = "10")]
    pub creation_time_ms: u64,
}

// ─── Worker ─────────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WorkerTableData {
    #[prost(message, optional, tag = "1")]
    pub worker_address: Option<Address>,
    #[prost(enumeration = "WorkerExitType", optional, tag = "2")]
    pub exit_type: Option<i32>,
    #[prost(bool, tag = "3")]
    pub is_alive: bool,
    #[prost(uint32, tag = "4")]
    pub pid: u32,
    #[prost(message, optional, tag = "5")]
    pub creation_task_exception: Option<ExceptionData>,
    #[prost(uint64, tag = "6")]
    pub timestamp: u64,
}

// ─── Object locations ───────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ObjectLocationInfo {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
    #[prost(bytes = "vec", repeated, tag = "2")]
    pub node_ids: Vec<Vec<u8>>,
    #[prost(uint64, tag = "3")]
    pub size: u64,
    #[prost(string, tag = "4")]
    pub spilled_url: String,
}

// ─── Resources ──────────────────────────────────────────────────────────────

/// Periodic per-node resource report.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResourcesData {
    #[prost(bytes = "vec", tag = "1")]
    pub node_id: Vec<u8>,
    #[prost(map = "string, double", tag = "2")]
    pub resources_total: HashMap<String, f64>,
    #[prost(map = "string, double", tag = "3")]
    pub resources_available: HashMap<String, f64>,
    #[prost(map = "string, double", tag = "4")]
    pub resource_load: HashMap<String, f64>,
    #[prost(bool, tag = "5")]
    pub resources_available_changed: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ResourceUsageBatchData {
    #[prost(message, repeated, tag = "1")]
    pub batch: Vec<ResourcesData>,
}

// ─── Pub/sub ────────────────────────────────────────────────────────────────

/// Envelope published on the event bus. `payload` is the prost-encoded
/// record for the channel (NodeInfo, ActorTableData, ...).
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PubMessage {
    #[prost(enumeration = "ChannelType", tag = "1")]
    pub channel_type: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub key_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub payload: Vec<u8>,
    #[prost(int64, tag = "4")]
    pub sequence_id: i64,
}

// ─── Task / stats records ───────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct TaskEventData {
    #[prost(bytes = "vec", tag = "1")]
    pub task_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub job_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub node_id: Vec<u8>,
    #[prost(string, tag = "4")]
    pub state: String,
    #[prost(uint64, tag = "5")]
    pub start_time_ms: u64,
    #[prost(uint64, tag = "6")]
    pub end_time_ms: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProfileEventData {
    #[prost(string, tag = "1")]
    pub component_type: String,
    #[prost(bytes = "vec", tag = "2")]
    pub component_id: Vec<u8>,
    #[prost(string, tag = "3")]
    pub node_ip_address: String,
    #[prost(string, tag = "4")]
    pub events_json: String,
}

// ─── JobInfo service ────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddJobRequest {
    #[prost(message, optional, tag = "1")]
    pub data: Option<JobTableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddJobReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MarkJobFinishedRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub job_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct MarkJobFinishedReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllJobInfoRequest {
    #[prost(int64, optional, tag = "1")]
    pub limit: Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllJobInfoReply {
    #[prost(message, repeated, tag = "1")]
    pub job_info_list: Vec<JobTableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetNextJobIdRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetNextJobIdReply {
    #[prost(int32, tag = "1")]
    pub job_id: i32,
}

// ─── NodeInfo service ───────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterNodeRequest {
    #[prost(message, optional, tag = "1")]
    pub node_info: Option<NodeInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterNodeReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UnregisterNodeRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub node_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UnregisterNodeReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllNodeInfoRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllNodeInfoReply {
    #[prost(message, repeated, tag = "1")]
    pub node_info_list: Vec<NodeInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetClusterIdRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetClusterIdReply {
    #[prost(bytes = "vec", tag = "1")]
    pub cluster_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DrainNodeRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub node_id: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub deadline_ms: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct DrainNodeReply {}

// ─── HeartbeatInfo service ──────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportHeartbeatRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub node_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportHeartbeatReply {}

// ─── NodeResourceInfo service ───────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportResourceUsageRequest {
    #[prost(message, optional, tag = "1")]
    pub resources: Option<ResourcesData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportResourceUsageReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllAvailableResourcesRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllAvailableResourcesReply {
    #[prost(message, repeated, tag = "1")]
    pub resources_list: Vec<ResourcesData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllResourceUsageRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllResourceUsageReply {
    #[prost(message, optional, tag = "1")]
    pub resource_usage_data: Option<ResourceUsageBatchData>,
}

// ─── ActorInfo service ──────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterActorRequest {
    #[prost(message, optional, tag = "1")]
    pub spec: Option<ActorCreationSpec>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RegisterActorReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateActorRequest {
    #[prost(message, optional, tag = "1")]
    pub spec: Option<ActorCreationSpec>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreateActorReply {
    #[prost(message, optional, tag = "1")]
    pub actor_address: Option<Address>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetActorInfoRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub actor_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetActorInfoReply {
    #[prost(message, optional, tag = "1")]
    pub actor_table_data: Option<ActorTableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetNamedActorInfoRequest {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub namespace: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetNamedActorInfoReply {
    #[prost(message, optional, tag = "1")]
    pub actor_table_data: Option<ActorTableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct NamedActorEntry {
    #[prost(string, tag = "1")]
    pub namespace: String,
    #[prost(string, tag = "2")]
    pub name: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListNamedActorsRequest {
    #[prost(string, tag = "1")]
    pub namespace: String,
    #[prost(bool, tag = "2")]
    pub all_namespaces: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListNamedActorsReply {
    #[prost(message, repeated, tag = "1")]
    pub named_actors: Vec<NamedActorEntry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllActorInfoRequest {
    #[prost(int64, optional, tag = "1")]
    pub limit: Option<i64>,
    #[prost(enumeration = "ActorState", optional, tag = "2")]
    pub state_filter: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllActorInfoReply {
    #[prost(message, repeated, tag = "1")]
    pub actor_table_data: Vec<ActorTableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KillActorRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub actor_id: Vec<u8>,
    #[prost(bool, tag = "2")]
    pub force_kill: bool,
    #[prost(bool, tag = "3")]
    pub no_restart: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KillActorReply {}

// ─── PlacementGroupInfo service ─────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreatePlacementGroupRequest {
    #[prost(message, optional, tag = "1")]
    pub data: Option<PlacementGroupTableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CreatePlacementGroupReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemovePlacementGroupRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub placement_group_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemovePlacementGroupReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPlacementGroupRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub placement_group_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetPlacementGroupReply {
    #[prost(message, optional, tag = "1")]
    pub placement_group_table_data: Option<PlacementGroupTableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllPlacementGroupRequest {
    #[prost(int64, optional, tag = "1")]
    pub limit: Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllPlacementGroupReply {
    #[prost(message, repeated, tag = "1")]
    pub placement_group_table_data: Vec<PlacementGroupTableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WaitPlacementGroupUntilReadyRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub placement_group_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WaitPlacementGroupUntilReadyReply {}

// ─── ObjectInfo service ─────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddObjectLocationRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub node_id: Vec<u8>,
    #[prost(uint64, tag = "3")]
    pub size: u64,
    #[prost(string, tag = "4")]
    pub spilled_url: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddObjectLocationReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoveObjectLocationRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub node_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RemoveObjectLocationReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetObjectLocationsRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub object_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetObjectLocationsReply {
    #[prost(message, optional, tag = "1")]
    pub location_info: Option<ObjectLocationInfo>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllObjectLocationsRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllObjectLocationsReply {
    #[prost(message, repeated, tag = "1")]
    pub location_info_list: Vec<ObjectLocationInfo>,
}

// ─── WorkerInfo service ─────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportWorkerFailureRequest {
    #[prost(message, optional, tag = "1")]
    pub worker_failure: Option<WorkerTableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ReportWorkerFailureReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddWorkerInfoRequest {
    #[prost(message, optional, tag = "1")]
    pub worker_data: Option<WorkerTableData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddWorkerInfoReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllWorkerInfoRequest {
    #[prost(int64, optional, tag = "1")]
    pub limit: Option<i64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetAllWorkerInfoReply {
    #[prost(message, repeated, tag = "1")]
    pub worker_table_data: Vec<WorkerTableData>,
}

// ─── TaskInfo / Stats services ──────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecordTaskEventsRequest {
    #[prost(message, repeated, tag = "1")]
    pub events: Vec<TaskEventData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RecordTaskEventsReply {
    #[prost(int64, tag = "1")]
    pub num_dropped: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddProfileDataRequest {
    #[prost(message, optional, tag = "1")]
    pub profile_data: Option<ProfileEventData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct AddProfileDataReply {}

// ─── InternalKV service ─────────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalKvGetRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub namespace: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalKvGetReply {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub value: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalKvPutRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub namespace: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
    #[prost(bytes = "vec", tag = "3")]
    pub value: Vec<u8>,
    #[prost(bool, tag = "4")]
    pub overwrite: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalKvPutReply {
    #[prost(bool, tag = "1")]
    pub added: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalKvDelRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub namespace: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
    #[prost(bool, tag = "3")]
    pub del_by_prefix: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalKvDelReply {
    #[prost(int64, tag = "1")]
    pub deleted_num: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalKvExistsRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub namespace: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub key: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalKvExistsReply {
    #[prost(bool, tag = "1")]
    pub exists: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalKvKeysRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub namespace: Vec<u8>,
    #[prost(bytes = "vec", tag = "2")]
    pub prefix: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InternalKvKeysReply {
    #[prost(bytes = "vec", repeated, tag = "1")]
    pub results: Vec<Vec<u8>>,
}

// ─── InternalPubSub service ─────────────────────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GcsSubscribeRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub subscriber_id: Vec<u8>,
    #[prost(enumeration = "ChannelType", tag = "2")]
    pub channel_type: i32,
    /// Empty subscribes to every key on the channel.
    #[prost(bytes = "vec", tag = "3")]
    pub key_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GcsSubscribeReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GcsUnsubscribeRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub subscriber_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GcsUnsubscribeReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GcsSubscriberPollRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub subscriber_id: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub max_processed_sequence_id: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GcsSubscriberPollReply {
    #[prost(message, repeated, tag = "1")]
    pub pub_messages: Vec<PubMessage>,
}

// ─── Nodelet-facing messages (GCS as client) ────────────────────────────────

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RequestWorkerLeaseRequest {
    #[prost(message, optional, tag = "1")]
    pub spec: Option<ActorCreationSpec>,
    #[prost(bytes = "vec", tag = "2")]
    pub lease_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct RequestWorkerLeaseReply {
    /// Granted worker; absent when spilled back or failed.
    #[prost(message, optional, tag = "1")]
    pub worker_address: Option<Address>,
    #[prost(uint32, tag = "2")]
    pub worker_pid: u32,
    /// Redirect target when the nodelet spills the lease elsewhere.
    #[prost(message, optional, tag = "3")]
    pub retry_at_nodelet_address: Option<Address>,
    #[prost(bool, tag = "4")]
    pub rejected: bool,
    #[prost(bool, tag = "5")]
    pub canceled: bool,
    #[prost(string, tag = "6")]
    pub failure_message: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartActorRequest {
    #[prost(message, optional, tag = "1")]
    pub spec: Option<ActorCreationSpec>,
    #[prost(bytes = "vec", tag = "2")]
    pub intended_worker_id: Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct StartActorReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrepareBundleRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub placement_group_id: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub bundle_index: i64,
    #[prost(map = "string, double", tag = "3")]
    pub resources: HashMap<String, f64>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PrepareBundleReply {
    #[prost(bool, tag = "1")]
    pub success: bool,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommitBundleRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub placement_group_id: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub bundle_index: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CommitBundleReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CancelBundleRequest {
    #[prost(bytes = "vec", tag = "1")]
    pub placement_group_id: Vec<u8>,
    #[prost(int64, tag = "2")]
    pub bundle_index: i64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CancelBundleReply {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResourceLoadRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResourceLoadReply {
    #[prost(message, optional, tag = "1")]
    pub resources: Option<ResourcesData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateResourceUsageRequest {
    #[prost(message, optional, tag = "1")]
    pub batch: Option<ResourceUsageBatchData>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct UpdateResourceUsageReply {}
