// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Actor Manager — actor lifecycle across the cluster.
//!
//! State machine: DEPENDENCIES_UNREADY → PENDING_CREATION → ALIVE ↔
//! RESTARTING → DEAD. Actors that cannot be placed park in a pending queue
//! drained on every NodeAdded; scheduling infeasibility never surfaces to
//! the client, which just keeps seeing a pending creation. Dead-actor
//! metadata is garbage collected after a delay by a cancellable timer.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tonic::Status;

use mantle_common::id::{ActorID, JobID, NodeID, WorkerID};
use mantle_common::scheduling::ResourceSet;
use mantle_proto::rpc;
use mantle_proto::rpc::{ActorState, ChannelType};
use mantle_util::backoff::ExponentialBackoff;

use crate::actor_scheduler::{GcsActorScheduler, ScheduleError};
use crate::init_data::GcsInitData;
use crate::pubsub::GcsPublisher;
use crate::resource_manager::GcsResourceManager;
use crate::runtime_env_manager::RuntimeEnvManager;
use crate::table_storage::GcsTableStorage;

/// Resolves the actor-name namespace of a job (wired to the job manager).
pub type NamespaceResolver = Box<dyn Fn(&JobID) -> String + Send + Sync>;
/// Callback invoked after an actor is destroyed (placement-group cleanup).
pub type ActorDestroyCallback = Box<dyn Fn(&ActorID) + Send + Sync>;

/// RPC-failure retries before an actor is parked to wait for a new node.
const MAX_SCHEDULE_RPC_RETRIES: u32 = 3;

fn actor_state(record: &rpc::ActorTableData) -> ActorState {
    ActorState::try_from(record.state).unwrap_or(ActorState::Dead)
}

pub struct GcsActorManager {
    /// All non-dead actors.
    registered_actors: RwLock<HashMap<ActorID, rpc::ActorTableData>>,
    /// Creation payloads kept for (re)scheduling.
    creation_specs: RwLock<HashMap<ActorID, rpc::ActorCreationSpec>>,
    /// (namespace, name) → actor id.
    named_actors: RwLock<HashMap<(String, String), ActorID>>,
    /// Dead actors kept for queries until their GC timer fires.
    dead_actors: RwLock<HashMap<ActorID, rpc::ActorTableData>>,
    /// node_id → actors placed there.
    actors_by_node: RwLock<HashMap<NodeID, Vec<ActorID>>>,
    /// Actors waiting for a feasible node.
    pending_actors: Mutex<VecDeque<ActorID>>,
    /// Clients waiting for CreateActor to resolve.
    #[allow(clippy::type_complexity)]
    create_callbacks:
        RwLock<HashMap<ActorID, Vec<oneshot::Sender<Result<rpc::CreateActorReply, Status>>>>>,
    /// Dead-actor metadata GC timers, cancelled on re-registration.
    gc_timers: Mutex<HashMap<ActorID, tokio::task::JoinHandle<()>>>,
    state_counts: RwLock<HashMap<ActorState, usize>>,
    destroy_listeners: RwLock<Vec<ActorDestroyCallback>>,
    namespace_resolver: NamespaceResolver,
    actor_gc_delay: Duration,
    table_storage: Arc<GcsTableStorage>,
    resource_manager: Arc<GcsResourceManager>,
    runtime_env_manager: Arc<RuntimeEnvManager>,
    scheduler: RwLock<Option<Arc<GcsActorScheduler>>>,
    publisher: RwLock<Option<Arc<GcsPublisher>>>,
}

impl GcsActorManager {
    pub fn new(
        table_storage: Arc<GcsTableStorage>,
        resource_manager: Arc<GcsResourceManager>,
        runtime_env_manager: Arc<RuntimeEnvManager>,
        namespace_resolver: NamespaceResolver,
        actor_gc_delay: Duration,
    ) -> Self {
        Self {
            registered_actors: RwLock::new(HashMap::new()),
            creation_specs: RwLock::new(HashMap::new()),
            named_actors: RwLock::new(HashMap::new()),
            dead_actors: RwLock::new(HashMap::new()),
            actors_by_node: RwLock::new(HashMap::new()),
            pending_actors: Mutex::new(VecDeque::new()),
            create_callbacks: RwLock::new(HashMap::new()),
            gc_timers: Mutex::new(HashMap::new()),
            state_counts: RwLock::new(HashMap::new()),
            destroy_listeners: RwLock::new(Vec::new()),
            namespace_resolver,
            actor_gc_delay,
            table_storage,
            resource_manager,
            runtime_env_manager,
            scheduler: RwLock::new(None),
            publisher: RwLock::new(None),
        }
    }

    /// Set the actor scheduler (called during server initialization).
    pub fn set_scheduler(&self, scheduler: Arc<GcsActorScheduler>) {
        *self.scheduler.write() = Some(scheduler);
    }

    /// Set the event-bus publisher (called during server initialization).
    pub fn set_publisher(&self, publisher: Arc<GcsPublisher>) {
        *self.publisher.write() = Some(publisher);
    }

    /// Register a listener notified after an actor is destroyed.
    pub fn add_destroy_listener(&self, callback: ActorDestroyCallback) {
        self.destroy_listeners.write().push(callback);
    }

    fn publish_actor(&self, record: &rpc::ActorTableData) {
        if let Some(ref publisher) = *self.publisher.read() {
            publisher.publish(ChannelType::ActorChannel, record.actor_id.clone(), record);
        }
    }

    fn bump_state_count(&self, from: Option<ActorState>, to: ActorState) {
        let mut counts = self.state_counts.write();
        if let Some(from) = from {
            if let Some(c) = counts.get_mut(&from) {
                *c = c.saturating_sub(1);
            }
        }
        *counts.entry(to).or_insert(0) += 1;
    }

    /// Rebuild actor state from the initial snapshot. Actors that were mid
    /// placement re-enter the pending queue; their creation payloads are
    /// reconstructed from the persisted records.
    pub fn initialize(&self, init_data: &GcsInitData) {
        let mut registered = self.registered_actors.write();
        let mut specs = self.creation_specs.write();
        let mut named = self.named_actors.write();
        let mut dead = self.dead_actors.write();
        let mut counts = self.state_counts.write();
        let mut by_node = self.actors_by_node.write();
        let mut pending = self.pending_actors.lock();

        for (actor_id, record) in &init_data.actors {
            let state = actor_state(record);
            *counts.entry(state).or_insert(0) += 1;
            if state == ActorState::Dead {
                dead.insert(*actor_id, record.clone());
                continue;
            }
            if !record.name.is_empty() {
                named.insert((record.namespace.clone(), record.name.clone()), *actor_id);
            }
            if let Some(node_id_bytes) = &record.node_id {
                let node_id = NodeID::try_from_binary(node_id_bytes);
                by_node.entry(node_id).or_default().push(*actor_id);
            }
            specs.insert(
                *actor_id,
                rpc::ActorCreationSpec {
                    actor_id: record.actor_id.clone(),
                    job_id: record.job_id.clone(),
                    name: record.name.clone(),
                    namespace: record.namespace.clone(),
                    is_detached: record.is_detached,
                    max_restarts: record.max_restarts,
                    required_resources: record.required_resources.clone(),
                    placement_group_id: record.placement_group_id.clone(),
                    owner_address: record.owner_address.clone(),
                    runtime_env_uris: Vec::new(),
                },
            );
            if matches!(state, ActorState::PendingCreation | ActorState::Restarting) {
                pending.push_back(*actor_id);
            }
            registered.insert(*actor_id, record.clone());
        }
    }

    /// Handle RegisterActor RPC.
    pub async fn handle_register_actor(
        &self,
        spec: rpc::ActorCreationSpec,
    ) -> Result<(), tonic::Status> {
        let actor_id = ActorID::try_from_binary(&spec.actor_id);
        if actor_id.is_nil() {
            return Err(tonic::Status::invalid_argument("malformed actor id"));
        }
        let job_id = JobID::try_from_binary(&spec.job_id);

        // Re-registration before the GC timer fires revives the id.
        if let Some(timer) = self.gc_timers.lock().remove(&actor_id) {
            timer.abort();
            self.dead_actors.write().remove(&actor_id);
        }

        if self.registered_actors.read().contains_key(&actor_id) {
            return Ok(());
        }

        let namespace = if spec.namespace.is_empty() {
            (self.namespace_resolver)(&job_id)
        } else {
            spec.namespace.clone()
        };

        // Name uniqueness is scoped to (namespace, name). The slot is
        // reserved under the write lock BEFORE the persist suspension
        // point; a concurrent registration of the same name hits the
        // reservation and fails instead of racing past a read check.
        let name_key = (namespace.clone(), spec.name.clone());
        if !spec.name.is_empty() {
            match self.named_actors.write().entry(name_key.clone()) {
                Entry::Occupied(slot) => {
                    // Re-registering the same actor id is idempotent.
                    if *slot.get() == actor_id {
                        return Ok(());
                    }
                    return Err(tonic::Status::already_exists(format!(
                        "actor with name '{}' already exists in namespace '{}'",
                        spec.name, namespace
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(actor_id);
                }
            }
        }

        let record = rpc::ActorTableData {
            actor_id: spec.actor_id.clone(),
            job_id: spec.job_id.clone(),
            state: ActorState::DependenciesUnready as i32,
            name: spec.name.clone(),
            namespace: namespace.clone(),
            max_restarts: spec.max_restarts,
            is_detached: spec.is_detached,
            required_resources: spec.required_resources.clone(),
            placement_group_id: spec.placement_group_id.clone(),
            owner_address: spec.owner_address.clone(),
            ..Default::default()
        };

        if let Err(e) = self
            .table_storage
            .actor_table()
            .put(&actor_id.hex(), &record)
            .await
        {
            // Give the reservation back so the name is usable again.
            if !spec.name.is_empty() {
                let mut named = self.named_actors.write();
                if named.get(&name_key) == Some(&actor_id) {
                    named.remove(&name_key);
                }
            }
            return Err(tonic::Status::internal(e.to_string()));
        }

        self.runtime_env_manager
            .add_uri_references(&actor_id.hex(), &spec.runtime_env_uris);
        self.creation_specs.write().insert(actor_id, spec);
        self.registered_actors.write().insert(actor_id, record.clone());
        self.bump_state_count(None, ActorState::DependenciesUnready);

        self.publish_actor(&record);

        tracing::info!(?actor_id, "Actor registered");
        Ok(())
    }

    /// Handle CreateActor RPC.
    ///
    /// Transitions the actor to PENDING_CREATION and returns a receiver
    /// resolved when the actor becomes ALIVE or is destroyed. The client
    /// observes a pending creation while the actor waits for capacity.
    pub async fn handle_create_actor(
        self: &Arc<Self>,
        actor_id_bytes: &[u8],
    ) -> Result<oneshot::Receiver<Result<rpc::CreateActorReply, Status>>, Status> {
        let actor_id = ActorID::try_from_binary(actor_id_bytes);

        let record = {
            let registered = self.registered_actors.read();
            registered
                .get(&actor_id)
                .cloned()
                .ok_or_else(|| Status::not_found(format!("actor {actor_id} not registered")))?
        };

        let old_state = actor_state(&record);
        let mut updated = record;
        updated.state = ActorState::PendingCreation as i32;

        self.table_storage
            .actor_table()
            .put(&actor_id.hex(), &updated)
            .await
            .map_err(|e| Status::internal(e.to_string()))?;

        self.registered_actors
            .write()
            .insert(actor_id, updated.clone());
        self.bump_state_count(Some(old_state), ActorState::PendingCreation);
        self.publish_actor(&updated);

        let (tx, rx) = oneshot::channel();
        self.create_callbacks
            .write()
            .entry(actor_id)
            .or_default()
            .push(tx);

        let mgr = Arc::clone(self);
        tokio::spawn(async move {
            mgr.schedule_actor(actor_id).await;
        });

        tracing::info!(?actor_id, "Actor creation requested");
        Ok(rx)
    }

    /// Run one scheduling attempt for an actor, retrying RPC failures with
    /// backoff and parking the actor when no node can host it.
    async fn schedule_actor(self: Arc<Self>, actor_id: ActorID) {
        let spec = {
            let specs = self.creation_specs.read();
            match specs.get(&actor_id) {
                Some(spec) => spec.clone(),
                None => return, // destroyed while queued
            }
        };
        let scheduler = match self.scheduler.read().clone() {
            Some(scheduler) => scheduler,
            None => {
                tracing::error!(?actor_id, "Actor scheduler not initialized");
                return;
            }
        };

        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(500), 2.0, Duration::from_secs(10));
        let mut attempts = 0;
        loop {
            // The actor may have been killed while waiting.
            if !self.registered_actors.read().contains_key(&actor_id) {
                return;
            }
            match scheduler.schedule(&spec).await {
                Ok(result) => {
                    self.on_actor_creation_success(
                        &actor_id,
                        result.node_id,
                        result.worker_address,
                        result.worker_pid,
                        result.acquired_resources,
                    )
                    .await;
                    return;
                }
                Err(ScheduleError::NoAvailableNode) => {
                    tracing::info!(?actor_id, "No node can host actor; parking");
                    self.pending_actors.lock().push_back(actor_id);
                    return;
                }
                Err(ScheduleError::Rpc(status)) if attempts < MAX_SCHEDULE_RPC_RETRIES => {
                    attempts += 1;
                    let delay = backoff.next_delay_with_jitter();
                    tracing::warn!(?actor_id, %status, attempts, "Actor placement RPC failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(ScheduleError::Rpc(status)) => {
                    tracing::warn!(?actor_id, %status, "Actor placement retries exhausted; parking");
                    self.pending_actors.lock().push_back(actor_id);
                    return;
                }
            }
        }
    }

    /// Drain the pending queue. Each parked actor gets one attempt; actors
    /// that still cannot be placed re-park.
    pub fn schedule_pending_actors(self: &Arc<Self>) {
        let parked: Vec<ActorID> = { self.pending_actors.lock().drain(..).collect() };
        if parked.is_empty() {
            return;
        }
        let mgr = Arc::clone(self);
        tokio::spawn(async move {
            for actor_id in parked {
                Arc::clone(&mgr).schedule_actor(actor_id).await;
            }
        });
    }

    /// Placement succeeded: the actor is ALIVE.
    async fn on_actor_creation_success(
        &self,
        actor_id: &ActorID,
        node_id: NodeID,
        worker_address: rpc::Address,
        worker_pid: u32,
        acquired_resources: ResourceSet,
    ) {
        let updated = {
            let registered = self.registered_actors.read();
            let Some(record) = registered.get(actor_id) else {
                // Killed between the lease and this callback; give the
                // charge back.
                self.resource_manager
                    .release_resources(&node_id, &acquired_resources);
                return;
            };
            let mut updated = record.clone();
            updated.state = ActorState::Alive as i32;
            updated.address = Some(worker_address.clone());
            updated.node_id = Some(node_id.binary());
            updated.pid = worker_pid;
            updated
        };
        let old_state = {
            let registered = self.registered_actors.read();
            registered.get(actor_id).map(actor_state)
        };

        if let Err(e) = self
            .table_storage
            .actor_table()
            .put(&actor_id.hex(), &updated)
            .await
        {
            tracing::error!(?actor_id, %e, "Failed to persist ALIVE actor");
        }

        self.registered_actors
            .write()
            .insert(*actor_id, updated.clone());
        if let Some(old_state) = old_state {
            self.bump_state_count(Some(old_state), ActorState::Alive);
        }
        self.actors_by_node
            .write()
            .entry(node_id)
            .or_default()
            .push(*actor_id);

        self.publish_actor(&updated);

        let callbacks = self.create_callbacks.write().remove(actor_id);
        if let Some(senders) = callbacks {
            let reply = rpc::CreateActorReply {
                actor_address: Some(worker_address),
            };
            for tx in senders {
                let _ = tx.send(Ok(reply.clone()));
            }
        }

        tracing::info!(?actor_id, ?node_id, "Actor is now ALIVE");
    }

    /// Remove an actor from its node's index and return the actor's charge
    /// to the resource view.
    fn detach_from_node(&self, actor_id: &ActorID, record: &rpc::ActorTableData) {
        if let Some(node_id_bytes) = &record.node_id {
            let node_id = NodeID::try_from_binary(node_id_bytes);
            let mut by_node = self.actors_by_node.write();
            if let Some(actors) = by_node.get_mut(&node_id) {
                actors.retain(|id| id != actor_id);
                if actors.is_empty() {
                    by_node.remove(&node_id);
                }
            }
            let resources = ResourceSet::from_map(&record.required_resources);
            self.resource_manager.release_resources(&node_id, &resources);
        }
    }

    /// Apply the restart policy after the actor's worker or node died.
    async fn restart_or_destroy(
        self: &Arc<Self>,
        actor_id: ActorID,
        death_cause: &str,
        creation_exception: Option<rpc::ExceptionData>,
    ) {
        let record = {
            let registered = self.registered_actors.read();
            match registered.get(&actor_id) {
                Some(record) => record.clone(),
                None => return, // already dead
            }
        };

        // A creation-task failure is terminal and the cause is persisted so
        // GetActor reports it.
        let creation_failed = creation_exception.is_some();
        let can_restart = !creation_failed
            && (record.max_restarts == -1 || record.num_restarts < record.max_restarts);

        if can_restart {
            let old_state = actor_state(&record);
            let mut updated = record;
            updated.state = ActorState::Restarting as i32;
            updated.num_restarts += 1;
            updated.death_cause = death_cause.to_string();
            self.detach_from_node(&actor_id, &updated);
            updated.address = None;
            updated.node_id = None;
            updated.pid = 0;

            if let Err(e) = self
                .table_storage
                .actor_table()
                .put(&actor_id.hex(), &updated)
                .await
            {
                tracing::error!(?actor_id, %e, "Failed to persist RESTARTING actor");
            }
            self.registered_actors
                .write()
                .insert(actor_id, updated.clone());
            self.bump_state_count(Some(old_state), ActorState::Restarting);
            self.publish_actor(&updated);

            tracing::info!(?actor_id, restarts = updated.num_restarts, "Actor restarting");
            self.pending_actors.lock().push_back(actor_id);
            self.schedule_pending_actors();
        } else {
            self.destroy_actor(actor_id, death_cause, creation_exception)
                .await;
        }
    }

    /// Transition an actor to DEAD and arm its metadata GC timer.
    async fn destroy_actor(
        self: &Arc<Self>,
        actor_id: ActorID,
        death_cause: &str,
        creation_exception: Option<rpc::ExceptionData>,
    ) {
        let record = {
            let mut registered = self.registered_actors.write();
            registered.remove(&actor_id)
        };
        let Some(record) = record else {
            return; // second kill is a no-op
        };

        let old_state = actor_state(&record);
        self.detach_from_node(&actor_id, &record);

        let mut updated = record;
        updated.state = ActorState::Dead as i32;
        updated.death_cause = death_cause.to_string();
        if creation_exception.is_some() {
            updated.creation_task_exception = creation_exception;
        }
        updated.address = None;
        updated.node_id = None;

        if let Err(e) = self
            .table_storage
            .actor_table()
            .put(&actor_id.hex(), &updated)
            .await
        {
            tracing::error!(?actor_id, %e, "Failed to persist DEAD actor");
        }

        if !updated.name.is_empty() {
            // Only release the slot if it still points at this actor; the
            // name may have been re-reserved while the persist was in
            // flight.
            let key = (updated.namespace.clone(), updated.name.clone());
            let mut named = self.named_actors.write();
            if named.get(&key) == Some(&actor_id) {
                named.remove(&key);
            }
        }
        self.bump_state_count(Some(old_state), ActorState::Dead);
        self.pending_actors.lock().retain(|id| *id != actor_id);
        self.creation_specs.write().remove(&actor_id);
        self.runtime_env_manager.remove_uri_references(&actor_id.hex());

        self.publish_actor(&updated);
        self.dead_actors.write().insert(actor_id, updated);

        let callbacks = self.create_callbacks.write().remove(&actor_id);
        if let Some(senders) = callbacks {
            for tx in senders {
                let _ = tx.send(Err(Status::aborted(format!(
                    "actor was destroyed: {death_cause}"
                ))));
            }
        }

        let listeners = self.destroy_listeners.read();
        for listener in listeners.iter() {
            listener(&actor_id);
        }
        drop(listeners);

        self.arm_gc_timer(actor_id);
        tracing::info!(?actor_id, death_cause, "Actor destroyed");
    }

    /// One-shot timer removing dead-actor metadata after the retention
    /// delay. Explicitly cancelled if the actor id is re-registered.
    fn arm_gc_timer(self: &Arc<Self>, actor_id: ActorID) {
        let mgr = Arc::clone(self);
        let delay = self.actor_gc_delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            mgr.dead_actors.write().remove(&actor_id);
            mgr.gc_timers.lock().remove(&actor_id);
            if let Err(e) = mgr.table_storage.actor_table().delete(&actor_id.hex()).await {
                tracing::warn!(?actor_id, %e, "Failed to delete GC'd actor record");
            }
            tracing::debug!(?actor_id, "Dead actor metadata collected");
        });
        if let Some(previous) = self.gc_timers.lock().insert(actor_id, handle) {
            previous.abort();
        }
    }

    /// Handle KillActor RPC. Killing a dead or unknown actor is a no-op.
    pub async fn handle_kill_actor(
        self: &Arc<Self>,
        actor_id_bytes: &[u8],
        no_restart: bool,
    ) -> Result<(), tonic::Status> {
        let actor_id = ActorID::try_from_binary(actor_id_bytes);
        if no_restart {
            self.destroy_actor(actor_id, "killed via KillActor", None)
                .await;
        } else {
            self.restart_or_destroy(actor_id, "killed via KillActor", None)
                .await;
        }
        Ok(())
    }

    /// Worker death (from the worker manager): restart or destroy every
    /// actor hosted by that worker.
    pub async fn on_worker_dead(
        self: &Arc<Self>,
        node_id: &NodeID,
        worker_id: &WorkerID,
        creation_exception: Option<rpc::ExceptionData>,
    ) {
        let victims: Vec<ActorID> = {
            let registered = self.registered_actors.read();
            registered
                .iter()
                .filter(|(_, record)| {
                    record
                        .address
                        .as_ref()
                        .map(|addr| addr.worker_id == worker_id.binary())
                        .unwrap_or(false)
                })
                .map(|(id, _)| *id)
                .collect()
        };

        for actor_id in victims {
            self.restart_or_destroy(
                actor_id,
                &format!("worker {worker_id} on node {node_id} died"),
                creation_exception.clone(),
            )
            .await;
        }
    }

    /// Node death: every actor on the node follows its restart policy.
    pub async fn on_node_dead(self: &Arc<Self>, node_id: &NodeID) {
        let victims: Vec<ActorID> = {
            let by_node = self.actors_by_node.read();
            by_node.get(node_id).cloned().unwrap_or_default()
        };

        for actor_id in victims {
            self.restart_or_destroy(actor_id, &format!("node {node_id} died"), None)
                .await;
        }
    }

    /// Job finished: non-detached actors of the job are destroyed.
    pub async fn on_job_finished(self: &Arc<Self>, job_id: &JobID) {
        let victims: Vec<ActorID> = {
            let registered = self.registered_actors.read();
            registered
                .iter()
                .filter(|(id, record)| id.job_id() == *job_id && !record.is_detached)
                .map(|(id, _)| *id)
                .collect()
        };

        for actor_id in victims {
            self.destroy_actor(actor_id, &format!("job {job_id} finished"), None)
                .await;
        }
    }

    /// Handle GetActorInfo RPC: live actors first, then the dead cache.
    pub fn handle_get_actor_info(&self, actor_id_bytes: &[u8]) -> Option<rpc::ActorTableData> {
        let actor_id = ActorID::try_from_binary(actor_id_bytes);
        if let Some(record) = self.registered_actors.read().get(&actor_id) {
            return Some(record.clone());
        }
        self.dead_actors.read().get(&actor_id).cloned()
    }

    /// Handle GetNamedActorInfo RPC.
    pub fn handle_get_named_actor_info(
        &self,
        name: &str,
        namespace: &str,
    ) -> Option<rpc::ActorTableData> {
        let named = self.named_actors.read();
        let actor_id = named.get(&(namespace.to_string(), name.to_string()))?;
        self.registered_actors.read().get(actor_id).cloned()
    }

    /// Handle ListNamedActors RPC.
    pub fn handle_list_named_actors(
        &self,
        namespace: &str,
        all_namespaces: bool,
    ) -> Vec<(String, String)> {
        let named = self.named_actors.read();
        named
            .keys()
            .filter(|(ns, _)| all_namespaces || ns == namespace)
            .map(|(ns, name)| (ns.clone(), name.clone()))
            .collect()
    }

    /// Handle GetAllActorInfo RPC.
    pub fn handle_get_all_actor_info(
        &self,
        limit: Option<usize>,
        state_filter: Option<ActorState>,
    ) -> Vec<rpc::ActorTableData> {
        let registered = self.registered_actors.read();
        let dead = self.dead_actors.read();
        let all = registered.values().chain(dead.values()).filter(|record| {
            state_filter
                .map(|state| actor_state(record) == state)
                .unwrap_or(true)
        });
        if let Some(limit) = limit {
            all.take(limit).cloned().collect()
        } else {
            all.cloned().collect()
        }
    }

    pub fn num_registered_actors(&self) -> usize {
        self.registered_actors.read().len()
    }

    pub fn num_pending_actors(&self) -> usize {
        self.pending_actors.lock().len()
    }

    pub fn state_counts(&self) -> HashMap<ActorState, usize> {
        self.state_counts.read().clone()
    }

    pub fn debug_string(&self) -> String {
        format!(
            "GcsActorManager: {{registered: {}, named: {}, pending: {}, dead cached: {}}}",
            self.registered_actors.read().len(),
            self.named_actors.read().len(),
            self.pending_actors.lock().len(),
            self.dead_actors.read().len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor_scheduler::tests::{make_node_info, make_spec, make_worker_address, node_id};
    use crate::client_pool::NodeletClientPool;
    use crate::node_manager::GcsNodeManager;
    use crate::nodelet_client::test_support::{MockNodeletClient, MockWorkerClient};
    use crate::nodelet_client::{NodeletClient, WorkerClient};
    use crate::kv_manager::GcsInternalKVManager;
    use crate::resource_scheduler::GcsResourceScheduler;
    use crate::store_client::{InMemoryInternalKV, InMemoryStoreClient, InternalKVInterface};

    fn make_runtime_env_manager() -> Arc<RuntimeEnvManager> {
        let kv_manager = Arc::new(GcsInternalKVManager::new(
            Arc::new(InMemoryInternalKV::new()) as Arc<dyn InternalKVInterface>,
        ));
        Arc::new(RuntimeEnvManager::new(kv_manager))
    }

    struct Fixture {
        node_manager: Arc<GcsNodeManager>,
        resource_manager: Arc<GcsResourceManager>,
        mock_nodelet: Arc<MockNodeletClient>,
        mock_worker: Arc<MockWorkerClient>,
        actor_manager: Arc<GcsActorManager>,
    }

    async fn make_fixture(nodes: &[(u8, f64)]) -> Fixture {
        let storage = Arc::new(GcsTableStorage::new(Arc::new(InMemoryStoreClient::new())));
        let node_manager = Arc::new(GcsNodeManager::new(Arc::clone(&storage)));
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
        let mock_worker = Arc::new(MockWorkerClient::new());

        let scheduler = Arc::new(GcsActorScheduler::new(
            Arc::clone(&node_manager),
            resource_scheduler,
            Arc::clone(&resource_manager),
            client_pool,
            Arc::clone(&mock_worker) as Arc<dyn WorkerClient>,
        ));

        let actor_manager = Arc::new(GcsActorManager::new(
            storage,
            Arc::clone(&resource_manager),
            make_runtime_env_manager(),
            Box::new(|job_id| format!("job-{}", job_id.hex())),
            Duration::from_secs(60),
        ));
        actor_manager.set_scheduler(scheduler);

        Fixture {
            node_manager,
            resource_manager,
            mock_nodelet,
            mock_worker,
            actor_manager,
        }
    }

    fn push_successful_placement(fixture: &Fixture, node: u8) {
        fixture
            .mock_nodelet
            .push_lease_reply(Ok(rpc::RequestWorkerLeaseReply {
                worker_address: Some(make_worker_address(node)),
                worker_pid: 4242,
                ..Default::default()
            }));
        fixture.mock_worker.push_reply(Ok(rpc::StartActorReply {}));
    }

    #[tokio::test]
    async fn test_register_and_get_actor() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        let spec = make_spec(1, "my_actor", 1.0);
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();

        let record = fixture
            .actor_manager
            .handle_get_named_actor_info("my_actor", "default")
            .expect("actor should be found by name");
        assert_eq!(record.name, "my_actor");
        assert_eq!(actor_state(&record), ActorState::DependenciesUnready);
        assert_eq!(fixture.actor_manager.num_registered_actors(), 1);
    }

    #[tokio::test]
    async fn test_name_conflict_same_namespace() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        fixture
            .actor_manager
            .handle_register_actor(make_spec(1, "svc", 1.0))
            .await
            .unwrap();

        let err = fixture
            .actor_manager
            .handle_register_actor(make_spec(2, "svc", 1.0))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::AlreadyExists);
    }

    #[tokio::test]
    async fn test_concurrent_registration_of_same_name_fails_once() {
        use crate::store_client::test_support::DelayedStore;

        // Writes park on a timer, so both registrations are in flight at
        // once; the name reservation must make exactly one of them win.
        let storage = Arc::new(GcsTableStorage::new(Arc::new(DelayedStore::new(
            Duration::from_millis(50),
        ))));
        let mgr = Arc::new(GcsActorManager::new(
            storage,
            Arc::new(GcsResourceManager::new(true)),
            make_runtime_env_manager(),
            Box::new(|_| "default".to_string()),
            Duration::from_secs(60),
        ));

        let first = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.handle_register_actor(make_spec(1, "svc", 1.0)).await })
        };
        let second = {
            let mgr = Arc::clone(&mgr);
            tokio::spawn(async move { mgr.handle_register_actor(make_spec(2, "svc", 1.0)).await })
        };
        let results = [first.await.unwrap(), second.await.unwrap()];

        let ok_count = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(ok_count, 1);
        let err = results.into_iter().find_map(|r| r.err()).unwrap();
        assert_eq!(err.code(), tonic::Code::AlreadyExists);
        assert_eq!(mgr.num_registered_actors(), 1);
    }

    #[tokio::test]
    async fn test_same_name_different_namespace_is_ok() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        fixture
            .actor_manager
            .handle_register_actor(make_spec(1, "svc", 1.0))
            .await
            .unwrap();

        let mut other = make_spec(2, "svc", 1.0);
        other.namespace = "other".to_string();
        fixture
            .actor_manager
            .handle_register_actor(other)
            .await
            .unwrap();
        assert_eq!(fixture.actor_manager.num_registered_actors(), 2);
    }

    #[tokio::test]
    async fn test_empty_namespace_resolved_from_job() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        let mut spec = make_spec(1, "svc", 1.0);
        spec.namespace = String::new();
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();

        let job_id = JobID::try_from_binary(&spec.job_id);
        let expected_ns = format!("job-{}", job_id.hex());
        assert!(fixture
            .actor_manager
            .handle_get_named_actor_info("svc", &expected_ns)
            .is_some());
    }

    #[tokio::test]
    async fn test_create_actor_becomes_alive() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        push_successful_placement(&fixture, 1);

        let spec = make_spec(1, "a", 4.0);
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();
        let rx = fixture
            .actor_manager
            .handle_create_actor(&spec.actor_id)
            .await
            .unwrap();
        let reply = rx.await.unwrap().unwrap();
        assert!(reply.actor_address.is_some());

        let record = fixture
            .actor_manager
            .handle_get_actor_info(&spec.actor_id)
            .unwrap();
        assert_eq!(actor_state(&record), ActorState::Alive);
        assert_eq!(record.pid, 4242);

        // Spec scenario: 8 CPU node hosting a 4 CPU actor has 4 left.
        let view = fixture
            .resource_manager
            .get_node_resources(&node_id(1))
            .unwrap();
        assert_eq!(view.available.get("CPU").to_f64(), 4.0);
    }

    #[tokio::test]
    async fn test_create_actor_parks_without_nodes() {
        let fixture = make_fixture(&[]).await;
        let spec = make_spec(1, "a", 4.0);
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();
        let _rx = fixture
            .actor_manager
            .handle_create_actor(&spec.actor_id)
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fixture.actor_manager.num_pending_actors(), 1);

        // Still PENDING_CREATION: infeasibility is not a client error.
        let record = fixture
            .actor_manager
            .handle_get_actor_info(&spec.actor_id)
            .unwrap();
        assert_eq!(actor_state(&record), ActorState::PendingCreation);
    }

    #[tokio::test]
    async fn test_pending_actor_drains_on_node_added() {
        let fixture = make_fixture(&[]).await;
        let spec = make_spec(1, "a", 4.0);
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();
        let rx = fixture
            .actor_manager
            .handle_create_actor(&spec.actor_id)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fixture.actor_manager.num_pending_actors(), 1);

        // A node joins with room for the actor.
        let info = make_node_info(2, 8.0);
        fixture
            .node_manager
            .handle_register_node(info.clone())
            .await
            .unwrap();
        fixture.resource_manager.on_node_add(&info);
        push_successful_placement(&fixture, 2);
        fixture.actor_manager.schedule_pending_actors();

        let reply = tokio::time::timeout(Duration::from_secs(2), rx)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(reply.actor_address.is_some());

        let record = fixture
            .actor_manager
            .handle_get_actor_info(&spec.actor_id)
            .unwrap();
        assert_eq!(actor_state(&record), ActorState::Alive);
        assert_eq!(record.node_id, Some(node_id(2).binary()));
    }

    #[tokio::test]
    async fn test_worker_death_restarts_actor_with_budget() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        push_successful_placement(&fixture, 1);

        let mut spec = make_spec(1, "a", 4.0);
        spec.max_restarts = 3;
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();
        let rx = fixture
            .actor_manager
            .handle_create_actor(&spec.actor_id)
            .await
            .unwrap();
        rx.await.unwrap().unwrap();

        // The worker hosting the actor dies; the actor reschedules.
        push_successful_placement(&fixture, 1);
        let worker_id = WorkerID::from_binary(&[42u8; 28]);
        fixture
            .actor_manager
            .on_worker_dead(&node_id(1), &worker_id, None)
            .await;

        tokio::time::sleep(Duration::from_millis(200)).await;
        let record = fixture
            .actor_manager
            .handle_get_actor_info(&spec.actor_id)
            .unwrap();
        assert_eq!(record.num_restarts, 1);
        assert_eq!(actor_state(&record), ActorState::Alive);
    }

    #[tokio::test]
    async fn test_worker_death_kills_actor_without_budget() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        push_successful_placement(&fixture, 1);

        // max_restarts = 0: first worker death is terminal.
        let spec = make_spec(1, "a", 4.0);
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();
        let rx = fixture
            .actor_manager
            .handle_create_actor(&spec.actor_id)
            .await
            .unwrap();
        rx.await.unwrap().unwrap();

        let worker_id = WorkerID::from_binary(&[42u8; 28]);
        fixture
            .actor_manager
            .on_worker_dead(&node_id(1), &worker_id, None)
            .await;

        let record = fixture
            .actor_manager
            .handle_get_actor_info(&spec.actor_id)
            .unwrap();
        assert_eq!(actor_state(&record), ActorState::Dead);
        assert_eq!(fixture.actor_manager.num_registered_actors(), 0);

        // Its resources were returned.
        let view = fixture
            .resource_manager
            .get_node_resources(&node_id(1))
            .unwrap();
        assert_eq!(view.available.get("CPU").to_f64(), 8.0);
    }

    #[tokio::test]
    async fn test_creation_exception_is_persisted_and_terminal() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        push_successful_placement(&fixture, 1);

        let mut spec = make_spec(1, "a", 1.0);
        spec.max_restarts = 5;
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();
        let rx = fixture
            .actor_manager
            .handle_create_actor(&spec.actor_id)
            .await
            .unwrap();
        rx.await.unwrap().unwrap();

        let worker_id = WorkerID::from_binary(&[42u8; 28]);
        fixture
            .actor_manager
            .on_worker_dead(
                &node_id(1),
                &worker_id,
                Some(rpc::ExceptionData {
                    error_message: "init raised".to_string(),
                    traceback: String::new(),
                }),
            )
            .await;

        // Despite remaining restart budget, a creation failure is terminal
        // and the cause is queryable.
        let record = fixture
            .actor_manager
            .handle_get_actor_info(&spec.actor_id)
            .unwrap();
        assert_eq!(actor_state(&record), ActorState::Dead);
        assert_eq!(
            record.creation_task_exception.unwrap().error_message,
            "init raised"
        );
    }

    #[tokio::test]
    async fn test_node_death_restarts_and_reparks() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        push_successful_placement(&fixture, 1);

        let mut spec = make_spec(1, "a", 4.0);
        spec.max_restarts = -1;
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();
        let rx = fixture
            .actor_manager
            .handle_create_actor(&spec.actor_id)
            .await
            .unwrap();
        rx.await.unwrap().unwrap();

        // Node dies; no other node exists, so the actor parks.
        fixture
            .node_manager
            .on_node_failure(&node_id(1))
            .await
            .unwrap();
        fixture.resource_manager.on_node_dead(&node_id(1));
        fixture.actor_manager.on_node_dead(&node_id(1)).await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        let record = fixture
            .actor_manager
            .handle_get_actor_info(&spec.actor_id)
            .unwrap();
        assert_eq!(actor_state(&record), ActorState::Restarting);
        assert_eq!(fixture.actor_manager.num_pending_actors(), 1);

        // New node joins and the actor lands there.
        let info = make_node_info(2, 8.0);
        fixture
            .node_manager
            .handle_register_node(info.clone())
            .await
            .unwrap();
        fixture.resource_manager.on_node_add(&info);
        push_successful_placement(&fixture, 2);
        fixture.actor_manager.schedule_pending_actors();

        tokio::time::sleep(Duration::from_millis(200)).await;
        let record = fixture
            .actor_manager
            .handle_get_actor_info(&spec.actor_id)
            .unwrap();
        assert_eq!(actor_state(&record), ActorState::Alive);
        assert_eq!(record.node_id, Some(node_id(2).binary()));
    }

    #[tokio::test]
    async fn test_kill_actor_is_idempotent() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        let spec = make_spec(1, "a", 1.0);
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();

        fixture
            .actor_manager
            .handle_kill_actor(&spec.actor_id, true)
            .await
            .unwrap();
        assert_eq!(fixture.actor_manager.num_registered_actors(), 0);

        // Second kill is a no-op, not an error.
        fixture
            .actor_manager
            .handle_kill_actor(&spec.actor_id, true)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_kill_frees_name() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        let spec = make_spec(1, "svc", 1.0);
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();
        fixture
            .actor_manager
            .handle_kill_actor(&spec.actor_id, true)
            .await
            .unwrap();

        // The (namespace, name) slot is free again.
        fixture
            .actor_manager
            .handle_register_actor(make_spec(2, "svc", 1.0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_job_finish_destroys_non_detached_only() {
        let fixture = make_fixture(&[(1, 8.0)]).await;

        let plain = make_spec(1, "plain", 1.0);
        let mut detached = make_spec(2, "detached", 1.0);
        detached.is_detached = true;

        fixture
            .actor_manager
            .handle_register_actor(plain.clone())
            .await
            .unwrap();
        fixture
            .actor_manager
            .handle_register_actor(detached.clone())
            .await
            .unwrap();

        let job_id = JobID::try_from_binary(&plain.job_id);
        fixture.actor_manager.on_job_finished(&job_id).await;

        assert_eq!(fixture.actor_manager.num_registered_actors(), 1);
        let survivor = fixture
            .actor_manager
            .handle_get_actor_info(&detached.actor_id)
            .unwrap();
        assert_ne!(actor_state(&survivor), ActorState::Dead);
    }

    #[tokio::test]
    async fn test_destroy_listener_fires() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        let destroyed = Arc::new(Mutex::new(Vec::new()));
        let destroyed_clone = Arc::clone(&destroyed);
        fixture
            .actor_manager
            .add_destroy_listener(Box::new(move |actor_id| {
                destroyed_clone.lock().push(*actor_id);
            }));

        let spec = make_spec(1, "a", 1.0);
        fixture
            .actor_manager
            .handle_register_actor(spec.clone())
            .await
            .unwrap();
        fixture
            .actor_manager
            .handle_kill_actor(&spec.actor_id, true)
            .await
            .unwrap();

        assert_eq!(destroyed.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_gc_timer_collects_dead_metadata() {
        let storage = Arc::new(GcsTableStorage::new(Arc::new(InMemoryStoreClient::new())));
        let resource_manager = Arc::new(GcsResourceManager::new(true));
        let mgr = Arc::new(GcsActorManager::new(
            Arc::clone(&storage),
            resource_manager,
            make_runtime_env_manager(),
            Box::new(|_| "default".to_string()),
            Duration::from_millis(30),
        ));

        let spec = make_spec(1, "a", 1.0);
        mgr.handle_register_actor(spec.clone()).await.unwrap();
        mgr.handle_kill_actor(&spec.actor_id, true).await.unwrap();

        assert!(mgr.handle_get_actor_info(&spec.actor_id).is_some());
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(mgr.handle_get_actor_info(&spec.actor_id).is_none());

        let actor_id = ActorID::try_from_binary(&spec.actor_id);
        assert!(storage
            .actor_table()
            .get(&actor_id.hex())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_reregistration_cancels_gc_timer() {
        let storage = Arc::new(GcsTableStorage::new(Arc::new(InMemoryStoreClient::new())));
        let resource_manager = Arc::new(GcsResourceManager::new(true));
        let mgr = Arc::new(GcsActorManager::new(
            storage,
            resource_manager,
            make_runtime_env_manager(),
            Box::new(|_| "default".to_string()),
            Duration::from_millis(50),
        ));

        let spec = make_spec(1, "a", 1.0);
        mgr.handle_register_actor(spec.clone()).await.unwrap();
        mgr.handle_kill_actor(&spec.actor_id, true).await.unwrap();

        // Re-register before the timer expires.
        mgr.handle_register_actor(spec.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(120)).await;

        // The revived actor survived the (cancelled) timer.
        let record = mgr.handle_get_actor_info(&spec.actor_id).unwrap();
        assert_ne!(actor_state(&record), ActorState::Dead);
    }

    #[tokio::test]
    async fn test_list_named_actors_namespace_filter() {
        let fixture = make_fixture(&[(1, 8.0)]).await;
        fixture
            .actor_manager
            .handle_register_actor(make_spec(1, "a", 1.0))
            .await
            .unwrap();
        let mut other = make_spec(2, "b", 1.0);
        other.namespace = "other".to_string();
        fixture
            .actor_manager
            .handle_register_actor(other)
            .await
            .unwrap();

        assert_eq!(
            fixture
                .actor_manager
                .handle_list_named_actors("default", false)
                .len(),
            1
        );
        assert_eq!(
            fixture
                .actor_manager
                .handle_list_named_actors("", true)
                .len(),
            2
        );
    }
}
