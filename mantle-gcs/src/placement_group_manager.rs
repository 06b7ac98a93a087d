// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Placement Group Manager — multi-bundle placement state machine.
//!
//! State machine: PENDING → (RESCHEDULING)* → CREATED → REMOVED. Groups
//! that cannot be placed park in an age-ordered pending queue; rescheduling
//! groups (a node died under them) re-enter at the front. The queue is
//! drained on every create request and on every NodeAdded, one group at a
//! time, stopping at the first group that still does not fit.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::oneshot;
use tonic::Status;

use mantle_common::id::{ActorID, JobID, NodeID, PlacementGroupID};
use mantle_proto::rpc;
use mantle_proto::rpc::PlacementGroupState;

use crate::init_data::GcsInitData;
use crate::placement_group_scheduler::{GcsPlacementGroupScheduler, PgScheduleOutcome};
use crate::table_storage::GcsTableStorage;

fn pg_state(record: &rpc::PlacementGroupTableData) -> PlacementGroupState {
    PlacementGroupState::try_from(record.state).unwrap_or(PlacementGroupState::Removed)
}

pub struct GcsPlacementGroupManager {
    placement_groups: RwLock<HashMap<PlacementGroupID, rpc::PlacementGroupTableData>>,
    /// (namespace, name) → id for named groups.
    named_placement_groups: RwLock<HashMap<(String, String), PlacementGroupID>>,
    /// Groups waiting for placement, oldest first; rescheduling groups are
    /// pushed to the front.
    pending_queue: Mutex<VecDeque<PlacementGroupID>>,
    /// One placement attempt in flight at a time.
    scheduling_in_progress: AtomicBool,
    /// WaitPlacementGroupUntilReady waiters.
    #[allow(clippy::type_complexity)]
    ready_waiters: Mutex<HashMap<PlacementGroupID, Vec<oneshot::Sender<Result<(), Status>>>>>,
    state_counts: RwLock<HashMap<PlacementGroupState, usize>>,
    table_storage: Arc<GcsTableStorage>,
    scheduler: RwLock<Option<Arc<GcsPlacementGroupScheduler>>>,
}

impl GcsPlacementGroupManager {
    pub fn new(table_storage: Arc<GcsTableStorage>) -> Self {
        Self {
            placement_groups: RwLock::new(HashMap::new()),
            named_placement_groups: RwLock::new(HashMap::new()),
            pending_queue: Mutex::new(VecDeque::new()),
            scheduling_in_progress: AtomicBool::new(false),
            ready_waiters: Mutex::new(HashMap::new()),
            state_counts: RwLock::new(HashMap::new()),
            table_storage,
            scheduler: RwLock::new(None),
        }
    }

    /// Set the placement scheduler (called during server initialization).
    pub fn set_scheduler(&self, scheduler: Arc<GcsPlacementGroupScheduler>) {
        *self.scheduler.write() = Some(scheduler);
    }

    fn bump_state_count(&self, from: Option<PlacementGroupState>, to: PlacementGroupState) {
        let mut counts = self.state_counts.write();
        if let Some(from) = from {
            if let Some(c) = counts.get_mut(&from) {
                *c = c.saturating_sub(1);
            }
        }
        *counts.entry(to).or_insert(0) += 1;
    }

    /// Rebuild group state from the initial snapshot. Groups that were not
    /// CREATED re-enter the queue; bindings that referenced now-unknown
    /// nodes are re-established on the first reschedule.
    pub fn initialize(&self, init_data: &GcsInitData) {
        let mut groups = self.placement_groups.write();
        let mut named = self.named_placement_groups.write();
        let mut counts = self.state_counts.write();
        let mut pending = self.pending_queue.lock();

        for (pg_id, record) in &init_data.placement_groups {
            let state = pg_state(record);
            *counts.entry(state).or_insert(0) += 1;
            if state == PlacementGroupState::Removed {
                groups.insert(*pg_id, record.clone());
                continue;
            }
            if !record.name.is_empty() {
                named.insert((record.namespace.clone(), record.name.clone()), *pg_id);
            }
            if matches!(
                state,
                PlacementGroupState::Pending | PlacementGroupState::Rescheduling
            ) {
                pending.push_back(*pg_id);
            }
            groups.insert(*pg_id, record.clone());
        }
    }

    /// Handle CreatePlacementGroup RPC.
    pub async fn handle_create_placement_group(
        self: &Arc<Self>,
        mut pg_data: rpc::PlacementGroupTableData,
    ) -> Result<(), tonic::Status> {
        let pg_id = PlacementGroupID::try_from_binary(&pg_data.placement_group_id);
        if pg_id.is_nil() {
            return Err(tonic::Status::invalid_argument("malformed placement group id"));
        }
        if pg_data.bundles.is_empty() {
            return Err(tonic::Status::invalid_argument(
                "placement group must have at least one bundle",
            ));
        }
        if self.placement_groups.read().contains_key(&pg_id) {
            return Ok(());
        }

        // Reserve the (namespace, name) slot under the write lock BEFORE
        // the persist suspension point so concurrent creations of the same
        // name cannot both pass a read check.
        let name_key = (pg_data.namespace.clone(), pg_data.name.clone());
        if !pg_data.name.is_empty() {
            match self.named_placement_groups.write().entry(name_key.clone()) {
                Entry::Occupied(slot) => {
                    // Re-creating the same group id is idempotent.
                    if *slot.get() == pg_id {
                        return Ok(());
                    }
                    return Err(tonic::Status::already_exists(format!(
                        "placement group '{}' already exists in namespace '{}'",
                        pg_data.name, pg_data.namespace
                    )));
                }
                Entry::Vacant(slot) => {
                    slot.insert(pg_id);
                }
            }
        }

        pg_data.state = PlacementGroupState::Pending as i32;
        if pg_data.creation_time_ms == 0 {
            pg_data.creation_time_ms = mantle_util::time::current_time_ms();
        }
        for bundle in &mut pg_data.bundles {
            bundle.node_id.clear();
        }

        if let Err(e) = self
            .table_storage
            .placement_group_table()
            .put(&pg_id.hex(), &pg_data)
            .await
        {
            // Give the reservation back so the name is usable again.
            if !pg_data.name.is_empty() {
                let mut named = self.named_placement_groups.write();
                if named.get(&name_key) == Some(&pg_id) {
                    named.remove(&name_key);
                }
            }
            return Err(tonic::Status::internal(e.to_string()));
        }

        self.placement_groups.write().insert(pg_id, pg_data);
        self.bump_state_count(None, PlacementGroupState::Pending);
        self.pending_queue.lock().push_back(pg_id);

        tracing::info!(?pg_id, "Placement group registered");
        self.schedule_pending_placement_groups();
        Ok(())
    }

    /// Drain the pending queue until a group fails to place. Only one
    /// drain runs at a time; concurrent kicks are coalesced.
    pub fn schedule_pending_placement_groups(self: &Arc<Self>) {
        if self.scheduling_in_progress.swap(true, Ordering::SeqCst) {
            return;
        }
        let mgr = Arc::clone(self);
        tokio::spawn(async move {
            let drained_dry = mgr.drain_pending_queue().await;
            mgr.scheduling_in_progress.store(false, Ordering::SeqCst);
            // A group enqueued while the drain was finishing would have had
            // its kick swallowed; pick it up. A drain that stopped on a
            // parked group does NOT re-kick (the next NodeAdded will).
            if drained_dry && !mgr.pending_queue.lock().is_empty() {
                mgr.schedule_pending_placement_groups();
            }
        });
    }

    /// Returns true when the queue was fully drained, false when it stopped
    /// at a group that could not be placed (or no scheduler is wired yet).
    async fn drain_pending_queue(self: &Arc<Self>) -> bool {
        let scheduler = match self.scheduler.read().clone() {
            Some(scheduler) => scheduler,
            None => return false,
        };

        loop {
            let pg_id = match self.pending_queue.lock().pop_front() {
                Some(pg_id) => pg_id,
                None => return true,
            };
            let record = {
                let groups = self.placement_groups.read();
                match groups.get(&pg_id) {
                    Some(record) if pg_state(record) != PlacementGroupState::Removed => {
                        record.clone()
                    }
                    _ => continue, // removed while parked
                }
            };

            match scheduler.schedule(&record).await {
                PgScheduleOutcome::Success(assignment) => {
                    self.on_placement_success(pg_id, assignment).await;
                }
                PgScheduleOutcome::Failed | PgScheduleOutcome::Infeasible => {
                    // Park at the front to keep (priority, age) order and
                    // stop; a future NodeAdded retries.
                    self.pending_queue.lock().push_front(pg_id);
                    return false;
                }
            }
        }
    }

    async fn on_placement_success(
        self: &Arc<Self>,
        pg_id: PlacementGroupID,
        assignment: Vec<(i64, NodeID)>,
    ) {
        let updated = {
            let groups = self.placement_groups.read();
            let Some(record) = groups.get(&pg_id) else {
                return;
            };
            let mut updated = record.clone();
            for bundle in &mut updated.bundles {
                if let Some((_, node_id)) = assignment
                    .iter()
                    .find(|(index, _)| *index == bundle.bundle_index)
                {
                    bundle.node_id = node_id.binary();
                }
            }
            updated.state = PlacementGroupState::Created as i32;
            updated
        };
        let old_state = {
            let groups = self.placement_groups.read();
            groups.get(&pg_id).map(pg_state)
        };

        if let Err(e) = self
            .table_storage
            .placement_group_table()
            .put(&pg_id.hex(), &updated)
            .await
        {
            tracing::error!(?pg_id, %e, "Failed to persist CREATED placement group");
        }

        self.placement_groups.write().insert(pg_id, updated);
        if let Some(old_state) = old_state {
            self.bump_state_count(Some(old_state), PlacementGroupState::Created);
        }

        if let Some(waiters) = self.ready_waiters.lock().remove(&pg_id) {
            for tx in waiters {
                let _ = tx.send(Ok(()));
            }
        }
        tracing::info!(?pg_id, "Placement group created");
    }

    /// Handle RemovePlacementGroup RPC. Removing an unknown group is a
    /// no-op.
    pub async fn handle_remove_placement_group(
        self: &Arc<Self>,
        pg_id_bytes: &[u8],
    ) -> Result<(), tonic::Status> {
        let pg_id = PlacementGroupID::try_from_binary(pg_id_bytes);
        self.remove_placement_group(pg_id, "removed via RemovePlacementGroup")
            .await;
        Ok(())
    }

    async fn remove_placement_group(self: &Arc<Self>, pg_id: PlacementGroupID, reason: &str) {
        let record = {
            let groups = self.placement_groups.read();
            match groups.get(&pg_id) {
                Some(record) if pg_state(record) != PlacementGroupState::Removed => record.clone(),
                _ => return,
            }
        };
        let old_state = pg_state(&record);

        // Give the bundles back before flipping the state.
        let scheduler = self.scheduler.read().clone();
        if let Some(scheduler) = scheduler {
            scheduler.release_bundles(&record).await;
        }

        let mut updated = record;
        updated.state = PlacementGroupState::Removed as i32;
        for bundle in &mut updated.bundles {
            bundle.node_id.clear();
        }

        if let Err(e) = self
            .table_storage
            .placement_group_table()
            .put(&pg_id.hex(), &updated)
            .await
        {
            tracing::error!(?pg_id, %e, "Failed to persist REMOVED placement group");
        }

        if !updated.name.is_empty() {
            // Only release the slot if it still points at this group; the
            // name may have been re-reserved while the persist was in
            // flight.
            let key = (updated.namespace.clone(), updated.name.clone());
            let mut named = self.named_placement_groups.write();
            if named.get(&key) == Some(&pg_id) {
                named.remove(&key);
            }
        }
        self.pending_queue.lock().retain(|id| *id != pg_id);
        self.placement_groups.write().insert(pg_id, updated);
        self.bump_state_count(Some(old_state), PlacementGroupState::Removed);

        if let Some(waiters) = self.ready_waiters.lock().remove(&pg_id) {
            for tx in waiters {
                let _ = tx.send(Err(Status::aborted(format!(
                    "placement group was removed: {reason}"
                ))));
            }
        }
        tracing::info!(?pg_id, reason, "Placement group removed");
    }

    /// A node died: unbind its bundles. A CREATED group that lost a bundle
    /// goes to RESCHEDULING and re-enters the queue at the front.
    pub async fn on_node_dead(self: &Arc<Self>, node_id: &NodeID) {
        let affected: Vec<(PlacementGroupID, rpc::PlacementGroupTableData)> = {
            let groups = self.placement_groups.read();
            groups
                .iter()
                .filter(|(_, record)| {
                    record
                        .bundles
                        .iter()
                        .any(|b| b.node_id == node_id.binary())
                })
                .map(|(id, record)| (*id, record.clone()))
                .collect()
        };

        for (pg_id, record) in affected {
            let old_state = pg_state(&record);
            let mut updated = record;
            for bundle in &mut updated.bundles {
                if bundle.node_id == node_id.binary() {
                    bundle.node_id.clear();
                }
            }
            let requeue = old_state == PlacementGroupState::Created;
            if requeue {
                updated.state = PlacementGroupState::Rescheduling as i32;
            }

            if let Err(e) = self
                .table_storage
                .placement_group_table()
                .put(&pg_id.hex(), &updated)
                .await
            {
                tracing::error!(?pg_id, %e, "Failed to persist RESCHEDULING placement group");
            }
            self.placement_groups.write().insert(pg_id, updated);
            if requeue {
                self.bump_state_count(Some(old_state), PlacementGroupState::Rescheduling);
                self.pending_queue.lock().push_front(pg_id);
                tracing::info!(?pg_id, ?node_id, "Placement group rescheduling after node death");
            }
        }
    }

    /// Destroy groups created by a finished job (detached groups survive).
    pub async fn clean_placement_group_if_needed_when_job_dead(self: &Arc<Self>, job_id: &JobID) {
        let victims: Vec<PlacementGroupID> = {
            let groups = self.placement_groups.read();
            groups
                .iter()
                .filter(|(_, record)| {
                    !record.is_detached && record.creator_job_id == job_id.binary()
                })
                .map(|(id, _)| *id)
                .collect()
        };
        for pg_id in victims {
            self.remove_placement_group(pg_id, "creator job finished").await;
        }
    }

    /// Destroy groups created by a dead actor (detached groups survive).
    pub async fn clean_placement_group_if_needed_when_actor_dead(
        self: &Arc<Self>,
        actor_id: &ActorID,
    ) {
        let victims: Vec<PlacementGroupID> = {
            let groups = self.placement_groups.read();
            groups
                .iter()
                .filter(|(_, record)| {
                    !record.is_detached && record.creator_actor_id == actor_id.binary()
                })
                .map(|(id, _)| *id)
                .collect()
        };
        for pg_id in victims {
            self.remove_placement_group(pg_id, "creator actor died").await;
        }
    }

    /// Handle GetPlacementGroup RPC.
    pub fn handle_get_placement_group(
        &self,
        pg_id_bytes: &[u8],
    ) -> Option<rpc::PlacementGroupTableData> {
        let pg_id = PlacementGroupID::try_from_binary(pg_id_bytes);
        self.placement_groups.read().get(&pg_id).cloned()
    }

    /// Handle GetAllPlacementGroup RPC.
    pub fn handle_get_all_placement_groups(
        &self,
        limit: Option<usize>,
    ) -> Vec<rpc::PlacementGroupTableData> {
        let groups = self.placement_groups.read();
        if let Some(limit) = limit {
            groups.values().take(limit).cloned().collect()
        } else {
            groups.values().cloned().collect()
        }
    }

    /// Handle WaitPlacementGroupUntilReady RPC: resolves when the group is
    /// CREATED, errors if it is removed first.
    pub fn handle_wait_until_ready(
        &self,
        pg_id_bytes: &[u8],
    ) -> Result<oneshot::Receiver<Result<(), Status>>, Status> {
        let pg_id = PlacementGroupID::try_from_binary(pg_id_bytes);
        let (tx, rx) = oneshot::channel();

        let state = {
            let groups = self.placement_groups.read();
            groups.get(&pg_id).map(pg_state)
        };
        match state {
            None => return Err(Status::not_found(format!("placement group {pg_id} not found"))),
            Some(PlacementGroupState::Created) => {
                let _ = tx.send(Ok(()));
            }
            Some(PlacementGroupState::Removed) => {
                let _ = tx.send(Err(Status::aborted("placement group was removed")));
            }
            Some(_) => {
                self.ready_waiters.lock().entry(pg_id).or_default().push(tx);
            }
        }
        Ok(rx)
    }

    pub fn num_placement_groups(&self) -> usize {
        self.placement_groups.read().len()
    }

    pub fn num_pending_placement_groups(&self) -> usize {
        self.pending_queue.lock().len()
    }

    pub fn state_counts(&self) -> HashMap<PlacementGroupState, usize> {
        self.state_counts.read().clone()
    }

    pub fn debug_string(&self) -> String {
        format!(
            "GcsPlacementGroupManager: {{groups: {}, named: {}, pending: {}}}",
            self.placement_groups.read().len(),
            self.named_placement_groups.read().len(),
            self.pending_queue.lock().len()
        )
    }
}
