// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Resource Scheduler — stateless placement policy over a resource
//! snapshot.
//!
//! Pure functions: callers commit bindings themselves. All iteration is in
//! lexicographic node-id order and every tie-break is deterministic, so a
//! given cluster view always produces the same assignment.
//!
//! `Failed` means every bundle fits some node's total but availability is
//! currently lacking (retry when resources free up); `Infeasible` means at
//! least one bundle can never fit any live node (wait for new nodes).

use std::sync::Arc;

use mantle_common::id::NodeID;
use mantle_common::scheduling::{FixedPoint, ResourceSet};
use mantle_proto::rpc::PlacementStrategy;

use crate::resource_manager::{GcsResourceManager, NodeResources};

/// Result of a bundle scheduling request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulingResult {
    /// One node per bundle, in bundle order.
    Success(Vec<NodeID>),
    /// Feasible but currently unavailable; park and retry later.
    Failed,
    /// No live node could ever satisfy some bundle.
    Infeasible,
}

pub struct GcsResourceScheduler {
    resource_manager: Arc<GcsResourceManager>,
}

impl GcsResourceScheduler {
    pub fn new(resource_manager: Arc<GcsResourceManager>) -> Self {
        Self { resource_manager }
    }

    /// Pick a node for a single placement (actor scheduling).
    ///
    /// Best-fit: among nodes whose availability covers the demand, choose
    /// the one with the smallest leftover of the most-constrained resource;
    /// ties break on lexicographic node id.
    pub fn select_node(&self, required: &ResourceSet) -> Option<NodeID> {
        let snapshot = self.sorted_snapshot();
        best_fit(required, snapshot.iter().map(|(id, nr)| (*id, &nr.available)))
    }

    /// Whether any live node's total capacity covers the demand.
    pub fn is_feasible(&self, required: &ResourceSet) -> bool {
        self.sorted_snapshot()
            .iter()
            .any(|(_, nr)| nr.total.is_superset_of(required))
    }

    /// Compute an assignment for a list of bundles under a placement
    /// strategy.
    pub fn schedule(
        &self,
        required: &[ResourceSet],
        strategy: PlacementStrategy,
    ) -> SchedulingResult {
        if required.is_empty() {
            return SchedulingResult::Success(Vec::new());
        }
        let snapshot = self.sorted_snapshot();
        if snapshot.is_empty() {
            return SchedulingResult::Infeasible;
        }

        match strategy {
            PlacementStrategy::StrictPack => strict_pack(required, &snapshot),
            PlacementStrategy::StrictSpread => strict_spread(required, &snapshot),
            PlacementStrategy::Pack => pack(required, &snapshot),
            PlacementStrategy::Spread => spread(required, &snapshot),
        }
    }

    fn sorted_snapshot(&self) -> Vec<(NodeID, NodeResources)> {
        let mut snapshot: Vec<(NodeID, NodeResources)> =
            self.resource_manager.cluster_snapshot().into_iter().collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }
}

/// Smallest leftover of the most-constrained requested resource; lower is a
/// tighter fit. `None` when the demand does not fit.
fn fit_score(available: &ResourceSet, required: &ResourceSet) -> Option<FixedPoint> {
    if !available.is_superset_of(required) {
        return None;
    }
    let mut min_leftover: Option<FixedPoint> = None;
    for (name, amount) in required.iter() {
        let leftover = available.get(name) - amount;
        min_leftover = Some(match min_leftover {
            Some(current) if current <= leftover => current,
            _ => leftover,
        });
    }
    // An empty demand fits anywhere equally well.
    Some(min_leftover.unwrap_or(FixedPoint::ZERO))
}

/// Best-fit choice over `(node, availability)` pairs given in lexicographic
/// order. Strictly-better scores win, so ties keep the earlier node.
fn best_fit<'a>(
    required: &ResourceSet,
    candidates: impl Iterator<Item = (NodeID, &'a ResourceSet)>,
) -> Option<NodeID> {
    let mut best: Option<(NodeID, FixedPoint)> = None;
    for (node_id, available) in candidates {
        if let Some(score) = fit_score(available, required) {
            match best {
                Some((_, best_score)) if best_score <= score => {}
                _ => best = Some((node_id, score)),
            }
        }
    }
    best.map(|(node_id, _)| node_id)
}

fn any_feasible(required: &ResourceSet, snapshot: &[(NodeID, NodeResources)]) -> bool {
    snapshot.iter().any(|(_, nr)| nr.total.is_superset_of(required))
}

/// Failed when every bundle fits some total; Infeasible otherwise.
fn classify_failure(
    required: &[ResourceSet],
    snapshot: &[(NodeID, NodeResources)],
) -> SchedulingResult {
    if required.iter().all(|req| any_feasible(req, snapshot)) {
        SchedulingResult::Failed
    } else {
        SchedulingResult::Infeasible
    }
}

fn strict_pack(
    required: &[ResourceSet],
    snapshot: &[(NodeID, NodeResources)],
) -> SchedulingResult {
    let mut total_demand = ResourceSet::new();
    for req in required {
        total_demand.add(req);
    }

    for (node_id, nr) in snapshot {
        if nr.available.is_superset_of(&total_demand) {
            return SchedulingResult::Success(vec![*node_id; required.len()]);
        }
    }
    if any_feasible(&total_demand, snapshot) {
        SchedulingResult::Failed
    } else {
        SchedulingResult::Infeasible
    }
}

fn strict_spread(
    required: &[ResourceSet],
    snapshot: &[(NodeID, NodeResources)],
) -> SchedulingResult {
    if required.len() > snapshot.len() {
        return SchedulingResult::Infeasible;
    }

    let mut working: Vec<(NodeID, ResourceSet)> = snapshot
        .iter()
        .map(|(id, nr)| (*id, nr.available.clone()))
        .collect();
    let mut used: Vec<NodeID> = Vec::new();
    let mut assignments = Vec::with_capacity(required.len());

    for req in required {
        let choice = best_fit(
            req,
            working
                .iter()
                .filter(|(id, _)| !used.contains(id))
                .map(|(id, avail)| (*id, avail)),
        );
        match choice {
            Some(node_id) => {
                if let Some((_, avail)) = working.iter_mut().find(|(id, _)| *id == node_id) {
                    avail.subtract(req);
                }
                used.push(node_id);
                assignments.push(node_id);
            }
            None => return classify_failure(required, snapshot),
        }
    }
    SchedulingResult::Success(assignments)
}

fn pack(required: &[ResourceSet], snapshot: &[(NodeID, NodeResources)]) -> SchedulingResult {
    let mut working: Vec<(NodeID, ResourceSet)> = snapshot
        .iter()
        .map(|(id, nr)| (*id, nr.available.clone()))
        .collect();
    let mut used: Vec<NodeID> = Vec::new();
    let mut assignments = Vec::with_capacity(required.len());

    for req in required {
        // Pack: prefer a node already carrying a bundle of this group.
        let choice = best_fit(
            req,
            working
                .iter()
                .filter(|(id, _)| used.contains(id))
                .map(|(id, avail)| (*id, avail)),
        )
        .or_else(|| {
            best_fit(req, working.iter().map(|(id, avail)| (*id, avail)))
        });
        match choice {
            Some(node_id) => {
                if let Some((_, avail)) = working.iter_mut().find(|(id, _)| *id == node_id) {
                    avail.subtract(req);
                }
                if !used.contains(&node_id) {
                    used.push(node_id);
                }
                assignments.push(node_id);
            }
            None => return classify_failure(required, snapshot),
        }
    }
    SchedulingResult::Success(assignments)
}

fn spread(required: &[ResourceSet], snapshot: &[(NodeID, NodeResources)]) -> SchedulingResult {
    let mut working: Vec<(NodeID, ResourceSet)> = snapshot
        .iter()
        .map(|(id, nr)| (*id, nr.available.clone()))
        .collect();
    let mut used: Vec<NodeID> = Vec::new();
    let mut assignments = Vec::with_capacity(required.len());

    for req in required {
        // Spread: prefer untouched nodes, fall back to reuse.
        let choice = best_fit(
            req,
            working
                .iter()
                .filter(|(id, _)| !used.contains(id))
                .map(|(id, avail)| (*id, avail)),
        )
        .or_else(|| {
            best_fit(req, working.iter().map(|(id, avail)| (*id, avail)))
        });
        match choice {
            Some(node_id) => {
                if let Some((_, avail)) = working.iter_mut().find(|(id, _)| *id == node_id) {
                    avail.subtract(req);
                }
                if !used.contains(&node_id) {
                    used.push(node_id);
                }
                assignments.push(node_id);
            }
            None => return classify_failure(required, snapshot),
        }
    }
    SchedulingResult::Success(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mantle_proto::rpc;
    use std::collections::HashMap;

    fn node_id(v: u8) -> NodeID {
        let mut data = [0u8; 28];
        data[0] = v;
        NodeID::from_binary(&data)
    }

    fn make_node(v: u8, cpus: f64) -> rpc::NodeInfo {
        rpc::NodeInfo {
            node_id: node_id(v).binary(),
            resources_total: HashMap::from([("CPU".to_string(), cpus)]),
            state: rpc::NodeState::Alive as i32,
            ..Default::default()
        }
    }

    fn cpus(n: f64) -> ResourceSet {
        let mut set = ResourceSet::new();
        set.set("CPU".to_string(), FixedPoint::from_f64(n));
        set
    }

    fn make_scheduler(nodes: &[(u8, f64)]) -> (Arc<GcsResourceManager>, GcsResourceScheduler) {
        let mgr = Arc::new(GcsResourceManager::new(true));
        for (v, c) in nodes {
            mgr.on_node_add(&make_node(*v, *c));
        }
        let scheduler = GcsResourceScheduler::new(Arc::clone(&mgr));
        (mgr, scheduler)
    }

    #[test]
    fn test_select_node_best_fit() {
        let (_mgr, scheduler) = make_scheduler(&[(1, 8.0), (2, 4.0), (3, 2.0)]);
        // 3 CPUs fits tightest on node 2 (leftover 1 vs 5).
        assert_eq!(scheduler.select_node(&cpus(3.0)), Some(node_id(2)));
        // 1 CPU fits tightest on node 3.
        assert_eq!(scheduler.select_node(&cpus(1.0)), Some(node_id(3)));
        // 16 CPUs fits nowhere.
        assert_eq!(scheduler.select_node(&cpus(16.0)), None);
    }

    #[test]
    fn test_select_node_tie_breaks_lexicographic() {
        let (_mgr, scheduler) = make_scheduler(&[(2, 4.0), (1, 4.0)]);
        // Equal fit; the lexicographically smaller node id wins.
        assert_eq!(scheduler.select_node(&cpus(2.0)), Some(node_id(1)));
    }

    #[test]
    fn test_select_node_is_deterministic() {
        let (_mgr, scheduler) = make_scheduler(&[(5, 8.0), (3, 8.0), (9, 8.0)]);
        let first = scheduler.select_node(&cpus(1.0));
        for _ in 0..10 {
            assert_eq!(scheduler.select_node(&cpus(1.0)), first);
        }
    }

    #[test]
    fn test_strict_pack_same_node() {
        let (_mgr, scheduler) = make_scheduler(&[(1, 2.0), (2, 8.0)]);
        let result = scheduler.schedule(
            &[cpus(1.0), cpus(1.0), cpus(1.0)],
            PlacementStrategy::StrictPack,
        );
        match result {
            SchedulingResult::Success(nodes) => {
                assert_eq!(nodes.len(), 3);
                assert!(nodes.iter().all(|n| *n == node_id(2)));
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_pack_infeasible() {
        let (_mgr, scheduler) = make_scheduler(&[(1, 2.0), (2, 3.0)]);
        // Sum is 4 CPU; no single node can ever hold it.
        let result =
            scheduler.schedule(&[cpus(2.0), cpus(2.0)], PlacementStrategy::StrictPack);
        assert_eq!(result, SchedulingResult::Infeasible);
    }

    #[test]
    fn test_strict_pack_failed_when_occupied() {
        let (mgr, scheduler) = make_scheduler(&[(1, 8.0)]);
        assert!(mgr.acquire_resources(&node_id(1), &cpus(7.0)));
        let result =
            scheduler.schedule(&[cpus(2.0), cpus(2.0)], PlacementStrategy::StrictPack);
        assert_eq!(result, SchedulingResult::Failed);
    }

    #[test]
    fn test_strict_spread_distinct_nodes() {
        let (_mgr, scheduler) = make_scheduler(&[(1, 8.0), (2, 8.0)]);
        let result =
            scheduler.schedule(&[cpus(1.0), cpus(1.0)], PlacementStrategy::StrictSpread);
        match result {
            SchedulingResult::Success(nodes) => {
                assert_eq!(nodes.len(), 2);
                assert_ne!(nodes[0], nodes[1]);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_strict_spread_more_bundles_than_nodes() {
        let (_mgr, scheduler) = make_scheduler(&[(1, 8.0)]);
        let result =
            scheduler.schedule(&[cpus(1.0), cpus(1.0)], PlacementStrategy::StrictSpread);
        assert_eq!(result, SchedulingResult::Infeasible);
    }

    #[test]
    fn test_pack_prefers_reuse() {
        let (_mgr, scheduler) = make_scheduler(&[(1, 8.0), (2, 8.0)]);
        let result = scheduler.schedule(&[cpus(2.0), cpus(2.0)], PlacementStrategy::Pack);
        match result {
            SchedulingResult::Success(nodes) => {
                assert_eq!(nodes[0], nodes[1]);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_pack_spills_when_first_node_full() {
        let (_mgr, scheduler) = make_scheduler(&[(1, 3.0), (2, 8.0)]);
        let result =
            scheduler.schedule(&[cpus(2.0), cpus(2.0), cpus(2.0)], PlacementStrategy::Pack);
        match result {
            SchedulingResult::Success(nodes) => {
                assert_eq!(nodes.len(), 3);
                // Soft pack still succeeds with more than one node.
                let distinct: std::collections::HashSet<_> = nodes.iter().collect();
                assert!(distinct.len() >= 2);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_spread_prefers_distinct_nodes() {
        let (_mgr, scheduler) = make_scheduler(&[(1, 8.0), (2, 8.0)]);
        let result = scheduler.schedule(&[cpus(1.0), cpus(1.0)], PlacementStrategy::Spread);
        match result {
            SchedulingResult::Success(nodes) => {
                assert_ne!(nodes[0], nodes[1]);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_spread_falls_back_to_reuse() {
        let (_mgr, scheduler) = make_scheduler(&[(1, 8.0)]);
        // Soft spread with one node: both bundles land on it.
        let result = scheduler.schedule(&[cpus(1.0), cpus(1.0)], PlacementStrategy::Spread);
        match result {
            SchedulingResult::Success(nodes) => {
                assert_eq!(nodes[0], nodes[1]);
            }
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_cluster_is_infeasible() {
        let (_mgr, scheduler) = make_scheduler(&[]);
        let result = scheduler.schedule(&[cpus(1.0)], PlacementStrategy::Pack);
        assert_eq!(result, SchedulingResult::Infeasible);
    }

    #[test]
    fn test_schedule_is_deterministic() {
        let (_mgr, scheduler) = make_scheduler(&[(4, 8.0), (2, 8.0), (7, 8.0)]);
        let required = [cpus(1.0), cpus(2.0), cpus(3.0)];
        let first = scheduler.schedule(&required, PlacementStrategy::Spread);
        for _ in 0..10 {
            assert_eq!(scheduler.schedule(&required, PlacementStrategy::Spread), first);
        }
    }
}
