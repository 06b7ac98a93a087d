// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Task Manager — task event recording.
//!
//! A bounded in-memory ring of recent task events for debugging tools.
//! When the ring is full the oldest events are dropped and counted.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};

use parking_lot::Mutex;

use mantle_proto::rpc;

/// Default cap on buffered task events.
const DEFAULT_MAX_EVENTS: usize = 10_000;

pub struct GcsTaskManager {
    events: Mutex<VecDeque<rpc::TaskEventData>>,
    max_events: usize,
    dropped: AtomicI64,
}

impl GcsTaskManager {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_EVENTS)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            max_events,
            dropped: AtomicI64::new(0),
        }
    }

    /// Handle RecordTaskEvents RPC. Returns how many events have been
    /// dropped since start.
    pub fn handle_record_task_events(&self, new_events: Vec<rpc::TaskEventData>) -> i64 {
        let mut events = self.events.lock();
        for event in new_events {
            if events.len() >= self.max_events {
                events.pop_front();
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            events.push_back(event);
        }
        self.dropped.load(Ordering::Relaxed)
    }

    /// Most recent events, newest last.
    pub fn handle_get_task_events(&self, limit: Option<usize>) -> Vec<rpc::TaskEventData> {
        let events = self.events.lock();
        let take = limit.unwrap_or(events.len()).min(events.len());
        events.iter().skip(events.len() - take).cloned().collect()
    }

    pub fn num_buffered_events(&self) -> usize {
        self.events.lock().len()
    }

    pub fn num_dropped_events(&self) -> i64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn debug_string(&self) -> String {
        format!(
            "GcsTaskManager: {{buffered: {}, dropped: {}}}",
            self.num_buffered_events(),
            self.num_dropped_events()
        )
    }
}

impl Default for GcsTaskManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_event(v: u8) -> rpc::TaskEventData {
        rpc::TaskEventData {
            task_id: vec![v; 24],
            state: "RUNNING".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_record_and_get() {
        let mgr = GcsTaskManager::new();
        mgr.handle_record_task_events(vec![make_event(1), make_event(2)]);
        assert_eq!(mgr.num_buffered_events(), 2);

        let events = mgr.handle_get_task_events(Some(1));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].task_id, vec![2u8; 24]);
    }

    #[test]
    fn test_ring_drops_oldest() {
        let mgr = GcsTaskManager::with_capacity(3);
        for v in 1..=5u8 {
            mgr.handle_record_task_events(vec![make_event(v)]);
        }
        assert_eq!(mgr.num_buffered_events(), 3);
        assert_eq!(mgr.num_dropped_events(), 2);

        let events = mgr.handle_get_task_events(None);
        assert_eq!(events[0].task_id, vec![3u8; 24]);
    }
}
