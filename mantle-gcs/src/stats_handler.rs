// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS Stats Handler — profile event recording.

use std::collections::VecDeque;

use parking_lot::Mutex;

use mantle_proto::rpc;

/// Cap on buffered profile events.
const MAX_PROFILE_EVENTS: usize = 1_000;

pub struct GcsStatsHandler {
    profile_events: Mutex<VecDeque<rpc::ProfileEventData>>,
}

impl GcsStatsHandler {
    pub fn new() -> Self {
        Self {
            profile_events: Mutex::new(VecDeque::new()),
        }
    }

    /// Handle AddProfileData RPC.
    pub fn handle_add_profile_data(&self, data: rpc::ProfileEventData) {
        let mut events = self.profile_events.lock();
        if events.len() >= MAX_PROFILE_EVENTS {
            events.pop_front();
        }
        events.push_back(data);
    }

    /// All buffered profile events, oldest first.
    pub fn handle_get_all_profile_info(&self) -> Vec<rpc::ProfileEventData> {
        self.profile_events.lock().iter().cloned().collect()
    }

    pub fn num_profile_events(&self) -> usize {
        self.profile_events.lock().len()
    }
}

impl Default for GcsStatsHandler {
    fn default() -> Self {
        Self::new()
    }
}
