// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Async runtime helpers.

use std::time::Duration;
use tokio::task::JoinHandle;

/// A periodical runner that executes a callback at fixed intervals until
/// stopped or dropped.
pub struct PeriodicalRunner {
    handle: Option<JoinHandle<()>>,
}

impl PeriodicalRunner {
    /// Start running `callback` every `interval` on the current runtime.
    pub fn start<F>(interval: Duration, callback: F) -> Self
    where
        F: Fn() + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                callback();
            }
        });
        Self {
            handle: Some(handle),
        }
    }

    /// Stop the periodical runner.
    pub fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for PeriodicalRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
