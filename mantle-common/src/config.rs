// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Mantle configuration.
//!
//! The launcher passes configuration as a base64-encoded JSON blob; each
//! field may also be overridden through a `MANTLE_<field_name>` environment
//! variable.

/// Mantle configuration parameters observed at boot.
#[derive(Debug, Clone)]
pub struct MantleConfig {
    // ─── GCS server ───────────────────────────────────────────
    pub gcs_server_port: i32,
    pub grpc_server_thread_num: usize,

    // ─── Event bus / pub-sub ──────────────────────────────────
    /// Use the in-process topic broker instead of the store's pub/sub.
    pub grpc_pubsub_enabled: bool,
    pub subscriber_timeout_ms: u64,
    pub publish_batch_size: usize,

    // ─── Resource reporting ───────────────────────────────────
    /// Push-based resource broadcast; mutually exclusive with pull-mode
    /// publishing on the event bus.
    pub grpc_based_resource_broadcast: bool,
    pub gcs_pull_resource_loads_period_ms: u64,
    pub resource_broadcast_period_ms: u64,

    // ─── Failure detection ────────────────────────────────────
    pub heartbeat_period_ms: u64,
    pub num_heartbeats_timeout: u32,
    pub store_reconnect_attempts: u32,
    pub store_ping_period_ms: u64,

    // ─── Actor lifecycle ──────────────────────────────────────
    /// Delay before dead-actor metadata is garbage collected.
    pub actor_gc_delay_ms: u64,

    // ─── Debug / stats ────────────────────────────────────────
    pub metrics_report_interval_ms: u64,
    pub debug_dump_period_ms: u64,
    pub event_stats: bool,
    pub event_stats_print_interval_ms: i64,
}

impl Default for MantleConfig {
    fn default() -> Self {
        Self {
            gcs_server_port: 6379,
            grpc_server_thread_num: 1,
            grpc_pubsub_enabled: true,
            subscriber_timeout_ms: 300_000,
            publish_batch_size: 5000,
            grpc_based_resource_broadcast: false,
            gcs_pull_resource_loads_period_ms: 1_000,
            resource_broadcast_period_ms: 100,
            heartbeat_period_ms: 1_000,
            num_heartbeats_timeout: 5,
            store_reconnect_attempts: 3,
            store_ping_period_ms: 1_000,
            actor_gc_delay_ms: 60_000,
            metrics_report_interval_ms: 10_000,
            debug_dump_period_ms: 10_000,
            event_stats: true,
            event_stats_print_interval_ms: 60_000,
        }
    }
}

impl MantleConfig {
    /// Parse from base64-encoded JSON (as sent by the launcher).
    pub fn from_base64_json(b64: &str) -> Result<Self, String> {
        let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, b64)
            .map_err(|e| format!("base64 decode error: {e}"))?;
        let json_str =
            String::from_utf8(decoded).map_err(|e| format!("UTF-8 decode error: {e}"))?;
        Self::from_json(&json_str)
    }

    /// Parse from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let map: serde_json::Map<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|e| format!("JSON parse error: {e}"))?;

        let mut config = Self::default();

        macro_rules! set_field {
            ($field:ident, bool) => {
                if let Some(v) = map.get(stringify!($field)).and_then(|v| v.as_bool()) {
                    config.$field = v;
                }
            };
            ($field:ident, u64) => {
                if let Some(v) = map.get(stringify!($field)).and_then(|v| v.as_u64()) {
                    config.$field = v;
                }
            };
            ($field:ident, i64) => {
                if let Some(v) = map.get(stringify!($field)).and_then(|v| v.as_i64()) {
                    config.$field = v;
                }
            };
            ($field:ident, i32) => {
                if let Some(v) = map.get(stringify!($field)).and_then(|v| v.as_i64()) {
                    config.$field = v as i32;
                }
            };
            ($field:ident, u32) => {
                if let Some(v) = map.get(stringify!($field)).and_then(|v| v.as_u64()) {
                    config.$field = v as u32;
                }
            };
            ($field:ident, usize) => {
                if let Some(v) = map.get(stringify!($field)).and_then(|v| v.as_u64()) {
                    config.$field = v as usize;
                }
            };
        }

        set_field!(gcs_server_port, i32);
        set_field!(grpc_server_thread_num, usize);
        set_field!(grpc_pubsub_enabled, bool);
        set_field!(subscriber_timeout_ms, u64);
        set_field!(publish_batch_size, usize);
        set_field!(grpc_based_resource_broadcast, bool);
        set_field!(gcs_pull_resource_loads_period_ms, u64);
        set_field!(resource_broadcast_period_ms, u64);
        set_field!(heartbeat_period_ms, u64);
        set_field!(num_heartbeats_timeout, u32);
        set_field!(store_reconnect_attempts, u32);
        set_field!(store_ping_period_ms, u64);
        set_field!(actor_gc_delay_ms, u64);
        set_field!(metrics_report_interval_ms, u64);
        set_field!(debug_dump_period_ms, u64);
        set_field!(event_stats, bool);
        set_field!(event_stats_print_interval_ms, i64);

        config.apply_env_overrides();

        Ok(config)
    }

    /// Apply environment variable overrides of the form `MANTLE_<name>`.
    fn apply_env_overrides(&mut self) {
        macro_rules! env_override {
            ($field:ident, $ty:ty) => {
                let env_key = concat!("MANTLE_", stringify!($field));
                if let Ok(val) = std::env::var(env_key) {
                    if let Ok(v) = val.parse::<$ty>() {
                        self.$field = v;
                    }
                }
            };
        }

        env_override!(grpc_pubsub_enabled, bool);
        env_override!(grpc_based_resource_broadcast, bool);
        env_override!(heartbeat_period_ms, u64);
        env_override!(num_heartbeats_timeout, u32);
        env_override!(gcs_pull_resource_loads_period_ms, u64);
        env_override!(resource_broadcast_period_ms, u64);
        env_override!(actor_gc_delay_ms, u64);
        env_override!(event_stats, bool);
    }
}
