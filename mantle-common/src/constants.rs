// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Cluster-wide constants.

/// Length of Mantle full-length unique IDs in bytes.
pub const UNIQUE_ID_SIZE: usize = 28;

/// Precision of fractional resource quantities.
pub const RESOURCE_UNIT_SCALING: i32 = 10000;

/// Mantle version string.
pub const MANTLE_VERSION: &str = "0.1.0";

/// Reserved store key holding the "<ip>:<port>" of the active GCS.
pub const GCS_SERVER_ADDRESS_KEY: &str = "GcsServerAddress";

/// Reserved store key holding the cluster ID.
pub const CLUSTER_ID_KEY: &str = "mantle_cluster_id";

/// Name of the CPU resource.
pub const CPU_RESOURCE: &str = "CPU";

/// Name of the GPU resource.
pub const GPU_RESOURCE: &str = "GPU";

/// URI scheme for runtime-env resources stored in the GCS internal KV.
pub const GCS_URI_SCHEME: &str = "gcs";

/// Anonymous namespace prefix for jobs that do not set one explicitly.
pub const ANONYMOUS_NAMESPACE_PREFIX: &str = "_anonymous_namespace_";
