// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Protocol types for Mantle.
//!
//! Every record persisted by the GCS and every RPC payload is a prost
//! message so table values and pub/sub payloads share one encoding.

pub mod rpc;
