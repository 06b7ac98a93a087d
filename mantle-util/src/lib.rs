// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Utility library for Mantle.
//!
//! Provides logging, timing, backoff, randomness and networking helpers
//! shared by all Mantle crates.

pub mod backoff;
pub mod logging;
pub mod network;
pub mod random;
pub mod time;
