// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Mantle ID types.
//!
//! Every logical entity is addressed by a fixed-size binary id:
//! - `JobID` (4 bytes)
//! - `ActorID` (16 bytes = 12 unique + 4 JobID)
//! - `TaskID` (24 bytes = 8 unique + 16 ActorID)
//! - `ObjectID` (28 bytes = 4 index + 24 TaskID)
//! - `PlacementGroupID` (18 bytes = 14 unique + 4 JobID)
//! - `UniqueID` / `WorkerID` / `NodeID` / `ClusterID` (28 bytes)
//! - `LeaseID` (32 bytes = 4 counter + 28 WorkerID)

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::constants::UNIQUE_ID_SIZE;

// ─── MurmurHash64A ──────────────────────────────────────────────────────────

fn murmur_hash_64a(key: &[u8], seed: u64) -> u64 {
    const M: u64 = 0xc6a4a7935bd1e995;
    const R: i32 = 47;

    let len = key.len();
    let mut h: u64 = seed ^ ((len as u64).wrapping_mul(M));

    let n_blocks = len / 8;
    for i in 0..n_blocks {
        let offset = i * 8;
        let mut k = u64::from_le_bytes(key[offset..offset + 8].try_into().unwrap());

        k = k.wrapping_mul(M);
        k ^= k >> R;
        k = k.wrapping_mul(M);

        h ^= k;
        h = h.wrapping_mul(M);
    }

    let tail = &key[n_blocks * 8..];
    let remaining = len & 7;
    if remaining >= 7 {
        h ^= (tail[6] as u64) << 48;
    }
    if remaining >= 6 {
        h ^= (tail[5] as u64) << 40;
    }
    if remaining >= 5 {
        h ^= (tail[4] as u64) << 32;
    }
    if remaining >= 4 {
        h ^= (tail[3] as u64) << 24;
    }
    if remaining >= 3 {
        h ^= (tail[2] as u64) << 16;
    }
    if remaining >= 2 {
        h ^= (tail[1] as u64) << 8;
    }
    if remaining >= 1 {
        h ^= tail[0] as u64;
        h = h.wrapping_mul(M);
    }

    h ^= h >> R;
    h = h.wrapping_mul(M);
    h ^= h >> R;

    h
}

// ─── ID Macro ────────────────────────────────────────────────────────────────

/// Generates a fixed-size Mantle ID type.
///
/// Each ID is a `[u8; N]` newtype with:
/// - `from_binary` / `from_hex` / `from_random` constructors
/// - `binary()` / `hex()` / `data()` accessors
/// - `Hash`, `Eq`, `PartialEq`, `Clone`, `Copy`, `Debug`, `Display`
/// - `nil` default (all 0xFF bytes)
macro_rules! define_mantle_id {
    ($name:ident, $size:expr) => {
        #[derive(Clone, Copy)]
        #[repr(C)]
        pub struct $name {
            data: [u8; $size],
        }

        impl $name {
            /// The fixed byte size of this ID type.
            pub const SIZE: usize = $size;

            /// Create a nil ID (all 0xFF bytes).
            pub const fn nil() -> Self {
                Self {
                    data: [0xFF; $size],
                }
            }

            /// Create an ID from raw bytes. Panics if `bytes.len() != SIZE`.
            pub fn from_binary(bytes: &[u8]) -> Self {
                assert_eq!(
                    bytes.len(),
                    $size,
                    "expected {} bytes for {}, got {}",
                    $size,
                    stringify!($name),
                    bytes.len()
                );
                let mut data = [0u8; $size];
                data.copy_from_slice(bytes);
                Self { data }
            }

            /// Create an ID from raw bytes of possibly wrong length. Returns
            /// `nil` when the length does not match. RPC payloads go through
            /// this so malformed requests cannot panic a handler.
            pub fn try_from_binary(bytes: &[u8]) -> Self {
                if bytes.len() != $size {
                    return Self::nil();
                }
                Self::from_binary(bytes)
            }

            /// Create an ID from a hex string. Returns `nil` on invalid input.
            pub fn from_hex(hex_str: &str) -> Self {
                if hex_str.len() != $size * 2 {
                    tracing::error!(
                        "incorrect hex string length for {}: expected {}, got {}",
                        stringify!($name),
                        $size * 2,
                        hex_str.len()
                    );
                    return Self::nil();
                }
                match hex::decode(hex_str) {
                    Ok(bytes) => Self::from_binary(&bytes),
                    Err(_) => {
                        tracing::error!("invalid hex string for {}", stringify!($name));
                        Self::nil()
                    }
                }
            }

            /// Create a random ID.
            pub fn from_random() -> Self {
                let mut data = [0u8; $size];
                mantle_util::random::fill_random(&mut data);
                Self { data }
            }

            /// Returns true if this is the nil ID (all 0xFF).
            pub fn is_nil(&self) -> bool {
                self.data == [0xFF; $size]
            }

            /// Raw byte array reference.
            pub fn data(&self) -> &[u8; $size] {
                &self.data
            }

            /// Raw bytes as `&[u8]`.
            pub fn as_bytes(&self) -> &[u8] {
                &self.data
            }

            /// Owned copy of the bytes.
            pub fn binary(&self) -> Vec<u8> {
                self.data.to_vec()
            }

            /// Hex-encoded string (lowercase).
            pub fn hex(&self) -> String {
                hex::encode(self.data)
            }

            /// Compute MurmurHash64A over the raw bytes.
            pub fn murmur_hash(&self) -> u64 {
                murmur_hash_64a(&self.data, 0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::nil()
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &Self) -> bool {
                self.data == other.data
            }
        }

        impl Eq for $name {}

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
                Some(self.cmp(other))
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &Self) -> std::cmp::Ordering {
                self.data.cmp(&other.data)
            }
        }

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.murmur_hash().hash(state);
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.hex())
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.data
            }
        }
    };
}

// ─── ID Type Definitions ────────────────────────────────────────────────────

define_mantle_id!(UniqueID, UNIQUE_ID_SIZE);

// JobID: 4 bytes
define_mantle_id!(JobID, 4);

// ActorID: 16 bytes (12 unique + 4 JobID)
define_mantle_id!(ActorID, 16);

// TaskID: 24 bytes (8 unique + 16 ActorID)
define_mantle_id!(TaskID, 24);

// ObjectID: 28 bytes (4 index + 24 TaskID)
define_mantle_id!(ObjectID, 28);

// PlacementGroupID: 18 bytes (14 unique + 4 JobID)
define_mantle_id!(PlacementGroupID, 18);

// LeaseID: 32 bytes (4 counter + 28 WorkerID)
define_mantle_id!(LeaseID, 32);

define_mantle_id!(WorkerID, UNIQUE_ID_SIZE);
define_mantle_id!(NodeID, UNIQUE_ID_SIZE);
define_mantle_id!(ClusterID, UNIQUE_ID_SIZE);

// ─── JobID extras ───────────────────────────────────────────────────────────

impl JobID {
    /// Create a JobID from a u32 counter.
    pub fn from_int(value: u32) -> Self {
        Self {
            data: value.to_be_bytes(),
        }
    }

    /// Convert to the u32 counter.
    pub fn to_int(&self) -> u32 {
        u32::from_be_bytes(self.data)
    }
}

// ─── ActorID extras ─────────────────────────────────────────────────────────

impl ActorID {
    const UNIQUE_BYTES_LENGTH: usize = 12;

    /// Create an ActorID deterministically from its creation context.
    pub fn of(job_id: &JobID, parent_task_id: &TaskID, parent_task_counter: usize) -> Self {
        let mut data = [0u8; 16];

        let mut hash_input = Vec::with_capacity(TaskID::SIZE + 8);
        hash_input.extend_from_slice(parent_task_id.as_bytes());
        hash_input.extend_from_slice(&(parent_task_counter as u64).to_le_bytes());

        let hash = murmur_hash_64a(&hash_input, 0);
        let hash_bytes = hash.to_le_bytes();

        data[..8].copy_from_slice(&hash_bytes);
        let hash2 = murmur_hash_64a(&hash_bytes, 1);
        let hash2_bytes = hash2.to_le_bytes();
        data[8..Self::UNIQUE_BYTES_LENGTH].copy_from_slice(&hash2_bytes[..4]);

        data[Self::UNIQUE_BYTES_LENGTH..].copy_from_slice(job_id.data());

        Self { data }
    }

    /// Extract the embedded JobID (last 4 bytes).
    pub fn job_id(&self) -> JobID {
        JobID::from_binary(&self.data[Self::UNIQUE_BYTES_LENGTH..])
    }
}

// ─── TaskID extras ──────────────────────────────────────────────────────────

impl TaskID {
    const UNIQUE_BYTES_LENGTH: usize = 8;

    /// Create a TaskID for an actor creation task.
    pub fn for_actor_creation_task(actor_id: &ActorID) -> Self {
        let mut data = [0u8; 24];
        data[Self::UNIQUE_BYTES_LENGTH..].copy_from_slice(actor_id.data());
        Self { data }
    }

    /// Create a TaskID for the driver task of a given job.
    pub fn for_driver_task(job_id: &JobID) -> Self {
        let actor_id = ActorID::of(job_id, &TaskID::nil(), 0);
        Self::for_actor_creation_task(&actor_id)
    }

    /// Extract the embedded ActorID (last 16 bytes).
    pub fn actor_id(&self) -> ActorID {
        ActorID::from_binary(&self.data[Self::UNIQUE_BYTES_LENGTH..])
    }

    /// Extract the embedded JobID (via the ActorID).
    pub fn job_id(&self) -> JobID {
        self.actor_id().job_id()
    }
}

// ─── ObjectID extras ────────────────────────────────────────────────────────

impl ObjectID {
    const INDEX_BYTES_LENGTH: usize = 4;

    /// Create an ObjectID from a TaskID and an object index.
    pub fn from_index(task_id: &TaskID, index: u32) -> Self {
        let mut data = [0u8; 28];
        data[..Self::INDEX_BYTES_LENGTH].copy_from_slice(&index.to_be_bytes());
        data[Self::INDEX_BYTES_LENGTH..].copy_from_slice(task_id.data());
        Self { data }
    }

    /// Get the object index (first 4 bytes as big-endian u32).
    pub fn object_index(&self) -> u32 {
        u32::from_be_bytes(self.data[..Self::INDEX_BYTES_LENGTH].try_into().unwrap())
    }

    /// Extract the embedded TaskID (last 24 bytes).
    pub fn task_id(&self) -> TaskID {
        TaskID::from_binary(&self.data[Self::INDEX_BYTES_LENGTH..])
    }
}

// ─── PlacementGroupID extras ────────────────────────────────────────────────

impl PlacementGroupID {
    const UNIQUE_BYTES_LENGTH: usize = 14;

    /// Create a random PlacementGroupID for a given job.
    pub fn of(job_id: &JobID) -> Self {
        let mut data = [0u8; 18];
        mantle_util::random::fill_random(&mut data[..Self::UNIQUE_BYTES_LENGTH]);
        data[Self::UNIQUE_BYTES_LENGTH..].copy_from_slice(job_id.data());
        Self { data }
    }

    /// Extract the embedded JobID (last 4 bytes).
    pub fn job_id(&self) -> JobID {
        JobID::from_binary(&self.data[Self::UNIQUE_BYTES_LENGTH..])
    }
}

// ─── LeaseID extras ─────────────────────────────────────────────────────────

impl LeaseID {
    /// Create a LeaseID from a worker ID and a counter.
    pub fn from_worker(worker_id: &WorkerID, counter: u32) -> Self {
        let mut data = [0u8; 32];
        data[..4].copy_from_slice(&counter.to_be_bytes());
        data[4..].copy_from_slice(worker_id.data());
        Self { data }
    }

    /// Extract the embedded WorkerID (last 28 bytes).
    pub fn worker_id(&self) -> WorkerID {
        WorkerID::from_binary(&self.data[4..])
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
