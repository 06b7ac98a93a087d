// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Event bus — publish path for cluster topic streams.
//!
//! Two backends, selected at boot by `grpc_pubsub_enabled`:
//! - `InternalPubSub`: in-process topic broker. Subscribers long-poll; the
//!   GCS holds the poll until messages arrive.
//! - `StorePubSub`: publishes through the store's native pub/sub.
//!
//! Publishing is fire-and-forget; a slow or absent subscriber never blocks
//! a manager.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use prost::Message;
use tokio::sync::{broadcast, Notify};

use mantle_proto::rpc;
use mantle_proto::rpc::ChannelType;

pub const ALL_CHANNELS: [ChannelType; 7] = [
    ChannelType::NodeInfoChannel,
    ChannelType::JobChannel,
    ChannelType::ActorChannel,
    ChannelType::WorkerDeltaChannel,
    ChannelType::ObjectLocationChannel,
    ChannelType::NodeResourceUsageChannel,
    ChannelType::ErrorInfoChannel,
];

/// Per-subscriber state for the long-poll delivery mechanism.
struct SubscriberState {
    /// Buffered messages waiting for delivery.
    pending_messages: Vec<rpc::PubMessage>,
    /// Monotonically increasing sequence ID for delivered messages.
    next_sequence_id: i64,
    /// Subscribed channels: channel_type → set of key_ids (empty = all keys).
    subscriptions: HashMap<i32, Vec<Vec<u8>>>,
}

/// In-process topic broker.
pub struct InternalPubSub {
    /// Per-channel broadcast senders (for in-process Rust subscribers).
    channels: HashMap<i32, broadcast::Sender<rpc::PubMessage>>,
    /// Per-subscriber state for long-poll delivery.
    subscribers: Mutex<HashMap<Vec<u8>, SubscriberState>>,
    /// Wakes long-polling subscribers.
    notify: Notify,
    /// Seed for per-subscriber sequence ids.
    sequence_counter: AtomicI64,
}

impl InternalPubSub {
    pub fn new() -> Self {
        let mut channels = HashMap::new();
        for channel in ALL_CHANNELS {
            let (tx, _) = broadcast::channel(1024);
            channels.insert(channel as i32, tx);
        }
        Self {
            channels,
            subscribers: Mutex::new(HashMap::new()),
            notify: Notify::new(),
            sequence_counter: AtomicI64::new(1),
        }
    }

    /// Publish an envelope to all matching subscribers.
    pub fn publish(&self, pub_message: rpc::PubMessage) {
        let channel_type = pub_message.channel_type;
        let key_id = pub_message.key_id.clone();

        if let Some(tx) = self.channels.get(&channel_type) {
            let _ = tx.send(pub_message.clone());
        }

        {
            let mut subs = self.subscribers.lock();
            for state in subs.values_mut() {
                if let Some(keys) = state.subscriptions.get(&channel_type) {
                    // Empty keys list means "all keys in this channel"
                    if keys.is_empty() || keys.contains(&key_id) {
                        let mut msg = pub_message.clone();
                        msg.sequence_id = state.next_sequence_id;
                        state.next_sequence_id += 1;
                        state.pending_messages.push(msg);
                    }
                }
            }
        }

        self.notify.notify_waiters();
    }

    /// Subscribe to a channel with a broadcast receiver (in-process use).
    pub fn subscribe(&self, channel: ChannelType) -> Option<broadcast::Receiver<rpc::PubMessage>> {
        self.channels.get(&(channel as i32)).map(|tx| tx.subscribe())
    }

    /// Register a subscriber for a channel + key. An empty key subscribes to
    /// every key on the channel.
    pub fn handle_subscribe_command(
        &self,
        subscriber_id: Vec<u8>,
        channel_type: i32,
        key_id: Vec<u8>,
    ) {
        let mut subs = self.subscribers.lock();
        let state = subs.entry(subscriber_id).or_insert_with(|| SubscriberState {
            pending_messages: Vec::new(),
            next_sequence_id: self.sequence_counter.fetch_add(1, Ordering::Relaxed),
            subscriptions: HashMap::new(),
        });
        let keys = state.subscriptions.entry(channel_type).or_default();
        if !key_id.is_empty() && !keys.contains(&key_id) {
            keys.push(key_id);
        }
    }

    /// Drop a subscriber entirely.
    pub fn handle_unsubscribe_command(&self, subscriber_id: &[u8]) {
        self.subscribers.lock().remove(subscriber_id);
    }

    /// Long poll for messages newer than `max_processed_sequence_id`.
    pub async fn handle_subscriber_poll(
        &self,
        subscriber_id: &[u8],
        max_processed_sequence_id: i64,
    ) -> Vec<rpc::PubMessage> {
        {
            let mut subs = self.subscribers.lock();
            if let Some(state) = subs.get_mut(subscriber_id) {
                state
                    .pending_messages
                    .retain(|m| m.sequence_id > max_processed_sequence_id);
                if !state.pending_messages.is_empty() {
                    return std::mem::take(&mut state.pending_messages);
                }
            }
        }

        // Wait for the next publish; the RPC layer bounds this with its own
        // poll timeout.
        self.notify.notified().await;

        let mut subs = self.subscribers.lock();
        if let Some(state) = subs.get_mut(subscriber_id) {
            state
                .pending_messages
                .retain(|m| m.sequence_id > max_processed_sequence_id);
            return std::mem::take(&mut state.pending_messages);
        }
        Vec::new()
    }
}

impl Default for InternalPubSub {
    fn default() -> Self {
        Self::new()
    }
}

/// Publishes envelopes through the store's native pub/sub.
pub struct StorePubSub {
    client: redis::Client,
    channel_prefix: String,
}

impl StorePubSub {
    pub fn new(redis_url: &str, channel_prefix: String) -> Result<Self, String> {
        let client = redis::Client::open(redis_url).map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            channel_prefix,
        })
    }

    fn channel_name(&self, channel_type: i32) -> String {
        format!("{}:channel:{}", self.channel_prefix, channel_type)
    }

    /// Fire-and-forget publish onto the store channel.
    pub fn publish(&self, pub_message: rpc::PubMessage) {
        let channel = self.channel_name(pub_message.channel_type);
        let payload = pub_message.encode_to_vec();
        let client = self.client.clone();
        tokio::spawn(async move {
            match client.get_multiplexed_async_connection().await {
                Ok(mut conn) => {
                    let result: Result<i64, _> = redis::cmd("PUBLISH")
                        .arg(&channel)
                        .arg(payload)
                        .query_async(&mut conn)
                        .await;
                    if let Err(e) = result {
                        tracing::warn!(%e, channel, "Store publish failed");
                    }
                }
                Err(e) => tracing::warn!(%e, channel, "Store publish connection failed"),
            }
        });
    }
}

/// The publish path handed to every manager.
pub enum GcsPublisher {
    InProcess(Arc<InternalPubSub>),
    Store(StorePubSub),
}

impl GcsPublisher {
    /// Encode `record` and publish it on `channel` under `key_id`.
    pub fn publish<M: Message>(&self, channel: ChannelType, key_id: Vec<u8>, record: &M) {
        let msg = rpc::PubMessage {
            channel_type: channel as i32,
            key_id,
            payload: record.encode_to_vec(),
            sequence_id: 0,
        };
        match self {
            GcsPublisher::InProcess(broker) => broker.publish(msg),
            GcsPublisher::Store(store) => store.publish(msg),
        }
    }

    /// The in-process broker, when that backend is active (needed by the
    /// pub/sub RPC service).
    pub fn in_process(&self) -> Option<&Arc<InternalPubSub>> {
        match self {
            GcsPublisher::InProcess(broker) => Some(broker),
            GcsPublisher::Store(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_pub_msg(channel_type: i32, key_id: &[u8]) -> rpc::PubMessage {
        rpc::PubMessage {
            channel_type,
            key_id: key_id.to_vec(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe_broadcast() {
        let broker = InternalPubSub::new();
        let mut rx = broker.subscribe(ChannelType::ActorChannel).unwrap();

        broker.publish(make_pub_msg(ChannelType::ActorChannel as i32, b"actor1"));

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.channel_type, ChannelType::ActorChannel as i32);
        assert_eq!(msg.key_id, b"actor1");
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let broker = InternalPubSub::new();

        broker.handle_subscribe_command(b"sub1".to_vec(), ChannelType::ActorChannel as i32, vec![]);
        assert!(broker.subscribers.lock().contains_key(&b"sub1".to_vec()));

        broker.handle_unsubscribe_command(b"sub1");
        assert!(!broker.subscribers.lock().contains_key(&b"sub1".to_vec()));

        // Double-unsubscribe should not panic
        broker.handle_unsubscribe_command(b"sub1");
    }

    #[tokio::test]
    async fn test_long_poll_delivery() {
        let broker = InternalPubSub::new();
        broker.handle_subscribe_command(b"sub1".to_vec(), ChannelType::ActorChannel as i32, vec![]);

        broker.publish(make_pub_msg(ChannelType::ActorChannel as i32, b"a"));
        broker.publish(make_pub_msg(ChannelType::ActorChannel as i32, b"b"));

        let messages = broker.handle_subscriber_poll(b"sub1", 0).await;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].key_id, b"a");
        assert_eq!(messages[1].key_id, b"b");
    }

    #[test]
    fn test_channel_isolation() {
        let broker = InternalPubSub::new();
        broker.handle_subscribe_command(b"sub1".to_vec(), ChannelType::ActorChannel as i32, vec![]);

        // Publish to a different channel — sub1 should not see it
        broker.publish(make_pub_msg(ChannelType::JobChannel as i32, b"job1"));

        let subs = broker.subscribers.lock();
        let state = subs.get(&b"sub1".to_vec()).unwrap();
        assert!(state.pending_messages.is_empty());
    }

    #[test]
    fn test_key_filtering() {
        let broker = InternalPubSub::new();
        broker.handle_subscribe_command(
            b"sub1".to_vec(),
            ChannelType::ActorChannel as i32,
            b"actor_a".to_vec(),
        );

        broker.publish(make_pub_msg(ChannelType::ActorChannel as i32, b"actor_a"));
        broker.publish(make_pub_msg(ChannelType::ActorChannel as i32, b"actor_b"));

        let subs = broker.subscribers.lock();
        let state = subs.get(&b"sub1".to_vec()).unwrap();
        assert_eq!(state.pending_messages.len(), 1);
        assert_eq!(state.pending_messages[0].key_id, b"actor_a");
    }

    #[test]
    fn test_empty_key_receives_all() {
        let broker = InternalPubSub::new();
        broker.handle_subscribe_command(b"sub1".to_vec(), ChannelType::ActorChannel as i32, vec![]);

        for key in [b"a".as_slice(), b"b", b"c"] {
            broker.publish(make_pub_msg(ChannelType::ActorChannel as i32, key));
        }

        let subs = broker.subscribers.lock();
        let state = subs.get(&b"sub1".to_vec()).unwrap();
        assert_eq!(state.pending_messages.len(), 3);
    }

    #[tokio::test]
    async fn test_poll_filters_by_max_sequence_id() {
        let broker = InternalPubSub::new();
        broker.handle_subscribe_command(b"sub1".to_vec(), ChannelType::ActorChannel as i32, vec![]);

        broker.publish(make_pub_msg(ChannelType::ActorChannel as i32, b"a"));
        broker.publish(make_pub_msg(ChannelType::ActorChannel as i32, b"b"));

        let messages = broker.handle_subscriber_poll(b"sub1", 0).await;
        let max_seq = messages.iter().map(|m| m.sequence_id).max().unwrap();

        broker.publish(make_pub_msg(ChannelType::ActorChannel as i32, b"c"));

        let messages = broker.handle_subscriber_poll(b"sub1", max_seq).await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key_id, b"c");
    }

    #[test]
    fn test_sequence_ids_are_monotonic() {
        let broker = InternalPubSub::new();
        broker.handle_subscribe_command(b"sub1".to_vec(), ChannelType::ActorChannel as i32, vec![]);

        for i in 0..5 {
            broker.publish(make_pub_msg(
                ChannelType::ActorChannel as i32,
                format!("k{i}").as_bytes(),
            ));
        }

        let subs = broker.subscribers.lock();
        let state = subs.get(&b"sub1".to_vec()).unwrap();
        let seq_ids: Vec<i64> = state.pending_messages.iter().map(|m| m.sequence_id).collect();
        for i in 1..seq_ids.len() {
            assert!(seq_ids[i] > seq_ids[i - 1], "sequence IDs must be monotonic");
        }
    }

    #[tokio::test]
    async fn test_long_poll_wakes_on_publish() {
        let broker = Arc::new(InternalPubSub::new());
        broker.handle_subscribe_command(b"sub1".to_vec(), ChannelType::ActorChannel as i32, vec![]);

        let broker_clone = Arc::clone(&broker);
        let poll_handle =
            tokio::spawn(async move { broker_clone.handle_subscriber_poll(b"sub1", 0).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        broker.publish(make_pub_msg(ChannelType::ActorChannel as i32, b"wake"));

        let messages = tokio::time::timeout(std::time::Duration::from_secs(1), poll_handle)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key_id, b"wake");
    }

    #[tokio::test]
    async fn test_publisher_encodes_records() {
        let broker = Arc::new(InternalPubSub::new());
        let publisher = GcsPublisher::InProcess(Arc::clone(&broker));
        let mut rx = broker.subscribe(ChannelType::NodeInfoChannel).unwrap();

        let node = rpc::NodeInfo {
            node_id: vec![5u8; 28],
            state: rpc::NodeState::Alive as i32,
            ..Default::default()
        };
        publisher.publish(ChannelType::NodeInfoChannel, node.node_id.clone(), &node);

        let msg = rx.recv().await.unwrap();
        let decoded = rpc::NodeInfo::decode(msg.payload.as_slice()).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_all_channels_created() {
        let broker = InternalPubSub::new();
        for channel in ALL_CHANNELS {
            assert!(broker.subscribe(channel).is_some());
        }
    }
}
