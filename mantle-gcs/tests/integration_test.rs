// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! Integration tests booting the whole GCS server and calling it over the
//! bound port, the way nodelets and drivers do.

use std::sync::Arc;

use mantle_gcs::server::{GcsServer, GcsServerConfig};
use mantle_proto::rpc;

async fn start_test_server() -> Arc<GcsServer> {
    GcsServer::start(GcsServerConfig::default()).await.unwrap()
}

/// Wire-level unary call against the running server, mirroring what the
/// hand-written outbound clients do.
async fn call_unary<Req, Reply>(
    server: &GcsServer,
    path: &'static str,
    request: Req,
) -> Result<Reply, tonic::Status>
where
    Req: prost::Message + Send + Sync + 'static,
    Reply: prost::Message + Default + Send + Sync + 'static,
{
    let endpoint = tonic::transport::Endpoint::from_shared(format!(
        "http://127.0.0.1:{}",
        server.bound_addr().port()
    ))
    .map_err(|e| tonic::Status::internal(e.to_string()))?;
    let channel = endpoint
        .connect()
        .await
        .map_err(|e| tonic::Status::unavailable(e.to_string()))?;
    let mut grpc = tonic::client::Grpc::new(channel);
    grpc.ready()
        .await
        .map_err(|e| tonic::Status::unavailable(e.to_string()))?;
    let codec = tonic::codec::ProstCodec::default();
    let path = http::uri::PathAndQuery::from_static(path);
    let response = grpc.unary(tonic::Request::new(request), path, codec).await?;
    Ok(response.into_inner())
}

#[tokio::test]
async fn test_server_binds_and_health_checks() {
    let server = start_test_server().await;
    let endpoint = format!("http://127.0.0.1:{}", server.bound_addr().port());

    let channel = tonic::transport::Endpoint::from_shared(endpoint)
        .unwrap()
        .connect_lazy();
    let mut client = tonic_health::pb::health_client::HealthClient::new(channel);

    let resp = client
        .check(tonic_health::pb::HealthCheckRequest {
            service: String::new(),
        })
        .await;
    assert!(resp.is_ok());

    server.stop().await;
}

#[tokio::test]
async fn test_job_rpc_roundtrip() {
    let server = start_test_server().await;

    let _: rpc::AddJobReply = call_unary(
        &server,
        "/mantle.rpc.JobInfoGcsService/AddJob",
        rpc::AddJobRequest {
            data: Some(rpc::JobTableData {
                job_id: vec![0, 0, 0, 1],
                ..Default::default()
            }),
        },
    )
    .await
    .unwrap();

    let reply: rpc::GetAllJobInfoReply = call_unary(
        &server,
        "/mantle.rpc.JobInfoGcsService/GetAllJobInfo",
        rpc::GetAllJobInfoRequest { limit: None },
    )
    .await
    .unwrap();
    assert_eq!(reply.job_info_list.len(), 1);

    let _: rpc::MarkJobFinishedReply = call_unary(
        &server,
        "/mantle.rpc.JobInfoGcsService/MarkJobFinished",
        rpc::MarkJobFinishedRequest {
            job_id: vec![0, 0, 0, 1],
        },
    )
    .await
    .unwrap();

    let reply: rpc::GetAllJobInfoReply = call_unary(
        &server,
        "/mantle.rpc.JobInfoGcsService/GetAllJobInfo",
        rpc::GetAllJobInfoRequest { limit: None },
    )
    .await
    .unwrap();
    assert!(reply.job_info_list[0].is_dead);

    server.stop().await;
}

#[tokio::test]
async fn test_job_ids_are_monotonic() {
    let server = start_test_server().await;

    let first: rpc::GetNextJobIdReply = call_unary(
        &server,
        "/mantle.rpc.JobInfoGcsService/GetNextJobID",
        rpc::GetNextJobIdRequest {},
    )
    .await
    .unwrap();
    let second: rpc::GetNextJobIdReply = call_unary(
        &server,
        "/mantle.rpc.JobInfoGcsService/GetNextJobID",
        rpc::GetNextJobIdRequest {},
    )
    .await
    .unwrap();
    assert!(second.job_id > first.job_id);

    server.stop().await;
}

#[tokio::test]
async fn test_node_rpc_roundtrip() {
    let server = start_test_server().await;

    let node_id = vec![42u8; 28];
    let _: rpc::RegisterNodeReply = call_unary(
        &server,
        "/mantle.rpc.NodeInfoGcsService/RegisterNode",
        rpc::RegisterNodeRequest {
            node_info: Some(rpc::NodeInfo {
                node_id: node_id.clone(),
                nodelet_address: "127.0.0.1".to_string(),
                nodelet_port: 9100,
                state: rpc::NodeState::Alive as i32,
                ..Default::default()
            }),
        },
    )
    .await
    .unwrap();

    let reply: rpc::GetAllNodeInfoReply = call_unary(
        &server,
        "/mantle.rpc.NodeInfoGcsService/GetAllNodeInfo",
        rpc::GetAllNodeInfoRequest {},
    )
    .await
    .unwrap();
    assert_eq!(reply.node_info_list.len(), 1);
    assert_eq!(reply.node_info_list[0].node_id, node_id);

    // Membership fanned out to the failure detector and resource view.
    assert_eq!(server.heartbeat_manager().num_monitored_nodes(), 1);
    assert_eq!(server.resource_manager().num_tracked_nodes(), 1);

    // A registered node heartbeats successfully; an unknown one is told to
    // re-register.
    let _: rpc::ReportHeartbeatReply = call_unary(
        &server,
        "/mantle.rpc.HeartbeatInfoGcsService/ReportHeartbeat",
        rpc::ReportHeartbeatRequest {
            node_id: node_id.clone(),
        },
    )
    .await
    .unwrap();
    let unknown: Result<rpc::ReportHeartbeatReply, tonic::Status> = call_unary(
        &server,
        "/mantle.rpc.HeartbeatInfoGcsService/ReportHeartbeat",
        rpc::ReportHeartbeatRequest {
            node_id: vec![9u8; 28],
        },
    )
    .await;
    assert_eq!(unknown.unwrap_err().code(), tonic::Code::NotFound);

    let _: rpc::UnregisterNodeReply = call_unary(
        &server,
        "/mantle.rpc.NodeInfoGcsService/UnregisterNode",
        rpc::UnregisterNodeRequest {
            node_id: node_id.clone(),
        },
    )
    .await
    .unwrap();

    let reply: rpc::GetAllNodeInfoReply = call_unary(
        &server,
        "/mantle.rpc.NodeInfoGcsService/GetAllNodeInfo",
        rpc::GetAllNodeInfoRequest {},
    )
    .await
    .unwrap();
    assert_eq!(reply.node_info_list[0].state, rpc::NodeState::Dead as i32);
    assert_eq!(server.heartbeat_manager().num_monitored_nodes(), 0);
    assert_eq!(server.resource_manager().num_tracked_nodes(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_actor_register_and_get_over_wire() {
    let server = start_test_server().await;

    let actor_id = vec![7u8; 16];
    let _: rpc::RegisterActorReply = call_unary(
        &server,
        "/mantle.rpc.ActorInfoGcsService/RegisterActor",
        rpc::RegisterActorRequest {
            spec: Some(rpc::ActorCreationSpec {
                actor_id: actor_id.clone(),
                job_id: vec![0, 0, 0, 1],
                name: "svc".to_string(),
                namespace: "ns".to_string(),
                ..Default::default()
            }),
        },
    )
    .await
    .unwrap();

    // Duplicate name in the same namespace fails over the wire.
    let conflict: Result<rpc::RegisterActorReply, tonic::Status> = call_unary(
        &server,
        "/mantle.rpc.ActorInfoGcsService/RegisterActor",
        rpc::RegisterActorRequest {
            spec: Some(rpc::ActorCreationSpec {
                actor_id: vec![8u8; 16],
                job_id: vec![0, 0, 0, 1],
                name: "svc".to_string(),
                namespace: "ns".to_string(),
                ..Default::default()
            }),
        },
    )
    .await;
    assert_eq!(conflict.unwrap_err().code(), tonic::Code::AlreadyExists);

    let reply: rpc::GetNamedActorInfoReply = call_unary(
        &server,
        "/mantle.rpc.ActorInfoGcsService/GetNamedActorInfo",
        rpc::GetNamedActorInfoRequest {
            name: "svc".to_string(),
            namespace: "ns".to_string(),
        },
    )
    .await
    .unwrap();
    assert_eq!(reply.actor_table_data.unwrap().actor_id, actor_id);

    server.stop().await;
}

#[tokio::test]
async fn test_cluster_id_is_set() {
    let server = start_test_server().await;
    let reply: rpc::GetClusterIdReply = call_unary(
        &server,
        "/mantle.rpc.NodeInfoGcsService/GetClusterId",
        rpc::GetClusterIdRequest {},
    )
    .await
    .unwrap();
    assert!(!reply.cluster_id.is_empty());
    server.stop().await;
}

#[tokio::test]
async fn test_kv_rpc_roundtrip() {
    let server = start_test_server().await;

    let put: rpc::InternalKvPutReply = call_unary(
        &server,
        "/mantle.rpc.InternalKVGcsService/InternalKVPut",
        rpc::InternalKvPutRequest {
            namespace: b"test-ns".to_vec(),
            key: b"hello".to_vec(),
            value: b"world".to_vec(),
            overwrite: true,
        },
    )
    .await
    .unwrap();
    assert!(put.added);

    let get: rpc::InternalKvGetReply = call_unary(
        &server,
        "/mantle.rpc.InternalKVGcsService/InternalKVGet",
        rpc::InternalKvGetRequest {
            namespace: b"test-ns".to_vec(),
            key: b"hello".to_vec(),
        },
    )
    .await
    .unwrap();
    assert_eq!(get.value, Some(b"world".to_vec()));

    let keys: rpc::InternalKvKeysReply = call_unary(
        &server,
        "/mantle.rpc.InternalKVGcsService/InternalKVKeys",
        rpc::InternalKvKeysRequest {
            namespace: b"test-ns".to_vec(),
            prefix: b"hel".to_vec(),
        },
    )
    .await
    .unwrap();
    assert_eq!(keys.results.len(), 1);

    let del: rpc::InternalKvDelReply = call_unary(
        &server,
        "/mantle.rpc.InternalKVGcsService/InternalKVDel",
        rpc::InternalKvDelRequest {
            namespace: b"test-ns".to_vec(),
            key: b"hello".to_vec(),
            del_by_prefix: false,
        },
    )
    .await
    .unwrap();
    assert_eq!(del.deleted_num, 1);

    let exists: rpc::InternalKvExistsReply = call_unary(
        &server,
        "/mantle.rpc.InternalKVGcsService/InternalKVExists",
        rpc::InternalKvExistsRequest {
            namespace: b"test-ns".to_vec(),
            key: b"hello".to_vec(),
        },
    )
    .await
    .unwrap();
    assert!(!exists.exists);

    server.stop().await;
}

#[tokio::test]
async fn test_pubsub_rpc_roundtrip() {
    let server = start_test_server().await;

    let _: rpc::GcsSubscribeReply = call_unary(
        &server,
        "/mantle.rpc.InternalPubSubGcsService/GcsSubscribe",
        rpc::GcsSubscribeRequest {
            subscriber_id: b"sub1".to_vec(),
            channel_type: rpc::ChannelType::NodeInfoChannel as i32,
            key_id: vec![],
        },
    )
    .await
    .unwrap();

    // A node registration publishes on the node-info channel.
    let _: rpc::RegisterNodeReply = call_unary(
        &server,
        "/mantle.rpc.NodeInfoGcsService/RegisterNode",
        rpc::RegisterNodeRequest {
            node_info: Some(rpc::NodeInfo {
                node_id: vec![3u8; 28],
                state: rpc::NodeState::Alive as i32,
                ..Default::default()
            }),
        },
    )
    .await
    .unwrap();

    let reply: rpc::GcsSubscriberPollReply = call_unary(
        &server,
        "/mantle.rpc.InternalPubSubGcsService/GcsSubscriberPoll",
        rpc::GcsSubscriberPollRequest {
            subscriber_id: b"sub1".to_vec(),
            max_processed_sequence_id: 0,
        },
    )
    .await
    .unwrap();
    assert_eq!(reply.pub_messages.len(), 1);
    assert_eq!(reply.pub_messages[0].key_id, vec![3u8; 28]);

    server.stop().await;
}

#[tokio::test]
async fn test_rpc_port_closes_after_stop() {
    let server = start_test_server().await;
    let port = server.bound_addr().port();
    server.stop().await;

    // Give the listener a moment to wind down, then the port is free.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert!(mantle_util::network::is_port_available(
        std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
        port
    ));
}
