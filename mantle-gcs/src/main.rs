// Copyright 2025 The Mantle Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//  http://www.apache.org/licenses/LICENSE-2.0

//! GCS server binary entry point.

use clap::Parser;

use mantle_common::config::MantleConfig;
use mantle_gcs::server::{GcsServer, GcsServerConfig};

#[derive(Parser, Debug)]
#[command(name = "gcs_server", about = "Mantle Global Control Store server")]
struct Args {
    /// GCS server port (0 = pick a free port)
    #[arg(long, default_value_t = 6379)]
    gcs_server_port: u16,

    /// Number of gRPC server threads
    #[arg(long, default_value_t = 1)]
    grpc_server_thread_num: usize,

    /// Store address (e.g. redis://host:port); omit for in-memory
    #[arg(long)]
    store_address: Option<String>,

    /// Store password
    #[arg(long)]
    store_password: Option<String>,

    /// Node IP address advertised as the GCS address
    #[arg(long)]
    node_ip_address: Option<String>,

    /// Session name namespacing all store keys
    #[arg(long, default_value = "default")]
    session_name: String,

    /// Log directory
    #[arg(long)]
    log_dir: Option<String>,

    /// Base64-encoded JSON configuration blob
    #[arg(long)]
    config_list: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    mantle_util::logging::init_logging(
        "gcs_server",
        args.log_dir.as_ref().map(std::path::Path::new),
        0,
    );

    let config = match &args.config_list {
        Some(b64) => MantleConfig::from_base64_json(b64)
            .map_err(|e| anyhow::anyhow!("invalid --config-list: {e}"))?,
        None => MantleConfig::default(),
    };

    let server_config = GcsServerConfig {
        grpc_server_name: "GcsServer".to_string(),
        grpc_server_port: args.gcs_server_port,
        grpc_server_thread_num: args.grpc_server_thread_num,
        node_ip_address: args.node_ip_address.unwrap_or_default(),
        store_address: args.store_address,
        store_password: args.store_password,
        session_name: args.session_name,
        config,
    };

    let server = GcsServer::start(server_config).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");
    server.stop().await;
    Ok(())
}
