// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Serve an in-memory file tree over 9P2000 on a TCP listener.
// Author: Lukas Bower

//! Entry point for the in-memory 9P2000 server.

use std::net::TcpListener;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, ArgAction, Command};
use log::info;
use ninegate::node::Node;
use ninegate::ram::{QidAllocator, RamDir};
use ninegate::server::{serve_listener, FileService, ServiceConfig};
use ninegate_wire::FileMode;

fn build_cli() -> Command {
    Command::new("ninegate-ramfs")
        .version("0.1")
        .about("Serve an in-memory file tree over 9P2000")
        .arg(
            Arg::new("service")
                .value_name("SERVICE")
                .help("Attach service name the tree is exposed under")
                .required(true),
        )
        .arg(
            Arg::new("user")
                .value_name("USER")
                .help("Owner of the root directory")
                .required(true),
        )
        .arg(
            Arg::new("group")
                .value_name("GROUP")
                .help("Group of the root directory")
                .required(true),
        )
        .arg(
            Arg::new("addr")
                .value_name("ADDR")
                .help("TCP listen address, e.g. 0.0.0.0:5640")
                .required(true),
        )
        .arg(
            Arg::new("chatty")
                .long("chatty")
                .help("Log one line per request")
                .action(ArgAction::SetTrue),
        )
}

fn main() -> Result<()> {
    env_logger::init();
    let matches = build_cli().get_matches();
    let service_name = matches
        .get_one::<String>("service")
        .context("missing service")?;
    let user = matches.get_one::<String>("user").context("missing user")?;
    let group = matches.get_one::<String>("group").context("missing group")?;
    let addr = matches.get_one::<String>("addr").context("missing addr")?;
    let chatty = matches.get_flag("chatty");

    let alloc = QidAllocator::new();
    let root = RamDir::new("/", FileMode::from_bits(0o777), user, group, &alloc);
    let mut service = FileService::new(ServiceConfig {
        chatty,
        ..ServiceConfig::default()
    });
    service.register(service_name, Node::Dir(root));

    let listener =
        TcpListener::bind(addr.as_str()).with_context(|| format!("unable to listen on {addr}"))?;
    info!("starting ramfs at {addr}");
    serve_listener(Arc::new(service), listener)?;
    Ok(())
}
