// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Command line client for 9P2000 file servers.
// Author: Lukas Bower

//! Entry point for the 9P2000 command line client.

use std::io::{self, Write};
use std::net::TcpStream;

use anyhow::{bail, Context, Result};
use clap::{Arg, ArgMatches, Command};
use ninegate::client::Client;

fn build_cli() -> Command {
    let path = |required: bool| {
        Arg::new("path")
            .value_name("PATH")
            .help("Path below the service root")
            .required(required)
    };
    Command::new("ninegate-cli")
        .version("0.1")
        .about("Talk to a 9P2000 file server")
        .arg(
            Arg::new("addr")
                .value_name("ADDR")
                .help("Server address, e.g. 127.0.0.1:5640")
                .required(true),
        )
        .arg(
            Arg::new("user")
                .value_name("USER")
                .help("User name to attach as")
                .required(true),
        )
        .arg(
            Arg::new("service")
                .value_name("SERVICE")
                .help("Attach service name")
                .required(true),
        )
        .subcommand_required(true)
        .subcommand(
            Command::new("ls")
                .about("List a directory")
                .arg(path(false)),
        )
        .subcommand(Command::new("cat").about("Print a file").arg(path(true)))
        .subcommand(
            Command::new("touch")
                .about("Create an empty file")
                .arg(path(true)),
        )
        .subcommand(
            Command::new("mkdir")
                .about("Create a directory")
                .arg(path(true)),
        )
        .subcommand(
            Command::new("rm")
                .about("Remove a file or empty directory")
                .arg(path(true)),
        )
}

fn arg_path<'a>(sub: &'a ArgMatches, fallback: &'a str) -> &'a str {
    sub.get_one::<String>("path")
        .map(String::as_str)
        .unwrap_or(fallback)
}

fn run() -> Result<()> {
    let matches = build_cli().get_matches();
    let addr = matches.get_one::<String>("addr").context("missing addr")?;
    let user = matches.get_one::<String>("user").context("missing user")?;
    let service = matches
        .get_one::<String>("service")
        .context("missing service")?;

    let stream = TcpStream::connect(addr.as_str())
        .with_context(|| format!("unable to connect to {addr}"))?;
    let client = Client::connect(stream, user, service)?;

    match matches.subcommand() {
        Some(("ls", sub)) => {
            for name in client.list(arg_path(sub, "/"))? {
                println!("{name}");
            }
        }
        Some(("cat", sub)) => {
            let content = client.read(arg_path(sub, "/"))?;
            io::stdout().write_all(&content)?;
        }
        Some(("touch", sub)) => client.create(arg_path(sub, "/"), false)?,
        Some(("mkdir", sub)) => client.create(arg_path(sub, "/"), true)?,
        Some(("rm", sub)) => client.remove(arg_path(sub, "/"))?,
        _ => bail!("unknown command"),
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
