// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Ninegate 9P2000 file service: engine, trees, transport, client.
// Author: Lukas Bower

//! Ninegate serves a tree of files over the 9P2000 protocol.
//!
//! The [`server`] module holds the per-connection protocol engine; it
//! consumes the file abstraction in [`node`], of which [`ram`] is the
//! in-memory reference implementation. [`client`] is the paired
//! convenience client, and [`stream`] supplies the framed duplex byte
//! streams both sides run over. Wire encoding lives in the
//! `ninegate-wire` crate, re-exported here as [`wire`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod node;
pub mod ram;
pub mod server;
pub mod stream;

pub use error::{Error, Result};
pub use ninegate_wire as wire;
