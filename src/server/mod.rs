// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: 9P2000 protocol engine and its transport multiplexer.
// Author: Lukas Bower

//! The server side of the protocol.
//!
//! A [`FileService`] owns the service-name to root-tree mapping and the
//! connection-wide knobs; each accepted connection gets its own
//! [`Session`] holding the fid table, the live-tag set, and the
//! negotiated msize. [`serve_connection`] runs the multiplexer that
//! pumps a session over a framed byte stream.

mod serve;
mod session;

pub use serve::{serve_connection, serve_listener};
pub use session::Session;

use std::collections::HashMap;
use std::sync::Arc;

use ninegate_wire::HEADER_SIZE;

use crate::error::{Error, Result};
use crate::node::Node;

/// Server-side msize ceiling, sized for large Rread buffers.
pub const DEFAULT_MAX_SIZE: u32 = 1024 * 1024 * 1024;

/// Smallest msize the server accepts: the header plus the largest fixed
/// message body (Twrite's fid, offset, and count).
pub const MIN_MSIZE: u32 = HEADER_SIZE + 16;

/// Connection-wide configuration.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Server's msize ceiling; negotiation takes the minimum of this and
    /// the client's proposal.
    pub max_size: u32,
    /// Log one line per request at info level.
    pub chatty: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            chatty: false,
        }
    }
}

/// The trees a server exposes, keyed by attach service name.
///
/// A service registered under a name is selected by the attach `aname`;
/// the fallback root answers every name that has no dedicated entry.
pub struct FileService {
    cfg: ServiceConfig,
    roots: HashMap<String, Node>,
    fallback: Option<Node>,
}

impl FileService {
    /// An empty service with no roots.
    #[must_use]
    pub fn new(cfg: ServiceConfig) -> Self {
        Self {
            cfg,
            roots: HashMap::new(),
            fallback: None,
        }
    }

    /// A service answering every attach with one root tree.
    #[must_use]
    pub fn with_root(root: Node, cfg: ServiceConfig) -> Self {
        let mut service = Self::new(cfg);
        service.fallback = Some(root);
        service
    }

    /// Expose `root` under the attach service name `aname`.
    pub fn register(&mut self, aname: &str, root: Node) {
        self.roots.insert(aname.to_string(), root);
    }

    /// Start a fresh per-connection session.
    #[must_use]
    pub fn session(self: &Arc<Self>) -> Session {
        Session::new(Arc::clone(self))
    }

    pub(crate) fn resolve(&self, aname: &str) -> Result<Node> {
        if let Some(root) = self.roots.get(aname) {
            return Ok(root.clone());
        }
        self.fallback.clone().ok_or(Error::NoService)
    }

    pub(crate) fn cap(&self) -> u32 {
        self.cfg.max_size.max(MIN_MSIZE)
    }

    pub(crate) fn chatty(&self) -> bool {
        self.cfg.chatty
    }
}
