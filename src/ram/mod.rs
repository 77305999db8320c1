// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: In-memory reference implementation of the file abstraction.
// Author: Lukas Bower

//! An in-memory file tree.
//!
//! Directories keep their children by name; every entity carries its own
//! lock, a qid path drawn from a shared [`QidAllocator`], unix
//! timestamps, and a version counter bumped on modification. This is the
//! reference backing tree for the protocol engine and the tree the
//! `ninegate-ramfs` binary serves.

mod dir;
mod file;

pub use dir::RamDir;
pub use file::RamFile;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::node::Node;

/// Monotonic allocator for qid path numbers.
///
/// One allocator is shared by every entity of a tree so that live
/// entities never collide; it sits behind a handle so tests can pin
/// allocation order.
#[derive(Debug, Default)]
pub struct QidAllocator {
    next: AtomicU64,
}

impl QidAllocator {
    /// A fresh allocator starting at path 0.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Hand out the next unique path number.
    #[must_use]
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

/// A concrete entity of the in-memory tree.
#[derive(Clone)]
pub enum RamNode {
    /// A directory.
    Dir(Arc<RamDir>),
    /// A regular file.
    File(Arc<RamFile>),
}

impl RamNode {
    /// View the entity through the engine's abstraction.
    #[must_use]
    pub fn to_node(&self) -> Node {
        match self {
            RamNode::Dir(d) => Node::Dir(d.clone()),
            RamNode::File(f) => Node::File(f.clone()),
        }
    }

    pub(crate) fn set_name(&self, name: &str) {
        match self {
            RamNode::Dir(d) => d.set_name(name),
            RamNode::File(f) => f.set_name(name),
        }
    }

    pub(crate) fn is_empty_dir(&self) -> Option<bool> {
        match self {
            RamNode::Dir(d) => Some(d.has_no_children()),
            RamNode::File(_) => None,
        }
    }
}

impl From<Arc<RamDir>> for RamNode {
    fn from(dir: Arc<RamDir>) -> Self {
        RamNode::Dir(dir)
    }
}

impl From<Arc<RamFile>> for RamNode {
    fn from(file: Arc<RamFile>) -> Self {
        RamNode::File(file)
    }
}

pub(crate) fn unix_now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}
