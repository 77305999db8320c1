// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Shared fixtures for the integration tests.
// Author: Lukas Bower

#![allow(dead_code)]

use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, Sender};
use ninegate::error::{Error, Result};
use ninegate::node::{DirNode, FileNode, Handle, Node};
use ninegate::ram::{QidAllocator, RamDir, RamFile};
use ninegate::server::{FileService, ServiceConfig};
use ninegate::wire::{FileMode, OpenMode, Qid, QidType, Stat};

/// A service exposing the standard test tree under the "main" aname:
/// `/readme` ("hello\n") and `/docs/notes` ("remember\n"), all owned by
/// glen.
pub fn ram_service() -> Arc<FileService> {
    let alloc = QidAllocator::new();
    let root = RamDir::new("/", FileMode::from_bits(0o777), "glen", "glen", &alloc);
    let readme = RamFile::new("readme", FileMode::from_bits(0o644), "glen", "glen", &alloc);
    readme.set_content(b"hello\n".to_vec());
    root.add(readme).expect("seed readme");
    let docs = RamDir::new("docs", FileMode::from_bits(0o755), "glen", "glen", &alloc);
    let notes = RamFile::new("notes", FileMode::from_bits(0o644), "glen", "glen", &alloc);
    notes.set_content(b"remember\n".to_vec());
    docs.add(notes).expect("seed notes");
    root.add(docs).expect("seed docs");
    let mut service = FileService::new(ServiceConfig::default());
    service.register("main", Node::Dir(root));
    Arc::new(service)
}

/// A service whose only file blocks inside `read` until released, for
/// exercising Tflush against an in-flight request.
///
/// Returns the service plus the `entered` receiver (fires once the read
/// is blocked) and the `release` sender (lets the read finish).
pub fn slow_service() -> (Arc<FileService>, Receiver<()>, Sender<()>) {
    let (entered_tx, entered_rx) = unbounded();
    let (release_tx, release_rx) = unbounded();
    let slow = Arc::new(SlowFile {
        entered: entered_tx,
        release: release_rx,
    });
    let root = Arc::new(TestRoot {
        child: Node::File(slow),
    });
    let mut service = FileService::new(ServiceConfig::default());
    service.register("main", Node::Dir(root));
    (Arc::new(service), entered_rx, release_tx)
}

/// A file whose reads park on a channel: `entered` fires when a reader
/// arrives, and nothing proceeds until the test sends on `release`.
pub struct SlowFile {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl FileNode for SlowFile {
    fn name(&self) -> String {
        "slow".to_string()
    }

    fn qid(&self) -> Qid {
        Qid::new(QidType::FILE, 0, 9000)
    }

    fn stat(&self) -> Stat {
        Stat {
            ty: 0,
            dev: 0,
            qid: self.qid(),
            mode: FileMode::from_bits(0o644),
            atime: 0,
            mtime: 0,
            length: 0,
            name: self.name(),
            uid: "glen".to_string(),
            gid: "glen".to_string(),
            muid: "glen".to_string(),
        }
    }

    fn write_stat(&self, _stat: Stat) -> Result<()> {
        Ok(())
    }

    fn open(&self, _user: &str, _mode: OpenMode) -> Result<Box<dyn Handle>> {
        Ok(Box::new(SlowHandle {
            entered: self.entered.clone(),
            release: self.release.clone(),
        }))
    }
}

struct SlowHandle {
    entered: Sender<()>,
    release: Receiver<()>,
}

impl Handle for SlowHandle {
    fn seek(&self, _offset: u64) -> Result<()> {
        Ok(())
    }

    fn read(&self, _buf: &mut [u8]) -> Result<usize> {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        Ok(0)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        Ok(buf.len())
    }

    fn close(&self) {}
}

/// Minimal directory holding exactly one child, demonstrating that the
/// engine only needs the abstraction, not the ram tree.
pub struct TestRoot {
    pub child: Node,
}

impl FileNode for TestRoot {
    fn name(&self) -> String {
        "/".to_string()
    }

    fn qid(&self) -> Qid {
        Qid::new(QidType::DIR, 0, 8000)
    }

    fn stat(&self) -> Stat {
        Stat {
            ty: 0,
            dev: 0,
            qid: self.qid(),
            mode: FileMode::from_bits(0o777) | FileMode::DIR,
            atime: 0,
            mtime: 0,
            length: 0,
            name: self.name(),
            uid: "glen".to_string(),
            gid: "glen".to_string(),
            muid: "glen".to_string(),
        }
    }

    fn write_stat(&self, _stat: Stat) -> Result<()> {
        Err(Error::Denied)
    }

    fn open(&self, _user: &str, _mode: OpenMode) -> Result<Box<dyn Handle>> {
        Err(Error::Denied)
    }
}

impl DirNode for TestRoot {
    fn walk(&self, _user: &str, name: &str) -> Result<Option<Node>> {
        if name == self.child.name() {
            Ok(Some(self.child.clone()))
        } else {
            Ok(None)
        }
    }

    fn create(&self, _user: &str, _name: &str, _perm: FileMode) -> Result<Node> {
        Err(Error::Denied)
    }

    fn remove(&self, _user: &str, _name: &str) -> Result<()> {
        Err(Error::Denied)
    }

    fn rename(&self, _user: &str, _oldname: &str, _newname: &str) -> Result<()> {
        Err(Error::Denied)
    }

    fn is_empty(&self) -> bool {
        false
    }
}
