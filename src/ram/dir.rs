// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: In-memory directory and its stat-stream read handle.
// Author: Lukas Bower

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock, Weak};

use log::warn;
use ninegate_wire::{FileMode, OpenMode, Qid, Stat};

use crate::error::{Error, Result};
use crate::node::{permits, DirNode, FileNode, Handle, Node};
use crate::ram::file::RamFile;
use crate::ram::{unix_now, QidAllocator, RamNode};

/// An in-memory directory.
///
/// Children are kept by name; enumeration order is the map order, stable
/// for any one snapshot. The directory's own lock guards all child
/// operations; the lock order is always parent before child.
pub struct RamDir {
    id: u64,
    alloc: Arc<QidAllocator>,
    me: Weak<RamDir>,
    inner: RwLock<DirInner>,
}

struct DirInner {
    name: String,
    uid: String,
    gid: String,
    muid: String,
    perm: FileMode,
    atime: u32,
    mtime: u32,
    version: u32,
    children: BTreeMap<String, RamNode>,
}

impl RamDir {
    /// Create a detached directory owned by `uid`/`gid`.
    #[must_use]
    pub fn new(
        name: &str,
        perm: FileMode,
        uid: &str,
        gid: &str,
        alloc: &Arc<QidAllocator>,
    ) -> Arc<Self> {
        let now = unix_now();
        Arc::new_cyclic(|me| Self {
            id: alloc.next(),
            alloc: alloc.clone(),
            me: me.clone(),
            inner: RwLock::new(DirInner {
                name: name.to_string(),
                uid: uid.to_string(),
                gid: gid.to_string(),
                muid: uid.to_string(),
                perm,
                atime: now,
                mtime: now,
                version: 0,
                children: BTreeMap::new(),
            }),
        })
    }

    /// Insert an already-built entity, for seeding trees before serving.
    pub fn add(&self, child: impl Into<RamNode>) -> Result<()> {
        let child = child.into();
        let name = match &child {
            RamNode::Dir(d) => d.name(),
            RamNode::File(f) => f.name(),
        };
        let mut inner = self.write();
        if inner.children.contains_key(&name) {
            return Err(Error::AlreadyExists);
        }
        inner.children.insert(name, child);
        inner.touch_modified();
        Ok(())
    }

    pub(crate) fn set_name(&self, name: &str) {
        self.write().name = name.to_string();
    }

    pub(crate) fn has_no_children(&self) -> bool {
        self.read().children.is_empty()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, DirInner> {
        self.inner.read().unwrap()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, DirInner> {
        self.inner.write().unwrap()
    }
}

impl DirInner {
    fn touch_modified(&mut self) {
        let now = unix_now();
        self.mtime = now;
        self.atime = now;
        self.version = self.version.wrapping_add(1);
    }
}

impl FileNode for RamDir {
    fn name(&self) -> String {
        let inner = self.read();
        if inner.name.is_empty() {
            "/".to_string()
        } else {
            inner.name.clone()
        }
    }

    fn qid(&self) -> Qid {
        let inner = self.read();
        Qid::new((inner.perm | FileMode::DIR).qid_type(), inner.version, self.id)
    }

    fn stat(&self) -> Stat {
        let inner = self.read();
        let name = if inner.name.is_empty() {
            "/".to_string()
        } else {
            inner.name.clone()
        };
        Stat {
            ty: 0,
            dev: 0,
            qid: Qid::new((inner.perm | FileMode::DIR).qid_type(), inner.version, self.id),
            mode: inner.perm | FileMode::DIR,
            atime: inner.atime,
            mtime: inner.mtime,
            length: 0,
            name,
            uid: inner.uid.clone(),
            gid: inner.gid.clone(),
            muid: inner.muid.clone(),
        }
    }

    fn write_stat(&self, stat: Stat) -> Result<()> {
        let mut inner = self.write();
        inner.perm = stat.mode | FileMode::DIR;
        inner.uid = stat.uid;
        inner.gid = stat.gid;
        inner.mtime = stat.mtime;
        inner.atime = unix_now();
        inner.version = inner.version.wrapping_add(1);
        Ok(())
    }

    fn open(&self, user: &str, mode: OpenMode) -> Result<Box<dyn Handle>> {
        let dir = match self.me.upgrade() {
            Some(dir) => dir,
            None => return Err(Error::NoFile),
        };
        {
            let mut inner = self.write();
            if !permits(inner.uid == user, inner.perm, mode) {
                warn!("deny open of {} for {}", inner.name, user);
                return Err(Error::Denied);
            }
            inner.atime = unix_now();
        }
        let cursor = DirCursor::snapshot(&dir);
        Ok(Box::new(RamDirHandle {
            dir,
            cursor: Mutex::new(cursor),
        }))
    }
}

impl DirNode for RamDir {
    fn walk(&self, user: &str, name: &str) -> Result<Option<Node>> {
        let inner = self.read();
        if !permits(inner.uid == user, inner.perm, OpenMode::EXEC) {
            return Err(Error::Denied);
        }
        Ok(inner.children.get(name).map(RamNode::to_node))
    }

    fn create(&self, user: &str, name: &str, perm: FileMode) -> Result<Node> {
        let mut inner = self.write();
        if !permits(inner.uid == user, inner.perm, OpenMode::WRITE) {
            warn!("deny create of {name} in {} for {user}", inner.name);
            return Err(Error::Denied);
        }
        if inner.children.contains_key(name) {
            return Err(Error::AlreadyExists);
        }
        let dir_bits = inner.perm.bits();
        let child = if perm.is_dir() {
            let masked = FileMode::from_bits(perm.bits() & (!0o777 | (dir_bits & 0o777)));
            RamNode::Dir(RamDir::new(name, masked, user, &inner.gid, &self.alloc))
        } else {
            let masked = FileMode::from_bits(perm.bits() & (!0o666 | (dir_bits & 0o666)));
            RamNode::File(RamFile::new(name, masked, user, &inner.gid, &self.alloc))
        };
        let node = child.to_node();
        inner.children.insert(name.to_string(), child);
        inner.touch_modified();
        Ok(node)
    }

    fn remove(&self, user: &str, name: &str) -> Result<()> {
        let mut inner = self.write();
        if !permits(inner.uid == user, inner.perm, OpenMode::WRITE) {
            warn!("deny remove of {name} in {} for {user}", inner.name);
            return Err(Error::Denied);
        }
        let child = inner.children.get(name).ok_or(Error::NoFile)?;
        if child.is_empty_dir() == Some(false) {
            return Err(Error::NotEmpty);
        }
        inner.children.remove(name);
        inner.touch_modified();
        Ok(())
    }

    fn rename(&self, user: &str, oldname: &str, newname: &str) -> Result<()> {
        let mut inner = self.write();
        if !permits(inner.uid == user, inner.perm, OpenMode::WRITE) {
            return Err(Error::Denied);
        }
        if inner.children.contains_key(newname) {
            return Err(Error::AlreadyExists);
        }
        let child = inner.children.remove(oldname).ok_or(Error::NoFile)?;
        child.set_name(newname);
        inner.children.insert(newname.to_string(), child);
        inner.touch_modified();
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.has_no_children()
    }
}

/// Read handle over a directory's serialized stat stream.
///
/// The children are snapshotted into a buffer at open and on every seek
/// to 0; reads slice whole stat entries from that buffer, never splitting
/// one across responses. Nonzero seeks must match the cursor.
struct RamDirHandle {
    dir: Arc<RamDir>,
    cursor: Mutex<DirCursor>,
}

struct DirCursor {
    buffer: Vec<u8>,
    ends: Vec<usize>,
    entry: usize,
    pos: u64,
}

impl DirCursor {
    fn snapshot(dir: &Arc<RamDir>) -> Self {
        let inner = dir.read();
        let mut buffer = Vec::new();
        let mut ends = Vec::with_capacity(inner.children.len());
        for child in inner.children.values() {
            let stat = match child {
                RamNode::Dir(d) => d.stat(),
                RamNode::File(f) => f.stat(),
            };
            // Stats only over-run the u16 size prefix with pathological
            // names the tree never admits; skip such an entry.
            if stat.write_to(&mut buffer).is_err() {
                warn!("skipping unencodable stat for {}", stat.name);
                continue;
            }
            ends.push(buffer.len());
        }
        Self {
            buffer,
            ends,
            entry: 0,
            pos: 0,
        }
    }
}

impl Handle for RamDirHandle {
    fn seek(&self, offset: u64) -> Result<()> {
        let mut cursor = self.cursor.lock().unwrap();
        if offset == 0 {
            *cursor = DirCursor::snapshot(&self.dir);
            return Ok(());
        }
        if offset != cursor.pos {
            return Err(Error::BadDirSeek);
        }
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut cursor = self.cursor.lock().unwrap();
        if cursor.entry >= cursor.ends.len() {
            return Ok(0);
        }
        let start = cursor.pos as usize;
        let mut end = start;
        let mut entry = cursor.entry;
        while entry < cursor.ends.len() && cursor.ends[entry] - start <= buf.len() {
            end = cursor.ends[entry];
            entry += 1;
        }
        if end == start {
            return Err(Error::ShortDirRead);
        }
        buf[..end - start].copy_from_slice(&cursor.buffer[start..end]);
        cursor.pos = end as u64;
        cursor.entry = entry;
        Ok(end - start)
    }

    fn write(&self, _buf: &[u8]) -> Result<usize> {
        Err(Error::NotAFile)
    }

    fn close(&self) {}
}
