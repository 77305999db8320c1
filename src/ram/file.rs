// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: In-memory regular file and its byte-buffer handle.
// Author: Lukas Bower

use std::sync::{Arc, Mutex, RwLock, Weak};

use log::warn;
use ninegate_wire::{FileMode, OpenMode, Qid, Stat};

use crate::error::{Error, Result};
use crate::node::{permits, FileNode, Handle};
use crate::ram::{unix_now, QidAllocator};

/// An in-memory regular file backed by a byte buffer.
pub struct RamFile {
    id: u64,
    me: Weak<RamFile>,
    inner: RwLock<FileInner>,
}

struct FileInner {
    name: String,
    uid: String,
    gid: String,
    muid: String,
    perm: FileMode,
    atime: u32,
    mtime: u32,
    version: u32,
    content: Vec<u8>,
}

impl RamFile {
    /// Create a detached empty file owned by `uid`/`gid`.
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
            me: me.clone(),
            inner: RwLock::new(FileInner {
                name: name.to_string(),
                uid: uid.to_string(),
                gid: gid.to_string(),
                muid: uid.to_string(),
                perm,
                atime: now,
                mtime: now,
                version: 0,
                content: Vec::new(),
            }),
        })
    }

    /// Replace the file's contents, for seeding trees before serving.
    pub fn set_content(&self, content: impl Into<Vec<u8>>) {
        let mut inner = self.write();
        inner.content = content.into();
        inner.mtime = unix_now();
        inner.version = inner.version.wrapping_add(1);
    }

    pub(crate) fn set_name(&self, name: &str) {
        self.write().name = name.to_string();
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, FileInner> {
        self.inner.read().unwrap()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, FileInner> {
        self.inner.write().unwrap()
    }
}

impl FileNode for RamFile {
    fn name(&self) -> String {
        self.read().name.clone()
    }

    fn qid(&self) -> Qid {
        let inner = self.read();
        Qid::new(inner.perm.qid_type(), inner.version, self.id)
    }

    fn stat(&self) -> Stat {
        let inner = self.read();
        Stat {
            ty: 0,
            dev: 0,
            qid: Qid::new(inner.perm.qid_type(), inner.version, self.id),
            mode: inner.perm,
            atime: inner.atime,
            mtime: inner.mtime,
            length: inner.content.len() as u64,
            name: inner.name.clone(),
            uid: inner.uid.clone(),
            gid: inner.gid.clone(),
            muid: inner.muid.clone(),
        }
    }

    fn write_stat(&self, stat: Stat) -> Result<()> {
        let mut inner = self.write();
        inner.perm = stat.mode;
        inner.uid = stat.uid;
        inner.gid = stat.gid;
        inner.mtime = stat.mtime;
        inner.atime = unix_now();
        inner.version = inner.version.wrapping_add(1);
        Ok(())
    }

    fn open(&self, user: &str, mode: OpenMode) -> Result<Box<dyn Handle>> {
        let file = match self.me.upgrade() {
            Some(file) => file,
            None => return Err(Error::NoFile),
        };
        let mut inner = self.write();
        if !permits(inner.uid == user, inner.perm, mode) {
            warn!("deny open of {} for {}", inner.name, user);
            return Err(Error::Denied);
        }
        if mode.truncates() && mode.is_writable() {
            inner.content.clear();
            inner.mtime = unix_now();
            inner.version = inner.version.wrapping_add(1);
        }
        inner.atime = unix_now();
        drop(inner);
        Ok(Box::new(RamFileHandle {
            file,
            pos: Mutex::new(0),
        }))
    }
}

/// Cursor over a [`RamFile`]'s byte buffer.
struct RamFileHandle {
    file: Arc<RamFile>,
    pos: Mutex<u64>,
}

impl Handle for RamFileHandle {
    fn seek(&self, offset: u64) -> Result<()> {
        *self.pos.lock().unwrap() = offset;
        Ok(())
    }

    fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut pos = self.pos.lock().unwrap();
        let inner = self.file.read();
        let start = *pos as usize;
        if start >= inner.content.len() {
            return Ok(0);
        }
        let n = buf.len().min(inner.content.len() - start);
        buf[..n].copy_from_slice(&inner.content[start..start + n]);
        *pos += n as u64;
        Ok(n)
    }

    fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut pos = self.pos.lock().unwrap();
        let mut inner = self.file.write();
        let at = if inner.perm.is_append() {
            inner.content.len()
        } else {
            *pos as usize
        };
        let end = at.checked_add(buf.len()).ok_or(Error::TooBig)?;
        if end > inner.content.len() {
            inner.content.resize(end, 0);
        }
        inner.content[at..end].copy_from_slice(buf);
        inner.mtime = unix_now();
        inner.version = inner.version.wrapping_add(1);
        *pos = end as u64;
        Ok(buf.len())
    }

    fn close(&self) {}
}
