// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Per-connection 9P2000 session state and operation handlers.
// Author: Lukas Bower

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::info;
use ninegate_wire::{
    FileMode, OpenMode, Rbody, Rmessage, Stat, Tbody, Tmessage, HEADER_SIZE, MAX_WALK_ELEMENTS,
    NOFID,
};

use crate::error::{Error, Result};
use crate::node::{permits, Handle, Node, NodePath};
use crate::server::{FileService, MIN_MSIZE};

/// Per-connection protocol engine.
///
/// Holds the fid table, the live-tag set, and the negotiated msize.
/// [`Session::handle`] is reentrant: the multiplexer runs one call per
/// in-flight request, and a Tflush landing mid-request suppresses that
/// request's response through the tag set.
pub struct Session {
    service: Arc<FileService>,
    msize: AtomicU32,
    negotiated: AtomicBool,
    fids: RwLock<HashMap<u32, Arc<RwLock<Fid>>>>,
    tags: TagSet,
}

/// What a bound fid knows: where it sits, who attached it, and its open
/// handle once Topen or Tcreate succeeded.
struct Fid {
    path: NodePath,
    open: Option<Box<dyn Handle>>,
    mode: OpenMode,
    uname: String,
    aname: String,
}

impl Fid {
    fn at(path: NodePath, uname: &str, aname: &str) -> Self {
        Self {
            path,
            open: None,
            mode: OpenMode::READ,
            uname: uname.to_string(),
            aname: aname.to_string(),
        }
    }
}

/// Tags of requests currently in flight.
///
/// A request inserts its tag on entry and emits its response only if the
/// tag is still present on completion; Tflush deletes the tag first, so
/// the completion check comes up empty and the response is suppressed.
struct TagSet {
    live: Mutex<HashSet<u16>>,
}

impl TagSet {
    fn new() -> Self {
        Self {
            live: Mutex::new(HashSet::new()),
        }
    }

    fn begin(&self, tag: u16) {
        self.live.lock().unwrap().insert(tag);
    }

    /// Remove the tag, reporting whether this call observed it live.
    fn finish(&self, tag: u16) -> bool {
        self.live.lock().unwrap().remove(&tag)
    }
}

impl Session {
    pub(crate) fn new(service: Arc<FileService>) -> Self {
        let cap = service.cap();
        Self {
            service,
            msize: AtomicU32::new(cap),
            negotiated: AtomicBool::new(false),
            fids: RwLock::new(HashMap::new()),
            tags: TagSet::new(),
        }
    }

    /// The msize currently in force: the negotiated value, or the server
    /// cap before negotiation.
    #[must_use]
    pub fn msize(&self) -> u32 {
        self.msize.load(Ordering::SeqCst)
    }

    /// Record a request tag as in flight.
    ///
    /// The multiplexer calls this from its reader loop, in wire order,
    /// before dispatching the request to its own task; that ordering is
    /// what lets a later Tflush reliably observe the tag.
    pub fn register(&self, tag: u16) {
        self.tags.begin(tag);
    }

    /// Register and run one request to completion.
    pub fn handle(&self, msg: Tmessage) -> Option<Rmessage> {
        self.register(msg.tag);
        self.run(msg)
    }

    /// Run a request whose tag was already recorded with
    /// [`Session::register`].
    ///
    /// Returns `None` when the request's tag was flushed while it ran;
    /// the caller must not emit anything in that case.
    pub fn run(&self, msg: Tmessage) -> Option<Rmessage> {
        let Tmessage { tag, body } = msg;
        let label = body.label();
        if self.service.chatty() {
            info!("-> {label} tag={tag}");
        }
        let rbody = match self.dispatch(body) {
            Ok(rbody) => rbody,
            Err(err) => {
                if self.service.chatty() {
                    info!("<- {label} tag={tag} error: {err}");
                }
                Rbody::Error {
                    ename: err.to_string(),
                }
            }
        };
        if self.tags.finish(tag) {
            Some(Rmessage { tag, body: rbody })
        } else {
            if self.service.chatty() {
                info!("suppressed response for flushed tag {tag}");
            }
            None
        }
    }

    fn dispatch(&self, body: Tbody) -> Result<Rbody> {
        if !self.negotiated.load(Ordering::SeqCst) && !matches!(body, Tbody::Version { .. }) {
            return Err(Error::NotNegotiated);
        }
        match body {
            Tbody::Version { msize, version } => self.version(msize, &version),
            Tbody::Auth { .. } => Err(Error::AuthNotSupported),
            Tbody::Attach {
                fid, uname, aname, ..
            } => self.attach(fid, &uname, &aname),
            Tbody::Flush { oldtag } => self.flush(oldtag),
            Tbody::Walk { fid, newfid, names } => self.walk(fid, newfid, &names),
            Tbody::Open { fid, mode } => self.open(fid, mode),
            Tbody::Create {
                fid,
                name,
                perm,
                mode,
            } => self.create(fid, &name, perm, mode),
            Tbody::Read { fid, offset, count } => self.read(fid, offset, count),
            Tbody::Write { fid, offset, data } => self.write(fid, offset, &data),
            Tbody::Clunk { fid } => self.clunk(fid),
            Tbody::Remove { fid } => self.remove(fid),
            Tbody::Stat { fid } => self.stat(fid),
            Tbody::Wstat { fid, stat } => self.wstat(fid, &stat),
        }
    }

    /// Tversion: negotiate msize and protocol, resetting the session.
    fn version(&self, msize: u32, version: &str) -> Result<Rbody> {
        if msize < MIN_MSIZE {
            return Err(Error::MsizeTooSmall);
        }
        let negotiated = msize.min(self.service.cap());
        self.msize.store(negotiated, Ordering::SeqCst);
        // A version exchange aborts everything the session had going.
        self.fids.write().unwrap().clear();
        let proto = if version == "9P2000" {
            self.negotiated.store(true, Ordering::SeqCst);
            "9P2000"
        } else {
            self.negotiated.store(false, Ordering::SeqCst);
            "unknown"
        };
        Ok(Rbody::Version {
            msize: negotiated,
            version: proto.to_string(),
        })
    }

    /// Tattach: bind a client-chosen fid to a service root.
    fn attach(&self, fid: u32, uname: &str, aname: &str) -> Result<Rbody> {
        if fid == NOFID {
            return Err(Error::FidInUse);
        }
        let root = self.service.resolve(aname)?;
        let mut fids = self.fids.write().unwrap();
        if fids.contains_key(&fid) {
            return Err(Error::FidInUse);
        }
        let qid = root.qid();
        fids.insert(
            fid,
            Arc::new(RwLock::new(Fid::at(NodePath::root(root), uname, aname))),
        );
        Ok(Rbody::Attach { qid })
    }

    /// Tflush: delete the tag so the old request's completion check
    /// comes up empty. Always succeeds; a completed tag is a no-op.
    fn flush(&self, oldtag: u16) -> Result<Rbody> {
        self.tags.finish(oldtag);
        Ok(Rbody::Flush)
    }

    /// Twalk: resolve a name vector, binding `newfid` only on full success.
    fn walk(&self, fid: u32, newfid: u32, names: &[String]) -> Result<Rbody> {
        if names.len() > MAX_WALK_ELEMENTS {
            return Err(Error::WalkLimit);
        }
        if newfid == NOFID {
            return Err(Error::FidInUse);
        }
        let mut fids = self.fids.write().unwrap();
        let state_arc = fids.get(&fid).ok_or(Error::UnknownFid)?.clone();
        let state = state_arc.write().unwrap();
        if state.open.is_some() {
            return Err(Error::AlreadyOpen);
        }
        if newfid != fid && fids.contains_key(&newfid) {
            return Err(Error::FidInUse);
        }
        let uname = state.uname.clone();
        let aname = state.aname.clone();

        if names.is_empty() {
            let clone = Fid::at(state.path.clone(), &uname, &aname);
            drop(state);
            fids.insert(newfid, Arc::new(RwLock::new(clone)));
            return Ok(Rbody::Walk { qids: Vec::new() });
        }

        if !matches!(state.path.current(), Some(Node::Dir(_))) {
            return Err(Error::NotADirectory);
        }

        let mut newpath = state.path.clone();
        let mut qids = Vec::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            let current = match newpath.current() {
                Some(node) => node.clone(),
                None => break,
            };
            let dir = match current {
                Node::Dir(dir) => dir,
                Node::File(_) => break,
            };
            let dstat = dir.stat();
            if !permits(uname == dstat.uid, dstat.mode, OpenMode::EXEC) {
                break;
            }
            match name.as_str() {
                "." => {
                    // Same entity; reported but not appended to the path.
                    qids.push(dir.qid());
                }
                ".." => {
                    let parent = match newpath.parent() {
                        Some(parent) => parent.clone(),
                        None => break,
                    };
                    newpath.ascend();
                    qids.push(parent.qid());
                }
                other => match dir.walk(&uname, other) {
                    Ok(Some(node)) => {
                        qids.push(node.qid());
                        newpath.descend(node);
                    }
                    Ok(None) => {
                        if i == 0 && newfid != fid {
                            return Err(Error::NoFile);
                        }
                        break;
                    }
                    Err(_) => break,
                },
            }
        }

        if qids.len() == names.len() {
            let bound = Fid::at(newpath, &uname, &aname);
            drop(state);
            fids.insert(newfid, Arc::new(RwLock::new(bound)));
        }
        Ok(Rbody::Walk { qids })
    }

    /// Topen: attach an open handle to the fid.
    fn open(&self, fid: u32, mode: OpenMode) -> Result<Rbody> {
        let state_arc = self.lookup(fid)?;
        let mut state = state_arc.write().unwrap();
        if state.open.is_some() {
            return Err(Error::AlreadyOpen);
        }
        let node = state.path.current().ok_or(Error::NoFile)?.clone();
        let handle = node.open(&state.uname, mode)?;
        state.open = Some(handle);
        state.mode = mode;
        Ok(Rbody::Open {
            qid: node.qid(),
            iounit: 0,
        })
    }

    /// Tcreate: make a child under the fid's directory, advance the fid
    /// to it, and open it.
    fn create(&self, fid: u32, name: &str, perm: FileMode, mode: OpenMode) -> Result<Rbody> {
        let fids = self.fids.write().unwrap();
        let state_arc = fids.get(&fid).ok_or(Error::UnknownFid)?.clone();
        let mut state = state_arc.write().unwrap();
        if state.open.is_some() {
            return Err(Error::AlreadyOpen);
        }
        if name == "." || name == ".." {
            return Err(Error::IllegalName);
        }
        let dir = state
            .path
            .current()
            .and_then(Node::as_dir)
            .cloned()
            .ok_or(Error::NotADirectory)?;
        let node = dir.create(&state.uname, name, perm)?;
        let handle = node.open(&state.uname, mode)?;
        state.path.descend(node.clone());
        state.open = Some(handle);
        state.mode = mode;
        drop(state);
        drop(fids);
        Ok(Rbody::Create {
            qid: node.qid(),
            iounit: 0,
        })
    }

    /// Tread: positional read through the fid's handle, capped so the
    /// encoded Rread fits in msize.
    fn read(&self, fid: u32, offset: u64, count: u32) -> Result<Rbody> {
        let state_arc = self.lookup(fid)?;
        let state = state_arc.read().unwrap();
        let handle = state.open.as_ref().ok_or(Error::NotOpen)?;
        if !state.mode.is_readable() {
            return Err(Error::WrongMode("reading"));
        }
        let cap = self.msize().saturating_sub(HEADER_SIZE + 4);
        let count = count.min(cap) as usize;
        handle.seek(offset)?;
        let mut buf = vec![0u8; count];
        let n = handle.read(&mut buf)?;
        buf.truncate(n);
        Ok(Rbody::Read { data: buf })
    }

    /// Twrite: positional write through the fid's handle.
    fn write(&self, fid: u32, offset: u64, data: &[u8]) -> Result<Rbody> {
        let state_arc = self.lookup(fid)?;
        let state = state_arc.read().unwrap();
        let handle = state.open.as_ref().ok_or(Error::NotOpen)?;
        if !state.mode.is_writable() {
            return Err(Error::WrongMode("writing"));
        }
        if matches!(state.path.current(), Some(Node::Dir(_))) {
            return Err(Error::NotAFile);
        }
        handle.seek(offset)?;
        let n = handle.write(data)?;
        Ok(Rbody::Write { count: n as u32 })
    }

    /// Tclunk: drop the fid, closing its handle if open.
    fn clunk(&self, fid: u32) -> Result<Rbody> {
        let mut fids = self.fids.write().unwrap();
        let state_arc = fids.remove(&fid).ok_or(Error::UnknownFid)?;
        let mut state = state_arc.write().unwrap();
        if let Some(handle) = state.open.take() {
            handle.close();
        }
        Ok(Rbody::Clunk)
    }

    /// Tremove: clunk unconditionally, then try to remove the entity from
    /// its parent. Removal failures still leave the fid clunked.
    fn remove(&self, fid: u32) -> Result<Rbody> {
        let mut fids = self.fids.write().unwrap();
        let state_arc = fids.remove(&fid).ok_or(Error::UnknownFid)?;
        drop(fids);
        let mut state = state_arc.write().unwrap();
        if let Some(handle) = state.open.take() {
            handle.close();
        }
        if state.path.is_root() {
            // The root itself is never removed.
            return Ok(Rbody::Remove);
        }
        let node = state.path.current().ok_or(Error::NoFile)?.clone();
        let parent = state.path.parent().ok_or(Error::NoFile)?.clone();
        let pdir = parent.as_dir().ok_or(Error::NotADirectory)?;
        pdir.remove(&state.uname, &node.name())?;
        Ok(Rbody::Remove)
    }

    /// Tstat: report the entity's directory entry.
    fn stat(&self, fid: u32) -> Result<Rbody> {
        let state_arc = self.lookup(fid)?;
        let state = state_arc.read().unwrap();
        let node = state.path.current().ok_or(Error::NoFile)?;
        Ok(Rbody::Stat { stat: node.stat() })
    }

    /// Twstat: apply a stat delta under the wstat rules.
    fn wstat(&self, fid: u32, delta: &Stat) -> Result<Rbody> {
        let fids = self.fids.write().unwrap();
        let state_arc = fids.get(&fid).ok_or(Error::UnknownFid)?.clone();
        let state = state_arc.write().unwrap();
        let node = state.path.current().ok_or(Error::NoFile)?.clone();
        let parent = if state.path.is_root() {
            None
        } else {
            state.path.parent().cloned()
        };
        apply_wstat(&state.uname, &node, parent.as_ref(), delta)?;
        Ok(Rbody::Wstat)
    }

    fn lookup(&self, fid: u32) -> Result<Arc<RwLock<Fid>>> {
        self.fids
            .read()
            .unwrap()
            .get(&fid)
            .cloned()
            .ok_or(Error::UnknownFid)
    }
}

/// The wstat field rules: immutable fields are refused, mode and mtime
/// are owner-only, renames need write permission on the parent, and
/// uid/gid changes are allowed without a strict check.
fn apply_wstat(user: &str, node: &Node, parent: Option<&Node>, delta: &Stat) -> Result<()> {
    let old = node.stat();
    let mut merged = old.clone();
    let mut need_parent_write = false;
    let mut rename_to = None;

    if delta.ty != u16::MAX && delta.ty != old.ty {
        return Err(Error::Illegal("type"));
    }
    if delta.dev != u32::MAX && delta.dev != old.dev {
        return Err(Error::Illegal("dev"));
    }
    if delta.mode.bits() != u32::MAX && delta.mode != old.mode {
        if user != old.uid {
            return Err(Error::NotOwner("mode"));
        }
        // The directory bit is never flipped by wstat.
        let dir_bit = old.mode.bits() & FileMode::DIR.bits();
        merged.mode = FileMode::from_bits(dir_bit | (delta.mode.bits() & !FileMode::DIR.bits()));
    }
    if delta.atime != u32::MAX && delta.atime != old.atime {
        return Err(Error::Illegal("atime"));
    }
    if delta.mtime != u32::MAX && delta.mtime != old.mtime {
        if user != old.uid {
            return Err(Error::NotOwner("mtime"));
        }
        merged.mtime = delta.mtime;
    }
    if delta.length != u64::MAX && delta.length != old.length {
        return Err(Error::Illegal("length"));
    }
    if !delta.name.is_empty() && delta.name != old.name {
        let parent = parent.ok_or(Error::RenameRoot)?;
        let pdir = parent.as_dir().ok_or(Error::NotADirectory)?;
        if pdir.walk(user, &delta.name)?.is_some() {
            return Err(Error::NameTaken);
        }
        rename_to = Some(delta.name.clone());
        need_parent_write = true;
    }
    if !delta.uid.is_empty() && delta.uid != old.uid {
        // Relaxed from Plan 9, which reserves ownership changes.
        merged.uid = delta.uid.clone();
    }
    if !delta.gid.is_empty() && delta.gid != old.gid {
        merged.gid = delta.gid.clone();
    }
    if !delta.muid.is_empty() && delta.muid != old.muid {
        return Err(Error::Illegal("muid"));
    }

    if need_parent_write {
        if let Some(parent) = parent {
            let pstat = parent.stat();
            if !permits(user == pstat.uid, pstat.mode, OpenMode::WRITE) {
                return Err(Error::Denied);
            }
        }
    }

    if let Some(newname) = rename_to {
        if let Some(pdir) = parent.and_then(Node::as_dir) {
            pdir.rename(user, &old.name, &newname)?;
        }
    }
    node.write_stat(merged)
}
