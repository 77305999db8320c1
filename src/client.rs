// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Path-oriented convenience client for 9P2000 servers.
// Author: Lukas Bower

//! The convenience client.
//!
//! [`Client::connect`] negotiates the version, attaches a root fid, and
//! starts a reader thread that correlates responses to callers by tag.
//! On top of that sit linear per-path operations: whole-file
//! [`Client::read`] and [`Client::write`], [`Client::list`],
//! [`Client::create`], and [`Client::remove`]. Tags and fids come from
//! monotonic counters that skip the reserved values and the root fid.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicU16, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{bounded, Sender};
use log::warn;
use ninegate_wire::{
    decode_rmessage, encode_tmessage, read_frame, write_frame, FileMode, OpenMode, Qid, Rbody,
    Rmessage, Stat, Tbody, Tmessage, IO_HEADER_SIZE, NOFID, NOTAG,
};

use crate::error::{Error, Result};
use crate::stream::Stream;

/// msize the client proposes at version time.
pub const CLIENT_MAX_SIZE: u32 = 128 * 1024;

const ROOT_FID: u32 = 0;

/// A connected, attached 9P2000 client.
pub struct Client<S: Stream> {
    writer: Mutex<S>,
    shared: Arc<Shared>,
    msize: u32,
    root_qid: Qid,
    next_tag: AtomicU16,
    next_fid: AtomicU32,
}

#[derive(Default)]
struct Shared {
    pending: Mutex<HashMap<u16, Sender<Rmessage>>>,
}

impl<S: Stream> Client<S> {
    /// Negotiate the version, attach `uname` to `aname` on fid 0, and
    /// return the ready client.
    pub fn connect(stream: S, uname: &str, aname: &str) -> Result<Self> {
        let reader = stream.try_clone()?;
        let shared = Arc::new(Shared::default());
        let reader_shared = Arc::clone(&shared);
        thread::spawn(move || reader_loop(reader, reader_shared));

        let mut client = Self {
            writer: Mutex::new(stream),
            shared,
            msize: CLIENT_MAX_SIZE,
            root_qid: Qid::new(ninegate_wire::QidType::DIR, 0, 0),
            next_tag: AtomicU16::new(0),
            next_fid: AtomicU32::new(1),
        };

        match client.rpc(
            NOTAG,
            Tbody::Version {
                msize: CLIENT_MAX_SIZE,
                version: "9P2000".to_string(),
            },
        )? {
            Rbody::Version { msize, version } => {
                if version != "9P2000" {
                    return Err(Error::UnknownVersion);
                }
                client.msize = msize;
            }
            _ => return Err(Error::UnexpectedResponse),
        }

        let tag = client.alloc_tag();
        match client.rpc(
            tag,
            Tbody::Attach {
                fid: ROOT_FID,
                afid: NOFID,
                uname: uname.to_string(),
                aname: aname.to_string(),
            },
        )? {
            Rbody::Attach { qid } => client.root_qid = qid,
            _ => return Err(Error::UnexpectedResponse),
        }

        Ok(client)
    }

    /// The negotiated maximum message size.
    #[must_use]
    pub fn msize(&self) -> u32 {
        self.msize
    }

    /// Read the whole file at `path`.
    pub fn read(&self, path: &str) -> Result<Vec<u8>> {
        let (fid, _) = self.walk_to(path)?;
        let result = self.open_and_read(fid);
        self.clunk(fid);
        result
    }

    /// Write `content` at the start of the file at `path`.
    pub fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let (fid, _) = self.walk_to(path)?;
        let result = self.open_and_write(fid, content);
        self.clunk(fid);
        result
    }

    /// List the directory at `path`; directory entries get a `/` suffix.
    pub fn list(&self, path: &str) -> Result<Vec<String>> {
        let stream = {
            let (fid, _) = self.walk_to(path)?;
            let result = self.open_and_read(fid);
            self.clunk(fid);
            result?
        };
        let mut names = Vec::new();
        let mut rest = &stream[..];
        while !rest.is_empty() {
            let (stat, used) = Stat::decode(rest)?;
            rest = &rest[used..];
            if stat.mode.is_dir() {
                names.push(format!("{}/", stat.name));
            } else {
                names.push(stat.name);
            }
        }
        Ok(names)
    }

    /// Create a file (or directory) at `path` with permissions 0755.
    pub fn create(&self, path: &str, directory: bool) -> Result<()> {
        let trimmed = path.trim_end_matches('/');
        let (dir, leaf) = match trimmed.rfind('/') {
            Some(split) => (&trimmed[..split], &trimmed[split + 1..]),
            None => ("", trimmed),
        };
        if leaf.is_empty() {
            return Err(Error::IllegalName);
        }
        let mut perm = FileMode::from_bits(0o755);
        if directory {
            perm = perm | FileMode::DIR;
        }
        let (fid, _) = self.walk_to(dir)?;
        let tag = self.alloc_tag();
        let result = self.rpc(
            tag,
            Tbody::Create {
                fid,
                name: leaf.to_string(),
                perm,
                mode: OpenMode::READ,
            },
        );
        self.clunk(fid);
        match result? {
            Rbody::Create { .. } => Ok(()),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Remove the file at `path`. The server clunks the fid either way.
    pub fn remove(&self, path: &str) -> Result<()> {
        let (fid, _) = self.walk_to(path)?;
        let tag = self.alloc_tag();
        match self.rpc(tag, Tbody::Remove { fid })? {
            Rbody::Remove => Ok(()),
            _ => Err(Error::UnexpectedResponse),
        }
    }

    /// Issue a Tflush for every request currently waiting on a response,
    /// failing those callers with [`Error::Flushed`]. Returns how many
    /// tags were flushed.
    pub fn flush_pending(&self) -> Result<usize> {
        let tags: Vec<u16> = self
            .shared
            .pending
            .lock()
            .unwrap()
            .keys()
            .copied()
            .collect();
        let mut flushed = 0;
        for oldtag in tags {
            let tag = self.alloc_tag();
            match self.rpc(tag, Tbody::Flush { oldtag })? {
                Rbody::Flush => {}
                _ => return Err(Error::UnexpectedResponse),
            }
            if let Some(tx) = self.shared.pending.lock().unwrap().remove(&oldtag) {
                let _ = tx.send(Rmessage {
                    tag: oldtag,
                    body: Rbody::Error {
                        ename: Error::Flushed.to_string(),
                    },
                });
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    fn open_and_read(&self, fid: u32) -> Result<Vec<u8>> {
        let tag = self.alloc_tag();
        match self.rpc(
            tag,
            Tbody::Open {
                fid,
                mode: OpenMode::READ,
            },
        )? {
            Rbody::Open { .. } => {}
            _ => return Err(Error::UnexpectedResponse),
        }
        let unit = self.msize.saturating_sub(IO_HEADER_SIZE);
        let mut content = Vec::new();
        loop {
            let tag = self.alloc_tag();
            match self.rpc(
                tag,
                Tbody::Read {
                    fid,
                    offset: content.len() as u64,
                    count: unit,
                },
            )? {
                Rbody::Read { data } => {
                    if data.is_empty() {
                        break;
                    }
                    content.extend_from_slice(&data);
                }
                _ => return Err(Error::UnexpectedResponse),
            }
        }
        Ok(content)
    }

    fn open_and_write(&self, fid: u32, content: &[u8]) -> Result<()> {
        let tag = self.alloc_tag();
        match self.rpc(
            tag,
            Tbody::Open {
                fid,
                mode: OpenMode::WRITE,
            },
        )? {
            Rbody::Open { .. } => {}
            _ => return Err(Error::UnexpectedResponse),
        }
        let unit = self.msize.saturating_sub(IO_HEADER_SIZE) as usize;
        let mut offset = 0usize;
        while offset < content.len() {
            let end = (offset + unit).min(content.len());
            let tag = self.alloc_tag();
            match self.rpc(
                tag,
                Tbody::Write {
                    fid,
                    offset: offset as u64,
                    data: content[offset..end].to_vec(),
                },
            )? {
                Rbody::Write { count } => {
                    if count == 0 {
                        return Err(Error::Io(io::Error::new(
                            io::ErrorKind::WriteZero,
                            "server accepted no bytes",
                        )));
                    }
                    offset += count as usize;
                }
                _ => return Err(Error::UnexpectedResponse),
            }
        }
        Ok(())
    }

    /// Walk from the root to `path`, returning the bound fid and the
    /// final qid. A partial walk leaves nothing bound and reports
    /// [`Error::NoFile`].
    fn walk_to(&self, path: &str) -> Result<(u32, Qid)> {
        let names: Vec<String> = path
            .split('/')
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect();
        let newfid = self.alloc_fid();
        let tag = self.alloc_tag();
        let qids = match self.rpc(
            tag,
            Tbody::Walk {
                fid: ROOT_FID,
                newfid,
                names: names.clone(),
            },
        )? {
            Rbody::Walk { qids } => qids,
            _ => return Err(Error::UnexpectedResponse),
        };
        if qids.len() != names.len() {
            return Err(Error::NoFile);
        }
        if qids.len() > 1 {
            for qid in &qids[..qids.len() - 1] {
                if !qid.ty().is_dir() {
                    self.clunk(newfid);
                    return Err(Error::NotADirectory);
                }
            }
        }
        let qid = qids.last().copied().unwrap_or(self.root_qid);
        Ok((newfid, qid))
    }

    fn clunk(&self, fid: u32) {
        let tag = self.alloc_tag();
        if let Err(err) = self.rpc(tag, Tbody::Clunk { fid }) {
            warn!("clunk of fid {fid} failed: {err}");
        }
    }

    fn rpc(&self, tag: u16, body: Tbody) -> Result<Rbody> {
        let (tx, rx) = bounded(1);
        self.shared.pending.lock().unwrap().insert(tag, tx);
        let frame = encode_tmessage(&Tmessage { tag, body })?;
        {
            let mut writer = self.writer.lock().unwrap();
            write_frame(&mut *writer, &frame)?;
        }
        let resp = rx.recv().map_err(|_| {
            Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "connection closed",
            ))
        })?;
        match resp.body {
            Rbody::Error { ename } => Err(Error::Remote(ename)),
            body => Ok(body),
        }
    }

    fn alloc_tag(&self) -> u16 {
        loop {
            let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
            if tag != NOTAG {
                return tag;
            }
        }
    }

    fn alloc_fid(&self) -> u32 {
        loop {
            let fid = self.next_fid.fetch_add(1, Ordering::SeqCst);
            if fid != NOFID && fid != ROOT_FID {
                return fid;
            }
        }
    }
}

fn reader_loop<S: Stream>(mut reader: S, shared: Arc<Shared>) {
    loop {
        let frame = match read_frame(&mut reader, CLIENT_MAX_SIZE) {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                warn!("client read failed: {err}");
                break;
            }
        };
        let msg = match decode_rmessage(&frame) {
            Ok(msg) => msg,
            Err(err) => {
                warn!("client received malformed message: {err}");
                break;
            }
        };
        let sender = shared.pending.lock().unwrap().remove(&msg.tag);
        match sender {
            Some(tx) => {
                let _ = tx.send(msg);
            }
            None => warn!("response for unknown tag {}", msg.tag),
        }
    }
    // Fail anyone still waiting.
    shared.pending.lock().unwrap().clear();
}
