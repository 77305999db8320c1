// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Encode and decode 9P2000 wire messages.
// Author: Lukas Bower

//! Encode/decode for the 9P2000 message set.
//!
//! Layout rules: integers little-endian, strings `u16 + bytes`, I/O
//! payloads `u32 + bytes`, stats embedded with their own leading size.

use std::io::{self, Read, Write};

use crate::message::{MessageType, Rbody, Rmessage, Tbody, Tmessage};
use crate::types::{CodecError, FileMode, OpenMode, Qid, QidType, Stat, HEADER_SIZE};

/// Encode a request into a complete wire frame.
pub fn encode_tmessage(msg: &Tmessage) -> Result<Vec<u8>, CodecError> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&msg.tag.to_le_bytes());
    match &msg.body {
        Tbody::Version { msize, version } => {
            payload.extend_from_slice(&msize.to_le_bytes());
            put_string(&mut payload, version)?;
        }
        Tbody::Auth { afid, uname, aname } => {
            payload.extend_from_slice(&afid.to_le_bytes());
            put_string(&mut payload, uname)?;
            put_string(&mut payload, aname)?;
        }
        Tbody::Attach {
            fid,
            afid,
            uname,
            aname,
        } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            payload.extend_from_slice(&afid.to_le_bytes());
            put_string(&mut payload, uname)?;
            put_string(&mut payload, aname)?;
        }
        Tbody::Flush { oldtag } => {
            payload.extend_from_slice(&oldtag.to_le_bytes());
        }
        Tbody::Walk { fid, newfid, names } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            payload.extend_from_slice(&newfid.to_le_bytes());
            let count: u16 = names.len().try_into().map_err(|_| CodecError::FieldTooLong)?;
            payload.extend_from_slice(&count.to_le_bytes());
            for name in names {
                put_string(&mut payload, name)?;
            }
        }
        Tbody::Open { fid, mode } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            payload.push(mode.raw());
        }
        Tbody::Create {
            fid,
            name,
            perm,
            mode,
        } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            put_string(&mut payload, name)?;
            payload.extend_from_slice(&perm.bits().to_le_bytes());
            payload.push(mode.raw());
        }
        Tbody::Read { fid, offset, count } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            payload.extend_from_slice(&offset.to_le_bytes());
            payload.extend_from_slice(&count.to_le_bytes());
        }
        Tbody::Write { fid, offset, data } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            payload.extend_from_slice(&offset.to_le_bytes());
            put_bytes(&mut payload, data)?;
        }
        Tbody::Clunk { fid } | Tbody::Remove { fid } | Tbody::Stat { fid } => {
            payload.extend_from_slice(&fid.to_le_bytes());
        }
        Tbody::Wstat { fid, stat } => {
            payload.extend_from_slice(&fid.to_le_bytes());
            put_sized_stat(&mut payload, stat)?;
        }
    }
    Ok(finish(msg.body.message_type(), &payload))
}

/// Encode a response into a complete wire frame.
pub fn encode_rmessage(msg: &Rmessage) -> Result<Vec<u8>, CodecError> {
    let mut payload = Vec::new();
    payload.extend_from_slice(&msg.tag.to_le_bytes());
    match &msg.body {
        Rbody::Version { msize, version } => {
            payload.extend_from_slice(&msize.to_le_bytes());
            put_string(&mut payload, version)?;
        }
        Rbody::Auth { aqid } => put_qid(&mut payload, *aqid),
        Rbody::Attach { qid } => put_qid(&mut payload, *qid),
        Rbody::Error { ename } => put_string(&mut payload, ename)?,
        Rbody::Flush | Rbody::Clunk | Rbody::Remove | Rbody::Wstat => {}
        Rbody::Walk { qids } => {
            let count: u16 = qids.len().try_into().map_err(|_| CodecError::FieldTooLong)?;
            payload.extend_from_slice(&count.to_le_bytes());
            for qid in qids {
                put_qid(&mut payload, *qid);
            }
        }
        Rbody::Open { qid, iounit } | Rbody::Create { qid, iounit } => {
            put_qid(&mut payload, *qid);
            payload.extend_from_slice(&iounit.to_le_bytes());
        }
        Rbody::Read { data } => put_bytes(&mut payload, data)?,
        Rbody::Write { count } => payload.extend_from_slice(&count.to_le_bytes()),
        Rbody::Stat { stat } => put_sized_stat(&mut payload, stat)?,
    }
    Ok(finish(msg.body.message_type(), &payload))
}

/// Decode a request from a complete wire frame.
pub fn decode_tmessage(bytes: &[u8]) -> Result<Tmessage, CodecError> {
    let (ty, payload) = split_frame(bytes)?;
    let mut cursor = Cursor::new(payload);
    let tag = cursor.u16()?;
    let body = match ty {
        MessageType::Tversion => Tbody::Version {
            msize: cursor.u32()?,
            version: cursor.string()?,
        },
        MessageType::Tauth => Tbody::Auth {
            afid: cursor.u32()?,
            uname: cursor.string()?,
            aname: cursor.string()?,
        },
        MessageType::Tattach => Tbody::Attach {
            fid: cursor.u32()?,
            afid: cursor.u32()?,
            uname: cursor.string()?,
            aname: cursor.string()?,
        },
        MessageType::Tflush => Tbody::Flush {
            oldtag: cursor.u16()?,
        },
        MessageType::Twalk => {
            let fid = cursor.u32()?;
            let newfid = cursor.u32()?;
            let count = cursor.u16()? as usize;
            let mut names = Vec::with_capacity(count.min(crate::MAX_WALK_ELEMENTS));
            for _ in 0..count {
                names.push(cursor.string()?);
            }
            Tbody::Walk { fid, newfid, names }
        }
        MessageType::Topen => Tbody::Open {
            fid: cursor.u32()?,
            mode: OpenMode::from_raw(cursor.u8()?),
        },
        MessageType::Tcreate => Tbody::Create {
            fid: cursor.u32()?,
            name: cursor.string()?,
            perm: FileMode::from_bits(cursor.u32()?),
            mode: OpenMode::from_raw(cursor.u8()?),
        },
        MessageType::Tread => Tbody::Read {
            fid: cursor.u32()?,
            offset: cursor.u64()?,
            count: cursor.u32()?,
        },
        MessageType::Twrite => {
            let fid = cursor.u32()?;
            let offset = cursor.u64()?;
            let count = cursor.u32()? as usize;
            let data = cursor.take(count)?.to_vec();
            Tbody::Write { fid, offset, data }
        }
        MessageType::Tclunk => Tbody::Clunk { fid: cursor.u32()? },
        MessageType::Tremove => Tbody::Remove { fid: cursor.u32()? },
        MessageType::Tstat => Tbody::Stat { fid: cursor.u32()? },
        MessageType::Twstat => {
            let fid = cursor.u32()?;
            let stat = read_sized_stat(&mut cursor)?;
            Tbody::Wstat { fid, stat }
        }
        other => return Err(CodecError::UnknownType(other as u8)),
    };
    Ok(Tmessage { tag, body })
}

/// Decode a response from a complete wire frame.
pub fn decode_rmessage(bytes: &[u8]) -> Result<Rmessage, CodecError> {
    let (ty, payload) = split_frame(bytes)?;
    let mut cursor = Cursor::new(payload);
    let tag = cursor.u16()?;
    let body = match ty {
        MessageType::Rversion => Rbody::Version {
            msize: cursor.u32()?,
            version: cursor.string()?,
        },
        MessageType::Rauth => Rbody::Auth {
            aqid: cursor.qid()?,
        },
        MessageType::Rattach => Rbody::Attach {
            qid: cursor.qid()?,
        },
        MessageType::Rerror => Rbody::Error {
            ename: cursor.string()?,
        },
        MessageType::Rflush => Rbody::Flush,
        MessageType::Rwalk => {
            let count = cursor.u16()? as usize;
            let mut qids = Vec::with_capacity(count.min(crate::MAX_WALK_ELEMENTS));
            for _ in 0..count {
                qids.push(cursor.qid()?);
            }
            Rbody::Walk { qids }
        }
        MessageType::Ropen => Rbody::Open {
            qid: cursor.qid()?,
            iounit: cursor.u32()?,
        },
        MessageType::Rcreate => Rbody::Create {
            qid: cursor.qid()?,
            iounit: cursor.u32()?,
        },
        MessageType::Rread => {
            let count = cursor.u32()? as usize;
            Rbody::Read {
                data: cursor.take(count)?.to_vec(),
            }
        }
        MessageType::Rwrite => Rbody::Write {
            count: cursor.u32()?,
        },
        MessageType::Rclunk => Rbody::Clunk,
        MessageType::Rremove => Rbody::Remove,
        MessageType::Rstat => Rbody::Stat {
            stat: read_sized_stat(&mut cursor)?,
        },
        MessageType::Rwstat => Rbody::Wstat,
        other => return Err(CodecError::UnknownType(other as u8)),
    };
    Ok(Rmessage { tag, body })
}

/// Read one size-prefixed frame from `reader`.
///
/// Returns `None` on a clean end of stream. Frames smaller than the header
/// or larger than `limit` are rejected as invalid data.
pub fn read_frame<R: Read>(reader: &mut R, limit: u32) -> io::Result<Option<Vec<u8>>> {
    let mut size_buf = [0u8; 4];
    match reader.read_exact(&mut size_buf) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let size = u32::from_le_bytes(size_buf);
    if size < HEADER_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame size {size} below header"),
        ));
    }
    if size > limit {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame size {size} exceeds limit {limit}"),
        ));
    }
    let mut frame = vec![0u8; size as usize];
    frame[..4].copy_from_slice(&size_buf);
    reader.read_exact(&mut frame[4..])?;
    Ok(Some(frame))
}

/// Write one already-encoded frame to `writer`.
pub fn write_frame<W: Write>(writer: &mut W, frame: &[u8]) -> io::Result<()> {
    writer.write_all(frame)?;
    writer.flush()
}

impl Stat {
    /// Append the wire form, leading size included, to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let size: u16 = (self.encoded_len() - 2)
            .try_into()
            .map_err(|_| CodecError::FieldTooLong)?;
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&self.ty.to_le_bytes());
        out.extend_from_slice(&self.dev.to_le_bytes());
        put_qid(out, self.qid);
        out.extend_from_slice(&self.mode.bits().to_le_bytes());
        out.extend_from_slice(&self.atime.to_le_bytes());
        out.extend_from_slice(&self.mtime.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
        put_string(out, &self.name)?;
        put_string(out, &self.uid)?;
        put_string(out, &self.gid)?;
        put_string(out, &self.muid)?;
        Ok(())
    }

    /// Decode one stat from the front of `bytes`, returning it with the
    /// number of bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<(Stat, usize), CodecError> {
        let mut cursor = Cursor::new(bytes);
        let stat = read_stat(&mut cursor)?;
        Ok((stat, cursor.pos))
    }
}

fn finish(ty: MessageType, payload: &[u8]) -> Vec<u8> {
    let size = payload.len() + 5;
    let mut frame = Vec::with_capacity(size);
    frame.extend_from_slice(&(size as u32).to_le_bytes());
    frame.push(ty as u8);
    frame.extend_from_slice(payload);
    frame
}

fn split_frame(bytes: &[u8]) -> Result<(MessageType, &[u8]), CodecError> {
    if bytes.len() < 5 {
        return Err(CodecError::Truncated);
    }
    let declared = u32::from_le_bytes(bytes[..4].try_into().unwrap_or([0; 4]));
    if declared as usize != bytes.len() {
        return Err(CodecError::SizeMismatch {
            declared,
            actual: bytes.len(),
        });
    }
    let ty = MessageType::try_from(bytes[4])?;
    Ok((ty, &bytes[5..]))
}

fn put_string(out: &mut Vec<u8>, value: &str) -> Result<(), CodecError> {
    let len: u16 = value.len().try_into().map_err(|_| CodecError::FieldTooLong)?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn put_bytes(out: &mut Vec<u8>, data: &[u8]) -> Result<(), CodecError> {
    let len: u32 = data.len().try_into().map_err(|_| CodecError::FieldTooLong)?;
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(data);
    Ok(())
}

fn put_qid(out: &mut Vec<u8>, qid: Qid) {
    out.push(qid.ty().raw());
    out.extend_from_slice(&qid.version().to_le_bytes());
    out.extend_from_slice(&qid.path().to_le_bytes());
}

fn put_sized_stat(out: &mut Vec<u8>, stat: &Stat) -> Result<(), CodecError> {
    let nstat: u16 = stat
        .encoded_len()
        .try_into()
        .map_err(|_| CodecError::FieldTooLong)?;
    out.extend_from_slice(&nstat.to_le_bytes());
    stat.write_to(out)
}

fn read_sized_stat(cursor: &mut Cursor<'_>) -> Result<Stat, CodecError> {
    let nstat = cursor.u16()? as usize;
    let mut inner = Cursor::new(cursor.take(nstat)?);
    read_stat(&mut inner)
}

fn read_stat(cursor: &mut Cursor<'_>) -> Result<Stat, CodecError> {
    let size = cursor.u16()? as usize;
    let mut body = Cursor::new(cursor.take(size)?);
    Ok(Stat {
        ty: body.u16()?,
        dev: body.u32()?,
        qid: body.qid()?,
        mode: FileMode::from_bits(body.u32()?),
        atime: body.u32()?,
        mtime: body.u32()?,
        length: body.u64()?,
        name: body.string()?,
        uid: body.string()?,
        gid: body.string()?,
        muid: body.string()?,
    })
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated)?;
        if end > self.buf.len() {
            return Err(CodecError::Truncated);
        }
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        let bytes = self.take(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(bytes);
        Ok(u64::from_le_bytes(raw))
    }

    fn string(&mut self) -> Result<String, CodecError> {
        let len = self.u16()? as usize;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| CodecError::InvalidUtf8)
    }

    fn qid(&mut self) -> Result<Qid, CodecError> {
        let ty = QidType::from_raw(self.u8()?);
        let version = self.u32()?;
        let path = self.u64()?;
        Ok(Qid::new(ty, version, path))
    }
}
