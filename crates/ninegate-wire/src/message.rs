// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define the 9P2000 message set with its fixed type numbers.
// Author: Lukas Bower

//! Request and response envelopes for the 9P2000 message set.

use crate::types::{CodecError, FileMode, OpenMode, Qid, Stat};

/// 9P2000 message type bytes. Requests are even T-numbers, responses the
/// following odd R-number; there is no Terror.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum MessageType {
    Tversion = 100,
    Rversion = 101,
    Tauth = 102,
    Rauth = 103,
    Tattach = 104,
    Rattach = 105,
    Rerror = 107,
    Tflush = 108,
    Rflush = 109,
    Twalk = 110,
    Rwalk = 111,
    Topen = 112,
    Ropen = 113,
    Tcreate = 114,
    Rcreate = 115,
    Tread = 116,
    Rread = 117,
    Twrite = 118,
    Rwrite = 119,
    Tclunk = 120,
    Rclunk = 121,
    Tremove = 122,
    Rremove = 123,
    Tstat = 124,
    Rstat = 125,
    Twstat = 126,
    Rwstat = 127,
}

impl TryFrom<u8> for MessageType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use MessageType::*;
        Ok(match value {
            100 => Tversion,
            101 => Rversion,
            102 => Tauth,
            103 => Rauth,
            104 => Tattach,
            105 => Rattach,
            107 => Rerror,
            108 => Tflush,
            109 => Rflush,
            110 => Twalk,
            111 => Rwalk,
            112 => Topen,
            113 => Ropen,
            114 => Tcreate,
            115 => Rcreate,
            116 => Tread,
            117 => Rread,
            118 => Twrite,
            119 => Rwrite,
            120 => Tclunk,
            121 => Rclunk,
            122 => Tremove,
            123 => Rremove,
            124 => Tstat,
            125 => Rstat,
            126 => Twstat,
            127 => Rwstat,
            other => return Err(CodecError::UnknownType(other)),
        })
    }
}

/// A request envelope: tag plus typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tmessage {
    /// Request correlator echoed by the response.
    pub tag: u16,
    /// The concrete request.
    pub body: Tbody,
}

/// Request bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tbody {
    /// Negotiate msize and protocol version.
    Version {
        /// Proposed maximum message size.
        msize: u32,
        /// Proposed protocol string.
        version: String,
    },
    /// Request an authentication file.
    Auth {
        /// Fid to bind to the auth file.
        afid: u32,
        /// User requesting authentication.
        uname: String,
        /// Service to authenticate against.
        aname: String,
    },
    /// Bind a fid to a service root.
    Attach {
        /// Client-chosen root fid.
        fid: u32,
        /// Auth fid, or NOFID.
        afid: u32,
        /// Attaching user.
        uname: String,
        /// Service name selecting the root.
        aname: String,
    },
    /// Abandon an in-flight request.
    Flush {
        /// Tag of the request to abandon.
        oldtag: u16,
    },
    /// Resolve a name vector from a fid.
    Walk {
        /// Starting fid.
        fid: u32,
        /// Fid to bind on full success.
        newfid: u32,
        /// Names to traverse, at most [`crate::MAX_WALK_ELEMENTS`].
        names: Vec<String>,
    },
    /// Open a fid for I/O.
    Open {
        /// Fid to open.
        fid: u32,
        /// Requested access.
        mode: OpenMode,
    },
    /// Create a file or directory and open it.
    Create {
        /// Directory fid, advanced to the new entry.
        fid: u32,
        /// Leaf name of the new entry.
        name: String,
        /// Requested permissions, DMDIR selects a directory.
        perm: FileMode,
        /// Access for the implicit open.
        mode: OpenMode,
    },
    /// Read bytes at an offset.
    Read {
        /// Open fid.
        fid: u32,
        /// Byte offset.
        offset: u64,
        /// Requested byte count.
        count: u32,
    },
    /// Write bytes at an offset.
    Write {
        /// Open fid.
        fid: u32,
        /// Byte offset; ignored for append-only files.
        offset: u64,
        /// Payload.
        data: Vec<u8>,
    },
    /// Release a fid.
    Clunk {
        /// Fid to release.
        fid: u32,
    },
    /// Release a fid and remove the file it names.
    Remove {
        /// Fid to release.
        fid: u32,
    },
    /// Read the file's stat.
    Stat {
        /// Fid naming the file.
        fid: u32,
    },
    /// Apply a stat delta.
    Wstat {
        /// Fid naming the file.
        fid: u32,
        /// Delta; sentinel fields stay unchanged.
        stat: Stat,
    },
}

impl Tbody {
    /// The wire type byte for this body.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Tbody::Version { .. } => MessageType::Tversion,
            Tbody::Auth { .. } => MessageType::Tauth,
            Tbody::Attach { .. } => MessageType::Tattach,
            Tbody::Flush { .. } => MessageType::Tflush,
            Tbody::Walk { .. } => MessageType::Twalk,
            Tbody::Open { .. } => MessageType::Topen,
            Tbody::Create { .. } => MessageType::Tcreate,
            Tbody::Read { .. } => MessageType::Tread,
            Tbody::Write { .. } => MessageType::Twrite,
            Tbody::Clunk { .. } => MessageType::Tclunk,
            Tbody::Remove { .. } => MessageType::Tremove,
            Tbody::Stat { .. } => MessageType::Tstat,
            Tbody::Wstat { .. } => MessageType::Twstat,
        }
    }

    /// Short label used in per-request log lines.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Tbody::Version { .. } => "Tversion",
            Tbody::Auth { .. } => "Tauth",
            Tbody::Attach { .. } => "Tattach",
            Tbody::Flush { .. } => "Tflush",
            Tbody::Walk { .. } => "Twalk",
            Tbody::Open { .. } => "Topen",
            Tbody::Create { .. } => "Tcreate",
            Tbody::Read { .. } => "Tread",
            Tbody::Write { .. } => "Twrite",
            Tbody::Clunk { .. } => "Tclunk",
            Tbody::Remove { .. } => "Tremove",
            Tbody::Stat { .. } => "Tstat",
            Tbody::Wstat { .. } => "Twstat",
        }
    }
}

/// A response envelope: tag plus typed body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rmessage {
    /// Correlator copied from the request.
    pub tag: u16,
    /// The concrete response.
    pub body: Rbody,
}

/// Response bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rbody {
    /// Negotiated msize and version, or "unknown".
    Version {
        /// Negotiated maximum message size.
        msize: u32,
        /// Accepted protocol string.
        version: String,
    },
    /// Qid of the auth file.
    Auth {
        /// Identity of the auth file.
        aqid: Qid,
    },
    /// Qid of the attached root.
    Attach {
        /// Identity of the service root.
        qid: Qid,
    },
    /// Request failed.
    Error {
        /// Human-readable reason.
        ename: String,
    },
    /// Flush acknowledged.
    Flush,
    /// Qids traversed by the walk prefix that succeeded.
    Walk {
        /// One qid per traversed name.
        qids: Vec<Qid>,
    },
    /// Open succeeded.
    Open {
        /// Identity of the opened file.
        qid: Qid,
        /// Preferred I/O unit; 0 defers to msize.
        iounit: u32,
    },
    /// Create succeeded.
    Create {
        /// Identity of the new file.
        qid: Qid,
        /// Preferred I/O unit; 0 defers to msize.
        iounit: u32,
    },
    /// Bytes read.
    Read {
        /// Payload; empty at end of file.
        data: Vec<u8>,
    },
    /// Bytes written.
    Write {
        /// Number of bytes accepted.
        count: u32,
    },
    /// Fid released.
    Clunk,
    /// Fid released; removal attempted.
    Remove,
    /// Stat of the file.
    Stat {
        /// The directory entry.
        stat: Stat,
    },
    /// Stat delta applied.
    Wstat,
}

impl Rbody {
    /// The wire type byte for this body.
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        match self {
            Rbody::Version { .. } => MessageType::Rversion,
            Rbody::Auth { .. } => MessageType::Rauth,
            Rbody::Attach { .. } => MessageType::Rattach,
            Rbody::Error { .. } => MessageType::Rerror,
            Rbody::Flush => MessageType::Rflush,
            Rbody::Walk { .. } => MessageType::Rwalk,
            Rbody::Open { .. } => MessageType::Ropen,
            Rbody::Create { .. } => MessageType::Rcreate,
            Rbody::Read { .. } => MessageType::Rread,
            Rbody::Write { .. } => MessageType::Rwrite,
            Rbody::Clunk => MessageType::Rclunk,
            Rbody::Remove => MessageType::Rremove,
            Rbody::Stat { .. } => MessageType::Rstat,
            Rbody::Wstat => MessageType::Rwstat,
        }
    }
}
