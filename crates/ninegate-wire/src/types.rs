// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Define the 9P2000 data model shared across codec and engine.
// Author: Lukas Bower

//! 9P2000 data model: qids, modes, stats, and reserved values.

use core::fmt;
use core::ops::{BitAnd, BitOr};

/// Reserved tag value, permitted only on the version exchange.
pub const NOTAG: u16 = u16::MAX;

/// Reserved fid value, never a valid handle.
pub const NOFID: u32 = u32::MAX;

/// Bytes occupied by the `size[4] type[1] tag[2]` message header.
pub const HEADER_SIZE: u32 = 7;

/// Maximum number of names in a single Twalk.
pub const MAX_WALK_ELEMENTS: usize = 16;

/// Protocol overhead subtracted from msize to obtain the usable I/O unit.
pub const IO_HEADER_SIZE: u32 = 24;

/// Errors produced while encoding or decoding 9P messages.
#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// A field ran past the end of the declared message body.
    #[error("truncated message")]
    Truncated,
    /// Declared message size does not match the framed byte count.
    #[error("size mismatch: declared {declared} actual {actual}")]
    SizeMismatch {
        /// Size declared in the frame header.
        declared: u32,
        /// Byte count actually framed.
        actual: usize,
    },
    /// The type byte does not name a known message.
    #[error("unknown message type {0}")]
    UnknownType(u8),
    /// A string field held invalid UTF-8.
    #[error("invalid utf8 in string field")]
    InvalidUtf8,
    /// A string or counted field exceeds its length prefix.
    #[error("field too long for length prefix")]
    FieldTooLong,
}

/// Qid type bits, mirroring the DM* high bits of [`FileMode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QidType(u8);

impl QidType {
    /// Regular file.
    pub const FILE: Self = Self(0x00);
    /// Directory.
    pub const DIR: Self = Self(0x80);
    /// Append-only file.
    pub const APPEND: Self = Self(0x40);
    /// Exclusive-use file.
    pub const EXCL: Self = Self(0x20);
    /// Authentication file.
    pub const AUTH: Self = Self(0x08);

    /// Wrap a raw type byte.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// The raw wire byte.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Whether the directory bit is set.
    #[must_use]
    pub const fn is_dir(self) -> bool {
        self.0 & Self::DIR.0 != 0
    }
}

impl From<QidType> for u8 {
    fn from(value: QidType) -> Self {
        value.raw()
    }
}

/// Server-assigned identity of a file: type, version, and unique path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Qid {
    ty: QidType,
    version: u32,
    path: u64,
}

impl Qid {
    /// Encoded size of a qid on the wire.
    pub const SIZE: usize = 13;

    /// Construct a qid.
    #[must_use]
    pub const fn new(ty: QidType, version: u32, path: u64) -> Self {
        Self { ty, version, path }
    }

    /// The type bits.
    #[must_use]
    pub const fn ty(self) -> QidType {
        self.ty
    }

    /// The modification version.
    #[must_use]
    pub const fn version(self) -> u32 {
        self.version
    }

    /// The server-unique path number.
    #[must_use]
    pub const fn path(self) -> u64 {
        self.path
    }
}

/// File permission and type bits.
///
/// The low nine bits are rwx for owner and other (group semantics are
/// elided); the high byte mirrors the qid type bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMode(u32);

impl FileMode {
    /// Directory bit (DMDIR).
    pub const DIR: Self = Self(1 << 31);
    /// Append-only bit (DMAPPEND).
    pub const APPEND: Self = Self(1 << 30);
    /// Exclusive-use bit (DMEXCL).
    pub const EXCL: Self = Self(1 << 29);
    /// Authentication bit (DMAUTH).
    pub const AUTH: Self = Self(1 << 27);
    /// Temporary-file bit (DMTMP).
    pub const TMP: Self = Self(1 << 26);

    /// Mask selecting the nine permission bits.
    pub const PERM_MASK: u32 = 0o777;

    /// Wrap raw mode bits.
    #[must_use]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// The raw wire representation.
    #[must_use]
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Whether the directory bit is set.
    #[must_use]
    pub const fn is_dir(self) -> bool {
        self.0 & Self::DIR.0 != 0
    }

    /// Whether the append-only bit is set.
    #[must_use]
    pub const fn is_append(self) -> bool {
        self.0 & Self::APPEND.0 != 0
    }

    /// The nine permission bits.
    #[must_use]
    pub const fn permissions(self) -> u32 {
        self.0 & Self::PERM_MASK
    }

    /// The qid type bits implied by the DM* high bits.
    #[must_use]
    pub const fn qid_type(self) -> QidType {
        QidType::from_raw((self.0 >> 24) as u8)
    }
}

impl BitOr for FileMode {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitAnd for FileMode {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Octal for FileMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Octal::fmt(&self.0, f)
    }
}

/// Open mode requested by Topen/Tcreate.
///
/// The low two bits select read/write/rdwr/exec; OTRUNC and ORCLOSE are
/// carried but optional for servers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenMode(u8);

impl OpenMode {
    /// Open for reading.
    pub const READ: Self = Self(0);
    /// Open for writing.
    pub const WRITE: Self = Self(1);
    /// Open for reading and writing.
    pub const RDWR: Self = Self(2);
    /// Open for execution (directory traversal).
    pub const EXEC: Self = Self(3);
    /// Truncate on open.
    pub const TRUNC: Self = Self(0x10);
    /// Remove on clunk.
    pub const RCLOSE: Self = Self(0x40);

    /// Wrap a raw mode byte.
    #[must_use]
    pub const fn from_raw(raw: u8) -> Self {
        Self(raw)
    }

    /// The raw wire byte.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// The access selector in the low two bits.
    #[must_use]
    pub const fn base(self) -> u8 {
        self.0 & 3
    }

    /// Whether the mode permits reading.
    #[must_use]
    pub const fn is_readable(self) -> bool {
        matches!(self.base(), 0 | 2)
    }

    /// Whether the mode permits writing.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self.base(), 1 | 2)
    }

    /// Whether truncation was requested.
    #[must_use]
    pub const fn truncates(self) -> bool {
        self.0 & Self::TRUNC.0 != 0
    }
}

impl From<OpenMode> for u8 {
    fn from(value: OpenMode) -> Self {
        value.raw()
    }
}

/// Machine-independent directory entry.
///
/// Carries a leading `u16` size on the wire that excludes itself; unchanged
/// fields in a wstat delta are the all-ones integers and empty strings of
/// [`Stat::sentinel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    /// Kernel use; sentinel in practice.
    pub ty: u16,
    /// Kernel use; sentinel in practice.
    pub dev: u32,
    /// Identity of the file.
    pub qid: Qid,
    /// Permission and type bits.
    pub mode: FileMode,
    /// Last access time, seconds since the epoch.
    pub atime: u32,
    /// Last modification time, seconds since the epoch.
    pub mtime: u32,
    /// Length in bytes; 0 for directories.
    pub length: u64,
    /// Leaf name.
    pub name: String,
    /// Owner name.
    pub uid: String,
    /// Group name.
    pub gid: String,
    /// Name of the last modifying user.
    pub muid: String,
}

impl Stat {
    /// Bytes of the fixed fields following the size prefix.
    const FIXED: usize = 2 + 4 + Qid::SIZE + 4 + 4 + 4 + 8;

    /// A delta stat leaving every field unchanged.
    #[must_use]
    pub fn sentinel() -> Self {
        Self {
            ty: u16::MAX,
            dev: u32::MAX,
            qid: Qid::new(QidType::from_raw(u8::MAX), u32::MAX, u64::MAX),
            mode: FileMode::from_bits(u32::MAX),
            atime: u32::MAX,
            mtime: u32::MAX,
            length: u64::MAX,
            name: String::new(),
            uid: String::new(),
            gid: String::new(),
            muid: String::new(),
        }
    }

    /// Total encoded size, including the leading `u16` size field.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        2 + Self::FIXED
            + 2
            + self.name.len()
            + 2
            + self.uid.len()
            + 2
            + self.gid.len()
            + 2
            + self.muid.len()
    }
}
