// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Error taxonomy surfaced as Rerror enames.
// Author: Lukas Bower

//! Errors raised by the engine, the file layer, and the client.
//!
//! The `Display` strings are the stable enames carried by Rerror; the
//! client reports server-side failures through [`Error::Remote`].

use std::io;

use ninegate_wire::CodecError;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Everything that can go wrong while serving or speaking 9P2000.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The codec rejected a frame.
    #[error("malformed message: {0}")]
    Codec(#[from] CodecError),
    /// Transport-level failure; terminates the connection.
    #[error("{0}")]
    Io(#[from] io::Error),
    /// A non-Tversion request arrived before negotiation.
    #[error("version not negotiated")]
    NotNegotiated,
    /// The proposed msize cannot carry the largest fixed body.
    #[error("msize too small")]
    MsizeTooSmall,
    /// Authentication is advertised as unsupported.
    #[error("auth not supported")]
    AuthNotSupported,
    /// Tattach or Twalk tried to bind a fid that is already bound.
    #[error("fid already in use")]
    FidInUse,
    /// The request references an unbound fid.
    #[error("no such fid")]
    UnknownFid,
    /// The attach service name does not resolve to a root.
    #[error("no such service")]
    NoService,
    /// A first-name walk miss, or an operation on a vanished entity.
    #[error("no such file")]
    NoFile,
    /// A walk, create, or directory read hit a non-directory.
    #[error("fid not dir")]
    NotADirectory,
    /// A permission check failed.
    #[error("access denied")]
    Denied,
    /// Topen, Tcreate, or Twalk on a fid that already has a handle.
    #[error("already open")]
    AlreadyOpen,
    /// Tread or Twrite on an unopened fid.
    #[error("file not open")]
    NotOpen,
    /// The handle's open mode does not cover the requested direction.
    #[error("file not opened for {0}")]
    WrongMode(&'static str),
    /// Tcreate or a rename found the name occupied.
    #[error("file already exists")]
    AlreadyExists,
    /// Tcreate with "." or "..".
    #[error("illegal name")]
    IllegalName,
    /// Twalk carried more names than the protocol allows.
    #[error("too many walk elements")]
    WalkLimit,
    /// Twrite on a directory.
    #[error("cannot write to directory")]
    NotAFile,
    /// Tremove of a directory that still has children.
    #[error("directory not empty")]
    NotEmpty,
    /// Twstat touched an immutable field.
    #[error("it is illegal to modify {0}")]
    Illegal(&'static str),
    /// Twstat field reserved to the owner.
    #[error("only owner can change {0}")]
    NotOwner(&'static str),
    /// Twstat rename target already exists.
    #[error("name already taken")]
    NameTaken,
    /// Twstat tried to rename the root.
    #[error("it is illegal to rename root")]
    RenameRoot,
    /// Directory seek to a position other than 0 or the cursor.
    #[error("can only seek to 0 on directory")]
    BadDirSeek,
    /// Directory read too small to hold the next entry.
    #[error("read count too small for directory entry")]
    ShortDirRead,
    /// A response would exceed the negotiated msize.
    #[error("message too large")]
    TooBig,
    /// The request's response was suppressed by a Tflush.
    #[error("request flushed")]
    Flushed,
    /// The peer did not speak 9P2000.
    #[error("unknown protocol version")]
    UnknownVersion,
    /// The server answered with a different body than the request implies.
    #[error("unexpected response type")]
    UnexpectedResponse,
    /// The server answered Rerror; the ename is carried verbatim.
    #[error("{0}")]
    Remote(String),
}
