// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: 9P2000 wire codec shared by the Ninegate server and client.
// Author: Lukas Bower

//! 9P2000 wire format: data model, message set, and codec.
//!
//! Every 9P message is framed as `size[4] type[1] tag[2] body`, where
//! `size` counts itself and all integers are little-endian. This crate
//! owns the encoding rules; session semantics live in the `ninegate`
//! crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod codec;
mod message;
mod types;

pub use codec::{
    decode_rmessage, decode_tmessage, encode_rmessage, encode_tmessage, read_frame, write_frame,
};
pub use message::{MessageType, Rbody, Rmessage, Tbody, Tmessage};
pub use types::{
    CodecError, FileMode, OpenMode, Qid, QidType, Stat, HEADER_SIZE, IO_HEADER_SIZE,
    MAX_WALK_ELEMENTS, NOFID, NOTAG,
};
