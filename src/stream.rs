// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Framed duplex byte streams the server and client run over.
// Author: Lukas Bower

//! Byte-stream abstraction.
//!
//! Both sides of the protocol need a duplex stream that can be split
//! into an independent reader and writer; [`Stream`] captures that with
//! `try_clone`. TCP sockets implement it directly, and [`PipeStream`]
//! provides an in-process pair for tests and in-process mounts.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{unbounded, Receiver, Sender};

/// A duplex byte stream that can be split into reader and writer halves.
pub trait Stream: Read + Write + Send + Sized + 'static {
    /// A second handle onto the same stream.
    fn try_clone(&self) -> io::Result<Self>;
}

impl Stream for TcpStream {
    fn try_clone(&self) -> io::Result<Self> {
        TcpStream::try_clone(self)
    }
}

/// In-process byte stream backed by crossbeam channels.
///
/// [`PipeStream::pair`] returns the two ends of a bidirectional pipe.
/// Reads block until the peer writes; a dropped peer reads as end of
/// stream and writes as a broken pipe.
#[derive(Clone)]
pub struct PipeStream {
    tx: Sender<Vec<u8>>,
    rx: Receiver<Vec<u8>>,
    pending: Arc<Mutex<Vec<u8>>>,
}

impl PipeStream {
    /// Create the two ends of a connected pipe.
    #[must_use]
    pub fn pair() -> (Self, Self) {
        let (a_tx, a_rx) = unbounded();
        let (b_tx, b_rx) = unbounded();
        (
            Self {
                tx: b_tx,
                rx: a_rx,
                pending: Arc::new(Mutex::new(Vec::new())),
            },
            Self {
                tx: a_tx,
                rx: b_rx,
                pending: Arc::new(Mutex::new(Vec::new())),
            },
        )
    }
}

impl Read for PipeStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut pending = self.pending.lock().unwrap();
        while pending.is_empty() {
            match self.rx.recv() {
                Ok(chunk) => *pending = chunk,
                Err(_) => return Ok(0),
            }
        }
        let n = buf.len().min(pending.len());
        buf[..n].copy_from_slice(&pending[..n]);
        pending.drain(..n);
        Ok(n)
    }
}

impl Write for PipeStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "peer closed"))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Stream for PipeStream {
    fn try_clone(&self) -> io::Result<Self> {
        Ok(self.clone())
    }
}
