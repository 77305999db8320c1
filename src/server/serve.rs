// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Pump a session over a framed stream: reader, writer, request tasks.
// Author: Lukas Bower

use std::io;
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;

use crossbeam_channel::unbounded;
use log::{info, warn};
use ninegate_wire::{decode_tmessage, encode_rmessage, read_frame, write_frame, Rbody, Rmessage};

use crate::error::Error;
use crate::server::FileService;
use crate::stream::Stream;

/// Serve one connection until the stream closes or a frame is malformed.
///
/// One writer thread drains the response queue; every decoded request
/// runs as its own thread so a Tflush can land mid-request. Responses
/// for different tags go out in completion order. Dropping the
/// connection implicitly clunks all of its fids: the session dies with
/// this call.
pub fn serve_connection<S: Stream>(service: Arc<FileService>, stream: S) -> io::Result<()> {
    let session = Arc::new(service.session());
    let mut reader = stream.try_clone()?;
    let mut writer = stream;

    let (tx, rx) = unbounded::<Vec<u8>>();
    let writer_thread = thread::spawn(move || {
        while let Ok(frame) = rx.recv() {
            if let Err(err) = write_frame(&mut writer, &frame) {
                warn!("connection write failed: {err}");
                break;
            }
        }
    });

    loop {
        let frame = match read_frame(&mut reader, session.msize()) {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(err) => {
                warn!("connection read failed: {err}");
                break;
            }
        };
        let msg = match decode_tmessage(&frame) {
            Ok(msg) => msg,
            Err(err) => {
                warn!("malformed message, closing connection: {err}");
                break;
            }
        };
        // Register in wire order so a Tflush behind this request on the
        // stream is guaranteed to find its tag live.
        session.register(msg.tag);
        let session = Arc::clone(&session);
        let tx = tx.clone();
        thread::spawn(move || {
            let Some(resp) = session.run(msg) else {
                return;
            };
            let msize = session.msize() as usize;
            let frame = match encode_rmessage(&resp) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!("failed to encode response: {err}");
                    return;
                }
            };
            let frame = if frame.len() > msize {
                let fallback = Rmessage {
                    tag: resp.tag,
                    body: Rbody::Error {
                        ename: Error::TooBig.to_string(),
                    },
                };
                match encode_rmessage(&fallback) {
                    Ok(frame) => frame,
                    Err(_) => return,
                }
            } else {
                frame
            };
            let _ = tx.send(frame);
        });
    }

    drop(tx);
    let _ = writer_thread.join();
    Ok(())
}

/// Accept loop: one connection handler thread per socket.
pub fn serve_listener(service: Arc<FileService>, listener: TcpListener) -> io::Result<()> {
    for conn in listener.incoming() {
        match conn {
            Ok(sock) => {
                let service = Arc::clone(&service);
                thread::spawn(move || {
                    if let Ok(peer) = sock.peer_addr() {
                        info!("accepted connection from {peer}");
                    }
                    if let Err(err) = serve_connection(service, sock) {
                        warn!("connection failed: {err}");
                    }
                });
            }
            Err(err) => warn!("accept failed: {err}"),
        }
    }
    Ok(())
}
