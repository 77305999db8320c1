// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Prove Tflush suppresses in-flight responses.
// Author: Lukas Bower

mod common;

use std::sync::Arc;
use std::thread;

use ninegate::wire::{OpenMode, Rbody, Tbody, Tmessage, NOFID, NOTAG};

#[test]
fn flush_suppresses_the_flushed_requests_response() {
    let (service, entered, release) = common::slow_service();
    let session = Arc::new(service.session());

    let resp = session
        .handle(Tmessage {
            tag: NOTAG,
            body: Tbody::Version {
                msize: 128 * 1024,
                version: "9P2000".to_string(),
            },
        })
        .expect("Rversion");
    assert!(matches!(resp.body, Rbody::Version { .. }));

    session
        .handle(Tmessage {
            tag: 1,
            body: Tbody::Attach {
                fid: 0,
                afid: NOFID,
                uname: "glen".to_string(),
                aname: "main".to_string(),
            },
        })
        .expect("Rattach");
    session
        .handle(Tmessage {
            tag: 2,
            body: Tbody::Walk {
                fid: 0,
                newfid: 1,
                names: vec!["slow".to_string()],
            },
        })
        .expect("Rwalk");
    session
        .handle(Tmessage {
            tag: 3,
            body: Tbody::Open {
                fid: 1,
                mode: OpenMode::READ,
            },
        })
        .expect("Ropen");

    // The read parks inside the handle until released.
    let worker = {
        let session = Arc::clone(&session);
        thread::spawn(move || {
            session.handle(Tmessage {
                tag: 7,
                body: Tbody::Read {
                    fid: 1,
                    offset: 0,
                    count: 1,
                },
            })
        })
    };
    entered.recv().expect("read entered");

    // Tflush lands while tag 7 is in flight; Rflush itself succeeds.
    let resp = session
        .handle(Tmessage {
            tag: 8,
            body: Tbody::Flush { oldtag: 7 },
        })
        .expect("Rflush");
    assert!(matches!(resp.body, Rbody::Flush));

    // Once released, the read completes but its response is suppressed.
    release.send(()).expect("release");
    assert!(worker.join().expect("worker").is_none());

    // The fid survived the whole affair.
    let resp = session
        .handle(Tmessage {
            tag: 9,
            body: Tbody::Clunk { fid: 1 },
        })
        .expect("Rclunk");
    assert!(matches!(resp.body, Rbody::Clunk));
}
