// Copyright © 2025 Lukas Bower
// SPDX-License-Identifier: Apache-2.0
// Purpose: Drive the convenience client against a served session.
// Author: Lukas Bower

mod common;

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;

use ninegate::client::Client;
use ninegate::server::{serve_connection, serve_listener, FileService};
use ninegate::stream::PipeStream;
use serial_test::serial;

fn connect(service: Arc<FileService>) -> Client<PipeStream> {
    let (ours, theirs) = PipeStream::pair();
    thread::spawn(move || {
        let _ = serve_connection(service, theirs);
    });
    Client::connect(ours, "glen", "main").expect("connect")
}

#[test]
fn reads_a_whole_file() {
    let client = connect(common::ram_service());
    assert_eq!(client.read("/readme").expect("read"), b"hello\n");
    assert_eq!(client.read("docs/notes").expect("read"), b"remember\n");
}

#[test]
fn missing_paths_report_no_file() {
    let client = connect(common::ram_service());
    let err = client.read("/nonesuch").expect_err("missing file");
    assert_eq!(err.to_string(), "no such file");
    let err = client.read("/docs/gone").expect_err("missing file");
    assert_eq!(err.to_string(), "no such file");
}

#[test]
fn writes_then_reads_back() {
    let client = connect(common::ram_service());
    client.write("/readme", b"goodbye\n").expect("write");
    assert_eq!(client.read("/readme").expect("read"), b"goodbye\n");
}

#[test]
fn large_writes_are_chunked_by_msize() {
    let client = connect(common::ram_service());
    let unit = (client.msize() - 24) as usize;
    let content: Vec<u8> = (0..unit * 2 + 17).map(|i| i as u8).collect();
    client.write("/readme", &content).expect("write");
    assert_eq!(client.read("/readme").expect("read"), content);
}

#[test]
fn lists_directories_with_a_slash_suffix() {
    let client = connect(common::ram_service());
    assert_eq!(client.list("/").expect("list"), ["docs/", "readme"]);
    assert_eq!(client.list("/docs").expect("list"), ["notes"]);
}

#[test]
fn creates_and_removes_files_and_directories() {
    let client = connect(common::ram_service());
    client.create("/scratch", false).expect("touch");
    assert!(client.read("/scratch").expect("read").is_empty());
    client.create("/sub", true).expect("mkdir");
    client.create("/sub/leaf", false).expect("touch");
    assert_eq!(client.list("/sub").expect("list"), ["leaf"]);

    let err = client.remove("/sub").expect_err("non-empty");
    assert_eq!(err.to_string(), "directory not empty");
    client.remove("/sub/leaf").expect("rm");
    client.remove("/sub").expect("rmdir");
    let err = client.list("/sub").expect_err("gone");
    assert_eq!(err.to_string(), "no such file");
}

#[test]
fn flush_pending_aborts_a_blocked_read() {
    let (service, entered, release) = common::slow_service();
    let client = connect(service);

    thread::scope(|scope| {
        let reader = scope.spawn(|| client.read("/slow"));
        entered.recv().expect("read entered");
        assert_eq!(client.flush_pending().expect("flush"), 1);
        release.send(()).expect("release");
        let err = reader.join().expect("join").expect_err("flushed");
        assert_eq!(err.to_string(), "request flushed");
    });
}

#[test]
#[serial]
fn serves_over_tcp() {
    let service = common::ram_service();
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    thread::spawn(move || {
        let _ = serve_listener(service, listener);
    });

    let stream = TcpStream::connect(addr).expect("connect");
    let client = Client::connect(stream, "glen", "main").expect("attach");
    assert_eq!(client.read("/readme").expect("read"), b"hello\n");
    client.write("/readme", b"over tcp\n").expect("write");
    assert_eq!(client.read("/readme").expect("read"), b"over tcp\n");
}
