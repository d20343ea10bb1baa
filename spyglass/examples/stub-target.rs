//! Stub target for exercising spyglass end to end
//!
//! Speaks the target side of the event protocol: serves one connection,
//! sends the session preamble, then emits a small synthetic workload —
//! a couple of threads running nested calls, samples, counters, and an
//! allocation — while echoing any mapping requests with the matching
//! mapping messages.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --example stub-target
//!
//! # In another terminal: attach and export
//! cargo run -- --port 7100 --export facts.jsonl --duration 10
//! ```

use spyglass_wire::{read_request, write_message, write_session_id, Message, Request};
use std::net::{TcpListener, TcpStream};
use std::time::Duration;

const SESSION_ID: [u8; 16] = *b"stub-target-0001";
const PORT: u16 = 7100;

fn main() -> std::io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", PORT))?;
    println!("stub target listening on 127.0.0.1:{PORT}");

    for stream in listener.incoming() {
        let stream = stream?;
        println!("client attached from {}", stream.peer_addr()?);
        if let Err(e) = serve(stream) {
            eprintln!("session ended: {e}");
        }
    }
    Ok(())
}

fn serve(mut stream: TcpStream) -> std::io::Result<()> {
    write_session_id(&mut stream, &SESSION_ID).map_err(to_io)?;

    let script = [
        Message::CreateThread { thread_id: 1 },
        Message::NameThread { thread_id: 1, name: "main".to_string() },
        // Nested calls: 10 outer, 20 inner
        Message::EnterFunction { thread_id: 1, function_id: 10, timestamp_ns: 1_000 },
        Message::EnterFunction { thread_id: 1, function_id: 20, timestamp_ns: 1_500 },
        Message::Sample { thread_id: 1, timestamp_ns: 1_800, frames: vec![20, 10] },
        Message::LeaveFunction { thread_id: 1, function_id: 20, timestamp_ns: 2_500 },
        Message::LeaveFunction { thread_id: 1, function_id: 10, timestamp_ns: 4_000 },
        Message::PerfCounter { counter_id: 1, timestamp_ns: 4_100, value: 1337 },
        Message::ObjectAllocated { class_id: 5, size: 256, function_id: 10, timestamp_ns: 4_200 },
        Message::GarbageCollected { generation: 0, function_id: 10, timestamp_ns: 4_300 },
        Message::GenerationSizes { sizes: vec![1024, 2048, 4096] },
    ];
    for msg in &script {
        write_message(&mut stream, msg).map_err(to_io)?;
    }

    // Answer mapping requests until the client detaches, heartbeating so a
    // quiet stretch doesn't trip its read timeout
    stream.set_read_timeout(Some(Duration::from_secs(2)))?;
    loop {
        match read_request(&mut stream) {
            Ok(Some(req)) => {
                println!("request: {req:?}");
                for reply in replies_for(&req) {
                    write_message(&mut stream, &reply).map_err(to_io)?;
                }
            }
            Ok(None) => return Ok(()),
            Err(spyglass_wire::WireError::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                ) =>
            {
                write_message(&mut stream, &Message::KeepAlive).map_err(to_io)?;
            }
            Err(e) => return Err(to_io(e)),
        }
    }
}

fn replies_for(req: &Request) -> Vec<Message> {
    match *req {
        Request::GetFunctionMapping(id) => vec![Message::MapFunction {
            function_id: id,
            class_id: 5,
            name: format!("synthetic_fn_{id}"),
            signature: format!("void synthetic_fn_{id}()"),
            is_native: false,
        }],
        Request::GetClassMapping(id) => vec![Message::MapClass {
            class_id: id,
            name: format!("SyntheticClass{id}"),
            is_value_type: false,
        }],
        Request::GetThreadMapping(id) => vec![Message::MapThread {
            thread_id: id,
            name: format!("thread-{id}"),
            is_alive: true,
        }],
        Request::GetCounterName(id) => vec![Message::CounterName {
            counter_id: id,
            name: format!("counter/{id}"),
        }],
        Request::SuspendTarget | Request::ResumeTarget | Request::SetSamplerActive(_) => {
            println!("control command acknowledged (no reply on the wire)");
            Vec::new()
        }
    }
}

fn to_io(e: spyglass_wire::WireError) -> std::io::Error {
    match e {
        spyglass_wire::WireError::Io(e) => e,
        other => std::io::Error::other(other.to_string()),
    }
}
