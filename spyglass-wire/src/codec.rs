//! Binary codec for the profiling event protocol.
//!
//! Reads exactly one frame per call and buffers nothing across calls; writes
//! assemble the whole frame in memory first so a failed write never leaves a
//! partial request on the stream.

use std::io::{self, Read, Write};

use crate::{Message, Request, WireError, SESSION_ID_LEN};
use crate::{
    MSG_COUNTER_NAME, MSG_CREATE_THREAD, MSG_DESTROY_THREAD, MSG_ENTER_FUNCTION,
    MSG_GARBAGE_COLLECTED, MSG_GENERATION_SIZES, MSG_KEEP_ALIVE, MSG_LEAVE_FUNCTION,
    MSG_MAP_CLASS, MSG_MAP_FUNCTION, MSG_MAP_THREAD, MSG_NAME_THREAD, MSG_OBJECT_ALLOCATED,
    MSG_PERF_COUNTER, MSG_SAMPLE, MSG_TAIL_CALL, REQ_GET_CLASS_MAPPING,
    REQ_GET_COUNTER_NAME, REQ_GET_FUNCTION_MAPPING, REQ_GET_THREAD_MAPPING, REQ_RESUME_TARGET,
    REQ_SET_SAMPLER_ACTIVE, REQ_SUSPEND_TARGET,
};

// ============================================================================
// Session preamble
// ============================================================================

/// Read the raw 16-byte session identifier that opens every connection.
///
/// # Errors
/// Returns an error if the stream ends or fails before all 16 bytes arrive.
pub fn read_session_id(r: &mut impl Read) -> Result<[u8; SESSION_ID_LEN], WireError> {
    let mut id = [0u8; SESSION_ID_LEN];
    r.read_exact(&mut id)?;
    Ok(id)
}

/// Write the 16-byte session identifier preamble.
///
/// # Errors
/// Returns an error on transport failure.
pub fn write_session_id(w: &mut impl Write, id: &[u8; SESSION_ID_LEN]) -> Result<(), WireError> {
    w.write_all(id)?;
    Ok(())
}

// ============================================================================
// Frame reading
// ============================================================================

/// Read exactly one framed message.
///
/// Returns `Ok(None)` on a clean end-of-stream at a frame boundary (the peer
/// closed between messages). End-of-stream *inside* a frame is an I/O error:
/// the peer died mid-message.
///
/// # Errors
/// - [`WireError::UnknownTag`] for a tag outside the protocol — the stream is
///   desynchronized and must not be read further
/// - [`WireError::Io`] for transport failures, including mid-frame EOF
/// - [`WireError::BadString`] for a length-prefixed string that is not UTF-8
pub fn read_message(r: &mut impl Read) -> Result<Option<Message>, WireError> {
    let Some(tag) = read_tag(r)? else {
        return Ok(None);
    };

    let msg = match tag {
        MSG_MAP_FUNCTION => Message::MapFunction {
            function_id: read_u32(r)?,
            class_id: read_u32(r)?,
            name: read_string(r)?,
            signature: read_string(r)?,
            is_native: read_bool(r)?,
        },
        MSG_MAP_CLASS => Message::MapClass {
            class_id: read_u32(r)?,
            name: read_string(r)?,
            is_value_type: read_bool(r)?,
        },
        MSG_MAP_THREAD => Message::MapThread {
            thread_id: read_u32(r)?,
            name: read_string(r)?,
            is_alive: read_bool(r)?,
        },
        MSG_ENTER_FUNCTION => Message::EnterFunction {
            thread_id: read_u32(r)?,
            function_id: read_u32(r)?,
            timestamp_ns: read_u64(r)?,
        },
        MSG_LEAVE_FUNCTION => Message::LeaveFunction {
            thread_id: read_u32(r)?,
            function_id: read_u32(r)?,
            timestamp_ns: read_u64(r)?,
        },
        MSG_TAIL_CALL => Message::TailCall {
            thread_id: read_u32(r)?,
            function_id: read_u32(r)?,
            timestamp_ns: read_u64(r)?,
        },
        MSG_CREATE_THREAD => Message::CreateThread { thread_id: read_u32(r)? },
        MSG_DESTROY_THREAD => Message::DestroyThread { thread_id: read_u32(r)? },
        MSG_NAME_THREAD => Message::NameThread {
            thread_id: read_u32(r)?,
            name: read_string(r)?,
        },
        MSG_SAMPLE => {
            let thread_id = read_u32(r)?;
            let timestamp_ns = read_u64(r)?;
            let count = read_u16(r)? as usize;
            let mut frames = Vec::with_capacity(count);
            for _ in 0..count {
                frames.push(read_u32(r)?);
            }
            Message::Sample { thread_id, timestamp_ns, frames }
        }
        MSG_PERF_COUNTER => Message::PerfCounter {
            counter_id: read_u32(r)?,
            timestamp_ns: read_u64(r)?,
            value: read_i64(r)?,
        },
        MSG_COUNTER_NAME => Message::CounterName {
            counter_id: read_u32(r)?,
            name: read_string(r)?,
        },
        MSG_OBJECT_ALLOCATED => Message::ObjectAllocated {
            class_id: read_u32(r)?,
            size: read_u64(r)?,
            function_id: read_u32(r)?,
            timestamp_ns: read_u64(r)?,
        },
        MSG_GARBAGE_COLLECTED => Message::GarbageCollected {
            generation: read_u32(r)?,
            function_id: read_u32(r)?,
            timestamp_ns: read_u64(r)?,
        },
        MSG_GENERATION_SIZES => {
            let count = read_u16(r)? as usize;
            let mut sizes = Vec::with_capacity(count);
            for _ in 0..count {
                sizes.push(read_u64(r)?);
            }
            Message::GenerationSizes { sizes }
        }
        MSG_KEEP_ALIVE => Message::KeepAlive,
        other => return Err(WireError::UnknownTag(other)),
    };

    Ok(Some(msg))
}

/// Read exactly one client request (the target/stub-peer side of the codec).
///
/// Returns `Ok(None)` on clean end-of-stream at a frame boundary.
///
/// # Errors
/// Same contract as [`read_message`].
pub fn read_request(r: &mut impl Read) -> Result<Option<Request>, WireError> {
    let Some(tag) = read_tag(r)? else {
        return Ok(None);
    };

    let req = match tag {
        REQ_GET_FUNCTION_MAPPING => Request::GetFunctionMapping(read_u32(r)?),
        REQ_GET_CLASS_MAPPING => Request::GetClassMapping(read_u32(r)?),
        REQ_GET_THREAD_MAPPING => Request::GetThreadMapping(read_u32(r)?),
        REQ_GET_COUNTER_NAME => Request::GetCounterName(read_u32(r)?),
        REQ_SUSPEND_TARGET => Request::SuspendTarget,
        REQ_RESUME_TARGET => Request::ResumeTarget,
        REQ_SET_SAMPLER_ACTIVE => Request::SetSamplerActive(read_bool(r)?),
        other => return Err(WireError::UnknownTag(other)),
    };

    Ok(Some(req))
}

// ============================================================================
// Frame writing
// ============================================================================

/// Encode one request and write it as a single `write_all`.
///
/// # Errors
/// Returns an error on transport failure; encoding itself cannot fail.
pub fn write_request(w: &mut impl Write, req: &Request) -> Result<(), WireError> {
    let mut buf = Vec::with_capacity(8);
    buf.push(req.tag());
    match *req {
        Request::GetFunctionMapping(id)
        | Request::GetClassMapping(id)
        | Request::GetThreadMapping(id)
        | Request::GetCounterName(id) => put_u32(&mut buf, id),
        Request::SuspendTarget | Request::ResumeTarget => {}
        Request::SetSamplerActive(active) => put_bool(&mut buf, active),
    }
    w.write_all(&buf)?;
    Ok(())
}

/// Encode one event message and write it as a single `write_all`.
///
/// The client never sends events; this is the target/stub-peer side, used by
/// tests and demo peers to script a session.
///
/// # Errors
/// Returns [`WireError::StringTooLong`] if a string field exceeds the `u16`
/// length prefix, or an I/O error on transport failure.
pub fn write_message(w: &mut impl Write, msg: &Message) -> Result<(), WireError> {
    let mut buf = Vec::with_capacity(32);
    buf.push(msg.tag());
    match msg {
        Message::MapFunction { function_id, class_id, name, signature, is_native } => {
            put_u32(&mut buf, *function_id);
            put_u32(&mut buf, *class_id);
            put_string(&mut buf, name)?;
            put_string(&mut buf, signature)?;
            put_bool(&mut buf, *is_native);
        }
        Message::MapClass { class_id, name, is_value_type } => {
            put_u32(&mut buf, *class_id);
            put_string(&mut buf, name)?;
            put_bool(&mut buf, *is_value_type);
        }
        Message::MapThread { thread_id, name, is_alive } => {
            put_u32(&mut buf, *thread_id);
            put_string(&mut buf, name)?;
            put_bool(&mut buf, *is_alive);
        }
        Message::EnterFunction { thread_id, function_id, timestamp_ns }
        | Message::LeaveFunction { thread_id, function_id, timestamp_ns }
        | Message::TailCall { thread_id, function_id, timestamp_ns } => {
            put_u32(&mut buf, *thread_id);
            put_u32(&mut buf, *function_id);
            put_u64(&mut buf, *timestamp_ns);
        }
        Message::CreateThread { thread_id } | Message::DestroyThread { thread_id } => {
            put_u32(&mut buf, *thread_id);
        }
        Message::NameThread { thread_id, name } => {
            put_u32(&mut buf, *thread_id);
            put_string(&mut buf, name)?;
        }
        Message::Sample { thread_id, timestamp_ns, frames } => {
            put_u32(&mut buf, *thread_id);
            put_u64(&mut buf, *timestamp_ns);
            put_count(&mut buf, frames.len())?;
            for frame in frames {
                put_u32(&mut buf, *frame);
            }
        }
        Message::PerfCounter { counter_id, timestamp_ns, value } => {
            put_u32(&mut buf, *counter_id);
            put_u64(&mut buf, *timestamp_ns);
            put_i64(&mut buf, *value);
        }
        Message::CounterName { counter_id, name } => {
            put_u32(&mut buf, *counter_id);
            put_string(&mut buf, name)?;
        }
        Message::ObjectAllocated { class_id, size, function_id, timestamp_ns } => {
            put_u32(&mut buf, *class_id);
            put_u64(&mut buf, *size);
            put_u32(&mut buf, *function_id);
            put_u64(&mut buf, *timestamp_ns);
        }
        Message::GarbageCollected { generation, function_id, timestamp_ns } => {
            put_u32(&mut buf, *generation);
            put_u32(&mut buf, *function_id);
            put_u64(&mut buf, *timestamp_ns);
        }
        Message::GenerationSizes { sizes } => {
            put_count(&mut buf, sizes.len())?;
            for size in sizes {
                put_u64(&mut buf, *size);
            }
        }
        Message::KeepAlive => {}
    }
    w.write_all(&buf)?;
    Ok(())
}

// ============================================================================
// Primitive readers/writers
// ============================================================================

/// Read the leading tag byte, distinguishing clean EOF from data.
fn read_tag(r: &mut impl Read) -> Result<Option<u8>, WireError> {
    let mut byte = [0u8; 1];
    loop {
        match r.read(&mut byte) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(byte[0])),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(WireError::Io(e)),
        }
    }
}

fn read_u8(r: &mut impl Read) -> Result<u8, WireError> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0])
}

fn read_u16(r: &mut impl Read) -> Result<u16, WireError> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_u32(r: &mut impl Read) -> Result<u32, WireError> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64(r: &mut impl Read) -> Result<u64, WireError> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(u64::from_le_bytes(b))
}

fn read_i64(r: &mut impl Read) -> Result<i64, WireError> {
    let mut b = [0u8; 8];
    r.read_exact(&mut b)?;
    Ok(i64::from_le_bytes(b))
}

fn read_bool(r: &mut impl Read) -> Result<bool, WireError> {
    Ok(read_u8(r)? != 0)
}

fn read_string(r: &mut impl Read) -> Result<String, WireError> {
    let len = read_u16(r)? as usize;
    let mut bytes = vec![0u8; len];
    r.read_exact(&mut bytes)?;
    Ok(String::from_utf8(bytes)?)
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_i64(buf: &mut Vec<u8>, v: i64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn put_bool(buf: &mut Vec<u8>, v: bool) {
    buf.push(u8::from(v));
}

fn put_count(buf: &mut Vec<u8>, len: usize) -> Result<(), WireError> {
    let count = u16::try_from(len).map_err(|_| WireError::ArrayTooLong(len))?;
    put_u16(buf, count);
    Ok(())
}

fn put_string(buf: &mut Vec<u8>, s: &str) -> Result<(), WireError> {
    let len = u16::try_from(s.len()).map_err(|_| WireError::StringTooLong(s.len()))?;
    put_u16(buf, len);
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}
