/*!
Scripting console exchange over a connection to the console port.

A request is one frame of script text. The reply is one frame whose first
byte is a [`ResultCode`] followed by any printed output.
*/

use crate::client::Connection;
use crate::error::{MotionError, Result};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ResultCode {
    /// The chunk was parsed and executed, output holds the printed results
    Success = 0,
    /// Compile or runtime error, output holds the error description
    Failure = 1,
    /// The chunk is incomplete and the console is waiting for the rest
    Continue = 2,
}

impl ResultCode {
    pub fn from_u8(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Success),
            1 => Some(Self::Failure),
            2 => Some(Self::Continue),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleResult {
    pub code: ResultCode,
    pub output: String,
}

impl ConsoleResult {
    fn failure() -> Self {
        Self {
            code: ResultCode::Failure,
            output: String::new(),
        }
    }
}

/// Send one script chunk and wait for the reply.
///
/// A failed write, a read timeout, or an empty reply all report
/// [`ResultCode::Failure`] with no output. An unrecognized result code is a
/// protocol error.
pub fn send_chunk(
    connection: &mut Connection,
    chunk: &str,
    timeout_seconds: Option<u64>,
) -> Result<ConsoleResult> {
    if !connection.write_data(chunk.as_bytes(), timeout_seconds)? {
        debug!("Console chunk was not sent");
        return Ok(ConsoleResult::failure());
    }

    let reply = match connection.read_data(timeout_seconds)? {
        Some(reply) if !reply.is_empty() => reply,
        _ => {
            debug!("No reply from console service");
            return Ok(ConsoleResult::failure());
        }
    };

    let Some(code) = ResultCode::from_u8(reply[0]) else {
        warn!("Unknown result code {} from console service", reply[0]);
        return Err(MotionError::protocol(format!(
            "unknown return code {} from console service",
            reply[0]
        )));
    };

    Ok(ConsoleResult {
        code,
        output: String::from_utf8_lossy(&reply[1..]).into_owned(),
    })
}
