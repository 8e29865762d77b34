//! Shared protocol constants and control-line grammar for p2pxfer
//!
//! A transfer is one newline-terminated ASCII control line followed, where
//! the command calls for it, by a raw byte payload of the announced length:
//!
//! | Direction            | Line                | Payload          |
//! |----------------------|---------------------|------------------|
//! | initiator → listener | `PUT <name> <size>` | `<size>` bytes   |
//! | listener → initiator | `OK` / `ERR`        | none             |
//! | initiator → listener | `GET <name>`        | none             |
//! | listener → initiator | `SIZE <size>`/`ERR` | `<size>` bytes   |

use std::fmt;

// Capacity of the transfer buffer (64 KiB); also the chunk bound for payloads
pub const TRANSFER_BUF_SIZE: usize = 64 * 1024;

// Control lines longer than this abort the connection
pub const MAX_LINE_LEN: usize = 8 * 1024;

// Command words
pub mod cmd {
    pub const PUT: &str = "PUT";
    pub const GET: &str = "GET";
    pub const SIZE: &str = "SIZE";
    pub const OK: &str = "OK";
    pub const ERR: &str = "ERR";
}

// Reply sent for an unrecognized command when the listener is configured to answer
pub const UNKNOWN_COMMAND_REPLY: &str = "ERR unknown-command";

// Deadline and tick constants (opt-in; the default is fully blocking I/O)
pub mod timeouts {
    // Progress tick interval for UI updates (ms)
    pub const PROGRESS_TICK_MS: u64 = 120;

    pub fn from_secs(secs: Option<u64>) -> Option<std::time::Duration> {
        secs.filter(|s| *s > 0).map(std::time::Duration::from_secs)
    }
}

/// Parse a size token the way a permissive tokenizer does: anything that
/// is not a valid integer reads as zero.
fn parse_size(token: Option<&str>) -> i64 {
    token.and_then(|t| t.parse::<i64>().ok()).unwrap_or(0)
}

/// A request line sent by the initiator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    /// Upload: `<size>` raw bytes follow the line.
    Put { name: String, size: i64 },
    /// Download request.
    Get { name: String },
    /// Any other command word; carries the raw line.
    Unknown(String),
}

impl Request {
    /// Tolerant parse: missing tokens default to empty/zero.
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        let command = tokens.next().unwrap_or("");
        let name = tokens.next().unwrap_or("").to_string();
        match command {
            cmd::PUT => Request::Put {
                name,
                size: parse_size(tokens.next()),
            },
            cmd::GET => Request::Get { name },
            _ => Request::Unknown(line.to_string()),
        }
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::Put { name, size } => write!(f, "{} {} {}", cmd::PUT, name, size),
            Request::Get { name } => write!(f, "{} {}", cmd::GET, name),
            Request::Unknown(line) => f.write_str(line),
        }
    }
}

/// A reply line sent by the listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Ok,
    /// `ERR` with whatever detail followed it (usually empty).
    Err(String),
    /// `SIZE <n>`: `n` raw bytes follow.
    Size(i64),
    Other(String),
}

impl Response {
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some(cmd::OK) => Response::Ok,
            Some(cmd::ERR) => Response::Err(tokens.collect::<Vec<_>>().join(" ")),
            Some(cmd::SIZE) => Response::Size(parse_size(tokens.next())),
            _ => Response::Other(line.to_string()),
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Response::Ok => f.write_str(cmd::OK),
            Response::Err(detail) if detail.is_empty() => f.write_str(cmd::ERR),
            Response::Err(detail) => write!(f, "{} {}", cmd::ERR, detail),
            Response::Size(n) => write!(f, "{} {}", cmd::SIZE, n),
            Response::Other(line) => f.write_str(line),
        }
    }
}
