//! Failure kinds for a single transfer.
//!
//! Every variant is local to the connection that produced it: the listener
//! logs it and moves on to the next connection, the initiator reports it and
//! exits. Nothing here crosses the wire; the peer only ever sees `OK`,
//! `ERR`, or a closed connection.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("connection to {addr} failed: {source}")]
    ConnectFailed {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    #[error("connection closed before end of line")]
    ConnectionClosed,

    #[error("cannot open {}: {source}", .path.display())]
    FileOpenFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("local file I/O failed on {}: {source}", .path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unexpected response: {0:?}")]
    ProtocolMismatch(String),

    #[error("declared size {declared} exceeds limit {limit}")]
    DeclaredSizeTooLarge { declared: i64, limit: u64 },

    #[error("control line exceeds {0} bytes")]
    LineTooLong(usize),

    #[error("control line is not valid UTF-8")]
    NonUtf8Line,

    #[error("resource name {0:?} cannot be sent in a control line")]
    InvalidName(String),
}

impl TransferError {
    /// True for failures of the socket itself (peer gone, reset, deadline).
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            TransferError::SendFailed(_)
                | TransferError::ReceiveFailed(_)
                | TransferError::ConnectionClosed
        )
    }

    pub(crate) fn local_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        TransferError::LocalIo {
            path: path.into(),
            source,
        }
    }
}
