//! Initiator role: one connection, one request, then close.

use std::fs::File;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::InitiatorConfig;
use crate::error::TransferError;
use crate::net::{apply_deadlines, recv_line, send_line, tune_socket, TransferBuffer};
use crate::progress::TransferProgress;
use crate::protocol::{Request, Response};
use crate::protocol_core::default_local_name;

/// Result of an upload that reached the status-line stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutOutcome {
    pub remote_name: String,
    pub bytes_sent: u64,
    /// The listener's final line; empty when the connection closed without one.
    pub status: String,
}

impl PutOutcome {
    pub fn is_ok(&self) -> bool {
        Response::parse(&self.status) == Response::Ok
    }
}

/// Result of a download that got past the `SIZE` line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GetOutcome {
    pub saved_to: PathBuf,
    pub declared: u64,
    pub received: u64,
}

impl GetOutcome {
    pub fn is_complete(&self) -> bool {
        self.received == self.declared
    }
}

/// `host:port`, bracketing bare IPv6 literals.
pub fn join_host_port(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{}]:{}", host, port)
    } else {
        format!("{}:{}", host, port)
    }
}

fn connect_failed(addr: &str, source: io::Error) -> TransferError {
    TransferError::ConnectFailed {
        addr: addr.to_string(),
        source,
    }
}

/// Open a TCP connection, optionally bounded by `timeout` per candidate address.
pub fn connect(addr: &str, timeout: Option<Duration>) -> Result<TcpStream, TransferError> {
    let Some(timeout) = timeout else {
        return TcpStream::connect(addr).map_err(|e| connect_failed(addr, e));
    };
    let mut last = io::Error::new(io::ErrorKind::InvalidInput, "no addresses resolved");
    for candidate in addr.to_socket_addrs().map_err(|e| connect_failed(addr, e))? {
        match TcpStream::connect_timeout(&candidate, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last = e,
        }
    }
    Err(connect_failed(addr, last))
}

/// Names travel as one whitespace-delimited token.
fn check_name(name: &str) -> Result<(), TransferError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(TransferError::InvalidName(name.to_string()));
    }
    Ok(())
}

pub struct Initiator {
    config: InitiatorConfig,
}

impl Initiator {
    pub fn new(config: InitiatorConfig) -> Self {
        Initiator { config }
    }

    fn open(&self, addr: &str) -> Result<TcpStream, TransferError> {
        let stream = connect(addr, self.config.connect_timeout())?;
        tune_socket(&stream);
        apply_deadlines(&stream, self.config.io_timeout()).map_err(|e| connect_failed(addr, e))?;
        Ok(stream)
    }

    /// Upload `local` as `remote` (default: the local file's sanitized base name).
    ///
    /// The local file is opened and sized before connecting. Once the
    /// request is sent the whole file is streamed, then the listener's status
    /// line is read.
    pub fn put_file(
        &self,
        addr: &str,
        local: &Path,
        remote: Option<&str>,
    ) -> Result<PutOutcome, TransferError> {
        let remote_name = match remote {
            Some(r) => r.to_string(),
            None => default_local_name(local),
        };
        check_name(&remote_name)?;

        let open_failed = |source| TransferError::FileOpenFailed {
            path: local.to_path_buf(),
            source,
        };
        let mut file = File::open(local).map_err(open_failed)?;
        let size = file.metadata().map_err(open_failed)?.len();

        let mut stream = self.open(addr)?;
        let request = Request::Put {
            name: remote_name.clone(),
            size: size as i64,
        };
        send_line(&mut stream, &request.to_string())?;

        let progress = TransferProgress::for_transfer(self.config.progress, &remote_name, size);
        let mut buf = TransferBuffer::new().with_progress(Some(progress.clone()));
        let sent = buf.send_exact_from(&mut file, size, &mut stream, local);

        if let Err(e) = sent {
            progress.finish_error(&e.to_string());
            // A local read failure leaves the listener waiting for payload, so
            // no status line can come. Dropping the stream lets it see EOF.
            if !e.is_connection_failure() {
                return Err(e);
            }
            // A listener that refused the upload may have answered before closing.
            return match recv_line(&mut stream) {
                Ok(status) => Ok(PutOutcome {
                    remote_name,
                    bytes_sent: buf.stats().bytes,
                    status,
                }),
                Err(_) => Err(e),
            };
        }

        let status = recv_line(&mut stream).unwrap_or_default();
        if Response::parse(&status) == Response::Ok {
            progress.finish_success(buf.stats().bytes);
        } else {
            progress.finish_error(&format!("listener replied {:?}", status));
        }
        Ok(PutOutcome {
            remote_name,
            bytes_sent: buf.stats().bytes,
            status,
        })
    }

    /// Download `remote` into `save_as` (default: sanitized base name of
    /// `remote` in the working directory).
    ///
    /// Nothing is created locally unless the listener answers `SIZE`. A
    /// stream that ends early leaves the partial file; check
    /// [`GetOutcome::is_complete`].
    pub fn get_file(
        &self,
        addr: &str,
        remote: &str,
        save_as: Option<&Path>,
    ) -> Result<GetOutcome, TransferError> {
        check_name(remote)?;

        let mut stream = self.open(addr)?;
        let request = Request::Get {
            name: remote.to_string(),
        };
        send_line(&mut stream, &request.to_string())?;

        let line = recv_line(&mut stream)?;
        let declared = match Response::parse(&line) {
            Response::Size(n) => n.max(0) as u64,
            _ => return Err(TransferError::ProtocolMismatch(line)),
        };

        let saved_to = match save_as {
            Some(p) => p.to_path_buf(),
            None => PathBuf::from(default_local_name(Path::new(remote))),
        };
        let mut file = File::create(&saved_to).map_err(|source| TransferError::FileOpenFailed {
            path: saved_to.clone(),
            source,
        })?;

        let progress = TransferProgress::for_transfer(self.config.progress, remote, declared);
        let mut buf = TransferBuffer::new().with_progress(Some(progress.clone()));
        let received = match buf.receive_into(&mut stream, &mut file, declared, &saved_to) {
            Ok(stats) => {
                progress.finish_success(stats.bytes);
                stats.bytes
            }
            Err(e) if e.is_connection_failure() => {
                progress.finish_error(&e.to_string());
                buf.stats().bytes
            }
            Err(e) => {
                progress.finish_error(&e.to_string());
                return Err(e);
            }
        };

        Ok(GetOutcome {
            saved_to,
            declared,
            received,
        })
    }
}

impl Default for Initiator {
    fn default() -> Self {
        Self::new(InitiatorConfig::default())
    }
}
