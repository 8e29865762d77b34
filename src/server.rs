//! Listener role: one connection at a time, one request per connection.

use anyhow::{Context, Result};
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::ListenerConfig;
use crate::error::TransferError;
use crate::logger::Logger;
use crate::net::{apply_deadlines, recv_line, send_line, tune_socket, TransferBuffer};
use crate::protocol::{cmd, Request, Response, UNKNOWN_COMMAND_REPLY};
use crate::protocol_core::{resolve_read_path, resolve_write_path, safe_name};

/// What a connection turned out to be, once handled successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Served {
    Put { path: PathBuf, bytes: u64 },
    Get { path: PathBuf, bytes: u64 },
    Ignored,
}

pub struct Listener {
    config: ListenerConfig,
    logger: Arc<dyn Logger>,
}

impl Listener {
    pub fn new(config: ListenerConfig, logger: Arc<dyn Logger>) -> Self {
        Listener { config, logger }
    }

    pub fn bind(addr: &str) -> Result<TcpListener> {
        TcpListener::bind(addr).with_context(|| format!("bind {}", addr))
    }

    /// Accept loop. Connections are handled strictly in order; a peer that
    /// connects mid-transfer waits in the OS backlog. Nothing a single
    /// connection does ends the loop.
    pub fn serve(&self, listener: &TcpListener) -> Result<()> {
        let local = listener.local_addr().context("listener address")?;
        self.logger.listening(&local.to_string(), &self.config.root);
        for conn in listener.incoming() {
            match conn {
                Ok(stream) => self.handle_conn(stream),
                Err(e) => self.logger.error("accept", &e.to_string()),
            }
        }
        Ok(())
    }

    /// Handle one accepted connection to completion. The stream is owned
    /// here and closed on return, whichever way the request ended.
    pub fn handle_conn(&self, mut stream: TcpStream) {
        tune_socket(&stream);
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        if let Err(e) = apply_deadlines(&stream, self.config.io_timeout()) {
            self.logger.error(&peer, &format!("cannot set deadlines: {}", e));
        }
        self.logger.connection(&peer);
        if let Err(e) = self.dispatch(&mut stream, &peer) {
            self.logger.error(&peer, &e.to_string());
        }
    }

    /// Read the request line and run the matching handler.
    pub fn dispatch<S: Read + Write>(
        &self,
        stream: &mut S,
        peer: &str,
    ) -> Result<Served, TransferError> {
        let line = recv_line(stream)?;
        match Request::parse(&line) {
            Request::Put { name, size } => self.handle_put(stream, &name, size),
            Request::Get { name } => self.handle_get(stream, &name),
            Request::Unknown(line) => {
                self.logger
                    .rejected(peer, &format!("unknown command {:?}", line));
                if self.config.reply_unknown {
                    send_line(stream, UNKNOWN_COMMAND_REPLY)?;
                }
                Ok(Served::Ignored)
            }
        }
    }

    /// Store exactly `size` bytes under the sanitized name, then answer `OK`.
    ///
    /// A peer that disconnects early gets no reply and leaves the partial
    /// file in place.
    fn handle_put<S: Read + Write>(
        &self,
        stream: &mut S,
        name: &str,
        size: i64,
    ) -> Result<Served, TransferError> {
        let file_name = safe_name(name);
        let dest = resolve_write_path(&self.config.root, name);

        if let Some(limit) = self.config.max_put_size {
            if size > 0 && size as u64 > limit {
                let _ = send_line(stream, cmd::ERR);
                return Err(TransferError::DeclaredSizeTooLarge {
                    declared: size,
                    limit,
                });
            }
        }

        let mut file = match File::create(&dest) {
            Ok(f) => f,
            Err(source) => {
                let _ = send_line(stream, cmd::ERR);
                return Err(TransferError::FileOpenFailed { path: dest, source });
            }
        };

        let mut buf = TransferBuffer::new();
        let stats = buf.receive_into(stream, &mut file, size.max(0) as u64, &dest)?;
        drop(file);

        self.logger.received(&file_name, stats.bytes);
        send_line(stream, cmd::OK)?;
        Ok(Served::Put {
            path: dest,
            bytes: stats.bytes,
        })
    }

    /// Announce the file size with `SIZE <n>` and stream exactly `n` bytes.
    fn handle_get<S: Read + Write>(
        &self,
        stream: &mut S,
        name: &str,
    ) -> Result<Served, TransferError> {
        let path = resolve_read_path(&self.config.root, name, self.config.confine_reads);

        let size = match stat_regular_file(&path) {
            Ok(size) => size,
            Err(source) => {
                let _ = send_line(stream, cmd::ERR);
                return Err(TransferError::FileOpenFailed { path, source });
            }
        };

        // The file may vanish between stat and open; that is just another ERR.
        let mut file = match File::open(&path) {
            Ok(f) => f,
            Err(source) => {
                let _ = send_line(stream, cmd::ERR);
                return Err(TransferError::FileOpenFailed { path, source });
            }
        };

        send_line(stream, &Response::Size(size as i64).to_string())?;
        let mut buf = TransferBuffer::new();
        let stats = buf.send_exact_from(&mut file, size, stream, &path)?;
        self.logger.sent(name, stats.bytes);
        Ok(Served::Get {
            path,
            bytes: stats.bytes,
        })
    }
}

fn stat_regular_file(path: &Path) -> io::Result<u64> {
    let md = fs::metadata(path)?;
    if !md.is_file() {
        return Err(io::Error::new(io::ErrorKind::Other, "not a regular file"));
    }
    Ok(md.len())
}

/// Validate the root, bind `bind`, and serve forever.
pub fn serve(bind: &str, config: ListenerConfig, logger: Arc<dyn Logger>) -> Result<()> {
    if !config.root.exists() {
        anyhow::bail!("Root directory does not exist: {}", config.root.display());
    }
    if !config.root.is_dir() {
        anyhow::bail!("Root path is not a directory: {}", config.root.display());
    }
    let listener = Listener::bind(bind)?;
    Listener::new(config, logger).serve(&listener)
}
