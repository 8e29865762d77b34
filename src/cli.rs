//! Command line surface for the `p2p` binary

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{InitiatorConfig, ListenerConfig};

#[derive(Debug, Parser)]
#[command(
    name = "p2p",
    author,
    version,
    about = "Point-to-point file transfer: one side listens, the other puts or gets a single file"
)]
pub struct Cli {
    /// Config file (default: ~/.config/p2pxfer/p2p.toml if present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Serve PUT/GET requests on a TCP port, one connection at a time
    Listen(ListenOpts),
    /// Upload a local file
    Put(PutOpts),
    /// Download a file from a listener
    Get(GetOpts),
}

#[derive(Clone, Debug, Args)]
pub struct ListenOpts {
    /// TCP port to listen on
    pub port: u16,

    /// Interface address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: String,

    /// Directory uploads are stored in and relative downloads are read from
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Append a timestamped event log to this file
    #[arg(long = "log-file")]
    pub log_file: Option<PathBuf>,

    /// Refuse uploads declaring more than this many bytes
    #[arg(long = "max-put-size")]
    pub max_put_size: Option<u64>,

    /// Sanitize download names like upload names (no literal paths)
    #[arg(long = "confine-reads")]
    pub confine_reads: bool,

    /// Answer unknown commands with `ERR unknown-command`
    #[arg(long = "reply-unknown")]
    pub reply_unknown: bool,

    /// Socket read/write deadline in seconds (0 = none)
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl ListenOpts {
    /// Command line flags layered over the config file.
    pub fn apply(&self, mut cfg: ListenerConfig) -> ListenerConfig {
        if let Some(root) = &self.root {
            cfg.root = root.clone();
        }
        if let Some(p) = &self.log_file {
            cfg.log_file = Some(p.clone());
        }
        if self.max_put_size.is_some() {
            cfg.max_put_size = self.max_put_size;
        }
        cfg.confine_reads |= self.confine_reads;
        cfg.reply_unknown |= self.reply_unknown;
        if self.timeout.is_some() {
            cfg.io_timeout_secs = self.timeout;
        }
        cfg
    }

    pub fn bind_addr(&self) -> String {
        crate::client::join_host_port(&self.bind, self.port)
    }
}

/// Options shared by both initiator commands
#[derive(Clone, Debug, Args)]
pub struct TransferOpts {
    /// Show a progress bar
    #[arg(short, long)]
    pub progress: bool,

    /// Connect and socket read/write deadline in seconds (0 = none)
    #[arg(long)]
    pub timeout: Option<u64>,
}

impl TransferOpts {
    pub fn apply(&self, mut cfg: InitiatorConfig) -> InitiatorConfig {
        cfg.progress |= self.progress;
        if self.timeout.is_some() {
            cfg.connect_timeout_secs = self.timeout;
            cfg.io_timeout_secs = self.timeout;
        }
        cfg
    }
}

#[derive(Clone, Debug, Args)]
pub struct PutOpts {
    pub ip: String,
    pub port: u16,
    /// Local file to upload
    pub file: PathBuf,
    /// Name to store it under (default: the file's base name)
    pub remote_name: Option<String>,
    #[command(flatten)]
    pub transfer: TransferOpts,
}

#[derive(Clone, Debug, Args)]
pub struct GetOpts {
    pub ip: String,
    pub port: u16,
    /// Name or path of the file on the listener
    pub file: String,
    /// Local path to save to (default: the requested file's base name)
    pub save_as: Option<PathBuf>,
    #[command(flatten)]
    pub transfer: TransferOpts,
}
