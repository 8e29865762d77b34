//! p2p - point-to-point single file transfer
//!
//! `p2p listen <port>` serves uploads and downloads one connection at a time;
//! `p2p put` / `p2p get` perform exactly one transfer and exit.

use anyhow::{Context, Result};
use clap::Parser;

use p2pxfer::cli::{Cli, Command, GetOpts, ListenOpts, PutOpts};
use p2pxfer::client::{join_host_port, Initiator};
use p2pxfer::config::Config;
use p2pxfer::logger::build_listener_logger;
use p2pxfer::{server, TransferError};

fn main() -> Result<()> {
    // Set up Ctrl-C handler
    ctrlc::set_handler(move || {
        eprintln!("\nInterrupted by user. Exiting (Ctrl-C)...");
        // Exit immediately with 130 (128 + SIGINT)
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    let cli = Cli::parse();
    let config = Config::load_or_default(cli.config.as_deref())?;

    match cli.command {
        Command::Listen(opts) => listen_main(&opts, config),
        Command::Put(opts) => put_main(&opts, config),
        Command::Get(opts) => get_main(&opts, config),
    }
}

fn listen_main(opts: &ListenOpts, config: Config) -> Result<()> {
    let cfg = opts.apply(config.listener);
    let logger = build_listener_logger(cfg.log_file.as_deref())
        .context("Failed to open log file")?;

    if cfg.confine_reads {
        println!("Downloads confined to {}", cfg.root.display());
    }
    if opts.bind == "0.0.0.0" {
        eprintln!("WARNING: listening on all interfaces; transfers are unencrypted and unauthenticated");
    }

    server::serve(&opts.bind_addr(), cfg, logger)
}

/// Connection failures end the process with a generic message.
fn exit_on_connect_failure(e: TransferError) -> anyhow::Error {
    if let TransferError::ConnectFailed { .. } = e {
        eprintln!("Connection failed");
        std::process::exit(1);
    }
    e.into()
}

fn put_main(opts: &PutOpts, config: Config) -> Result<()> {
    let initiator = Initiator::new(opts.transfer.apply(config.initiator));
    let addr = join_host_port(&opts.ip, opts.port);

    let outcome = initiator
        .put_file(&addr, &opts.file, opts.remote_name.as_deref())
        .map_err(exit_on_connect_failure)
        .with_context(|| format!("upload {}", opts.file.display()))?;

    println!("Server: {}", outcome.status);
    Ok(())
}

fn get_main(opts: &GetOpts, config: Config) -> Result<()> {
    let initiator = Initiator::new(opts.transfer.apply(config.initiator));
    let addr = join_host_port(&opts.ip, opts.port);

    let outcome = match initiator.get_file(&addr, &opts.file, opts.save_as.as_deref()) {
        Ok(outcome) => outcome,
        Err(TransferError::ProtocolMismatch(line)) => {
            println!("Error: {}", line);
            return Ok(());
        }
        Err(e) => {
            let e = exit_on_connect_failure(e);
            return Err(e.context(format!("download {}", opts.file)));
        }
    };

    if !outcome.is_complete() {
        eprintln!(
            "WARNING: stream ended after {} of {} bytes",
            outcome.received, outcome.declared
        );
    }
    println!(
        "Saved {} ({} bytes)",
        outcome.saved_to.display(),
        outcome.declared
    );
    Ok(())
}
