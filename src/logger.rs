use anyhow::Result;
use chrono::Utc;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Listener-side transfer events.
pub trait Logger: Send + Sync {
    fn listening(&self, _addr: &str, _root: &Path) {}
    fn connection(&self, _peer: &str) {}
    fn received(&self, _name: &str, _bytes: u64) {}
    fn sent(&self, _name: &str, _bytes: u64) {}
    fn rejected(&self, _peer: &str, _reason: &str) {}
    fn error(&self, _context: &str, _msg: &str) {}
}

pub struct NoopLogger;
impl Logger for NoopLogger {}

/// Plain console messages: results on stdout, failures on stderr.
pub struct ConsoleLogger;

impl Logger for ConsoleLogger {
    fn listening(&self, addr: &str, root: &Path) {
        println!("Listening on {} (root {})", addr, root.display());
    }
    fn received(&self, name: &str, bytes: u64) {
        println!("Received {} ({} bytes)", name, bytes);
    }
    fn sent(&self, name: &str, bytes: u64) {
        println!("Sent {} ({} bytes)", name, bytes);
    }
    fn rejected(&self, peer: &str, reason: &str) {
        eprintln!("[{}] rejected: {}", peer, reason);
    }
    fn error(&self, context: &str, msg: &str) {
        eprintln!("{}: {}", context, msg);
    }
}

pub struct TextLogger {
    file: Mutex<File>,
}

impl TextLogger {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let f = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(f),
        })
    }

    fn line(&self, s: &str) {
        if let Ok(mut f) = self.file.lock() {
            let _ = writeln!(f, "[{}] {}", Utc::now().to_rfc3339(), s);
        }
    }
}

impl Logger for TextLogger {
    fn listening(&self, addr: &str, root: &Path) {
        self.line(&format!("LISTEN addr={} root={}", addr, root.display()));
    }
    fn connection(&self, peer: &str) {
        self.line(&format!("CONN peer={}", peer));
    }
    fn received(&self, name: &str, bytes: u64) {
        self.line(&format!("PUT name={} bytes={}", name, bytes));
    }
    fn sent(&self, name: &str, bytes: u64) {
        self.line(&format!("GET name={} bytes={}", name, bytes));
    }
    fn rejected(&self, peer: &str, reason: &str) {
        self.line(&format!("REJECT peer={} reason={}", peer, reason));
    }
    fn error(&self, context: &str, msg: &str) {
        self.line(&format!("ERROR ctx={} msg={}", context, msg));
    }
}

/// Fans every event out to each inner logger in order.
pub struct MultiLogger {
    loggers: Vec<Arc<dyn Logger>>,
}

impl MultiLogger {
    pub fn new(loggers: Vec<Arc<dyn Logger>>) -> Self {
        Self { loggers }
    }
}

impl Logger for MultiLogger {
    fn listening(&self, addr: &str, root: &Path) {
        self.loggers.iter().for_each(|l| l.listening(addr, root));
    }
    fn connection(&self, peer: &str) {
        self.loggers.iter().for_each(|l| l.connection(peer));
    }
    fn received(&self, name: &str, bytes: u64) {
        self.loggers.iter().for_each(|l| l.received(name, bytes));
    }
    fn sent(&self, name: &str, bytes: u64) {
        self.loggers.iter().for_each(|l| l.sent(name, bytes));
    }
    fn rejected(&self, peer: &str, reason: &str) {
        self.loggers.iter().for_each(|l| l.rejected(peer, reason));
    }
    fn error(&self, context: &str, msg: &str) {
        self.loggers.iter().for_each(|l| l.error(context, msg));
    }
}

/// Console logging, plus a timestamped file when `log_file` is set.
pub fn build_listener_logger(log_file: Option<&Path>) -> Result<Arc<dyn Logger>> {
    match log_file {
        Some(path) => {
            let loggers: Vec<Arc<dyn Logger>> =
                vec![Arc::new(ConsoleLogger), Arc::new(TextLogger::new(path)?)];
            Ok(Arc::new(MultiLogger::new(loggers)))
        }
        None => Ok(Arc::new(ConsoleLogger)),
    }
}
