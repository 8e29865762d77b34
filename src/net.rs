//! Byte-level transport shared by the listener and the initiator
//!
//! `send_all` and `recv_exact` are the only functions that touch the raw
//! stream; line framing and the chunked bulk loops are built on them.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::time::Duration;

use crate::error::TransferError;
use crate::progress::TransferProgress;
use crate::protocol::{MAX_LINE_LEN, TRANSFER_BUF_SIZE};

/// Write every byte of `bytes`, all or nothing.
///
/// A write that makes no progress means the peer is gone and fails the call
/// with `SendFailed`. Deadline expiry surfaces the same way.
pub fn send_all<W: Write + ?Sized>(stream: &mut W, bytes: &[u8]) -> Result<(), TransferError> {
    let mut sent = 0;
    while sent < bytes.len() {
        match stream.write(&bytes[sent..]) {
            Ok(0) => {
                return Err(TransferError::SendFailed(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer accepted no bytes",
                )))
            }
            Ok(n) => sent += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::SendFailed(e)),
        }
    }
    Ok(())
}

/// Fill `buf` completely from `stream`.
///
/// Fails with `ReceiveFailed` the moment a read returns no data; whatever
/// was already read into `buf` is abandoned by the caller.
pub fn recv_exact<R: Read + ?Sized>(stream: &mut R, buf: &mut [u8]) -> Result<(), TransferError> {
    let mut got = 0;
    while got < buf.len() {
        match stream.read(&mut buf[got..]) {
            Ok(0) => {
                return Err(TransferError::ReceiveFailed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("peer closed after {} of {} bytes", got, buf.len()),
                )))
            }
            Ok(n) => got += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::ReceiveFailed(e)),
        }
    }
    Ok(())
}

/// Send one control line, appending `\n` unless already present.
pub fn send_line<W: Write + ?Sized>(stream: &mut W, line: &str) -> Result<(), TransferError> {
    if line.ends_with('\n') {
        send_all(stream, line.as_bytes())
    } else {
        let mut framed = String::with_capacity(line.len() + 1);
        framed.push_str(line);
        framed.push('\n');
        send_all(stream, framed.as_bytes())
    }
}

/// Read one control line, without its trailing `\n`.
///
/// Reads a byte at a time so that no payload byte following the line is
/// consumed. EOF before the newline is `ConnectionClosed`. Names are
/// compared byte for byte on disk, so a line that is not UTF-8 is refused
/// rather than rewritten.
pub fn recv_line<R: Read + ?Sized>(stream: &mut R) -> Result<String, TransferError> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    loop {
        match stream.read(&mut byte) {
            Ok(0) => return Err(TransferError::ConnectionClosed),
            Ok(_) => {
                if byte[0] == b'\n' {
                    break;
                }
                if line.len() >= MAX_LINE_LEN {
                    return Err(TransferError::LineTooLong(MAX_LINE_LEN));
                }
                line.push(byte[0]);
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(TransferError::ReceiveFailed(e)),
        }
    }
    String::from_utf8(line).map_err(|_| TransferError::NonUtf8Line)
}

/// Counters for the most recent bulk transfer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransferStats {
    pub bytes: u64,
    pub chunks: u64,
}

/// Fixed-capacity buffer shuttling payload bytes between a socket and a file.
///
/// Stats are reset at the start of every loop, so after a failed transfer
/// `stats()` reports how far it got.
pub struct TransferBuffer {
    buf: Box<[u8]>,
    stats: TransferStats,
    progress: Option<TransferProgress>,
}

impl TransferBuffer {
    pub fn new() -> Self {
        Self::with_capacity(TRANSFER_BUF_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        TransferBuffer {
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            stats: TransferStats::default(),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: Option<TransferProgress>) -> Self {
        self.progress = progress;
        self
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    pub fn stats(&self) -> TransferStats {
        self.stats
    }

    fn record(&mut self, n: usize) {
        self.stats.bytes += n as u64;
        self.stats.chunks += 1;
        if let Some(p) = &self.progress {
            p.inc(n as u64);
        }
    }

    /// Receive exactly `size` bytes from `src` into `dst`, one chunk of at
    /// most `capacity()` bytes at a time. Each chunk is written as soon as
    /// it is complete; nothing beyond one chunk is held in memory.
    pub fn receive_into<R, W>(
        &mut self,
        src: &mut R,
        dst: &mut W,
        size: u64,
        local: &Path,
    ) -> Result<TransferStats, TransferError>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        self.stats = TransferStats::default();
        let mut left = size;
        while left > 0 {
            let chunk = left.min(self.buf.len() as u64) as usize;
            recv_exact(src, &mut self.buf[..chunk])?;
            dst.write_all(&self.buf[..chunk])
                .map_err(|e| TransferError::local_io(local, e))?;
            self.record(chunk);
            left -= chunk as u64;
        }
        dst.flush().map_err(|e| TransferError::local_io(local, e))?;
        Ok(self.stats)
    }

    /// Stream `src` to `dst` until `src` reports end of input.
    pub fn send_from<R, W>(
        &mut self,
        src: &mut R,
        dst: &mut W,
        local: &Path,
    ) -> Result<TransferStats, TransferError>
    where
        R: Read + ?Sized,
        W: Write + ?Sized,
    {
        self.stats = TransferStats::default();
        loop {
            let n = match src.read(&mut self.buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(TransferError::local_io(local, e)),
            };
            send_all(dst, &self.buf[..n])?;
            self.record(n);
        }
        dst.flush().map_err(TransferError::SendFailed)?;
        Ok(self.stats)
    }

    /// Stream exactly `size` bytes of `src` to `dst`.
    ///
    /// Input past `size` is never sent. Input that ends early (a file
    /// truncated after its size was announced) is reported once the short
    /// stream has been flushed.
    pub fn send_exact_from<R, W>(
        &mut self,
        src: &mut R,
        size: u64,
        dst: &mut W,
        local: &Path,
    ) -> Result<TransferStats, TransferError>
    where
        R: Read,
        W: Write + ?Sized,
    {
        let stats = self.send_from(&mut src.take(size), dst, local)?;
        if stats.bytes < size {
            return Err(TransferError::local_io(
                local,
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file ended after {} of {} bytes", stats.bytes, size),
                ),
            ));
        }
        Ok(stats)
    }
}

impl Default for TransferBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply (or clear, with `None`) read and write deadlines on a stream.
pub fn apply_deadlines(stream: &TcpStream, timeout: Option<Duration>) -> io::Result<()> {
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;
    Ok(())
}

// Socket tuning: disable Nagle so control lines go out immediately, enable keepalive
#[allow(unused_variables)]
pub fn tune_socket(stream: &TcpStream) {
    let _ = stream.set_nodelay(true);
    #[cfg(unix)]
    {
        use std::os::fd::AsRawFd;
        let fd = stream.as_raw_fd();
        unsafe {
            let keepalive: libc::c_int = 1;
            let _ = libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_KEEPALIVE,
                &keepalive as *const _ as *const libc::c_void,
                std::mem::size_of_val(&keepalive) as libc::socklen_t,
            );

            #[cfg(target_os = "linux")]
            {
                let keepidle: libc::c_int = 60; // Start probes after 60s idle
                let keepintvl: libc::c_int = 10; // 10s between probes
                let keepcnt: libc::c_int = 6; // 6 probes before failure
                for (opt, val) in [
                    (libc::TCP_KEEPIDLE, &keepidle),
                    (libc::TCP_KEEPINTVL, &keepintvl),
                    (libc::TCP_KEEPCNT, &keepcnt),
                ] {
                    let _ = libc::setsockopt(
                        fd,
                        libc::IPPROTO_TCP,
                        opt,
                        val as *const _ as *const libc::c_void,
                        std::mem::size_of_val(val) as libc::socklen_t,
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reader that hands out at most `step` bytes per call.
    struct Trickle<'a> {
        data: &'a [u8],
        step: usize,
        interrupt_first: bool,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.interrupt_first {
                self.interrupt_first = false;
                return Err(io::Error::from(io::ErrorKind::Interrupted));
            }
            let n = self.step.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    /// Writer that accepts `limit` bytes and then reports zero progress.
    struct Stalling {
        taken: Vec<u8>,
        limit: usize,
    }

    impl Write for Stalling {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            let n = (self.limit - self.taken.len()).min(buf.len()).min(7);
            self.taken.extend_from_slice(&buf[..n]);
            Ok(n)
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    #[test]
    fn send_all_handles_short_writes() {
        let mut w = Stalling {
            taken: Vec::new(),
            limit: 100,
        };
        send_all(&mut w, &pattern(100)).unwrap();
        assert_eq!(w.taken, pattern(100));
    }

    #[test]
    fn send_all_fails_on_zero_progress() {
        let mut w = Stalling {
            taken: Vec::new(),
            limit: 10,
        };
        let err = send_all(&mut w, &pattern(50)).unwrap_err();
        assert!(matches!(err, TransferError::SendFailed(ref e) if e.kind() == io::ErrorKind::WriteZero));
    }

    #[test]
    fn recv_exact_collects_trickled_bytes() {
        let data = pattern(1000);
        let mut r = Trickle {
            data: &data,
            step: 3,
            interrupt_first: true,
        };
        let mut buf = vec![0u8; 1000];
        recv_exact(&mut r, &mut buf).unwrap();
        assert_eq!(buf, data);
    }

    #[test]
    fn recv_exact_fails_when_peer_closes_early() {
        let data = pattern(10);
        let mut r = Cursor::new(data);
        let mut buf = vec![0u8; 20];
        let err = recv_exact(&mut r, &mut buf).unwrap_err();
        assert!(matches!(err, TransferError::ReceiveFailed(ref e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn send_line_appends_newline_once() {
        let mut out = Vec::new();
        send_line(&mut out, "OK").unwrap();
        send_line(&mut out, "SIZE 5\n").unwrap();
        send_line(&mut out, "").unwrap();
        assert_eq!(out, b"OK\nSIZE 5\n\n");
    }

    #[test]
    fn recv_line_leaves_payload_unread() {
        let mut r = Cursor::new(b"PUT a.bin 3\nxyz".to_vec());
        assert_eq!(recv_line(&mut r).unwrap(), "PUT a.bin 3");
        let mut rest = Vec::new();
        r.read_to_end(&mut rest).unwrap();
        assert_eq!(rest, b"xyz");
    }

    #[test]
    fn recv_line_empty_and_closed() {
        let mut r = Cursor::new(b"\nOK".to_vec());
        assert_eq!(recv_line(&mut r).unwrap(), "");
        // "OK" without newline then EOF
        assert!(matches!(
            recv_line(&mut r),
            Err(TransferError::ConnectionClosed)
        ));
    }

    #[test]
    fn recv_line_refuses_non_utf8() {
        let mut r = Cursor::new(b"PUT caf\xe9.txt 1\nx".to_vec());
        assert!(matches!(recv_line(&mut r), Err(TransferError::NonUtf8Line)));
    }

    #[test]
    fn recv_line_rejects_oversized_line() {
        let mut r = Cursor::new(vec![b'a'; MAX_LINE_LEN + 10]);
        assert!(matches!(
            recv_line(&mut r),
            Err(TransferError::LineTooLong(MAX_LINE_LEN))
        ));
    }

    #[test]
    fn receive_exactly_one_buffer_is_one_chunk() {
        let data = pattern(TRANSFER_BUF_SIZE);
        let mut src = Cursor::new(data.clone());
        let mut dst = Vec::new();
        let mut buf = TransferBuffer::new();
        let stats = buf
            .receive_into(&mut src, &mut dst, data.len() as u64, Path::new("mem"))
            .unwrap();
        assert_eq!(stats.chunks, 1);
        assert_eq!(stats.bytes, TRANSFER_BUF_SIZE as u64);
        assert_eq!(dst, data);
    }

    #[test]
    fn receive_buffer_plus_one_is_two_chunks() {
        let data = pattern(TRANSFER_BUF_SIZE + 1);
        let mut src = Cursor::new(data.clone());
        let mut dst = Vec::new();
        let mut buf = TransferBuffer::new();
        let stats = buf
            .receive_into(&mut src, &mut dst, data.len() as u64, Path::new("mem"))
            .unwrap();
        assert_eq!(stats.chunks, 2);
        assert_eq!(dst, data);
    }

    #[test]
    fn receive_does_not_consume_past_size() {
        let mut src = Cursor::new(b"abcdefOK\n".to_vec());
        let mut dst = Vec::new();
        TransferBuffer::new()
            .receive_into(&mut src, &mut dst, 6, Path::new("mem"))
            .unwrap();
        assert_eq!(dst, b"abcdef");
        assert_eq!(recv_line(&mut src).unwrap(), "OK");
    }

    #[test]
    fn receive_zero_bytes_is_no_chunks() {
        let mut src = Cursor::new(Vec::new());
        let mut dst = Vec::new();
        let stats = TransferBuffer::new()
            .receive_into(&mut src, &mut dst, 0, Path::new("mem"))
            .unwrap();
        assert_eq!(stats, TransferStats::default());
    }

    #[test]
    fn receive_short_stream_keeps_written_chunks() {
        let data = pattern(TRANSFER_BUF_SIZE + 100);
        let mut src = Cursor::new(data.clone());
        let mut dst = Vec::new();
        let mut buf = TransferBuffer::new();
        let err = buf
            .receive_into(&mut src, &mut dst, 3 * TRANSFER_BUF_SIZE as u64, Path::new("mem"))
            .unwrap_err();
        assert!(err.is_connection_failure());
        // The first full chunk landed; the incomplete second one was abandoned.
        assert_eq!(dst.len(), TRANSFER_BUF_SIZE);
        assert_eq!(buf.stats().chunks, 1);
    }

    #[test]
    fn send_exactly_one_buffer_is_one_chunk() {
        let data = pattern(TRANSFER_BUF_SIZE);
        let mut out = Vec::new();
        let mut buf = TransferBuffer::new();
        let stats = buf
            .send_exact_from(&mut Cursor::new(data.clone()), data.len() as u64, &mut out, Path::new("mem"))
            .unwrap();
        assert_eq!(stats.chunks, 1);
        assert_eq!(out, data);

        let data = pattern(TRANSFER_BUF_SIZE + 1);
        let mut out = Vec::new();
        let stats = buf
            .send_exact_from(&mut Cursor::new(data.clone()), data.len() as u64, &mut out, Path::new("mem"))
            .unwrap();
        assert_eq!(stats.chunks, 2);
        assert_eq!(out, data);
    }

    #[test]
    fn send_exact_caps_at_size() {
        let mut out = Vec::new();
        let stats = TransferBuffer::new()
            .send_exact_from(&mut Cursor::new(pattern(500)), 200, &mut out, Path::new("mem"))
            .unwrap();
        assert_eq!(stats.bytes, 200);
        assert_eq!(out, pattern(200));
    }

    #[test]
    fn send_exact_reports_truncated_source() {
        let mut out = Vec::new();
        let mut buf = TransferBuffer::new();
        let err = buf
            .send_exact_from(&mut Cursor::new(pattern(50)), 80, &mut out, Path::new("shrunk.bin"))
            .unwrap_err();
        assert!(matches!(err, TransferError::LocalIo { .. }));
        assert_eq!(out.len(), 50);
        assert_eq!(buf.stats().bytes, 50);
    }

    #[test]
    fn small_buffer_chunks() {
        let data = pattern(10);
        let mut dst = Vec::new();
        let mut buf = TransferBuffer::with_capacity(4);
        assert_eq!(buf.capacity(), 4);
        let stats = buf
            .receive_into(&mut Cursor::new(data.clone()), &mut dst, 10, Path::new("mem"))
            .unwrap();
        assert_eq!(stats.chunks, 3);
        assert_eq!(dst, data);
    }
}
