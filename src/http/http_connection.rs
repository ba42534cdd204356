//! Owns one client socket: its read/write buffers, request/response state,
//! and the scatter/gather I/O that drains them.

use std::io::{ErrorKind, Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::Ordering;

use mio::Token;
use mio::net::TcpStream;

use crate::buffer::Buffer;
use crate::http::request::{HttpRequest, ParseContext, ParseOutcome};
use crate::http::response::HttpResponse;
use crate::prelude::USER_COUNT;
use crate::sql_pool::SqlPool;

pub struct Connection {
    pub stream: TcpStream,
    pub addr: SocketAddr,
    pub token: Token,
    read_buf: Buffer,
    request: HttpRequest,
    response: HttpResponse,
    written: usize,
    pub closed: bool,
}

/// Outcome of a read-phase drive, telling the server loop what to
/// reregister for next.
pub enum ReadOutcome {
    /// Request incomplete; keep waiting for readability.
    WantRead,
    /// A full request was parsed; the response is ready to write.
    WantWrite,
    /// The peer is gone or sent something we can't recover from.
    Close,
}

impl Connection {
    /// Counts against the process-wide user count immediately; the caller
    /// (`Server::accept_loop`) is responsible for checking `MAX_FD` first.
    pub fn new(stream: TcpStream, addr: SocketAddr, token: Token) -> Self {
        USER_COUNT.fetch_add(1, Ordering::SeqCst);
        Connection {
            stream,
            addr,
            token,
            read_buf: Buffer::new(),
            request: HttpRequest::new(),
            response: HttpResponse::new(),
            written: 0,
            closed: false,
        }
    }

    /// Drains the socket into the read buffer in a loop (edge-triggered
    /// drain), stopping on `WouldBlock`, EOF, or a hard error.
    pub fn read(&mut self) -> bool {
        loop {
            match self.read_buf.read_from(&mut self.stream) {
                Ok(0) => return true,
                Ok(_) => continue,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
                Err(_) => return true,
            }
        }
    }

    /// Parses whatever is in the read buffer and, on a complete request,
    /// builds the response. Returns what the caller should do next.
    pub fn process(&mut self, src_dir: &str, upload_dir: &str, sql_pool: Option<&SqlPool>) -> ReadOutcome {
        if self.request.state == crate::http::request::ParseState::Finish {
            self.request.reset();
        }
        if self.read_buf.is_empty() {
            return ReadOutcome::WantRead;
        }
        let ctx = ParseContext {
            sql_pool,
            upload_dir,
        };
        match self.request.parse(&mut self.read_buf, &ctx) {
            ParseOutcome::NoRequest => ReadOutcome::WantRead,
            ParseOutcome::GetRequest => {
                let keep_alive = self.request.is_keep_alive();
                self.response.build(src_dir, &self.request.path, keep_alive, 200);
                self.written = 0;
                ReadOutcome::WantWrite
            }
            ParseOutcome::BadRequest => {
                self.response.build(src_dir, "/400.html", false, 400);
                self.written = 0;
                ReadOutcome::WantWrite
            }
            ParseOutcome::InternalError => ReadOutcome::Close,
        }
    }

    /// Scatter/gather write of whatever remains of the response, resuming
    /// from `written` across calls. Returns `true` once fully flushed.
    pub fn write(&mut self) -> bool {
        loop {
            let slices = self.response.iovecs_from(self.written);
            if slices.is_empty() {
                return true;
            }
            match self.stream.write_vectored(&slices) {
                Ok(0) => return false,
                Ok(n) => self.written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return false,
                Err(_) => {
                    self.closed = true;
                    return false;
                }
            }
        }
    }

    pub fn fully_written(&self) -> bool {
        self.written >= self.response.total_len()
    }

    pub fn is_keep_alive(&self) -> bool {
        self.response.keep_alive
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        USER_COUNT.fetch_sub(1, Ordering::SeqCst);
    }
}
