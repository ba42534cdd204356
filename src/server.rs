//! Accept loop and event loop tying the demultiplexer, idle timer, worker
//! pool, SQL pool, and connection table together behind a single dispatch
//! thread. Per-connection reads, request parsing, and writes are handed to
//! the worker pool; the dispatch thread itself never blocks on a peer, and
//! never touches a connection currently on loan to a worker.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener as StdTcpListener};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mio::net::TcpListener;
use mio::Token;

use crate::config::ServerConfig;
use crate::demux::{self, Demultiplexer};
use crate::error::Result;
use crate::http::{Connection, ReadOutcome};
use crate::prelude::{log_debug, log_info, log_warn, Ordering, MAX_FD, USER_COUNT};
use crate::sql_pool::SqlPool;
use crate::timer::{HeapTimer, TimerAction};
use crate::workers::WorkerPool;

const LISTENER_TOKEN: Token = Token(0);

/// A connection owned by the dispatch thread except while a worker holds it
/// for a read/process/write pass. `busy` is how the dispatcher tells "on
/// loan to a worker" apart from "closed" without needing a third state: a
/// missing map entry means closed, `conn: None` + `busy: true` means in
/// flight.
struct Slot {
    conn: Option<Connection>,
    busy: bool,
}

type Connections = Arc<Mutex<HashMap<Token, Slot>>>;

pub struct Server {
    config: ServerConfig,
    listener: TcpListener,
    demux: Demultiplexer,
    timer: HeapTimer,
    workers: WorkerPool,
    sql_pool: Option<SqlPool>,
    connections: Connections,
    next_token: usize,
    src_dir: String,
    upload_dir: String,
}

impl Server {
    pub fn new(config: ServerConfig) -> Result<Self> {
        let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
        let std_listener = StdTcpListener::bind(addr)?;
        std_listener.set_nonblocking(true)?;
        let mut listener = TcpListener::from_std(std_listener);

        let demux = Demultiplexer::new(1024)?;
        demux.add(&mut listener, LISTENER_TOKEN, demux::listener_interest())?;

        let sql_pool = if config.sql_db.is_empty() {
            None
        } else {
            Some(SqlPool::new(
                "127.0.0.1",
                config.sql_port,
                &config.sql_user,
                &config.sql_password,
                &config.sql_db,
                config.sql_pool_size,
            )?)
        };

        let workers = WorkerPool::new(config.worker_threads);
        let src_dir = config.src_dir.clone();
        let upload_dir = config.upload_dir.clone();

        Ok(Server {
            config,
            listener,
            demux,
            timer: HeapTimer::new(),
            workers,
            sql_pool,
            connections: Arc::new(Mutex::new(HashMap::new())),
            next_token: 1,
            src_dir,
            upload_dir,
        })
    }

    fn alloc_token(&mut self) -> Token {
        let t = Token(self.next_token);
        self.next_token += 1;
        t
    }

    /// Drives the event loop until the process is killed or a fatal I/O
    /// error hits the listener. Every connection is registered once for
    /// both readability and writability up front; which one currently
    /// matters is tracked in `Connection` itself rather than by toggling the
    /// registration; a read-ready and a write-ready wakeup are both handed
    /// to the same dispatch path, which no-ops the side that doesn't apply.
    pub fn run(&mut self) -> Result<()> {
        log_info!("server listening on port {}", self.config.port);
        loop {
            let connections = self.connections.clone();
            let timeout = self
                .timer
                .next_tick(|token, action| match action {
                    TimerAction::CloseConnection => close_conn(&connections, &mut self.demux, token),
                })
                .or(Some(Duration::from_secs(1)));

            let n = self.demux.wait(timeout)?;
            if n == 0 {
                continue;
            }

            let ready: Vec<Token> = self.demux.iter().map(|e| e.token()).collect();
            for token in ready {
                if token == LISTENER_TOKEN {
                    self.accept_loop();
                } else {
                    self.dispatch(token);
                }
            }
        }
    }

    fn accept_loop(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    if USER_COUNT.load(Ordering::SeqCst) >= MAX_FD {
                        log_warn!("refusing connection from {}: at MAX_FD ({})", addr, MAX_FD);
                        let _ = stream.shutdown(Shutdown::Both);
                        continue;
                    }
                    let token = self.alloc_token();
                    if self.demux.add(&mut stream, token, demux::connection_interest()).is_err() {
                        continue;
                    }
                    let conn = Connection::new(stream, addr, token);
                    self.connections
                        .lock()
                        .unwrap()
                        .insert(token, Slot { conn: Some(conn), busy: false });
                    self.timer.add(
                        token,
                        Duration::from_millis(self.config.timeout_ms),
                        TimerAction::CloseConnection,
                    );
                    log_debug!("accepted connection {:?} from {}", token, addr);
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(_) => break,
            }
        }
    }

    /// Pulls the connection out of the map (if idle), hands a full
    /// read-parse-write pass to the worker pool, and reinserts it when the
    /// worker is done. A wakeup for a connection already on loan is dropped:
    /// the worker's own loop will have drained the socket already, or will
    /// see the same readiness again on its next registration check.
    fn dispatch(&mut self, token: Token) {
        let mut conn = {
            let mut map = self.connections.lock().unwrap();
            let Some(slot) = map.get_mut(&token) else { return };
            if slot.busy {
                return;
            }
            let Some(conn) = slot.conn.take() else { return };
            slot.busy = true;
            conn
        };

        self.timer.adjust(token, Duration::from_millis(self.config.timeout_ms));

        let connections = self.connections.clone();
        let src_dir = self.src_dir.clone();
        let upload_dir = self.upload_dir.clone();
        let sql_pool = self.sql_pool.clone();

        self.workers.submit(move || {
            let closed = service_connection(&mut conn, &src_dir, &upload_dir, sql_pool.as_ref());
            let mut map = connections.lock().unwrap();
            if let Some(slot) = map.get_mut(&token) {
                slot.busy = false;
                if closed {
                    map.remove(&token);
                    let _ = conn.stream.shutdown(Shutdown::Both);
                } else {
                    slot.conn = Some(conn);
                }
            }
        });
    }
}

/// One pass of read-then-respond, run on a worker thread. Returns whether
/// the connection should be torn down.
fn service_connection(
    conn: &mut Connection,
    src_dir: &str,
    upload_dir: &str,
    sql_pool: Option<&SqlPool>,
) -> bool {
    if !conn.fully_written() {
        conn.write();
        return conn.closed;
    }

    let peer_closed = conn.read();
    match conn.process(src_dir, upload_dir, sql_pool) {
        ReadOutcome::WantRead => peer_closed,
        ReadOutcome::Close => true,
        ReadOutcome::WantWrite => {
            conn.write();
            if conn.closed {
                return true;
            }
            conn.fully_written() && !conn.is_keep_alive()
        }
    }
}

/// Idempotent: the timer and an I/O error path can both race to remove the
/// same token, and a second removal of an already-absent entry is a no-op.
fn close_conn(connections: &Connections, demux: &mut Demultiplexer, token: Token) {
    let mut map = connections.lock().unwrap();
    if let Some(mut slot) = map.remove(&token) {
        if let Some(mut conn) = slot.conn.take() {
            let _ = demux.remove(&mut conn.stream);
            let _ = conn.stream.shutdown(Shutdown::Both);
        }
        // if busy, the in-flight worker holds the only handle left; it will
        // find no map entry on completion and drop the connection itself.
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(pool) = &self.sql_pool {
            pool.close();
        }
    }
}
