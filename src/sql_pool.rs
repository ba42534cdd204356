//! Bounded pool of MySQL connections with scoped (RAII) borrow semantics.
//! Acquisition blocks until a connection is available; release happens
//! automatically when the guard is dropped, on every exit path.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Condvar, Mutex};

use mysql::{Conn, Opts, OptsBuilder};

use crate::error::{Result, ServerError};

struct Shared {
    free: Mutex<VecDeque<Conn>>,
    cond: Condvar,
    closed: Mutex<bool>,
}

#[derive(Clone)]
pub struct SqlPool {
    shared: Arc<Shared>,
}

impl SqlPool {
    pub fn new(host: &str, port: u16, user: &str, password: &str, db: &str, size: usize) -> Result<Self> {
        let opts: Opts = OptsBuilder::new()
            .ip_or_hostname(Some(host))
            .tcp_port(port)
            .user(Some(user))
            .pass(Some(password))
            .db_name(Some(db))
            .into();
        let mut free = VecDeque::with_capacity(size);
        for _ in 0..size {
            free.push_back(Conn::new(opts.clone()).map_err(ServerError::Database)?);
        }
        Ok(SqlPool {
            shared: Arc::new(Shared {
                free: Mutex::new(free),
                cond: Condvar::new(),
                closed: Mutex::new(false),
            }),
        })
    }

    /// Blocks until a connection is available, or returns `PoolClosed` if
    /// the pool was shut down while waiting.
    pub fn get(&self) -> Result<PooledConn> {
        let mut free = self.shared.free.lock().unwrap();
        loop {
            if let Some(conn) = free.pop_front() {
                return Ok(PooledConn {
                    conn: Some(conn),
                    shared: self.shared.clone(),
                });
            }
            if *self.shared.closed.lock().unwrap() {
                return Err(ServerError::PoolClosed);
            }
            free = self.shared.cond.wait(free).unwrap();
        }
    }

    pub fn close(&self) {
        *self.shared.closed.lock().unwrap() = true;
        self.shared.cond.notify_all();
    }
}

pub struct PooledConn {
    conn: Option<Conn>,
    shared: Arc<Shared>,
}

impl Deref for PooledConn {
    type Target = Conn;
    fn deref(&self) -> &Conn {
        self.conn.as_ref().expect("connection taken")
    }
}

impl DerefMut for PooledConn {
    fn deref_mut(&mut self) -> &mut Conn {
        self.conn.as_mut().expect("connection taken")
    }
}

impl Drop for PooledConn {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.shared.free.lock().unwrap().push_back(conn);
            self.shared.cond.notify_one();
        }
    }
}
