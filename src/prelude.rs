pub use crate::config::ServerConfig;
pub use crate::error::{Result, ServerError};

pub use async_log::{Level, log_debug, log_error, log_info, log_warn};

pub use std::collections::HashMap;
pub use std::io::{self, ErrorKind, Read, Write};
pub use std::net::SocketAddr;
pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;
pub use std::sync::atomic::{AtomicUsize, Ordering};
pub use std::time::{Duration, Instant};

pub const MAX_FD: usize = 65_536;

/// Process-wide count of open connections. Incremented in `Connection::new`,
/// decremented once per connection in its `Drop` impl, regardless of which
/// path (idle timeout, I/O error, graceful close) tears it down.
pub static USER_COUNT: AtomicUsize = AtomicUsize::new(0);
