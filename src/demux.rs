//! Thin wrapper over `mio::Poll` giving the server loop add/mod/del/wait in
//! terms of the trigger-mode bits SPEC_FULL.md §4.F describes.

use std::io;
use std::time::Duration;

use mio::{Events, Interest, Poll, Token};
use mio::event::Source;

pub struct Demultiplexer {
    poll: Poll,
    events: Events,
}

impl Demultiplexer {
    pub fn new(events_capacity: usize) -> io::Result<Self> {
        Ok(Demultiplexer {
            poll: Poll::new()?,
            events: Events::with_capacity(events_capacity),
        })
    }

    pub fn add(&self, source: &mut impl Source, token: Token, interest: Interest) -> io::Result<()> {
        self.poll.registry().register(source, token, interest)
    }

    pub fn modify(&self, source: &mut impl Source, token: Token, interest: Interest) -> io::Result<()> {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn remove(&self, source: &mut impl Source) -> io::Result<()> {
        self.poll.registry().deregister(source)
    }

    /// Blocks for up to `timeout` (None = forever) and returns the number of
    /// ready events, now available via `events()`.
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        self.poll.poll(&mut self.events, timeout)?;
        Ok(self.events.iter().count())
    }

    pub fn iter(&self) -> impl Iterator<Item = &mio::event::Event> {
        self.events.iter()
    }
}

/// Interest used for a given trigger mode bit: edge-triggered add
/// `Interest::READABLE` plus an explicit drain loop at the call site;
/// level-triggered callers simply read once per wakeup. `mio`'s epoll
/// backend is always edge-triggered under the hood, so the distinction this
/// server makes between the four `trig_mode` combinations lives in how many
/// times the caller drains a socket per wakeup, not in distinct kernel
/// flags.
pub fn connection_interest() -> Interest {
    Interest::READABLE.add(Interest::WRITABLE)
}

pub fn listener_interest() -> Interest {
    Interest::READABLE
}
