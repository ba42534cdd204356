use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// Bounded, blocking, multi-producer multi-consumer queue with explicit close
/// semantics. Producers block on `push_back` while full; consumers block on
/// `pop` while empty. Once closed, blocked producers and consumers are woken
/// and further operations fail instead of blocking forever.
pub struct BlockingDeque<T> {
    capacity: usize,
    inner: Mutex<Inner<T>>,
    not_full: Condvar,
    not_empty: Condvar,
}

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

impl<T> BlockingDeque<T> {
    pub fn new(capacity: usize) -> Self {
        BlockingDeque {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                items: VecDeque::new(),
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.len() >= self.capacity
    }

    /// Blocks until there is room or the deque is closed. Returns `false`
    /// (item dropped) if the deque was already closed.
    pub fn push_back(&self, value: T) -> bool {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if guard.closed {
                return false;
            }
            if guard.items.len() < self.capacity {
                guard.items.push_back(value);
                self.not_empty.notify_one();
                return true;
            }
            guard = self.not_full.wait(guard).unwrap();
        }
    }

    pub fn push_front(&self, value: T) -> bool {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if guard.closed {
                return false;
            }
            if guard.items.len() < self.capacity {
                guard.items.push_front(value);
                self.not_empty.notify_one();
                return true;
            }
            guard = self.not_full.wait(guard).unwrap();
        }
    }

    /// Tries to push without blocking; returns `false` if full or closed.
    pub fn try_push_back(&self, value: T) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if guard.closed || guard.items.len() >= self.capacity {
            return false;
        }
        guard.items.push_back(value);
        self.not_empty.notify_one();
        true
    }

    /// Blocks until an item is available or the deque is closed and drained.
    pub fn pop(&self) -> Option<T> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(v) = guard.items.pop_front() {
                self.not_full.notify_one();
                return Some(v);
            }
            if guard.closed {
                return None;
            }
            guard = self.not_empty.wait(guard).unwrap();
        }
    }

    pub fn pop_timeout(&self, timeout: Duration) -> Option<T> {
        let mut guard = self.inner.lock().unwrap();
        loop {
            if let Some(v) = guard.items.pop_front() {
                self.not_full.notify_one();
                return Some(v);
            }
            if guard.closed {
                return None;
            }
            let (next, result) = self.not_empty.wait_timeout(guard, timeout).unwrap();
            guard = next;
            if result.timed_out() {
                return guard.items.pop_front().inspect(|_| {
                    self.not_full.notify_one();
                });
            }
        }
    }

    /// Closes the deque: wakes every blocked producer/consumer. Items already
    /// queued remain available to `pop` until drained.
    pub fn close(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Wakes every thread blocked in `pop`/`pop_timeout` without pushing or
    /// closing, so the sink thread re-checks the queue immediately instead
    /// of waiting out a timeout.
    pub fn flush(&self) {
        self.not_empty.notify_all();
    }

    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.items.clear();
        self.not_full.notify_all();
    }

    pub fn front(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.lock().unwrap().items.front().cloned()
    }

    pub fn back(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.lock().unwrap().items.back().cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn push_pop_roundtrip() {
        let q: BlockingDeque<i32> = BlockingDeque::new(4);
        assert!(q.push_back(1));
        assert!(q.push_back(2));
        assert_eq!(q.pop(), Some(1));
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn full_blocks_until_consumer_drains() {
        let q = Arc::new(BlockingDeque::new(1));
        assert!(q.push_back(1));
        let q2 = q.clone();
        let handle = thread::spawn(move || {
            // Will block until the main thread pops.
            q2.push_back(2)
        });
        thread::sleep(Duration::from_millis(20));
        assert_eq!(q.pop(), Some(1));
        assert!(handle.join().unwrap());
        assert_eq!(q.pop(), Some(2));
    }

    #[test]
    fn close_wakes_blocked_consumer() {
        let q: Arc<BlockingDeque<i32>> = Arc::new(BlockingDeque::new(4));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop());
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert_eq!(handle.join().unwrap(), None);
    }

    #[test]
    fn close_then_push_fails() {
        let q: BlockingDeque<i32> = BlockingDeque::new(4);
        q.close();
        assert!(!q.push_back(1));
    }

    #[test]
    fn flush_wakes_a_blocked_consumer_without_closing() {
        let q: Arc<BlockingDeque<i32>> = Arc::new(BlockingDeque::new(4));
        let q2 = q.clone();
        let handle = thread::spawn(move || q2.pop_timeout(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        q.push_back(7);
        q.flush();
        assert_eq!(handle.join().unwrap(), Some(7));
        assert!(!q.is_closed());
    }
}
