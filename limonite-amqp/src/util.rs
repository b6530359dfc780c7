//! Common utilities

use std::collections::BTreeSet;
use std::pin::Pin;
use std::task::Poll;
use std::time::Duration;

use futures_util::Future;
use tokio::time::{Instant, Sleep};

/// Verdict of one engine event: keep looping or wind down.
#[derive(Debug)]
pub(crate) enum Running {
    Continue,
    Stop,
}

/// Tracks inbound silence; fires when nothing arrived for the whole window.
#[derive(Debug)]
pub(crate) struct IdleTimeout {
    delay: Pin<Box<Sleep>>,
    duration: Duration,
}

impl IdleTimeout {
    pub fn new(duration: Duration) -> Self {
        let delay = Box::pin(tokio::time::sleep(duration));
        Self { delay, duration }
    }

    pub fn reset(&mut self) {
        let next = Instant::now() + self.duration;
        self.delay.as_mut().reset(next);
    }
}

impl Future for IdleTimeout {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        self.delay.as_mut().poll(cx)
    }
}

/// Hands out the lowest free id and takes released ids back.
///
/// Channel numbers and link handles must be allocated lowest-first and are
/// reusable once the end/detach handshake completes.
#[derive(Debug)]
pub(crate) struct IdAllocator {
    next: u32,
    freed: BTreeSet<u32>,
    max: u32,
}

impl IdAllocator {
    pub fn new(max: u32) -> Self {
        Self {
            next: 0,
            freed: BTreeSet::new(),
            max,
        }
    }

    pub fn allocate(&mut self) -> Option<u32> {
        if let Some(&lowest) = self.freed.iter().next() {
            self.freed.remove(&lowest);
            return Some(lowest);
        }
        if self.next > self.max {
            return None;
        }
        let id = self.next;
        self.next += 1;
        Some(id)
    }

    pub fn release(&mut self, id: u32) {
        if id + 1 == self.next {
            self.next = id;
            // collapse the tail of freed ids back into `next`
            while self.next > 0 && self.freed.remove(&(self.next - 1)) {
                self.next -= 1;
            }
        } else if id < self.next {
            self.freed.insert(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::IdAllocator;

    #[test]
    fn allocates_lowest_free_first() {
        let mut alloc = IdAllocator::new(u32::MAX);
        assert_eq!(alloc.allocate(), Some(0));
        assert_eq!(alloc.allocate(), Some(1));
        assert_eq!(alloc.allocate(), Some(2));
        alloc.release(1);
        assert_eq!(alloc.allocate(), Some(1));
        assert_eq!(alloc.allocate(), Some(3));
    }

    #[test]
    fn released_tail_is_reused() {
        let mut alloc = IdAllocator::new(u32::MAX);
        for _ in 0..4 {
            alloc.allocate();
        }
        alloc.release(3);
        alloc.release(2);
        assert_eq!(alloc.allocate(), Some(2));
    }

    #[test]
    fn respects_max() {
        let mut alloc = IdAllocator::new(1);
        assert_eq!(alloc.allocate(), Some(0));
        assert_eq!(alloc.allocate(), Some(1));
        assert_eq!(alloc.allocate(), None);
        alloc.release(0);
        assert_eq!(alloc.allocate(), Some(0));
    }
}
