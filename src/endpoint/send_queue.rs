//! Bounded backlog for stream endpoints.

use std::collections::VecDeque;

/// FIFO of unsent frames that evicts its oldest entry when full.
#[derive(Debug)]
pub struct SendQueue {
    frames: VecDeque<Vec<u8>>,
    limit: usize,
}

impl SendQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            frames: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    /// Append `frame`, returning the evicted oldest frame if the queue
    /// was already at its limit.
    pub fn push(&mut self, frame: Vec<u8>) -> Option<Vec<u8>> {
        let evicted = if self.frames.len() >= self.limit {
            self.frames.pop_front()
        } else {
            None
        };
        self.frames.push_back(frame);
        evicted
    }

    /// Return a frame taken by [`SendQueue::pop_front`] that could not be
    /// handed on.
    pub fn push_front(&mut self, frame: Vec<u8>) {
        self.frames.push_front(frame);
    }

    pub fn pop_front(&mut self) -> Option<Vec<u8>> {
        self.frames.pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
