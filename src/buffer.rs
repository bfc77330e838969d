//! Bounded buffering between the network read path and the consumer

use std::collections::VecDeque;

use log::debug;

use crate::message::Message;

/// FIFO buffer of inbound messages
pub trait MessageBuffer {
    /// Append a message, making room if necessary
    fn push(&mut self, message: Message);
    /// Remove and return the oldest message
    fn pop(&mut self) -> Option<Message>;
    /// Look at the oldest message without removing it
    fn peek(&self) -> Option<&Message>;
    /// Whether the buffer holds no messages
    fn is_empty(&self) -> bool;
}

/// Bounded FIFO buffer. Pushing into a full buffer evicts the oldest entry,
/// so the producing read loop never blocks; under sustained overload the
/// oldest backlog is dropped instead of growing without bound.
#[derive(Debug)]
pub struct RingBuffer {
    buf: VecDeque<Message>,
    capacity: usize,
}

impl RingBuffer {
    /// Create a buffer holding at most `capacity` messages
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        RingBuffer {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Number of buffered messages
    pub fn len(&self) -> usize {
        self.buf.len()
    }
}

impl MessageBuffer for RingBuffer {
    fn push(&mut self, message: Message) {
        if self.buf.len() == self.capacity {
            debug!("inbound buffer full, dropping oldest message");
            self.buf.pop_front();
        }
        self.buf.push_back(message);
    }

    fn pop(&mut self) -> Option<Message> {
        self.buf.pop_front()
    }

    fn peek(&self) -> Option<&Message> {
        self.buf.front()
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
