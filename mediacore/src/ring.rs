// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity byte ring used between the capture callback and readers.

/// A circular byte buffer that never grows.
///
/// Writing more than fits drops the oldest bytes.
#[derive(Debug)]
pub struct RingBuffer {
    data: Box<[u8]>,
    offset: usize,
    length: usize,
}

impl RingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0; capacity].into_boxed_slice(),
            offset: 0,
            length: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn clear(&mut self) {
        self.offset = 0;
        self.length = 0;
    }

    /// Appends `src`, returning how many already buffered or incoming bytes
    /// were dropped to make room.
    pub fn push(&mut self, src: &[u8]) -> usize {
        let capacity = self.capacity();
        if capacity == 0 {
            return src.len();
        }

        if src.len() >= capacity {
            let dropped = self.length + src.len() - capacity;
            self.data.copy_from_slice(&src[src.len() - capacity..]);
            self.offset = 0;
            self.length = capacity;
            return dropped;
        }

        let overflow = (self.length + src.len()).saturating_sub(capacity);
        if overflow > 0 {
            self.offset = (self.offset + overflow) % capacity;
            self.length -= overflow;
        }

        let start = (self.offset + self.length) % capacity;
        let first = src.len().min(capacity - start);
        self.data[start..start + first].copy_from_slice(&src[..first]);
        self.data[..src.len() - first].copy_from_slice(&src[first..]);
        self.length += src.len();
        overflow
    }

    /// Moves up to `dst.len()` of the oldest bytes into `dst`.
    pub fn pop(&mut self, dst: &mut [u8]) -> usize {
        let count = self.length.min(dst.len());
        if count == 0 {
            return 0;
        }
        let capacity = self.capacity();
        let first = count.min(capacity - self.offset);
        dst[..first].copy_from_slice(&self.data[self.offset..self.offset + first]);
        dst[first..count].copy_from_slice(&self.data[..count - first]);

        self.length -= count;
        self.offset = if self.length == 0 {
            0
        } else {
            (self.offset + count) % capacity
        };
        count
    }
}
