/// A fixed-size byte ring for staging partial packets.
///
/// Writes and reads clamp to what fits: `insert` stores as many bytes as
/// there is room for, `peek` and `pop` copy out as many as are buffered.
/// Every operation returns the number of bytes it moved, so an empty
/// slice is simply a zero-length transfer.
///
/// Not synchronized; wrap it in a lock to share it between threads.
pub struct RingBuffer {
    /// Backing storage, `capacity` bytes.
    buf: Box<[u8]>,
    /// Index of the oldest buffered byte.
    head: usize,
    /// Number of buffered bytes.
    len: usize,
}

impl RingBuffer {
    /// Creates a ring holding up to `capacity` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be at least 1");

        Self {
            buf: vec![0; capacity].into_boxed_slice(),
            head: 0,
            len: 0,
        }
    }

    /// Maximum number of buffered bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Number of buffered bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Free space left.
    pub fn available(&self) -> usize {
        self.capacity() - self.len
    }

    /// Appends the longest prefix of `data` that fits and returns its length.
    pub fn insert(&mut self, data: &[u8]) -> usize {
        let count = data.len().min(self.available());
        let tail = (self.head + self.len) % self.capacity();

        let first = count.min(self.capacity() - tail);
        self.buf[tail..tail + first].copy_from_slice(&data[..first]);
        self.buf[..count - first].copy_from_slice(&data[first..count]);

        self.len += count;
        count
    }

    /// Copies the oldest bytes into `out` without consuming them.
    pub fn peek(&self, out: &mut [u8]) -> usize {
        let count = out.len().min(self.len);

        let first = count.min(self.capacity() - self.head);
        out[..first].copy_from_slice(&self.buf[self.head..self.head + first]);
        out[first..count].copy_from_slice(&self.buf[..count - first]);

        count
    }

    /// Moves the oldest bytes into `out`.
    pub fn pop(&mut self, out: &mut [u8]) -> usize {
        let count = self.peek(out);
        self.advance(count);
        count
    }

    /// Drops up to `count` of the oldest bytes and returns how many went.
    pub fn discard(&mut self, count: usize) -> usize {
        let count = count.min(self.len);
        self.advance(count);
        count
    }

    fn advance(&mut self, count: usize) {
        self.head = (self.head + count) % self.capacity();
        self.len -= count;
    }
}

impl std::fmt::Debug for RingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingBuffer")
            .field("capacity", &self.capacity())
            .field("len", &self.len)
            .finish()
    }
}
