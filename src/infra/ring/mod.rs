//! Fixed-capacity circular byte buffer used as the firmware-upload
//! staging area. Capacity is a power of two so the wraparound copy is
//! plain index masking with separate read/write cursors.

/// Circular byte buffer with power-of-two capacity `N`.
///
/// Writes and reads move in whole slices; an operation that does not fit
/// is refused as a unit, never split.
#[derive(Debug)]
pub struct ByteRing<const N: usize> {
    data: [u8; N],
    head: usize,
    tail: usize,
    len: usize,
}

impl<const N: usize> ByteRing<N> {
    /// Create an empty ring. `N` must be a power of two.
    pub const fn new() -> Self {
        assert!(N.is_power_of_two());
        Self {
            data: [0; N],
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    /// Number of buffered bytes waiting to be read.
    #[inline]
    pub fn pending(&self) -> usize {
        self.len
    }

    /// Remaining capacity.
    #[inline]
    pub fn free(&self) -> usize {
        N - self.len
    }

    /// Drop all buffered bytes and rewind both cursors.
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
        // No need to wipe the storage; upcoming copies overwrite it.
    }

    /// Append `src` behind the write cursor. Returns `false` without
    /// copying anything when `src` is empty or does not fit.
    pub fn queue(&mut self, src: &[u8]) -> bool {
        if src.is_empty() || src.len() > self.free() {
            return false;
        }
        if self.head + src.len() > N {
            let first = N - self.head;
            self.data[self.head..].copy_from_slice(&src[..first]);
            self.data[..src.len() - first].copy_from_slice(&src[first..]);
        } else {
            self.data[self.head..self.head + src.len()].copy_from_slice(src);
        }
        self.head = (self.head + src.len()) & (N - 1);
        self.len += src.len();
        true
    }

    /// Remove `dst.len()` bytes from the read cursor into `dst`. Returns
    /// `false` without copying anything when `dst` is empty or more bytes
    /// are requested than are pending.
    pub fn dequeue(&mut self, dst: &mut [u8]) -> bool {
        if dst.is_empty() || dst.len() > self.pending() {
            return false;
        }
        if self.tail + dst.len() > N {
            let first = N - self.tail;
            let rest = dst.len() - first;
            dst[..first].copy_from_slice(&self.data[self.tail..]);
            dst[first..].copy_from_slice(&self.data[..rest]);
        } else {
            dst.copy_from_slice(&self.data[self.tail..self.tail + dst.len()]);
        }
        self.tail = (self.tail + dst.len()) & (N - 1);
        self.len -= dst.len();
        true
    }
}

impl<const N: usize> Default for ByteRing<N> {
    fn default() -> Self {
        Self::new()
    }
}
