//! FIFO queue of outbound plaintext awaiting a writable socket.

use std::collections::VecDeque;

/// One queued chunk, plus how many of its bytes have already been
/// consumed from the front by earlier short writes.
struct Chunk {
    data: Vec<u8>,
    cursor: usize,
}

/// Ordered buffer of pending outbound plaintext.
///
/// Entries are consumed strictly front-to-back; an entry is removed
/// only once every byte of it has been consumed.  Empty chunks are
/// never stored, so the queue can never cause a zero-byte wire write.
#[derive(Default)]
pub(crate) struct WriteQueue {
    chunks: VecDeque<Chunk>,
}

impl WriteQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk.  The caller guarantees `data` is non-empty.
    pub fn push(&mut self, data: Vec<u8>) {
        debug_assert!(!data.is_empty());
        self.chunks.push_back(Chunk { data, cursor: 0 });
    }

    /// Unconsumed remainder of the front entry, if any.
    pub fn front(&self) -> Option<&[u8]> {
        self.chunks.front().map(|c| &c.data[c.cursor..])
    }

    /// Record that `n` bytes of the front entry were consumed.  A
    /// fully consumed entry is removed; a partial write just advances
    /// the cursor.
    pub fn advance(&mut self, n: usize) {
        if let Some(front) = self.chunks.front_mut() {
            front.cursor += n;
            debug_assert!(front.cursor <= front.data.len());
            if front.cursor >= front.data.len() {
                self.chunks.pop_front();
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total unconsumed bytes across all entries.
    pub fn pending(&self) -> usize {
        self.chunks.iter().map(|c| c.data.len() - c.cursor).sum()
    }

    pub fn clear(&mut self) {
        self.chunks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::WriteQueue;

    #[test]
    fn fifo_order() {
        let mut q = WriteQueue::new();
        q.push(b"abc".to_vec());
        q.push(b"de".to_vec());
        assert_eq!(q.front(), Some(&b"abc"[..]));
        q.advance(3);
        assert_eq!(q.front(), Some(&b"de"[..]));
        q.advance(2);
        assert_eq!(q.front(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn short_write_advances_cursor() {
        let mut q = WriteQueue::new();
        q.push(b"hello".to_vec());
        q.advance(2);
        assert_eq!(q.front(), Some(&b"llo"[..]));
        assert_eq!(q.pending(), 3);
        q.advance(1);
        assert_eq!(q.front(), Some(&b"lo"[..]));
        q.advance(2);
        assert!(q.is_empty());
        assert_eq!(q.pending(), 0);
    }

    #[test]
    fn pending_spans_entries() {
        let mut q = WriteQueue::new();
        q.push(vec![0; 10]);
        q.push(vec![0; 4]);
        q.advance(6);
        assert_eq!(q.pending(), 8);
        q.clear();
        assert!(q.is_empty());
    }
}
