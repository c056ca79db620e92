/*! An append-only byte queue fed by an external chunk producer and drained
by the decode pipeline. The producer may deliver chunks of any size at any
time; consumers that outrun the received bytes get a [`Missing`] outcome
instead of blocking, and retry after the next append.

Positions handed out by [`ChunkBuffer::mark`] are absolute stream offsets,
so they survive compaction of the already-consumed prefix. */

/// Outcome of a read that outran the bytes received so far.
///
/// `MoreComing` is recoverable: the producer has not closed the stream, so
/// the caller should suspend and retry after the next append. `EndOfStream`
/// means the bytes will never arrive; upper layers surface it as their
/// truncation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Missing {
  MoreComing,
  EndOfStream,
}

/// A saved read position, valid until the buffer is compacted past it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark(u64);

pub struct ChunkBuffer {
  data: Vec<u8>,
  /// Absolute stream position of `data[0]`.
  base: u64,
  /// Absolute read position. Invariant: `base <= cursor <= base + data.len()`.
  cursor: u64,
  closed: bool,
  /// Oldest position a caller may still rewind to. Compaction never
  /// discards bytes at or after it.
  mark: Option<u64>,
}

impl ChunkBuffer {
  pub fn new() -> Self {
    Self {
      data: Vec::new(),
      base: 0,
      cursor: 0,
      closed: false,
      mark: None,
    }
  }

  /// Append a chunk from the producer. Appends after `close` are ignored.
  pub fn append(&mut self, chunk: &[u8]) {
    if !self.closed {
      self.data.extend_from_slice(chunk);
    }
  }

  /// Latch end-of-stream. One-way: once closed, `Missing::EndOfStream` is
  /// the only underflow outcome.
  pub fn close(&mut self) {
    self.closed = true;
  }

  pub fn is_closed(&self) -> bool {
    self.closed
  }

  /// Bytes buffered beyond the read position.
  pub fn available(&self) -> usize {
    self.data.len() - self.index()
  }

  /// Absolute read position in the stream.
  pub fn position(&self) -> u64 {
    self.cursor
  }

  fn index(&self) -> usize {
    (self.cursor - self.base) as usize
  }

  fn underflow(&self) -> Missing {
    if self.closed {
      Missing::EndOfStream
    } else {
      Missing::MoreComing
    }
  }

  /// Read the next byte without consuming it.
  pub fn peek_byte(&self) -> Result<u8, Missing> {
    match self.data.get(self.index()) {
      Some(b) => Ok(*b),
      None => Err(self.underflow()),
    }
  }

  /// Consume and return the next byte.
  pub fn next_byte(&mut self) -> Result<u8, Missing> {
    let b = self.peek_byte()?;
    self.cursor += 1;
    Ok(b)
  }

  /// Consume and return the next `n` bytes, or report what is missing.
  /// All-or-nothing: on underflow the cursor does not move.
  pub fn take(&mut self, n: usize) -> Result<&[u8], Missing> {
    let start = self.index();
    if self.data.len() - start < n {
      return Err(self.underflow());
    }
    self.cursor += n as u64;
    Ok(&self.data[start..start + n])
  }

  /// Fixed-size variant of `take` for header fields.
  pub fn take_array<const N: usize>(&mut self) -> Result<[u8; N], Missing> {
    let bytes = self.take(N)?;
    Ok(bytes.try_into().unwrap())
  }

  /// Consume `n` bytes without looking at them.
  pub fn skip(&mut self, n: usize) -> Result<(), Missing> {
    self.take(n).map(|_| ())
  }

  /// Consume bytes up to and including the next NUL, returning the bytes
  /// before it. Used for the zero-terminated GZIP name/comment fields.
  pub fn take_until_nul(&mut self) -> Result<Vec<u8>, Missing> {
    let start = self.index();
    match self.data[start..].iter().position(|b| *b == 0) {
      Some(rel) => {
        let out = self.data[start..start + rel].to_vec();
        self.cursor += rel as u64 + 1;
        Ok(out)
      }
      None => Err(self.underflow()),
    }
  }

  /// Save the current read position for a later `rewind_to`. Setting a
  /// mark pins the underlying bytes against compaction; marks are taken
  /// one at a time, each replacing the previous.
  pub fn mark(&mut self) -> Mark {
    self.mark = Some(self.cursor);
    Mark(self.cursor)
  }

  pub fn clear_mark(&mut self) {
    self.mark = None;
  }

  /// Move the cursor to a previously saved mark. The cursor may currently
  /// sit before the mark (a bit reader's `reset` can step it back), so
  /// only the retained range is checked.
  pub fn rewind_to(&mut self, mark: Mark) {
    assert!(
      mark.0 >= self.base && mark.0 <= self.base + self.data.len() as u64,
      "rewind target {} outside retained range starting at {}",
      mark.0,
      self.base
    );
    self.cursor = mark.0;
  }

  /// Step the cursor back `n` bytes. Used by the bit reader to return
  /// whole buffered bytes at a byte-alignment point.
  pub fn rewind(&mut self, n: usize) {
    assert!(
      self.cursor >= self.base + n as u64,
      "rewind of {} bytes passes the retained prefix",
      n
    );
    self.cursor -= n as u64;
  }

  /// Discard the consumed prefix. Bytes at or after the outstanding mark
  /// are kept, plus a small slack behind the keep point so a bit reader
  /// holding whole bytes can still `rewind` through it.
  pub fn compact(&mut self) {
    const REWIND_SLACK: u64 = 8;
    let keep_from = self
      .mark
      .unwrap_or(self.cursor)
      .min(self.cursor)
      .saturating_sub(REWIND_SLACK)
      .max(self.base);
    let drop = (keep_from - self.base) as usize;
    if drop > 0 {
      self.data.drain(..drop);
      self.base = keep_from;
    }
  }
}

impl Default for ChunkBuffer {
  fn default() -> Self {
    Self::new()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn take_reports_stream_state() {
    let mut buf = ChunkBuffer::new();
    buf.append(&[1, 2, 3]);
    assert_eq!(buf.take(2).unwrap(), &[1, 2]);
    assert_eq!(buf.take(2), Err(Missing::MoreComing));
    // Failed take must not consume.
    assert_eq!(buf.take(1).unwrap(), &[3]);
    buf.close();
    assert_eq!(buf.take(1), Err(Missing::EndOfStream));
  }

  #[test]
  fn append_after_close_is_ignored() {
    let mut buf = ChunkBuffer::new();
    buf.append(&[1]);
    buf.close();
    buf.append(&[2, 3]);
    assert_eq!(buf.available(), 1);
  }

  #[test]
  fn nul_terminated_fields() {
    let mut buf = ChunkBuffer::new();
    buf.append(b"name");
    assert_eq!(buf.take_until_nul(), Err(Missing::MoreComing));
    buf.append(b"\0rest");
    assert_eq!(buf.take_until_nul().unwrap(), b"name");
    assert_eq!(buf.take(4).unwrap(), b"rest");
  }

  #[test]
  fn marks_survive_compaction() {
    let mut buf = ChunkBuffer::new();
    buf.append(&[0; 64]);
    buf.skip(10).unwrap();
    let mark = buf.mark();
    buf.skip(30).unwrap();
    buf.compact();
    buf.rewind_to(mark);
    assert_eq!(buf.position(), 10);
    assert_eq!(buf.available(), 54);
  }

  #[test]
  fn compaction_drops_consumed_prefix() {
    let mut buf = ChunkBuffer::new();
    buf.append(&[0; 100]);
    buf.skip(90).unwrap();
    buf.compact();
    // Slack for the bit reader stays rewindable.
    buf.rewind(8);
    assert_eq!(buf.position(), 82);
    assert_eq!(buf.available(), 18);
  }

  #[test]
  fn absolute_positions_after_compaction() {
    let mut buf = ChunkBuffer::new();
    buf.append(&[7; 40]);
    buf.skip(20).unwrap();
    let mark = buf.mark();
    buf.compact();
    buf.append(&[9; 4]);
    buf.skip(20).unwrap();
    assert_eq!(buf.position(), 40);
    buf.rewind_to(mark);
    assert_eq!(buf.take(1).unwrap(), &[7]);
  }
}
