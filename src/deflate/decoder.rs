/*! The resumable DEFLATE decoder.

Blocks are consumed one [`Inflator::poll`] at a time. Before a block is
attempted, the decoder snapshots the source cursor, the bit accumulator,
and the decoded length; if the buffered input runs dry mid-block the
snapshot is restored and the poll reports [`Step::NeedInput`] instead of
failing. The caller appends more input and retries, which re-decodes the
interrupted block from its first bit. Snapshots sit at block boundaries
only; a per-symbol checkpoint would have to capture mid-block table and
copy state, and a network refill amortises the occasional re-decode.

Decoded bytes for the current stream are retained contiguously: the map
layer consumes the whole byte stream anyway, and the retained tail doubles
as the 32 KiB back-reference window. */

use thiserror::Error;

use super::codepoints::{
  CODE_LENGTH_ORDER, DIST_CODEPOINTS, LENGTH_CODEPOINTS, MAX_DIST_CODE, MAX_LENGTH_CODE,
  MIN_LENGTH_CODE,
};
use super::{BlockType, END_OF_BLOCK, FIXED_DIST_TABLE, FIXED_LITLEN_TABLE, MAX_BACKREF_DISTANCE};
use crate::bit_reader::BitReader;
use crate::chunk_buffer::{ChunkBuffer, Missing};
use crate::huff_table::{HuffTableError, HuffmanTable};

#[derive(Error, Debug)]
pub enum DeflateReadError {
  /// Recoverable: the buffered input ran out mid-block while the stream
  /// is still open. Absorbed by `poll`; callers never observe it.
  #[error("ran out of buffered input mid-block")]
  Starved,
  #[error("unexpected end of DEFLATE data")]
  UnexpectedEndOfData,
  #[error("a reserved block type was used")]
  ReservedValueUsed,
  #[error("the LEN and NLEN fields of a stored block mismatched: {0:#06x}, {1:#06x}")]
  LenNlenMismatch(u16, u16),
  #[error("code length repeat at the start of the sequence has nothing to repeat")]
  RepeatWithoutPrevious,
  #[error("code length sequence overruns the declared alphabet size")]
  TooManyCodeLengths,
  #[error("value out of range of valid encoded values: {0}")]
  CodeOutOfRange(u16),
  #[error("no Huffman code matches the input bits")]
  InvalidHuffmanCode,
  #[error("tried to go back {0} bytes, but only {1} have been decoded")]
  BackrefPastStart(u16, usize),
  #[error("Huffman table construction failed: {0}")]
  BadTable(#[from] HuffTableError),
}

impl From<Missing> for DeflateReadError {
  fn from(missing: Missing) -> Self {
    match missing {
      Missing::MoreComing => Self::Starved,
      Missing::EndOfStream => Self::UnexpectedEndOfData,
    }
  }
}

/// What a single `poll` accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
  /// Input underflow at a block boundary; append more and poll again.
  NeedInput,
  /// One non-final block was decoded.
  BlockDone,
  /// The final block has been decoded and the reader is byte-aligned.
  Finished,
}

pub struct Inflator {
  bits: BitReader,
  out: Vec<u8>,
  done: bool,
}

impl Inflator {
  pub fn new() -> Self {
    Self {
      bits: BitReader::new(),
      out: Vec::new(),
      done: false,
    }
  }

  /// All bytes decoded so far.
  pub fn decoded(&self) -> &[u8] {
    &self.out
  }

  pub fn into_decoded(self) -> Vec<u8> {
    self.out
  }

  pub fn is_finished(&self) -> bool {
    self.done
  }

  /// Attempt the next block against the buffered input.
  pub fn poll(&mut self, src: &mut ChunkBuffer) -> Result<Step, DeflateReadError> {
    if self.done {
      return Ok(Step::Finished);
    }

    let mark = src.mark();
    let bit_state = self.bits.save();
    let decoded_len = self.out.len();

    match self.read_block(src) {
      Ok(is_final) => {
        if is_final {
          self.done = true;
          // Hand whole buffered bytes back so the caller can continue
          // with byte-level reads (the GZIP trailer) on the source.
          self.bits.reset(src);
          src.clear_mark();
          Ok(Step::Finished)
        } else {
          Ok(Step::BlockDone)
        }
      }
      Err(DeflateReadError::Starved) => {
        src.rewind_to(mark);
        self.bits.restore(bit_state);
        self.out.truncate(decoded_len);
        Ok(Step::NeedInput)
      }
      Err(err) => Err(err),
    }
  }

  /// Decode one complete block. Returns whether BFINAL was set.
  fn read_block(&mut self, src: &mut ChunkBuffer) -> Result<bool, DeflateReadError> {
    let is_final = self.bits.shift(src, 1)? == 1;
    let block_type = BlockType::try_from(self.bits.shift(src, 2)? as u8)
      .expect("a two-bit read is always a valid block type");

    match block_type {
      BlockType::Stored => self.read_stored_block(src)?,
      BlockType::Fixed => {
        self.decode_symbols(src, &FIXED_LITLEN_TABLE, Some(&FIXED_DIST_TABLE))?
      }
      BlockType::Dynamic => {
        let (litlen, dist) = self.read_dynamic_tables(src)?;
        self.decode_symbols(src, &litlen, dist.as_ref())?
      }
      BlockType::Reserved => return Err(DeflateReadError::ReservedValueUsed),
    }

    Ok(is_final)
  }

  /// RFC 1951 3.2.4: realign to the byte frame, then LEN, NLEN and the
  /// raw payload.
  fn read_stored_block(&mut self, src: &mut ChunkBuffer) -> Result<(), DeflateReadError> {
    self.bits.reset(src);
    let len = u16::from_le_bytes(src.take_array()?);
    let nlen = u16::from_le_bytes(src.take_array()?);
    if len != !nlen {
      return Err(DeflateReadError::LenNlenMismatch(len, nlen));
    }
    let payload = src.take(len as usize)?;
    self.out.extend_from_slice(payload);
    Ok(())
  }

  /// RFC 1951 3.2.7: the code-length code, then the run-length-encoded
  /// literal/length and distance code lengths.
  fn read_dynamic_tables(
    &mut self,
    src: &mut ChunkBuffer,
  ) -> Result<(HuffmanTable, Option<HuffmanTable>), DeflateReadError> {
    let hlit = self.bits.shift(src, 5)? as usize + 257;
    let hdist = self.bits.shift(src, 5)? as usize + 1;
    let hclen = self.bits.shift(src, 4)? as usize + 4;

    let mut cl_lengths = [0u8; 19];
    for &slot in CODE_LENGTH_ORDER.iter().take(hclen) {
      cl_lengths[slot] = self.bits.shift(src, 3)? as u8;
    }
    let cl_table = HuffmanTable::from_lengths(&cl_lengths)?;

    let mut lengths = vec![0u8; hlit + hdist];
    let mut filled = 0usize;
    while filled < lengths.len() {
      let sym = self.read_symbol(src, &cl_table)?;
      match sym {
        0..=15 => {
          lengths[filled] = sym as u8;
          filled += 1;
        }
        16 => {
          if filled == 0 {
            return Err(DeflateReadError::RepeatWithoutPrevious);
          }
          let repeat = 3 + self.bits.shift(src, 2)? as usize;
          let previous = lengths[filled - 1];
          if filled + repeat > lengths.len() {
            return Err(DeflateReadError::TooManyCodeLengths);
          }
          lengths[filled..filled + repeat]
            .iter_mut()
            .for_each(|l| *l = previous);
          filled += repeat;
        }
        17 | 18 => {
          let repeat = if sym == 17 {
            3 + self.bits.shift(src, 3)? as usize
          } else {
            11 + self.bits.shift(src, 7)? as usize
          };
          if filled + repeat > lengths.len() {
            return Err(DeflateReadError::TooManyCodeLengths);
          }
          // Entries are already zero.
          filled += repeat;
        }
        other => return Err(DeflateReadError::CodeOutOfRange(other)),
      }
    }

    let litlen = HuffmanTable::from_lengths(&lengths[..hlit])?;
    // A single zero-length distance entry means the block is all
    // literals; any distance decode against it is corrupt input.
    let dist = match HuffmanTable::from_lengths(&lengths[hlit..]) {
      Ok(table) => Some(table),
      Err(HuffTableError::EmptyAlphabet) => None,
      Err(err) => return Err(err.into()),
    };
    Ok((litlen, dist))
  }

  /// Decode literals and back-references until the end-of-block symbol.
  fn decode_symbols(
    &mut self,
    src: &mut ChunkBuffer,
    litlen: &HuffmanTable,
    dist: Option<&HuffmanTable>,
  ) -> Result<(), DeflateReadError> {
    loop {
      let sym = self.read_symbol(src, litlen)?;
      match sym {
        END_OF_BLOCK => return Ok(()),
        0..=255 => self.out.push(sym as u8),
        MIN_LENGTH_CODE..=MAX_LENGTH_CODE => {
          let length_cp = &LENGTH_CODEPOINTS[(sym - MIN_LENGTH_CODE) as usize];
          debug_assert_eq!(length_cp.code(), sym);
          let length = length_cp.read_value(&mut self.bits, src)?;
          let dist_table = dist.ok_or(DeflateReadError::InvalidHuffmanCode)?;
          let dist_sym = self.read_symbol(src, dist_table)?;
          if dist_sym > MAX_DIST_CODE {
            return Err(DeflateReadError::CodeOutOfRange(dist_sym));
          }
          let dist_cp = &DIST_CODEPOINTS[dist_sym as usize];
          debug_assert_eq!(dist_cp.code(), dist_sym);
          let distance = dist_cp.read_value(&mut self.bits, src)?;
          self.copy_backref(distance as usize, length as usize)?;
        }
        too_high => return Err(DeflateReadError::CodeOutOfRange(too_high)),
      }
    }
  }

  /// Decode one Huffman symbol by peeking the table's full width. Near
  /// the true end of a closed stream the peek can outrun the input even
  /// though a shorter code completes; prefix-freeness makes the
  /// zero-padded lookup safe in that case.
  fn read_symbol(
    &mut self,
    src: &mut ChunkBuffer,
    table: &HuffmanTable,
  ) -> Result<u16, DeflateReadError> {
    let peeked = match self.bits.peek(src, table.peek_width()) {
      Ok(peeked) => peeked,
      Err(Missing::MoreComing) => return Err(DeflateReadError::Starved),
      Err(Missing::EndOfStream) => {
        // A code longer than the remaining tail means the stream was cut
        // short, whatever the padding happens to look like.
        let available = self.bits.buffered();
        let (sym, code_len) = table
          .lookup(self.bits.peek_buffered())
          .ok_or(DeflateReadError::UnexpectedEndOfData)?;
        if code_len > available {
          return Err(DeflateReadError::UnexpectedEndOfData);
        }
        self.bits.drop_bits(code_len);
        return Ok(sym);
      }
    };
    let (sym, code_len) = table
      .lookup(peeked)
      .ok_or(DeflateReadError::InvalidHuffmanCode)?;
    self.bits.drop_bits(code_len);
    Ok(sym)
  }

  /// Copy `length` bytes from `distance` back in the decoded stream.
  /// Byte-by-byte on purpose: an overlapping copy (`distance < length`)
  /// re-reads bytes pushed by this same call, producing the run-length
  /// extension the format intends.
  fn copy_backref(&mut self, distance: usize, length: usize) -> Result<(), DeflateReadError> {
    if distance > self.out.len() {
      return Err(DeflateReadError::BackrefPastStart(
        distance as u16,
        self.out.len(),
      ));
    }
    debug_assert!(distance >= 1 && distance <= MAX_BACKREF_DISTANCE);
    let start = self.out.len() - distance;
    for i in 0..length {
      let byte = self.out[start + i];
      self.out.push(byte);
    }
    Ok(())
  }
}

impl Default for Inflator {
  fn default() -> Self {
    Self::new()
  }
}
