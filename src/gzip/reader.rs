/*! Streaming reader for a single RFC 1952 member.

The reader is a small state machine (header, compressed blocks, trailer)
driven by [`GzipReader::poll`]. Header and trailer parses follow the same
retry discipline as the block decoder: take a mark, parse, and on input
underflow rewind and report `NeedInput` so the whole stage is re-attempted
once more bytes arrive. Multi-member concatenation is not handled; the
CCP4 archive use case delivers exactly one member. */

use log::warn;
use thiserror::Error;

use super::{
  calc_crc32, ChecksumPolicy, GZFlags, GZXFlags, MemberHeader, MemberTrailer, OSType, CM_DEFLATE,
  GZIP_ID1, GZIP_ID2,
};
use crate::chunk_buffer::{ChunkBuffer, Missing};
use crate::deflate::decoder::{DeflateReadError, Inflator, Step};

#[derive(Error, Debug)]
pub enum GzipReadError {
  #[error("gzip magic bytes invalid. Expected 1f 8b, got {0:02x} {1:02x}")]
  InvalidMagicBytes(u8, u8),
  #[error("gzip compression byte invalid. Expected 8, got {0}")]
  InvalidCMByte(u8),
  #[error("Reserved bits on GZFlags were set: {:b}", .0)]
  InvalidFLGs(GZFlags),
  #[error("header CRC16 mismatch: record says {0:#06x}, but calculated {1:#06x}")]
  HeaderCrcMismatch(u16, u16),
  #[error("CRC32 mismatch: record says {0:#010x}, but calculated {1:#010x}")]
  CRC32Mismatch(u32, u32),
  #[error("data size mismatch: record says {} bytes, but data has {} bytes", .0, .1)]
  IsizeMismatch(u32, u32),
  #[error("gzip stream ended before the member was complete")]
  Truncated,
  /// Recoverable input underflow; absorbed by `poll`.
  #[error("ran out of buffered input")]
  Starved,
  #[error(transparent)]
  Deflate(#[from] DeflateReadError),
}

impl From<Missing> for GzipReadError {
  fn from(missing: Missing) -> Self {
    match missing {
      Missing::MoreComing => Self::Starved,
      Missing::EndOfStream => Self::Truncated,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GzipStep {
  /// Input underflow; append more and poll again.
  NeedInput,
  /// A header, block, or trailer stage advanced.
  Progressed,
  /// The member (including its trailer) has been fully consumed.
  Finished,
}

enum Stage {
  Header,
  Blocks,
  Trailer,
  Done,
}

pub struct GzipReader {
  stage: Stage,
  policy: ChecksumPolicy,
  header: Option<MemberHeader>,
  trailer: Option<MemberTrailer>,
  inflator: Inflator,
}

impl GzipReader {
  pub fn new(policy: ChecksumPolicy) -> Self {
    Self {
      stage: Stage::Header,
      policy,
      header: None,
      trailer: None,
      inflator: Inflator::new(),
    }
  }

  pub fn header(&self) -> Option<&MemberHeader> {
    self.header.as_ref()
  }

  pub fn trailer(&self) -> Option<&MemberTrailer> {
    self.trailer.as_ref()
  }

  /// Bytes decoded from the member payload so far.
  pub fn decoded(&self) -> &[u8] {
    self.inflator.decoded()
  }

  pub fn into_decoded(self) -> Vec<u8> {
    self.inflator.into_decoded()
  }

  pub fn is_finished(&self) -> bool {
    matches!(self.stage, Stage::Done)
  }

  /// Advance the member decode as far as one stage allows.
  pub fn poll(&mut self, src: &mut ChunkBuffer) -> Result<GzipStep, GzipReadError> {
    match self.stage {
      Stage::Header => {
        let mark = src.mark();
        match self.parse_header(src) {
          Ok(header) => {
            self.header = Some(header);
            self.stage = Stage::Blocks;
            src.clear_mark();
            Ok(GzipStep::Progressed)
          }
          Err(GzipReadError::Starved) => {
            src.rewind_to(mark);
            Ok(GzipStep::NeedInput)
          }
          Err(err) => Err(err),
        }
      }
      Stage::Blocks => match self.inflator.poll(src)? {
        Step::NeedInput => Ok(GzipStep::NeedInput),
        Step::BlockDone => Ok(GzipStep::Progressed),
        Step::Finished => {
          self.stage = Stage::Trailer;
          Ok(GzipStep::Progressed)
        }
      },
      Stage::Trailer => {
        let mark = src.mark();
        match self.read_trailer(src) {
          Ok(trailer) => {
            self.check_trailer(&trailer)?;
            self.trailer = Some(trailer);
            self.stage = Stage::Done;
            src.clear_mark();
            Ok(GzipStep::Finished)
          }
          Err(GzipReadError::Starved) => {
            src.rewind_to(mark);
            Ok(GzipStep::NeedInput)
          }
          Err(err) => Err(err),
        }
      }
      Stage::Done => Ok(GzipStep::Finished),
    }
  }

  fn parse_header(&self, src: &mut ChunkBuffer) -> Result<MemberHeader, GzipReadError> {
    let fixed: [u8; 10] = src.take_array()?;

    let (id1, id2) = (fixed[0], fixed[1]);
    if id1 != GZIP_ID1 || id2 != GZIP_ID2 {
      return Err(GzipReadError::InvalidMagicBytes(id1, id2));
    }
    let cm = fixed[2];
    if cm != CM_DEFLATE {
      return Err(GzipReadError::InvalidCMByte(cm));
    }
    let flags = GZFlags::from_bits_truncate(fixed[3]);
    if !flags.is_valid() {
      return Err(GzipReadError::InvalidFLGs(flags));
    }
    let mtime = std::num::NonZeroU32::new(u32::from_le_bytes(fixed[4..8].try_into().unwrap()));
    let xflags = GZXFlags::from_bits_truncate(fixed[8]);
    let os = OSType::try_from(fixed[9]).unwrap_or(OSType::Unknown);

    let extra = if flags.contains(GZFlags::FEXTRA) {
      let xlen = u16::from_le_bytes(src.take_array()?);
      Some(src.take(xlen as usize)?.to_vec())
    } else {
      None
    };

    /* The name and comment fields are ISO 8859-1 per the RFC; lossy UTF-8
    keeps odd bytes from failing the whole decode. */
    let name = if flags.contains(GZFlags::FNAME) {
      Some(String::from_utf8_lossy(&src.take_until_nul()?).into_owned())
    } else {
      None
    };
    let comment = if flags.contains(GZFlags::FCOMMENT) {
      Some(String::from_utf8_lossy(&src.take_until_nul()?).into_owned())
    } else {
      None
    };

    let header = MemberHeader {
      flags,
      mtime,
      xflags,
      os,
      extra,
      name,
      comment,
    };

    if flags.contains(GZFlags::FHCRC) {
      let stored = u16::from_le_bytes(src.take_array()?);
      let computed = header.crc16();
      if stored != computed {
        match self.policy {
          ChecksumPolicy::Skip => {}
          ChecksumPolicy::Warn => {
            warn!(
              "gzip header CRC16 mismatch: stored {:#06x}, computed {:#06x}",
              stored, computed
            );
          }
          ChecksumPolicy::Enforce => {
            return Err(GzipReadError::HeaderCrcMismatch(stored, computed));
          }
        }
      }
    }

    Ok(header)
  }

  fn read_trailer(&self, src: &mut ChunkBuffer) -> Result<MemberTrailer, GzipReadError> {
    let crc32 = u32::from_le_bytes(src.take_array()?);
    let isize = u32::from_le_bytes(src.take_array()?);
    Ok(MemberTrailer { crc32, isize })
  }

  fn check_trailer(&self, trailer: &MemberTrailer) -> Result<(), GzipReadError> {
    if self.policy == ChecksumPolicy::Skip {
      return Ok(());
    }
    let decoded = self.inflator.decoded();
    let computed_crc = calc_crc32(decoded);
    let computed_len = decoded.len() as u32;
    if trailer.crc32 != computed_crc {
      match self.policy {
        ChecksumPolicy::Warn => warn!(
          "gzip CRC32 mismatch: trailer {:#010x}, computed {:#010x}",
          trailer.crc32, computed_crc
        ),
        _ => return Err(GzipReadError::CRC32Mismatch(trailer.crc32, computed_crc)),
      }
    }
    if trailer.isize != computed_len {
      match self.policy {
        ChecksumPolicy::Warn => warn!(
          "gzip ISIZE mismatch: trailer {}, decoded {} bytes",
          trailer.isize, computed_len
        ),
        _ => return Err(GzipReadError::IsizeMismatch(trailer.isize, computed_len)),
      }
    }
    Ok(())
  }
}
