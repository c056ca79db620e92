/*! Types shared by the GZIP member framer: the RFC 1952 flag bytes,
header fields, and trailer. */

pub mod reader;

use bitflags::bitflags;
use crc32fast::Hasher;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::num::NonZeroU32;

/* Structure from RFC 1952

Header
   +---+---+---+---+---+---+---+---+---+---+
   |ID1|ID2|CM |FLG|     MTIME     |XFL|OS | (more-->)
   +---+---+---+---+---+---+---+---+---+---+
(if FLG.FEXTRA set)

   +---+---+=================================+
   | XLEN  |...XLEN bytes of "extra field"...| (more-->)
   +---+---+=================================+

(if FLG.FNAME set)

   +=========================================+
   |...original file name, zero-terminated...| (more-->)
   +=========================================+

(if FLG.FCOMMENT set)

   +===================================+
   |...file comment, zero-terminated...| (more-->)
   +===================================+

(if FLG.FHCRC set)

   +---+---+
   | CRC16 |
   +---+---+

   +=======================+
   |...compressed blocks...| (more-->)
   +=======================+

     0   1   2   3   4   5   6   7
   +---+---+---+---+---+---+---+---+
   |     CRC32     |     ISIZE     |
   +---+---+---+---+---+---+---+---+
*/

/// The signature is compared byte-wise as {0x1f, 0x8b}; as a little-endian
/// 16-bit word that is 0x8b1f.
pub const GZIP_ID1: u8 = 0x1f;
pub const GZIP_ID2: u8 = 0x8b;

/// The only compression method RFC 1952 defines.
pub const CM_DEFLATE: u8 = 8;

bitflags! {
    /** The bitfields corresponding to FLG in RFC 1952 */
    #[derive(Default)]
    pub struct GZFlags: u8 {
        const FTEXT     = 0b1 << 0;
        const FHCRC     = 0b1 << 1;
        const FEXTRA    = 0b1 << 2;
        const FNAME     = 0b1 << 3;
        const FCOMMENT  = 0b1 << 4;
        const RESERVED1 = 0b1 << 5;
        const RESERVED2 = 0b1 << 6;
        const RESERVED3 = 0b1 << 7;
    }
}

bitflags! {
    #[derive(Default)]
    /** The bitfields corresponding to XFL in RFC 1952 */
    pub struct GZXFlags: u8 {
        const XFL_NO_FLAGS = 0;
        const XFL_MAX_COMPRESSION = 2;
        const XFL_MAX_SPEED = 4;
    }
}

impl GZFlags {
  pub fn is_valid(&self) -> bool {
    let all_invalid_bits = GZFlags::from_bits_truncate(0b1110_0000);
    !self.intersects(all_invalid_bits)
  }
}

#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone)]
#[repr(u8)]
pub enum OSType {
  FatFS = 0,
  Amiga = 1,
  VMS = 2,
  Unix = 3,
  VMorCMS = 4,
  AtariTOS = 5,
  HpfsFS = 6,
  Macintosh = 7,
  ZSystem = 8,
  CPM = 9,
  Tops20 = 10,
  NtfsFS = 11,
  Qds = 12,
  AcornRISC = 13,
  Unknown = 255,
}

/// How strictly the member trailer (and FHCRC header check value) is held
/// against the decoded data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumPolicy {
  /// Consume the fields without looking at them.
  Skip,
  /// Compare and `log::warn!` on mismatch, but keep the result.
  Warn,
  /// Compare and fail decoding on mismatch.
  Enforce,
}

impl Default for ChecksumPolicy {
  fn default() -> Self {
    ChecksumPolicy::Warn
  }
}

/// Everything the member header carries ahead of the compressed blocks.
#[derive(Debug, Clone)]
pub struct MemberHeader {
  pub flags: GZFlags,
  pub mtime: Option<NonZeroU32>,
  pub xflags: GZXFlags,
  pub os: OSType,
  pub extra: Option<Vec<u8>>,
  pub name: Option<String>,
  pub comment: Option<String>,
}

impl MemberHeader {
  /// The header check value FHCRC covers: the low 16 bits of the CRC32 of
  /// every header byte up to (not including) the CRC16 field itself.
  pub fn crc16(&self) -> u16 {
    let mut hasher = Hasher::new();
    hasher.update(&[GZIP_ID1, GZIP_ID2, CM_DEFLATE, self.flags.bits()]);
    hasher.update(&self.mtime.map_or(0, NonZeroU32::get).to_le_bytes());
    hasher.update(&[self.xflags.bits(), u8::from(self.os)]);
    if let Some(extra) = &self.extra {
      hasher.update(&(extra.len() as u16).to_le_bytes());
      hasher.update(extra);
    }
    if let Some(name) = &self.name {
      hasher.update(name.as_bytes());
      hasher.update(&[0]);
    }
    if let Some(comment) = &self.comment {
      hasher.update(comment.as_bytes());
      hasher.update(&[0]);
    }
    (hasher.finalize() & 0xffff) as u16
  }
}

/// The eight bytes following the compressed blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberTrailer {
  pub crc32: u32,
  /// Uncompressed size modulo 2^32.
  pub isize: u32,
}

pub fn calc_crc32(data: &[u8]) -> u32 {
  let mut hasher = Hasher::new();
  hasher.update(data);
  hasher.finalize()
}
