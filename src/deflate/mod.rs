/*! A streaming decoder for the DEFLATE format specified in RFC 1951
(https://tools.ietf.org/html/rfc1951). Only decompression is implemented;
the interesting part is that decoding is resumable: it can be driven over
an incomplete byte stream and picks up where it left off once more input
arrives. */

pub mod decoder;

mod codepoints;

use lazy_static::lazy_static;
use num_enum::TryFromPrimitive;

use crate::huff_table::HuffmanTable;

/// Symbol terminating every compressed block.
pub const END_OF_BLOCK: u16 = 256;

/// Largest back-reference distance the format can express.
pub const MAX_BACKREF_DISTANCE: usize = 32 * 1024;

/// The three-bit block header: BFINAL plus this two-bit type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum BlockType {
  Stored = 0,
  Fixed = 1,
  Dynamic = 2,
  Reserved = 3,
}

lazy_static! {
  /// Fixed literal/length code of RFC 1951 3.2.6: lengths 8 for 0-143,
  /// 9 for 144-255, 7 for 256-279, 8 for 280-287.
  pub static ref FIXED_LITLEN_TABLE: HuffmanTable = {
    let mut lengths = [0u8; 288];
    lengths[0..144].iter_mut().for_each(|l| *l = 8);
    lengths[144..256].iter_mut().for_each(|l| *l = 9);
    lengths[256..280].iter_mut().for_each(|l| *l = 7);
    lengths[280..288].iter_mut().for_each(|l| *l = 8);
    HuffmanTable::from_lengths(&lengths).expect("fixed literal table is well-formed")
  };

  /// Fixed distance code: all 32 codes five bits long.
  pub static ref FIXED_DIST_TABLE: HuffmanTable =
    HuffmanTable::from_lengths(&[5u8; 32]).expect("fixed distance table is well-formed");
}
