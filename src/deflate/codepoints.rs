/*! Codepoints are used by RFC 1951 to encode distances and lengths. Each
codepoint consists of a code, sent through the appropriate Huffman tree,
possibly followed by a number of literal bits that disambiguate the final
value. */

/* The code tables from RFC 1951 3.2.5, reproduced to avoid extra ALT-TABs:

             Extra               Extra               Extra
        Code Bits Length(s) Code Bits Lengths   Code Bits Length(s)
        ---- ---- ------     ---- ---- -------   ---- ---- -------
         257   0     3       267   1   15,16     277   4   67-82
         258   0     4       268   1   17,18     278   4   83-98
         259   0     5       269   2   19-22     279   4   99-114
         260   0     6       270   2   23-26     280   4  115-130
         261   0     7       271   2   27-30     281   5  131-162
         262   0     8       272   2   31-34     282   5  163-194
         263   0     9       273   3   35-42     283   5  195-226
         264   0    10       274   3   43-50     284   5  227-257
         265   1  11,12      275   3   51-58     285   0    258
         266   1  13,14      276   3   59-66

              Extra           Extra               Extra
         Code Bits Dist  Code Bits   Dist     Code Bits Distance
         ---- ---- ----  ---- ----  ------    ---- ---- --------
           0   0    1     10   4     33-48    20    9   1025-1536
           1   0    2     11   4     49-64    21    9   1537-2048
           2   0    3     12   5     65-96    22   10   2049-3072
           3   0    4     13   5     97-128   23   10   3073-4096
           4   1   5,6    14   6    129-192   24   11   4097-6144
           5   1   7,8    15   6    193-256   25   11   6145-8192
           6   2   9-12   16   7    257-384   26   12  8193-12288
           7   2  13-16   17   7    385-512   27   12 12289-16384
           8   3  17-24   18   8    513-768   28   13 16385-24576
           9   3  25-32   19   8   769-1024   29   13 24577-32768
*/

use lazy_static::lazy_static;

use crate::bit_reader::BitReader;
use crate::chunk_buffer::{ChunkBuffer, Missing};

pub const MIN_LENGTH_CODE: u16 = 257;
pub const MAX_LENGTH_CODE: u16 = 285;
pub const MAX_DIST_CODE: u16 = 29;

/// Order in which the code-length-code lengths appear in a dynamic block
/// header (RFC 1951 3.2.7).
pub const CODE_LENGTH_ORDER: [usize; 19] = [
  16, 17, 18, 0, 8, 7, 9, 6, 10, 5, 11, 4, 12, 3, 13, 2, 14, 1, 15,
];

const LENGTH_BASE: [u16; 29] = [
  3, 4, 5, 6, 7, 8, 9, 10, 11, 13, 15, 17, 19, 23, 27, 31, 35, 43, 51, 59, 67, 83, 99, 115, 131,
  163, 195, 227, 258,
];
const LENGTH_EXTRA: [u8; 29] = [
  0, 0, 0, 0, 0, 0, 0, 0, 1, 1, 1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 4, 4, 4, 4, 5, 5, 5, 5, 0,
];

const DIST_BASE: [u16; 30] = [
  1, 2, 3, 4, 5, 7, 9, 13, 17, 25, 33, 49, 65, 97, 129, 193, 257, 385, 513, 769, 1025, 1537, 2049,
  3073, 4097, 6145, 8193, 12289, 16385, 24577,
];
const DIST_EXTRA: [u8; 30] = [
  0, 0, 0, 0, 1, 1, 2, 2, 3, 3, 4, 4, 5, 5, 6, 6, 7, 7, 8, 8, 9, 9, 10, 10, 11, 11, 12, 12, 13, 13,
];

lazy_static! {
  pub static ref LENGTH_CODEPOINTS: Vec<Codepoint> = LENGTH_BASE
    .iter()
    .zip(LENGTH_EXTRA.iter())
    .enumerate()
    .map(|(i, (&lo, &nbits))| Codepoint::new(MIN_LENGTH_CODE + i as u16, nbits, lo))
    .collect();
  pub static ref DIST_CODEPOINTS: Vec<Codepoint> = DIST_BASE
    .iter()
    .zip(DIST_EXTRA.iter())
    .enumerate()
    .map(|(i, (&lo, &nbits))| Codepoint::new(i as u16, nbits, lo))
    .collect();
}

/// One row of the tables above: base value plus a count of extra bits.
#[derive(Debug, Copy, Clone)]
pub struct Codepoint {
  code: u16,
  nbits: u8,
  lo: u16,
}

impl Codepoint {
  fn new(code: u16, nbits: u8, lo: u16) -> Self {
    Self { code, nbits, lo }
  }

  pub fn code(&self) -> u16 {
    self.code
  }

  /// Finish decoding this codepoint by pulling its extra bits.
  pub fn read_value(
    &self,
    bits: &mut BitReader,
    src: &mut ChunkBuffer,
  ) -> Result<u16, Missing> {
    let extra = bits.shift(src, self.nbits)?;
    Ok(self.lo + extra)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tables_cover_the_rfc_ranges() {
    assert_eq!(LENGTH_CODEPOINTS.len(), 29);
    assert_eq!(DIST_CODEPOINTS.len(), 30);
    // Endpoints from the RFC table.
    assert_eq!(LENGTH_CODEPOINTS[0].lo, 3);
    assert_eq!(LENGTH_CODEPOINTS[28].code, 285);
    assert_eq!(LENGTH_CODEPOINTS[28].lo, 258);
    assert_eq!(DIST_CODEPOINTS[29].lo, 24577);
    assert_eq!(DIST_CODEPOINTS[29].nbits, 13);
  }

  #[test]
  fn extra_bits_extend_the_base() {
    let mut src = ChunkBuffer::new();
    // Code 265 has base 11 and one extra bit.
    src.append(&[0b1]);
    let mut bits = BitReader::new();
    let value = LENGTH_CODEPOINTS[(265 - 257) as usize]
      .read_value(&mut bits, &mut src)
      .unwrap();
    assert_eq!(value, 12);
  }
}
