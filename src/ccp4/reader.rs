/*! Validation of the 1024-byte CCP4 header and materialisation of the
density grid from the decoded byte stream. */

use thiserror::Error;

use super::symmetry::{parse_operator, SymOpError};
use super::{
  Ccp4Header, DensityMap, SkewTransform, StorageMode, SymOp, HEADER_BYTES, MAP_MAGIC,
  SYMMETRY_RECORD_BYTES,
};

#[derive(Error, Debug)]
pub enum Ccp4ReadError {
  #[error("decoded stream too short for the 1024-byte header")]
  Truncated,
  #[error("CCP4 magic word invalid. Expected \"MAP \" (0x2050414d), got {0:#010x}")]
  BadMagic(u32),
  #[error("unsupported storage mode {0} (only modes 0 and 2 are read)")]
  UnsupportedMode(i32),
  #[error("non-positive map extent {0} x {1} x {2}")]
  NonPositiveExtent(i32, i32, i32),
  #[error("axis order words must be a permutation of 1,2,3, got {0}, {1}, {2}")]
  BadAxisPermutation(i32, i32, i32),
  #[error("non-finite density statistic in header")]
  NonFiniteStatistic,
  #[error("symmetry byte count {0} is not a non-negative multiple of 4")]
  SymmetryMisalignment(i32),
  #[error("total size mismatch: header implies {expected} bytes, stream has {actual}")]
  SizeMismatch { expected: usize, actual: usize },
  #[error("symmetry operator parse failed: {0}")]
  BadSymmetryOperator(#[from] SymOpError),
  #[error("symmetry expansion is not implemented, but the map has symmetry records")]
  SymmetryExpansionUnsupported,
}

/// Map-layer knobs; the pipeline carries them next to the checksum
/// policy.
#[derive(Debug, Clone, Copy)]
pub struct MapOptions {
  /// Parse symmetry records into matrices (blank records are skipped).
  pub parse_symmetry: bool,
  /// Reserved: tiling the unit cell from the asymmetric unit is not
  /// implemented, so `true` on a map with symmetry records is an error.
  pub expand_symmetry: bool,
}

impl Default for MapOptions {
  fn default() -> Self {
    Self {
      parse_symmetry: true,
      expand_symmetry: false,
    }
  }
}

fn word_i32(bytes: &[u8], word: usize) -> i32 {
  i32::from_le_bytes(bytes[word * 4..word * 4 + 4].try_into().unwrap())
}

fn word_f32(bytes: &[u8], word: usize) -> f32 {
  f32::from_le_bytes(bytes[word * 4..word * 4 + 4].try_into().unwrap())
}

/// Decode and validate the header from the first 1024 bytes.
pub fn parse_header(bytes: &[u8]) -> Result<Ccp4Header, Ccp4ReadError> {
  if bytes.len() < HEADER_BYTES {
    return Err(Ccp4ReadError::Truncated);
  }

  let magic = word_i32(bytes, 52) as u32;
  if magic != MAP_MAGIC {
    return Err(Ccp4ReadError::BadMagic(magic));
  }

  let mode_raw = word_i32(bytes, 3);
  let mode =
    StorageMode::try_from(mode_raw).map_err(|_| Ccp4ReadError::UnsupportedMode(mode_raw))?;

  let (nc, nr, ns) = (
    word_i32(bytes, 0),
    word_i32(bytes, 1),
    word_i32(bytes, 2),
  );
  if nc <= 0 || nr <= 0 || ns <= 0 {
    return Err(Ccp4ReadError::NonPositiveExtent(nc, nr, ns));
  }

  let (mapc, mapr, maps) = (
    word_i32(bytes, 16),
    word_i32(bytes, 17),
    word_i32(bytes, 18),
  );
  let mut sorted = [mapc, mapr, maps];
  sorted.sort_unstable();
  if sorted != [1, 2, 3] {
    return Err(Ccp4ReadError::BadAxisPermutation(mapc, mapr, maps));
  }

  let amin = word_f32(bytes, 19);
  let amax = word_f32(bytes, 20);
  let amean = word_f32(bytes, 21);
  let arms = word_f32(bytes, 54);
  if ![amin, amax, amean, arms].iter().all(|v| v.is_finite()) {
    return Err(Ccp4ReadError::NonFiniteStatistic);
  }

  let nsymbt = word_i32(bytes, 23);
  if nsymbt < 0 || nsymbt % 4 != 0 {
    return Err(Ccp4ReadError::SymmetryMisalignment(nsymbt));
  }

  let skew = if word_i32(bytes, 24) != 0 {
    let mut matrix = [[0.0f32; 3]; 3];
    for row in 0..3 {
      for col in 0..3 {
        matrix[row][col] = word_f32(bytes, 25 + row * 3 + col);
      }
    }
    let translation = [
      word_f32(bytes, 34),
      word_f32(bytes, 35),
      word_f32(bytes, 36),
    ];
    Some(SkewTransform {
      matrix,
      translation,
    })
  } else {
    None
  };

  Ok(Ccp4Header {
    size: [nc as u32, nr as u32, ns as u32],
    mode,
    start: [
      word_i32(bytes, 4),
      word_i32(bytes, 5),
      word_i32(bytes, 6),
    ],
    intervals: [
      word_i32(bytes, 7),
      word_i32(bytes, 8),
      word_i32(bytes, 9),
    ],
    cell_size: [
      word_f32(bytes, 10),
      word_f32(bytes, 11),
      word_f32(bytes, 12),
    ],
    cell_angles: [
      word_f32(bytes, 13),
      word_f32(bytes, 14),
      word_f32(bytes, 15),
    ],
    axes: [mapc as u32, mapr as u32, maps as u32],
    amin,
    amax,
    amean,
    arms,
    space_group: word_i32(bytes, 22),
    symmetry_bytes: nsymbt as u32,
    skew,
  })
}

/// Read a complete decoded map: header, symmetry records, voxels.
pub fn read_map(decoded: &[u8], options: &MapOptions) -> Result<DensityMap, Ccp4ReadError> {
  let header = parse_header(decoded)?;

  let expected = header.expected_total_bytes();
  if decoded.len() != expected {
    return Err(Ccp4ReadError::SizeMismatch {
      expected,
      actual: decoded.len(),
    });
  }

  let nsymbt = header.symmetry_bytes as usize;
  if options.expand_symmetry && nsymbt > 0 {
    return Err(Ccp4ReadError::SymmetryExpansionUnsupported);
  }

  let records = &decoded[HEADER_BYTES..HEADER_BYTES + nsymbt];
  let symmetry_ops = if options.parse_symmetry {
    parse_symmetry_records(records)?
  } else {
    Vec::new()
  };

  let payload = &decoded[HEADER_BYTES + nsymbt..];
  let data = match header.mode {
    StorageMode::Float32 => payload
      .chunks_exact(4)
      .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
      .collect(),
    StorageMode::SignedByte => payload.iter().map(|b| *b as i8 as f32).collect(),
  };

  Ok(DensityMap {
    header,
    data,
    symmetry_ops,
  })
}

/// Decode the 80-byte operator lines. Blank (space or NUL padded)
/// records are skipped; a trailing fragment shorter than a record must
/// also be blank.
fn parse_symmetry_records(records: &[u8]) -> Result<Vec<SymOp>, Ccp4ReadError> {
  let is_blank = |bytes: &[u8]| bytes.iter().all(|b| *b == 0 || *b == b' ');

  let mut ops = Vec::new();
  let mut chunks = records.chunks_exact(SYMMETRY_RECORD_BYTES);
  for record in &mut chunks {
    if is_blank(record) {
      continue;
    }
    // NUL padding inside a used record is trailing filler.
    let text = String::from_utf8_lossy(record);
    let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
    ops.push(parse_operator(text)?);
  }
  if !is_blank(chunks.remainder()) {
    return Err(Ccp4ReadError::SymmetryMisalignment(records.len() as i32));
  }
  Ok(ops)
}
