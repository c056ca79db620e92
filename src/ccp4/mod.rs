/*! Types for the CCP4/MRC map format: the fixed 1024-byte header, the
optional symmetry records, and the materialised density grid.

The header is 256 little-endian 32-bit words. Only the words this crate
interprets are listed; everything else is reserved or free-text labels.

   word  0- 2   NC, NR, NS      column/row/section counts (stored order)
   word  3      MODE            voxel storage mode
   word  4- 6   NCSTART..       starting grid index per stored axis
   word  7- 9   MX, MY, MZ      sampling intervals along the cell axes
   word 10-12   CELLA           cell dimensions in angstroms
   word 13-15   CELLB           cell angles in degrees
   word 16-18   MAPC/MAPR/MAPS  stored axis -> crystallographic axis
   word 19-21   AMIN/AMAX/AMEAN density statistics
   word 22      ISPG            space group number
   word 23      NSYMBT          bytes of symmetry records after the header
   word 24      LSKFLG          skew transform present flag
   word 25-33   SKWMAT          skew matrix (row major)
   word 34-36   SKWTRN          skew translation
   word 52      MAP             format magic, "MAP " as bytes
   word 54      ARMS            rms deviation from the mean
*/

pub mod reader;
pub mod symmetry;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::fmt;

/// Word 52, the bytes "MAP " read as a little-endian u32.
pub const MAP_MAGIC: u32 = 0x2050_414d;

pub const HEADER_BYTES: usize = 1024;

/// Symmetry records are fixed-width ASCII lines.
pub const SYMMETRY_RECORD_BYTES: usize = 80;

/// A symmetry operator as an affine transform over fractional
/// coordinates; bottom row is always (0, 0, 0, 1).
pub type SymOp = [[f32; 4]; 4];

/// Word 3. Other modes exist in the wild (16-bit integer, complex); this
/// decoder handles the two the EMDB archive delivers.
#[derive(Debug, Eq, PartialEq, TryFromPrimitive, IntoPrimitive, Copy, Clone)]
#[repr(i32)]
pub enum StorageMode {
  SignedByte = 0,
  Float32 = 2,
}

impl StorageMode {
  pub fn bytes_per_voxel(&self) -> usize {
    match self {
      StorageMode::SignedByte => 1,
      StorageMode::Float32 => 4,
    }
  }
}

/// Words 24-36, populated when LSKFLG is nonzero. Parsed but never
/// applied; consumers needing orthogonalised coordinates apply it
/// themselves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkewTransform {
  pub matrix: [[f32; 3]; 3],
  pub translation: [f32; 3],
}

#[derive(Debug, Clone)]
pub struct Ccp4Header {
  /// NC, NR, NS: extent in stored (fast, medium, slow) axis order.
  pub size: [u32; 3],
  pub mode: StorageMode,
  /// NCSTART, NRSTART, NSSTART.
  pub start: [i32; 3],
  /// MX, MY, MZ.
  pub intervals: [i32; 3],
  /// Cell dimensions in angstroms.
  pub cell_size: [f32; 3],
  /// Cell angles in degrees.
  pub cell_angles: [f32; 3],
  /// MAPC, MAPR, MAPS: a permutation of {1, 2, 3}.
  pub axes: [u32; 3],
  pub amin: f32,
  pub amax: f32,
  pub amean: f32,
  pub arms: f32,
  pub space_group: i32,
  /// NSYMBT: validated non-negative and a multiple of 4.
  pub symmetry_bytes: u32,
  pub skew: Option<SkewTransform>,
}

impl Ccp4Header {
  pub fn voxel_count(&self) -> usize {
    self.size.iter().map(|&n| n as usize).product()
  }

  /// The exact byte length of a map with this header: header, symmetry
  /// records, then the voxel payload.
  pub fn expected_total_bytes(&self) -> usize {
    HEADER_BYTES + self.symmetry_bytes as usize + self.mode.bytes_per_voxel() * self.voxel_count()
  }
}

/// A fully decoded map. Created by the reader, then immutable.
#[derive(Debug, Clone)]
pub struct DensityMap {
  pub header: Ccp4Header,
  /// Voxels in stored axis order, the first axis varying fastest.
  /// Invariant: `data.len() == header.voxel_count()`.
  pub data: Vec<f32>,
  pub symmetry_ops: Vec<SymOp>,
}

impl DensityMap {
  /// The density at stored-axis grid coordinates (column, row, section).
  pub fn value_at(&self, col: usize, row: usize, section: usize) -> f32 {
    let [nc, nr, _] = self.header.size;
    debug_assert!(col < nc as usize && row < nr as usize);
    self.data[(section * nr as usize + row) * nc as usize + col]
  }
}

impl fmt::Display for DensityMap {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let h = &self.header;
    writeln!(f, "CCP4 map:")?;
    writeln!(
      f,
      "  size    {} x {} x {} ({:?}, {} voxels)",
      h.size[0],
      h.size[1],
      h.size[2],
      h.mode,
      h.voxel_count()
    )?;
    writeln!(
      f,
      "  cell    {:.2} x {:.2} x {:.2} A, angles {:.1} {:.1} {:.1}",
      h.cell_size[0], h.cell_size[1], h.cell_size[2], h.cell_angles[0], h.cell_angles[1],
      h.cell_angles[2]
    )?;
    writeln!(
      f,
      "  axes    {:?} start {:?} intervals {:?}",
      h.axes, h.start, h.intervals
    )?;
    writeln!(
      f,
      "  density min {:.4} max {:.4} mean {:.4} rms {:.4}",
      h.amin, h.amax, h.amean, h.arms
    )?;
    write!(
      f,
      "  space group {}, {} symmetry operators",
      h.space_group,
      self.symmetry_ops.len()
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn magic_word_is_map_in_ascii() {
    assert_eq!(&MAP_MAGIC.to_le_bytes(), b"MAP ");
  }

  #[test]
  fn storage_mode_codes() {
    assert_eq!(StorageMode::try_from(0), Ok(StorageMode::SignedByte));
    assert_eq!(StorageMode::try_from(2), Ok(StorageMode::Float32));
    assert!(StorageMode::try_from(1).is_err());
    assert_eq!(StorageMode::Float32.bytes_per_voxel(), 4);
  }

  #[test]
  fn value_at_uses_fastest_first_layout() {
    let header = Ccp4Header {
      size: [2, 3, 2],
      mode: StorageMode::Float32,
      start: [0; 3],
      intervals: [2, 3, 2],
      cell_size: [1.0; 3],
      cell_angles: [90.0; 3],
      axes: [1, 2, 3],
      amin: 0.0,
      amax: 11.0,
      amean: 5.5,
      arms: 1.0,
      space_group: 1,
      symmetry_bytes: 0,
      skew: None,
    };
    let map = DensityMap {
      header,
      data: (0..12).map(|v| v as f32).collect(),
      symmetry_ops: Vec::new(),
    };
    assert_eq!(map.value_at(0, 0, 0), 0.0);
    assert_eq!(map.value_at(1, 0, 0), 1.0);
    assert_eq!(map.value_at(0, 1, 0), 2.0);
    assert_eq!(map.value_at(0, 0, 1), 6.0);
    assert_eq!(map.value_at(1, 2, 1), 11.0);
  }
}
