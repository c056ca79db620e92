/*! The orchestrator tying the layers together: an external producer
pushes byte chunks in, [`MapStream::poll`] drives the GZIP framer and the
inflator as far as the buffered input allows, and once the member is
finished the decoded stream is handed to the CCP4 reader.

The decode is single-threaded and cooperative. The producer only appends
while the decoder is suspended, so no synchronisation is involved;
abandoning the stream at any suspension point just drops the buffers. */

use log::warn;
use thiserror::Error;

use crate::ccp4::reader::{parse_header, read_map, Ccp4ReadError, MapOptions};
use crate::ccp4::{DensityMap, HEADER_BYTES};
use crate::chunk_buffer::ChunkBuffer;
use crate::gzip::reader::{GzipReadError, GzipReader, GzipStep};
use crate::gzip::ChecksumPolicy;

#[derive(Error, Debug)]
pub enum MapReadError {
  #[error(transparent)]
  Gzip(#[from] GzipReadError),
  #[error(transparent)]
  Ccp4(#[from] Ccp4ReadError),
  #[error("the pipeline has already produced its result")]
  Exhausted,
}

/// Everything the caller can tune about a decode.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapReadOptions {
  pub checksum_policy: ChecksumPolicy,
  pub map: MapOptions,
}

#[derive(Debug)]
pub enum Status {
  /// The buffered input is exhausted; push more chunks (or `finish`) and
  /// poll again.
  NeedInput,
  Complete(DensityMap),
}

pub struct MapStream {
  source: ChunkBuffer,
  gzip: GzipReader,
  options: MapReadOptions,
  header_validated: bool,
  done: bool,
}

impl MapStream {
  pub fn new(options: MapReadOptions) -> Self {
    Self {
      source: ChunkBuffer::new(),
      gzip: GzipReader::new(options.checksum_policy),
      options,
      header_validated: false,
      done: false,
    }
  }

  /// Hand a received chunk to the decoder. Ignored after `finish`.
  pub fn push(&mut self, chunk: &[u8]) {
    self.source.append(chunk);
  }

  /// Signal that no more chunks will arrive.
  pub fn finish(&mut self) {
    self.source.close();
  }

  /// Decode as far as the buffered input allows.
  pub fn poll(&mut self) -> Result<Status, MapReadError> {
    if self.done {
      return Err(MapReadError::Exhausted);
    }
    loop {
      match self.gzip.poll(&mut self.source)? {
        GzipStep::NeedInput => {
          self.source.compact();
          return Ok(Status::NeedInput);
        }
        GzipStep::Progressed => {
          // Validate the map header as soon as it has streamed in, so a
          // wrong magic or mode fails before the payload finishes.
          if !self.header_validated && self.gzip.decoded().len() >= HEADER_BYTES {
            parse_header(self.gzip.decoded())?;
            self.header_validated = true;
          }
        }
        GzipStep::Finished => {
          self.done = true;
          let trailing = self.source.available();
          if trailing > 0 {
            warn!("{} bytes after the gzip member were ignored", trailing);
          }
          let decoded = std::mem::replace(&mut self.gzip, GzipReader::new(ChecksumPolicy::Skip))
            .into_decoded();
          let map = read_map(&decoded, &self.options.map)?;
          return Ok(Status::Complete(map));
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::ccp4::StorageMode;
  use std::io::Write;

  fn gzip_with_flate2(plain: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(plain).unwrap();
    encoder.finish().unwrap()
  }

  /// A 4x4x4 constant mode-2 map, uncompressed.
  fn constant_map_bytes() -> Vec<u8> {
    let mut bytes = vec![0u8; HEADER_BYTES];
    let mut put_i32 = |word: usize, v: i32| {
      bytes[word * 4..word * 4 + 4].copy_from_slice(&v.to_le_bytes());
    };
    for word in 0..3 {
      put_i32(word, 4);
    }
    put_i32(3, 2);
    for word in 7..10 {
      put_i32(word, 4);
    }
    put_i32(16, 1);
    put_i32(17, 2);
    put_i32(18, 3);
    put_i32(52, crate::ccp4::MAP_MAGIC as i32);
    let mut put_f32 = |word: usize, v: f32| {
      bytes[word * 4..word * 4 + 4].copy_from_slice(&v.to_le_bytes());
    };
    for word in 10..13 {
      put_f32(word, 20.0);
    }
    for word in 13..16 {
      put_f32(word, 90.0);
    }
    put_f32(19, 1.0);
    put_f32(20, 1.0);
    put_f32(21, 1.0);
    for _ in 0..64 {
      bytes.extend_from_slice(&1.0f32.to_le_bytes());
    }
    bytes
  }

  fn decode_in_chunks(coded: &[u8], chunk_size: usize) -> Result<DensityMap, MapReadError> {
    let mut stream = MapStream::new(MapReadOptions::default());
    for chunk in coded.chunks(chunk_size) {
      stream.push(chunk);
      match stream.poll()? {
        Status::Complete(map) => return Ok(map),
        Status::NeedInput => continue,
      }
    }
    stream.finish();
    match stream.poll()? {
      Status::Complete(map) => Ok(map),
      Status::NeedInput => unreachable!("a finished stream never suspends"),
    }
  }

  #[test]
  fn decodes_a_synthetic_map_end_to_end() {
    let coded = gzip_with_flate2(&constant_map_bytes());
    let map = decode_in_chunks(&coded, usize::MAX).unwrap();
    assert_eq!(map.header.size, [4, 4, 4]);
    assert_eq!(map.header.mode, StorageMode::Float32);
    assert_eq!(map.data.len(), 64);
    assert!(map.data.iter().all(|v| *v == 1.0));
  }

  #[test]
  fn chunk_size_does_not_affect_the_result() {
    let coded = gzip_with_flate2(&constant_map_bytes());
    let whole = decode_in_chunks(&coded, usize::MAX).unwrap();
    for chunk_size in [1, 7, 64, 1000] {
      let chunked = decode_in_chunks(&coded, chunk_size).unwrap();
      assert_eq!(chunked.data, whole.data);
      assert_eq!(chunked.header.size, whole.header.size);
    }
  }

  #[test]
  fn header_errors_surface_before_the_payload_ends() {
    let mut plain = constant_map_bytes();
    plain[52 * 4] = b'X'; // break the magic
    let coded = gzip_with_flate2(&plain);

    let mut stream = MapStream::new(MapReadOptions::default());
    let mut failed_early = false;
    for chunk in coded.chunks(16) {
      stream.push(chunk);
      match stream.poll() {
        Err(MapReadError::Ccp4(Ccp4ReadError::BadMagic(_))) => {
          failed_early = true;
          break;
        }
        Ok(Status::NeedInput) => continue,
        other => panic!("unexpected poll outcome: {:?}", other.map(|_| ())),
      }
    }
    assert!(failed_early);
  }

  #[test]
  fn truncated_input_is_a_gzip_error() {
    let coded = gzip_with_flate2(&constant_map_bytes());
    let cut = &coded[..coded.len() / 2];
    let mut stream = MapStream::new(MapReadOptions::default());
    stream.push(cut);
    stream.finish();
    assert!(matches!(
      stream.poll(),
      Err(MapReadError::Gzip(_))
    ));
  }

  #[test]
  fn poll_after_completion_is_an_error() {
    let coded = gzip_with_flate2(&constant_map_bytes());
    let mut stream = MapStream::new(MapReadOptions::default());
    stream.push(&coded);
    stream.finish();
    assert!(matches!(stream.poll().unwrap(), Status::Complete(_)));
    assert!(matches!(stream.poll(), Err(MapReadError::Exhausted)));
  }
}
