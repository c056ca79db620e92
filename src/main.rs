use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::process;

use clap::Parser;

use emmap::{ChecksumPolicy, MapReadOptions, MapStream, Status};

/// Inspect a GZIP-wrapped CCP4/MRC density map.
#[derive(Parser)]
#[command(version)]
struct Cli {
  /// Input .map.gz file
  input: PathBuf,

  /// Feed the decoder this many bytes at a time
  #[arg(long = "chunk-size", default_value_t = 64 * 1024)]
  chunk_size: usize,

  /// Fail on checksum mismatches instead of warning
  #[arg(long = "strict", default_value_t = false)]
  strict: bool,

  /// Verbosity
  #[arg(long = "verbose", default_value_t = false)]
  verbose: bool,
}

/// Initializes the logger with verbosity given in `log_max_level`.
fn init_log(log_max_level: usize) {
  stderrlog::new()
    .module(module_path!())
    .quiet(false)
    .verbosity(log_max_level)
    .timestamp(stderrlog::Timestamp::Off)
    .init()
    .unwrap();
}

fn main() {
  let cli = Cli::parse();
  init_log(if cli.verbose { 2 } else { 1 });

  let mut file = match File::open(&cli.input) {
    Ok(f) => f,
    Err(err) => {
      eprintln!("cannot open {}: {}", cli.input.display(), err);
      process::exit(1);
    }
  };

  let options = MapReadOptions {
    checksum_policy: if cli.strict {
      ChecksumPolicy::Enforce
    } else {
      ChecksumPolicy::Warn
    },
    ..MapReadOptions::default()
  };

  let mut stream = MapStream::new(options);
  let mut chunk = vec![0u8; cli.chunk_size.max(1)];
  let map = loop {
    let n = match file.read(&mut chunk) {
      Ok(n) => n,
      Err(err) => {
        eprintln!("read error: {}", err);
        process::exit(1);
      }
    };
    if n == 0 {
      stream.finish();
    } else {
      stream.push(&chunk[..n]);
    }
    match stream.poll() {
      Ok(Status::Complete(map)) => break map,
      Ok(Status::NeedInput) => continue,
      Err(err) => {
        eprintln!("decode failed: {}", err);
        process::exit(1);
      }
    }
  };

  println!("{}", map);
}
