use std::{
    fs,
    io::{self, Read},
    path::Path,
};

use base16ct::lower::encode_string;
use sha2::{Digest, Sha256};

use crate::{data::HashResult, error::AnalysisError};

pub const HASH_ALGORITHM: &str = "SHA-256";
pub const HASH_CHUNK_SIZE: usize = 8 * 1024;
const BREAKDOWN_WIDTH: usize = 16;

/// Hashes the file at `path`, calling `on_progress` with a percentage after
/// every chunk.
pub fn hash_file(
    path: &Path,
    on_progress: impl FnMut(f64),
) -> Result<HashResult, AnalysisError> {
    let file = fs::File::open(path)?;
    let size = file.metadata()?.len();
    hash_reader(file, size, on_progress)
}

/// Streams `reader` through SHA-256 in fixed-size chunks.
///
/// `total` is the expected length and only drives progress reporting; the
/// reported `file_size` is what was actually read. A zero-length input
/// reports 100% once instead of dividing by zero.
pub fn hash_reader(
    mut reader: impl Read,
    total: u64,
    mut on_progress: impl FnMut(f64),
) -> Result<HashResult, AnalysisError> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_CHUNK_SIZE];
    let mut processed: u64 = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        hasher.update(&buf[..n]);
        processed += n as u64;
        if total > 0 {
            on_progress((processed as f64 / total as f64 * 100.0).min(100.0));
        }
    }
    on_progress(100.0);

    let rv: [u8; 32] = hasher.finalize().into();
    let hash = encode_string(&rv);
    Ok(HashResult {
        algorithm: HASH_ALGORITHM.to_string(),
        file_size: processed,
        file_size_display: format!("{} bytes", group_thousands(processed)),
        hash_breakdown: breakdown(&hash),
        hash,
    })
}

fn breakdown(hex: &str) -> Vec<String> {
    hex.as_bytes()
        .chunks(BREAKDOWN_WIDTH)
        // hex digits are ASCII
        .map(|c| String::from_utf8_lossy(c).into_owned())
        .collect()
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}
