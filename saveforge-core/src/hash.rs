//! Content fingerprinting with size-tiered strategies.
//!
//! The fingerprint is SHA-256 over the sequence of per-chunk SHA-256
//! digests (fixed 4 MiB chunks). Chunk boundaries never move, so every
//! strategy produces the same value for the same bytes; tier selection is
//! purely a performance decision.

use crate::error::{Error, Result};
use crate::models::Fingerprint;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

/// Fixed chunk size shared by all strategies.
pub const CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Files below this are read whole and hashed in one pass.
pub const DIRECT_THRESHOLD: u64 = 256 * 1024;

/// Files above this hash their chunks on the rayon pool.
pub const PARALLEL_THRESHOLD: u64 = 64 * 1024 * 1024;

/// Chunks held in memory at once during parallel hashing.
const PARALLEL_BATCH: usize = 8;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashStrategy {
    Direct,
    Streamed,
    Parallel,
}

impl HashStrategy {
    pub fn for_size(size: u64) -> Self {
        if size < DIRECT_THRESHOLD {
            HashStrategy::Direct
        } else if size <= PARALLEL_THRESHOLD {
            HashStrategy::Streamed
        } else {
            HashStrategy::Parallel
        }
    }
}

/// Fingerprint a file, selecting the strategy by size tier.
///
/// Transient I/O failures (file locked mid-save, permission race) retry
/// with a short doubling backoff before surfacing `HashComputationFailed`.
pub fn fingerprint_file(path: &Path) -> Result<Fingerprint> {
    let mut delay = RETRY_BASE;
    let mut last_err = None;

    for attempt in 1..=MAX_ATTEMPTS {
        match try_fingerprint(path) {
            Ok(fp) => return Ok(fp),
            Err(e) => {
                tracing::debug!(
                    "hash attempt {}/{} failed for {:?}: {}",
                    attempt,
                    MAX_ATTEMPTS,
                    path,
                    e
                );
                last_err = Some(e);
                if attempt < MAX_ATTEMPTS {
                    std::thread::sleep(delay);
                    delay *= 2;
                }
            }
        }
    }

    Err(Error::HashComputationFailed {
        path: path.to_path_buf(),
        source: last_err.unwrap_or_else(|| std::io::Error::other("hash failed")),
    })
}

fn try_fingerprint(path: &Path) -> std::io::Result<Fingerprint> {
    let size = std::fs::metadata(path)?.len();
    match HashStrategy::for_size(size) {
        HashStrategy::Direct => fingerprint_direct(path),
        HashStrategy::Streamed => fingerprint_streamed(path),
        HashStrategy::Parallel => fingerprint_parallel(path),
    }
}

/// Hash bytes already in memory. Used by the direct tier and by tests.
pub fn fingerprint_bytes(data: &[u8]) -> Fingerprint {
    let mut outer = Sha256::new();
    for chunk in data.chunks(CHUNK_SIZE) {
        outer.update(Sha256::digest(chunk));
    }
    if data.is_empty() {
        outer.update(Sha256::digest([]));
    }
    Fingerprint(hex::encode(outer.finalize()))
}

fn fingerprint_direct(path: &Path) -> std::io::Result<Fingerprint> {
    let data = std::fs::read(path)?;
    Ok(fingerprint_bytes(&data))
}

fn fingerprint_streamed(path: &Path) -> std::io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut outer = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut read_any = false;

    loop {
        let n = read_chunk(&mut file, &mut buf)?;
        if n == 0 {
            break;
        }
        read_any = true;
        outer.update(Sha256::digest(&buf[..n]));
    }

    if !read_any {
        outer.update(Sha256::digest([]));
    }
    Ok(Fingerprint(hex::encode(outer.finalize())))
}

fn fingerprint_parallel(path: &Path) -> std::io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let mut outer = Sha256::new();
    let mut read_any = false;

    loop {
        // Read a bounded batch of chunks, hash them on the pool, fold the
        // digests in order.
        let mut batch: Vec<Vec<u8>> = Vec::with_capacity(PARALLEL_BATCH);
        for _ in 0..PARALLEL_BATCH {
            let mut buf = vec![0u8; CHUNK_SIZE];
            let n = read_chunk(&mut file, &mut buf)?;
            if n == 0 {
                break;
            }
            buf.truncate(n);
            batch.push(buf);
        }
        if batch.is_empty() {
            break;
        }
        read_any = true;

        let digests: Vec<[u8; 32]> = batch
            .par_iter()
            .map(|chunk| Sha256::digest(chunk).into())
            .collect();
        for digest in digests {
            outer.update(digest);
        }
    }

    if !read_any {
        outer.update(Sha256::digest([]));
    }
    Ok(Fingerprint(hex::encode(outer.finalize())))
}

/// Fill `buf` as far as the stream allows; short reads only at EOF.
fn read_chunk(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match file.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
