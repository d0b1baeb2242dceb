// SPDX-License-Identifier: MIT

//! Fixed-size content digests and the streaming hasher used to build them.
//!
//! The hasher is fed heterogeneous data (argument strings, integers, whole
//! file contents) across a single invocation. [`Hasher::delimiter`] keeps
//! semantically distinct regions from colliding with each other — without it
//! `-I -O2` and `-I-O2` would hash identically.

use std::fmt;
use std::io::{self, Read};
use std::path::Path;

/// Width in bytes of a [`Digest`], matching the reference implementation.
pub const DIGEST_SIZE: usize = 20;

/// A fixed-width, opaque content digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Digest([u8; DIGEST_SIZE]);

impl Digest {
    /// Build a digest from raw bytes.
    pub fn from_bytes(bytes: [u8; DIGEST_SIZE]) -> Self {
        Self(bytes)
    }

    /// Borrow the raw bytes.
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }

    /// Render as a lowercase hex string.
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(DIGEST_SIZE * 2);
        for byte in &self.0 {
            s.push_str(&format!("{byte:02x}"));
        }
        s
    }

    /// Parse a lowercase (or mixed-case) hex string back into a digest.
    pub fn from_hex(s: &str) -> Option<Self> {
        if s.len() != DIGEST_SIZE * 2 {
            return None;
        }
        let mut bytes = [0u8; DIGEST_SIZE];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Streaming hasher over the cryptographic-strength primitive (BLAKE3,
/// truncated to [`DIGEST_SIZE`] bytes). The primitive itself is a black box;
/// this type's job is the delimiter discipline layered on top of it.
pub struct Hasher {
    inner: blake3::Hasher,
    debug_sink: Option<DebugSink>,
}

/// Where `append`/`delimiter` mirror their input when `CCACHE_DEBUG_HASH` (or
/// equivalent) debugging is enabled.
struct DebugSink {
    file: std::fs::File,
}

impl DebugSink {
    fn write_record(&mut self, tag: &str, bytes: &[u8]) {
        use std::io::Write;
        let _ = write!(self.file, "{tag} [{}B]", bytes.len());
        if let Ok(text) = std::str::from_utf8(bytes) {
            let _ = write!(self.file, " {text:?}");
        }
        let _ = writeln!(self.file);
    }
}

impl Hasher {
    /// Begin a new hash state.
    pub fn new() -> Self {
        Self {
            inner: blake3::Hasher::new(),
            debug_sink: None,
        }
    }

    /// Enable mirroring every hashed byte sequence to `path` (append mode),
    /// matching `CCACHE_DEBUG_HASH`.
    pub fn enable_debug(&mut self, path: &Path) -> io::Result<()> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        self.debug_sink = Some(DebugSink { file });
        Ok(())
    }

    /// Append raw bytes to the hash state.
    pub fn append(&mut self, bytes: &[u8]) -> &mut Self {
        self.inner.update(bytes);
        if let Some(sink) = &mut self.debug_sink {
            sink.write_record("data", bytes);
        }
        self
    }

    /// Append a region delimiter: a fixed sentinel followed by a
    /// NUL-terminated tag. Two calls with different tags, or the same tag at
    /// different points in the byte stream, can never produce the same
    /// sub-sequence as a differently-tagged call — this is what prevents
    /// cross-region collisions.
    pub fn delimiter(&mut self, tag: &str) -> &mut Self {
        const SENTINEL: &[u8] = b"\x00ccwrap-delim\x00";
        self.inner.update(SENTINEL);
        self.inner.update(tag.as_bytes());
        self.inner.update(&[0u8]);
        if let Some(sink) = &mut self.debug_sink {
            sink.write_record("delim", tag.as_bytes());
        }
        self
    }

    /// Append an integer, delimited so `12` followed by `3` can't collide
    /// with `1` followed by `23`.
    pub fn append_int(&mut self, value: u64) -> &mut Self {
        self.append(&value.to_be_bytes());
        self
    }

    /// Append the full contents of a file, streaming it in fixed chunks
    /// rather than reading it whole into memory.
    pub fn append_file(&mut self, path: &Path) -> io::Result<&mut Self> {
        let mut file = std::fs::File::open(path)?;
        let mut buf = [0u8; 64 * 1024];
        loop {
            let n = file.read(&mut buf)?;
            if n == 0 {
                break;
            }
            self.append(&buf[..n]);
        }
        Ok(self)
    }

    /// Clone the hash state so two independent extensions (direct mode,
    /// preprocessor mode) can branch off a shared prefix. Debug mirroring,
    /// if enabled, is not carried over to the clone.
    pub fn clone_state(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            debug_sink: None,
        }
    }

    /// Finalize and produce the truncated digest.
    pub fn finalize(&self) -> Digest {
        let hash = self.inner.finalize();
        let full = hash.as_bytes();
        let mut bytes = [0u8; DIGEST_SIZE];
        bytes.copy_from_slice(&full[..DIGEST_SIZE]);
        Digest(bytes)
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash the contents of a file in isolation (used by `--hash-file`).
pub fn hash_file(path: &Path) -> io::Result<Digest> {
    let mut hasher = Hasher::new();
    hasher.append_file(path)?;
    Ok(hasher.finalize())
}

#[cfg(test)]
#[path = "digest_tests.rs"]
mod tests;
