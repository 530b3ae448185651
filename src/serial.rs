//! Persistence: a compact little-endian binary encoding and a
//! self-describing JSON encoding of the full mutable state.
//!
//! Both formats capture the slot array, child-ring bytes, block table,
//! class-list heads, and the ordering flag, so a load rebuilds a
//! structurally identical trie: same ids, same values, same free rings.

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::node::{Block, Node, NodeInfo, BLOCK_SIZE};
use crate::DoubleArray;

const MAGIC: &[u8; 4] = b"DART";
const FORMAT_VERSION: u8 = 1;
const HEADER_SIZE: usize = 8;

/// On-disk encodings supported by [`DoubleArray::save`] and
/// [`DoubleArray::load`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// Compact little-endian binary with a magic/version header.
    Binary,
    /// Self-describing JSON with an explicit version field.
    Json,
}

/// Errors reported by save and load.
#[derive(Debug)]
pub enum SerialError {
    /// Reading or writing the underlying stream failed.
    Io(std::io::Error),
    /// JSON encoding or decoding failed.
    Json(serde_json::Error),
    /// The input does not start with the expected magic bytes.
    InvalidMagic,
    /// The input uses an unsupported format version.
    InvalidVersion,
    /// The input ended before the encoded state was complete.
    Truncated,
    /// The decoded state is internally inconsistent.
    Corrupt,
}

impl std::fmt::Display for SerialError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SerialError::Io(e) => write!(f, "i/o error: {e}"),
            SerialError::Json(e) => write!(f, "json error: {e}"),
            SerialError::InvalidMagic => write!(f, "invalid magic number"),
            SerialError::InvalidVersion => write!(f, "unsupported format version"),
            SerialError::Truncated => write!(f, "truncated data"),
            SerialError::Corrupt => write!(f, "inconsistent trie state"),
        }
    }
}

impl std::error::Error for SerialError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SerialError::Io(e) => Some(e),
            SerialError::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for SerialError {
    fn from(e: std::io::Error) -> Self {
        SerialError::Io(e)
    }
}

impl From<serde_json::Error> for SerialError {
    fn from(e: serde_json::Error) -> Self {
        SerialError::Json(e)
    }
}

/// The JSON shape of a persisted trie.
#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u8,
    ordered: bool,
    max_trial: i64,
    size: u64,
    capacity: u64,
    head_full: i64,
    head_closed: i64,
    head_open: i64,
    array: Vec<Node>,
    infos: Vec<NodeInfo>,
    blocks: Vec<Block>,
    reject: Vec<i64>,
}

impl DoubleArray {
    /// Writes the trie to `sink` in the chosen format.
    pub fn save<W: Write>(&self, mut sink: W, format: Format) -> Result<(), SerialError> {
        match format {
            Format::Binary => {
                let bytes = self.to_bytes();
                sink.write_all(&bytes)?;
                Ok(())
            }
            Format::Json => {
                let snapshot = Snapshot {
                    version: FORMAT_VERSION,
                    ordered: self.ordered,
                    max_trial: self.max_trial,
                    size: self.size as u64,
                    capacity: self.capacity as u64,
                    head_full: self.head_full,
                    head_closed: self.head_closed,
                    head_open: self.head_open,
                    array: self.array.clone(),
                    infos: self.infos.clone(),
                    blocks: self.blocks.clone(),
                    reject: self.reject.clone(),
                };
                serde_json::to_writer(sink, &snapshot)?;
                Ok(())
            }
        }
    }

    /// Reads a trie previously written by [`save`](Self::save) in the same
    /// format.
    pub fn load<R: Read>(mut source: R, format: Format) -> Result<Self, SerialError> {
        match format {
            Format::Binary => {
                let mut bytes = Vec::new();
                source.read_to_end(&mut bytes)?;
                Self::from_bytes(&bytes)
            }
            Format::Json => {
                let snapshot: Snapshot = serde_json::from_reader(source)?;
                if snapshot.version != FORMAT_VERSION {
                    return Err(SerialError::InvalidVersion);
                }
                let da = DoubleArray {
                    array: snapshot.array,
                    infos: snapshot.infos,
                    blocks: snapshot.blocks,
                    reject: snapshot.reject,
                    head_full: snapshot.head_full,
                    head_closed: snapshot.head_closed,
                    head_open: snapshot.head_open,
                    size: snapshot.size as usize,
                    capacity: snapshot.capacity as usize,
                    ordered: snapshot.ordered,
                    max_trial: snapshot.max_trial,
                };
                da.checked()
            }
        }
    }

    /// Saves to a file, creating or truncating it.
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P, format: Format) -> Result<(), SerialError> {
        let file = File::create(path)?;
        self.save(BufWriter::new(file), format)
    }

    /// Loads from a file written by [`save_to_path`](Self::save_to_path).
    pub fn load_from_path<P: AsRef<Path>>(path: P, format: Format) -> Result<Self, SerialError> {
        let file = File::open(path)?;
        Self::load(BufReader::new(file), format)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(
            HEADER_SIZE + 8 * 7 + self.size * 18 + self.blocks.len() * 48 + self.reject.len() * 8,
        );
        buf.extend_from_slice(MAGIC);
        buf.push(FORMAT_VERSION);
        buf.push(self.ordered as u8);
        buf.extend_from_slice(&[0u8; 2]); // reserved
        buf.extend_from_slice(&(self.size as u64).to_le_bytes());
        buf.extend_from_slice(&(self.capacity as u64).to_le_bytes());
        buf.extend_from_slice(&(self.blocks.len() as u64).to_le_bytes());
        buf.extend_from_slice(&self.max_trial.to_le_bytes());
        buf.extend_from_slice(&self.head_full.to_le_bytes());
        buf.extend_from_slice(&self.head_closed.to_le_bytes());
        buf.extend_from_slice(&self.head_open.to_le_bytes());
        for n in &self.array {
            buf.extend_from_slice(&n.value.to_le_bytes());
            buf.extend_from_slice(&n.check.to_le_bytes());
        }
        for info in &self.infos {
            buf.push(info.sibling);
            buf.push(info.child);
        }
        for b in &self.blocks {
            for field in [b.prev, b.next, b.num, b.reject, b.trial, b.ehead] {
                buf.extend_from_slice(&field.to_le_bytes());
            }
        }
        for r in &self.reject {
            buf.extend_from_slice(&r.to_le_bytes());
        }
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, SerialError> {
        if bytes.len() < HEADER_SIZE {
            return Err(SerialError::Truncated);
        }
        if &bytes[0..4] != MAGIC {
            return Err(SerialError::InvalidMagic);
        }
        if bytes[4] != FORMAT_VERSION {
            return Err(SerialError::InvalidVersion);
        }
        let ordered = bytes[5] != 0;

        let mut r = Reader {
            bytes,
            pos: HEADER_SIZE,
        };
        let size = r.u64()? as usize;
        let capacity = r.u64()? as usize;
        let nblocks = r.u64()? as usize;
        let max_trial = r.i64()?;
        let head_full = r.i64()?;
        let head_closed = r.i64()?;
        let head_open = r.i64()?;

        let mut array = Vec::with_capacity(size);
        for _ in 0..size {
            array.push(Node {
                value: r.i64()?,
                check: r.i64()?,
            });
        }
        let mut infos = Vec::with_capacity(size);
        for _ in 0..size {
            infos.push(NodeInfo {
                sibling: r.u8()?,
                child: r.u8()?,
            });
        }
        let mut blocks = Vec::with_capacity(nblocks);
        for _ in 0..nblocks {
            blocks.push(Block {
                prev: r.i64()?,
                next: r.i64()?,
                num: r.i64()?,
                reject: r.i64()?,
                trial: r.i64()?,
                ehead: r.i64()?,
            });
        }
        let mut reject = Vec::with_capacity(BLOCK_SIZE + 1);
        for _ in 0..=BLOCK_SIZE {
            reject.push(r.i64()?);
        }

        let da = DoubleArray {
            array,
            infos,
            blocks,
            reject,
            head_full,
            head_closed,
            head_open,
            size,
            capacity,
            ordered,
            max_trial,
        };
        da.checked()
    }

    /// Structural validation shared by both load paths.
    fn checked(self) -> Result<Self, SerialError> {
        let blocks = self.size / BLOCK_SIZE;
        if self.size == 0
            || self.size % BLOCK_SIZE != 0
            || self.array.len() != self.size
            || self.infos.len() != self.size
            || self.blocks.len() != blocks
            || self.reject.len() != BLOCK_SIZE + 1
            || self.capacity < self.size
            || self.max_trial < 1
        {
            return Err(SerialError::Corrupt);
        }
        for head in [self.head_full, self.head_closed, self.head_open] {
            if head < 0 || head as usize >= blocks {
                return Err(SerialError::Corrupt);
            }
        }
        for b in &self.blocks {
            if b.num < 0 || b.num > BLOCK_SIZE as i64 {
                return Err(SerialError::Corrupt);
            }
        }
        Ok(self)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn u8(&mut self) -> Result<u8, SerialError> {
        let b = *self.bytes.get(self.pos).ok_or(SerialError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn i64(&mut self) -> Result<i64, SerialError> {
        let end = self.pos + 8;
        let chunk = self
            .bytes
            .get(self.pos..end)
            .ok_or(SerialError::Truncated)?;
        self.pos = end;
        Ok(i64::from_le_bytes(chunk.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, SerialError> {
        Ok(self.i64()? as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DoubleArray {
        let mut da = DoubleArray::new();
        let keys: [&[u8]; 9] = [
            b"a",
            b"ab",
            b"abc",
            b"b",
            b"bc",
            b"",
            b"longer key with spaces",
            b"\xe5\xa4\xaa\xe9\x98\xb3",
            b"a\x00b",
        ];
        for (i, k) in keys.iter().enumerate() {
            da.insert(k, i as i64 * 3).unwrap();
        }
        da.delete(b"bc").unwrap();
        da
    }

    #[test]
    fn binary_round_trip_is_bit_exact() {
        let da = sample();
        let mut buf = Vec::new();
        da.save(&mut buf, Format::Binary).unwrap();
        let loaded = DoubleArray::load(&buf[..], Format::Binary).unwrap();
        assert_eq!(da, loaded);
    }

    #[test]
    fn json_round_trip_is_bit_exact() {
        let da = sample();
        let mut buf = Vec::new();
        da.save(&mut buf, Format::Json).unwrap();
        let loaded = DoubleArray::load(&buf[..], Format::Json).unwrap();
        assert_eq!(da, loaded);
    }

    #[test]
    fn loaded_trie_answers_queries_identically() {
        let mut da = DoubleArray::new();
        let words = [
            "a",
            "aa",
            "ab",
            "ac",
            "abc",
            "abd",
            "abcd",
            "abde",
            "abdf",
            "abcdef",
            "abcde",
            "abcdefghijklmn",
            "bcd",
            "b",
            "xyz",
            "太阳系",
            "太阳系土星",
            "太阳系水星",
            "太阳系火星",
            "新星",
            "新星文明",
            "新星军团",
            "新星联邦共和国",
            "this",
            "this is",
            "this is a sentence.",
        ];
        for (i, w) in words.iter().enumerate() {
            da.insert(w.as_bytes(), i as i64).unwrap();
        }

        for format in [Format::Binary, Format::Json] {
            let mut buf = Vec::new();
            da.save(&mut buf, format).unwrap();
            let loaded = DoubleArray::load(&buf[..], format).unwrap();
            for (i, w) in words.iter().enumerate() {
                assert_eq!(loaded.get(w.as_bytes()), Ok(i as i64));
            }
            let a: Vec<usize> = da.prefix_predict(b"").collect();
            let b: Vec<usize> = loaded.prefix_predict(b"").collect();
            assert_eq!(a, b);
            let a: Vec<usize> = da.prefix_match("abcdefg".as_bytes()).collect();
            let b: Vec<usize> = loaded.prefix_match("abcdefg".as_bytes()).collect();
            assert_eq!(a, b);
            assert_eq!(da.status(), loaded.status());
        }
    }

    #[test]
    fn loaded_trie_accepts_further_mutation() {
        let da = sample();
        let mut buf = Vec::new();
        da.save(&mut buf, Format::Binary).unwrap();
        let mut loaded = DoubleArray::load(&buf[..], Format::Binary).unwrap();
        loaded.insert(b"added later", 99).unwrap();
        loaded.delete(b"ab").unwrap();
        assert_eq!(loaded.get(b"added later"), Ok(99));
        assert_eq!(loaded.get(b"abc"), Ok(6));
        loaded.assert_consistent();
    }

    #[test]
    fn bad_magic_is_rejected() {
        let da = sample();
        let mut buf = Vec::new();
        da.save(&mut buf, Format::Binary).unwrap();
        buf[0] = b'X';
        assert!(matches!(
            DoubleArray::load(&buf[..], Format::Binary),
            Err(SerialError::InvalidMagic)
        ));
    }

    #[test]
    fn wrong_version_is_rejected() {
        let da = sample();
        let mut buf = Vec::new();
        da.save(&mut buf, Format::Binary).unwrap();
        buf[4] = 99;
        assert!(matches!(
            DoubleArray::load(&buf[..], Format::Binary),
            Err(SerialError::InvalidVersion)
        ));
    }

    #[test]
    fn truncated_input_is_rejected() {
        let da = sample();
        let mut buf = Vec::new();
        da.save(&mut buf, Format::Binary).unwrap();
        assert!(matches!(
            DoubleArray::load(&buf[..6], Format::Binary),
            Err(SerialError::Truncated)
        ));
        assert!(matches!(
            DoubleArray::load(&buf[..buf.len() - 1], Format::Binary),
            Err(SerialError::Truncated)
        ));
    }

    #[test]
    fn file_round_trip() {
        let da = sample();
        let dir = std::env::temp_dir();
        let path = dir.join("dynadart-serial-test.bin");
        da.save_to_path(&path, Format::Binary).unwrap();
        let loaded = DoubleArray::load_from_path(&path, Format::Binary).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(da, loaded);
    }
}
