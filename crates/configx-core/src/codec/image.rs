//! Binary snapshot image format.
//!
//! ```text
//! [magic "CFGX":4][format:1][reserved:3][revision:8][checksum:32][content_len:8][content:N]
//!
//! content = [name_len:4][name][node]          node = root branch
//! node    = [tag:1] payload
//!   'N'  null
//!   'B'  [u8]            0 or 1
//!   'I'  [i64]
//!   'F'  [f64 bits]
//!   'S'  [len:4][utf8]
//!   'M'  [child_count:4] then per child [seg_len:4][seg][node]
//! ```
//!
//! Header size: 56 bytes.  All multi-byte integers are big-endian.  The
//! checksum is SHA-256 over the revision (8 bytes) followed by the content,
//! and is verified before any content is decoded.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::{Branch, ConfigNode, ConfigTree, Value};

/// Leading bytes of every image.
pub const MAGIC: [u8; 4] = *b"CFGX";

/// The only image layout this build reads and writes.
pub const FORMAT_VERSION: u8 = 1;

/// Bytes before the content section.
pub const HEADER_SIZE: usize = 4 + 1 + 3 + 8 + 32 + 8;

/// Deepest branch nesting an image may hold, counting the root branch.
/// Encoding refuses deeper trees and decoding rejects deeper images.
pub const MAX_DEPTH: usize = 1024;

const TAG_NULL: u8 = b'N';
const TAG_BOOL: u8 = b'B';
const TAG_INT: u8 = b'I';
const TAG_FLOAT: u8 = b'F';
const TAG_STR: u8 = b'S';
const TAG_BRANCH: u8 = b'M';

/// Errors that can occur while encoding or decoding an image.
#[derive(Debug, Error, PartialEq)]
pub enum CodecError {
    /// The data does not start with `CFGX`.
    #[error("not a snapshot image: bad magic {0:02X?}")]
    BadMagic([u8; 4]),

    /// The format byte names a layout this build does not understand.
    #[error("unsupported snapshot format: {0}")]
    UnsupportedFormat(u8),

    /// The data ends before a field it announces.
    #[error("truncated image: need {needed} bytes, got {available}")]
    Truncated { needed: usize, available: usize },

    /// The content is structurally invalid (unknown tag, bad UTF-8, etc.).
    #[error("malformed image: {0}")]
    Malformed(String),

    /// The stored checksum does not match the content.
    #[error("checksum mismatch: stored {stored}, computed {computed}")]
    ChecksumMismatch { stored: String, computed: String },

    /// A string or branch is too large for its 4-byte length prefix.
    #[error("{what} of length {len} does not fit in a snapshot image")]
    TooLarge { what: &'static str, len: usize },

    /// The tree nests branches deeper than [`MAX_DEPTH`].
    #[error("branches nested {depth} deep exceed the snapshot limit of {max}")]
    TooDeep { depth: usize, max: usize },
}

/// An encoded image, ready to be committed by a snapshot store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub name: String,
    pub revision: u64,
    pub checksum: [u8; 32],
    pub bytes: Vec<u8>,
}

impl EncodedImage {
    pub fn checksum_hex(&self) -> String {
        hex::encode(self.checksum)
    }
}

/// A decoded, checksum-verified image.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeImage {
    pub name: String,
    pub revision: u64,
    pub root: Branch,
    pub checksum: [u8; 32],
}

impl TreeImage {
    pub fn checksum_hex(&self) -> String {
        hex::encode(self.checksum)
    }

    /// Rebuilds the tree the image was taken from.
    pub fn into_tree(self) -> ConfigTree {
        ConfigTree::from_parts(self.name, self.root, self.revision)
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes `tree` into a snapshot image.
///
/// The encoding is deterministic: equal trees (same name, revision, and node
/// graph in the same order) always produce identical bytes.
///
/// # Errors
///
/// Returns [`CodecError::TooLarge`] if a string or branch exceeds `u32::MAX`
/// bytes or children, and [`CodecError::TooDeep`] if branches nest deeper
/// than [`MAX_DEPTH`], so no image is produced that could not be decoded.
///
/// # Examples
///
/// ```rust
/// use configx_core::codec::{decode_image, encode_image};
/// use configx_core::ConfigTree;
///
/// let mut tree = ConfigTree::new("app");
/// tree.insert("server.port", 8080).unwrap();
///
/// let encoded = encode_image(&tree).unwrap();
/// let image = decode_image(&encoded.bytes).unwrap();
/// assert_eq!(image.revision, 1);
/// assert!(image.into_tree().same_content(&tree));
/// ```
pub fn encode_image(tree: &ConfigTree) -> Result<EncodedImage, CodecError> {
    let mut content = Vec::new();
    write_length_prefixed(&mut content, tree.name().as_bytes(), "tree name")?;
    write_root(&mut content, tree.root())?;

    let checksum = compute_checksum(tree.revision(), &content);

    let mut bytes = Vec::with_capacity(HEADER_SIZE + content.len());
    bytes.extend_from_slice(&MAGIC);
    bytes.push(FORMAT_VERSION);
    bytes.extend_from_slice(&[0u8; 3]); // reserved
    bytes.extend_from_slice(&tree.revision().to_be_bytes());
    bytes.extend_from_slice(&checksum);
    bytes.extend_from_slice(&(content.len() as u64).to_be_bytes());
    bytes.extend_from_slice(&content);

    Ok(EncodedImage {
        name: tree.name().to_string(),
        revision: tree.revision(),
        checksum,
        bytes,
    })
}

/// Decodes and verifies a snapshot image.
///
/// # Errors
///
/// - [`CodecError::BadMagic`] / [`CodecError::UnsupportedFormat`] for foreign
///   data.
/// - [`CodecError::Truncated`] when `bytes` is shorter than announced.
/// - [`CodecError::ChecksumMismatch`] when the content was altered.
/// - [`CodecError::Malformed`] when verified content is still invalid.
pub fn decode_image(bytes: &[u8]) -> Result<TreeImage, CodecError> {
    require_len(bytes, HEADER_SIZE)?;

    let magic = read_array::<4>(bytes, 0)?;
    if magic != MAGIC {
        return Err(CodecError::BadMagic(magic));
    }
    let format = bytes[4];
    if format != FORMAT_VERSION {
        return Err(CodecError::UnsupportedFormat(format));
    }
    let revision = read_u64(bytes, 8)?;
    let stored = read_array::<32>(bytes, 16)?;
    let content_len = usize::try_from(read_u64(bytes, 48)?)
        .map_err(|_| CodecError::Malformed("content length overflows usize".to_string()))?;

    let needed = HEADER_SIZE
        .checked_add(content_len)
        .ok_or_else(|| CodecError::Malformed("content length overflows usize".to_string()))?;
    require_len(bytes, needed)?;
    if bytes.len() > needed {
        return Err(CodecError::Malformed(format!(
            "{} trailing bytes after content",
            bytes.len() - needed
        )));
    }
    let content = &bytes[HEADER_SIZE..needed];

    let computed = compute_checksum(revision, content);
    if computed != stored {
        return Err(CodecError::ChecksumMismatch {
            stored: hex::encode(stored),
            computed: hex::encode(computed),
        });
    }

    let mut reader = Reader { buf: content, pos: 0 };
    let name = reader.read_string("tree name")?;
    let root = reader.read_root()?;
    if reader.pos != content.len() {
        return Err(CodecError::Malformed("unconsumed bytes after root node".to_string()));
    }

    Ok(TreeImage {
        name,
        revision,
        root,
        checksum: stored,
    })
}

// ── Encoding ──────────────────────────────────────────────────────────────────

fn compute_checksum(revision: u64, content: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(revision.to_be_bytes());
    hasher.update(content);
    hasher.finalize().into()
}

/// Writes the root branch and everything below it.
///
/// Walks the tree with an explicit stack of child iterators, so nesting depth
/// is bounded by [`MAX_DEPTH`] rather than by the thread's stack.
fn write_root(buf: &mut Vec<u8>, root: &Branch) -> Result<(), CodecError> {
    write_branch_header(buf, root)?;
    let mut stack = vec![root.iter()];
    while let Some(children) = stack.last_mut() {
        let Some((name, child)) = children.next() else {
            stack.pop();
            continue;
        };
        write_length_prefixed(buf, name.as_bytes(), "key segment")?;
        match child {
            ConfigNode::Branch(branch) => {
                if stack.len() >= MAX_DEPTH {
                    return Err(CodecError::TooDeep {
                        depth: stack.len() + 1,
                        max: MAX_DEPTH,
                    });
                }
                write_branch_header(buf, branch)?;
                stack.push(branch.iter());
            }
            ConfigNode::Leaf(value) => write_value(buf, value)?,
        }
    }
    Ok(())
}

fn write_branch_header(buf: &mut Vec<u8>, branch: &Branch) -> Result<(), CodecError> {
    buf.push(TAG_BRANCH);
    write_u32_len(buf, branch.len(), "branch")
}

fn write_value(buf: &mut Vec<u8>, value: &Value) -> Result<(), CodecError> {
    match value {
        Value::Null => buf.push(TAG_NULL),
        Value::Bool(b) => {
            buf.push(TAG_BOOL);
            buf.push(u8::from(*b));
        }
        Value::Int(i) => {
            buf.push(TAG_INT);
            buf.extend_from_slice(&i.to_be_bytes());
        }
        Value::Float(f) => {
            buf.push(TAG_FLOAT);
            buf.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Value::Str(s) => {
            buf.push(TAG_STR);
            write_length_prefixed(buf, s.as_bytes(), "string value")?;
        }
    }
    Ok(())
}

fn write_u32_len(buf: &mut Vec<u8>, len: usize, what: &'static str) -> Result<(), CodecError> {
    let len32 = u32::try_from(len).map_err(|_| CodecError::TooLarge { what, len })?;
    buf.extend_from_slice(&len32.to_be_bytes());
    Ok(())
}

/// Writes a 4-byte length prefix followed by the bytes.
fn write_length_prefixed(buf: &mut Vec<u8>, bytes: &[u8], what: &'static str) -> Result<(), CodecError> {
    write_u32_len(buf, bytes.len(), what)?;
    buf.extend_from_slice(bytes);
    Ok(())
}

// ── Decoding ──────────────────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, n: usize, context: &str) -> Result<&[u8], CodecError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.buf.len())
            .ok_or_else(|| {
                CodecError::Malformed(format!(
                    "{context}: need {n} bytes at offset {}, {} left",
                    self.pos,
                    self.buf.len() - self.pos
                ))
            })?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u8(&mut self, context: &str) -> Result<u8, CodecError> {
        Ok(self.take(1, context)?[0])
    }

    fn read_u32(&mut self, context: &str) -> Result<u32, CodecError> {
        let b = self.take(4, context)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self, context: &str) -> Result<u64, CodecError> {
        let b = self.take(8, context)?;
        Ok(u64::from_be_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
    }

    /// Reads a 4-byte length prefix and then that many UTF-8 bytes.
    fn read_string(&mut self, context: &str) -> Result<String, CodecError> {
        let len = self.read_u32(context)? as usize;
        let bytes = self.take(len, context)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|e| CodecError::Malformed(format!("{context}: invalid UTF-8: {e}")))
    }

    /// Reads a non-branch payload for `tag`.
    fn read_value(&mut self, tag: u8) -> Result<Value, CodecError> {
        let value = match tag {
            TAG_NULL => Value::Null,
            TAG_BOOL => match self.read_u8("bool value")? {
                0 => Value::Bool(false),
                1 => Value::Bool(true),
                other => return Err(CodecError::Malformed(format!("bool byte 0x{other:02X}"))),
            },
            TAG_INT => Value::Int(self.read_u64("int value")? as i64),
            TAG_FLOAT => Value::Float(f64::from_bits(self.read_u64("float value")?)),
            TAG_STR => Value::Str(self.read_string("string value")?),
            other => return Err(CodecError::Malformed(format!("unknown node tag 0x{other:02X}"))),
        };
        Ok(value)
    }

    /// Reads the root branch.  Open branches live on an explicit stack, at
    /// most [`MAX_DEPTH`] of them, so hostile or very deep images fail with
    /// an error instead of exhausting the thread's stack.
    fn read_root(&mut self) -> Result<Branch, CodecError> {
        let tag = self.read_u8("node tag")?;
        if tag != TAG_BRANCH {
            self.read_value(tag)?;
            return Err(CodecError::Malformed("root node is not a branch".to_string()));
        }
        let mut stack = vec![OpenBranch {
            segment: String::new(),
            branch: Branch::new(),
            remaining: self.read_u32("child count")?,
        }];

        while let Some(open) = stack.last_mut() {
            if open.remaining == 0 {
                let Some(done) = stack.pop() else { break };
                match stack.last_mut() {
                    Some(parent) => {
                        parent.branch.insert(done.segment, ConfigNode::Branch(done.branch));
                    }
                    None => return Ok(done.branch),
                }
                continue;
            }
            open.remaining -= 1;

            let segment = self.read_string("key segment")?;
            if segment.is_empty() {
                return Err(CodecError::Malformed("empty key segment".to_string()));
            }
            if open.branch.contains(&segment) {
                return Err(CodecError::Malformed(format!("duplicate key segment {segment:?}")));
            }
            let tag = self.read_u8("node tag")?;
            if tag == TAG_BRANCH {
                if stack.len() >= MAX_DEPTH {
                    return Err(CodecError::Malformed(format!("nesting deeper than {MAX_DEPTH}")));
                }
                let remaining = self.read_u32("child count")?;
                stack.push(OpenBranch {
                    segment,
                    branch: Branch::new(),
                    remaining,
                });
            } else {
                let value = self.read_value(tag)?;
                open.branch.insert(segment, ConfigNode::Leaf(value));
            }
        }
        Err(CodecError::Malformed("branch stack underflow".to_string()))
    }
}

/// A branch whose children are still being read.
struct OpenBranch {
    /// Key under the parent; empty for the root.
    segment: String,
    branch: Branch,
    remaining: u32,
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn require_len(buf: &[u8], needed: usize) -> Result<(), CodecError> {
    if buf.len() < needed {
        Err(CodecError::Truncated {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

fn read_array<const N: usize>(buf: &[u8], offset: usize) -> Result<[u8; N], CodecError> {
    require_len(buf, offset + N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(&buf[offset..offset + N]);
    Ok(out)
}

fn read_u64(buf: &[u8], offset: usize) -> Result<u64, CodecError> {
    Ok(u64::from_be_bytes(read_array::<8>(buf, offset)?))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
