//! Tuple keys and their order-preserving binary encoding.
//!
//! A [`Key`] is a sequence of [`KeyPart`]s compared lexicographically. Parts of
//! different types order as `Bytes < String < Int < Float < Bool`.
//!
//! The encoding is what the backends store. Byte order of two encodings always
//! equals the order of the keys, and a key's encoding is a byte prefix of the
//! encoding of every key that extends it:
//!
//! ```text
//! Bytes   0x01 <bytes, 0x00 escaped as 0x00 0xFF> 0x00
//! String  0x02 <utf-8, escaped the same way>      0x00
//! Int     0x21 <8 bytes BE, sign bit flipped>
//! Float   0x22 <8 bytes BE, IEEE total-order transform>
//! Bool    0x26 (false) | 0x27 (true)
//! ```

use std::cmp::Ordering;
use std::fmt;

use crate::error::KVError;

const TAG_BYTES: u8 = 0x01;
const TAG_STRING: u8 = 0x02;
const TAG_INT: u8 = 0x21;
const TAG_FLOAT: u8 = 0x22;
const TAG_FALSE: u8 = 0x26;
const TAG_TRUE: u8 = 0x27;

const ESCAPE: u8 = 0xFF;
const TERMINATOR: u8 = 0x00;
const SIGN_BIT: u64 = 1 << 63;

/// One component of a [`Key`].
#[derive(Debug, Clone)]
pub enum KeyPart {
    Bytes(Vec<u8>),
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl KeyPart {
    fn rank(&self) -> u8 {
        match self {
            KeyPart::Bytes(_) => 0,
            KeyPart::String(_) => 1,
            KeyPart::Int(_) => 2,
            KeyPart::Float(_) => 3,
            KeyPart::Bool(_) => 4,
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            KeyPart::Bytes(b) => escaped_len(b),
            KeyPart::String(s) => escaped_len(s.as_bytes()),
            KeyPart::Int(_) | KeyPart::Float(_) => 9,
            KeyPart::Bool(_) => 1,
        }
    }

    fn encode_into(&self, out: &mut Vec<u8>) {
        match self {
            KeyPart::Bytes(b) => {
                out.push(TAG_BYTES);
                escape_into(b, out);
            }
            KeyPart::String(s) => {
                out.push(TAG_STRING);
                escape_into(s.as_bytes(), out);
            }
            KeyPart::Int(i) => {
                out.push(TAG_INT);
                out.extend_from_slice(&((*i as u64) ^ SIGN_BIT).to_be_bytes());
            }
            KeyPart::Float(f) => {
                let bits = f.to_bits();
                let ordered = if bits & SIGN_BIT != 0 { !bits } else { bits | SIGN_BIT };
                out.push(TAG_FLOAT);
                out.extend_from_slice(&ordered.to_be_bytes());
            }
            KeyPart::Bool(false) => out.push(TAG_FALSE),
            KeyPart::Bool(true) => out.push(TAG_TRUE),
        }
    }
}

fn escaped_len(bytes: &[u8]) -> usize {
    // tag + payload + one escape per NUL + terminator
    2 + bytes.len() + bytes.iter().filter(|&&b| b == TERMINATOR).count()
}

fn escape_into(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        out.push(b);
        if b == TERMINATOR {
            out.push(ESCAPE);
        }
    }
    out.push(TERMINATOR);
}

impl PartialEq for KeyPart {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for KeyPart {}

impl PartialOrd for KeyPart {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for KeyPart {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (KeyPart::Bytes(a), KeyPart::Bytes(b)) => a.cmp(b),
            (KeyPart::String(a), KeyPart::String(b)) => a.cmp(b),
            (KeyPart::Int(a), KeyPart::Int(b)) => a.cmp(b),
            (KeyPart::Float(a), KeyPart::Float(b)) => a.total_cmp(b),
            (KeyPart::Bool(a), KeyPart::Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Bytes(b) => {
                write!(f, "0x")?;
                for byte in b {
                    write!(f, "{:02x}", byte)?;
                }
                Ok(())
            }
            KeyPart::String(s) => write!(f, "{:?}", s),
            KeyPart::Int(i) => write!(f, "{}", i),
            KeyPart::Float(v) => write!(f, "{:?}", v),
            KeyPart::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(s: &str) -> Self {
        KeyPart::String(s.to_string())
    }
}

impl From<String> for KeyPart {
    fn from(s: String) -> Self {
        KeyPart::String(s)
    }
}

impl From<i64> for KeyPart {
    fn from(i: i64) -> Self {
        KeyPart::Int(i)
    }
}

impl From<i32> for KeyPart {
    fn from(i: i32) -> Self {
        KeyPart::Int(i64::from(i))
    }
}

impl From<u32> for KeyPart {
    fn from(i: u32) -> Self {
        KeyPart::Int(i64::from(i))
    }
}

impl From<f64> for KeyPart {
    fn from(v: f64) -> Self {
        KeyPart::Float(v)
    }
}

impl From<bool> for KeyPart {
    fn from(b: bool) -> Self {
        KeyPart::Bool(b)
    }
}

impl From<Vec<u8>> for KeyPart {
    fn from(b: Vec<u8>) -> Self {
        KeyPart::Bytes(b)
    }
}

impl From<&[u8]> for KeyPart {
    fn from(b: &[u8]) -> Self {
        KeyPart::Bytes(b.to_vec())
    }
}

/// An ordered sequence of key parts. The empty key is the root of the keyspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Key(Vec<KeyPart>);

/// Build a [`Key`] from a list of values convertible into [`KeyPart`]s.
///
/// ```
/// use batch_kv::key;
/// let k = key!["users", 42];
/// assert_eq!(k.len(), 2);
/// ```
#[macro_export]
macro_rules! key {
    () => {
        $crate::Key::default()
    };
    ($($part:expr),+ $(,)?) => {
        $crate::Key::new(vec![$($crate::KeyPart::from($part)),+])
    };
}

impl Key {
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Return a new key with `part` appended.
    pub fn child(&self, part: impl Into<KeyPart>) -> Key {
        let mut parts = self.0.clone();
        parts.push(part.into());
        Key(parts)
    }

    /// Whether `self` starts with every part of `prefix`.
    pub fn starts_with(&self, prefix: &Key) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Length of [`Key::encode`] without allocating.
    pub fn encoded_len(&self) -> usize {
        self.0.iter().map(KeyPart::encoded_len).sum()
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        for part in &self.0 {
            part.encode_into(&mut out);
        }
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Key, KVError> {
        let mut parts = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            let tag = bytes[pos];
            pos += 1;
            let part = match tag {
                TAG_BYTES => KeyPart::Bytes(unescape(bytes, &mut pos)?),
                TAG_STRING => {
                    let raw = unescape(bytes, &mut pos)?;
                    let s = String::from_utf8(raw)
                        .map_err(|e| KVError::InvalidKey(e.to_string()))?;
                    KeyPart::String(s)
                }
                TAG_INT => KeyPart::Int((read_u64(bytes, &mut pos)? ^ SIGN_BIT) as i64),
                TAG_FLOAT => {
                    let ordered = read_u64(bytes, &mut pos)?;
                    let bits = if ordered & SIGN_BIT != 0 {
                        ordered ^ SIGN_BIT
                    } else {
                        !ordered
                    };
                    KeyPart::Float(f64::from_bits(bits))
                }
                TAG_FALSE => KeyPart::Bool(false),
                TAG_TRUE => KeyPart::Bool(true),
                other => {
                    return Err(KVError::InvalidKey(format!(
                        "unknown tag 0x{:02x} at offset {}",
                        other,
                        pos - 1
                    )));
                }
            };
            parts.push(part);
        }

        Ok(Key(parts))
    }
}

fn unescape(bytes: &[u8], pos: &mut usize) -> Result<Vec<u8>, KVError> {
    let mut out = Vec::new();
    loop {
        let Some(&b) = bytes.get(*pos) else {
            return Err(KVError::InvalidKey("unterminated part".to_string()));
        };
        *pos += 1;
        if b != TERMINATOR {
            out.push(b);
            continue;
        }
        if bytes.get(*pos) == Some(&ESCAPE) {
            *pos += 1;
            out.push(TERMINATOR);
            continue;
        }
        return Ok(out);
    }
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Result<u64, KVError> {
    let end = *pos + 8;
    let raw: [u8; 8] = bytes
        .get(*pos..end)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| KVError::InvalidKey("truncated number".to_string()))?;
    *pos = end;
    Ok(u64::from_be_bytes(raw))
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", part)?;
        }
        write!(f, "]")
    }
}

impl From<Vec<KeyPart>> for Key {
    fn from(parts: Vec<KeyPart>) -> Self {
        Key(parts)
    }
}
