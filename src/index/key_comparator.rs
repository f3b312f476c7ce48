use std::cmp::Ordering;

use bytes::{BufMut, Bytes, BytesMut};

/// Total order over fixed-width keys. The tree never looks inside a key
/// except through this trait.
pub trait KeyComparator: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;

    /// Human-readable form used by tree dumps.
    fn display(&self, key: &[u8]) -> String {
        key.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// Orders keys as little-endian signed integers stored in their leading
/// bytes (8 bytes when available, else 4). Trailing padding is ignored.
pub struct IntegerComparator;

impl IntegerComparator {
    pub fn decode(key: &[u8]) -> i64 {
        let width = if key.len() >= 8 {
            8
        } else if key.len() >= 4 {
            4
        } else {
            key.len()
        };
        if width == 0 {
            return 0;
        }

        let mut buf = [0u8; 8];
        buf[..width].copy_from_slice(&key[..width]);
        // Sign-extend the narrower encodings.
        if width < 8 && key[width - 1] & 0x80 != 0 {
            buf[width..].fill(0xff);
        }
        i64::from_le_bytes(buf)
    }
}

impl KeyComparator for IntegerComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        Self::decode(a).cmp(&Self::decode(b))
    }

    fn display(&self, key: &[u8]) -> String {
        Self::decode(key).to_string()
    }
}

pub struct BytewiseComparator;

impl KeyComparator for BytewiseComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Encodes `value` the way `IntegerComparator` reads it, zero-padded (or
/// truncated) to `key_size` bytes.
pub fn encode_integer_key(value: i64, key_size: usize) -> Bytes {
    let mut buf = BytesMut::with_capacity(key_size.max(8));
    buf.put_i64_le(value);
    buf.resize(key_size, 0);
    buf.freeze()
}
