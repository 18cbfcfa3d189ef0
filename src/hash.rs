//! 64-bit hashing, key digests, and the scalar-to-index-key derivation rules.

use cityhash_rs::cityhash_110_64;
use md5::{Digest, Md5};

use crate::{value::Value, Error, Result};

/// Offset added to signed 64-bit values so that ordering is preserved when
/// the result is interpreted as an unsigned 64-bit hash.
const SIGNED_OFFSET: u64 = 1u64 << 63;

/// Stable, deterministic, non-cryptographic 64-bit hash of a byte string.
pub fn hash64(bytes: &[u8]) -> u64 {
    cityhash_110_64(bytes)
}

/// First 16 hex characters of the MD5 digest of `bytes`, used to disambiguate
/// hash collisions inside a leaf.
pub fn md5_digest16(bytes: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(32);
    for b in digest.iter() {
        hex.push_str(&format!("{:02x}", b));
    }
    hex.truncate(16);
    hex
}

/// Derive the canonical (keyString, hashKey) pair for a scalar value.
///
/// See the key derivation rules: signed/unsigned integers are offset by
/// 2^63, floats are scaled to four decimal digits of precision and then
/// treated as signed integers, strings hash via [hash64], and booleans map
/// to a two-valued enumeration. Non-scalar values are rejected.
pub fn type_to_index(value: &Value) -> Result<(String, u64)> {
    if !value.is_scalar() {
        return err_at!(
            UnsupportedIndexType,
            msg: "value kind {:?} cannot be used as an index key",
            value
        );
    }
    match value {
        Value::Int(i) => {
            let key = i.to_string();
            let hash_key = (*i as i64 as i128 + SIGNED_OFFSET as i128) as u64;
            Ok((key, hash_key))
        }
        Value::Uint(u) => {
            if *u > (i64::MAX as u64) {
                return err_at!(
                    UnsupportedIndexType,
                    msg: "unsigned value {} exceeds representable index range",
                    u
                );
            }
            let key = u.to_string();
            Ok((key, u + SIGNED_OFFSET))
        }
        Value::Float(f) => {
            let scaled = scale_float_to_i64(*f, 4);
            let key = scaled.to_string();
            let hash_key = (scaled as i128 + SIGNED_OFFSET as i128) as u64;
            Ok((key, hash_key))
        }
        Value::Str(s) => {
            let hash_key = hash64(s.as_bytes());
            Ok((s.clone(), hash_key))
        }
        Value::Bool(b) => {
            if *b {
                Ok(("true".to_string(), 1))
            } else {
                Ok(("false".to_string(), 2))
            }
        }
        Value::Null | Value::Bytes(_) | Value::Array(_) | Value::Object(_) => {
            unreachable!("is_scalar() guard above already rejected this kind")
        }
    }
}

/// Scale a float into an int64 keeping `precision` decimal digits, matching
/// the original engine's `ScaleFloat64toInt64`.
fn scale_float_to_i64(value: f64, precision: u32) -> i64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() as i64
}

/// Fixed fanout of every inner tree level (1..4).
pub const FANOUT: u64 = 65_536;

/// Number of leaf slots addressed by each child at `level` (1..4).
pub fn distance(level: u8) -> u64 {
    debug_assert!((1..=4).contains(&level));
    FANOUT.pow((4 - level) as u32)
}

/// Split `flexible_key` into this level's degree-index and the residual
/// passed down to the next level.
pub fn degree_and_residual(level: u8, flexible_key: u64) -> (u16, u64) {
    let d = distance(level);
    let degree = flexible_key / d;
    let residual = flexible_key - degree * d;
    (degree as u16, residual)
}

#[cfg(test)]
#[path = "hash_test.rs"]
mod hash_test;
