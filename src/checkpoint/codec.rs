//! Textual checkpoint encoding
//!
//! Values are written in scientific notation with 17 significant digits,
//! enough for any finite double to parse back to the identical bit pattern.
//! Infinities survive as `inf`/`-inf`; NaN survives as NaN (payload bits are
//! not preserved). The reader also accepts the older 15-digit `%.15e` form
//! (`8.268890380859375e-01`).

use crate::checkpoint::Checkpoint;
use crate::error::{Error, Result};
use crate::series::SeriesKey;

/// Prefix of every checkpoint collection name
pub const COLLECTION_PREFIX: &str = "cp:";

/// Separator between step and value inside a stored member
const MEMBER_SEPARATOR: char = ':';

/// Collection name for a series: `cp:<decimal key>`
pub fn collection_name(key: SeriesKey) -> String {
    format!("{}{}", COLLECTION_PREFIX, key)
}

/// Inverse of [`collection_name`]; `None` for foreign or malformed names.
pub fn parse_collection_name(name: &str) -> Option<SeriesKey> {
    name.strip_prefix(COLLECTION_PREFIX)?
        .parse::<u64>()
        .ok()
        .map(SeriesKey::from_raw)
}

/// Encode a value with 17 significant digits.
pub fn encode_value(value: f64) -> String {
    format!("{:.16e}", value)
}

/// Decode a value written by [`encode_value`] or the legacy 15-digit writer.
pub fn decode_value(key: SeriesKey, raw: &str) -> Result<f64> {
    raw.trim()
        .parse::<f64>()
        .map_err(|_| Error::CorruptCheckpoint {
            key: key.as_u64(),
            raw: raw.to_string(),
        })
}

/// Sorted-set member for a checkpoint: `<step>:<value>`.
///
/// Carrying the step keeps two steps with equal values (e.g. a series stuck
/// at 0.0) from collapsing into one member.
pub fn encode_member(checkpoint: Checkpoint) -> String {
    format!(
        "{}{}{}",
        checkpoint.step,
        MEMBER_SEPARATOR,
        encode_value(checkpoint.value)
    )
}

/// Decode a stored member. Bare legacy members take their step from `score`.
pub fn decode_member(key: SeriesKey, member: &str, score: f64) -> Result<Checkpoint> {
    let corrupt = || Error::CorruptCheckpoint {
        key: key.as_u64(),
        raw: member.to_string(),
    };

    match member.split_once(MEMBER_SEPARATOR) {
        Some((step, value)) => {
            let step = step.trim().parse::<u64>().map_err(|_| corrupt())?;
            Ok(Checkpoint::new(step, decode_value(key, value)?))
        }
        None => {
            if !(score.is_finite() && score >= 0.0) {
                return Err(corrupt());
            }
            Ok(Checkpoint::new(score as u64, decode_value(key, member)?))
        }
    }
}
