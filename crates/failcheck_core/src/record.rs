//! The record type written to the local log and mirrored remotely.

use chrono::{DateTime, FixedOffset, Local, SubsecRound};
use serde::{Deserialize, Serialize};

/// Record identifier. Assigned by the generator, starts at 1.
pub type RecordId = i64;

/// A single timestamped record.
///
/// The identifier is unique per run; uniqueness is enforced by the remote
/// primary key, not re-validated locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Monotonic identifier.
    pub id: RecordId,
    /// Generation time, with the local UTC offset.
    pub ts: DateTime<FixedOffset>,
    /// Opaque payload (printable ASCII).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub payload: String,
}

impl Record {
    /// Creates a record.
    pub fn new(id: RecordId, ts: DateTime<FixedOffset>, payload: impl Into<String>) -> Self {
        Self {
            id,
            ts,
            payload: payload.into(),
        }
    }

    /// Creates a record stamped with the current time.
    ///
    /// The timestamp is truncated to microseconds, the finest resolution a
    /// `timestamptz` column keeps, so local and remote copies compare equal.
    pub fn now(id: RecordId, payload: impl Into<String>) -> Self {
        let ts = Local::now().fixed_offset().trunc_subsecs(6);
        Self::new(id, ts, payload)
    }
}
