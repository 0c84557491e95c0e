//! Append-only local log: the ground truth of everything the generator
//! attempted to send.
//!
//! ## Format
//!
//! One JSON object per entry, newline terminated:
//!
//! ```text
//! {"id":1,"ts":"2024-03-01T10:00:00.123456+02:00","payload":"k3@.."}
//! {"id":2,"ts":"2024-03-01T10:00:00.624011+02:00","payload":"k3@.."}
//! ```
//!
//! Entries are self-delimiting, so the file can be read while it is still
//! being written and a process kill between two appends leaves a valid log.
//!
//! ## Recovery Policy
//!
//! ### Tolerated (treated as a clean end-of-log)
//!
//! - **Truncated tail**: the final entry is syntactically incomplete. This is
//!   a write that never finished; the reader stops before it.
//!
//! ### Fatal
//!
//! - **Malformed entry**: any complete entry that is not a valid record. The
//!   error carries the number of records read before it.
//!
//! ## Invariants
//!
//! - The log is **append-only**; entries are never rewritten or reordered
//! - Every append seeks to the real end of the file first
//! - Each append is one independent write, synced before returning when
//!   `sync_on_write` is set
//! - A reader is forward-only; replaying again needs a fresh reader

mod reader;
mod writer;

pub use reader::LogReader;
pub use writer::LocalLog;
