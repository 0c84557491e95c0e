//! PostgreSQL remote store for failcheck.
//!
//! Tables live in the `failcheck` schema:
//!
//! - `stamps`: ground truth, one row per acknowledged insert
//! - `replay`: unlogged, reloaded from the local log with `COPY` before
//!   each comparison
//!
//! Every session method runs in its own transaction and rolls back
//! explicitly when a statement fails. Errors whose SQLSTATE or transport
//! means the server went away drop the connection, so the next call reports
//! [`failcheck_core::RemoteError::Closed`].

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod copy;
mod schema;
mod session;

pub use session::{PgRemote, PgSession};
