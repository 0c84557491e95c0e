//! SQL used against the remote database.

/// Creates the schema and both tables.
pub(crate) const CREATE_SCHEMA: &[&str] = &[
    "create schema if not exists failcheck",
    "create table if not exists failcheck.stamps \
     ( id bigint primary key, ts timestamptz not null, payload text )",
    "create unlogged table if not exists failcheck.replay \
     ( id bigint primary key, ts timestamptz not null, payload text )",
];

/// Empties both tables.
pub(crate) const TRUNCATE_TABLES: &[&str] = &["truncate failcheck.stamps, failcheck.replay"];

/// Next identifier after the ground-truth maximum.
pub(crate) const NEXT_ID: &str = "select coalesce(max(id) + 1, 1) from failcheck.stamps";

/// Inserts one ground-truth row.
pub(crate) const INSERT_STAMP: &str =
    "insert into failcheck.stamps (id, ts, payload) values ($1, $2, $3)";

/// Empties the comparison table before a load.
pub(crate) const TRUNCATE_REPLAY: &str = "truncate failcheck.replay";

/// Bulk loads the comparison table.
pub(crate) const COPY_REPLAY: &str = "copy failcheck.replay (id, ts, payload) from stdin";

/// Comparison rows with no ground-truth counterpart.
pub(crate) const MISSING: &str = "select r.id, r.ts, r.payload \
     from failcheck.stamps s full join failcheck.replay r using (id) \
     where s.id is null";
