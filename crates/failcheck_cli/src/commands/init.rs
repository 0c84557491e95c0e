//! Init command implementation.

use failcheck_core::init_schema;
use failcheck_postgres::PgRemote;
use std::time::Duration;

/// Runs the init command.
pub async fn run(url: &str, timeout: Duration) -> Result<(), Box<dyn std::error::Error>> {
    init_schema(&PgRemote::new(url), timeout).await?;
    Ok(())
}
