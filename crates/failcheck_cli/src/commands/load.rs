//! Load command implementation.

use super::cancel_on_signal;
use failcheck_core::{Generator, GeneratorConfig};
use failcheck_postgres::PgRemote;
use tokio_util::sync::CancellationToken;

/// Runs the generator until a stop signal arrives.
pub async fn run(url: &str, config: GeneratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone())?;

    let stats = Generator::new(config, PgRemote::new(url), cancel)
        .run()
        .await?;

    tracing::info!(
        cycles = stats.cycles,
        generated = stats.generated,
        inserted = stats.remote_inserted,
        failed = stats.remote_failed,
        connects = stats.connects,
        last_id = ?stats.last_id,
        "load stopped"
    );
    Ok(())
}
