//! Compare command implementation.

use super::cancel_on_signal;
use failcheck_core::{ReconcileConfig, Reconciler};
use failcheck_postgres::PgRemote;
use tokio_util::sync::CancellationToken;

/// Runs the compare command, logging every record the remote store lost.
pub async fn run(url: &str, config: ReconcileConfig) -> Result<(), Box<dyn std::error::Error>> {
    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone())?;

    let result = Reconciler::new(config, PgRemote::new(url))
        .with_cancel(cancel)
        .run()
        .await?;

    tracing::info!("found {} differences", result.count());
    for record in &result.missing {
        tracing::info!(
            id = record.id,
            ts = %record.ts,
            payload = %record.payload,
            "missing record"
        );
    }
    Ok(())
}
