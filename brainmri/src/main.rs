//! Runs every stage of the pipeline in order.

use brainmri::prelude::*;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    set_event_sink(Arc::new(LoggingEventSink::default()));

    let config = ConfigurationManager::from_env()?;
    let summary = run_pipeline(PIPELINE_NAME, default_stages(&config)?).await?;
    tracing::info!(run_id = %summary.run_id, stages = summary.results.len(), "Pipeline finished");
    Ok(())
}
