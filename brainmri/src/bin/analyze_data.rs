//! Runs the Analyze Data stage on its own.

use brainmri::prelude::*;
use std::sync::Arc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    set_event_sink(Arc::new(LoggingEventSink::default()));

    let config = ConfigurationManager::from_env()?;
    let stage = AnalyzeDataStage::from_config(&config)?;
    run_pipeline(AnalyzeDataStage::NAME, vec![Arc::new(stage)]).await?;
    Ok(())
}
