use super::Stage;
use crate::components::analyze::AnalyzeImageData;
use crate::config::{AnalyzeDataConfig, ConfigurationManager};
use crate::errors::Result;
use async_trait::async_trait;

/// Produces the dataset reports, charts and sample grid.
#[derive(Debug, Clone)]
pub struct AnalyzeDataStage {
    config: AnalyzeDataConfig,
}

impl AnalyzeDataStage {
    /// Name used in the stage markers.
    pub const NAME: &'static str = "Analyze Data stage";

    /// Creates the stage from an existing parameter object.
    #[must_use]
    pub fn new(config: AnalyzeDataConfig) -> Self {
        Self { config }
    }

    /// Snapshots the analysis parameters.
    pub fn from_config(manager: &ConfigurationManager) -> Result<Self> {
        Ok(Self::new(manager.get_analyze_data_config()?))
    }
}

#[async_trait]
impl Stage for AnalyzeDataStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self) -> Result<()> {
        AnalyzeImageData::new(self.config.clone()).analyze()?;
        Ok(())
    }
}
