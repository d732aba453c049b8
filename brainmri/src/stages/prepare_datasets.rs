use super::Stage;
use crate::components::prepare::PrepareDatasets;
use crate::config::{ConfigurationManager, PrepareDatasetsConfig};
use crate::errors::Result;
use async_trait::async_trait;

/// Splits the image tree into serialized training and validation datasets.
#[derive(Debug, Clone)]
pub struct PrepareDatasetsStage {
    config: PrepareDatasetsConfig,
}

impl PrepareDatasetsStage {
    /// Name used in the stage markers.
    pub const NAME: &'static str = "Prepare Datasets stage";

    /// Creates the stage from an existing parameter object.
    #[must_use]
    pub fn new(config: PrepareDatasetsConfig) -> Self {
        Self { config }
    }

    /// Snapshots the dataset parameters.
    pub fn from_config(manager: &ConfigurationManager) -> Result<Self> {
        Ok(Self::new(manager.get_prepare_datasets_config()?))
    }
}

#[async_trait]
impl Stage for PrepareDatasetsStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self) -> Result<()> {
        PrepareDatasets::new(self.config.clone()).prepare_datasets()?;
        Ok(())
    }
}
