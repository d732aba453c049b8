use super::Stage;
use crate::components::fetch::FetchData;
use crate::config::{ConfigurationManager, FetchDataConfig};
use crate::errors::Result;
use async_trait::async_trait;

/// Downloads and extracts the raw image archive.
#[derive(Debug, Clone)]
pub struct FetchDataStage {
    config: FetchDataConfig,
}

impl FetchDataStage {
    /// Name used in the stage markers.
    pub const NAME: &'static str = "Fetch Data stage";

    /// Creates the stage from an existing parameter object.
    #[must_use]
    pub fn new(config: FetchDataConfig) -> Self {
        Self { config }
    }

    /// Snapshots the fetch parameters.
    pub fn from_config(manager: &ConfigurationManager) -> Result<Self> {
        Ok(Self::new(manager.get_fetch_data_config()?))
    }
}

#[async_trait]
impl Stage for FetchDataStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self) -> Result<()> {
        let fetch = FetchData::new(self.config.clone());
        fetch.download().await?;
        fetch.extract()?;
        Ok(())
    }
}
