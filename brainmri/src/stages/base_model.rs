use super::Stage;
use crate::components::base_model::BaseModel;
use crate::config::{BaseModelConfig, ConfigurationManager};
use crate::errors::Result;
use async_trait::async_trait;

/// Assembles the untrained classifier and writes its summary and diagram.
#[derive(Debug, Clone)]
pub struct BaseModelStage {
    config: BaseModelConfig,
}

impl BaseModelStage {
    /// Name used in the stage markers.
    pub const NAME: &'static str = "Base Model stage";

    /// Creates the stage from an existing parameter object.
    #[must_use]
    pub fn new(config: BaseModelConfig) -> Self {
        Self { config }
    }

    /// Snapshots the model parameters.
    pub fn from_config(manager: &ConfigurationManager) -> Result<Self> {
        Ok(Self::new(manager.get_base_model_config()?))
    }
}

#[async_trait]
impl Stage for BaseModelStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self) -> Result<()> {
        let component = BaseModel::new(self.config.clone());
        component.fetch_weights().await?;
        component.build_model()?;
        Ok(())
    }
}
