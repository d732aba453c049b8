use super::Stage;
use crate::components::transfer::TransferLearning;
use crate::config::{ConfigurationManager, TransferLearningConfig};
use crate::errors::Result;
use async_trait::async_trait;

/// Trains the classifier and writes the model and its curves.
#[derive(Debug, Clone)]
pub struct TransferLearningStage {
    config: TransferLearningConfig,
}

impl TransferLearningStage {
    /// Name used in the stage markers.
    pub const NAME: &'static str = "Transfer Learning stage";

    /// Creates the stage from an existing parameter object.
    #[must_use]
    pub fn new(config: TransferLearningConfig) -> Self {
        Self { config }
    }

    /// Snapshots the training parameters.
    pub fn from_config(manager: &ConfigurationManager) -> Result<Self> {
        Ok(Self::new(manager.get_transfer_learning_config()?))
    }
}

#[async_trait]
impl Stage for TransferLearningStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self) -> Result<()> {
        let trained = TransferLearning::new(self.config.clone()).compile()?.fit()?;
        trained.save_model()?;
        trained.save_plots()?;
        Ok(())
    }
}
