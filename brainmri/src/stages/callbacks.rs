use super::Stage;
use crate::components::callbacks::Callbacks;
use crate::config::{CallbacksConfig, ConfigurationManager};
use crate::errors::Result;
use async_trait::async_trait;

/// Serializes the training hooks.
#[derive(Debug, Clone)]
pub struct CallbacksStage {
    config: CallbacksConfig,
}

impl CallbacksStage {
    /// Name used in the stage markers.
    pub const NAME: &'static str = "Callbacks stage";

    /// Creates the stage from an existing parameter object.
    #[must_use]
    pub fn new(config: CallbacksConfig) -> Self {
        Self { config }
    }

    /// Snapshots the callback parameters.
    pub fn from_config(manager: &ConfigurationManager) -> Result<Self> {
        Ok(Self::new(manager.get_callbacks_config()?))
    }
}

#[async_trait]
impl Stage for CallbacksStage {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn run(&self) -> Result<()> {
        Callbacks::new(self.config.clone()).save_callbacks()?;
        Ok(())
    }
}
