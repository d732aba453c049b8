//! Stage trait and the six pipeline stages.
//!
//! A stage owns the immutable parameter object of exactly one component,
//! snapshotted from the [`ConfigurationManager`] when the stage is built.

mod analyze_data;
mod base_model;
mod callbacks;
mod fetch_data;
mod prepare_datasets;
mod result;
mod transfer_learning;

pub use analyze_data::AnalyzeDataStage;
pub use base_model::BaseModelStage;
pub use callbacks::CallbacksStage;
pub use fetch_data::FetchDataStage;
pub use prepare_datasets::PrepareDatasetsStage;
pub use result::{StageResult, StageStatus};
pub use transfer_learning::TransferLearningStage;

use crate::config::ConfigurationManager;
use crate::errors::Result;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// A named unit of work executed once per pipeline run.
#[async_trait]
pub trait Stage: Send + Sync + Debug {
    /// Human-readable stage name used in the log markers.
    fn name(&self) -> &str;

    /// Runs the stage's component. Errors are returned unchanged to the
    /// orchestrator.
    async fn run(&self) -> Result<()>;
}

/// Builds the six stages in execution order.
///
/// Every accessor runs here, so a configuration problem in any section is
/// reported before the first stage starts.
pub fn default_stages(config: &ConfigurationManager) -> Result<Vec<Arc<dyn Stage>>> {
    Ok(vec![
        Arc::new(FetchDataStage::from_config(config)?),
        Arc::new(AnalyzeDataStage::from_config(config)?),
        Arc::new(PrepareDatasetsStage::from_config(config)?),
        Arc::new(BaseModelStage::from_config(config)?),
        Arc::new(CallbacksStage::from_config(config)?),
        Arc::new(TransferLearningStage::from_config(config)?),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names_match_log_markers() {
        assert_eq!(FetchDataStage::NAME, "Fetch Data stage");
        assert_eq!(AnalyzeDataStage::NAME, "Analyze Data stage");
        assert_eq!(PrepareDatasetsStage::NAME, "Prepare Datasets stage");
        assert_eq!(BaseModelStage::NAME, "Base Model stage");
        assert_eq!(CallbacksStage::NAME, "Callbacks stage");
        assert_eq!(TransferLearningStage::NAME, "Transfer Learning stage");
    }
}
