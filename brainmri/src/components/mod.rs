//! One component per pipeline stage, plus the dataset and augmentation
//! plumbing the model stages share.

pub mod analyze;
pub mod augmentation;
pub mod base_model;
pub mod callbacks;
pub mod dataset;
pub mod fetch;
pub mod prepare;
pub mod transfer;
