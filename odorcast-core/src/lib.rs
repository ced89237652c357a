//! Odorcast Core: frames, estimators, method tags, and training.
//!
//! This crate contains everything needed to turn a method tag and a pair of
//! aligned frames into a fitted estimator:
//! - Time-indexed frames and the dense matrices estimators consume
//! - The `Estimator` contract and the closed `Model` enum
//! - Method-tag parsing and the model factory
//! - The `train` entry point and JSON model artifacts
//! - Deterministic seed derivation and explicit parallelism settings

pub mod factory;
pub mod frame;
pub mod method;
pub mod model;
pub mod parallel;
pub mod persist;
pub mod seed;
pub mod train;

pub use factory::{build_model, FactoryError};
pub use frame::{CrowdFrame, FeatureFrame, FrameError, LabelFrame, Matrix, TimeSeriesFrame};
pub use method::{MethodParseError, MethodSpec};
pub use model::{Estimator, FitContext, FitReport, Model, ModelError, Task};
pub use parallel::{ParallelScope, Parallelism};
pub use persist::{load_model, save_model, ModelArtifact};
pub use train::{filter_minority, train, TrainError, TrainOptions, TrainedModel, TrainingSet};
