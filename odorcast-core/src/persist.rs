//! Trained-estimator artifacts: one pretty-printed JSON document per model.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::method::MethodSpec;
use crate::model::Model;

/// Everything needed to reuse a trained estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub method: MethodSpec,
    pub is_regression: bool,
    pub model: Model,
}

/// Write `artifact` to `path`, creating parent directories.
pub fn save_model(path: &Path, artifact: &ModelArtifact) -> io::Result<()> {
    let json = serde_json::to_string_pretty(artifact)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json)
}

pub fn load_model(path: &Path) -> io::Result<ModelArtifact> {
    let json = fs::read_to_string(path)?;
    serde_json::from_str(&json).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
