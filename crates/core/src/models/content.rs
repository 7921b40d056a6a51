//! Content pool models

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::AssetId;

/// One reward image in the content pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentAsset {
    /// Pool-unique identifier (the file name)
    pub id: AssetId,
    /// Full path of the image file, for attachment upload
    pub path: PathBuf,
}

impl ContentAsset {
    pub fn new(id: impl Into<AssetId>, path: impl Into<PathBuf>) -> Self {
        Self {
            id: id.into(),
            path: path.into(),
        }
    }
}
