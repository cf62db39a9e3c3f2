//! Startup loader for the feature database.
//!
//! Two on-disk formats are accepted:
//!
//! - `*.json`: the conventional RouteGuide dataset, an array of
//!   `{"location": {"latitude": .., "longitude": ..}, "name": ".."}`.
//! - anything else: a binary protobuf `FeatureDatabase` message.
//!
//! Loading happens before the server accepts calls; any failure aborts
//! startup.

use super::FeatureStore;
use prost::Message;
use routeguide_core::proto::{Feature, FeatureDatabase, Point};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Failure to read or parse a feature database.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("failed to read feature database {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON feature database: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid protobuf feature database: {0}")]
    Decode(#[from] prost::DecodeError),
}

#[derive(Debug, Deserialize)]
struct JsonFeature {
    location: JsonLocation,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct JsonLocation {
    latitude: i32,
    longitude: i32,
}

impl From<JsonFeature> for Feature {
    fn from(feature: JsonFeature) -> Self {
        Self {
            name: feature.name,
            location: Some(Point {
                latitude: feature.location.latitude,
                longitude: feature.location.longitude,
            }),
        }
    }
}

impl FeatureStore {
    /// Loads a database from disk, choosing the format by file extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DatabaseError> {
        let path = path.as_ref();
        let io_err = |source| DatabaseError::Io {
            path: path.to_path_buf(),
            source,
        };

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        if is_json {
            let data = std::fs::read_to_string(path).map_err(io_err)?;
            Self::from_json(&data)
        } else {
            let data = std::fs::read(path).map_err(io_err)?;
            Self::from_protobuf(&data)
        }
    }

    /// Parses the JSON dataset format.
    pub fn from_json(data: &str) -> Result<Self, DatabaseError> {
        let decoded: Vec<JsonFeature> = serde_json::from_str(data)?;
        Ok(Self::new(decoded.into_iter().map(Feature::from).collect()))
    }

    /// Decodes a serialized `FeatureDatabase` message.
    pub fn from_protobuf(data: &[u8]) -> Result<Self, DatabaseError> {
        let database = FeatureDatabase::decode(data)?;
        Ok(Self::new(database.feature))
    }
}
