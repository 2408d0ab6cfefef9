//! Sensor record value object and its byte serialization.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One location's sensor reading, the unit that gets erasure coded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,

    pub seismic_activity: f64,

    pub temperature_c: f64,

    pub radiation_level: f64,

    #[serde(default)]
    pub modification_count: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Record {
    /// Create a record with no name and a zero modification count
    pub fn new(
        id: impl Into<String>,
        seismic_activity: f64,
        temperature_c: f64,
        radiation_level: f64,
    ) -> Self {
        Self {
            id: id.into(),
            seismic_activity,
            temperature_c,
            radiation_level,
            modification_count: 0,
            name: None,
        }
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Serialize to the byte form that gets sharded.
    ///
    /// Non-finite readings are rejected: JSON would turn them into `null`
    /// and the record could never be read back.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let readings = [
            ("seismic_activity", self.seismic_activity),
            ("temperature_c", self.temperature_c),
            ("radiation_level", self.radiation_level),
        ];
        if let Some((field, value)) = readings.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::EncodeFailure(format!(
                "{} must be finite, got {}",
                field, value
            )));
        }
        serde_json::to_vec(self).map_err(|e| Error::EncodeFailure(e.to_string()))
    }

    /// Parse the byte form back into a record
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Decode(e.to_string()))
    }
}
