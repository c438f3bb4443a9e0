//! GraphSON result aggregation.

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;

use crate::error::GatewayError;
use crate::protocol::Response;

/// A typed GraphSON collection, e.g. `{"@type":"g:List","@value":[...]}`.
///
/// The engine streams a result as several frames, each carrying one such
/// collection. The gateway concatenates them without interpreting the
/// elements.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GsonResponse {
    #[serde(rename = "@type", default)]
    pub r#type: String,
    #[serde(rename = "@value", default)]
    pub value: Vec<Box<RawValue>>,
}

impl GsonResponse {
    pub fn len(&self) -> usize {
        self.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Parse one frame's `result.data`.
    pub fn parse(data: &RawValue) -> Result<Self, GatewayError> {
        serde_json::from_str(data.get()).map_err(|e| GatewayError::Gson(e.to_string()))
    }

    /// Append `other`. The type is adopted only while ours is still unset.
    pub fn extend(&mut self, other: GsonResponse) {
        if self.r#type.is_empty() {
            self.r#type = other.r#type;
        }
        self.value.extend(other.value);
    }

    /// Concatenate parts in order; the type comes from the first part that has one.
    pub fn concat(parts: impl IntoIterator<Item = GsonResponse>) -> Self {
        parts.into_iter().fold(Self::default(), |mut acc, part| {
            acc.extend(part);
            acc
        })
    }

    /// Merge every data-bearing frame of a result stream.
    pub fn from_responses(responses: &[Response]) -> Result<Self, GatewayError> {
        let mut merged = Self::default();
        for response in responses {
            if let Some(data) = &response.result.data {
                merged.extend(Self::parse(data)?);
            }
        }
        Ok(merged)
    }
}
