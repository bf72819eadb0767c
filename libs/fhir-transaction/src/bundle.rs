//! The slice of the Bundle resource the engine consumes.
//!
//! Only the request side is modeled here; responses are yielded as
//! `(Entry, EngineResponse)` pairs. The wire encoding of payloads beyond
//! this shape is out of scope.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BundleType {
    #[serde(rename = "transaction")]
    Transaction,
    #[serde(rename = "transaction-response")]
    TransactionResponse,
    #[serde(rename = "batch")]
    Batch,
    #[serde(rename = "batch-response")]
    BatchResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    #[serde(rename = "resourceType")]
    pub resource_type: String,
    #[serde(rename = "type")]
    pub bundle_type: BundleType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entry: Vec<BundleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleEntry {
    #[serde(rename = "fullUrl", skip_serializing_if = "Option::is_none")]
    pub full_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request: Option<BundleRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleRequest {
    pub method: String,
    pub url: String,
    #[serde(rename = "ifNoneExist", skip_serializing_if = "Option::is_none")]
    pub if_none_exist: Option<String>,
    #[serde(rename = "ifMatch", skip_serializing_if = "Option::is_none")]
    pub if_match: Option<String>,
    #[serde(rename = "ifNoneMatch", skip_serializing_if = "Option::is_none")]
    pub if_none_match: Option<String>,
}

impl Bundle {
    /// Deserialize and check the bundle type in one step.
    pub fn from_json(value: JsonValue) -> crate::Result<Bundle> {
        let bundle: Bundle = serde_json::from_value(value)
            .map_err(|e| crate::Error::InvalidBundle(e.to_string()))?;
        if bundle.resource_type != "Bundle" {
            return Err(crate::Error::InvalidBundle(format!(
                "expected resourceType 'Bundle', got '{}'",
                bundle.resource_type
            )));
        }
        Ok(bundle)
    }
}
