// src/transfer/client.rs

//! Remote metadata service contract
//!
//! The wire SDK lives outside this crate; transfers consume it through
//! `MetadataConnection`. Status payloads normalize their singleton-or-array
//! containers at deserialization so no call site branches on shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::manifest::{one_or_many, PackageTypeMembers};

/// Lifecycle states reported for a long-running remote operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum RequestStatus {
    #[default]
    Pending,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl RequestStatus {
    /// Terminal states end the poll loop and fire `finish`
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
        };
        write!(f, "{s}")
    }
}

/// Options accepted by the deploy endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployOptions {
    /// Validate without committing
    pub check_only: bool,
    /// Named test level, service-defined
    pub test_level: Option<String>,
    /// Tests to run when the level requires naming them
    pub run_tests: Vec<String>,
    pub single_package: bool,
    pub rollback_on_error: bool,
}

impl Default for DeployOptions {
    fn default() -> Self {
        Self {
            check_only: false,
            test_level: None,
            run_tests: Vec::new(),
            single_package: true,
            rollback_on_error: true,
        }
    }
}

/// Per-component outcome line inside deploy details
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployMessage {
    pub full_name: String,
    pub component_type: String,
    pub created: bool,
    pub changed: bool,
    pub deleted: bool,
    pub success: bool,
    pub problem: Option<String>,
    pub problem_type: Option<String>,
    pub line_number: Option<u32>,
    pub column_number: Option<u32>,
}

/// Success/failure rollup inside a deploy status
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployDetails {
    #[serde(deserialize_with = "one_or_many")]
    pub component_successes: Vec<DeployMessage>,
    #[serde(deserialize_with = "one_or_many")]
    pub component_failures: Vec<DeployMessage>,
}

/// Status object returned while a deploy is running or finished
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployStatus {
    pub id: String,
    pub status: RequestStatus,
    pub success: bool,
    pub done: bool,
    pub number_components_deployed: u32,
    pub number_components_total: u32,
    pub error_message: Option<String>,
    pub details: DeployDetails,
}

/// Request body for the retrieve endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveRequest {
    pub api_version: String,
    pub unpackaged: Vec<PackageTypeMembers>,
    pub single_package: bool,
}

/// One retrieved file as reported by the service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FileProperty {
    pub file_name: String,
    pub full_name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Status object returned while a retrieve is running or finished
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetrieveStatus {
    pub id: String,
    pub status: RequestStatus,
    pub success: bool,
    pub done: bool,
    pub error_message: Option<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub file_properties: Vec<FileProperty>,
    /// Packaged archive, present on success; the SDK layer decodes it
    pub zip_file: Option<Vec<u8>>,
}

/// Transport seam to the remote metadata service
///
/// Implementations wrap the wire SDK; tests substitute a scripted mock.
#[async_trait]
pub trait MetadataConnection: Send + Sync {
    /// Upload a packaged archive; returns the async operation id
    async fn deploy(&self, zip: Vec<u8>, options: &DeployOptions) -> Result<String>;

    /// Poll a deploy operation
    async fn check_deploy_status(&self, id: &str, include_details: bool) -> Result<DeployStatus>;

    /// Request cancellation; true when the service finished canceling
    async fn cancel_deploy(&self, id: &str) -> Result<bool>;

    /// Start a retrieve; returns the async operation id
    async fn retrieve(&self, request: &RetrieveRequest) -> Result<String>;

    /// Poll a retrieve operation
    async fn check_retrieve_status(&self, id: &str) -> Result<RetrieveStatus>;

    /// Request cancellation; true when the service finished canceling
    async fn cancel_retrieve(&self, id: &str) -> Result<bool>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_terminal_states() {
        assert!(!RequestStatus::Pending.is_terminal());
        assert!(!RequestStatus::InProgress.is_terminal());
        assert!(RequestStatus::Succeeded.is_terminal());
        assert!(RequestStatus::Failed.is_terminal());
        assert!(RequestStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_deploy_details_singleton_normalizes() {
        let status: DeployStatus = serde_json::from_value(json!({
            "id": "0Af000",
            "status": "Failed",
            "details": {
                "componentFailures": {
                    "fullName": "A",
                    "componentType": "ApexClass",
                    "success": false,
                    "problem": "missing semicolon"
                }
            }
        }))
        .unwrap();

        assert_eq!(status.details.component_failures.len(), 1);
        assert_eq!(status.details.component_failures[0].full_name, "A");
        assert!(status.details.component_successes.is_empty());
    }

    #[test]
    fn test_deploy_details_array_normalizes() {
        let details: DeployDetails = serde_json::from_value(json!({
            "componentSuccesses": [
                {"fullName": "A", "componentType": "ApexClass", "success": true},
                {"fullName": "B", "componentType": "ApexClass", "success": true}
            ]
        }))
        .unwrap();
        assert_eq!(details.component_successes.len(), 2);
    }

    #[test]
    fn test_retrieve_file_properties_singleton() {
        let status: RetrieveStatus = serde_json::from_value(json!({
            "id": "09S000",
            "status": "Succeeded",
            "success": true,
            "done": true,
            "fileProperties": {
                "fileName": "classes/A.cls",
                "fullName": "A",
                "type": "ApexClass"
            }
        }))
        .unwrap();
        assert_eq!(status.file_properties.len(), 1);
        assert_eq!(status.file_properties[0].type_name, "ApexClass");
    }
}
