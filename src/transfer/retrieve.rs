// src/transfer/retrieve.rs

//! Retrieve operation
//!
//! `pre` projects the component set into a retrieve request; `post` matches
//! the reported file properties back against the requested membership,
//! wildcard-aware. The packaged archive rides on the result for the caller
//! to unpack through the converter.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::component::ComponentSet;
use crate::convert::PACKAGE_XML;
use crate::error::Result;
use crate::transfer::client::{
    MetadataConnection, RequestStatus, RetrieveRequest, RetrieveStatus,
};
use crate::transfer::deploy::{FileResponse, FileResponseState};
use crate::transfer::{MetadataTransfer, TransferOperation};

/// Final result of a retrieve transfer
#[derive(Debug)]
pub struct RetrieveResult {
    pub response: RetrieveStatus,
    pub files: Vec<FileResponse>,
}

impl RetrieveResult {
    pub fn status(&self) -> RequestStatus {
        self.response.status
    }

    pub fn success(&self) -> bool {
        self.response.success
    }

    /// Packaged archive returned by the service, when present
    pub fn zip_file(&self) -> Option<&[u8]> {
        self.response.zip_file.as_deref()
    }
}

/// Retrieves a component set from the remote service
pub struct MetadataApiRetrieve {
    connection: Arc<dyn MetadataConnection>,
    components: ComponentSet,
}

impl MetadataApiRetrieve {
    /// Build a transfer ready to `start`
    pub fn new(
        connection: Arc<dyn MetadataConnection>,
        components: ComponentSet,
    ) -> MetadataTransfer<Self> {
        MetadataTransfer::new(Self {
            connection,
            components,
        })
    }
}

#[async_trait]
impl TransferOperation for MetadataApiRetrieve {
    type Status = RetrieveStatus;
    type Outcome = RetrieveResult;

    async fn pre(&mut self) -> Result<String> {
        let request = RetrieveRequest {
            api_version: self.components.api_version(),
            unpackaged: self.components.manifest_object().types,
            single_package: true,
        };
        info!(
            "requesting retrieve of {} type group(s)",
            request.unpackaged.len()
        );
        self.connection.retrieve(&request).await
    }

    async fn check_status(&mut self, id: &str) -> Result<RetrieveStatus> {
        self.connection.check_retrieve_status(id).await
    }

    fn lifecycle(status: &RetrieveStatus) -> RequestStatus {
        status.status
    }

    fn mark_canceled(status: &mut RetrieveStatus) {
        status.status = RequestStatus::Canceled;
        status.success = false;
        status.done = true;
    }

    async fn post(&mut self, status: RetrieveStatus) -> Result<RetrieveResult> {
        let registry = Arc::clone(self.components.registry());
        let mut files = Vec::new();
        for property in &status.file_properties {
            if property.file_name == PACKAGE_XML {
                continue;
            }
            let Some(ty) = registry.by_name(&property.type_name) else {
                debug!("skipping unregistered retrieved type {}", property.type_name);
                continue;
            };
            if !self.components.is_empty() && !self.components.has(&ty, &property.full_name) {
                continue;
            }
            files.push(FileResponse {
                full_name: property.full_name.clone(),
                type_name: ty.name.clone(),
                state: FileResponseState::Created,
                file_path: Some(PathBuf::from(&property.file_name)),
                problem: None,
                line_number: None,
                column_number: None,
            });
        }
        Ok(RetrieveResult {
            response: status,
            files,
        })
    }

    async fn request_cancel(&mut self, id: &str) -> Result<bool> {
        self.connection.cancel_retrieve(id).await
    }
}
