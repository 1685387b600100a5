// src/transfer/deploy.rs

//! Deploy operation and per-file result synthesis
//!
//! `pre` packages the component set through the zip writer and uploads it;
//! `post` reconciles the service's per-component messages back onto the
//! local files, one `FileResponse` per relevant path.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::component::{ComponentSet, SourceComponent};
use crate::convert::{ConvertOutput, MetadataConverter, PackageFormat};
use crate::error::{Error, Result};
use crate::transfer::client::{
    DeployMessage, DeployOptions, DeployStatus, MetadataConnection, RequestStatus,
};
use crate::transfer::{MetadataTransfer, TransferOperation};

/// Outcome state for one file of a deployed component
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileResponseState {
    Created,
    Changed,
    Unchanged,
    Deleted,
    Failed,
}

/// One reconciled file outcome
#[derive(Debug, Clone)]
pub struct FileResponse {
    pub full_name: String,
    pub type_name: String,
    pub state: FileResponseState,
    pub file_path: Option<PathBuf>,
    pub problem: Option<String>,
    pub line_number: Option<u32>,
    pub column_number: Option<u32>,
}

/// Final result of a deploy transfer
#[derive(Debug)]
pub struct DeployResult {
    pub response: DeployStatus,
    pub files: Vec<FileResponse>,
}

impl DeployResult {
    pub fn status(&self) -> RequestStatus {
        self.response.status
    }

    pub fn success(&self) -> bool {
        self.response.success
    }
}

/// Deploys a component set to the remote service
pub struct MetadataApiDeploy {
    connection: Arc<dyn MetadataConnection>,
    components: ComponentSet,
    options: DeployOptions,
}

impl MetadataApiDeploy {
    /// Build a transfer ready to `start`
    pub fn new(
        connection: Arc<dyn MetadataConnection>,
        components: ComponentSet,
        options: DeployOptions,
    ) -> MetadataTransfer<Self> {
        MetadataTransfer::new(Self {
            connection,
            components,
            options,
        })
    }
}

#[async_trait]
impl TransferOperation for MetadataApiDeploy {
    type Status = DeployStatus;
    type Outcome = DeployResult;

    async fn pre(&mut self) -> Result<String> {
        if self.components.source_components().is_empty() {
            return Err(Error::DeployNoSource);
        }
        let converter = MetadataConverter::new(Arc::clone(self.components.registry()));
        let converted = converter.convert(
            &self.components,
            PackageFormat::Metadata,
            ConvertOutput::Zip,
        )?;
        let archive = converted.packaged.unwrap_or_default();
        info!("uploading {} byte archive", archive.len());
        self.connection.deploy(archive, &self.options).await
    }

    async fn check_status(&mut self, id: &str) -> Result<DeployStatus> {
        self.connection.check_deploy_status(id, true).await
    }

    fn lifecycle(status: &DeployStatus) -> RequestStatus {
        status.status
    }

    fn mark_canceled(status: &mut DeployStatus) {
        status.status = RequestStatus::Canceled;
        status.success = false;
        status.done = true;
    }

    async fn post(&mut self, status: DeployStatus) -> Result<DeployResult> {
        let files = synthesize_file_responses(&self.components, &status)?;
        Ok(DeployResult {
            response: status,
            files,
        })
    }

    async fn request_cancel(&mut self, id: &str) -> Result<bool> {
        self.connection.cancel_deploy(id).await
    }
}

/// Known wrong identifiers rewritten before message grouping
fn sanitize_message(message: &DeployMessage) -> DeployMessage {
    let mut message = message.clone();
    if let Some(rest) = message.full_name.strip_prefix("markup://c:") {
        message.full_name = rest.to_string();
    }
    message
}

fn message_key(full_name: &str, type_name: &str) -> String {
    format!("{full_name}#{type_name}")
}

/// Reconcile service messages onto local files
///
/// For each source-backed component (children included): a failure message
/// produces one response carrying the diagnostic, pointed at the xml for
/// xml-only components; a success produces one response per content file
/// plus one for the xml. A component reported as both failed and succeeded
/// collapses to its failure only.
fn synthesize_file_responses(
    set: &ComponentSet,
    status: &DeployStatus,
) -> Result<Vec<FileResponse>> {
    let mut messages: HashMap<String, Vec<DeployMessage>> = HashMap::new();
    for message in status
        .details
        .component_failures
        .iter()
        .chain(&status.details.component_successes)
    {
        let message = sanitize_message(message);
        messages
            .entry(message_key(&message.full_name, &message.component_type))
            .or_default()
            .push(message);
    }

    let mut responses = Vec::new();
    for component in set.source_components() {
        let mut units = component.children()?;
        units.push(component);
        for unit in units {
            append_unit_responses(&unit, &messages, &mut responses)?;
        }
    }
    Ok(responses)
}

fn append_unit_responses(
    unit: &SourceComponent,
    messages: &HashMap<String, Vec<DeployMessage>>,
    responses: &mut Vec<FileResponse>,
) -> Result<()> {
    let full_name = unit.full_name();
    let Some(matched) = messages.get(&message_key(&full_name, &unit.ty.name)) else {
        debug!("no deploy message for {full_name}");
        return Ok(());
    };

    let failures: Vec<&DeployMessage> = matched.iter().filter(|m| !m.success).collect();
    if !failures.is_empty() {
        if matched.iter().any(|m| m.success) {
            warn!("{full_name} reported both success and failure; keeping the failure");
        }
        for failure in failures {
            responses.push(FileResponse {
                full_name: full_name.clone(),
                type_name: unit.ty.name.clone(),
                state: FileResponseState::Failed,
                file_path: if unit.content.is_none() {
                    unit.xml.clone()
                } else {
                    unit.content.clone()
                },
                problem: failure.problem.clone(),
                line_number: failure.line_number,
                column_number: failure.column_number,
            });
        }
        return Ok(());
    }

    let Some(success) = matched.first() else {
        return Ok(());
    };
    let state = if success.created {
        FileResponseState::Created
    } else if success.deleted {
        FileResponseState::Deleted
    } else if success.changed {
        FileResponseState::Changed
    } else {
        FileResponseState::Unchanged
    };

    for file in unit.walk_content()? {
        responses.push(FileResponse {
            full_name: full_name.clone(),
            type_name: unit.ty.name.clone(),
            state,
            file_path: Some(file),
            problem: None,
            line_number: None,
            column_number: None,
        });
    }
    if let Some(xml) = &unit.xml {
        responses.push(FileResponse {
            full_name,
            type_name: unit.ty.name.clone(),
            state,
            file_path: Some(xml.clone()),
            problem: None,
            line_number: None,
            column_number: None,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registry;
    use crate::resolve::SourceResolver;
    use crate::transfer::client::{DeployDetails, RetrieveRequest, RetrieveStatus};
    use crate::transfer::TransferListener;
    use crate::tree::{TreeContainer, VirtualDirectory, VirtualFile, VirtualTree};
    use std::collections::VecDeque;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    fn class_set() -> ComponentSet {
        let registry = Registry::load().unwrap();
        let tree: Arc<dyn TreeContainer> = Arc::new(VirtualTree::new(vec![VirtualDirectory::new(
            "force-app/classes",
            vec![
                VirtualFile::data("A.cls", b"public class A {}".to_vec()),
                VirtualFile::data("A.cls-meta.xml", b"<ApexClass/>".to_vec()),
            ],
        )]));
        SourceResolver::new(registry, tree)
            .resolve_source(&[PathBuf::from("force-app/classes")], None)
            .unwrap()
    }

    /// Scripted connection: pops one status per poll, switches to a
    /// canceled status once cancel is requested.
    struct ScriptedConnection {
        statuses: Mutex<VecDeque<DeployStatus>>,
        canceled: AtomicBool,
    }

    impl ScriptedConnection {
        fn new(statuses: Vec<DeployStatus>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                canceled: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl MetadataConnection for ScriptedConnection {
        async fn deploy(&self, zip: Vec<u8>, _options: &DeployOptions) -> Result<String> {
            assert!(!zip.is_empty());
            Ok("0Af000000000001".to_string())
        }

        async fn check_deploy_status(
            &self,
            id: &str,
            _include_details: bool,
        ) -> Result<DeployStatus> {
            if self.canceled.load(Ordering::SeqCst) {
                return Ok(DeployStatus {
                    id: id.to_string(),
                    status: RequestStatus::Canceled,
                    success: false,
                    done: true,
                    ..Default::default()
                });
            }
            let mut statuses = self.statuses.lock().unwrap();
            Ok(statuses.pop_front().unwrap_or_else(|| DeployStatus {
                id: id.to_string(),
                status: RequestStatus::InProgress,
                ..Default::default()
            }))
        }

        async fn cancel_deploy(&self, _id: &str) -> Result<bool> {
            self.canceled.store(true, Ordering::SeqCst);
            Ok(true)
        }

        async fn retrieve(&self, _request: &RetrieveRequest) -> Result<String> {
            unimplemented!("deploy-only mock")
        }

        async fn check_retrieve_status(&self, _id: &str) -> Result<RetrieveStatus> {
            unimplemented!("deploy-only mock")
        }

        async fn cancel_retrieve(&self, _id: &str) -> Result<bool> {
            unimplemented!("deploy-only mock")
        }
    }

    fn succeeded_status() -> DeployStatus {
        DeployStatus {
            id: "0Af000000000001".into(),
            status: RequestStatus::Succeeded,
            success: true,
            done: true,
            details: DeployDetails {
                component_successes: vec![DeployMessage {
                    full_name: "A".into(),
                    component_type: "ApexClass".into(),
                    changed: true,
                    success: true,
                    ..Default::default()
                }],
                component_failures: vec![],
            },
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct CountingListener {
        updates: AtomicUsize,
        finishes: AtomicUsize,
        update_after_finish: AtomicBool,
    }

    impl TransferListener<DeployStatus, DeployResult> for Arc<CountingListener> {
        fn on_update(&self, _status: &DeployStatus) {
            if self.finishes.load(Ordering::SeqCst) > 0 {
                self.update_after_finish.store(true, Ordering::SeqCst);
            }
            self.updates.fetch_add(1, Ordering::SeqCst);
        }

        fn on_finish(&self, _result: &DeployResult) {
            self.finishes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_succeeds_with_file_responses() {
        let connection = Arc::new(ScriptedConnection::new(vec![
            DeployStatus {
                status: RequestStatus::InProgress,
                ..Default::default()
            },
            succeeded_status(),
        ]));
        let listener: Arc<CountingListener> = Arc::default();

        let transfer = MetadataApiDeploy::new(connection, class_set(), DeployOptions::default())
            .with_listener(Box::new(Arc::clone(&listener)));
        let result = transfer.start(Duration::from_millis(100)).await.unwrap();

        assert_eq!(result.status(), RequestStatus::Succeeded);
        assert!(result.success());
        assert_eq!(listener.updates.load(Ordering::SeqCst), 1);
        assert_eq!(listener.finishes.load(Ordering::SeqCst), 1);
        assert!(!listener.update_after_finish.load(Ordering::SeqCst));

        let paths: Vec<&Path> = result
            .files
            .iter()
            .filter_map(|f| f.file_path.as_deref())
            .collect();
        assert_eq!(
            paths,
            vec![
                Path::new("force-app/classes/A.cls"),
                Path::new("force-app/classes/A.cls-meta.xml"),
            ]
        );
        assert!(result
            .files
            .iter()
            .all(|f| f.state == FileResponseState::Changed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deploy_cancel_midway() {
        // Plenty of in-progress statuses; the listener cancels after the
        // second update.
        let connection = Arc::new(ScriptedConnection::new(vec![
            DeployStatus {
                status: RequestStatus::InProgress,
                ..Default::default()
            };
            10
        ]));

        struct CancelAfterTwo {
            counter: AtomicUsize,
            finishes: AtomicUsize,
            events_after_finish: AtomicBool,
            canceler: Mutex<Option<crate::transfer::TransferCancel>>,
        }
        impl TransferListener<DeployStatus, DeployResult> for Arc<CancelAfterTwo> {
            fn on_update(&self, _status: &DeployStatus) {
                if self.finishes.load(Ordering::SeqCst) > 0 {
                    self.events_after_finish.store(true, Ordering::SeqCst);
                }
                if self.counter.fetch_add(1, Ordering::SeqCst) + 1 == 2 {
                    if let Some(canceler) = self.canceler.lock().unwrap().as_ref() {
                        canceler.cancel();
                    }
                }
            }
            fn on_finish(&self, result: &DeployResult) {
                assert_eq!(result.status(), RequestStatus::Canceled);
                assert!(!result.success());
                self.finishes.fetch_add(1, Ordering::SeqCst);
            }
        }

        let listener = Arc::new(CancelAfterTwo {
            counter: AtomicUsize::new(0),
            finishes: AtomicUsize::new(0),
            events_after_finish: AtomicBool::new(false),
            canceler: Mutex::new(None),
        });

        let transfer = MetadataApiDeploy::new(connection, class_set(), DeployOptions::default())
            .with_listener(Box::new(Arc::clone(&listener)));
        *listener.canceler.lock().unwrap() = Some(transfer.canceler());

        let result = transfer.start(Duration::from_millis(100)).await.unwrap();
        assert_eq!(result.status(), RequestStatus::Canceled);
        assert!(!result.success());
        assert_eq!(listener.counter.load(Ordering::SeqCst), 2);
        assert_eq!(listener.finishes.load(Ordering::SeqCst), 1);
        assert!(!listener.events_after_finish.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_deploy_without_source_fails() {
        let registry = Registry::load().unwrap();
        let connection = Arc::new(ScriptedConnection::new(vec![]));
        let transfer = MetadataApiDeploy::new(
            connection,
            ComponentSet::new(registry),
            DeployOptions::default(),
        );
        let err = transfer.start(Duration::from_millis(1)).await.unwrap_err();
        assert!(matches!(err, Error::DeployNoSource));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_check_failure_wraps_as_request_error() {
        struct BrokenConnection;
        #[async_trait]
        impl MetadataConnection for BrokenConnection {
            async fn deploy(&self, _zip: Vec<u8>, _options: &DeployOptions) -> Result<String> {
                Ok("0Af".into())
            }
            async fn check_deploy_status(
                &self,
                _id: &str,
                _include_details: bool,
            ) -> Result<DeployStatus> {
                Err(Error::Io(std::io::Error::other("connection reset")))
            }
            async fn cancel_deploy(&self, _id: &str) -> Result<bool> {
                Ok(true)
            }
            async fn retrieve(&self, _request: &RetrieveRequest) -> Result<String> {
                unimplemented!()
            }
            async fn check_retrieve_status(&self, _id: &str) -> Result<RetrieveStatus> {
                unimplemented!()
            }
            async fn cancel_retrieve(&self, _id: &str) -> Result<bool> {
                unimplemented!()
            }
        }

        let transfer = MetadataApiDeploy::new(
            Arc::new(BrokenConnection),
            class_set(),
            DeployOptions::default(),
        );
        let err = transfer.start(Duration::from_millis(10)).await.unwrap_err();
        assert!(matches!(err, Error::Request(_)));
    }

    #[test]
    fn test_sanitize_strips_markup_prefix() {
        let message = DeployMessage {
            full_name: "markup://c:foo".into(),
            component_type: "AuraDefinitionBundle".into(),
            success: false,
            ..Default::default()
        };
        assert_eq!(sanitize_message(&message).full_name, "foo");
    }

    #[test]
    fn test_failure_collapses_success_and_points_at_xml() {
        let registry = Registry::load().unwrap();
        let tree: Arc<dyn TreeContainer> = Arc::new(VirtualTree::new(vec![VirtualDirectory::new(
            "force-app/layouts",
            vec![VirtualFile::data(
                "Account Layout.layout-meta.xml",
                b"<Layout/>".to_vec(),
            )],
        )]));
        let set = SourceResolver::new(registry, tree)
            .resolve_source(&[PathBuf::from("force-app/layouts")], None)
            .unwrap();

        let status = DeployStatus {
            status: RequestStatus::Failed,
            details: DeployDetails {
                component_successes: vec![DeployMessage {
                    full_name: "Account Layout".into(),
                    component_type: "Layout".into(),
                    success: true,
                    ..Default::default()
                }],
                component_failures: vec![DeployMessage {
                    full_name: "Account Layout".into(),
                    component_type: "Layout".into(),
                    success: false,
                    problem: Some("invalid field reference".into()),
                    line_number: Some(12),
                    ..Default::default()
                }],
            },
            ..Default::default()
        };

        let responses = synthesize_file_responses(&set, &status).unwrap();
        assert_eq!(responses.len(), 1);
        let failure = &responses[0];
        assert_eq!(failure.state, FileResponseState::Failed);
        assert_eq!(failure.problem.as_deref(), Some("invalid field reference"));
        assert_eq!(
            failure.file_path.as_deref(),
            Some(Path::new("force-app/layouts/Account Layout.layout-meta.xml"))
        );
        assert_eq!(failure.line_number, Some(12));
    }
}
