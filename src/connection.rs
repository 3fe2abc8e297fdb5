//! Connection Model
//!
//! Records describing a discovered connection, a swap target, the mapping
//! between them and swap outcomes. The detector builds these; the swapper
//! owns mutation of a mapping while one swap is in flight.

pub mod descriptor;

use serde::{Deserialize, Serialize};

/// Connection kind of a single data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionKind {
    Live,
    DirectQuery,
    Import,
    Dual,
    Unknown,
}

/// Aggregate kind of a whole model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    Live,
    DirectQuery,
    Import,
    Dual,
    Composite,
    Unknown,
}

impl From<ConnectionKind> for ModelKind {
    fn from(kind: ConnectionKind) -> Self {
        match kind {
            ConnectionKind::Live => ModelKind::Live,
            ConnectionKind::DirectQuery => ModelKind::DirectQuery,
            ConnectionKind::Import => ModelKind::Import,
            ConnectionKind::Dual => ModelKind::Dual,
            ConnectionKind::Unknown => ModelKind::Unknown,
        }
    }
}

/// How a connection is represented in the management API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceType {
    /// Flat connection string on a provider data source
    Descriptor,
    /// Server/database literals inside a shared M expression
    ExpressionBound,
    /// Address sub-object of a structured data source
    StructuredEndpoint,
    /// The whole model is a live connection; nothing to mutate
    LiveModel,
}

/// Collection an [`ObjectHandle`] points into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleCollection {
    DataSource,
    Expression,
}

/// Non-owning reference to a management-API object.
///
/// Only a key: it is re-resolved by name against the live model before
/// every mutation. Never serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHandle {
    pub collection: HandleCollection,
    pub name: String,
}

impl ObjectHandle {
    pub fn data_source(name: impl Into<String>) -> Self {
        Self {
            collection: HandleCollection::DataSource,
            name: name.into(),
        }
    }

    pub fn expression(name: impl Into<String>) -> Self {
        Self {
            collection: HandleCollection::Expression,
            name: name.into(),
        }
    }
}

/// One connection discovered inside the model
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceConnection {
    pub name: String,
    pub kind: ConnectionKind,
    pub server: String,
    pub database: String,
    pub provider: Option<String>,
    pub is_cloud: bool,
    pub connection_string: String,
    pub workspace_name: Option<String>,
    pub dataset_name: Option<String>,
    pub perspective: Option<String>,
    pub reference_type: ReferenceType,
    #[serde(skip)]
    pub handle: Option<ObjectHandle>,
}

impl DataSourceConnection {
    /// Derived: live/direct-query with an analysis provider signature, or a
    /// cloud live connection. A pure live-connection model never qualifies.
    pub fn is_swappable(&self) -> bool {
        if self.reference_type == ReferenceType::LiveModel || self.handle.is_none() {
            return false;
        }
        let recognized = matches!(self.kind, ConnectionKind::Live | ConnectionKind::DirectQuery)
            && descriptor::has_analysis_signature(self.provider.as_deref(), &self.connection_string);
        recognized || (self.is_cloud && self.kind == ConnectionKind::Live)
    }

    /// Serialized view with the derived flag included
    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            connection: self.clone(),
            is_swappable: self.is_swappable(),
        }
    }
}

/// A connection plus its derived swappability, for consumers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    #[serde(flatten)]
    pub connection: DataSourceConnection,
    pub is_swappable: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Local,
    Cloud,
}

/// Flavour of a hosted endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CloudConnectionType {
    /// Workspace XMLA endpoint (`powerbi://…/myorg/<workspace>`)
    Xmla,
    /// Published semantic model addressed by dataset identity
    SemanticModel,
}

/// A candidate destination for a connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapTarget {
    pub target_type: TargetType,
    pub server: String,
    pub database: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_connection_type: Option<CloudConnectionType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub perspective: Option<String>,
}

impl SwapTarget {
    pub fn local(server: impl Into<String>, database: impl Into<String>) -> Self {
        let server = server.into();
        let database = database.into();
        Self {
            target_type: TargetType::Local,
            display_name: format!("{} ({})", database, server),
            server,
            database,
            workspace_id: None,
            workspace_name: None,
            dataset_id: None,
            dataset_name: None,
            cloud_connection_type: None,
            perspective: None,
        }
    }

    pub fn cloud(server: impl Into<String>, dataset: impl Into<String>) -> Self {
        let server = server.into();
        let dataset = dataset.into();
        let workspace_name = descriptor::workspace_from_url(&server);
        Self {
            target_type: TargetType::Cloud,
            display_name: match &workspace_name {
                Some(ws) => format!("{} / {}", ws, dataset),
                None => dataset.clone(),
            },
            cloud_connection_type: Some(CloudConnectionType::Xmla),
            server,
            dataset_name: Some(dataset.clone()),
            database: dataset,
            workspace_id: None,
            workspace_name,
            dataset_id: None,
            perspective: None,
        }
    }

    /// Target describing where `source` currently points
    pub fn from_connection(source: &DataSourceConnection) -> Self {
        let mut target = if source.is_cloud {
            Self::cloud(source.server.clone(), source.database.clone())
        } else {
            Self::local(source.server.clone(), source.database.clone())
        };
        if source.is_cloud {
            target.cloud_connection_type = Some(descriptor::cloud_type_of(&source.server));
            if source.workspace_name.is_some() {
                target.workspace_name = source.workspace_name.clone();
            }
            if source.dataset_name.is_some() {
                target.dataset_name = source.dataset_name.clone();
            }
        }
        target.perspective = source.perspective.clone();
        target
    }

    pub fn is_cloud(&self) -> bool {
        self.target_type == TargetType::Cloud
    }

    /// Registry key shared with the health checker
    pub fn key(&self) -> String {
        format!("{}|{}", self.server, self.database)
    }
}

/// Mapping lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingStatus {
    Pending,
    Matched,
    Ready,
    Swapping,
    Success,
    Error,
}

/// Source values captured before the first swap
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OriginalConnection {
    pub server: String,
    pub database: String,
    pub connection_string: String,
}

impl OriginalConnection {
    pub(crate) fn of(source: &DataSourceConnection) -> Self {
        Self {
            server: source.server.clone(),
            database: source.database.clone(),
            connection_string: source.connection_string.clone(),
        }
    }
}

/// Source × target pairing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionMapping {
    pub source: DataSourceConnection,
    pub target: Option<SwapTarget>,
    pub status: MappingStatus,
    pub auto_matched: bool,
    pub error_message: Option<String>,
    pub original: Option<OriginalConnection>,
}

impl ConnectionMapping {
    pub fn new(source: DataSourceConnection) -> Self {
        let original = Some(OriginalConnection::of(&source));
        Self {
            source,
            target: None,
            status: MappingStatus::Pending,
            auto_matched: false,
            error_message: None,
            original,
        }
    }

    pub fn with_target(mut self, target: SwapTarget, auto_matched: bool) -> Self {
        self.set_target(target, auto_matched);
        self
    }

    /// Attach a target; auto-matched targets await confirmation
    pub fn set_target(&mut self, target: SwapTarget, auto_matched: bool) {
        self.target = Some(target);
        self.auto_matched = auto_matched;
        self.status = if auto_matched {
            MappingStatus::Matched
        } else {
            MappingStatus::Ready
        };
        self.error_message = None;
    }

    pub fn is_ready(&self) -> bool {
        self.target.is_some() && matches!(self.status, MappingStatus::Ready | MappingStatus::Matched)
    }

    /// First snapshot wins
    pub fn capture_original(&mut self) {
        if self.original.is_none() {
            self.original = Some(OriginalConnection::of(&self.source));
        }
    }
}

/// Snapshot of every connection found in a model
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConnectionInfo {
    pub model_name: String,
    pub server: String,
    pub database: String,
    pub connection_kind: ModelKind,
    pub connections: Vec<DataSourceConnection>,
    pub is_composite: bool,
}

impl ModelConnectionInfo {
    pub fn total_count(&self) -> usize {
        self.connections.len()
    }

    pub fn swappable_count(&self) -> usize {
        self.connections.iter().filter(|c| c.is_swappable()).count()
    }

    pub fn find(&self, name: &str) -> Option<&DataSourceConnection> {
        self.connections.iter().find(|c| c.name == name)
    }

    pub fn summary(&self) -> ModelConnectionSummary {
        ModelConnectionSummary {
            model_name: self.model_name.clone(),
            server: self.server.clone(),
            database: self.database.clone(),
            connection_kind: self.connection_kind,
            connections: self.connections.iter().map(DataSourceConnection::summary).collect(),
            is_composite: self.is_composite,
            total_count: self.total_count(),
            swappable_count: self.swappable_count(),
        }
    }
}

/// Consumer view of [`ModelConnectionInfo`] with derived counts
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConnectionSummary {
    pub model_name: String,
    pub server: String,
    pub database: String,
    pub connection_kind: ModelKind,
    pub connections: Vec<ConnectionSummary>,
    pub is_composite: bool,
    pub total_count: usize,
    pub swappable_count: usize,
}

/// Outcome of one swap attempt
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapResult {
    pub success: bool,
    pub mapping: ConnectionMapping,
    pub message: String,
    pub elapsed_ms: u64,
}
