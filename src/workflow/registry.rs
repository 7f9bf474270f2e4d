/// Hot-reload workflow registry using ArcSwap
///
/// Holds every known workflow in compiled form plus the webhook key index the
/// gateway routes on. Each change builds a new snapshot and swaps the pointer,
/// so lookups never block and runs in flight keep the snapshot they started
/// with.

use crate::nodes::{NodeRegistry, SettingsError};
use crate::workflow::{
    storage::WorkflowStorage,
    types::{Edge, Workflow, WorkflowStatus},
};
use arc_swap::ArcSwap;
use petgraph::graph::DiGraph;
use serde::Serialize;
use serde_json::Value;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// Default location of the event batch inside a signed webhook body
pub const DEFAULT_EVENTS_PATH: &str = "events";

/// Structural problems that prevent a workflow from being saved
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("duplicate node id '{0}'")]
    DuplicateNodeId(String),
    #[error("edge {from} -> {to} references unknown node '{missing}'")]
    UnknownEdgeEndpoint { from: String, to: String, missing: String },
    #[error("node '{node_id}' has unknown type '{node_type}'")]
    UnknownNodeType { node_id: String, node_type: String },
    #[error("node '{node_id}': {source}")]
    InvalidSettings { node_id: String, source: SettingsError },
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Where a signed webhook gets its shared secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SecretSource {
    Inline(String),
    Integration(String),
}

/// A trigger node exposed under a webhook key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookBinding {
    pub workflow_id: String,
    pub node_id: String,
    pub key: String,
    pub signed: bool,
    /// Signed bindings only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<SecretSource>,
    pub events_path: String,
}

/// Workflow plus what the executor and gateway need at run time
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    pub workflow: Workflow,
    /// Trigger nodes in declaration order
    pub start_node_ids: Vec<String>,
    /// Outgoing edges per source node, in declaration order
    outgoing: HashMap<String, Vec<Edge>>,
    pub webhooks: Vec<WebhookBinding>,
    pub has_cycle: bool,
}

impl CompiledWorkflow {
    pub fn outgoing(&self, node_id: &str) -> &[Edge] {
        self.outgoing.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    workflows: HashMap<String, Arc<CompiledWorkflow>>,
    /// (signed, key) → bindings of active workflows, ordered by workflow id
    webhooks: HashMap<(bool, String), Vec<WebhookBinding>>,
}

impl Snapshot {
    fn build(workflows: HashMap<String, Arc<CompiledWorkflow>>) -> Self {
        let mut webhooks: HashMap<(bool, String), Vec<WebhookBinding>> = HashMap::new();
        for compiled in workflows.values().filter(|c| c.workflow.is_active()) {
            for binding in &compiled.webhooks {
                webhooks
                    .entry((binding.signed, binding.key.clone()))
                    .or_default()
                    .push(binding.clone());
            }
        }
        for bindings in webhooks.values_mut() {
            bindings.sort_by(|a, b| (&a.workflow_id, &a.node_id).cmp(&(&b.workflow_id, &b.node_id)));
        }
        Self { workflows, webhooks }
    }
}

/// Lock-free workflow registry
#[derive(Debug)]
pub struct WorkflowRegistry {
    snapshot: ArcSwap<Snapshot>,
    storage: WorkflowStorage,
    nodes: Arc<NodeRegistry>,
}

impl WorkflowRegistry {
    pub fn new(storage: WorkflowStorage, nodes: Arc<NodeRegistry>) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            storage,
            nodes,
        }
    }

    /// Load every stored workflow. Workflows that no longer compile (for
    /// example after a node type was removed) are skipped with an error log.
    pub async fn init_from_storage(&self) -> anyhow::Result<()> {
        let stored = self.storage.get_all().await?;
        let mut workflows = HashMap::new();

        for workflow in stored {
            let id = workflow.id.clone();
            match self.compile(workflow) {
                Ok(compiled) => {
                    workflows.insert(id, Arc::new(compiled));
                }
                Err(e) => tracing::error!("❌ Skipping workflow {} on load: {}", id, e),
            }
        }

        let snapshot = Snapshot::build(workflows);
        tracing::info!(
            "📚 Initialized workflow registry with {} workflows ({} webhook keys)",
            snapshot.workflows.len(),
            snapshot.webhooks.len()
        );
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    /// Validate and compile a workflow without storing it
    pub fn compile(&self, workflow: Workflow) -> Result<CompiledWorkflow, ValidationError> {
        let mut seen = HashSet::new();
        for node in &workflow.nodes {
            if !seen.insert(node.id.as_str()) {
                return Err(ValidationError::DuplicateNodeId(node.id.clone()));
            }
        }

        for edge in &workflow.edges {
            for endpoint in [&edge.from, &edge.to] {
                if !seen.contains(endpoint.as_str()) {
                    return Err(ValidationError::UnknownEdgeEndpoint {
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        missing: endpoint.clone(),
                    });
                }
            }
        }

        let mut start_node_ids = Vec::new();
        let mut webhooks = Vec::new();
        for node in &workflow.nodes {
            let handler = self.nodes.get(&node.node_type).ok_or_else(|| ValidationError::UnknownNodeType {
                node_id: node.id.clone(),
                node_type: node.node_type.clone(),
            })?;
            handler
                .validate_settings(&node.settings)
                .map_err(|source| ValidationError::InvalidSettings { node_id: node.id.clone(), source })?;

            if handler.is_trigger() {
                start_node_ids.push(node.id.clone());
            }
            if let Some(binding) = webhook_binding(&workflow.id, &node.id, &node.node_type, &node.settings) {
                webhooks.push(binding);
            }
        }

        let mut outgoing: HashMap<String, Vec<Edge>> = HashMap::new();
        for edge in &workflow.edges {
            outgoing.entry(edge.from.clone()).or_default().push(edge.clone());
        }

        let has_cycle = detect_cycle(&workflow);
        if has_cycle {
            tracing::info!(
                "🔄 Workflow {} contains a cycle; each node still runs at most once per execution",
                workflow.id
            );
        }

        Ok(CompiledWorkflow { workflow, start_node_ids, outgoing, webhooks, has_cycle })
    }

    /// Validate, persist and hot-swap a workflow
    pub async fn save_workflow(&self, workflow: Workflow) -> Result<Arc<CompiledWorkflow>, RegistryError> {
        self.compile(workflow.clone())?;
        self.storage.save(&workflow).await?;
        let compiled = self.reload_workflow(&workflow.id).await?;
        Ok(compiled)
    }

    /// Change a workflow's status; returns None when it does not exist
    pub async fn set_status(
        &self,
        workflow_id: &str,
        status: WorkflowStatus,
    ) -> Result<Option<Arc<CompiledWorkflow>>, RegistryError> {
        if !self.storage.update_status(workflow_id, status).await? {
            return Ok(None);
        }
        tracing::info!("🔀 Workflow {} is now {}", workflow_id, status);
        Ok(Some(self.reload_workflow(workflow_id).await?))
    }

    /// Re-read one workflow from storage and swap it in
    pub async fn reload_workflow(&self, workflow_id: &str) -> Result<Arc<CompiledWorkflow>, RegistryError> {
        let workflow = self
            .storage
            .get(workflow_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Workflow not found: {}", workflow_id))?;
        let compiled = Arc::new(self.compile(workflow)?);

        let current = self.snapshot.load();
        let mut workflows = current.workflows.clone();
        workflows.insert(workflow_id.to_string(), Arc::clone(&compiled));
        self.snapshot.store(Arc::new(Snapshot::build(workflows)));

        tracing::info!("🔥 Hot-reloaded workflow: {}", workflow_id);
        Ok(compiled)
    }

    /// Delete from storage and drop from the registry
    pub async fn remove_workflow(&self, workflow_id: &str) -> anyhow::Result<bool> {
        let deleted = self.storage.delete(workflow_id).await?;

        let current = self.snapshot.load();
        if current.workflows.contains_key(workflow_id) {
            let mut workflows = current.workflows.clone();
            workflows.remove(workflow_id);
            self.snapshot.store(Arc::new(Snapshot::build(workflows)));
            tracing::info!("🗑️ Removed workflow from registry: {}", workflow_id);
        }

        Ok(deleted)
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Option<Arc<CompiledWorkflow>> {
        self.snapshot.load().workflows.get(workflow_id).cloned()
    }

    pub fn list_workflow_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.snapshot.load().workflows.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Bindings of active workflows for a webhook key
    pub fn find_by_webhook_key(&self, key: &str, signed: bool) -> Vec<WebhookBinding> {
        self.snapshot
            .load()
            .webhooks
            .get(&(signed, key.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn node_registry(&self) -> &Arc<NodeRegistry> {
        &self.nodes
    }
}

fn webhook_binding(workflow_id: &str, node_id: &str, node_type: &str, settings: &Value) -> Option<WebhookBinding> {
    let signed = match node_type {
        "webhook_trigger" => false,
        "signed_webhook_trigger" => true,
        _ => return None,
    };
    let key = settings.get("webhook_key").and_then(Value::as_str)?.to_string();

    let secret = if signed {
        let inline = settings.get("secret").and_then(Value::as_str).filter(|s| !s.is_empty());
        let integration = settings.get("integration_id").and_then(Value::as_str).filter(|s| !s.is_empty());
        match (inline, integration) {
            (Some(s), _) => Some(SecretSource::Inline(s.to_string())),
            (None, Some(id)) => Some(SecretSource::Integration(id.to_string())),
            (None, None) => None,
        }
    } else {
        None
    };

    let events_path = settings
        .get("events_path")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_EVENTS_PATH)
        .to_string();

    Some(WebhookBinding {
        workflow_id: workflow_id.to_string(),
        node_id: node_id.to_string(),
        key,
        signed,
        secret,
        events_path,
    })
}

fn detect_cycle(workflow: &Workflow) -> bool {
    let mut graph: DiGraph<&str, ()> = DiGraph::new();
    let mut index = HashMap::new();
    for node in &workflow.nodes {
        index.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
    }
    for edge in &workflow.edges {
        if let (Some(&a), Some(&b)) = (index.get(edge.from.as_str()), index.get(edge.to.as_str())) {
            graph.add_edge(a, b, ());
        }
    }
    petgraph::algo::is_cyclic_directed(&graph)
}
