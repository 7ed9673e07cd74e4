//! Deduplicating containers for the experiment graph
//!
//! Nodes are keyed by uuid and keep the first value inserted. Links are keyed
//! by their identity (process uuid, or supplemented entity id) and keep the
//! last value inserted. Both preserve first-insertion order.

use crate::domain::metadata::MetadataNode;
use serde_json::{json, Value};
use std::collections::HashMap;

/// Reference to a metadata document from inside a link
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkedEntity {
    pub entity_type: String,
    pub entity_id: String,
}

impl LinkedEntity {
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// Reference to a node, typed by its concrete schema type
    pub fn of(node: &MetadataNode) -> Self {
        Self::new(node.concrete_type(), node.uuid.clone())
    }
}

/// Inputs, outputs and protocols of one process
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessLink {
    pub process_uuid: String,
    pub process_type: String,
    inputs: Vec<LinkedEntity>,
    outputs: Vec<LinkedEntity>,
    protocols: Vec<LinkedEntity>,
}

impl ProcessLink {
    pub fn new(process_uuid: impl Into<String>, process_type: impl Into<String>) -> Self {
        Self {
            process_uuid: process_uuid.into(),
            process_type: process_type.into(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            protocols: Vec::new(),
        }
    }

    pub fn add_input(&mut self, entity: LinkedEntity) {
        push_unique(&mut self.inputs, entity);
    }

    pub fn add_output(&mut self, entity: LinkedEntity) {
        push_unique(&mut self.outputs, entity);
    }

    pub fn add_protocol(&mut self, entity: LinkedEntity) {
        push_unique(&mut self.protocols, entity);
    }

    pub fn inputs(&self) -> &[LinkedEntity] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[LinkedEntity] {
        &self.outputs
    }

    pub fn protocols(&self) -> &[LinkedEntity] {
        &self.protocols
    }
}

/// Files attached to an entity (e.g. the generated spreadsheet on a project)
#[derive(Debug, Clone, PartialEq)]
pub struct SupplementaryLink {
    pub entity: LinkedEntity,
    files: Vec<LinkedEntity>,
}

impl SupplementaryLink {
    pub fn new(entity: LinkedEntity) -> Self {
        Self {
            entity,
            files: Vec::new(),
        }
    }

    pub fn add_file(&mut self, file: LinkedEntity) {
        push_unique(&mut self.files, file);
    }

    pub fn files(&self) -> &[LinkedEntity] {
        &self.files
    }
}

/// Discriminant of [`Link`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkKind {
    Process,
    SupplementaryFile,
}

impl LinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkKind::Process => "process_link",
            LinkKind::SupplementaryFile => "supplementary_file_link",
        }
    }
}

/// A relationship link in the experiment graph
#[derive(Debug, Clone, PartialEq)]
pub enum Link {
    Process(ProcessLink),
    Supplementary(SupplementaryLink),
}

impl Link {
    pub fn kind(&self) -> LinkKind {
        match self {
            Link::Process(_) => LinkKind::Process,
            Link::Supplementary(_) => LinkKind::SupplementaryFile,
        }
    }

    /// Identity of the link inside a [`LinkSet`]
    pub fn key(&self) -> &str {
        match self {
            Link::Process(link) => &link.process_uuid,
            Link::Supplementary(link) => &link.entity.entity_id,
        }
    }

    /// Wire form written to the staging area
    pub fn to_json(&self) -> Value {
        match self {
            Link::Process(link) => json!({
                "link_type": self.kind().as_str(),
                "process_id": link.process_uuid,
                "process_type": link.process_type,
                "inputs": link.inputs.iter().map(|e| json!({
                    "input_type": e.entity_type,
                    "input_id": e.entity_id,
                })).collect::<Vec<_>>(),
                "outputs": link.outputs.iter().map(|e| json!({
                    "output_type": e.entity_type,
                    "output_id": e.entity_id,
                })).collect::<Vec<_>>(),
                "protocols": link.protocols.iter().map(|e| json!({
                    "protocol_type": e.entity_type,
                    "protocol_id": e.entity_id,
                })).collect::<Vec<_>>(),
            }),
            Link::Supplementary(link) => json!({
                "link_type": self.kind().as_str(),
                "entity": {
                    "entity_type": link.entity.entity_type,
                    "entity_id": link.entity.entity_id,
                },
                "files": link.files.iter().map(|f| json!({
                    "file_type": f.entity_type,
                    "file_id": f.entity_id,
                })).collect::<Vec<_>>(),
            }),
        }
    }
}

impl From<ProcessLink> for Link {
    fn from(link: ProcessLink) -> Self {
        Link::Process(link)
    }
}

impl From<SupplementaryLink> for Link {
    fn from(link: SupplementaryLink) -> Self {
        Link::Supplementary(link)
    }
}

/// Metadata nodes keyed by uuid; the first insert wins
#[derive(Debug, Clone, Default)]
pub struct NodeSet {
    order: Vec<String>,
    nodes: HashMap<String, MetadataNode>,
}

impl NodeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node unless one with the same uuid is already present
    ///
    /// Returns `true` if the node was inserted.
    pub fn add_node(&mut self, node: MetadataNode) -> bool {
        if self.nodes.contains_key(&node.uuid) {
            return false;
        }
        self.order.push(node.uuid.clone());
        self.nodes.insert(node.uuid.clone(), node);
        true
    }

    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = MetadataNode>) {
        for node in nodes {
            self.add_node(node);
        }
    }

    pub fn contains(&self, uuid: &str) -> bool {
        self.nodes.contains_key(uuid)
    }

    /// Copy of a single node
    pub fn get(&self, uuid: &str) -> Option<MetadataNode> {
        self.nodes.get(uuid).cloned()
    }

    /// Copies of all nodes in insertion order
    pub fn nodes(&self) -> Vec<MetadataNode> {
        self.order
            .iter()
            .filter_map(|uuid| self.nodes.get(uuid))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Links keyed by [`Link::key`]; the last insert wins
#[derive(Debug, Clone, Default)]
pub struct LinkSet {
    order: Vec<String>,
    links: HashMap<String, Link>,
}

impl LinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces the link with the same key
    pub fn add_link(&mut self, link: impl Into<Link>) {
        let link = link.into();
        let key = link.key().to_string();
        if !self.links.contains_key(&key) {
            self.order.push(key.clone());
        }
        self.links.insert(key, link);
    }

    pub fn get(&self, key: &str) -> Option<Link> {
        self.links.get(key).cloned()
    }

    /// Copies of all links in first-insertion order
    pub fn links(&self) -> Vec<Link> {
        self.order
            .iter()
            .filter_map(|key| self.links.get(key))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// `{"links": [...]}` document body
    pub fn to_json(&self) -> Value {
        let links: Vec<Value> = self
            .order
            .iter()
            .filter_map(|key| self.links.get(key))
            .map(Link::to_json)
            .collect();
        json!({ "links": links })
    }
}

/// Nodes and links belonging to one experiment
#[derive(Debug, Clone, Default)]
pub struct ExperimentGraph {
    pub nodes: NodeSet,
    pub links: LinkSet,
}

impl ExperimentGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges another graph into this one with the same dedup rules
    pub fn extend(&mut self, other: ExperimentGraph) -> &mut Self {
        let ExperimentGraph { nodes, links } = other;
        for key in links.order {
            if let Some(link) = links.links.get(&key) {
                self.links.add_link(link.clone());
            }
        }
        for uuid in nodes.order {
            if let Some(node) = nodes.nodes.get(&uuid) {
                self.nodes.add_node(node.clone());
            }
        }
        self
    }

    /// Graph holding `files` attached to `entity` by a supplementary link
    pub fn from_supplementary_files(entity: &MetadataNode, files: Vec<MetadataNode>) -> Self {
        let mut link = SupplementaryLink::new(LinkedEntity::of(entity));
        for file in &files {
            link.add_file(LinkedEntity::of(file));
        }

        let mut graph = Self::new();
        graph.nodes.add_nodes(files);
        graph.nodes.add_node(entity.clone());
        graph.links.add_link(link);
        graph
    }
}

fn push_unique(entities: &mut Vec<LinkedEntity>, entity: LinkedEntity) {
    if !entities.iter().any(|e| e.entity_id == entity.entity_id) {
        entities.push(entity);
    }
}
