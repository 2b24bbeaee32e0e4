//! Exclusions tree: services, groups and leaves with aggregated state.
//!
//! The tree is derived from the flat collections and never patched in
//! place. Every mutation rebuilds it in full, and aggregated states are
//! computed once per build.

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::exclusion::{Exclusion, ExclusionState, ExclusionsData, ExclusionsGroup, Service};
use crate::services::ServicesProvider;

/// Id of the tree root.
pub const ROOT_ID: &str = "root";

/// What a tree node stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Aggregates every collection
    Root,
    /// A catalog service; its id is the service id
    Service { service_name: String, icon_url: String },
    /// A registrable-domain group
    Group,
    /// A hostname leaf inside a group
    Exclusion,
    /// A standalone IP leaf
    Ip,
}

impl NodeKind {
    /// Whether nodes of this kind are leaves.
    pub fn is_leaf(&self) -> bool {
        matches!(self, NodeKind::Exclusion | NodeKind::Ip)
    }
}

/// A node of the exclusions tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExclusionNode {
    pub id: String,
    pub hostname: String,
    pub kind: NodeKind,
    pub state: ExclusionState,
    pub children: Vec<ExclusionNode>,
}

impl ExclusionNode {
    fn leaf(exclusion: &Exclusion, kind: NodeKind) -> Self {
        Self {
            id: exclusion.id.clone(),
            hostname: exclusion.hostname.clone(),
            kind,
            state: exclusion.state(),
            children: Vec::new(),
        }
    }

    fn group(group: &ExclusionsGroup) -> Self {
        let children: Vec<_> = group
            .exclusions
            .iter()
            .map(|e| Self::leaf(e, NodeKind::Exclusion))
            .collect();
        Self::inner(group.id.clone(), group.hostname.clone(), NodeKind::Group, children)
    }

    fn service(service: &Service, catalog: &dyn ServicesProvider) -> Self {
        let (service_name, icon_url) = match catalog.get_service(&service.service_id) {
            Some(dto) => (dto.service_name, dto.icon_url),
            None => (service.service_name.clone(), service.icon_url.clone()),
        };
        let children: Vec<_> = service.exclusions_groups.iter().map(Self::group).collect();
        Self::inner(
            service.service_id.clone(),
            service_name.clone(),
            NodeKind::Service {
                service_name,
                icon_url,
            },
            children,
        )
    }

    fn inner(id: String, hostname: String, kind: NodeKind, children: Vec<ExclusionNode>) -> Self {
        let state = ExclusionState::aggregate(children.iter().map(|c| c.state));
        Self {
            id,
            hostname,
            kind,
            state,
            children,
        }
    }

    fn find(&self, id: &str) -> Option<&ExclusionNode> {
        if self.id == id {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(id))
    }

    fn find_parent(&self, id: &str) -> Option<&ExclusionNode> {
        for child in &self.children {
            if child.id == id {
                return Some(self);
            }
            if let Some(parent) = child.find_parent(id) {
                return Some(parent);
            }
        }
        None
    }

    /// Ids of every leaf under this node, or the node itself for a leaf.
    pub fn leaf_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        self.collect_leaves(&mut ids);
        ids
    }

    fn collect_leaves(&self, out: &mut Vec<String>) {
        if self.kind.is_leaf() {
            out.push(self.id.clone());
            return;
        }
        for child in &self.children {
            child.collect_leaves(out);
        }
    }

    fn collect_enabled<'a>(&'a self, seen: &mut AHashSet<&'a str>, out: &mut Vec<String>) {
        if self.kind.is_leaf() {
            if self.state == ExclusionState::Enabled && seen.insert(self.hostname.as_str()) {
                out.push(self.hostname.clone());
            }
            return;
        }
        for child in &self.children {
            child.collect_enabled(seen, out);
        }
    }

    /// Serializable view of the node and its subtree.
    pub fn to_dto(&self) -> ExclusionDto {
        let (node_type, service_name, icon_url) = match &self.kind {
            NodeKind::Root => (NodeType::Root, None, None),
            NodeKind::Service {
                service_name,
                icon_url,
            } => (
                NodeType::Service,
                Some(service_name.clone()),
                Some(icon_url.clone()).filter(|u| !u.is_empty()),
            ),
            NodeKind::Group => (NodeType::Group, None, None),
            NodeKind::Exclusion => (NodeType::Exclusion, None, None),
            NodeKind::Ip => (NodeType::Ip, None, None),
        };

        ExclusionDto {
            id: self.id.clone(),
            node_type,
            hostname: self.hostname.clone(),
            state: self.state,
            service_name,
            icon_url,
            children: self.children.iter().map(ExclusionNode::to_dto).collect(),
        }
    }
}

/// Node type tag of [`ExclusionDto`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeType {
    Root,
    Service,
    Group,
    Exclusion,
    Ip,
}

/// Serialized tree node handed to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExclusionDto {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    pub hostname: String,
    pub state: ExclusionState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ExclusionDto>,
}

/// Immutable tree built from one mode's flat collections.
#[derive(Debug, Clone)]
pub struct ExclusionsTree {
    root: ExclusionNode,
}

impl ExclusionsTree {
    /// Build the tree.
    ///
    /// Services come first, then standalone groups, then IPs. Service
    /// names and icons are refreshed from the catalog when it knows them.
    pub fn build(
        services: &[Service],
        groups: &[ExclusionsGroup],
        ips: &[Exclusion],
        catalog: &dyn ServicesProvider,
    ) -> Self {
        let children: Vec<_> = services
            .iter()
            .map(|s| ExclusionNode::service(s, catalog))
            .chain(groups.iter().map(ExclusionNode::group))
            .chain(ips.iter().map(|ip| ExclusionNode::leaf(ip, NodeKind::Ip)))
            .collect();

        Self {
            root: ExclusionNode::inner(ROOT_ID.to_string(), String::new(), NodeKind::Root, children),
        }
    }

    /// Build the tree of a mode's collections.
    pub fn from_data(data: &ExclusionsData, catalog: &dyn ServicesProvider) -> Self {
        Self::build(
            &data.excluded_services,
            &data.exclusions_groups,
            &data.excluded_ips,
            catalog,
        )
    }

    /// The root node.
    pub fn root(&self) -> &ExclusionNode {
        &self.root
    }

    /// Find a node by id.
    pub fn get_exclusion_node(&self, id: &str) -> Option<&ExclusionNode> {
        self.root.find(id)
    }

    /// Find the parent of a node. `None` for the root or an unknown id.
    pub fn get_parent_exclusion_node(&self, id: &str) -> Option<&ExclusionNode> {
        self.root.find_parent(id)
    }

    /// Ids of every leaf under a node; `[id]` when the node is a leaf.
    pub fn get_path_exclusions(&self, id: &str) -> Option<Vec<String>> {
        self.get_exclusion_node(id).map(ExclusionNode::leaf_ids)
    }

    /// Aggregated state of a node.
    pub fn get_exclusion_state(&self, id: &str) -> Option<ExclusionState> {
        self.get_exclusion_node(id).map(|n| n.state)
    }

    /// Hostnames of enabled leaves, deduplicated, in tree order.
    pub fn enabled_hostnames(&self) -> Vec<String> {
        let mut seen = AHashSet::new();
        let mut out = Vec::new();
        self.root.collect_enabled(&mut seen, &mut out);
        out
    }

    /// Serializable view of the whole tree.
    pub fn serialize(&self) -> ExclusionDto {
        self.root.to_dto()
    }
}
