use std::collections::HashMap;
use std::ops::Index;

use super::cycle_detector::CycleDetector;
use super::include_path::IncludePathValidator;
use crate::config::CompilerOptions;
use crate::entity_metadata::{MetadataProvider, NavigationDescriptor, RelationshipKind};
use crate::types::{Result, TrellisError};

/// Alias of the root entity in every compilation
pub const ROOT_ALIAS: &str = "t0";

/// Index of a node inside its [`IncludeForest`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// One resolved relationship hop
#[derive(Debug, Clone, PartialEq)]
pub struct IncludeNode {
    pub id: NodeId,
    /// Declared navigation property name
    pub property: String,
    /// Full dotted path from the root, using declared names
    pub path: String,
    pub parent_entity: String,
    pub related_entity: String,
    pub related_table: String,
    pub alias: String,
    pub relationship: RelationshipKind,
    pub is_collection: bool,
    pub parent_primary_key: String,
    pub related_primary_key: String,
    /// 1 for navigations of the root entity
    pub depth: usize,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

/// Arena of include nodes, one per unique full path
#[derive(Debug, Clone, Default)]
pub struct IncludeForest {
    nodes: Vec<IncludeNode>,
    roots: Vec<NodeId>,
    by_path: HashMap<String, NodeId>,
}

impl IncludeForest {
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&IncludeNode> {
        self.nodes.get(id.0)
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn find(&self, path: &str) -> Option<&IncludeNode> {
        self.by_path.get(path).map(|id| &self.nodes[id.0])
    }

    pub fn find_by_alias(&self, alias: &str) -> Option<&IncludeNode> {
        self.nodes.iter().find(|n| n.alias == alias)
    }

    /// Nodes in creation order
    pub fn iter(&self) -> impl Iterator<Item = &IncludeNode> {
        self.nodes.iter()
    }

    /// Children of `parent`, or the roots when `parent` is `None`
    pub fn children_of(&self, parent: Option<NodeId>) -> &[NodeId] {
        match parent {
            Some(id) => &self.nodes[id.0].children,
            None => &self.roots,
        }
    }

    /// Pre-order walk: every parent comes before its children
    pub fn depth_first(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev().copied());
        }
        order
    }

    /// Alias of the table a node joins from
    pub fn parent_alias(&self, id: NodeId) -> &str {
        match self.nodes[id.0].parent {
            Some(parent) => &self.nodes[parent.0].alias,
            None => ROOT_ALIAS,
        }
    }

    fn push(&mut self, mut node: IncludeNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        node.id = id;
        match node.parent {
            Some(parent) => self.nodes[parent.0].children.push(id),
            None => self.roots.push(id),
        }
        self.by_path.insert(node.path.clone(), id);
        self.nodes.push(node);
        id
    }
}

impl Index<NodeId> for IncludeForest {
    type Output = IncludeNode;

    fn index(&self, id: NodeId) -> &IncludeNode {
        &self.nodes[id.0]
    }
}

/// Turns dotted include paths into an [`IncludeForest`].
///
/// Paths sharing a prefix share nodes; join aliases (`t1`, `t2`, ...) are
/// handed out in the order nodes are first created.
pub struct IncludeTreeBuilder<'a> {
    provider: &'a dyn MetadataProvider,
    validator: IncludePathValidator,
    detector: CycleDetector,
    max_depth: usize,
    next_alias: usize,
    forest: IncludeForest,
}

impl<'a> IncludeTreeBuilder<'a> {
    pub fn new(provider: &'a dyn MetadataProvider, options: &CompilerOptions) -> Self {
        Self {
            provider,
            validator: IncludePathValidator::new(options),
            detector: CycleDetector::new(),
            max_depth: options.max_include_depth,
            next_alias: 1,
            forest: IncludeForest::default(),
        }
    }

    pub fn parse_includes<S: AsRef<str>>(
        &mut self,
        root_entity: &str,
        paths: &[S],
    ) -> Result<IncludeForest> {
        self.forest = IncludeForest::default();
        self.next_alias = 1;

        for path in paths {
            self.parse_path(root_entity, path.as_ref())?;
        }

        log::debug!(
            "built include tree for {} with {} nodes from {} paths",
            root_entity,
            self.forest.len(),
            paths.len()
        );
        Ok(std::mem::take(&mut self.forest))
    }

    fn parse_path(&mut self, root_entity: &str, path: &str) -> Result<()> {
        self.validator.validate(path)?;

        let segments: Vec<&str> = path.split('.').collect();
        if segments.len() > self.max_depth {
            return Err(TrellisError::validation(
                path,
                format!(
                    "include depth {} exceeds the maximum of {}",
                    segments.len(),
                    self.max_depth
                ),
            ));
        }

        self.detector.reset();
        let mut entity = root_entity.to_string();
        let mut parent: Option<NodeId> = None;

        for (index, segment) in segments.iter().enumerate() {
            let navigation = self
                .provider
                .resolve_navigation(&entity, segment)
                .map_err(|e| e.at_path(path))?;
            // Track the declared name so respelled segments still collide
            self.detector.enter_path(&navigation.property)?;

            let full_path = match parent {
                Some(id) => format!("{}.{}", self.forest[id].path, navigation.property),
                None => navigation.property.clone(),
            };
            let existing = self.forest.by_path.get(&full_path).copied();
            let id = match existing {
                Some(id) => id,
                None => self
                    .add_node(&entity, &navigation, full_path, index + 1, parent)
                    .map_err(|e| e.at_path(path))?,
            };

            entity = self.forest[id].related_entity.clone();
            parent = Some(id);
        }
        Ok(())
    }

    fn add_node(
        &mut self,
        parent_entity: &str,
        navigation: &NavigationDescriptor,
        path: String,
        depth: usize,
        parent: Option<NodeId>,
    ) -> Result<NodeId> {
        let related = &navigation.related_entity;
        let node = IncludeNode {
            id: NodeId(0),
            property: navigation.property.clone(),
            path,
            parent_entity: parent_entity.to_string(),
            related_entity: related.clone(),
            related_table: self.provider.table_name(related)?,
            alias: format!("t{}", self.next_alias),
            relationship: navigation.relationship.clone(),
            is_collection: navigation.is_collection,
            parent_primary_key: self.provider.primary_key_column(parent_entity)?,
            related_primary_key: self.provider.primary_key_column(related)?,
            depth,
            parent,
            children: Vec::new(),
        };
        self.next_alias += 1;
        log::trace!("include node {} -> {} as {}", node.path, node.related_table, node.alias);
        Ok(self.forest.push(node))
    }
}
