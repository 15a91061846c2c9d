//! Feature tree
//!
//! Instances live in an arena and are addressed by [`NodeId`]. Roots are kept
//! in document order; nested instances are listed in the `children` of the
//! `items` parameter that owns them, so there is exactly one container for
//! every node.

use tracing::debug;

use crate::feature::FeatureInstance;
use crate::param::ValueContext;
use crate::template::FeatureTemplate;

/// Index of a node in its document's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Where a nested node hangs: the owning feature and its items parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent {
    pub node: NodeId,
    pub param: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// Insertion point for new or moved nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertAt {
    /// After the last root
    End,
    Before(NodeId),
    After(NodeId),
    /// At the end of the node's first items parameter, or after it when it has none
    Into(NodeId),
}

#[derive(Debug, Clone, PartialEq)]
struct Node {
    feature: FeatureInstance,
    parent: Option<Parent>,
}

/// Counter base for short ids; the first one handed out is 10
const SHORT_ID_BASE: u32 = 9;

/// The ordered forest of feature instances making up a project.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    nodes: Vec<Option<Node>>,
    /// Slots emptied by removal, reused by the next insert
    free: Vec<NodeId>,
    roots: Vec<NodeId>,
    last_short_id: u32,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            roots: Vec::new(),
            last_short_id: SHORT_ID_BASE,
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn feature(&self, id: NodeId) -> Option<&FeatureInstance> {
        self.node(id).map(|n| &n.feature)
    }

    pub fn feature_mut(&mut self, id: NodeId) -> Option<&mut FeatureInstance> {
        self.node_mut(id).map(|n| &mut n.feature)
    }

    pub fn parent(&self, id: NodeId) -> Option<Parent> {
        self.node(id).and_then(|n| n.parent)
    }

    /// Nested instances of every items parameter, in parameter order
    pub fn children(&self, id: NodeId) -> Vec<NodeId> {
        self.feature(id)
            .map(|f| f.params.iter().flat_map(|p| p.children.iter().copied()).collect())
            .unwrap_or_default()
    }

    fn container(&self, parent: Option<Parent>) -> Option<&Vec<NodeId>> {
        match parent {
            None => Some(&self.roots),
            Some(p) => self
                .feature(p.node)?
                .params
                .get(p.param)
                .filter(|param| param.is_items())
                .map(|param| &param.children),
        }
    }

    fn container_mut(&mut self, parent: Option<Parent>) -> Option<&mut Vec<NodeId>> {
        match parent {
            None => Some(&mut self.roots),
            Some(p) => self
                .feature_mut(p.node)?
                .params
                .get_mut(p.param)
                .filter(|param| param.is_items())
                .map(|param| &mut param.children),
        }
    }

    /// Position of a node among its siblings
    pub fn index_of(&self, id: NodeId) -> Option<usize> {
        let node = self.node(id)?;
        self.container(node.parent)?.iter().position(|&n| n == id)
    }

    /// True when `node` is `ancestor` or lies below it
    pub fn is_within(&self, node: NodeId, ancestor: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id).map(|p| p.node);
        }
        false
    }

    /// Depth-first pre-order walk yielding each node and its nesting level
    pub fn walk(&self) -> Vec<(NodeId, usize)> {
        fn visit(doc: &Document, id: NodeId, depth: usize, out: &mut Vec<(NodeId, usize)>) {
            out.push((id, depth));
            for child in doc.children(id) {
                visit(doc, child, depth + 1, out);
            }
        }
        let mut out = Vec::new();
        for &root in &self.roots {
            visit(self, root, 0, &mut out);
        }
        out
    }

    pub fn find_by_id(&self, instance_id: &str) -> Option<NodeId> {
        self.walk()
            .into_iter()
            .map(|(id, _)| id)
            .find(|&id| self.feature(id).is_some_and(|f| f.id == instance_id))
    }

    /// Tree address: `root`, then `:<param>:<child>` per nesting level
    pub fn path_of(&self, id: NodeId) -> Option<String> {
        let index = self.index_of(id)?;
        match self.parent(id) {
            None => Some(index.to_string()),
            Some(p) => Some(format!("{}:{}:{}", self.path_of(p.node)?, p.param, index)),
        }
    }

    pub fn find_by_path(&self, path: &str) -> Option<NodeId> {
        let mut parts = path.split(':').map(|s| s.trim().parse::<usize>().ok());
        let mut current = *self.roots.get(parts.next()??)?;
        loop {
            let Some(param) = parts.next() else {
                return Some(current);
            };
            let child = parts.next()??;
            let parent = Some(Parent {
                node: current,
                param: param?,
            });
            current = *self.container(parent)?.get(child)?;
        }
    }

    /// Next free `<type>_NNN` id
    pub fn next_feature_id(&self, type_id: &str) -> String {
        let prefix = format!("{}_", type_id);
        let highest = self
            .nodes
            .iter()
            .flatten()
            .filter_map(|n| n.feature.id.strip_prefix(&prefix))
            .filter_map(|num| num.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        format!("{}{:03}", prefix, highest + 1)
    }

    /// Short id of an instance, handing out the next one on first use
    pub fn short_id(&mut self, id: NodeId) -> Option<u32> {
        let next = self.last_short_id + 1;
        let feature = self.feature_mut(id)?;
        if let Some(short) = feature.short_id {
            return Some(short);
        }
        feature.short_id = Some(next);
        self.last_short_id = next;
        Some(next)
    }

    /// Forget every short id; the next one handed out is 10 again
    pub fn reset_short_ids(&mut self) {
        for node in self.nodes.iter_mut().flatten() {
            node.feature.short_id = None;
        }
        self.last_short_id = SHORT_ID_BASE;
    }

    fn push_node(&mut self, feature: FeatureInstance) -> NodeId {
        let node = Node {
            feature,
            parent: None,
        };
        if let Some(id) = self.free.pop() {
            self.nodes[id.0] = Some(node);
            return id;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(Some(node));
        id
    }

    fn resolve(&self, at: InsertAt) -> Option<(Option<Parent>, usize)> {
        match at {
            InsertAt::End => Some((None, self.roots.len())),
            InsertAt::Before(n) => Some((self.parent(n), self.index_of(n)?)),
            InsertAt::After(n) => Some((self.parent(n), self.index_of(n)? + 1)),
            InsertAt::Into(n) => {
                let feature = self.feature(n)?;
                match feature.items_params().next() {
                    Some(param) => {
                        let len = feature.params[param].children.len();
                        Some((Some(Parent { node: n, param }), len))
                    }
                    None => self.resolve(InsertAt::After(n)),
                }
            }
        }
    }

    fn attach(&mut self, id: NodeId, parent: Option<Parent>, index: usize) -> bool {
        let Some(list) = self.container_mut(parent) else {
            return false;
        };
        let index = index.min(list.len());
        list.insert(index, id);
        if let Some(node) = self.node_mut(id) {
            node.parent = parent;
        }
        true
    }

    fn attach_at(&mut self, id: NodeId, at: InsertAt) -> bool {
        match self.resolve(at) {
            Some((parent, index)) => self.attach(id, parent, index),
            None => self.attach(id, None, self.roots.len()),
        }
    }

    fn detach(&mut self, id: NodeId) -> Option<(Option<Parent>, usize)> {
        let parent = self.node(id)?.parent;
        let list = self.container_mut(parent)?;
        let index = list.iter().position(|&n| n == id)?;
        list.remove(index);
        if let Some(node) = self.node_mut(id) {
            node.parent = None;
        }
        Some((parent, index))
    }

    /// Insert an already-identified instance
    pub fn insert_feature(&mut self, feature: FeatureInstance, at: InsertAt) -> NodeId {
        let id = self.push_node(feature);
        self.attach_at(id, at);
        id
    }

    /// Append an instance to items parameter `param` of `owner`
    pub fn push_child(
        &mut self,
        owner: NodeId,
        param: usize,
        feature: FeatureInstance,
    ) -> Option<NodeId> {
        let parent = Some(Parent { node: owner, param });
        let len = self.container(parent)?.len();
        let id = self.push_node(feature);
        self.attach(id, parent, len);
        Some(id)
    }

    /// Create an instance of `template` with a fresh id and run its init hook
    pub fn add_instance(
        &mut self,
        template: &FeatureTemplate,
        at: InsertAt,
        ctx: &ValueContext,
    ) -> NodeId {
        let mut feature = FeatureInstance::from_template(template);
        feature.id = self.next_feature_id(&feature.type_id);
        feature.run_init(ctx);
        debug!("Adding feature {}", feature.id);
        self.insert_feature(feature, at)
    }

    /// Delete a node and everything nested in it
    pub fn remove_instance(&mut self, id: NodeId) -> bool {
        if self.detach(id).is_none() {
            return false;
        }
        let mut pending = vec![id];
        while let Some(n) = pending.pop() {
            pending.extend(self.children(n));
            if let Some(slot) = self.nodes.get_mut(n.0) {
                if slot.take().is_some() {
                    self.free.push(n);
                }
            }
        }
        true
    }

    /// Swap with the neighbouring sibling; false at either end
    pub fn move_instance(&mut self, id: NodeId, direction: Direction) -> bool {
        let Some(parent) = self.node(id).map(|n| n.parent) else {
            return false;
        };
        let Some(index) = self.index_of(id) else {
            return false;
        };
        let Some(list) = self.container_mut(parent) else {
            return false;
        };
        let other = match direction {
            Direction::Up if index > 0 => index - 1,
            Direction::Down if index + 1 < list.len() => index + 1,
            _ => return false,
        };
        list.swap(index, other);
        true
    }

    /// Move `id` into the first items parameter of `container`.
    ///
    /// Lands at the front when `container` is the next sibling, at the end
    /// otherwise.
    pub fn append_to_items(&mut self, id: NodeId, container: NodeId) -> bool {
        if !self.contains(id) || self.is_within(container, id) {
            return false;
        }
        let Some(param) = self.feature(container).and_then(|f| f.items_params().next()) else {
            return false;
        };
        let follows = self.parent(id) == self.parent(container)
            && matches!(
                (self.index_of(id), self.index_of(container)),
                (Some(a), Some(b)) if b == a + 1
            );
        if self.detach(id).is_none() {
            return false;
        }
        let target = Some(Parent {
            node: container,
            param,
        });
        let index = if follows {
            0
        } else {
            self.container(target).map_or(0, Vec::len)
        };
        self.attach(id, target, index)
    }

    /// Move a nested node out, just before the feature that owns it
    pub fn remove_from_items(&mut self, id: NodeId) -> bool {
        let Some(owner) = self.parent(id).map(|p| p.node) else {
            return false;
        };
        if self.detach(id).is_none() {
            return false;
        }
        self.attach_at(id, InsertAt::Before(owner))
    }

    /// Copy `id` and its subtree from `src` into this arena; the copy is not attached
    fn copy_node(&mut self, src: &Document, id: NodeId, fresh_ids: bool) -> Option<NodeId> {
        let mut feature = src.feature(id)?.clone();
        let nested: Vec<Vec<NodeId>> = feature
            .params
            .iter_mut()
            .map(|p| std::mem::take(&mut p.children))
            .collect();
        if fresh_ids {
            feature.id = self.next_feature_id(&feature.type_id);
        }
        feature.short_id = None;
        let new_id = self.push_node(feature);
        for (param, kids) in nested.into_iter().enumerate() {
            for kid in kids {
                if let Some(copy) = self.copy_node(src, kid, fresh_ids) {
                    let parent = Some(Parent { node: new_id, param });
                    let len = self.container(parent).map_or(0, Vec::len);
                    self.attach(copy, parent, len);
                }
            }
        }
        Some(new_id)
    }

    /// Standalone document holding a copy of the subtree at `id`
    pub fn extract(&self, id: NodeId) -> Option<Document> {
        let mut doc = Document::new();
        let root = doc.copy_node(self, id, false)?;
        doc.roots.push(root);
        Some(doc)
    }

    /// Insert copies of all roots of `other`, in order, with fresh ids
    pub fn graft(&mut self, other: &Document, at: InsertAt) -> Vec<NodeId> {
        let mut inserted: Vec<NodeId> = Vec::new();
        for &root in &other.roots {
            let Some(copy) = self.copy_node(other, root, true) else {
                continue;
            };
            let position = match inserted.last() {
                Some(&prev) => InsertAt::After(prev),
                None => at,
            };
            self.attach_at(copy, position);
            inserted.push(copy);
        }
        inserted
    }

    /// Deep copy inserted right after the original
    pub fn duplicate(&mut self, id: NodeId) -> Option<NodeId> {
        let snippet = self.extract(id)?;
        self.graft(&snippet, InsertAt::After(id)).into_iter().next()
    }

    /// Give every instance a fresh id, in walk order
    pub fn reassign_ids(&mut self) {
        for (id, _) in self.walk() {
            if let Some(node) = self.node_mut(id) {
                node.feature.id.clear();
            }
        }
        for (id, _) in self.walk() {
            let Some(type_id) = self.feature(id).map(|f| f.type_id.clone()) else {
                continue;
            };
            let fresh = self.next_feature_id(&type_id);
            if let Some(f) = self.feature_mut(id) {
                f.id = fresh;
            }
        }
    }

    pub fn rename(&mut self, id: NodeId, name: &str) -> bool {
        match self.feature_mut(id) {
            Some(f) if f.name != name => {
                f.name = name.to_string();
                true
            }
            _ => false,
        }
    }

    pub fn set_feature_value(&mut self, id: NodeId, value: &str) -> bool {
        match self.feature_mut(id) {
            Some(f) if f.value != value => {
                f.value = value.to_string();
                true
            }
            _ => false,
        }
    }

    /// Replace the instance stored at `id`, keeping its place in the tree.
    ///
    /// Nested nodes listed in the new instance's items parameters are
    /// re-parented to it.
    pub(crate) fn replace_feature(&mut self, id: NodeId, feature: FeatureInstance) -> bool {
        let links: Vec<(usize, NodeId)> = feature
            .params
            .iter()
            .enumerate()
            .flat_map(|(param, p)| p.children.iter().map(move |&child| (param, child)))
            .collect();
        match self.node_mut(id) {
            Some(node) => node.feature = feature,
            None => return false,
        }
        for (param, child) in links {
            if let Some(node) = self.node_mut(child) {
                node.parent = Some(Parent { node: id, param });
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUP: &str = "[SUBROUTINE]\ntype = group\nname = Group\n\n[PARAM_ITEMS]\ntype = items\n";
    const DRILL: &str = "[SUBROUTINE]\ntype = drill\nname = Drill\n\n[PARAM_DEPTH]\ntype = float\nvalue = -0.5\n";

    fn templates() -> (FeatureTemplate, FeatureTemplate) {
        (
            FeatureTemplate::parse("group.cfg", GROUP).unwrap(),
            FeatureTemplate::parse("drill.cfg", DRILL).unwrap(),
        )
    }

    fn ids(doc: &Document) -> Vec<String> {
        doc.walk()
            .into_iter()
            .map(|(n, _)| doc.feature(n).unwrap().id.clone())
            .collect()
    }

    #[test]
    fn test_removed_slots_are_reused() {
        let (group, drill) = templates();
        let ctx = ValueContext::default();
        let mut doc = Document::new();
        let mut g = doc.add_instance(&group, InsertAt::End, &ctx);
        doc.add_instance(&drill, InsertAt::Into(g), &ctx);
        doc.add_instance(&drill, InsertAt::Into(g), &ctx);
        let keep = doc.add_instance(&drill, InsertAt::End, &ctx);

        for _ in 0..50 {
            assert!(doc.remove_instance(g));
            g = doc.add_instance(&group, InsertAt::Before(keep), &ctx);
            doc.add_instance(&drill, InsertAt::Into(g), &ctx);
            doc.add_instance(&drill, InsertAt::Into(g), &ctx);
            assert_eq!(doc.nodes.len(), 4);
        }
        assert_eq!(doc.len(), 4);
        assert_eq!(doc.feature(keep).unwrap().id, "drill_003");
    }

    #[test]
    fn test_ids_are_sequential_per_type() {
        let (group, drill) = templates();
        let ctx = ValueContext::default();
        let mut doc = Document::new();
        doc.add_instance(&drill, InsertAt::End, &ctx);
        doc.add_instance(&group, InsertAt::End, &ctx);
        doc.add_instance(&drill, InsertAt::End, &ctx);
        assert_eq!(ids(&doc), vec!["drill_001", "group_001", "drill_002"]);
    }

    #[test]
    fn test_move_at_boundary_is_noop() {
        let (_, drill) = templates();
        let ctx = ValueContext::default();
        let mut doc = Document::new();
        let a = doc.add_instance(&drill, InsertAt::End, &ctx);
        let b = doc.add_instance(&drill, InsertAt::End, &ctx);
        assert!(!doc.move_instance(a, Direction::Up));
        assert!(!doc.move_instance(b, Direction::Down));
        assert!(doc.move_instance(b, Direction::Up));
        assert_eq!(doc.roots(), &[b, a]);
    }

    #[test]
    fn test_append_and_remove_from_items() {
        let (group, drill) = templates();
        let ctx = ValueContext::default();
        let mut doc = Document::new();
        let d1 = doc.add_instance(&drill, InsertAt::End, &ctx);
        let g = doc.add_instance(&group, InsertAt::End, &ctx);
        let d2 = doc.add_instance(&drill, InsertAt::Into(g), &ctx);

        // g follows d1, so d1 goes to the front
        assert!(doc.append_to_items(d1, g));
        assert_eq!(doc.children(g), vec![d1, d2]);
        assert_eq!(doc.path_of(d2).as_deref(), Some("0:0:1"));
        assert_eq!(doc.find_by_path("0:0:1"), Some(d2));

        assert!(doc.remove_from_items(d2));
        assert_eq!(doc.roots(), &[d2, g]);
        assert_eq!(doc.path_of(g).as_deref(), Some("1"));

        // a container cannot move into itself
        assert!(!doc.append_to_items(g, g));
        // drill has no items parameter
        assert!(!doc.append_to_items(g, d2));
    }

    #[test]
    fn test_duplicate_deep_copies_with_fresh_ids() {
        let (group, drill) = templates();
        let ctx = ValueContext::default();
        let mut doc = Document::new();
        let g = doc.add_instance(&group, InsertAt::End, &ctx);
        doc.add_instance(&drill, InsertAt::Into(g), &ctx);
        let copy = doc.duplicate(g).unwrap();
        assert_eq!(doc.roots(), &[g, copy]);
        assert_eq!(ids(&doc), vec!["group_001", "drill_001", "group_002", "drill_002"]);
        assert!(doc.remove_instance(g));
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.find_by_id("drill_001"), None);
    }

    #[test]
    fn test_short_ids_assigned_once() {
        let (_, drill) = templates();
        let ctx = ValueContext::default();
        let mut doc = Document::new();
        let a = doc.add_instance(&drill, InsertAt::End, &ctx);
        let b = doc.add_instance(&drill, InsertAt::End, &ctx);
        assert_eq!(doc.short_id(b), Some(10));
        assert_eq!(doc.short_id(a), Some(11));
        assert_eq!(doc.short_id(b), Some(10));
        doc.reset_short_ids();
        assert_eq!(doc.short_id(a), Some(10));
    }

    #[test]
    fn test_bad_paths() {
        let doc = Document::new();
        assert_eq!(doc.find_by_path("0"), None);
        assert_eq!(doc.find_by_path("x:1"), None);
    }
}
