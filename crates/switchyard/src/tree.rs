//! The radix tree behind every dispatch table.
//!
//! Patterns are stored as a compressed prefix tree. Each node carries the
//! label of the edge from its parent: a static byte run, `":"` for a
//! single-segment parameter, or `"*"` for the trailing catch-all. A node
//! has either static children (indexed by the first byte of their label)
//! or a single placeholder child, never both.
//!
//! Nodes live in an arena owned by the tree; [`RouteId`] is an index into
//! it and the parent back-reference is an index too, so removal can
//! climb without reference cycles. A `RouteId` stays valid until the
//! route (or an ancestor) is removed.
//!
//! Mutation is not safe against concurrent matching. Callers either
//! build the tree before serving or serialize mutations externally.

use crate::error::RouteError;
use crate::handler::HandlerChain;
use crate::pattern::{common_prefix_boundary, split_pattern, PatternToken};

/// A captured parameter value: byte range into the matched path.
pub type ParamSpan = (usize, usize);

/// Handle to a node in a [`RouteTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteId(u32);

const ROOT: RouteId = RouteId(0);

/// Static children are indexed by the first byte of their label.
const FANOUT: usize = 256;

#[derive(Clone)]
struct RouteNode {
    /// Edge label from the parent. `":"`, `"*"`, or a static run.
    label: String,
    /// Concatenated labels from the root; used in error messages.
    full_path: String,
    /// Non-empty on a terminal node.
    handlers: HandlerChain,
    /// Static children, keyed on `label[0]`.
    statics: Box<[Option<RouteId>; FANOUT]>,
    /// The single parameter or catch-all child.
    param: Option<RouteId>,
    /// Back-reference, used only while removing.
    parent: Option<RouteId>,
}

impl RouteNode {
    fn vacant() -> Self {
        Self {
            label: String::new(),
            full_path: String::new(),
            handlers: Vec::new(),
            statics: Box::new([None; FANOUT]),
            param: None,
            parent: None,
        }
    }

    fn is_param(&self) -> bool {
        self.label == ":"
    }

    fn is_catch_all(&self) -> bool {
        self.label == "*"
    }

    fn is_placeholder(&self) -> bool {
        self.is_param() || self.is_catch_all()
    }

    fn first_static(&self) -> Option<RouteId> {
        self.statics.iter().find_map(|slot| *slot)
    }
}

/// A compressed prefix tree mapping route patterns to handler chains.
///
/// ```
/// use switchyard::RouteTree;
///
/// let mut tree = RouteTree::new();
/// let id = tree.insert("/users/:/posts").unwrap();
/// assert_eq!(tree.find("/users/:/posts"), Some(id));
///
/// let mut captures = Vec::new();
/// assert_eq!(tree.lookup("/users/42/posts", &mut captures), Some(id));
/// assert_eq!(captures, vec![(7, 9)]); // "42"
/// ```
pub struct RouteTree {
    nodes: Vec<RouteNode>,
    free: Vec<u32>,
}

impl Default for RouteTree {
    fn default() -> Self {
        Self::new()
    }
}

impl RouteTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![RouteNode::vacant()],
            free: Vec::new(),
        }
    }

    /// True if no pattern has been inserted (or all have been removed).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let root = &self.nodes[0];
        root.label.is_empty() && root.handlers.is_empty()
    }

    /// The full registered pattern prefix ending at `id`.
    #[must_use]
    pub fn pattern(&self, id: RouteId) -> &str {
        &self.node(id).full_path
    }

    /// The edge label of `id`.
    #[must_use]
    pub fn label(&self, id: RouteId) -> &str {
        &self.node(id).label
    }

    /// The handler chain attached to `id`.
    #[must_use]
    pub fn chain(&self, id: RouteId) -> &HandlerChain {
        &self.node(id).handlers
    }

    /// Mutable access to the handler chain of `id`.
    ///
    /// Registering attaches handlers through this; callers may also use
    /// it to replace a route's chain later.
    pub fn chain_mut(&mut self, id: RouteId) -> &mut HandlerChain {
        &mut self.node_mut(id).handlers
    }

    /// Iterate the static children of `id`.
    pub fn static_children(&self, id: RouteId) -> impl Iterator<Item = RouteId> + '_ {
        self.node(id).statics.iter().filter_map(|slot| *slot)
    }

    /// The parameter or catch-all child of `id`, if any.
    #[must_use]
    pub fn param_child(&self, id: RouteId) -> Option<RouteId> {
        self.node(id).param
    }

    fn node(&self, id: RouteId) -> &RouteNode {
        &self.nodes[id.0 as usize]
    }

    fn node_mut(&mut self, id: RouteId) -> &mut RouteNode {
        &mut self.nodes[id.0 as usize]
    }

    fn alloc(&mut self, node: RouteNode) -> RouteId {
        if let Some(slot) = self.free.pop() {
            self.nodes[slot as usize] = node;
            RouteId(slot)
        } else {
            self.nodes.push(node);
            RouteId(self.nodes.len() as u32 - 1)
        }
    }

    /// Return a detached node and all of its descendants to the free list.
    fn release_subtree(&mut self, id: RouteId) {
        let mut pending = vec![id];
        while let Some(id) = pending.pop() {
            let node = std::mem::replace(self.node_mut(id), RouteNode::vacant());
            pending.extend(node.statics.iter().flatten().copied());
            pending.extend(node.param);
            self.free.push(id.0);
        }
    }

    // ------------------------------------------------------------------
    // Insert
    // ------------------------------------------------------------------

    /// Insert a pattern and return its terminal node.
    ///
    /// Inserting an already-registered pattern returns the existing
    /// terminal unchanged.
    ///
    /// # Errors
    ///
    /// Fails when the pattern extends past a catch-all, mixes placeholder
    /// kinds under one parent, or would give a node both static and
    /// placeholder children. A failed insert leaves the tree exactly in
    /// its pre-call state.
    pub fn insert(&mut self, pattern: &str) -> Result<RouteId, RouteError> {
        let tokens = split_pattern(pattern);
        // A failed insert must leave the tree untouched; registration is
        // a cold path, so mutate against a restorable snapshot.
        let nodes_snapshot = self.nodes.clone();
        let free_snapshot = self.free.clone();
        match self.insert_tokens(&tokens) {
            Ok(id) => Ok(id),
            Err(err) => {
                self.nodes = nodes_snapshot;
                self.free = free_snapshot;
                Err(err)
            }
        }
    }

    fn insert_tokens(&mut self, tokens: &[PatternToken]) -> Result<RouteId, RouteError> {
        let mut rest = tokens;
        if self.nodes[0].label.is_empty() {
            let Some((first, tail)) = tokens.split_first() else {
                return Ok(ROOT);
            };
            let label = first.label().to_owned();
            let root = &mut self.nodes[0];
            root.full_path = label.clone();
            root.label = label;
            rest = tail;
        }
        let mut cur = ROOT;
        for token in rest {
            cur = match token {
                PatternToken::Static(run) => self.add_static(cur, run)?,
                PatternToken::Param | PatternToken::CatchAll => {
                    self.add_placeholder(cur, token.label())?
                }
            };
        }
        Ok(cur)
    }

    /// Attach (or reuse) the placeholder child of `cur`.
    fn add_placeholder(&mut self, cur: RouteId, label: &str) -> Result<RouteId, RouteError> {
        let node = self.node(cur);
        if node.is_catch_all() {
            return Err(RouteError::catch_all_terminal(label, &node.full_path));
        }
        if let Some(existing) = node.param {
            let existing_label = &self.node(existing).label;
            if existing_label != label {
                return Err(RouteError::param_kind_conflict(
                    label,
                    &node.full_path,
                    existing_label,
                ));
            }
            return Ok(existing);
        }
        if let Some(sibling) = node.first_static() {
            return Err(RouteError::kind_exclusion(
                label,
                &node.full_path,
                &self.node(sibling).label,
            ));
        }
        let full_path = if node.is_placeholder() {
            format!("{}/{}", node.full_path, label)
        } else {
            format!("{}{}", node.full_path, label)
        };
        let child = self.alloc(RouteNode {
            label: label.to_owned(),
            full_path,
            parent: Some(cur),
            ..RouteNode::vacant()
        });
        self.node_mut(cur).param = Some(child);
        Ok(child)
    }

    /// Walk a static run into the subtree at `cur`, splitting where the
    /// run diverges from an existing label.
    fn add_static(&mut self, cur: RouteId, incoming: &str) -> Result<RouteId, RouteError> {
        let node = self.node(cur);
        if node.is_catch_all() {
            return Err(RouteError::catch_all_terminal(incoming, &node.full_path));
        }
        if node.label == incoming {
            return Ok(cur);
        }
        if node.is_param() {
            return self.add_static_child(cur, incoming);
        }

        let keep = common_prefix_boundary(&node.label, incoming);
        if keep == 0 {
            // Shared lead byte inside a multi-byte character: there is
            // no boundary to split the labels at.
            return Err(RouteError::path_parse(incoming, &node.full_path));
        }
        let node_rest_len = node.label.len() - keep;
        let incoming_rest = &incoming[keep..];

        if incoming_rest.is_empty() {
            // The node's label properly contains the run: shorten the
            // node and push its old identity one level down.
            self.split_node(cur, keep);
            return Ok(cur);
        }
        if node_rest_len > 0 {
            // Shared strict prefix: split, then add the run's remainder
            // as a sibling of the pushed-down node.
            self.split_node(cur, keep);
        }
        self.add_static_child(cur, incoming_rest)
    }

    /// Attach `name` as a static child of `cur`, descending into an
    /// existing child that shares its first byte.
    fn add_static_child(&mut self, cur: RouteId, name: &str) -> Result<RouteId, RouteError> {
        let node = self.node(cur);
        if node.is_catch_all() {
            return Err(RouteError::catch_all_terminal(name, &node.full_path));
        }
        if let Some(placeholder) = node.param {
            return Err(RouteError::kind_exclusion(
                name,
                &node.full_path,
                &self.node(placeholder).label,
            ));
        }
        let key = usize::from(name.as_bytes()[0]);
        if let Some(existing) = node.statics[key] {
            return self.add_static(existing, name);
        }
        let full_path = if node.is_param() {
            format!("{}/{}", node.full_path, name)
        } else {
            format!("{}{}", node.full_path, name)
        };
        let child = self.alloc(RouteNode {
            label: name.to_owned(),
            full_path,
            parent: Some(cur),
            ..RouteNode::vacant()
        });
        self.node_mut(cur).statics[key] = Some(child);
        Ok(child)
    }

    /// Shorten `cur`'s label to its first `keep` bytes and move its
    /// handlers and children onto a new child labeled with the remainder.
    fn split_node(&mut self, cur: RouteId, keep: usize) {
        let node = self.node_mut(cur);
        let moved_label = node.label.split_off(keep);
        let key = usize::from(moved_label.as_bytes()[0]);
        let parent_full_len = node.full_path.len() - moved_label.len();
        let child_full_path = node.full_path.clone();
        node.full_path.truncate(parent_full_len);
        let moved = RouteNode {
            label: moved_label,
            full_path: child_full_path,
            handlers: std::mem::take(&mut node.handlers),
            statics: std::mem::replace(&mut node.statics, Box::new([None; FANOUT])),
            param: node.param.take(),
            parent: Some(cur),
        };
        let child = self.alloc(moved);
        self.node_mut(cur).statics[key] = Some(child);

        // The relocated grandchildren now hang off the new child.
        let grandchildren: Vec<RouteId> = {
            let child_node = self.node(child);
            child_node
                .statics
                .iter()
                .flatten()
                .copied()
                .chain(child_node.param)
                .collect()
        };
        for grandchild in grandchildren {
            self.node_mut(grandchild).parent = Some(child);
        }
    }

    // ------------------------------------------------------------------
    // Find
    // ------------------------------------------------------------------

    /// Exact lookup of a registered pattern.
    ///
    /// Walks the pattern's tokens in lockstep with node labels. Returns
    /// `None` as soon as any step diverges; probing for an absent
    /// pattern is a normal outcome, not an error.
    #[must_use]
    pub fn find(&self, pattern: &str) -> Option<RouteId> {
        let tokens = split_pattern(pattern);
        let mut tokens = tokens.iter();
        let first = tokens.next()?;

        let mut cur = ROOT;
        let mut name = first.label();
        loop {
            let node = self.node(cur);
            if node.label.len() > name.len() || !name.starts_with(node.label.as_str()) {
                return None;
            }
            name = &name[node.label.len()..];
            if name.is_empty() {
                break;
            }
            cur = node.statics[usize::from(name.as_bytes()[0])]?;
        }

        for token in tokens {
            match token {
                PatternToken::Param | PatternToken::CatchAll => {
                    cur = self.node(cur).param?;
                    if self.node(cur).label != token.label() {
                        return None;
                    }
                }
                PatternToken::Static(run) => {
                    let mut name = run.as_str();
                    loop {
                        cur = self.node(cur).statics[usize::from(name.as_bytes()[0])]?;
                        let node = self.node(cur);
                        if node.label.len() > name.len() || !name.starts_with(node.label.as_str()) {
                            return None;
                        }
                        name = &name[node.label.len()..];
                        if name.is_empty() {
                            break;
                        }
                    }
                }
            }
        }
        Some(cur)
    }

    // ------------------------------------------------------------------
    // Match
    // ------------------------------------------------------------------

    /// Match a URL path in one left-to-right pass.
    ///
    /// Captured parameter values are appended to `params` as byte ranges
    /// into `path`, in pattern order; nothing is allocated once `params`
    /// has capacity. A `:` with no `/` left in the path captures the
    /// whole remainder (possibly empty) and its own node is returned —
    /// the dispatcher only runs it if it carries handlers.
    #[must_use]
    pub fn lookup(&self, path: &str, params: &mut Vec<ParamSpan>) -> Option<RouteId> {
        let bytes = path.as_bytes();
        let mut cur = ROOT;
        let mut offset = 0;
        'walk: loop {
            let node = self.node(cur);
            let label = node.label.as_bytes();
            let rest = &bytes[offset..];
            if label.len() < rest.len() {
                if &rest[..label.len()] != label {
                    return None;
                }
                offset += label.len();
                'captures: loop {
                    let Some(placeholder) = self.node(cur).param else {
                        break 'captures;
                    };
                    let rest = &bytes[offset..];
                    if self.node(placeholder).is_param() {
                        // Scan for the segment boundary; starts at 1 so a
                        // capture before a boundary is never empty.
                        for i in 1..rest.len() {
                            if rest[i] == b'/' {
                                params.push((offset, offset + i));
                                offset += i + 1;
                                cur = placeholder;
                                continue 'captures;
                            }
                        }
                    }
                    // Catch-all, or a parameter at the final segment:
                    // the remainder is the capture.
                    params.push((offset, bytes.len()));
                    return Some(placeholder);
                }
                let rest = &bytes[offset..];
                let first = *rest.first()?;
                match self.node(cur).statics[usize::from(first)] {
                    Some(next) => {
                        cur = next;
                        continue 'walk;
                    }
                    None => return None,
                }
            }
            if rest == label {
                return Some(cur);
            }
            return None;
        }
    }

    // ------------------------------------------------------------------
    // Remove
    // ------------------------------------------------------------------

    /// Remove a registered pattern and its whole subtree.
    ///
    /// Returns `false` when the pattern is not in the tree. After
    /// detaching, parents left without handlers are compacted: an empty
    /// parent chain is climbed and removed, and a parent with exactly one
    /// remaining static child is merged with it. Placeholder parents are
    /// never merged or climbed past.
    pub fn remove(&mut self, pattern: &str) -> bool {
        let Some(target) = self.find(pattern) else {
            return false;
        };
        let mut cur = target;
        loop {
            if cur == ROOT {
                self.reset_root();
                return true;
            }
            let Some(parent) = self.node(cur).parent else {
                return true;
            };
            let (placeholder, key) = {
                let node = self.node(cur);
                (node.is_placeholder(), node.label.as_bytes().first().copied())
            };
            if placeholder {
                self.node_mut(parent).param = None;
            } else if let Some(key) = key {
                self.node_mut(parent).statics[usize::from(key)] = None;
            }
            self.release_subtree(cur);

            let parent_node = self.node(parent);
            if !parent_node.handlers.is_empty() {
                return true;
            }
            if parent_node.is_placeholder() {
                // A `:` node may still hold live static children; leave
                // it alone either way.
                return true;
            }
            let mut remaining = self.static_children(parent).take(2);
            let first = remaining.next();
            let second = remaining.next();
            drop(remaining);
            match (first, second) {
                (Some(_), Some(_)) => return true,
                (Some(only), None) => {
                    self.merge_with_child(parent, only);
                    return true;
                }
                _ => {
                    // Parent is now empty; keep climbing.
                    cur = parent;
                }
            }
        }
    }

    /// Fold a sole remaining static child back into `parent`.
    fn merge_with_child(&mut self, parent: RouteId, child: RouteId) {
        let child_node = std::mem::replace(self.node_mut(child), RouteNode::vacant());
        self.free.push(child.0);

        let parent_node = self.node_mut(parent);
        parent_node.label.push_str(&child_node.label);
        parent_node.full_path = child_node.full_path;
        parent_node.handlers = child_node.handlers;
        parent_node.statics = child_node.statics;
        parent_node.param = child_node.param;

        let grandchildren: Vec<RouteId> = {
            let parent_node = self.node(parent);
            parent_node
                .statics
                .iter()
                .flatten()
                .copied()
                .chain(parent_node.param)
                .collect()
        };
        for grandchild in grandchildren {
            self.node_mut(grandchild).parent = Some(parent);
        }
    }

    /// Put the root back into the empty-tree state.
    fn reset_root(&mut self) {
        let children: Vec<RouteId> = {
            let root = &self.nodes[0];
            root.statics.iter().flatten().copied().chain(root.param).collect()
        };
        for child in children {
            self.release_subtree(child);
        }
        self.nodes[0] = RouteNode::vacant();
    }
}
