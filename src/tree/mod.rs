//! Value tree - the descriptor-driven control panel.
//!
//! Nodes live in a flat arena addressed by [`NodeId`]; parent and child
//! links are ids, and every group keeps a name index for O(1) path-segment
//! lookup. The root group is named after the peer identity.
//!
//! Updates arrive from two sides:
//! - remote: [`ValueTree::set_path_value`] resolves an absolute path and
//!   stores the value
//! - local: [`ValueTree::on_local_change`] stores a user edit and bubbles it
//!   to the root, which hands it to a [`ChangeSink`]
//!
//! # Example
//!
//! ```
//! use blegui_client::protocol::DescriptorNode;
//! use blegui_client::tree::ValueTree;
//! use blegui_client::value::TaggedValue;
//!
//! let doc = br#"{"type":"root","name":"","elements":[
//!     {"type":"range","name":"Brightness","min":0,"max":255,"value":10}]}"#;
//!
//! let mut tree = ValueTree::new("Device1");
//! let root = tree.root();
//! tree.build_from_descriptor(root, &DescriptorNode::from_json(doc).unwrap()).unwrap();
//!
//! tree.set_path_value(&["Device1", "Brightness"], &TaggedValue::Int32(42)).unwrap();
//! assert_eq!(tree.value_at(&["Device1", "Brightness"]).unwrap(), Some(TaggedValue::Int32(42)));
//! ```

mod build;
mod control;

use std::collections::HashMap;
use std::fmt;

use crate::error::{GuiError, Result};
use crate::protocol::CustomControlAnnounce;
use crate::value::{RgbwColor, TaggedValue};

pub use control::Control;

/// Opaque handle to a node in a [`ValueTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

/// Receives local edits once they reach the root.
pub trait ChangeSink {
    /// Transmit `value` for the control at `path`, relative to the root.
    fn set_remote_value(&mut self, path: &[String], value: TaggedValue) -> Result<()>;

    /// Transmit a color for a control bound to its own characteristic.
    fn set_custom_color(&mut self, uuid: &str, color: RgbwColor) {
        tracing::warn!(
            "no handler for custom color {:?} on characteristic {}",
            color,
            uuid
        );
    }
}

/// A group's children and display flags.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    children: Vec<NodeId>,
    by_name: HashMap<String, NodeId>,
    collapsible: bool,
    collapsed: bool,
}

impl Group {
    /// Children in insertion order.
    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn collapsible(&self) -> bool {
        self.collapsible
    }

    pub fn collapsed(&self) -> bool {
        self.collapsed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Group(Group),
    Control(Control),
}

/// A named node of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    name: String,
    parent: Option<NodeId>,
    advanced: bool,
    disabled: bool,
    kind: NodeKind,
}

impl Node {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Shown only when advanced controls are enabled.
    pub fn advanced(&self) -> bool {
        self.advanced
    }

    pub fn disabled(&self) -> bool {
        self.disabled
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn as_group(&self) -> Option<&Group> {
        match &self.kind {
            NodeKind::Group(group) => Some(group),
            NodeKind::Control(_) => None,
        }
    }

    pub fn as_control(&self) -> Option<&Control> {
        match &self.kind {
            NodeKind::Control(control) => Some(control),
            NodeKind::Group(_) => None,
        }
    }
}

/// Arena of nodes rooted at the peer identity.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueTree {
    nodes: Vec<Option<Node>>,
    /// Slots of removed nodes, reused by later insertions.
    free: Vec<NodeId>,
    live: usize,
    root: NodeId,
}

impl ValueTree {
    /// Create a tree holding only the root group.
    pub fn new(root_name: impl Into<String>) -> Self {
        let root = Node {
            name: root_name.into(),
            parent: None,
            advanced: false,
            disabled: false,
            kind: NodeKind::Group(Group::default()),
        };
        Self {
            nodes: vec![Some(root)],
            free: Vec::new(),
            live: 1,
            root: NodeId(0),
        }
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_name(&self) -> &str {
        self.nodes[self.root.0]
            .as_ref()
            .map(|n| n.name.as_str())
            .unwrap_or_default()
    }

    /// Live node for `id`, `None` once removed.
    ///
    /// Ids of removed nodes are recycled, so a stale id may later name a
    /// different node.
    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.0).and_then(Option::as_ref)
    }

    /// Number of live nodes, the root included.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }

    /// Resolve an absolute path (first segment is the root name).
    pub fn resolve<S: AsRef<str>>(&self, path: &[S]) -> Result<NodeId> {
        let not_found = || GuiError::PathNotFound(join(path));

        let (first, rest) = path.split_first().ok_or_else(not_found)?;
        if first.as_ref() != self.root_name() {
            return Err(not_found());
        }

        let mut current = self.root;
        for segment in rest {
            current = self
                .node(current)
                .and_then(Node::as_group)
                .and_then(|g| g.child(segment.as_ref()))
                .ok_or_else(not_found)?;
        }
        Ok(current)
    }

    /// Absolute path of `id`, root name first.
    pub fn path_of(&self, id: NodeId) -> Result<Vec<String>> {
        let mut path = Vec::new();
        let mut current = Some(id);

        while let Some(cid) = current {
            let node = self.node(cid).ok_or_else(|| stale(cid))?;
            path.push(node.name.clone());
            current = node.parent;
        }

        path.reverse();
        Ok(path)
    }

    /// Current value of the control at `path`.
    pub fn value_at<S: AsRef<str>>(&self, path: &[S]) -> Result<Option<TaggedValue>> {
        let id = self.resolve(path)?;
        let control = self
            .node(id)
            .and_then(Node::as_control)
            .ok_or_else(|| GuiError::InvalidValue(format!("'{}' is a group", join(path))))?;
        Ok(control.current_value())
    }

    /// Apply a remote value to the control at `path`.
    ///
    /// Fails with `PathNotFound` for a missing segment, `TypeMismatch` when
    /// the control expects another shape and `InvalidValue` when the value
    /// violates the control's bounds. The tree is unchanged on error.
    pub fn set_path_value<S: AsRef<str>>(&mut self, path: &[S], value: &TaggedValue) -> Result<NodeId> {
        let id = self.resolve(path)?;
        let control = self.control_mut(id).map_err(|_| {
            GuiError::InvalidValue(format!("'{}' is a group", join(path)))
        })?;
        control.apply_value(value)?;
        Ok(id)
    }

    /// Apply a user edit to control `id` and bubble it to the root.
    ///
    /// The sink receives the path without the root name, which is the
    /// peer identity and not part of wire paths. Controls announced on the
    /// legacy channel are routed to [`ChangeSink::set_custom_color`].
    ///
    /// A sink error is returned as is; the value stays applied locally.
    pub fn on_local_change(
        &mut self,
        id: NodeId,
        value: &TaggedValue,
        sink: &mut dyn ChangeSink,
    ) -> Result<()> {
        if self.is_disabled(id) {
            return Err(GuiError::InvalidValue(format!(
                "'{}' is disabled",
                self.path_of(id)?.join(",")
            )));
        }

        let control = self.control_mut(id)?;
        let Some(outbound) = control.apply_local(value)? else {
            return Ok(());
        };

        if let Control::Rgbw {
            custom_uuid: Some(uuid),
            value: color,
            ..
        } = &*control
        {
            sink.set_custom_color(uuid, *color);
            return Ok(());
        }

        let path = self.path_of(id)?;
        tracing::debug!("local change {} = {}", path.join(","), outbound);
        sink.set_remote_value(&path[1..], outbound)
    }

    /// Remove the child `name` of group `parent` together with its subtree.
    ///
    /// Returns the number of nodes removed, zero if there was no such child.
    pub fn remove_child_by_name(&mut self, parent: NodeId, name: &str) -> Result<usize> {
        let group = self.group_mut(parent)?;
        let Some(child) = group.by_name.remove(name) else {
            return Ok(0);
        };
        group.children.retain(|c| *c != child);

        let subtree = self.descendants(child);
        for id in &subtree {
            self.nodes[id.0] = None;
            self.free.push(*id);
        }
        self.live -= subtree.len();
        tracing::debug!("removed '{}' ({} nodes)", name, subtree.len());
        Ok(subtree.len())
    }

    /// `id` and every node below it, depth first.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];

        while let Some(current) = stack.pop() {
            let Some(node) = self.node(current) else {
                continue;
            };
            out.push(current);
            if let NodeKind::Group(group) = &node.kind {
                stack.extend(group.children.iter().rev().copied());
            }
        }
        out
    }

    /// Enable or disable `id` and its whole subtree.
    pub fn set_disabled(&mut self, id: NodeId, disabled: bool) -> Result<()> {
        if self.node(id).is_none() {
            return Err(stale(id));
        }
        for nid in self.descendants(id) {
            if let Some(node) = self.nodes[nid.0].as_mut() {
                node.disabled = disabled;
            }
        }
        Ok(())
    }

    pub fn is_disabled(&self, id: NodeId) -> bool {
        self.node(id).is_some_and(|n| n.disabled)
    }

    /// Whether `id` is hidden given the user's advanced-controls setting.
    ///
    /// A node is hidden if it or any ancestor is advanced.
    pub fn is_hidden(&self, id: NodeId, show_advanced: bool) -> bool {
        if show_advanced {
            return false;
        }
        let mut current = Some(id);
        while let Some(cid) = current {
            let Some(node) = self.node(cid) else {
                return true;
            };
            if node.advanced {
                return true;
            }
            current = node.parent;
        }
        false
    }

    /// Collapse or expand a collapsible group.
    pub fn set_collapsed(&mut self, id: NodeId, collapsed: bool) -> Result<()> {
        let group = self.group_mut(id)?;
        if !group.collapsible {
            return Err(GuiError::InvalidValue("group is not collapsible".to_string()));
        }
        group.collapsed = collapsed;
        Ok(())
    }

    /// Register a color control announced on the legacy channel.
    ///
    /// Replaces any root child of the same name.
    pub fn announce_custom_control(&mut self, announce: &CustomControlAnnounce) -> Result<NodeId> {
        let root = self.root;
        self.remove_child_by_name(root, &announce.name)?;
        self.attach(
            root,
            &announce.name,
            false,
            NodeKind::Control(Control::Rgbw {
                value: RgbwColor::default(),
                channels: announce.channels,
                custom_uuid: Some(announce.uuid.clone()),
            }),
        )
    }

    fn attach(&mut self, parent: NodeId, name: &str, advanced: bool, kind: NodeKind) -> Result<NodeId> {
        let id = self.free.last().copied().unwrap_or(NodeId(self.nodes.len()));
        let disabled = self.is_disabled(parent);

        let group = self.group_mut(parent)?;
        if group.by_name.contains_key(name) {
            return Err(GuiError::InvalidValue(format!("duplicate child '{name}'")));
        }
        group.children.push(id);
        group.by_name.insert(name.to_string(), id);

        let node = Some(Node {
            name: name.to_string(),
            parent: Some(parent),
            advanced,
            disabled,
            kind,
        });
        if self.free.pop().is_some() {
            self.nodes[id.0] = node;
        } else {
            self.nodes.push(node);
        }
        self.live += 1;
        Ok(id)
    }

    fn group_mut(&mut self, id: NodeId) -> Result<&mut Group> {
        match self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            Some(Node {
                kind: NodeKind::Group(group),
                ..
            }) => Ok(group),
            Some(node) => Err(GuiError::InvalidValue(format!(
                "'{}' is not a group",
                node.name
            ))),
            None => Err(stale(id)),
        }
    }

    fn control_mut(&mut self, id: NodeId) -> Result<&mut Control> {
        match self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            Some(Node {
                kind: NodeKind::Control(control),
                ..
            }) => Ok(control),
            Some(node) => Err(GuiError::InvalidValue(format!(
                "'{}' is not a control",
                node.name
            ))),
            None => Err(stale(id)),
        }
    }

    fn fmt_node(&self, f: &mut fmt::Formatter<'_>, id: NodeId, depth: usize) -> fmt::Result {
        let Some(node) = self.node(id) else {
            return Ok(());
        };
        write!(f, "{:indent$}{}", "", node.name, indent = depth * 2)?;
        match &node.kind {
            NodeKind::Group(group) => {
                writeln!(f, "/")?;
                for child in &group.children {
                    self.fmt_node(f, *child, depth + 1)?;
                }
                Ok(())
            }
            NodeKind::Control(control) => writeln!(f, ": {}", control.describe()),
        }
    }
}

impl fmt::Display for ValueTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_node(f, self.root, 0)
    }
}

fn join<S: AsRef<str>>(path: &[S]) -> String {
    path.iter().map(|s| s.as_ref()).collect::<Vec<&str>>().join(",")
}

fn stale(id: NodeId) -> GuiError {
    GuiError::PathNotFound(format!("node #{} no longer exists", id.0))
}
