//! Building tree nodes from descriptor documents.

use super::{Control, Group, NodeId, NodeKind, ValueTree};
use crate::error::Result;
use crate::protocol::{DescriptorKind, DescriptorNode};

impl ValueTree {
    /// Instantiate `node` under the group `parent`.
    ///
    /// A `root` document populates `parent` itself with its elements. Any
    /// other node replaces an existing child of the same name, subtree
    /// included. Unknown node types are skipped with a warning.
    ///
    /// Returns the id of the created (or populated) node, `None` if skipped.
    pub fn build_from_descriptor(
        &mut self,
        parent: NodeId,
        node: &DescriptorNode,
    ) -> Result<Option<NodeId>> {
        let kind = match &node.kind {
            DescriptorKind::Root { elements } => {
                self.build_children(parent, elements)?;
                return Ok(Some(parent));
            }
            DescriptorKind::Group { collapsed, .. } => NodeKind::Group(Group {
                collapsible: collapsed.is_some(),
                collapsed: collapsed.unwrap_or(false),
                ..Group::default()
            }),
            other => match Control::from_descriptor(other) {
                Some(control) => NodeKind::Control(control),
                None => {
                    tracing::warn!(
                        "skipping '{}': unsupported control type '{}'",
                        node.name,
                        other.type_name()
                    );
                    return Ok(None);
                }
            },
        };

        if self.remove_child_by_name(parent, &node.name)? > 0 {
            tracing::debug!("replacing '{}'", node.name);
        }
        let id = self.attach(parent, &node.name, node.advanced, kind)?;

        self.build_children(id, node.elements())?;
        Ok(Some(id))
    }

    fn build_children(&mut self, parent: NodeId, elements: &[DescriptorNode]) -> Result<()> {
        for element in elements {
            self.build_from_descriptor(parent, element)?;
        }
        Ok(())
    }
}
