//! `CommandRecord`: the tree built for one recording of a command buffer
//! (`spec.md` §3, §4.3).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::command::node::{Command, Node, NodeId, SectionKind, SectionLabel};
use crate::command::resource_use::ResourceUseTable;
use crate::command::state::BoundState;
use crate::config::LayerConfig;

static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

fn fresh_node_id() -> NodeId {
    NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed)
}

/// One open section on the recording stack: its node kind, label, and the
/// children accumulated so far. Closed sections are folded into a `Node` and
/// appended to their parent.
struct OpenSection {
    kind: SectionKind,
    label: SectionLabel,
    render_pass: Option<std::sync::Weak<crate::objects::render_pass::RenderPass>>,
    children: Vec<Node>,
    /// Per-type sibling counters, reset when control returns to this section.
    rel_id_counters: std::collections::HashMap<std::mem::Discriminant<Command>, u32>,
}

impl OpenSection {
    fn new(kind: SectionKind, label: SectionLabel, render_pass: Option<std::sync::Weak<crate::objects::render_pass::RenderPass>>) -> Self {
        Self {
            kind,
            label,
            render_pass,
            children: Vec::new(),
            rel_id_counters: std::collections::HashMap::new(),
        }
    }

    fn next_rel_id(&mut self, command: &Command) -> u32 {
        let disc = std::mem::discriminant(command);
        let counter = self.rel_id_counters.entry(disc).or_insert(0);
        let id = *counter;
        *counter += 1;
        id
    }

    fn push(&mut self, command: Command) -> NodeId {
        let rel_id = self.next_rel_id(&command);
        let id = fresh_node_id();
        self.children.push(Node { id, rel_id, command });
        id
    }
}

/// The tree of `Command` nodes, resource-use tables, section stack, captured
/// binding state, and reset counter that make up one recording (`spec.md` §3).
pub struct CommandRecord {
    root: OpenSection,
    section_stack: Vec<OpenSection>,
    pub used_images: ResourceUseTable,
    pub used_buffers: ResourceUseTable,
    pub state: BoundState,
    /// Value of the owning command buffer's reset counter when this record
    /// was created; external references (GUI selections) compare against it.
    pub reset_count: u64,
    /// Set once a label section is implicitly closed at `EndCommandBuffer`
    /// without a matching `EndDebugUtilsLabel` (`spec.md` §4.3).
    pub unbalanced_labels_closed: u32,
}

impl CommandRecord {
    pub fn new(reset_count: u64) -> Self {
        Self {
            root: OpenSection::new(SectionKind::DebugLabel, SectionLabel(None), None),
            section_stack: Vec::new(),
            used_images: ResourceUseTable::new(),
            used_buffers: ResourceUseTable::new(),
            state: BoundState::default(),
            reset_count,
            unbalanced_labels_closed: 0,
        }
    }

    /// The section currently open, or the root if none.
    fn current_mut(&mut self) -> &mut OpenSection {
        self.section_stack.last_mut().unwrap_or(&mut self.root)
    }

    /// Appends a leaf or non-section command node to the innermost open
    /// section (`spec.md` §4.3 point 4). Returns its id for resource-table
    /// cross-references.
    pub fn push_node(&mut self, command: Command) -> NodeId {
        self.current_mut().push(command)
    }

    /// Opens a new section — `BeginRenderPass`, `BeginDebugUtilsLabel`, or the
    /// atomic open+close of `ExecuteCommands`. `render_pass` is set only for
    /// `SectionKind::RenderPass`.
    pub fn open_section(
        &mut self,
        kind: SectionKind,
        label: SectionLabel,
        render_pass: Option<std::sync::Weak<crate::objects::render_pass::RenderPass>>,
    ) {
        self.section_stack.push(OpenSection::new(kind, label, render_pass));
    }

    /// Closes the innermost open section of `kind`, folding it into a `Section`
    /// node appended to its parent. For `DebugLabel`, an unmatched close (no
    /// open label section) is a documented no-op rather than an error.
    pub fn close_section(&mut self, kind: SectionKind) {
        let Some(pos) = self.section_stack.iter().rposition(|s| s.kind == kind) else {
            return;
        };
        // Fold every section above `pos` too — callers only ask to close the
        // kind they expect, but an application that mismatches is tolerated
        // per the label-section leniency rule; render-pass/ExecuteCommands
        // close calls are always the innermost section by construction.
        while self.section_stack.len() > pos {
            let section = self.section_stack.pop().unwrap();
            let rel_id = {
                let parent = self.section_stack.last_mut().unwrap_or(&mut self.root);
                let command = Command::Section {
                    kind: section.kind,
                    label: section.label.clone(),
                    render_pass: section.render_pass.clone(),
                    children: section.children.clone(),
                };
                parent.next_rel_id(&command)
            };
            let id = fresh_node_id();
            let parent = self.section_stack.last_mut().unwrap_or(&mut self.root);
            parent.children.push(Node {
                id,
                rel_id,
                command: Command::Section {
                    kind: section.kind,
                    label: section.label,
                    render_pass: section.render_pass,
                    children: section.children,
                },
            });
        }
    }

    /// Whether a render-pass section is currently open — commands that are
    /// only legal inside a render pass (draws) consult this.
    pub fn in_render_pass(&self) -> bool {
        self.section_stack.iter().any(|s| s.kind == SectionKind::RenderPass)
    }

    /// `EndCommandBuffer`: any still-open label section is implicitly closed
    /// with a warning (`spec.md` §4.3); non-label sections left open at this
    /// point would be an application bug outside the spec's tolerance, so they
    /// are closed silently too rather than losing the recorded nodes.
    pub fn finish(&mut self, cfg: &LayerConfig) {
        while let Some(section) = self.section_stack.pop() {
            if section.kind == SectionKind::DebugLabel {
                self.unbalanced_labels_closed += 1;
                crate::layer_warn!(cfg, "unmatched BeginDebugUtilsLabel implicitly closed at EndCommandBuffer");
            }
            let parent = self.section_stack.last_mut().unwrap_or(&mut self.root);
            let command = Command::Section {
                kind: section.kind,
                label: section.label.clone(),
                render_pass: section.render_pass.clone(),
                children: section.children.clone(),
            };
            let rel_id = parent.next_rel_id(&command);
            let id = fresh_node_id();
            parent.children.push(Node { id, rel_id, command });
        }
    }

    /// The finished tree's root-level children, in recording order.
    pub fn nodes(&self) -> &[Node] {
        &self.root.children
    }

    /// The render pass whose section directly contains `node`, if any — the
    /// hook needs this to run the splittability check (`spec.md` §4.6) against
    /// the selected command's actual enclosing render pass rather than just
    /// its subpass index.
    pub fn render_pass_for_node(&self, node: NodeId) -> Option<std::sync::Arc<crate::objects::render_pass::RenderPassDescription>> {
        fn search(nodes: &[Node], target: NodeId, current_render_pass: Option<&std::sync::Weak<crate::objects::render_pass::RenderPass>>) -> Option<std::sync::Arc<crate::objects::render_pass::RenderPassDescription>> {
            for n in nodes {
                if n.id == target {
                    return current_render_pass.and_then(|rp| rp.upgrade()).map(|rp| rp.description.clone());
                }
                if let Command::Section { render_pass, children, .. } = &n.command {
                    let scope = render_pass.as_ref().or(current_render_pass);
                    if let Some(found) = search(children, target, scope) {
                        return Some(found);
                    }
                }
            }
            None
        }
        search(&self.root.children, node, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(n: u32) -> Command {
        Command::FillBuffer {
            buffer: std::sync::Weak::new(),
            offset: 0,
            size: n as u64,
            data: 0,
        }
    }

    #[test]
    fn record_fidelity_preserves_order_and_parameters() {
        let mut record = CommandRecord::new(0);
        record.push_node(leaf(1));
        record.push_node(leaf(2));
        record.push_node(leaf(3));
        let nodes = record.nodes();
        assert_eq!(nodes.len(), 3);
        for (i, node) in nodes.iter().enumerate() {
            match &node.command {
                Command::FillBuffer { size, .. } => assert_eq!(*size, (i + 1) as u64),
                _ => panic!("wrong kind"),
            }
        }
    }

    #[test]
    fn sections_balance_and_nest() {
        let mut record = CommandRecord::new(0);
        record.open_section(SectionKind::RenderPass, SectionLabel(None), None);
        record.push_node(leaf(1));
        record.close_section(SectionKind::RenderPass);
        record.push_node(leaf(2));
        let nodes = record.nodes();
        assert_eq!(nodes.len(), 2);
        match &nodes[0].command {
            Command::Section { kind, children, .. } => {
                assert_eq!(*kind, SectionKind::RenderPass);
                assert_eq!(children.len(), 1);
            }
            _ => panic!("expected section"),
        }
    }

    #[test]
    fn unmatched_label_end_is_a_no_op() {
        let mut record = CommandRecord::new(0);
        record.close_section(SectionKind::DebugLabel);
        record.push_node(leaf(1));
        assert_eq!(record.nodes().len(), 1);
    }

    #[test]
    fn trailing_open_labels_close_implicitly_at_finish() {
        let mut record = CommandRecord::new(0);
        record.open_section(SectionKind::DebugLabel, SectionLabel(Some("C1".into())), None);
        record.open_section(SectionKind::DebugLabel, SectionLabel(Some("C2".into())), None);
        record.finish(&LayerConfig::default());
        assert_eq!(record.unbalanced_labels_closed, 2);
        assert_eq!(record.nodes().len(), 1);
    }

    #[test]
    fn label_mismatch_scenario_e3() {
        let mut record = CommandRecord::new(0);
        record.open_section(SectionKind::DebugLabel, SectionLabel(Some("A".into())), None);
        record.open_section(SectionKind::RenderPass, SectionLabel(None), None);
        record.close_section(SectionKind::DebugLabel);
        record.close_section(SectionKind::RenderPass);
        record.close_section(SectionKind::DebugLabel);
        record.close_section(SectionKind::DebugLabel);
        record.open_section(SectionKind::RenderPass, SectionLabel(None), None);
        record.open_section(SectionKind::DebugLabel, SectionLabel(Some("B".into())), None);
        record.close_section(SectionKind::RenderPass);
        record.open_section(SectionKind::DebugLabel, SectionLabel(Some("C1".into())), None);
        record.open_section(SectionKind::DebugLabel, SectionLabel(Some("C2".into())), None);
        record.finish(&LayerConfig::default());
        assert_eq!(record.unbalanced_labels_closed, 2);
    }
}
