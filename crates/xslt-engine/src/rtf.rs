//! Result tree fragments: the buffered, detached document a sequence
//! constructor produces when captured as a single value rather than written
//! straight through to the principal output (`xsl:variable` with no `as`,
//! `xsl:copy-of` of such a variable, `xsl:document`'s body before it replays
//! back as a single document-node item).
//!
//! An RTF is an event log, not a tree — [`ResultTreeFragment::as_tree`] lazily
//! replays it into a small owned arena the one time something needs to
//! navigate it (e.g. a later `copy-of` or a path expression rooted at it).

use std::cell::OnceCell;
use std::rc::Rc;

use xpath_node::{DataSourceNode, NodeType, QName};

use crate::error::EngineError;
use crate::output::{OutputEvent, OutputSink};

#[derive(Debug)]
pub struct ResultTreeFragment {
    events: Vec<OutputEvent>,
    base_uri: Rc<str>,
    tree: OnceCell<RtfTree>,
}

impl Clone for ResultTreeFragment {
    /// Cloning re-shares nothing: a clone gets its own lazily-built tree cache,
    /// since `RtfNode`s borrow their arena and can't outlive the fragment that
    /// built it.
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
            base_uri: self.base_uri.clone(),
            tree: OnceCell::new(),
        }
    }
}

impl ResultTreeFragment {
    pub fn new(events: Vec<OutputEvent>, base_uri: impl Into<Rc<str>>) -> Self {
        Self {
            events,
            base_uri: base_uri.into(),
            tree: OnceCell::new(),
        }
    }

    pub fn events(&self) -> &[OutputEvent] {
        &self.events
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Re-emit this fragment's events into any other sink (e.g. to re-`copy-of`
    /// it into the principal output, or into a fresh `RtfSink` to clone it).
    pub fn replay_into(&self, sink: &mut dyn OutputSink) -> Result<(), EngineError> {
        for event in self.events.iter() {
            replay_event(sink, event)?;
        }
        Ok(())
    }

    /// The document-node view of this fragment, built once and cached.
    pub fn root(&self) -> RtfNode<'_> {
        let tree = self.tree.get_or_init(|| RtfTree::build(&self.events));
        RtfNode { tree, index: 0 }
    }
}

fn replay_event(sink: &mut dyn OutputSink, event: &OutputEvent) -> Result<(), EngineError> {
    match event {
        OutputEvent::StartElement { uri, local, qname } => {
            sink.start_element(uri.as_deref(), local, qname)
        }
        OutputEvent::EndElement { uri, local, qname } => {
            sink.end_element(uri.as_deref(), local, qname)
        }
        OutputEvent::Attribute {
            uri,
            local,
            qname,
            value,
        } => sink.attribute(uri.as_deref(), local, qname, value),
        OutputEvent::Namespace { prefix, uri } => sink.namespace(prefix.as_deref(), uri),
        OutputEvent::Characters(text) => sink.characters(text),
        OutputEvent::CharactersRaw(text) => sink.characters_raw(text),
        OutputEvent::Comment(text) => sink.comment(text),
        OutputEvent::ProcessingInstruction { target, data } => {
            sink.processing_instruction(target, data)
        }
        OutputEvent::SetElementType { uri, local } => sink.set_element_type(uri, local),
        OutputEvent::SetAttributeType { uri, local } => sink.set_attribute_type(uri, local),
        OutputEvent::AtomicValue(text) => sink.atomic_value(text),
        OutputEvent::ItemBoundary => sink.item_boundary(),
    }
}

/// An [`OutputSink`] that captures every event it receives instead of
/// serializing or navigating it, producing a [`ResultTreeFragment`] once the
/// sequence constructor that feeds it completes.
#[derive(Debug, Default)]
pub struct RtfSink {
    events: Vec<OutputEvent>,
    atomic_value_pending: bool,
    in_attribute_content: bool,
    open: usize,
}

impl RtfSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_fragment(self, base_uri: impl Into<Rc<str>>) -> ResultTreeFragment {
        ResultTreeFragment::new(self.events, base_uri)
    }
}

impl OutputSink for RtfSink {
    fn start_element(
        &mut self,
        uri: Option<&str>,
        local: &str,
        qname: &str,
    ) -> Result<(), EngineError> {
        self.open += 1;
        self.events.push(OutputEvent::StartElement {
            uri: uri.map(str::to_string),
            local: local.to_string(),
            qname: qname.to_string(),
        });
        Ok(())
    }

    fn end_element(
        &mut self,
        uri: Option<&str>,
        local: &str,
        qname: &str,
    ) -> Result<(), EngineError> {
        self.open = self.open.saturating_sub(1);
        self.events.push(OutputEvent::EndElement {
            uri: uri.map(str::to_string),
            local: local.to_string(),
            qname: qname.to_string(),
        });
        Ok(())
    }

    fn attribute(
        &mut self,
        uri: Option<&str>,
        local: &str,
        qname: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        if self.open == 0 {
            return Err(EngineError::dynamic(
                "XTDE0410",
                "cannot add an attribute: no element is open for content",
            ));
        }
        self.events.push(OutputEvent::Attribute {
            uri: uri.map(str::to_string),
            local: local.to_string(),
            qname: qname.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn namespace(&mut self, prefix: Option<&str>, uri: &str) -> Result<(), EngineError> {
        self.events.push(OutputEvent::Namespace {
            prefix: prefix.map(str::to_string),
            uri: uri.to_string(),
        });
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), EngineError> {
        self.events.push(OutputEvent::Characters(text.to_string()));
        Ok(())
    }

    fn characters_raw(&mut self, text: &str) -> Result<(), EngineError> {
        self.events
            .push(OutputEvent::CharactersRaw(text.to_string()));
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), EngineError> {
        self.events.push(OutputEvent::Comment(text.to_string()));
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), EngineError> {
        self.events.push(OutputEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        });
        Ok(())
    }

    fn set_element_type(&mut self, uri: &str, local: &str) -> Result<(), EngineError> {
        self.events.push(OutputEvent::SetElementType {
            uri: uri.to_string(),
            local: local.to_string(),
        });
        Ok(())
    }

    fn set_attribute_type(&mut self, uri: &str, local: &str) -> Result<(), EngineError> {
        self.events.push(OutputEvent::SetAttributeType {
            uri: uri.to_string(),
            local: local.to_string(),
        });
        Ok(())
    }

    fn atomic_value(&mut self, string_value: &str) -> Result<(), EngineError> {
        if self.atomic_value_pending {
            self.events.push(OutputEvent::Characters(" ".to_string()));
        }
        self.events
            .push(OutputEvent::AtomicValue(string_value.to_string()));
        self.atomic_value_pending = true;
        Ok(())
    }

    fn set_atomic_value_pending(&mut self, pending: bool) {
        self.atomic_value_pending = pending;
    }

    fn is_atomic_value_pending(&self) -> bool {
        self.atomic_value_pending
    }

    fn set_in_attribute_content(&mut self, in_attribute: bool) {
        self.in_attribute_content = in_attribute;
    }

    fn is_in_attribute_content(&self) -> bool {
        self.in_attribute_content
    }

    fn item_boundary(&mut self) -> Result<(), EngineError> {
        self.events.push(OutputEvent::ItemBoundary);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

#[derive(Debug)]
struct ArenaEntry {
    kind: ArenaKind,
    parent: Option<usize>,
    children: Vec<usize>,
    order: u64,
}

#[derive(Debug)]
enum ArenaKind {
    Root,
    Element { local: String, qname: String },
    Attribute { local: String, qname: String, value: String },
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

/// The owned tree an [`RtfNode`] navigates, built once by replaying a
/// fragment's event log through a stack-based builder — the mirror image of
/// [`RtfSink`] capturing them.
#[derive(Debug)]
struct RtfTree {
    entries: Vec<ArenaEntry>,
}

impl RtfTree {
    fn build(events: &[OutputEvent]) -> Self {
        let mut entries = vec![ArenaEntry {
            kind: ArenaKind::Root,
            parent: None,
            children: Vec::new(),
            order: 0,
        }];
        let mut stack = vec![0usize];
        let mut next_order = 1u64;

        let mut push_child = |entries: &mut Vec<ArenaEntry>, stack: &[usize], kind: ArenaKind, order: &mut u64| -> usize {
            let idx = entries.len();
            let parent = *stack.last().unwrap();
            entries.push(ArenaEntry {
                kind,
                parent: Some(parent),
                children: Vec::new(),
                order: *order,
            });
            *order += 1;
            entries[parent].children.push(idx);
            idx
        };

        for event in events {
            match event {
                OutputEvent::StartElement { local, qname, .. } => {
                    let idx = push_child(
                        &mut entries,
                        &stack,
                        ArenaKind::Element {
                            local: local.clone(),
                            qname: qname.clone(),
                        },
                        &mut next_order,
                    );
                    stack.push(idx);
                }
                OutputEvent::EndElement { .. } => {
                    if stack.len() > 1 {
                        stack.pop();
                    }
                }
                OutputEvent::Attribute {
                    local, qname, value, ..
                } => {
                    push_child(
                        &mut entries,
                        &stack,
                        ArenaKind::Attribute {
                            local: local.clone(),
                            qname: qname.clone(),
                            value: value.clone(),
                        },
                        &mut next_order,
                    );
                }
                OutputEvent::Namespace { .. } => {}
                OutputEvent::Characters(text)
                | OutputEvent::CharactersRaw(text)
                | OutputEvent::AtomicValue(text) => {
                    push_child(&mut entries, &stack, ArenaKind::Text(text.clone()), &mut next_order);
                }
                OutputEvent::Comment(text) => {
                    push_child(&mut entries, &stack, ArenaKind::Comment(text.clone()), &mut next_order);
                }
                OutputEvent::ProcessingInstruction { target, data } => {
                    push_child(
                        &mut entries,
                        &stack,
                        ArenaKind::ProcessingInstruction {
                            target: target.clone(),
                            data: data.clone(),
                        },
                        &mut next_order,
                    );
                }
                OutputEvent::SetElementType { .. }
                | OutputEvent::SetAttributeType { .. }
                | OutputEvent::ItemBoundary => {}
            }
        }
        Self { entries }
    }
}

/// A node in a materialized result tree fragment. Borrows its arena the same
/// way `roxmltree::Node` borrows its document, so it stays `Copy` and can
/// implement [`DataSourceNode`] directly.
#[derive(Debug, Clone, Copy)]
pub struct RtfNode<'t> {
    tree: &'t RtfTree,
    index: usize,
}

impl<'t> PartialEq for RtfNode<'t> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.tree, other.tree) && self.index == other.index
    }
}
impl<'t> Eq for RtfNode<'t> {}

impl<'t> std::hash::Hash for RtfNode<'t> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        (self.tree as *const RtfTree as usize).hash(state);
        self.index.hash(state);
    }
}

impl<'t> PartialOrd for RtfNode<'t> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<'t> Ord for RtfNode<'t> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.document_order().cmp(&other.document_order())
    }
}

impl<'t> DataSourceNode<'t> for RtfNode<'t> {
    fn node_type(&self) -> NodeType {
        match &self.tree.entries[self.index].kind {
            ArenaKind::Root => NodeType::Root,
            ArenaKind::Element { .. } => NodeType::Element,
            ArenaKind::Attribute { .. } => NodeType::Attribute,
            ArenaKind::Text(_) => NodeType::Text,
            ArenaKind::Comment(_) => NodeType::Comment,
            ArenaKind::ProcessingInstruction { .. } => NodeType::ProcessingInstruction,
        }
    }

    fn name(&self) -> Option<QName<'t>> {
        None
    }

    fn string_value(&self) -> String {
        match &self.tree.entries[self.index].kind {
            ArenaKind::Text(t) | ArenaKind::Comment(t) => t.clone(),
            ArenaKind::Attribute { value, .. } => value.clone(),
            ArenaKind::ProcessingInstruction { data, .. } => data.clone(),
            ArenaKind::Element { .. } | ArenaKind::Root => {
                fn collect(tree: &RtfTree, idx: usize, out: &mut String) {
                    for &child in &tree.entries[idx].children {
                        match &tree.entries[child].kind {
                            ArenaKind::Text(t) => out.push_str(t),
                            ArenaKind::Element { .. } => collect(tree, child, out),
                            _ => {}
                        }
                    }
                }
                let mut out = String::new();
                collect(self.tree, self.index, &mut out);
                out
            }
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 't> {
        let tree = self.tree;
        let children = self.tree.entries[self.index].children.clone();
        Box::new(children.into_iter().filter_map(move |idx| {
            matches!(tree.entries[idx].kind, ArenaKind::Attribute { .. })
                .then_some(RtfNode { tree, index: idx })
        }))
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 't> {
        let tree = self.tree;
        let children = self.tree.entries[self.index].children.clone();
        Box::new(children.into_iter().filter_map(move |idx| {
            (!matches!(tree.entries[idx].kind, ArenaKind::Attribute { .. }))
                .then_some(RtfNode { tree, index: idx })
        }))
    }

    fn parent(&self) -> Option<Self> {
        self.tree.entries[self.index]
            .parent
            .map(|idx| RtfNode { tree: self.tree, index: idx })
    }

    fn document_order(&self) -> u64 {
        self.tree.entries[self.index].order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captured_events_replay_into_a_navigable_tree() {
        let mut sink = RtfSink::new();
        sink.start_element(None, "item", "item").unwrap();
        sink.attribute(None, "id", "id", "7").unwrap();
        sink.characters("hello").unwrap();
        sink.end_element(None, "item", "item").unwrap();
        let fragment = sink.into_fragment("");

        let root = fragment.root();
        let item = root.children().next().expect("item element");
        assert_eq!(item.string_value(), "hello");
        let attr = item.attributes().next().expect("id attribute");
        assert_eq!(attr.string_value(), "7");
        assert!(root.document_order() < item.document_order());
        assert!(item.document_order() < attr.document_order());
    }
}
