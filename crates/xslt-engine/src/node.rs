//! XML node model: a polymorphic view over element/text/comment/PI/attribute/
//! namespace nodes, backed by `roxmltree`, implementing [`xpath_node::DataSourceNode`]
//! so it can be evaluated against by the `xpath-expr` `ExprEval` capability.

use roxmltree::Node as RNode;
use std::hash::{Hash, Hasher};
use xpath_node::{DataSourceNode, NodeType, QName};

/// Thin wrapper around a parsed document, handing out [`XmlNode`] views.
pub struct XmlDocument<'input> {
    doc: roxmltree::Document<'input>,
}

impl<'input> XmlDocument<'input> {
    pub fn parse(text: &'input str) -> Result<Self, roxmltree::Error> {
        Ok(Self {
            doc: roxmltree::Document::parse(text)?,
        })
    }

    pub fn root_node(&self) -> XmlNode<'_> {
        XmlNode::Node(self.doc.root())
    }
}

/// A node in the source (or a constructed result) tree.
///
/// Attributes and namespace bindings are not children in `roxmltree`'s model;
/// they're addressed by (owning element, index) so they can still satisfy the
/// `DataSourceNode` contract as first-class, comparable, hashable nodes.
#[derive(Debug, Clone, Copy)]
pub enum XmlNode<'a> {
    Node(RNode<'a, 'a>),
    Attribute { parent: RNode<'a, 'a>, index: usize },
    Namespace { parent: RNode<'a, 'a>, index: usize },
}

impl<'a> XmlNode<'a> {
    pub fn new(node: RNode<'a, 'a>) -> Self {
        XmlNode::Node(node)
    }

    pub fn inner(&self) -> Option<RNode<'a, 'a>> {
        match self {
            XmlNode::Node(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, XmlNode::Node(n) if n.is_element())
    }

    pub fn is_root(&self) -> bool {
        matches!(self, XmlNode::Node(n) if n.is_root())
    }

    /// The element/root's direct attribute value, or `None`.
    pub fn attribute_value(&self, uri: Option<&str>, local: &str) -> Option<&'a str> {
        match self {
            XmlNode::Node(n) => n.attributes().find_map(|a| {
                let matches_name = a.name() == local;
                let matches_ns = match uri {
                    Some(u) => a.namespace() == Some(u),
                    None => a.namespace().is_none(),
                };
                (matches_name && matches_ns).then(|| a.value())
            }),
            _ => None,
        }
    }
}

/// id()-based order is strictly increasing in document order for the node roxmltree
/// actually sees; attributes/namespaces are synthesized into adjacent bands so they
/// sort immediately after their owning element and before its children.
fn base_order(n: &RNode<'_, '_>) -> u64 {
    (n.id().get() as u64) * 4096
}

impl<'a> PartialEq for XmlNode<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (XmlNode::Node(a), XmlNode::Node(b)) => a.id() == b.id(),
            (
                XmlNode::Attribute { parent: p1, index: i1 },
                XmlNode::Attribute { parent: p2, index: i2 },
            ) => p1.id() == p2.id() && i1 == i2,
            (
                XmlNode::Namespace { parent: p1, index: i1 },
                XmlNode::Namespace { parent: p2, index: i2 },
            ) => p1.id() == p2.id() && i1 == i2,
            _ => false,
        }
    }
}

impl<'a> Eq for XmlNode<'a> {}

impl<'a> Hash for XmlNode<'a> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            XmlNode::Node(n) => {
                0u8.hash(state);
                n.id().hash(state);
            }
            XmlNode::Attribute { parent, index } => {
                1u8.hash(state);
                parent.id().hash(state);
                index.hash(state);
            }
            XmlNode::Namespace { parent, index } => {
                2u8.hash(state);
                parent.id().hash(state);
                index.hash(state);
            }
        }
    }
}

impl<'a> PartialOrd for XmlNode<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl<'a> Ord for XmlNode<'a> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.document_order().cmp(&other.document_order())
    }
}

impl<'a> DataSourceNode<'a> for XmlNode<'a> {
    fn node_type(&self) -> NodeType {
        match self {
            XmlNode::Node(n) => {
                if n.is_root() {
                    NodeType::Root
                } else if n.is_element() {
                    NodeType::Element
                } else if n.is_text() {
                    NodeType::Text
                } else if n.is_comment() {
                    NodeType::Comment
                } else if n.is_pi() {
                    NodeType::ProcessingInstruction
                } else {
                    NodeType::Element
                }
            }
            XmlNode::Attribute { .. } => NodeType::Attribute,
            XmlNode::Namespace { .. } => NodeType::Attribute,
        }
    }

    fn name(&self) -> Option<QName<'a>> {
        match self {
            XmlNode::Node(n) => {
                if n.is_element() && !n.tag_name().name().is_empty() {
                    Some(QName {
                        prefix: None,
                        local_part: n.tag_name().name(),
                    })
                } else if n.is_pi() {
                    n.pi().map(|pi| QName {
                        prefix: None,
                        local_part: pi.target,
                    })
                } else {
                    None
                }
            }
            XmlNode::Attribute { parent, index } => parent.attributes().nth(*index).map(|a| {
                let prefix = (a.namespace() == Some("http://www.w3.org/XML/1998/namespace"))
                    .then_some("xml");
                QName {
                    prefix,
                    local_part: a.name(),
                }
            }),
            XmlNode::Namespace { parent, index } => {
                parent.namespaces().nth(*index).map(|ns| QName {
                    prefix: None,
                    local_part: ns.name().unwrap_or(""),
                })
            }
        }
    }

    fn string_value(&self) -> String {
        match self {
            XmlNode::Node(n) => {
                if n.is_text() {
                    n.text().unwrap_or("").to_string()
                } else if n.is_element() || n.is_root() {
                    n.descendants()
                        .filter(|d| d.is_text())
                        .filter_map(|d| d.text())
                        .collect::<Vec<_>>()
                        .join("")
                } else if n.is_comment() {
                    n.text().unwrap_or("").to_string()
                } else if n.is_pi() {
                    n.pi().and_then(|pi| pi.value).unwrap_or("").to_string()
                } else {
                    String::new()
                }
            }
            XmlNode::Attribute { parent, index } => parent
                .attributes()
                .nth(*index)
                .map(|a| a.value().to_string())
                .unwrap_or_default(),
            XmlNode::Namespace { parent, index } => parent
                .namespaces()
                .nth(*index)
                .map(|ns| ns.uri().to_string())
                .unwrap_or_default(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Node(n) => {
                let parent = *n;
                let count = n.attributes().len();
                Box::new((0..count).map(move |index| XmlNode::Attribute { parent, index }))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Node(n) => Box::new(n.children().map(XmlNode::Node)),
            _ => Box::new(std::iter::empty()),
        }
    }

    fn parent(&self) -> Option<Self> {
        match self {
            XmlNode::Node(n) => n.parent().map(XmlNode::Node),
            XmlNode::Attribute { parent, .. } | XmlNode::Namespace { parent, .. } => {
                Some(XmlNode::Node(*parent))
            }
        }
    }

    fn namespaces(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            XmlNode::Node(n) => {
                let parent = *n;
                let count = n.namespaces().len();
                Box::new((0..count).map(move |index| XmlNode::Namespace { parent, index }))
            }
            _ => Box::new(std::iter::empty()),
        }
    }

    fn document_order(&self) -> u64 {
        match self {
            XmlNode::Node(n) => base_order(n),
            XmlNode::Attribute { parent, index } => base_order(parent) + 1 + *index as u64,
            XmlNode::Namespace { parent, index } => base_order(parent) + 2048 + *index as u64,
        }
    }
}

/// The node type the engine evaluates expressions and builds sequences over:
/// either a view into the parsed source document, or a view into a materialized
/// [`crate::rtf::ResultTreeFragment`]. Both sides implement `DataSourceNode`
/// identically as far as `xpath-expr` is concerned, so a path expression can
/// navigate from a variable bound to a copied fragment exactly as it would
/// navigate the source tree.
#[derive(Debug, Clone, Copy)]
pub enum EngineNode<'a> {
    Source(XmlNode<'a>),
    Constructed(crate::rtf::RtfNode<'a>),
}

impl<'a> From<XmlNode<'a>> for EngineNode<'a> {
    fn from(n: XmlNode<'a>) -> Self {
        EngineNode::Source(n)
    }
}

impl<'a> From<crate::rtf::RtfNode<'a>> for EngineNode<'a> {
    fn from(n: crate::rtf::RtfNode<'a>) -> Self {
        EngineNode::Constructed(n)
    }
}

impl<'a> PartialEq for EngineNode<'a> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EngineNode::Source(a), EngineNode::Source(b)) => a == b,
            (EngineNode::Constructed(a), EngineNode::Constructed(b)) => a == b,
            _ => false,
        }
    }
}
impl<'a> Eq for EngineNode<'a> {}

impl<'a> Hash for EngineNode<'a> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            EngineNode::Source(n) => {
                0u8.hash(state);
                n.hash(state);
            }
            EngineNode::Constructed(n) => {
                1u8.hash(state);
                n.hash(state);
            }
        }
    }
}

impl<'a> PartialOrd for EngineNode<'a> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl<'a> Ord for EngineNode<'a> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.document_order().cmp(&other.document_order())
    }
}

impl<'a> DataSourceNode<'a> for EngineNode<'a> {
    fn node_type(&self) -> NodeType {
        match self {
            EngineNode::Source(n) => n.node_type(),
            EngineNode::Constructed(n) => n.node_type(),
        }
    }

    fn name(&self) -> Option<QName<'a>> {
        match self {
            EngineNode::Source(n) => n.name(),
            EngineNode::Constructed(n) => DataSourceNode::<'a>::name(n),
        }
    }

    fn string_value(&self) -> String {
        match self {
            EngineNode::Source(n) => n.string_value(),
            EngineNode::Constructed(n) => n.string_value(),
        }
    }

    fn attributes(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            EngineNode::Source(n) => Box::new(n.attributes().map(EngineNode::Source)),
            EngineNode::Constructed(n) => {
                Box::new(DataSourceNode::<'a>::attributes(n).map(EngineNode::Constructed))
            }
        }
    }

    fn children(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            EngineNode::Source(n) => Box::new(n.children().map(EngineNode::Source)),
            EngineNode::Constructed(n) => {
                Box::new(DataSourceNode::<'a>::children(n).map(EngineNode::Constructed))
            }
        }
    }

    fn parent(&self) -> Option<Self> {
        match self {
            EngineNode::Source(n) => n.parent().map(EngineNode::Source),
            EngineNode::Constructed(n) => n.parent().map(EngineNode::Constructed),
        }
    }

    fn namespaces(&self) -> Box<dyn Iterator<Item = Self> + 'a> {
        match self {
            EngineNode::Source(n) => Box::new(n.namespaces().map(EngineNode::Source)),
            EngineNode::Constructed(_) => Box::new(std::iter::empty()),
        }
    }

    fn document_order(&self) -> u64 {
        match self {
            // Constructed fragments live in their own document; tag their order
            // space well above any plausible `roxmltree` id so a fragment's nodes
            // never interleave with the source tree's.
            EngineNode::Source(n) => n.document_order(),
            EngineNode::Constructed(n) => u64::MAX / 2 + n.document_order(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_order_places_element_before_its_attributes_and_children() {
        let doc = XmlDocument::parse(r#"<root a="1"><child/></root>"#).unwrap();
        let root_elem = doc
            .root_node()
            .children()
            .next()
            .expect("root element");
        let attr = root_elem.attributes().next().unwrap();
        let child = root_elem.children().next().unwrap();
        assert!(root_elem.document_order() < attr.document_order());
        assert!(attr.document_order() < child.document_order());
    }

    #[test]
    fn string_value_concatenates_descendant_text() {
        let doc = XmlDocument::parse("<root><a>Hello</a><b>World</b></root>").unwrap();
        let root_elem = doc.root_node().children().next().unwrap();
        assert_eq!(root_elem.string_value(), "HelloWorld");
    }
}
