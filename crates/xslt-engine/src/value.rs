//! The engine's typed value model: the run-time representation every
//! instruction's sequence constructor produces and every variable binds.
//!
//! This mirrors the XDM item/sequence distinction `xpath-expr` already has,
//! but adds the two things `ExprEval` doesn't need to know about: a captured,
//! navigable-on-demand [`ResultTreeFragment`], and cheap `Rc`-backed sharing so
//! binding a variable never copies its content.

use std::rc::Rc;

use xpath_expr::{AtomicValue, XdmArray, XdmFunction, XdmItem, XdmMap, XdmValue};

use crate::node::EngineNode;
use crate::rtf::ResultTreeFragment;

/// A single typed value: the unit a variable binds to, a parameter carries, or
/// a function call returns. A [`Sequence`](Value::Sequence) of these is itself
/// a `Value`, so "a sequence of sequences" simply never arises — constructing
/// one flattens, per the data model's own rule.
#[derive(Debug, Clone)]
pub enum Value<'a> {
    Empty,
    Atomic(AtomicValue),
    Node(EngineNode<'a>),
    NodeSet(Rc<Vec<EngineNode<'a>>>),
    Sequence(Rc<Vec<Value<'a>>>),
    Rtf(Rc<ResultTreeFragment>),
    Map(Rc<XdmMap<EngineNode<'a>>>),
    Array(Rc<XdmArray<EngineNode<'a>>>),
    /// A function item, carried through as an opaque value: the core calls it
    /// via `ExprEval`'s own invocation machinery rather than reimplementing it.
    Function(Rc<XdmFunction<EngineNode<'a>>>),
}

impl<'a> Value<'a> {
    pub fn from_bool(b: bool) -> Self {
        Value::Atomic(AtomicValue::Boolean(b))
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Value::Atomic(AtomicValue::String(s.into()))
    }

    pub fn singleton_node(node: impl Into<EngineNode<'a>>) -> Self {
        Value::Node(node.into())
    }

    pub fn node_set(nodes: Vec<EngineNode<'a>>) -> Self {
        Value::NodeSet(Rc::new(nodes))
    }

    pub fn sequence(items: Vec<Value<'a>>) -> Self {
        match items.len() {
            0 => Value::Empty,
            1 => items.into_iter().next().unwrap(),
            _ => Value::Sequence(Rc::new(items)),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Effective boolean value, per the data model's own coercion rule
    /// (empty sequence/`false`/`0`/`""` are false; a non-empty node-set is
    /// true regardless of content; any other non-singleton sequence is an
    /// error at the `ExprEval` boundary, not here).
    pub fn effective_boolean_value(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Atomic(a) => atomic_truthy(a),
            Value::Node(_) => true,
            Value::NodeSet(nodes) => !nodes.is_empty(),
            Value::Rtf(_) => true,
            Value::Map(m) => !m.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Function(_) => true,
            Value::Sequence(items) => items.first().map(Value::effective_boolean_value).unwrap_or(false),
        }
    }

    /// Flatten into individual items, the way a sequence constructor's result
    /// is flattened before being handed to the next instruction.
    pub fn into_items(self) -> Vec<Value<'a>> {
        match self {
            Value::Empty => Vec::new(),
            Value::Sequence(items) => match Rc::try_unwrap(items) {
                Ok(items) => items.into_iter().flat_map(Value::into_items).collect(),
                Err(items) => items.iter().cloned().flat_map(Value::into_items).collect(),
            },
            other => vec![other],
        }
    }

    /// A borrow-scoped view of this value as an `ExprEval` [`XdmValue`], for
    /// feeding into `xpath_expr::evaluate` (as a context item, a variable
    /// binding, or a function argument). A captured [`ResultTreeFragment`] is
    /// materialized into its owned node tree lazily, right here, bounded by
    /// this borrow — nothing born from it can outlive the call that asked for
    /// this view.
    pub fn to_xdm<'v>(&'v self) -> XdmValue<EngineNode<'v>>
    where
        'a: 'v,
    {
        match self {
            Value::Empty => XdmValue::empty(),
            Value::Atomic(a) => XdmValue::from_atomic(a.clone()),
            Value::Node(n) => XdmValue::from_items(vec![XdmItem::Node(*n)]),
            Value::NodeSet(nodes) => {
                XdmValue::from_items(nodes.iter().copied().map(XdmItem::Node).collect())
            }
            Value::Rtf(rtf) => {
                let root = EngineNode::Constructed(rtf.root());
                XdmValue::from_items(vec![XdmItem::Node(root)])
            }
            Value::Map(m) => XdmValue::from_items(vec![XdmItem::Map((**m).clone())]),
            Value::Array(a) => XdmValue::from_items(vec![XdmItem::Array((**a).clone())]),
            Value::Function(f) => XdmValue::from_items(vec![XdmItem::Function((**f).clone())]),
            Value::Sequence(items) => {
                let mut out = Vec::new();
                for item in items.iter() {
                    out.extend(item.to_xdm().into_items());
                }
                XdmValue::from_items(out)
            }
        }
    }

    /// The inverse of [`Value::to_xdm`]: lift an `ExprEval` result (a path
    /// expression, a function call, a computed `select`) back into the
    /// engine's own value model.
    pub fn from_xdm(value: XdmValue<EngineNode<'a>>) -> Self {
        let items = value.into_items();
        Value::sequence(items.into_iter().map(Value::from_xdm_item).collect())
    }

    pub fn from_xdm_item(item: XdmItem<EngineNode<'a>>) -> Self {
        match item {
            XdmItem::Atomic(a) => Value::Atomic(a),
            XdmItem::Node(n) => Value::Node(n),
            XdmItem::Map(m) => Value::Map(Rc::new(m)),
            XdmItem::Array(a) => Value::Array(Rc::new(a)),
            XdmItem::Function(f) => Value::Function(Rc::new(f)),
        }
    }

    /// The XPath `string()` value of this item, for contexts (attribute
    /// value templates, `xsl:value-of`, sort keys over an explicit
    /// `data-type="text"`) that need a plain string rather than a full
    /// `ExprEval` round-trip.
    pub fn string_value(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Atomic(a) => a.to_string_value(),
            Value::Node(n) => n.string_value(),
            Value::NodeSet(nodes) => nodes.first().map(|n| n.string_value()).unwrap_or_default(),
            Value::Rtf(rtf) => rtf.root().string_value(),
            Value::Sequence(items) => items
                .iter()
                .map(Value::string_value)
                .collect::<Vec<_>>()
                .join(" "),
            Value::Map(_) | Value::Array(_) | Value::Function(_) => {
                // Maps, arrays and functions have no string value in the data
                // model; callers that reach here despite that should already
                // have raised a type error at the `ExprEval` boundary.
                String::new()
            }
        }
    }
}

fn atomic_truthy(value: &AtomicValue) -> bool {
    match value {
        AtomicValue::Boolean(b) => *b,
        AtomicValue::String(s) | AtomicValue::UntypedAtomic(s) => !s.is_empty(),
        AtomicValue::Integer(i) => *i != 0,
        AtomicValue::Double(d) => *d != 0.0,
        AtomicValue::Decimal(d) => !d.is_zero(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_constructor_flattens_nested_sequences() {
        let nested = Value::sequence(vec![
            Value::from_string("a"),
            Value::sequence(vec![Value::from_string("b"), Value::from_string("c")]),
        ]);
        assert_eq!(nested.into_items().len(), 3);
    }

    #[test]
    fn effective_boolean_value_of_empty_sequence_is_false() {
        assert!(!Value::Empty.effective_boolean_value());
        assert!(Value::from_string("x").effective_boolean_value());
        assert!(!Value::from_string("").effective_boolean_value());
    }
}
