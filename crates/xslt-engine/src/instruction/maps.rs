//! `xsl:map`/`xsl:map-entry`: a map has no event-stream representation, so
//! `xsl:map` is never dispatched through the ordinary `OutputSink` path —
//! [`super::capture_value`] special-cases a body that is exactly one
//! `xsl:map` instruction and calls [`build_map`] directly instead.

use std::rc::Rc;

use xpath_expr::{AtomicValue, XdmItem, XdmMap, XdmValue};

use super::{Instruction, MapEntryValue};
use crate::context::TransformContext;
use crate::error::EngineError;
use crate::node::EngineNode;
use crate::value::Value;

pub fn build_map<'a, 'doc>(
    entries: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
) -> Result<Value<'a>, EngineError> {
    let mut map = XdmMap::new();
    for entry in entries {
        let Instruction::MapEntry { key, value } = entry else {
            return Err(EngineError::dynamic(
                "XTTE3375",
                "xsl:map may only contain xsl:map-entry children",
            ));
        };
        let key_atomic = to_map_key(ctx.evaluate_expr(key)?);
        let entry_value = match value {
            MapEntryValue::Select(expr) => ctx.evaluate_expr(expr)?,
            MapEntryValue::Body(body) => super::capture_value(body, ctx)?,
        };
        // Later entries overwrite earlier ones on a key collision, the same
        // as a plain `HashMap` insert.
        map = map.put(key_atomic, value_to_xdm_owned(entry_value));
    }
    Ok(Value::Map(Rc::new(map)))
}

fn to_map_key(value: Value<'_>) -> AtomicValue {
    match value {
        Value::Atomic(a) => a,
        other => AtomicValue::String(other.string_value()),
    }
}

/// Lift a captured entry value into the owned `XdmValue<EngineNode<'a>>` a
/// map's values are stored as. Nodes and atomics carry over structurally; a
/// captured result tree fragment has no representation that doesn't borrow
/// its lazily-built tree, so it falls back to its string value the same way
/// [`Value::string_value`] already does for maps/arrays/functions.
fn value_to_xdm_owned<'a>(value: Value<'a>) -> XdmValue<EngineNode<'a>> {
    match value {
        Value::Empty => XdmValue::empty(),
        Value::Atomic(a) => XdmValue::from_atomic(a),
        Value::Node(n) => XdmValue::from_items(vec![XdmItem::Node(n)]),
        Value::NodeSet(nodes) => {
            XdmValue::from_items(nodes.iter().copied().map(XdmItem::Node).collect())
        }
        Value::Map(m) => XdmValue::from_items(vec![XdmItem::Map((*m).clone())]),
        Value::Array(a) => XdmValue::from_items(vec![XdmItem::Array((*a).clone())]),
        Value::Function(f) => XdmValue::from_items(vec![XdmItem::Function((*f).clone())]),
        Value::Sequence(items) => {
            let owned = Rc::try_unwrap(items).unwrap_or_else(|rc| (*rc).clone());
            let mut out = Vec::new();
            for item in owned {
                out.extend(value_to_xdm_owned(item).into_items());
            }
            XdmValue::from_items(out)
        }
        Value::Rtf(rtf) => XdmValue::from_atomic(AtomicValue::String(rtf.root().string_value())),
    }
}
