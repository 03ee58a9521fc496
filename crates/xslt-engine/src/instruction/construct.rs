//! Node-construction instructions: literal result elements and the computed
//! equivalents (`xsl:element`/`xsl:attribute`/`xsl:comment`/
//! `xsl:processing-instruction`), plus `xsl:copy`/`xsl:copy-of`.

use xpath_node::{DataSourceNode, NodeType};

use super::{eval_avt, execute_body, AttributeValueTemplate, Instruction, SortKey};
use crate::context::TransformContext;
use crate::error::EngineError;
use crate::output::OutputSink;
use crate::signals::Signal;
use crate::sort_group::{sort_items, CollationRegistry};
use crate::value::Value;

/// Is `s` a valid XML `NCName` (no colon, valid start/continuation
/// characters)? A simplified ASCII-plus-common-Unicode check, not the full
/// XML `NameStartChar`/`NameChar` production.
fn is_valid_ncname(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-' || c == '.')
}

/// Split and validate a computed `qname` into its optional prefix and local
/// part, raising `XTDE0820` when either piece isn't a valid `NCName`.
fn validate_qname(qname: &str) -> Result<(Option<&str>, &str), EngineError> {
    let (prefix, local) = match qname.split_once(':') {
        Some((p, l)) => (Some(p), l),
        None => (None, qname),
    };
    if let Some(p) = prefix {
        if !is_valid_ncname(p) {
            return Err(EngineError::dynamic(
                "XTDE0820",
                format!("'{qname}' is not a valid QName: invalid prefix"),
            ));
        }
    }
    if !is_valid_ncname(local) {
        return Err(EngineError::dynamic(
            "XTDE0820",
            format!("'{qname}' is not a valid QName: invalid local name"),
        ));
    }
    Ok((prefix, local))
}

/// `XTDE0835`: a computed namespace URI must not be empty when the element or
/// attribute it names carries a prefix.
fn validate_uri(uri: &str) -> Result<(), EngineError> {
    if uri.is_empty() {
        return Err(EngineError::dynamic(
            "XTDE0835",
            "computed namespace URI must not be empty",
        ));
    }
    Ok(())
}

pub fn execute_literal_element<'a, 'doc>(
    instr: &Instruction<'doc>,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let Instruction::LiteralElement {
        qname,
        uri,
        local,
        namespaces,
        attributes,
        children,
    } = instr
    else {
        unreachable!("execute_literal_element called on a non-LiteralElement instruction");
    };
    out.start_element(uri.as_deref(), local, qname)?;
    for ns in namespaces {
        out.namespace(ns.prefix.as_deref(), &ns.uri)?;
    }
    for attr in attributes {
        let value = eval_avt(&attr.value, ctx)?;
        out.attribute(attr.uri.as_deref(), &attr.local, &attr.qname, &value)?;
    }
    let signal = execute_body(children, ctx, out)?;
    out.end_element(uri.as_deref(), local, qname)?;
    Ok(signal)
}

pub fn execute_value_of<'a, 'doc>(
    select: &xpath_expr::Expression,
    separator: Option<&AttributeValueTemplate>,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let value = ctx.evaluate_expr(select)?;
    let sep = match separator {
        Some(avt) => eval_avt(avt, ctx)?,
        None => " ".to_string(),
    };
    let text = match &value {
        Value::Sequence(items) => items
            .iter()
            .map(Value::string_value)
            .collect::<Vec<_>>()
            .join(&sep),
        other => other.string_value(),
    };
    out.characters(&text)?;
    Ok(Signal::Normal)
}

/// `xsl:copy`: a shallow copy of the context node (its name and, for
/// elements, nothing below it) with `body` executed as its content.
pub fn execute_copy<'a, 'doc>(
    inherit_namespaces: bool,
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let _ = inherit_namespaces; // namespace-set inheritance is a serializer concern downstream of this sink
    match &ctx.context_item {
        Some(Value::Node(node)) => match node.node_type() {
            NodeType::Element => {
                let qname = node
                    .name()
                    .map(|q| q.local_part.to_string())
                    .unwrap_or_default();
                out.start_element(None, &qname, &qname)?;
                let signal = execute_body(body, ctx, out)?;
                out.end_element(None, &qname, &qname)?;
                Ok(signal)
            }
            NodeType::Attribute => {
                let qname = node
                    .name()
                    .map(|q| q.local_part.to_string())
                    .unwrap_or_default();
                out.attribute(None, &qname, &qname, &node.string_value())?;
                Ok(Signal::Normal)
            }
            NodeType::Text => {
                out.characters(&node.string_value())?;
                Ok(Signal::Normal)
            }
            NodeType::Comment => {
                out.comment(&node.string_value())?;
                Ok(Signal::Normal)
            }
            NodeType::ProcessingInstruction => {
                let target = node.name().map(|q| q.local_part.to_string()).unwrap_or_default();
                out.processing_instruction(&target, &node.string_value())?;
                Ok(Signal::Normal)
            }
            NodeType::Root => execute_body(body, ctx, out),
        },
        Some(other) => {
            out.atomic_value(&other.string_value())?;
            Ok(Signal::Normal)
        }
        None => Ok(Signal::Normal),
    }
}

/// `xsl:sequence`: unlike `xsl:copy-of`, items are written as independent
/// sequence members rather than merged into a single run — an `item_boundary`
/// separates each one so a downstream sequence builder never fuses two
/// adjacent atomics into one text item.
pub fn execute_sequence<'a, 'doc>(
    select: &xpath_expr::Expression,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let value = ctx.evaluate_expr(select)?;
    for item in value.into_items() {
        deep_copy_item(&item, out)?;
        out.item_boundary()?;
    }
    Ok(Signal::Normal)
}

/// `xsl:copy-of`: a deep, structure-preserving copy of every node (or
/// atomic value) `select` returns.
pub fn execute_copy_of<'a, 'doc>(
    select: &xpath_expr::Expression,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let value = ctx.evaluate_expr(select)?;
    for item in value.into_items() {
        deep_copy_item(&item, out)?;
    }
    Ok(Signal::Normal)
}

pub(super) fn deep_copy_item(item: &Value<'_>, out: &mut dyn OutputSink) -> Result<(), EngineError> {
    match item {
        Value::Node(node) => deep_copy_node(*node, out),
        Value::NodeSet(nodes) => {
            for n in nodes.iter() {
                deep_copy_node(*n, out)?;
            }
            Ok(())
        }
        Value::Rtf(rtf) => rtf.replay_into(out),
        other => out.atomic_value(&other.string_value()),
    }
}

fn deep_copy_node<'a>(node: crate::node::EngineNode<'a>, out: &mut dyn OutputSink) -> Result<(), EngineError> {
    match node.node_type() {
        NodeType::Element => {
            let qname = node.name().map(|q| q.local_part.to_string()).unwrap_or_default();
            out.start_element(None, &qname, &qname)?;
            for attr in node.attributes() {
                let aname = attr.name().map(|q| q.local_part.to_string()).unwrap_or_default();
                out.attribute(None, &aname, &aname, &attr.string_value())?;
            }
            for child in node.children() {
                deep_copy_node(child, out)?;
            }
            out.end_element(None, &qname, &qname)
        }
        NodeType::Attribute => {
            let aname = node.name().map(|q| q.local_part.to_string()).unwrap_or_default();
            out.attribute(None, &aname, &aname, &node.string_value())
        }
        NodeType::Text => out.characters(&node.string_value()),
        NodeType::Comment => out.comment(&node.string_value()),
        NodeType::ProcessingInstruction => {
            let target = node.name().map(|q| q.local_part.to_string()).unwrap_or_default();
            out.processing_instruction(&target, &node.string_value())
        }
        NodeType::Root => {
            for child in node.children() {
                deep_copy_node(child, out)?;
            }
            Ok(())
        }
    }
}

pub fn execute_computed_element<'a, 'doc>(
    instr: &Instruction<'doc>,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let Instruction::Element {
        name,
        namespace,
        attribute_sets,
        body,
    } = instr
    else {
        unreachable!("execute_computed_element called on a non-Element instruction");
    };
    let qname = eval_avt(name, ctx)?;
    let (prefix, _local) = validate_qname(&qname)?;
    let uri = namespace.as_ref().map(|avt| eval_avt(avt, ctx)).transpose()?;
    match &uri {
        Some(u) if prefix.is_some() => validate_uri(u)?,
        None if prefix.is_some() => {
            return Err(EngineError::dynamic(
                "XTDE0830",
                format!("'{qname}' has a prefix but no namespace URI was supplied"),
            ))
        }
        _ => {}
    }
    out.start_element(uri.as_deref(), &qname, &qname)?;
    for set_name in attribute_sets {
        if let Some(set) = ctx.stylesheet.attribute_sets.get(set_name) {
            execute_body(&set.body, ctx, out)?;
        }
    }
    let signal = execute_body(body, ctx, out)?;
    out.end_element(uri.as_deref(), &qname, &qname)?;
    Ok(signal)
}

pub fn execute_computed_attribute<'a, 'doc>(
    name: &AttributeValueTemplate,
    namespace: Option<&AttributeValueTemplate>,
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let qname = eval_avt(name, ctx)?;
    let (prefix, _local) = validate_qname(&qname)?;
    let uri = namespace.map(|avt| eval_avt(avt, ctx)).transpose()?;
    match &uri {
        Some(u) if prefix.is_some() => validate_uri(u)?,
        None if prefix.is_some() => {
            return Err(EngineError::dynamic(
                "XTDE0830",
                format!("'{qname}' has a prefix but no namespace URI was supplied"),
            ))
        }
        _ => {}
    }
    let value = super::capture_value(body, ctx)?;
    out.attribute(uri.as_deref(), &qname, &qname, &value.string_value())?;
    Ok(Signal::Normal)
}

pub fn execute_comment<'a, 'doc>(
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let value = super::capture_value(body, ctx)?;
    out.comment(&value.string_value())?;
    Ok(Signal::Normal)
}

pub fn execute_processing_instruction<'a, 'doc>(
    name: &AttributeValueTemplate,
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let target = eval_avt(name, ctx)?;
    let value = super::capture_value(body, ctx)?;
    out.processing_instruction(&target, &value.string_value())?;
    Ok(Signal::Normal)
}

/// `xsl:perform-sort`: sort `select`'s items (or, absent a `select`, the
/// items captured from `body`) by `sort_keys` and deep-copy each through in
/// the resulting order.
pub fn execute_perform_sort<'a, 'doc>(
    select: Option<&xpath_expr::Expression>,
    sort_keys: &[SortKey],
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let items = match select {
        Some(expr) => ctx.evaluate_expr(expr)?.into_items(),
        None => super::capture_value(body, ctx)?.into_items(),
    };
    let registry = CollationRegistry::default();
    let sorted = sort_items(items, sort_keys, ctx, &registry)?;
    for item in sorted {
        deep_copy_item(&item, out)?;
        out.item_boundary()?;
    }
    Ok(Signal::Normal)
}
