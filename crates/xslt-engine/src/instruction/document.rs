//! `xsl:document`, `xsl:evaluate`, `xsl:source-document`, `xsl:result-document`:
//! the instructions whose output doesn't flow straight into the caller's
//! `OutputSink`, either because they build a detached node (`xsl:document`),
//! run a dynamically-compiled expression (`xsl:evaluate`), or read/write a
//! document through the [`crate::resolver`] gateway.

use std::collections::HashMap;

use super::construct::deep_copy_item;
use super::{eval_avt, execute_body, AttributeValueTemplate, Instruction, WithParam};
use crate::context::TransformContext;
use crate::error::EngineError;
use crate::output::OutputSink;
use crate::rtf::RtfSink;
use crate::signals::Signal;
use crate::value::Value;

/// `xsl:document`: always captures its body into a detached fragment and
/// replays it into `out`, rather than writing through directly — so a single
/// top-level element in `body` reads back as one document-node item the way
/// `fn:doc()`/a captured variable's content would. A body with several
/// top-level siblings replays as several adjacent items instead of a single
/// document node; the common case of one root element is unaffected.
pub fn execute_document<'a, 'doc>(
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let mut sink = RtfSink::new();
    let signal = execute_body(body, ctx, &mut sink)?;
    if !signal.is_normal() {
        return Ok(signal);
    }
    let fragment = sink.into_fragment("");
    fragment.replay_into(out)?;
    Ok(Signal::Normal)
}

/// `xsl:evaluate`: compile `xpath`'s run-time string through
/// [`TransformContext::compile_dynamic_expr`] and evaluate it, optionally
/// against a rebound context item, with `with_params` bound as ordinary
/// variables visible only to the evaluated expression.
pub fn execute_evaluate<'a, 'doc>(
    xpath: &xpath_expr::Expression,
    context_item: Option<&xpath_expr::Expression>,
    with_params: &[WithParam<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let source = ctx.evaluate_expr(xpath)?.string_value();
    let compiled = ctx.compile_dynamic_expr(&source)?;

    let mut bindings = HashMap::with_capacity(with_params.len());
    for p in with_params {
        let value = if p.body.is_empty() {
            ctx.evaluate_expr(&p.select)?
        } else {
            super::capture_value(&p.body, ctx)?
        };
        bindings.insert(p.name.to_string(), value);
    }
    let mut eval_ctx = ctx.with_variables(ctx.variables.child_with(bindings));
    if let Some(expr) = context_item {
        let item = ctx.evaluate_expr(expr)?;
        eval_ctx = eval_ctx.with_context_item(item, 1, 1);
    }

    let result = eval_ctx.evaluate_expr(&compiled)?;
    for item in result.into_items() {
        deep_copy_item(&item, out)?;
        out.item_boundary()?;
    }
    Ok(Signal::Normal)
}

/// `xsl:source-document`: resolve `href` through the configured
/// [`crate::resolver::DocumentResolver`] and run `body` with the resolved
/// document bound as the context item.
pub fn execute_source_document<'a, 'doc>(
    href: &AttributeValueTemplate,
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let href_value = eval_avt(href, ctx)?;
    if href_value.is_empty() {
        return Err(EngineError::dynamic(
            "FODC0002",
            "xsl:source-document: href must not be empty",
        ));
    }
    let resolver = ctx.document_resolver.clone().ok_or_else(|| {
        EngineError::dynamic(
            "FODC0002",
            format!("no document resolver configured for '{href_value}'"),
        )
    })?;
    let fragment = resolver.resolve(&href_value)?;
    let doc_ctx = ctx.with_context_item(Value::Rtf(fragment), 1, 1);
    execute_body(body, &doc_ctx, out)
}

/// `xsl:result-document`: run `body` into a secondary output sink opened
/// through the configured [`crate::resolver::ResultDocumentResolver`],
/// rather than into the principal output `out` (which this instruction never
/// writes to).
pub fn execute_result_document<'a, 'doc>(
    href: &AttributeValueTemplate,
    format_encoding: Option<&AttributeValueTemplate>,
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let _ = out;
    let href_value = eval_avt(href, ctx)?;
    if href_value.is_empty() {
        return Err(EngineError::dynamic(
            "FODC0002",
            "xsl:result-document: href must not be empty",
        ));
    }
    let encoding = match format_encoding {
        Some(avt) => eval_avt(avt, ctx)?,
        None => ctx.stylesheet.output_encoding.to_string(),
    };
    let resolver = ctx.result_document_resolver.clone().ok_or_else(|| {
        EngineError::dynamic(
            "FODC0002",
            format!("no result document resolver configured for '{href_value}'"),
        )
    })?;
    let mut sink = resolver.open(&href_value, &encoding)?;
    let signal = execute_body(body, ctx, sink.as_mut())?;
    sink.flush()?;
    Ok(signal)
}
