//! The instruction tree: every XSLT sequence-constructor instruction this
//! crate can execute, plus the shared sub-structures (attribute value
//! templates, sort keys, `with-param` bindings) instructions are built from.
//!
//! Each [`Instruction`] variant is one XSLT instruction. Execution is a single
//! recursive `execute` method rather than one `impl` per variant — the
//! instructions share too much context threading (signals, tunnel params,
//! sequence flattening) for per-type dispatch to pay for itself here.

mod construct;
mod control;
mod document;
mod maps;
mod templates;
mod variables;

pub(crate) use templates::apply_one;

use std::rc::Rc;

use xpath_expr::Expression;

use crate::context::TransformContext;
use crate::error::EngineError;
use crate::output::OutputSink;
use crate::signals::Signal;
use crate::stylesheet::{ParamDecl, Pattern};
use crate::value::Value;

/// One piece of an attribute value template: either literal text carried
/// through unchanged, or a `{expr}` hole evaluated and string-joined in.
#[derive(Debug, Clone)]
pub enum AvtPart {
    Literal(Rc<str>),
    Expr(Rc<Expression>),
}

pub type AttributeValueTemplate = Rc<[AvtPart]>;

pub fn eval_avt<'a>(
    parts: &AttributeValueTemplate,
    ctx: &TransformContext<'a, '_>,
) -> Result<String, EngineError> {
    let mut out = String::new();
    for part in parts.iter() {
        match part {
            AvtPart::Literal(s) => out.push_str(s),
            AvtPart::Expr(expr) => out.push_str(&ctx.evaluate_expr(expr)?.string_value()),
        }
    }
    Ok(out)
}

#[derive(Clone)]
pub struct WithParam<'doc> {
    pub name: Rc<str>,
    pub select: Rc<Expression>,
    pub tunnel: bool,
    pub body: Vec<Instruction<'doc>>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SortDataType {
    Text,
    Number,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

#[derive(Clone)]
pub struct SortKey {
    pub select: Rc<Expression>,
    pub data_type: SortDataType,
    pub order: SortOrder,
    pub collation: Option<Rc<str>>,
    pub case_order_upper_first: Option<bool>,
}

#[derive(Clone)]
pub enum GroupingSpec {
    By(Rc<Expression>),
    Adjacent(Rc<Expression>),
    StartingWith(Pattern),
    EndingWith(Pattern),
}

#[derive(Clone)]
pub struct LiteralAttribute {
    pub qname: Rc<str>,
    pub uri: Option<Rc<str>>,
    pub local: Rc<str>,
    pub value: AttributeValueTemplate,
}

#[derive(Clone)]
pub struct NamespaceBinding {
    pub prefix: Option<Rc<str>>,
    pub uri: Rc<str>,
}

/// How many levels of ancestor-or-self count toward an `xsl:number` value:
/// the nearest matching one (`single`), every matching one from the nearest
/// `from` boundary down (`multiple`), or every matching node at or before the
/// context node anywhere under that boundary (`any`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumberLevel {
    #[default]
    Single,
    Multiple,
    Any,
}

/// One `xsl:merge-source`: its own selection and sort keys, evaluated and
/// pre-sorted independently before `xsl:merge` interleaves it with its
/// siblings by composite key.
#[derive(Clone)]
pub struct MergeSource<'doc> {
    pub name: Option<Rc<str>>,
    pub select: Rc<Expression>,
    pub sort_keys: Vec<SortKey>,
}

/// What an `xsl:map-entry` binds its key to: a `select` expression, or a
/// captured sequence-constructor body (mirroring `xsl:variable`'s two
/// value-producing shapes).
#[derive(Clone)]
pub enum MapEntryValue<'doc> {
    Select(Rc<Expression>),
    Body(Vec<Instruction<'doc>>),
}

/// An XSLT sequence-constructor instruction.
#[derive(Clone)]
pub enum Instruction<'doc> {
    /// A literal result element: `<out:row>...</out:row>` written as-is.
    LiteralElement {
        qname: Rc<str>,
        uri: Option<Rc<str>>,
        local: Rc<str>,
        namespaces: Vec<NamespaceBinding>,
        attributes: Vec<LiteralAttribute>,
        children: Vec<Instruction<'doc>>,
    },
    Text {
        value: Rc<str>,
        disable_output_escaping: bool,
    },
    ValueOf {
        select: Rc<Expression>,
        separator: Option<AttributeValueTemplate>,
    },
    /// `xsl:sequence`: evaluates `select` and replays its items directly into
    /// the result sequence — an RTF replays as events, a node set's nodes are
    /// each deep-copied, atomic values go through `atomic_value`'s separator
    /// handling — with an `item_boundary` between each item so adjacent
    /// atomics never merge into one.
    Sequence {
        select: Rc<Expression>,
    },

    ApplyTemplates {
        select: Option<Rc<Expression>>,
        mode: Option<Rc<str>>,
        sort_keys: Vec<SortKey>,
        params: Vec<WithParam<'doc>>,
    },
    CallTemplate {
        name: Rc<str>,
        params: Vec<WithParam<'doc>>,
    },
    ApplyImports {
        params: Vec<WithParam<'doc>>,
    },
    NextMatch {
        params: Vec<WithParam<'doc>>,
    },

    If {
        test: Rc<Expression>,
        body: Vec<Instruction<'doc>>,
    },
    Choose {
        branches: Vec<(Rc<Expression>, Vec<Instruction<'doc>>)>,
        otherwise: Vec<Instruction<'doc>>,
    },
    ForEach {
        select: Rc<Expression>,
        sort_keys: Vec<SortKey>,
        body: Vec<Instruction<'doc>>,
    },
    ForEachGroup {
        select: Rc<Expression>,
        grouping: GroupingSpec,
        body: Vec<Instruction<'doc>>,
    },
    Iterate {
        select: Rc<Expression>,
        params: Vec<ParamDecl>,
        body: Vec<Instruction<'doc>>,
        on_completion: Vec<Instruction<'doc>>,
    },
    Break {
        select: Option<Rc<Expression>>,
    },
    NextIteration {
        params: Vec<WithParam<'doc>>,
    },
    Fork {
        branches: Vec<Vec<Instruction<'doc>>>,
    },
    OnEmpty {
        primary: Vec<Instruction<'doc>>,
        fallback: Vec<Instruction<'doc>>,
    },
    OnNonEmpty {
        primary: Vec<Instruction<'doc>>,
        fallback: Vec<Instruction<'doc>>,
    },

    Variable {
        name: Rc<str>,
        select: Option<Rc<Expression>>,
        body: Vec<Instruction<'doc>>,
    },
    Param(ParamDecl),

    Copy {
        inherit_namespaces: bool,
        body: Vec<Instruction<'doc>>,
    },
    CopyOf {
        select: Rc<Expression>,
    },
    Element {
        name: AttributeValueTemplate,
        namespace: Option<AttributeValueTemplate>,
        attribute_sets: Vec<Rc<str>>,
        body: Vec<Instruction<'doc>>,
    },
    Attribute {
        name: AttributeValueTemplate,
        namespace: Option<AttributeValueTemplate>,
        body: Vec<Instruction<'doc>>,
    },
    Comment {
        body: Vec<Instruction<'doc>>,
    },
    ProcessingInstruction {
        name: AttributeValueTemplate,
        body: Vec<Instruction<'doc>>,
    },
    Namespace {
        prefix: AttributeValueTemplate,
        select: Rc<Expression>,
    },

    Number {
        value: Option<Rc<Expression>>,
        count: Option<Pattern>,
        from: Option<Pattern>,
        level: NumberLevel,
        format: Option<AttributeValueTemplate>,
        grouping_separator: Option<AttributeValueTemplate>,
        grouping_size: Option<AttributeValueTemplate>,
        start_at: Option<Rc<Expression>>,
    },
    Message {
        select: Option<Rc<Expression>>,
        /// An AVT rather than a plain flag: XSLT 3.0 lets `terminate`
        /// evaluate at run time, and a value outside `yes`/`no`/`true`/
        /// `false`/`1`/`0` is a dynamic error (`XTDE0030`), not a silent
        /// default.
        terminate: AttributeValueTemplate,
    },

    /// `xsl:assert`: `test` must hold at this point in the sequence
    /// constructor; when it doesn't, `body` is captured as the assertion's
    /// message and the transform fails with `XTMM9000`. Produces no output
    /// when `test` holds.
    Assert {
        test: Rc<Expression>,
        body: Vec<Instruction<'doc>>,
    },
    /// `xsl:perform-sort`: sorts `select` (or, absent one, `body`'s captured
    /// sequence) by `sort_keys` and deep-copies each item through in the
    /// resulting order.
    PerformSort {
        select: Option<Rc<Expression>>,
        sort_keys: Vec<SortKey>,
        body: Vec<Instruction<'doc>>,
    },
    /// `xsl:merge`: each source is selected and sorted independently, then
    /// interleaved into merge groups of equal composite key; `body` runs once
    /// per group with `current-merge-group()`/`current-merge-key()`/
    /// `current-merge-source()` bound.
    Merge {
        sources: Vec<MergeSource<'doc>>,
        body: Vec<Instruction<'doc>>,
    },
    /// `xsl:map`: only meaningful as the sole content of a value-producing
    /// body (`xsl:variable`/`xsl:param`/`xsl:with-param`) — see
    /// [`capture_value`]'s special case. Reached through ordinary `execute`
    /// dispatch (e.g. nested directly under a template body), it's a usage
    /// error: a map has no event-stream representation to write to `out`.
    Map {
        entries: Vec<Instruction<'doc>>,
    },
    /// `xsl:map-entry`: meaningful only as a direct child of `xsl:map`, which
    /// scans its own `entries` rather than dispatching through `execute`.
    MapEntry {
        key: Rc<Expression>,
        value: MapEntryValue<'doc>,
    },
    /// `xsl:document`: captures `body` into a detached fragment and replays
    /// it, so it reads back as a single document-node item rather than
    /// writing straight through to the enclosing sequence.
    Document {
        body: Vec<Instruction<'doc>>,
    },
    /// `xsl:evaluate`: compiles `xpath`'s run-time string through
    /// [`TransformContext::compile_dynamic_expr`] and evaluates it, optionally
    /// against a rebound context item, with `with_params` bound as variables.
    Evaluate {
        xpath: Rc<Expression>,
        context_item: Option<Rc<Expression>>,
        with_params: Vec<WithParam<'doc>>,
    },
    /// `xsl:source-document`: resolves `href` through the configured
    /// [`crate::resolver::DocumentResolver`] and runs `body` with the
    /// resolved document bound as the context item. `streamable` is carried
    /// as metadata only; no streaming parser is wired behind it.
    SourceDocument {
        href: AttributeValueTemplate,
        streamable: bool,
        body: Vec<Instruction<'doc>>,
    },
    /// `xsl:result-document`: runs `body` into a secondary output sink opened
    /// through the configured [`crate::resolver::ResultDocumentResolver`]
    /// rather than into the principal output.
    ResultDocument {
        href: AttributeValueTemplate,
        format_encoding: Option<AttributeValueTemplate>,
        body: Vec<Instruction<'doc>>,
    },

    /// Placeholder body an instruction with no useful default behavior falls
    /// back to when it has no other children — `xsl:fallback` in a stylesheet
    /// that's otherwise unaware of an unsupported instruction.
    Fallback(Vec<Instruction<'doc>>),
}

impl<'doc> Instruction<'doc> {
    /// Run this instruction's sequence constructor against `ctx`, emitting
    /// events/atomic-values to `out`. Returns the [`Signal`] this instruction
    /// (or one of its descendants) raised, so an enclosing `xsl:iterate` can
    /// react to `break`/`next-iteration`.
    pub fn execute<'a>(
        &self,
        ctx: &TransformContext<'a, 'doc>,
        out: &mut dyn OutputSink,
    ) -> Result<Signal<'a>, EngineError> {
        match self {
            Instruction::LiteralElement { .. } => construct::execute_literal_element(self, ctx, out),
            Instruction::Text {
                value,
                disable_output_escaping,
            } => {
                if *disable_output_escaping {
                    out.characters_raw(value)?;
                } else {
                    out.characters(value)?;
                }
                Ok(Signal::Normal)
            }
            Instruction::ValueOf { select, separator } => {
                construct::execute_value_of(select, separator.as_ref(), ctx, out)
            }
            Instruction::Sequence { select } => construct::execute_sequence(select, ctx, out),

            Instruction::ApplyTemplates { .. } => templates::execute_apply_templates(self, ctx, out),
            Instruction::CallTemplate { name, params } => {
                templates::execute_call_template(name, params, ctx, out)
            }
            Instruction::ApplyImports { params } => templates::execute_apply_imports(params, ctx, out),
            Instruction::NextMatch { params } => templates::execute_next_match(params, ctx, out),

            Instruction::If { test, body } => {
                if ctx.evaluate_expr(test)?.effective_boolean_value() {
                    execute_body(body, ctx, out)
                } else {
                    Ok(Signal::Normal)
                }
            }
            Instruction::Choose { branches, otherwise } => {
                for (test, body) in branches {
                    if ctx.evaluate_expr(test)?.effective_boolean_value() {
                        return execute_body(body, ctx, out);
                    }
                }
                execute_body(otherwise, ctx, out)
            }
            Instruction::ForEach { .. } => control::execute_for_each(self, ctx, out),
            Instruction::ForEachGroup { .. } => control::execute_for_each_group(self, ctx, out),
            Instruction::Iterate { .. } => control::execute_iterate(self, ctx, out),
            Instruction::Break { select } => {
                let value = select.as_ref().map(|e| ctx.evaluate_expr(e)).transpose()?;
                Ok(Signal::Break(value))
            }
            Instruction::NextIteration { params } => control::execute_next_iteration(params, ctx),
            Instruction::Fork { branches } => control::execute_fork(branches, ctx, out),
            Instruction::OnEmpty { primary, fallback } | Instruction::OnNonEmpty { primary, fallback } => {
                control::execute_on_empty(self, primary, fallback, ctx, out)
            }

            // Binding happens in `execute_body`, which owns the scope a
            // declaration is visible to (the rest of its sequence constructor).
            Instruction::Variable { .. } => Ok(Signal::Normal),
            Instruction::Param(_) => Ok(Signal::Normal), // bound by the caller before the body runs

            Instruction::Copy { inherit_namespaces, body } => {
                construct::execute_copy(*inherit_namespaces, body, ctx, out)
            }
            Instruction::CopyOf { select } => construct::execute_copy_of(select, ctx, out),
            Instruction::Element { .. } => construct::execute_computed_element(self, ctx, out),
            Instruction::Attribute { name, namespace, body } => {
                construct::execute_computed_attribute(name, namespace.as_ref(), body, ctx, out)
            }
            Instruction::Comment { body } => construct::execute_comment(body, ctx, out),
            Instruction::ProcessingInstruction { name, body } => {
                construct::execute_processing_instruction(name, body, ctx, out)
            }
            Instruction::Namespace { prefix, select } => {
                let prefix = eval_avt(prefix, ctx)?;
                let uri = ctx.evaluate_expr(select)?.string_value();
                out.namespace(Some(&prefix), &uri)?;
                Ok(Signal::Normal)
            }

            Instruction::Number { .. } => variables::execute_number(self, ctx, out),
            Instruction::Message { select, terminate } => {
                let text = match select {
                    Some(expr) => ctx.evaluate_expr(expr)?.string_value(),
                    None => String::new(),
                };
                log::info!(target: "xslt_engine::message", "{text}");
                let terminate_text = eval_avt(terminate, ctx)?;
                let should_terminate = match terminate_text.as_str() {
                    "yes" | "true" | "1" => true,
                    "no" | "false" | "0" | "" => false,
                    other => {
                        return Err(EngineError::dynamic(
                            "XTDE0030",
                            format!("xsl:message: invalid terminate value '{other}'"),
                        ))
                    }
                };
                if should_terminate {
                    return Err(EngineError::Terminated(text));
                }
                Ok(Signal::Normal)
            }

            Instruction::Assert { test, body } => control::execute_assert(test, body, ctx),
            Instruction::PerformSort { select, sort_keys, body } => {
                construct::execute_perform_sort(select.as_deref(), sort_keys, body, ctx, out)
            }
            Instruction::Merge { sources, body } => control::execute_merge(sources, body, ctx, out),
            Instruction::Map { .. } => Err(EngineError::usage(
                "xsl:map may only appear as the sole content of a variable, parameter, or with-param body",
            )),
            // Scanned directly by the enclosing xsl:map's own build step, the
            // same way xsl:param's default is bound by its caller rather than
            // through this dispatch.
            Instruction::MapEntry { .. } => Ok(Signal::Normal),
            Instruction::Document { body } => document::execute_document(body, ctx, out),
            Instruction::Evaluate { xpath, context_item, with_params } => {
                document::execute_evaluate(xpath, context_item.as_deref(), with_params, ctx, out)
            }
            Instruction::SourceDocument { href, body, .. } => {
                document::execute_source_document(href, body, ctx, out)
            }
            Instruction::ResultDocument { href, format_encoding, body } => {
                document::execute_result_document(href, format_encoding.as_ref(), body, ctx, out)
            }

            Instruction::Fallback(body) => execute_body(body, ctx, out),
        }
    }
}

/// Execute a sequence of sibling instructions, stopping early on the first
/// non-`Normal` signal (a `break`/`next-iteration` reaching up from a nested
/// `xsl:iterate` body) or the first error.
///
/// An `xsl:variable` is visible to its following siblings in the same
/// sequence constructor (and nowhere else), so this threads a locally-scoped
/// context through the loop rather than re-using `ctx` unchanged for every
/// instruction — the one place in the engine where a sequence of sibling
/// instructions isn't independent of each other.
pub fn execute_body<'a, 'doc>(
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let mut scope = None;
    for instr in body {
        let active = scope.as_ref().unwrap_or(ctx);
        let signal = instr.execute(active, out)?;
        if !signal.is_normal() {
            return Ok(signal);
        }
        if let Instruction::Variable { name, select, body: var_body } = instr {
            let value = variables::evaluate_variable_value(select.as_deref(), var_body, active)?;
            scope = Some(active.with_variable(name.to_string(), value));
        }
    }
    Ok(Signal::Normal)
}

/// Evaluate a body's sequence constructor into a captured [`Value`] rather
/// than writing it through to `out` — the shape `xsl:variable`'s `select`-less
/// form, `with-param`, and sort-key evaluation all need.
pub fn capture_value<'a, 'doc>(
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
) -> Result<Value<'a>, EngineError> {
    // A map has no event-stream representation at all, so it can't go
    // through an `OutputSink` the way every other captured value does;
    // `xsl:map` is only meaningful here, as the sole content of a
    // value-producing body.
    if let [Instruction::Map { entries }] = body {
        return maps::build_map(entries, ctx);
    }
    let mut sink = crate::rtf::RtfSink::new();
    execute_body(body, ctx, &mut sink)?;
    Ok(Value::Rtf(Rc::new(sink.into_fragment(""))))
}
