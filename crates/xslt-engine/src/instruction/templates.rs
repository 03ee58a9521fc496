//! Template dispatch instructions: `xsl:apply-templates`, `xsl:call-template`,
//! `xsl:apply-imports`, `xsl:next-match`.

use std::collections::HashMap;
use std::rc::Rc;

use xpath_node::DataSourceNode;

use super::{execute_body, Instruction, WithParam};
use crate::accumulator::AccumulatorPhase;
use crate::context::TransformContext;
use crate::error::EngineError;
use crate::matcher::{BuiltInAction, MatchResult, TemplateMatcher};
use crate::node::EngineNode;
use crate::output::OutputSink;
use crate::signals::Signal;
use crate::sort_group::{sort_items, CollationRegistry};
use crate::stylesheet::TemplateRule;
use crate::value::Value;

/// Split `with-param`s into non-tunnel bindings (applied as template params)
/// and tunnel bindings (overlaid onto the tunnel-parameter map).
fn split_params<'a, 'doc>(
    params: &[WithParam<'doc>],
    ctx: &TransformContext<'a, 'doc>,
) -> Result<(HashMap<String, Value<'a>>, HashMap<String, Value<'a>>), EngineError> {
    let mut direct = HashMap::new();
    let mut tunnel = HashMap::new();
    for p in params {
        let value = if p.body.is_empty() {
            ctx.evaluate_expr(&p.select)?
        } else {
            super::capture_value(&p.body, ctx)?
        };
        if p.tunnel {
            tunnel.insert(p.name.to_string(), value);
        } else {
            direct.insert(p.name.to_string(), value);
        }
    }
    Ok((direct, tunnel))
}

/// Bind a called template's declared parameters: explicit `with-param`
/// bindings take precedence, required params without one are an error,
/// everything else falls back to its declared default (or tunnel scope).
fn bind_template_params<'a, 'doc>(
    rule: &'doc TemplateRule<'doc>,
    direct: HashMap<String, Value<'a>>,
    ctx: &TransformContext<'a, 'doc>,
) -> Result<HashMap<String, Value<'a>>, EngineError> {
    let mut bindings = HashMap::new();
    for decl in &rule.params {
        if let Some(v) = direct.get(&*decl.name) {
            bindings.insert(decl.name.to_string(), v.clone());
            continue;
        }
        if decl.tunnel {
            if let Some(v) = ctx.tunnel_params.get(&decl.name) {
                bindings.insert(decl.name.to_string(), v.clone());
                continue;
            }
        }
        match &decl.default {
            Some(expr) => {
                bindings.insert(decl.name.to_string(), ctx.evaluate_expr(expr)?);
            }
            None => {
                if decl.required {
                    return Err(EngineError::dynamic(
                        "XTDE0700",
                        format!("missing required parameter ${}", decl.name),
                    ));
                }
                bindings.insert(decl.name.to_string(), Value::Empty);
            }
        }
    }
    Ok(bindings)
}

fn run_rule<'a, 'doc>(
    rule: &'doc TemplateRule<'doc>,
    direct_params: HashMap<String, Value<'a>>,
    tunnel_overlay: HashMap<String, Value<'a>>,
    base_ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let bindings = bind_template_params(rule, direct_params, base_ctx)?;
    let child_ctx = base_ctx
        .with_variables(base_ctx.variables.child_with(bindings))
        .with_tunnel_params(base_ctx.tunnel_params.overlay(tunnel_overlay))
        .with_current_template(Some(rule));
    let signal = execute_body(&rule.body, &child_ctx, out)?;
    match signal {
        Signal::Break(_) | Signal::NextIteration(_) => Err(EngineError::SignalEscaped(
            "xsl:break/xsl:next-iteration used outside of xsl:iterate",
        )),
        Signal::Normal => Ok(Signal::Normal),
    }
}

pub fn execute_apply_templates<'a, 'doc>(
    instr: &Instruction<'doc>,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let Instruction::ApplyTemplates {
        select,
        mode,
        sort_keys,
        params,
    } = instr
    else {
        unreachable!("execute_apply_templates called on a non-ApplyTemplates instruction");
    };

    let selected = match select {
        Some(expr) => ctx.evaluate_expr(expr)?.into_items(),
        None => match &ctx.context_item {
            Some(Value::Node(n)) => n.children().map(Value::Node).collect(),
            _ => Vec::new(),
        },
    };

    let registry = CollationRegistry::default();
    let ordered = sort_items(selected, sort_keys, ctx, &registry)?;
    let (direct, tunnel) = split_params(params, ctx)?;
    let effective_mode: Option<Rc<str>> = mode.clone().or_else(|| ctx.stylesheet.default_mode.clone());
    let size = ordered.len();

    // Accumulators thread across the sibling sequence the same way a loop
    // variable would: each node's `Start`/`End` firing sees the value left by
    // the previous sibling, not the value in force when `apply-templates`
    // itself started.
    let mut accumulators = ctx.accumulators.clone();
    for (idx, item) in ordered.into_iter().enumerate() {
        if let Value::Node(node) = &item {
            accumulators = Rc::new(accumulators.fire(
                &ctx.stylesheet.accumulators,
                AccumulatorPhase::Start,
                *node,
                ctx,
            )?);
        }
        let iter_ctx = ctx
            .with_context_item(item.clone(), idx + 1, size)
            .with_mode(effective_mode.clone())
            .with_tunnel_params(ctx.tunnel_params.overlay(tunnel.clone()))
            .with_accumulators(accumulators.clone());
        let signal = apply_one(&item, effective_mode.as_deref(), direct.clone(), &iter_ctx, out)?;
        if let Value::Node(node) = &item {
            accumulators = Rc::new(accumulators.fire(
                &ctx.stylesheet.accumulators,
                AccumulatorPhase::End,
                *node,
                ctx,
            )?);
        }
        if !signal.is_normal() {
            return Ok(signal);
        }
    }
    Ok(Signal::Normal)
}

/// Dispatch a single item the way one step of `apply-templates`'s sibling loop
/// would: find the best-ranked matching rule, or fall back to the built-in
/// template. `pub(crate)` so the crate root's entry point can dispatch the
/// very first node the same way a nested `apply-templates` dispatches every
/// other one.
pub(crate) fn apply_one<'a, 'doc>(
    item: &Value<'a>,
    mode: Option<&str>,
    direct_params: HashMap<String, Value<'a>>,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let node = match item {
        Value::Node(node) => *node,
        Value::Atomic(value) => {
            return match TemplateMatcher::find_match_for_atomic_value(ctx.stylesheet, value, mode) {
                Some(MatchResult { rule, .. }) => run_rule(rule, direct_params, HashMap::new(), ctx, out),
                // No built-in template applies to a non-node item; its
                // string value is the built-in fallback's nearest analogue.
                None => {
                    out.characters(&item.string_value())?;
                    Ok(Signal::Normal)
                }
            };
        }
        // Other non-node item shapes (maps, arrays, functions) have no
        // dispatch or built-in fallback defined for apply-templates.
        other => {
            out.characters(&other.string_value())?;
            return Ok(Signal::Normal);
        }
    };
    match TemplateMatcher::find_match(ctx.stylesheet, node, mode, ctx, None) {
        Some(MatchResult { rule, .. }) => run_rule(rule, direct_params, HashMap::new(), ctx, out),
        None => {
            run_built_in(node, ctx, out)?;
            Ok(Signal::Normal)
        }
    }
}

fn run_built_in<'a, 'doc>(
    node: EngineNode<'a>,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<(), EngineError> {
    match TemplateMatcher::built_in_action(node) {
        BuiltInAction::ApplyToChildren => {
            let size = node.children().count();
            for (idx, child) in node.children().enumerate() {
                let child_ctx = ctx.with_context_item(Value::Node(child), idx + 1, size);
                run_built_in(child, &child_ctx, out)?;
            }
            Ok(())
        }
        BuiltInAction::CopyStringValue(text) => {
            out.characters(&text)?;
            Ok(())
        }
        BuiltInAction::Nothing => Ok(()),
    }
}

pub fn execute_call_template<'a, 'doc>(
    name: &Rc<str>,
    params: &[WithParam<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let rule = ctx
        .stylesheet
        .template_by_name(name)
        .ok_or_else(|| EngineError::UnknownNamedTemplate(name.to_string()))?;
    let (direct, tunnel) = split_params(params, ctx)?;
    run_rule(rule, direct, tunnel, ctx, out)
}

pub fn execute_apply_imports<'a, 'doc>(
    params: &[WithParam<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let current = ctx
        .current_template
        .ok_or_else(|| EngineError::usage("xsl:apply-imports used outside of a template rule"))?;
    let Some(Value::Node(node)) = &ctx.current_context_item else {
        return Ok(Signal::Normal);
    };
    let (direct, tunnel) = split_params(params, ctx)?;
    match TemplateMatcher::find_import_match(ctx.stylesheet, *node, ctx.mode.as_deref(), ctx, current) {
        Some(MatchResult { rule, .. }) => run_rule(rule, direct, tunnel, ctx, out),
        None => {
            run_built_in(*node, ctx, out)?;
            Ok(Signal::Normal)
        }
    }
}

pub fn execute_next_match<'a, 'doc>(
    params: &[WithParam<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let current = ctx
        .current_template
        .ok_or_else(|| EngineError::usage("xsl:next-match used outside of a template rule"))?;
    let Some(Value::Node(node)) = &ctx.current_context_item else {
        return Ok(Signal::Normal);
    };
    let (direct, tunnel) = split_params(params, ctx)?;
    match TemplateMatcher::find_next_match(ctx.stylesheet, *node, ctx.mode.as_deref(), ctx, current) {
        Some(MatchResult { rule, .. }) => run_rule(rule, direct, tunnel, ctx, out),
        None => {
            run_built_in(*node, ctx, out)?;
            Ok(Signal::Normal)
        }
    }
}
