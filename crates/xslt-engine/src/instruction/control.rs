//! Flow-control instructions: `xsl:for-each`, `xsl:for-each-group`,
//! `xsl:iterate` and its `xsl:break`/`xsl:next-iteration`, `xsl:fork`, and the
//! XSLT 3.0 `xsl:on-empty`/`xsl:on-non-empty` pair.

use std::cmp::Ordering;
use std::collections::HashMap;

use super::{execute_body, Instruction, MergeSource, WithParam};
use crate::context::TransformContext;
use crate::error::EngineError;
use crate::output::OutputSink;
use crate::signals::Signal;
use crate::sort_group::{compare_keys, evaluate_keys, group_items, sort_items, CollationRegistry};
use crate::value::Value;

pub fn execute_for_each<'a, 'doc>(
    instr: &Instruction<'doc>,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let Instruction::ForEach { select, sort_keys, body } = instr else {
        unreachable!("execute_for_each called on a non-ForEach instruction");
    };
    let items = ctx.evaluate_expr(select)?.into_items();
    let registry = CollationRegistry::default();
    let ordered = sort_items(items, sort_keys, ctx, &registry)?;
    let size = ordered.len();
    for (idx, item) in ordered.into_iter().enumerate() {
        let item_ctx = ctx.with_context_item(item, idx + 1, size);
        let signal = execute_body(body, &item_ctx, out)?;
        if !signal.is_normal() {
            return Ok(signal);
        }
    }
    Ok(Signal::Normal)
}

pub fn execute_for_each_group<'a, 'doc>(
    instr: &Instruction<'doc>,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let Instruction::ForEachGroup { select, grouping, body } = instr else {
        unreachable!("execute_for_each_group called on a non-ForEachGroup instruction");
    };
    let items = ctx.evaluate_expr(select)?.into_items();
    let groups = group_items(items, grouping, ctx)?;
    let group_count = groups.len();
    for (idx, group) in groups.into_iter().enumerate() {
        let current_group = Value::sequence(group.members.clone());
        let leading_member = group.members.first().cloned().unwrap_or(Value::Empty);
        let mut group_ctx = ctx.with_context_item(leading_member, idx + 1, group_count);
        // `::`-prefixed names are the sentinel keys `current-group()`/
        // `current-grouping-key()` read out of the flattened variable map —
        // not real in-scope variables, so they can't collide with a stylesheet
        // variable actually named `current-group`.
        group_ctx = group_ctx.with_variable("::current-group", current_group);
        if let Some(key) = group.key {
            group_ctx = group_ctx.with_variable("::current-grouping-key", key);
        }
        let signal = execute_body(body, &group_ctx, out)?;
        if !signal.is_normal() {
            return Ok(signal);
        }
    }
    Ok(Signal::Normal)
}

/// `xsl:iterate`: like `xsl:for-each` but with explicit loop-carried
/// parameters, able to terminate early (`xsl:break`) or rebind its
/// parameters for the next round (`xsl:next-iteration`) instead of running
/// every item's body unconditionally.
pub fn execute_iterate<'a, 'doc>(
    instr: &Instruction<'doc>,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let Instruction::Iterate {
        select,
        params,
        body,
        on_completion,
    } = instr
    else {
        unreachable!("execute_iterate called on a non-Iterate instruction");
    };
    let items = ctx.evaluate_expr(select)?.into_items();
    let size = items.len();

    let mut bindings = HashMap::with_capacity(params.len());
    for p in params {
        let value = match &p.default {
            Some(expr) => ctx.evaluate_expr(expr)?,
            None => Value::Empty,
        };
        bindings.insert(p.name.to_string(), value);
    }

    let mut loop_scope = ctx.variables.child_with(bindings);
    for (idx, item) in items.into_iter().enumerate() {
        let iter_ctx = ctx
            .with_context_item(item, idx + 1, size)
            .with_variables(loop_scope.clone());
        let signal = execute_body(body, &iter_ctx, out)?;
        match signal {
            Signal::Normal => {}
            Signal::Break(value) => {
                let completion_ctx = match value {
                    Some(v) => iter_ctx.with_variable("break-value", v),
                    None => iter_ctx,
                };
                return execute_body(on_completion, &completion_ctx, out);
            }
            Signal::NextIteration(rebindings) => {
                loop_scope = loop_scope.child_with(rebindings);
            }
        }
    }
    let final_ctx = ctx.with_variables(loop_scope);
    execute_body(on_completion, &final_ctx, out)
}

pub fn execute_next_iteration<'a, 'doc>(
    params: &[WithParam<'doc>],
    ctx: &TransformContext<'a, 'doc>,
) -> Result<Signal<'a>, EngineError> {
    let mut rebindings = HashMap::with_capacity(params.len());
    for p in params {
        let value = if p.body.is_empty() {
            ctx.evaluate_expr(&p.select)?
        } else {
            super::capture_value(&p.body, ctx)?
        };
        rebindings.insert(p.name.to_string(), value);
    }
    Ok(Signal::NextIteration(rebindings))
}

pub fn execute_fork<'a, 'doc>(
    branches: &[Vec<Instruction<'doc>>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    crate::fork::execute_fork(branches, ctx, out)
}

/// `xsl:assert`: `test` must hold at this point in the sequence constructor.
/// When it doesn't, `body` (or, absent one, a generic message) becomes the
/// dynamic error's text and the transform fails with `XTMM9000`.
pub fn execute_assert<'a, 'doc>(
    test: &xpath_expr::Expression,
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
) -> Result<Signal<'a>, EngineError> {
    if ctx.evaluate_expr(test)?.effective_boolean_value() {
        return Ok(Signal::Normal);
    }
    let message = if body.is_empty() {
        "assertion failed".to_string()
    } else {
        super::capture_value(body, ctx)?.string_value()
    };
    Err(EngineError::dynamic("XTMM9000", message))
}

/// One item pulled from a merge source, tagged with its composite key and
/// the source it came from.
struct MergeItem<'a, 'doc> {
    keys: Vec<String>,
    value: Value<'a>,
    source_name: Option<&'doc str>,
}

/// `xsl:merge`: each `xsl:merge-source` is selected and sorted independently,
/// then every source's items are interleaved by composite key into merge
/// groups; `body` runs once per group with `current-merge-group()`/
/// `current-merge-key()`/`current-merge-source()` bound. All sources are
/// assumed to produce composite keys comparable against the first source's
/// `sort_keys` — a simplification, but one the W3C merge model itself leans
/// on by requiring every source to sort compatibly.
pub fn execute_merge<'a, 'doc>(
    sources: &[MergeSource<'doc>],
    body: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let registry = CollationRegistry::default();
    let Some(primary_keys) = sources.first().map(|s| &s.sort_keys) else {
        return Ok(Signal::Normal);
    };

    let mut tagged: Vec<MergeItem<'a, 'doc>> = Vec::new();
    for source in sources {
        let items = ctx.evaluate_expr(&source.select)?.into_items();
        let size = items.len();
        for (idx, item) in items.into_iter().enumerate() {
            let keys = evaluate_keys(&item, idx + 1, size, &source.sort_keys, ctx)?;
            tagged.push(MergeItem {
                keys,
                value: item,
                source_name: source.name.as_deref(),
            });
        }
    }
    tagged.sort_by(|a, b| compare_keys(&a.keys, &b.keys, primary_keys, &registry));

    // Partition the merged, sorted run into groups of equal composite key.
    let mut groups: Vec<Vec<MergeItem<'a, 'doc>>> = Vec::new();
    for item in tagged {
        let starts_new_group = match groups.last() {
            Some(g) => compare_keys(&g[0].keys, &item.keys, primary_keys, &registry) != Ordering::Equal,
            None => true,
        };
        if starts_new_group {
            groups.push(vec![item]);
        } else {
            groups.last_mut().unwrap().push(item);
        }
    }

    let group_count = groups.len();
    for (idx, group) in groups.into_iter().enumerate() {
        let key_values = group[0]
            .keys
            .iter()
            .map(|k| Value::from_string(k.clone()))
            .collect();
        let source_name = group[0].source_name.map(Value::from_string);
        let leading_value = group[0].value.clone();
        let members = Value::sequence(group.into_iter().map(|m| m.value).collect());

        let mut group_ctx = ctx.with_context_item(leading_value, idx + 1, group_count);
        group_ctx = group_ctx.with_variable("::current-merge-group", members);
        group_ctx = group_ctx.with_variable("::current-merge-key", Value::sequence(key_values));
        if let Some(name) = source_name {
            group_ctx = group_ctx.with_variable("::current-merge-source", name);
        }
        let signal = execute_body(body, &group_ctx, out)?;
        if !signal.is_normal() {
            return Ok(signal);
        }
    }
    Ok(Signal::Normal)
}

/// `xsl:on-empty`/`xsl:on-non-empty`: run `primary`, capturing its output;
/// if capturing it produced nothing (no nodes, no characters — an empty
/// sequence constructor in the data model's sense), run `fallback` instead of
/// (for `on-empty`) or as well as (for `on-non-empty`, where `fallback` never
/// runs and `primary`'s capture is replayed through) writing it to `out`.
pub fn execute_on_empty<'a, 'doc>(
    instr: &Instruction<'doc>,
    primary: &[Instruction<'doc>],
    fallback: &[Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let is_on_empty = matches!(instr, Instruction::OnEmpty { .. });
    let mut sink = crate::rtf::RtfSink::new();
    let signal = execute_body(primary, ctx, &mut sink)?;
    if !signal.is_normal() {
        return Ok(signal);
    }
    let fragment = sink.into_fragment("");
    let produced_anything = !fragment.events().is_empty();
    if produced_anything {
        fragment.replay_into(out)?;
        Ok(Signal::Normal)
    } else if is_on_empty {
        execute_body(fallback, ctx, out)
    } else {
        Ok(Signal::Normal)
    }
}
