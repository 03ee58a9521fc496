//! `xsl:variable` bindings and `xsl:number`.

use std::collections::HashSet;

use xpath_node::DataSourceNode;

use super::{Instruction, NumberLevel};
use crate::context::TransformContext;
use crate::error::EngineError;
use crate::node::EngineNode;
use crate::output::OutputSink;
use crate::signals::Signal;
use crate::stylesheet::Pattern;
use crate::value::Value;

/// Compute the value an `xsl:variable`/`xsl:param` binds: `select` if given,
/// otherwise `body` captured as a result tree fragment, otherwise the empty
/// sequence. The binding itself — pushing this onto the variable scope for
/// the rest of the enclosing sequence constructor — is [`super::execute_body`]'s
/// job, since that's the scope a variable's declaration is visible to.
pub fn evaluate_variable_value<'a, 'doc>(
    select: Option<&xpath_expr::Expression>,
    body: &[crate::instruction::Instruction<'doc>],
    ctx: &TransformContext<'a, 'doc>,
) -> Result<Value<'a>, EngineError> {
    match select {
        Some(expr) => ctx.evaluate_expr(expr),
        None if body.is_empty() => Ok(Value::Empty),
        None => super::capture_value(body, ctx),
    }
}

/// `xsl:number`: format either an explicit `value` (each item of its
/// sequence becomes one numbered level) or, absent one, the context node's
/// position counted per `count`/`from`/`level`, through `format`'s numbering
/// picture, with `start-at`'s offset applied to the outermost level and
/// `grouping-separator`/`grouping-size` digit grouping applied to each level.
pub fn execute_number<'a, 'doc>(
    instr: &Instruction<'doc>,
    ctx: &TransformContext<'a, 'doc>,
    out: &mut dyn OutputSink,
) -> Result<Signal<'a>, EngineError> {
    let Instruction::Number {
        value,
        count,
        from,
        level,
        format,
        grouping_separator,
        grouping_size,
        start_at,
    } = instr
    else {
        unreachable!("execute_number called on a non-Number instruction");
    };

    let start_offset: i64 = match start_at {
        Some(expr) => ctx
            .evaluate_expr(expr)?
            .string_value()
            .trim()
            .parse()
            .unwrap_or(1),
        None => 1,
    };

    let mut counts: Vec<u64> = match value {
        Some(expr) => {
            let items = ctx.evaluate_expr(expr)?.into_items();
            let mut parsed = Vec::with_capacity(items.len());
            for item in items {
                let n: f64 = item.string_value().trim().parse().unwrap_or(f64::NAN);
                if n.is_nan() {
                    out.characters("NaN")?;
                    return Ok(Signal::Normal);
                }
                if n.is_infinite() {
                    out.characters(if n > 0.0 { "Infinity" } else { "-Infinity" })?;
                    return Ok(Signal::Normal);
                }
                if n < 0.0 {
                    return Err(EngineError::dynamic(
                        "XTDE0980",
                        format!("xsl:number: value {n} is negative"),
                    ));
                }
                parsed.push(n.trunc() as u64);
            }
            if parsed.is_empty() {
                parsed.push(1);
            }
            parsed
        }
        None => match &ctx.context_item {
            Some(Value::Node(node)) => count_by_level(*node, count.as_ref(), from.as_ref(), *level, ctx),
            _ => vec![0],
        },
    };

    if let Some(first) = counts.first_mut() {
        *first = (*first as i64 + start_offset - 1).max(0) as u64;
    }

    let picture = match format {
        Some(avt) => super::eval_avt(avt, ctx)?,
        None => "1".to_string(),
    };
    let (tokens, level_separator) = parse_picture(&picture);

    let grouping_sep = match grouping_separator {
        Some(avt) => super::eval_avt(avt, ctx)?,
        None => String::new(),
    };
    let grouping_width: usize = match grouping_size {
        Some(avt) => super::eval_avt(avt, ctx)?.trim().parse().unwrap_or(0),
        None => 0,
    };

    let formatted: Vec<String> = counts
        .iter()
        .enumerate()
        .map(|(idx, &n)| {
            let token = &tokens[idx % tokens.len()];
            let s = format_numbering(n as f64, token);
            if grouping_width > 0 && !grouping_sep.is_empty() {
                insert_grouping(&s, &grouping_sep, grouping_width)
            } else {
                s
            }
        })
        .collect();
    out.characters(&formatted.join(&level_separator))?;
    Ok(Signal::Normal)
}

/// Does `candidate` count toward `start`'s level under `count`, or — absent
/// an explicit `count` pattern — under the default "same node type and name
/// as the context node" rule `xsl:number` falls back to?
fn matches_count<'a>(
    candidate: EngineNode<'a>,
    start: EngineNode<'a>,
    count: Option<&Pattern>,
    ctx: &TransformContext<'a, '_>,
) -> bool {
    match count {
        Some(pattern) => pattern.matches(candidate, ctx),
        None => {
            candidate.node_type() == start.node_type()
                && candidate.name().map(|q| q.local_part) == start.name().map(|q| q.local_part)
        }
    }
}

/// The nearest strict ancestor of `start` matching `pattern`, or `None` if
/// none of `start`'s ancestors do.
fn nearest_ancestor_matching<'a>(
    start: EngineNode<'a>,
    pattern: &Pattern,
    ctx: &TransformContext<'a, '_>,
) -> Option<EngineNode<'a>> {
    let mut cur = start.parent();
    while let Some(node) = cur {
        if pattern.matches(node, ctx) {
            return Some(node);
        }
        cur = node.parent();
    }
    None
}

/// The level-counting scope boundary: the nearest ancestor matching `from`,
/// or the whole document when `from` is absent or doesn't match anything.
fn scope_root_for<'a>(
    start: EngineNode<'a>,
    from: Option<&Pattern>,
    ctx: &TransformContext<'a, '_>,
) -> EngineNode<'a> {
    match from {
        Some(pattern) => nearest_ancestor_matching(start, pattern, ctx).unwrap_or(ctx.document_root),
        None => ctx.document_root,
    }
}

/// How many of `anchor`'s preceding siblings also match `count` (or the
/// default rule) relative to `start` — one plus this is `anchor`'s `single`-
/// or `multiple`-level count at its own level.
fn count_preceding_siblings<'a>(
    anchor: EngineNode<'a>,
    start: EngineNode<'a>,
    count: Option<&Pattern>,
    ctx: &TransformContext<'a, '_>,
) -> u64 {
    let mut seen = HashSet::new();
    let mut siblings = Vec::new();
    xpath_node::collect_preceding_sibling_nodes(anchor, &mut seen, &mut siblings);
    siblings
        .iter()
        .filter(|n| matches_count(**n, start, count, ctx))
        .count() as u64
}

/// The nearest ancestor-or-self of `start` matching `count` (or the default
/// rule), not searching past `scope_root` (exclusive).
fn nearest_matching_ancestor_or_self<'a>(
    start: EngineNode<'a>,
    count: Option<&Pattern>,
    scope_root: EngineNode<'a>,
    ctx: &TransformContext<'a, '_>,
) -> Option<EngineNode<'a>> {
    let mut cur = Some(start);
    while let Some(node) = cur {
        if node == scope_root {
            return None;
        }
        if matches_count(node, start, count, ctx) {
            return Some(node);
        }
        cur = node.parent();
    }
    None
}

/// Count `start`'s position per `level`'s rule, each entry of the returned
/// vector being one numbered level (outermost first) — `single` and `any`
/// always return exactly one.
fn count_by_level<'a>(
    start: EngineNode<'a>,
    count: Option<&Pattern>,
    from: Option<&Pattern>,
    level: NumberLevel,
    ctx: &TransformContext<'a, '_>,
) -> Vec<u64> {
    let scope_root = scope_root_for(start, from, ctx);
    match level {
        NumberLevel::Any => {
            let mut seen = HashSet::new();
            let mut nodes = Vec::new();
            xpath_node::collect_descendant_or_self_nodes(scope_root, &mut seen, &mut nodes);
            let start_order = start.document_order();
            let n = nodes
                .iter()
                .filter(|node| **node != scope_root)
                .filter(|node| matches_count(**node, start, count, ctx))
                .filter(|node| node.document_order() <= start_order)
                .count() as u64;
            vec![n]
        }
        NumberLevel::Single => match nearest_matching_ancestor_or_self(start, count, scope_root, ctx) {
            Some(anchor) => vec![1 + count_preceding_siblings(anchor, start, count, ctx)],
            None => vec![0],
        },
        NumberLevel::Multiple => {
            let mut chain = Vec::new();
            let mut cur = Some(start);
            while let Some(node) = cur {
                if node == scope_root {
                    break;
                }
                if matches_count(node, start, count, ctx) {
                    chain.push(1 + count_preceding_siblings(node, start, count, ctx));
                }
                cur = node.parent();
            }
            if chain.is_empty() {
                vec![0]
            } else {
                chain.reverse();
                chain
            }
        }
    }
}

/// Split a numbering picture into its cyclable per-level format tokens
/// (`1`, `01`, `a`, `A`, `i`, `I`, ...) and the separator run between them
/// (the first non-alnum run found, `.` when the picture carries none) — a
/// simplified reading of the full `xsl:number` picture grammar, which also
/// allows per-level distinct separators.
fn parse_picture(picture: &str) -> (Vec<String>, String) {
    let mut tokens = Vec::new();
    let mut seps = Vec::new();
    let mut current = String::new();
    let mut in_token = true;
    for c in picture.chars() {
        let is_token_char = c.is_alphanumeric();
        if is_token_char != in_token && !current.is_empty() {
            if in_token {
                tokens.push(std::mem::take(&mut current));
            } else {
                seps.push(std::mem::take(&mut current));
            }
        }
        in_token = is_token_char;
        current.push(c);
    }
    if !current.is_empty() {
        if in_token {
            tokens.push(current);
        } else {
            seps.push(current);
        }
    }
    if tokens.is_empty() {
        tokens.push("1".to_string());
    }
    let separator = seps.first().cloned().unwrap_or_else(|| ".".to_string());
    (tokens, separator)
}

/// Insert `sep` every `size` digits counting from the right, e.g.
/// `insert_grouping("1234567", ",", 3) == "1,234,567"`.
fn insert_grouping(s: &str, sep: &str, size: usize) -> String {
    if size == 0 || s.len() <= size {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len();
    let mut out = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (len - i) % size == 0 {
            out.push_str(sep);
        }
        out.push(*c);
    }
    out
}

/// Render `n` through a numbering picture's first token (`1`, `01`, `a`, `A`,
/// `i`, `I`); alphabetic/roman formats decimal-fall-back for numbers outside
/// their natural range rather than erroring, since a stylesheet's numbering
/// format is advisory on overflow, not type-checked.
fn format_numbering(n: f64, picture: &str) -> String {
    let i = n.max(0.0) as u64;
    let token = picture.split(|c: char| !c.is_alphanumeric()).find(|s| !s.is_empty());
    match token {
        Some("01") => format!("{i:02}"),
        Some("001") => format!("{i:03}"),
        Some("a") => lower_alpha(i),
        Some("A") => lower_alpha(i).to_uppercase(),
        Some("i") => roman(i).to_lowercase(),
        Some("I") => roman(i),
        _ => i.to_string(),
    }
}

fn lower_alpha(mut n: u64) -> String {
    if n == 0 {
        return "a".to_string();
    }
    let mut digits = Vec::new();
    while n > 0 {
        let rem = (n - 1) % 26;
        digits.push((b'a' + rem as u8) as char);
        n = (n - 1) / 26;
    }
    digits.iter().rev().collect()
}

fn roman(mut n: u64) -> String {
    if n == 0 {
        return String::new();
    }
    const VALUES: &[(u64, &str)] = &[
        (1000, "M"), (900, "CM"), (500, "D"), (400, "CD"),
        (100, "C"), (90, "XC"), (50, "L"), (40, "XL"),
        (10, "X"), (9, "IX"), (5, "V"), (4, "IV"), (1, "I"),
    ];
    let mut out = String::new();
    for &(value, symbol) in VALUES {
        while n >= value {
            out.push_str(symbol);
            n -= value;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roman_numeral_formatting_matches_common_values() {
        assert_eq!(roman(1), "I");
        assert_eq!(roman(4), "IV");
        assert_eq!(roman(1994), "MCMXCIV");
    }

    #[test]
    fn alphabetic_formatting_wraps_like_spreadsheet_columns() {
        assert_eq!(lower_alpha(1), "a");
        assert_eq!(lower_alpha(26), "z");
        assert_eq!(lower_alpha(27), "aa");
    }
}
