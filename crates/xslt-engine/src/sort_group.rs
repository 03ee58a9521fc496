//! Sorting and grouping: the collation registry `xsl:sort` consults, and the
//! four `xsl:for-each-group` grouping strategies.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::context::TransformContext;
use crate::error::EngineError;
use crate::instruction::{GroupingSpec, SortKey, SortOrder};
use crate::value::Value;

/// A string ordering and optional case-insensitive equality, the two things
/// `xsl:sort`/`fn:compare`/grouping-by-value need from a collation.
pub trait Collation {
    fn compare(&self, a: &str, b: &str) -> Ordering;
}

pub struct CodepointCollation;
impl Collation for CodepointCollation {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.cmp(b)
    }
}

pub struct CaseInsensitiveAsciiCollation;
impl Collation for CaseInsensitiveAsciiCollation {
    fn compare(&self, a: &str, b: &str) -> Ordering {
        a.to_ascii_lowercase().cmp(&b.to_ascii_lowercase())
    }
}

/// Resolves a collation URI to an implementation. Unknown URIs fall back to
/// codepoint collation rather than erroring, since this crate doesn't own
/// collation-URI resolution policy (that's a host/configuration concern).
pub struct CollationRegistry {
    by_uri: HashMap<String, Box<dyn Collation>>,
}

impl Default for CollationRegistry {
    fn default() -> Self {
        let mut by_uri: HashMap<String, Box<dyn Collation>> = HashMap::new();
        by_uri.insert(
            "http://www.w3.org/2005/xpath-functions/collation/codepoint".to_string(),
            Box::new(CodepointCollation),
        );
        Self { by_uri }
    }
}

impl CollationRegistry {
    pub fn register(&mut self, uri: impl Into<String>, collation: Box<dyn Collation>) {
        self.by_uri.insert(uri.into(), collation);
    }

    pub fn resolve(&self, uri: Option<&str>) -> &dyn Collation {
        match uri.and_then(|u| self.by_uri.get(u)) {
            Some(c) => c.as_ref(),
            None => &CodepointCollation,
        }
    }
}

/// Evaluate one item's composite sort/merge key, each key's `select`
/// evaluated with `item` as the context item at `position` of `size`. Shared
/// by [`sort_items`] and `xsl:merge`, which needs the same per-item key
/// extraction before interleaving several already-sorted sources.
pub(crate) fn evaluate_keys<'a, 'doc>(
    item: &Value<'a>,
    position: usize,
    size: usize,
    sort_keys: &[SortKey],
    base_ctx: &TransformContext<'a, 'doc>,
) -> Result<Vec<String>, EngineError> {
    let item_ctx = base_ctx.with_context_item(item.clone(), position, size);
    sort_keys
        .iter()
        .map(|key| item_ctx.evaluate_expr(&key.select).map(|v| v.string_value()))
        .collect()
}

/// Compare two items' already-evaluated composite keys against `sort_keys`'s
/// data types, collations, and orders, first key deciding unless it ties.
pub(crate) fn compare_keys(
    a_keys: &[String],
    b_keys: &[String],
    sort_keys: &[SortKey],
    registry: &CollationRegistry,
) -> Ordering {
    for (idx, key_spec) in sort_keys.iter().enumerate() {
        let collation = registry.resolve(key_spec.collation.as_deref());
        let mut ord = match key_spec.data_type {
            crate::instruction::SortDataType::Text => collation.compare(&a_keys[idx], &b_keys[idx]),
            crate::instruction::SortDataType::Number => {
                let a_num: f64 = a_keys[idx].parse().unwrap_or(f64::NAN);
                let b_num: f64 = b_keys[idx].parse().unwrap_or(f64::NAN);
                a_num.partial_cmp(&b_num).unwrap_or(Ordering::Equal)
            }
        };
        if key_spec.order == SortOrder::Descending {
            ord = ord.reverse();
        }
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Stably sort `items` by their `sort_keys`, each key evaluated once per item
/// in the context where `item` is the context item at `position` of `size`.
pub fn sort_items<'a, 'doc>(
    items: Vec<Value<'a>>,
    sort_keys: &[SortKey],
    base_ctx: &TransformContext<'a, 'doc>,
    registry: &CollationRegistry,
) -> Result<Vec<Value<'a>>, EngineError> {
    if sort_keys.is_empty() {
        return Ok(items);
    }
    let size = items.len();
    let mut keyed = Vec::with_capacity(size);
    for (idx, item) in items.into_iter().enumerate() {
        let keys = evaluate_keys(&item, idx + 1, size, sort_keys, base_ctx)?;
        keyed.push((keys, item));
    }
    keyed.sort_by(|(a_keys, _), (b_keys, _)| compare_keys(a_keys, b_keys, sort_keys, registry));
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

/// One output group from `xsl:for-each-group`: its current-grouping-key
/// (absent for `group-starting-with`/`group-ending-with`) and its members,
/// in document/selection order.
pub struct Group<'a> {
    pub key: Option<Value<'a>>,
    pub members: Vec<Value<'a>>,
}

/// Partition `items` per one of the four grouping strategies. `items` is
/// assumed already in selection order; `key_of` evaluates a grouping-by/
/// grouping-adjacent `select`, and `matches` tests a starting-with/
/// ending-with pattern against the original node each item came from.
pub fn group_items<'a, 'doc>(
    items: Vec<Value<'a>>,
    spec: &GroupingSpec,
    base_ctx: &TransformContext<'a, 'doc>,
) -> Result<Vec<Group<'a>>, EngineError> {
    let size = items.len();
    match spec {
        GroupingSpec::By(select) => {
            let mut order: Vec<String> = Vec::new();
            let mut groups: HashMap<String, Group<'a>> = HashMap::new();
            for (idx, item) in items.into_iter().enumerate() {
                let item_ctx = base_ctx.with_context_item(item.clone(), idx + 1, size);
                let key = item_ctx.evaluate_expr(select)?;
                let key_str = key.string_value();
                groups
                    .entry(key_str.clone())
                    .or_insert_with(|| {
                        order.push(key_str.clone());
                        Group {
                            key: Some(key.clone()),
                            members: Vec::new(),
                        }
                    })
                    .members
                    .push(item);
            }
            Ok(order
                .into_iter()
                .filter_map(|k| groups.remove(&k))
                .collect())
        }
        GroupingSpec::Adjacent(select) => {
            let mut result: Vec<Group<'a>> = Vec::new();
            let mut last_key: Option<String> = None;
            for (idx, item) in items.into_iter().enumerate() {
                let item_ctx = base_ctx.with_context_item(item.clone(), idx + 1, size);
                let key = item_ctx.evaluate_expr(select)?;
                let key_str = key.string_value();
                if last_key.as_deref() == Some(key_str.as_str()) {
                    result.last_mut().unwrap().members.push(item);
                } else {
                    result.push(Group {
                        key: Some(key.clone()),
                        members: vec![item],
                    });
                    last_key = Some(key_str);
                }
            }
            Ok(result)
        }
        GroupingSpec::StartingWith(pattern) => {
            let mut result: Vec<Group<'a>> = Vec::new();
            for item in items {
                let starts = matches_pattern(&item, pattern, base_ctx);
                if starts || result.is_empty() {
                    result.push(Group {
                        key: None,
                        members: vec![item],
                    });
                } else {
                    result.last_mut().unwrap().members.push(item);
                }
            }
            Ok(result)
        }
        GroupingSpec::EndingWith(pattern) => {
            let mut result: Vec<Group<'a>> = Vec::new();
            let mut current: Vec<Value<'a>> = Vec::new();
            for item in items {
                let ends = matches_pattern(&item, pattern, base_ctx);
                current.push(item);
                if ends {
                    result.push(Group {
                        key: None,
                        members: std::mem::take(&mut current),
                    });
                }
            }
            if !current.is_empty() {
                result.push(Group {
                    key: None,
                    members: current,
                });
            }
            Ok(result)
        }
    }
}

fn matches_pattern<'a>(
    item: &Value<'a>,
    pattern: &crate::stylesheet::Pattern,
    ctx: &TransformContext<'a, '_>,
) -> bool {
    matches!(item, Value::Node(n) if pattern.matches(*n, ctx))
}
