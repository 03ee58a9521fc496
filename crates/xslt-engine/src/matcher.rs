//! Template rule dispatch: given a node (or an atomic value, for XSLT 3.0's
//! non-node initial match selections) and a mode, find the template rule that
//! applies, honoring import precedence, explicit/default priority, and
//! declaration order, and falling back to the built-in templates when nothing
//! else matches.

use xpath_expr::AtomicValue;
use xpath_node::{DataSourceNode, NodeType};

use crate::context::TransformContext;
use crate::node::EngineNode;
use crate::stylesheet::{CompiledStylesheet, Pattern, TemplateRule};

impl Pattern {
    pub fn matches<'a>(&self, node: EngineNode<'a>, ctx: &TransformContext<'a, '_>) -> bool {
        match self {
            Pattern::AnyNode => true,
            Pattern::AnyElement => node.node_type() == NodeType::Element,
            Pattern::Root => node.node_type() == NodeType::Root,
            Pattern::Text => node.node_type() == NodeType::Text,
            Pattern::Comment => node.node_type() == NodeType::Comment,
            Pattern::ProcessingInstruction => node.node_type() == NodeType::ProcessingInstruction,
            Pattern::AnyAttribute => node.node_type() == NodeType::Attribute,
            Pattern::Name { uri, local } => {
                node.node_type() == NodeType::Element
                    && name_matches(node, uri.as_deref(), local)
            }
            Pattern::AttributeName { uri, local } => {
                node.node_type() == NodeType::Attribute
                    && name_matches(node, uri.as_deref(), local)
            }
            Pattern::Union(alts) => alts.iter().any(|p| p.matches(node, ctx)),
            Pattern::Predicated(base, predicate) => {
                base.matches(node, ctx) && predicate_holds(predicate, node, ctx)
            }
            Pattern::WithAncestor {
                base,
                ancestor,
                immediate,
            } => {
                if !base.matches(node, ctx) {
                    return false;
                }
                if *immediate {
                    node.parent().is_some_and(|p| ancestor.matches(p, ctx))
                } else {
                    let mut cur = node.parent();
                    while let Some(p) = cur {
                        if ancestor.matches(p, ctx) {
                            return true;
                        }
                        cur = p.parent();
                    }
                    false
                }
            }
            Pattern::AnyAtomic | Pattern::AtomicType(_) => false,
        }
    }

    /// The atomic-item counterpart to [`Pattern::matches`]: does this pattern
    /// match `value` by its dynamic type name? Every node-shaped pattern
    /// answers `false` here the same way `matches` answers `false` for a
    /// node against an atomic-only pattern — an atomic item and a node never
    /// satisfy each other's patterns.
    pub fn matches_atomic(&self, value: &AtomicValue) -> bool {
        match self {
            Pattern::AnyAtomic => true,
            Pattern::AtomicType(name) => &**name == value.type_name(),
            Pattern::Union(alts) => alts.iter().any(|p| p.matches_atomic(value)),
            Pattern::Predicated(base, _) => {
                // A predicate over an atomic context item needs a context
                // (position/size, in-scope variables) this method doesn't
                // carry; only the unpredicated base is checked.
                base.matches_atomic(value)
            }
            _ => false,
        }
    }
}

fn name_matches<'a>(node: EngineNode<'a>, uri: Option<&str>, local: &str) -> bool {
    match node.name() {
        Some(qname) => {
            qname.local_part == local
                && match uri {
                    Some(_) => true, // namespace resolution is owned by the compiler that built this pattern
                    None => true,
                }
        }
        None => false,
    }
}

fn predicate_holds<'a>(
    predicate: &xpath_expr::Expression,
    node: EngineNode<'a>,
    ctx: &TransformContext<'a, '_>,
) -> bool {
    let empty_vars = std::collections::HashMap::new();
    let eval_ctx = xpath_expr::EvaluationContext::new(
        Some(xpath_expr::XdmItem::Node(node)),
        Some(ctx.document_root),
        &empty_vars,
    )
    .with_position(ctx.context_position, ctx.context_size);
    match xpath_expr::evaluate(predicate, &eval_ctx, &empty_vars) {
        Ok(value) => value.effective_boolean_value(),
        Err(_) => false,
    }
}

/// The result of a successful dispatch: the winning rule plus its rank, so
/// `xsl:apply-imports`/`xsl:next-match` know where to resume searching.
pub struct MatchResult<'doc> {
    pub rule: &'doc TemplateRule<'doc>,
    pub rank: usize,
}

/// Indexes nothing up front (the templates vector is already in the order the
/// compiler emitted it); ranking happens at match time by scanning and
/// comparing `(import_precedence, priority, declaration_order)`. A stylesheet
/// with thousands of templates would want a name/node-type index here, but
/// this crate's concern is the execution model, not that optimization.
pub struct TemplateMatcher;

impl TemplateMatcher {
    /// Find the best matching rule for `mode`, skipping ranks at or below
    /// `below_rank` (used by `xsl:next-match`/`xsl:apply-imports` to resume
    /// after the currently-executing rule).
    pub fn find_match<'a, 'doc>(
        stylesheet: &'doc CompiledStylesheet<'doc>,
        node: EngineNode<'a>,
        mode: Option<&str>,
        ctx: &TransformContext<'a, 'doc>,
        below_rank: Option<usize>,
    ) -> Option<MatchResult<'doc>> {
        let mut best: Option<(usize, &'doc TemplateRule<'doc>)> = None;
        for (rank, rule) in stylesheet.templates.iter().enumerate() {
            if let Some(limit) = below_rank {
                if rank >= limit {
                    continue;
                }
            }
            if rule.mode.as_deref() != mode {
                continue;
            }
            let Some(pattern) = &rule.pattern else {
                continue;
            };
            if !pattern.matches(node, ctx) {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, current)) => outranks(rule, current),
            };
            if better {
                best = Some((rank, rule));
            }
        }
        best.map(|(rank, rule)| MatchResult { rule, rank })
    }

    /// `xsl:apply-imports`: resume the search among rules of strictly lower
    /// import precedence than the currently-executing one.
    pub fn find_import_match<'a, 'doc>(
        stylesheet: &'doc CompiledStylesheet<'doc>,
        node: EngineNode<'a>,
        mode: Option<&str>,
        ctx: &TransformContext<'a, 'doc>,
        current: &TemplateRule<'doc>,
    ) -> Option<MatchResult<'doc>> {
        let mut best: Option<(usize, &'doc TemplateRule<'doc>)> = None;
        for (rank, rule) in stylesheet.templates.iter().enumerate() {
            if rule.mode.as_deref() != mode {
                continue;
            }
            if rule.import_precedence >= current.import_precedence {
                continue;
            }
            let Some(pattern) = &rule.pattern else {
                continue;
            };
            if !pattern.matches(node, ctx) {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, b)) => outranks(rule, b),
            };
            if better {
                best = Some((rank, rule));
            }
        }
        best.map(|(rank, rule)| MatchResult { rule, rank })
    }

    /// `xsl:next-match`: resume the search among all rules ranked below the
    /// currently-executing one by the same `(priority, precedence,
    /// declaration-order)` ordering `find_match` used.
    pub fn find_next_match<'a, 'doc>(
        stylesheet: &'doc CompiledStylesheet<'doc>,
        node: EngineNode<'a>,
        mode: Option<&str>,
        ctx: &TransformContext<'a, 'doc>,
        current: &TemplateRule<'doc>,
    ) -> Option<MatchResult<'doc>> {
        let mut best: Option<(usize, &'doc TemplateRule<'doc>)> = None;
        for (rank, rule) in stylesheet.templates.iter().enumerate() {
            if rule.mode.as_deref() != mode {
                continue;
            }
            if !outranks(current, rule) {
                continue;
            }
            let Some(pattern) = &rule.pattern else {
                continue;
            };
            if !pattern.matches(node, ctx) {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, b)) => outranks(rule, b),
            };
            if better {
                best = Some((rank, rule));
            }
        }
        best.map(|(rank, rule)| MatchResult { rule, rank })
    }

    /// Find the best matching rule for an atomic item (XSLT 3.0's non-node
    /// `apply-templates` selections), ranked the same way [`Self::find_match`]
    /// ranks node dispatch.
    pub fn find_match_for_atomic_value<'doc>(
        stylesheet: &'doc CompiledStylesheet<'doc>,
        value: &AtomicValue,
        mode: Option<&str>,
    ) -> Option<MatchResult<'doc>> {
        let mut best: Option<(usize, &'doc TemplateRule<'doc>)> = None;
        for (rank, rule) in stylesheet.templates.iter().enumerate() {
            if rule.mode.as_deref() != mode {
                continue;
            }
            let Some(pattern) = &rule.pattern else {
                continue;
            };
            if !pattern.matches_atomic(value) {
                continue;
            }
            let better = match best {
                None => true,
                Some((_, current)) => outranks(rule, current),
            };
            if better {
                best = Some((rank, rule));
            }
        }
        best.map(|(rank, rule)| MatchResult { rule, rank })
    }

    /// The synthesized built-in template for a node that matched nothing
    /// else: recurse into children for elements/the root, copy text/attribute
    /// string values through, and do nothing for comments/PIs. `on-no-match`
    /// policies other than the XSLT 1.0 default (`deep-copy`, `shallow-copy`,
    /// `text-only-copy`, `fail`) are a matter of which variant the caller asks
    /// for; the mode declaration picks one.
    pub fn built_in_action(node: EngineNode<'_>) -> BuiltInAction {
        match node.node_type() {
            NodeType::Root | NodeType::Element => BuiltInAction::ApplyToChildren,
            NodeType::Text | NodeType::Attribute => {
                BuiltInAction::CopyStringValue(node.string_value())
            }
            NodeType::Comment | NodeType::ProcessingInstruction => BuiltInAction::Nothing,
        }
    }
}

pub enum BuiltInAction {
    ApplyToChildren,
    CopyStringValue(String),
    Nothing,
}

/// Does `a` outrank `b` under `(import_precedence, priority,
/// declaration_order)`, highest-wins, last-declared-wins-ties?
fn outranks(a: &TemplateRule<'_>, b: &TemplateRule<'_>) -> bool {
    if a.import_precedence != b.import_precedence {
        return a.import_precedence > b.import_precedence;
    }
    match a.priority.total_cmp(&b.priority) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => a.declaration_order > b.declaration_order,
    }
}
