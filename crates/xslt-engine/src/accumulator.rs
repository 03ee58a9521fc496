//! `xsl:accumulator`: named, document-order-threaded running values updated
//! by pattern-matched rules as `apply-templates` descends into (`Start`
//! phase) and ascends out of (`End` phase) each element.
//!
//! The teacher's equivalent (`executor_handlers/accumulators.rs`) keeps a
//! `HashMap` on the executor and mutates it in place as it walks the tree.
//! This engine has no such place — context is persistent and every mutation
//! returns a new value — so [`AccumulatorManager`] is itself immutable:
//! [`AccumulatorManager::fire`] returns the manager *after* the matching
//! rules ran, and the caller re-threads it into the next context the same
//! way [`crate::context::TunnelParams`] gets re-threaded. `apply-templates`
//! re-threads it across sibling iterations at the level it controls; a rule
//! whose effect depends on state mutated several recursion levels down
//! inherits it from that nested call's own re-threading, not from mutating a
//! value shared across the whole traversal the way the teacher's executor
//! field does — a direct consequence of this crate not having a mutable
//! per-transform cell for it.

use std::collections::HashMap;
use std::rc::Rc;

use xpath_expr::Expression;

use crate::context::TransformContext;
use crate::error::EngineError;
use crate::node::EngineNode;
use crate::stylesheet::Pattern;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorPhase {
    /// Fires before descending into the node's children.
    Start,
    /// Fires after all of the node's children have been processed.
    End,
}

#[derive(Clone)]
pub struct AccumulatorRule {
    pub pattern: Pattern,
    pub phase: AccumulatorPhase,
    pub select: Rc<Expression>,
}

#[derive(Clone)]
pub struct AccumulatorDecl {
    pub name: Rc<str>,
    pub initial_value: Rc<Expression>,
    pub rules: Vec<AccumulatorRule>,
}

/// The running value of every declared accumulator at one point in the
/// traversal, plus each one's value as of just before the node currently
/// being visited (what `accumulator-before()` reads).
#[derive(Debug, Clone, Default)]
pub struct AccumulatorManager<'a> {
    current: HashMap<Rc<str>, Value<'a>>,
    before: HashMap<Rc<str>, Value<'a>>,
}

impl<'a> AccumulatorManager<'a> {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Evaluate every accumulator's `initial_value` against the document
    /// root, the state `apply-templates` starts a transform with.
    pub fn initialize<'doc>(
        decls: &[AccumulatorDecl],
        ctx: &TransformContext<'a, 'doc>,
    ) -> Result<Self, EngineError> {
        let mut current = HashMap::with_capacity(decls.len());
        for decl in decls {
            current.insert(decl.name.clone(), ctx.evaluate_expr(&decl.initial_value)?);
        }
        Ok(Self {
            before: current.clone(),
            current,
        })
    }

    pub fn value_after(&self, name: &str) -> Option<&Value<'a>> {
        self.current.get(name)
    }

    pub fn value_before(&self, name: &str) -> Option<&Value<'a>> {
        self.before.get(name)
    }

    /// Run every declared accumulator's first rule (in declaration order)
    /// whose pattern matches `node` and whose phase is `phase`, binding `$value`
    /// to that accumulator's current value while evaluating the rule's
    /// `select`. Accumulators with no matching rule for this phase are left
    /// unchanged.
    pub fn fire<'doc>(
        &self,
        decls: &[AccumulatorDecl],
        phase: AccumulatorPhase,
        node: EngineNode<'a>,
        ctx: &TransformContext<'a, 'doc>,
    ) -> Result<Self, EngineError> {
        let mut current = self.current.clone();
        let before = current.clone();
        for decl in decls {
            let Some(rule) = decl
                .rules
                .iter()
                .find(|r| r.phase == phase && r.pattern.matches(node, ctx))
            else {
                continue;
            };
            let existing = current.get(&decl.name).cloned().unwrap_or(Value::Empty);
            let value_ctx = ctx.with_variable("value", existing);
            let new_value = value_ctx.evaluate_expr(&rule.select)?;
            current.insert(decl.name.clone(), new_value);
        }
        Ok(Self { current, before })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_manager_has_no_accumulator_values() {
        let mgr = AccumulatorManager::empty();
        assert!(mgr.value_after("count").is_none());
        assert!(mgr.value_before("count").is_none());
    }
}
