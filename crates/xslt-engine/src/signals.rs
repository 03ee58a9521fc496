//! Non-local control flow inside `xsl:iterate`: `xsl:break` and
//! `xsl:next-iteration` unwind the current iteration's instruction sequence
//! without an exception, the same way the rest of this engine threads state
//! through return values rather than panics.

use std::collections::HashMap;

use crate::value::Value;

/// What an instruction sequence did, beyond "ran to completion": a signal
/// that must propagate up through every enclosing `Sequence`/`If`/`Choose`
/// until it reaches the `xsl:iterate` that can act on it.
pub enum Signal<'a> {
    /// Ran to completion; the caller should keep executing its own next step.
    Normal,
    /// `xsl:break`, carrying the `select` value to bind as the iteration's
    /// result (consumed by `xsl:iterate`'s `on-completion` if present).
    Break(Option<Value<'a>>),
    /// `xsl:next-iteration`, carrying the next round's parameter rebindings.
    NextIteration(HashMap<String, Value<'a>>),
}

impl<'a> Signal<'a> {
    pub fn is_normal(&self) -> bool {
        matches!(self, Signal::Normal)
    }
}

/// Run a sequence of fallible steps, short-circuiting on the first error or
/// the first non-`Normal` signal — the shared backbone of every instruction
/// that executes a child sequence constructor (`xsl:if`, `xsl:for-each`
/// bodies, `xsl:sequence` blocks, template bodies themselves).
pub fn run_sequence<'a, T>(
    items: &[T],
    mut step: impl FnMut(&T) -> Result<Signal<'a>, crate::error::EngineError>,
) -> Result<Signal<'a>, crate::error::EngineError> {
    for item in items {
        let signal = step(item)?;
        if !signal.is_normal() {
            return Ok(signal);
        }
    }
    Ok(Signal::Normal)
}
