//! The transform context: the persistent, cheaply-cloned bundle of state
//! threaded through every instruction's `execute` call.
//!
//! Variable scopes are a singly-linked chain of `Rc`-shared frames rather than
//! a single mutable map, so forking a context for a `for-each` iteration or an
//! `xsl:fork` branch is an `Rc::clone` plus pushing one frame, never a deep
//! copy — the same structural-sharing trick the stylesheet's import/template
//! chains already use.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::accumulator::AccumulatorManager;
use crate::node::EngineNode;
use crate::resolver::{DocumentResolver, ResultDocumentResolver};
use crate::stylesheet::{CompiledStylesheet, TemplateRule};
use crate::value::Value;

#[derive(Debug)]
struct ScopeFrame<'a> {
    variables: HashMap<String, Value<'a>>,
    parent: Option<Rc<ScopeFrame<'a>>>,
}

/// A chain of variable bindings, searched innermost-first. Cloning a
/// `VariableScope` is an `Rc::clone` of the head frame.
#[derive(Debug, Clone)]
pub struct VariableScope<'a> {
    head: Option<Rc<ScopeFrame<'a>>>,
}

impl<'a> VariableScope<'a> {
    pub fn empty() -> Self {
        Self { head: None }
    }

    /// A new scope with one more frame pushed in front of this one.
    pub fn child_with(&self, bindings: HashMap<String, Value<'a>>) -> Self {
        Self {
            head: Some(Rc::new(ScopeFrame {
                variables: bindings,
                parent: self.head.clone(),
            })),
        }
    }

    pub fn with_binding(&self, name: impl Into<String>, value: Value<'a>) -> Self {
        let mut bindings = HashMap::with_capacity(1);
        bindings.insert(name.into(), value);
        self.child_with(bindings)
    }

    pub fn lookup(&self, name: &str) -> Option<&Value<'a>> {
        let mut frame = self.head.as_deref();
        while let Some(f) = frame {
            if let Some(v) = f.variables.get(name) {
                return Some(v);
            }
            frame = f.parent.as_deref();
        }
        None
    }

    /// Flatten the whole chain into the map shape `ExprEval` wants, innermost
    /// binding winning on a name collision. Rebuilt per expression evaluation
    /// rather than kept flat at all times, trading a little redundant work for
    /// never having to un-shadow a binding when a frame pops.
    pub fn flatten_xdm<'v>(&'v self) -> HashMap<String, xpath_expr::XdmValue<EngineNode<'v>>>
    where
        'a: 'v,
    {
        let mut out = HashMap::new();
        let mut frame = self.head.as_deref();
        while let Some(f) = frame {
            for (name, value) in f.variables.iter() {
                out.entry(name.clone()).or_insert_with(|| value.to_xdm());
            }
            frame = f.parent.as_deref();
        }
        out
    }
}

/// Tunnel parameters propagate down the call stack of `apply-templates`/
/// `call-template` without every intermediate template re-declaring them.
/// Replaced wholesale (`Rc`-swap, not a merged overlay) at each
/// `with-param tunnel="yes"` site — a pragmatic compromise short of true
/// structural sharing, since the common case touches only a handful of
/// tunnel names at a time.
#[derive(Debug, Clone)]
pub struct TunnelParams<'a>(Rc<HashMap<String, Value<'a>>>);

impl<'a> TunnelParams<'a> {
    pub fn empty() -> Self {
        Self(Rc::new(HashMap::new()))
    }

    pub fn get(&self, name: &str) -> Option<&Value<'a>> {
        self.0.get(name)
    }

    /// Overlay `overrides` on top of the current tunnel map, producing a new
    /// one (the current map is left untouched — sibling branches of a fork
    /// keep seeing the pre-overlay set).
    pub fn overlay(&self, overrides: HashMap<String, Value<'a>>) -> Self {
        if overrides.is_empty() {
            return self.clone();
        }
        let mut merged = (*self.0).clone();
        merged.extend(overrides);
        Self(Rc::new(merged))
    }
}

/// Everything an instruction needs to know about *where* it's executing,
/// shared structurally across sibling iterations/branches so that forking it
/// (for `xsl:for-each`, `xsl:iterate`, `xsl:fork`) never copies the whole
/// stylesheet or scope chain.
#[derive(Clone)]
pub struct TransformContext<'a, 'doc> {
    pub stylesheet: &'doc CompiledStylesheet<'doc>,
    /// The document node the transform was invoked against; independent of
    /// whatever `context_item` is partway through a traversal, since an
    /// absolute path (`/foo`) always resolves from here.
    pub document_root: EngineNode<'a>,
    pub context_item: Option<Value<'a>>,
    pub context_position: usize,
    pub context_size: usize,
    pub variables: VariableScope<'a>,
    pub tunnel_params: TunnelParams<'a>,
    pub mode: Option<Rc<str>>,
    /// The template rule currently executing, so `xsl:apply-imports` and
    /// `xsl:next-match` know where in the import/priority ordering to resume.
    pub current_template: Option<&'doc TemplateRule<'doc>>,
    /// `xsl:param`/`xsl:with-param` default-value evaluation and `current()`
    /// both need the context item in force when the enclosing instruction
    /// started, distinct from whatever `context_item` is partway through a
    /// `for-each`.
    pub current_context_item: Option<Value<'a>>,
    /// The running value of every declared accumulator as of the most recent
    /// `apply-templates` dispatch; threaded the same way `tunnel_params` is.
    pub accumulators: Rc<AccumulatorManager<'a>>,
    pub document_resolver: Option<Rc<dyn DocumentResolver>>,
    pub result_document_resolver: Option<Rc<dyn ResultDocumentResolver>>,
    /// `xsl:evaluate`'s single-entry compiled-expression cache, keyed on the
    /// exact source string. Shared (not cloned) across every context forked
    /// from this one, so a loop re-evaluating the same dynamic XPath string
    /// only compiles it once.
    eval_cache: Rc<RefCell<Option<(String, Rc<xpath_expr::Expression>)>>>,
}

impl<'a, 'doc> TransformContext<'a, 'doc> {
    pub fn new(stylesheet: &'doc CompiledStylesheet<'doc>, root: EngineNode<'a>) -> Self {
        let item = Value::Node(root);
        Self {
            stylesheet,
            document_root: root,
            context_item: Some(item.clone()),
            context_position: 1,
            context_size: 1,
            variables: VariableScope::empty(),
            tunnel_params: TunnelParams::empty(),
            mode: None,
            current_template: None,
            current_context_item: Some(item),
            accumulators: Rc::new(AccumulatorManager::empty()),
            document_resolver: None,
            result_document_resolver: None,
            eval_cache: Rc::new(RefCell::new(None)),
        }
    }

    pub fn with_resolvers(
        &self,
        document_resolver: Option<Rc<dyn DocumentResolver>>,
        result_document_resolver: Option<Rc<dyn ResultDocumentResolver>>,
    ) -> Self {
        Self {
            document_resolver,
            result_document_resolver,
            ..self.clone()
        }
    }

    /// Compile `source` through `xsl:evaluate`'s cache, reusing the last
    /// compiled expression when `source` is an exact repeat.
    pub fn compile_dynamic_expr(&self, source: &str) -> Result<Rc<xpath_expr::Expression>, crate::error::EngineError> {
        let mut cache = self.eval_cache.borrow_mut();
        if let Some((cached_source, expr)) = cache.as_ref() {
            if cached_source == source {
                return Ok(expr.clone());
            }
        }
        let parsed = xpath_expr::parse_expression(source)
            .map_err(|e| crate::error::EngineError::dynamic("XPST0003", format!("xsl:evaluate: {e}")))?;
        let expr = Rc::new(parsed);
        *cache = Some((source.to_string(), expr.clone()));
        Ok(expr)
    }

    pub fn with_context_item(&self, item: Value<'a>, position: usize, size: usize) -> Self {
        Self {
            context_item: Some(item.clone()),
            context_position: position,
            context_size: size,
            current_context_item: Some(item),
            ..self.clone()
        }
    }

    pub fn with_variables(&self, variables: VariableScope<'a>) -> Self {
        Self {
            variables,
            ..self.clone()
        }
    }

    pub fn with_variable(&self, name: impl Into<String>, value: Value<'a>) -> Self {
        self.with_variables(self.variables.with_binding(name, value))
    }

    pub fn with_tunnel_params(&self, tunnel_params: TunnelParams<'a>) -> Self {
        Self {
            tunnel_params,
            ..self.clone()
        }
    }

    pub fn with_mode(&self, mode: Option<Rc<str>>) -> Self {
        Self {
            mode,
            ..self.clone()
        }
    }

    pub fn with_current_template(&self, rule: Option<&'doc TemplateRule<'doc>>) -> Self {
        Self {
            current_template: rule,
            ..self.clone()
        }
    }

    pub fn with_accumulators(&self, accumulators: Rc<AccumulatorManager<'a>>) -> Self {
        Self {
            accumulators,
            ..self.clone()
        }
    }

    pub fn lookup_variable(&self, name: &str) -> Option<&Value<'a>> {
        self.variables.lookup(name)
    }

    /// Evaluate an XPath expression (a `select`, a `test`, an attribute value
    /// template's braced part) against this context's context item, position,
    /// size, and in-scope variables, via the `ExprEval` capability.
    pub fn evaluate_expr<'v>(
        &'v self,
        expr: &xpath_expr::Expression,
    ) -> Result<Value<'v>, crate::error::EngineError>
    where
        'a: 'v,
    {
        let variables = self.variables.flatten_xdm();
        let context_item = self
            .context_item
            .as_ref()
            .map(Value::to_xdm)
            .and_then(|v| v.into_items().into_iter().next());
        let eval_ctx =
            xpath_expr::EvaluationContext::new(context_item, Some(self.document_root), &variables)
            .with_position(self.context_position, self.context_size);
        let result = xpath_expr::evaluate(expr, &eval_ctx, &variables)?;
        Ok(Value::from_xdm(result))
    }
}
