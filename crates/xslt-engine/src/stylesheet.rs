//! The compiled stylesheet: the tree of instructions this crate executes.
//!
//! Turning `xsl:`-namespaced source XML into this structure is the job of a
//! separate compiler (an external collaborator, same as `ExprEval`); this
//! crate only consumes the result. [`StylesheetBuilder`] is the construction
//! seam such a compiler — or a test — uses to hand one over.

use std::collections::HashMap;
use std::rc::Rc;

use xpath_expr::Expression;

use crate::accumulator::AccumulatorDecl;
use crate::instruction::Instruction;

/// A compiled match pattern (the left-hand side of a `match` attribute).
/// Deliberately small: full pattern-to-path-expression compilation lives with
/// the stylesheet compiler; what the template matcher needs at dispatch time
/// is just "does this node qualify", which these cases answer directly.
#[derive(Debug, Clone)]
pub enum Pattern {
    /// `*`
    AnyElement,
    /// `node()`
    AnyNode,
    /// `/`
    Root,
    /// `text()`
    Text,
    /// `comment()`
    Comment,
    /// `processing-instruction()`
    ProcessingInstruction,
    /// `@*`
    AnyAttribute,
    /// `ns:local` or `local`
    Name { uri: Option<Rc<str>>, local: Rc<str> },
    /// `@ns:local`
    AttributeName { uri: Option<Rc<str>>, local: Rc<str> },
    /// `p1 | p2 | ...`
    Union(Vec<Pattern>),
    /// `pattern[predicate]`, the predicate re-using the `ExprEval` expression
    /// grammar.
    Predicated(Box<Pattern>, Rc<Expression>),
    /// `a/b` or `a//b`: a step pattern qualified by a parent-axis predicate on
    /// the node matched by `base`.
    WithAncestor { base: Box<Pattern>, ancestor: Box<Pattern>, immediate: bool },
    /// `.` matched against an atomic item rather than a node: any atomic
    /// value, used for XSLT 3.0's non-node initial/`apply-templates`
    /// selections.
    AnyAtomic,
    /// An item-type pattern for an atomic value, e.g. `xs:integer`, compared
    /// against [`xpath_expr::AtomicValue::type_name`].
    AtomicType(Rc<str>),
}

/// How many nodes a pattern can structurally match, used to order rules of
/// equal priority by specificity when the stylesheet doesn't say otherwise.
impl Pattern {
    pub fn default_priority(&self) -> f64 {
        match self {
            Pattern::AnyNode | Pattern::AnyElement | Pattern::AnyAttribute => -0.5,
            Pattern::Text | Pattern::Comment | Pattern::ProcessingInstruction | Pattern::Root => {
                -0.5
            }
            Pattern::Name { .. } | Pattern::AttributeName { .. } => 0.0,
            Pattern::Union(alts) => alts
                .iter()
                .map(Pattern::default_priority)
                .fold(f64::MIN, f64::max),
            Pattern::Predicated(base, _) => base.default_priority() + 0.25,
            Pattern::WithAncestor { base, .. } => base.default_priority(),
            Pattern::AnyAtomic => -0.5,
            Pattern::AtomicType(_) => 0.0,
        }
    }
}

/// Where a streaming analysis has classified an instruction or template:
/// whether it can run in guaranteed-streaming mode, a best-effort "grounded"
/// mode that buffers when it must, or cannot stream at all. Deep streamability
/// analysis (the full W3C posture/sweep classification) is not reimplemented
/// here; this tag is assigned once at construction time and instructions
/// consult it only to pick a buffering strategy, never to reject a stylesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StreamCapability {
    Full,
    Grounded,
    #[default]
    None,
}

/// One `xsl:template` rule.
pub struct TemplateRule<'doc> {
    pub name: Option<Rc<str>>,
    pub pattern: Option<Pattern>,
    pub mode: Option<Rc<str>>,
    pub priority: f64,
    /// Declaration order within the stylesheet, used as the final tiebreaker.
    pub declaration_order: usize,
    /// Import precedence: higher imports later / the including stylesheet
    /// itself. Templates are ranked by `(import_precedence, priority,
    /// declaration_order)`.
    pub import_precedence: usize,
    pub params: Vec<ParamDecl>,
    pub body: Vec<Instruction<'doc>>,
    pub stream_capability: StreamCapability,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: Rc<str>,
    pub required: bool,
    pub tunnel: bool,
    pub default: Option<Rc<Expression>>,
}

/// A named sequence constructor (`xsl:function`, `xsl:attribute-set`, or a
/// named template's body re-used by both `call-template` and pattern
/// dispatch).
pub struct NamedSequence<'doc> {
    pub name: Rc<str>,
    pub body: Vec<Instruction<'doc>>,
}

/// A key declared with `xsl:key`: a name plus the match pattern and use
/// expression the `key()` function consults.
pub struct KeyDecl {
    pub name: Rc<str>,
    pub match_pattern: Pattern,
    pub use_expr: Rc<Expression>,
}

/// The compiled stylesheet: every template rule, named template, key, and
/// attribute set the instructions reference by name.
pub struct CompiledStylesheet<'doc> {
    pub templates: Vec<TemplateRule<'doc>>,
    pub named_templates: HashMap<Rc<str>, usize>,
    pub functions: HashMap<Rc<str>, NamedSequence<'doc>>,
    pub attribute_sets: HashMap<Rc<str>, NamedSequence<'doc>>,
    pub keys: Vec<KeyDecl>,
    pub accumulators: Vec<AccumulatorDecl>,
    pub output_encoding: Rc<str>,
    pub default_mode: Option<Rc<str>>,
}

impl<'doc> CompiledStylesheet<'doc> {
    pub fn template_by_name(&self, name: &str) -> Option<&TemplateRule<'doc>> {
        self.named_templates.get(name).map(|&idx| &self.templates[idx])
    }

    pub fn key_by_name(&self, name: &str) -> Option<&KeyDecl> {
        self.keys.iter().find(|k| &*k.name == name)
    }
}

/// Fluent construction of a [`CompiledStylesheet`], the seam a stylesheet
/// compiler (or a test) hands a finished tree through. Mirrors the layered
/// "builder assembles, then freezes into an immutable runtime structure"
/// shape used elsewhere for compiled artifacts in this codebase.
#[derive(Default)]
pub struct StylesheetBuilder<'doc> {
    templates: Vec<TemplateRule<'doc>>,
    functions: HashMap<Rc<str>, NamedSequence<'doc>>,
    attribute_sets: HashMap<Rc<str>, NamedSequence<'doc>>,
    keys: Vec<KeyDecl>,
    accumulators: Vec<AccumulatorDecl>,
    output_encoding: Option<Rc<str>>,
    default_mode: Option<Rc<str>>,
}

impl<'doc> StylesheetBuilder<'doc> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_template(mut self, template: TemplateRule<'doc>) -> Self {
        self.templates.push(template);
        self
    }

    pub fn add_function(mut self, func: NamedSequence<'doc>) -> Self {
        self.functions.insert(func.name.clone(), func);
        self
    }

    pub fn add_attribute_set(mut self, set: NamedSequence<'doc>) -> Self {
        self.attribute_sets.insert(set.name.clone(), set);
        self
    }

    pub fn add_key(mut self, key: KeyDecl) -> Self {
        self.keys.push(key);
        self
    }

    pub fn add_accumulator(mut self, accumulator: AccumulatorDecl) -> Self {
        self.accumulators.push(accumulator);
        self
    }

    pub fn output_encoding(mut self, encoding: impl Into<Rc<str>>) -> Self {
        self.output_encoding = Some(encoding.into());
        self
    }

    pub fn default_mode(mut self, mode: impl Into<Rc<str>>) -> Self {
        self.default_mode = Some(mode.into());
        self
    }

    pub fn build(self) -> CompiledStylesheet<'doc> {
        let mut named_templates = HashMap::new();
        for (idx, t) in self.templates.iter().enumerate() {
            if let Some(name) = &t.name {
                named_templates.insert(name.clone(), idx);
            }
        }
        CompiledStylesheet {
            templates: self.templates,
            named_templates,
            functions: self.functions,
            attribute_sets: self.attribute_sets,
            keys: self.keys,
            accumulators: self.accumulators,
            output_encoding: self.output_encoding.unwrap_or_else(|| Rc::from("UTF-8")),
            default_mode: self.default_mode,
        }
    }
}
