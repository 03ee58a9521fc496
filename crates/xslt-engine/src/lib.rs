//! Streaming XSLT 2.0/3.0 transformation engine: a compiled stylesheet
//! execution model over an instruction tree, not a parser/compiler.
//!
//! Turning `xsl:`-namespaced source text into a [`stylesheet::CompiledStylesheet`]
//! is somebody else's job (a separate compiler crate, or a test harness using
//! [`stylesheet::StylesheetBuilder`] directly); this crate only runs the
//! result against a source document and an [`output::OutputSink`].

pub mod accumulator;
pub mod context;
pub mod error;
pub mod fork;
pub mod instruction;
pub mod matcher;
pub mod node;
pub mod output;
pub mod resolver;
pub mod rtf;
pub mod schema;
pub mod sequence_builder;
pub mod signals;
pub mod sort_group;
pub mod stylesheet;
pub mod value;

pub use context::TransformContext;
pub use error::EngineError;
pub use node::{EngineNode, XmlDocument, XmlNode};
pub use output::{OutputEvent, OutputSink, XmlEventWriter};
pub use resolver::{DocumentResolver, ResultDocumentResolver};
pub use schema::{SchemaValidator, TypeAnnotation, UntypedValidator};
pub use signals::Signal;
pub use stylesheet::{CompiledStylesheet, StylesheetBuilder};
pub use value::Value;

use std::collections::HashMap;
use std::rc::Rc;

use accumulator::AccumulatorManager;
use instruction::{apply_one, execute_body};

/// Knobs that don't belong on [`stylesheet::CompiledStylesheet`] itself
/// because they're invocation-time, not stylesheet-time: which validator
/// backs the schema gateway, and which mode to enter with when the caller
/// doesn't want the stylesheet's own default.
pub struct RunConfig {
    pub initial_mode: Option<Rc<str>>,
    pub validator: Rc<dyn SchemaValidator>,
    /// Backs `fn:document()`/`xsl:source-document`; `None` turns either into
    /// an `FODC0002` dynamic error rather than silently returning nothing.
    pub document_resolver: Option<Rc<dyn DocumentResolver>>,
    /// Backs `xsl:result-document`; `None` turns it into an `FODC0002`
    /// dynamic error the same way an unconfigured `document_resolver` does.
    pub result_document_resolver: Option<Rc<dyn ResultDocumentResolver>>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            initial_mode: None,
            validator: Rc::new(UntypedValidator),
            document_resolver: None,
            result_document_resolver: None,
        }
    }
}

/// A compiled stylesheet bound to the configuration it runs with. Cheap to
/// construct and clone (everything it owns is an `Rc`/borrow); the entry
/// point for both a full-document transform and a `call-template` re-entry
/// from a host application.
pub struct Transform<'doc> {
    stylesheet: &'doc CompiledStylesheet<'doc>,
    config: RunConfig,
}

impl<'doc> Transform<'doc> {
    pub fn new(stylesheet: &'doc CompiledStylesheet<'doc>, config: RunConfig) -> Self {
        Self { stylesheet, config }
    }

    /// Run the stylesheet against `source`, writing the result sequence to
    /// `sink`. The initial selection is the document node itself, matched
    /// against `config.initial_mode` (or the stylesheet's own default) the
    /// same way every later `apply-templates` dispatch matches a node —
    /// falling through to the built-in templates if nothing matches, so a
    /// stylesheet with no `match="/"` rule still walks the whole document.
    pub fn run<'a>(&self, source: EngineNode<'a>, sink: &mut dyn OutputSink) -> Result<(), EngineError>
    where
        'doc: 'a,
    {
        let mode = self
            .config
            .initial_mode
            .clone()
            .or_else(|| self.stylesheet.default_mode.clone());
        let ctx = TransformContext::new(self.stylesheet, source).with_mode(mode);
        let accumulators = AccumulatorManager::initialize(&self.stylesheet.accumulators, &ctx)?;
        let ctx = ctx
            .with_accumulators(Rc::new(accumulators))
            .with_resolvers(
                self.config.document_resolver.clone(),
                self.config.result_document_resolver.clone(),
            )
            .with_context_item(Value::Node(source), 1, 1);

        let signal = apply_one(&Value::Node(source), ctx.mode.as_deref(), HashMap::new(), &ctx, sink)?;
        if !signal.is_normal() {
            return Err(EngineError::SignalEscaped(
                "xsl:break/xsl:next-iteration used outside of xsl:iterate",
            ));
        }
        sink.flush()
    }

    /// Invoke a named template directly against `source`, the entry point an
    /// `xsl:initial-template` declaration or a host-application re-entry (a
    /// second pass over a document it already holds) uses instead of an
    /// `apply-templates` pass.
    pub fn call_named_template<'a>(
        &self,
        name: &str,
        source: EngineNode<'a>,
        params: HashMap<String, Value<'a>>,
        sink: &mut dyn OutputSink,
    ) -> Result<(), EngineError>
    where
        'doc: 'a,
    {
        let rule = self
            .stylesheet
            .template_by_name(name)
            .ok_or_else(|| EngineError::UnknownNamedTemplate(name.to_string()))?;
        let ctx = TransformContext::new(self.stylesheet, source);
        let accumulators = AccumulatorManager::initialize(&self.stylesheet.accumulators, &ctx)?;
        let ctx = ctx
            .with_accumulators(Rc::new(accumulators))
            .with_resolvers(
                self.config.document_resolver.clone(),
                self.config.result_document_resolver.clone(),
            )
            .with_variables(ctx.variables.child_with(params))
            .with_current_template(Some(rule));

        let signal = execute_body(&rule.body, &ctx, sink)?;
        if !signal.is_normal() {
            return Err(EngineError::SignalEscaped(
                "xsl:break/xsl:next-iteration used outside of xsl:iterate",
            ));
        }
        sink.flush()
    }
}
