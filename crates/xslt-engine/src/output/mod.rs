//! The output pipeline: an ordered XML event sink with pending-start-tag state,
//! atomic-value separator tracking, and namespace-declaration deduplication.
//!
//! See `spec.md` §4.1. Concrete serialization is an external collaborator reached
//! through [`XmlEventWriter`]; [`StateMachineSink`] owns the pipeline's own state
//! (pending start tag, namespace scope stack, atomic-value-pending flag) and
//! forwards resolved events to the writer.

mod state_machine;
pub mod test_support;

pub use state_machine::StateMachineSink;

use crate::error::EngineError;

/// A single resolved XML event, as delivered to an [`XmlEventWriter`] or captured
/// into a [`crate::rtf::ResultTreeFragment`]. Fully owned — a result tree fragment
/// is a document snapshot independent of the source tree's lifetime.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputEvent {
    StartElement {
        uri: Option<String>,
        local: String,
        qname: String,
    },
    EndElement {
        uri: Option<String>,
        local: String,
        qname: String,
    },
    Attribute {
        uri: Option<String>,
        local: String,
        qname: String,
        value: String,
    },
    Namespace {
        prefix: Option<String>,
        uri: String,
    },
    Characters(String),
    CharactersRaw(String),
    Comment(String),
    ProcessingInstruction {
        target: String,
        data: String,
    },
    SetElementType {
        uri: String,
        local: String,
    },
    SetAttributeType {
        uri: String,
        local: String,
    },
    /// A pre-stringified atomic item, already separator-adjusted by the sink that
    /// captured it.
    AtomicValue(String),
    ItemBoundary,
}

/// The contract every instruction executes against. Implementations may be a
/// serializing sink ([`StateMachineSink`]), a value-capturing
/// [`crate::sequence_builder::SequenceBuilder`], or a buffering
/// [`crate::rtf::RtfSink`].
///
/// Each operation may fail; once it does, callers must not continue issuing
/// events to the same sink (the sink is considered poisoned).
pub trait OutputSink {
    fn start_element(&mut self, uri: Option<&str>, local: &str, qname: &str)
    -> Result<(), EngineError>;
    fn end_element(&mut self, uri: Option<&str>, local: &str, qname: &str)
    -> Result<(), EngineError>;
    fn attribute(
        &mut self,
        uri: Option<&str>,
        local: &str,
        qname: &str,
        value: &str,
    ) -> Result<(), EngineError>;
    fn namespace(&mut self, prefix: Option<&str>, uri: &str) -> Result<(), EngineError>;
    fn characters(&mut self, text: &str) -> Result<(), EngineError>;
    fn characters_raw(&mut self, text: &str) -> Result<(), EngineError>;
    fn comment(&mut self, text: &str) -> Result<(), EngineError>;
    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), EngineError>;
    fn set_element_type(&mut self, uri: &str, local: &str) -> Result<(), EngineError>;
    fn set_attribute_type(&mut self, uri: &str, local: &str) -> Result<(), EngineError>;
    fn atomic_value(&mut self, string_value: &str) -> Result<(), EngineError>;
    fn set_atomic_value_pending(&mut self, pending: bool);
    fn is_atomic_value_pending(&self) -> bool;
    fn set_in_attribute_content(&mut self, in_attribute: bool);
    fn is_in_attribute_content(&self) -> bool;
    fn item_boundary(&mut self) -> Result<(), EngineError>;
    fn flush(&mut self) -> Result<(), EngineError>;
}

/// The external serializer seam: turns resolved [`OutputEvent`]s into bytes/text.
/// A production engine wires a real serializer here; [`test_support::StringWriter`]
/// is the reference implementation used by this crate's own tests.
pub trait XmlEventWriter {
    fn write(&mut self, event: &OutputEvent) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SinkState {
    Ready,
    InDocument,
    PendingStart,
    InContent,
    Closed,
}
