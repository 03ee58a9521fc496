use super::{OutputEvent, OutputSink, SinkState, XmlEventWriter};
use crate::error::EngineError;

#[derive(Debug, Clone)]
struct PendingStart {
    uri: Option<String>,
    local: String,
    qname: String,
    attributes: Vec<(Option<String>, String, String, String)>,
    namespaces: Vec<(Option<String>, String)>,
}

/// Reference [`OutputSink`]: a pending-start-tag state machine over a namespace
/// scope stack, forwarding resolved events to an [`XmlEventWriter`].
///
/// An element open defers emission until the first event that cannot still be an
/// attribute or namespace declaration (a child element, text, comment, PI, or end
/// tag) — at which point the buffered start tag, with its namespaces deduplicated
/// against enclosing scopes, is flushed before the triggering event.
pub struct StateMachineSink<W> {
    writer: W,
    state: SinkState,
    pending: Option<PendingStart>,
    namespace_scopes: Vec<Vec<(Option<String>, String)>>,
    atomic_value_pending: bool,
    in_attribute_content: bool,
}

impl<W: XmlEventWriter> StateMachineSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            state: SinkState::Ready,
            pending: None,
            namespace_scopes: Vec::new(),
            atomic_value_pending: false,
            in_attribute_content: false,
        }
    }

    pub fn into_writer(self) -> W {
        self.writer
    }

    fn scoped_namespace(&self, prefix: Option<&str>) -> Option<&str> {
        self.namespace_scopes
            .iter()
            .rev()
            .find_map(|scope| {
                scope
                    .iter()
                    .find(|(p, _)| p.as_deref() == prefix)
                    .map(|(_, uri)| uri.as_str())
            })
    }

    /// Flush a pending start tag (and push its namespace scope), deduplicating
    /// namespace declarations already visible from an enclosing scope.
    fn flush_pending(&mut self) -> Result<(), EngineError> {
        let Some(pending) = self.pending.take() else {
            return Ok(());
        };
        let mut scope = Vec::new();
        self.writer.write(&OutputEvent::StartElement {
            uri: pending.uri.clone(),
            local: pending.local.clone(),
            qname: pending.qname.clone(),
        })?;
        for (prefix, uri) in &pending.namespaces {
            if self.scoped_namespace(prefix.as_deref()) == Some(uri.as_str()) {
                continue;
            }
            self.writer.write(&OutputEvent::Namespace {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })?;
            scope.push((prefix.clone(), uri.clone()));
        }
        for (uri, local, qname, value) in &pending.attributes {
            self.writer.write(&OutputEvent::Attribute {
                uri: uri.clone(),
                local: local.clone(),
                qname: qname.clone(),
                value: value.clone(),
            })?;
        }
        self.namespace_scopes.push(scope);
        self.state = SinkState::InContent;
        Ok(())
    }
}

impl<W: XmlEventWriter> OutputSink for StateMachineSink<W> {
    fn start_element(
        &mut self,
        uri: Option<&str>,
        local: &str,
        qname: &str,
    ) -> Result<(), EngineError> {
        if self.state == SinkState::Closed {
            return Err(EngineError::Output("sink is closed".into()));
        }
        self.flush_pending()?;
        self.pending = Some(PendingStart {
            uri: uri.map(str::to_string),
            local: local.to_string(),
            qname: qname.to_string(),
            attributes: Vec::new(),
            namespaces: Vec::new(),
        });
        self.atomic_value_pending = false;
        self.state = SinkState::PendingStart;
        Ok(())
    }

    fn end_element(
        &mut self,
        _uri: Option<&str>,
        _local: &str,
        qname: &str,
    ) -> Result<(), EngineError> {
        self.flush_pending()?;
        self.namespace_scopes.pop();
        self.writer.write(&OutputEvent::EndElement {
            uri: _uri.map(str::to_string),
            local: _local.to_string(),
            qname: qname.to_string(),
        })?;
        self.atomic_value_pending = false;
        self.state = if self.namespace_scopes.is_empty() {
            SinkState::InDocument
        } else {
            SinkState::InContent
        };
        Ok(())
    }

    fn attribute(
        &mut self,
        uri: Option<&str>,
        local: &str,
        qname: &str,
        value: &str,
    ) -> Result<(), EngineError> {
        match &mut self.pending {
            Some(pending) => {
                pending.attributes.push((
                    uri.map(str::to_string),
                    local.to_string(),
                    qname.to_string(),
                    value.to_string(),
                ));
                Ok(())
            }
            None => Err(EngineError::dynamic(
                "XTDE0410",
                "cannot add an attribute: no element is open for content",
            )),
        }
    }

    fn namespace(&mut self, prefix: Option<&str>, uri: &str) -> Result<(), EngineError> {
        match &mut self.pending {
            Some(pending) => {
                pending
                    .namespaces
                    .push((prefix.map(str::to_string), uri.to_string()));
                Ok(())
            }
            None => Err(EngineError::dynamic(
                "XTDE0410",
                "cannot add a namespace: no element is open for content",
            )),
        }
    }

    fn characters(&mut self, text: &str) -> Result<(), EngineError> {
        self.flush_pending()?;
        self.writer.write(&OutputEvent::Characters(text.to_string()))?;
        self.atomic_value_pending = false;
        Ok(())
    }

    fn characters_raw(&mut self, text: &str) -> Result<(), EngineError> {
        self.flush_pending()?;
        self.writer
            .write(&OutputEvent::CharactersRaw(text.to_string()))?;
        self.atomic_value_pending = false;
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), EngineError> {
        self.flush_pending()?;
        self.writer.write(&OutputEvent::Comment(text.to_string()))
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), EngineError> {
        self.flush_pending()?;
        self.writer.write(&OutputEvent::ProcessingInstruction {
            target: target.to_string(),
            data: data.to_string(),
        })
    }

    fn set_element_type(&mut self, uri: &str, local: &str) -> Result<(), EngineError> {
        self.writer.write(&OutputEvent::SetElementType {
            uri: uri.to_string(),
            local: local.to_string(),
        })
    }

    fn set_attribute_type(&mut self, uri: &str, local: &str) -> Result<(), EngineError> {
        self.writer.write(&OutputEvent::SetAttributeType {
            uri: uri.to_string(),
            local: local.to_string(),
        })
    }

    fn atomic_value(&mut self, string_value: &str) -> Result<(), EngineError> {
        if self.atomic_value_pending {
            if self.in_attribute_content {
                self.attribute_separator()?;
            } else {
                self.characters(" ")?;
            }
        }
        self.flush_pending()?;
        self.writer
            .write(&OutputEvent::AtomicValue(string_value.to_string()))?;
        self.atomic_value_pending = true;
        Ok(())
    }

    fn set_atomic_value_pending(&mut self, pending: bool) {
        self.atomic_value_pending = pending;
    }

    fn is_atomic_value_pending(&self) -> bool {
        self.atomic_value_pending
    }

    fn set_in_attribute_content(&mut self, in_attribute: bool) {
        self.in_attribute_content = in_attribute;
    }

    fn is_in_attribute_content(&self) -> bool {
        self.in_attribute_content
    }

    fn item_boundary(&mut self) -> Result<(), EngineError> {
        self.writer.write(&OutputEvent::ItemBoundary)
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        self.flush_pending()
    }
}

impl<W: XmlEventWriter> StateMachineSink<W> {
    fn attribute_separator(&mut self) -> Result<(), EngineError> {
        self.writer
            .write(&OutputEvent::AtomicValue(" ".to_string()))
    }
}
