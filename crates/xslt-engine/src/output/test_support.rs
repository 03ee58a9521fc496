//! A minimal [`XmlEventWriter`] used by this crate's own tests and available to
//! downstream callers that just want a quick string dump without wiring a real
//! serializer.

use super::{OutputEvent, XmlEventWriter};
use crate::error::EngineError;

#[derive(Debug, Default)]
pub struct StringWriter {
    buf: String,
    open_tags: Vec<String>,
    start_open: bool,
}

impl StringWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_string(self) -> String {
        self.buf
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    fn close_start_tag(&mut self) {
        if self.start_open {
            self.buf.push('>');
            self.start_open = false;
        }
    }
}

impl XmlEventWriter for StringWriter {
    fn write(&mut self, event: &OutputEvent) -> Result<(), EngineError> {
        match event {
            OutputEvent::StartElement { qname, .. } => {
                self.close_start_tag();
                self.buf.push('<');
                self.buf.push_str(qname);
                self.open_tags.push(qname.clone());
                self.start_open = true;
            }
            OutputEvent::Namespace { prefix, uri } => {
                self.buf.push(' ');
                match prefix {
                    Some(p) => self.buf.push_str(&format!("xmlns:{p}=\"{uri}\"")),
                    None => self.buf.push_str(&format!("xmlns=\"{uri}\"")),
                }
            }
            OutputEvent::Attribute { qname, value, .. } => {
                self.buf.push(' ');
                self.buf.push_str(qname);
                self.buf.push_str("=\"");
                self.buf.push_str(&escape_attr(value));
                self.buf.push('"');
            }
            OutputEvent::EndElement { qname, .. } => {
                if self.start_open && self.open_tags.last().map(String::as_str) == Some(qname.as_str())
                {
                    self.open_tags.pop();
                    self.buf.push_str("/>");
                    self.start_open = false;
                } else {
                    self.close_start_tag();
                    self.open_tags.pop();
                    self.buf.push_str("</");
                    self.buf.push_str(qname);
                    self.buf.push('>');
                }
            }
            OutputEvent::Characters(text) | OutputEvent::AtomicValue(text) => {
                self.close_start_tag();
                self.buf.push_str(&escape_text(text));
            }
            OutputEvent::CharactersRaw(text) => {
                self.close_start_tag();
                self.buf.push_str(text);
            }
            OutputEvent::Comment(text) => {
                self.close_start_tag();
                self.buf.push_str("<!--");
                self.buf.push_str(text);
                self.buf.push_str("-->");
            }
            OutputEvent::ProcessingInstruction { target, data } => {
                self.close_start_tag();
                self.buf.push_str("<?");
                self.buf.push_str(target);
                self.buf.push(' ');
                self.buf.push_str(data);
                self.buf.push_str("?>");
            }
            OutputEvent::SetElementType { .. }
            | OutputEvent::SetAttributeType { .. }
            | OutputEvent::ItemBoundary => {}
        }
        Ok(())
    }
}

fn escape_text(s: &str) -> String {
    s.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

fn escape_attr(s: &str) -> String {
    escape_text(s).replace('"', "&quot;")
}
