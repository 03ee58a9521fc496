//! The sequence-builder output sink: captures emitted events not as one
//! buffered document (that's [`crate::rtf::RtfSink`]'s job) but as a flat
//! list of independent [`Value`] items — the shape `xsl:variable`/`xsl:param`
//! bind when declared with a sequence/item/map/array `as` type.
//!
//! Each `start_element`/`end_element` pair (and each standalone `comment`/
//! `processing_instruction`) becomes its own item, captured into its own
//! tiny [`ResultTreeFragment`](crate::rtf::ResultTreeFragment) so it stays
//! independently navigable; adjacent top-level text/atomic events merge into
//! a single atomic item until an `item_boundary` (or the next element) splits
//! them, matching a serializing sink's own adjacent-text behavior.

use crate::error::EngineError;
use crate::output::{OutputEvent, OutputSink};
use crate::rtf::ResultTreeFragment;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct SequenceBuilder<'a> {
    items: Vec<Value<'a>>,
    /// Events captured for the item currently in progress (`depth > 0` while
    /// inside it); empty when no element item is open.
    current: Vec<OutputEvent>,
    depth: usize,
    pending_text: String,
    atomic_value_pending: bool,
    in_attribute_content: bool,
}

impl<'a> SequenceBuilder<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a fully-formed value as its own item, bypassing the event
    /// capture machinery — for a caller that already has a finished
    /// [`Value`] to splice into the sequence.
    pub fn add_item(&mut self, value: Value<'a>) {
        self.flush_pending_text();
        self.items.push(value);
    }

    pub fn get_sequence(mut self) -> Vec<Value<'a>> {
        self.flush_pending_text();
        self.items
    }

    fn flush_pending_text(&mut self) {
        if !self.pending_text.is_empty() {
            self.items.push(Value::from_string(std::mem::take(&mut self.pending_text)));
        }
        self.atomic_value_pending = false;
    }
}

impl<'a> OutputSink for SequenceBuilder<'a> {
    fn start_element(&mut self, uri: Option<&str>, local: &str, qname: &str) -> Result<(), EngineError> {
        if self.depth == 0 {
            self.flush_pending_text();
        }
        self.depth += 1;
        self.current.push(OutputEvent::StartElement {
            uri: uri.map(str::to_string),
            local: local.to_string(),
            qname: qname.to_string(),
        });
        Ok(())
    }

    fn end_element(&mut self, uri: Option<&str>, local: &str, qname: &str) -> Result<(), EngineError> {
        self.current.push(OutputEvent::EndElement {
            uri: uri.map(str::to_string),
            local: local.to_string(),
            qname: qname.to_string(),
        });
        self.depth = self.depth.saturating_sub(1);
        if self.depth == 0 {
            let events = std::mem::take(&mut self.current);
            self.items.push(Value::Rtf(std::rc::Rc::new(ResultTreeFragment::new(events, ""))));
        }
        Ok(())
    }

    fn attribute(&mut self, uri: Option<&str>, local: &str, qname: &str, value: &str) -> Result<(), EngineError> {
        if self.depth == 0 {
            return Err(EngineError::dynamic(
                "XTDE0410",
                "cannot add an attribute: no element is open for content",
            ));
        }
        self.current.push(OutputEvent::Attribute {
            uri: uri.map(str::to_string),
            local: local.to_string(),
            qname: qname.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    fn namespace(&mut self, prefix: Option<&str>, uri: &str) -> Result<(), EngineError> {
        self.current.push(OutputEvent::Namespace {
            prefix: prefix.map(str::to_string),
            uri: uri.to_string(),
        });
        Ok(())
    }

    fn characters(&mut self, text: &str) -> Result<(), EngineError> {
        if self.depth > 0 {
            self.current.push(OutputEvent::Characters(text.to_string()));
        } else {
            self.pending_text.push_str(text);
        }
        Ok(())
    }

    fn characters_raw(&mut self, text: &str) -> Result<(), EngineError> {
        if self.depth > 0 {
            self.current.push(OutputEvent::CharactersRaw(text.to_string()));
        } else {
            self.pending_text.push_str(text);
        }
        Ok(())
    }

    fn comment(&mut self, text: &str) -> Result<(), EngineError> {
        if self.depth > 0 {
            self.current.push(OutputEvent::Comment(text.to_string()));
        } else {
            self.flush_pending_text();
            self.items.push(Value::Rtf(std::rc::Rc::new(ResultTreeFragment::new(
                vec![OutputEvent::Comment(text.to_string())],
                "",
            ))));
        }
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> Result<(), EngineError> {
        if self.depth > 0 {
            self.current.push(OutputEvent::ProcessingInstruction {
                target: target.to_string(),
                data: data.to_string(),
            });
        } else {
            self.flush_pending_text();
            self.items.push(Value::Rtf(std::rc::Rc::new(ResultTreeFragment::new(
                vec![OutputEvent::ProcessingInstruction {
                    target: target.to_string(),
                    data: data.to_string(),
                }],
                "",
            ))));
        }
        Ok(())
    }

    fn set_element_type(&mut self, _uri: &str, _local: &str) -> Result<(), EngineError> {
        Ok(())
    }

    fn set_attribute_type(&mut self, _uri: &str, _local: &str) -> Result<(), EngineError> {
        Ok(())
    }

    fn atomic_value(&mut self, string_value: &str) -> Result<(), EngineError> {
        if self.depth > 0 {
            self.current.push(OutputEvent::AtomicValue(string_value.to_string()));
            return Ok(());
        }
        if self.atomic_value_pending {
            self.pending_text.push(' ');
        }
        self.pending_text.push_str(string_value);
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
        if self.depth == 0 {
            self.flush_pending_text();
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), EngineError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_boundary_splits_adjacent_atomic_values_into_separate_items() {
        let mut builder = SequenceBuilder::new();
        builder.atomic_value("1").unwrap();
        builder.item_boundary().unwrap();
        builder.atomic_value("2").unwrap();
        let items = builder.get_sequence();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].string_value(), "1");
        assert_eq!(items[1].string_value(), "2");
    }

    #[test]
    fn each_element_becomes_its_own_navigable_item() {
        let mut builder = SequenceBuilder::new();
        builder.start_element(None, "a", "a").unwrap();
        builder.characters("x").unwrap();
        builder.end_element(None, "a", "a").unwrap();
        builder.start_element(None, "b", "b").unwrap();
        builder.characters("y").unwrap();
        builder.end_element(None, "b", "b").unwrap();
        let items = builder.get_sequence();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].string_value(), "x");
        assert_eq!(items[1].string_value(), "y");
    }
}
