//! Schema/type gateway: a thin seam over an external schema-aware validator,
//! not a schema processor of its own. Every construction site that would, in
//! a schema-aware processor, attach a type annotation instead calls through
//! a [`SchemaValidator`] and threads the annotation into the output pipeline
//! via [`crate::output::OutputSink::set_element_type`]/`set_attribute_type`.

/// A type annotation a validator assigns to a constructed or copied node:
/// the XSD type name plus whether the content matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeAnnotation {
    pub type_uri: String,
    pub type_local: String,
    pub valid: bool,
}

impl TypeAnnotation {
    pub fn untyped() -> Self {
        Self {
            type_uri: "http://www.w3.org/2001/XMLSchema".to_string(),
            type_local: "untyped".to_string(),
            valid: true,
        }
    }

    pub fn untyped_atomic() -> Self {
        Self {
            type_uri: "http://www.w3.org/2001/XMLSchema".to_string(),
            type_local: "untypedAtomic".to_string(),
            valid: true,
        }
    }
}

/// Validates (or declines to validate) constructed/copied content, producing
/// the type annotation a `set_element_type`/`set_attribute_type` output event
/// carries. A real implementation would wrap an external XSD engine; this
/// crate ships only the default that makes the rest of the engine runnable
/// without one.
pub trait SchemaValidator {
    fn validate_element(&self, uri: Option<&str>, local: &str, content: &str) -> TypeAnnotation;
    fn validate_attribute(&self, uri: Option<&str>, local: &str, value: &str) -> TypeAnnotation;
}

/// The validator used when a stylesheet declares no `xsl:import-schema` and
/// no schema-aware processing is configured: everything is `xs:untyped`/
/// `xs:untypedAtomic`, always valid, matching XSLT's non-schema-aware mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct UntypedValidator;

impl SchemaValidator for UntypedValidator {
    fn validate_element(&self, _uri: Option<&str>, _local: &str, _content: &str) -> TypeAnnotation {
        TypeAnnotation::untyped()
    }

    fn validate_attribute(&self, _uri: Option<&str>, _local: &str, _value: &str) -> TypeAnnotation {
        TypeAnnotation::untyped_atomic()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untyped_validator_always_reports_untyped_and_valid() {
        let v = UntypedValidator;
        let t = v.validate_element(None, "row", "");
        assert_eq!(t.type_local, "untyped");
        assert!(t.valid);
    }
}
