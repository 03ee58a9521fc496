//! Document I/O gateway: thin seams over external collaborators that fetch
//! and write documents by URI, the same "trait plus no-op default" shape
//! [`crate::schema::SchemaValidator`] uses for the schema gateway. This crate
//! has no parser or file/network layer of its own; `fn:document()`,
//! `xsl:source-document`, and `xsl:result-document` all go through these.

use std::rc::Rc;

use crate::error::EngineError;
use crate::output::OutputSink;
use crate::rtf::ResultTreeFragment;

/// Fetches and parses an external document by URI, handing back a detached
/// [`ResultTreeFragment`] rather than a node borrowed from this transform's
/// own source tree — a resolved document owns its own content, so it can't
/// be expressed as a node tied to this crate's `'doc` source-document
/// lifetime.
pub trait DocumentResolver {
    fn resolve(&self, href: &str) -> Result<Rc<ResultTreeFragment>, EngineError>;
}

/// Opens a secondary output destination for `xsl:result-document`, keyed by
/// its resolved `href` and the output encoding the stylesheet's defaults
/// (overridden by any inline `xsl:result-document` attributes) resolved to.
pub trait ResultDocumentResolver {
    fn open(&self, href: &str, encoding: &str) -> Result<Box<dyn OutputSink>, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;
    impl DocumentResolver for AlwaysFails {
        fn resolve(&self, href: &str) -> Result<Rc<ResultTreeFragment>, EngineError> {
            Err(EngineError::dynamic("FODC0002", format!("no such document: {href}")))
        }
    }

    #[test]
    fn resolver_trait_object_is_usable_behind_rc() {
        let resolver: Rc<dyn DocumentResolver> = Rc::new(AlwaysFails);
        let err = resolver.resolve("missing.xml").unwrap_err();
        assert_eq!(err.code(), Some("FODC0002"));
    }
}
