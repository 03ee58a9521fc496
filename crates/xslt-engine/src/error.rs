//! Unified error type for the transform engine.
//!
//! XSLT error codes are preserved verbatim at the front of the message
//! (e.g. `"XTDE0700: Template parameter $x is required"`) so they survive
//! into logs and error listeners unmangled.

use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// A standard dynamic/type error with its XSLT error code, e.g. `XTDE0700`, `XTTE0590`.
    #[error("{code}: {message}")]
    Dynamic { code: String, message: String },

    #[error("expression evaluation failed: {0}")]
    Expr(#[from] xpath_expr::XPath31Error),

    #[error("output pipeline error: {0}")]
    Output(String),

    #[error("no template rule found for {node_description} in mode {mode:?} (on-no-match=fail)")]
    NoMatchingTemplate {
        node_description: String,
        mode: Option<String>,
    },

    #[error("call to unknown named template '{0}'")]
    UnknownNamedTemplate(String),

    #[error("{0}")]
    UsageError(String),

    #[error("assertion failed: {0}")]
    AssertionFailed(String),

    #[error("document resolution failed for '{href}': {message}")]
    DocumentResolution { href: String, message: String },

    #[error("fork branch failed: {0}")]
    Fork(String),

    /// A fatal, user-triggered `xsl:message terminate="yes"` that unwinds to the top level.
    #[error("terminated: {0}")]
    Terminated(String),

    /// Non-local control flow (`break`/`next-iteration`) escaped its enclosing `xsl:iterate`.
    #[error("'{0}' used outside of xsl:iterate")]
    SignalEscaped(&'static str),
}

impl EngineError {
    pub fn dynamic(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dynamic {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::UsageError(message.into())
    }

    /// The leading XSLT error code, if this variant carries one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Dynamic { code, .. } => Some(code),
            _ => None,
        }
    }
}
