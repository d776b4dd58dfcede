//! Error handling for the Lona compiler

use crate::utils::Span;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Compiler error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // ==================== Parser Errors ====================

    #[error("Unexpected token: expected {expected}, got {got}")]
    UnexpectedToken {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("Expected identifier")]
    ExpectedIdent { span: Span },

    #[error("Expected type")]
    ExpectedType { span: Span },

    #[error("Expected expression")]
    ExpectedExpr { span: Span },

    #[error("Invalid number literal: {text}")]
    InvalidNumber { text: String, span: Span },

    // ==================== Semantic Errors ====================

    #[error("Unknown type: {name}")]
    UnknownType { name: String, span: Span },

    #[error("Duplicate type: {name}")]
    DuplicateType { name: String, span: Span },

    #[error("Unresolved identifier: {name}")]
    UnresolvedIdentifier { name: String, span: Span },

    #[error("Duplicate variable: {name}")]
    DuplicateVariable { name: String, span: Span },

    #[error("Type mismatch: expected {expected}, got {got}")]
    TypeMismatch {
        expected: String,
        got: String,
        span: Span,
    },

    #[error("Type error: {message}")]
    TypeError { message: String, span: Span },

    #[error("Argument mismatch: {message}")]
    ArgumentMismatch { message: String, span: Span },

    #[error("Missing return in function {name}")]
    MissingReturn { name: String, span: Span },

    #[error("Cannot assign to read-only value")]
    ReadOnly { span: Span },

    #[error("Unknown field: {field} in {ty}")]
    UnknownField { field: String, ty: String, span: Span },

    #[error("Return mismatch: {message}")]
    ReturnMismatch { message: String, span: Span },

    #[error("Cannot infer type of {name}: no type annotation and no initializer")]
    UninferableVariable { name: String, span: Span },
}

impl Error {
    /// Get the span associated with this error
    pub fn span(&self) -> Span {
        match self {
            Self::UnexpectedToken { span, .. } => *span,
            Self::ExpectedIdent { span } => *span,
            Self::ExpectedType { span } => *span,
            Self::ExpectedExpr { span } => *span,
            Self::InvalidNumber { span, .. } => *span,
            Self::UnknownType { span, .. } => *span,
            Self::DuplicateType { span, .. } => *span,
            Self::UnresolvedIdentifier { span, .. } => *span,
            Self::DuplicateVariable { span, .. } => *span,
            Self::TypeMismatch { span, .. } => *span,
            Self::TypeError { span, .. } => *span,
            Self::ArgumentMismatch { span, .. } => *span,
            Self::MissingReturn { span, .. } => *span,
            Self::ReadOnly { span } => *span,
            Self::UnknownField { span, .. } => *span,
            Self::ReturnMismatch { span, .. } => *span,
            Self::UninferableVariable { span, .. } => *span,
        }
    }

    /// Re-anchor a span-less error (raised below the AST layer) at `at`.
    ///
    /// Type-level operations do not know which node they serve, so they report
    /// `Span::dummy()` and the visitor attaches the node location here.
    pub fn at(mut self, at: Span) -> Self {
        let span = self.span_mut();
        if *span == Span::dummy() {
            *span = at;
        }
        self
    }

    fn span_mut(&mut self) -> &mut Span {
        match self {
            Self::UnexpectedToken { span, .. }
            | Self::ExpectedIdent { span }
            | Self::ExpectedType { span }
            | Self::ExpectedExpr { span }
            | Self::InvalidNumber { span, .. }
            | Self::UnknownType { span, .. }
            | Self::DuplicateType { span, .. }
            | Self::UnresolvedIdentifier { span, .. }
            | Self::DuplicateVariable { span, .. }
            | Self::TypeMismatch { span, .. }
            | Self::TypeError { span, .. }
            | Self::ArgumentMismatch { span, .. }
            | Self::MissingReturn { span, .. }
            | Self::ReadOnly { span }
            | Self::UnknownField { span, .. }
            | Self::ReturnMismatch { span, .. }
            | Self::UninferableVariable { span, .. } => span,
        }
    }

    pub(crate) fn type_error(message: impl Into<String>) -> Self {
        Self::TypeError { message: message.into(), span: Span::dummy() }
    }

    pub(crate) fn mismatch(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
            got: got.into(),
            span: Span::dummy(),
        }
    }
}
