//! Error types for template execution
//!
//! Errors carry structured information rather than preformatted text, so
//! callers can match on what went wrong and miette can render help text.
//!
//! Looking up a missing variable is *not* an error: it yields
//! [`Value::Undefined`](crate::Value::Undefined). Only a strict
//! [`UndefinedPolicy`](crate::UndefinedPolicy) turns it into an
//! [`UndefinedError`] once the marker is emitted or iterated.

use miette::Diagnostic;
use thiserror::Error;

/// Result type used throughout the runtime
pub type Result<T, E = RenderError> = std::result::Result<T, E>;

/// All errors that can abort a render
#[derive(Error, Debug, Diagnostic)]
pub enum RenderError {
    /// Something named by compiled code does not exist
    #[error(transparent)]
    #[diagnostic(transparent)]
    Lookup(#[from] LookupError),

    /// An undefined value was used under the strict policy
    #[error(transparent)]
    #[diagnostic(transparent)]
    Undefined(#[from] UndefinedError),

    /// A value had the wrong shape
    #[error(transparent)]
    #[diagnostic(transparent)]
    Type(#[from] TypeError),

    /// Strict tuple unpacking failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Unpack(#[from] UnpackError),

    /// A filter or test failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Filter(#[from] FilterError),

    /// The output sink refused a chunk
    #[error("Failed to write template output")]
    #[diagnostic(code(ramure::output))]
    Output(#[from] std::fmt::Error),
}

impl RenderError {
    /// Whether this is one of the lookup failures (unknown filter or test,
    /// missing template, missing block, invalid block level)
    pub fn is_lookup_failure(&self) -> bool {
        matches!(self, RenderError::Lookup(_))
    }

    /// Whether this error means a template could not be found
    pub fn is_template_not_found(&self) -> bool {
        matches!(
            self,
            RenderError::Lookup(LookupError::TemplateNotFound { .. })
        )
    }
}

/// Something named by compiled code does not exist
#[derive(Error, Debug, Diagnostic)]
pub enum LookupError {
    /// No filter is registered under `name`
    #[error("Unknown filter `{name}`")]
    #[diagnostic(
        code(ramure::unknown_filter),
        help("Available filters: {}", known.join(", "))
    )]
    UnknownFilter {
        /// The requested filter
        name: String,
        /// Registered filter names, sorted
        known: Vec<String>,
    },

    /// No test is registered under `name`
    #[error("Unknown test `{name}`")]
    #[diagnostic(
        code(ramure::unknown_test),
        help("Available tests: {}", known.join(", "))
    )]
    UnknownTest {
        /// The requested test
        name: String,
        /// Registered test names, sorted
        known: Vec<String>,
    },

    /// The loader has no template under `name`
    #[error("Template `{name}` not found")]
    #[diagnostic(code(ramure::template_not_found))]
    TemplateNotFound {
        /// The resolved template name
        name: String,
    },

    /// None of several candidate templates could be loaded
    #[error("None of the templates {} could be found", names.join(", "))]
    #[diagnostic(code(ramure::no_template_selected))]
    NoTemplateSelected {
        /// The resolved candidate names, in the order they were tried
        names: Vec<String>,
    },

    /// No definition of block `name` is registered
    #[error("Block `{name}` is not defined")]
    #[diagnostic(
        code(ramure::block_not_found),
        help("Defined blocks: {}", known.join(", "))
    )]
    BlockNotFound {
        /// The requested block
        name: String,
        /// Registered block names, sorted
        known: Vec<String>,
    },

    /// The override chain of `name` is shorter than requested
    #[error("Block `{name}` has {depth} definition(s), cannot go {levels_up} level(s) up")]
    #[diagnostic(code(ramure::block_level_overflow))]
    BlockLevelOverflow {
        /// The requested block
        name: String,
        /// Steps requested from the most specific definition
        levels_up: usize,
        /// Number of registered definitions
        depth: usize,
    },

    /// A block level outside the negative-level convention
    #[error("Invalid level {level} for block `{name}`")]
    #[diagnostic(
        code(ramure::invalid_block_level),
        help("levels count from -1 for the most specific definition")
    )]
    InvalidBlockLevel {
        /// The requested block
        name: String,
        /// The offending level
        level: isize,
    },

    /// The parent definition was requested outside any block
    #[error("Parent block requested outside of any block")]
    #[diagnostic(code(ramure::not_in_block))]
    NotInBlock,
}

/// An undefined value reached output or iteration under the strict policy
#[derive(Error, Debug, Diagnostic)]
#[error("Variable `{name}` is not defined")]
#[diagnostic(code(ramure::undefined))]
pub struct UndefinedError {
    /// The name that was looked up
    pub name: String,
}

/// A value had the wrong shape for the operation
#[derive(Error, Debug, Diagnostic)]
#[error("Expected {expected}, found {found}")]
#[diagnostic(code(ramure::type_error), help("while {context}"))]
pub struct TypeError {
    /// What type was expected
    pub expected: String,
    /// What type was found
    pub found: String,
    /// What the runtime was doing
    pub context: String,
}

/// Strict tuple unpacking got the wrong number of values
#[derive(Error, Debug, Diagnostic)]
#[error("Cannot unpack {found} value(s) into {expected} name(s)")]
#[diagnostic(code(ramure::unpack))]
pub struct UnpackError {
    /// Number of target names
    pub expected: usize,
    /// Number of values in the element
    pub found: usize,
}

/// A filter or test function reported a failure
#[derive(Error, Debug, Diagnostic)]
#[error("Filter `{name}` failed: {message}")]
#[diagnostic(code(ramure::filter))]
pub struct FilterError {
    /// The failing filter or test
    pub name: String,
    /// What went wrong
    pub message: String,
}

impl FilterError {
    /// A filter failure with a message
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}
