use thiserror::Error;

/// Errors returned while parsing or analyzing a pattern.
///
/// Only conditions that make a result impossible are errors. Budget
/// exhaustion and unsupported features on a particular analysis path are
/// not errors; they flow through [`crate::Diagnostics`] as
/// [`crate::Status::Unknown`] values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The pattern is not a valid regular expression.
    #[error("{msg} at offset {pos}")]
    Syntax { msg: String, pos: usize },

    /// The pattern uses a feature the automaton checker cannot model.
    /// The driver reacts by switching to the fuzz checker.
    #[error("pattern contains {feature}")]
    UnsupportedFeature { feature: &'static str },

    /// A constructed structure exceeded its configured size limit.
    #[error("{what} too large ({size} states, limit {limit})")]
    TooLarge { what: &'static str, size: usize, limit: usize },

    /// An internal invariant was violated. Indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub(crate) fn syntax(msg: impl Into<String>, pos: usize) -> Self {
        Error::Syntax { msg: msg.into(), pos }
    }
}
