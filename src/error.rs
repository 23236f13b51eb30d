use std::borrow::Cow;

/// Errors produced by every fallible operation in this crate.
///
/// The set is closed: encoding and decoding never panic on malformed
/// input and never surface anything outside these variants.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A numeric value or a configured work quota exceeded its limit.
    #[error("numeric or quota limit exceeded")]
    Overflow,
    /// The input ended before a read completed.
    #[error("input ended before a read completed")]
    Truncated,
    /// The arena could not satisfy an allocation.
    #[error("arena allocation failed")]
    Alloc,
    /// A wire-format or schema violation.
    #[error("invalid argument: {0}")]
    Invalid(Cow<'static, str>),
    /// A feature the basic code paths do not implement.
    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl Error {
    #[inline]
    pub(crate) fn invalid(msg: impl Into<Cow<'static, str>>) -> Self {
        Self::Invalid(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
