//! # Error Types
//!
//! Error types for prediction and symbol-stream decoding.
//!
//! ## Overview
//!
//! Only a failed prediction is an error. Ambiguities and context
//! sensitivities are advisory events dispatched through
//! [`crate::listener::PredictionListener`] and never surface here.
//!
//! - [`PredictionError`]: a decision could not be resolved (no viable
//!   alternative, mismatched input, or a caller-requested cancellation)
//! - [`DecodeError`]: a character stream was malformed under the `Report`
//!   decoding policy
//!
//! Programming errors — mutating a sealed configuration set, precedence
//! start-state calls on a non-precedence DFA — are panics, not variants.
//!
//! ## Diagnostics Support
//!
//! When the `diagnostics` feature is enabled, errors integrate with
//! [`miette`] for rich error reporting.

use thiserror::Error;

#[cfg(feature = "diagnostics")]
use miette::Diagnostic;

/// An error raised while predicting an alternative.
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum PredictionError {
    #[error("no viable alternative at decision {decision} (input {start_index}..{stop_index})")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(quiver::no_viable_alternative)))]
    NoViableAlternative {
        /// The decision that failed.
        decision: u32,
        /// Input index where the decision started.
        start_index: usize,
        /// Input index where the empty reach set was discovered.
        stop_index: usize,
        /// ATN state from which the decision was entered.
        state: u32,
    },

    #[error("mismatched input {found} at index {index}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(quiver::input_mismatch)))]
    InputMismatch {
        /// Symbol codes that would have been accepted.
        expected: Vec<i32>,
        /// The symbol actually seen.
        found: i32,
        /// Input index of the offending symbol.
        index: usize,
    },

    #[error("prediction cancelled at decision {decision}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(quiver::cancelled)))]
    Cancelled {
        /// The decision that was in flight when the deadline hook fired.
        decision: u32,
    },

    #[error(transparent)]
    #[cfg_attr(feature = "diagnostics", diagnostic(transparent))]
    Decode(#[from] DecodeError),
}

impl PredictionError {
    /// Input index associated with this error, when one exists.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        match self {
            Self::NoViableAlternative { stop_index, .. } => Some(*stop_index),
            Self::InputMismatch { index, .. } => Some(*index),
            Self::Cancelled { .. } => None,
            Self::Decode(e) => Some(e.offset()),
        }
    }
}

/// A malformed byte or code-unit sequence in a character stream.
///
/// Raised only under [`DecodePolicy::Report`](crate::stream::DecodePolicy);
/// the `Replace` policy substitutes U+FFFD instead.
#[derive(Debug, Clone, Error)]
#[cfg_attr(feature = "diagnostics", derive(Diagnostic))]
pub enum DecodeError {
    #[error("invalid UTF-8 sequence at byte offset {offset}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(quiver::invalid_utf8)))]
    InvalidUtf8 { offset: usize },

    #[error("unpaired surrogate 0x{unit:04X} at code-unit offset {offset}")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(quiver::unpaired_surrogate)))]
    UnpairedSurrogate { unit: u16, offset: usize },

    #[error("value 0x{value:08X} at offset {offset} is not a Unicode scalar")]
    #[cfg_attr(feature = "diagnostics", diagnostic(code(quiver::invalid_scalar)))]
    InvalidScalar { value: u32, offset: usize },
}

impl DecodeError {
    /// Offset of the malformed unit in the source buffer.
    #[must_use]
    pub fn offset(&self) -> usize {
        match self {
            Self::InvalidUtf8 { offset }
            | Self::UnpairedSurrogate { offset, .. }
            | Self::InvalidScalar { offset, .. } => *offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_viable_alternative_message() {
        let err = PredictionError::NoViableAlternative {
            decision: 3,
            start_index: 10,
            stop_index: 12,
            state: 42,
        };
        let text = format!("{err}");
        assert!(text.contains("decision 3"));
        assert!(text.contains("10..12"));
        assert_eq!(err.index(), Some(12));
    }

    #[test]
    fn decode_error_offsets() {
        let err = DecodeError::InvalidUtf8 { offset: 7 };
        assert_eq!(err.offset(), 7);

        let wrapped: PredictionError = err.into();
        assert_eq!(wrapped.index(), Some(7));
    }

    #[test]
    fn cancelled_has_no_index() {
        let err = PredictionError::Cancelled { decision: 0 };
        assert_eq!(err.index(), None);
    }
}
