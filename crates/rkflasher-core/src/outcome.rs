//! Tagged parse results
//!
//! rkdeveloptool's output grammar is not specified anywhere and drifts
//! between versions. A parser that found nothing it knows returns
//! [`ParseOutcome::Unrecognized`] with the raw text, instead of an empty
//! record that looks like a device with no fields.

/// Result of parsing one command's output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome<T> {
    /// At least one known pattern matched
    Recognized(T),
    /// Nothing matched; the raw (trimmed) text is kept for display
    Unrecognized(String),
}

impl<T> ParseOutcome<T> {
    /// Build an `Unrecognized` outcome from raw output
    pub fn unrecognized(raw: &str) -> Self {
        Self::Unrecognized(raw.trim().to_string())
    }

    /// Whether a known pattern matched
    pub fn is_recognized(&self) -> bool {
        matches!(self, Self::Recognized(_))
    }

    /// Convert into an `Option`, discarding unrecognized text
    pub fn recognized(self) -> Option<T> {
        match self {
            Self::Recognized(value) => Some(value),
            Self::Unrecognized(_) => None,
        }
    }

    /// Borrow the recognized value, if any
    pub fn as_recognized(&self) -> Option<&T> {
        match self {
            Self::Recognized(value) => Some(value),
            Self::Unrecognized(_) => None,
        }
    }

    /// Map the recognized value
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> ParseOutcome<U> {
        match self {
            Self::Recognized(value) => ParseOutcome::Recognized(f(value)),
            Self::Unrecognized(raw) => ParseOutcome::Unrecognized(raw),
        }
    }
}

impl<T: Default> ParseOutcome<T> {
    /// The recognized value, or the type's default (an empty record)
    pub fn unwrap_or_default(self) -> T {
        self.recognized().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unrecognized_keeps_trimmed_raw() {
        let outcome: ParseOutcome<u32> = ParseOutcome::unrecognized("  garbage\n");
        assert!(!outcome.is_recognized());
        assert_eq!(outcome, ParseOutcome::Unrecognized("garbage".to_string()));
        assert_eq!(outcome.unwrap_or_default(), 0);
    }

    #[test]
    fn test_map() {
        let outcome = ParseOutcome::Recognized(2u32).map(|v| v * 21);
        assert_eq!(outcome.recognized(), Some(42));
    }
}
