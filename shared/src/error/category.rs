//! Error category classification

use super::codes::ErrorCode;
use serde::{Deserialize, Serialize};

/// Error category classification based on error code ranges
///
/// Categories are determined by the leading digit of the error code:
/// - 0xxx: General errors
/// - 1xxx: Record errors
/// - 2xxx: Anchor / ledger errors
/// - 3xxx: Offline queue errors
/// - 9xxx: System errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// General errors (0xxx)
    General,
    /// Record errors (1xxx)
    Record,
    /// Anchor / ledger errors (2xxx)
    Anchor,
    /// Offline queue errors (3xxx)
    Queue,
    /// System errors (9xxx)
    System,
}

impl ErrorCategory {
    /// Determine category from error code value
    pub fn from_code(code: u16) -> Self {
        match code {
            0..1000 => Self::General,
            1000..2000 => Self::Record,
            2000..3000 => Self::Anchor,
            3000..4000 => Self::Queue,
            _ => Self::System,
        }
    }

    /// Get the string name for this category
    pub fn name(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Record => "record",
            Self::Anchor => "anchor",
            Self::Queue => "queue",
            Self::System => "system",
        }
    }
}

impl ErrorCode {
    /// Get the category for this error code
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::from_code(self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_from_code() {
        assert_eq!(ErrorCategory::from_code(0), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(999), ErrorCategory::General);
        assert_eq!(ErrorCategory::from_code(1001), ErrorCategory::Record);
        assert_eq!(ErrorCategory::from_code(2001), ErrorCategory::Anchor);
        assert_eq!(ErrorCategory::from_code(3001), ErrorCategory::Queue);
        assert_eq!(ErrorCategory::from_code(9001), ErrorCategory::System);
        assert_eq!(ErrorCategory::from_code(10000), ErrorCategory::System);
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(ErrorCode::NotFound.category(), ErrorCategory::General);
        assert_eq!(ErrorCode::RecordNotFound.category(), ErrorCategory::Record);
        assert_eq!(ErrorCode::LedgerBusy.category(), ErrorCategory::Anchor);
        assert_eq!(
            ErrorCode::QueueEntryNotFound.category(),
            ErrorCategory::Queue
        );
        assert_eq!(ErrorCode::InternalError.category(), ErrorCategory::System);
    }

    #[test]
    fn test_category_serialize() {
        let json = serde_json::to_string(&ErrorCategory::Anchor).unwrap();
        assert_eq!(json, "\"anchor\"");

        let category: ErrorCategory = serde_json::from_str("\"queue\"").unwrap();
        assert_eq!(category, ErrorCategory::Queue);
    }
}
