//! Unified error codes for the mine operations backend
//!
//! This module defines all error codes used across mine-server and its
//! clients. Error codes are organized by category:
//! - 0xxx: General errors
//! - 1xxx: Record errors
//! - 2xxx: Anchor / ledger errors
//! - 3xxx: Offline queue errors
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Invalid format
    InvalidFormat = 6,
    /// Required field missing
    RequiredField = 7,

    // ==================== 1xxx: Record ====================
    /// Domain record not found
    RecordNotFound = 1001,
    /// Unknown record type
    RecordTypeUnknown = 1002,
    /// Record payload could not be canonically encoded
    RecordEncodingFailed = 1003,
    /// Supplied hash is not a well-formed digest
    RecordHashInvalid = 1004,

    // ==================== 2xxx: Anchor / Ledger ====================
    /// Anchor already exists for this (record, hash) pair
    AnchorDuplicate = 2001,
    /// Ledger gateway unreachable
    LedgerUnreachable = 2002,
    /// Ledger gateway busy or rate limited
    LedgerBusy = 2003,
    /// Ledger rejected the submission
    LedgerRejected = 2004,
    /// No anchor recorded for this record
    AnchorNotFound = 2005,

    // ==================== 3xxx: Offline Queue ====================
    /// Queued request not found
    QueueEntryNotFound = 3001,
    /// Queue storage operation failed
    QueueStorageFailed = 3002,
    /// A drain pass is already running
    DrainInProgress = 3003,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Configuration error
    ConfigError = 9003,
    /// Network error
    NetworkError = 9004,
    /// Operation timed out
    TimeoutError = 9005,
}

/// Error for invalid error code conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl From<ErrorCode> for u16 {
    fn from(code: ErrorCode) -> Self {
        code as u16
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::Unknown),
            2 => Ok(Self::ValidationFailed),
            3 => Ok(Self::NotFound),
            4 => Ok(Self::AlreadyExists),
            5 => Ok(Self::InvalidRequest),
            6 => Ok(Self::InvalidFormat),
            7 => Ok(Self::RequiredField),
            1001 => Ok(Self::RecordNotFound),
            1002 => Ok(Self::RecordTypeUnknown),
            1003 => Ok(Self::RecordEncodingFailed),
            1004 => Ok(Self::RecordHashInvalid),
            2001 => Ok(Self::AnchorDuplicate),
            2002 => Ok(Self::LedgerUnreachable),
            2003 => Ok(Self::LedgerBusy),
            2004 => Ok(Self::LedgerRejected),
            2005 => Ok(Self::AnchorNotFound),
            3001 => Ok(Self::QueueEntryNotFound),
            3002 => Ok(Self::QueueStorageFailed),
            3003 => Ok(Self::DrainInProgress),
            9001 => Ok(Self::InternalError),
            9002 => Ok(Self::DatabaseError),
            9003 => Ok(Self::ConfigError),
            9004 => Ok(Self::NetworkError),
            9005 => Ok(Self::TimeoutError),
            other => Err(InvalidErrorCode(other)),
        }
    }
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn code(&self) -> u16 {
        *self as u16
    }

    /// Get the default English message for this error code
    pub fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::AlreadyExists => "Resource already exists",
            Self::InvalidRequest => "Invalid request",
            Self::InvalidFormat => "Invalid format",
            Self::RequiredField => "Required field missing",

            Self::RecordNotFound => "Record not found",
            Self::RecordTypeUnknown => "Unknown record type",
            Self::RecordEncodingFailed => "Record payload could not be encoded",
            Self::RecordHashInvalid => "Hash is not a well-formed digest",

            Self::AnchorDuplicate => "Anchor already exists for this record and hash",
            Self::LedgerUnreachable => "Ledger gateway unreachable",
            Self::LedgerBusy => "Ledger gateway busy",
            Self::LedgerRejected => "Ledger rejected the submission",
            Self::AnchorNotFound => "No anchor recorded for this record",

            Self::QueueEntryNotFound => "Queued request not found",
            Self::QueueStorageFailed => "Queue storage operation failed",
            Self::DrainInProgress => "A drain pass is already running",

            Self::InternalError => "Internal server error",
            Self::DatabaseError => "Database error",
            Self::ConfigError => "Configuration error",
            Self::NetworkError => "Network error",
            Self::TimeoutError => "Operation timed out",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
