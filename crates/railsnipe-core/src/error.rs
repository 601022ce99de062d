// SPDX-FileCopyrightText: 2026 Railsnipe Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types and the upstream failure taxonomy.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;

/// The primary error type used across railsnipe crates.
#[derive(Debug, Error)]
pub enum RailsnipeError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Key ring or credential vault failures (wrong secret, corrupted ciphertext).
    #[error("vault error: {0}")]
    Vault(String),

    /// A classified failure reported by the booking provider.
    #[error("upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Authentication for a session key could not be completed.
    #[error("authentication failed for {key}: {message}")]
    Auth { key: String, message: String },

    /// The caller's request is malformed.
    #[error("invalid request: {0}")]
    Validation(String),

    /// No task with the given id is known to the supervisor or the journal.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// An external record reference did not resolve against the current listing.
    #[error("record not found: {0}")]
    RecordNotFound(String),

    /// Outbound notification delivery failed.
    #[error("notification error: {message}")]
    Notify {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RailsnipeError {
    /// Wraps any error as a storage failure.
    pub fn storage(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Storage {
            source: Box::new(e),
        }
    }
}

/// Fine-grained classification of an upstream failure.
///
/// Drives the retry scheduler's WAIT / re-authenticate / FAILED decisions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    /// Every candidate is still sold out (or the booking was waitlisted).
    NoSeat,
    /// Timeout, connection reset, 5xx.
    TransientNetwork,
    /// The provider no longer accepts the session.
    SessionExpired,
    /// The stored login was rejected by the provider.
    InvalidCredentials,
    /// The provider flagged the traffic as automated.
    BotDetected,
    /// The request itself is malformed.
    ValidationError,
    /// Any other provider-side refusal.
    Rejected,
}

const BOT_DETECTED_MARKERS: &[&str] = &["정상적인 경로로 접근", "IP Address Blocked"];
const SESSION_EXPIRED_MARKERS: &[&str] = &["로그인 후 사용하십시오"];
const INVALID_CREDENTIAL_MARKERS: &[&str] = &["로그인 정보를 다시 확인", "존재하지않는 회원"];
const NO_SEAT_MARKERS: &[&str] = &[
    "잔여석없음",
    "Sold out",
    "사용자가 많아 접속이 원활하지 않습니다",
    "예약대기 접수가 마감되었습니다",
    "예약대기자한도수초과",
];

impl ErrorClass {
    /// Classifies a provider message by the phrases the providers are known to use.
    ///
    /// Unrecognised messages classify as [`ErrorClass::Rejected`].
    pub fn classify_message(message: &str) -> Self {
        let contains_any = |markers: &[&str]| markers.iter().any(|m| message.contains(m));
        if contains_any(BOT_DETECTED_MARKERS) {
            Self::BotDetected
        } else if contains_any(SESSION_EXPIRED_MARKERS) {
            Self::SessionExpired
        } else if contains_any(INVALID_CREDENTIAL_MARKERS) {
            Self::InvalidCredentials
        } else if contains_any(NO_SEAT_MARKERS) {
            Self::NoSeat
        } else {
            Self::Rejected
        }
    }

    /// The coarse taxonomy bucket surfaced to users.
    pub fn kind(self) -> ErrorKind {
        match self {
            Self::NoSeat => ErrorKind::NoSeat,
            Self::TransientNetwork | Self::Rejected => ErrorKind::Transient,
            Self::SessionExpired | Self::InvalidCredentials => ErrorKind::Auth,
            Self::BotDetected => ErrorKind::RateLimit,
            Self::ValidationError => ErrorKind::Validation,
        }
    }

    /// True for the two classes that call for re-authentication.
    pub fn is_auth(self) -> bool {
        matches!(self, Self::SessionExpired | Self::InvalidCredentials)
    }
}

/// Coarse error taxonomy reported in `TaskState::last_error`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Transient,
    Auth,
    RateLimit,
    NotFound,
    NoSeat,
    Internal,
}

/// A failure returned by an upstream collaborator, already classified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{class}: {message}")]
pub struct UpstreamError {
    pub class: ErrorClass,
    pub message: String,
}

impl UpstreamError {
    pub fn new(class: ErrorClass, message: impl Into<String>) -> Self {
        Self {
            class,
            message: message.into(),
        }
    }

    /// Builds an error whose class is inferred from the provider's message text.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            class: ErrorClass::classify_message(&message),
            message,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::TransientNetwork, message)
    }
}

/// The error recorded on a task: taxonomy kind plus human-readable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub kind: ErrorKind,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<&UpstreamError> for TaskError {
    fn from(e: &UpstreamError) -> Self {
        Self::new(e.class.kind(), e.message.clone())
    }
}

impl std::fmt::Display for TaskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
