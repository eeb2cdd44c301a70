use std::fmt;

use crate::status_code::{self, status_code_t, CellCode, NamespaceCode, StatusCode};

/// A status value carrying a code and optional message.
///
/// This is the error half of every fallible namespace call and the content of
/// a reply's error slot. `#[must_use]` keeps callers from dropping failures.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Status {
    code: status_code_t,
    message: Option<String>,
}

impl Status {
    /// Create a status with just a code.
    pub fn new(code: status_code_t) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// Create a status with a code and a descriptive message.
    pub fn with_message(code: status_code_t, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(msg.into()),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::with_message(NamespaceCode::NOT_FOUND, msg)
    }

    pub fn not_directory(msg: impl Into<String>) -> Self {
        Self::with_message(NamespaceCode::NOT_DIRECTORY, msg)
    }

    pub fn not_file(msg: impl Into<String>) -> Self {
        Self::with_message(NamespaceCode::NOT_FILE, msg)
    }

    pub fn exists(msg: impl Into<String>) -> Self {
        Self::with_message(NamespaceCode::EXISTS, msg)
    }

    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::with_message(NamespaceCode::PERMISSION_DENIED, msg)
    }

    pub fn invalid_arg(msg: impl Into<String>) -> Self {
        Self::with_message(StatusCode::INVALID_ARG, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::with_message(StatusCode::TIMEOUT, msg)
    }

    pub fn resource_exhausted(msg: impl Into<String>) -> Self {
        Self::with_message(StatusCode::RESOURCE_EXHAUSTED, msg)
    }

    pub fn unexpected(msg: impl Into<String>) -> Self {
        Self::with_message(StatusCode::UNEXPECTED_SYSTEM_ERROR, msg)
    }

    pub fn no_route(msg: impl Into<String>) -> Self {
        Self::with_message(CellCode::NO_ROUTE, msg)
    }

    /// Return the numeric status code.
    pub fn code(&self) -> status_code_t {
        self.code
    }

    /// Return the optional message.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Whether this status represents success (code == OK).
    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::OK
    }

    /// Produce a human-readable description like `"Namespace::NotFound(1000) /a/b"`.
    pub fn describe(&self) -> String {
        let name = status_code::to_string(self.code);
        match &self.message {
            Some(msg) => format!("{}({}) {}", name, self.code, msg),
            None => format!("{}({})", name, self.code),
        }
    }

    /// Split into the `(code, message)` pair stored in a reply's error slot.
    pub fn into_parts(self) -> (status_code_t, Option<String>) {
        (self.code, self.message)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

impl std::error::Error for Status {}

impl From<status_code_t> for Status {
    fn from(code: status_code_t) -> Self {
        Self::new(code)
    }
}
