/// Raw status code carried in every reply payload. Zero means success.
#[allow(non_camel_case_types)]
pub type status_code_t = u16;

/// Generic codes shared by every layer (0..=999).
pub mod StatusCode {
    use super::status_code_t;

    pub const OK: status_code_t = 0;
    pub const NOT_IMPLEMENTED: status_code_t = 1;
    pub const INVALID_ARG: status_code_t = 3;
    pub const INVALID_CONFIG: status_code_t = 4;
    pub const RESOURCE_EXHAUSTED: status_code_t = 5;
    pub const TIMEOUT: status_code_t = 6;
    pub const INTERRUPTED: status_code_t = 7;
    pub const UNEXPECTED_SYSTEM_ERROR: status_code_t = 10;
    pub const UNKNOWN: status_code_t = 999;
}

/// Namespace domain errors (1000..=1999).
pub mod NamespaceCode {
    use super::status_code_t;

    pub const NOT_FOUND: status_code_t = 1000;
    pub const NOT_DIRECTORY: status_code_t = 1001;
    pub const NOT_FILE: status_code_t = 1002;
    pub const EXISTS: status_code_t = 1003;
    pub const PERMISSION_DENIED: status_code_t = 1004;
    pub const NOT_EMPTY: status_code_t = 1005;
    pub const INVALID_PATH: status_code_t = 1006;
    pub const ATTRIBUTE_EXISTS: status_code_t = 1007;
    pub const ATTRIBUTE_NOT_FOUND: status_code_t = 1008;
}

/// Messaging substrate errors (2000..=2999).
pub mod CellCode {
    use super::status_code_t;

    pub const NO_ROUTE: status_code_t = 2000;
    pub const UNEXPECTED_REPLY: status_code_t = 2001;
    pub const BROKEN_PROMISE: status_code_t = 2002;
    pub const SHUTTING_DOWN: status_code_t = 2003;
    pub const ALREADY_COMPLETED: status_code_t = 2004;
}

/// Classification of status code ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCodeType {
    Invalid,
    Common,
    Namespace,
    Cell,
}

/// Determine the category of a status code.
pub fn type_of(code: status_code_t) -> StatusCodeType {
    match code {
        0..=999 => StatusCodeType::Common,
        1000..=1999 => StatusCodeType::Namespace,
        2000..=2999 => StatusCodeType::Cell,
        _ => StatusCodeType::Invalid,
    }
}

/// Convert a status code to its human-readable name.
pub fn to_string(code: status_code_t) -> &'static str {
    match code {
        StatusCode::OK => "OK",
        StatusCode::NOT_IMPLEMENTED => "NotImplemented",
        StatusCode::INVALID_ARG => "InvalidArg",
        StatusCode::INVALID_CONFIG => "InvalidConfig",
        StatusCode::RESOURCE_EXHAUSTED => "ResourceExhausted",
        StatusCode::TIMEOUT => "Timeout",
        StatusCode::INTERRUPTED => "Interrupted",
        StatusCode::UNEXPECTED_SYSTEM_ERROR => "UnexpectedSystemError",
        StatusCode::UNKNOWN => "Unknown",

        NamespaceCode::NOT_FOUND => "Namespace::NotFound",
        NamespaceCode::NOT_DIRECTORY => "Namespace::NotDirectory",
        NamespaceCode::NOT_FILE => "Namespace::NotFile",
        NamespaceCode::EXISTS => "Namespace::Exists",
        NamespaceCode::PERMISSION_DENIED => "Namespace::PermissionDenied",
        NamespaceCode::NOT_EMPTY => "Namespace::NotEmpty",
        NamespaceCode::INVALID_PATH => "Namespace::InvalidPath",
        NamespaceCode::ATTRIBUTE_EXISTS => "Namespace::AttributeExists",
        NamespaceCode::ATTRIBUTE_NOT_FOUND => "Namespace::AttributeNotFound",

        CellCode::NO_ROUTE => "Cell::NoRoute",
        CellCode::UNEXPECTED_REPLY => "Cell::UnexpectedReply",
        CellCode::BROKEN_PROMISE => "Cell::BrokenPromise",
        CellCode::SHUTTING_DOWN => "Cell::ShuttingDown",
        CellCode::ALREADY_COMPLETED => "Cell::AlreadyCompleted",

        _ => "UnknownStatusCode",
    }
}

/// Whether a caller may reasonably resubmit the same request.
pub fn is_retriable(code: status_code_t) -> bool {
    matches!(
        code,
        StatusCode::TIMEOUT | StatusCode::RESOURCE_EXHAUSTED | CellCode::NO_ROUTE
    )
}
