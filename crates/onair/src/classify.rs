use crate::load_error::{ErrorKind, LoadError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to heal on its own. Retried.
    Transient,
    /// Will not succeed without an external change. Never retried.
    Fatal,
}

/// The rule that made an error fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FatalReason {
    ConnectFailed,
    NameResolution,
    Refused,
    UnrecognizedFormat,
    ResponseCode(u16),
    Parse,
}

/// Classifies a load failure. Pure: the same error always yields the same class.
pub fn classify(error: &LoadError) -> ErrorClass {
    match fatal_reason(error) {
        Some(_) => ErrorClass::Fatal,
        None => ErrorClass::Transient,
    }
}

/// Returns the first matching fatal rule, or `None` for transient errors.
///
/// Connection, name resolution and "refused" messages are searched for in the
/// whole causal chain. Format, response code and parse rules only apply to the
/// outermost error: an open failure that merely wraps a response code is an
/// open failure, and is retried.
pub fn fatal_reason(error: &LoadError) -> Option<FatalReason> {
    if error.causes().any(|c| c.kind() == ErrorKind::Connect) {
        return Some(FatalReason::ConnectFailed);
    }
    if error
        .causes()
        .any(|c| c.kind() == ErrorKind::NameResolution)
    {
        return Some(FatalReason::NameResolution);
    }
    if error
        .causes()
        .any(|c| c.message().to_lowercase().contains("refused"))
    {
        return Some(FatalReason::Refused);
    }

    match error.kind() {
        ErrorKind::UnrecognizedFormat => Some(FatalReason::UnrecognizedFormat),
        ErrorKind::ResponseCode(code @ 400..=599) => Some(FatalReason::ResponseCode(code)),
        ErrorKind::Parse => Some(FatalReason::Parse),
        _ => None,
    }
}
