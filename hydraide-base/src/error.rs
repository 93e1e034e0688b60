// We want a few things here:
// 1. A way to create a new error with a backtrace
// 2. A way to centralize setting a breakpoint to trap any error in the system fairly soon
//    after it's created (or at least when it's propagated from a library we use back to us)
// 3. Same but for logging / emitting error messages into the tracing/logging system
// 4. A `kind` tag so the Gateway can map an error onto a transport status code
//    without string-matching messages (see spec §7).

use backtrace_error::DynBacktraceError;
use std::borrow::Cow;
use tracing::error;

#[cfg(test)]
use test_log::test;

/// Mirrors the error kinds enumerated in spec §7. `Internal` is the default
/// for anything converted via `From<E>` from a library error we don't
/// otherwise classify.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Connection,
    CtxTimeout,
    CtxClosedByClient,
    InvalidArgument,
    SwampNotRegistered,
    SwampNotFound,
    KeyNotFound,
    AlreadyExists,
    WrongType,
    ConditionNotMet,
    FailedPrecondition,
    Internal,
}

#[derive(Debug)]
#[allow(dead_code)]
pub struct Error {
    kind: ErrorKind,
    inner: DynBacktraceError,
}
pub type Result<T> = std::result::Result<T, Error>;

struct SimpleErr(Cow<'static, str>);
impl std::fmt::Debug for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::fmt::Display for SimpleErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
impl std::error::Error for SimpleErr {
    fn description(&self) -> &str {
        &self.0
    }
}

impl<E: std::error::Error + Send + Sync + 'static> From<E> for Error {
    fn from(err: E) -> Error {
        Error::new(ErrorKind::Internal, err)
    }
}

impl Error {
    pub fn new<E: std::error::Error + Send + Sync + 'static>(kind: ErrorKind, err: E) -> Error {
        error!(target: "hydraide", kind = ?kind, "{:?}", err);
        Error {
            kind,
            inner: DynBacktraceError::from(err),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

pub fn kinded(kind: ErrorKind, msg: impl Into<Cow<'static, str>>) -> Error {
    Error::new(kind, SimpleErr(msg.into()))
}

pub fn err(msg: impl Into<Cow<'static, str>>) -> Error {
    kinded(ErrorKind::Internal, msg)
}

pub fn invalid_argument(msg: impl Into<Cow<'static, str>>) -> Error {
    kinded(ErrorKind::InvalidArgument, msg)
}

pub fn swamp_not_registered(name: impl std::fmt::Display) -> Error {
    kinded(
        ErrorKind::SwampNotRegistered,
        format!("no pattern registered matching '{}'", name),
    )
}

pub fn swamp_not_found(name: impl std::fmt::Display) -> Error {
    kinded(ErrorKind::SwampNotFound, format!("swamp '{}' does not exist", name))
}

pub fn key_not_found(key: impl std::fmt::Display) -> Error {
    kinded(ErrorKind::KeyNotFound, format!("key '{}' not found", key))
}

pub fn already_exists(key: impl std::fmt::Display) -> Error {
    kinded(ErrorKind::AlreadyExists, format!("key '{}' already exists", key))
}

pub fn wrong_type(msg: impl Into<Cow<'static, str>>) -> Error {
    kinded(ErrorKind::WrongType, msg)
}

pub fn condition_not_met(msg: impl Into<Cow<'static, str>>) -> Error {
    kinded(ErrorKind::ConditionNotMet, msg)
}

pub fn failed_precondition(msg: impl Into<Cow<'static, str>>) -> Error {
    kinded(ErrorKind::FailedPrecondition, msg)
}

#[test]
fn test_error() {
    let e = err("test error");
    assert_eq!(e.kind(), ErrorKind::Internal);
}

#[test]
fn test_kinded_error_roundtrips_kind() {
    let e = swamp_not_registered("s/r/w");
    assert_eq!(e.kind(), ErrorKind::SwampNotRegistered);
}
