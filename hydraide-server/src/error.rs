//! Core error kind -> transport status code mapping (spec §7).

use hydraide_base::{Error, ErrorKind};
use tonic::Status;

pub fn to_status(err: Error) -> Status {
    let kind = err.kind();
    let msg = format!("{err:?}");
    match kind {
        ErrorKind::Connection => Status::unavailable(msg),
        ErrorKind::CtxTimeout => Status::deadline_exceeded(msg),
        ErrorKind::CtxClosedByClient => Status::cancelled(msg),
        ErrorKind::InvalidArgument => Status::invalid_argument(msg),
        ErrorKind::SwampNotRegistered => Status::failed_precondition(msg),
        ErrorKind::SwampNotFound => Status::not_found(msg),
        ErrorKind::KeyNotFound => Status::not_found(msg),
        ErrorKind::AlreadyExists => Status::already_exists(msg),
        ErrorKind::WrongType => Status::invalid_argument(msg),
        ErrorKind::ConditionNotMet => Status::failed_precondition(msg),
        ErrorKind::FailedPrecondition => Status::failed_precondition(msg),
        ErrorKind::Internal => Status::internal(msg),
    }
}
