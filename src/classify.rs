use std::fmt;

use http::StatusCode;

use crate::descriptor::{FailureAction, RequestDescriptor};
use crate::error::CustomError;
use crate::status::StatusKind;

/// Terminal failure chosen by the classifier.
#[derive(Clone)]
pub enum Failure {
    Status(StatusKind),
    Custom(CustomError),
}

impl fmt::Debug for Failure {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(kind) => formatter.debug_tuple("Status").field(kind).finish(),
            Self::Custom(error) => formatter
                .debug_tuple("Custom")
                .field(&error.to_string())
                .finish(),
        }
    }
}

#[derive(Clone, Debug)]
pub enum ResultBehavior {
    Decode,
    ThrowError(Failure),
    RefreshCredential,
}

/// Maps a status to the next step of a call. Pure: no I/O and no body access.
pub fn classify(status: StatusCode, descriptor: &RequestDescriptor) -> ResultBehavior {
    if descriptor.is_success(status) {
        return ResultBehavior::Decode;
    }
    match descriptor.failure_action(status) {
        FailureAction::Default => {
            ResultBehavior::ThrowError(Failure::Status(StatusKind::from_code(status.as_u16())))
        }
        FailureAction::ThrowError(error) => ResultBehavior::ThrowError(Failure::Custom(error)),
        FailureAction::RefreshCredential => ResultBehavior::RefreshCredential,
    }
}
