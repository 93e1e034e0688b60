mod content;
mod error;
mod name;
mod relop;

pub use content::ContentType;
pub use error::{
    already_exists, condition_not_met, err, failed_precondition, invalid_argument, key_not_found,
    kinded, swamp_not_found, swamp_not_registered, wrong_type, Error, ErrorKind, Result,
};
pub use name::{Name, NameBuilder, Segment, SwampPattern, SEPARATOR};
pub use relop::RelOp;
