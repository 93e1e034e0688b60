use std::collections::BTreeSet;

use hydraide_base::{wrong_type, ContentType, Error, Result};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

/// The typed payload of a Treasure (spec §3). `Uint32Slice` is stored as a
/// `BTreeSet` so push/delete are idempotent set operations and the encoded
/// order is deterministic, even though the API contract only promises an
/// unordered set.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ContentValue {
    #[default]
    Void,
    Bool(bool),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Float32(OrderedFloat<f32>),
    Float64(OrderedFloat<f64>),
    String(String),
    ByteArray(Vec<u8>),
    Uint32Slice(BTreeSet<u32>),
}

impl ContentValue {
    pub fn content_type(&self) -> ContentType {
        match self {
            ContentValue::Void => ContentType::Void,
            ContentValue::Bool(_) => ContentType::Bool,
            ContentValue::Int8(_) => ContentType::Int8,
            ContentValue::Int16(_) => ContentType::Int16,
            ContentValue::Int32(_) => ContentType::Int32,
            ContentValue::Int64(_) => ContentType::Int64,
            ContentValue::Uint8(_) => ContentType::Uint8,
            ContentValue::Uint16(_) => ContentType::Uint16,
            ContentValue::Uint32(_) => ContentType::Uint32,
            ContentValue::Uint64(_) => ContentType::Uint64,
            ContentValue::Float32(_) => ContentType::Float32,
            ContentValue::Float64(_) => ContentType::Float64,
            ContentValue::String(_) => ContentType::String,
            ContentValue::ByteArray(_) => ContentType::ByteArray,
            ContentValue::Uint32Slice(_) => ContentType::Uint32Slice,
        }
    }
}

macro_rules! getter {
    ($name:ident, $variant:ident, $t:ty) => {
        pub fn $name(&self) -> Result<$t> {
            match self {
                ContentValue::$variant(v) => Ok(v.clone()),
                other => Err(wrong_type(format!(
                    "expected {:?}, treasure holds {:?}",
                    ContentType::$variant,
                    other.content_type()
                ))),
            }
        }
    };
}

impl ContentValue {
    getter!(as_bool, Bool, bool);
    getter!(as_i8, Int8, i8);
    getter!(as_i16, Int16, i16);
    getter!(as_i32, Int32, i32);
    getter!(as_i64, Int64, i64);
    getter!(as_u8, Uint8, u8);
    getter!(as_u16, Uint16, u16);
    getter!(as_u32, Uint32, u32);
    getter!(as_u64, Uint64, u64);
    getter!(as_string, String, String);
    getter!(as_bytes, ByteArray, Vec<u8>);
    getter!(as_uint32_slice, Uint32Slice, BTreeSet<u32>);

    pub fn as_f32(&self) -> Result<f32> {
        match self {
            ContentValue::Float32(v) => Ok(v.0),
            other => Err(wrong_type(format!(
                "expected Float32, treasure holds {:?}",
                other.content_type()
            ))),
        }
    }

    pub fn as_f64(&self) -> Result<f64> {
        match self {
            ContentValue::Float64(v) => Ok(v.0),
            other => Err(wrong_type(format!(
                "expected Float64, treasure holds {:?}",
                other.content_type()
            ))),
        }
    }
}

/// Checks that writing `new_type` onto a Treasure currently holding
/// `existing` is permitted: unset (Void, never written) accepts anything;
/// otherwise the type must match (spec §3 invariant ii).
pub fn check_type_transition(existing: ContentType, new_type: ContentType) -> Result<(), Error> {
    if existing == ContentType::Void || existing == new_type {
        Ok(())
    } else {
        Err(wrong_type(format!(
            "treasure already holds {existing:?}, cannot set {new_type:?}"
        )))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn wrong_variant_access_is_wrong_type() {
        let v = ContentValue::Int32(3);
        assert!(v.as_string().is_err());
        assert_eq!(v.as_i32().unwrap(), 3);
    }

    #[test]
    fn type_transition_allows_void_to_anything_but_locks_after() {
        assert!(check_type_transition(ContentType::Void, ContentType::Int32).is_ok());
        assert!(check_type_transition(ContentType::Int32, ContentType::Int32).is_ok());
        assert!(check_type_transition(ContentType::Int32, ContentType::String).is_err());
    }
}
