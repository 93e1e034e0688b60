//! KeyValuePair <-> ContentValue/TreasureData, and the small enum/timestamp
//! mappings that ride along with them. These are plain functions rather
//! than `From`/`TryFrom` impls because the wire types live in a separate
//! generated module we don't own and several of these conversions are
//! fallible or need extra context (e.g. a key) the wire message alone
//! doesn't carry in a convenient shape.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hydraide_base::{invalid_argument, wrong_type, RelOp, Result};
use hydraide_storage::{ContentValue, Event, IndexType, InfoEvent, Order, StatusType, Treasure, TreasureData};

use crate::wire;

fn unix_nano(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub fn timestamp_to_wire(at: DateTime<Utc>) -> i64 {
    unix_nano(at)
}

pub fn timestamp_from_wire(nanos: i64) -> Result<DateTime<Utc>> {
    let secs = nanos.div_euclid(1_000_000_000);
    let nsecs = nanos.rem_euclid(1_000_000_000) as u32;
    DateTime::from_timestamp(secs, nsecs).ok_or_else(|| invalid_argument("timestamp out of range"))
}

pub fn duration_from_millis(ms: i64) -> Result<Duration> {
    if ms < 0 {
        return Err(invalid_argument("duration must not be negative"));
    }
    Ok(Duration::from_millis(ms as u64))
}

pub fn rel_op_to_wire(op: RelOp) -> wire::RelOp {
    match op {
        RelOp::Lt => wire::RelOp::Lt,
        RelOp::Le => wire::RelOp::Le,
        RelOp::Gt => wire::RelOp::Gt,
        RelOp::Ge => wire::RelOp::Ge,
        RelOp::Eq => wire::RelOp::Eq,
        RelOp::Ne => wire::RelOp::Ne,
    }
}

pub fn rel_op_from_wire(op: i32) -> Result<RelOp> {
    match wire::RelOp::try_from(op).unwrap_or(wire::RelOp::Unspecified) {
        wire::RelOp::Lt => Ok(RelOp::Lt),
        wire::RelOp::Le => Ok(RelOp::Le),
        wire::RelOp::Gt => Ok(RelOp::Gt),
        wire::RelOp::Ge => Ok(RelOp::Ge),
        wire::RelOp::Eq => Ok(RelOp::Eq),
        wire::RelOp::Ne => Ok(RelOp::Ne),
        wire::RelOp::Unspecified => Err(invalid_argument("relOp must be set")),
    }
}

pub fn index_type_to_wire(t: IndexType) -> wire::IndexType {
    match t {
        IndexType::CreationTime => wire::IndexType::CreationTime,
        IndexType::UpdateTime => wire::IndexType::UpdateTime,
        IndexType::ExpirationTime => wire::IndexType::ExpirationTime,
        IndexType::Value => wire::IndexType::Value,
    }
}

pub fn index_type_from_wire(t: i32) -> Result<IndexType> {
    match wire::IndexType::try_from(t).unwrap_or(wire::IndexType::Unspecified) {
        wire::IndexType::CreationTime => Ok(IndexType::CreationTime),
        wire::IndexType::UpdateTime => Ok(IndexType::UpdateTime),
        wire::IndexType::ExpirationTime => Ok(IndexType::ExpirationTime),
        wire::IndexType::Value => Ok(IndexType::Value),
        wire::IndexType::Unspecified => Err(invalid_argument("indexType must be set")),
    }
}

pub fn order_to_wire(o: Order) -> wire::OrderType {
    match o {
        Order::Asc => wire::OrderType::Asc,
        Order::Desc => wire::OrderType::Desc,
    }
}

pub fn order_from_wire(o: i32) -> Result<Order> {
    match wire::OrderType::try_from(o).unwrap_or(wire::OrderType::Unspecified) {
        wire::OrderType::Asc => Ok(Order::Asc),
        wire::OrderType::Desc => Ok(Order::Desc),
        wire::OrderType::Unspecified => Err(invalid_argument("orderType must be set")),
    }
}

pub fn status_type_to_wire(s: StatusType) -> wire::StatusType {
    match s {
        StatusType::New => wire::StatusType::New,
        StatusType::Modified => wire::StatusType::Updated,
        StatusType::Same => wire::StatusType::NothingChanged,
        StatusType::Deleted => wire::StatusType::Deleted,
    }
}

/// Converts a domain value into the wire oneof variant, dropping the key
/// and metadata (callers that need those fill in the rest of the
/// [`wire::KeyValuePair`] themselves, since not every call site has a key
/// to hand e.g. a bare increment result).
pub fn content_value_to_wire(value: &ContentValue) -> wire::key_value_pair::Value {
    use wire::key_value_pair::Value as W;
    match value {
        ContentValue::Void => W::Void(true),
        ContentValue::Bool(b) => W::BoolValue(*b),
        ContentValue::Int8(v) => W::Int8Value(*v as i32),
        ContentValue::Int16(v) => W::Int16Value(*v as i32),
        ContentValue::Int32(v) => W::Int32Value(*v),
        ContentValue::Int64(v) => W::Int64Value(*v),
        ContentValue::Uint8(v) => W::Uint8Value(*v as u32),
        ContentValue::Uint16(v) => W::Uint16Value(*v as u32),
        ContentValue::Uint32(v) => W::Uint32Value(*v),
        ContentValue::Uint64(v) => W::Uint64Value(*v),
        ContentValue::Float32(v) => W::Float32Value(v.0),
        ContentValue::Float64(v) => W::Float64Value(v.0),
        ContentValue::String(s) => W::StringValue(s.clone()),
        ContentValue::ByteArray(b) => W::BytesValue(b.clone()),
        ContentValue::Uint32Slice(set) => W::Uint32SliceValue(wire::Uint32Slice {
            values: set.iter().copied().collect(),
        }),
    }
}

pub fn content_value_from_wire(value: wire::key_value_pair::Value) -> Result<ContentValue> {
    use wire::key_value_pair::Value as W;
    Ok(match value {
        W::Void(_) => ContentValue::Void,
        W::BoolValue(b) => ContentValue::Bool(b),
        W::Int8Value(v) => ContentValue::Int8(
            i8::try_from(v).map_err(|_| wrong_type("int8Value out of range"))?,
        ),
        W::Int16Value(v) => ContentValue::Int16(
            i16::try_from(v).map_err(|_| wrong_type("int16Value out of range"))?,
        ),
        W::Int32Value(v) => ContentValue::Int32(v),
        W::Int64Value(v) => ContentValue::Int64(v),
        W::Uint8Value(v) => ContentValue::Uint8(
            u8::try_from(v).map_err(|_| wrong_type("uint8Value out of range"))?,
        ),
        W::Uint16Value(v) => ContentValue::Uint16(
            u16::try_from(v).map_err(|_| wrong_type("uint16Value out of range"))?,
        ),
        W::Uint32Value(v) => ContentValue::Uint32(v),
        W::Uint64Value(v) => ContentValue::Uint64(v),
        W::Float32Value(v) => ContentValue::Float32(v.into()),
        W::Float64Value(v) => ContentValue::Float64(v.into()),
        W::StringValue(s) => ContentValue::String(s),
        W::BytesValue(b) => ContentValue::ByteArray(b),
        W::Uint32SliceValue(slice) => ContentValue::Uint32Slice(slice.values.into_iter().collect()),
    })
}

/// Builds a full [`wire::KeyValuePair`] out of a domain Treasure, the
/// inverse of [`treasure_data_from_wire`].
pub fn treasure_to_wire(treasure: &Treasure) -> wire::KeyValuePair {
    wire::KeyValuePair {
        key: treasure.key.clone(),
        value: Some(content_value_to_wire(&treasure.data.value)),
        created_at_unix_nano: treasure.data.created_at.map(timestamp_to_wire),
        created_by: treasure.data.created_by.clone(),
        modified_at_unix_nano: treasure.data.modified_at.map(timestamp_to_wire),
        modified_by: treasure.data.modified_by.clone(),
        expires_at_unix_nano: treasure.data.expiration_time.map(timestamp_to_wire),
    }
}

/// Parses a wire `KeyValuePair` back into `(key, TreasureData)`. Timestamps
/// set by the caller (created/modified at+by) are honored verbatim;
/// `Swamp::save` fills in anything left unset.
pub fn treasure_data_from_wire(kvp: wire::KeyValuePair) -> Result<(String, TreasureData)> {
    let value = kvp
        .value
        .ok_or_else(|| invalid_argument("keyValuePair must carry a value"))?;
    let data = TreasureData {
        value: content_value_from_wire(value)?,
        created_at: kvp.created_at_unix_nano.map(timestamp_from_wire).transpose()?,
        created_by: kvp.created_by,
        modified_at: kvp.modified_at_unix_nano.map(timestamp_from_wire).transpose()?,
        modified_by: kvp.modified_by,
        expiration_time: kvp.expires_at_unix_nano.map(timestamp_from_wire).transpose()?,
    };
    Ok((kvp.key, data))
}

pub fn event_to_wire(event: &Event) -> wire::Event {
    wire::Event {
        swamp_name: event.swamp_name.clone(),
        status: status_type_to_wire(event.status) as i32,
        event_time_unix_nano: timestamp_to_wire(event.event_time),
        treasure: event.treasure.as_ref().map(treasure_to_wire),
        old_treasure: event.old_treasure.as_ref().map(treasure_to_wire),
        deleted_treasure: event.deleted_treasure.as_ref().map(treasure_to_wire),
    }
}

pub fn info_event_to_wire(event: InfoEvent) -> wire::InfoEvent {
    wire::InfoEvent {
        count: event.count as u64,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use chrono::Duration as ChronoDuration;

    #[test]
    fn content_value_roundtrips_through_the_wire_oneof() {
        let original = ContentValue::Int32(-7);
        let wire_value = content_value_to_wire(&original);
        let back = content_value_from_wire(wire_value).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn uint32_slice_roundtrips_as_a_set() {
        let original = ContentValue::Uint32Slice([1, 2, 3].into_iter().collect());
        let wire_value = content_value_to_wire(&original);
        let back = content_value_from_wire(wire_value).unwrap();
        assert_eq!(original, back);
    }

    #[test]
    fn out_of_range_int8_is_rejected() {
        let bad = wire::key_value_pair::Value::Int8Value(200);
        assert!(content_value_from_wire(bad).is_err());
    }

    #[test]
    fn timestamp_roundtrips_to_nanosecond_precision() {
        let at = Utc::now() - ChronoDuration::days(1);
        let nanos = timestamp_to_wire(at);
        let back = timestamp_from_wire(nanos).unwrap();
        assert_eq!(at.timestamp_nanos_opt(), back.timestamp_nanos_opt());
    }

    #[test]
    fn rel_op_roundtrips() {
        for op in [RelOp::Lt, RelOp::Le, RelOp::Gt, RelOp::Ge, RelOp::Eq, RelOp::Ne] {
            let wire_op = rel_op_to_wire(op);
            assert_eq!(rel_op_from_wire(wire_op as i32).unwrap(), op);
        }
    }

    #[test]
    fn unspecified_rel_op_is_rejected() {
        assert!(rel_op_from_wire(wire::RelOp::Unspecified as i32).is_err());
    }
}
