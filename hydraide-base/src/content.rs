use serde::{Deserialize, Serialize};

/// The type tag of a Treasure's payload (spec §3). Set on first
/// `set_content*` call and immutable thereafter for that Treasure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ContentType {
    Void = 0,
    Bool = 1,
    Int8 = 2,
    Int16 = 3,
    Int32 = 4,
    Int64 = 5,
    Uint8 = 6,
    Uint16 = 7,
    Uint32 = 8,
    Uint64 = 9,
    Float32 = 10,
    Float64 = 11,
    String = 12,
    ByteArray = 13,
    Uint32Slice = 14,
}

impl ContentType {
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            ContentType::Int8
                | ContentType::Int16
                | ContentType::Int32
                | ContentType::Int64
                | ContentType::Uint8
                | ContentType::Uint16
                | ContentType::Uint32
                | ContentType::Uint64
                | ContentType::Float32
                | ContentType::Float64
        )
    }
}
