use hydraide_base::{err, Result};

use crate::treasure::TreasureData;

/// One chunk's worth of encoded Treasures: `(key, data)` pairs, MessagePack
/// encoded. Compression of the resulting bytes happens one layer down, in
/// `hydraide-fs` — this module only knows how to turn Treasures into bytes
/// and back (spec §4.B: "the adapter does not interpret them").
pub fn encode(entries: &[(String, TreasureData)]) -> Result<Vec<u8>> {
    rmp_serde::to_vec(entries).map_err(|e| err(format!("encode chunk: {e}")))
}

pub fn decode(bytes: &[u8]) -> Result<Vec<(String, TreasureData)>> {
    rmp_serde::from_slice(bytes).map_err(|e| err(format!("decode chunk: {e}")))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::content_value::ContentValue;

    #[test]
    fn encode_decode_roundtrips() {
        let entries = vec![(
            "k".to_string(),
            TreasureData {
                value: ContentValue::String("v".to_string()),
                ..Default::default()
            },
        )];
        let bytes = encode(&entries).unwrap();
        let back = decode(&bytes).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].0, "k");
    }
}
