use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::treasure::TreasureData;

/// The dimension a Beacon is ordered by (spec §4.D). `Value` covers every
/// `ValueT`/`ValueString` variant from the spec uniformly, since
/// [`crate::content_value::ContentValue`] already totally orders itself
/// across its variants — a Beacon only makes sense over Treasures that
/// share a content type, so cross-type comparison never actually happens
/// in practice.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    CreationTime,
    UpdateTime,
    ExpirationTime,
    Value,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Order {
    Asc,
    Desc,
}

/// Which save-time dimensions changed, used to decide which cached Beacons
/// a write must invalidate (spec §9's design note, answering the open
/// question it raises).
#[derive(Clone, Copy, Debug, Default)]
pub struct ChangedDims {
    pub value: bool,
    pub created_at: bool,
    pub modified_at: bool,
    pub expiration_time: bool,
}

impl IndexType {
    /// True if a write touching `dims` must invalidate a Beacon of this type.
    pub fn invalidated_by(&self, dims: &ChangedDims) -> bool {
        match self {
            IndexType::CreationTime => dims.created_at,
            IndexType::UpdateTime => dims.modified_at,
            IndexType::ExpirationTime => dims.expiration_time,
            IndexType::Value => dims.value,
        }
    }
}

/// A lazily-built, cached ordered view over a Swamp's Treasures (spec §4.D).
/// Ties are always broken by Key ascending, for determinism.
#[derive(Clone, Debug)]
pub struct Beacon {
    order: Order,
    /// Keys in final (already-ordered, tie-broken) order.
    keys: Vec<String>,
}

impl Beacon {
    pub fn build(treasures: &BTreeMap<String, TreasureData>, index_type: IndexType, order: Order) -> Self {
        let mut entries: Vec<(&String, &TreasureData)> = treasures.iter().collect();
        entries.sort_by(|(ka, a), (kb, b)| Self::compare(index_type, a, b).then_with(|| ka.cmp(kb)));
        let mut keys: Vec<String> = entries.into_iter().map(|(k, _)| k.clone()).collect();
        if order == Order::Desc {
            keys.reverse();
            // A plain reverse also reverses the Key tie-break; restore
            // ascending-key order within each tied run so ties are always
            // Key-ascending regardless of the requested Order.
            Self::restore_tie_breaks(&mut keys, treasures, index_type);
        }
        Beacon { order, keys }
    }

    fn restore_tie_breaks(keys: &mut [String], treasures: &BTreeMap<String, TreasureData>, index_type: IndexType) {
        let mut i = 0;
        while i < keys.len() {
            let mut j = i + 1;
            while j < keys.len()
                && Self::compare(index_type, &treasures[&keys[i]], &treasures[&keys[j]]) == std::cmp::Ordering::Equal
            {
                j += 1;
            }
            keys[i..j].sort();
            i = j;
        }
    }

    fn compare(index_type: IndexType, a: &TreasureData, b: &TreasureData) -> std::cmp::Ordering {
        match index_type {
            IndexType::CreationTime => a.created_at.cmp(&b.created_at),
            IndexType::UpdateTime => a.modified_at.cmp(&b.modified_at),
            IndexType::ExpirationTime => a.expiration_time.cmp(&b.expiration_time),
            IndexType::Value => a.value.cmp(&b.value),
        }
    }

    pub fn order(&self) -> Order {
        self.order
    }

    /// `from` is an offset into the ordered view; `limit == 0` means "all
    /// remaining".
    pub fn query(&self, from: usize, limit: usize) -> &[String] {
        if from >= self.keys.len() {
            return &[];
        }
        let end = if limit == 0 {
            self.keys.len()
        } else {
            (from + limit).min(self.keys.len())
        };
        &self.keys[from..end]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::content_value::ContentValue;
    use chrono::{Duration, Utc};

    fn data_at(offset_secs: i64) -> TreasureData {
        TreasureData {
            value: ContentValue::Int32(0),
            created_at: Some(Utc::now() + Duration::seconds(offset_secs)),
            ..Default::default()
        }
    }

    #[test]
    fn asc_orders_by_creation_time_then_key() {
        let mut m = BTreeMap::new();
        m.insert("b".to_string(), data_at(1));
        m.insert("a".to_string(), data_at(1));
        m.insert("c".to_string(), data_at(0));
        let beacon = Beacon::build(&m, IndexType::CreationTime, Order::Asc);
        assert_eq!(beacon.query(0, 0), &["c".to_string(), "a".to_string(), "b".to_string()]);
    }

    #[test]
    fn desc_reverses_but_ties_stay_key_ascending() {
        let mut m = BTreeMap::new();
        m.insert("b".to_string(), data_at(1));
        m.insert("a".to_string(), data_at(1));
        m.insert("c".to_string(), data_at(0));
        let beacon = Beacon::build(&m, IndexType::CreationTime, Order::Desc);
        assert_eq!(beacon.query(0, 0), &["a".to_string(), "b".to_string(), "c".to_string()]);
    }

    #[test]
    fn query_limit_zero_means_all_remaining() {
        let mut m = BTreeMap::new();
        for i in 0..5 {
            m.insert(format!("k{i}"), data_at(i));
        }
        let beacon = Beacon::build(&m, IndexType::CreationTime, Order::Asc);
        assert_eq!(beacon.query(2, 0).len(), 3);
        assert_eq!(beacon.query(10, 0).len(), 0);
    }

    #[test]
    fn invalidation_table_matches_dimension() {
        assert!(IndexType::Value.invalidated_by(&ChangedDims {
            value: true,
            ..Default::default()
        }));
        assert!(!IndexType::Value.invalidated_by(&ChangedDims {
            modified_at: true,
            ..Default::default()
        }));
        assert!(IndexType::UpdateTime.invalidated_by(&ChangedDims {
            modified_at: true,
            ..Default::default()
        }));
    }
}
