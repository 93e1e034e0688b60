use std::cell::OnceCell;
use std::fmt;

use crate::error::{invalid_argument, Result};

/// The path separator is reserved and may not appear inside a segment.
pub const SEPARATOR: char = '/';

/// One segment of a [`Name`] or [`SwampPattern`]: either a literal label or,
/// for patterns only, a `*` wildcard.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Segment {
    Exact(String),
    Wildcard,
}

impl Segment {
    fn parse(s: &str) -> Result<Self> {
        if s.is_empty() {
            return Err(invalid_argument("name segment must not be empty"));
        }
        if s.contains(SEPARATOR) {
            return Err(invalid_argument(format!(
                "name segment '{s}' must not contain '{SEPARATOR}'"
            )));
        }
        if s == "*" {
            Ok(Segment::Wildcard)
        } else {
            Ok(Segment::Exact(s.to_string()))
        }
    }

    fn as_str(&self) -> &str {
        match self {
            Segment::Exact(s) => s.as_str(),
            Segment::Wildcard => "*",
        }
    }

    fn is_wildcard(&self) -> bool {
        matches!(self, Segment::Wildcard)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three-level hierarchical name of a Swamp: `sanctuary/realm/swamp`.
///
/// Equality is by the tuple. A concrete `Name` never contains wildcard
/// segments; use [`SwampPattern`] for that.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name {
    sanctuary: String,
    realm: String,
    swamp: String,
    island_id: OnceCellClone,
}

/// `OnceCell<u64>` isn't `Clone`/`PartialEq`/`Hash` on its own, so we wrap it
/// to opt the memoized field out of those derives' notion of equality: two
/// `Name`s are equal iff their tuples are equal, regardless of whether either
/// has already memoized its island id.
#[derive(Clone, Debug, Default)]
struct OnceCellClone(OnceCell<u64>);
impl PartialEq for OnceCellClone {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}
impl Eq for OnceCellClone {}
impl PartialOrd for OnceCellClone {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for OnceCellClone {
    fn cmp(&self, _other: &Self) -> std::cmp::Ordering {
        std::cmp::Ordering::Equal
    }
}
impl std::hash::Hash for OnceCellClone {
    fn hash<H: std::hash::Hasher>(&self, _state: &mut H) {}
}

#[derive(Default)]
pub struct NameBuilder {
    sanctuary: Option<String>,
    realm: Option<String>,
    swamp: Option<String>,
}

impl Name {
    pub fn new() -> NameBuilder {
        NameBuilder::default()
    }

    /// Parses a canonical `sanctuary/realm/swamp` path.
    pub fn load(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.split(SEPARATOR).collect();
        let [sanctuary, realm, swamp] = parts.as_slice() else {
            return Err(invalid_argument(format!(
                "name '{path}' must have exactly 3 segments separated by '{SEPARATOR}'"
            )));
        };
        Name::new()
            .sanctuary(sanctuary)
            .realm(realm)
            .swamp(swamp)
            .build()
    }

    pub fn sanctuary(&self) -> &str {
        &self.sanctuary
    }
    pub fn realm(&self) -> &str {
        &self.realm
    }
    pub fn swamp(&self) -> &str {
        &self.swamp
    }

    /// Canonical path string, `sanctuary/realm/swamp`.
    pub fn get(&self) -> String {
        format!("{}{SEPARATOR}{}{SEPARATOR}{}", self.sanctuary, self.realm, self.swamp)
    }

    /// `xxhash64(sanctuary || realm || swamp) mod n + 1`, memoized per instance.
    ///
    /// `n` is a system-wide constant fixed at deployment time; changing it
    /// re-maps every existing Swamp's Island and must not be done against
    /// data already on disk.
    pub fn island_id(&self, n: u64) -> u64 {
        *self.island_id.0.get_or_init(|| {
            let mut buf = Vec::with_capacity(self.sanctuary.len() + self.realm.len() + self.swamp.len());
            buf.extend_from_slice(self.sanctuary.as_bytes());
            buf.extend_from_slice(self.realm.as_bytes());
            buf.extend_from_slice(self.swamp.as_bytes());
            xxhash_rust::xxh64::xxh64(&buf, 0) % n + 1
        })
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.get())
    }
}

impl NameBuilder {
    pub fn sanctuary(mut self, s: impl Into<String>) -> Self {
        self.sanctuary = Some(s.into());
        self
    }
    pub fn realm(mut self, s: impl Into<String>) -> Self {
        self.realm = Some(s.into());
        self
    }
    pub fn swamp(mut self, s: impl Into<String>) -> Self {
        self.swamp = Some(s.into());
        self
    }

    pub fn build(self) -> Result<Name> {
        let sanctuary = self.sanctuary.ok_or_else(|| invalid_argument("sanctuary is required"))?;
        let realm = self.realm.ok_or_else(|| invalid_argument("realm is required"))?;
        let swamp = self.swamp.ok_or_else(|| invalid_argument("swamp is required"))?;
        for s in [&sanctuary, &realm, &swamp] {
            if s.is_empty() {
                return Err(invalid_argument("name segments must not be empty"));
            }
            if s.contains(SEPARATOR) {
                return Err(invalid_argument(format!(
                    "name segment '{s}' must not contain '{SEPARATOR}'"
                )));
            }
        }
        Ok(Name {
            sanctuary,
            realm,
            swamp,
            island_id: OnceCellClone::default(),
        })
    }
}

/// A [`Name`] that may contain `*` at any of the three levels, registered via
/// `Settings::register_pattern` to configure a class of Swamps.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct SwampPattern {
    sanctuary: Segment,
    realm: Segment,
    swamp: Segment,
}

impl SwampPattern {
    pub fn parse(path: &str) -> Result<Self> {
        let parts: Vec<&str> = path.split(SEPARATOR).collect();
        let [sanctuary, realm, swamp] = parts.as_slice() else {
            return Err(invalid_argument(format!(
                "pattern '{path}' must have exactly 3 segments separated by '{SEPARATOR}'"
            )));
        };
        Ok(SwampPattern {
            sanctuary: Segment::parse(sanctuary)?,
            realm: Segment::parse(realm)?,
            swamp: Segment::parse(swamp)?,
        })
    }

    pub fn is_wildcard_pattern(&self) -> bool {
        self.sanctuary.is_wildcard() || self.realm.is_wildcard() || self.swamp.is_wildcard()
    }

    /// True if `name` satisfies every exact segment of this pattern.
    pub fn matches(&self, name: &Name) -> bool {
        Self::segment_matches(&self.sanctuary, name.sanctuary())
            && Self::segment_matches(&self.realm, name.realm())
            && Self::segment_matches(&self.swamp, name.swamp())
    }

    fn segment_matches(seg: &Segment, value: &str) -> bool {
        match seg {
            Segment::Wildcard => true,
            Segment::Exact(s) => s == value,
        }
    }

    /// Specificity score used for longest-match resolution. Ranked first by
    /// how many segments are exact, then positionally by which ones are
    /// (sanctuary outranks realm outranks swamp), reproducing spec §3's
    /// exact ordering `s/r/w > s/r/* > s/*/w > */r/w > s/*/* > */r/* >
    /// */*/w > */*/*`: a uniform exact=2/wildcard=1 sum would tie `s/r/*`,
    /// `s/*/w` and `*/r/w` at the same score instead.
    pub fn specificity(&self) -> u8 {
        let sanctuary_exact = !self.sanctuary.is_wildcard();
        let realm_exact = !self.realm.is_wildcard();
        let swamp_exact = !self.swamp.is_wildcard();
        let count_exact = sanctuary_exact as u8 + realm_exact as u8 + swamp_exact as u8;
        count_exact * 8 + (sanctuary_exact as u8) * 4 + (realm_exact as u8) * 2 + (swamp_exact as u8)
    }
}

impl fmt::Display for SwampPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}{SEPARATOR}{}", self.sanctuary, self.realm, self.swamp)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn island_id_is_deterministic_and_stable() {
        let a = Name::load("dizzlets/testing/set-and-get").unwrap();
        let b = Name::load("dizzlets/testing/set-and-get").unwrap();
        assert_eq!(a.island_id(1000), b.island_id(1000));
        assert_eq!(a.island_id(1000), a.island_id(1000));
    }

    #[test]
    fn island_id_in_range() {
        let n = Name::load("a/b/c").unwrap();
        let id = n.island_id(16);
        assert!((1..=16).contains(&id));
    }

    #[test]
    fn load_rejects_wrong_segment_count() {
        assert!(Name::load("a/b").is_err());
        assert!(Name::load("a/b/c/d").is_err());
    }

    #[test]
    fn pattern_specificity_orders_exact_over_wildcard() {
        let exact = SwampPattern::parse("s/r/w").unwrap();
        let one_wild = SwampPattern::parse("s/r/*").unwrap();
        let two_wild = SwampPattern::parse("s/*/*").unwrap();
        let three_wild = SwampPattern::parse("*/*/*").unwrap();
        assert!(exact.specificity() > one_wild.specificity());
        assert!(one_wild.specificity() > two_wild.specificity());
        assert!(two_wild.specificity() > three_wild.specificity());
    }

    #[test]
    fn pattern_specificity_breaks_ties_positionally_not_by_uniform_sum() {
        // spec.md's longest-match ordering within equal exact-counts:
        // s/r/* > s/*/w > */r/w, then s/*/* > */r/* > */*/w.
        let sr_star = SwampPattern::parse("s/r/*").unwrap();
        let s_star_w = SwampPattern::parse("s/*/w").unwrap();
        let star_r_w = SwampPattern::parse("*/r/w").unwrap();
        assert!(sr_star.specificity() > s_star_w.specificity());
        assert!(s_star_w.specificity() > star_r_w.specificity());

        let s_star_star = SwampPattern::parse("s/*/*").unwrap();
        let star_r_star = SwampPattern::parse("*/r/*").unwrap();
        let star_star_w = SwampPattern::parse("*/*/w").unwrap();
        assert!(star_r_w.specificity() > s_star_star.specificity());
        assert!(s_star_star.specificity() > star_r_star.specificity());
        assert!(star_r_star.specificity() > star_star_w.specificity());
    }

    #[test]
    fn pattern_matches_respects_wildcards() {
        let p = SwampPattern::parse("dizzlets/*/*").unwrap();
        let n = Name::load("dizzlets/testing/set-and-get").unwrap();
        assert!(p.matches(&n));
        let other = Name::load("other/testing/set-and-get").unwrap();
        assert!(!p.matches(&other));
    }

    #[test]
    fn name_equality_ignores_memoized_island_id() {
        let a = Name::load("a/b/c").unwrap();
        let b = Name::load("a/b/c").unwrap();
        let _ = a.island_id(10);
        assert_eq!(a, b);
    }
}
