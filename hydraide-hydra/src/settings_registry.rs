use std::sync::RwLock;

use hydraide_base::{already_exists, swamp_not_registered, Name, Result, SwampPattern};
use hydraide_storage::SwampSettings;

/// The pattern registry (spec §4.G): maps a [`SwampPattern`] (which may carry
/// wildcard segments) onto the [`SwampSettings`] every matching Swamp is
/// hydrated/created with. Lookups resolve by longest match per
/// [`SwampPattern::specificity`]'s positional ranking, ties (only possible
/// between identical patterns, which `register_pattern` already rejects)
/// broken by registration order.
#[derive(Default)]
pub struct SettingsRegistry {
    patterns: RwLock<Vec<(SwampPattern, SwampSettings)>>,
}

impl SettingsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_pattern(&self, pattern: SwampPattern, settings: SwampSettings) -> Result<()> {
        let mut patterns = self.patterns.write().unwrap();
        if patterns.iter().any(|(p, _)| *p == pattern) {
            return Err(already_exists(pattern.to_string()));
        }
        patterns.push((pattern, settings));
        Ok(())
    }

    pub fn deregister_pattern(&self, pattern: &SwampPattern) -> Result<()> {
        let mut patterns = self.patterns.write().unwrap();
        let before = patterns.len();
        patterns.retain(|(p, _)| p != pattern);
        if patterns.len() == before {
            return Err(swamp_not_registered(pattern.to_string()));
        }
        Ok(())
    }

    /// Most specific pattern matching `name`. On a specificity tie, the
    /// first-registered pattern wins — re-registering an equally specific
    /// pattern is a caller configuration error, not something to silently
    /// let the newest registration win.
    pub fn lookup(&self, name: &Name) -> Result<(SwampPattern, SwampSettings)> {
        let patterns = self.patterns.read().unwrap();
        let mut best: Option<(u8, usize)> = None;
        for (i, (pattern, _)) in patterns.iter().enumerate() {
            if !pattern.matches(name) {
                continue;
            }
            let specificity = pattern.specificity();
            match best {
                Some((best_specificity, _)) if best_specificity >= specificity => {}
                _ => best = Some((specificity, i)),
            }
        }
        match best {
            Some((_, i)) => Ok(patterns[i].clone()),
            None => Err(swamp_not_registered(name.get())),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::time::Duration;

    fn settings() -> SwampSettings {
        SwampSettings::new(true, Duration::ZERO, Duration::from_secs(1), 1 << 20).unwrap()
    }

    #[test]
    fn lookup_prefers_exact_over_wildcard() {
        let registry = SettingsRegistry::new();
        registry
            .register_pattern(SwampPattern::parse("dizzlets/*/*").unwrap(), settings())
            .unwrap();
        registry
            .register_pattern(SwampPattern::parse("dizzlets/testing/set-and-get").unwrap(), settings())
            .unwrap();

        let name = Name::load("dizzlets/testing/set-and-get").unwrap();
        let (pattern, _) = registry.lookup(&name).unwrap();
        assert_eq!(pattern.to_string(), "dizzlets/testing/set-and-get");
    }

    #[test]
    fn lookup_on_tie_prefers_first_registered() {
        let registry = SettingsRegistry::new();
        registry
            .register_pattern(SwampPattern::parse("a/*/*").unwrap(), settings())
            .unwrap();
        registry
            .register_pattern(SwampPattern::parse("*/b/*").unwrap(), settings())
            .unwrap();

        let name = Name::load("a/b/c").unwrap();
        let (pattern, _) = registry.lookup(&name).unwrap();
        assert_eq!(pattern.to_string(), "a/*/*");
    }

    #[test]
    fn lookup_on_no_match_is_swamp_not_registered() {
        let registry = SettingsRegistry::new();
        let name = Name::load("a/b/c").unwrap();
        assert!(registry.lookup(&name).is_err());
    }

    #[test]
    fn registering_the_same_pattern_twice_is_rejected() {
        let registry = SettingsRegistry::new();
        let pattern = SwampPattern::parse("a/b/c").unwrap();
        registry.register_pattern(pattern.clone(), settings()).unwrap();
        assert!(registry.register_pattern(pattern, settings()).is_err());
    }
}
