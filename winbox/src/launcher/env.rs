//! Ordered environment-variable set.

use std::fmt;

/// Insertion-ordered `KEY=VALUE` set; re-putting a key keeps its slot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    entries: Vec<(String, String)>,
}

impl EnvVars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a space-separated `K=V K=V` overlay. Entries without `=` are dropped.
    pub fn parse(data: &str) -> Self {
        let mut vars = Self::new();
        for item in data.split_whitespace() {
            if let Some((key, value)) = item.split_once('=')
                && !key.is_empty()
            {
                vars.put(key, value);
            }
        }
        vars
    }

    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn put_all(&mut self, other: &EnvVars) {
        for (key, value) in &other.entries {
            self.put(key.as_str(), value.as_str());
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) {
        self.entries.retain(|(k, _)| k != key);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Entries in the form the process API takes.
    pub fn to_strings(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut vars = Self::new();
        for (key, value) in iter {
            vars.put(key, value);
        }
        vars
    }
}

impl fmt::Display for EnvVars {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_strings().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_replaces_in_place() {
        let mut vars = EnvVars::new();
        vars.put("A", "1");
        vars.put("B", "2");
        vars.put("A", "3");
        assert_eq!(vars.to_strings(), vec!["A=3", "B=2"]);
    }

    #[test]
    fn test_parse_overlay() {
        let vars = EnvVars::parse("WINEESYNC=1  DXVK_HUD=fps,gpuload bogus =x");
        assert_eq!(vars.get("WINEESYNC"), Some("1"));
        assert_eq!(vars.get("DXVK_HUD"), Some("fps,gpuload"));
        assert_eq!(vars.len(), 2);
        assert_eq!(vars.to_string(), "WINEESYNC=1 DXVK_HUD=fps,gpuload");
    }

    #[test]
    fn test_put_all_later_wins() {
        let mut base: EnvVars = [("HOME", "/a"), ("USER", "x")].into_iter().collect();
        let overrides: EnvVars = [("HOME", "/b")].into_iter().collect();
        base.put_all(&overrides);
        assert_eq!(base.get("HOME"), Some("/b"));
        assert_eq!(base.get("USER"), Some("x"));
    }
}
