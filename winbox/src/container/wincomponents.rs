//! Comma-separated `key=value` sets (Windows component toggles).

/// Ordered `key=value` pairs parsed from `a=1,b=0`.
///
/// Entries without `=` are skipped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValueSet {
    entries: Vec<(String, String)>,
}

impl KeyValueSet {
    pub fn parse(data: &str) -> Self {
        let entries = data
            .split(',')
            .filter_map(|item| item.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .filter(|(k, _)| !k.is_empty())
            .collect();
        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Replace the value of `key`, appending it when absent.
    pub fn put(&mut self, key: &str, value: &str) {
        match self.entries.iter_mut().find(|(k, _)| k == key) {
            Some(entry) => entry.1 = value.to_string(),
            None => self.entries.push((key.to_string(), value.to_string())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl std::fmt::Display for KeyValueSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, (k, v)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        Ok(())
    }
}

/// Overlay `stored` onto `defaults`: every default key in default order,
/// with the stored value where present. Stored keys unknown to the
/// defaults are dropped.
pub fn merge_onto_defaults(defaults: &str, stored: &str) -> String {
    let stored = KeyValueSet::parse(stored);
    let mut merged = KeyValueSet::parse(defaults);
    let keys: Vec<String> = merged.iter().map(|(k, _)| k.to_string()).collect();
    for key in keys {
        if let Some(value) = stored.get(&key) {
            merged.put(&key, value);
        }
    }
    merged.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::DEFAULT_WINCOMPONENTS;

    #[test]
    fn test_parse_and_display() {
        let set = KeyValueSet::parse("direct3d=1, opengl=0,broken,=x");
        assert_eq!(set.get("opengl"), Some("0"));
        assert_eq!(set.to_string(), "direct3d=1,opengl=0");
    }

    #[test]
    fn test_merge_empty_yields_defaults() {
        assert_eq!(
            merge_onto_defaults(DEFAULT_WINCOMPONENTS, ""),
            DEFAULT_WINCOMPONENTS
        );
    }

    #[test]
    fn test_merge_partial_keeps_default_keys_only() {
        let merged = merge_onto_defaults(DEFAULT_WINCOMPONENTS, "opengl=1,directmusic=1,legacy=1");
        let merged = KeyValueSet::parse(&merged);
        let defaults = KeyValueSet::parse(DEFAULT_WINCOMPONENTS);

        assert_eq!(merged.iter().count(), defaults.iter().count());
        for (key, default_value) in defaults.iter() {
            let expected = match key {
                "opengl" | "directmusic" => "1",
                _ => default_value,
            };
            assert_eq!(merged.get(key), Some(expected), "key {}", key);
        }
        assert_eq!(merged.get("legacy"), None);
    }
}
