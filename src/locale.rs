//! Embedded message catalog for user-facing notices.
//!
//! Messages live in `locales/<lang>.yaml` under a top-level language key and are
//! addressed by dotted paths, e.g. `t("unauthorized.default")`.

use serde_yaml::Value;
use std::collections::HashMap;
use std::sync::OnceLock;

const DEFAULT_LOCALE: &str = "en";

const CATALOGS: &[(&str, &str)] = &[("en", include_str!("locales/en.yaml"))];

static MESSAGES: OnceLock<HashMap<String, String>> = OnceLock::new();

fn flatten(prefix: &str, value: &Value, out: &mut HashMap<String, String>) {
    match value {
        Value::Mapping(map) => {
            for (key, child) in map {
                let Some(key) = key.as_str() else { continue };
                let path = if prefix.is_empty() {
                    key.to_string()
                } else {
                    format!("{}.{}", prefix, key)
                };
                flatten(&path, child, out);
            }
        }
        Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        _ => {}
    }
}

fn messages() -> &'static HashMap<String, String> {
    MESSAGES.get_or_init(|| {
        let mut out = HashMap::new();
        for (name, source) in CATALOGS {
            match serde_yaml::from_str::<Value>(source) {
                Ok(value) => flatten("", &value, &mut out),
                Err(e) => tracing::error!(locale = name, error = %e, "failed to parse locale catalog"),
            }
        }
        out
    })
}

/// Looks up `key` in the default locale.
pub fn t(key: &str) -> String {
    let path = format!("{}.{}", DEFAULT_LOCALE, key);
    messages()
        .get(&path)
        .cloned()
        .unwrap_or_else(|| format!("translation missing: {}", path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_nested_keys() {
        assert_eq!(t("unauthorized.default"), "You are not authorized to access this page.");
        assert_eq!(t("books.name_blank"), "name can't be blank");
    }

    #[test]
    fn missing_key_is_reported_not_panicking() {
        assert_eq!(t("nope.nothing"), "translation missing: en.nope.nothing");
    }
}
