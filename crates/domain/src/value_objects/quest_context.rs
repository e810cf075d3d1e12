//! Runtime context used to match arc steps against the current game situation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A single context value.
///
/// Deserializes from plain JSON: strings, arrays of strings, numbers and booleans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ContextValue {
    Text(String),
    List(Vec<String>),
    Number(f64),
    Flag(bool),
}

impl ContextValue {
    /// Equality or list containment against a tag value.
    pub fn matches(&self, expected: &str) -> bool {
        match self {
            ContextValue::Text(text) => text == expected,
            ContextValue::List(items) => items.iter().any(|item| item == expected),
            ContextValue::Number(n) => expected.parse::<f64>().is_ok_and(|v| v == *n),
            ContextValue::Flag(flag) => expected.parse::<bool>().is_ok_and(|v| v == *flag),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContextValue::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<&str> for ContextValue {
    fn from(value: &str) -> Self {
        ContextValue::Text(value.to_string())
    }
}

impl From<String> for ContextValue {
    fn from(value: String) -> Self {
        ContextValue::Text(value)
    }
}

impl From<Vec<String>> for ContextValue {
    fn from(value: Vec<String>) -> Self {
        ContextValue::List(value)
    }
}

/// Key/value snapshot of "where the party is right now":
/// location, nearby NPCs, active factions, skills in play.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestContext {
    values: BTreeMap<String, ContextValue>,
}

impl QuestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<ContextValue>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<ContextValue>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&ContextValue> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ContextValue)> {
        self.values.iter()
    }
}

impl FromIterator<(String, String)> for QuestContext {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter
                .into_iter()
                .map(|(k, v)| (k, ContextValue::Text(v)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_and_list_matching() {
        assert!(ContextValue::from("tavern").matches("tavern"));
        assert!(!ContextValue::from("tavern").matches("castle"));

        let npcs = ContextValue::from(vec!["merchant".to_string(), "guard".to_string()]);
        assert!(npcs.matches("guard"));
        assert!(!npcs.matches("priest"));
    }

    #[test]
    fn deserializes_from_plain_json() {
        let ctx: QuestContext = serde_json::from_str(
            r#"{"location": "forest", "npcs": ["hermit"], "danger": 3, "night": true}"#,
        )
        .unwrap();

        assert_eq!(ctx.len(), 4);
        assert!(ctx.get("location").unwrap().matches("forest"));
        assert!(ctx.get("npcs").unwrap().matches("hermit"));
        assert!(ctx.get("danger").unwrap().matches("3"));
        assert!(ctx.get("night").unwrap().matches("true"));
    }
}
