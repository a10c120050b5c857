use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Determines which metadata fields the panel interprets for a process.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ProcessKind {
    Timer,
    Media,
    Generic,
}

/// Styling hint for action buttons; carries no behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Primary,
    Secondary,
    Danger,
}

/// Primitive metadata value. Writers put numbers and short strings here;
/// the panel decides how to render them based on the process kind.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MetaValue {
    Number(f64),
    Text(String),
}

impl MetaValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            MetaValue::Number(n) => Some(*n),
            MetaValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetaValue::Text(s) => Some(s.as_str()),
            MetaValue::Number(_) => None,
        }
    }
}

impl From<i64> for MetaValue {
    fn from(value: i64) -> Self {
        MetaValue::Number(value as f64)
    }
}

impl From<u32> for MetaValue {
    fn from(value: u32) -> Self {
        MetaValue::Number(f64::from(value))
    }
}

impl From<f64> for MetaValue {
    fn from(value: f64) -> Self {
        MetaValue::Number(value)
    }
}

impl From<&str> for MetaValue {
    fn from(value: &str) -> Self {
        MetaValue::Text(value.to_string())
    }
}

impl From<String> for MetaValue {
    fn from(value: String) -> Self {
        MetaValue::Text(value)
    }
}

pub type ActivityMeta = BTreeMap<String, MetaValue>;

/// A control advertised by a process. Dispatch always goes through the
/// action runner registry by (process id, action id); the descriptor itself
/// carries no callback so it stays cheap to clone and compare.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityAction {
    pub id: String,
    pub label: String,
    pub kind: ActionKind,
}

/// The unit of visible state in the activity panel: one entry per tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ActivityProcess {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ProcessKind,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<ActivityMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actions: Option<Vec<ActivityAction>>,
    /// Epoch ms of the last update. Display only, never used for eviction.
    pub updated_at: i64,
}

impl ActivityProcess {
    /// Shallow merge: required fields always take the update's value, the
    /// optional fields only when the update carries them. `meta` and
    /// `actions` are replaced wholesale; writers redescribe them fully on
    /// every update, so there is no deep merge.
    pub fn merge_from(&mut self, update: ActivityProcess) {
        debug_assert_eq!(self.id, update.id);
        self.kind = update.kind;
        self.label = update.label;
        self.updated_at = update.updated_at;
        if update.status.is_some() {
            self.status = update.status;
        }
        if update.meta.is_some() {
            self.meta = update.meta;
        }
        if update.actions.is_some() {
            self.actions = update.actions;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(pairs: &[(&str, MetaValue)]) -> ActivityMeta {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn merge_overwrites_present_fields_and_keeps_absent_ones() {
        let mut existing = ActivityProcess {
            id: "p".into(),
            kind: ProcessKind::Timer,
            label: "Old".into(),
            status: Some("running".into()),
            meta: Some(meta(&[("secondsLeft", 90_i64.into())])),
            actions: None,
            updated_at: 1_000,
        };

        existing.merge_from(ActivityProcess {
            id: "p".into(),
            kind: ProcessKind::Timer,
            label: "New".into(),
            status: None,
            meta: None,
            actions: None,
            updated_at: 2_000,
        });

        assert_eq!(existing.label, "New");
        assert_eq!(existing.updated_at, 2_000);
        // Fields absent from the update survive.
        assert_eq!(existing.status.as_deref(), Some("running"));
        assert_eq!(
            existing.meta.unwrap().get("secondsLeft"),
            Some(&MetaValue::Number(90.0))
        );
    }

    #[test]
    fn merge_replaces_meta_wholesale() {
        let mut existing = ActivityProcess {
            id: "p".into(),
            kind: ProcessKind::Generic,
            label: "Task".into(),
            status: None,
            meta: Some(meta(&[("elapsedMs", 500_i64.into()), ("category", "cs".into())])),
            actions: None,
            updated_at: 0,
        };

        existing.merge_from(ActivityProcess {
            id: "p".into(),
            kind: ProcessKind::Generic,
            label: "Task".into(),
            status: None,
            meta: Some(meta(&[("elapsedMs", 900_i64.into())])),
            actions: None,
            updated_at: 1,
        });

        let merged = existing.meta.unwrap();
        assert_eq!(merged.get("elapsedMs"), Some(&MetaValue::Number(900.0)));
        // No deep merge: keys missing from the new meta are gone.
        assert!(merged.get("category").is_none());
    }

    #[test]
    fn meta_value_converts_from_suffixed_numbers_and_strings() {
        assert_eq!(MetaValue::from(90_i64), MetaValue::Number(90.0));
        assert_eq!(MetaValue::from(7_u32), MetaValue::Number(7.0));
        assert_eq!(MetaValue::from(1.5), MetaValue::Number(1.5));
        assert_eq!(MetaValue::from("work"), MetaValue::Text("work".into()));
        assert_eq!(
            MetaValue::from(String::from("cs")),
            MetaValue::Text("cs".into())
        );
    }

    #[test]
    fn meta_value_serializes_untagged() {
        let m = meta(&[("mode", "work".into()), ("secondsLeft", 45_i64.into())]);
        let json = serde_json::to_string(&m).unwrap();
        assert_eq!(json, r#"{"mode":"work","secondsLeft":45.0}"#);
    }
}
