//! Property bag helpers. Target entities carry a JSON object whose
//! `legacy_id` key is the only link back to the legacy record.

use serde_json::Value;

use crate::store::Properties;

pub const EXTERNAL_ID_KEY: &str = "legacy_id";

/// Union merge: keys in `updates` overwrite, every other existing key survives.
pub fn merge(existing: &mut Properties, updates: Properties) {
    for (k, v) in updates {
        existing.insert(k, v);
    }
}

pub fn external_id(props: &Properties) -> Option<i64> {
    match props.get(EXTERNAL_ID_KEY)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Small builder so call sites read as a list of assignments.
#[derive(Debug, Default)]
pub struct Patch(Properties);

impl Patch {
    pub fn new(external_id: i64) -> Self {
        let mut p = Properties::new();
        p.insert(EXTERNAL_ID_KEY.to_string(), Value::from(external_id));
        Self(p)
    }

    pub fn set(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.0.insert(key.to_string(), value.into());
        self
    }

    pub fn set_opt<V: Into<Value>>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(v) => self.set(key, v),
            None => self,
        }
    }

    pub fn apply(self, target: &mut Properties) {
        merge(target, self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn obj(v: Value) -> Properties {
        match v {
            Value::Object(m) => m,
            _ => unreachable!(),
        }
    }

    #[test]
    fn merge_keeps_unrelated_keys() {
        let mut existing = obj(json!({"legacy_id": 1, "curated": "yes", "duration": 10}));
        Patch::new(1).set("duration", 20).apply(&mut existing);
        assert_eq!(existing["curated"], json!("yes"));
        assert_eq!(existing["duration"], json!(20));
        assert_eq!(existing["legacy_id"], json!(1));
    }

    #[test]
    fn set_opt_skips_none() {
        let mut p = Properties::new();
        Patch::new(5)
            .set_opt::<i64>("duration", None)
            .set_opt("film_date", Some("2017-01-02"))
            .apply(&mut p);
        assert!(!p.contains_key("duration"));
        assert_eq!(p["film_date"], json!("2017-01-02"));
    }

    #[test]
    fn external_id_accepts_numbers_and_strings() {
        assert_eq!(external_id(&obj(json!({"legacy_id": 42}))), Some(42));
        assert_eq!(external_id(&obj(json!({"legacy_id": "43"}))), Some(43));
        assert_eq!(external_id(&obj(json!({"other": 1}))), None);
    }
}
