//! User record as returned by the API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// User record held in the session.
///
/// The API returns different subsets of the profile from different endpoints,
/// so the record is kept as an open JSON object and merged key by key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserRecord(Map<String, Value>);

impl UserRecord {
    /// Build a record from a JSON value; non-objects are rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    /// User ID, accepting either `id` or `_id`, string or number.
    pub fn id(&self) -> Option<String> {
        ["id", "_id"].iter().find_map(|key| match self.0.get(*key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        })
    }

    /// Email address, if present.
    pub fn email(&self) -> Option<&str> {
        self.get_str("email")
    }

    /// Username, if present.
    pub fn username(&self) -> Option<&str> {
        self.get_str("username")
    }

    /// Look up a string field.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Look up any field.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Overwrite fields present in `partial`, keeping everything else.
    pub fn merge(&mut self, partial: &UserRecord) {
        for (key, value) in &partial.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merge_keeps_missing_fields() {
        let mut user = UserRecord::from_value(json!({
            "id": "u1",
            "email": "a@example.com",
            "bio": "old",
            "followers": 10
        }))
        .unwrap();
        let partial = UserRecord::from_value(json!({ "bio": "new", "avatar": "x.png" })).unwrap();

        user.merge(&partial);

        assert_eq!(user.get_str("bio"), Some("new"));
        assert_eq!(user.get_str("avatar"), Some("x.png"));
        assert_eq!(user.email(), Some("a@example.com"));
        assert_eq!(user.get("followers"), Some(&json!(10)));
    }

    #[test]
    fn id_accepts_mongo_style_and_numbers() {
        let a = UserRecord::from_value(json!({ "_id": "abc" })).unwrap();
        let b = UserRecord::from_value(json!({ "id": 7 })).unwrap();
        assert_eq!(a.id().as_deref(), Some("abc"));
        assert_eq!(b.id().as_deref(), Some("7"));
        assert!(UserRecord::from_value(json!("nope")).is_none());
    }
}
