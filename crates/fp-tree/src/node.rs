use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// Canonical in-memory form of a fingerprint input tree. Deliberately not a
/// free-form JSON object: child order matters (positional diffing depends on
/// it) and only leaf nodes carry `values` — an interior node's meaning comes
/// entirely from its children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonNode {
    pub name: String,
    pub values: Vec<String>,
    pub children: Vec<JsonNode>,
}

impl JsonNode {
    pub fn leaf(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
            children: Vec::new(),
        }
    }

    pub fn branch(name: impl Into<String>, children: Vec<JsonNode>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// First child named `name`, if any.
    pub fn child(&self, name: &str) -> Option<&JsonNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn child_mut(&mut self, name: &str) -> Option<&mut JsonNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => other.to_string(),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

fn value_to_node(name: &str, value: &Value) -> JsonNode {
    match value {
        Value::Object(map) => {
            let children = map.iter().map(|(k, v)| value_to_node(k, v)).collect();
            JsonNode::branch(name, children)
        }
        Value::Array(items) => {
            if items.iter().all(is_scalar) {
                JsonNode::leaf(name, items.iter().map(scalar_to_string).collect())
            } else {
                // A list of non-scalar items becomes repeated same-named
                // children so printTreeDiff's "named identically -> compare
                // positionally" rule applies to path-set / strong-fp lists.
                let children = items.iter().map(|v| value_to_node(name, v)).collect();
                JsonNode::branch(name, children)
            }
        }
        scalar => JsonNode::leaf(name, vec![scalar_to_string(scalar)]),
    }
}

/// Parse `json_text` into a canonical [`JsonNode`] tree rooted at `"root"`.
pub fn deserialize(json_text: &str) -> Result<JsonNode> {
    let value: Value = serde_json::from_str(json_text)?;
    Ok(value_to_node("root", &value))
}

/// Build a canonical [`JsonNode`] tree directly from an already-parsed
/// [`serde_json::Value`] (e.g. a fingerprint store entry's input blob),
/// rooted at `name`.
pub fn from_value(name: &str, value: &Value) -> JsonNode {
    value_to_node(name, value)
}

impl JsonNode {
    /// Inverse of [`from_value`]: render this node back into a
    /// [`serde_json::Value`] suitable for storing in a fingerprint-store
    /// entry blob. A leaf with one value becomes a JSON string; a leaf with
    /// zero or many values becomes a JSON array of strings; a branch
    /// becomes an object with one key per distinct child name, repeated
    /// same-named children collapsing into a JSON array under that key
    /// (the mirror of [`from_value`]'s "list of non-scalar items becomes
    /// repeated same-named children" rule).
    pub fn to_value(&self) -> Value {
        if self.is_leaf() {
            return match self.values.as_slice() {
                [single] => Value::String(single.clone()),
                many => Value::Array(many.iter().map(|v| Value::String(v.clone())).collect()),
            };
        }

        let mut map = serde_json::Map::new();
        for child in &self.children {
            let count = self.children.iter().filter(|c| c.name == child.name).count();
            if count > 1 {
                map.entry(child.name.clone()).or_insert_with(|| {
                    Value::Array(
                        self.children
                            .iter()
                            .filter(|c| c.name == child.name)
                            .map(JsonNode::to_value)
                            .collect(),
                    )
                });
            } else {
                map.insert(child.name.clone(), child.to_value());
            }
        }
        Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_becomes_named_children() {
        let node = deserialize(r#"{"cmd": "gcc", "salt": 7}"#).unwrap();
        assert_eq!(node.name, "root");
        assert_eq!(node.child("cmd").unwrap().values, vec!["gcc"]);
        assert_eq!(node.child("salt").unwrap().values, vec!["7"]);
    }

    #[test]
    fn scalar_array_becomes_leaf_values() {
        let node = deserialize(r#"{"members": ["a", "b", "c"]}"#).unwrap();
        let members = node.child("members").unwrap();
        assert!(members.is_leaf());
        assert_eq!(members.values, vec!["a", "b", "c"]);
    }

    #[test]
    fn object_array_becomes_repeated_named_children() {
        let node = deserialize(r#"{"paths": [{"p":"/a"},{"p":"/b"}]}"#).unwrap();
        let paths: Vec<&JsonNode> = node.children.iter().filter(|c| c.name == "paths").collect();
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0].child("p").unwrap().values, vec!["/a"]);
        assert_eq!(paths[1].child("p").unwrap().values, vec!["/b"]);
    }

    #[test]
    fn to_value_roundtrips_through_object_shape() {
        let node = deserialize(r#"{"cmd":"gcc","members":["a","b"]}"#).unwrap();
        let value = node.to_value();
        assert_eq!(value["cmd"], serde_json::json!("gcc"));
        assert_eq!(value["members"], serde_json::json!(["a", "b"]));
    }

    #[test]
    fn nested_object_is_a_branch() {
        let node = deserialize(r#"{"env": {"PATH": "/bin"}}"#).unwrap();
        let env = node.child("env").unwrap();
        assert!(!env.is_leaf());
        assert_eq!(env.child("PATH").unwrap().values, vec!["/bin"]);
    }
}
