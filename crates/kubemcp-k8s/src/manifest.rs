//! Parsing of YAML/JSON manifests into individual objects

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Result, invalid};

/// One object from a manifest
#[derive(Clone, Debug)]
pub struct Manifest {
    pub api_version: String,
    pub kind: String,
    pub name: Option<String>,
    pub body: Value,
}

impl Manifest {
    pub fn namespace(&self) -> Option<&str> {
        self.body
            .pointer("/metadata/namespace")
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
    }

    /// Force `metadata.namespace`
    pub fn set_namespace(&mut self, namespace: &str) {
        if let Some(meta) = self.body.get_mut("metadata").and_then(Value::as_object_mut) {
            meta.insert("namespace".into(), Value::String(namespace.to_string()));
        }
    }

    /// `Kind/name` for messages
    pub fn display_name(&self) -> String {
        let name = self
            .name
            .clone()
            .or_else(|| {
                self.body
                    .pointer("/metadata/generateName")
                    .and_then(Value::as_str)
                    .map(|g| format!("{}*", g))
            })
            .unwrap_or_default();
        format!("{}/{}", self.kind, name)
    }
}

/// Parse YAML (possibly multi-document) or JSON into manifests.
///
/// Text whose first non-blank character is `{` is read as JSON. Objects of
/// kind `List` are flattened into their items. With `require_name`,
/// `metadata.generateName` does not count as a name.
pub fn parse_manifests(content: &str, require_name: bool) -> Result<Vec<Manifest>> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(invalid("yaml_content is empty"));
    }

    let documents: Vec<Value> = if trimmed.starts_with('{') {
        vec![
            serde_json::from_str(trimmed)
                .map_err(|e| invalid(format!("invalid JSON manifest: {}", e)))?,
        ]
    } else {
        serde_yaml::Deserializer::from_str(content)
            .map(|doc| {
                Value::deserialize(doc).map_err(|e| invalid(format!("invalid YAML manifest: {}", e)))
            })
            .collect::<Result<_>>()?
    };

    let mut manifests = Vec::new();
    for (index, doc) in documents.into_iter().enumerate() {
        match doc {
            Value::Null => continue,
            Value::Object(_) if doc.get("kind").and_then(Value::as_str) == Some("List") => {
                let items = doc
                    .get("items")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();
                for item in items {
                    manifests.push(to_manifest(item, index, require_name)?);
                }
            }
            Value::Object(_) => manifests.push(to_manifest(doc, index, require_name)?),
            _ => {
                return Err(invalid(format!(
                    "document {} is not a Kubernetes object",
                    index + 1
                )));
            }
        }
    }

    if manifests.is_empty() {
        return Err(invalid("manifest contains no objects"));
    }
    Ok(manifests)
}

fn to_manifest(body: Value, index: usize, require_name: bool) -> Result<Manifest> {
    let field = |name: &str| {
        body.get(name)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("document {} is missing {}", index + 1, name)))
    };
    let api_version = field("apiVersion")?;
    let kind = field("kind")?;

    let meta = body
        .get("metadata")
        .and_then(Value::as_object)
        .ok_or_else(|| invalid(format!("document {} is missing metadata", index + 1)))?;
    let name = meta
        .get("name")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string);
    let generate_name = meta
        .get("generateName")
        .and_then(Value::as_str)
        .is_some_and(|s| !s.is_empty());

    if name.is_none() && (require_name || !generate_name) {
        return Err(invalid(format!(
            "document {} ({}) must set metadata.name",
            index + 1,
            kind
        )));
    }

    Ok(Manifest {
        api_version,
        kind,
        name,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_multi_document_yaml() {
        let yaml = r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: settings
data:
  level: debug
---
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: shop
spec:
  replicas: 2
"#;
        let manifests = parse_manifests(yaml, true).unwrap();
        assert_eq!(manifests.len(), 2);
        assert_eq!(manifests[0].kind, "ConfigMap");
        assert_eq!(manifests[0].namespace(), None);
        assert_eq!(manifests[1].api_version, "apps/v1");
        assert_eq!(manifests[1].namespace(), Some("shop"));
        assert_eq!(manifests[1].display_name(), "Deployment/web");
    }

    #[test]
    fn test_parse_json_and_namespace_override() {
        let json = r#"  {"apiVersion": "v1", "kind": "Pod", "metadata": {"name": "p"}}"#;
        let mut manifests = parse_manifests(json, false).unwrap();
        manifests[0].set_namespace("tools");
        assert_eq!(manifests[0].namespace(), Some("tools"));
    }

    #[test]
    fn test_generate_name_allowed_only_for_create() {
        let yaml = "apiVersion: batch/v1\nkind: Job\nmetadata:\n  generateName: backup-\n";
        let manifests = parse_manifests(yaml, false).unwrap();
        assert_eq!(manifests[0].name, None);
        assert_eq!(manifests[0].display_name(), "Job/backup-*");

        assert!(parse_manifests(yaml, true).is_err());
    }

    #[test]
    fn test_list_is_flattened() {
        let yaml = r#"
apiVersion: v1
kind: List
items:
- apiVersion: v1
  kind: ConfigMap
  metadata: {name: a}
- apiVersion: v1
  kind: ConfigMap
  metadata: {name: b}
"#;
        let names: Vec<_> = parse_manifests(yaml, true)
            .unwrap()
            .into_iter()
            .map(|m| m.name.unwrap())
            .collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_rejects_incomplete_documents() {
        assert!(parse_manifests("", false).is_err());
        assert!(parse_manifests("kind: Pod\nmetadata:\n  name: x\n", false).is_err());
        assert!(parse_manifests("apiVersion: v1\nmetadata:\n  name: x\n", false).is_err());
        assert!(parse_manifests("apiVersion: v1\nkind: Pod\n", false).is_err());
        assert!(parse_manifests("- just\n- a list\n", false).is_err());
        assert!(parse_manifests("{not json", false).is_err());
    }
}
