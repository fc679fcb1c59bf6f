use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::DecodeError;
use crate::store::{Document, Fields, fields};

/// A named container of tasks owned by one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    /// Empty when the stored document carries no ownership tag.
    pub owner_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProjectFields {
    name: String,
}

impl Project {
    /// Decode a store document whose ownership tag lives in `owner_field`.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when `name` is missing or not a string.
    pub fn from_document(doc: &Document, owner_field: &str) -> Result<Self, DecodeError> {
        let raw: ProjectFields = serde_json::from_value(Value::Object(doc.fields.clone()))
            .map_err(|source| DecodeError {
                kind: "project",
                id: doc.id.clone(),
                source,
            })?;
        Ok(Self {
            id: doc.id.clone(),
            name: raw.name,
            owner_id: doc.str_field(owner_field).unwrap_or_default().to_string(),
        })
    }

    pub(crate) fn create_fields(name: &str, owner_field: &str, owner: &str) -> Fields {
        let mut out = fields(json!({ "name": name }));
        out.insert(owner_field.to_string(), json!(owner));
        out
    }

    pub(crate) fn rename_fields(name: &str) -> Fields {
        fields(json!({ "name": name }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DEFAULT_OWNER_FIELD;

    #[test]
    fn decodes_owner_tag() {
        let doc = Document::new("p1", fields(json!({"name": "Launch", "ownerId": "alice"})));
        let project = Project::from_document(&doc, DEFAULT_OWNER_FIELD).expect("decode");
        assert_eq!(project.id, "p1");
        assert_eq!(project.name, "Launch");
        assert_eq!(project.owner_id, "alice");
    }

    #[test]
    fn missing_owner_decodes_as_empty() {
        let doc = Document::new("p2", fields(json!({"name": "Legacy", "ownerId": null})));
        assert_eq!(Project::from_document(&doc, DEFAULT_OWNER_FIELD).expect("decode").owner_id, "");
    }

    #[test]
    fn missing_name_is_rejected() {
        let doc = Document::new("p3", fields(json!({"ownerId": "alice"})));
        let err = Project::from_document(&doc, DEFAULT_OWNER_FIELD).expect_err("must fail");
        assert_eq!(err.id, "p3");
        assert!(err.to_string().contains("project"));
    }

    #[test]
    fn create_fields_carry_owner() {
        let f = Project::create_fields("Launch", DEFAULT_OWNER_FIELD, "alice");
        assert_eq!(f.get("name"), Some(&json!("Launch")));
        assert_eq!(f.get("ownerId"), Some(&json!("alice")));
    }

    #[test]
    fn user_id_tag_decodes_with_configured_field() {
        let doc = Document::new("p4", fields(json!({"name": "Web", "userId": "alice"})));
        assert_eq!(Project::from_document(&doc, DEFAULT_OWNER_FIELD).expect("decode").owner_id, "");
        assert_eq!(Project::from_document(&doc, "userId").expect("decode").owner_id, "alice");
        assert_eq!(
            Project::create_fields("Web", "userId", "alice").get("userId"),
            Some(&json!("alice"))
        );
    }
}
