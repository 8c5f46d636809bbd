//! Schema snapshots and the local type model they are built from.

use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{MigrateResult, MigrationError};

/// Migration number of the initial, full snapshot.
pub const INITIAL_MIGRATION_NUMBER: u32 = 0;

/// Scalar vocabulary for snapshot fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScalarKind {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    Date,
    Datetime,
    Time,
    Enum,
    Nested,
}

impl ScalarKind {
    /// Name as written in snapshot files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Uuid => "uuid",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Time => "time",
            Self::Enum => "enum",
            Self::Nested => "nested",
        }
    }
}

impl fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of a single field inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotFieldConfig {
    /// Scalar kind.
    #[serde(rename = "type")]
    pub kind: ScalarKind,
    /// Whether a value is mandatory.
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique: Option<bool>,
    /// Permitted values, in declaration order. Only for enums.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_values: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key_field: Option<String>,
}

impl SnapshotFieldConfig {
    /// Create a scalar field config.
    pub fn new(kind: ScalarKind, required: bool) -> Self {
        Self {
            kind,
            required,
            array: None,
            unique: None,
            allowed_values: None,
            foreign_key: None,
            foreign_key_type: None,
            foreign_key_field: None,
        }
    }

    /// Create an enum field config.
    pub fn enumeration<I, S>(values: I, required: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut config = Self::new(ScalarKind::Enum, required);
        config.allowed_values = Some(values.into_iter().map(Into::into).collect());
        config
    }

    /// Mark the field as an array.
    pub fn array(mut self, array: bool) -> Self {
        self.array = Some(array);
        self
    }

    /// Mark the field as unique.
    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = Some(unique);
        self
    }

    /// Point the field at another type.
    pub fn foreign_key(mut self, type_name: impl Into<String>, field: impl Into<String>) -> Self {
        self.foreign_key = Some(true);
        self.foreign_key_type = Some(type_name.into());
        self.foreign_key_field = Some(field.into());
        self
    }

    pub fn is_array(&self) -> bool {
        self.array.unwrap_or(false)
    }

    pub fn is_unique(&self) -> bool {
        self.unique.unwrap_or(false)
    }

    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key.unwrap_or(false)
    }

    /// Allowed values, empty when absent.
    pub fn allowed(&self) -> &[String] {
        self.allowed_values.as_deref().unwrap_or_default()
    }

    /// Compare two configs with absent flags read as `false`.
    pub fn same_as(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.required == other.required
            && self.is_array() == other.is_array()
            && self.is_unique() == other.is_unique()
            && self.is_foreign_key() == other.is_foreign_key()
            && self.allowed() == other.allowed()
            && self.foreign_key_type == other.foreign_key_type
            && self.foreign_key_field == other.foreign_key_field
    }

    /// Check that allowed values are present exactly for enums.
    pub fn validate(&self) -> Result<(), String> {
        let has_values = !self.allowed().is_empty();
        match (self.kind == ScalarKind::Enum, has_values) {
            (true, false) => Err("enum field must declare at least one allowed value".to_string()),
            (false, true) => Err(format!(
                "allowed values are only valid on enum fields, found on {}",
                self.kind
            )),
            _ => Ok(()),
        }
    }
}

/// A type inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotType {
    pub name: String,
    pub fields: IndexMap<String, SnapshotFieldConfig>,
}

impl SnapshotType {
    /// Create an empty type.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: IndexMap::new(),
        }
    }

    /// Add a field.
    pub fn field(mut self, name: impl Into<String>, config: SnapshotFieldConfig) -> Self {
        self.fields.insert(name.into(), config);
        self
    }
}

/// Complete schema state of a namespace at one migration point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaSnapshot {
    /// Migration number this snapshot describes.
    pub version: u32,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
    pub types: IndexMap<String, SnapshotType>,
}

impl SchemaSnapshot {
    /// Create an empty snapshot.
    pub fn new(namespace: impl Into<String>, version: u32) -> Self {
        Self {
            version,
            namespace: namespace.into(),
            created_at: Utc::now(),
            types: IndexMap::new(),
        }
    }

    /// Add a type, keyed by its name.
    pub fn with_type(mut self, ty: SnapshotType) -> Self {
        self.types.insert(ty.name.clone(), ty);
        self
    }

    /// Build a snapshot from the parsed local type model.
    pub fn from_local_types(
        namespace: impl Into<String>,
        version: u32,
        local_types: &[LocalType],
    ) -> MigrateResult<Self> {
        let mut snapshot = Self::new(namespace, version);

        for local in local_types {
            if snapshot.types.contains_key(&local.name) {
                return Err(MigrationError::schema(format!(
                    "type '{}' is defined more than once",
                    local.name
                )));
            }

            let mut ty = SnapshotType::new(&local.name);
            for (field_name, field) in &local.fields {
                let config = field.to_snapshot_config();
                config.validate().map_err(|msg| {
                    MigrationError::schema(format!("{}.{}: {}", local.name, field_name, msg))
                })?;
                ty.fields.insert(field_name.clone(), config);
            }
            snapshot.types.insert(local.name.clone(), ty);
        }

        Ok(snapshot)
    }

    /// Total number of fields across all types.
    pub fn field_count(&self) -> usize {
        self.types.values().map(|t| t.fields.len()).sum()
    }
}

/// A type as parsed from local source definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalType {
    pub name: String,
    #[serde(default)]
    pub fields: IndexMap<String, LocalFieldConfig>,
}

/// An allowed enum value with optional documentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AllowedValue {
    Plain(String),
    Described {
        value: String,
        #[serde(default)]
        description: Option<String>,
    },
}

impl AllowedValue {
    pub fn value(&self) -> &str {
        match self {
            Self::Plain(value) | Self::Described { value, .. } => value,
        }
    }
}

/// A field as parsed from local source definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalFieldConfig {
    #[serde(rename = "type")]
    pub kind: ScalarKind,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub array: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub allowed_values: Vec<AllowedValue>,
    #[serde(default)]
    pub foreign_key: bool,
    #[serde(default)]
    pub foreign_key_type: Option<String>,
    #[serde(default)]
    pub foreign_key_field: Option<String>,
    /// Documentation only, not part of the snapshot.
    #[serde(default)]
    pub description: Option<String>,
}

impl LocalFieldConfig {
    fn to_snapshot_config(&self) -> SnapshotFieldConfig {
        let mut config = SnapshotFieldConfig::new(self.kind, self.required);
        if self.array {
            config.array = Some(true);
        }
        if self.unique {
            config.unique = Some(true);
        }
        if !self.allowed_values.is_empty() {
            config.allowed_values = Some(
                self.allowed_values
                    .iter()
                    .map(|v| v.value().to_string())
                    .collect(),
            );
        }
        if self.foreign_key {
            config.foreign_key = Some(true);
            config.foreign_key_type = self.foreign_key_type.clone();
            config.foreign_key_field = self.foreign_key_field.clone();
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local_types(json: &str) -> Vec<LocalType> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_field_config_serializes_camel_case() {
        let config = SnapshotFieldConfig::new(ScalarKind::Uuid, true).foreign_key("User", "id");
        let json = serde_json::to_value(&config).unwrap();

        assert_eq!(json["type"], "uuid");
        assert_eq!(json["foreignKeyType"], "User");
        assert!(json.get("array").is_none());
    }

    #[test]
    fn test_same_as_treats_missing_flags_as_false() {
        let a = SnapshotFieldConfig::new(ScalarKind::String, false);
        let b = SnapshotFieldConfig::new(ScalarKind::String, false)
            .array(false)
            .unique(false);
        assert!(a.same_as(&b));
        assert!(!a.same_as(&b.clone().unique(true)));
    }

    #[test]
    fn test_enum_requires_allowed_values() {
        assert!(SnapshotFieldConfig::new(ScalarKind::Enum, true).validate().is_err());
        assert!(SnapshotFieldConfig::enumeration(["a"], true).validate().is_ok());

        let mut string = SnapshotFieldConfig::new(ScalarKind::String, true);
        string.allowed_values = Some(vec!["a".to_string()]);
        assert!(string.validate().is_err());
    }

    #[test]
    fn test_from_local_types() {
        let types = local_types(
            r#"[{
                "name": "User",
                "fields": {
                    "name": {"type": "string", "required": true},
                    "role": {"type": "enum", "required": true,
                             "allowedValues": [
                                 "ADMIN",
                                 {"value": "MEMBER", "description": "default"}
                             ]},
                    "tags": {"type": "string", "array": true}
                }
            }]"#,
        );

        let snapshot = SchemaSnapshot::from_local_types("main", 0, &types).unwrap();
        let user = &snapshot.types["User"];

        assert_eq!(user.fields.len(), 3);
        assert_eq!(user.fields["role"].allowed(), ["ADMIN", "MEMBER"]);
        assert_eq!(user.fields["tags"].array, Some(true));
        assert_eq!(user.fields["name"].unique, None);
        assert_eq!(snapshot.field_count(), 3);
    }

    #[test]
    fn test_from_local_types_rejects_enum_without_values() {
        let types = local_types(r#"[{"name": "User", "fields": {"role": {"type": "enum"}}}]"#);
        let err = SchemaSnapshot::from_local_types("main", 0, &types).unwrap_err();
        assert!(err.to_string().contains("User.role"));
    }

    #[test]
    fn test_from_local_types_rejects_duplicate_type() {
        let types = local_types(r#"[{"name": "User"}, {"name": "User"}]"#);
        assert!(SchemaSnapshot::from_local_types("main", 0, &types).is_err());
    }
}
