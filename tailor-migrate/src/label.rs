//! Remote checkpoint labels and resource names.

use std::sync::LazyLock;

use regex_lite::Regex;

use crate::error::{MigrateResult, MigrationError};
use crate::file::format_migration_number;

/// Metadata key holding the applied-migration checkpoint.
pub const MIGRATION_LABEL_KEY: &str = "sdk-migration";

/// Prefix of checkpoint label values.
pub const MIGRATION_LABEL_PREFIX: &str = "m";

static LABEL_VALUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]{0,62}$").expect("valid label regex"));

static MIGRATION_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^m(\d{4})$").expect("valid migration label regex"));

/// Whether a value satisfies the metadata label grammar.
pub fn is_valid_label_value(value: &str) -> bool {
    LABEL_VALUE.is_match(value)
}

/// Format a checkpoint label, e.g. `m0007`.
pub fn format_migration_label(number: u32) -> MigrateResult<String> {
    let label = format!("{}{}", MIGRATION_LABEL_PREFIX, format_migration_number(number));
    if !MIGRATION_LABEL.is_match(&label) || !is_valid_label_value(&label) {
        return Err(MigrationError::InvalidLabel(label));
    }
    Ok(label)
}

/// Parse a checkpoint label. Anything but the prefix plus 4 digits is `None`.
pub fn parse_migration_label(value: &str) -> Option<u32> {
    MIGRATION_LABEL
        .captures(value)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Resource name prefix of a workspace.
pub fn workspace_trn(workspace_id: &str) -> String {
    format!("trn:v1:workspace:{}", workspace_id)
}

/// Resource name of a database namespace.
pub fn namespace_trn(workspace_id: &str, namespace: &str) -> String {
    format!("{}:tailordb:{}", workspace_trn(workspace_id), namespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_migration_label() {
        assert_eq!(format_migration_label(7).unwrap(), "m0007");
        assert_eq!(format_migration_label(0).unwrap(), "m0000");
        assert!(format_migration_label(10000).is_err());
    }

    #[test]
    fn test_parse_migration_label() {
        assert_eq!(parse_migration_label("m0007"), Some(7));
        assert_eq!(parse_migration_label("m9999"), Some(9999));
        assert_eq!(parse_migration_label("m007"), None);
        assert_eq!(parse_migration_label("m00007"), None);
        assert_eq!(parse_migration_label("x0007"), None);
        assert_eq!(parse_migration_label(""), None);
    }

    #[test]
    fn test_label_grammar() {
        assert!(is_valid_label_value("m0001"));
        assert!(is_valid_label_value("a-b_c"));
        assert!(!is_valid_label_value("0001"));
        assert!(!is_valid_label_value("M0001"));
        assert!(!is_valid_label_value(&"a".repeat(64)));
        assert!(is_valid_label_value(&"a".repeat(63)));
    }

    #[test]
    fn test_trn() {
        assert_eq!(workspace_trn("ws-1"), "trn:v1:workspace:ws-1");
        assert_eq!(
            namespace_trn("ws-1", "main"),
            "trn:v1:workspace:ws-1:tailordb:main"
        );
    }
}
