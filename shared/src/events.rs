use std::fmt;

use serde::{Deserialize, Serialize};

/// Remote collections the dashboard mirrors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Announcements,
    Projects,
    Teams,
}

impl Table {
    pub const ALL: [Table; 3] = [Table::Announcements, Table::Projects, Table::Teams];

    pub fn as_str(self) -> &'static str {
        match self {
            Table::Announcements => "announcements",
            Table::Projects => "projects",
            Table::Teams => "teams",
        }
    }

    /// Announcements and projects render newest first; teams keep arrival order.
    pub fn newest_first(self) -> bool {
        matches!(self, Table::Announcements | Table::Projects)
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Insert, ChangeKind::Update, ChangeKind::Delete];

    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "insert" => Some(ChangeKind::Insert),
            "update" => Some(ChangeKind::Update),
            "delete" => Some(ChangeKind::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single row change pushed by the store's notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent<T> {
    pub kind: ChangeKind,
    pub row: T,
}

/// Change as it arrives on the wire, before the row is decoded.
pub type RawChange = ChangeEvent<serde_json::Value>;

impl RawChange {
    /// Identifier of the affected row, if the payload carries one.
    pub fn row_id(&self) -> Option<&str> {
        self.row.get("id").and_then(serde_json::Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ChangeKind, RawChange, Table};

    #[test]
    fn change_kind_parse_is_case_insensitive() {
        assert_eq!(ChangeKind::parse("INSERT"), Some(ChangeKind::Insert));
        assert_eq!(ChangeKind::parse(" update "), Some(ChangeKind::Update));
        assert_eq!(ChangeKind::parse("truncate"), None);
    }

    #[test]
    fn raw_change_exposes_string_ids_only() {
        let with_id = RawChange {
            kind: ChangeKind::Delete,
            row: json!({"id": "t-1"}),
        };
        assert_eq!(with_id.row_id(), Some("t-1"));

        let numeric = RawChange {
            kind: ChangeKind::Delete,
            row: json!({"id": 7}),
        };
        assert_eq!(numeric.row_id(), None);
    }

    #[test]
    fn table_names_match_wire_format() {
        let names: Vec<_> = Table::ALL.iter().map(|t| t.to_string()).collect();
        assert_eq!(names, ["announcements", "projects", "teams"]);
        assert_eq!(
            serde_json::to_string(&Table::Teams).expect("serialize table"),
            "\"teams\""
        );
    }
}
