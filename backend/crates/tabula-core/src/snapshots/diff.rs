use std::collections::BTreeMap;

use tabula_commons::{SchemaSnapshot, SnapshotComparison};

/// Textual diff of two snapshots: table-name set difference plus tables whose
/// stored definition text differs. Names in each list are sorted.
pub fn compare(from: &SchemaSnapshot, to: &SchemaSnapshot) -> SnapshotComparison {
    let before: BTreeMap<&str, &str> = from
        .tables
        .iter()
        .map(|t| (t.name.as_str(), t.sql.as_str()))
        .collect();
    let after: BTreeMap<&str, &str> = to
        .tables
        .iter()
        .map(|t| (t.name.as_str(), t.sql.as_str()))
        .collect();

    let added = after
        .keys()
        .filter(|name| !before.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    let removed = before
        .keys()
        .filter(|name| !after.contains_key(*name))
        .map(|name| name.to_string())
        .collect();
    let modified = before
        .iter()
        .filter(|(name, sql)| after.get(*name).is_some_and(|other| other != *sql))
        .map(|(name, _)| name.to_string())
        .collect();

    SnapshotComparison {
        from_id: from.id.clone(),
        to_id: to.id.clone(),
        from_version: from.version,
        to_version: to.version,
        added,
        removed,
        modified,
    }
}
