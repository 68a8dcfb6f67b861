use crate::error::{DispatchError, Result};
use crate::records::now_timestamp;
use crate::store::{parse_column, Store};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Table {
    EmergencyRequests,
    Ambulances,
    Patients,
    Reports,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::EmergencyRequests => "emergency_requests",
            Table::Ambulances => "ambulances",
            Table::Patients => "patients",
            Table::Reports => "reports",
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = DispatchError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "emergency_requests" => Ok(Table::EmergencyRequests),
            "ambulances" => Ok(Table::Ambulances),
            "patients" => Ok(Table::Patients),
            "reports" => Ok(Table::Reports),
            other => Err(DispatchError::Validation(format!("unknown table '{other}'"))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "INSERT",
            ChangeKind::Update => "UPDATE",
            ChangeKind::Delete => "DELETE",
        }
    }
}

impl FromStr for ChangeKind {
    type Err = DispatchError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "INSERT" => Ok(ChangeKind::Insert),
            "UPDATE" => Ok(ChangeKind::Update),
            "DELETE" => Ok(ChangeKind::Delete),
            other => Err(DispatchError::Validation(format!("unknown change kind '{other}'"))),
        }
    }
}

/// One row change as published on the feed. `payload` is the row after the
/// write, `None` for deletes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub id: i64,
    pub table: Table,
    pub kind: ChangeKind,
    pub record_id: String,
    pub payload: Option<serde_json::Value>,
    pub timestamp: String,
}

pub(crate) fn record_change<T: Serialize>(
    conn: &Connection,
    table: Table,
    kind: ChangeKind,
    record_id: &str,
    payload: Option<&T>,
) -> Result<i64> {
    let payload = payload.map(serde_json::to_string).transpose()?;
    conn.execute(
        "INSERT INTO changes (table_name, kind, record_id, payload, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![table.as_str(), kind.as_str(), record_id, payload, now_timestamp()],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Store {
    /// Changes with an id greater than `after_id`, in commit order.
    pub fn changes_after(&self, after_id: i64) -> Result<Vec<ChangeEvent>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT id, table_name, kind, record_id, payload, timestamp
             FROM changes
             WHERE id > ?1
             ORDER BY id ASC",
        )?;
        let rows = stmt.query_map(params![after_id], map_change)?;

        let mut events = Vec::new();
        for row in rows {
            events.push(row?);
        }
        Ok(events)
    }

    pub fn latest_change_id(&self) -> Result<Option<i64>> {
        let conn = self.connect()?;
        let id = conn.query_row("SELECT MAX(id) FROM changes", [], |row| {
            row.get::<_, Option<i64>>(0)
        })?;
        Ok(id)
    }

    pub fn oldest_change_id(&self) -> Result<Option<i64>> {
        let conn = self.connect()?;
        let id = conn.query_row("SELECT MIN(id) FROM changes", [], |row| {
            row.get::<_, Option<i64>>(0)
        })?;
        Ok(id)
    }

    /// Drops retained changes older than `before_id`. Returns how many rows
    /// were removed.
    pub fn prune_changes_before(&self, before_id: i64) -> Result<usize> {
        let conn = self.connect()?;
        let removed = conn.execute("DELETE FROM changes WHERE id < ?1", params![before_id])?;
        if removed > 0 {
            tracing::debug!(removed, before_id, "pruned change feed");
        }
        Ok(removed)
    }

    /// Keeps only the newest `keep` changes.
    pub fn retain_changes(&self, keep: i64) -> Result<usize> {
        match self.latest_change_id()? {
            Some(latest) => self.prune_changes_before(latest - keep.max(1) + 1),
            None => Ok(0),
        }
    }
}

fn map_change(row: &Row<'_>) -> rusqlite::Result<ChangeEvent> {
    let payload: Option<String> = row.get(4)?;
    let payload = payload
        .map(|raw| {
            serde_json::from_str(&raw).map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })
        })
        .transpose()?;

    Ok(ChangeEvent {
        id: row.get(0)?,
        table: parse_column(row, 1)?,
        kind: parse_column(row, 2)?,
        record_id: row.get(3)?,
        payload,
        timestamp: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{AmbulanceStatus, EmergencyStatus};
    use crate::store::tests::{db_path, new_ambulance, new_emergency};

    #[test]
    fn writes_append_changes_in_order() {
        let store = Store::open(db_path("feed-order")).expect("open");
        store
            .insert_emergency(&new_emergency("er-1", EmergencyStatus::Pending))
            .expect("insert");
        store
            .insert_ambulance(&new_ambulance("amb-1", AmbulanceStatus::Available))
            .expect("insert");
        store
            .update_ambulance_status("amb-1", AmbulanceStatus::Dispatched)
            .expect("update");
        store.delete_emergency("er-1").expect("delete");

        let events = store.changes_after(0).expect("changes");
        let summary: Vec<_> = events
            .iter()
            .map(|e| (e.table, e.kind, e.record_id.as_str()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (Table::EmergencyRequests, ChangeKind::Insert, "er-1"),
                (Table::Ambulances, ChangeKind::Insert, "amb-1"),
                (Table::Ambulances, ChangeKind::Update, "amb-1"),
                (Table::EmergencyRequests, ChangeKind::Delete, "er-1"),
            ]
        );
        assert!(events[3].payload.is_none());
        assert_eq!(
            events[2]
                .payload
                .as_ref()
                .and_then(|p| p.get("status"))
                .and_then(serde_json::Value::as_str),
            Some("dispatched")
        );
    }

    #[test]
    fn failed_update_records_no_change() {
        let store = Store::open(db_path("feed-failed")).expect("open");
        assert!(store
            .update_emergency_status("ghost", EmergencyStatus::Dispatched, Some("amb-1"))
            .is_err());
        assert_eq!(store.latest_change_id().expect("latest"), None);
    }

    #[test]
    fn prune_moves_oldest_id_forward() {
        let store = Store::open(db_path("feed-prune")).expect("open");
        for id in ["a", "b", "c"] {
            store
                .insert_ambulance(&new_ambulance(id, AmbulanceStatus::Available))
                .expect("insert");
        }
        let latest = store.latest_change_id().expect("latest").expect("some");
        let removed = store.prune_changes_before(latest).expect("prune");
        assert_eq!(removed, 2);
        assert_eq!(store.oldest_change_id().expect("oldest"), Some(latest));
    }

    #[test]
    fn retention_keeps_newest_changes() {
        let store = Store::open(db_path("feed-retain")).expect("open");
        store
            .insert_ambulance(&new_ambulance("amb-1", AmbulanceStatus::Available))
            .expect("insert");
        for _ in 0..9 {
            store
                .update_ambulance_status("amb-1", AmbulanceStatus::Maintenance)
                .expect("update");
        }
        assert_eq!(store.oldest_change_id().expect("oldest"), Some(1));

        assert_eq!(store.retain_changes(3).expect("retain"), 7);
        assert_eq!(store.oldest_change_id().expect("oldest"), Some(8));
        assert_eq!(store.latest_change_id().expect("latest"), Some(10));
        assert_eq!(store.retain_changes(3).expect("retain again"), 0);
    }
}
