use crate::error::{DispatchError, Result};
use crate::feed::{self, ChangeKind, Table};
use crate::records::{
    new_record_id, now_timestamp, Ambulance, AmbulanceStatus, Coordinates, Driver,
    EmergencyRequest, EmergencyStatus, LastLocation, Location, NewAmbulance, NewEmergency,
    Operator, Patient, PatientDraft, Report, ReportDraft,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

const SCHEMA: &str = "
    PRAGMA journal_mode=WAL;
    PRAGMA synchronous=NORMAL;
    CREATE TABLE IF NOT EXISTS emergency_requests (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        phone TEXT NOT NULL,
        address TEXT NOT NULL,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        created_at TEXT NOT NULL,
        status TEXT NOT NULL,
        notes TEXT,
        ambulance_id TEXT,
        updated_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_emergency_status ON emergency_requests(status);
    CREATE TABLE IF NOT EXISTS ambulances (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        vehicle_number TEXT NOT NULL,
        driver_name TEXT NOT NULL,
        driver_phone TEXT NOT NULL,
        status TEXT NOT NULL,
        last_latitude REAL,
        last_longitude REAL,
        last_updated TEXT,
        updated_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_ambulance_status ON ambulances(status);
    CREATE TABLE IF NOT EXISTS patients (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        phone TEXT NOT NULL,
        address TEXT,
        medical_notes TEXT,
        emergency_contact TEXT,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS reports (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT,
        emergency_id TEXT,
        ambulance_id TEXT,
        report_date TEXT NOT NULL,
        created_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS operators (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        role TEXT NOT NULL,
        hospital_id TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS changes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        table_name TEXT NOT NULL,
        kind TEXT NOT NULL,
        record_id TEXT NOT NULL,
        payload TEXT,
        timestamp TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_changes_table ON changes(table_name);
";

const EMERGENCY_COLUMNS: &str = "id, name, phone, address, latitude, longitude, created_at, status, notes, ambulance_id, updated_at";
const AMBULANCE_COLUMNS: &str = "id, name, vehicle_number, driver_name, driver_phone, status, last_latitude, last_longitude, last_updated, updated_at";
const PATIENT_COLUMNS: &str = "id, name, phone, address, medical_notes, emergency_contact, created_at";
const REPORT_COLUMNS: &str = "id, title, description, emergency_id, ambulance_id, report_date, created_at";

/// SQLite-backed data store. Every row write appends a matching entry to the
/// `changes` table inside the same transaction, which is what the change
/// feed reads from.
#[derive(Clone, Debug)]
pub struct Store {
    db_path: Arc<PathBuf>,
}

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.display(), "store opened");

        Ok(Self {
            db_path: Arc::new(path.to_path_buf()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    pub(crate) fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&*self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    // ---- emergency requests ----

    pub fn insert_emergency(&self, new: &NewEmergency) -> Result<EmergencyRequest> {
        let request = EmergencyRequest {
            id: new.id.clone().unwrap_or_else(new_record_id),
            name: new.name.clone(),
            phone: new.phone.clone(),
            location: new.location.clone(),
            timestamp: new.timestamp.clone().unwrap_or_else(now_timestamp),
            status: new.status,
            notes: new.notes.clone(),
            ambulance_id: None,
            updated_at: None,
        };

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO emergency_requests
                (id, name, phone, address, latitude, longitude, created_at, status, notes, ambulance_id, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, NULL, NULL)",
            params![
                request.id,
                request.name,
                request.phone,
                request.location.address,
                request.location.coordinates.latitude,
                request.location.coordinates.longitude,
                request.timestamp,
                request.status.as_str(),
                request.notes,
            ],
        )
        .map_err(conflict_on_duplicate("emergency request", &request.id))?;
        feed::record_change(&tx, Table::EmergencyRequests, ChangeKind::Insert, &request.id, Some(&request))?;
        tx.commit()?;
        Ok(request)
    }

    pub fn get_emergency(&self, id: &str) -> Result<Option<EmergencyRequest>> {
        let conn = self.connect()?;
        query_emergency(&conn, id)
    }

    /// All emergency requests, newest first.
    pub fn list_emergencies(&self) -> Result<Vec<EmergencyRequest>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {EMERGENCY_COLUMNS} FROM emergency_requests ORDER BY created_at DESC, id ASC"
        ))?;
        let rows = stmt.query_map([], map_emergency)?;
        collect_rows(rows)
    }

    /// Overwrites the status and stamps `updated_at`. When `ambulance_id` is
    /// `None` the stored ambulance reference is left untouched.
    pub fn update_emergency_status(
        &self,
        id: &str,
        status: EmergencyStatus,
        ambulance_id: Option<&str>,
    ) -> Result<EmergencyRequest> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE emergency_requests
             SET status = ?2, ambulance_id = COALESCE(?3, ambulance_id), updated_at = ?4
             WHERE id = ?1",
            params![id, status.as_str(), ambulance_id, now_timestamp()],
        )?;
        if changed == 0 {
            return Err(DispatchError::not_found("emergency request", id));
        }
        let updated = query_emergency(&tx, id)?
            .ok_or_else(|| DispatchError::not_found("emergency request", id))?;
        feed::record_change(&tx, Table::EmergencyRequests, ChangeKind::Update, id, Some(&updated))?;
        tx.commit()?;
        Ok(updated)
    }

    pub fn update_emergency_notes(&self, id: &str, notes: Option<&str>) -> Result<EmergencyRequest> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE emergency_requests SET notes = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, notes, now_timestamp()],
        )?;
        if changed == 0 {
            return Err(DispatchError::not_found("emergency request", id));
        }
        let updated = query_emergency(&tx, id)?
            .ok_or_else(|| DispatchError::not_found("emergency request", id))?;
        feed::record_change(&tx, Table::EmergencyRequests, ChangeKind::Update, id, Some(&updated))?;
        tx.commit()?;
        Ok(updated)
    }

    pub fn delete_emergency(&self, id: &str) -> Result<()> {
        self.delete_row(Table::EmergencyRequests, "emergency request", id)
    }

    // ---- ambulances ----

    pub fn insert_ambulance(&self, new: &NewAmbulance) -> Result<Ambulance> {
        let ambulance = Ambulance {
            id: new.id.clone().unwrap_or_else(new_record_id),
            name: new.name.clone(),
            vehicle_number: new.vehicle_number.clone(),
            driver: new.driver.clone(),
            status: new.status,
            last_location: None,
            updated_at: Some(now_timestamp()),
        };

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO ambulances
                (id, name, vehicle_number, driver_name, driver_phone, status, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                ambulance.id,
                ambulance.name,
                ambulance.vehicle_number,
                ambulance.driver.name,
                ambulance.driver.phone,
                ambulance.status.as_str(),
                ambulance.updated_at,
            ],
        )
        .map_err(conflict_on_duplicate("ambulance", &ambulance.id))?;
        feed::record_change(&tx, Table::Ambulances, ChangeKind::Insert, &ambulance.id, Some(&ambulance))?;
        tx.commit()?;
        Ok(ambulance)
    }

    pub fn get_ambulance(&self, id: &str) -> Result<Option<Ambulance>> {
        let conn = self.connect()?;
        query_ambulance(&conn, id)
    }

    pub fn list_ambulances(&self) -> Result<Vec<Ambulance>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {AMBULANCE_COLUMNS} FROM ambulances ORDER BY name ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], map_ambulance)?;
        collect_rows(rows)
    }

    pub fn ambulances_with_status(&self, status: AmbulanceStatus) -> Result<Vec<Ambulance>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {AMBULANCE_COLUMNS} FROM ambulances WHERE status = ?1 ORDER BY name ASC, id ASC"
        ))?;
        let rows = stmt.query_map(params![status.as_str()], map_ambulance)?;
        collect_rows(rows)
    }

    pub fn update_ambulance_status(&self, id: &str, status: AmbulanceStatus) -> Result<Ambulance> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE ambulances SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now_timestamp()],
        )?;
        if changed == 0 {
            return Err(DispatchError::not_found("ambulance", id));
        }
        let updated =
            query_ambulance(&tx, id)?.ok_or_else(|| DispatchError::not_found("ambulance", id))?;
        feed::record_change(&tx, Table::Ambulances, ChangeKind::Update, id, Some(&updated))?;
        tx.commit()?;
        Ok(updated)
    }

    pub fn update_ambulance_location(&self, id: &str, coordinates: Coordinates) -> Result<Ambulance> {
        let now = now_timestamp();
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE ambulances
             SET last_latitude = ?2, last_longitude = ?3, last_updated = ?4, updated_at = ?4
             WHERE id = ?1",
            params![id, coordinates.latitude, coordinates.longitude, now],
        )?;
        if changed == 0 {
            return Err(DispatchError::not_found("ambulance", id));
        }
        let updated =
            query_ambulance(&tx, id)?.ok_or_else(|| DispatchError::not_found("ambulance", id))?;
        feed::record_change(&tx, Table::Ambulances, ChangeKind::Update, id, Some(&updated))?;
        tx.commit()?;
        Ok(updated)
    }

    pub fn delete_ambulance(&self, id: &str) -> Result<()> {
        self.delete_row(Table::Ambulances, "ambulance", id)
    }

    // ---- patients ----

    pub fn insert_patient(&self, draft: &PatientDraft) -> Result<Patient> {
        let patient = Patient {
            id: new_record_id(),
            name: draft.name.clone(),
            phone: draft.phone.clone(),
            address: draft.address.clone(),
            medical_notes: draft.medical_notes.clone(),
            emergency_contact: draft.emergency_contact.clone(),
            created_at: now_timestamp(),
        };

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO patients (id, name, phone, address, medical_notes, emergency_contact, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                patient.id,
                patient.name,
                patient.phone,
                patient.address,
                patient.medical_notes,
                patient.emergency_contact,
                patient.created_at,
            ],
        )?;
        feed::record_change(&tx, Table::Patients, ChangeKind::Insert, &patient.id, Some(&patient))?;
        tx.commit()?;
        Ok(patient)
    }

    /// Patients ordered by name.
    pub fn list_patients(&self) -> Result<Vec<Patient>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY name ASC, id ASC"
        ))?;
        let rows = stmt.query_map([], map_patient)?;
        collect_rows(rows)
    }

    pub fn update_patient(&self, id: &str, draft: &PatientDraft) -> Result<Patient> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE patients
             SET name = ?2, phone = ?3, address = ?4, medical_notes = ?5, emergency_contact = ?6
             WHERE id = ?1",
            params![
                id,
                draft.name,
                draft.phone,
                draft.address,
                draft.medical_notes,
                draft.emergency_contact,
            ],
        )?;
        if changed == 0 {
            return Err(DispatchError::not_found("patient", id));
        }
        let updated = tx
            .query_row(
                &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?1"),
                params![id],
                map_patient,
            )
            .optional()?
            .ok_or_else(|| DispatchError::not_found("patient", id))?;
        feed::record_change(&tx, Table::Patients, ChangeKind::Update, id, Some(&updated))?;
        tx.commit()?;
        Ok(updated)
    }

    pub fn delete_patient(&self, id: &str) -> Result<()> {
        self.delete_row(Table::Patients, "patient", id)
    }

    // ---- reports ----

    pub fn insert_report(&self, draft: &ReportDraft) -> Result<Report> {
        let report = Report {
            id: new_record_id(),
            title: draft.title.clone(),
            description: draft.description.clone(),
            emergency_id: draft.emergency_id.clone(),
            ambulance_id: draft.ambulance_id.clone(),
            report_date: draft.report_date.clone(),
            created_at: now_timestamp(),
        };

        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO reports (id, title, description, emergency_id, ambulance_id, report_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                report.id,
                report.title,
                report.description,
                report.emergency_id,
                report.ambulance_id,
                report.report_date,
                report.created_at,
            ],
        )?;
        feed::record_change(&tx, Table::Reports, ChangeKind::Insert, &report.id, Some(&report))?;
        tx.commit()?;
        Ok(report)
    }

    /// Reports with the most recent `report_date` first.
    pub fn list_reports(&self) -> Result<Vec<Report>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {REPORT_COLUMNS} FROM reports ORDER BY report_date DESC, id ASC"
        ))?;
        let rows = stmt.query_map([], map_report)?;
        collect_rows(rows)
    }

    pub fn delete_report(&self, id: &str) -> Result<()> {
        self.delete_row(Table::Reports, "report", id)
    }

    // ---- operators ----

    pub fn insert_operator(&self, operator: &Operator) -> Result<()> {
        let conn = self.connect()?;
        conn.execute(
            "INSERT INTO operators (id, name, email, role, hospital_id) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                operator.id,
                operator.name,
                operator.email,
                operator.role.as_str(),
                operator.hospital_id,
            ],
        )
        .map_err(conflict_on_duplicate("operator", &operator.email))?;
        Ok(())
    }

    pub fn operator_by_email(&self, email: &str) -> Result<Option<Operator>> {
        let conn = self.connect()?;
        let operator = conn
            .query_row(
                "SELECT id, name, email, role, hospital_id FROM operators
                 WHERE lower(email) = lower(?1)",
                params![email.trim()],
                |row| {
                    Ok(Operator {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        role: parse_column(row, 3)?,
                        hospital_id: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(operator)
    }

    fn delete_row(&self, table: Table, entity: &'static str, id: &str) -> Result<()> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            &format!("DELETE FROM {} WHERE id = ?1", table.as_str()),
            params![id],
        )?;
        if changed == 0 {
            return Err(DispatchError::not_found(entity, id));
        }
        feed::record_change::<()>(&tx, table, ChangeKind::Delete, id, None)?;
        tx.commit()?;
        Ok(())
    }
}

fn query_emergency(conn: &Connection, id: &str) -> Result<Option<EmergencyRequest>> {
    let request = conn
        .query_row(
            &format!("SELECT {EMERGENCY_COLUMNS} FROM emergency_requests WHERE id = ?1"),
            params![id],
            map_emergency,
        )
        .optional()?;
    Ok(request)
}

fn query_ambulance(conn: &Connection, id: &str) -> Result<Option<Ambulance>> {
    let ambulance = conn
        .query_row(
            &format!("SELECT {AMBULANCE_COLUMNS} FROM ambulances WHERE id = ?1"),
            params![id],
            map_ambulance,
        )
        .optional()?;
    Ok(ambulance)
}

/// Maps a UNIQUE or PRIMARY KEY violation to `Conflict`; anything else
/// stays a store error.
fn conflict_on_duplicate<'a>(
    entity: &'static str,
    id: &'a str,
) -> impl FnOnce(rusqlite::Error) -> DispatchError + 'a {
    move |err| match err.sqlite_error_code() {
        Some(rusqlite::ErrorCode::ConstraintViolation) => DispatchError::Conflict {
            entity,
            id: id.to_string(),
        },
        _ => err.into(),
    }
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

pub(crate) fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = DispatchError>,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

fn map_emergency(row: &Row<'_>) -> rusqlite::Result<EmergencyRequest> {
    Ok(EmergencyRequest {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        location: Location {
            address: row.get(3)?,
            coordinates: Coordinates {
                latitude: row.get(4)?,
                longitude: row.get(5)?,
            },
        },
        timestamp: row.get(6)?,
        status: parse_column(row, 7)?,
        notes: row.get(8)?,
        ambulance_id: row.get(9)?,
        updated_at: row.get(10)?,
    })
}

fn map_ambulance(row: &Row<'_>) -> rusqlite::Result<Ambulance> {
    let latitude: Option<f64> = row.get(6)?;
    let longitude: Option<f64> = row.get(7)?;
    let last_updated: Option<String> = row.get(8)?;
    let updated_at: Option<String> = row.get(9)?;

    let last_location = match (latitude, longitude) {
        (Some(latitude), Some(longitude)) => Some(LastLocation {
            latitude,
            longitude,
            timestamp: last_updated
                .or_else(|| updated_at.clone())
                .unwrap_or_default(),
        }),
        _ => None,
    };

    Ok(Ambulance {
        id: row.get(0)?,
        name: row.get(1)?,
        vehicle_number: row.get(2)?,
        driver: Driver {
            name: row.get(3)?,
            phone: row.get(4)?,
        },
        status: parse_column(row, 5)?,
        last_location,
        updated_at,
    })
}

fn map_patient(row: &Row<'_>) -> rusqlite::Result<Patient> {
    Ok(Patient {
        id: row.get(0)?,
        name: row.get(1)?,
        phone: row.get(2)?,
        address: row.get(3)?,
        medical_notes: row.get(4)?,
        emergency_contact: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn map_report(row: &Row<'_>) -> rusqlite::Result<Report> {
    Ok(Report {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        emergency_id: row.get(3)?,
        ambulance_id: row.get(4)?,
        report_date: row.get(5)?,
        created_at: row.get(6)?,
    })
}
