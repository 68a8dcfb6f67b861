use crate::error::DispatchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    Pending,
    Requested,
    Confirming,
    Dispatched,
    EnRoute,
    Arrived,
    Completed,
    Cancelled,
}

impl EmergencyStatus {
    pub const ALL: [EmergencyStatus; 8] = [
        EmergencyStatus::Pending,
        EmergencyStatus::Requested,
        EmergencyStatus::Confirming,
        EmergencyStatus::Dispatched,
        EmergencyStatus::EnRoute,
        EmergencyStatus::Arrived,
        EmergencyStatus::Completed,
        EmergencyStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmergencyStatus::Pending => "pending",
            EmergencyStatus::Requested => "requested",
            EmergencyStatus::Confirming => "confirming",
            EmergencyStatus::Dispatched => "dispatched",
            EmergencyStatus::EnRoute => "en_route",
            EmergencyStatus::Arrived => "arrived",
            EmergencyStatus::Completed => "completed",
            EmergencyStatus::Cancelled => "cancelled",
        }
    }

    /// Still waiting for an ambulance to be assigned.
    pub fn is_awaiting_dispatch(&self) -> bool {
        matches!(
            self,
            EmergencyStatus::Pending | EmergencyStatus::Requested | EmergencyStatus::Confirming
        )
    }

    /// An ambulance is assigned and the request is not closed yet.
    pub fn is_active_dispatch(&self) -> bool {
        matches!(
            self,
            EmergencyStatus::Dispatched | EmergencyStatus::EnRoute | EmergencyStatus::Arrived
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EmergencyStatus::Completed | EmergencyStatus::Cancelled)
    }
}

impl fmt::Display for EmergencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EmergencyStatus {
    type Err = DispatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let lower = value.trim().to_lowercase();
        EmergencyStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == lower)
            .ok_or_else(|| DispatchError::Validation(format!("unknown emergency status '{value}'")))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbulanceStatus {
    Available,
    Dispatched,
    Maintenance,
}

impl AmbulanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmbulanceStatus::Available => "available",
            AmbulanceStatus::Dispatched => "dispatched",
            AmbulanceStatus::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for AmbulanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AmbulanceStatus {
    type Err = DispatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "available" => Ok(AmbulanceStatus::Available),
            "dispatched" => Ok(AmbulanceStatus::Dispatched),
            "maintenance" => Ok(AmbulanceStatus::Maintenance),
            other => Err(DispatchError::Validation(format!(
                "unknown ambulance status '{other}'"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub address: String,
    pub coordinates: Coordinates,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergencyRequest {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub location: Location,
    pub timestamp: String,
    pub status: EmergencyStatus,
    pub notes: Option<String>,
    pub ambulance_id: Option<String>,
    pub updated_at: Option<String>,
}

/// Fields supplied when an emergency request is created. `id` and
/// `timestamp` are generated when absent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewEmergency {
    pub id: Option<String>,
    pub name: String,
    pub phone: String,
    pub location: Location,
    pub timestamp: Option<String>,
    pub status: EmergencyStatus,
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Driver {
    pub name: String,
    pub phone: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LastLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ambulance {
    pub id: String,
    pub name: String,
    pub vehicle_number: String,
    pub driver: Driver,
    pub status: AmbulanceStatus,
    pub last_location: Option<LastLocation>,
    pub updated_at: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewAmbulance {
    pub id: Option<String>,
    pub name: String,
    pub vehicle_number: String,
    pub driver: Driver,
    pub status: AmbulanceStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: String,
    pub name: String,
    pub phone: String,
    pub address: Option<String>,
    pub medical_notes: Option<String>,
    pub emergency_contact: Option<String>,
    pub created_at: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientDraft {
    pub name: String,
    pub phone: String,
    pub address: Option<String>,
    pub medical_notes: Option<String>,
    pub emergency_contact: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub emergency_id: Option<String>,
    pub ambulance_id: Option<String>,
    pub report_date: String,
    pub created_at: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDraft {
    pub title: String,
    pub description: Option<String>,
    pub emergency_id: Option<String>,
    pub ambulance_id: Option<String>,
    pub report_date: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorRole {
    Admin,
    Dispatcher,
    Driver,
}

impl OperatorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperatorRole::Admin => "admin",
            OperatorRole::Dispatcher => "dispatcher",
            OperatorRole::Driver => "driver",
        }
    }
}

impl FromStr for OperatorRole {
    type Err = DispatchError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "admin" => Ok(OperatorRole::Admin),
            "dispatcher" => Ok(OperatorRole::Dispatcher),
            "driver" => Ok(OperatorRole::Driver),
            other => Err(DispatchError::Validation(format!("unknown operator role '{other}'"))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operator {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: OperatorRole,
    pub hospital_id: String,
}

pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub fn new_record_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
