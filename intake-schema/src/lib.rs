use serde::{Deserialize, Serialize};

pub const EMERGENCY_V1: &str = "emergency.v1";

/// An emergency call normalized from any intake source. `id` may be empty,
/// in which case the store assigns one.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CanonicalEmergencyV1 {
    pub schema: String,
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub notes: Option<String>,
    pub source: String,
    pub received_at: String,
}

pub fn validate_emergency_v1(call: &CanonicalEmergencyV1) -> Result<(), String> {
    if call.schema != EMERGENCY_V1 {
        return Err(format!("unsupported schema '{}'", call.schema));
    }
    if call.name.trim().is_empty() {
        return Err("name is required".into());
    }
    if call.phone.trim().is_empty() {
        return Err("phone is required".into());
    }
    if call.address.trim().is_empty() {
        return Err("address is required".into());
    }
    if !(-90.0..=90.0).contains(&call.latitude) {
        return Err(format!("latitude {} out of range", call.latitude));
    }
    if !(-180.0..=180.0).contains(&call.longitude) {
        return Err(format!("longitude {} out of range", call.longitude));
    }
    Ok(())
}
