use crate::blocking;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use dispatch_core::records::{now_timestamp, Coordinates, EmergencyStatus, Location, NewEmergency};
use dispatch_core::{DispatchError, Store};
use intake_schema::{validate_emergency_v1, CanonicalEmergencyV1, EMERGENCY_V1};
use serde_json::{json, Value};
use tracing::{error, info, warn};

/// Turns a source-specific payload into a validated `emergency.v1` call.
pub trait IntakeAdapter: Send + Sync + 'static {
    fn parse(&self, payload: &Value) -> Result<CanonicalEmergencyV1, String>;
}

/// Flat payloads from web forms and the caller app. Accepts both the flat
/// `address`/`latitude`/`longitude` form and the nested `location` form.
pub struct GenericAdapter;

/// Call-center CAD exports: `{ call_id, caller: { name, number }, incident: { address, geo: { lat, lng }, remarks } }`.
pub struct CallCenterAdapter;

impl IntakeAdapter for GenericAdapter {
    fn parse(&self, payload: &Value) -> Result<CanonicalEmergencyV1, String> {
        let location = payload.get("location");
        let coordinates = location.and_then(|l| l.get("coordinates"));

        let call = CanonicalEmergencyV1 {
            schema: EMERGENCY_V1.into(),
            id: str_field(payload, &["id"]).unwrap_or_default(),
            name: str_field(payload, &["name", "caller_name"]).unwrap_or_default(),
            phone: str_field(payload, &["phone", "caller_phone"]).unwrap_or_default(),
            address: str_field(payload, &["address"])
                .or_else(|| location.and_then(|l| str_field(l, &["address"])))
                .unwrap_or_default(),
            latitude: num_field(payload, &["latitude", "lat"])
                .or_else(|| coordinates.and_then(|c| num_field(c, &["latitude"])))
                .ok_or_else(|| "latitude is required".to_string())?,
            longitude: num_field(payload, &["longitude", "lng"])
                .or_else(|| coordinates.and_then(|c| num_field(c, &["longitude"])))
                .ok_or_else(|| "longitude is required".to_string())?,
            notes: str_field(payload, &["notes"]),
            source: "generic".into(),
            received_at: now_timestamp(),
        };
        validate_emergency_v1(&call)?;
        Ok(call)
    }
}

impl IntakeAdapter for CallCenterAdapter {
    fn parse(&self, payload: &Value) -> Result<CanonicalEmergencyV1, String> {
        let caller = payload
            .get("caller")
            .ok_or_else(|| "call-center payload missing caller".to_string())?;
        let incident = payload
            .get("incident")
            .ok_or_else(|| "call-center payload missing incident".to_string())?;
        let geo = incident
            .get("geo")
            .ok_or_else(|| "call-center payload missing incident.geo".to_string())?;

        let call = CanonicalEmergencyV1 {
            schema: EMERGENCY_V1.into(),
            id: str_field(payload, &["call_id"]).unwrap_or_default(),
            name: str_field(caller, &["name"]).unwrap_or_else(|| "Unknown caller".into()),
            phone: str_field(caller, &["number", "phone"]).unwrap_or_default(),
            address: str_field(incident, &["address"]).unwrap_or_default(),
            latitude: num_field(geo, &["lat"]).ok_or_else(|| "incident.geo.lat is required".to_string())?,
            longitude: num_field(geo, &["lng", "lon"])
                .ok_or_else(|| "incident.geo.lng is required".to_string())?,
            notes: str_field(incident, &["remarks"]),
            source: "call-center".into(),
            received_at: now_timestamp(),
        };
        validate_emergency_v1(&call)?;
        Ok(call)
    }
}

pub fn intake_router(store: Store) -> Router {
    Router::new()
        .route("/intake/generic", post(handle_generic))
        .route("/intake/call-center", post(handle_call_center))
        .with_state(store)
}

/// The request a validated call becomes: always `pending`, stamped with the
/// time it was received.
pub fn to_new_emergency(call: CanonicalEmergencyV1) -> NewEmergency {
    NewEmergency {
        id: Some(call.id).filter(|id| !id.trim().is_empty()),
        name: call.name.trim().to_string(),
        phone: call.phone.trim().to_string(),
        location: Location {
            address: call.address.trim().to_string(),
            coordinates: Coordinates {
                latitude: call.latitude,
                longitude: call.longitude,
            },
        },
        timestamp: Some(call.received_at),
        status: EmergencyStatus::Pending,
        notes: call.notes.filter(|n| !n.trim().is_empty()),
    }
}

pub(crate) async fn handle_generic(
    State(store): State<Store>,
    payload: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let call = payload
        .map_err(|rejection| rejection.body_text())
        .and_then(|Json(payload)| GenericAdapter.parse(&payload));
    record_call(store, call).await
}

pub(crate) async fn handle_call_center(
    State(store): State<Store>,
    payload: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<Value>) {
    let call = payload
        .map_err(|rejection| rejection.body_text())
        .and_then(|Json(payload)| CallCenterAdapter.parse(&payload));
    record_call(store, call).await
}

async fn record_call(
    store: Store,
    call: Result<CanonicalEmergencyV1, String>,
) -> (StatusCode, Json<Value>) {
    let call = match call {
        Ok(call) => call,
        Err(reason) => {
            warn!(%reason, "rejected intake payload");
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": reason })));
        }
    };
    let source = call.source.clone();
    let new_request = to_new_emergency(call);

    match blocking(move || store.insert_emergency(&new_request)).await {
        Ok(request) => {
            info!(emergency_id = %request.id, %source, "emergency request received");
            (StatusCode::CREATED, Json(json!({ "id": request.id })))
        }
        Err(err @ DispatchError::Conflict { .. }) => {
            warn!(%source, error = %err, "duplicate intake call");
            (StatusCode::CONFLICT, Json(json!({ "error": err.to_string() })))
        }
        Err(err) => {
            error!(%source, error = %err, "failed to store emergency request");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "error": err.to_string() })),
            )
        }
    }
}

fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| value.get(*k).and_then(Value::as_str))
        .map(ToString::to_string)
}

fn num_field(value: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| value.get(*k).and_then(Value::as_f64))
}
