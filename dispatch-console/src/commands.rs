use crate::state::AppState;
use dispatch_core::assistant;
use dispatch_core::links::{directions_link, tel_link};
use dispatch_core::listing::{DashboardSummary, EmergencyQuery};
use dispatch_core::records::{
    Ambulance, AmbulanceStatus, Coordinates, EmergencyRequest, EmergencyStatus, NewAmbulance,
    NewEmergency, Operator, Patient, PatientDraft, Report, ReportDraft,
};
use dispatch_core::session::SessionStore;
use dispatch_core::{DispatchBackend, DispatchError};
use serde::{Deserialize, Serialize};
use std::sync::MutexGuard;

/// Detail view of one request with its call and navigation links.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmergencyDetailDto {
    pub request: EmergencyRequest,
    pub call_link: String,
    pub directions_link: String,
    pub ambulance: Option<Ambulance>,
}

fn banner(err: DispatchError) -> String {
    err.to_string()
}

fn session(state: &AppState) -> Result<MutexGuard<'_, SessionStore>, String> {
    state
        .session
        .lock()
        .map_err(|_| "session lock poisoned".to_string())
}

fn require_operator(state: &AppState) -> Result<Operator, String> {
    session(state)?
        .require_operator()
        .cloned()
        .map_err(banner)
}

fn required(field: &str, value: &str) -> Result<(), String> {
    if value.trim().is_empty() {
        return Err(banner(DispatchError::Validation(format!("{field} is required"))));
    }
    Ok(())
}

fn valid_coordinates(coordinates: Coordinates) -> Result<(), String> {
    if !(-90.0..=90.0).contains(&coordinates.latitude)
        || !(-180.0..=180.0).contains(&coordinates.longitude)
    {
        return Err(banner(DispatchError::Validation(
            "coordinates are out of range".into(),
        )));
    }
    Ok(())
}

pub fn sign_in(state: &AppState, email: String) -> Result<Operator, String> {
    required("email", &email)?;
    session(state)?.sign_in(&state.store, &email).map_err(banner)
}

pub fn sign_out(state: &AppState) -> Result<(), String> {
    session(state)?.sign_out().map_err(banner)
}

pub fn current_operator(state: &AppState) -> Result<Option<Operator>, String> {
    Ok(session(state)?.current().cloned())
}

pub fn dashboard(state: &AppState) -> Result<DashboardSummary, String> {
    let requests = state.store.list_emergencies().map_err(banner)?;
    let ambulances = state.store.list_ambulances().map_err(banner)?;
    Ok(DashboardSummary::from_records(&requests, &ambulances))
}

pub fn list_emergencies(
    state: &AppState,
    query: EmergencyQuery,
) -> Result<Vec<EmergencyRequest>, String> {
    let requests = state.store.list_emergencies().map_err(banner)?;
    Ok(query.apply(requests))
}

pub fn get_emergency(state: &AppState, emergency_id: String) -> Result<EmergencyDetailDto, String> {
    let request = state.dispatch.backend().emergency(&emergency_id).map_err(banner)?;
    let ambulance = match request.ambulance_id.as_deref() {
        Some(id) => state.store.get_ambulance(id).map_err(banner)?,
        None => None,
    };

    Ok(EmergencyDetailDto {
        call_link: tel_link(&request.phone),
        directions_link: directions_link(request.location.coordinates),
        ambulance,
        request,
    })
}

pub fn available_ambulances(state: &AppState) -> Result<Vec<Ambulance>, String> {
    state.dispatch.fetch_available_ambulances().map_err(banner)
}

pub fn list_ambulances(state: &AppState) -> Result<Vec<Ambulance>, String> {
    state.store.list_ambulances().map_err(banner)
}

pub fn dispatch(
    state: &AppState,
    emergency_id: String,
    ambulance_id: String,
) -> Result<EmergencyRequest, String> {
    require_operator(state)?;
    state
        .dispatch
        .dispatch_ambulance(&emergency_id, &ambulance_id)
        .map_err(banner)?;
    state
        .dispatch
        .backend()
        .emergency(emergency_id.trim())
        .map_err(banner)
}

pub fn complete(state: &AppState, emergency_id: String) -> Result<EmergencyRequest, String> {
    require_operator(state)?;
    state.dispatch.complete_emergency(&emergency_id).map_err(banner)
}

pub fn cancel(state: &AppState, emergency_id: String) -> Result<EmergencyRequest, String> {
    require_operator(state)?;
    state.dispatch.cancel_emergency(&emergency_id).map_err(banner)
}

/// Manual form entry. The request always starts `pending` with a fresh
/// timestamp, whatever the form sent.
pub fn create_emergency(state: &AppState, new: NewEmergency) -> Result<EmergencyRequest, String> {
    let operator = require_operator(state)?;
    required("name", &new.name)?;
    required("phone", &new.phone)?;
    required("address", &new.location.address)?;
    valid_coordinates(new.location.coordinates)?;

    let request = state
        .store
        .insert_emergency(&NewEmergency {
            status: EmergencyStatus::Pending,
            timestamp: None,
            notes: new.notes.filter(|n| !n.trim().is_empty()),
            ..new
        })
        .map_err(banner)?;
    tracing::info!(operator = %operator.email, emergency_id = %request.id, "request entered by hand");
    Ok(request)
}

pub fn delete_emergency(state: &AppState, emergency_id: String) -> Result<(), String> {
    require_operator(state)?;
    state.store.delete_emergency(emergency_id.trim()).map_err(banner)
}

pub fn create_ambulance(state: &AppState, new: NewAmbulance) -> Result<Ambulance, String> {
    require_operator(state)?;
    required("name", &new.name)?;
    required("vehicle number", &new.vehicle_number)?;
    required("driver name", &new.driver.name)?;
    state.store.insert_ambulance(&new).map_err(banner)
}

/// Manual status correction, including taking a unit into or out of
/// maintenance.
pub fn set_ambulance_status(
    state: &AppState,
    ambulance_id: String,
    status: AmbulanceStatus,
) -> Result<Ambulance, String> {
    let operator = require_operator(state)?;
    let ambulance = state
        .store
        .update_ambulance_status(ambulance_id.trim(), status)
        .map_err(banner)?;
    tracing::info!(
        operator = %operator.email,
        ambulance_id = %ambulance.id,
        %status,
        "ambulance status set by hand"
    );
    Ok(ambulance)
}

pub fn update_ambulance_location(
    state: &AppState,
    ambulance_id: String,
    coordinates: Coordinates,
) -> Result<Ambulance, String> {
    require_operator(state)?;
    valid_coordinates(coordinates)?;
    state
        .store
        .update_ambulance_location(ambulance_id.trim(), coordinates)
        .map_err(banner)
}

pub fn delete_ambulance(state: &AppState, ambulance_id: String) -> Result<(), String> {
    require_operator(state)?;
    state.store.delete_ambulance(ambulance_id.trim()).map_err(banner)
}

pub fn update_notes(
    state: &AppState,
    emergency_id: String,
    notes: Option<String>,
) -> Result<EmergencyRequest, String> {
    require_operator(state)?;
    let notes = notes.as_deref().map(str::trim).filter(|n| !n.is_empty());
    state
        .store
        .update_emergency_notes(&emergency_id, notes)
        .map_err(banner)
}

pub fn list_patients(state: &AppState) -> Result<Vec<Patient>, String> {
    state.store.list_patients().map_err(banner)
}

/// Creates the patient when `patient_id` is `None`, otherwise edits it.
pub fn save_patient(
    state: &AppState,
    patient_id: Option<String>,
    draft: PatientDraft,
) -> Result<Patient, String> {
    require_operator(state)?;
    required("name", &draft.name)?;
    required("phone", &draft.phone)?;
    match patient_id {
        Some(id) => state.store.update_patient(&id, &draft),
        None => state.store.insert_patient(&draft),
    }
    .map_err(banner)
}

pub fn delete_patient(state: &AppState, patient_id: String) -> Result<(), String> {
    require_operator(state)?;
    state.store.delete_patient(&patient_id).map_err(banner)
}

pub fn list_reports(state: &AppState) -> Result<Vec<Report>, String> {
    state.store.list_reports().map_err(banner)
}

pub fn create_report(state: &AppState, draft: ReportDraft) -> Result<Report, String> {
    require_operator(state)?;
    required("title", &draft.title)?;
    required("report date", &draft.report_date)?;
    state.store.insert_report(&draft).map_err(banner)
}

pub fn delete_report(state: &AppState, report_id: String) -> Result<(), String> {
    require_operator(state)?;
    state.store.delete_report(&report_id).map_err(banner)
}

/// Always answers: without an assistant configured, or on any failure, the
/// reply is the fixed apology text.
pub fn ask_assistant(state: &AppState, question: String) -> Result<String, String> {
    required("question", &question)?;
    let Some(config) = state.assistant.as_ref() else {
        tracing::warn!("assistant asked but no API key is configured");
        return Ok(assistant::APOLOGY.to_string());
    };
    let summary = dashboard(state).ok();
    Ok(assistant::ask_or_apology(config, &question, summary.as_ref()))
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn sign_in_cmd(state: tauri::State<'_, AppState>, email: String) -> Result<Operator, String> {
    sign_in(&state, email)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn sign_out_cmd(state: tauri::State<'_, AppState>) -> Result<(), String> {
    sign_out(&state)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn current_operator_cmd(state: tauri::State<'_, AppState>) -> Result<Option<Operator>, String> {
    current_operator(&state)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn dashboard_cmd(state: tauri::State<'_, AppState>) -> Result<DashboardSummary, String> {
    dashboard(&state)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn list_emergencies_cmd(
    state: tauri::State<'_, AppState>,
    query: Option<EmergencyQuery>,
) -> Result<Vec<EmergencyRequest>, String> {
    list_emergencies(&state, query.unwrap_or_default())
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn get_emergency_cmd(
    state: tauri::State<'_, AppState>,
    emergency_id: String,
) -> Result<EmergencyDetailDto, String> {
    get_emergency(&state, emergency_id)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn available_ambulances_cmd(state: tauri::State<'_, AppState>) -> Result<Vec<Ambulance>, String> {
    available_ambulances(&state)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn list_ambulances_cmd(state: tauri::State<'_, AppState>) -> Result<Vec<Ambulance>, String> {
    list_ambulances(&state)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn dispatch_cmd(
    state: tauri::State<'_, AppState>,
    emergency_id: String,
    ambulance_id: String,
) -> Result<EmergencyRequest, String> {
    dispatch(&state, emergency_id, ambulance_id)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn complete_cmd(
    state: tauri::State<'_, AppState>,
    emergency_id: String,
) -> Result<EmergencyRequest, String> {
    complete(&state, emergency_id)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn cancel_cmd(
    state: tauri::State<'_, AppState>,
    emergency_id: String,
) -> Result<EmergencyRequest, String> {
    cancel(&state, emergency_id)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn create_emergency_cmd(
    state: tauri::State<'_, AppState>,
    request: NewEmergency,
) -> Result<EmergencyRequest, String> {
    create_emergency(&state, request)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn delete_emergency_cmd(state: tauri::State<'_, AppState>, emergency_id: String) -> Result<(), String> {
    delete_emergency(&state, emergency_id)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn create_ambulance_cmd(
    state: tauri::State<'_, AppState>,
    ambulance: NewAmbulance,
) -> Result<Ambulance, String> {
    create_ambulance(&state, ambulance)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn set_ambulance_status_cmd(
    state: tauri::State<'_, AppState>,
    ambulance_id: String,
    status: AmbulanceStatus,
) -> Result<Ambulance, String> {
    set_ambulance_status(&state, ambulance_id, status)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn update_ambulance_location_cmd(
    state: tauri::State<'_, AppState>,
    ambulance_id: String,
    coordinates: Coordinates,
) -> Result<Ambulance, String> {
    update_ambulance_location(&state, ambulance_id, coordinates)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn delete_ambulance_cmd(state: tauri::State<'_, AppState>, ambulance_id: String) -> Result<(), String> {
    delete_ambulance(&state, ambulance_id)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn update_notes_cmd(
    state: tauri::State<'_, AppState>,
    emergency_id: String,
    notes: Option<String>,
) -> Result<EmergencyRequest, String> {
    update_notes(&state, emergency_id, notes)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn list_patients_cmd(state: tauri::State<'_, AppState>) -> Result<Vec<Patient>, String> {
    list_patients(&state)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn save_patient_cmd(
    state: tauri::State<'_, AppState>,
    patient_id: Option<String>,
    draft: PatientDraft,
) -> Result<Patient, String> {
    save_patient(&state, patient_id, draft)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn delete_patient_cmd(state: tauri::State<'_, AppState>, patient_id: String) -> Result<(), String> {
    delete_patient(&state, patient_id)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn list_reports_cmd(state: tauri::State<'_, AppState>) -> Result<Vec<Report>, String> {
    list_reports(&state)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn create_report_cmd(
    state: tauri::State<'_, AppState>,
    draft: ReportDraft,
) -> Result<Report, String> {
    create_report(&state, draft)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn delete_report_cmd(state: tauri::State<'_, AppState>, report_id: String) -> Result<(), String> {
    delete_report(&state, report_id)
}

#[cfg(feature = "desktop")]
#[tauri::command(rename_all = "camelCase")]
pub fn ask_assistant_cmd(state: tauri::State<'_, AppState>, question: String) -> Result<String, String> {
    ask_assistant(&state, question)
}
