pub mod commands;
pub mod runtime;
pub mod state;

use crate::state::AppState;
use dispatch_core::config::DispatchConfig;
use dispatch_core::records::{
    AmbulanceStatus, Coordinates, Driver, EmergencyStatus, Location, NewAmbulance, NewEmergency,
    Operator, OperatorRole,
};
use dispatch_core::session::SessionStore;
use dispatch_core::Store;
#[cfg(feature = "desktop")]
use tauri::Manager;

pub const DEMO_OPERATOR_EMAIL: &str = "dispatch@city.example";

pub fn build_state(config: &DispatchConfig) -> Result<AppState, String> {
    let store = Store::open(&config.db_path).map_err(|e| e.to_string())?;
    let session = SessionStore::open(&config.session_path).map_err(|e| e.to_string())?;
    Ok(AppState::new(
        store,
        session,
        config.assistant.clone(),
        config.poll_interval,
        config.change_retention,
    ))
}

pub fn run() -> Result<(), String> {
    let config = DispatchConfig::from_env().map_err(|e| e.to_string())?;
    let state = build_state(&config)?;
    let listener =
        runtime::start_with_sink(&state, runtime::LogSink).map_err(|e| e.to_string())?;

    print_json("dashboard", &commands::dashboard(&state)?)?;
    tracing::info!(db = %config.db_path.display(), "listening for changes; interrupt to stop");
    listener
        .join()
        .map_err(|_| "change listener thread panicked".to_string())
}

#[cfg(feature = "desktop")]
pub fn run_tauri() {
    let result = tauri::Builder::default()
        .setup(|app| {
            let config = DispatchConfig::from_env()
                .map_err(|e| -> Box<dyn std::error::Error> { e.to_string().into() })?;
            let state =
                build_state(&config).map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;

            if state
                .store
                .list_ambulances()
                .map_err(|e| -> Box<dyn std::error::Error> { e.to_string().into() })?
                .is_empty()
            {
                seed_demo_data(&state).map_err(|e| -> Box<dyn std::error::Error> { e.into() })?;
            }

            runtime::start_tauri_runtime(&state, config.listen_addr.clone(), app.handle());
            app.manage(state);
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::sign_in_cmd,
            commands::sign_out_cmd,
            commands::current_operator_cmd,
            commands::dashboard_cmd,
            commands::list_emergencies_cmd,
            commands::get_emergency_cmd,
            commands::available_ambulances_cmd,
            commands::list_ambulances_cmd,
            commands::dispatch_cmd,
            commands::complete_cmd,
            commands::cancel_cmd,
            commands::create_emergency_cmd,
            commands::delete_emergency_cmd,
            commands::create_ambulance_cmd,
            commands::set_ambulance_status_cmd,
            commands::update_ambulance_location_cmd,
            commands::delete_ambulance_cmd,
            commands::update_notes_cmd,
            commands::list_patients_cmd,
            commands::save_patient_cmd,
            commands::delete_patient_cmd,
            commands::list_reports_cmd,
            commands::create_report_cmd,
            commands::delete_report_cmd,
            commands::ask_assistant_cmd
        ])
        .run(tauri::generate_context!());
    if let Err(err) = result {
        tracing::error!(error = %err, "dispatch console exited with an error");
    }
}

pub fn run_demo() -> Result<(), String> {
    let config = DispatchConfig::from_env().map_err(|e| e.to_string())?;
    let state = build_state(&config)?;
    seed_demo_data(&state)?;
    commands::sign_in(&state, DEMO_OPERATOR_EMAIL.into())?;

    print_json("dashboard", &commands::dashboard(&state)?)?;
    print_json("available ambulances", &commands::available_ambulances(&state)?)?;

    let pending = commands::list_emergencies(
        &state,
        dispatch_core::listing::EmergencyQuery {
            status: Some(EmergencyStatus::Pending),
            ..Default::default()
        },
    )?;
    let available = commands::available_ambulances(&state)?;
    if let (Some(request), Some(ambulance)) = (pending.first(), available.first()) {
        let dispatched = commands::dispatch(&state, request.id.clone(), ambulance.id.clone())?;
        print_json("dispatched", &dispatched)?;
        print_json("detail", &commands::get_emergency(&state, dispatched.id)?)?;
    }

    print_json("dashboard", &commands::dashboard(&state)?)?;
    Ok(())
}

fn print_json(label: &str, value: &impl serde::Serialize) -> Result<(), String> {
    println!(
        "{label}:\n{}",
        serde_json::to_string_pretty(value).map_err(|e| e.to_string())?
    );
    Ok(())
}

/// Seeds one operator, three ambulances and two requests. No-op when the
/// demo ambulances already exist.
pub fn seed_demo_data(state: &AppState) -> Result<(), String> {
    let store = &state.store;
    if store.get_ambulance("amb1").map_err(|e| e.to_string())?.is_some() {
        return Ok(());
    }

    store
        .insert_operator(&Operator {
            id: "op-1".into(),
            name: "City Dispatch".into(),
            email: DEMO_OPERATOR_EMAIL.into(),
            role: OperatorRole::Dispatcher,
            hospital_id: "hosp-1".into(),
        })
        .map_err(|e| e.to_string())?;

    for (id, name, vehicle, driver, status) in [
        ("amb1", "Ambulance 1", "DL-01-AB-1234", "Raj Kumar", AmbulanceStatus::Available),
        ("amb2", "Ambulance 2", "DL-01-CD-5678", "Vikram Singh", AmbulanceStatus::Maintenance),
        ("amb3", "Ambulance 3", "DL-01-EF-9012", "Suresh Yadav", AmbulanceStatus::Dispatched),
    ] {
        store
            .insert_ambulance(&NewAmbulance {
                id: Some(id.into()),
                name: name.into(),
                vehicle_number: vehicle.into(),
                driver: Driver {
                    name: driver.into(),
                    phone: "+91-8765432109".into(),
                },
                status,
            })
            .map_err(|e| e.to_string())?;
    }

    for (id, name, address, latitude, longitude) in [
        ("er001", "Sunita Verma", "Connaught Place, New Delhi", 28.6315, 77.2167),
        ("er002", "Amit Patel", "Karol Bagh, New Delhi", 28.6519, 77.1909),
    ] {
        store
            .insert_emergency(&NewEmergency {
                id: Some(id.into()),
                name: name.into(),
                phone: "+91-9876543210".into(),
                location: Location {
                    address: address.into(),
                    coordinates: Coordinates {
                        latitude,
                        longitude,
                    },
                },
                timestamp: None,
                status: EmergencyStatus::Pending,
                notes: None,
            })
            .map_err(|e| e.to_string())?;
    }
    store
        .update_emergency_status("er002", EmergencyStatus::Dispatched, Some("amb3"))
        .map_err(|e| e.to_string())?;

    tracing::info!("demo data seeded");
    Ok(())
}
