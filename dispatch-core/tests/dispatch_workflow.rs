use dispatch_core::realtime::{LiveView, Reaction};
use dispatch_core::records::{
    AmbulanceStatus, Coordinates, Driver, EmergencyStatus, Location, NewAmbulance, NewEmergency,
};
use dispatch_core::{DispatchError, DispatchService, Store};
use std::path::PathBuf;

fn db_path(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    std::env::temp_dir()
        .join("dispatch-core-it")
        .join(format!("{name}-{nanos}.db"))
}

fn seed_request(store: &Store, id: &str, status: EmergencyStatus) {
    store
        .insert_emergency(&NewEmergency {
            id: Some(id.into()),
            name: "Anita Rao".into(),
            phone: "+91-9988776655".into(),
            location: Location {
                address: "4 Lodhi Road".into(),
                coordinates: Coordinates {
                    latitude: 28.59,
                    longitude: 77.22,
                },
            },
            timestamp: None,
            status,
            notes: None,
        })
        .expect("seed request");
}

fn seed_ambulance(store: &Store, id: &str, status: AmbulanceStatus) {
    store
        .insert_ambulance(&NewAmbulance {
            id: Some(id.into()),
            name: format!("Ambulance {id}"),
            vehicle_number: format!("DL-{id}"),
            driver: Driver {
                name: "Raj Kumar".into(),
                phone: "+91-8765432109".into(),
            },
            status,
        })
        .expect("seed ambulance");
}

#[test]
fn dispatch_pending_request() {
    let store = Store::open(db_path("dispatch")).expect("open");
    seed_request(&store, "er001", EmergencyStatus::Pending);
    seed_ambulance(&store, "amb1", AmbulanceStatus::Available);
    let service = DispatchService::new(store.clone());

    assert!(service.dispatch_ambulance("er001", "amb1").expect("dispatch"));

    let request = store.get_emergency("er001").expect("get").expect("row");
    assert_eq!(request.status, EmergencyStatus::Dispatched);
    assert_eq!(request.ambulance_id.as_deref(), Some("amb1"));
    let ambulance = store.get_ambulance("amb1").expect("get").expect("row");
    assert_eq!(ambulance.status, AmbulanceStatus::Dispatched);
}

#[test]
fn complete_dispatched_request_releases_ambulance() {
    let store = Store::open(db_path("complete")).expect("open");
    seed_request(&store, "er002", EmergencyStatus::Pending);
    seed_ambulance(&store, "amb3", AmbulanceStatus::Dispatched);
    store
        .update_emergency_status("er002", EmergencyStatus::Dispatched, Some("amb3"))
        .expect("mark dispatched");
    let service = DispatchService::new(store.clone());

    service.complete_emergency("er002").expect("complete");

    let request = store.get_emergency("er002").expect("get").expect("row");
    assert_eq!(request.status, EmergencyStatus::Completed);
    let ambulance = store.get_ambulance("amb3").expect("get").expect("row");
    assert_eq!(ambulance.status, AmbulanceStatus::Available);
}

#[test]
fn only_available_ambulances_are_offered() {
    let store = Store::open(db_path("available")).expect("open");
    seed_ambulance(&store, "a1", AmbulanceStatus::Available);
    seed_ambulance(&store, "a2", AmbulanceStatus::Dispatched);
    seed_ambulance(&store, "a3", AmbulanceStatus::Maintenance);
    let service = DispatchService::new(store);

    let available = service.fetch_available_ambulances().expect("fetch");
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].id, "a1");
}

#[test]
fn dispatching_deleted_ambulance_leaves_request_pending() {
    let store = Store::open(db_path("deleted-ambulance")).expect("open");
    seed_request(&store, "er010", EmergencyStatus::Confirming);
    let service = DispatchService::new(store.clone());

    let err = service.dispatch_ambulance("er010", "amb-gone").expect_err("missing");
    assert!(matches!(err, DispatchError::NotFound { .. }));
    let request = store.get_emergency("er010").expect("get").expect("row");
    assert_eq!(request.status, EmergencyStatus::Confirming);
}

#[test]
fn live_view_follows_dispatch_and_completion() {
    let store = Store::open(db_path("live")).expect("open");
    seed_ambulance(&store, "amb1", AmbulanceStatus::Available);
    let mut view = LiveView::load(store.clone()).expect("load");
    let service = DispatchService::new(store.clone());

    seed_request(&store, "er100", EmergencyStatus::Pending);
    let outcome = view.sync().expect("sync");
    assert!(matches!(
        outcome.reactions.as_slice(),
        [Reaction::NewEmergency(alert)] if alert.emergency_id == "er100"
    ));

    service.dispatch_ambulance("er100", "amb1").expect("dispatch");
    let outcome = view.sync().expect("sync");
    assert!(outcome.emergencies_changed());
    assert!(outcome.ambulances_changed());
    assert_eq!(
        view.emergency("er100").map(|r| r.status),
        Some(EmergencyStatus::Dispatched)
    );
    assert_eq!(
        view.ambulance("amb1").map(|a| a.status),
        Some(AmbulanceStatus::Dispatched)
    );

    service.cancel_emergency("er100").expect("cancel");
    view.sync().expect("sync");
    assert_eq!(
        view.emergency("er100").map(|r| r.status),
        Some(EmergencyStatus::Cancelled)
    );
    assert_eq!(
        view.ambulance("amb1").map(|a| a.status),
        Some(AmbulanceStatus::Available)
    );
}
