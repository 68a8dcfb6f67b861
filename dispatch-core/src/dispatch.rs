use crate::error::{DispatchError, Result};
use crate::records::{Ambulance, AmbulanceStatus, EmergencyRequest, EmergencyStatus};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

/// The slice of the data-access facade the dispatch workflow depends on.
pub trait DispatchBackend: Send + Sync {
    fn emergency(&self, id: &str) -> Result<EmergencyRequest>;
    fn emergencies(&self) -> Result<Vec<EmergencyRequest>>;
    fn ambulance(&self, id: &str) -> Result<Ambulance>;
    fn ambulances(&self) -> Result<Vec<Ambulance>>;
    fn ambulances_with_status(&self, status: AmbulanceStatus) -> Result<Vec<Ambulance>>;
    fn set_emergency_status(
        &self,
        id: &str,
        status: EmergencyStatus,
        ambulance_id: Option<&str>,
    ) -> Result<EmergencyRequest>;
    fn set_ambulance_status(&self, id: &str, status: AmbulanceStatus) -> Result<Ambulance>;
}

impl DispatchBackend for Store {
    fn emergency(&self, id: &str) -> Result<EmergencyRequest> {
        self.get_emergency(id)?
            .ok_or_else(|| DispatchError::not_found("emergency request", id))
    }

    fn emergencies(&self) -> Result<Vec<EmergencyRequest>> {
        self.list_emergencies()
    }

    fn ambulance(&self, id: &str) -> Result<Ambulance> {
        self.get_ambulance(id)?
            .ok_or_else(|| DispatchError::not_found("ambulance", id))
    }

    fn ambulances(&self) -> Result<Vec<Ambulance>> {
        self.list_ambulances()
    }

    fn ambulances_with_status(&self, status: AmbulanceStatus) -> Result<Vec<Ambulance>> {
        Store::ambulances_with_status(self, status)
    }

    fn set_emergency_status(
        &self,
        id: &str,
        status: EmergencyStatus,
        ambulance_id: Option<&str>,
    ) -> Result<EmergencyRequest> {
        self.update_emergency_status(id, status, ambulance_id)
    }

    fn set_ambulance_status(&self, id: &str, status: AmbulanceStatus) -> Result<Ambulance> {
        self.update_ambulance_status(id, status)
    }
}

/// Fixes applied by [`DispatchService::reconcile`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub marked_dispatched: Vec<String>,
    pub released: Vec<String>,
    pub failed: Vec<String>,
}

impl ReconcileReport {
    pub fn is_clean(&self) -> bool {
        self.marked_dispatched.is_empty() && self.released.is_empty() && self.failed.is_empty()
    }
}

/// Status workflow for emergency requests and the ambulances bound to them.
///
/// The request update and the ambulance update are two separate writes. A
/// failure of the ambulance write is logged and tolerated: the request stays
/// in its new state and the ambulance keeps its old status until an operator
/// corrects it or [`DispatchService::reconcile`] runs.
#[derive(Clone, Debug)]
pub struct DispatchService<B = Store> {
    backend: B,
}

impl<B: DispatchBackend> DispatchService<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Ambulances whose status is `available`. Empty when there are none.
    pub fn fetch_available_ambulances(&self) -> Result<Vec<Ambulance>> {
        let ambulances = self
            .backend
            .ambulances_with_status(AmbulanceStatus::Available)
            .inspect_err(|err| error!(error = %err, "failed to fetch available ambulances"))?;
        Ok(ambulances
            .into_iter()
            .filter(|a| a.status == AmbulanceStatus::Available)
            .collect())
    }

    pub fn dispatch_ambulance(&self, emergency_id: &str, ambulance_id: &str) -> Result<bool> {
        let emergency_id = emergency_id.trim();
        let ambulance_id = ambulance_id.trim();
        if emergency_id.is_empty() {
            return Err(DispatchError::Validation(
                "an emergency request must be selected".into(),
            ));
        }
        if ambulance_id.is_empty() {
            return Err(DispatchError::Validation(
                "select an ambulance before dispatching".into(),
            ));
        }

        let request = self.backend.emergency(emergency_id)?;
        let ambulance = self.backend.ambulance(ambulance_id)?;
        if ambulance.status == AmbulanceStatus::Maintenance {
            return Err(DispatchError::Validation(format!(
                "ambulance '{}' is in maintenance",
                ambulance.id
            )));
        }

        // Same request, same ambulance: both writes are plain overwrites, so
        // they are re-applied.
        let repeat = request.status == EmergencyStatus::Dispatched
            && request.ambulance_id.as_deref() == Some(ambulance.id.as_str());
        if !request.status.is_awaiting_dispatch() && !repeat {
            return Err(DispatchError::InvalidTransition {
                action: "dispatch",
                status: request.status,
            });
        }

        info!(emergency_id, ambulance_id, "dispatching ambulance");
        self.backend
            .set_emergency_status(
                emergency_id,
                EmergencyStatus::Dispatched,
                Some(ambulance.id.as_str()),
            )
            .inspect_err(|err| {
                error!(emergency_id, ambulance_id, error = %err, "failed to update emergency request");
            })?;

        if let Err(err) = self
            .backend
            .set_ambulance_status(&ambulance.id, AmbulanceStatus::Dispatched)
        {
            warn!(
                emergency_id,
                ambulance_id,
                error = %err,
                "ambulance status not updated; request remains dispatched"
            );
        }

        Ok(true)
    }

    pub fn complete_emergency(&self, emergency_id: &str) -> Result<EmergencyRequest> {
        self.close(emergency_id, EmergencyStatus::Completed)
    }

    pub fn cancel_emergency(&self, emergency_id: &str) -> Result<EmergencyRequest> {
        self.close(emergency_id, EmergencyStatus::Cancelled)
    }

    fn close(&self, emergency_id: &str, outcome: EmergencyStatus) -> Result<EmergencyRequest> {
        let action = match outcome {
            EmergencyStatus::Completed => "complete",
            EmergencyStatus::Cancelled => "cancel",
            other => {
                return Err(DispatchError::Validation(format!(
                    "'{other}' is not a closing status"
                )))
            }
        };

        let request = self.backend.emergency(emergency_id)?;
        let allowed = match outcome {
            EmergencyStatus::Completed => request.status.is_active_dispatch(),
            _ => request.status.is_awaiting_dispatch() || request.status.is_active_dispatch(),
        };
        if !allowed {
            return Err(DispatchError::InvalidTransition {
                action,
                status: request.status,
            });
        }

        let updated = self
            .backend
            .set_emergency_status(emergency_id, outcome, None)
            .inspect_err(|err| {
                error!(emergency_id, error = %err, "failed to {action} emergency request");
            })?;
        info!(emergency_id, status = %outcome, "emergency request closed");

        if let Some(ambulance_id) = request.ambulance_id.as_deref() {
            if let Err(err) = self
                .backend
                .set_ambulance_status(ambulance_id, AmbulanceStatus::Available)
            {
                warn!(
                    emergency_id,
                    ambulance_id,
                    error = %err,
                    "ambulance not released after {action}"
                );
            }
        }

        Ok(updated)
    }

    /// Brings ambulance statuses back in line with the requests that
    /// reference them. Request rows are never written.
    pub fn reconcile(&self) -> Result<ReconcileReport> {
        let requests = self.backend.emergencies()?;
        let ambulances = self.backend.ambulances()?;

        let mut assigned: BTreeMap<&str, &str> = BTreeMap::new();
        for request in &requests {
            if !request.status.is_active_dispatch() {
                continue;
            }
            if let Some(ambulance_id) = request.ambulance_id.as_deref() {
                assigned.insert(ambulance_id, request.id.as_str());
            }
        }

        let mut report = ReconcileReport::default();
        for ambulance in &ambulances {
            let target = match (ambulance.status, assigned.contains_key(ambulance.id.as_str())) {
                (AmbulanceStatus::Available, true) => AmbulanceStatus::Dispatched,
                (AmbulanceStatus::Dispatched, false) => AmbulanceStatus::Available,
                _ => continue,
            };

            match self.backend.set_ambulance_status(&ambulance.id, target) {
                Ok(_) if target == AmbulanceStatus::Dispatched => {
                    report.marked_dispatched.push(ambulance.id.clone())
                }
                Ok(_) => report.released.push(ambulance.id.clone()),
                Err(err) => {
                    warn!(ambulance_id = %ambulance.id, error = %err, "reconcile update failed");
                    report.failed.push(ambulance.id.clone());
                }
            }
        }

        if !report.is_clean() {
            info!(
                marked_dispatched = report.marked_dispatched.len(),
                released = report.released.len(),
                failed = report.failed.len(),
                "reconciled ambulance statuses"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Coordinates, Driver, Location};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryBackend {
        requests: Mutex<BTreeMap<String, EmergencyRequest>>,
        ambulances: Mutex<BTreeMap<String, Ambulance>>,
        fail_ambulance_writes: bool,
        fail_request_writes: bool,
        writes: Mutex<Vec<String>>,
    }

    impl MemoryBackend {
        fn with_request(self, id: &str, status: EmergencyStatus, ambulance: Option<&str>) -> Self {
            self.requests.lock().unwrap().insert(
                id.into(),
                EmergencyRequest {
                    id: id.into(),
                    name: "Caller".into(),
                    phone: "100".into(),
                    location: Location {
                        address: "Main St".into(),
                        coordinates: Coordinates {
                            latitude: 1.0,
                            longitude: 2.0,
                        },
                    },
                    timestamp: "2024-01-01T00:00:00Z".into(),
                    status,
                    notes: None,
                    ambulance_id: ambulance.map(Into::into),
                    updated_at: None,
                },
            );
            self
        }

        fn with_ambulance(self, id: &str, status: AmbulanceStatus) -> Self {
            self.ambulances.lock().unwrap().insert(
                id.into(),
                Ambulance {
                    id: id.into(),
                    name: id.into(),
                    vehicle_number: "V".into(),
                    driver: Driver {
                        name: "D".into(),
                        phone: "1".into(),
                    },
                    status,
                    last_location: None,
                    updated_at: None,
                },
            );
            self
        }

        fn request_status(&self, id: &str) -> EmergencyStatus {
            self.requests.lock().unwrap()[id].status
        }

        fn ambulance_status(&self, id: &str) -> AmbulanceStatus {
            self.ambulances.lock().unwrap()[id].status
        }

        fn write_count(&self) -> usize {
            self.writes.lock().unwrap().len()
        }
    }

    impl DispatchBackend for MemoryBackend {
        fn emergency(&self, id: &str) -> Result<EmergencyRequest> {
            self.requests
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| DispatchError::not_found("emergency request", id))
        }

        fn emergencies(&self) -> Result<Vec<EmergencyRequest>> {
            Ok(self.requests.lock().unwrap().values().cloned().collect())
        }

        fn ambulance(&self, id: &str) -> Result<Ambulance> {
            self.ambulances
                .lock()
                .unwrap()
                .get(id)
                .cloned()
                .ok_or_else(|| DispatchError::not_found("ambulance", id))
        }

        fn ambulances(&self) -> Result<Vec<Ambulance>> {
            Ok(self.ambulances.lock().unwrap().values().cloned().collect())
        }

        fn ambulances_with_status(&self, status: AmbulanceStatus) -> Result<Vec<Ambulance>> {
            Ok(self
                .ambulances
                .lock()
                .unwrap()
                .values()
                .filter(|a| a.status == status)
                .cloned()
                .collect())
        }

        fn set_emergency_status(
            &self,
            id: &str,
            status: EmergencyStatus,
            ambulance_id: Option<&str>,
        ) -> Result<EmergencyRequest> {
            if self.fail_request_writes {
                return Err(DispatchError::Store(rusqlite::Error::ExecuteReturnedResults));
            }
            self.writes.lock().unwrap().push(format!("request:{id}:{status}"));
            let mut requests = self.requests.lock().unwrap();
            let request = requests
                .get_mut(id)
                .ok_or_else(|| DispatchError::not_found("emergency request", id))?;
            request.status = status;
            if let Some(ambulance_id) = ambulance_id {
                request.ambulance_id = Some(ambulance_id.into());
            }
            Ok(request.clone())
        }

        fn set_ambulance_status(&self, id: &str, status: AmbulanceStatus) -> Result<Ambulance> {
            if self.fail_ambulance_writes {
                return Err(DispatchError::Store(rusqlite::Error::ExecuteReturnedResults));
            }
            self.writes.lock().unwrap().push(format!("ambulance:{id}:{status}"));
            let mut ambulances = self.ambulances.lock().unwrap();
            let ambulance = ambulances
                .get_mut(id)
                .ok_or_else(|| DispatchError::not_found("ambulance", id))?;
            ambulance.status = status;
            Ok(ambulance.clone())
        }
    }

    #[test]
    fn dispatch_binds_request_and_ambulance() {
        let service = DispatchService::new(
            MemoryBackend::default()
                .with_request("er001", EmergencyStatus::Pending, None)
                .with_ambulance("amb1", AmbulanceStatus::Available),
        );

        assert!(service.dispatch_ambulance("er001", "amb1").expect("dispatch"));

        let request = service.backend().emergency("er001").expect("request");
        assert_eq!(request.status, EmergencyStatus::Dispatched);
        assert_eq!(request.ambulance_id.as_deref(), Some("amb1"));
        assert_eq!(service.backend().ambulance_status("amb1"), AmbulanceStatus::Dispatched);
    }

    #[test]
    fn ambulance_write_failure_still_reports_success() {
        let backend = MemoryBackend {
            fail_ambulance_writes: true,
            ..MemoryBackend::default()
        }
        .with_request("er001", EmergencyStatus::Requested, None)
        .with_ambulance("amb1", AmbulanceStatus::Available);
        let service = DispatchService::new(backend);

        assert!(service.dispatch_ambulance("er001", "amb1").expect("dispatch"));
        assert_eq!(service.backend().request_status("er001"), EmergencyStatus::Dispatched);
        assert_eq!(service.backend().ambulance_status("amb1"), AmbulanceStatus::Available);
    }

    #[test]
    fn request_write_failure_aborts_before_ambulance() {
        let backend = MemoryBackend {
            fail_request_writes: true,
            ..MemoryBackend::default()
        }
        .with_request("er001", EmergencyStatus::Pending, None)
        .with_ambulance("amb1", AmbulanceStatus::Available);
        let service = DispatchService::new(backend);

        let err = service.dispatch_ambulance("er001", "amb1").expect_err("abort");
        assert!(matches!(err, DispatchError::Store(_)));
        assert_eq!(service.backend().ambulance_status("amb1"), AmbulanceStatus::Available);
        assert_eq!(service.backend().write_count(), 0);
    }

    #[test]
    fn missing_selection_fails_before_any_lookup() {
        let service = DispatchService::new(MemoryBackend::default());
        let err = service.dispatch_ambulance("er001", "  ").expect_err("validation");
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn unknown_ambulance_is_not_coerced() {
        let service = DispatchService::new(
            MemoryBackend::default()
                .with_request("er001", EmergencyStatus::Pending, None)
                .with_ambulance("amb1", AmbulanceStatus::Available),
        );
        let err = service.dispatch_ambulance("er001", "1").expect_err("unknown");
        assert!(matches!(err, DispatchError::NotFound { entity: "ambulance", .. }));
        assert_eq!(service.backend().write_count(), 0);
    }

    #[test]
    fn repeated_dispatch_reapplies_both_writes() {
        let service = DispatchService::new(
            MemoryBackend::default()
                .with_request("er001", EmergencyStatus::Pending, None)
                .with_ambulance("amb1", AmbulanceStatus::Available),
        );
        service.dispatch_ambulance("er001", "amb1").expect("first");
        service.dispatch_ambulance("er001", "amb1").expect("second");
        assert_eq!(service.backend().write_count(), 4);
    }

    #[test]
    fn redispatch_to_other_ambulance_is_rejected() {
        let service = DispatchService::new(
            MemoryBackend::default()
                .with_request("er001", EmergencyStatus::Dispatched, Some("amb1"))
                .with_ambulance("amb1", AmbulanceStatus::Dispatched)
                .with_ambulance("amb2", AmbulanceStatus::Available),
        );
        let err = service.dispatch_ambulance("er001", "amb2").expect_err("reject");
        assert!(matches!(
            err,
            DispatchError::InvalidTransition {
                action: "dispatch",
                status: EmergencyStatus::Dispatched
            }
        ));
    }

    #[test]
    fn complete_releases_attached_ambulance() {
        let service = DispatchService::new(
            MemoryBackend::default()
                .with_request("er002", EmergencyStatus::Dispatched, Some("amb3"))
                .with_ambulance("amb3", AmbulanceStatus::Dispatched),
        );

        let updated = service.complete_emergency("er002").expect("complete");
        assert_eq!(updated.status, EmergencyStatus::Completed);
        assert_eq!(service.backend().ambulance_status("amb3"), AmbulanceStatus::Available);
    }

    #[test]
    fn maintenance_ambulance_cannot_be_dispatched() {
        let service = DispatchService::new(
            MemoryBackend::default()
                .with_request("er001", EmergencyStatus::Pending, None)
                .with_request("er002", EmergencyStatus::Dispatched, Some("amb2"))
                .with_ambulance("amb1", AmbulanceStatus::Maintenance)
                .with_ambulance("amb2", AmbulanceStatus::Maintenance),
        );

        let err = service.dispatch_ambulance("er001", "amb1").expect_err("first dispatch");
        assert!(matches!(err, DispatchError::Validation(_)));
        let err = service.dispatch_ambulance("er002", "amb2").expect_err("repeat dispatch");
        assert!(matches!(err, DispatchError::Validation(_)));

        assert_eq!(service.backend().write_count(), 0);
        assert_eq!(service.backend().request_status("er001"), EmergencyStatus::Pending);
        assert_eq!(service.backend().ambulance_status("amb2"), AmbulanceStatus::Maintenance);
    }

    #[test]
    fn release_failure_on_close_still_succeeds() {
        for (action, outcome) in [
            ("complete", EmergencyStatus::Completed),
            ("cancel", EmergencyStatus::Cancelled),
        ] {
            let backend = MemoryBackend {
                fail_ambulance_writes: true,
                ..MemoryBackend::default()
            }
            .with_request("er010", EmergencyStatus::Dispatched, Some("amb1"))
            .with_ambulance("amb1", AmbulanceStatus::Dispatched);
            let service = DispatchService::new(backend);

            let updated = match action {
                "complete" => service.complete_emergency("er010"),
                _ => service.cancel_emergency("er010"),
            }
            .expect(action);
            assert_eq!(updated.status, outcome);
            assert_eq!(service.backend().request_status("er010"), outcome);
            assert_eq!(
                service.backend().ambulance_status("amb1"),
                AmbulanceStatus::Dispatched,
                "{action}"
            );
        }
    }

    #[test]
    fn en_route_and_arrived_can_be_completed() {
        for active in [EmergencyStatus::EnRoute, EmergencyStatus::Arrived] {
            let service = DispatchService::new(
                MemoryBackend::default()
                    .with_request("er011", active, Some("amb1"))
                    .with_ambulance("amb1", AmbulanceStatus::Dispatched),
            );

            let updated = service.complete_emergency("er011").expect("complete");
            assert_eq!(updated.status, EmergencyStatus::Completed, "{active}");
            assert_eq!(service.backend().ambulance_status("amb1"), AmbulanceStatus::Available);
        }
    }

    #[test]
    fn cancel_without_ambulance_touches_no_ambulance() {
        let service = DispatchService::new(
            MemoryBackend::default()
                .with_request("er003", EmergencyStatus::Pending, None)
                .with_ambulance("amb1", AmbulanceStatus::Dispatched),
        );

        service.cancel_emergency("er003").expect("cancel");
        assert_eq!(service.backend().request_status("er003"), EmergencyStatus::Cancelled);
        assert_eq!(service.backend().ambulance_status("amb1"), AmbulanceStatus::Dispatched);
        assert_eq!(service.backend().write_count(), 1);
    }

    #[test]
    fn pending_request_cannot_be_completed() {
        let service = DispatchService::new(
            MemoryBackend::default().with_request("er004", EmergencyStatus::Pending, None),
        );
        let err = service.complete_emergency("er004").expect_err("reject");
        assert!(matches!(err, DispatchError::InvalidTransition { action: "complete", .. }));
    }

    #[test]
    fn terminal_requests_accept_no_transition() {
        for terminal in [EmergencyStatus::Completed, EmergencyStatus::Cancelled] {
            let service = DispatchService::new(
                MemoryBackend::default()
                    .with_request("er005", terminal, Some("amb1"))
                    .with_ambulance("amb1", AmbulanceStatus::Available),
            );

            assert!(service.dispatch_ambulance("er005", "amb1").is_err());
            assert!(service.complete_emergency("er005").is_err());
            assert!(service.cancel_emergency("er005").is_err());
            assert_eq!(service.backend().write_count(), 0, "{terminal}");
            assert_eq!(service.backend().request_status("er005"), terminal);
        }
    }

    #[test]
    fn available_ambulances_exclude_other_statuses() {
        let service = DispatchService::new(
            MemoryBackend::default()
                .with_ambulance("a", AmbulanceStatus::Available)
                .with_ambulance("b", AmbulanceStatus::Dispatched)
                .with_ambulance("c", AmbulanceStatus::Maintenance),
        );
        let ids: Vec<_> = service
            .fetch_available_ambulances()
            .expect("fetch")
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec!["a".to_string()]);

        let empty = DispatchService::new(MemoryBackend::default());
        assert!(empty.fetch_available_ambulances().expect("fetch").is_empty());
    }

    #[test]
    fn reconcile_repairs_mismatched_pairs() {
        let service = DispatchService::new(
            MemoryBackend::default()
                .with_request("er1", EmergencyStatus::Dispatched, Some("amb1"))
                .with_request("er2", EmergencyStatus::Completed, Some("amb2"))
                .with_ambulance("amb1", AmbulanceStatus::Available)
                .with_ambulance("amb2", AmbulanceStatus::Dispatched)
                .with_ambulance("amb3", AmbulanceStatus::Maintenance),
        );

        let report = service.reconcile().expect("reconcile");
        assert_eq!(report.marked_dispatched, vec!["amb1".to_string()]);
        assert_eq!(report.released, vec!["amb2".to_string()]);
        assert!(report.failed.is_empty());
        assert_eq!(service.backend().ambulance_status("amb3"), AmbulanceStatus::Maintenance);
        assert_eq!(service.backend().request_status("er2"), EmergencyStatus::Completed);

        assert!(service.reconcile().expect("second pass").is_clean());
    }
}
