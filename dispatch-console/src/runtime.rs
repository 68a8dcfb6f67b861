use crate::state::AppState;
use dispatch_core::feed::Table;
use dispatch_core::listing::DashboardSummary;
use dispatch_core::realtime::{classify, ChangeFeed, EventFilter, LiveView, Reaction, Subscription};
use dispatch_core::Store;
use std::thread::JoinHandle;
#[cfg(feature = "desktop")]
use tracing::error;
use tracing::{debug, info, warn};

pub trait EventSink: Send + Sync + 'static {
    fn emit_json(&self, event: &str, payload: serde_json::Value);
}

/// Reads the change feed for the console. New-request alerts come from an
/// insert-only subscription; list and dashboard refreshes come from the live
/// view. Rows both readers have consumed are pruned down to `retention`.
pub struct Listener {
    store: Store,
    alerts: ChangeFeed,
    view: LiveView,
    retention: i64,
}

impl Listener {
    pub fn new(state: &AppState) -> dispatch_core::Result<Self> {
        let store = state.store.clone();
        let alerts = ChangeFeed::from_latest(store.clone())?
            .subscribe(Subscription::new(Table::EmergencyRequests, EventFilter::Insert));
        let view = LiveView::load(store.clone())?;
        Ok(Self {
            store,
            alerts,
            view,
            retention: state.change_retention,
        })
    }

    pub fn view(&self) -> &LiveView {
        &self.view
    }

    /// One poll: alerts first, then refreshed collections, then pruning.
    pub fn tick(&mut self, sink: &impl EventSink) -> dispatch_core::Result<()> {
        for event in self.alerts.poll()? {
            if let Reaction::NewEmergency(alert) = classify(&event) {
                sink.emit_json("emergency-alert", serde_json::to_value(alert)?);
            }
        }

        let outcome = self.view.sync()?;
        if outcome.reactions.is_empty() && !outcome.resynced {
            return Ok(());
        }
        debug!(
            events = outcome.reactions.len(),
            resynced = outcome.resynced,
            last_seen = self.view.last_seen(),
            "applied change feed"
        );

        let emergencies = self.view.emergencies();
        let ambulances = self.view.ambulances();
        if outcome.emergencies_changed() {
            sink.emit_json("emergencies-updated", serde_json::to_value(&emergencies)?);
        }
        if outcome.ambulances_changed() {
            sink.emit_json("ambulances-updated", serde_json::to_value(&ambulances)?);
        }
        if outcome.emergencies_changed() || outcome.ambulances_changed() {
            let summary = DashboardSummary::from_records(&emergencies, &ambulances);
            sink.emit_json("dashboard-updated", serde_json::to_value(summary)?);
        }

        self.prune()
    }

    fn prune(&self) -> dispatch_core::Result<()> {
        let consumed = self.view.last_seen().min(self.alerts.last_seen());
        let removed = self
            .store
            .prune_changes_before(consumed - self.retention.max(1) + 1)?;
        if removed > 0 {
            debug!(removed, consumed, "pruned consumed changes");
        }
        Ok(())
    }
}

/// Spawns the listener thread. It polls every `poll_interval` for as long as
/// the process runs.
pub fn start_with_sink(
    state: &AppState,
    sink: impl EventSink,
) -> dispatch_core::Result<JoinHandle<()>> {
    let mut listener = Listener::new(state)?;
    let poll_interval = state.poll_interval;
    Ok(std::thread::spawn(move || loop {
        if let Err(err) = listener.tick(&sink) {
            warn!(error = %err, "change feed poll failed");
        }
        std::thread::sleep(poll_interval);
    }))
}

/// Headless sink: alerts are logged at info, refreshes at debug.
pub struct LogSink;

impl EventSink for LogSink {
    fn emit_json(&self, event: &str, payload: serde_json::Value) {
        if event == "emergency-alert" {
            info!(
                emergency_id = %payload["emergency_id"],
                address = %payload["address"],
                "new emergency request"
            );
        } else {
            debug!(event, "console data refreshed");
        }
    }
}

#[cfg(feature = "desktop")]
pub fn start_tauri_runtime(state: &AppState, listen_addr: String, app: tauri::AppHandle) {
    if let Err(err) = start_with_sink(state, TauriSink::new(app)) {
        error!(error = %err, "change listener could not start; real-time updates disabled");
    }

    let store = state.store.clone();
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(err) => {
                error!(error = %err, "intake server runtime failed to start");
                return;
            }
        };
        runtime.block_on(async move {
            let app = dispatch_server::intake::intake_router(store);
            let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
                Ok(listener) => listener,
                Err(err) => {
                    error!(addr = %listen_addr, error = %err, "intake server bind failed");
                    return;
                }
            };
            tracing::info!(addr = %listen_addr, "intake server listening");
            if let Err(err) = axum::serve(listener, app).await {
                error!(error = %err, "intake server stopped");
            }
        });
    });
}

#[cfg(feature = "desktop")]
pub struct TauriSink {
    app: tauri::AppHandle,
}

#[cfg(feature = "desktop")]
impl TauriSink {
    pub fn new(app: tauri::AppHandle) -> Self {
        Self { app }
    }
}

#[cfg(feature = "desktop")]
impl EventSink for TauriSink {
    fn emit_json(&self, event: &str, payload: serde_json::Value) {
        use tauri::Manager;
        if let Err(err) = self.app.emit_all(event, payload) {
            warn!(event, error = %err, "failed to emit console event");
        }
    }
}
