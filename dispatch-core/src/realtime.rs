use crate::error::Result;
use crate::feed::{ChangeEvent, ChangeKind, Table};
use crate::records::{Ambulance, EmergencyRequest};
use crate::store::Store;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Which change kinds a subscription wants. `All` is the `*` form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventFilter {
    Insert,
    Update,
    Delete,
    All,
}

impl EventFilter {
    pub fn matches(&self, kind: ChangeKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Insert => kind == ChangeKind::Insert,
            EventFilter::Update => kind == ChangeKind::Update,
            EventFilter::Delete => kind == ChangeKind::Delete,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Subscription {
    pub table: Table,
    pub filter: EventFilter,
}

impl Subscription {
    pub fn new(table: Table, filter: EventFilter) -> Self {
        Self { table, filter }
    }

    pub fn matches(&self, event: &ChangeEvent) -> bool {
        self.table == event.table && self.filter.matches(event.kind)
    }
}

/// Polling reader over the store's change feed. Events are delivered in feed
/// order; with no subscriptions every event is delivered.
pub struct ChangeFeed {
    store: Store,
    subscriptions: Vec<Subscription>,
    last_seen: i64,
}

impl ChangeFeed {
    /// Starts after the newest change currently in the feed.
    pub fn from_latest(store: Store) -> Result<Self> {
        let last_seen = store.latest_change_id()?.unwrap_or(0);
        Ok(Self::from_id(store, last_seen))
    }

    pub fn from_id(store: Store, last_seen: i64) -> Self {
        Self {
            store,
            subscriptions: Vec::new(),
            last_seen,
        }
    }

    pub fn subscribe(mut self, subscription: Subscription) -> Self {
        self.subscriptions.push(subscription);
        self
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen
    }

    pub fn poll(&mut self) -> Result<Vec<ChangeEvent>> {
        let events = self.store.changes_after(self.last_seen)?;
        if let Some(last) = events.last() {
            self.last_seen = last.id;
        }
        Ok(events
            .into_iter()
            .filter(|e| self.subscriptions.is_empty() || self.subscriptions.iter().any(|s| s.matches(e)))
            .collect())
    }
}

/// Toast content for a newly created emergency request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EmergencyAlert {
    pub emergency_id: String,
    pub name: String,
    pub phone: String,
    pub address: String,
    pub play_sound: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Reaction {
    NewEmergency(EmergencyAlert),
    EmergencyChanged { id: String, kind: ChangeKind },
    AmbulanceChanged { id: String, kind: ChangeKind },
    Other { table: Table, id: String },
}

pub fn classify(event: &ChangeEvent) -> Reaction {
    match (event.table, event.kind) {
        (Table::EmergencyRequests, ChangeKind::Insert) => {
            let request = event
                .payload
                .clone()
                .and_then(|p| serde_json::from_value::<EmergencyRequest>(p).ok());
            match request {
                Some(request) => Reaction::NewEmergency(EmergencyAlert {
                    emergency_id: request.id,
                    name: request.name,
                    phone: request.phone,
                    address: request.location.address,
                    play_sound: true,
                }),
                None => Reaction::EmergencyChanged {
                    id: event.record_id.clone(),
                    kind: event.kind,
                },
            }
        }
        (Table::EmergencyRequests, kind) => Reaction::EmergencyChanged {
            id: event.record_id.clone(),
            kind,
        },
        (Table::Ambulances, kind) => Reaction::AmbulanceChanged {
            id: event.record_id.clone(),
            kind,
        },
        (table, _) => Reaction::Other {
            table,
            id: event.record_id.clone(),
        },
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct SyncOutcome {
    pub reactions: Vec<Reaction>,
    pub resynced: bool,
}

impl SyncOutcome {
    pub fn emergencies_changed(&self) -> bool {
        self.resynced
            || self.reactions.iter().any(|r| {
                matches!(r, Reaction::NewEmergency(_) | Reaction::EmergencyChanged { .. })
            })
    }

    pub fn ambulances_changed(&self) -> bool {
        self.resynced
            || self
                .reactions
                .iter()
                .any(|r| matches!(r, Reaction::AmbulanceChanged { .. }))
    }
}

/// Local copy of emergency requests and ambulances kept current from the
/// change feed. Deltas are applied by id; a gap in the feed (pruned or
/// undecodable events) triggers a full re-fetch.
pub struct LiveView {
    store: Store,
    subscriptions: Vec<Subscription>,
    emergencies: BTreeMap<String, EmergencyRequest>,
    ambulances: BTreeMap<String, Ambulance>,
    last_seen: i64,
}

impl LiveView {
    pub fn load(store: Store) -> Result<Self> {
        let mut view = Self {
            store,
            subscriptions: vec![
                Subscription::new(Table::EmergencyRequests, EventFilter::All),
                Subscription::new(Table::Ambulances, EventFilter::All),
            ],
            emergencies: BTreeMap::new(),
            ambulances: BTreeMap::new(),
            last_seen: 0,
        };
        view.resync()?;
        Ok(view)
    }

    pub fn last_seen(&self) -> i64 {
        self.last_seen
    }

    pub fn sync(&mut self) -> Result<SyncOutcome> {
        let events = self.store.changes_after(self.last_seen)?;
        let Some(first) = events.first() else {
            return Ok(SyncOutcome::default());
        };

        let mut resynced = false;
        if first.id != self.last_seen + 1 {
            tracing::debug!(
                expected = self.last_seen + 1,
                got = first.id,
                "change feed gap; re-fetching"
            );
            self.resync()?;
            resynced = true;
        } else {
            for event in &events {
                if self.wants(event) && !self.apply(event) {
                    tracing::debug!(change_id = event.id, "undecodable change; re-fetching");
                    self.resync()?;
                    resynced = true;
                    break;
                }
                self.last_seen = event.id;
            }
        }

        if let Some(last) = events.last() {
            self.last_seen = self.last_seen.max(last.id);
        }

        Ok(SyncOutcome {
            reactions: events
                .iter()
                .filter(|e| self.wants(e))
                .map(classify)
                .collect(),
            resynced,
        })
    }

    fn wants(&self, event: &ChangeEvent) -> bool {
        self.subscriptions.iter().any(|s| s.matches(event))
    }

    /// Replaces local state with a full read. Resumes after the newest change
    /// id seen before the read, so anything committed during it is replayed.
    pub fn resync(&mut self) -> Result<()> {
        let resume_from = self.store.latest_change_id()?.unwrap_or(0);
        self.emergencies = self
            .store
            .list_emergencies()?
            .into_iter()
            .map(|e| (e.id.clone(), e))
            .collect();
        self.ambulances = self
            .store
            .list_ambulances()?
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();
        self.last_seen = resume_from;
        Ok(())
    }

    fn apply(&mut self, event: &ChangeEvent) -> bool {
        match (event.table, event.kind, event.payload.clone()) {
            (Table::EmergencyRequests, ChangeKind::Delete, _) => {
                self.emergencies.remove(&event.record_id);
                true
            }
            (Table::Ambulances, ChangeKind::Delete, _) => {
                self.ambulances.remove(&event.record_id);
                true
            }
            (Table::EmergencyRequests, _, Some(payload)) => {
                match serde_json::from_value::<EmergencyRequest>(payload) {
                    Ok(request) => {
                        self.emergencies.insert(request.id.clone(), request);
                        true
                    }
                    Err(_) => false,
                }
            }
            (Table::Ambulances, _, Some(payload)) => {
                match serde_json::from_value::<Ambulance>(payload) {
                    Ok(ambulance) => {
                        self.ambulances.insert(ambulance.id.clone(), ambulance);
                        true
                    }
                    Err(_) => false,
                }
            }
            (Table::EmergencyRequests | Table::Ambulances, _, None) => false,
            _ => true,
        }
    }

    pub fn emergency(&self, id: &str) -> Option<&EmergencyRequest> {
        self.emergencies.get(id)
    }

    pub fn ambulance(&self, id: &str) -> Option<&Ambulance> {
        self.ambulances.get(id)
    }

    /// Newest first, matching the store's listing order.
    pub fn emergencies(&self) -> Vec<EmergencyRequest> {
        let mut out: Vec<_> = self.emergencies.values().cloned().collect();
        out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        out
    }

    pub fn ambulances(&self) -> Vec<Ambulance> {
        let mut out: Vec<_> = self.ambulances.values().cloned().collect();
        out.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        out
    }
}
