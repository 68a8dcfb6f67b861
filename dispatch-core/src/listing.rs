use crate::records::{Ambulance, AmbulanceStatus, EmergencyRequest, EmergencyStatus};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Name,
    Phone,
    Address,
    Status,
    #[default]
    Timestamp,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl SortDirection {
    pub fn toggled(self) -> Self {
        match self {
            SortDirection::Asc => SortDirection::Desc,
            SortDirection::Desc => SortDirection::Asc,
        }
    }
}

/// Table filter for the emergency list. `search` matches name, phone or
/// address, ignoring case.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyQuery {
    pub status: Option<EmergencyStatus>,
    pub search: Option<String>,
    #[serde(default)]
    pub sort: SortKey,
    #[serde(default)]
    pub direction: SortDirection,
}

impl EmergencyQuery {
    /// Clicking the active column flips direction; a new column starts ascending.
    pub fn sorted_by(mut self, key: SortKey) -> Self {
        self.direction = if self.sort == key {
            self.direction.toggled()
        } else {
            SortDirection::Asc
        };
        self.sort = key;
        self
    }

    pub fn apply(&self, requests: Vec<EmergencyRequest>) -> Vec<EmergencyRequest> {
        let needle = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut out: Vec<_> = requests
            .into_iter()
            .filter(|r| self.status.map_or(true, |s| r.status == s))
            .filter(|r| match needle.as_deref() {
                Some(needle) => {
                    r.name.to_lowercase().contains(needle)
                        || r.phone.to_lowercase().contains(needle)
                        || r.location.address.to_lowercase().contains(needle)
                }
                None => true,
            })
            .collect();

        out.sort_by(|a, b| {
            let ordering = compare(self.sort, a, b);
            match self.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
        out
    }
}

fn compare(key: SortKey, a: &EmergencyRequest, b: &EmergencyRequest) -> Ordering {
    match key {
        SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortKey::Phone => a.phone.cmp(&b.phone),
        SortKey::Address => a
            .location
            .address
            .to_lowercase()
            .cmp(&b.location.address.to_lowercase()),
        SortKey::Status => a.status.as_str().cmp(b.status.as_str()),
        SortKey::Timestamp => {
            let parse = |ts: &str| chrono::DateTime::parse_from_rfc3339(ts).ok();
            match (parse(&a.timestamp), parse(&b.timestamp)) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => a.timestamp.cmp(&b.timestamp),
            }
        }
    }
}

const ACTIVE_PREVIEW: usize = 5;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub pending: usize,
    pub dispatched: usize,
    pub completed: usize,
    pub ambulances_available: usize,
    pub ambulances_total: usize,
    pub active: Vec<EmergencyRequest>,
}

impl DashboardSummary {
    pub fn from_records(requests: &[EmergencyRequest], ambulances: &[Ambulance]) -> Self {
        let count = |status: EmergencyStatus| requests.iter().filter(|r| r.status == status).count();

        let active = requests
            .iter()
            .filter(|r| r.status == EmergencyStatus::Pending)
            .chain(requests.iter().filter(|r| r.status == EmergencyStatus::Dispatched))
            .take(ACTIVE_PREVIEW)
            .cloned()
            .collect();

        Self {
            pending: count(EmergencyStatus::Pending),
            dispatched: count(EmergencyStatus::Dispatched),
            completed: count(EmergencyStatus::Completed),
            ambulances_available: ambulances
                .iter()
                .filter(|a| a.status == AmbulanceStatus::Available)
                .count(),
            ambulances_total: ambulances.len(),
            active,
        }
    }

    /// Share of the fleet that is available, in percent. Zero for an empty fleet.
    pub fn availability_percent(&self) -> f64 {
        if self.ambulances_total == 0 {
            return 0.0;
        }
        self.ambulances_available as f64 * 100.0 / self.ambulances_total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Coordinates, Driver, Location};

    fn request(id: &str, name: &str, status: EmergencyStatus, ts: &str) -> EmergencyRequest {
        EmergencyRequest {
            id: id.into(),
            name: name.into(),
            phone: format!("+91-{id}"),
            location: Location {
                address: format!("{name} Street"),
                coordinates: Coordinates {
                    latitude: 0.0,
                    longitude: 0.0,
                },
            },
            timestamp: ts.into(),
            status,
            notes: None,
            ambulance_id: None,
            updated_at: None,
        }
    }

    fn ambulance(id: &str, status: AmbulanceStatus) -> Ambulance {
        Ambulance {
            id: id.into(),
            name: id.into(),
            vehicle_number: id.into(),
            driver: Driver {
                name: "d".into(),
                phone: "p".into(),
            },
            status,
            last_location: None,
            updated_at: None,
        }
    }

    fn sample() -> Vec<EmergencyRequest> {
        vec![
            request("1", "Meera", EmergencyStatus::Pending, "2024-05-01T10:00:00Z"),
            request("2", "arjun", EmergencyStatus::Dispatched, "2024-05-01T09:00:00+02:00"),
            request("3", "Ravi", EmergencyStatus::Completed, "2024-05-01T08:30:00Z"),
        ]
    }

    #[test]
    fn search_matches_name_phone_or_address() {
        let query = EmergencyQuery {
            search: Some("MEERA".into()),
            ..EmergencyQuery::default()
        };
        assert_eq!(query.apply(sample()).len(), 1);

        let by_phone = EmergencyQuery {
            search: Some("+91-3".into()),
            ..EmergencyQuery::default()
        };
        assert_eq!(by_phone.apply(sample())[0].id, "3");
    }

    #[test]
    fn timestamp_sort_is_chronological_across_offsets() {
        let query = EmergencyQuery::default().sorted_by(SortKey::Timestamp);
        assert_eq!(query.direction, SortDirection::Asc);
        let ids: Vec<_> = query.apply(sample()).into_iter().map(|r| r.id).collect();
        // 09:00+02:00 is 07:00Z, the earliest.
        assert_eq!(ids, vec!["2", "3", "1"]);
    }

    #[test]
    fn status_filter_and_name_sort() {
        let query = EmergencyQuery {
            status: Some(EmergencyStatus::Dispatched),
            ..EmergencyQuery::default()
        };
        assert_eq!(query.apply(sample()).len(), 1);

        let by_name = EmergencyQuery::default().sorted_by(SortKey::Name);
        let names: Vec<_> = by_name.apply(sample()).into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["arjun", "Meera", "Ravi"]);

        let flipped = by_name.sorted_by(SortKey::Name);
        assert_eq!(flipped.direction, SortDirection::Desc);
        assert_eq!(flipped.sorted_by(SortKey::Name).direction, SortDirection::Asc);
    }

    #[test]
    fn dashboard_counts_and_active_preview() {
        let mut requests = sample();
        for i in 0..6 {
            requests.push(request(&format!("p{i}"), "x", EmergencyStatus::Pending, "2024-05-02T00:00:00Z"));
        }
        let ambulances = vec![
            ambulance("a", AmbulanceStatus::Available),
            ambulance("b", AmbulanceStatus::Dispatched),
        ];

        let summary = DashboardSummary::from_records(&requests, &ambulances);
        assert_eq!(summary.pending, 7);
        assert_eq!(summary.dispatched, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.active.len(), 5);
        assert!(summary.active.iter().all(|r| r.status == EmergencyStatus::Pending));
        assert_eq!(summary.availability_percent(), 50.0);
    }
}
