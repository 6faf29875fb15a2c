//! Session reconciliation.
//!
//! A batch is folded into one [`SessionUpsert`] per session id. The store
//! applies each upsert with the same rule as [`SessionUpsert::merge_into`]:
//! `last_seen_at` only moves forward, `first_seen_at` is never rewritten and
//! dimensional fields are filled in only while the stored value is unknown.
//! That rule is commutative and idempotent, so concurrent batches for the same
//! session converge without coordination.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::event::{DeviceType, Event};

/// A stored session row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub website_id: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub device_type: DeviceType,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub country: Option<String>,
}

/// What one batch contributes to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUpsert {
    pub id: String,
    pub website_id: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub device_type: DeviceType,
    pub browser: Option<String>,
    pub os: Option<String>,
    pub country: Option<String>,
}

impl SessionUpsert {
    fn from_event(event: &Event) -> Self {
        Self {
            id: event.session_id.clone(),
            website_id: event.website_id.clone(),
            first_seen_at: event.occurred_at,
            last_seen_at: event.occurred_at,
            device_type: event.device_type,
            browser: event.browser.clone(),
            os: event.os.clone(),
            country: event.country.clone(),
        }
    }

    /// Fold a later event of the same session into this descriptor.
    fn absorb(&mut self, event: &Event) {
        self.first_seen_at = self.first_seen_at.min(event.occurred_at);
        self.last_seen_at = self.last_seen_at.max(event.occurred_at);
        if event.device_type.is_known() {
            self.device_type = event.device_type;
        }
        if event.browser.is_some() {
            self.browser = event.browser.clone();
        }
        if event.os.is_some() {
            self.os = event.os.clone();
        }
        if event.country.is_some() {
            self.country = event.country.clone();
        }
    }

    /// Row to insert when the session does not exist yet.
    pub fn to_session(&self) -> Session {
        Session {
            id: self.id.clone(),
            website_id: self.website_id.clone(),
            first_seen_at: self.first_seen_at,
            last_seen_at: self.last_seen_at,
            device_type: self.device_type,
            browser: self.browser.clone(),
            os: self.os.clone(),
            country: self.country.clone(),
        }
    }

    /// Apply this upsert to an existing row.
    pub fn merge_into(&self, stored: &mut Session) {
        stored.last_seen_at = stored.last_seen_at.max(self.last_seen_at);
        if !stored.device_type.is_known() && self.device_type.is_known() {
            stored.device_type = self.device_type;
        }
        if stored.browser.is_none() {
            stored.browser.clone_from(&self.browser);
        }
        if stored.os.is_none() {
            stored.os.clone_from(&self.os);
        }
        if stored.country.is_none() {
            stored.country.clone_from(&self.country);
        }
    }
}

/// Group `events` by session id in occurrence order.
pub fn reconcile(events: &[Event]) -> BTreeMap<String, SessionUpsert> {
    let mut ordered: Vec<&Event> = events.iter().collect();
    ordered.sort_by_key(|e| e.occurred_at);

    let mut sessions: BTreeMap<String, SessionUpsert> = BTreeMap::new();
    for event in ordered {
        match sessions.get_mut(&event.session_id) {
            Some(upsert) => upsert.absorb(event),
            None => {
                sessions.insert(event.session_id.clone(), SessionUpsert::from_event(event));
            }
        }
    }
    sessions
}
