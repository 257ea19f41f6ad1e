//! # Baby Events
//!
//! Typed model of a logged event and the mutations that create, update and
//! delete events through the offline queue.

use crate::offline::queue::Mutation;
use crate::shared::SyncError;
use crate::sync::SyncService;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Collection path of events on the API
pub const EVENTS_PATH: &str = "/events";

/// Kind of logged event
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// Urination
    Pipi,
    /// Bowel movement
    Caca,
    /// Bottle feeding
    Biberon,
    /// Sleep
    Dodo,
    /// Breastfeeding
    Allaitement,
    Medicaments,
    /// Food introduction
    Aliment,
    Bain,
}

/// A logged baby-care event as the API expects it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BabyEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    /// Centilitres for bottles
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breast_left: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breast_right: Option<bool>,
}

impl BabyEvent {
    /// New event of `event_type` happening now
    pub fn new(event_type: EventType) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type,
            timestamp: Utc::now(),
            quantity: None,
            notes: None,
            child_id: None,
            breast_left: None,
            breast_right: None,
        }
    }

    pub fn with_quantity(mut self, quantity: f64) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn for_child(mut self, child_id: impl Into<String>) -> Self {
        self.child_id = Some(child_id.into());
        self
    }

    /// Path of this event on the API
    pub fn target(&self) -> String {
        event_target(&self.id)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.id.trim().is_empty() {
            return Err(SyncError::validation("id", "must not be empty"));
        }
        if let Some(quantity) = self.quantity {
            if !quantity.is_finite() || quantity < 0.0 {
                return Err(SyncError::validation("quantity", "must be a non-negative number"));
            }
        }
        Ok(())
    }

    /// Mutation creating this event
    pub fn create_mutation(&self) -> Result<Mutation, SyncError> {
        self.validate()?;
        Ok(Mutation::Create(serde_json::to_value(self)?))
    }

    /// Mutation overwriting this event
    pub fn update_mutation(&self) -> Result<Mutation, SyncError> {
        self.validate()?;
        Ok(Mutation::Update(serde_json::to_value(self)?))
    }
}

/// Path of the event with `id`
pub fn event_target(id: &str) -> String {
    format!("{}/{}", EVENTS_PATH, id)
}

/// Event writes routed through the offline queue
#[derive(Debug, Clone)]
pub struct EventsClient {
    service: Arc<SyncService>,
}

impl EventsClient {
    pub fn new(service: Arc<SyncService>) -> Self {
        Self { service }
    }

    /// Queue the creation of `event`
    pub async fn add_event(&self, event: &BabyEvent) -> Result<Uuid, SyncError> {
        self.service.enqueue(event.create_mutation()?, EVENTS_PATH).await
    }

    /// Queue an update of `event`
    pub async fn update_event(&self, event: &BabyEvent) -> Result<Uuid, SyncError> {
        self.service.enqueue(event.update_mutation()?, event.target()).await
    }

    /// Queue the deletion of the event with `id`
    pub async fn delete_event(&self, id: &str) -> Result<Uuid, SyncError> {
        if id.trim().is_empty() {
            return Err(SyncError::validation("id", "must not be empty"));
        }
        self.service.enqueue(Mutation::Delete, event_target(id)).await
    }
}
