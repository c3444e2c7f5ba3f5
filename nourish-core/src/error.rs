use chrono::NaiveTime;
use thiserror::Error;
use uuid::Uuid;

use crate::model::MealSlot;

/// A plan or meal request that was rejected before anything was persisted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InvalidPlanRequest {
    #[error("day count must be between 1 and 365, got {0}")]
    DayCountOutOfRange(u32),

    #[error("at least one meal slot must be selected")]
    NoSlotsSelected,

    #[error("no time window configured for {0}")]
    MissingWindow(MealSlot),

    #[error("{slot} window must start before it ends ({start} >= {end})")]
    InvertedWindow {
        slot: MealSlot,
        start: NaiveTime,
        end: NaiveTime,
    },
}

/// Failure reported by the persistence collaborator.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("{table} row could not be decoded: {message}")]
    Corrupt { table: &'static str, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error(transparent)]
    InvalidPlan(#[from] InvalidPlanRequest),

    #[error("water amount must be positive, got {0} ml")]
    InvalidWaterAmount(i64),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("no caregiver profile exists yet")]
    NoCaregiver,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl TrackerError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        TrackerError::NotFound { entity, id }
    }
}
