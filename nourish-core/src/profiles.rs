//! People on either side of a program: caregivers and the subjects they plan for.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TrackerError;
use crate::model::DEFAULT_WATER_TARGET_ML;
use crate::store::{Record, Value};

pub const MIN_WATER_TARGET_ML: u32 = 1000;
pub const MAX_WATER_TARGET_ML: u32 = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Caregiver,
    Subject,
}

impl Role {
    pub fn key(&self) -> &'static str {
        match self {
            Role::Caregiver => "caregiver",
            Role::Subject => "subject",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "caregiver" => Ok(Role::Caregiver),
            "subject" => Ok(Role::Subject),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    pub role: Role,
    pub full_name: String,
    /// Lowercased; unique per role.
    pub email: Option<String>,
    pub phone: Option<String>,
    pub daily_water_target_ml: u32,
    pub created_at_utc: DateTime<Utc>,
}

impl Profile {
    pub fn new(role: Role, full_name: &str, email: Option<&str>, now: DateTime<Utc>) -> Result<Self, TrackerError> {
        let full_name = full_name.trim();
        if full_name.is_empty() {
            return Err(TrackerError::InvalidInput("full name must not be empty".to_string()));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            role,
            full_name: full_name.to_string(),
            email: email.map(normalize_email).transpose()?,
            phone: None,
            daily_water_target_ml: DEFAULT_WATER_TARGET_ML,
            created_at_utc: now,
        })
    }

    /// Case-insensitive name match; an empty term matches everyone.
    pub fn name_matches(&self, term: &str) -> bool {
        let term = term.trim().to_lowercase();
        term.is_empty() || self.full_name.to_lowercase().contains(&term)
    }
}

/// Trimmed and lowercased; rejects anything without a local part and a domain.
pub fn normalize_email(email: &str) -> Result<String, TrackerError> {
    let email = email.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => Ok(email),
        _ => Err(TrackerError::InvalidInput(format!("'{email}' is not an email address"))),
    }
}

pub fn validate_water_target(ml: u32) -> Result<u32, TrackerError> {
    if !(MIN_WATER_TARGET_ML..=MAX_WATER_TARGET_ML).contains(&ml) {
        return Err(TrackerError::InvalidInput(format!(
            "water target must be between {MIN_WATER_TARGET_ML} and {MAX_WATER_TARGET_ML} ml, got {ml}"
        )));
    }
    Ok(ml)
}

impl Record for Profile {
    const TABLE: &'static str = "profiles";

    fn id(&self) -> Uuid {
        self.id
    }

    fn field(&self, name: &str) -> Value {
        match name {
            "id" => self.id.into(),
            "role" => self.role.key().into(),
            "full_name" => self.full_name.clone().into(),
            "email" => self.email.clone().into(),
            "created_at" => self.created_at_utc.into(),
            _ => Value::Null,
        }
    }
}
