//! Contains the [`OrganizationId`] type and associated trait implementations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raised if an organization ID cannot be parsed from a string.
#[derive(Debug, Error, Eq, Ord, PartialEq, PartialOrd)]
pub enum ParseOrganizationIdError {
    /// Raised if the value is not an integer in the supported range.
    #[error("invalid value for organization id")]
    InvalidValue,
    /// Raised if an empty value is parsed.
    #[error("empty or missing organization id")]
    EmptyValue,
}

/// The unique identifier of a Sentry organization.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Ord, PartialOrd, Hash, Deserialize, Serialize,
)]
pub struct OrganizationId(u64);

impl OrganizationId {
    /// Creates a new organization ID from its numeric value.
    #[inline]
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the numeric value of this organization ID.
    #[inline]
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value())
    }
}

impl FromStr for OrganizationId {
    type Err = ParseOrganizationIdError;

    fn from_str(s: &str) -> Result<OrganizationId, ParseOrganizationIdError> {
        if s.is_empty() {
            return Err(ParseOrganizationIdError::EmptyValue);
        }

        match s.parse::<u64>() {
            Ok(val) => Ok(OrganizationId::new(val)),
            Err(_) => Err(ParseOrganizationIdError::InvalidValue),
        }
    }
}
