//! Output model of the external string resolver.
//!
//! The resolver itself (cache, database lookup, hardcoded tables, and the
//! rate limiter deciding whether new ids may be minted) lives outside this
//! crate. Reconstruction only consumes its output: a string-to-id mapping per
//! organization, plus per-string [`Metadata`] describing where each id came
//! from.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use indexer_base_schema::organization::OrganizationId;
use indexer_common::impl_str_serde;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The deduplicated strings requiring resolution, per organization.
pub type OrgStrings = BTreeMap<OrganizationId, BTreeSet<String>>;

/// Mapping from string to resolved integer id, per organization.
///
/// A string maps to `None` if no id could be resolved for it, typically
/// because minting a new id was rate limited. Reconstruction treats a string
/// that is missing from the mapping entirely exactly like one mapped to
/// `None`.
pub type ResolvedMapping = BTreeMap<OrganizationId, BTreeMap<String, Option<u64>>>;

/// Per-string resolution metadata, per organization.
pub type ResolutionMetadata = BTreeMap<OrganizationId, BTreeMap<String, Metadata>>;

/// An error parsing a [`FetchType`] from its bucket code.
#[derive(Clone, Copy, Debug, Error, Eq, PartialEq)]
#[error("invalid fetch type")]
pub struct ParseFetchTypeError;

/// Provenance of a resolved string id.
///
/// The variant order defines the bucket order in `mapping_meta` and the
/// `mapping_sources` transport header.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FetchType {
    /// The id was served from the resolver's cache.
    CacheHit,
    /// The id was read from the database.
    DbRead,
    /// The id comes from the hardcoded table of well-known strings.
    Hardcoded,
    /// No new id was minted for this string because an id quota was exhausted.
    ///
    /// A rate limited string can still carry an id if one existed before the
    /// quota was hit.
    RateLimited,
}

impl FetchType {
    /// Returns the single-letter bucket code for this fetch type.
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchType::CacheHit => "c",
            FetchType::DbRead => "d",
            FetchType::Hardcoded => "h",
            FetchType::RateLimited => "r",
        }
    }
}

impl fmt::Display for FetchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for FetchType {
    type Err = ParseFetchTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "c" => Self::CacheHit,
            "d" => Self::DbRead,
            "h" => Self::Hardcoded,
            "r" => Self::RateLimited,
            _ => return Err(ParseFetchTypeError),
        })
    }
}

impl_str_serde!(FetchType, "a fetch type bucket code");

/// Extended information on how a rate limit decision was made.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct FetchTypeExt {
    /// Whether the exhausted quota is shared across all organizations, as
    /// opposed to scoped to the message's organization.
    pub is_global: bool,
}

/// Resolution metadata for a single string.
///
/// Metadata feeds the `mapping_meta` provenance index and drop-reason
/// classification. It never overrides the ids in [`ResolvedMapping`].
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Metadata {
    /// The integer id recorded for the string, if any.
    pub id: Option<u64>,
    /// How the id was obtained.
    pub fetch_type: FetchType,
    /// Extended fetch information, present only for rate limited strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_type_ext: Option<FetchTypeExt>,
}

impl Metadata {
    /// Returns whether a shared/global quota produced this outcome.
    ///
    /// Defaults to `false` when no extended information is present.
    pub fn is_global_quota(&self) -> bool {
        self.fetch_type_ext.is_some_and(|ext| ext.is_global)
    }

    /// Returns the key under which the string is recorded in its
    /// `mapping_meta` bucket.
    ///
    /// Ids render in decimal. A missing id uses the literal key `"None"`,
    /// which is a reserved sentinel of the wire format: downstream consumers
    /// parse it to find strings that were rate limited without a prior id.
    pub fn meta_key(&self) -> String {
        match self.id {
            Some(id) => id.to_string(),
            None => "None".to_owned(),
        }
    }
}
