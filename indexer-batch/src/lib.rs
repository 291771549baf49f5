//! Batch indexing for the metrics ingestion pipeline.
//!
//! This crate converts a batch of raw metric-emission messages (counters,
//! distributions, and sets) into compact, integer-keyed records for the
//! columnar storage backend. Strings are replaced by integer ids obtained
//! from an external resolver; messages whose strings cannot be resolved are
//! dropped with structured reporting instead of failing the batch.
//!
//! # Processing Phases
//!
//! A batch is processed in a single synchronous pass:
//!
//! 1. [`IndexerBatch::parse`] decodes and validates the raw messages.
//! 2. [`IndexerBatch::filter_messages`] (optional) removes messages rejected
//!    by an external cardinality limiter. This must happen before string
//!    extraction.
//! 3. [`IndexerBatch::extract_strings`] collects the per-organization sets of
//!    strings requiring integer ids.
//! 4. The caller resolves the strings against cache, database, and quotas.
//!    This is the only blocking step and happens outside this crate.
//! 5. [`IndexerBatch::reconstruct_messages`] rebuilds the surviving messages
//!    with integer-keyed tags and provenance metadata.
//!
//! Batches are isolated from each other: all working state lives in the
//! [`IndexerBatch`] value and is discarded after reconstruction.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//!
//! use bytes::Bytes;
//! use indexer_base_schema::metrics::UseCaseId;
//! use indexer_base_schema::organization::OrganizationId;
//! use indexer_batch::{
//!     BatchConfig, FetchType, IndexerBatch, Metadata, RawMessage, ResolutionMetadata,
//!     ResolvedMapping,
//! };
//! use indexer_common::UnixTimestamp;
//!
//! let raw = RawMessage {
//!     partition: 0,
//!     offset: 1,
//!     timestamp: UnixTimestamp::from_secs(1615889440),
//!     payload: Bytes::from_static(
//!         br#"{
//!             "name": "c:sessions/session@none",
//!             "tags": {},
//!             "timestamp": 1615889440,
//!             "type": "c",
//!             "value": 1.0,
//!             "org_id": 1,
//!             "project_id": 3
//!         }"#,
//!     ),
//!     headers: BTreeMap::new(),
//! };
//!
//! let config = BatchConfig {
//!     use_case_id: UseCaseId::Sessions,
//!     index_tag_values: true,
//! };
//!
//! let batch = IndexerBatch::parse(&[raw], config);
//! let org_strings = batch.extract_strings();
//! assert_eq!(org_strings.len(), 1);
//!
//! // Resolution happens externally; mock it for the one string here.
//! let org_id = OrganizationId::new(1);
//! let name = "c:sessions/session@none".to_owned();
//! let resolved: ResolvedMapping =
//!     BTreeMap::from([(org_id, BTreeMap::from([(name.clone(), Some(1))]))]);
//! let metadata: ResolutionMetadata = BTreeMap::from([(
//!     org_id,
//!     BTreeMap::from([(
//!         name,
//!         Metadata {
//!             id: Some(1),
//!             fetch_type: FetchType::CacheHit,
//!             fetch_type_ext: None,
//!         },
//!     )]),
//! )]);
//!
//! let outgoing = batch.reconstruct_messages(&resolved, &metadata).unwrap();
//! assert_eq!(outgoing.len(), 1);
//! assert_eq!(outgoing[0].payload().metric_id, 1);
//! ```

#![warn(missing_docs)]

mod batch;
mod protocol;
mod report;
mod resolution;
mod statsd;

pub use self::batch::*;
pub use self::protocol::*;
pub use self::report::*;
pub use self::resolution::*;
