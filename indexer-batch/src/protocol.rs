//! Wire types of the batch indexer.
//!
//! The inbound format is the relay-produced ingest payload; the outbound
//! format is the integer-keyed record consumed by the columnar storage
//! writers. Both travel as JSON message bodies on the message bus, with a
//! small set of transport headers on the outbound side.

use std::collections::BTreeMap;

use bytes::Bytes;
use indexer_base_schema::metrics::{MetricType, UseCaseId};
use indexer_base_schema::organization::OrganizationId;
use indexer_base_schema::project::ProjectId;
use indexer_common::UnixTimestamp;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::resolution::FetchType;

/// Type used for counter metric values.
pub type CounterType = f64;

/// Type of distribution entries.
pub type DistributionType = f64;

/// Type used for set elements.
///
/// Set values are pre-hashed into 32-bit integers before they reach the
/// indexer; the original values never appear in the payload.
pub type SetType = u32;

/// The values of a distribution metric.
pub type DistributionValue = SmallVec<[DistributionType; 3]>;

/// The values of a set metric.
pub type SetValue = SmallVec<[SetType; 3]>;

/// The number of days a metric is retained when the payload does not specify
/// a retention.
const DEFAULT_RETENTION_DAYS: u16 = 90;

fn default_retention_days() -> u16 {
    DEFAULT_RETENTION_DAYS
}

/// The typed value of a metric message.
///
/// The type and the values are sent in two separate payload fields:
///
/// ```json
/// {"type": "d", "value": [4.0, 5.0, 6.0]}
/// ```
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum MetricValue {
    /// Counts instances of an event. See [`MetricType::Counter`].
    #[serde(rename = "c")]
    Counter(CounterType),
    /// Builds a statistical distribution over values reported. See
    /// [`MetricType::Distribution`].
    #[serde(rename = "d")]
    Distribution(DistributionValue),
    /// Counts the number of unique reported values. See [`MetricType::Set`].
    #[serde(rename = "s")]
    Set(SetValue),
}

impl MetricValue {
    /// Returns the type of this value.
    pub fn ty(&self) -> MetricType {
        match self {
            Self::Counter(_) => MetricType::Counter,
            Self::Distribution(_) => MetricType::Distribution,
            Self::Set(_) => MetricType::Set,
        }
    }
}

/// The unique identity of a message within a consumer batch.
///
/// All state derived from a raw message correlates back to this key, and the
/// cardinality filter hook removes messages by it.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct PartitionOffset {
    /// Index of the topic partition the message was read from.
    pub partition: u32,
    /// The message's offset within that partition.
    pub offset: u64,
}

/// An opaque transport envelope around one consumed message.
///
/// Raw messages are owned by the transport; the batch decodes the payload
/// once and never mutates the envelope.
#[derive(Clone, Debug)]
pub struct RawMessage {
    /// Index of the topic partition the message was read from.
    pub partition: u32,
    /// The message's offset within that partition.
    pub offset: u64,
    /// The time the transport received the message.
    pub timestamp: UnixTimestamp,
    /// The raw message body.
    pub payload: Bytes,
    /// Transport headers attached by the producer.
    pub headers: BTreeMap<String, String>,
}

impl RawMessage {
    /// Returns the unique identity of this message within the batch.
    pub fn key(&self) -> PartitionOffset {
        PartitionOffset {
            partition: self.partition,
            offset: self.offset,
        }
    }
}

/// A decoded and validated metric message.
///
/// Instances exist only for messages that passed payload validation; all
/// fields except `unit` and `retention_days` are required on the wire.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ParsedMetric {
    /// The organization emitting the metric.
    pub org_id: OrganizationId,
    /// The project emitting the metric.
    pub project_id: ProjectId,
    /// The metric name in MRI format, e.g. `c:sessions/session@none`.
    pub name: String,
    /// The typed metric value.
    #[serde(flatten)]
    pub value: MetricValue,
    /// The time the metric was recorded, in unix seconds.
    pub timestamp: UnixTimestamp,
    /// Dimensions of the data point. May be empty.
    pub tags: BTreeMap<String, String>,
    /// The unit of the value, sent for distributions only.
    #[serde(default)]
    pub unit: Option<String>,
    /// The number of days this metric is retained.
    #[serde(default = "default_retention_days")]
    pub retention_days: u16,
}

/// The value of a single outgoing tag.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    /// The integer id of an indexed tag value.
    Indexed(u64),
    /// The verbatim tag value, used when tag value indexing is disabled.
    Raw(String),
}

/// A fully reconstructed, integer-keyed metric record.
///
/// `version: 2` marks the wire variant in which tag values are raw strings
/// instead of integer ids; payloads with indexed tag values carry no version
/// field at all. Consumers rely on this to tell the two formats apart, so the
/// field must never be serialized as `null`.
#[derive(Clone, Debug, Serialize)]
pub struct IndexedMetricMessage {
    /// Wire format version, present only when tag values are not indexed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<u8>,
    /// Reverse index from integer id back to original string, grouped by the
    /// fetch-type bucket the id came from. Used downstream for debugging and
    /// backfill.
    pub mapping_meta: BTreeMap<FetchType, BTreeMap<String, String>>,
    /// The resolved id of the metric name.
    pub metric_id: u64,
    /// The organization emitting the metric.
    pub org_id: OrganizationId,
    /// The project emitting the metric.
    pub project_id: ProjectId,
    /// The number of days this metric is retained.
    pub retention_days: u16,
    /// Tags keyed by the stringified tag key id.
    pub tags: BTreeMap<String, TagValue>,
    /// The time the metric was recorded, in unix seconds.
    pub timestamp: UnixTimestamp,
    /// The typed metric value, passed through unchanged.
    #[serde(flatten)]
    pub value: MetricValue,
    /// The unit of the value, present only if the input had one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// The logical namespace the batch was configured with.
    pub use_case_id: UseCaseId,
}

/// An error returned when an outgoing payload cannot be serialized.
#[derive(Debug, Error)]
#[error("failed to serialize json message")]
pub struct SerializationError(#[from] serde_json::Error);

/// A reconstructed message ready to be handed to the transport producer.
///
/// The producer owns partitioning and offset commits; this type only exposes
/// the payload, the transport headers, and a routing key.
#[derive(Clone, Debug)]
pub struct RoutedMessage {
    headers: BTreeMap<String, String>,
    payload: IndexedMetricMessage,
}

impl RoutedMessage {
    pub(crate) fn new(payload: IndexedMetricMessage) -> Self {
        let mapping_sources: String = payload.mapping_meta.keys().map(FetchType::as_str).collect();

        let headers = BTreeMap::from([
            ("mapping_sources".to_owned(), mapping_sources),
            (
                "metric_type".to_owned(),
                payload.value.ty().as_str().to_owned(),
            ),
        ]);

        Self { headers, payload }
    }

    /// Returns the transport headers for this message.
    ///
    /// `mapping_sources` concatenates the bucket codes present in the
    /// payload's `mapping_meta`, in bucket order; `metric_type` carries the
    /// single-letter metric type code.
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Returns the message payload.
    pub fn payload(&self) -> &IndexedMetricMessage {
        &self.payload
    }

    /// Returns the key used to partition outgoing messages.
    pub fn routing_key(&self) -> u64 {
        self.payload.org_id.value()
    }

    /// Serializes the payload into its binary format.
    pub fn serialize(&self) -> Result<Vec<u8>, SerializationError> {
        Ok(serde_json::to_vec(&self.payload)?)
    }
}
