//! The stateful working batch and its processing phases.

use std::collections::{BTreeMap, BTreeSet};

use indexer_base_schema::metrics::{MetricResourceIdentifier, UseCaseId};
use indexer_base_schema::organization::OrganizationId;
use indexer_statsd::metric;
use indexmap::IndexMap;
use thiserror::Error;

use crate::protocol::{
    IndexedMetricMessage, ParsedMetric, PartitionOffset, RawMessage, RoutedMessage, TagValue,
};
use crate::report::{DropDecision, DropReporter, ReportContext, StringRole};
use crate::resolution::{FetchType, Metadata, OrgStrings, ResolutionMetadata, ResolvedMapping};
use crate::statsd::{BatchCounters, BatchHistograms, BatchTimers};

/// Configuration for processing one batch.
#[derive(Clone, Copy, Debug)]
pub struct BatchConfig {
    /// The logical namespace this batch was configured with, stamped into
    /// every outgoing payload.
    pub use_case_id: UseCaseId,

    /// Whether tag values are resolved to integer ids.
    ///
    /// When disabled, outgoing tags keep their raw string values and every
    /// payload carries the `version: 2` wire marker instead.
    pub index_tag_values: bool,
}

/// An error returned by [`IndexerBatch::reconstruct_messages`] when the
/// resolver broke its contract.
///
/// Per-message resolution failures are not errors; they surface as drops.
#[derive(Debug, Error)]
pub enum ReconstructError {
    /// The resolved mapping or metadata has no entry at all for an
    /// organization whose strings were requested.
    #[error("resolver returned no entry for organization {0}")]
    MissingOrg(OrganizationId),
}

/// The working state of one consumer batch.
///
/// A batch is constructed once per processing pass via [`parse`](Self::parse),
/// progressively narrowed by [`filter_messages`](Self::filter_messages), and
/// consumed by [`reconstruct_messages`](Self::reconstruct_messages). The
/// parsed-message mapping is owned exclusively by the batch; nothing outside
/// this type mutates it.
#[derive(Debug)]
pub struct IndexerBatch {
    config: BatchConfig,
    parsed: IndexMap<PartitionOffset, ParsedMetric>,
}

impl IndexerBatch {
    /// Decodes a raw consumer batch into its valid metric messages.
    ///
    /// A message whose payload cannot be decoded, is missing required fields,
    /// or carries a name that is not a valid MRI is excluded here and never
    /// seen again by later phases. These are local failures; they do not fail
    /// the batch.
    ///
    /// Messages keep their original order and their partition/offset
    /// identity, so they remain addressable for filtering.
    pub fn parse(messages: &[RawMessage], config: BatchConfig) -> Self {
        let mut parsed = IndexMap::with_capacity(messages.len());

        for message in messages {
            let metric = match serde_json::from_slice::<ParsedMetric>(&message.payload) {
                Ok(metric) => metric,
                Err(error) => {
                    indexer_log::debug!(
                        error = &error as &dyn std::error::Error,
                        partition = message.partition,
                        offset = message.offset,
                        "skipping undecodable metric payload"
                    );
                    metric!(
                        counter(BatchCounters::InvalidMessage) += 1,
                        reason = "schema"
                    );
                    continue;
                }
            };

            if MetricResourceIdentifier::parse(&metric.name).is_err() {
                indexer_log::debug!(
                    metric = metric.name.as_str(),
                    "skipping metric with invalid MRI"
                );
                metric!(counter(BatchCounters::InvalidMessage) += 1, reason = "mri");
                continue;
            }

            parsed.insert(message.key(), metric);
        }

        metric!(histogram(BatchHistograms::ParsedBatchSize) = parsed.len() as u64);

        Self { config, parsed }
    }

    /// Returns the number of messages currently in the working batch.
    pub fn message_count(&self) -> usize {
        self.parsed.len()
    }

    /// Removes the given messages from the working batch.
    ///
    /// Removal is idempotent: keys that are absent, or were already removed,
    /// are ignored.
    ///
    /// Filtering must happen before the [`extract_strings`](Self::extract_strings)
    /// call whose result is sent for resolution, so that removed messages
    /// contribute no strings. String sets extracted earlier are not updated
    /// retroactively; a cardinality limiter typically uses such an early
    /// extraction only to discover the cardinality a batch would consume,
    /// then filters and extracts again.
    pub fn filter_messages(&mut self, keys_to_remove: &BTreeSet<PartitionOffset>) {
        let mut removed: i64 = 0;
        for key in keys_to_remove {
            if self.parsed.shift_remove(key).is_some() {
                removed += 1;
            }
        }

        if removed > 0 {
            metric!(counter(BatchCounters::FilteredMessage) += removed);
        }
    }

    /// Collects the deduplicated strings requiring integer ids, per
    /// organization.
    ///
    /// For every remaining message this includes the metric name and all tag
    /// keys; tag values are included only when tag value indexing is enabled
    /// for the batch. The result always reflects the current state of the
    /// working batch, so repeated calls without intervening filtering return
    /// identical sets.
    pub fn extract_strings(&self) -> OrgStrings {
        let mut org_strings = OrgStrings::new();
        for metric in self.parsed.values() {
            let strings = org_strings.entry(metric.org_id).or_default();
            strings.insert(metric.name.clone());

            for (key, value) in &metric.tags {
                strings.insert(key.clone());
                if self.config.index_tag_values {
                    strings.insert(value.clone());
                }
            }
        }

        let total: usize = org_strings.values().map(BTreeSet::len).sum();
        metric!(histogram(BatchHistograms::ExtractedStrings) = total as u64);

        org_strings
    }

    /// Rebuilds the outgoing messages from the resolved string ids.
    ///
    /// Messages are emitted in their original batch order. A message survives
    /// only if its metric name, every tag key, and — when tag value indexing
    /// is enabled — every tag value resolved to an id; otherwise the whole
    /// message is dropped and reported, never partially emitted. A string
    /// that is missing from `resolved` entirely is treated exactly like one
    /// that is present without an id.
    ///
    /// `resolved` and `metadata` are shared across all messages of the batch;
    /// each message is evaluated independently against them.
    ///
    /// # Errors
    ///
    /// Returns an error if `resolved` or `metadata` is missing an entire
    /// organization whose strings were sent for resolution. This indicates
    /// the resolver did not honor its contract, and the batch cannot be
    /// processed.
    pub fn reconstruct_messages(
        self,
        resolved: &ResolvedMapping,
        metadata: &ResolutionMetadata,
    ) -> Result<Vec<RoutedMessage>, ReconstructError> {
        let reporter = DropReporter;

        metric!(timer(BatchTimers::ReconstructMessages), {
            let mut output = Vec::with_capacity(self.parsed.len());

            for metric in self.parsed.values() {
                let org_resolved = resolved
                    .get(&metric.org_id)
                    .ok_or(ReconstructError::MissingOrg(metric.org_id))?;
                let org_metadata = metadata
                    .get(&metric.org_id)
                    .ok_or(ReconstructError::MissingOrg(metric.org_id))?;

                match self.reconstruct_message(metric, org_resolved, org_metadata) {
                    Ok(message) => output.push(message),
                    Err(decision) => {
                        let context = ReportContext {
                            org_batch_size: org_resolved.len(),
                        };
                        reporter.report(decision, context);
                    }
                }
            }

            Ok(output)
        })
    }

    /// Rebuilds a single message, or decides to drop it.
    fn reconstruct_message(
        &self,
        metric: &ParsedMetric,
        resolved: &BTreeMap<String, Option<u64>>,
        metadata: &BTreeMap<String, Metadata>,
    ) -> Result<RoutedMessage, DropDecision> {
        let Some(metric_id) = resolve(resolved, &metric.name) else {
            return Err(DropDecision::Drop {
                role: StringRole::MetricName,
                is_global_quota: is_global_quota(metadata, &metric.name),
            });
        };

        let mut used_strings = vec![metric.name.as_str()];
        let mut tags = BTreeMap::new();

        for (key, value) in &metric.tags {
            let Some(key_id) = resolve(resolved, key) else {
                return Err(DropDecision::Drop {
                    role: StringRole::TagKey,
                    is_global_quota: is_global_quota(metadata, key),
                });
            };
            used_strings.push(key.as_str());

            let tag_value = if self.config.index_tag_values {
                let Some(value_id) = resolve(resolved, value) else {
                    return Err(DropDecision::Drop {
                        role: StringRole::TagValue,
                        is_global_quota: is_global_quota(metadata, value),
                    });
                };
                used_strings.push(value.as_str());
                TagValue::Indexed(value_id)
            } else {
                TagValue::Raw(value.clone())
            };

            tags.insert(key_id.to_string(), tag_value);
        }

        let mut mapping_meta: BTreeMap<FetchType, BTreeMap<String, String>> = BTreeMap::new();
        for string in used_strings {
            if let Some(meta) = metadata.get(string) {
                mapping_meta
                    .entry(meta.fetch_type)
                    .or_default()
                    .insert(meta.meta_key(), string.to_owned());
            }
        }

        let payload = IndexedMetricMessage {
            version: (!self.config.index_tag_values).then_some(2),
            mapping_meta,
            metric_id,
            org_id: metric.org_id,
            project_id: metric.project_id,
            retention_days: metric.retention_days,
            tags,
            timestamp: metric.timestamp,
            value: metric.value.clone(),
            unit: metric.unit.clone(),
            use_case_id: self.config.use_case_id,
        };

        Ok(RoutedMessage::new(payload))
    }
}

/// Looks up a string's id, treating a missing entry like an explicit `None`.
fn resolve(resolved: &BTreeMap<String, Option<u64>>, string: &str) -> Option<u64> {
    resolved.get(string).copied().flatten()
}

/// Classifies a drop as caused by a global or an organization-scoped quota.
fn is_global_quota(metadata: &BTreeMap<String, Metadata>, string: &str) -> bool {
    metadata
        .get(string)
        .is_some_and(Metadata::is_global_quota)
}

#[cfg(test)]
mod tests {
    use indexer_common::UnixTimestamp;
    use serde_json::json;
    use similar_asserts::assert_eq;

    use crate::resolution::FetchTypeExt;

    use super::*;

    fn raw(partition: u32, offset: u64, payload: serde_json::Value) -> RawMessage {
        RawMessage {
            partition,
            offset,
            timestamp: UnixTimestamp::from_secs(1615889440),
            payload: serde_json::to_vec(&payload).unwrap().into(),
            headers: BTreeMap::new(),
        }
    }

    fn key(partition: u32, offset: u64) -> PartitionOffset {
        PartitionOffset { partition, offset }
    }

    fn config(index_tag_values: bool) -> BatchConfig {
        BatchConfig {
            use_case_id: UseCaseId::Sessions,
            index_tag_values,
        }
    }

    /// One counter, one distribution, one set message for org 1 / project 3.
    fn sessions_batch() -> Vec<RawMessage> {
        vec![
            raw(
                0,
                0,
                json!({
                    "name": "c:sessions/session@none",
                    "tags": {"environment": "production", "session.status": "init"},
                    "timestamp": 1615889440,
                    "type": "c",
                    "value": 1.0,
                    "org_id": 1,
                    "project_id": 3,
                    "retention_days": 90,
                }),
            ),
            raw(
                0,
                1,
                json!({
                    "name": "d:sessions/duration@second",
                    "tags": {"environment": "production", "session.status": "healthy"},
                    "timestamp": 1615889440,
                    "type": "d",
                    "value": [4.0, 5.0, 6.0],
                    "unit": "seconds",
                    "org_id": 1,
                    "project_id": 3,
                }),
            ),
            raw(
                0,
                2,
                json!({
                    "name": "s:sessions/error@none",
                    "tags": {"environment": "production", "session.status": "errored"},
                    "timestamp": 1615889440,
                    "type": "s",
                    "value": [3],
                    "org_id": 1,
                    "project_id": 3,
                }),
            ),
        ]
    }

    /// Assigns ids `1..` to all extracted strings in sorted order, recording
    /// the given fetch type for each.
    fn resolve_all(
        org_strings: &OrgStrings,
        fetch_type: FetchType,
    ) -> (ResolvedMapping, ResolutionMetadata) {
        let mut resolved = ResolvedMapping::new();
        let mut metadata = ResolutionMetadata::new();

        for (org_id, strings) in org_strings {
            let org_resolved = resolved.entry(*org_id).or_default();
            let org_metadata = metadata.entry(*org_id).or_default();

            for (index, string) in strings.iter().enumerate() {
                let id = index as u64 + 1;
                org_resolved.insert(string.clone(), Some(id));
                org_metadata.insert(
                    string.clone(),
                    Metadata {
                        id: Some(id),
                        fetch_type,
                        fetch_type_ext: None,
                    },
                );
            }
        }

        (resolved, metadata)
    }

    fn org(id: u64) -> OrganizationId {
        OrganizationId::new(id)
    }

    #[test]
    fn test_parse_batch() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(true));
        assert_eq!(batch.message_count(), 3);
    }

    #[test]
    fn test_parse_skips_invalid_messages() {
        let mut messages = sessions_batch();

        // Not JSON at all.
        messages.push(RawMessage {
            partition: 0,
            offset: 3,
            timestamp: UnixTimestamp::from_secs(1615889440),
            payload: b"not json".to_vec().into(),
            headers: BTreeMap::new(),
        });

        // Missing org_id.
        messages.push(raw(
            0,
            4,
            json!({
                "name": "c:sessions/session@none",
                "tags": {},
                "timestamp": 1615889440,
                "type": "c",
                "value": 1.0,
                "project_id": 3,
            }),
        ));

        // Name is not a valid MRI.
        messages.push(raw(
            0,
            5,
            json!({
                "name": "sessions.session",
                "tags": {},
                "timestamp": 1615889440,
                "type": "c",
                "value": 1.0,
                "org_id": 1,
                "project_id": 3,
            }),
        ));

        let captures = indexer_statsd::with_capturing_test_client(|| {
            let batch = IndexerBatch::parse(&messages, config(true));
            assert_eq!(batch.message_count(), 3);
        });

        assert_eq!(
            captures,
            [
                "process_messages.invalid_message:1|c|#reason:schema",
                "process_messages.invalid_message:1|c|#reason:schema",
                "process_messages.invalid_message:1|c|#reason:mri",
                "process_messages.parsed_batch_size:3|h",
            ]
        );
    }

    #[test]
    fn test_extract_strings() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(true));
        let org_strings = batch.extract_strings();

        let expected: BTreeSet<String> = [
            "c:sessions/session@none",
            "d:sessions/duration@second",
            "environment",
            "errored",
            "healthy",
            "init",
            "production",
            "s:sessions/error@none",
            "session.status",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();

        assert_eq!(org_strings, BTreeMap::from([(org(1), expected)]));
    }

    #[test]
    fn test_extract_strings_is_idempotent() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(true));
        let first = batch.extract_strings();
        let second = batch.extract_strings();
        assert_eq!(first, second);
    }

    #[test]
    fn test_extract_strings_without_tag_values() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(false));
        let org_strings = batch.extract_strings();

        let expected: BTreeSet<String> = [
            "c:sessions/session@none",
            "d:sessions/duration@second",
            "environment",
            "s:sessions/error@none",
            "session.status",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();

        assert_eq!(org_strings, BTreeMap::from([(org(1), expected)]));
    }

    #[test]
    fn test_filter_then_extract() {
        let mut batch = IndexerBatch::parse(&sessions_batch(), config(true));

        // First extraction pass discovers the full cardinality of the batch.
        let discovered = batch.extract_strings();
        assert_eq!(discovered[&org(1)].len(), 9);

        batch.filter_messages(&BTreeSet::from([key(0, 0), key(0, 1)]));
        assert_eq!(batch.message_count(), 1);

        // Only the strings of the remaining set message survive.
        let expected: BTreeSet<String> = [
            "environment",
            "errored",
            "production",
            "s:sessions/error@none",
            "session.status",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect();

        assert_eq!(
            batch.extract_strings(),
            BTreeMap::from([(org(1), expected)])
        );
    }

    #[test]
    fn test_filter_is_idempotent() {
        let mut batch = IndexerBatch::parse(&sessions_batch(), config(true));
        let keys = BTreeSet::from([key(0, 2), key(7, 42)]);

        batch.filter_messages(&keys);
        batch.filter_messages(&keys);

        assert_eq!(batch.message_count(), 2);
    }

    #[test]
    fn test_reconstruct_full_resolution() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(true));
        let org_strings = batch.extract_strings();
        let (resolved, metadata) = resolve_all(&org_strings, FetchType::CacheHit);

        let messages = batch.reconstruct_messages(&resolved, &metadata).unwrap();
        assert_eq!(messages.len(), 3);

        // Output preserves the original message order.
        let metric_ids: Vec<_> = messages.iter().map(|m| m.payload().metric_id).collect();
        assert_eq!(metric_ids, [1, 2, 8]);

        for message in &messages {
            let payload = serde_json::to_value(message.payload()).unwrap();
            let object = payload.as_object().unwrap();
            assert!(!object.contains_key("version"));
            assert_eq!(object["tags"].as_object().unwrap().len(), 2);
            assert_eq!(message.headers()["mapping_sources"], "c");
        }

        assert_eq!(
            serde_json::to_value(messages[0].payload()).unwrap(),
            json!({
                "mapping_meta": {
                    "c": {
                        "1": "c:sessions/session@none",
                        "3": "environment",
                        "6": "init",
                        "7": "production",
                        "9": "session.status",
                    },
                },
                "metric_id": 1,
                "org_id": 1,
                "project_id": 3,
                "retention_days": 90,
                "tags": {"3": 7, "9": 6},
                "timestamp": 1615889440,
                "type": "c",
                "value": 1.0,
                "use_case_id": "sessions",
            })
        );

        assert_eq!(
            serde_json::to_value(messages[1].payload()).unwrap(),
            json!({
                "mapping_meta": {
                    "c": {
                        "2": "d:sessions/duration@second",
                        "3": "environment",
                        "5": "healthy",
                        "7": "production",
                        "9": "session.status",
                    },
                },
                "metric_id": 2,
                "org_id": 1,
                "project_id": 3,
                "retention_days": 90,
                "tags": {"3": 7, "9": 5},
                "timestamp": 1615889440,
                "type": "d",
                "value": [4.0, 5.0, 6.0],
                "unit": "seconds",
                "use_case_id": "sessions",
            })
        );

        let headers = messages.iter().map(|m| m.headers()["metric_type"].as_str());
        assert!(headers.eq(["c", "d", "s"]));
    }

    #[test]
    fn test_reconstruct_without_tag_value_indexing() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(false));
        let org_strings = batch.extract_strings();
        let (resolved, metadata) = resolve_all(&org_strings, FetchType::CacheHit);

        let messages = batch.reconstruct_messages(&resolved, &metadata).unwrap();
        assert_eq!(messages.len(), 3);

        // Sorted resolution order: c:sessions/session@none = 1,
        // d:sessions/duration@second = 2, environment = 3,
        // s:sessions/error@none = 4, session.status = 5.
        let metric_ids: Vec<_> = messages.iter().map(|m| m.payload().metric_id).collect();
        assert_eq!(metric_ids, [1, 2, 4]);

        assert_eq!(
            serde_json::to_value(messages[0].payload()).unwrap(),
            json!({
                "version": 2,
                "mapping_meta": {
                    "c": {
                        "1": "c:sessions/session@none",
                        "3": "environment",
                        "5": "session.status",
                    },
                },
                "metric_id": 1,
                "org_id": 1,
                "project_id": 3,
                "retention_days": 90,
                "tags": {"3": "production", "5": "init"},
                "timestamp": 1615889440,
                "type": "c",
                "value": 1.0,
                "use_case_id": "sessions",
            })
        );
    }

    #[test]
    fn test_reconstruct_rate_limited_tag_key() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(true));
        let org_strings = batch.extract_strings();
        let (mut resolved, mut metadata) = resolve_all(&org_strings, FetchType::CacheHit);

        // All three messages share the environment tag key; rate limiting it
        // drops the entire batch.
        resolved
            .get_mut(&org(1))
            .unwrap()
            .insert("environment".to_owned(), None);
        metadata.get_mut(&org(1)).unwrap().insert(
            "environment".to_owned(),
            Metadata {
                id: None,
                fetch_type: FetchType::RateLimited,
                fetch_type_ext: Some(FetchTypeExt { is_global: false }),
            },
        );

        let captures = indexer_statsd::with_capturing_test_client(|| {
            let messages = batch.reconstruct_messages(&resolved, &metadata).unwrap();
            assert_eq!(messages.len(), 0);
        });

        let drops: Vec<_> = captures
            .iter()
            .filter(|line| line.starts_with("process_messages.dropped_message"))
            .collect();
        assert_eq!(
            drops,
            vec![
                "process_messages.dropped_message:1|c|#string_type:tags,is_global_quota:false";
                3
            ]
        );
    }

    #[test]
    fn test_reconstruct_global_quota_drop() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(true));
        let org_strings = batch.extract_strings();
        let (mut resolved, mut metadata) = resolve_all(&org_strings, FetchType::CacheHit);

        resolved
            .get_mut(&org(1))
            .unwrap()
            .insert("c:sessions/session@none".to_owned(), None);
        metadata.get_mut(&org(1)).unwrap().insert(
            "c:sessions/session@none".to_owned(),
            Metadata {
                id: None,
                fetch_type: FetchType::RateLimited,
                fetch_type_ext: Some(FetchTypeExt { is_global: true }),
            },
        );

        let captures = indexer_statsd::with_capturing_test_client(|| {
            let messages = batch.reconstruct_messages(&resolved, &metadata).unwrap();
            // Only the counter message is dropped.
            assert_eq!(messages.len(), 2);
        });

        assert!(captures.contains(
            &"process_messages.dropped_message:1|c|#string_type:metric_id,is_global_quota:true"
                .to_owned()
        ));
    }

    #[test]
    fn test_missing_string_treated_as_unresolved() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(true));
        let org_strings = batch.extract_strings();
        let (mut resolved, metadata) = resolve_all(&org_strings, FetchType::CacheHit);

        // Remove the entry entirely instead of setting it to None; the
        // reconstructor must not distinguish the two.
        resolved
            .get_mut(&org(1))
            .unwrap()
            .remove("c:sessions/session@none");

        let messages = batch.reconstruct_messages(&resolved, &metadata).unwrap();
        let metric_ids: Vec<_> = messages.iter().map(|m| m.payload().metric_id).collect();
        assert_eq!(metric_ids, [2, 8]);
    }

    #[test]
    fn test_reconstruct_missing_org_is_error() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(true));
        batch.extract_strings();

        let result = batch.reconstruct_messages(&ResolvedMapping::new(), &ResolutionMetadata::new());
        assert!(matches!(result, Err(ReconstructError::MissingOrg(id)) if id == org(1)));
    }

    #[test]
    fn test_mapping_meta_mixed_fetch_types() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(true));
        let org_strings = batch.extract_strings();
        let (resolved, mut metadata) = resolve_all(&org_strings, FetchType::CacheHit);

        let org_metadata = metadata.get_mut(&org(1)).unwrap();
        org_metadata.get_mut("environment").unwrap().fetch_type = FetchType::Hardcoded;
        org_metadata.get_mut("production").unwrap().fetch_type = FetchType::DbRead;

        let messages = batch.reconstruct_messages(&resolved, &metadata).unwrap();

        let payload = serde_json::to_value(messages[0].payload()).unwrap();
        assert_eq!(
            payload["mapping_meta"],
            json!({
                "c": {
                    "1": "c:sessions/session@none",
                    "6": "init",
                    "9": "session.status",
                },
                "d": {"7": "production"},
                "h": {"3": "environment"},
            })
        );
        assert_eq!(messages[0].headers()["mapping_sources"], "cdh");
    }

    #[test]
    fn test_rate_limited_string_with_prior_id_is_kept() {
        let batch = IndexerBatch::parse(&sessions_batch(), config(true));
        let org_strings = batch.extract_strings();
        let (resolved, mut metadata) = resolve_all(&org_strings, FetchType::CacheHit);

        // The string still resolves through the mapping, but the resolver
        // reports it as rate limited without an id on record. The message is
        // kept and the meta bucket uses the "None" sentinel key.
        metadata.get_mut(&org(1)).unwrap().insert(
            "production".to_owned(),
            Metadata {
                id: None,
                fetch_type: FetchType::RateLimited,
                fetch_type_ext: Some(FetchTypeExt { is_global: false }),
            },
        );

        let messages = batch.reconstruct_messages(&resolved, &metadata).unwrap();
        assert_eq!(messages.len(), 3);

        let payload = serde_json::to_value(messages[0].payload()).unwrap();
        assert_eq!(payload["mapping_meta"]["r"], json!({"None": "production"}));
        assert_eq!(messages[0].headers()["mapping_sources"], "cr");
    }

    #[test]
    fn test_reconstruct_empty_tags() {
        let messages = vec![raw(
            0,
            0,
            json!({
                "name": "c:sessions/session@none",
                "tags": {},
                "timestamp": 1615889440,
                "type": "c",
                "value": 2.0,
                "org_id": 1,
                "project_id": 3,
            }),
        )];

        let batch = IndexerBatch::parse(&messages, config(true));
        let org_strings = batch.extract_strings();
        let (resolved, metadata) = resolve_all(&org_strings, FetchType::CacheHit);

        let output = batch.reconstruct_messages(&resolved, &metadata).unwrap();
        assert_eq!(output.len(), 1);
        assert!(output[0].payload().tags.is_empty());
    }

    #[test]
    fn test_reconstruct_multiple_orgs() {
        let mut messages = sessions_batch();
        messages.push(raw(
            1,
            0,
            json!({
                "name": "c:sessions/session@none",
                "tags": {"environment": "development"},
                "timestamp": 1615889440,
                "type": "c",
                "value": 1.0,
                "org_id": 2,
                "project_id": 7,
            }),
        ));

        let batch = IndexerBatch::parse(&messages, config(true));
        let org_strings = batch.extract_strings();
        assert_eq!(org_strings.len(), 2);
        assert_eq!(org_strings[&org(2)].len(), 3);

        let (resolved, metadata) = resolve_all(&org_strings, FetchType::CacheHit);
        let output = batch.reconstruct_messages(&resolved, &metadata).unwrap();
        assert_eq!(output.len(), 4);

        let last = output[3].payload();
        assert_eq!(last.org_id, org(2));
        // Ids are assigned per organization, so org 2 counts from 1 again.
        assert_eq!(last.metric_id, 1);
    }
}
