//! Structured reporting of message drops.
//!
//! Reconstruction communicates per-message outcomes through [`DropDecision`]
//! values; dropped messages are handed to the [`DropReporter`], which turns
//! them into log records and counters. Reporting is fire-and-forget: it never
//! fails and never feeds back into reconstruction control flow.

use indexer_statsd::metric;

use crate::statsd::BatchCounters;

/// The role a string plays on a metric message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StringRole {
    /// The metric name (MRI).
    MetricName,
    /// A tag key.
    TagKey,
    /// A tag value.
    TagValue,
}

impl StringRole {
    /// Returns the `string_type` label used in drop logs and counters.
    ///
    /// Tag keys and tag values share the `"tags"` label: either one failing
    /// to resolve takes the whole tag set, and with it the whole message.
    pub fn string_type(self) -> &'static str {
        match self {
            StringRole::MetricName => "metric_id",
            StringRole::TagKey | StringRole::TagValue => "tags",
        }
    }
}

/// The outcome of reconstructing a single message.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DropDecision {
    /// All strings resolved; the message produces an outgoing message.
    Keep,
    /// A string failed to resolve; the message produces no output.
    Drop {
        /// The role of the string that failed to resolve.
        role: StringRole,
        /// Whether a shared/global quota caused the failure, rather than a
        /// quota scoped to the message's organization.
        is_global_quota: bool,
    },
}

/// Context attached to a drop report.
#[derive(Clone, Copy, Debug)]
pub struct ReportContext {
    /// The number of distinct strings sent for resolution for the dropped
    /// message's organization. Useful for capacity diagnostics.
    pub org_batch_size: usize,
}

/// Turns drop decisions into structured log records and counters.
#[derive(Clone, Copy, Debug, Default)]
pub struct DropReporter;

impl DropReporter {
    /// Reports the outcome of one message.
    ///
    /// Kept messages are not reported. Reporting is best-effort and must not
    /// interrupt reconstruction of the remaining messages.
    pub fn report(&self, decision: DropDecision, context: ReportContext) {
        let DropDecision::Drop {
            role,
            is_global_quota,
        } = decision
        else {
            return;
        };

        indexer_log::error!(
            string_type = role.string_type(),
            is_global_quota,
            org_batch_size = context.org_batch_size,
            "process_messages.dropped_message"
        );

        metric!(
            counter(BatchCounters::DroppedMessage) += 1,
            string_type = role.string_type(),
            is_global_quota = if is_global_quota { "true" } else { "false" },
        );
    }
}
