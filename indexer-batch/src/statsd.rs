use indexer_statsd::{CounterMetric, HistogramMetric, TimerMetric};

/// Counter metrics for the batch indexer.
pub enum BatchCounters {
    /// Incremented for every message whose payload fails validation.
    ///
    /// Tagged by the validation failure reason. Invalid messages are excluded
    /// from the batch before string extraction and produce no output.
    InvalidMessage,

    /// Incremented for every message dropped because one of its strings could
    /// not be resolved to an id.
    ///
    /// Tagged by the string type that failed (`metric_id` or `tags`) and by
    /// whether a global quota caused the failure.
    DroppedMessage,

    /// Incremented for every message removed through the cardinality filter
    /// hook.
    FilteredMessage,
}

impl CounterMetric for BatchCounters {
    fn name(&self) -> &'static str {
        match *self {
            Self::InvalidMessage => "process_messages.invalid_message",
            Self::DroppedMessage => "process_messages.dropped_message",
            Self::FilteredMessage => "process_messages.filtered_message",
        }
    }
}

/// Timer metrics for the batch indexer.
pub enum BatchTimers {
    /// Time in milliseconds spent rebuilding the outgoing messages of one
    /// batch from the resolved string ids.
    ReconstructMessages,
}

impl TimerMetric for BatchTimers {
    fn name(&self) -> &'static str {
        match *self {
            Self::ReconstructMessages => "process_messages.reconstruct_messages",
        }
    }
}

/// Histogram metrics for the batch indexer.
pub enum BatchHistograms {
    /// The number of messages in a batch that passed payload validation.
    ParsedBatchSize,

    /// The total number of distinct strings sent for resolution for a batch,
    /// summed over all organizations.
    ///
    /// This is the cardinality pressure a batch puts on the resolver and its
    /// quotas.
    ExtractedStrings,
}

impl HistogramMetric for BatchHistograms {
    fn name(&self) -> &'static str {
        match *self {
            Self::ParsedBatchSize => "process_messages.parsed_batch_size",
            Self::ExtractedStrings => "process_messages.extracted_strings",
        }
    }
}
