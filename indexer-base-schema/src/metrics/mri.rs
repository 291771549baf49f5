use std::borrow::Cow;
use std::error::Error;
use std::fmt;

use indexer_common::impl_str_serde;
use serde::{Deserialize, Serialize};

/// The type of a [`MetricResourceIdentifier`], determining its aggregation and evaluation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum MetricType {
    /// Counts instances of an event.
    ///
    /// Counters can be incremented and decremented. The default operation is to increment a counter
    /// by `1`, although increments by larger values are equally possible.
    ///
    /// Counters are declared as `"c"`. Alternatively, `"m"` is allowed.
    Counter,
    /// Builds a statistical distribution over values reported.
    ///
    /// Based on individual reported values, distributions allow to query the maximum, minimum, or
    /// average of the reported values, as well as statistical quantiles.
    ///
    /// Distributions are declared as `"d"`. Alternatively, `"h"` and `"ms"` are allowed.
    Distribution,
    /// Counts the number of unique reported values.
    ///
    /// Sets allow sending arbitrary discrete values and store the deduplicated count. It is not
    /// possible to query individual values from a set.
    ///
    /// Sets are declared as `"s"`.
    Set,
}

impl MetricType {
    /// Return the shortcode for this metric type.
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricType::Counter => "c",
            MetricType::Distribution => "d",
            MetricType::Set => "s",
        }
    }
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MetricType {
    type Err = ParseMetricError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "c" | "m" => Self::Counter,
            "h" | "d" | "ms" => Self::Distribution,
            "s" => Self::Set,
            _ => return Err(ParseMetricError),
        })
    }
}

impl_str_serde!(MetricType, "a metric type string");

/// An error returned when metrics or MRIs cannot be parsed.
#[derive(Clone, Copy, Debug)]
pub struct ParseMetricError;

impl fmt::Display for ParseMetricError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse metric")
    }
}

impl Error for ParseMetricError {}

/// The logical namespace ("use case") of a metric.
///
/// Use cases partition metrics by the product entity they were extracted from
/// and route them to separate indexing quotas and storage. They cannot be
/// defined freely; instead they are defined by Sentry.
///
/// # Parsing
///
/// Parsing a use case from strings is infallible. Unknown strings are mapped to
/// [`UseCaseId::Unsupported`]. Metrics with such a namespace will be dropped
/// before indexing.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub enum UseCaseId {
    /// Metrics extracted from sessions ("release health").
    Sessions,
    /// Metrics extracted from transaction events.
    Transactions,
    /// Metrics extracted from spans.
    Spans,
    /// User-defined metrics directly sent by SDKs and applications.
    Custom,
    /// An unknown and unsupported use case.
    ///
    /// Metrics with a namespace the indexer doesn't know or recognize are
    /// deserialized into this variant and dropped before indexing. For
    /// instance, an MRI of `c:something_new/foo@none` has the namespace
    /// `something_new`, which is not a registered use case.
    Unsupported,
}

impl UseCaseId {
    /// Returns the string representation for this use case.
    pub fn as_str(&self) -> &'static str {
        match self {
            UseCaseId::Sessions => "sessions",
            UseCaseId::Transactions => "transactions",
            UseCaseId::Spans => "spans",
            UseCaseId::Custom => "custom",
            UseCaseId::Unsupported => "unsupported",
        }
    }
}

impl std::str::FromStr for UseCaseId {
    type Err = ParseMetricError;

    fn from_str(ns: &str) -> Result<Self, Self::Err> {
        match ns {
            "sessions" => Ok(UseCaseId::Sessions),
            "transactions" => Ok(UseCaseId::Transactions),
            "spans" => Ok(UseCaseId::Spans),
            "custom" => Ok(UseCaseId::Custom),
            _ => Ok(UseCaseId::Unsupported),
        }
    }
}

impl_str_serde!(UseCaseId, "a valid use case id");

impl fmt::Display for UseCaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A unique identifier for metrics including typing and namespacing.
///
/// MRIs have the format `<type>:<namespace>/<name>[@<unit>]`. The unit is
/// optional and defaults to `"none"`.
///
/// MRIs are stable identifiers: metrics are bucketed and indexed based on this
/// string, so it cannot change over time without breaking indexing. For that
/// reason the parser validates but never rewrites any component.
///
/// # Example
///
/// ```
/// use indexer_base_schema::metrics::MetricResourceIdentifier;
///
/// let string = "c:sessions/session@none";
/// let mri = MetricResourceIdentifier::parse(string).expect("should parse");
/// assert_eq!(mri.to_string(), string);
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MetricResourceIdentifier<'a> {
    /// The type of a metric, determining its aggregation and evaluation.
    ///
    /// In MRIs, the type is specified with its short name: counter (`c`), set
    /// (`s`), and distribution (`d`). See [`MetricType`] for more information.
    pub ty: MetricType,

    /// The use case for this metric.
    ///
    /// In the statsd submission protocol the namespace is optional and
    /// defaults to `"custom"`. Otherwise, the namespace must be declared
    /// explicitly.
    pub namespace: UseCaseId,

    /// The display name of the metric in the allowed character set.
    pub name: Cow<'a, str>,

    /// The verbatim unit name of the metric value.
    ///
    /// The unit is optional and defaults to `"none"`.
    pub unit: Cow<'a, str>,
}

impl<'a> MetricResourceIdentifier<'a> {
    /// Parses and validates an MRI.
    pub fn parse(name: &'a str) -> Result<Self, ParseMetricError> {
        let (raw_ty, rest) = name.split_once(':').ok_or(ParseMetricError)?;
        let ty = raw_ty.parse()?;

        Self::parse_with_type(rest, ty)
    }

    /// Parses an MRI from a string and a separate type.
    ///
    /// The given string must be a part of the MRI, including the following components:
    ///  - (optional) The namespace. If missing, it is defaulted to `"custom"`
    ///  - (required) The metric name.
    ///  - (optional) The unit. If missing, it is defaulted to `"none"`.
    ///
    /// The metric type is never part of this string and must be supplied separately.
    pub fn parse_with_type(string: &'a str, ty: MetricType) -> Result<Self, ParseMetricError> {
        let (name_and_namespace, unit) = parse_name_unit(string).ok_or(ParseMetricError)?;

        let (namespace, name) = match name_and_namespace.split_once('/') {
            Some((raw_namespace, name)) => (raw_namespace.parse()?, name),
            None => (UseCaseId::Custom, name_and_namespace),
        };

        if !crate::metrics::is_valid_metric_name(name) {
            return Err(ParseMetricError);
        }

        Ok(MetricResourceIdentifier {
            ty,
            namespace,
            name: Cow::Borrowed(name),
            unit,
        })
    }

    /// Converts the MRI into an owned version with a static lifetime.
    pub fn into_owned(self) -> MetricResourceIdentifier<'static> {
        MetricResourceIdentifier {
            ty: self.ty,
            namespace: self.namespace,
            name: Cow::Owned(self.name.into_owned()),
            unit: Cow::Owned(self.unit.into_owned()),
        }
    }
}

impl<'de> Deserialize<'de> for MetricResourceIdentifier<'static> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Deserialize without allocation, if possible.
        let string = <Cow<'de, str>>::deserialize(deserializer)?;
        let result = MetricResourceIdentifier::parse(&string)
            .map_err(serde::de::Error::custom)?
            .into_owned();

        Ok(result)
    }
}

impl Serialize for MetricResourceIdentifier<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl fmt::Display for MetricResourceIdentifier<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `<ty>:<ns>/<name>@<unit>`
        write!(
            f,
            "{}:{}/{}@{}",
            self.ty, self.namespace, self.name, self.unit
        )
    }
}

/// Parses the `name[@unit]` part of a metric string.
///
/// Returns a `"none"` unit if no unit is specified. Returns `None` if the
/// value has more than one `@` separator.
fn parse_name_unit(string: &str) -> Option<(&str, Cow<'_, str>)> {
    let mut components = string.split('@');
    let name = components.next()?;

    let unit = match components.next() {
        Some(s) => Cow::Borrowed(s),
        None => Cow::Borrowed("none"),
    };

    if components.next().is_some() {
        return None;
    }

    Some((name, unit))
}
