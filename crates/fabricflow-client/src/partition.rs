//! Service partition schemes

use crate::error::{FabricError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Partition scheme as configured, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSpec {
    pub scheme: String,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub names: Option<Vec<String>>,
    #[serde(default)]
    pub low_key: Option<i64>,
    #[serde(default)]
    pub high_key: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "PartitionScheme")]
pub enum PartitionDescription {
    Singleton,
    Named {
        #[serde(rename = "Count")]
        count: i64,
        #[serde(rename = "Names")]
        names: Vec<String>,
    },
    UniformInt64Range {
        #[serde(rename = "Count", default, skip_serializing_if = "Option::is_none")]
        count: Option<i64>,
        #[serde(rename = "LowKey", with = "int64_string")]
        low_key: i64,
        #[serde(rename = "HighKey", with = "int64_string")]
        high_key: i64,
    },
}

/// Canonical scheme name, accepting any case and `uniform_int64_range`.
pub fn canonical_partition_scheme(input: &str) -> Option<&'static str> {
    match input.trim().to_ascii_lowercase().as_str() {
        "singleton" => Some("Singleton"),
        "uniformint64range" | "uniform_int64_range" => Some("UniformInt64Range"),
        "named" => Some("Named"),
        _ => None,
    }
}

impl PartitionDescription {
    pub fn from_spec(spec: &PartitionSpec) -> Result<Self> {
        let invalid = |msg: &str| FabricError::Validation(format!("invalid partition: {}", msg));

        match canonical_partition_scheme(&spec.scheme) {
            Some("Singleton") => {
                if spec.count.is_some() {
                    return Err(invalid("Singleton partitions cannot specify count"));
                }
                if spec.names.as_ref().is_some_and(|n| !n.is_empty()) {
                    return Err(invalid("Singleton partitions cannot specify names"));
                }
                if spec.low_key.is_some() || spec.high_key.is_some() {
                    return Err(invalid("Singleton partitions cannot specify keys"));
                }
                Ok(PartitionDescription::Singleton)
            }
            Some("Named") => {
                let names: Vec<String> = spec
                    .names
                    .iter()
                    .flatten()
                    .map(|n| n.trim().to_string())
                    .collect();
                if names.is_empty() {
                    return Err(invalid("Named partitions require at least one name"));
                }
                if names.iter().any(String::is_empty) {
                    return Err(invalid("Named partition names cannot be blank"));
                }
                let count = spec.count.unwrap_or(names.len() as i64);
                Ok(PartitionDescription::Named { count, names })
            }
            Some("UniformInt64Range") => {
                let (Some(low_key), Some(high_key)) = (spec.low_key, spec.high_key) else {
                    return Err(invalid(
                        "UniformInt64Range partitions require low_key and high_key",
                    ));
                };
                if high_key < low_key {
                    return Err(invalid("high_key must be greater than or equal to low_key"));
                }
                Ok(PartitionDescription::UniformInt64Range {
                    count: spec.count,
                    low_key,
                    high_key,
                })
            }
            _ => Err(FabricError::Validation(format!(
                "unsupported partition scheme {:?}",
                spec.scheme
            ))),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            PartitionDescription::Singleton => "Singleton",
            PartitionDescription::Named { .. } => "Named",
            PartitionDescription::UniformInt64Range { .. } => "UniformInt64Range",
        }
    }
}

/// The REST API carries range keys as decimal strings.
mod int64_string {
    use super::*;

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Key {
            Text(String),
            Number(i64),
        }
        match Key::deserialize(deserializer)? {
            Key::Number(n) => Ok(n),
            Key::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
        }
    }
}
