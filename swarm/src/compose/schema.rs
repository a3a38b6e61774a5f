//! Intermediate descriptor schema
//!
//! Every field a descriptor may spell in more than one way is a sum type
//! over the shapes it can take. Deserializing into these types never fails
//! on a shape mismatch; the catch-all variants hold whatever was found so
//! the normalizer can decide what to keep and what to warn about.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

/// A field of the expected shape, or anything else
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Lenient<T> {
    Expected(T),
    Other(Value),
}

impl<T> Lenient<T> {
    pub fn expected(self) -> Option<T> {
        match self {
            Lenient::Expected(value) => Some(value),
            Lenient::Other(_) => None,
        }
    }
}

/// Top-level document, once it is known to carry a `services` key
#[derive(Debug, Deserialize)]
pub struct RawDocument {
    pub services: Lenient<IndexMap<String, Lenient<RawService>>>,

    #[serde(default)]
    pub volumes: Option<Lenient<IndexMap<String, RawVolume>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawService {
    pub image: Option<Lenient<String>>,
    pub ports: Option<Lenient<Vec<Value>>>,
    pub environment: Option<RawEnvironment>,
    pub deploy: Option<Lenient<RawDeploy>>,
    pub tags: Option<Lenient<Vec<Value>>>,
    pub vlan: Option<RawNumber>,
    pub volumes: Option<Lenient<Vec<RawMount>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawDeploy {
    pub replicas: Option<RawNumber>,
    pub placement: Option<Lenient<RawPlacement>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RawPlacement {
    pub constraints: Option<Lenient<Vec<Value>>>,
}

/// `environment:` as a `KEY=VALUE` list or a mapping
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawEnvironment {
    List(Vec<Value>),
    Map(Mapping),
    Other(Value),
}

/// A numeric field that may also be written as text
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawNumber {
    Integer(i64),
    Float(f64),
    Text(String),
    Other(Value),
}

impl RawNumber {
    /// Leading-integer reading: numbers truncate toward zero, text
    /// contributes its optional sign and leading digits
    pub fn leading_int(&self) -> Option<i64> {
        match self {
            RawNumber::Integer(n) => Some(*n),
            RawNumber::Float(f) if f.is_finite() => Some(f.trunc() as i64),
            RawNumber::Float(_) => None,
            RawNumber::Text(text) => leading_int(text),
            RawNumber::Other(_) => None,
        }
    }
}

impl std::fmt::Display for RawNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RawNumber::Integer(n) => write!(f, "{}", n),
            RawNumber::Float(x) => write!(f, "{}", x),
            RawNumber::Text(text) => write!(f, "{}", text),
            RawNumber::Other(value) => write!(f, "{}", stringify(value)),
        }
    }
}

fn leading_int(text: &str) -> Option<i64> {
    let text = text.trim_start();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    let magnitude = digits.parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

/// One entry of a service's `volumes:` list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawMount {
    /// `volume:target[:mode]`
    Short(String),
    Long(RawLongMount),
    Other(Value),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawLongMount {
    pub source: Option<Lenient<String>>,
    pub volume: Option<Lenient<String>>,
    pub target: Option<Lenient<String>>,
    pub destination: Option<Lenient<String>>,
    pub mode: Option<Lenient<String>>,
}

/// One entry of the top-level `volumes:` table
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawVolume {
    /// The subvolume identifier
    Bare(String),
    Detailed(RawVolumeDefinition),
    Other(Value),
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawVolumeDefinition {
    pub subvolume: Option<Lenient<String>>,
    pub options: Option<Lenient<Mapping>>,
    pub external: Option<Lenient<bool>>,
}

/// Render a scalar the way it reads in the descriptor
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Tagged(tagged) => stringify(&tagged.value),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
