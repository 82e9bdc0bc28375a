//! Asset identities and the scraped record shape.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Longest ticker accepted before any browser work is done.
const MAX_CODE_LEN: usize = 16;

/// The kinds of asset the service knows how to scrape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetType {
    /// Brazilian real-estate investment fund.
    Fii,
    Stock,
}

impl AssetType {
    pub const ALL: [AssetType; 2] = [AssetType::Fii, AssetType::Stock];

    /// Prefix used in cache keys and API paths.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fii => "fii",
            Self::Stock => "stock",
        }
    }
}

impl fmt::Display for AssetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fii" | "fiis" => Ok(Self::Fii),
            "stock" | "stocks" => Ok(Self::Stock),
            other => Err(format!("unknown asset type: {other}")),
        }
    }
}

/// A validated, lowercased ticker such as `mxrf11`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetCode(String);

impl AssetCode {
    /// Validate a raw ticker. Only ASCII letters and digits are accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        let code = raw.trim();
        let valid = !code.is_empty()
            && code.len() <= MAX_CODE_LEN
            && code.chars().all(|c| c.is_ascii_alphanumeric());
        valid.then(|| Self(code.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Build the cache key for an asset: `<type>:<lowercased code>`.
pub fn cache_key(asset: AssetType, code: &AssetCode) -> String {
    format!("{}:{}", asset.as_str(), code.as_str())
}

/// Split a cache key back into its asset type and code.
pub fn parse_cache_key(key: &str) -> Option<(AssetType, AssetCode)> {
    let (prefix, code) = key.split_once(':')?;
    let asset = prefix.parse().ok()?;
    Some((asset, AssetCode::parse(code)?))
}

/// A single scraped value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Wrap an optional number. Non-finite numbers become `Null`.
    pub fn number(value: Option<f64>) -> Self {
        match value {
            Some(v) if v.is_finite() => Self::Number(v),
            _ => Self::Null,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// Field name → value for one asset at one point in time.
///
/// Serialized as a flat JSON object, which is also the cached form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetRecord(BTreeMap<String, FieldValue>);

impl AssetRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// A record with every given field set to `Null`.
    pub fn with_fields<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        Self(
            fields
                .into_iter()
                .map(|f| (f.to_string(), FieldValue::Null))
                .collect(),
        )
    }

    pub fn insert(&mut self, field: &str, value: FieldValue) {
        self.0.insert(field.to_string(), value);
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.0.get(field)
    }

    pub fn number(&self, field: &str) -> Option<f64> {
        self.get(field).and_then(FieldValue::as_f64)
    }

    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(FieldValue::as_text)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
