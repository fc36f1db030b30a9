use crate::corpus::meta::DocMeta;
use crate::index::types::ChunkId;
use crate::utils::normalize_file_path;
use serde::de::{DeserializeOwned, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A metadata field that producers emit either as a single value or a list.
///
/// Resolved once at deserialization; anything that is neither a string nor a
/// list of scalars becomes `Missing`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum FieldValue {
    #[default]
    Missing,
    Scalar(String),
    List(Vec<String>),
}

impl FieldValue {
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) if !s.is_empty() => FieldValue::Scalar(s.clone()),
            Value::Array(items) => {
                let list: Vec<String> = items.iter().filter_map(scalar_to_string).collect();
                FieldValue::List(list)
            }
            _ => FieldValue::Missing,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, FieldValue::Missing)
    }

    /// True when there is no usable entry at all
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Missing => true,
            FieldValue::Scalar(_) => false,
            FieldValue::List(items) => items.is_empty(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let slice: &[String] = match self {
            FieldValue::Missing => &[],
            FieldValue::Scalar(s) => std::slice::from_ref(s),
            FieldValue::List(items) => items,
        };
        slice.iter().map(String::as_str)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.iter().map(str::to_string).collect()
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Scalar(value.to_string())
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(values: Vec<&str>) -> Self {
        FieldValue::List(values.into_iter().map(str::to_string).collect())
    }
}

impl<'de> Deserialize<'de> for FieldValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(FieldValue::from_json(&value))
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Missing => serializer.serialize_none(),
            FieldValue::Scalar(s) => serializer.serialize_str(s),
            FieldValue::List(items) => items.serialize(serializer),
        }
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Deserialize `T`, or `None` when the JSON has the wrong shape
pub(crate) fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Value::deserialize(deserializer)?;
    if value.is_null() {
        return Ok(None);
    }
    Ok(serde_json::from_value(value).ok())
}

/// Deserialize a list of strings, skipping non-string entries
pub(crate) fn string_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Array(items) => Some(items.iter().filter_map(scalar_to_string).collect()),
        _ => None,
    })
}

/// JavaScript-style truthiness, for flags producers emit in several shapes
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|v| v != 0.0 && !v.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Segment information for chunks carved out of embedded-language files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Segment {
    #[serde(rename = "languageId", default, deserialize_with = "lenient")]
    pub language_id: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub ext: Option<String>,
}

/// Call/usage relations recorded for a chunk or a whole file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeRelations {
    /// `[caller, callee]` pairs
    #[serde(default, deserialize_with = "lenient")]
    pub calls: Option<Vec<(String, String)>>,
    #[serde(default, deserialize_with = "string_list")]
    pub imports: Option<Vec<String>>,
    #[serde(default, deserialize_with = "string_list")]
    pub usages: Option<Vec<String>>,
}

/// One indexed unit of code, as produced by the extraction pipeline
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub id: ChunkId,
    #[serde(default, deserialize_with = "lenient")]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub ext: Option<String>,
    #[serde(default)]
    pub kind: FieldValue,
    #[serde(default)]
    pub last_author: FieldValue,
    #[serde(default)]
    pub chunk_authors: FieldValue,
    #[serde(rename = "chunkAuthors", default)]
    pub chunk_authors_alt: FieldValue,
    #[serde(default, deserialize_with = "lenient")]
    pub lang: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub segment: Option<Segment>,
    #[serde(default, deserialize_with = "lenient")]
    pub docmeta: Option<DocMeta>,
    #[serde(rename = "metaV2", default, deserialize_with = "lenient")]
    pub meta_v2: Option<DocMeta>,
    #[serde(rename = "codeRelations", default, deserialize_with = "lenient")]
    pub code_relations: Option<CodeRelations>,
    #[serde(default, deserialize_with = "string_list")]
    pub tokens: Option<Vec<String>>,
    #[serde(default, deserialize_with = "string_list")]
    pub ngrams: Option<Vec<String>>,
    #[serde(default, deserialize_with = "lenient")]
    pub lint: Option<Vec<Value>>,
    #[serde(default, deserialize_with = "lenient")]
    pub churn: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub last_modified: Option<String>,
}

impl ChunkRecord {
    pub fn new(id: ChunkId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    /// Chunk authors under either producer spelling
    pub fn chunk_authors(&self) -> &FieldValue {
        if !self.chunk_authors.is_missing() {
            &self.chunk_authors
        } else {
            &self.chunk_authors_alt
        }
    }

    /// File path with forward slashes, empty when absent
    pub fn normalized_file(&self) -> String {
        self.file.as_deref().map(normalize_file_path).unwrap_or_default()
    }

    /// Lower-cased extension with leading dot, from `ext` or the file name
    pub fn effective_ext(&self) -> Option<String> {
        if let Some(ext) = self.ext.as_deref().filter(|e| !e.is_empty()) {
            return Some(ext.to_lowercase());
        }
        let file = self.normalized_file();
        let name = file.rsplit('/').next().unwrap_or("");
        match name.rfind('.') {
            // ".gitignore" has no extension
            Some(pos) if pos > 0 => Some(name[pos..].to_lowercase()),
            _ => None,
        }
    }

    /// Language from the first populated source: primary metadata, effective
    /// language, segment, then the legacy `lang` field.
    /// Empty strings count as absent at every step.
    pub fn effective_language(&self) -> Option<&str> {
        let v2 = self.meta_v2.as_ref();
        let populated = |l: &&str| !l.trim().is_empty();
        v2.and_then(|m| m.lang.as_deref())
            .filter(populated)
            .or_else(|| {
                v2.and_then(|m| m.effective.as_ref())
                    .and_then(|e| e.language_id.as_deref())
                    .filter(populated)
            })
            .or_else(|| {
                self.segment
                    .as_ref()
                    .and_then(|s| s.language_id.as_deref())
                    .filter(populated)
            })
            .or_else(|| self.lang.as_deref().filter(populated))
    }
}
