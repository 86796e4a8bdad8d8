//! Canonical cell outputs and the output normalizer.
//!
//! Whatever the execution bridge returns (an already well-formed record,
//! a native dict/list crossing the pyo3 boundary, a live object proxy, or
//! a bare scalar) is converted here into the closed set of renderable
//! records the rest of the system understands.

use std::fmt;

use pyo3::prelude::*;
use pyo3::types::{
    PyBool, PyDict, PyFloat, PyFrozenSet, PyInt, PyList, PySet, PyString, PyTuple,
};
use serde::{Deserialize, Serialize};

/// Recursion ceiling when extracting native Python structures.
/// Anything deeper degrades to its string form.
const MAX_EXTRACT_DEPTH: usize = 16;

/// The kind of a renderable output record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Raw text, possibly followed by table-structured content.
    Text,
    /// A trusted HTML fragment (e.g. a rendered dataframe).
    Html,
    /// Base64-encoded PNG pixel data.
    Image,
    /// Human-readable error message, possibly multi-line.
    Error,
}

impl OutputKind {
    /// Parse a kind string as it appears in runtime-produced records.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(Self::Text),
            "html" => Some(Self::Html),
            "image" => Some(Self::Image),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Html => "html",
            Self::Image => "image",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for OutputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single renderable output record.
///
/// Invariant: `payload` is always one renderable string, whatever the kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputRecord {
    pub kind: OutputKind,
    pub payload: String,
}

impl OutputRecord {
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Text,
            payload: payload.into(),
        }
    }

    pub fn html(payload: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Html,
            payload: payload.into(),
        }
    }

    pub fn image(payload: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Image,
            payload: payload.into(),
        }
    }

    pub fn error(payload: impl Into<String>) -> Self {
        Self {
            kind: OutputKind::Error,
            payload: payload.into(),
        }
    }

    /// The canonical "ran fine, produced nothing" record.
    pub fn empty() -> Self {
        Self::text("")
    }
}

/// A cell's stored output: exactly one record or an ordered sequence.
///
/// Serializes untagged, so a notebook file holds either a single record
/// object or an array of them, never a wrapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellOutput {
    Single(OutputRecord),
    Many(Vec<OutputRecord>),
}

impl CellOutput {
    /// View the output as an ordered slice of records.
    pub fn records(&self) -> &[OutputRecord] {
        match self {
            Self::Single(record) => std::slice::from_ref(record),
            Self::Many(records) => records,
        }
    }

    /// A single error record with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Single(OutputRecord::error(message))
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::Single(OutputRecord {
                kind: OutputKind::Error,
                ..
            })
        )
    }
}

impl From<OutputRecord> for CellOutput {
    fn from(record: OutputRecord) -> Self {
        Self::Single(record)
    }
}

/// Raw value returned by the execution bridge, before normalization.
///
/// An explicit sum type over everything the runtime boundary can hand
/// back, so the normalizer is a pattern match rather than duck typing.
#[derive(Debug)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Array-shaped value.
    List(Vec<RawValue>),
    /// Key-value associative structure; keys are string-coerced.
    Map(Vec<(String, RawValue)>),
    /// A live object proxy still on the runtime side of the boundary.
    Handle(ObjectHandle),
}

/// A retained reference to a runtime-side Python object.
///
/// Converting it to a plain host value disposes the reference so the
/// runtime-side memory is not kept alive by an abandoned proxy.
pub struct ObjectHandle(Py<PyAny>);

impl ObjectHandle {
    pub fn new(object: Py<PyAny>) -> Self {
        Self(object)
    }

    /// Convert to a plain host value, consuming (and disposing) the handle.
    ///
    /// Iterables become lists, mappings become keyed maps, and anything
    /// else degrades to its `str()` form.
    pub fn into_plain(self) -> RawValue {
        Python::attach(|py| {
            let object = self.0.bind(py);
            extract_value(py, object, 0, true)
        })
        // self.0 dropped here, releasing the runtime-side reference
    }

    /// String form of the underlying object, without consuming the handle.
    pub fn display_string(&self) -> String {
        Python::attach(|py| coerce_to_string(self.0.bind(py)))
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectHandle({})", self.display_string())
    }
}

/// Extract a raw value from a pyo3 boundary object.
///
/// Known shapes (scalars, strings, lists, tuples, sets, dicts) convert
/// directly; unknown objects are retained as a [`RawValue::Handle`] for
/// the normalizer to convert and dispose.
pub fn extract_raw(py: Python<'_>, value: &Bound<'_, PyAny>) -> RawValue {
    extract_value(py, value, 0, false)
}

fn extract_value(
    py: Python<'_>,
    value: &Bound<'_, PyAny>,
    depth: usize,
    force_plain: bool,
) -> RawValue {
    if depth >= MAX_EXTRACT_DEPTH {
        return RawValue::Text(coerce_to_string(value));
    }

    if value.is_none() {
        return RawValue::Null;
    }
    // bool before int: Python bool is an int subclass
    if let Ok(b) = value.downcast::<PyBool>() {
        return RawValue::Bool(b.is_true());
    }
    if value.is_instance_of::<PyInt>() {
        if let Ok(i) = value.extract::<i64>() {
            return RawValue::Int(i);
        }
        // int wider than i64: keep its decimal string form
        return RawValue::Text(coerce_to_string(value));
    }
    if value.is_instance_of::<PyFloat>() {
        if let Ok(f) = value.extract::<f64>() {
            return RawValue::Float(f);
        }
        return RawValue::Text(coerce_to_string(value));
    }
    if let Ok(s) = value.downcast::<PyString>() {
        return RawValue::Text(s.to_string_lossy().into_owned());
    }
    if let Ok(list) = value.downcast::<PyList>() {
        let items = list
            .iter()
            .map(|item| extract_value(py, &item, depth + 1, force_plain))
            .collect();
        return RawValue::List(items);
    }
    if let Ok(tuple) = value.downcast::<PyTuple>() {
        let items = tuple
            .iter()
            .map(|item| extract_value(py, &item, depth + 1, force_plain))
            .collect();
        return RawValue::List(items);
    }
    // set-likes become ordered lists: the transport has no set shape
    if let Ok(set) = value.downcast::<PySet>() {
        let items = set
            .iter()
            .map(|item| extract_value(py, &item, depth + 1, force_plain))
            .collect();
        return RawValue::List(items);
    }
    if let Ok(set) = value.downcast::<PyFrozenSet>() {
        let items = set
            .iter()
            .map(|item| extract_value(py, &item, depth + 1, force_plain))
            .collect();
        return RawValue::List(items);
    }
    if let Ok(dict) = value.downcast::<PyDict>() {
        let mut entries = Vec::with_capacity(dict.len());
        for (key, val) in dict.iter() {
            let key = key
                .str()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "<key>".to_string());
            entries.push((key, extract_value(py, &val, depth + 1, force_plain)));
        }
        return RawValue::Map(entries);
    }

    if force_plain {
        // Last chance before string coercion: drain any iterable.
        if let Ok(iter) = value.try_iter() {
            let mut items = Vec::new();
            for item in iter {
                match item {
                    Ok(item) => items.push(extract_value(py, &item, depth + 1, true)),
                    Err(_) => return RawValue::Text(coerce_to_string(value)),
                }
            }
            return RawValue::List(items);
        }
        RawValue::Text(coerce_to_string(value))
    } else {
        RawValue::Handle(ObjectHandle(value.clone().unbind()))
    }
}

fn coerce_to_string(value: &Bound<'_, PyAny>) -> String {
    value
        .str()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "<unprintable object>".to_string())
}

/// Convert a raw value into a plain serializable structure.
///
/// This is the final step before a payload crosses the worker boundary:
/// the transport only carries plain keyed objects, lists, and scalars.
/// A value that cannot be represented falls back to its string form
/// rather than failing the whole response.
pub fn sanitize(value: &RawValue) -> serde_json::Value {
    match value {
        RawValue::Null => serde_json::Value::Null,
        RawValue::Bool(b) => (*b).into(),
        RawValue::Int(i) => (*i).into(),
        RawValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or_else(|| serde_json::Value::String(f.to_string())),
        RawValue::Text(s) => s.clone().into(),
        RawValue::List(items) => {
            serde_json::Value::Array(items.iter().map(sanitize).collect())
        }
        RawValue::Map(entries) => serde_json::Value::Object(
            entries
                .iter()
                .map(|(key, val)| (key.clone(), sanitize(val)))
                .collect(),
        ),
        // A live proxy reaching sanitization is not plain; coerce it.
        RawValue::Handle(handle) => serde_json::Value::String(handle.display_string()),
    }
}

/// Normalize a raw bridge value into the canonical output shape.
///
/// Ordered checks, first match wins:
/// 1. Array of valid records passes through; any other array becomes a
///    pretty-printed text record.
/// 2. A map exposing `kind` and `payload` directly passes through.
/// 3. A two-entry associative structure converts positionally.
/// 4. A runtime proxy is converted to a host value, disposed, and
///    re-normalized.
/// 5. Any other map is pretty-printed into a text record.
/// 6. Primitives coerce to a text record; null becomes an empty payload.
///
/// Idempotent: an already-canonical record or record array is unchanged.
pub fn normalize(raw: RawValue) -> CellOutput {
    match raw {
        RawValue::List(items) => match records_from_list(&items) {
            Some(records) => CellOutput::Many(records),
            None => CellOutput::Single(OutputRecord::text(pretty_print(&RawValue::List(items)))),
        },
        RawValue::Map(entries) => {
            if let Some(record) = record_from_fields(&entries) {
                return CellOutput::Single(record);
            }
            if let Some(record) = record_from_positional(&entries) {
                return CellOutput::Single(record);
            }
            CellOutput::Single(OutputRecord::text(pretty_print(&RawValue::Map(entries))))
        }
        RawValue::Handle(handle) => normalize(handle.into_plain()),
        RawValue::Null => CellOutput::Single(OutputRecord::empty()),
        RawValue::Bool(b) => CellOutput::Single(OutputRecord::text(b.to_string())),
        RawValue::Int(i) => CellOutput::Single(OutputRecord::text(i.to_string())),
        RawValue::Float(f) => CellOutput::Single(OutputRecord::text(f.to_string())),
        RawValue::Text(s) => CellOutput::Single(OutputRecord::text(s)),
    }
}

/// Every element must itself look like a valid record, else the whole
/// array is treated as opaque.
fn records_from_list(items: &[RawValue]) -> Option<Vec<OutputRecord>> {
    items
        .iter()
        .map(|item| match item {
            RawValue::Map(entries) => record_from_fields(entries),
            _ => None,
        })
        .collect()
}

/// A map with explicit `kind` and `payload` fields.
fn record_from_fields(entries: &[(String, RawValue)]) -> Option<OutputRecord> {
    let kind = entries
        .iter()
        .find(|(key, _)| key == "kind")
        .and_then(|(_, val)| match val {
            RawValue::Text(s) => OutputKind::parse(s),
            _ => None,
        })?;
    let payload = entries
        .iter()
        .find(|(key, _)| key == "payload")
        .map(|(_, val)| payload_string(val))?;
    Some(OutputRecord { kind, payload })
}

/// A two-entry associative structure from a marshalling layer, converted
/// positionally: first value is the kind, second the payload.
fn record_from_positional(entries: &[(String, RawValue)]) -> Option<OutputRecord> {
    if entries.len() != 2 {
        return None;
    }
    let kind = match &entries[0].1 {
        RawValue::Text(s) => OutputKind::parse(s)?,
        _ => return None,
    };
    Some(OutputRecord {
        kind,
        payload: payload_string(&entries[1].1),
    })
}

/// Coerce a payload field to its single renderable string.
fn payload_string(value: &RawValue) -> String {
    match value {
        RawValue::Null => String::new(),
        RawValue::Bool(b) => b.to_string(),
        RawValue::Int(i) => i.to_string(),
        RawValue::Float(f) => f.to_string(),
        RawValue::Text(s) => s.clone(),
        other => pretty_print(other),
    }
}

fn pretty_print(value: &RawValue) -> String {
    serde_json::to_string_pretty(&sanitize(value))
        .unwrap_or_else(|e| format!("<unserializable value: {e}>"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_map(kind: &str, payload: &str) -> RawValue {
        RawValue::Map(vec![
            ("kind".to_string(), RawValue::Text(kind.to_string())),
            ("payload".to_string(), RawValue::Text(payload.to_string())),
        ])
    }

    #[test]
    fn test_canonical_record_passes_through() {
        let out = normalize(record_map("text", "hi"));
        assert_eq!(out, CellOutput::Single(OutputRecord::text("hi")));
    }

    #[test]
    fn test_record_array_passes_through() {
        let out = normalize(RawValue::List(vec![
            record_map("text", "stdout"),
            record_map("image", "aGVsbG8="),
        ]));
        assert_eq!(
            out,
            CellOutput::Many(vec![
                OutputRecord::text("stdout"),
                OutputRecord::image("aGVsbG8="),
            ])
        );
    }

    #[test]
    fn test_mixed_array_becomes_text() {
        let out = normalize(RawValue::List(vec![
            record_map("text", "ok"),
            RawValue::Int(3),
        ]));
        match out {
            CellOutput::Single(record) => {
                assert_eq!(record.kind, OutputKind::Text);
                assert!(record.payload.contains("ok"));
                assert!(record.payload.contains('3'));
            }
            other => panic!("Expected single text record, got {:?}", other),
        }
    }

    #[test]
    fn test_positional_map_conversion() {
        // Marshalling layers can lose key names but keep entry order.
        let out = normalize(RawValue::Map(vec![
            ("0".to_string(), RawValue::Text("error".to_string())),
            ("1".to_string(), RawValue::Text("boom".to_string())),
        ]));
        assert_eq!(out, CellOutput::error("boom"));
    }

    #[test]
    fn test_opaque_map_pretty_printed() {
        let out = normalize(RawValue::Map(vec![
            ("a".to_string(), RawValue::Int(1)),
            ("b".to_string(), RawValue::List(vec![RawValue::Bool(true)])),
        ]));
        match out {
            CellOutput::Single(record) => {
                assert_eq!(record.kind, OutputKind::Text);
                assert!(record.payload.contains("\"a\": 1"));
            }
            other => panic!("Expected single text record, got {:?}", other),
        }
    }

    #[test]
    fn test_primitive_coercion() {
        assert_eq!(
            normalize(RawValue::Int(2)),
            CellOutput::Single(OutputRecord::text("2"))
        );
        assert_eq!(
            normalize(RawValue::Bool(true)),
            CellOutput::Single(OutputRecord::text("true"))
        );
        assert_eq!(
            normalize(RawValue::Null),
            CellOutput::Single(OutputRecord::empty())
        );
    }

    #[test]
    fn test_normalize_is_idempotent() {
        // Feeding the canonical shape back in returns it unchanged.
        let once = normalize(record_map("text", "hi"));
        let again = normalize(record_map("text", "hi"));
        assert_eq!(once, again);

        let many = normalize(RawValue::List(vec![
            record_map("text", "a"),
            record_map("html", "<b>a</b>"),
        ]));
        assert_eq!(
            many,
            CellOutput::Many(vec![OutputRecord::text("a"), OutputRecord::html("<b>a</b>")])
        );
    }

    #[test]
    fn test_unknown_kind_falls_through() {
        let out = normalize(record_map("video", "..."));
        match out {
            CellOutput::Single(record) => assert_eq!(record.kind, OutputKind::Text),
            other => panic!("Expected text fallback, got {:?}", other),
        }
    }

    #[test]
    fn test_sanitize_nan_falls_back_to_string() {
        let value = sanitize(&RawValue::Float(f64::NAN));
        assert!(value.is_string());
    }

    #[test]
    fn test_cell_output_serializes_untagged() {
        let single = CellOutput::Single(OutputRecord::text("hi"));
        let json = serde_json::to_string(&single).unwrap();
        assert_eq!(json, r#"{"kind":"text","payload":"hi"}"#);

        let many = CellOutput::Many(vec![OutputRecord::text("a"), OutputRecord::error("e")]);
        let json = serde_json::to_string(&many).unwrap();
        assert!(json.starts_with('['));

        let back: CellOutput = serde_json::from_str(&json).unwrap();
        assert_eq!(back, many);
    }
}
