use std::fmt;

use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const SLOT_COUNT: usize = 84;

const NOT_APPLICABLE: [&str; 5] = ["-", "—", "na", "n/a", "nil"];

/// A single raw answer cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Absent,
    Number(f64),
    Text(String),
}

impl From<&Value> for Scalar {
    fn from(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map(Scalar::Number).unwrap_or(Scalar::Absent),
            Value::String(s) => Scalar::Text(s.clone()),
            Value::Bool(b) => Scalar::Text(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => Scalar::Absent,
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Number(value)
    }
}

/// Coerce a raw cell to a number. Absent, blank, "not applicable" and unparseable cells are 0.
pub fn coerce(scalar: &Scalar) -> f64 {
    match scalar {
        Scalar::Absent => 0.0,
        Scalar::Number(n) if n.is_finite() => *n,
        Scalar::Number(_) => 0.0,
        Scalar::Text(text) => coerce_text(text),
    }
}

fn coerce_text(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }

    let lowered = trimmed.to_lowercase();
    if NOT_APPLICABLE.contains(&lowered.as_str()) {
        return 0.0;
    }

    let stripped: String = trimmed.chars().filter(|c| *c != ',').collect();
    if stripped.is_empty() {
        return 0.0;
    }

    match stripped.parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => 0.0,
    }
}

/// Slot number (1-based) encoded by the trailing one or two digits of a key.
pub fn slot_from_key(key: &str) -> Option<usize> {
    let digits: Vec<char> = key
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .take(2)
        .collect();
    if digits.is_empty() {
        return None;
    }

    let slot = digits
        .iter()
        .rev()
        .fold(0usize, |acc, c| acc * 10 + c.to_digit(10).unwrap_or(0) as usize);
    (1..=SLOT_COUNT).contains(&slot).then_some(slot)
}

pub fn slot_key(slot: usize) -> String {
    format!("q{slot}")
}

/// Fully populated answer vector `q1..q84`.
#[derive(Clone, Copy, PartialEq)]
pub struct Vector84([f64; SLOT_COUNT]);

impl Vector84 {
    pub fn zeros() -> Self {
        Vector84([0.0; SLOT_COUNT])
    }

    pub fn filled(value: f64) -> Self {
        Vector84([value; SLOT_COUNT])
    }

    /// Value of a 1-based slot. Out-of-range slots read as 0.
    pub fn get(&self, slot: usize) -> f64 {
        if (1..=SLOT_COUNT).contains(&slot) {
            self.0[slot - 1]
        } else {
            0.0
        }
    }

    pub fn set(&mut self, slot: usize, value: f64) {
        if (1..=SLOT_COUNT).contains(&slot) {
            self.0[slot - 1] = value;
        }
    }

    pub fn values(&self) -> &[f64; SLOT_COUNT] {
        &self.0
    }

    /// Slot-wise sum.
    pub fn add(&mut self, other: &Vector84) {
        for (acc, value) in self.0.iter_mut().zip(other.0.iter()) {
            *acc += value;
        }
    }

    /// `(slot, value)` pairs for slots holding something other than zero.
    pub fn non_zero(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter(|(_, v)| **v != 0.0)
            .map(|(i, v)| (i + 1, *v))
    }
}

impl Default for Vector84 {
    fn default() -> Self {
        Vector84::zeros()
    }
}

impl fmt::Debug for Vector84 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.non_zero().map(|(slot, value)| (slot_key(slot), value)))
            .finish()
    }
}

impl Serialize for Vector84 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(SLOT_COUNT))?;
        for (i, value) in self.0.iter().enumerate() {
            map.serialize_entry(&slot_key(i + 1), value)?;
        }
        map.end()
    }
}

// Stored documents go back through the normalizer so hand-edited or legacy
// records still load as a full vector.
impl<'de> Deserialize<'de> for Vector84 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Ok(AnswerInput::from(&value).normalize().values)
    }
}

/// Raw answer payload as supplied by a caller.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AnswerInput {
    #[default]
    Absent,
    Sequence(Vec<Scalar>),
    /// Keyed cells in insertion order.
    Mapping(Vec<(String, Scalar)>),
}

impl From<&Value> for AnswerInput {
    fn from(value: &Value) -> Self {
        match value {
            Value::Array(items) => AnswerInput::Sequence(items.iter().map(Scalar::from).collect()),
            Value::Object(map) => AnswerInput::Mapping(
                map.iter()
                    .map(|(k, v)| (k.clone(), Scalar::from(v)))
                    .collect(),
            ),
            _ => AnswerInput::Absent,
        }
    }
}

impl From<Option<&Value>> for AnswerInput {
    fn from(value: Option<&Value>) -> Self {
        value.map(AnswerInput::from).unwrap_or_default()
    }
}

impl From<&Vector84> for AnswerInput {
    fn from(vector: &Vector84) -> Self {
        AnswerInput::Mapping(
            vector
                .values()
                .iter()
                .enumerate()
                .map(|(i, v)| (slot_key(i + 1), Scalar::Number(*v)))
                .collect(),
        )
    }
}

impl AnswerInput {
    /// True when the caller sent at least one cell, recognized or not.
    pub fn is_supplied(&self) -> bool {
        match self {
            AnswerInput::Absent => false,
            AnswerInput::Sequence(items) => !items.is_empty(),
            AnswerInput::Mapping(entries) => !entries.is_empty(),
        }
    }

    pub fn normalize(&self) -> Normalized {
        let mut normalized = Normalized {
            values: Vector84::zeros(),
            supplied: [false; SLOT_COUNT],
            has_incoming: self.is_supplied(),
        };

        match self {
            AnswerInput::Absent => {}
            AnswerInput::Sequence(items) => {
                for (i, item) in items.iter().take(SLOT_COUNT).enumerate() {
                    normalized.mark(i + 1, coerce(item));
                }
            }
            AnswerInput::Mapping(entries) => {
                for (key, item) in entries {
                    if let Some(slot) = slot_from_key(key) {
                        normalized.mark(slot, coerce(item));
                    }
                }
            }
        }

        normalized
    }
}

/// Normalizer output: the vector plus which slots the caller actually supplied.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    pub values: Vector84,
    supplied: [bool; SLOT_COUNT],
    pub has_incoming: bool,
}

impl Normalized {
    fn mark(&mut self, slot: usize, value: f64) {
        self.values.set(slot, value);
        self.supplied[slot - 1] = true;
    }

    pub fn is_slot_supplied(&self, slot: usize) -> bool {
        (1..=SLOT_COUNT).contains(&slot) && self.supplied[slot - 1]
    }

    pub fn any_supplied(&self) -> bool {
        self.supplied.iter().any(|s| *s)
    }

    pub fn supplied_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.supplied
            .iter()
            .enumerate()
            .filter(|(_, s)| **s)
            .map(|(i, _)| i + 1)
    }
}

pub fn normalize(input: &AnswerInput) -> Normalized {
    input.normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_handles_sentinels_and_separators() {
        assert_eq!(coerce(&Scalar::Absent), 0.0);
        assert_eq!(coerce(&"".into()), 0.0);
        assert_eq!(coerce(&"  ".into()), 0.0);
        assert_eq!(coerce(&"-".into()), 0.0);
        assert_eq!(coerce(&"—".into()), 0.0);
        assert_eq!(coerce(&"NA".into()), 0.0);
        assert_eq!(coerce(&"n/a".into()), 0.0);
        assert_eq!(coerce(&"Nil".into()), 0.0);
        assert_eq!(coerce(&"1,234".into()), 1234.0);
        assert_eq!(coerce(&" 12.5 ".into()), 12.5);
        assert_eq!(coerce(&"-3".into()), -3.0);
        assert_eq!(coerce(&"abc".into()), 0.0);
        assert_eq!(coerce(&"inf".into()), 0.0);
        assert_eq!(coerce(&Scalar::Number(7.0)), 7.0);
        assert_eq!(coerce(&Scalar::Number(f64::NAN)), 0.0);
    }

    #[test]
    fn slot_from_key_reads_trailing_digits() {
        assert_eq!(slot_from_key("q1"), Some(1));
        assert_eq!(slot_from_key("answer04"), Some(4));
        assert_eq!(slot_from_key("q_3"), Some(3));
        assert_eq!(slot_from_key("84"), Some(84));
        assert_eq!(slot_from_key("q123"), Some(23));
        assert_eq!(slot_from_key("q85"), None);
        assert_eq!(slot_from_key("q0"), None);
        assert_eq!(slot_from_key("q1a"), None);
        assert_eq!(slot_from_key("notes"), None);
    }

    #[test]
    fn sequence_fills_leading_slots() {
        let input = AnswerInput::from(&json!([1, "2", "NA", "1,000"]));
        let normalized = input.normalize();

        assert_eq!(normalized.values.get(1), 1.0);
        assert_eq!(normalized.values.get(2), 2.0);
        assert_eq!(normalized.values.get(3), 0.0);
        assert_eq!(normalized.values.get(4), 1000.0);
        assert_eq!(normalized.values.get(5), 0.0);
        assert!(normalized.is_slot_supplied(3));
        assert!(!normalized.is_slot_supplied(5));
    }

    #[test]
    fn sequence_longer_than_slot_count_is_truncated() {
        let items: Vec<Value> = (1..=100).map(|i| json!(i)).collect();
        let normalized = AnswerInput::from(&Value::Array(items)).normalize();

        assert_eq!(normalized.values.get(84), 84.0);
        assert_eq!(normalized.supplied_slots().count(), SLOT_COUNT);
    }

    #[test]
    fn mapping_uses_key_suffix_and_last_write_wins() {
        let input = AnswerInput::from(&json!({
            "q1": "5",
            "answer02": 7,
            "notes": "ignored",
            "q99": 3,
            "x1": 9
        }));
        let normalized = input.normalize();

        assert_eq!(normalized.values.get(1), 9.0);
        assert_eq!(normalized.values.get(2), 7.0);
        assert_eq!(normalized.supplied_slots().collect::<Vec<_>>(), vec![1, 2]);
        assert!(normalized.has_incoming);
    }

    #[test]
    fn other_shapes_normalize_to_zero() {
        for value in [json!(null), json!(42), json!("q1"), json!(true)] {
            let normalized = AnswerInput::from(&value).normalize();
            assert_eq!(normalized.values, Vector84::zeros());
            assert!(!normalized.has_incoming);
        }
    }

    #[test]
    fn unrecognized_keys_still_count_as_incoming() {
        let normalized = AnswerInput::from(&json!({ "notes": "x" })).normalize();
        assert!(normalized.has_incoming);
        assert!(!normalized.any_supplied());
    }

    #[test]
    fn normalize_is_idempotent() {
        let first = AnswerInput::from(&json!({ "q3": "1,500", "q10": "-", "answer84": 2.5 }))
            .normalize()
            .values;
        let second = normalize(&AnswerInput::from(&first)).values;
        assert_eq!(first, second);
    }

    #[test]
    fn vector_serializes_every_slot_in_order() {
        let mut vector = Vector84::zeros();
        vector.set(2, 4.0);
        let value = serde_json::to_value(vector).unwrap();
        let map = value.as_object().unwrap();

        assert_eq!(map.len(), SLOT_COUNT);
        assert_eq!(map.keys().next().map(String::as_str), Some("q1"));
        assert_eq!(map.keys().last().map(String::as_str), Some("q84"));
        assert_eq!(map["q2"], json!(4.0));
    }

    #[test]
    fn vector_deserializes_leniently() {
        let vector: Vector84 = serde_json::from_value(json!({ "q1": "12", "q2": null })).unwrap();
        assert_eq!(vector.get(1), 12.0);
        assert_eq!(vector.get(2), 0.0);

        let vector: Vector84 = serde_json::from_value(json!([1, 2])).unwrap();
        assert_eq!(vector.get(2), 2.0);
    }
}
