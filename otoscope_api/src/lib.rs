//! Wire types shared by the prediction service and the upload client.

use serde::{
    de::{MapAccess, Visitor},
    ser::SerializeMap,
    Deserialize, Deserializer, Serialize, Serializer,
};
use std::fmt;

pub const PREDICT_ROUTE: &str = "/predict";
pub const HEALTH_ROUTE: &str = "/health";
/// Multipart field carrying the image bytes.
pub const FILE_FIELD: &str = "file";
pub const NO_FILE_MESSAGE: &str = "No file provided";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub predicted_class: String,
    pub confidence_score: f32,
    pub class_probabilities: ClassProbabilities,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

/// Label to probability mapping that keeps the order of the class label set,
/// both in memory and on the wire.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassProbabilities(Vec<(String, f32)>);

impl ClassProbabilities {
    pub fn get(&self, label: &str) -> Option<f32> {
        self.0
            .iter()
            .find(|(name, _)| name == label)
            .map(|(_, probability)| *probability)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0
            .iter()
            .map(|(name, probability)| (name.as_str(), *probability))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f32 {
        self.0.iter().map(|(_, probability)| probability).sum()
    }
}

impl<S: Into<String>> FromIterator<(S, f32)> for ClassProbabilities {
    fn from_iter<I: IntoIterator<Item = (S, f32)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, probability)| (name.into(), probability))
                .collect(),
        )
    }
}

impl Serialize for ClassProbabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, probability) in &self.0 {
            map.serialize_entry(name, probability)?;
        }
        map.end()
    }
}

struct ClassProbabilitiesVisitor;

impl<'de> Visitor<'de> for ClassProbabilitiesVisitor {
    type Value = ClassProbabilities;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of class labels to probabilities")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, probability)) = access.next_entry::<String, f32>()? {
            entries.push((name, probability));
        }
        Ok(ClassProbabilities(entries))
    }
}

impl<'de> Deserialize<'de> for ClassProbabilities {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ClassProbabilitiesVisitor)
    }
}
