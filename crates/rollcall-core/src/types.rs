use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Fixed-length face descriptor (512-dimensional for ArcFace).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Descriptor {
    pub values: Vec<f32>,
}

impl Descriptor {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance between two descriptors. Lower = more similar.
    ///
    /// Descriptors of different length never match: the distance is infinite.
    pub fn distance(&self, other: &Descriptor) -> f32 {
        if self.values.len() != other.values.len() {
            return f32::INFINITY;
        }
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// Opaque identifier of a known person (the student ID in the directory).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(String);

impl PersonId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PersonId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// A known person with a display name resolved from the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub firstname: String,
    pub lastname: String,
}

impl Person {
    pub fn new(id: impl Into<PersonId>, firstname: &str, lastname: &str) -> Self {
        Self {
            id: id.into(),
            firstname: firstname.to_string(),
            lastname: lastname.to_string(),
        }
    }

    /// "Firstname Lastname", as written to the ledger.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }

    /// On-frame label: "Lastname ID".
    pub fn label(&self) -> String {
        format!("{} {}", self.lastname, self.id)
    }
}

/// Outcome of processing one frame, fed to the session state machine.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecognitionEvent {
    /// The first resolved match in this frame, if any.
    pub identity: Option<Person>,
    /// Detector confidence of the face behind `identity` (0.0 when absent).
    pub confidence: f32,
}

impl RecognitionEvent {
    pub fn absent() -> Self {
        Self::default()
    }

    pub fn of(person: Person, confidence: f32) -> Self {
        Self {
            identity: Some(person),
            confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_identical() {
        let a = Descriptor::new(vec![0.1, 0.2, 0.3]);
        assert!(a.distance(&a).abs() < 1e-6);
    }

    #[test]
    fn test_distance_known_value() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![3.0, 4.0]);
        assert!((a.distance(&b) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_distance_dimension_mismatch() {
        let a = Descriptor::new(vec![0.0, 0.0]);
        let b = Descriptor::new(vec![0.0, 0.0, 0.0]);
        assert_eq!(a.distance(&b), f32::INFINITY);
    }

    #[test]
    fn test_person_names() {
        let p = Person::new("P1", "Alice", "Smith");
        assert_eq!(p.full_name(), "Alice Smith");
        assert_eq!(p.label(), "Smith P1");
    }

    #[test]
    fn test_person_id_serializes_as_plain_string() {
        let id = PersonId::new("852741");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"852741\"");
    }
}
