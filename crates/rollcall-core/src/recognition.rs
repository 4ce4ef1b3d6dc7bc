//! Per-frame recognition: locate faces, encode them, match against known
//! faces, resolve identities, and reduce the frame to one [`RecognitionEvent`].

use crate::matcher::Matcher;
use crate::store::KnownFaces;
use crate::types::{BoundingBox, Descriptor, Person, PersonId, RecognitionEvent};
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector error: {0}")]
    Detector(#[from] crate::detector::DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] crate::recognizer::RecognizerError),
}

/// Face detection and descriptor extraction over packed RGB frames.
pub trait FacePipeline {
    /// Bounding boxes of all faces in the frame, in the order they should be considered.
    fn locate(&mut self, rgb: &[u8], width: u32, height: u32)
        -> Result<Vec<BoundingBox>, PipelineError>;

    /// One descriptor per box, index-aligned with `boxes`.
    fn encode(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
        boxes: &[BoundingBox],
    ) -> Result<Vec<Descriptor>, PipelineError>;
}

/// Resolves a person ID to a display name.
pub trait Directory {
    /// `None` when the ID is unknown or the lookup failed.
    fn lookup(&mut self, id: &PersonId) -> Option<Person>;
}

/// Caches successful lookups for the rest of the session.
///
/// Misses are not cached, so a transient lookup failure is retried on a later frame.
pub struct CachedDirectory<D> {
    inner: D,
    resolved: HashMap<PersonId, Person>,
}

impl<D: Directory> CachedDirectory<D> {
    pub fn new(inner: D) -> Self {
        Self {
            inner,
            resolved: HashMap::new(),
        }
    }
}

impl<D: Directory> Directory for CachedDirectory<D> {
    fn lookup(&mut self, id: &PersonId) -> Option<Person> {
        if let Some(person) = self.resolved.get(id) {
            return Some(person.clone());
        }
        let person = self.inner.lookup(id)?;
        self.resolved.insert(id.clone(), person.clone());
        Some(person)
    }
}

impl<D: Directory + ?Sized> Directory for Box<D> {
    fn lookup(&mut self, id: &PersonId) -> Option<Person> {
        (**self).lookup(id)
    }
}

/// How a single detected face is drawn.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FaceLabel {
    /// No known face within tolerance, or the matched identity could not be resolved.
    Unknown,
    /// Matched and resolved; `text` is the on-frame label.
    Recognized { id: PersonId, text: String },
}

/// One face box to draw on the frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Overlay {
    pub bbox: BoundingBox,
    pub label: FaceLabel,
}

/// Everything recognized in one frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameRecognition {
    /// One overlay per detected face, in detection order.
    pub overlays: Vec<Overlay>,
    /// Drives the session: the first resolved match, or absent.
    pub event: RecognitionEvent,
}

/// Recognize all faces in one RGB frame.
///
/// The first face (in pipeline order) that both matches a known face and
/// resolves in the directory becomes the frame's event; other faces only
/// produce overlays.
pub fn recognize_frame(
    pipeline: &mut dyn FacePipeline,
    matcher: &dyn Matcher,
    known: &KnownFaces,
    directory: &mut dyn Directory,
    rgb: &[u8],
    width: u32,
    height: u32,
) -> Result<FrameRecognition, PipelineError> {
    let boxes = pipeline.locate(rgb, width, height)?;
    if boxes.is_empty() {
        return Ok(FrameRecognition::default());
    }
    let descriptors = pipeline.encode(rgb, width, height, &boxes)?;

    let mut result = FrameRecognition::default();
    for (bbox, descriptor) in boxes.into_iter().zip(descriptors.iter()) {
        let outcome = matcher.compare(descriptor, known);
        let person = outcome.person_id.as_ref().and_then(|id| {
            let resolved = directory.lookup(id);
            if resolved.is_none() {
                tracing::debug!(person = %id, "matched face did not resolve; drawing as unknown");
            }
            resolved
        });

        let label = match &person {
            Some(p) => FaceLabel::Recognized {
                id: p.id.clone(),
                text: p.label(),
            },
            None => FaceLabel::Unknown,
        };

        if let Some(p) = person {
            if result.event.identity.is_none() {
                result.event = RecognitionEvent::of(p, bbox.confidence);
            }
        }
        result.overlays.push(Overlay { bbox, label });
    }

    Ok(result)
}


#[cfg(test)]
mod tests {
    use super::fakes::*;
    use super::*;
    use crate::matcher::DistanceMatcher;

    fn known() -> KnownFaces {
        KnownFaces::new(
            vec![
                Descriptor::new(vec![1.0, 0.0]),
                Descriptor::new(vec![0.0, 1.0]),
                Descriptor::new(vec![-1.0, 0.0]),
            ],
            vec!["P1".into(), "P2".into(), "P3".into()],
        )
        .unwrap()
    }

    fn run(faces: Vec<(BoundingBox, Descriptor)>, dir: &mut MapDirectory) -> FrameRecognition {
        let mut pipeline = FakePipeline { faces };
        recognize_frame(
            &mut pipeline,
            &DistanceMatcher::default(),
            &known(),
            dir,
            &[],
            640,
            480,
        )
        .unwrap()
    }

    #[test]
    fn test_no_faces() {
        let mut dir = MapDirectory::default();
        let r = run(vec![], &mut dir);
        assert!(r.overlays.is_empty());
        assert!(r.event.identity.is_none());
    }

    #[test]
    fn test_unknown_face() {
        let mut dir = MapDirectory::default();
        let r = run(vec![(bbox(0.0, 0.8), Descriptor::new(vec![0.7, 0.7]))], &mut dir);
        assert_eq!(r.overlays.len(), 1);
        assert_eq!(r.overlays[0].label, FaceLabel::Unknown);
        assert!(r.event.identity.is_none());
        assert_eq!(dir.lookups, 0);
    }

    #[test]
    fn test_first_match_drives_event() {
        let alice = Person::new("P2", "Alice", "Smith");
        let bob = Person::new("P1", "Bob", "Jones");
        let mut dir = MapDirectory::with(&[alice.clone(), bob.clone()]);
        let r = run(
            vec![
                (bbox(0.0, 0.7), Descriptor::new(vec![0.0, 1.0])),
                (bbox(100.0, 0.9), Descriptor::new(vec![1.0, 0.0])),
            ],
            &mut dir,
        );
        assert_eq!(r.event.identity, Some(alice));
        assert!((r.event.confidence - 0.7).abs() < 1e-6);
        assert_eq!(r.overlays.len(), 2);
        assert!(matches!(&r.overlays[1].label, FaceLabel::Recognized { text, .. } if text == "Jones P1"));
    }

    #[test]
    fn test_unresolved_match_degrades_to_unknown() {
        let carol = Person::new("P2", "Carol", "White");
        let mut dir = MapDirectory::with(&[carol.clone()]);
        let r = run(
            vec![
                (bbox(0.0, 0.9), Descriptor::new(vec![1.0, 0.0])),
                (bbox(100.0, 0.8), Descriptor::new(vec![0.0, 1.0])),
            ],
            &mut dir,
        );
        assert_eq!(r.overlays[0].label, FaceLabel::Unknown);
        assert_eq!(r.event.identity, Some(carol));
    }

    #[test]
    fn test_cached_directory_resolves_once() {
        let alice = Person::new("P1", "Alice", "Smith");
        let mut cached = CachedDirectory::new(MapDirectory::with(&[alice.clone()]));
        assert_eq!(cached.lookup(&"P1".into()), Some(alice.clone()));
        assert_eq!(cached.lookup(&"P1".into()), Some(alice));
        assert_eq!(cached.lookup(&"P9".into()), None);
        assert_eq!(cached.lookup(&"P9".into()), None);
        assert_eq!(cached.inner.lookups, 3);
    }
}
