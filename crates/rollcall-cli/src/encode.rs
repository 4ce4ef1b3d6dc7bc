//! Build a known-faces store from a directory of labelled photos.
//!
//! Each image is named `<person id>.<ext>`; the most confident face in it is
//! encoded. Images with no detectable face are skipped.

use anyhow::{Context, Result};
use rollcall_core::{FacePipeline, KnownFaces, PersonId};
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Debug, Default)]
pub struct EncodeReport {
    pub encoded: Vec<PersonId>,
    /// Images that were read but contained no face.
    pub skipped: Vec<PathBuf>,
}

/// Person ID taken from the file stem, if the file looks like an image.
pub fn person_id_for(path: &Path) -> Option<PersonId> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?.trim();
    (!stem.is_empty()).then(|| PersonId::new(stem))
}

/// Encode every image in `dir`, in file-name order.
pub fn encode_directory(pipeline: &mut dyn FacePipeline, dir: &Path) -> Result<(KnownFaces, EncodeReport)> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("cannot read image directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    paths.sort();

    let mut known = KnownFaces::default();
    let mut report = EncodeReport::default();

    for path in paths {
        let Some(person_id) = person_id_for(&path) else {
            tracing::debug!(path = %path.display(), "not an image; ignoring");
            continue;
        };

        let rgb = image::open(&path)
            .with_context(|| format!("cannot decode {}", path.display()))?
            .to_rgb8();
        let (width, height) = rgb.dimensions();

        let boxes = pipeline.locate(rgb.as_raw(), width, height)?;
        let Some(best) = boxes
            .into_iter()
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        else {
            tracing::warn!(path = %path.display(), "no face found; skipping");
            report.skipped.push(path);
            continue;
        };

        let descriptor = pipeline
            .encode(rgb.as_raw(), width, height, std::slice::from_ref(&best))?
            .into_iter()
            .next()
            .with_context(|| format!("no descriptor produced for {}", path.display()))?;

        tracing::info!(person = %person_id, confidence = best.confidence, "encoded");
        known.push(person_id.clone(), descriptor)?;
        report.encoded.push(person_id);
    }

    Ok((known, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{BoundingBox, Descriptor, PipelineError};

    /// Sees faces only in images whose top-left pixel is bright; descriptor is the box confidence.
    struct BrightPixelPipeline;

    impl FacePipeline for BrightPixelPipeline {
        fn locate(&mut self, rgb: &[u8], _: u32, _: u32) -> Result<Vec<BoundingBox>, PipelineError> {
            if rgb[0] < 128 {
                return Ok(Vec::new());
            }
            let face = |confidence| BoundingBox {
                x: 0.0,
                y: 0.0,
                width: 4.0,
                height: 4.0,
                confidence,
                landmarks: None,
            };
            Ok(vec![face(0.6), face(0.95), face(0.7)])
        }

        fn encode(
            &mut self,
            _: &[u8],
            _: u32,
            _: u32,
            boxes: &[BoundingBox],
        ) -> Result<Vec<Descriptor>, PipelineError> {
            Ok(boxes.iter().map(|b| Descriptor::new(vec![b.confidence, 0.0])).collect())
        }
    }

    fn write_png(dir: &Path, name: &str, value: u8) {
        image::RgbImage::from_pixel(8, 8, image::Rgb([value, value, value]))
            .save(dir.join(name))
            .unwrap();
    }

    #[test]
    fn test_person_id_from_file_name() {
        assert_eq!(person_id_for(Path::new("/x/852741.jpg")), Some(PersonId::new("852741")));
        assert_eq!(person_id_for(Path::new("/x/852741.PNG")), Some(PersonId::new("852741")));
        assert_eq!(person_id_for(Path::new("/x/notes.txt")), None);
        assert_eq!(person_id_for(Path::new("/x/README")), None);
    }

    #[test]
    fn test_encode_directory_picks_best_face_and_skips_faceless() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "111.png", 255);
        write_png(dir.path(), "222.png", 10);
        write_png(dir.path(), "333.png", 200);
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let (known, report) = encode_directory(&mut BrightPixelPipeline, dir.path()).unwrap();
        assert_eq!(known.len(), 2);
        assert_eq!(known.person_ids(), &[PersonId::new("111"), PersonId::new("333")]);
        assert_eq!(known.descriptors()[0].values, vec![0.95, 0.0]);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].ends_with("222.png"));
    }
}
