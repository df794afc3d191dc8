//! Face Attribute Classifiers
//!
//! Gender and age bucket prediction from a single detected face. Both models
//! share the same input: the face crop resized to 227x227 with a fixed
//! per-channel mean subtracted.

use std::sync::Arc;

use anyhow::anyhow;
use image::RgbImage;

use super::detector::FaceBox;
use super::pool::{InferenceBackend, ModelType};
use super::preprocess::{blob_from_image, crop_face, CLASSIFIER_INPUT_SIZE, CLASSIFIER_MEAN};
use crate::error::FaceResult;
use crate::utils::math::argmax;

/// Gender classification result, in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    pub const ALL: [Gender; 2] = [Gender::Male, Gender::Female];

    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "Male",
            Gender::Female => "Female",
        }
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

/// Age bucket, in model output order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBucket {
    Age0To2,
    Age4To6,
    Age8To12,
    Age15To20,
    Age25To32,
    Age38To43,
    Age48To53,
    Age60To100,
}

impl AgeBucket {
    pub const ALL: [AgeBucket; 8] = [
        AgeBucket::Age0To2,
        AgeBucket::Age4To6,
        AgeBucket::Age8To12,
        AgeBucket::Age15To20,
        AgeBucket::Age25To32,
        AgeBucket::Age38To43,
        AgeBucket::Age48To53,
        AgeBucket::Age60To100,
    ];

    /// Label as published with the model
    pub fn label(&self) -> &'static str {
        match self {
            AgeBucket::Age0To2 => "(0-2)",
            AgeBucket::Age4To6 => "(4-6)",
            AgeBucket::Age8To12 => "(8-12)",
            AgeBucket::Age15To20 => "(15-20)",
            AgeBucket::Age25To32 => "(25-32)",
            AgeBucket::Age38To43 => "(38-43)",
            AgeBucket::Age48To53 => "(48-53)",
            AgeBucket::Age60To100 => "(60-100)",
        }
    }

    /// Label without the enclosing parentheses, e.g. `25-32`
    pub fn as_str(&self) -> &'static str {
        let label = self.label();
        &label[1..label.len() - 1]
    }

    pub fn from_index(idx: usize) -> Option<Self> {
        Self::ALL.get(idx).copied()
    }
}

/// Gender and age classifiers over one backend
pub struct AttributeClassifier<B: InferenceBackend> {
    backend: Arc<B>,
}

impl<B: InferenceBackend> AttributeClassifier<B> {
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Classify the gender of the face inside `face`
    pub fn classify_gender(&self, image: &RgbImage, face: &FaceBox) -> FaceResult<Gender> {
        let scores = self.scores(ModelType::Gender, image, face, Gender::ALL.len())?;
        let gender = Gender::from_index(argmax(&scores))
            .ok_or_else(|| anyhow!("gender model returned no scores"))?;
        tracing::debug!("Gender scores {:?} -> {}", scores, gender.as_str());
        Ok(gender)
    }

    /// Classify the age bucket of the face inside `face`
    pub fn classify_age(&self, image: &RgbImage, face: &FaceBox) -> FaceResult<AgeBucket> {
        let scores = self.scores(ModelType::Age, image, face, AgeBucket::ALL.len())?;
        let age = AgeBucket::from_index(argmax(&scores))
            .ok_or_else(|| anyhow!("age model returned no scores"))?;
        tracing::debug!("Age scores {:?} -> {}", scores, age.as_str());
        Ok(age)
    }

    /// Crop, build the blob and run one classifier
    fn scores(
        &self,
        model: ModelType,
        image: &RgbImage,
        face: &FaceBox,
        expected: usize,
    ) -> FaceResult<Vec<f32>> {
        let crop = crop_face(image, face.x1, face.y1, face.x2, face.y2)?;
        let blob = blob_from_image(&crop, CLASSIFIER_INPUT_SIZE, CLASSIFIER_MEAN);

        let output = self.backend.infer(model, &blob)?;
        if output.data.len() != expected {
            return Err(anyhow!(
                "{} model returned {} scores, expected {}",
                model.as_str(),
                output.data.len(),
                expected
            )
            .into());
        }

        Ok(output.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::mock::MockBackend;
    use crate::engine::pool::OutputTensor;
    use crate::error::FaceError;
    use image::Rgb;

    fn face(x1: f32, y1: f32, x2: f32, y2: f32) -> FaceBox {
        FaceBox { x1, y1, x2, y2, confidence: 0.9, class_id: 0 }
    }

    fn classifier(gender: Vec<f32>, age: Vec<f32>) -> (Arc<MockBackend>, AttributeClassifier<MockBackend>) {
        let backend = Arc::new(MockBackend::with_outputs(
            OutputTensor::new(vec![1, 5, 8], vec![0.0; 40]),
            gender,
            age,
        ));
        (backend.clone(), AttributeClassifier::new(backend))
    }

    #[test]
    fn test_gender_as_str() {
        assert_eq!(Gender::Male.as_str(), "Male");
        assert_eq!(Gender::Female.as_str(), "Female");
        assert_eq!(Gender::from_index(1), Some(Gender::Female));
        assert_eq!(Gender::from_index(2), None);
    }

    #[test]
    fn test_age_labels() {
        let stripped: Vec<&str> = AgeBucket::ALL.iter().map(|a| a.as_str()).collect();
        assert_eq!(
            stripped,
            vec!["0-2", "4-6", "8-12", "15-20", "25-32", "38-43", "48-53", "60-100"]
        );
        assert_eq!(AgeBucket::Age25To32.label(), "(25-32)");
        assert_eq!(AgeBucket::from_index(7), Some(AgeBucket::Age60To100));
        assert_eq!(AgeBucket::from_index(8), None);
    }

    #[test]
    fn test_classify_gender() {
        let (backend, classifier) = classifier(vec![0.2, 0.8], vec![0.0; 8]);
        let image = RgbImage::from_pixel(40, 40, Rgb([90, 90, 90]));

        let gender = classifier.classify_gender(&image, &face(5.0, 5.0, 30.0, 35.0)).unwrap();
        assert_eq!(gender, Gender::Female);
        assert_eq!(backend.calls(), vec![(ModelType::Gender, vec![1, 3, 227, 227])]);
    }

    #[test]
    fn test_classify_age() {
        let scores = vec![0.01, 0.02, 0.03, 0.1, 0.6, 0.1, 0.1, 0.04];
        let (_, classifier) = classifier(vec![1.0, 0.0], scores);
        let image = RgbImage::new(40, 40);

        let age = classifier.classify_age(&image, &face(0.0, 0.0, 40.0, 40.0)).unwrap();
        assert_eq!(age, AgeBucket::Age25To32);
        assert_eq!(age.as_str(), "25-32");
    }

    #[test]
    fn test_tie_picks_first_label() {
        let (_, classifier) = classifier(vec![0.5, 0.5], vec![0.0; 8]);
        let image = RgbImage::new(10, 10);

        let gender = classifier.classify_gender(&image, &face(0.0, 0.0, 10.0, 10.0)).unwrap();
        assert_eq!(gender, Gender::Male);
    }

    #[test]
    fn test_nan_scores_fall_back_to_first_label() {
        let (_, classifier) = classifier(vec![f32::NAN, f32::NAN], vec![f32::NAN; 8]);
        let image = RgbImage::new(10, 10);
        let region = face(0.0, 0.0, 10.0, 10.0);

        assert_eq!(classifier.classify_gender(&image, &region).unwrap(), Gender::Male);
        assert_eq!(classifier.classify_age(&image, &region).unwrap(), AgeBucket::Age0To2);
    }

    #[test]
    fn test_wrong_output_length() {
        let (_, classifier) = classifier(vec![0.1, 0.2, 0.7], vec![0.0; 8]);
        let image = RgbImage::new(10, 10);

        let err = classifier.classify_gender(&image, &face(0.0, 0.0, 10.0, 10.0)).unwrap_err();
        assert!(matches!(err, FaceError::Inference(_)));
    }

    #[test]
    fn test_box_outside_image() {
        let (backend, classifier) = classifier(vec![0.2, 0.8], vec![0.0; 8]);
        let image = RgbImage::new(10, 10);

        let err = classifier.classify_age(&image, &face(20.0, 20.0, 30.0, 30.0)).unwrap_err();
        assert!(matches!(err, FaceError::InvalidFaceRegion { .. }));
        assert!(backend.calls().is_empty());
    }
}
