//! Face enrollment and identification against the employee directory.

use crate::codec;
use crate::extractor::{EmbeddingExtractor, ExtractError, ModelLoader};
use crate::matcher::{EuclideanMatcher, Matcher};
use crate::types::{Embedding, EnrolledIdentity, MatchError, MatchResult};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// The part of an employee record face authentication cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct FaceRecord {
    pub employee_id: String,
    /// Serialized embedding as produced by [`codec::encode`].
    pub face_embedding: Option<String>,
}

#[derive(Error, Debug)]
#[error("directory error: {0}")]
pub struct DirectoryError(pub String);

/// Persistence collaborator holding employee embeddings.
#[async_trait]
pub trait EmployeeDirectory: Send + Sync {
    async fn get_employee(&self, id: &str) -> Result<Option<FaceRecord>, DirectoryError>;

    /// All employees, in a stable order (by id).
    async fn list_employees(&self) -> Result<Vec<FaceRecord>, DirectoryError>;

    async fn update_employee_embedding(&self, id: &str, encoded: &str) -> Result<(), DirectoryError>;
}

/// Asynchronous access to an embedding extractor.
#[async_trait]
pub trait EmbeddingSource: Send + Sync {
    async fn extract(&self, image: Vec<u8>) -> Result<Embedding, ExtractError>;

    fn is_ready(&self) -> bool;
}

/// Runs extraction inline on the calling task. Suitable for tools and tests;
/// servers should move inference off the async runtime.
#[async_trait]
impl<L: ModelLoader> EmbeddingSource for EmbeddingExtractor<L> {
    async fn extract(&self, image: Vec<u8>) -> Result<Embedding, ExtractError> {
        EmbeddingExtractor::extract(self, &image)
    }

    fn is_ready(&self) -> bool {
        self.is_loaded()
    }
}

#[derive(Error, Debug)]
pub enum FaceAuthError {
    #[error("employee not found: {0}")]
    UnknownEmployee(String),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Match(#[from] MatchError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Enrollment and identification, wired to an extractor and a directory.
#[derive(Clone)]
pub struct FaceAuth {
    source: Arc<dyn EmbeddingSource>,
    directory: Arc<dyn EmployeeDirectory>,
    threshold: f32,
    dim: usize,
}

impl FaceAuth {
    pub fn new(
        source: Arc<dyn EmbeddingSource>,
        directory: Arc<dyn EmployeeDirectory>,
        threshold: f32,
        dim: usize,
    ) -> Self {
        Self {
            source,
            directory,
            threshold,
            dim,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn is_ready(&self) -> bool {
        self.source.is_ready()
    }

    /// Store a new embedding for `employee_id`, replacing any previous one.
    pub async fn enroll(&self, employee_id: &str, image: Vec<u8>) -> Result<Embedding, FaceAuthError> {
        if self.directory.get_employee(employee_id).await?.is_none() {
            return Err(FaceAuthError::UnknownEmployee(employee_id.to_string()));
        }

        let embedding = self.source.extract(image).await?;
        let encoded = codec::encode(&embedding);
        self.directory
            .update_employee_embedding(employee_id, &encoded)
            .await?;

        tracing::info!(employee_id, dim = embedding.dim(), "face enrolled");
        Ok(embedding)
    }

    /// Identify the employee in `image` among everyone enrolled right now.
    pub async fn identify(&self, image: Vec<u8>) -> Result<MatchResult, FaceAuthError> {
        let probe = self.source.extract(image).await?;
        let candidates = self.candidates().await?;
        let result = EuclideanMatcher.resolve(&probe, &candidates, self.threshold)?;

        match &result {
            MatchResult::Identified { employee_id, distance } => {
                tracing::info!(employee_id = %employee_id, distance, "face identified");
            }
            MatchResult::NoMatch => {
                tracing::info!(
                    candidates = candidates.len(),
                    threshold = self.threshold,
                    "face not recognised"
                );
            }
        }
        Ok(result)
    }

    /// Snapshot of the enrolled population. Records whose stored embedding
    /// does not decode are logged and treated as not enrolled.
    async fn candidates(&self) -> Result<Vec<EnrolledIdentity>, FaceAuthError> {
        let records = self.directory.list_employees().await?;
        Ok(records
            .into_iter()
            .map(|record| {
                let embedding = record.face_embedding.as_deref().and_then(|text| {
                    codec::decode_with_dim(text, self.dim)
                        .map_err(|e| {
                            tracing::warn!(
                                employee_id = %record.employee_id,
                                error = %e,
                                "skipping stored embedding"
                            );
                        })
                        .ok()
                });
                EnrolledIdentity::new(record.employee_id, embedding)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryDirectory {
        records: Mutex<BTreeMap<String, Option<String>>>,
    }

    impl MemoryDirectory {
        fn with(entries: &[(&str, Option<&str>)]) -> Self {
            let records = entries
                .iter()
                .map(|(id, text)| (id.to_string(), text.map(str::to_string)))
                .collect();
            Self {
                records: Mutex::new(records),
            }
        }

        fn stored(&self, id: &str) -> Option<String> {
            self.records.lock().unwrap().get(id).cloned().flatten()
        }
    }

    #[async_trait]
    impl EmployeeDirectory for MemoryDirectory {
        async fn get_employee(&self, id: &str) -> Result<Option<FaceRecord>, DirectoryError> {
            Ok(self.records.lock().unwrap().get(id).map(|text| FaceRecord {
                employee_id: id.to_string(),
                face_embedding: text.clone(),
            }))
        }

        async fn list_employees(&self) -> Result<Vec<FaceRecord>, DirectoryError> {
            Ok(self
                .records
                .lock()
                .unwrap()
                .iter()
                .map(|(id, text)| FaceRecord {
                    employee_id: id.clone(),
                    face_embedding: text.clone(),
                })
                .collect())
        }

        async fn update_employee_embedding(&self, id: &str, encoded: &str) -> Result<(), DirectoryError> {
            match self.records.lock().unwrap().get_mut(id) {
                Some(slot) => {
                    *slot = Some(encoded.to_string());
                    Ok(())
                }
                None => Err(DirectoryError(format!("no employee {id}"))),
            }
        }
    }

    /// Interprets the image bytes as a little list of floats; empty means no face.
    struct ScriptedSource;

    #[async_trait]
    impl EmbeddingSource for ScriptedSource {
        async fn extract(&self, image: Vec<u8>) -> Result<Embedding, ExtractError> {
            if image.is_empty() {
                return Err(ExtractError::NoFaceDetected);
            }
            Ok(Embedding::new(image.iter().map(|&b| b as f32 / 10.0).collect())?)
        }

        fn is_ready(&self) -> bool {
            true
        }
    }

    fn auth(directory: Arc<MemoryDirectory>) -> FaceAuth {
        FaceAuth::new(Arc::new(ScriptedSource), directory, 0.6, 2)
    }

    #[tokio::test]
    async fn test_enroll_persists_encoded_embedding() {
        let directory = Arc::new(MemoryDirectory::with(&[("e1", None)]));
        let embedding = auth(directory.clone()).enroll("e1", vec![1, 2]).await.unwrap();
        assert_eq!(embedding.values(), &[0.1, 0.2]);
        assert_eq!(directory.stored("e1").as_deref(), Some("[0.1,0.2]"));
    }

    #[tokio::test]
    async fn test_reenroll_overwrites() {
        let directory = Arc::new(MemoryDirectory::with(&[("e1", Some("[0.9,0.9]"))]));
        auth(directory.clone()).enroll("e1", vec![3, 4]).await.unwrap();
        assert_eq!(directory.stored("e1").as_deref(), Some("[0.3,0.4]"));
    }

    #[tokio::test]
    async fn test_enroll_without_face_persists_nothing() {
        let directory = Arc::new(MemoryDirectory::with(&[("e1", Some("[0.5,0.5]"))]));
        let err = auth(directory.clone()).enroll("e1", vec![]).await.unwrap_err();
        assert!(matches!(err, FaceAuthError::Extract(ExtractError::NoFaceDetected)));
        assert_eq!(directory.stored("e1").as_deref(), Some("[0.5,0.5]"));
    }

    #[tokio::test]
    async fn test_enroll_unknown_employee() {
        let directory = Arc::new(MemoryDirectory::default());
        let err = auth(directory).enroll("ghost", vec![1, 1]).await.unwrap_err();
        assert!(matches!(err, FaceAuthError::UnknownEmployee(ref id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_identify_picks_nearest() {
        let directory = Arc::new(MemoryDirectory::with(&[
            ("a", Some("[0.0,0.0]")),
            ("b", Some("[1.0,1.0]")),
            ("c", None),
        ]));
        let result = auth(directory).identify(vec![9, 9]).await.unwrap();
        assert_eq!(result.employee_id(), Some("b"));
    }

    #[tokio::test]
    async fn test_identify_no_match_above_threshold() {
        let directory = Arc::new(MemoryDirectory::with(&[("a", Some("[5.0,5.0]"))]));
        let result = auth(directory).identify(vec![1, 1]).await.unwrap();
        assert_eq!(result, MatchResult::NoMatch);
    }

    #[tokio::test]
    async fn test_identify_skips_malformed_candidates() {
        let directory = Arc::new(MemoryDirectory::with(&[
            ("a", Some("{not json")),
            ("b", Some("[0.1,0.2,0.3]")),
            ("c", Some("[0.2,0.2]")),
        ]));
        let result = auth(directory).identify(vec![2, 2]).await.unwrap();
        assert_eq!(result.employee_id(), Some("c"));
    }

    #[tokio::test]
    async fn test_identify_without_face() {
        let directory = Arc::new(MemoryDirectory::with(&[("a", Some("[0.0,0.0]"))]));
        let err = auth(directory).identify(vec![]).await.unwrap_err();
        assert!(matches!(err, FaceAuthError::Extract(ExtractError::NoFaceDetected)));
    }

    #[tokio::test]
    async fn test_identify_probe_dimension_mismatch() {
        let directory = Arc::new(MemoryDirectory::with(&[("a", Some("[0.0,0.0]"))]));
        let err = auth(directory).identify(vec![1, 1, 1]).await.unwrap_err();
        assert!(matches!(
            err,
            FaceAuthError::Match(MatchError::DimensionMismatch { left: 3, right: 2 })
        ));
    }
}
