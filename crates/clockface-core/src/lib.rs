//! clockface-core: Face embeddings and identity resolution for attendance.
//!
//! Detection and description run through ONNX Runtime (SCRFD detector and a
//! descriptor network); matching is nearest Euclidean distance under a threshold.

pub mod alignment;
pub mod auth;
pub mod codec;
pub mod detector;
pub mod extractor;
pub mod matcher;
pub mod recognizer;
pub mod types;

pub use auth::{DirectoryError, EmbeddingSource, EmployeeDirectory, FaceAuth, FaceAuthError, FaceRecord};
pub use codec::CodecError;
pub use extractor::{
    decode_image, EmbeddingExtractor, ExtractError, FaceModel, ModelError, ModelLoader, OnnxModelLoader,
};
pub use matcher::{resolve, EuclideanMatcher, Matcher, DEFAULT_THRESHOLD};
pub use types::{Detection, Embedding, EmbeddingError, EnrolledIdentity, MatchError, MatchResult};

/// Default embedding length of the descriptor network.
pub const DEFAULT_EMBEDDING_DIM: usize = 128;
