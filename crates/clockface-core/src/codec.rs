//! Textual encoding of embeddings for the employee record.
//!
//! The persisted form is a JSON array of numbers, e.g. `[0.012,-0.4,...]`.

use crate::types::{Embedding, EmbeddingError};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    #[error("malformed embedding: {0}")]
    MalformedEmbedding(String),
}

/// Encode an embedding as a JSON array.
pub fn encode(embedding: &Embedding) -> String {
    // Finite f32 values always serialize.
    serde_json::to_string(embedding.values()).unwrap_or_else(|_| "[]".to_string())
}

/// Decode a stored embedding of any dimension.
pub fn decode(text: &str) -> Result<Embedding, CodecError> {
    let raw: Vec<serde_json::Value> = serde_json::from_str(text)
        .map_err(|e| CodecError::MalformedEmbedding(format!("not a JSON array: {e}")))?;

    let mut values = Vec::with_capacity(raw.len());
    for (index, item) in raw.iter().enumerate() {
        let number = item.as_f64().ok_or_else(|| {
            CodecError::MalformedEmbedding(format!("element {index} is not a number: {item}"))
        })?;
        let value = number as f32;
        if !value.is_finite() {
            return Err(CodecError::MalformedEmbedding(format!(
                "element {index} overflows f32: {number}"
            )));
        }
        values.push(value);
    }

    Embedding::new(values).map_err(|e| match e {
        EmbeddingError::Empty => CodecError::MalformedEmbedding("empty array".into()),
        other => CodecError::MalformedEmbedding(other.to_string()),
    })
}

/// Decode a stored embedding and require it to have `dim` components.
pub fn decode_with_dim(text: &str, dim: usize) -> Result<Embedding, CodecError> {
    let embedding = decode(text)?;
    if embedding.dim() != dim {
        return Err(CodecError::MalformedEmbedding(format!(
            "expected {dim} components, found {}",
            embedding.dim()
        )));
    }
    Ok(embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_preserves_values() {
        let original = Embedding::new(vec![
            0.0,
            -0.0,
            1.0,
            -1.5,
            0.1,
            f32::MIN_POSITIVE,
            f32::MAX,
            -0.033_417_89,
            123_456.79,
        ])
        .unwrap();
        let decoded = decode(&encode(&original)).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_roundtrip_128_dim() {
        let values: Vec<f32> = (0..128).map(|i| ((i as f32) * 0.731).sin() * 0.2).collect();
        let original = Embedding::new(values).unwrap();
        let decoded = decode_with_dim(&encode(&original), 128).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_encode_is_json_array() {
        let e = Embedding::new(vec![0.5, -2.0]).unwrap();
        assert_eq!(encode(&e), "[0.5,-2.0]");
    }

    #[test]
    fn test_decode_rejects_non_array() {
        assert!(matches!(decode("{\"0\": 1.0}"), Err(CodecError::MalformedEmbedding(_))));
        assert!(matches!(decode("not json"), Err(CodecError::MalformedEmbedding(_))));
        assert!(matches!(decode(""), Err(CodecError::MalformedEmbedding(_))));
    }

    #[test]
    fn test_decode_rejects_non_numeric_elements() {
        assert!(matches!(decode("[0.1, \"x\", 0.3]"), Err(CodecError::MalformedEmbedding(_))));
        assert!(matches!(decode("[0.1, null]"), Err(CodecError::MalformedEmbedding(_))));
    }

    #[test]
    fn test_decode_rejects_empty_array() {
        assert!(matches!(decode("[]"), Err(CodecError::MalformedEmbedding(_))));
    }

    #[test]
    fn test_decode_rejects_values_outside_f32() {
        assert!(matches!(decode("[1e300]"), Err(CodecError::MalformedEmbedding(_))));
    }

    #[test]
    fn test_decode_with_dim_rejects_wrong_length() {
        let err = decode_with_dim("[0.1, 0.2, 0.3]", 128).unwrap_err();
        assert_eq!(
            err,
            CodecError::MalformedEmbedding("expected 128 components, found 3".into())
        );
    }
}
