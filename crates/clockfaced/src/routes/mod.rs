//! HTTP handlers, one module per resource.

pub mod attendance;
pub mod departments;
pub mod employees;
pub mod face;
pub mod health;
pub mod schedule;

use crate::error::{ApiError, ApiResult};
use axum::extract::Multipart;
use axum::response::IntoResponse;
use std::collections::HashMap;

/// A multipart upload: an optional `image` file plus text fields.
#[derive(Debug, Default)]
pub(crate) struct UploadForm {
    pub image: Option<Vec<u8>>,
    pub fields: HashMap<String, String>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == "image" {
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.image = Some(bytes.to_vec());
                }
            } else {
                let text = field.text().await?;
                form.fields.insert(name, text);
            }
        }
        Ok(form)
    }

    /// Non-blank text field.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn require_image(&mut self) -> ApiResult<Vec<u8>> {
        self.image.take().ok_or(ApiError::MissingImage)
    }
}

pub async fn not_found() -> impl IntoResponse {
    ApiError::NotFound("route".into())
}
