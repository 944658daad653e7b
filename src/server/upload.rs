//! Extractor for license uploads.
//!
//! `POST /api/v1/license` accepts the same fields in three encodings:
//!
//! - `multipart/form-data`: `license_type` (informational), `license_code`, `license_file`
//! - `application/json`: `{"license_code": "..."}`
//! - `application/x-www-form-urlencoded`: `license_code=...`

use axum::{
    async_trait,
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
    Form, Json,
};
use serde::Deserialize;
use tracing::debug;

use crate::errors::LicenseResult;
use crate::license::Submission;
use crate::server::api_error::ApiError;

/// Text fields of an upload request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct UploadLicenseRequest {
    /// Declared by some clients; the stored type is derived from the payload.
    pub license_type: Option<String>,
    pub license_code: Option<String>,
}

/// Raw upload, before validation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LicenseUpload {
    pub license_code: Option<String>,
    pub license_file: Option<Vec<u8>>,
}

impl LicenseUpload {
    /// Validate into a [`Submission`].
    pub fn into_submission(self) -> LicenseResult<Submission> {
        Submission::from_parts(self.license_code, self.license_file)
    }

    async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut upload = LicenseUpload::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "license_code" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
                    upload.license_code = Some(text);
                }
                "license_file" => {
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
                    upload.license_file = Some(bytes.to_vec());
                }
                other => debug!(field = %other, "Ignoring upload field"),
            }
        }

        Ok(upload)
    }
}

impl From<UploadLicenseRequest> for LicenseUpload {
    fn from(req: UploadLicenseRequest) -> Self {
        Self {
            license_code: req.license_code,
            license_file: None,
        }
    }
}

#[async_trait]
impl<S> FromRequest<S> for LicenseUpload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
            Self::from_multipart(multipart).await
        } else if content_type.starts_with("application/json") {
            let Json(body) = Json::<UploadLicenseRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
            Ok(body.into())
        } else if content_type.starts_with("application/x-www-form-urlencoded") {
            let Form(body) = Form::<UploadLicenseRequest>::from_request(req, state)
                .await
                .map_err(|e| ApiError::from_rejection(e.status(), e.body_text()))?;
            Ok(body.into())
        } else {
            Err(ApiError::invalid_request(
                "expected multipart/form-data, application/json or application/x-www-form-urlencoded",
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request as HttpRequest;

    use crate::server::api_error::ErrorCode;

    const BOUNDARY: &str = "entitle-test-boundary";

    fn multipart_body(code: Option<&str>, file: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"license_type\"\r\n\r\nfile\r\n"
            )
            .as_bytes(),
        );
        if let Some(code) = code {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"license_code\"\r\n\r\n{code}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(file) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"license_file\"; filename=\"license.lic\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(file);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn extract(content_type: &str, body: Vec<u8>) -> Result<LicenseUpload, ApiError> {
        let req = HttpRequest::builder()
            .method("POST")
            .uri("/api/v1/license")
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap();
        LicenseUpload::from_request(req, &()).await
    }

    #[tokio::test]
    async fn multipart_file_and_code() {
        let upload = extract(
            &format!("multipart/form-data; boundary={BOUNDARY}"),
            multipart_body(Some("ABC"), Some(&[0, 1, 2, 255])),
        )
        .await
        .unwrap();

        assert_eq!(upload.license_code.as_deref(), Some("ABC"));
        assert_eq!(upload.license_file, Some(vec![0, 1, 2, 255]));
    }

    #[tokio::test]
    async fn multipart_without_inputs_fails_validation() {
        let upload = extract(
            &format!("multipart/form-data; boundary={BOUNDARY}"),
            multipart_body(None, None),
        )
        .await
        .unwrap();

        assert_eq!(upload, LicenseUpload::default());
        assert!(upload.into_submission().is_err());
    }

    #[tokio::test]
    async fn json_code() {
        let upload = extract(
            "application/json",
            br#"{"license_type":"code","license_code":"ABC-123"}"#.to_vec(),
        )
        .await
        .unwrap();

        assert_eq!(
            upload.into_submission().unwrap(),
            Submission::Code("ABC-123".into())
        );
    }

    #[tokio::test]
    async fn urlencoded_code() {
        let upload = extract(
            "application/x-www-form-urlencoded",
            b"license_code=XYZ-9".to_vec(),
        )
        .await
        .unwrap();

        assert_eq!(upload.license_code.as_deref(), Some("XYZ-9"));
    }

    #[tokio::test]
    async fn unsupported_content_type_is_rejected() {
        let err = extract("text/plain", b"ABC".to_vec()).await.unwrap_err();
        assert_eq!(err.error.code, ErrorCode::InvalidRequest);
    }
}
