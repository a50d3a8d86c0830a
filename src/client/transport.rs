//! Response handling shared by both API clients.

use http::header;

use crate::client::error::ApiError;

/// Bulk order pages can be large; anything past this is treated as a transport failure.
pub const MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

const EXCERPT_CHARS: usize = 512;

/// Status, pagination header and body of a finished request.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub link: Option<String>,
    pub body: String,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Leading part of the body, for error messages.
    pub fn excerpt(&self) -> String {
        let trimmed = self.body.trim();
        if trimmed.is_empty() {
            return "<no body>".to_string();
        }
        let mut excerpt: String = trimmed.chars().take(EXCERPT_CHARS).collect();
        if trimmed.chars().count() > EXCERPT_CHARS {
            excerpt.push('…');
        }
        excerpt
    }

    /// Pass 2xx responses through; anything else becomes [`ApiError::Http`].
    pub fn into_success(self, path: &str) -> Result<RawResponse, ApiError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(ApiError::Http {
                path: path.to_string(),
                status: self.status,
                message: self.excerpt(),
            })
        }
    }
}

pub fn read_response(mut resp: http::Response<ureq::Body>) -> Result<RawResponse, ApiError> {
    let status = resp.status().as_u16();
    let link = resp
        .headers()
        .get(header::LINK)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = resp.body_mut().with_config().limit(MAX_BODY_BYTES).read_to_string()?;
    Ok(RawResponse { status, link, body })
}
