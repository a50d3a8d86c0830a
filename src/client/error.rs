use core::fmt;

#[derive(Debug)]
pub enum ApiError {
    /// Client constructed without the settings it needs
    Config(String),
    Transport(String),
    /// Non-2xx response
    Http { path: String, status: u16, message: String },
    /// Body did not match the expected shape; `message` carries the JSON path
    Decode { path: String, message: String },
    Auth(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::Config(s) => write!(f, "client misconfigured: {}", s),
            ApiError::Transport(s) => write!(f, "transport error: {}", s),
            ApiError::Http { path, status, message } => write!(f, "{} failed: http {}: {}", path, status, message),
            ApiError::Decode { path, message } => write!(f, "{} returned unexpected body: {}", path, message),
            ApiError::Auth(e) => write!(f, "auth error: {}", e),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<ureq::Error> for ApiError {
    fn from(value: ureq::Error) -> Self {
        ApiError::Transport(value.to_string())
    }
}

/// Decode a JSON body, reporting the JSON path of the first mismatch.
pub fn decode_json<T: serde::de::DeserializeOwned>(path: &str, body: &str) -> Result<T, ApiError> {
    let mut de = serde_json::Deserializer::from_str(body);
    serde_path_to_error::deserialize(&mut de).map_err(|e| ApiError::Decode {
        path: path.to_string(),
        message: format!("at `{}`: {}", e.path(), e.inner()),
    })
}
