use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::infrastructure::errors::{ApiError, ApiResult, NetworkError};
use crate::infrastructure::transport::HttpResponse;

/// Raw image bytes with the server's declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Decoded body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiPayload {
    /// `application/json` body.
    Json(Value),
    /// `image/*` body.
    Image(ImageBlob),
    /// Any other 2xx: success without a structured payload.
    Empty,
}

impl ApiPayload {
    /// Decode a 2xx response by its declared content type.
    pub(crate) fn from_response(response: HttpResponse) -> ApiResult<Self> {
        let essence = response
            .content_type()
            .and_then(|ct| ct.split(';').next())
            .map(|ct| ct.trim().to_ascii_lowercase())
            .unwrap_or_default();

        if essence == "application/json" || essence.ends_with("+json") {
            let value = serde_json::from_slice(&response.body)
                .map_err(|e| NetworkError::InvalidResponse(e.to_string()))?;
            Ok(ApiPayload::Json(value))
        } else if essence.starts_with("image/") {
            Ok(ApiPayload::Image(ImageBlob {
                content_type: essence,
                bytes: response.body,
            }))
        } else {
            Ok(ApiPayload::Empty)
        }
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            ApiPayload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// Deserialize a JSON payload into `T`.
    pub fn json<T: DeserializeOwned>(self) -> ApiResult<T> {
        match self {
            ApiPayload::Json(value) => serde_json::from_value(value)
                .map_err(|e| NetworkError::InvalidResponse(e.to_string()).into()),
            other => Err(ApiError::Network(NetworkError::InvalidResponse(format!(
                "expected a JSON body, got {}",
                other.kind()
            )))),
        }
    }

    pub fn into_image(self) -> ApiResult<ImageBlob> {
        match self {
            ApiPayload::Image(image) => Ok(image),
            other => Err(ApiError::Network(NetworkError::InvalidResponse(format!(
                "expected an image body, got {}",
                other.kind()
            )))),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiPayload::Json(_) => "JSON",
            ApiPayload::Image(_) => "an image",
            ApiPayload::Empty => "no payload",
        }
    }
}
