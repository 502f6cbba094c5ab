use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("Failed to deserialize response data as `{0}` - {1}")]
    DataDeserializationError(&'static str, serde_json::Error),
    #[error("Request failed - {0}")]
    Failure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    V1,
}

impl AsRef<str> for ApiVersion {
    fn as_ref(&self) -> &str {
        match self {
            ApiVersion::V1 => "v1",
        }
    }
}

/// JSON envelope returned by every non-streaming endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct ApiResponse {
    status: ResponseStatus,
    api_version: ApiVersion,
    timestamp: DateTime<Utc>,
    data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Message {
    pub message: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(data: T) -> Self {
        match serde_json::to_value(&data) {
            Ok(data) => Self {
                status: ResponseStatus::Success,
                api_version: ApiVersion::V1,
                timestamp: Utc::now(),
                data,
            },
            Err(e) => Self::failure(e),
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self::success(Message {
            message: message.into(),
        })
    }

    pub fn failure<E: std::fmt::Display>(error: E) -> Self {
        log::error!("failure! {error}");
        Self {
            status: ResponseStatus::Failure,
            api_version: ApiVersion::V1,
            timestamp: Utc::now(),
            data: serde_json::Value::String(error.to_string()),
        }
    }

    pub fn status(&self) -> ResponseStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, ResponseStatus::Success)
    }

    pub fn into_data(self) -> serde_json::Value {
        self.data
    }

    pub fn into_result<T: DeserializeOwned>(self) -> Result<T, ResponseError> {
        if self.is_success() {
            self.deserialize_as()
        } else {
            let reason = match self.data {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            Err(ResponseError::Failure(reason))
        }
    }

    pub fn deserialize_as<T: DeserializeOwned>(self) -> Result<T, ResponseError> {
        serde_json::from_value(self.data)
            .map_err(|e| ResponseError::DataDeserializationError(std::any::type_name::<T>(), e))
    }
}
