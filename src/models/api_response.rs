use serde::{Deserialize, Serialize};

/// Envelope returned by every auth/profile endpoint: `{success, data, message}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Take `data` from a successful response, or describe why there is none.
    pub fn into_data(self) -> std::result::Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err(self
                .message
                .unwrap_or_else(|| "Response contained no data".to_string())),
            (false, _) => Err(self
                .message
                .unwrap_or_else(|| "Request was not successful".to_string())),
        }
    }
}
