// JSON error body shared by every HTTP route.

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    pub error: String,
}
