/// API version segment in every versioned path.
pub const API_VERSION: &str = "v1";

pub const API_PREFIX: &str = "/api/v1";

pub const OPENAPI_PATH: &str = "/api/openapi.json";

/// Multipart and base64 overhead allowed on top of the receipt size limit.
pub const BODY_LIMIT_OVERHEAD_BYTES: usize = 256 * 1024;

pub const SERVICE_NAME: &str = "expensa-api";
