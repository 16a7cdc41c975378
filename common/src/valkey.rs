/// Valkey hash of content id -> content type.
pub const CONTENT_TYPES: &str = "content_types";

/// Valkey counter of uploads accepted by the content store.
pub const UPLOAD_COUNT: &str = "upload_count";

/// Build the Valkey key for a stored content blob.
pub fn content_key(cid: &str) -> String {
    format!("content:{cid}")
}
