//! Upload validation rules.
//!
//! Pure checks with no I/O: the caller decides what to do with the
//! violations, so every rule can be exercised in isolation.

use crate::models::upload::UploadRequest;

/// Largest accepted payload, inclusive.
pub const MAX_FILE_SIZE: u64 = 5 * 1024 * 1024;

/// MIME types an upload's declared content type must contain.
pub const ACCEPTED_CONTENT_TYPES: [&str; 2] = ["image/jpeg", "application/pdf"];

pub const NAME_REQUIRED: &str = "File name is required";
pub const FILE_REQUIRED: &str = "File is required";
pub const FILE_TOO_LARGE: &str = "File must be less than 5MB";
pub const UNSUPPORTED_TYPE: &str = "File must be a JPEG or PDF";

/// Collect every rule violation for `request`.
///
/// An empty vector means the request is valid. Size and type are only
/// checked when a file part is present.
pub fn validate(request: &UploadRequest) -> Vec<String> {
    let mut violations = Vec::new();

    if request.name.is_empty() {
        violations.push(NAME_REQUIRED.to_string());
    }

    let Some(file) = &request.file else {
        violations.push(FILE_REQUIRED.to_string());
        return violations;
    };

    if file.size > MAX_FILE_SIZE {
        violations.push(FILE_TOO_LARGE.to_string());
    }

    // Substring match keeps parameters such as `; charset=binary` acceptable.
    if !ACCEPTED_CONTENT_TYPES
        .iter()
        .any(|accepted| file.content_type.contains(accepted))
    {
        violations.push(UNSUPPORTED_TYPE.to_string());
    }

    violations
}
