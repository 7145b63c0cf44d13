//! Input checks shared by handlers and services.

use crate::constants::MAX_CUSTOM_CATEGORIES;
use crate::error::AppError;

/// Lowercase the MIME type, drop parameters, and check it against the allow-list.
pub fn validate_image_content_type(
    content_type: &str,
    allowed: &[String],
) -> Result<String, AppError> {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();
    if !mime.starts_with("image/") || !allowed.iter().any(|a| a == &mime) {
        return Err(AppError::InvalidInput(format!(
            "Unsupported receipt type '{}'. Allowed types: {}",
            mime,
            allowed.join(", ")
        )));
    }
    Ok(mime)
}

/// File extension used for stored receipts of the given MIME type.
pub fn extension_for_content_type(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

/// Trimmed, collapsed category name.
pub fn normalize_category_name(name: &str) -> Result<String, AppError> {
    let name = name.split_whitespace().collect::<Vec<_>>().join(" ");
    if name.is_empty() || name.chars().count() > 60 {
        return Err(AppError::InvalidInput(
            "Category name must be between 1 and 60 characters".to_string(),
        ));
    }
    Ok(name)
}

/// Deduplicate (case-insensitively) and bound the custom category list.
pub fn normalize_custom_categories(names: &[String]) -> Result<Vec<String>, AppError> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = normalize_category_name(name)?;
        if !out.iter().any(|existing| existing.eq_ignore_ascii_case(&name)) {
            out.push(name);
        }
    }
    if out.len() > MAX_CUSTOM_CATEGORIES {
        return Err(AppError::InvalidInput(format!(
            "An organization can have at most {} custom categories",
            MAX_CUSTOM_CATEGORIES
        )));
    }
    Ok(out)
}

/// `None` for blank strings, trimmed otherwise.
pub fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
