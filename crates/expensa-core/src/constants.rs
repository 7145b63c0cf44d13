//! Shared constants

/// Category assigned when no keyword matches the merchant name.
pub const FALLBACK_CATEGORY: &str = "Other";

/// Merchant name stored when extraction could not read one.
pub const UNKNOWN_MERCHANT: &str = "Unknown Merchant";

/// Image types the vision model accepts.
pub const VISION_MEDIA_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Key prefix under which receipt images are stored.
pub const RECEIPT_PREFIX: &str = "receipts";

/// Rows returned in the JSON export preview.
pub const EXPORT_PREVIEW_ROWS: usize = 50;

pub const INVITE_CODE_LENGTH: usize = 8;

/// Default currency code when the receipt does not state one.
pub const DEFAULT_CURRENCY: &str = "IDR";

pub const MAX_ORGANIZATION_NAME_LENGTH: u64 = 120;
pub const MAX_CUSTOM_CATEGORIES: usize = 100;
