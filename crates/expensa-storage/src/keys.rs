//! Shared key generation for storage backends.

use expensa_core::constants::RECEIPT_PREFIX;
use uuid::Uuid;

/// `receipts/{organization_id}/{filename}`. All backends must use this format.
pub fn receipt_key(organization_id: Uuid, filename: &str) -> String {
    format!("{}/{}/{}", RECEIPT_PREFIX, organization_id, filename)
}

/// True when `key` is a receipt key inside the organization's prefix.
pub fn key_belongs_to(organization_id: Uuid, key: &str) -> bool {
    let prefix = format!("{}/{}/", RECEIPT_PREFIX, organization_id);
    key.starts_with(&prefix)
        && key.len() > prefix.len()
        && !key.contains("..")
        && !key[prefix.len()..].contains('/')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scoped_per_organization() {
        let org = Uuid::new_v4();
        let key = receipt_key(org, "a.jpg");
        assert_eq!(key, format!("receipts/{}/a.jpg", org));
        assert!(key_belongs_to(org, &key));
        assert!(!key_belongs_to(Uuid::new_v4(), &key));
        assert!(!key_belongs_to(org, &format!("receipts/{}/../x/a.jpg", org)));
        assert!(!key_belongs_to(org, &format!("receipts/{}/", org)));
    }
}
