pub mod access;
pub mod approval;
pub mod categorization;
pub mod expenses;
pub mod export;
pub mod extraction;
pub mod intake;
pub mod organizations;
pub mod receipt_files;
pub mod users;

#[cfg(test)]
pub(crate) mod test_support;
