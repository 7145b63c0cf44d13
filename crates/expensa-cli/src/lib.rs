//! Operator tooling for the expense backend.

use std::collections::HashSet;

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationState {
    pub version: i64,
    pub description: String,
    pub applied: bool,
}

/// Pair every embedded migration with whether the database has applied it.
pub fn migration_states<'a>(
    available: impl IntoIterator<Item = (i64, &'a str)>,
    applied: &[i64],
) -> Vec<MigrationState> {
    let applied: HashSet<i64> = applied.iter().copied().collect();
    let mut states: Vec<MigrationState> = available
        .into_iter()
        .map(|(version, description)| MigrationState {
            version,
            description: description.to_string(),
            applied: applied.contains(&version),
        })
        .collect();
    states.sort_by_key(|s| s.version);
    states
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_migrations_are_marked() {
        let states = migration_states(
            [(20240301000002, "categories"), (20240301000001, "users")],
            &[20240301000001],
        );
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].description, "users");
        assert!(states[0].applied);
        assert!(!states[1].applied);
    }

    #[test]
    fn nothing_applied_on_fresh_database() {
        let states = migration_states([(1, "init")], &[]);
        assert!(states.iter().all(|s| !s.applied));
    }
}
