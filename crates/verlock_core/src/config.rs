//! Session manager configuration.

/// Default name of the table holding version tokens.
pub const DEFAULT_VERSION_TABLE: &str = "VersionLock";

/// Configuration shared by every session of a [`crate::SessionManager`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether mapper updates and deletes require a held write lock.
    ///
    /// Turning this off leaves the lock manager purely advisory; the version
    /// token's conditional write still detects lost updates.
    pub enforce_write_locks: bool,

    /// Whether finding an entity takes a read lock on it.
    pub read_lock_on_find: bool,

    /// Table holding version token records.
    pub version_table: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enforce_write_locks: true,
            read_lock_on_find: true,
            version_table: DEFAULT_VERSION_TABLE.to_string(),
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether updates and deletes require a held write lock.
    #[must_use]
    pub const fn enforce_write_locks(mut self, value: bool) -> Self {
        self.enforce_write_locks = value;
        self
    }

    /// Sets whether finds take a read lock.
    #[must_use]
    pub const fn read_lock_on_find(mut self, value: bool) -> Self {
        self.read_lock_on_find = value;
        self
    }

    /// Sets the version token table.
    #[must_use]
    pub fn version_table(mut self, table: impl Into<String>) -> Self {
        self.version_table = table.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.enforce_write_locks);
        assert!(config.read_lock_on_find);
        assert_eq!(config.version_table, "VersionLock");
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .enforce_write_locks(false)
            .read_lock_on_find(false)
            .version_table("Stamps");

        assert!(!config.enforce_write_locks);
        assert!(!config.read_lock_on_find);
        assert_eq!(config.version_table, "Stamps");
    }
}
