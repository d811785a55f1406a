//! Connection configuration

use std::path::{Path, PathBuf};

/// Path that selects a purely in-memory database
pub const MEMORY_PATH: &str = ":memory:";

/// Default number of rows copied per backup page
pub const DEFAULT_BACKUP_PAGE_ROWS: usize = 64;

/// Connection configuration
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Database file, or `:memory:`
    pub path: PathBuf,
    /// Rows per page when backing up a table
    pub backup_page_rows: usize,
    /// Write the snapshot file when the connection closes
    pub flush_on_close: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from(MEMORY_PATH),
            backup_page_rows: DEFAULT_BACKUP_PAGE_ROWS,
            flush_on_close: true,
        }
    }
}

impl Config {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the database path
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = path.as_ref().to_path_buf();
        self
    }

    /// Set the rows per backup page (at least one)
    pub fn backup_page_rows(mut self, rows: usize) -> Self {
        self.backup_page_rows = rows.max(1);
        self
    }

    /// Set whether closing writes the snapshot file
    pub fn flush_on_close(mut self, flush: bool) -> Self {
        self.flush_on_close = flush;
        self
    }

    /// Whether the database lives only in memory
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = Config::new();
        assert!(config.is_memory());

        let config = Config::new()
            .path("data.db")
            .backup_page_rows(0)
            .flush_on_close(false);
        assert!(!config.is_memory());
        assert_eq!(config.backup_page_rows, 1);
        assert!(!config.flush_on_close);
    }
}
