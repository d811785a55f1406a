//! Online backup
//!
//! A [`Backup`] copies a snapshot of one connection's tables into another
//! connection in pages. The destination keeps its old contents until the
//! last page is copied, then its catalog is replaced in one swap.

use std::ops::Range;

use tracing::{debug, info};

use crate::catalog::Catalog;
use crate::connection::Connection;
use crate::error::{Error, Result};
use crate::storage::{Table, Tuple};

/// Progress reported after each backup step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupProgress {
    /// Pages copied so far
    pub copied: usize,
    /// Pages still to copy
    pub remaining: usize,
    /// Total pages in the backup
    pub total: usize,
}

/// One page: a slice of one table's rows
struct Page {
    table: usize,
    rows: Range<usize>,
}

/// A backup in progress
pub struct Backup<'a> {
    source: Vec<Table>,
    staged: Vec<Vec<Tuple>>,
    pages: Vec<Page>,
    copied: usize,
    installed: bool,
    dest: &'a mut Connection,
}

impl<'a> Backup<'a> {
    /// Prepare a backup of `source` into `dest`
    ///
    /// The source is snapshotted here; later changes to it are not copied.
    pub fn new(source: &Connection, dest: &'a mut Connection) -> Result<Self> {
        if dest.in_transaction() {
            return Err(Error::Transaction(
                "cannot back up into a database with an active transaction".to_string(),
            ));
        }

        let page_rows = source.config().backup_page_rows.max(1);
        let tables: Vec<Table> = source.catalog().tables().cloned().collect();
        let mut pages = Vec::new();
        for (index, table) in tables.iter().enumerate() {
            let count = table.row_count();
            if count == 0 {
                pages.push(Page {
                    table: index,
                    rows: 0..0,
                });
                continue;
            }
            let mut start = 0;
            while start < count {
                let end = (start + page_rows).min(count);
                pages.push(Page {
                    table: index,
                    rows: start..end,
                });
                start = end;
            }
        }

        Ok(Self {
            staged: tables.iter().map(|t| Vec::with_capacity(t.row_count())).collect(),
            source: tables,
            pages,
            copied: 0,
            installed: false,
            dest,
        })
    }

    /// Copy up to `pages` pages; zero or a negative count copies the rest
    ///
    /// Returns `true` once the backup is complete and the destination has
    /// been replaced.
    pub fn step(&mut self, pages: i32) -> Result<bool> {
        let total = self.pages.len();
        if self.installed {
            return Ok(true);
        }

        let count = match usize::try_from(pages) {
            Ok(n) if n > 0 => n,
            _ => total - self.copied,
        };
        let end = (self.copied + count).min(total);
        for page in &self.pages[self.copied..end] {
            let rows = self.source[page.table].rows();
            self.staged[page.table].extend_from_slice(&rows[page.rows.clone()]);
        }
        self.copied = end;
        debug!(copied = self.copied, total, "backup step");

        if self.copied < total {
            return Ok(false);
        }
        self.install()?;
        Ok(true)
    }

    /// Current progress
    pub fn progress(&self) -> BackupProgress {
        BackupProgress {
            copied: self.copied,
            remaining: self.pages.len() - self.copied,
            total: self.pages.len(),
        }
    }

    fn install(&mut self) -> Result<()> {
        let mut catalog = Catalog::new();
        for (table, rows) in self.source.iter().zip(self.staged.drain(..)) {
            catalog.put_table(Table::from_rows(
                table.name(),
                table.schema().as_ref().clone(),
                rows,
            ));
        }
        let tables = catalog.len();
        self.dest.replace_catalog(catalog)?;
        self.installed = true;
        info!(tables, pages = self.pages.len(), "backup complete");
        Ok(())
    }
}

impl Connection {
    /// Copy this database into `dest`
    ///
    /// `pages_per_step` pages are copied per step (all of them when zero or
    /// negative) and `progress` is called after every step.
    pub fn backup<F>(&self, dest: &mut Connection, pages_per_step: i32, mut progress: F) -> Result<()>
    where
        F: FnMut(BackupProgress),
    {
        let mut backup = Backup::new(self, dest)?;
        info!(pages = backup.progress().total, "backup started");
        loop {
            let done = backup.step(pages_per_step)?;
            progress(backup.progress());
            if done {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn source() -> Connection {
        let mut conn =
            Connection::open_with_config(Config::new().backup_page_rows(2)).unwrap();
        conn.executescript(
            "CREATE TABLE a (x INTEGER);
             INSERT INTO a VALUES (1), (2), (3), (4), (5);
             CREATE TABLE b (y TEXT);",
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_backup_reports_each_step() {
        let src = source();
        let mut dest = Connection::open_in_memory().unwrap();

        let mut reports = Vec::new();
        src.backup(&mut dest, 1, |p| reports.push(p)).unwrap();

        // three pages for a, one for the empty table b
        assert_eq!(reports.len(), 4);
        assert_eq!(
            reports[0],
            BackupProgress {
                copied: 1,
                remaining: 3,
                total: 4
            }
        );
        assert_eq!(reports[3].remaining, 0);
        assert_eq!(dest.table_names(), vec!["a", "b"]);
        assert_eq!(dest.dump(), src.dump());
    }

    #[test]
    fn test_step_until_complete() {
        let src = source();
        let mut dest = Connection::open_in_memory().unwrap();
        dest.execute("CREATE TABLE old (z)", ()).unwrap();

        let mut backup = Backup::new(&src, &mut dest).unwrap();
        assert!(!backup.step(2).unwrap());
        assert!(backup.step(-1).unwrap());
        assert!(backup.step(1).unwrap());
        drop(backup);

        assert_eq!(dest.table_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_backup_into_active_transaction_fails() {
        let src = source();
        let mut dest = Connection::open_in_memory().unwrap();
        dest.execute("BEGIN", ()).unwrap();

        let err = src.backup(&mut dest, 0, |_| {}).unwrap_err();
        assert!(matches!(err, Error::Transaction(_)));
    }
}
