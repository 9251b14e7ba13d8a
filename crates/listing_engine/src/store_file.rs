use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use tempfile::NamedTempFile;

use listing_core::FIELD_NAMES;

use crate::store::{CellWrite, RangeWrite, StoreError, TabularStore};

/// Local [`TabularStore`] backed by a JSON file holding the grid as rows
/// of strings. Used for offline runs and as the reference store in tests.
///
/// Every successful batch is flushed through a temp file in the target
/// directory and renamed over the destination, so a crash mid-write never
/// leaves a torn file behind.
pub struct JsonFileStore {
    path: PathBuf,
    grid: Mutex<Vec<Vec<String>>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading the existing grid or seeding a
    /// fresh one with the canonical header row.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let grid = if path.exists() {
            let text = std::fs::read_to_string(&path)
                .map_err(|err| StoreError::Permanent(format!("read {}: {err}", path.display())))?;
            serde_json::from_str(&text)
                .map_err(|err| StoreError::Permanent(format!("parse {}: {err}", path.display())))?
        } else {
            vec![FIELD_NAMES.iter().map(|name| name.to_string()).collect()]
        };
        Ok(Self {
            path,
            grid: Mutex::new(grid),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Vec<String>>>, StoreError> {
        self.grid
            .lock()
            .map_err(|_| StoreError::Permanent("store state poisoned".into()))
    }

    fn flush(&self, grid: &[Vec<String>]) -> Result<(), StoreError> {
        let parent = self.path.parent().unwrap_or_else(|| Path::new("."));
        let text = serde_json::to_string_pretty(grid)
            .map_err(|err| StoreError::Permanent(format!("serialize grid: {err}")))?;
        let mut file = NamedTempFile::new_in(parent)
            .map_err(|err| StoreError::Permanent(format!("create temp file: {err}")))?;
        file.write_all(text.as_bytes())
            .map_err(|err| StoreError::Permanent(format!("write temp file: {err}")))?;
        file.persist(&self.path)
            .map_err(|err| StoreError::Permanent(format!("replace {}: {err}", self.path.display())))?;
        Ok(())
    }
}

fn set_cell(grid: &mut Vec<Vec<String>>, row: usize, col: usize, value: &str) {
    while grid.len() < row {
        grid.push(Vec::new());
    }
    let cells = &mut grid[row - 1];
    if cells.len() < col {
        cells.resize(col, String::new());
    }
    cells[col - 1] = value.to_string();
}

#[async_trait]
impl TabularStore for JsonFileStore {
    async fn read_column(&self, col: usize) -> Result<Vec<String>, StoreError> {
        if col == 0 {
            return Err(StoreError::Permanent("column index is 1-based".into()));
        }
        let grid = self.lock()?;
        let mut values: Vec<String> = grid
            .iter()
            .map(|row| row.get(col - 1).cloned().unwrap_or_default())
            .collect();
        while values.last().is_some_and(String::is_empty) {
            values.pop();
        }
        Ok(values)
    }

    async fn read_cell(&self, row: usize, col: usize) -> Result<String, StoreError> {
        if row == 0 || col == 0 {
            return Err(StoreError::Permanent("cell coordinates are 1-based".into()));
        }
        let grid = self.lock()?;
        Ok(grid
            .get(row - 1)
            .and_then(|cells| cells.get(col - 1))
            .cloned()
            .unwrap_or_default())
    }

    async fn write_ranges(&self, writes: &[RangeWrite]) -> Result<(), StoreError> {
        let mut grid = self.lock()?;
        for write in writes {
            let width = write.range.last_col + 1 - write.range.first_col;
            if write.values.len() != width {
                return Err(StoreError::Permanent(format!(
                    "range {} expects {width} values, got {}",
                    write.range,
                    write.values.len()
                )));
            }
            for (offset, value) in write.values.iter().enumerate() {
                set_cell(
                    &mut grid,
                    write.range.row,
                    write.range.first_col + offset,
                    value,
                );
            }
        }
        self.flush(&grid)
    }

    async fn write_cells(&self, writes: &[CellWrite]) -> Result<(), StoreError> {
        let mut grid = self.lock()?;
        for write in writes {
            set_cell(&mut grid, write.address.row, write.address.col, &write.value);
        }
        self.flush(&grid)
    }
}
