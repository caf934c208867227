//! Tabular input and output.
//!
//! The pipeline reads rows through [`TableSource`] and writes the finished
//! [`OutputTable`] through [`TableSink`]; [`XlsxWorkbook`] implements both
//! on top of `umya-spreadsheet`.

use std::path::{Path, PathBuf};

use anyhow::anyhow;
use serde::Deserialize;
use tracing::debug;
use umya_spreadsheet::Worksheet;

use crate::error::{CatalogError, CatalogResult};
use crate::model::{ObjectContext, OutputTable};
use crate::utils::{cell_address, path_to_forward_slashes};

/// Header row plus data rows, every cell as text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl InputTable {
    pub fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self { headers, rows }
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|header| header == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|cells| Record { cells })
    }
}

/// One data row.
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    cells: &'a [String],
}

impl<'a> Record<'a> {
    /// Cell text, empty when the row is shorter than the header.
    pub fn get(&self, column: usize) -> &'a str {
        self.cells.get(column).map_or("", String::as_str)
    }

    /// Cell text when the column exists and the cell is not blank.
    pub fn text(&self, column: Option<usize>) -> Option<&'a str> {
        let value = self.get(column?);
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

pub trait TableSource {
    /// Where the rows come from, for progress messages.
    fn source_name(&self) -> String;
    fn read_table(&self) -> CatalogResult<InputTable>;
}

pub trait TableSink {
    /// Where the table goes, for progress messages.
    fn target_name(&self) -> String;
    fn write_table(&self, table: &OutputTable) -> CatalogResult<()>;
}

/// Input column names. Each is tried verbatim first, then in lower case.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ColumnMapping {
    pub object_id: String,
    pub images: String,
    pub title: String,
    pub manufacturer: String,
    pub description: String,
    pub date: String,
    pub weight: String,
    pub location: String,
    pub notes: String,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            object_id: "T1".into(),
            images: "T13".into(),
            title: "T3".into(),
            manufacturer: "T2".into(),
            description: "T5".into(),
            date: "T14".into(),
            weight: "T6".into(),
            location: "T8".into(),
            notes: "T7".into(),
        }
    }
}

fn find_column(table: &InputTable, name: &str) -> Option<usize> {
    table
        .column(name)
        .or_else(|| table.column(&name.to_lowercase()))
}

fn find_context_column(table: &InputTable, name: &str) -> ContextColumn {
    let lower = name.to_lowercase();
    let exact = table.column(name);
    ContextColumn {
        exact,
        lower: table.column(&lower).filter(|&index| Some(index) != exact),
    }
}

/// A context column, possibly present under both spellings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContextColumn {
    pub exact: Option<usize>,
    pub lower: Option<usize>,
}

impl ContextColumn {
    pub fn is_present(&self) -> bool {
        self.exact.is_some() || self.lower.is_some()
    }

    /// First non-blank value, exact spelling first.
    pub fn text<'a>(&self, record: &Record<'a>) -> Option<&'a str> {
        record.text(self.exact).or_else(|| record.text(self.lower))
    }
}

impl ColumnMapping {
    /// Locates every configured column in `table`.
    ///
    /// Fails with [`CatalogError::MissingColumns`] when the identifier or
    /// image column is absent; the context columns are optional.
    pub fn resolve(&self, table: &InputTable) -> CatalogResult<ResolvedColumns> {
        let object_id = find_column(table, &self.object_id);
        let images = find_column(table, &self.images);

        let (Some(object_id), Some(images)) = (object_id, images) else {
            let mut missing = Vec::new();
            if object_id.is_none() {
                missing.push(self.object_id.clone());
            }
            if images.is_none() {
                missing.push(self.images.clone());
            }
            return Err(CatalogError::MissingColumns { missing });
        };

        Ok(ResolvedColumns {
            object_id,
            images,
            title: find_context_column(table, &self.title),
            manufacturer: find_context_column(table, &self.manufacturer),
            description: find_context_column(table, &self.description),
            date: find_context_column(table, &self.date),
            weight: find_context_column(table, &self.weight),
            location: find_context_column(table, &self.location),
            notes: find_context_column(table, &self.notes),
        })
    }
}

/// Column indexes of one particular input table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedColumns {
    pub object_id: usize,
    pub images: usize,
    pub title: ContextColumn,
    pub manufacturer: ContextColumn,
    pub description: ContextColumn,
    pub date: ContextColumn,
    pub weight: ContextColumn,
    pub location: ContextColumn,
    pub notes: ContextColumn,
}

impl ResolvedColumns {
    pub fn object_id<'a>(&self, record: &Record<'a>) -> &'a str {
        record.get(self.object_id).trim()
    }

    pub fn images<'a>(&self, record: &Record<'a>) -> &'a str {
        record.get(self.images)
    }

    pub fn context(&self, record: &Record<'_>) -> ObjectContext {
        let text = |column: &ContextColumn| column.text(record).map(str::to_string);
        ObjectContext {
            title: text(&self.title),
            manufacturer: text(&self.manufacturer),
            description: text(&self.description),
            date: text(&self.date),
            weight: text(&self.weight),
            location: text(&self.location),
            notes: text(&self.notes),
        }
    }
}

/// An `.xlsx` file on disk, used as input or output.
#[derive(Debug, Clone)]
pub struct XlsxWorkbook {
    path: PathBuf,
}

impl XlsxWorkbook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn cell_text(sheet: &Worksheet, column: u32, row: u32) -> String {
    sheet
        .get_cell(cell_address(column, row).as_str())
        .map(|cell| cell.get_formatted_value())
        .unwrap_or_default()
}

impl TableSource for XlsxWorkbook {
    fn source_name(&self) -> String {
        path_to_forward_slashes(&self.path)
    }

    fn read_table(&self) -> CatalogResult<InputTable> {
        let book = umya_spreadsheet::reader::xlsx::read(&self.path)
            .map_err(|e| CatalogError::read_table(&self.path, anyhow!("{e}")))?;
        let sheet = book
            .get_sheet_collection()
            .first()
            .ok_or_else(|| CatalogError::read_table(&self.path, "workbook has no worksheets"))?;

        let (max_col, max_row) = sheet.get_highest_column_and_row();
        if max_row == 0 {
            return Ok(InputTable::default());
        }

        let headers: Vec<String> = (1..=max_col)
            .map(|col| cell_text(sheet, col, 1).trim().to_string())
            .collect();

        let mut rows: Vec<Vec<String>> = (2..=max_row)
            .map(|row| (1..=max_col).map(|col| cell_text(sheet, col, row)).collect())
            .collect();
        while rows
            .last()
            .is_some_and(|cells: &Vec<String>| cells.iter().all(|cell| cell.trim().is_empty()))
        {
            rows.pop();
        }

        debug!(
            path = %self.path.display(),
            columns = headers.len(),
            rows = rows.len(),
            "read input table"
        );
        Ok(InputTable::new(headers, rows))
    }
}

impl TableSink for XlsxWorkbook {
    fn target_name(&self) -> String {
        path_to_forward_slashes(&self.path)
    }

    fn write_table(&self, table: &OutputTable) -> CatalogResult<()> {
        let mut book = umya_spreadsheet::new_file();
        let sheet = book
            .get_sheet_by_name_mut("Sheet1")
            .ok_or_else(|| CatalogError::write_table(&self.path, "new workbook has no sheet"))?;

        for (idx, column) in table.schema().columns().into_iter().enumerate() {
            sheet
                .get_cell_mut(cell_address(idx as u32 + 1, 1).as_str())
                .set_value_string(column);
        }
        for (row_idx, cells) in table.records().enumerate() {
            let row = row_idx as u32 + 2;
            for (col_idx, value) in cells.into_iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                sheet
                    .get_cell_mut(cell_address(col_idx as u32 + 1, row).as_str())
                    .set_value_string(value);
            }
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CatalogError::write_table(&self.path, e))?;
        }
        umya_spreadsheet::writer::xlsx::write(&book, &self.path)
            .map_err(|e| CatalogError::write_table(&self.path, anyhow!("{e}")))?;

        debug!(path = %self.path.display(), rows = table.len(), "wrote output table");
        Ok(())
    }
}
