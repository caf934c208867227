#![allow(dead_code)]

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use museum_catalog::generation::{GenerationBackend, GenerationOutcome, GenerationRequest};
use museum_catalog::model::OutputTable;
use museum_catalog::pipeline::{PipelineOptions, ProgressEvent};
use museum_catalog::table::{InputTable, TableSink, TableSource};
use museum_catalog::{CatalogResult, Language};
use parking_lot::Mutex;
use tempfile::{TempDir, tempdir};
use tokio::sync::mpsc::UnboundedReceiver;
use umya_spreadsheet::{self, Spreadsheet};

pub fn write_workbook_to_path<F>(path: &Path, f: F)
where
    F: FnOnce(&mut Spreadsheet),
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create dir");
    }
    let mut book = umya_spreadsheet::new_file();
    f(&mut book);
    umya_spreadsheet::writer::xlsx::write(&book, path).expect("write workbook");
}

/// Reads the first sheet of `path` as rows of cell text.
pub fn read_workbook_rows(path: &Path) -> Vec<Vec<String>> {
    let book = umya_spreadsheet::reader::xlsx::read(path).expect("read workbook");
    let sheet = &book.get_sheet_collection()[0];
    let (max_col, max_row) = sheet.get_highest_column_and_row();
    (1..=max_row)
        .map(|row| {
            (1..=max_col)
                .map(|col| {
                    sheet
                        .get_cell((col, row))
                        .map(|cell| cell.get_value().to_string())
                        .unwrap_or_default()
                })
                .collect()
        })
        .collect()
}

pub struct TestWorkspace {
    _tempdir: TempDir,
    root: PathBuf,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let tempdir = tempdir().expect("tempdir");
        let root = tempdir.path().to_path_buf();
        Self {
            _tempdir: tempdir,
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub fn create_workbook<F>(&self, name: &str, f: F) -> PathBuf
    where
        F: FnOnce(&mut Spreadsheet),
    {
        let path = self.path(name);
        write_workbook_to_path(&path, f);
        path
    }

    /// Writes a one-sheet workbook with `headers` in row 1.
    pub fn create_input_workbook(&self, name: &str, headers: &[&str], rows: &[&[&str]]) -> PathBuf {
        self.create_workbook(name, |book| {
            let sheet = book.get_sheet_by_name_mut("Sheet1").unwrap();
            for (col, header) in headers.iter().enumerate() {
                sheet
                    .get_cell_mut((col as u32 + 1, 1))
                    .set_value_string(*header);
            }
            for (row_idx, row) in rows.iter().enumerate() {
                for (col, value) in row.iter().enumerate() {
                    if value.is_empty() {
                        continue;
                    }
                    sheet
                        .get_cell_mut((col as u32 + 1, row_idx as u32 + 2))
                        .set_value_string(*value);
                }
            }
        })
    }

    /// Creates an image file under the workspace's `images/` root.
    pub fn add_image(&self, relative: &str) -> PathBuf {
        let path = self.images_dir().join(relative);
        touch_file(&path);
        path
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }
}

pub fn touch_file(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create dir");
    }
    std::fs::write(path, b"test").expect("write file");
}

pub fn fast_options(languages: Vec<Language>) -> PipelineOptions {
    PipelineOptions {
        languages,
        inter_call_delay: std::time::Duration::ZERO,
        ..PipelineOptions::default()
    }
}

/// Label-formatted text as the service would return it.
pub fn catalog_text(title: &str, language: Language) -> String {
    format!(
        "Title: {title}\nObject ID: ignored\nManufacturer/Collection: Werkstatt {code}\nDate: 1910\nDimensions: 10 x 20 cm\nWeight: 1 kg\nLocation: Depot\nDescription: Text {code}.\nZweite Zeile.",
        code = language.code()
    )
}

pub fn drain(rx: &mut UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub object_id: String,
    pub language: Language,
    pub prompt: String,
    pub images: Vec<PathBuf>,
}

type Responder = Box<dyn Fn(&GenerationRequest<'_>) -> GenerationOutcome + Send + Sync>;

/// Backend that answers from a closure and records every request.
pub struct ScriptedBackend {
    respond: Responder,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedBackend {
    pub fn new<F>(respond: F) -> Self
    where
        F: Fn(&GenerationRequest<'_>) -> GenerationOutcome + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers every request with [`catalog_text`] titled after the object id.
    pub fn echo() -> Self {
        Self::new(|request| {
            GenerationOutcome::Generated(catalog_text(
                &format!("Objekt {}", request.object_id),
                request.language,
            ))
        })
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn generate(&self, request: &GenerationRequest<'_>) -> GenerationOutcome {
        self.calls.lock().push(RecordedCall {
            object_id: request.object_id.to_string(),
            language: request.language,
            prompt: request.prompt.clone(),
            images: request.images.to_vec(),
        });
        (self.respond)(request)
    }
}

/// In-memory table used as both input and output.
pub struct MemoryTable {
    input: InputTable,
    written: Mutex<Option<OutputTable>>,
}

impl MemoryTable {
    pub fn new(headers: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            input: InputTable::new(
                headers.iter().map(|h| h.to_string()).collect(),
                rows.iter()
                    .map(|row| row.iter().map(|c| c.to_string()).collect())
                    .collect(),
            ),
            written: Mutex::new(None),
        }
    }

    pub fn written(&self) -> Option<OutputTable> {
        self.written.lock().clone()
    }
}

impl TableSource for MemoryTable {
    fn source_name(&self) -> String {
        "memory".to_string()
    }

    fn read_table(&self) -> CatalogResult<InputTable> {
        Ok(self.input.clone())
    }
}

impl TableSink for MemoryTable {
    fn target_name(&self) -> String {
        "memory".to_string()
    }

    fn write_table(&self, table: &OutputTable) -> CatalogResult<()> {
        *self.written.lock() = Some(table.clone());
        Ok(())
    }
}
