use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use strum::{EnumIter, IntoEnumIterator};

use crate::language::{Language, OUTPUT_FIELD_COUNT, OutputField};

/// Description text for objects whose image references resolved to nothing.
pub const NO_VALID_IMAGE: &str = "❌ No valid image found";

pub const OBJECT_ID_COLUMN: &str = "Object ID";
pub const IMAGES_COLUMN: &str = "Images";

/// Labels the generation service is asked to answer with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter)]
pub enum CatalogField {
    Title,
    ObjectId,
    ManufacturerCollection,
    Date,
    Dimensions,
    Weight,
    Location,
    Description,
}

pub const CATALOG_FIELD_COUNT: usize = 8;

impl CatalogField {
    pub fn label(self) -> &'static str {
        match self {
            CatalogField::Title => "Title",
            CatalogField::ObjectId => "Object ID",
            CatalogField::ManufacturerCollection => "Manufacturer/Collection",
            CatalogField::Date => "Date",
            CatalogField::Dimensions => "Dimensions",
            CatalogField::Weight => "Weight",
            CatalogField::Location => "Location",
            CatalogField::Description => "Description",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        CatalogField::iter().find(|field| field.label().eq_ignore_ascii_case(label.trim()))
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// One parsed response: every label maps to a value, empty when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogEntry {
    values: [String; CATALOG_FIELD_COUNT],
}

impl CatalogEntry {
    pub fn get(&self, field: CatalogField) -> &str {
        &self.values[field.index()]
    }

    pub fn set(&mut self, field: CatalogField, value: impl Into<String>) {
        self.values[field.index()] = value.into();
    }

    pub fn iter(&self) -> impl Iterator<Item = (CatalogField, &str)> {
        CatalogField::iter().map(move |field| (field, self.get(field)))
    }

    /// Maps the parsed labels onto the seven per-language output columns.
    pub fn to_localized(&self) -> LocalizedFields {
        let mut fields = LocalizedFields::default();
        fields.set(OutputField::Title, self.get(CatalogField::Title));
        fields.set(
            OutputField::Manufacturer,
            self.get(CatalogField::ManufacturerCollection),
        );
        fields.set(OutputField::Date, self.get(CatalogField::Date));
        fields.set(OutputField::Dimensions, self.get(CatalogField::Dimensions));
        fields.set(OutputField::Weight, self.get(CatalogField::Weight));
        fields.set(OutputField::Location, self.get(CatalogField::Location));
        fields.set(OutputField::Description, self.get(CatalogField::Description));
        fields
    }
}

/// Renders the entry in the same `Label: value` form the parser reads.
impl fmt::Display for CatalogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (field, value) in self.iter() {
            writeln!(f, "{}: {}", field.label(), value)?;
        }
        Ok(())
    }
}

/// Descriptive metadata taken from the first spreadsheet row of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectContext {
    pub title: Option<String>,
    pub manufacturer: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub weight: Option<String>,
    pub location: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRecord {
    pub object_id: String,
    pub images: Vec<PathBuf>,
    pub context: ObjectContext,
}

impl ObjectRecord {
    pub fn image_file_names(&self) -> Vec<String> {
        self.images
            .iter()
            .map(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// The seven output values of one language for one object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalizedFields {
    values: [String; OUTPUT_FIELD_COUNT],
}

impl LocalizedFields {
    pub fn no_valid_image() -> Self {
        let mut fields = Self::default();
        fields.set(OutputField::Description, NO_VALID_IMAGE);
        fields
    }

    pub fn get(&self, field: OutputField) -> &str {
        &self.values[field.index()]
    }

    pub fn set(&mut self, field: OutputField, value: impl Into<String>) {
        self.values[field.index()] = value.into();
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRow {
    pub object_id: String,
    pub images: Vec<String>,
    localized: IndexMap<Language, LocalizedFields>,
}

impl OutputRow {
    pub fn new(object_id: impl Into<String>, images: Vec<String>) -> Self {
        Self {
            object_id: object_id.into(),
            images,
            localized: IndexMap::new(),
        }
    }

    pub fn insert(&mut self, language: Language, fields: LocalizedFields) {
        self.localized.insert(language, fields);
    }

    pub fn localized(&self, language: Language) -> Option<&LocalizedFields> {
        self.localized.get(&language)
    }

    pub fn images_cell(&self) -> String {
        self.images.join(", ")
    }
}

/// Column layout of the output workbook, fixed for the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSchema {
    languages: Vec<Language>,
}

impl OutputSchema {
    pub fn new(languages: Vec<Language>) -> Self {
        Self { languages }
    }

    pub fn languages(&self) -> &[Language] {
        &self.languages
    }

    pub fn columns(&self) -> Vec<String> {
        let mut columns = Vec::with_capacity(2 + OUTPUT_FIELD_COUNT * self.languages.len());
        columns.push(OBJECT_ID_COLUMN.to_string());
        columns.push(IMAGES_COLUMN.to_string());
        for &language in &self.languages {
            columns.extend(OutputField::iter().map(|field| field.column_name(language)));
        }
        columns
    }

    /// Flattens a row into cells aligned with [`OutputSchema::columns`].
    pub fn cells(&self, row: &OutputRow) -> Vec<String> {
        let empty = LocalizedFields::default();
        let mut cells = Vec::with_capacity(2 + OUTPUT_FIELD_COUNT * self.languages.len());
        cells.push(row.object_id.clone());
        cells.push(row.images_cell());
        for &language in &self.languages {
            let fields = row.localized(language).unwrap_or(&empty);
            cells.extend(OutputField::iter().map(|field| fields.get(field).to_string()));
        }
        cells
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTable {
    schema: OutputSchema,
    rows: Vec<OutputRow>,
}

impl OutputTable {
    pub fn new(schema: OutputSchema) -> Self {
        Self {
            schema,
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: OutputRow) {
        self.rows.push(row);
    }

    pub fn schema(&self) -> &OutputSchema {
        &self.schema
    }

    pub fn rows(&self) -> &[OutputRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = Vec<String>> + '_ {
        self.rows.iter().map(|row| self.schema.cells(row))
    }
}
