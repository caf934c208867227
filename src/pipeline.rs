//! Batch orchestration: rows in, one catalog row per object out.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use indexmap::IndexMap;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{Instrument, error, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::generation::{GenerationBackend, GenerationOutcome, GenerationRequest};
use crate::images::{ImageResolution, ImageResolver};
use crate::language::{Language, OutputField, dedup_languages};
use crate::logging::run_span;
use crate::metrics::RunMetrics;
use crate::model::{
    LocalizedFields, ObjectContext, ObjectRecord, OutputRow, OutputSchema, OutputTable,
};
use crate::parser::parse_catalog_text;
use crate::prompt::build_prompt;
use crate::table::{ColumnMapping, TableSink, TableSource};
use crate::utils::{make_run_id, system_time_to_rfc3339};

pub const DEFAULT_INTER_CALL_DELAY: Duration = Duration::from_millis(1500);

/// Operator-facing progress of a run, in the order things happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Loading { source: String },
    Languages { languages: Vec<Language> },
    ObjectCount { count: usize },
    ObjectStarted { object_id: String },
    MissingImage { object_id: String, path: PathBuf },
    NoValidImages { object_id: String },
    LanguageCompleted {
        object_id: String,
        language: Language,
        generated: bool,
    },
    Saved { target: String },
    Aborted { reason: String },
    /// Always the last event of a run.
    Finished,
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProgressEvent::Loading { source } => write!(f, "📁 Loading table: {source}"),
            ProgressEvent::Languages { languages } => {
                let names: Vec<&str> = languages.iter().map(|l| l.name()).collect();
                write!(f, "🌍 Languages: {}", names.join(", "))
            }
            ProgressEvent::ObjectCount { count } => write!(f, "🔢 Objects: {count}"),
            ProgressEvent::ObjectStarted { object_id } => write!(f, "🔍 Object: {object_id}"),
            ProgressEvent::MissingImage { path, .. } => {
                write!(f, "⚠️ Image missing: {}", path.display())
            }
            ProgressEvent::NoValidImages { .. } => write!(f, "⚠️ No valid images, skipping"),
            ProgressEvent::LanguageCompleted {
                language,
                generated: true,
                ..
            } => write!(f, "   ✅ {language} done"),
            ProgressEvent::LanguageCompleted { language, .. } => {
                write!(f, "   ⚠️ {language} done with errors")
            }
            ProgressEvent::Saved { target } => write!(f, "📘 Saved to: {target}"),
            ProgressEvent::Aborted { reason } => write!(f, "❌ {reason}"),
            ProgressEvent::Finished => f.write_str("FINISHED"),
        }
    }
}

/// Sending half of the progress channel.
///
/// Every event is also logged. A dropped receiver is not an error.
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn channel() -> (Self, UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = unbounded_channel();
        (Self::new(tx), rx)
    }

    /// A sink that only logs.
    pub fn log_only() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        match &event {
            ProgressEvent::Aborted { .. } => error!(event = %event, "progress"),
            ProgressEvent::MissingImage { object_id, .. }
            | ProgressEvent::NoValidImages { object_id } => {
                warn!(object_id = %object_id, event = %event, "progress")
            }
            ProgressEvent::LanguageCompleted {
                object_id,
                generated: false,
                ..
            } => warn!(object_id = %object_id, event = %event, "progress"),
            _ => info!(event = %event, "progress"),
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub languages: Vec<Language>,
    pub columns: ColumnMapping,
    /// Pause after every generation call.
    pub inter_call_delay: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            languages: vec![Language::Deutsch],
            columns: ColumnMapping::default(),
            inter_call_delay: DEFAULT_INTER_CALL_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub run_id: String,
    pub started_at: String,
    pub objects_processed: usize,
    pub objects_without_images: usize,
    pub generation_failures: usize,
    pub missing_images: usize,
    pub output: String,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} objects ({} without images), {} failed generations, {} missing images in {:.1}s",
            self.objects_processed,
            self.objects_without_images,
            self.generation_failures,
            self.missing_images,
            self.elapsed.as_secs_f64()
        )
    }
}

struct ObjectGroup<'a> {
    context: ObjectContext,
    image_cells: Vec<&'a str>,
}

#[derive(Default)]
struct RunCounters {
    objects_without_images: usize,
    generation_failures: usize,
    missing_images: usize,
}

pub struct BatchOrchestrator<B> {
    backend: B,
    resolver: ImageResolver,
    options: PipelineOptions,
    metrics: Option<Arc<RunMetrics>>,
}

impl<B: GenerationBackend> BatchOrchestrator<B> {
    pub fn new(backend: B, resolver: ImageResolver, mut options: PipelineOptions) -> Self {
        options.languages = dedup_languages(options.languages);
        Self {
            backend,
            resolver,
            options,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RunMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Processes every object of `source` and writes the result to `sink`.
    ///
    /// Only run-level failures (unreadable input, missing identifier or
    /// image column, unwritable output) return `Err`; in that case nothing
    /// is written. `Finished` is emitted either way.
    pub async fn run<S, W>(
        &self,
        source: &S,
        sink: &W,
        progress: &ProgressSink,
    ) -> CatalogResult<RunSummary>
    where
        S: TableSource + ?Sized,
        W: TableSink + ?Sized,
    {
        let run_id = make_run_id();
        let span = run_span(&run_id);

        let result = self
            .run_inner(run_id, source, sink, progress)
            .instrument(span)
            .await;

        if let Err(err) = &result {
            error!(category = err.category(), error = %err, "catalog run aborted");
            progress.emit(ProgressEvent::Aborted {
                reason: err.to_string(),
            });
        }
        progress.emit(ProgressEvent::Finished);
        result
    }

    async fn run_inner<S, W>(
        &self,
        run_id: String,
        source: &S,
        sink: &W,
        progress: &ProgressSink,
    ) -> CatalogResult<RunSummary>
    where
        S: TableSource + ?Sized,
        W: TableSink + ?Sized,
    {
        let started = Instant::now();
        let started_at = system_time_to_rfc3339(SystemTime::now());

        if self.options.languages.is_empty() {
            return Err(CatalogError::InvalidConfig(
                "at least one language is required".into(),
            ));
        }

        progress.emit(ProgressEvent::Loading {
            source: source.source_name(),
        });
        let input = source.read_table()?;
        let columns = self.options.columns.resolve(&input)?;

        let mut groups: IndexMap<String, ObjectGroup<'_>> = IndexMap::new();
        for record in input.records() {
            let object_id = columns.object_id(&record);
            if object_id.is_empty() {
                continue;
            }
            groups
                .entry(object_id.to_string())
                .or_insert_with(|| ObjectGroup {
                    context: columns.context(&record),
                    image_cells: Vec::new(),
                })
                .image_cells
                .push(columns.images(&record));
        }

        progress.emit(ProgressEvent::Languages {
            languages: self.options.languages.clone(),
        });
        progress.emit(ProgressEvent::ObjectCount {
            count: groups.len(),
        });

        let mut table = OutputTable::new(OutputSchema::new(self.options.languages.clone()));
        let mut counters = RunCounters::default();

        for (object_id, group) in groups {
            let row = self
                .process_object(object_id, group, progress, &mut counters)
                .await;
            table.push(row);
        }

        sink.write_table(&table)?;
        let target = sink.target_name();
        progress.emit(ProgressEvent::Saved {
            target: target.clone(),
        });

        let summary = RunSummary {
            run_id,
            started_at,
            objects_processed: table.len(),
            objects_without_images: counters.objects_without_images,
            generation_failures: counters.generation_failures,
            missing_images: counters.missing_images,
            output: target,
            elapsed: started.elapsed(),
        };
        info!(summary = %summary, "catalog run complete");
        Ok(summary)
    }

    async fn process_object(
        &self,
        object_id: String,
        group: ObjectGroup<'_>,
        progress: &ProgressSink,
        counters: &mut RunCounters,
    ) -> OutputRow {
        progress.emit(ProgressEvent::ObjectStarted {
            object_id: object_id.clone(),
        });

        let mut resolution = ImageResolution::default();
        for cell in &group.image_cells {
            resolution.extend(self.resolver.resolve(cell, &object_id));
        }
        for path in &resolution.missing {
            progress.emit(ProgressEvent::MissingImage {
                object_id: object_id.clone(),
                path: path.clone(),
            });
        }
        counters.missing_images += resolution.missing.len();
        if let Some(metrics) = &self.metrics {
            metrics.record_missing_images(resolution.missing.len());
        }

        let record = ObjectRecord {
            object_id,
            images: resolution.found,
            context: group.context,
        };
        let mut row = OutputRow::new(record.object_id.clone(), record.image_file_names());

        if record.images.is_empty() {
            progress.emit(ProgressEvent::NoValidImages {
                object_id: record.object_id.clone(),
            });
            for &language in &self.options.languages {
                row.insert(language, LocalizedFields::no_valid_image());
            }
            counters.objects_without_images += 1;
            if let Some(metrics) = &self.metrics {
                metrics.record_object("no_images");
            }
            return row;
        }

        for &language in &self.options.languages {
            let request = GenerationRequest {
                object_id: &record.object_id,
                language,
                prompt: build_prompt(&record.object_id, &record.context, language),
                images: &record.images,
            };

            let outcome = self.backend.generate(&request).await;
            let generated = outcome.is_generated();
            let fields = match outcome {
                GenerationOutcome::Generated(text) => parse_catalog_text(&text).to_localized(),
                GenerationOutcome::Failed(failure) => {
                    counters.generation_failures += 1;
                    let mut fields = LocalizedFields::default();
                    fields.set(OutputField::Description, failure.to_string());
                    fields
                }
            };
            row.insert(language, fields);

            if !self.options.inter_call_delay.is_zero() {
                tokio::time::sleep(self.options.inter_call_delay).await;
            }
            progress.emit(ProgressEvent::LanguageCompleted {
                object_id: record.object_id.clone(),
                language,
                generated,
            });
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_object("generated");
        }
        row
    }
}
