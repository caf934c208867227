use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use museum_catalog::generation::{GenerationFailure, GenerationOutcome};
use museum_catalog::images::ImageResolver;
use museum_catalog::language::OutputField;
use museum_catalog::model::NO_VALID_IMAGE;
use museum_catalog::pipeline::{
    BatchOrchestrator, DEFAULT_INTER_CALL_DELAY, PipelineOptions, ProgressEvent, ProgressSink,
};
use museum_catalog::table::XlsxWorkbook;
use museum_catalog::{CatalogError, Language, RunMetrics};

mod support;

use support::{MemoryTable, ScriptedBackend, TestWorkspace, catalog_text, drain, fast_options};

const HEADERS: &[&str] = &["T1", "T13", "T3", "T2", "T5", "T14", "T6", "T8", "T7"];

#[tokio::test]
async fn xlsx_run_writes_one_row_per_object_for_every_language() {
    let workspace = TestWorkspace::new();
    let image = workspace.add_image("2023/foto.jpg");
    let input = workspace.create_input_workbook(
        "objekte.xlsx",
        HEADERS,
        &[&["2023/001", "foto.jpg", "Morsetaste", "", "", "", "", "", ""]],
    );
    let output = workspace.path("out/catalog.xlsx");

    let orchestrator = BatchOrchestrator::new(
        ScriptedBackend::echo(),
        ImageResolver::new(workspace.images_dir()),
        fast_options(vec![Language::Deutsch, Language::English]),
    );
    let (progress, mut rx) = ProgressSink::channel();
    let summary = orchestrator
        .run(
            &XlsxWorkbook::new(&input),
            &XlsxWorkbook::new(&output),
            &progress,
        )
        .await
        .expect("run succeeds");

    assert_eq!(summary.objects_processed, 1);
    assert_eq!(summary.generation_failures, 0);

    let calls = orchestrator.backend().calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].language, Language::Deutsch);
    assert_eq!(calls[1].language, Language::English);
    assert_eq!(calls[0].images.len(), 1);
    assert!(calls[0].images[0].ends_with("2023/foto.jpg"));
    assert_eq!(
        std::fs::canonicalize(&calls[0].images[0]).unwrap(),
        std::fs::canonicalize(&image).unwrap()
    );
    assert!(calls[0].prompt.contains("Write the content in Deutsch."));
    assert!(calls[0].prompt.contains("Title: Morsetaste\n"));
    assert!(calls[0].prompt.contains("Weight: nicht angegeben\n"));
    assert!(calls[1].prompt.contains("Weight: not specified\n"));

    let rows = support::read_workbook_rows(&output);
    assert_eq!(rows.len(), 2);
    let header = &rows[0];
    assert_eq!(header.len(), 2 + 7 * 2);
    assert_eq!(header[0], "Object ID");
    assert_eq!(header[1], "Images");
    assert_eq!(header[2], "Title_DE");
    assert_eq!(header[9], "Title_EN");

    let row = &rows[1];
    assert_eq!(row[0], "2023/001");
    assert_eq!(row[1], "foto.jpg");
    assert_eq!(row[2], "Objekt 2023/001");
    assert_eq!(row[3], "Werkstatt DE");
    assert_eq!(row[8], "Text DE. Zweite Zeile.");
    assert_eq!(row[10], "Werkstatt EN");
    assert_eq!(row[15], "Text EN. Zweite Zeile.");

    let events = drain(&mut rx);
    assert_eq!(events.first(), Some(&ProgressEvent::Loading {
        source: museum_catalog::utils::path_to_forward_slashes(&input),
    }));
    assert_eq!(events.last(), Some(&ProgressEvent::Finished));
    let completed = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::LanguageCompleted { generated: true, .. }))
        .count();
    assert_eq!(completed, 2);
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::Saved { .. })));
}

#[tokio::test]
async fn object_without_images_gets_marker_and_no_service_call() {
    let workspace = TestWorkspace::new();
    let table = MemoryTable::new(&["T1", "T13"], &[&["A-7", "notes.txt\nmissing.jpg"]]);

    let orchestrator = BatchOrchestrator::new(
        ScriptedBackend::echo(),
        ImageResolver::new(workspace.images_dir()),
        fast_options(vec![Language::Deutsch, Language::Polski]),
    );
    let (progress, mut rx) = ProgressSink::channel();
    let summary = orchestrator.run(&table, &table, &progress).await.unwrap();

    assert!(orchestrator.backend().calls().is_empty());
    assert_eq!(summary.objects_without_images, 1);
    assert_eq!(summary.missing_images, 1);

    let output = table.written().expect("table written");
    let row = &output.rows()[0];
    assert_eq!(row.images_cell(), "");
    for language in [Language::Deutsch, Language::Polski] {
        let fields = row.localized(language).unwrap();
        assert_eq!(fields.get(OutputField::Description), NO_VALID_IMAGE);
        assert_eq!(fields.get(OutputField::Title), "");
    }

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::MissingImage { path, .. } if path.ends_with("missing.jpg")
    )));
    assert!(events.contains(&ProgressEvent::NoValidImages {
        object_id: "A-7".into()
    }));
}

#[tokio::test]
async fn rows_group_by_trimmed_id_in_first_seen_order() {
    let workspace = TestWorkspace::new();
    workspace.add_image("b1.jpg");
    workspace.add_image("b2.png");
    workspace.add_image("a1.jpeg");
    workspace.add_image("x.jpg");

    let table = MemoryTable::new(
        &["t1", "t13", "t3"],
        &[
            &["B", "b1.jpg", "Erster Titel"],
            &[" A ", "a1.jpeg", ""],
            &["B ", "C:\\\\fotos\\\\b2.png", "Zweiter Titel"],
            &["  ", "x.jpg", "verworfen"],
        ],
    );

    let orchestrator = BatchOrchestrator::new(
        ScriptedBackend::echo(),
        ImageResolver::new(workspace.images_dir()),
        fast_options(vec![Language::English]),
    );
    let summary = orchestrator
        .run(&table, &table, &ProgressSink::log_only())
        .await
        .unwrap();
    assert_eq!(summary.objects_processed, 2);

    let output = table.written().unwrap();
    let ids: Vec<&str> = output.rows().iter().map(|r| r.object_id.as_str()).collect();
    assert_eq!(ids, vec!["B", "A"]);
    assert_eq!(output.rows()[0].images_cell(), "b1.jpg, b2.png");

    let calls = orchestrator.backend().calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].prompt.contains("Title: Erster Titel\n"));
    assert!(calls[1].prompt.contains("Title: not specified\n"));
}

#[tokio::test]
async fn missing_required_columns_abort_without_output() {
    let workspace = TestWorkspace::new();
    let table = MemoryTable::new(&["T1", "T3"], &[&["1", "Radio"]]);

    let orchestrator = BatchOrchestrator::new(
        ScriptedBackend::echo(),
        ImageResolver::new(workspace.images_dir()),
        fast_options(vec![Language::Deutsch]),
    );
    let (progress, mut rx) = ProgressSink::channel();
    let result = orchestrator.run(&table, &table, &progress).await;

    assert_matches!(result, Err(CatalogError::MissingColumns { ref missing }) if missing == &vec!["T13".to_string()]);
    assert!(table.written().is_none());
    assert!(orchestrator.backend().calls().is_empty());

    let events = drain(&mut rx);
    assert_eq!(events.last(), Some(&ProgressEvent::Finished));
    assert!(events.iter().any(|e| matches!(e, ProgressEvent::Aborted { .. })));
    assert!(!events.iter().any(|e| matches!(e, ProgressEvent::Saved { .. })));
}

#[tokio::test]
async fn unreadable_input_workbook_is_fatal() {
    let workspace = TestWorkspace::new();
    let input = workspace.path("not-there.xlsx");
    let output = workspace.path("out.xlsx");

    let orchestrator = BatchOrchestrator::new(
        ScriptedBackend::echo(),
        ImageResolver::new(workspace.images_dir()),
        fast_options(vec![Language::Deutsch]),
    );
    let result = orchestrator
        .run(
            &XlsxWorkbook::new(&input),
            &XlsxWorkbook::new(&output),
            &ProgressSink::log_only(),
        )
        .await;

    assert_matches!(result, Err(CatalogError::Table { action: "read", .. }));
    assert!(!output.exists());
}

#[tokio::test]
async fn generation_failure_text_lands_in_description() {
    let workspace = TestWorkspace::new();
    workspace.add_image("1999/a.png");
    let table = MemoryTable::new(&["T1", "T13"], &[&["1999/17", "a.png"]]);

    let backend = ScriptedBackend::new(|request| match request.language {
        Language::English => GenerationOutcome::Failed(GenerationFailure::RetriesExhausted),
        Language::Lithuanian => {
            GenerationOutcome::Failed(GenerationFailure::Api("HTTP 500: boom".into()))
        }
        other => GenerationOutcome::Generated(catalog_text("Radio", other)),
    });
    let metrics = Arc::new(RunMetrics::new());
    let orchestrator = BatchOrchestrator::new(
        backend,
        ImageResolver::new(workspace.images_dir()),
        fast_options(vec![Language::Deutsch, Language::English, Language::Lithuanian]),
    )
    .with_metrics(metrics.clone());

    let (progress, mut rx) = ProgressSink::channel();
    let summary = orchestrator.run(&table, &table, &progress).await.unwrap();
    assert_eq!(summary.generation_failures, 2);

    let output = table.written().unwrap();
    let row = &output.rows()[0];
    assert_eq!(
        row.localized(Language::Deutsch).unwrap().get(OutputField::Title),
        "Radio"
    );
    let english = row.localized(Language::English).unwrap();
    assert_eq!(english.get(OutputField::Description), "❌ Failed after retries.");
    assert_eq!(english.get(OutputField::Title), "");
    assert_eq!(
        row.localized(Language::Lithuanian)
            .unwrap()
            .get(OutputField::Description),
        "❌ API Error: HTTP 500: boom"
    );

    let events = drain(&mut rx);
    assert!(events.contains(&ProgressEvent::LanguageCompleted {
        object_id: "1999/17".into(),
        language: Language::English,
        generated: false,
    }));
    let exposition = metrics.encode().unwrap();
    assert!(exposition.contains("catalog_objects_total{outcome=\"generated\"} 1"));
}

#[tokio::test]
async fn repeated_languages_are_processed_once() {
    let workspace = TestWorkspace::new();
    workspace.add_image("a.jpg");
    let table = MemoryTable::new(&["T1", "T13"], &[&["1", "a.jpg"]]);

    let orchestrator = BatchOrchestrator::new(
        ScriptedBackend::echo(),
        ImageResolver::new(workspace.images_dir()),
        fast_options(vec![Language::Polski, Language::Polski, Language::Deutsch]),
    );
    orchestrator
        .run(&table, &table, &ProgressSink::log_only())
        .await
        .unwrap();

    assert_eq!(orchestrator.backend().calls().len(), 2);
    let output = table.written().unwrap();
    assert_eq!(output.schema().columns().len(), 2 + 7 * 2);
    assert_eq!(output.schema().columns()[2], "Title_PL");
}

#[tokio::test]
async fn empty_input_still_writes_header_row() {
    let workspace = TestWorkspace::new();
    let input = workspace.create_input_workbook("leer.xlsx", &["T1", "T13"], &[]);
    let output = workspace.path("leer-out.xlsx");

    let orchestrator = BatchOrchestrator::new(
        ScriptedBackend::echo(),
        ImageResolver::new(workspace.images_dir()),
        fast_options(vec![Language::English]),
    );
    let summary = orchestrator
        .run(
            &XlsxWorkbook::new(&input),
            &XlsxWorkbook::new(&output),
            &ProgressSink::log_only(),
        )
        .await
        .unwrap();

    assert_eq!(summary.objects_processed, 0);
    let rows = support::read_workbook_rows(&output);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].len(), 9);
}

#[tokio::test(start_paused = true)]
async fn default_options_pause_after_every_generation_call() {
    let workspace = TestWorkspace::new();
    workspace.add_image("a.jpg");
    workspace.add_image("b.jpg");
    let table = MemoryTable::new(
        &["T1", "T13"],
        &[&["1", "a.jpg"], &["2", "leer.txt"], &["3", "b.jpg"]],
    );

    let options = PipelineOptions {
        languages: vec![Language::Deutsch, Language::English],
        ..PipelineOptions::default()
    };
    assert_eq!(options.inter_call_delay, Duration::from_millis(1500));
    assert_eq!(options.inter_call_delay, DEFAULT_INTER_CALL_DELAY);

    let orchestrator = BatchOrchestrator::new(
        ScriptedBackend::echo(),
        ImageResolver::new(workspace.images_dir()),
        options,
    );
    let started = tokio::time::Instant::now();
    let summary = orchestrator
        .run(&table, &table, &ProgressSink::log_only())
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(summary.objects_without_images, 1);
    assert_eq!(orchestrator.backend().calls().len(), 4);
    // four calls, none for the object without images
    assert!(elapsed >= DEFAULT_INTER_CALL_DELAY * 4, "{elapsed:?}");
    assert!(elapsed < DEFAULT_INTER_CALL_DELAY * 5, "{elapsed:?}");
}
