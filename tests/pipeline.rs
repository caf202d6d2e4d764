//! Integration tests for the batch runner.
//!
//! Network and pdfium are replaced by in-memory fakes so these run anywhere:
//! `FakeFetcher` writes a small `%PDF` file (or fails for chosen ids) and
//! `FakeExtractor` turns it into two pages of text (or fails for chosen ids).

use paper2txt::output::{FULLTEXT_MARKER, METADATA_MARKER};
use paper2txt::{
    status, BatchError, BatchRunner, ExtractedText, FailureKind, Fetch, OutputDocument, PageText,
    PaperRecord, RecordError, RunConfig, RunProgressCallback, RunSummary, TextExtractor,
    TextSource,
};
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct FakeFetcher {
    /// Ids that always fail retrieval.
    failing: HashSet<String>,
    /// Ids that fail retrieval this many more times before succeeding.
    flaky: Arc<Mutex<HashMap<String, usize>>>,
    calls: Arc<AtomicUsize>,
}

impl FakeFetcher {
    fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn flaky(id: &str, failures: usize) -> Self {
        let fetcher = Self::default();
        fetcher
            .flaky
            .lock()
            .unwrap()
            .insert(id.to_string(), failures);
        fetcher
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetch for FakeFetcher {
    async fn fetch(&self, id: &str, dest: &Path) -> Result<u64, RecordError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let flaky_failure = {
            let mut flaky = self.flaky.lock().unwrap();
            match flaky.get_mut(id) {
                Some(n) if *n > 0 => {
                    *n -= 1;
                    true
                }
                _ => false,
            }
        };

        if self.failing.contains(id) || flaky_failure {
            // Leave a partial body behind, as an interrupted download would.
            tokio::fs::write(dest, b"%PDF-1.4 trunc").await.unwrap();
            return Err(RecordError::retrieval(id, "HTTP 404 Not Found"));
        }

        let body = format!("%PDF-1.4\n% fake document for {id}\n");
        tokio::fs::write(dest, body.as_bytes()).await.unwrap();
        Ok(body.len() as u64)
    }
}

#[derive(Clone, Default)]
struct FakeExtractor {
    failing: HashSet<String>,
    calls: Arc<AtomicUsize>,
    seen_paths: Arc<Mutex<Vec<PathBuf>>>,
}

impl FakeExtractor {
    fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextExtractor for FakeExtractor {
    fn extract(&self, id: &str, path: &Path) -> Result<ExtractedText, RecordError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_paths.lock().unwrap().push(path.to_path_buf());

        let bytes = std::fs::read(path).map_err(|e| RecordError::extraction(id, e.to_string()))?;
        assert!(bytes.starts_with(b"%PDF"), "extractor got a non-PDF artifact");

        if self.failing.contains(id) {
            return Err(RecordError::extraction(id, "no extractable text on any of 2 pages"));
        }
        Ok(ExtractedText::new(vec![
            PageText {
                page_num: 1,
                lines: vec![format!("Title of {id}"), "Abstract".to_string()],
                source: TextSource::Native,
            },
            PageText {
                page_num: 2,
                lines: vec!["Conclusion".to_string()],
                source: TextSource::Layout,
            },
        ]))
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn record(id: &str) -> PaperRecord {
    let fields: Map<String, Value> = json!({
        "id": id,
        "title": format!("Paper {id}"),
        "authors": "Ada Lovelace, Alan Turing",
        "categories": "cs.LG cs.CL",
        "abstract": "We study things. Ünïcödé stays verbatim."
    })
    .as_object()
    .cloned()
    .unwrap();
    PaperRecord::from_fields(fields, "id").unwrap()
}

fn records(ids: &[&str]) -> Vec<PaperRecord> {
    ids.iter().map(|id| record(id)).collect()
}

fn config(dir: &TempDir) -> RunConfig {
    RunConfig::builder()
        .output_dir(dir.path())
        .burst_size(64)
        .window_ms(10)
        .build()
        .unwrap()
}

fn checkpoint_lines(config: &RunConfig) -> Vec<String> {
    std::fs::read_to_string(config.checkpoint_path())
        .unwrap_or_default()
        .lines()
        .map(str::to_string)
        .collect()
}

/// Files in `dir` with the given extension.
fn files_with_extension(dir: &Path, ext: &str) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|e| e == ext))
        .collect()
}

async fn run(
    config: &RunConfig,
    fetcher: &FakeFetcher,
    extractor: &FakeExtractor,
    input: &[PaperRecord],
) -> Result<RunSummary, BatchError> {
    BatchRunner::new(config.clone(), fetcher.clone(), extractor.clone())
        .run(input)
        .await
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn four_records_one_retrieval_failure() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let fetcher = FakeFetcher::failing(&["2412.00003"]);
    let extractor = FakeExtractor::default();
    let input = records(&["2412.00001", "2412.00002", "2412.00003", "2412.00004"]);

    let summary = run(&config, &fetcher, &extractor, &input).await.unwrap();

    assert_eq!(summary.total_records, 4);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.retrieval_failures, 1);
    assert_eq!(format!("{:.2}", summary.completion_rate().unwrap()), "75.00");
    assert!(summary.to_string().ends_with("75.00%"), "got: {summary}");
    assert_eq!(summary.failures[0].id, "2412.00003");
    assert_eq!(summary.failures[0].kind, FailureKind::Retrieval);

    assert_eq!(
        checkpoint_lines(&config),
        vec!["2412.00001", "2412.00002", "2412.00004"]
    );
    assert!(config.output_path("2412.00001").exists());
    assert!(!config.output_path("2412.00003").exists());
    assert_eq!(fetcher.calls(), 4);
    assert_eq!(extractor.calls(), 3);
}

#[tokio::test]
async fn second_run_resumes_without_any_work() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let input = records(&["a1", "a2", "a3"]);

    let first = run(&config, &FakeFetcher::default(), &FakeExtractor::default(), &input)
        .await
        .unwrap();
    assert_eq!(first.processed, 3);
    let before = std::fs::read_to_string(config.output_path("a2")).unwrap();
    let modified = std::fs::metadata(config.output_path("a2")).unwrap().modified().unwrap();

    let fetcher = FakeFetcher::default();
    let extractor = FakeExtractor::default();
    let second = run(&config, &fetcher, &extractor, &input).await.unwrap();

    assert_eq!(fetcher.calls(), 0);
    assert_eq!(extractor.calls(), 0);
    assert_eq!(second.processed, checkpoint_lines(&config).len());
    assert_eq!(second.resumed, 3);
    assert_eq!(second.newly_processed(), 0);
    assert_eq!(second.failed, 0);
    assert_eq!(std::fs::read_to_string(config.output_path("a2")).unwrap(), before);
    assert_eq!(
        std::fs::metadata(config.output_path("a2")).unwrap().modified().unwrap(),
        modified
    );
}

#[tokio::test]
async fn failures_leave_no_artifacts_or_documents() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let fetcher = FakeFetcher::failing(&["fetch-fails"]);
    let extractor = FakeExtractor::failing(&["extract-fails"]);
    let input = records(&["fetch-fails", "extract-fails", "ok"]);

    let summary = run(&config, &fetcher, &extractor, &input).await.unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.retrieval_failures, 1);
    assert_eq!(summary.extraction_failures, 1);
    assert!(files_with_extension(dir.path(), "pdf").is_empty());
    assert!(files_with_extension(dir.path(), "tmp").is_empty());
    assert!(!config.output_path("fetch-fails").exists());
    assert!(!config.output_path("extract-fails").exists());
    assert_eq!(files_with_extension(dir.path(), "txt").len(), 1);

    // The artifact the extractor saw was gone before the next record began.
    for path in extractor.seen_paths.lock().unwrap().iter() {
        assert!(!path.exists(), "{} left behind", path.display());
    }
}

#[tokio::test]
async fn artifacts_go_to_the_artifact_dir() {
    let out = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    let config = RunConfig::builder()
        .output_dir(out.path())
        .artifact_dir(scratch.path())
        .window_ms(10)
        .build()
        .unwrap();
    let extractor = FakeExtractor::default();

    run(&config, &FakeFetcher::default(), &extractor, &records(&["x"]))
        .await
        .unwrap();

    let seen = extractor.seen_paths.lock().unwrap().clone();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].starts_with(scratch.path()));
    assert!(std::fs::read_dir(scratch.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn output_document_round_trips() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let input = records(&["1706.03762"]);

    run(&config, &FakeFetcher::default(), &FakeExtractor::default(), &input)
        .await
        .unwrap();

    let content = std::fs::read_to_string(config.output_path("1706.03762")).unwrap();
    assert!(content.starts_with(&format!("{METADATA_MARKER}\n{{\n  \"id\": \"1706.03762\"")));
    assert!(content.contains(&format!("\n{FULLTEXT_MARKER}\n")));
    assert!(content.contains("Ünïcödé stays verbatim"), "non-ASCII must not be escaped");

    let doc = OutputDocument::parse(&content).unwrap();
    assert_eq!(&doc.metadata, input[0].fields());
    assert_eq!(doc.text, "Title of 1706.03762\nAbstract\n\n\nConclusion");
}

#[tokio::test]
async fn old_style_identifiers_get_flat_file_names() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);

    let summary = run(
        &config,
        &FakeFetcher::default(),
        &FakeExtractor::default(),
        &records(&["cs/0601001"]),
    )
    .await
    .unwrap();

    assert_eq!(summary.processed, 1);
    assert!(dir.path().join("cs_0601001.txt").exists());
    assert_eq!(checkpoint_lines(&config), vec!["cs/0601001"]);
}

#[tokio::test]
async fn persistence_failure_is_counted_and_run_continues() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    // A directory where the output document should go makes the rename fail.
    std::fs::create_dir(config.output_path("blocked")).unwrap();
    let fetcher = FakeFetcher::default();
    let input = records(&["blocked", "after"]);

    let summary = run(&config, &fetcher, &FakeExtractor::default(), &input)
        .await
        .unwrap();

    assert_eq!(summary.persistence_failures, 1);
    assert_eq!(summary.processed, 1);
    assert_eq!(checkpoint_lines(&config), vec!["after"]);
    assert!(files_with_extension(dir.path(), "tmp").is_empty());
    assert!(files_with_extension(dir.path(), "pdf").is_empty());
    assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn persistence_failure_halts_when_configured() {
    let dir = TempDir::new().unwrap();
    let mut config = config(&dir);
    config.halt_on_persistence_error = true;
    std::fs::create_dir(config.output_path("blocked")).unwrap();
    let fetcher = FakeFetcher::default();
    let input = records(&["first", "blocked", "never"]);

    let err = run(&config, &fetcher, &FakeExtractor::default(), &input)
        .await
        .unwrap_err();

    match err {
        BatchError::PersistenceHalted(e) => {
            assert_eq!(e.id(), "blocked");
            assert_eq!(e.kind(), FailureKind::Persistence);
        }
        other => panic!("expected PersistenceHalted, got {other:?}"),
    }
    assert_eq!(fetcher.calls(), 2);
    assert_eq!(checkpoint_lines(&config), vec!["first"]);
    assert!(files_with_extension(dir.path(), "pdf").is_empty());
}

#[tokio::test]
async fn retrieval_is_retried_with_backoff() {
    let dir = TempDir::new().unwrap();
    let config = RunConfig::builder()
        .output_dir(dir.path())
        .window_ms(10)
        .max_retries(2)
        .retry_backoff_ms(1)
        .build()
        .unwrap();
    let fetcher = FakeFetcher::flaky("flaky", 2);

    let summary = run(&config, &fetcher, &FakeExtractor::default(), &records(&["flaky"]))
        .await
        .unwrap();

    assert_eq!(summary.processed, 1);
    assert_eq!(summary.failed, 0);
    assert_eq!(fetcher.calls(), 3);
    assert!(files_with_extension(dir.path(), "pdf").is_empty());
}

#[tokio::test]
async fn no_retries_by_default_and_extraction_is_never_retried() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let fetcher = FakeFetcher::flaky("flaky", 1);
    let summary = run(&config, &fetcher, &FakeExtractor::default(), &records(&["flaky"]))
        .await
        .unwrap();
    assert_eq!(summary.failed, 1);
    assert_eq!(fetcher.calls(), 1);

    let dir = TempDir::new().unwrap();
    let mut config = self::config(&dir);
    config.max_retries = 3;
    let fetcher = FakeFetcher::default();
    let extractor = FakeExtractor::failing(&["broken"]);
    let summary = run(&config, &fetcher, &extractor, &records(&["broken"]))
        .await
        .unwrap();
    assert_eq!(summary.extraction_failures, 1);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(extractor.calls(), 1);
}

#[tokio::test]
async fn duplicate_ids_are_processed_once() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let fetcher = FakeFetcher::default();

    let summary = run(
        &config,
        &fetcher,
        &FakeExtractor::default(),
        &records(&["dup", "other", "dup"]),
    )
    .await
    .unwrap();

    assert_eq!(fetcher.calls(), 2);
    assert_eq!(summary.processed, 3);
    assert_eq!(summary.resumed, 1);
    assert_eq!(checkpoint_lines(&config), vec!["dup", "other"]);
}

#[tokio::test]
async fn resume_disabled_reprocesses_everything() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let input = records(&["r1", "r2"]);
    run(&config, &FakeFetcher::default(), &FakeExtractor::default(), &input)
        .await
        .unwrap();

    let mut fresh = config.clone();
    fresh.resume = false;
    let fetcher = FakeFetcher::default();
    let summary = run(&fresh, &fetcher, &FakeExtractor::default(), &input)
        .await
        .unwrap();

    assert_eq!(fetcher.calls(), 2);
    assert_eq!(summary.resumed, 0);
    assert_eq!(checkpoint_lines(&config), vec!["r1", "r2", "r1", "r2"]);
}

#[tokio::test]
async fn torn_checkpoint_line_is_reprocessed() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    std::fs::write(config.checkpoint_path(), "t1\nt2").unwrap();
    let fetcher = FakeFetcher::default();

    let summary = run(&config, &fetcher, &FakeExtractor::default(), &records(&["t1", "t2"]))
        .await
        .unwrap();

    assert_eq!(summary.resumed, 1);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(checkpoint_lines(&config), vec!["t1", "t2"]);
}

#[tokio::test]
async fn fetches_respect_the_rate_limit() {
    let dir = TempDir::new().unwrap();
    let config = RunConfig::builder()
        .output_dir(dir.path())
        .burst_size(2)
        .window_ms(150)
        .build()
        .unwrap();
    let start = Instant::now();

    run(
        &config,
        &FakeFetcher::default(),
        &FakeExtractor::default(),
        &records(&["p1", "p2", "p3", "p4", "p5"]),
    )
    .await
    .unwrap();

    // Five fetches with two per window need at least two full windows.
    assert!(start.elapsed() >= Duration::from_millis(300));
}

#[tokio::test]
async fn status_reports_pending_records() {
    let dir = TempDir::new().unwrap();
    let config = config(&dir);
    let input_path = dir.path().join("papers.jsonl");
    std::fs::write(
        &input_path,
        "{\"id\": \"s1\"}\n{\"id\": \"s2\"}\n{\"id\": \"s3\"}\n",
    )
    .unwrap();

    let before = status(&input_path, &config).unwrap();
    assert_eq!((before.total_records, before.checkpointed, before.pending), (3, 0, 3));

    let input = paper2txt::load_records(&input_path, "id").unwrap();
    run(
        &config,
        &FakeFetcher::failing(&["s3"]),
        &FakeExtractor::default(),
        &input,
    )
    .await
    .unwrap();

    let after = status(&input_path, &config).unwrap();
    assert_eq!(after.checkpointed, 2);
    assert_eq!(after.pending, 1);
    assert_eq!(after.checkpoint_entries, 2);
}

#[tokio::test]
async fn output_dir_that_cannot_be_created_is_fatal() {
    let dir = TempDir::new().unwrap();
    let file = dir.path().join("occupied");
    std::fs::write(&file, "").unwrap();
    let config = RunConfig::builder()
        .output_dir(file.join("papers"))
        .build()
        .unwrap();
    let fetcher = FakeFetcher::default();

    let err = run(&config, &fetcher, &FakeExtractor::default(), &records(&["z"]))
        .await
        .unwrap_err();

    assert!(matches!(err, BatchError::OutputDirUnavailable { .. }));
    assert_eq!(fetcher.calls(), 0);
}

#[derive(Default)]
struct RecordingCallback {
    events: Mutex<Vec<String>>,
}

impl RunProgressCallback for RecordingCallback {
    fn on_run_start(&self, total: usize, done: usize) {
        self.events.lock().unwrap().push(format!("start {total} {done}"));
    }
    fn on_record_resumed(&self, index: usize, _total: usize, id: &str) {
        self.events.lock().unwrap().push(format!("resumed {index} {id}"));
    }
    fn on_record_complete(&self, index: usize, _total: usize, id: &str, _chars: usize) {
        self.events.lock().unwrap().push(format!("complete {index} {id}"));
    }
    fn on_record_failed(&self, index: usize, _t: usize, id: &str, kind: FailureKind, _e: String) {
        self.events.lock().unwrap().push(format!("failed {index} {id} {kind}"));
    }
    fn on_run_complete(&self, summary: &RunSummary) {
        self.events.lock().unwrap().push(format!("end {}", summary.processed));
    }
}

#[tokio::test]
async fn progress_events_arrive_in_record_order() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("processed_papers.log"), "e0\n").unwrap();
    let callback = Arc::new(RecordingCallback::default());
    let config = RunConfig::builder()
        .output_dir(dir.path())
        .window_ms(10)
        .progress_callback(callback.clone() as Arc<dyn RunProgressCallback>)
        .build()
        .unwrap();

    run(
        &config,
        &FakeFetcher::failing(&["e2"]),
        &FakeExtractor::default(),
        &records(&["e0", "e1", "e2"]),
    )
    .await
    .unwrap();

    assert_eq!(
        *callback.events.lock().unwrap(),
        vec![
            "start 3 1",
            "resumed 0 e0",
            "complete 1 e1",
            "failed 2 e2 retrieval",
            "end 2",
        ]
    );
}

#[tokio::test]
async fn halted_run_still_reports_completion() {
    let dir = TempDir::new().unwrap();
    let callback = Arc::new(RecordingCallback::default());
    let config = RunConfig::builder()
        .output_dir(dir.path())
        .window_ms(10)
        .halt_on_persistence_error(true)
        .progress_callback(callback.clone() as Arc<dyn RunProgressCallback>)
        .build()
        .unwrap();
    std::fs::create_dir(config.output_path("blocked")).unwrap();

    let err = run(
        &config,
        &FakeFetcher::default(),
        &FakeExtractor::default(),
        &records(&["first", "blocked", "never"]),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, BatchError::PersistenceHalted(_)));
    assert_eq!(
        *callback.events.lock().unwrap(),
        vec![
            "start 3 0",
            "complete 0 first",
            "failed 1 blocked persistence",
            "end 1",
        ]
    );
}
