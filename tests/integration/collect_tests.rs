//! Integration tests for the comment collector
//!
//! These tests use wiremock to stand in for the comment API and drive
//! the full pagination walk and run driver end-to-end.

use comment_harvester::config::{ArticleEntry, Config, EndpointParams};
use comment_harvester::crawler::{
    finalize_interrupted_run, fixed_offset, CommentCollector, CommentFetcher, Harvester,
    RecordBuilder, StaticProbe,
};
use comment_harvester::monitor::EvidenceRecorder;
use comment_harvester::privacy::build_hasher;
use comment_harvester::state::{ArticleKey, ArticleStatus};
use comment_harvester::storage::{
    ArticleRecord, CommentRecord, CommentStats, EventRecord, NewRun, RunRecord, RunStatus,
    RunSummary, SqliteStorage, Storage, StorageError, StorageResult,
};
use comment_harvester::HarvestError;
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

const RUN_ID: &str = "20240101_090000";

/// Matches top-level listing requests (no reply mode)
struct TopLevel;

impl Match for TopLevel {
    fn matches(&self, request: &Request) -> bool {
        request.url.query_pairs().all(|(name, _)| name != "moreType")
    }
}

/// Creates a test configuration pointing at the mock server
fn create_test_config(server_uri: &str, evidence_dir: &Path) -> Config {
    let mut config = Config::with_database(":memory:");
    config.endpoint.comment_url = format!("{}/list", server_uri);
    config.endpoint.stats_url = format!("{}/stats", server_uri);
    config.rate_limit.baseline_min_delay = 0.0;
    config.rate_limit.min_delay = 0.0;
    config.rate_limit.max_delay = 0.0;
    config.comment_stats.enabled = false;
    config.storage.evidence_dir = evidence_dir.to_string_lossy().to_string();
    config
}

fn comment(id: &str, replies: i64) -> Value {
    json!({
        "commentNo": id,
        "contents": format!("comment {}", id),
        "regTime": "2024-01-01T09:00:00+0900",
        "userId": "u1",
        "userName": "someone",
        "sympathyCount": 3,
        "antipathyCount": 1,
        "replyCount": replies,
    })
}

fn page(comments: Vec<Value>, next: Option<&str>) -> String {
    json!({
        "success": true,
        "result": {
            "commentList": comments,
            "pageModel": { "next": next },
        }
    })
    .to_string()
}

fn jsonp(body: String) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_string(format!("_callback({});", body))
}

fn create_collector(config: &Config, evidence_dir: &Path) -> CommentCollector<SqliteStorage> {
    create_collector_with(config, evidence_dir, SqliteStorage::new_in_memory().unwrap())
}

fn create_collector_with<S: Storage>(
    config: &Config,
    evidence_dir: &Path,
    mut storage: S,
) -> CommentCollector<S> {
    storage
        .start_run(&NewRun {
            run_id: RUN_ID.to_string(),
            snapshot_at: "2024-01-01T09:00:00+09:00".to_string(),
            timezone: "+09:00".to_string(),
            config_hash: "test".to_string(),
        })
        .unwrap();

    let offset = fixed_offset(9).unwrap();
    let evidence = EvidenceRecorder::new(RUN_ID, evidence_dir, offset).unwrap();
    let fetcher = CommentFetcher::new(config, Some(evidence)).unwrap();
    let builder = RecordBuilder::new(
        build_hasher(&config.privacy).unwrap(),
        false,
        offset,
        "2024-01-01T09:00:00+09:00",
    );
    CommentCollector::new(RUN_ID, storage, fetcher, builder, config)
}

/// Storage whose event log is unavailable
struct EventlessStorage {
    inner: SqliteStorage,
}

impl Storage for EventlessStorage {
    fn start_run(&mut self, run: &NewRun) -> StorageResult<()> {
        self.inner.start_run(run)
    }

    fn get_run(&self, run_id: &str) -> StorageResult<RunRecord> {
        self.inner.get_run(run_id)
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        self.inner.get_latest_run()
    }

    fn finalize_run(&mut self, run_id: &str, summary: &RunSummary) -> StorageResult<bool> {
        self.inner.finalize_run(run_id, summary)
    }

    fn register_article(
        &mut self,
        run_id: &str,
        key: &ArticleKey,
        url: Option<&str>,
        title: Option<&str>,
    ) -> StorageResult<()> {
        self.inner.register_article(run_id, key, url, title)
    }

    fn is_article_completed(&self, run_id: &str, key: &ArticleKey) -> StorageResult<bool> {
        self.inner.is_article_completed(run_id, key)
    }

    fn set_article_status(
        &mut self,
        run_id: &str,
        key: &ArticleKey,
        status: ArticleStatus,
        error_code: Option<&str>,
        error_message: Option<&str>,
    ) -> StorageResult<()> {
        self.inner
            .set_article_status(run_id, key, status, error_code, error_message)
    }

    fn get_article(&self, run_id: &str, key: &ArticleKey) -> StorageResult<Option<ArticleRecord>> {
        self.inner.get_article(run_id, key)
    }

    fn count_articles_by_status(
        &self,
        run_id: &str,
    ) -> StorageResult<Vec<(ArticleStatus, u64)>> {
        self.inner.count_articles_by_status(run_id)
    }

    fn persist_comments(&mut self, run_id: &str, records: &[CommentRecord]) -> StorageResult<usize> {
        self.inner.persist_comments(run_id, records)
    }

    fn get_comment(&self, run_id: &str, comment_id: &str) -> StorageResult<Option<CommentRecord>> {
        self.inner.get_comment(run_id, comment_id)
    }

    fn count_comments(&self, run_id: &str, key: Option<&ArticleKey>) -> StorageResult<u64> {
        self.inner.count_comments(run_id, key)
    }

    fn persist_comment_stats(
        &mut self,
        run_id: &str,
        key: &ArticleKey,
        stats: &CommentStats,
        snapshot_at: &str,
    ) -> StorageResult<()> {
        self.inner
            .persist_comment_stats(run_id, key, stats, snapshot_at)
    }

    fn get_comment_stats(
        &self,
        run_id: &str,
        key: &ArticleKey,
    ) -> StorageResult<Option<CommentStats>> {
        self.inner.get_comment_stats(run_id, key)
    }

    fn log_event(
        &mut self,
        _run_id: &str,
        _event_type: &str,
        _summary: &str,
        _details: Option<&Value>,
    ) -> StorageResult<()> {
        Err(StorageError::Serialization("events table unavailable".to_string()))
    }

    fn list_events(&self, run_id: &str, limit: usize) -> StorageResult<Vec<EventRecord>> {
        self.inner.list_events(run_id, limit)
    }

    fn count_events(&self, run_id: &str, event_type: &str) -> StorageResult<u64> {
        self.inner.count_events(run_id, event_type)
    }
}

fn article(oid: &str, aid: &str) -> ArticleEntry {
    ArticleEntry {
        url: Some(format!("https://news.example.com/article/{}/{}", oid, aid)),
        oid: oid.to_string(),
        aid: aid.to_string(),
        title: Some("Test article".to_string()),
    }
}

#[tokio::test]
async fn test_walk_comments_and_replies() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), evidence.path());

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(TopLevel)
        .and(query_param("page", "1"))
        .respond_with(jsonp(page(vec![comment("A1", 1)], Some("cur-2"))))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(TopLevel)
        .and(query_param("page", "2"))
        .respond_with(jsonp(page(vec![comment("B1", 0)], None)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("moreType", "child"))
        .and(query_param("parentCommentNo", "A1"))
        .respond_with(jsonp(page(vec![comment("R1", 0)], None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut collector = create_collector(&config, evidence.path());
    let key = ArticleKey::new("001", "0000000001");

    let written = collector
        .collect_article(&key, &EndpointParams::default(), None)
        .await
        .unwrap();
    assert_eq!(written, 3);
    assert_eq!(collector.metrics().pages_fetched, 3);

    let storage = collector.storage();
    assert_eq!(storage.count_comments(RUN_ID, Some(&key)).unwrap(), 3);

    let article = storage.get_article(RUN_ID, &key).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Success);

    let reply = storage.get_comment(RUN_ID, "R1").unwrap().unwrap();
    assert_eq!(reply.depth, 1);
    assert_eq!(reply.parent_id.as_deref(), Some("A1"));
    assert_eq!(reply.authored_at, "2024-01-01T09:00:00+09:00");
    assert!(reply.author_raw.is_none());

    let top = storage.get_comment(RUN_ID, "A1").unwrap().unwrap();
    assert_eq!(top.depth, 0);
    assert!(top.parent_id.is_none());
}

#[tokio::test]
async fn test_reply_walk_ends_on_empty_page() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), evidence.path());

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(TopLevel)
        .respond_with(jsonp(page(vec![comment("P1", 2)], None)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("moreType", "child"))
        .and(query_param("page", "1"))
        .respond_with(jsonp(page(vec![comment("P1-R1", 0)], Some("reply-2"))))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("moreType", "child"))
        .and(query_param("page", "2"))
        .respond_with(jsonp(page(vec![], None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut collector = create_collector(&config, evidence.path());
    let key = ArticleKey::new("001", "0000000008");

    let written = collector
        .collect_article(&key, &EndpointParams::default(), None)
        .await
        .unwrap();
    assert_eq!(written, 2);
    assert_eq!(collector.metrics().pages_fetched, 3);

    let article = collector.storage().get_article(RUN_ID, &key).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Success);
}

#[tokio::test]
async fn test_cursor_repeat_stops_walk() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), evidence.path());

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "1"))
        .respond_with(jsonp(page(vec![comment("C1", 0)], Some("same"))))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("page", "2"))
        .respond_with(jsonp(page(vec![comment("C2", 0)], Some("same"))))
        .expect(1)
        .mount(&server)
        .await;

    let mut collector = create_collector(&config, evidence.path());
    let key = ArticleKey::new("001", "0000000002");

    let written = collector
        .collect_article(&key, &EndpointParams::default(), None)
        .await
        .unwrap();
    assert_eq!(written, 2);
    assert_eq!(collector.metrics().pages_fetched, 2);
}

#[tokio::test]
async fn test_missing_field_is_structural() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), evidence.path());

    let broken = json!({ "commentNo": "X1", "regTime": "1704067200" });
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(jsonp(page(vec![comment("OK1", 0), broken], None)))
        .mount(&server)
        .await;

    let mut collector = create_collector(&config, evidence.path());
    let key = ArticleKey::new("001", "0000000003");

    let err = collector
        .collect_article(&key, &EndpointParams::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Structural { .. }));
    assert!(err.is_fatal());

    let storage = collector.storage();
    let article = storage.get_article(RUN_ID, &key).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::FailParse);
    assert_eq!(article.error_code.as_deref(), Some("STRUCTURAL"));
    // The page is rejected as a whole
    assert_eq!(storage.count_comments(RUN_ID, Some(&key)).unwrap(), 0);
    assert_eq!(
        storage.count_events(RUN_ID, "STRUCTURAL_HEURISTIC").unwrap(),
        1
    );
}

#[tokio::test]
async fn test_completed_article_is_skipped() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), evidence.path());

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(jsonp(page(vec![comment("D1", 0)], None)))
        .expect(1)
        .mount(&server)
        .await;

    let mut collector = create_collector(&config, evidence.path());
    let key = ArticleKey::new("001", "0000000004");
    let params = EndpointParams::default();

    assert_eq!(collector.collect_article(&key, &params, None).await.unwrap(), 1);
    assert_eq!(collector.collect_article(&key, &params, None).await.unwrap(), 0);
    assert_eq!(
        collector.storage().count_comments(RUN_ID, Some(&key)).unwrap(),
        1
    );
}

#[tokio::test]
async fn test_ban_status_halts_collection() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), evidence.path());

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(403).set_body_string("Forbidden"))
        .expect(1)
        .mount(&server)
        .await;

    let mut collector = create_collector(&config, evidence.path());
    let key = ArticleKey::new("001", "0000000005");
    let params = EndpointParams::default();

    let err = collector
        .collect_article(&key, &params, None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Banned { status: 403, .. }));
    assert!(err.is_fatal());
    assert!(collector.fetcher().governor().is_stopped());
    assert_eq!(collector.storage().count_events(RUN_ID, "STOP_LIMIT").unwrap(), 1);

    let article = collector.storage().get_article(RUN_ID, &key).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::FailHttp);

    // No further request reaches the server once the governor stopped
    let other = ArticleKey::new("001", "0000000006");
    let err = collector
        .collect_article(&other, &params, None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Halted { .. }));

    assert!(evidence.path().join("failed_requests.jsonl").exists());
}

#[tokio::test]
async fn test_html_response_is_parse_failure() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), evidence.path());

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("<html><body>Service unavailable</body></html>")
                .insert_header("content-type", "text/html"),
        )
        .mount(&server)
        .await;

    let mut collector = create_collector(&config, evidence.path());
    let key = ArticleKey::new("001", "0000000007");

    let err = collector
        .collect_article(&key, &EndpointParams::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Parse(_)));
    assert!(!err.is_fatal());

    let storage = collector.storage();
    let article = storage.get_article(RUN_ID, &key).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::FailParse);
    assert_eq!(storage.count_events(RUN_ID, "STRUCTURE_MONITOR").unwrap(), 1);
    // Only field-level violations move the breaker
    assert_eq!(collector.breaker().failure_count(), 0);

    let log = std::fs::read_to_string(evidence.path().join("failed_requests.jsonl")).unwrap();
    assert!(log.contains("PARSE_ERROR"));
    assert!(evidence.path().join("failed_responses").is_dir());
}

#[tokio::test]
async fn test_harvester_falls_back_to_next_candidate() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), evidence.path());
    config.articles = vec![article("001", "0000000010")];

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("templateId", "broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not a payload"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("templateId", "working"))
        .respond_with(jsonp(page(vec![comment("E1", 0), comment("E2", 0)], None)))
        .expect(1)
        .mount(&server)
        .await;

    let probe = StaticProbe::new(vec![
        EndpointParams::new("news", "broken"),
        EndpointParams::new("news", "working"),
    ]);
    let storage = SqliteStorage::new_in_memory().unwrap();
    let harvester = Harvester::start(config, "hash", storage, probe, None).unwrap();
    let run_id = harvester.run_id().to_string();

    let (outcome, storage) = harvester.run().await.unwrap();
    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.total_articles, 1);
    assert_eq!(outcome.total_comments, 2);
    assert!(outcome.failure.is_none());

    let key = ArticleKey::new("001", "0000000010");
    let article = storage.get_article(&run_id, &key).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Success);
    assert_eq!(article.title.as_deref(), Some("Test article"));
    assert_eq!(storage.count_events(&run_id, "CANDIDATE_RETRY").unwrap(), 1);

    let run = storage.get_run(&run_id).unwrap();
    assert_eq!(run.status, Some(RunStatus::Success));
    assert!(run.finished_at.is_some());

    // A finalized run is never finalized again
    let mut storage = storage;
    let volume = comment_harvester::config::VolumeConfig {
        target_comments: 10,
        min_acceptable_comments: 5,
        max_total_articles: 10,
    };
    assert!(!finalize_interrupted_run(&mut storage, &run_id, &volume, "late").unwrap());
    assert_eq!(
        storage.get_run(&run_id).unwrap().status,
        Some(RunStatus::Success)
    );
}

#[tokio::test]
async fn test_harvester_marks_article_without_candidates() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), evidence.path());
    config.articles = vec![article("002", "0000000020")];

    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let storage = SqliteStorage::new_in_memory().unwrap();
    let harvester =
        Harvester::start(config, "hash", storage, StaticProbe::new(vec![]), None).unwrap();
    let run_id = harvester.run_id().to_string();

    let (outcome, storage) = harvester.run().await.unwrap();
    assert_eq!(outcome.status, RunStatus::Success);

    let key = ArticleKey::new("002", "0000000020");
    let article = storage.get_article(&run_id, &key).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::FailNoCandidate);
    assert_eq!(article.error_code.as_deref(), Some("NO_CANDIDATE"));
    assert_eq!(storage.count_events(&run_id, "CANDIDATE_MISSING").unwrap(), 1);
}

#[tokio::test]
async fn test_ban_fails_the_run() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), evidence.path());
    config.articles = vec![article("003", "0000000030"), article("003", "0000000031")];

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let probe = StaticProbe::new(vec![
        EndpointParams::new("news", "first"),
        EndpointParams::new("news", "second"),
    ]);
    let storage = SqliteStorage::new_in_memory().unwrap();
    let harvester = Harvester::start(config, "hash", storage, probe, None).unwrap();
    let run_id = harvester.run_id().to_string();

    let (outcome, storage) = harvester.run().await.unwrap();
    assert_eq!(outcome.status, RunStatus::Failed);
    assert!(outcome.failure.is_some());
    assert_eq!(storage.count_events(&run_id, "CANDIDATE_FAIL").unwrap(), 1);

    let untouched = ArticleKey::new("003", "0000000031");
    assert!(storage.get_article(&run_id, &untouched).unwrap().is_none());
}

#[tokio::test]
async fn test_failed_start_leaves_no_open_run() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("harvest.db");
    let not_a_dir = dir.path().join("evidence");
    std::fs::write(&not_a_dir, "occupied").unwrap();

    let mut config = create_test_config("http://127.0.0.1:9", &not_a_dir);
    config.storage.database_path = db.to_string_lossy().to_string();
    config.articles = vec![article("001", "0000000050")];

    let storage = SqliteStorage::new(&db).unwrap();
    let result = Harvester::start(config, "hash", storage, StaticProbe::new(vec![]), None);
    assert!(matches!(result, Err(HarvestError::Io(_))));

    let storage = SqliteStorage::new(&db).unwrap();
    assert!(storage.get_latest_run().unwrap().is_none());
}

#[tokio::test]
async fn test_candidate_rewalk_is_not_duplication() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), evidence.path());
    config.articles = vec![article("001", "0000000060")];
    config.volume.target_comments = 2;
    config.volume.min_acceptable_comments = 1;
    config.volume.max_total_articles = 10;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("templateId", "flaky"))
        .and(query_param("page", "1"))
        .respond_with(jsonp(page(vec![comment("G1", 0), comment("G2", 0)], Some("p2"))))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("templateId", "flaky"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("templateId", "steady"))
        .respond_with(jsonp(page(vec![comment("G1", 0), comment("G2", 0)], None)))
        .expect(1)
        .mount(&server)
        .await;

    let probe = StaticProbe::new(vec![
        EndpointParams::new("news", "flaky"),
        EndpointParams::new("news", "steady"),
    ]);
    let storage = SqliteStorage::new_in_memory().unwrap();
    let harvester = Harvester::start(config, "hash", storage, probe, None).unwrap();
    let run_id = harvester.run_id().to_string();

    let (outcome, storage) = harvester.run().await.unwrap();
    assert_eq!(outcome.status, RunStatus::Stopped);
    assert_eq!(outcome.total_comments, 2);
    assert_eq!(outcome.health_score, 100);
    assert!(!outcome.needs_review);
    assert_eq!(storage.count_events(&run_id, "CANDIDATE_RETRY").unwrap(), 1);
}

#[tokio::test]
async fn test_stats_fetched_when_reported_total_is_large() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), evidence.path());
    config.comment_stats.enabled = true;
    config.comment_stats.min_comments = 10;

    let listing = json!({
        "success": true,
        "result": {
            "commentList": [comment("S1", 0)],
            "pageModel": { "next": null },
            "count": { "total": 25 },
        }
    });
    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(jsonp(listing.to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let stats = json!({
        "success": true,
        "result": {
            "count": { "comment": 25 },
            "commentByGender": [
                { "gender": "M", "ratio": 61 },
                { "gender": "F", "ratio": 39 },
            ],
            "commentByAge": [{ "age": "20", "ratio": 12.5 }],
        }
    });
    Mock::given(method("GET"))
        .and(path("/stats"))
        .and(query_param("objectId", "news001,0000000070"))
        .respond_with(jsonp(stats.to_string()))
        .expect(1)
        .mount(&server)
        .await;

    let mut collector = create_collector(&config, evidence.path());
    let key = ArticleKey::new("001", "0000000070");

    let written = collector
        .collect_article(&key, &EndpointParams::default(), None)
        .await
        .unwrap();
    assert_eq!(written, 1);

    let storage = collector.storage();
    let stored = storage.get_comment_stats(RUN_ID, &key).unwrap().unwrap();
    assert_eq!(stored.total_comments, Some(25));
    assert_eq!(stored.male_ratio, Some(61.0));
    assert_eq!(stored.female_ratio, Some(39.0));
    assert_eq!(stored.age_ratios[1], Some(12.5));
    assert!(stored.age_ratios[0].is_none());

    let article = storage.get_article(RUN_ID, &key).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Success);
}

#[tokio::test]
async fn test_stats_failure_keeps_article_success() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), evidence.path());
    config.comment_stats.enabled = true;
    config.comment_stats.min_comments = 1;

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(jsonp(page(vec![comment("S2", 0)], None)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;

    let mut collector = create_collector(&config, evidence.path());
    let key = ArticleKey::new("001", "0000000071");

    let written = collector
        .collect_article(&key, &EndpointParams::default(), None)
        .await
        .unwrap();
    assert_eq!(written, 1);

    let storage = collector.storage();
    let article = storage.get_article(RUN_ID, &key).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Success);
    assert!(storage.get_comment_stats(RUN_ID, &key).unwrap().is_none());
    assert_eq!(storage.count_events(RUN_ID, "STATS_FAILED").unwrap(), 1);
}

#[tokio::test]
async fn test_stats_skipped_below_threshold() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), evidence.path());
    config.comment_stats.enabled = true;
    config.comment_stats.min_comments = 100;

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(jsonp(page(vec![comment("S3", 0)], None)))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/stats"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let mut collector = create_collector(&config, evidence.path());
    let key = ArticleKey::new("001", "0000000072");

    collector
        .collect_article(&key, &EndpointParams::default(), None)
        .await
        .unwrap();
    assert_eq!(collector.storage().count_events(RUN_ID, "STATS_FAILED").unwrap(), 0);
}

#[tokio::test]
async fn test_http_failures_move_on_to_next_article() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let mut config = create_test_config(&server.uri(), evidence.path());
    config.articles = vec![article("003", "0000000040"), article("003", "0000000041")];

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("objectId", "news003,0000000040"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/list"))
        .and(query_param("objectId", "news003,0000000041"))
        .respond_with(jsonp(page(vec![comment("H1", 0)], None)))
        .expect(1)
        .mount(&server)
        .await;

    let probe = StaticProbe::new(vec![
        EndpointParams::new("news", "first"),
        EndpointParams::new("news", "second"),
    ]);
    let storage = SqliteStorage::new_in_memory().unwrap();
    let harvester = Harvester::start(config, "hash", storage, probe, None).unwrap();
    let run_id = harvester.run_id().to_string();

    let (outcome, storage) = harvester.run().await.unwrap();
    assert_eq!(outcome.status, RunStatus::Success);
    assert!(outcome.failure.is_none());
    assert_eq!(outcome.total_comments, 1);

    let failed = ArticleKey::new("003", "0000000040");
    let article = storage.get_article(&run_id, &failed).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::FailHttp);
    assert_eq!(article.error_code.as_deref(), Some("HTTP"));

    let collected = ArticleKey::new("003", "0000000041");
    let article = storage.get_article(&run_id, &collected).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::Success);

    assert_eq!(storage.count_events(&run_id, "CANDIDATE_RETRY").unwrap(), 2);
    assert_eq!(
        storage.get_run(&run_id).unwrap().status,
        Some(RunStatus::Success)
    );
}

#[tokio::test]
async fn test_event_log_failure_keeps_fetch_error() {
    let server = MockServer::start().await;
    let evidence = TempDir::new().unwrap();
    let config = create_test_config(&server.uri(), evidence.path());

    Mock::given(method("GET"))
        .and(path("/list"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let storage = EventlessStorage {
        inner: SqliteStorage::new_in_memory().unwrap(),
    };
    let mut collector = create_collector_with(&config, evidence.path(), storage);
    let key = ArticleKey::new("001", "0000000080");

    let err = collector
        .collect_article(&key, &EndpointParams::default(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, HarvestError::Banned { status: 403, .. }));

    let article = collector.storage().get_article(RUN_ID, &key).unwrap().unwrap();
    assert_eq!(article.status, ArticleStatus::FailHttp);
}
