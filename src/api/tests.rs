#[cfg(test)]
mod tests {
    use crate::api::create_router;
    use crate::browser::{BackendFactory, SearchBackend};
    use crate::config::Config;
    use crate::context::AppContext;
    use crate::crawler::CrawlDeps;
    use crate::error::{Result, SearchFault};
    use crate::relevance::RelevanceCheck;
    use crate::storage::{FileRecordStore, RecordStore};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    struct EchoBackend;

    #[async_trait]
    impl SearchBackend for EchoBackend {
        async fn search_and_extract(&mut self, keyword: &str) -> std::result::Result<Vec<String>, SearchFault> {
            Ok(vec![format!("{} waters rising downtown", keyword), format!("{} shelters open", keyword)])
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct EchoFactory;

    #[async_trait]
    impl BackendFactory for EchoFactory {
        async fn acquire(&self) -> Result<Box<dyn SearchBackend>> {
            Ok(Box::new(EchoBackend))
        }
    }

    /// Relevant when the text mentions a flood.
    struct FloodRelevance;

    #[async_trait]
    impl RelevanceCheck for FloodRelevance {
        async fn check_relevance(&self, text: &str) -> bool {
            text.to_lowercase().contains("flood")
        }
    }

    struct TestServer {
        base: String,
        client: reqwest::Client,
        store: Arc<FileRecordStore>,
        ctx: Arc<AppContext>,
        _dir: TempDir,
    }

    impl TestServer {
        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        async fn get(&self, path: &str) -> (u16, Value) {
            let response = self.client.get(self.url(path)).send().await.unwrap();
            let status = response.status().as_u16();
            (status, response.json().await.unwrap())
        }

        async fn post(&self, path: &str, body: Option<Value>) -> (u16, Value) {
            let mut request = self.client.post(self.url(path));
            if let Some(body) = body {
                request = request.json(&body);
            }
            let response = request.send().await.unwrap();
            let status = response.status().as_u16();
            (status, response.json().await.unwrap_or(Value::Null))
        }
    }

    async fn spawn_server(defaults: Vec<String>, api_token: Option<String>) -> TestServer {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileRecordStore::open(dir.path(), "tweets.jsonl"));

        let mut config = Config::default();
        config.api.api_token = api_token;
        config.crawler.keyword_delay = Duration::from_millis(20);
        config.crawler.pass_delay = Duration::from_millis(50);
        config.crawler.jitter = Duration::ZERO;

        let deps = CrawlDeps {
            factory: Arc::new(EchoFactory),
            store: store.clone(),
            relevance: Arc::new(FloodRelevance),
        };
        let ctx = AppContext::new(Arc::new(config), deps, defaults);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = create_router(ctx.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestServer {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            store,
            ctx,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn test_scrape_without_keywords_is_rejected() {
        let server = spawn_server(Vec::new(), None).await;

        let (status, body) = server.post("/scrape", None).await;

        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().starts_with("No keywords provided"));
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let server = spawn_server(Vec::new(), None).await;

        let (status, body) = server
            .post("/scrape", Some(json!({ "keywords": ["Flood", " flood ", "cyclone", "x".repeat(70)] })))
            .await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["message"], "Scraping started");
        assert_eq!(body["data"]["keywords"], json!(["Flood", "cyclone"]));

        let (status, body) = server.post("/start?keywords=quake", None).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Scraping already running");

        let (_, body) = server.get("/status").await;
        assert_eq!(body["data"]["running"], true);
        assert_eq!(body["data"]["keywords"], json!(["Flood", "cyclone"]));

        let (status, body) = server.post("/stop", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"], "Scraping stopped");

        let (status, body) = server.post("/stop", None).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Scraping is not running");
    }

    #[tokio::test]
    async fn test_keywords_from_query_and_defaults() {
        let server = spawn_server(vec!["cyclone".to_string()], None).await;

        let (status, body) = server.get("/scrape?keywords=flood,Flood,,storm").await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["keywords"], json!(["flood", "storm"]));
        server.post("/stop", None).await;

        let (status, body) = server.post("/start", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["keywords"], json!(["cyclone"]));
        server.post("/stop", None).await;
    }

    #[tokio::test]
    async fn test_restart_endpoint() {
        let server = spawn_server(Vec::new(), None).await;

        let (status, body) = server.post("/restart", None).await;
        assert_eq!(status, 400);
        assert_eq!(body["data"]["message"], "No keywords to restart");

        server.post("/start?keywords=flood", None).await;
        let (status, body) = server.post("/restart", Some(json!({ "keywords": ["cyclone"] }))).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["message"], "Restarted");
        assert_eq!(body["data"]["keywords"], json!(["cyclone"]));

        let (status, body) = server.post("/restart", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["keywords"], json!(["cyclone"]));
        server.post("/stop", None).await;
    }

    #[tokio::test]
    async fn test_health_reports_store_state() {
        let server = spawn_server(Vec::new(), None).await;

        let (status, body) = server.get("/health").await;

        assert_eq!(status, 200);
        assert_eq!(body, json!({ "status": "ok", "is_running": false, "db_enabled": true }));
    }

    #[tokio::test]
    async fn test_results_views() {
        let server = spawn_server(Vec::new(), None).await;
        server.store.upsert_record("flood", "flood near the river", true).await;
        server.store.upsert_record("cyclone", "cyclone warning", false).await;

        let (_, body) = server.get("/results?keyword=flood").await;
        let records = body["data"].as_array().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["text"], "flood near the river");
        assert_eq!(records[0]["relevant"], true);
        assert!(records[0]["inserted_at"].is_string());

        let (_, body) = server.get("/results?keywords=flood,cyclone&limit=5").await;
        assert_eq!(body["data"]["flood"].as_array().unwrap().len(), 1);
        assert_eq!(body["data"]["cyclone"][0]["relevant"], false);

        server.post("/start?keywords=flood", None).await;
        let mut live = Value::Null;
        for _ in 0..50 {
            let (_, body) = server.get("/results").await;
            if body["data"]["flood"].is_array() {
                live = body;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        let scored = live["data"]["flood"].as_array().unwrap();
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0], json!({ "text": "flood waters rising downtown", "relevant": true }));

        let (_, raw) = server.get("/results/raw").await;
        assert_eq!(raw["data"]["flood"].as_array().unwrap().len(), 5);
        server.post("/stop", None).await;
    }

    #[tokio::test]
    async fn test_relevant_tweets_with_backfill() {
        let server = spawn_server(Vec::new(), None).await;
        server.store.upsert_record("Flood", "flood closes highway", false).await;
        server.store.upsert_record("flood", "sunny afternoon", false).await;
        server.store.upsert_record("cyclone", "cyclone flood surge", false).await;

        let (_, body) = server.get("/tweets/relevant?keywords=flood&limit=500").await;
        assert_eq!(body["data"], json!([]));

        let (_, body) = server.get("/tweets/relevant?keywords=flood&recompute=yes").await;
        let backfilled = body["data"].as_array().unwrap();
        assert_eq!(backfilled.len(), 1);
        assert_eq!(backfilled[0]["text"], "flood closes highway");
        assert_eq!(backfilled[0]["relevant"], true);

        // the new verdict was written back
        let (_, body) = server.get("/tweets/relevant").await;
        let relevant = body["data"].as_array().unwrap();
        assert_eq!(relevant.len(), 1);
        assert_eq!(relevant[0]["keyword"], "Flood");
    }

    #[tokio::test]
    async fn test_control_routes_require_token() {
        let server = spawn_server(Vec::new(), Some("secret".to_string())).await;

        let (status, _) = server.post("/stop", None).await;
        assert_eq!(status, 401);

        let response = server
            .client
            .post(server.url("/stop"))
            .bearer_auth("secret")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);

        // read-only routes stay open
        let (status, _) = server.get("/status").await;
        assert_eq!(status, 200);
        assert!(!server.ctx.manager.is_running().await);
    }
}
