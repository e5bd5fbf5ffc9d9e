//! Integration tests for Harvest

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use chrono::{Duration, Utc};
    use harvest::store::StoredEntity;
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// Command isolated from the user's config and token
    fn harvest(config: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("harvest");
        cmd.env("HARVEST_CONFIG", config)
            .env_remove("HARVEST_TEST_TOKEN");
        cmd
    }

    fn write_config(temp: &TempDir, extra: &str) -> PathBuf {
        let store = temp.path().join("tables");
        let path = temp.path().join("config.toml");
        let content = format!(
            "[github]\ntoken_env = \"HARVEST_TEST_TOKEN\"\n\n[store]\npath = {:?}\n\n{}",
            store.display().to_string(),
            extra
        );
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        harvest(&temp.path().join("none.toml"))
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains(
                "Quota-aware harvester with a staleness-bounded record cache",
            ));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        harvest(&temp.path().join("none.toml"))
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("harvest"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        harvest(&config)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        harvest(&temp.path().join("none.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[github]"))
            .stdout(predicate::str::contains("[quota]"));
    }

    #[test]
    fn config_init_writes_file_once() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("nested").join("config.toml");

        harvest(&config)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(config.exists());

        harvest(&config)
            .args(["config", "init"])
            .assert()
            .success()
            .stderr(predicate::str::contains("--force"));
    }

    #[test]
    fn invalid_config_fails() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[quota]\nbackoff_secs = \"later\"\n").unwrap();

        harvest(&config)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn lookup_missing_table_fails_with_hint() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "");

        harvest(&config)
            .args(["lookup", "octocat", "--cache", "profile"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Table not found: userProfiles"))
            .stderr(predicate::str::contains("harvest sync"));
    }

    #[test]
    fn lookup_serves_cached_rows() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "");
        let tables = temp.path().join("tables");
        std::fs::create_dir_all(&tables).unwrap();

        let rows = vec![
            StoredEntity {
                key: "octocat".to_string(),
                payload: serde_json::json!({ "name": "The Octocat" }),
                last_updated: Some(Utc::now() - Duration::days(90)),
            },
            StoredEntity::placeholder("hubot", serde_json::Value::Null),
        ];
        std::fs::write(
            tables.join("userProfiles.json"),
            serde_json::to_string(&rows).unwrap(),
        )
        .unwrap();

        harvest(&config)
            .args(["lookup", "octocat", "hubot", "ghost", "--cache", "profile"])
            .assert()
            .success()
            .stdout(predicate::str::contains(r#""name":"The Octocat""#))
            .stdout(predicate::str::contains(r#"{"key":"hubot","payload":{"#))
            .stdout(predicate::str::contains(r#"{"key":"ghost","payload":null}"#));
    }

    #[test]
    fn live_lookup_without_token_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "");

        harvest(&config)
            .args(["lookup", "octocat", "--cache", "activity", "--live"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("HARVEST_TEST_TOKEN"));
    }

    #[test]
    fn members_without_org_fails() {
        let temp = TempDir::new().unwrap();
        let config = write_config(&temp, "");

        harvest(&config)
            .arg("members")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No organisation configured"));
    }

    #[test]
    fn sync_requires_cache_kind() {
        let temp = TempDir::new().unwrap();
        harvest(&temp.path().join("none.toml"))
            .args(["sync", "--org", "rust-lang"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--cache"));
    }
}

mod sync_tests {
    use async_trait::async_trait;
    use harvest::cache::{KeyValueCache, RefreshScheduler};
    use harvest::error::{HarvestError, HarvestResult};
    use harvest::pagination::{Page, PageCursor, PageSource};
    use harvest::payload::ProfilePayload;
    use harvest::quota::{QuotaGate, QuotaProbe, QuotaState};
    use harvest::remote::{Fetched, RecordSource};
    use harvest::store::{JsonFileStore, KeyValueStore};
    use harvest::sync::SyncJob;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    struct Members(Mutex<Vec<String>>);

    impl Members {
        fn new(logins: &[&str]) -> Self {
            Self(Mutex::new(logins.iter().map(|s| s.to_string()).collect()))
        }

        fn push(&self, login: &str) {
            self.0.lock().unwrap().push(login.to_string());
        }
    }

    #[async_trait]
    impl PageSource<String> for Members {
        fn page_size(&self) -> u32 {
            2
        }

        fn first_cursor(&self) -> PageCursor {
            PageCursor::Number(1)
        }

        async fn fetch_page(&self, cursor: &PageCursor) -> HarvestResult<Page<String>> {
            let PageCursor::Number(n) = cursor else {
                panic!("unexpected cursor {cursor}");
            };
            let all = self.0.lock().unwrap().clone();
            let start = (*n as usize - 1) * 2;
            let items: Vec<String> = all.iter().skip(start).take(2).cloned().collect();
            Ok(Page {
                has_more: start + items.len() < all.len(),
                items,
                next_cursor: None,
                total_count: Some(all.len() as u64),
                remaining_quota: Some(4990),
            })
        }
    }

    struct Probe;

    #[async_trait]
    impl QuotaProbe for Probe {
        async fn probe_quota(&self) -> HarvestResult<u32> {
            Ok(5000)
        }
    }

    #[derive(Default)]
    struct Profiles {
        calls: AtomicUsize,
        fetched: Mutex<Vec<String>>,
        // Cancelled once the first record has been fetched
        interrupt: Option<CancellationToken>,
    }

    #[async_trait]
    impl RecordSource<ProfilePayload> for Profiles {
        async fn fetch_record(&self, key: &str) -> HarvestResult<Fetched<ProfilePayload>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) as u32;
            self.fetched.lock().unwrap().push(key.to_string());
            if let Some(token) = &self.interrupt {
                token.cancel();
            }
            Ok(Fetched {
                payload: ProfilePayload {
                    name: Some(key.to_uppercase()),
                    ..Default::default()
                },
                remaining_quota: Some(4000 - call),
            })
        }
    }

    fn gate() -> QuotaGate {
        QuotaGate::new(Arc::new(Probe), QuotaState::new(5000, 5))
    }

    #[tokio::test]
    async fn repeated_runs_rotate_through_stale_records() {
        let temp = TempDir::new().unwrap();
        let store: Arc<dyn KeyValueStore> =
            Arc::new(JsonFileStore::open(temp.path()).await.unwrap());
        let cache = KeyValueCache::<ProfilePayload>::new(store, "userProfiles");
        let members = Members::new(&["ada", "grace", "linus"]);
        let profiles = Profiles::default();
        let cancel = CancellationToken::new();

        let job = SyncJob {
            cache: &cache,
            source: &profiles,
            scheduler: RefreshScheduler::new(2),
            pagination_margin: 10,
        };

        let first = job
            .run(&members, &mut gate(), &mut gate(), &cancel)
            .await
            .unwrap();
        assert_eq!(first.discovered, 3);
        assert_eq!(first.seeded.inserted, 3);
        assert_eq!(first.refresh.refreshed, 2);

        members.push("margaret");
        let second = job
            .run(&members, &mut gate(), &mut gate(), &cancel)
            .await
            .unwrap();
        assert_eq!(second.discovered, 4);
        assert_eq!(second.seeded.inserted, 1);
        assert_eq!(second.seeded.existing, 3);
        assert_eq!(second.refresh.refreshed, 2);

        // Placeholders outrank every refreshed row
        let fetched = profiles.fetched.lock().unwrap().clone();
        let mut first_pass = fetched[..2].to_vec();
        first_pass.sort();
        let mut second_pass = fetched[2..].to_vec();
        second_pass.sort();
        assert_eq!(first_pass, vec!["ada", "grace"]);
        assert_eq!(second_pass, vec!["linus", "margaret"]);

        let records = cache.list_all().await.unwrap();
        assert_eq!(records.len(), 4);
        assert!(records.iter().all(|r| r.last_updated.is_some()));
        let linus = records.iter().find(|r| r.key == "linus").unwrap();
        assert_eq!(linus.payload.name.as_deref(), Some("LINUS"));
    }

    #[tokio::test]
    async fn cancelled_before_discovery_writes_nothing() {
        let temp = TempDir::new().unwrap();
        let store: Arc<dyn KeyValueStore> =
            Arc::new(JsonFileStore::open(temp.path()).await.unwrap());
        let cache = KeyValueCache::<ProfilePayload>::new(store, "userProfiles");
        let members = Members::new(&["ada", "grace"]);
        let profiles = Profiles::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let job = SyncJob {
            cache: &cache,
            source: &profiles,
            scheduler: RefreshScheduler::new(5),
            pagination_margin: 10,
        };

        let result = job.run(&members, &mut gate(), &mut gate(), &cancel).await;
        assert!(matches!(result, Err(HarvestError::Cancelled)));
        assert_eq!(profiles.calls.load(Ordering::SeqCst), 0);
        assert!(matches!(
            cache.list_all().await,
            Err(HarvestError::TableNotFound(_))
        ));
    }

    #[tokio::test]
    async fn cancellation_mid_refresh_keeps_seeded_placeholders() {
        let temp = TempDir::new().unwrap();
        let store: Arc<dyn KeyValueStore> =
            Arc::new(JsonFileStore::open(temp.path()).await.unwrap());
        let cache = KeyValueCache::<ProfilePayload>::new(store, "userProfiles");
        let members = Members::new(&["ada", "grace", "linus"]);
        let cancel = CancellationToken::new();
        let profiles = Profiles {
            interrupt: Some(cancel.clone()),
            ..Default::default()
        };

        let job = SyncJob {
            cache: &cache,
            source: &profiles,
            scheduler: RefreshScheduler::new(5),
            pagination_margin: 10,
        };

        let result = job.run(&members, &mut gate(), &mut gate(), &cancel).await;
        assert!(matches!(result, Err(HarvestError::Cancelled)));
        assert_eq!(profiles.calls.load(Ordering::SeqCst), 1);

        let records = cache.list_all().await.unwrap();
        assert_eq!(records.len(), 3);
        let refreshed: Vec<&str> = records
            .iter()
            .filter(|r| !r.is_placeholder())
            .map(|r| r.key.as_str())
            .collect();
        assert_eq!(refreshed, vec!["ada"]);
    }
}
