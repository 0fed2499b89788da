//! End-to-end catalog tests.
//!
//! Each test wires the index listener, lifecycle machine, and release
//! manager around one state store, the same way the daemon does.

use std::sync::Arc;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::json;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use chartgrid_core::*;
use chartgrid_index::{IndexCache, IndexListener};
use chartgrid_lifecycle::{CreateVersionRequest, Lifecycle, LifecycleSettings, TransitionPolicy};
use chartgrid_release::{
    ChartSource, CreateReleaseRequest, ListQuery, ReleaseManager, UpgradeReleaseRequest,
};
use chartgrid_state::*;

const BUILTIN: &str = "builtin-stable";

struct Harness {
    store: StateStore,
    cache: Arc<IndexCache>,
    releases: ReleaseManager<StateStore>,
    shutdown: watch::Sender<bool>,
    listener: JoinHandle<()>,
}

impl Harness {
    fn start(store: StateStore) -> Self {
        let cache = Arc::new(IndexCache::new());
        let (shutdown, rx) = watch::channel(false);
        let listener = IndexListener::new(cache.clone(), store.clone());
        let listener = tokio::spawn(async move { listener.run(rx).await });
        let releases =
            ReleaseManager::new(store.clone(), cache.clone(), Arc::new(store.clone()), BUILTIN);
        Self {
            store,
            cache,
            releases,
            shutdown,
            listener,
        }
    }

    fn lifecycle(&self, policy: TransitionPolicy) -> Lifecycle<StateStore> {
        Lifecycle::new(
            self.store.clone(),
            self.cache.clone(),
            Arc::new(self.store.clone()),
            Arc::new(TarballChartParser),
            LifecycleSettings {
                policy,
                ..Default::default()
            },
        )
    }

    async fn wait_for_version(&self, id: &str) -> bool {
        for _ in 0..200 {
            if self.cache.get_application_version(id).await.is_some() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    async fn stop(self) {
        self.shutdown.send(true).unwrap();
        self.listener.await.unwrap();
    }
}

fn wordpress_repo(versions: &[(&str, &str)]) -> Repo {
    let versions: Vec<_> = versions
        .iter()
        .map(|(id, version)| {
            json!({"id": id, "version": version,
                   "urls": [format!("https://charts.example.com/wordpress-{version}.tgz")]})
        })
        .collect();
    Repo {
        id: "R".to_string(),
        name: "bitnami".to_string(),
        workspace: "ws1".to_string(),
        url: "https://charts.example.com".to_string(),
        index_snapshot: json!({"applications": {"wordpress": {
            "metadata": {"id": "A1", "description": "blog engine"},
            "versions": versions}}})
        .to_string(),
        ..Default::default()
    }
}

fn create_req(name: &str, version_id: &str) -> CreateReleaseRequest {
    CreateReleaseRequest {
        repo_id: "R".to_string(),
        app_id: "A1".to_string(),
        version_id: version_id.to_string(),
        name: name.to_string(),
        workspace: "ws1".to_string(),
        config_values: "replicas: 1".to_string(),
        operator: "alice".to_string(),
    }
}

fn chart_package(name: &str, version: &str) -> Vec<u8> {
    let chart_yaml = format!("name: {name}\nversion: {version}\nappVersion: \"1.0\"\n");
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(chart_yaml.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder
        .append_data(&mut header, format!("{name}/Chart.yaml"), chart_yaml.as_bytes())
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

#[tokio::test]
async fn repo_to_release_and_upgrade() {
    let h = Harness::start(StateStore::open_in_memory().unwrap());

    let stored = h.store.create(&wordpress_repo(&[("V1", "5.0.0")])).unwrap();
    assert!(h.wait_for_version("V1").await);
    assert_eq!(h.cache.get_application("A1").await.unwrap().name, "wordpress");

    let release = h
        .releases
        .create_release("default", create_req("my-wp", "V1"))
        .await
        .unwrap();
    assert_eq!(release.revision, 1);
    assert_eq!(release.status, ReleaseStatus::Pending);

    let err = h
        .releases
        .create_release("default", create_req("my-wp", "V1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    // The repo is re-crawled and now carries V2.
    let mut recrawled = wordpress_repo(&[("V1", "5.0.0"), ("V2", "5.1.0")]);
    recrawled.resource_version = stored.resource_version;
    h.store.update(&recrawled).unwrap();
    assert!(h.wait_for_version("V2").await);

    let upgrade = UpgradeReleaseRequest {
        release_id: release.id.clone(),
        namespace: "default".to_string(),
        version_id: "V2".to_string(),
        config_values: None,
        operator: "bob".to_string(),
    };
    let err = h.releases.upgrade_release(upgrade.clone()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(h.releases.get_release("default", &release.id).unwrap(), release);

    h.releases
        .set_status("default", &release.id, ReleaseStatus::Active, "installed")
        .unwrap();
    let upgraded = h.releases.upgrade_release(upgrade).await.unwrap();
    assert_eq!(upgraded.revision, 2);
    assert_eq!(upgraded.version_id, "V2");
    assert_eq!(upgraded.chart.version, "5.1.0");
    assert_eq!(upgraded.config_values, "replicas: 1");

    let versions = h.cache.list_application_versions("A1").await.unwrap();
    let order: Vec<_> = versions.iter().map(|v| v.version.as_str()).collect();
    assert_eq!(order, vec!["5.0.0", "5.1.0"]);

    h.stop().await;
}

#[tokio::test]
async fn uploaded_version_goes_through_review_to_release() {
    let h = Harness::start(StateStore::open_in_memory().unwrap());
    let lifecycle = h.lifecycle(TransitionPolicy::Strict);

    let app = Application {
        id: "blog".to_string(),
        name: "blog".to_string(),
        workspace: "ws1".to_string(),
        repo_id: BUILTIN.to_string(),
        spec: ApplicationSpec {
            description: "reviewed description".to_string(),
            ..Default::default()
        },
        ..Default::default()
    };
    h.store.create(&app).unwrap();
    h.store
        .create(&Application {
            id: "blog-store".to_string(),
            spec: ApplicationSpec {
                description: "stale".to_string(),
                ..Default::default()
            },
            ..app.clone()
        })
        .unwrap();

    let version = lifecycle
        .create_version(CreateVersionRequest {
            app_id: "blog".to_string(),
            workspace: "ws1".to_string(),
            package: chart_package("blog", "0.1.0"),
            operator: "dev".to_string(),
            message: "first cut".to_string(),
        })
        .unwrap();
    assert_eq!(version.state(), VersionState::Draft);

    // Releasing straight from draft is refused under strict transitions.
    let err = lifecycle
        .apply_action(&version.id, "release", "ops", "")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    for (action, operator) in [("submit", "dev"), ("pass", "reviewer"), ("release", "ops")] {
        lifecycle
            .apply_action(&version.id, action, operator, "")
            .await
            .unwrap();
    }
    let published: ApplicationVersion = h.store.get(&version.id).unwrap().unwrap();
    assert_eq!(published.state(), VersionState::Active);
    assert_eq!(published.audit.len(), 4);

    let copy: Application = h.store.get("blog-store").unwrap().unwrap();
    assert_eq!(copy.spec.description, "reviewed description");

    let mut req = create_req("my-blog", &version.id);
    req.repo_id = String::new();
    req.app_id = "blog".to_string();
    let release = h.releases.create_release("default", req).await.unwrap();
    assert_eq!(release.chart.name, "blog");

    match h.releases.chart_source("default", &release.id).await.unwrap() {
        ChartSource::Package(bytes) => assert_eq!(bytes, chart_package("blog", "0.1.0")),
        other => panic!("expected package, got {other:?}"),
    }

    h.stop().await;
}

#[tokio::test]
async fn cache_miss_fallback_depends_on_repo() {
    let h = Harness::start(StateStore::open_in_memory().unwrap());
    let stray = ApplicationVersion {
        id: "S1".to_string(),
        app_id: "A1".to_string(),
        version: "9.9.9".to_string(),
        ..Default::default()
    };
    h.store.create(&stray).unwrap();

    let direct: ApplicationVersion = h.store.get("S1").unwrap().unwrap();
    assert_eq!(h.releases.get_app_version("", "S1").await.unwrap(), direct);
    assert_eq!(h.releases.get_app_version(BUILTIN, "S1").await.unwrap(), direct);

    let err = h.releases.get_app_version("R", "S1").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    h.stop().await;
}

#[tokio::test]
async fn bad_snapshot_keeps_last_good_index() {
    let h = Harness::start(StateStore::open_in_memory().unwrap());
    let stored = h.store.create(&wordpress_repo(&[("V1", "5.0.0")])).unwrap();
    assert!(h.wait_for_version("V1").await);

    let mut broken = stored.clone();
    broken.index_snapshot = "{not json".to_string();
    h.store.update(&broken).unwrap();

    // A later good repo proves the listener kept going past the bad event.
    let mut other = wordpress_repo(&[("O1", "1.0.0")]);
    other.id = "R2".to_string();
    other.index_snapshot = other.index_snapshot.replace("\"A1\"", "\"B1\"");
    h.store.create(&other).unwrap();
    assert!(h.wait_for_version("O1").await);
    assert!(h.cache.get_application_version("V1").await.is_some());

    h.stop().await;
}

#[tokio::test]
async fn releases_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.redb");

    let release_id = {
        let h = Harness::start(StateStore::open(&path, 64).unwrap());
        h.store.create(&wordpress_repo(&[("V1", "5.0.0")])).unwrap();
        assert!(h.wait_for_version("V1").await);
        let release = h
            .releases
            .create_release("default", create_req("my-wp", "V1"))
            .await
            .unwrap();
        let id = release.id.clone();
        h.stop().await;
        id
    };

    let h = Harness::start(StateStore::open(&path, 64).unwrap());
    assert!(h.wait_for_version("V1").await);

    let query = ListQuery {
        namespace: "default".to_string(),
        ..Default::default()
    };
    let list = h.releases.list_releases(&query).await.unwrap();
    assert_eq!(list.total, 1);
    assert_eq!(list.items[0].release.id, release_id);
    assert_eq!(list.items[0].version.id, "V1");

    h.stop().await;
}
