mod support;

use kindling_core::config::ConfigStore;
use kindling_core::error::Error;
use kindling_core::resolver::{ensure_versions, resolve_version};
use kindling_core::types::BootstrapperKind;

use support::CountingFinder;

const RELEASES: [&str; 6] = [
    "v1.19.0", "v1.19.2", "v1.18.4", "v1.18.8", "v1.17.9", "v1.16.3",
];

fn store(temp: &tempfile::TempDir) -> ConfigStore {
    ConfigStore::new(temp.path().join("clusters"), temp.path().join("cache"))
}

#[tokio::test]
async fn window_is_bounded_and_distinct_by_minor() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = store(&temp);
    let finder = CountingFinder::new(BootstrapperKind::K3s, &RELEASES);

    let records = ensure_versions(&finder, &store).await.unwrap();
    let versions: Vec<String> = records.iter().map(|r| r.version().to_string()).collect();
    assert_eq!(versions, ["v1.19.2", "v1.18.8", "v1.17.9"]);
}

#[tokio::test]
async fn resolution_is_deterministic() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = store(&temp);
    let finder = CountingFinder::new(BootstrapperKind::K3s, &RELEASES);

    let first = resolve_version(&finder, &store, "", false).await.unwrap();
    let second = resolve_version(&finder, &store, "", false).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.version().to_string(), "v1.19.2");
}

#[tokio::test]
async fn cached_window_short_circuits_upstream() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = store(&temp);
    let finder = CountingFinder::new(BootstrapperKind::K3s, &RELEASES);

    resolve_version(&finder, &store, "", false).await.unwrap();
    let calls_after_first = finder.calls();
    assert!(calls_after_first > 0);

    resolve_version(&finder, &store, "", false).await.unwrap();
    resolve_version(&finder, &store, "v1.18", false).await.unwrap();
    assert_eq!(finder.calls(), calls_after_first);
}

#[tokio::test]
async fn minor_prefix_picks_window_patch() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = store(&temp);
    let finder = CountingFinder::new(BootstrapperKind::K3s, &RELEASES);

    let record = resolve_version(&finder, &store, "v1.18", false)
        .await
        .unwrap();
    assert_eq!(record.version().to_string(), "v1.18.8");
}

#[tokio::test]
async fn full_version_outside_window_is_probed_upstream() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = store(&temp);
    let finder = CountingFinder::new(BootstrapperKind::K3s, &RELEASES);

    let record = resolve_version(&finder, &store, "v1.18.4", false)
        .await
        .unwrap();
    assert_eq!(record.version().to_string(), "v1.18.4");

    let err = resolve_version(&finder, &store, "v1.18.99", false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::VersionNotFound { .. }));
}

#[tokio::test]
async fn unknown_minor_is_rejected() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = store(&temp);
    let finder = CountingFinder::new(BootstrapperKind::K3s, &RELEASES);

    let err = resolve_version(&finder, &store, "v9.9", false)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::VersionNotFound { .. }));
}

#[tokio::test]
async fn force_busts_the_cache() {
    let temp = tempfile::TempDir::new().unwrap();
    let store = store(&temp);
    let finder = CountingFinder::new(BootstrapperKind::K3s, &RELEASES);

    resolve_version(&finder, &store, "", false).await.unwrap();
    let calls_after_first = finder.calls();

    resolve_version(&finder, &store, "", true).await.unwrap();
    assert!(finder.calls() > calls_after_first);
}
