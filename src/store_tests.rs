// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for the persistence layer.

#[cfg(test)]
mod tests {
    use crate::store::{ConfigStore, FileStore, MemoryStore};
    use crate::types::{CertificateStatus, Route, RouteWithBinding};
    use std::fs;
    use tempfile::TempDir;

    fn route(id: i64, domain: &str) -> RouteWithBinding {
        RouteWithBinding::new(
            Route {
                id,
                service_id: "svc-1".to_string(),
                domain: domain.to_string(),
                port: 80,
                use_tls: false,
                path: None,
            },
            "app-1",
        )
    }

    const STATE: &str = r"
services:
  - id: svc-1
    name: app-1
routes:
  - id: 1
    serviceId: svc-1
    domain: a.example.com
    port: 80
  - id: 2
    serviceId: svc-1
    domain: b.example.com
    port: 443
    useTls: true
    path: /api
certificates:
  - id: 7
    domain: b.example.com
    status: active
    certificatePem: CERT
    privateKeyPem: KEY
";

    // =====================================================
    // MemoryStore
    // =====================================================

    #[tokio::test]
    async fn test_memory_store_watermark_advances_strictly() {
        let store = MemoryStore::new();
        let before = store.last_updated().await.unwrap();

        store.set_routes(vec![route(1, "a.example.com")]).await;
        let after_first = store.last_updated().await.unwrap();
        store.touch().await;
        let after_second = store.last_updated().await.unwrap();

        assert!(after_first > before);
        assert!(after_second > after_first);
    }

    #[tokio::test]
    async fn test_memory_store_upserts_by_id() {
        let store = MemoryStore::new();
        store.upsert_route(route(1, "a.example.com")).await;
        store.upsert_route(route(1, "c.example.com")).await;
        store.upsert_route(route(2, "b.example.com")).await;

        let routes = store.routes_with_services().await.unwrap();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[0].route.domain, "c.example.com");
    }

    #[tokio::test]
    async fn test_snapshot_activation_is_exclusive_and_keeps_history() {
        let store = MemoryStore::new();
        let first = store.create_config_snapshot("h1", "one").await.unwrap();
        let second = store.create_config_snapshot("h2", "two").await.unwrap();

        assert!(!first.active);
        store.set_active_config_snapshot(first.id).await.unwrap();
        store.set_active_config_snapshot(second.id).await.unwrap();

        let history = store.snapshots().await;
        assert_eq!(history.len(), 2);
        assert!(!history[0].active);
        assert!(history[1].active);
        assert_eq!(
            store.active_config_snapshot().await.unwrap().unwrap().id,
            second.id
        );
    }

    #[tokio::test]
    async fn test_snapshot_lookup_by_hash() {
        let store = MemoryStore::new();
        store.create_config_snapshot("h1", "one").await.unwrap();

        assert!(store.config_snapshot_by_hash("h1").await.unwrap().is_some());
        assert!(store.config_snapshot_by_hash("h2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_activating_unknown_snapshot_fails() {
        let store = MemoryStore::new();
        assert!(store.set_active_config_snapshot(42).await.is_err());
    }

    // =====================================================
    // FileStore
    // =====================================================

    #[tokio::test]
    async fn test_file_store_joins_routes_with_services() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.yaml");
        fs::write(&path, STATE).unwrap();
        let store = FileStore::new(&path);

        let routes = store.routes_with_services().await.unwrap();
        let certificates = store.list_certificates().await.unwrap();

        assert_eq!(routes.len(), 2);
        assert_eq!(routes[1].binding.service_name, "app-1");
        assert!(routes[1].route.use_tls);
        assert_eq!(routes[1].route.path.as_deref(), Some("/api"));
        assert_eq!(certificates.len(), 1);
        assert_eq!(certificates[0].status, CertificateStatus::Active);
    }

    #[tokio::test]
    async fn test_file_store_rejects_unknown_service() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.yaml");
        fs::write(
            &path,
            "routes:\n  - id: 3\n    serviceId: ghost\n    domain: a.example.com\n    port: 80\n",
        )
        .unwrap();

        let err = FileStore::new(&path).routes_with_services().await.unwrap_err();

        assert!(err.to_string().contains("unknown service 'ghost'"));
    }

    #[tokio::test]
    async fn test_file_store_empty_file_is_empty_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.yaml");
        fs::write(&path, "").unwrap();

        let routes = FileStore::new(&path).routes_with_services().await.unwrap();

        assert!(routes.is_empty());
    }

    #[tokio::test]
    async fn test_file_store_watermark_is_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.yaml");
        fs::write(&path, STATE).unwrap();
        let store = FileStore::new(&path);

        let watermark = store.last_updated().await.unwrap();
        let modified: chrono::DateTime<chrono::Utc> =
            fs::metadata(&path).unwrap().modified().unwrap().into();

        assert_eq!(watermark, modified);
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(dir.path().join("missing.yaml"));

        assert!(store.last_updated().await.is_err());
        assert!(store.routes_with_services().await.is_err());
    }
}
