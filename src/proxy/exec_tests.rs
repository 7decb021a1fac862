// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `exec.rs`

#[cfg(test)]
mod tests {
    use super::super::{run_command, CommandError, ExecutionStrategy};
    use crate::config::ProxyConfig;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;
    use tokio_util::sync::CancellationToken;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_custom_command_takes_priority() {
        let config = ProxyConfig {
            check_command: Some(argv(&["sudo", "nginx"])),
            container: Some("proxy".to_string()),
            ..ProxyConfig::default()
        };

        let strategy = ExecutionStrategy::from_config(&config);

        assert_eq!(strategy.name(), "custom");
        assert_eq!(strategy.command(&["-t"]), argv(&["sudo", "nginx", "-t"]));
    }

    #[test]
    fn test_container_selected_when_configured() {
        let config = ProxyConfig {
            container: Some("edge-proxy".to_string()),
            ..ProxyConfig::default()
        };

        let strategy = ExecutionStrategy::from_config(&config);

        assert_eq!(strategy.name(), "container");
        assert_eq!(
            strategy.command(&["-s", "reload"]),
            argv(&["docker", "exec", "edge-proxy", "nginx", "-s", "reload"])
        );
    }

    #[test]
    fn test_local_is_the_fallback() {
        let config = ProxyConfig {
            check_command: Some(vec![]),
            container: Some("  ".to_string()),
            ..ProxyConfig::default()
        };

        let strategy = ExecutionStrategy::from_config(&config);

        assert_eq!(strategy.name(), "local");
        assert_eq!(strategy.command(&["-t"]), argv(&["nginx", "-t"]));
    }

    #[tokio::test]
    async fn test_run_command_captures_status() {
        let cancel = CancellationToken::new();

        let ok = run_command(&argv(&["true"]), Duration::from_secs(5), &cancel)
            .await
            .unwrap();
        let failed = run_command(&argv(&["false"]), Duration::from_secs(5), &cancel)
            .await
            .unwrap();

        assert!(ok.success);
        assert_eq!(ok.status, "0");
        assert!(!failed.success);
        assert_eq!(failed.status, "1");
    }

    #[tokio::test]
    async fn test_run_command_captures_output() {
        let cancel = CancellationToken::new();

        let out = run_command(
            &argv(&["sh", "-c", "echo problem >&2; echo detail"]),
            Duration::from_secs(5),
            &cancel,
        )
        .await
        .unwrap();

        assert_eq!(out.output, "problem\ndetail");
    }

    #[tokio::test]
    async fn test_missing_program_is_not_found() {
        let cancel = CancellationToken::new();

        let err = run_command(
            &argv(&["edgeplane-definitely-missing-binary"]),
            Duration::from_secs(5),
            &cancel,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, CommandError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_run_command_times_out() {
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let err = run_command(&argv(&["sleep", "5"]), Duration::from_millis(100), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Timeout));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_run_command_honors_cancellation() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let err = run_command(&argv(&["sleep", "5"]), Duration::from_secs(10), &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, CommandError::Cancelled));
    }

    #[tokio::test]
    async fn test_local_target_requires_live_pid() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("nginx.pid");
        let strategy = ExecutionStrategy::Local {
            binary: "nginx".to_string(),
            pid_file: pid_file.clone(),
        };
        let cancel = CancellationToken::new();
        let timeout = Duration::from_secs(1);

        assert!(!strategy.target_running(timeout, &cancel).await.unwrap());

        std::fs::write(&pid_file, "not-a-pid").unwrap();
        assert!(!strategy.target_running(timeout, &cancel).await.unwrap());

        std::fs::write(&pid_file, std::process::id().to_string()).unwrap();
        assert!(strategy.target_running(timeout, &cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_container_target_absent_when_runtime_missing() {
        let strategy = ExecutionStrategy::Container {
            runtime: "edgeplane-missing-runtime".to_string(),
            container: "proxy".to_string(),
            binary: "nginx".to_string(),
        };

        let running = strategy
            .target_running(Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();

        assert!(!running);
    }

    #[tokio::test]
    async fn test_custom_target_always_running() {
        let strategy = ExecutionStrategy::Custom {
            argv: vec!["true".to_string()],
        };

        assert!(strategy
            .target_running(Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap());
    }
}
