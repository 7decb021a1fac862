// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for DNS error types.

#[cfg(test)]
mod tests {
    use crate::dns_errors::*;
    use std::time::Duration;

    #[test]
    fn test_zone_not_found_error() {
        let error = ProviderError::ZoneNotFound {
            domain: "app.example.com".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "No active zone found for domain 'app.example.com'"
        );
        assert!(!error.is_transient());
        assert_eq!(error.reason(), "ZoneNotFound");
    }

    #[test]
    fn test_api_error_lists_provider_messages() {
        let error = ProviderError::Api {
            operation: "create record",
            domain: "app.example.com".to_string(),
            status: 400,
            messages: vec![
                ApiMessage {
                    code: 81057,
                    message: "Record already exists.".to_string(),
                },
                ApiMessage {
                    code: 1004,
                    message: "DNS Validation Error".to_string(),
                },
            ],
        };

        assert_eq!(
            error.to_string(),
            "create record failed for 'app.example.com' (HTTP 400): [81057] Record already exists.; [1004] DNS Validation Error"
        );
    }

    #[test]
    fn test_api_error_without_messages() {
        let error = ProviderError::Api {
            operation: "list records",
            domain: "example.com".to_string(),
            status: 200,
            messages: vec![],
        };

        assert!(error.to_string().ends_with("no error details"));
    }

    #[test]
    fn test_auth_failures_are_permanent() {
        let error = ProviderError::Api {
            operation: "zone lookup",
            domain: "example.com".to_string(),
            status: 403,
            messages: vec![],
        };

        assert!(!error.is_transient());
        assert_eq!(error.reason(), "ProviderAuthFailed");
    }

    #[test]
    fn test_server_errors_are_transient() {
        let error = ProviderError::Api {
            operation: "zone lookup",
            domain: "example.com".to_string(),
            status: 502,
            messages: vec![],
        };

        assert!(error.is_transient());
        assert_eq!(error.reason(), "ProviderApiError");
    }

    #[test]
    fn test_rate_limited_is_transient() {
        let error = ProviderError::RateLimited {
            operation: "zone lookup",
            domain: "example.com".to_string(),
            attempts: 11,
            retry_after: Duration::from_secs(2),
        };

        assert!(error.is_transient());
        assert_eq!(error.reason(), "ProviderRateLimited");
    }

    #[test]
    fn test_cancelled_is_not_transient() {
        let error = ProviderError::Cancelled {
            operation: "ensure TXT",
            domain: "_acme-challenge.example.com".to_string(),
        };

        assert!(error.is_cancelled());
        assert!(!error.is_transient());
        assert_eq!(
            error.to_string(),
            "ensure TXT for '_acme-challenge.example.com' was cancelled"
        );
    }

    #[test]
    fn test_inspect_query_error() {
        let error = InspectError::Query {
            name: "www.example.com".to_string(),
            record_type: "A".to_string(),
            server: "1.1.1.1:53".to_string(),
            reason: "timed out".to_string(),
        };

        assert_eq!(
            error.to_string(),
            "A lookup for 'www.example.com' against 1.1.1.1:53 failed: timed out"
        );
    }
}
