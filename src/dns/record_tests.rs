// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `record.rs`

#[cfg(test)]
mod tests {
    use super::super::{group_by_name_and_type, DnsRecord, RecordDiff, RecordType};
    use std::str::FromStr;

    #[test]
    fn test_record_type_parse_and_display() {
        assert_eq!(RecordType::from_str("aaaa").unwrap(), RecordType::AAAA);
        assert_eq!(RecordType::MX.to_string(), "MX");
        assert!(RecordType::from_str("SRV").is_err());
    }

    #[test]
    fn test_key_ignores_name_case_and_trailing_dot() {
        let a = DnsRecord::new("WWW.Example.com.", RecordType::A, "192.0.2.1");
        let b = DnsRecord::new("www.example.com", RecordType::A, "192.0.2.1");

        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_key_canonicalizes_ipv6() {
        let a = DnsRecord::new("example.com", RecordType::AAAA, "2001:db8:0:0:0:0:0:1");
        let b = DnsRecord::new("example.com", RecordType::AAAA, "2001:db8::1");

        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_key_normalizes_target_names() {
        let a = DnsRecord::new("www.example.com", RecordType::CNAME, "Edge.Example.net.");
        let b = DnsRecord::new("www.example.com", RecordType::CNAME, "edge.example.net");

        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_txt_value_is_case_sensitive() {
        let a = DnsRecord::new("_acme.example.com", RecordType::TXT, "Token");
        let b = DnsRecord::new("_acme.example.com", RecordType::TXT, "token");

        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_mx_key_includes_priority() {
        let a = DnsRecord::new("example.com", RecordType::MX, "mx.example.com").with_priority(10);
        let b = DnsRecord::new("example.com", RecordType::MX, "mx.example.com").with_priority(20);

        assert_ne!(a.key(), b.key());
    }

    #[test]
    fn test_ttl_is_not_part_of_key() {
        let a = DnsRecord::new("example.com", RecordType::A, "192.0.2.1").with_ttl(60);
        let b = DnsRecord::new("example.com", RecordType::A, "192.0.2.1").with_ttl(3600);

        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_group_by_name_and_type() {
        let records = vec![
            DnsRecord::new("b.example.com", RecordType::A, "192.0.2.2"),
            DnsRecord::new("A.example.com", RecordType::A, "192.0.2.1"),
            DnsRecord::new("a.example.com.", RecordType::A, "192.0.2.3"),
            DnsRecord::new("a.example.com", RecordType::TXT, "hello"),
        ];

        let groups = group_by_name_and_type(&records);

        let keys: Vec<_> = groups.keys().cloned().collect();
        assert_eq!(
            keys,
            vec![
                ("a.example.com".to_string(), RecordType::A),
                ("a.example.com".to_string(), RecordType::TXT),
                ("b.example.com".to_string(), RecordType::A),
            ]
        );
        assert_eq!(groups[&("a.example.com".to_string(), RecordType::A)].len(), 2);
    }

    #[test]
    fn test_diff_summary_and_convergence() {
        let record = DnsRecord::new("example.com", RecordType::A, "192.0.2.1");
        let converged = RecordDiff {
            matched: vec![record.clone()],
            ..RecordDiff::default()
        };
        let drifted = RecordDiff {
            matched: vec![],
            missing: vec![record.clone()],
            extra: vec![record],
        };

        assert!(converged.is_converged());
        assert_eq!(converged.summary(), "1 matching, 0 missing, 0 extra");
        assert!(!drifted.is_converged());
        assert_eq!(drifted.summary(), "0 matching, 1 missing, 1 extra");
    }

    #[test]
    fn test_record_deserializes_from_yaml() {
        let yaml = "name: example.com\ntype: MX\nvalue: mx.example.com\npriority: 10\n";

        let record: DnsRecord = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(record.record_type, RecordType::MX);
        assert_eq!(record.priority, Some(10));
        assert_eq!(record.ttl, None);
    }
}
