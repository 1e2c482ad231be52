// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `main.rs` - command line parsing

#[cfg(test)]
mod tests {
    use super::super::Cli;
    use clap::Parser;
    use lightspeed_operator::constants::{APP_SERVER_DEFAULT_IMAGE, DEFAULT_NAMESPACE};
    use std::time::Duration;

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["lightspeed-operator"]).unwrap();
        let options = cli.operator_options();

        if std::env::var("WATCH_NAMESPACE").is_err() {
            assert_eq!(options.namespace, DEFAULT_NAMESPACE);
        }
        assert_eq!(options.app_server_image, APP_SERVER_DEFAULT_IMAGE);
        assert_eq!(options.reconcile_interval, Duration::from_secs(600));
        assert!(!cli.leader_elect);
        assert_eq!(cli.metrics_bind_address.port(), 8080);
        assert_eq!(cli.health_probe_bind_address.port(), 8081);
    }

    #[test]
    fn test_flags_fold_into_options() {
        let cli = Cli::try_parse_from([
            "lightspeed-operator",
            "--namespace",
            "ols",
            "--reconcile-interval",
            "2",
            "--service-image",
            "quay.io/ols/api:1",
            "--console-image",
            "quay.io/ols/console:1",
            "--postgres-image",
            "quay.io/ols/pg:16",
            "--leader-elect",
        ])
        .unwrap();
        let options = cli.operator_options();

        assert_eq!(options.namespace, "ols");
        assert_eq!(options.reconcile_interval, Duration::from_secs(120));
        assert_eq!(options.app_server_image, "quay.io/ols/api:1");
        assert_eq!(options.console_image, "quay.io/ols/console:1");
        assert_eq!(options.postgres_image, "quay.io/ols/pg:16");
        assert!(cli.leader_elect);
    }

    #[test]
    fn test_invalid_bind_address_rejected() {
        let result = Cli::try_parse_from([
            "lightspeed-operator",
            "--metrics-bind-address",
            "not-an-address",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_package_metadata() {
        assert_eq!(env!("CARGO_PKG_NAME"), "lightspeed-operator");
        assert_eq!(env!("CARGO_PKG_LICENSE"), "MIT");
        // No public source location is published for this package.
        assert!(env!("CARGO_PKG_REPOSITORY").is_empty());
    }
}
