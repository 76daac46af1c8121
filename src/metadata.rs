//! Service metadata carried in container environment variables.
//!
//! `SERVICE_<KEY>=value` applies to every port of the container, while
//! `SERVICE_<PORT>_<KEY>=value` only applies to the given exposed port.
//! Keys are lower-cased; the last assignment of a key wins.

use std::collections::BTreeMap;

/// Reserved environment prefix used unless configured otherwise.
pub const DEFAULT_PREFIX: &str = "SERVICE_";

pub type Metadata = BTreeMap<String, String>;

/// Collects the metadata that applies to `port` from `env`.
pub fn parse_metadata(env: &[String], prefix: &str, port: &str) -> Metadata {
    let mut metadata = Metadata::new();
    for var in env {
        let Some((key, value)) = var.split_once('=') else {
            continue;
        };
        let Some(key) = key.strip_prefix(prefix) else {
            continue;
        };
        let key = key.to_lowercase();

        match key.split_once('_') {
            Some((scope, rest)) if scope.parse::<i64>().is_ok() => {
                if scope != port {
                    continue;
                }
                metadata.insert(rest.to_string(), value.to_string());
            }
            _ => {
                metadata.insert(key, value.to_string());
            }
        }
    }
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[&str]) -> Vec<String> {
        vars.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn global_keys_apply_to_every_port() {
        let env = env(&["SERVICE_NAME=frontend", "SERVICE_TAGS=prod,edge"]);
        for port in ["80", "443", "53"] {
            let md = parse_metadata(&env, DEFAULT_PREFIX, port);
            assert_eq!(md.get("name").map(String::as_str), Some("frontend"));
            assert_eq!(md.get("tags").map(String::as_str), Some("prod,edge"));
        }
    }

    #[test]
    fn port_scoped_keys_only_apply_to_their_port() {
        let env = env(&["SERVICE_80_NAME=http", "SERVICE_443_NAME=https"]);
        let md = parse_metadata(&env, DEFAULT_PREFIX, "80");
        assert_eq!(md.len(), 1);
        assert_eq!(md["name"], "http");

        let md = parse_metadata(&env, DEFAULT_PREFIX, "8080");
        assert!(md.is_empty());
    }

    #[test]
    fn last_assignment_wins() {
        let env = env(&[
            "SERVICE_NAME=one",
            "SERVICE_80_NAME=two",
            "SERVICE_NAME=three",
        ]);
        assert_eq!(parse_metadata(&env, DEFAULT_PREFIX, "80")["name"], "three");
        assert_eq!(parse_metadata(&env, DEFAULT_PREFIX, "81")["name"], "three");
    }

    #[test]
    fn keys_are_lowercased_and_values_kept_verbatim() {
        let env = env(&["SERVICE_Region=EU=West", "SERVICE_80_Check_HTTP=/Health"]);
        let md = parse_metadata(&env, DEFAULT_PREFIX, "80");
        assert_eq!(md["region"], "EU=West");
        assert_eq!(md["check_http"], "/Health");
    }

    #[test]
    fn ignores_unrelated_and_malformed_variables() {
        let env = env(&["PATH=/usr/bin", "SERVICE_NAME", "service_name=lower", "MY_SERVICE_X=1"]);
        assert!(parse_metadata(&env, DEFAULT_PREFIX, "80").is_empty());
    }

    #[test]
    fn bare_numeric_key_is_global() {
        let env = env(&["SERVICE_80=yes"]);
        let md = parse_metadata(&env, DEFAULT_PREFIX, "443");
        assert_eq!(md["80"], "yes");
    }

    #[test]
    fn honours_custom_prefix() {
        let env = env(&["REG_NAME=custom", "SERVICE_NAME=default"]);
        let md = parse_metadata(&env, "REG_", "80");
        assert_eq!(md.len(), 1);
        assert_eq!(md["name"], "custom");
    }
}
