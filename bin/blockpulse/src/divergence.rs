//! Cross-endpoint height divergence within each logical chain.

use crate::probe::ProbeResult;
use std::collections::HashMap;

/// For each chain with at least one successful probe, compute how far each
/// endpoint's height sits behind the chain's best-known height.
///
/// The endpoint holding the maximum gets 0. Failed probes contribute
/// nothing and are absent from the map. Keys are endpoint URLs.
pub fn compute_divergence(results: &[ProbeResult]) -> HashMap<String, u64> {
    let mut by_chain: HashMap<&str, Vec<(&str, u64)>> = HashMap::new();
    for result in results {
        if !result.is_success() {
            continue;
        }
        let Some(height) = result.latest_block_height else {
            continue;
        };
        by_chain
            .entry(result.endpoint.chain.as_str())
            .or_default()
            .push((result.endpoint.url.as_str(), height));
    }

    let mut divergence = HashMap::new();
    for group in by_chain.into_values() {
        let Some(max_height) = group.iter().map(|(_, height)| *height).max() else {
            continue;
        };
        for (url, height) in group {
            divergence.insert(url.to_owned(), max_height - height);
        }
    }
    divergence
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{ApiClass, Endpoint};

    fn result(chain: &str, url: &str, height: Option<u64>) -> ProbeResult {
        ProbeResult {
            endpoint: Endpoint {
                chain: chain.into(),
                url: url.parse().unwrap(),
                api_class: ApiClass::Ethereum,
            },
            latest_block_height: height,
            latency: None,
            http_status: height.map(|_| 200),
            exit_code: if height.is_some() { 0 } else { 1 },
            error: height.map_or_else(|| Some("connection refused".into()), |_| None),
        }
    }

    #[test]
    fn leader_zero_laggard_behind() {
        let results = vec![
            result("Ethereum", "https://eth.example/", Some(100)),
            result("Ethereum", "https://eth2.example/", Some(95)),
        ];
        let divergence = compute_divergence(&results);
        assert_eq!(divergence["https://eth.example/"], 0);
        assert_eq!(divergence["https://eth2.example/"], 5);
    }

    #[test]
    fn chains_are_independent() {
        let results = vec![
            result("Ethereum", "https://eth.example/", Some(100)),
            result("Polkadot", "https://dot.example/", Some(7)),
            result("Polkadot", "https://dot2.example/", Some(9)),
        ];
        let divergence = compute_divergence(&results);
        assert_eq!(divergence["https://eth.example/"], 0);
        assert_eq!(divergence["https://dot.example/"], 2);
        assert_eq!(divergence["https://dot2.example/"], 0);
    }

    #[test]
    fn failed_probes_are_absent() {
        let results = vec![
            result("Ethereum", "https://eth.example/", Some(100)),
            result("Ethereum", "https://down.example/", None),
        ];
        let divergence = compute_divergence(&results);
        assert_eq!(divergence.len(), 1);
        assert!(!divergence.contains_key("https://down.example/"));
    }

    #[test]
    fn all_failed_group_contributes_nothing() {
        let results = vec![
            result("Ethereum", "https://down.example/", None),
            result("Ethereum", "https://down2.example/", None),
        ];
        assert!(compute_divergence(&results).is_empty());
    }

    #[test]
    fn single_endpoint_has_zero_divergence() {
        let results = vec![result("Ethereum", "https://eth.example/", Some(42))];
        assert_eq!(compute_divergence(&results)["https://eth.example/"], 0);
    }
}
