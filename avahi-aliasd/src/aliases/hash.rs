use serde::Serialize;
use sha2::{Sha256, Digest};
use shared::types::AliasEntry;

/// Only the record content is hashed; `published_at` changes whenever an
/// alias is republished without its record changing.
#[derive(Serialize)]
struct HashView<'a> {
    hostname: &'a str,
    target: &'a str,
}

/// Computes a SHA-256 hash of the alias list.
/// Aliases are sorted by hostname for deterministic output.
pub fn compute_hash(aliases: &[AliasEntry]) -> String {
    let mut views: Vec<HashView<'_>> = aliases
        .iter()
        .map(|a| HashView {
            hostname: &a.hostname,
            target: &a.target,
        })
        .collect();
    views.sort_by(|a, b| a.hostname.cmp(b.hostname));

    let mut hasher = Sha256::new();
    for view in &views {
        // serde_json cannot fail on two borrowed strings
        if let Ok(line) = serde_json::to_string(view) {
            hasher.update(line.as_bytes());
            hasher.update(b"\n");
        }
    }
    hex::encode(hasher.finalize())
}
