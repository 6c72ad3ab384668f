//! Deterministic result cache keys
//!
//! A SHA-1 digest over everything that determines a query's result, fed
//! in a fixed order:
//!
//! 1. hashing version (i32 BE), legacy discriminator (i32 BE, 1 or 2)
//! 2. result format
//! 3. each command's display form
//! 4. per dataset: name, start and end millis (i64 BE), aliases sorted by
//!    new name, then each resolved shard's file name and doc count (i32 BE)
//! 5. cache-relevant options, sorted
//! 6. row limit (i32 BE, -1 for none)
//!
//! Strings are fed as their UTF-8 byte length (i32 BE) followed by the
//! bytes, so adjacent strings cannot run into each other.

use std::collections::BTreeSet;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

use crate::session::FieldAlias;

/// Bump when the key layout or result format changes
pub const VERSION_FOR_HASHING: i32 = 6;

const IGNORED_OPTIONS: [&str; 3] = ["nocache", "paranoid", "parallel"];

/// Whether an option changes what a query returns
pub fn is_cache_relevant(option: &str) -> bool {
    let lower = option.to_ascii_lowercase();
    !(IGNORED_OPTIONS.contains(&lower.as_str())
        || lower.starts_with("trace")
        || lower.starts_with("debug"))
}

/// One resolved index shard
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardFingerprint {
    pub file_name: String,
    pub num_docs: i32,
}

/// Everything about one dataset that feeds the key
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DatasetFingerprint {
    pub name: String,
    pub start_millis: i64,
    pub end_millis: i64,
    pub aliases: Vec<FieldAlias>,
    /// None until shards have been resolved
    pub shards: Option<Vec<ShardFingerprint>>,
}

/// Key inputs, in query order
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CacheKeyInput {
    pub legacy: bool,
    pub result_format: String,
    /// Display forms of the commands
    pub commands: Vec<String>,
    pub datasets: Vec<DatasetFingerprint>,
    pub options: Vec<String>,
    pub row_limit: Option<u32>,
}

/// Digest plus the cache file name derived from it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CacheKey {
    pub digest: String,
    pub file_name: String,
}

impl CacheKey {
    pub fn compute(input: &CacheKeyInput) -> CacheKey {
        let mut sha1 = Sha1::new();
        sha1.update(VERSION_FOR_HASHING.to_be_bytes());
        sha1.update((if input.legacy { 1i32 } else { 2i32 }).to_be_bytes());
        update_str(&mut sha1, &input.result_format);
        for command in &input.commands {
            update_str(&mut sha1, command);
        }
        for dataset in &input.datasets {
            update_str(&mut sha1, &dataset.name);
            sha1.update(dataset.start_millis.to_be_bytes());
            sha1.update(dataset.end_millis.to_be_bytes());

            let mut aliases: Vec<&FieldAlias> = dataset.aliases.iter().collect();
            aliases.sort_by(|a, b| a.new_name.cmp(&b.new_name));
            for alias in aliases {
                update_str(
                    &mut sha1,
                    &format!(
                        "FieldAlias{{originalName={:?}, newName={:?}}}",
                        alias.original_name, alias.new_name
                    ),
                );
            }

            if let Some(shards) = &dataset.shards {
                for shard in shards {
                    update_str(&mut sha1, &shard.file_name);
                    sha1.update(shard.num_docs.to_be_bytes());
                }
            }
        }
        let options: BTreeSet<&str> = input.options.iter().map(String::as_str).collect();
        for option in options {
            if is_cache_relevant(option) {
                update_str(&mut sha1, option);
            }
        }
        let row_limit = input
            .row_limit
            .and_then(|l| i32::try_from(l).ok())
            .unwrap_or(-1);
        sha1.update(row_limit.to_be_bytes());

        let digest = URL_SAFE_NO_PAD.encode(sha1.finalize());
        let file_name = format!("IQL2-{}.tsv", digest);
        CacheKey { digest, file_name }
    }
}

fn update_str(sha1: &mut Sha1, value: &str) {
    let len = i32::try_from(value.len()).unwrap_or(i32::MAX);
    sha1.update(len.to_be_bytes());
    sha1.update(value.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> CacheKeyInput {
        CacheKeyInput {
            legacy: false,
            result_format: "tsv".into(),
            commands: vec!["GetGroupStats{metrics=[count()]}".into()],
            datasets: vec![DatasetFingerprint {
                name: "jobs".into(),
                start_millis: 0,
                end_millis: 86_400_000,
                aliases: vec![FieldAlias::new("country", "c"), FieldAlias::new("clicks", "k")],
                shards: None,
            }],
            options: vec![],
            row_limit: None,
        }
    }

    #[test]
    fn test_shape() {
        let key = CacheKey::compute(&input());
        // 20 bytes, base64 without padding
        assert_eq!(key.digest.len(), 27);
        assert!(!key.digest.contains('='));
        assert!(!key.digest.contains('+') && !key.digest.contains('/'));
        assert_eq!(key.file_name, format!("IQL2-{}.tsv", key.digest));
    }

    #[test]
    fn test_deterministic() {
        assert_eq!(CacheKey::compute(&input()), CacheKey::compute(&input()));
    }

    #[test]
    fn test_option_relevance() {
        assert!(!is_cache_relevant("nocache"));
        assert!(!is_cache_relevant("paranoid"));
        assert!(!is_cache_relevant("parallel"));
        assert!(!is_cache_relevant("traceQuery"));
        assert!(!is_cache_relevant("debugStats"));
        assert!(is_cache_relevant("version"));
    }

    #[test]
    fn test_adjacent_strings_do_not_run_together() {
        let mut joined = input();
        joined.options = vec!["ab".into()];
        let mut split = input();
        split.options = vec!["a".into(), "b".into()];
        assert_ne!(CacheKey::compute(&joined), CacheKey::compute(&split));

        let mut commands = input();
        commands.commands = vec!["Densify{}".into(), "GetGroupStats{}".into()];
        let mut merged = input();
        merged.commands = vec!["Densify{}GetGroupStats{}".into()];
        assert_ne!(CacheKey::compute(&commands), CacheKey::compute(&merged));
    }

    #[test]
    fn test_legacy_flag_changes_key() {
        let mut legacy = input();
        legacy.legacy = true;
        assert_ne!(CacheKey::compute(&legacy), CacheKey::compute(&input()));
    }
}
