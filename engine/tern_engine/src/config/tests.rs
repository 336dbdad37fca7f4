#![allow(clippy::unwrap_used)]

use std::time::Duration;

use pretty_assertions::assert_eq;

use super::*;

#[test]
fn defaults_match_the_allocator() {
    let config = EngineConfig::default();
    assert_eq!(config.alloc().memory_limit, 8 * 1024 * 1024);
    assert_eq!(config.alloc().cache_capacity, 256);
    assert_eq!(config.alloc().cache_classes, 11);
    assert_eq!(config.timeout, Some(Duration::from_secs(30)));
    assert_eq!(config.undefined_constants, UndefinedConstantPolicy::Error);
}

#[test]
fn byte_sizes_accept_shorthand() {
    assert_eq!(parse_byte_size("128"), Some(128));
    assert_eq!(parse_byte_size("128K"), Some(128 * 1024));
    assert_eq!(parse_byte_size(" 8m "), Some(8 * 1024 * 1024));
    assert_eq!(parse_byte_size("1G"), Some(1024 * 1024 * 1024));
    assert_eq!(parse_byte_size("-1"), Some(usize::MAX));
    assert_eq!(parse_byte_size(""), None);
    assert_eq!(parse_byte_size("M"), None);
    assert_eq!(parse_byte_size("lots"), None);
    assert_eq!(parse_byte_size(&format!("{}G", usize::MAX)), None);
}

#[test]
fn from_pairs_applies_directives() {
    let config = EngineConfig::from_pairs([
        ("memory_limit", "16M"),
        ("max_execution_time", "5"),
        ("memory_cache_capacity", "64"),
        ("debug_guards", "On"),
        ("undefined_constants", "assume_name"),
    ])
    .unwrap();

    assert_eq!(config.memory_limit, 16 * 1024 * 1024);
    assert_eq!(config.timeout, Some(Duration::from_secs(5)));
    assert_eq!(config.cache_capacity, 64);
    assert!(config.debug_guards);
    assert_eq!(config.undefined_constants, UndefinedConstantPolicy::AssumeName);
}

#[test]
fn zero_execution_time_disables_the_timeout() {
    let config = EngineConfig::from_pairs([("max_execution_time", "0")]).unwrap();
    assert_eq!(config.timeout, None);
}

#[test]
fn unknown_and_invalid_directives_are_rejected() {
    assert_eq!(
        EngineConfig::from_pairs([("safe_mode", "1")]),
        Err(ConfigError::UnknownDirective {
            key: "safe_mode".into()
        })
    );
    assert_eq!(
        EngineConfig::from_pairs([("debug_guards", "maybe")]),
        Err(ConfigError::InvalidValue {
            key: "debug_guards".into(),
            value: "maybe".into()
        })
    );
    assert_eq!(
        EngineConfig::from_pairs([("memory_limit", "0")]),
        Err(ConfigError::ZeroMemoryLimit)
    );
}

#[test]
fn builder_validates() {
    let config = EngineConfig::builder()
        .memory_limit(1024)
        .cache_capacity(4)
        .no_timeout()
        .debug_guards(true)
        .build()
        .unwrap();
    assert_eq!(config.memory_limit, 1024);
    assert_eq!(config.timeout, None);

    assert_eq!(
        EngineConfig::builder().memory_limit(0).build(),
        Err(ConfigError::ZeroMemoryLimit)
    );
}
