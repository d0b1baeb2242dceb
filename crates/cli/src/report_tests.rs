// SPDX-License-Identifier: MIT

use super::*;
use std::path::PathBuf;

#[test]
fn machine_format_lists_every_known_field_as_tab_separated_pairs() {
    let counters = Counters::new();
    let text = render_stats_machine(&counters);
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), KNOWN_FIELDS - 2); // obsolete fields omitted
    assert!(lines.iter().any(|l| *l == "cache_miss\t0"));
    assert!(lines.iter().all(|l| l.contains('\t')));
}

#[test]
fn machine_format_reflects_nonzero_counters() {
    let mut counters = Counters::new();
    counters.increment(Field::HitDirect, 3);
    counters.increment(Field::CacheMiss, 1);
    let text = render_stats_machine(&counters);
    assert!(text.lines().any(|l| l == "cache_hit_direct\t3"));
    assert!(text.lines().any(|l| l == "cache_miss\t1"));
}

#[test]
fn text_report_includes_cache_directory_and_nonzero_fields() {
    let mut config = Config::default();
    config.cache_dir = PathBuf::from("/tmp/ccwrap-report-test");
    let mut counters = Counters::new();
    counters.increment(Field::HitPreprocessor, 5);
    counters.increment(Field::FilesInCache, 12);

    let text = render_stats(&counters, &config);
    assert!(text.contains("/tmp/ccwrap-report-test"));
    assert!(text.contains("cache hit (preprocessed)"));
    assert!(text.contains("files in cache"));
    assert!(!text.contains("called for link"));
}

#[test]
fn human_size_formats_binary_units() {
    assert_eq!(human_size(0), "0 B");
    assert_eq!(human_size(512), "512 B");
    assert_eq!(human_size(1024), "1.0 KB");
    assert_eq!(human_size(10 * 1024 * 1024), "10.0 MB");
}

#[test]
fn cache_size_field_is_rendered_as_human_bytes_not_raw_kib() {
    let config = Config::default();
    let mut counters = Counters::new();
    counters.set_mut(Field::CacheSizeKib, 2048);
    let text = render_stats(&counters, &config);
    assert!(text.contains("2.0 MB"));
}
