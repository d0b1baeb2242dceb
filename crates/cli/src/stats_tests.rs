// SPDX-License-Identifier: MIT

use super::*;

#[test]
fn text_round_trip() {
    let mut c = Counters::new();
    c.increment(Field::CacheMiss, 1);
    c.increment(Field::HitDirect, 3);
    let text = c.to_text();
    let parsed = Counters::from_text(&text);
    assert_eq!(parsed.get(Field::CacheMiss), 1);
    assert_eq!(parsed.get(Field::HitDirect), 3);
}

#[test]
fn corrupt_file_yields_zero_vector() {
    let parsed = Counters::from_text("not-a-number\nalso bad\n");
    assert!(parsed.all_zero());
}

#[test]
fn unknown_trailing_positions_preserved_through_apply_delta() {
    let mut current = Counters::from_text("1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n11\n12\n13\n14\n15\n16\n17\n18\n19\n20\n21\n22\n23\n24\n25\n26\n27\n28\n29\n30\n31\n32\n999\n");
    let delta = Counters::new();
    current.apply_delta(&delta);
    assert_eq!(current.values.len(), KNOWN_FIELDS + 1);
    assert_eq!(current.values[KNOWN_FIELDS], 999);
}

#[test]
fn increment_never_goes_negative() {
    let mut c = Counters::new();
    c.increment(Field::CacheMiss, -5);
    assert_eq!(c.get(Field::CacheMiss), 0);
}

#[test]
fn apply_delta_accumulates_non_absolute_and_overwrites_absolute() {
    let mut current = Counters::new();
    current.set_mut(Field::CacheMiss, 2);
    current.set_mut(Field::FilesInCache, 10);

    let mut delta = Counters::new();
    delta.set_mut(Field::CacheMiss, 3);
    delta.set_mut(Field::FilesInCache, 42);

    current.apply_delta(&delta);
    assert_eq!(current.get(Field::CacheMiss), 5);
    assert_eq!(current.get(Field::FilesInCache), 42);
}

#[test]
fn zero_preserves_absolute_fields() {
    let mut c = Counters::new();
    c.set_mut(Field::CacheMiss, 7);
    c.set_mut(Field::FilesInCache, 100);
    zero(&mut c, 12345);
    assert_eq!(c.get(Field::CacheMiss), 0);
    assert_eq!(c.get(Field::FilesInCache), 100);
    assert_eq!(c.get(Field::ZeroTimestamp), 12345);
}

#[test]
fn read_missing_file_is_zero_counters() {
    let path = std::path::Path::new("/nonexistent/ccwrap-stats-file-xyz");
    let counters = read(path);
    assert!(counters.all_zero());
}
