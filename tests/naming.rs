// tests/naming.rs

use proptest::prelude::*;

use flowgraph::dag::naming::{
    MAX_TASK_NAME_LENGTH, has_separator, iteration_index_of, render, replication_index_of,
    strip_suffix, suffix,
};
use flowgraph::errors::FlowgraphError;

#[test]
fn suffix_is_empty_for_original_tasks() {
    assert_eq!(suffix(0, 0), "");
}

#[test]
fn suffix_puts_iteration_before_replication() {
    assert_eq!(suffix(4, 0), "#4");
    assert_eq!(suffix(0, 3), "*3");
    assert_eq!(suffix(2, 3), "#2*3");
}

#[test]
fn indexes_are_read_back_from_names() {
    assert_eq!(iteration_index_of("task#3*2"), 3);
    assert_eq!(replication_index_of("task#3*2"), 2);

    assert_eq!(iteration_index_of("task*5"), 0);
    assert_eq!(replication_index_of("task*5"), 5);

    assert_eq!(iteration_index_of("task"), 0);
    assert_eq!(replication_index_of("task"), 0);
}

#[test]
fn malformed_suffix_reads_as_zero() {
    assert_eq!(iteration_index_of("task#x"), 0);
    assert_eq!(iteration_index_of("task#"), 0);
    assert_eq!(replication_index_of("task*"), 0);
    assert_eq!(replication_index_of("task*-1"), 0);
}

#[test]
fn strip_suffix_returns_the_ambiguous_name() {
    assert_eq!(strip_suffix("build#1*2"), "build");
    assert_eq!(strip_suffix("build*2"), "build");
    assert_eq!(strip_suffix("build#7"), "build");
    assert_eq!(strip_suffix("build"), "build");
}

#[test]
fn render_replaces_any_existing_suffix() {
    assert_eq!(render("build#4*1", 2, 0).unwrap(), "build#2");
    assert_eq!(render("build", 0, 3).unwrap(), "build*3");
    assert_eq!(render("build#1", 0, 0).unwrap(), "build");
}

#[test]
fn render_rejects_names_over_the_limit() {
    let base = "x".repeat(MAX_TASK_NAME_LENGTH - 1);
    assert!(render(&base, 0, 0).is_ok());

    match render(&base, 1, 0) {
        Err(FlowgraphError::NameTooLong { len, max, .. }) => {
            assert_eq!(len, MAX_TASK_NAME_LENGTH + 1);
            assert_eq!(max, MAX_TASK_NAME_LENGTH);
        }
        other => panic!("expected NameTooLong, got {:?}", other),
    }
}

#[test]
fn separators_are_detected() {
    assert!(has_separator("a#1"));
    assert!(has_separator("a*1"));
    assert!(!has_separator("plain_name-2"));
}

proptest! {
    #[test]
    fn strip_undoes_suffix(base in "[a-zA-Z0-9_.-]{1,40}", i in 0u32..10_000, r in 0u32..10_000) {
        let name = format!("{}{}", base, suffix(i, r));

        prop_assert_eq!(strip_suffix(&name), base.as_str());
        prop_assert_eq!(strip_suffix(strip_suffix(&name)), base.as_str());
        prop_assert_eq!(iteration_index_of(&name), i);
        prop_assert_eq!(replication_index_of(&name), r);
    }

    #[test]
    fn render_agrees_with_suffix(base in "[a-z]{1,20}", i in 0u32..100, r in 0u32..100) {
        let rendered = render(&base, i, r).unwrap();
        prop_assert_eq!(rendered, format!("{}{}", base, suffix(i, r)));
    }
}
