//! Unit tests for line-windowed output pagination.

use gosling::supervisor::pagination::{paginate, DEFAULT_PAGE_LIMIT};

const FIVE_LINES: &str = "one\ntwo\nthree\nfour\nfive\n";

#[test]
fn basic_window_with_metadata() {
    let page = paginate(FIVE_LINES, 1, 2, false);
    assert_eq!(page.text, "two\nthree");
    assert_eq!(page.total_lines, 5);
    assert_eq!(page.start_line, 1);
    assert_eq!(page.end_line, 3);
    assert!(page.has_more);
}

#[test]
fn window_reaching_the_end_has_no_more() {
    let page = paginate(FIVE_LINES, 3, 10, false);
    assert_eq!(page.text, "four\nfive");
    assert_eq!(page.end_line, 5);
    assert!(!page.has_more);
}

#[test]
fn out_of_range_offset_clamps_to_last_line() {
    let page = paginate(FIVE_LINES, 99, 2, false);
    assert_eq!(page.start_line, 4);
    assert_eq!(page.text, "five");
    assert!(!page.has_more);
}

#[test]
fn negative_offset_is_treated_as_zero() {
    let page = paginate(FIVE_LINES, -7, 2, false);
    assert_eq!(page.start_line, 0);
    assert_eq!(page.text, "one\ntwo");
}

#[test]
fn non_positive_limit_falls_back_to_default() {
    let page = paginate(FIVE_LINES, 0, 0, false);
    assert_eq!(page.end_line, 5.min(DEFAULT_PAGE_LIMIT));
    assert_eq!(page.text, "one\ntwo\nthree\nfour\nfive");

    let page = paginate(FIVE_LINES, 0, -3, false);
    assert_eq!(page.text, "one\ntwo\nthree\nfour\nfive");
}

#[test]
fn full_override_returns_entire_buffer() {
    let page = paginate(FIVE_LINES, 3, 1, true);
    assert_eq!(page.text, FIVE_LINES);
    assert_eq!(page.start_line, 0);
    assert_eq!(page.end_line, 5);
    assert!(!page.has_more);
}

#[test]
fn empty_output_yields_empty_page() {
    let page = paginate("", 0, 10, false);
    assert_eq!(page.text, "");
    assert_eq!(page.total_lines, 0);
    assert_eq!(page.start_line, 0);
    assert_eq!(page.end_line, 0);
    assert!(!page.has_more);
}

#[test]
fn page_is_a_line_prefix_of_full_output() {
    let page = paginate(FIVE_LINES, 0, 2, false);
    let full = paginate(FIVE_LINES, 0, 2, true);
    assert!(full.text.starts_with(&page.text));
    let page_lines: Vec<&str> = page.text.lines().collect();
    let full_lines: Vec<&str> = full.text.lines().collect();
    assert_eq!(&full_lines[..page_lines.len()], page_lines.as_slice());
}
