use pretty_assertions::assert_eq;

use super::*;

#[test]
fn keeps_push_order() {
    let mut queue = DiagnosticQueue::new();
    queue.notice("first");
    queue.warning("second");
    queue.fatal("third");

    let messages: Vec<_> = queue.iter().map(|d| d.message.as_str()).collect();
    assert_eq!(messages, vec!["first", "second", "third"]);
    assert!(queue.has_fatal());
    assert_eq!(queue.count(Severity::Warning), 1);
}

#[test]
fn reporting_mask_filters_levels() {
    let mut queue = DiagnosticQueue::with_reporting(ErrorLevel::ALL - ErrorLevel::NOTICE);
    queue.notice("dropped");
    queue.warning("kept");
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.iter().next().map(|d| d.severity), Some(Severity::Warning));
}

#[test]
fn fatal_ignores_reporting_mask() {
    let mut queue = DiagnosticQueue::with_reporting(ErrorLevel::empty());
    queue.warning("dropped");
    queue.fatal("kept");
    assert_eq!(queue.len(), 1);
    assert!(queue.has_fatal());
}

#[test]
fn drain_empties_queue() {
    let mut queue = DiagnosticQueue::new();
    queue.notice("a");
    let drained = queue.drain();
    assert_eq!(drained.len(), 1);
    assert!(queue.is_empty());
    assert!(!queue.has_fatal());
}
