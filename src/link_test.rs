use super::*;

#[test]
fn test_new_link_not_flushed() {
    let l = Link::new("abcd".to_string(), 99, 1);
    assert!(!l.is_flushed());
    assert_eq!(l.version(), 1);
    assert_eq!(l.hash_key(), 99);
}

#[test]
fn test_fit_marks_flushed() {
    let l = Link::new("abcd".to_string(), 99, 1);
    l.fit(10, 100, 20, 1);
    assert!(l.is_flushed());
    let e = l.extent();
    assert_eq!(e.seek_start, 100);
    assert_eq!(e.seek_last, 20);
}

#[test]
fn test_try_bump_version_rejects_non_increasing() {
    let l = Link::new("abcd".to_string(), 99, 5);
    assert!(!l.try_bump_version(5));
    assert!(!l.try_bump_version(4));
    assert!(l.try_bump_version(6));
    assert_eq!(l.version(), 6);
}
