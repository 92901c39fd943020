//! Tests for utility functions

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use voice_orchestrator::util::{
    contains_any, now_ms, parse_duration, text_to_int, unix_secs_to_system_time,
};

#[test]
fn test_contains_any() {
    assert!(contains_any("please shutdown now", &["shutdown", "deactivate"]));
    assert!(!contains_any("turn on the lights", &["shutdown"]));
    assert!(!contains_any("anything", &[""]));
}

#[test]
fn test_text_to_int() {
    assert_eq!(text_to_int("timer for three hours"), 3);
    assert_eq!(text_to_int("timer for forty two seconds"), 42);
}

#[test]
fn test_parse_duration_singular() {
    let d = parse_duration("timer for one minute").unwrap();
    assert_eq!(d.amount, 1);
    assert_eq!(d.seconds, 60);
    assert_eq!(d.units, "minute");
    assert!(parse_duration("set a timer").is_none());
}

#[test]
fn test_unix_secs_conversion() {
    assert_eq!(
        unix_secs_to_system_time(1.5),
        Some(UNIX_EPOCH + Duration::from_millis(1500))
    );
    assert_eq!(unix_secs_to_system_time(f64::NAN), None);
}

#[test]
fn test_now_ms_is_recent() {
    let wall = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis();
    assert!(now_ms().abs_diff(wall) < 5_000);
}
