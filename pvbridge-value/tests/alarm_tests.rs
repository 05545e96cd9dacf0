use pvbridge_value::{Alarm, AlarmSeverity};

// ── Severity ordering ────────────────────────────────────────────

#[test]
fn severity_order() {
    assert!(AlarmSeverity::NoAlarm < AlarmSeverity::Minor);
    assert!(AlarmSeverity::Minor < AlarmSeverity::Major);
    assert!(AlarmSeverity::Major < AlarmSeverity::Invalid);
}

#[test]
fn severity_default_is_healthy() {
    assert_eq!(AlarmSeverity::default(), AlarmSeverity::NoAlarm);
}

#[test]
fn severity_display() {
    assert_eq!(AlarmSeverity::NoAlarm.to_string(), "NO_ALARM");
    assert_eq!(AlarmSeverity::Invalid.to_string(), "INVALID");
}

// ── worst ────────────────────────────────────────────────────────

#[test]
fn worst_picks_higher_severity() {
    let minor = Alarm::new(AlarmSeverity::Minor, "low");
    let major = Alarm::new(AlarmSeverity::Major, "high");
    assert_eq!(minor.clone().worst(&major), major);
    assert_eq!(major.clone().worst(&minor), major);
}

#[test]
fn worst_tie_keeps_first() {
    let a = Alarm::new(AlarmSeverity::Major, "first");
    let b = Alarm::new(AlarmSeverity::Major, "second");
    assert_eq!(a.clone().worst(&b).message, "first");
}

#[test]
fn worst_of_none_and_invalid() {
    let healthy = Alarm::none();
    let bad = Alarm::invalid("disconnected");
    let merged = healthy.worst(&bad);
    assert_eq!(merged.severity, AlarmSeverity::Invalid);
    assert_eq!(merged.message, "disconnected");
}
