use pvbridge_value::{Error, ScalarKind, Value};

// ── Construction and kind ────────────────────────────────────────

#[test]
fn empty_cell() {
    let v = Value::empty();
    assert!(v.is_empty());
    assert_eq!(v.kind(), None);
}

#[test]
fn default_is_empty() {
    assert!(Value::default().is_empty());
}

#[test]
fn kind_inferred_from_constructor() {
    assert_eq!(Value::from(true).kind(), Some(ScalarKind::Bool));
    assert_eq!(Value::from(-3i8).kind(), Some(ScalarKind::Int8));
    assert_eq!(Value::from(7i32).kind(), Some(ScalarKind::Int32));
    assert_eq!(Value::from(7u64).kind(), Some(ScalarKind::UInt64));
    assert_eq!(Value::from(1.5f64).kind(), Some(ScalarKind::Float64));
    assert_eq!(Value::from("hi").kind(), Some(ScalarKind::String));
}

// ── extract_exact ────────────────────────────────────────────────

#[test]
fn exact_matching_kind() {
    let v = Value::from(42i32);
    assert_eq!(v.extract_exact::<i32>().unwrap(), 42);
}

#[test]
fn exact_string() {
    let v = Value::from("hello");
    assert_eq!(v.extract_exact::<String>().unwrap(), "hello");
}

#[test]
fn exact_mismatched_kind_fails() {
    let v = Value::from(42i32);
    let err = v.extract_exact::<f64>().unwrap_err();
    assert_eq!(
        err,
        Error::TypeMismatch {
            held: Some(ScalarKind::Int32),
            requested: ScalarKind::Float64,
        }
    );
}

#[test]
fn exact_does_not_widen() {
    // i32 -> i64 would be a safe widening, but exact means exact.
    let v = Value::from(1i32);
    assert!(v.extract_exact::<i64>().is_err());
}

#[test]
fn exact_on_empty_fails() {
    let err = Value::empty().extract_exact::<i32>().unwrap_err();
    assert_eq!(
        err,
        Error::TypeMismatch {
            held: None,
            requested: ScalarKind::Int32,
        }
    );
}

// ── extract_converted ────────────────────────────────────────────

#[test]
fn converted_on_empty_fails_with_empty_value() {
    assert_eq!(
        Value::empty().extract_converted::<i32>().unwrap_err(),
        Error::EmptyValue
    );
    assert_eq!(
        Value::empty().extract_converted::<String>().unwrap_err(),
        Error::EmptyValue
    );
}

#[test]
fn converted_integer_widening() {
    let v = Value::from(300i16);
    assert_eq!(v.extract_converted::<i64>().unwrap(), 300);
    assert_eq!(v.extract_converted::<f64>().unwrap(), 300.0);
}

#[test]
fn converted_float_to_integer_truncates() {
    let v = Value::from(4.9f64);
    assert_eq!(v.extract_converted::<i32>().unwrap(), 4);
    let v = Value::from(-4.9f64);
    assert_eq!(v.extract_converted::<i32>().unwrap(), -4);
}

#[test]
fn converted_bool_to_numeric() {
    assert_eq!(Value::from(true).extract_converted::<i32>().unwrap(), 1);
    assert_eq!(Value::from(false).extract_converted::<u8>().unwrap(), 0);
    assert_eq!(Value::from(true).extract_converted::<f64>().unwrap(), 1.0);
}

#[test]
fn converted_numeric_to_bool() {
    assert!(Value::from(14i32).extract_converted::<bool>().unwrap());
    assert!(!Value::from(0u64).extract_converted::<bool>().unwrap());
    assert!(Value::from(0.5f32).extract_converted::<bool>().unwrap());
}

#[test]
fn converted_scalar_to_text() {
    assert_eq!(
        Value::from(42i32).extract_converted::<String>().unwrap(),
        "42"
    );
    assert_eq!(
        Value::from(true).extract_converted::<String>().unwrap(),
        "true"
    );
}

#[test]
fn converted_text_to_numeric() {
    let v = Value::from(" 42 ");
    assert_eq!(v.extract_converted::<i32>().unwrap(), 42);
    let v = Value::from("2.5");
    assert_eq!(v.extract_converted::<f64>().unwrap(), 2.5);
}

#[test]
fn converted_unparseable_text() {
    let err = Value::from("not a number")
        .extract_converted::<i32>()
        .unwrap_err();
    assert!(matches!(err, Error::Unparseable { .. }));
}

#[test]
fn converted_never_panics_on_any_pair() {
    // Every (stored kind, requested numeric kind) pair returns a Result.
    let cells = vec![
        Value::from(true),
        Value::from(-1i8),
        Value::from(-1i16),
        Value::from(-1i32),
        Value::from(-1i64),
        Value::from(200u8),
        Value::from(60_000u16),
        Value::from(4_000_000_000u32),
        Value::from(u64::MAX),
        Value::from(1.5f32),
        Value::from(1.5f64),
        Value::from("7"),
    ];
    for v in &cells {
        let _ = v.extract_converted::<i64>();
        let _ = v.extract_converted::<u32>();
        let _ = v.extract_converted::<f64>();
        let _ = v.extract_converted::<bool>();
        let _ = v.extract_converted::<String>();
    }
}

// ── take / swap / assign transitions ─────────────────────────────
//
// The nine {empty, text, non-text} x {empty, text, non-text} pairs.
// The enum representation makes leaks impossible; these pin down the
// observable semantics of each transition.

#[test]
fn take_leaves_empty() {
    let mut v = Value::from("moved");
    let out = v.take();
    assert_eq!(out, Value::from("moved"));
    assert!(v.is_empty());
}

#[test]
fn take_of_empty_is_empty() {
    let mut v = Value::empty();
    assert!(v.take().is_empty());
    assert!(v.is_empty());
}

#[test]
fn swap_all_pairs() {
    let samples = [Value::empty(), Value::from("txt"), Value::from(5i32)];
    for a in &samples {
        for b in &samples {
            let mut x = a.clone();
            let mut y = b.clone();
            x.swap(&mut y);
            assert_eq!(&x, b);
            assert_eq!(&y, a);
            // swap back restores
            x.swap(&mut y);
            assert_eq!(&x, a);
            assert_eq!(&y, b);
        }
    }
}

#[test]
fn overwrite_text_with_non_text() {
    let mut v = Value::from("text");
    v = Value::from(9i32);
    assert_eq!(v.kind(), Some(ScalarKind::Int32));
}

#[test]
fn overwrite_non_text_with_text() {
    let mut v = Value::from(9i32);
    v = Value::from("text");
    assert_eq!(v.extract_exact::<String>().unwrap(), "text");
}

#[test]
fn clone_is_deep_for_text() {
    let a = Value::from("shared");
    let mut b = a.clone();
    b = Value::from("changed");
    assert_eq!(a.extract_exact::<String>().unwrap(), "shared");
    assert_eq!(b.extract_exact::<String>().unwrap(), "changed");
}

// ── Display ──────────────────────────────────────────────────────

#[test]
fn display_values() {
    assert_eq!(Value::from(42i32).to_string(), "42");
    assert_eq!(Value::from("abc").to_string(), "abc");
    assert_eq!(Value::empty().to_string(), "(nil)");
}

// ── Serde ────────────────────────────────────────────────────────

#[test]
fn serde_roundtrip() {
    for v in [
        Value::empty(),
        Value::from(true),
        Value::from(-7i64),
        Value::from(3.25f64),
        Value::from("str"),
    ] {
        let json = serde_json::to_string(&v).unwrap();
        let parsed: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, v);
    }
}
