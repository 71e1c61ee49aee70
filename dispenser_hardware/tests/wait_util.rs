use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicU32, Ordering},
};
use std::thread;
use std::time::Duration;

use dispenser_hardware::error::HwError;
use dispenser_hardware::util::{poll_until, wait_until_low_with_timeout};

#[test]
fn wait_until_low_success_path() {
    let high = Arc::new(AtomicBool::new(true));
    let high_bg = high.clone();
    thread::spawn(move || {
        thread::sleep(Duration::from_millis(3));
        high_bg.store(false, Ordering::Relaxed);
    });

    let res = wait_until_low_with_timeout(
        || high.load(Ordering::Relaxed),
        Duration::from_millis(200),
        Duration::from_micros(200),
    );
    assert!(res.is_ok(), "expected success, got {res:?}");
}

#[test]
fn wait_until_low_timeout_path() {
    let err = wait_until_low_with_timeout(
        || true,
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("expected timeout error");

    assert!(matches!(err, HwError::DataReadyTimeout), "got {err:?}");
}

#[test]
fn poll_until_returns_first_value() {
    let calls = AtomicU32::new(0);
    let v = poll_until(
        || {
            let n = calls.fetch_add(1, Ordering::Relaxed);
            Ok((n >= 2).then_some(n))
        },
        Duration::from_millis(500),
        Duration::from_micros(100),
    )
    .expect("value");
    assert_eq!(v, 2);
}

#[test]
fn poll_until_times_out() {
    let err = poll_until(
        || Ok(None::<()>),
        Duration::from_millis(5),
        Duration::from_micros(200),
    )
    .expect_err("timeout");
    assert!(matches!(err, HwError::Timeout));
}

#[test]
fn poll_until_propagates_probe_errors() {
    let err = poll_until(
        || Err::<Option<()>, _>(HwError::Fingerprint(0x01)),
        Duration::from_millis(50),
        Duration::from_micros(200),
    )
    .expect_err("probe error");
    assert!(matches!(err, HwError::Fingerprint(0x01)));
}
