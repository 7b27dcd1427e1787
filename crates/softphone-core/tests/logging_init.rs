//! Global subscriber installation
//!
//! Lives in its own test binary so the installed subscriber cannot interfere
//! with the captured logs of the library's unit tests.

use serial_test::serial;

use softphone_core::logging;
use softphone_core::PhoneError;

#[test]
#[serial]
fn test_rejects_level_above_maximum() {
    assert!(matches!(logging::init(9), Err(PhoneError::InvalidConfiguration { .. })));
}

#[test]
#[serial]
fn test_second_init_reports_error() {
    let _ = logging::init(3);
    assert!(matches!(logging::init(3), Err(PhoneError::InternalError { .. })));
}
