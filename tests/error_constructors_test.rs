//! Error constructor and exit-code coverage.

use aeolus::error::{exit_code, AeolusError};

#[test]
fn constructors_produce_their_variants() {
    assert!(matches!(
        AeolusError::config("x"),
        AeolusError::Config { .. }
    ));
    assert!(matches!(
        AeolusError::serial("x"),
        AeolusError::Serial { .. }
    ));
    assert!(matches!(
        AeolusError::protocol("x"),
        AeolusError::Protocol { .. }
    ));
    assert!(matches!(AeolusError::udp("x"), AeolusError::Udp { .. }));
    assert!(matches!(AeolusError::mqtt("x"), AeolusError::Mqtt { .. }));
    assert!(matches!(
        AeolusError::script("x"),
        AeolusError::Script { .. }
    ));
    assert!(matches!(
        AeolusError::timeout("x"),
        AeolusError::Timeout { .. }
    ));
    assert!(matches!(
        AeolusError::generic("x"),
        AeolusError::Generic { .. }
    ));
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: AeolusError = io.into();
    assert!(matches!(err, AeolusError::Io { .. }));
}

#[test]
fn startup_exit_codes() {
    assert_eq!(AeolusError::config("bad").exit_code(), exit_code::CONFIG);
    assert_eq!(
        AeolusError::validation("f", "bad").exit_code(),
        exit_code::CONFIG
    );
    assert_eq!(
        AeolusError::serial("no port").exit_code(),
        exit_code::SERIAL_OPEN
    );
    assert_eq!(
        AeolusError::protocol("desync").exit_code(),
        exit_code::PROTOCOL_DESYNC
    );
}
