use super::ChatError;
use super::logging;

#[test]
fn test_log_level_names() {
    assert_eq!(logging::parse_level("debug"), tracing::Level::DEBUG);
    assert_eq!(logging::parse_level(" WARNING "), tracing::Level::WARN);
    assert_eq!(logging::parse_level("bogus"), tracing::Level::INFO);

    // repeated installs are ignored
    logging::init("info");
    logging::init("trace");
}

#[test]
fn test_error_codes_match_wire_taxonomy() {
    assert_eq!(ChatError::AuthFailed("bad".into()).code(), "auth-failed");
    assert_eq!(ChatError::UserNotFound.code(), "user-not-found");
    assert_eq!(ChatError::Unauthenticated.code(), "unauthenticated");
    assert_eq!(ChatError::Validation("x".into()).code(), "validation-error");
    assert_eq!(ChatError::UnknownType("ping".into()).code(), "unknown-type");
    assert_eq!(ChatError::HandshakeTimeout.code(), "handshake-timeout");
    assert_eq!(ChatError::BusUnavailable("down".into()).code(), "bus-unavailable");
    assert_eq!(ChatError::StoreUnavailable("io".into()).code(), "store-unavailable");
    assert_eq!(ChatError::DeliveryFailed("full".into()).code(), "delivery-failed");
}

#[test]
fn test_error_detail() {
    let err = ChatError::Validation("content must not be empty".into());
    assert_eq!(err.detail().as_deref(), Some("content must not be empty"));
    assert!(ChatError::Unauthenticated.detail().is_none());
}

#[test]
fn test_transaction_abort_unwraps_inner_error() {
    let tx_err = sled::transaction::TransactionError::Abort(ChatError::UserNotFound);
    let err: ChatError = tx_err.into();
    assert!(matches!(err, ChatError::UserNotFound));
}
