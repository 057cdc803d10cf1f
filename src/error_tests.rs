use super::*;
use crate::store::StoreError;

#[test]
fn http_status_mapping() {
    assert_eq!(AppError::user("bad_input", "oops").http_status(), 400);
    assert_eq!(AppError::not_found("not_found", "missing").http_status(), 404);
    assert_eq!(AppError::conflict("conflict", "dup").http_status(), 409);
    assert_eq!(AppError::unsupported("unsupported", "later").http_status(), 501);
    assert_eq!(AppError::internal("internal", "panic").http_status(), 500);
}

#[test]
fn repository_errors_keep_their_kind() {
    let dup: AppError = RepositoryError::Duplicate { id: "prod-1".into(), name: "production".into() }.into();
    assert_eq!(dup.http_status(), 409);
    assert_eq!(dup.code_str(), "duplicate_environment");
    assert!(dup.message().contains("prod-1"));

    let unknown: AppError = RepositoryError::UnknownEnvironment { id: "nope".into() }.into();
    assert_eq!(unknown.http_status(), 404);

    let transport: AppError = RepositoryError::Transport(StoreError::Transport("connection refused".into())).into();
    assert_eq!(transport.http_status(), 503);
    assert_eq!(transport.code_str(), "store_unavailable");
}

#[test]
fn display_joins_code_and_message() {
    let e = AppError::not_found("unknown_environment", "no such environment");
    assert_eq!(e.to_string(), "unknown_environment: no such environment");
}
