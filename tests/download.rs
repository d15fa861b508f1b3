//! Download gate authorization checks.

#[path = "common/mod.rs"]
mod common;

use common::*;

use bottega::error::AppError;
use bottega::handlers::public::{check_download_access, DOWNLOAD_WINDOW_SECS};
use bottega::payments::CheckoutSession;

const SLUG: &str = "acqua-gestione-risorsa-idrica";

fn session_for_slug(slug: &str) -> CheckoutSession {
    let mut session = paid_session("cs_test_dl");
    session.metadata.slug = Some(slug.to_string());
    session.metadata.kind = Some("digital".to_string());
    session
}

#[test]
fn paid_matching_fresh_session_is_allowed() {
    let session = session_for_slug(SLUG);
    let now = session.created + 60;

    assert!(check_download_access(&session, SLUG, now).is_ok());
}

#[test]
fn unpaid_session_is_forbidden() {
    let mut session = session_for_slug(SLUG);
    session.payment_status = "unpaid".to_string();
    let now = session.created + 60;

    assert!(matches!(
        check_download_access(&session, SLUG, now),
        Err(AppError::Forbidden(_))
    ));
}

#[test]
fn slug_mismatch_is_forbidden() {
    // A paid session for one title must not release another.
    let session = session_for_slug("quaderni-di-cantiere");
    let now = session.created + 60;

    assert!(matches!(
        check_download_access(&session, SLUG, now),
        Err(AppError::Forbidden(_))
    ));
}

#[test]
fn session_without_slug_metadata_is_forbidden() {
    let session = paid_session("cs_test_nometa");
    let now = session.created + 60;

    assert!(matches!(
        check_download_access(&session, SLUG, now),
        Err(AppError::Forbidden(_))
    ));
}

#[test]
fn link_is_valid_one_second_before_the_window_closes() {
    let session = session_for_slug(SLUG);
    let now = session.created + DOWNLOAD_WINDOW_SECS - 1;

    assert!(check_download_access(&session, SLUG, now).is_ok());
}

#[test]
fn link_expires_at_exactly_the_window_boundary() {
    let session = session_for_slug(SLUG);
    let now = session.created + DOWNLOAD_WINDOW_SECS;

    assert!(matches!(
        check_download_access(&session, SLUG, now),
        Err(AppError::Forbidden(_))
    ));
}

#[test]
fn link_expires_after_the_window() {
    let session = session_for_slug(SLUG);
    let now = session.created + DOWNLOAD_WINDOW_SECS + 3600;

    assert!(check_download_access(&session, SLUG, now).is_err());
}

#[test]
fn conditions_are_independent() {
    // Each failing condition alone is enough to deny.
    let now_offset = 60;

    let mut unpaid = session_for_slug(SLUG);
    unpaid.payment_status = "no_payment_required".to_string();
    assert!(check_download_access(&unpaid, SLUG, unpaid.created + now_offset).is_err());

    let wrong_slug = session_for_slug("relazione-geotecnica-guida");
    assert!(check_download_access(&wrong_slug, SLUG, wrong_slug.created + now_offset).is_err());

    let expired = session_for_slug(SLUG);
    assert!(check_download_access(&expired, SLUG, expired.created + DOWNLOAD_WINDOW_SECS).is_err());
}
