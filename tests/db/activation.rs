//! Key activation and subscription upsert semantics.

use keyhub::db::{ledger, queries};
use keyhub::error::AppError;
use keyhub::models::*;

use crate::helpers::*;

fn activate(
    conn: &mut rusqlite::Connection,
    token: &str,
    user_id: &str,
) -> keyhub::error::Result<ledger::ActivationOutcome> {
    ledger::activate_key(conn, token, user_id, None)
}

#[test]
fn activation_consumes_the_key_and_grants_a_subscription() {
    let mut conn = setup();
    let user = create_account(&conn, "alice", Role::User);
    let product = create_product(&conn, "pro", 500);
    upload_stock(&mut conn, &product, &["k1"]);

    let before = chrono::Utc::now().timestamp();
    let outcome = activate(&mut conn, "k1", &user.id).unwrap();

    assert_eq!(outcome.product_id, product.id);
    // 30-day product; allow a little clock slack.
    let expected = before + 30 * 86400;
    assert!((outcome.expires_at - expected).abs() <= 5);

    let key = queries::get_key_by_token(&conn, "k1").unwrap().unwrap();
    assert_eq!(key.status, KeyStatus::Used);
    assert_eq!(key.used_by_user_id.as_deref(), Some(user.id.as_str()));
    assert!(key.used_at.is_some());

    let sub = queries::get_subscription(&conn, &user.id, &product.id)
        .unwrap()
        .unwrap();
    assert_eq!(sub.status, SubscriptionStatus::Active);
    assert_eq!(sub.expires_at, outcome.expires_at);
}

#[test]
fn unknown_key_is_not_found() {
    let mut conn = setup();
    let user = create_account(&conn, "alice", Role::User);

    let err = activate(&mut conn, "nope", &user.id).unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn used_key_conflicts_and_stays_with_the_first_user() {
    let mut conn = setup();
    let alice = create_account(&conn, "alice", Role::User);
    let bob = create_account(&conn, "bob", Role::User);
    let product = create_product(&conn, "pro", 500);
    upload_stock(&mut conn, &product, &["k1"]);

    activate(&mut conn, "k1", &alice.id).unwrap();
    let err = activate(&mut conn, "k1", &bob.id).unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    let key = queries::get_key_by_token(&conn, "k1").unwrap().unwrap();
    assert_eq!(key.used_by_user_id.as_deref(), Some(alice.id.as_str()));
    assert!(queries::get_subscription(&conn, &bob.id, &product.id)
        .unwrap()
        .is_none());
}

#[test]
fn product_mismatch_is_rejected_without_consuming_the_key() {
    let mut conn = setup();
    let user = create_account(&conn, "alice", Role::User);
    let pro = create_product(&conn, "pro", 500);
    let lite = create_product(&conn, "lite", 100);
    upload_stock(&mut conn, &pro, &["k1"]);

    let err = ledger::activate_key(&mut conn, "k1", &user.id, Some(&lite.id)).unwrap_err();

    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(key_status(&conn, "k1"), KeyStatus::Available);
}

#[test]
fn disabled_product_blocks_activation() {
    let mut conn = setup();
    let user = create_account(&conn, "alice", Role::User);
    let product = create_product(&conn, "pro", 500);
    upload_stock(&mut conn, &product, &["k1"]);
    queries::update_product(
        &conn,
        &product.id,
        &UpdateProduct {
            name: None,
            price_cents: None,
            duration_days: None,
            enabled: Some(false),
        },
    )
    .unwrap();

    let err = activate(&mut conn, "k1", &user.id).unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)));
    assert_eq!(key_status(&conn, "k1"), KeyStatus::Available);
}

#[test]
fn reserved_keys_are_activatable_by_end_users() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let user = create_account(&conn, "alice", Role::User);
    let product = create_product(&conn, "pro", 500);
    upload_stock(&mut conn, &product, &["k1"]);
    ledger::set_balance(&mut conn, &reseller.id, 500).unwrap();
    ledger::buy_keys(&mut conn, &reseller.id, &product, 1).unwrap();

    activate(&mut conn, "k1", &user.id).unwrap();

    let key = queries::get_key_by_token(&conn, "k1").unwrap().unwrap();
    assert_eq!(key.status, KeyStatus::Used);
    // The reseller who bought it stays on record.
    assert_eq!(key.owner_reseller_id.as_deref(), Some(reseller.id.as_str()));
}

#[test]
fn repeat_activation_overwrites_the_same_subscription_row() {
    let mut conn = setup();
    let user = create_account(&conn, "alice", Role::User);
    let product = create_product(&conn, "pro", 500);
    upload_stock(&mut conn, &product, &["k1", "k2"]);

    activate(&mut conn, "k1", &user.id).unwrap();
    let first = queries::get_subscription(&conn, &user.id, &product.id)
        .unwrap()
        .unwrap();

    let outcome = activate(&mut conn, "k2", &user.id).unwrap();
    let second = queries::get_subscription(&conn, &user.id, &product.id)
        .unwrap()
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(second.expires_at, outcome.expires_at);

    let subs = queries::list_subscriptions_for_user(&conn, &user.id).unwrap();
    assert_eq!(subs.len(), 1);
    assert!(subs[0].active);
    assert_eq!(subs[0].product_name, "pro");
}
