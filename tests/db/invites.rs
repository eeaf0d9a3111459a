//! Single-use invite semantics: redemption, precedence of failure modes
//! and atomicity with user creation.

use keyhub::db::{ledger, queries};
use keyhub::error::AppError;
use keyhub::models::*;

use crate::helpers::*;

fn issue(conn: &rusqlite::Connection, created_by: &str, expires_days: Option<i64>) -> Invite {
    queries::create_invites(
        conn,
        created_by,
        &CreateInvites {
            count: Some(1),
            codes: None,
            expires_days,
        },
    )
    .unwrap()
    .remove(0)
}

fn new_user(username: &str) -> CreateUser {
    CreateUser {
        username: username.to_string(),
        email: None,
        password_hash: None,
        role: Role::User,
        telegram_id: None,
    }
}

#[test]
fn redeeming_creates_the_user_and_consumes_the_invite() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let invite = issue(&conn, &reseller.id, None);

    let (user, redeemed) = ledger::redeem_invite(&mut conn, &invite.code, |tx| {
        queries::create_user(tx, &new_user("alice"))
    })
    .unwrap();

    assert_eq!(user.username, "alice");
    assert_eq!(redeemed.used_by.as_deref(), Some(user.id.as_str()));

    let stored = queries::get_invite_by_code(&conn, &invite.code)
        .unwrap()
        .unwrap();
    assert!(!stored.is_valid(chrono::Utc::now().timestamp()));
}

#[test]
fn unknown_code_is_not_found() {
    let mut conn = setup();
    let err = ledger::redeem_invite(&mut conn, "missing", |tx| {
        queries::create_user(tx, &new_user("alice"))
    })
    .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[test]
fn revoked_invite_is_gone() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let invite = issue(&conn, &reseller.id, None);
    queries::revoke_invite(&conn, &invite.id).unwrap();

    let err = ledger::redeem_invite(&mut conn, &invite.code, |tx| {
        queries::create_user(tx, &new_user("alice"))
    })
    .unwrap_err();
    assert!(matches!(err, AppError::Gone(_)));
}

#[test]
fn second_redemption_conflicts() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let invite = issue(&conn, &reseller.id, None);

    ledger::redeem_invite(&mut conn, &invite.code, |tx| {
        queries::create_user(tx, &new_user("alice"))
    })
    .unwrap();

    let err = ledger::redeem_invite(&mut conn, &invite.code, |tx| {
        queries::create_user(tx, &new_user("bob"))
    })
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert!(queries::get_user_by_username(&conn, "bob").unwrap().is_none());
}

#[test]
fn expired_invite_is_gone() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let invite = issue(&conn, &reseller.id, Some(-1));

    let err = ledger::redeem_invite(&mut conn, &invite.code, |tx| {
        queries::create_user(tx, &new_user("alice"))
    })
    .unwrap_err();
    assert!(matches!(err, AppError::Gone(_)));
}

#[test]
fn failed_user_creation_leaves_the_invite_unconsumed() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    create_account(&conn, "alice", Role::User);
    let invite = issue(&conn, &reseller.id, None);

    // Username collision inside the redemption transaction.
    let err = ledger::redeem_invite(&mut conn, &invite.code, |tx| {
        queries::create_user(tx, &new_user("alice"))
    })
    .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let stored = queries::get_invite_by_code(&conn, &invite.code)
        .unwrap()
        .unwrap();
    assert!(stored.is_valid(chrono::Utc::now().timestamp()));

    // And the invite still works for a free username.
    ledger::redeem_invite(&mut conn, &invite.code, |tx| {
        queries::create_user(tx, &new_user("bob"))
    })
    .unwrap();
}

#[test]
fn explicit_code_collisions_are_skipped_not_fatal() {
    let conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);

    let created = queries::create_invites(
        &conn,
        &reseller.id,
        &CreateInvites {
            count: None,
            codes: Some(vec!["x".into(), "x".into(), "y".into()]),
            expires_days: None,
        },
    )
    .unwrap();

    let codes: Vec<&str> = created.iter().map(|i| i.code.as_str()).collect();
    assert_eq!(codes, vec!["x", "y"]);
}

#[test]
fn used_invites_cannot_be_deleted() {
    let mut conn = setup();
    let reseller = create_account(&conn, "shop", Role::Reseller);
    let invite = issue(&conn, &reseller.id, None);

    ledger::redeem_invite(&mut conn, &invite.code, |tx| {
        queries::create_user(tx, &new_user("alice"))
    })
    .unwrap();

    let err = queries::delete_invite(&conn, &invite.id).unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}
