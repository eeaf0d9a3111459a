//! Telegram WebApp payload verification.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use keyhub::telegram::{check_webapp_data, extract_user};

const BOT_TOKEN: &str = "123456:ABC-DEF1234ghIkl";

/// Sign `fields` the way the Telegram client does and assemble `initData`.
fn signed_init_data(fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<_> = fields.to_vec();
    sorted.sort_by_key(|(key, _)| *key);

    let canonical = sorted
        .iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect::<Vec<_>>()
        .join("\n");

    let mut mac = Hmac::<Sha256>::new_from_slice(b"WebAppData").unwrap();
    mac.update(BOT_TOKEN.as_bytes());
    let secret = mac.finalize().into_bytes();

    let mut mac = Hmac::<Sha256>::new_from_slice(&secret).unwrap();
    mac.update(canonical.as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut parts: Vec<String> = fields
        .iter()
        .map(|(key, value)| format!("{}={}", key, urlencoding::encode(value)))
        .collect();
    parts.push(format!("hash={}", hash));
    parts.join("&")
}

fn sample_fields() -> Vec<(&'static str, &'static str)> {
    vec![
        ("auth_date", "1724668800"),
        ("query_id", "AAF9tQkrAAAAAH21CSvWzMhV"),
        (
            "user",
            r#"{"id":42,"first_name":"Alice","username":"alice_w"}"#,
        ),
    ]
}

#[test]
fn valid_payload_passes() {
    let init_data = signed_init_data(&sample_fields());
    assert!(check_webapp_data(&init_data, BOT_TOKEN));
}

#[test]
fn tampered_field_fails() {
    let init_data = signed_init_data(&sample_fields());
    let tampered = init_data.replace("auth_date=1724668800", "auth_date=1724668801");
    assert!(!check_webapp_data(&tampered, BOT_TOKEN));
}

#[test]
fn wrong_bot_token_fails() {
    let init_data = signed_init_data(&sample_fields());
    assert!(!check_webapp_data(&init_data, "999999:other-token"));
}

#[test]
fn missing_hash_fails() {
    assert!(!check_webapp_data("auth_date=1724668800&query_id=abc", BOT_TOKEN));
}

#[test]
fn extract_user_reads_the_embedded_identity() {
    let init_data = signed_init_data(&sample_fields());
    let user = extract_user(&init_data).unwrap();
    assert_eq!(user.id, "42");
    assert_eq!(user.username.as_deref(), Some("alice_w"));
    assert_eq!(user.first_name.as_deref(), Some("Alice"));
}

#[test]
fn extract_user_without_user_field_is_none() {
    let init_data = signed_init_data(&[("auth_date", "1724668800")]);
    assert!(extract_user(&init_data).is_none());
}
