//! Field encryption integration tests
//!
//! Unit tests for the transformer itself live in mcpbroker_storage::crypto.

use std::sync::Arc;

use mcpbroker_core::OAuthError;
use mcpbroker_storage::{
    generate_master_key, parse_key_hex, AesGcmTransformer, EncryptionConfig, FieldCipher,
    GroupResource, ValueTransformer, KEY_SIZE,
};
use pretty_assertions::assert_eq;

fn cipher_with(key: &[u8; KEY_SIZE]) -> FieldCipher {
    let config = EncryptionConfig::new().with_transformer(
        GroupResource::oauth_tokens(),
        Arc::new(AesGcmTransformer::new(key).expect("Failed to create cipher")),
    );
    FieldCipher::new(GroupResource::oauth_tokens(), &config)
}

#[test]
fn test_parse_key_hex() {
    let key = parse_key_hex(&"ab".repeat(KEY_SIZE)).expect("Valid key rejected");
    assert_eq!(key[0], 0xab);

    assert!(parse_key_hex("abcd").is_err());
    assert!(parse_key_hex(&"zz".repeat(KEY_SIZE)).is_err());
}

#[test]
fn test_context_is_bound() {
    let key = generate_master_key().expect("Failed to generate key");
    let transformer = AesGcmTransformer::new(&key).expect("Failed to create cipher");

    let sealed = transformer
        .transform_to_storage(b"secret", "mcpoauthtokens.mcpbroker.io/u1/srv1")
        .unwrap();
    assert!(transformer
        .transform_from_storage(&sealed, "mcpoauthtokens.mcpbroker.io/u2/srv1")
        .is_err());
    assert_eq!(
        transformer
            .transform_from_storage(&sealed, "mcpoauthtokens.mcpbroker.io/u1/srv1")
            .unwrap(),
        b"secret"
    );
}

#[test]
fn test_field_cipher_round_trip_and_failure() {
    let key = generate_master_key().expect("Failed to generate key");
    let cipher = cipher_with(&key);
    let context = cipher.resource_context("u1/srv1");

    let mut access = "access".to_string();
    let mut refresh = "refresh".to_string();
    let encrypted = cipher
        .encrypt_fields(
            &context,
            &mut [("access_token", &mut access), ("refresh_token", &mut refresh)],
        )
        .unwrap();
    assert!(encrypted);
    assert_ne!(access, "access");

    // Wrong key: every field fails and the error names them all
    let other = cipher_with(&generate_master_key().unwrap());
    let mut a = access.clone();
    let mut r = refresh.clone();
    let err = other
        .decrypt_fields(
            &context,
            true,
            &mut [("access_token", &mut a), ("refresh_token", &mut r)],
        )
        .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("access_token"));
    assert!(message.contains("refresh_token"));
    assert!(matches!(OAuthError::from(err), OAuthError::Encryption(_)));

    cipher
        .decrypt_fields(
            &context,
            true,
            &mut [("access_token", &mut access), ("refresh_token", &mut refresh)],
        )
        .unwrap();
    assert_eq!(access, "access");
    assert_eq!(refresh, "refresh");
}

#[test]
fn test_pass_through_without_transformer() {
    let cipher = FieldCipher::new(GroupResource::oauth_tokens(), &EncryptionConfig::new());
    assert!(!cipher.is_enabled());

    let mut value = "plain".to_string();
    let encrypted = cipher
        .encrypt_fields("ctx", &mut [("access_token", &mut value)])
        .unwrap();
    assert!(!encrypted);
    assert_eq!(value, "plain");

    // Encrypted rows cannot be read without a key
    assert!(cipher
        .decrypt_fields("ctx", true, &mut [("access_token", &mut value)])
        .is_err());
}
