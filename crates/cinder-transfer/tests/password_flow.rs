//! Integration test: password-protected shares
//!
//! The pre-access password check must run before any view-consuming
//! call: a wrong password burns a failed attempt, never a view, and
//! enough failed attempts lock the vault even for the right password.

use std::sync::Arc;

use cinder_access::{AccessController, PolicyRequest, ServerSecret};
use cinder_core::config::VaultConfig;
use cinder_core::{CinderError, ContentType};
use cinder_store::{BlobStore, MemoryVaultStore, VaultStore};
use cinder_transfer::{receive, send, SendOptions};
use secrecy::SecretString;

fn test_setup() -> (Arc<AccessController>, Arc<MemoryVaultStore>) {
    let store = Arc::new(MemoryVaultStore::new());
    let controller = Arc::new(AccessController::new(
        store.clone(),
        BlobStore::memory(),
        ServerSecret::from_bytes([42u8; 32]),
        VaultConfig::default(),
    ));
    (controller, store)
}

fn protected_opts(password: &str, policy: PolicyRequest) -> SendOptions {
    SendOptions {
        password: Some(SecretString::from(password)),
        policy,
        ..Default::default()
    }
}

#[tokio::test]
async fn password_roundtrip() {
    let (controller, _) = test_setup();
    let original = b"guarded by a passphrase";

    let outcome = send(
        &controller,
        original,
        ContentType::Text,
        protected_opts("correct horse", PolicyRequest::default()),
    )
    .await
    .expect("send protected");

    let received = receive(
        &controller,
        &outcome.vault_id,
        &outcome.key_fragment,
        Some(SecretString::from("correct horse")),
    )
    .await
    .expect("receive with right password");

    assert_eq!(received.plaintext, original);
}

#[tokio::test]
async fn wrong_password_burns_an_attempt_not_a_view() {
    let (controller, store) = test_setup();

    let outcome = send(
        &controller,
        b"secret",
        ContentType::Text,
        protected_opts("right", PolicyRequest::default()),
    )
    .await
    .unwrap();

    let result = receive(
        &controller,
        &outcome.vault_id,
        &outcome.key_fragment,
        Some(SecretString::from("wrong")),
    )
    .await;
    assert!(matches!(result, Err(CinderError::Integrity(_))));

    let record = store.get(&outcome.vault_id).await.unwrap().unwrap();
    assert_eq!(record.failed_attempts, 1);
    assert_eq!(record.remaining_views, 1, "wrong password must not consume a view");

    // The right password still works afterwards
    receive(
        &controller,
        &outcome.vault_id,
        &outcome.key_fragment,
        Some(SecretString::from("right")),
    )
    .await
    .expect("correct password after one failure");
}

#[tokio::test]
async fn missing_password_is_a_client_error() {
    let (controller, store) = test_setup();

    let outcome = send(
        &controller,
        b"secret",
        ContentType::Text,
        protected_opts("pw", PolicyRequest::default()),
    )
    .await
    .unwrap();

    let result = receive(&controller, &outcome.vault_id, &outcome.key_fragment, None).await;
    assert!(matches!(result, Err(CinderError::Validation(_))));

    // Not even a failed attempt: the client never tried a password
    let record = store.get(&outcome.vault_id).await.unwrap().unwrap();
    assert_eq!(record.failed_attempts, 0);
    assert_eq!(record.remaining_views, 1);
}

#[tokio::test]
async fn lockout_survives_the_correct_password() {
    let (controller, _) = test_setup();

    let outcome = send(
        &controller,
        b"secret",
        ContentType::Text,
        protected_opts(
            "right",
            PolicyRequest {
                max_views: Some(5),
                max_failed_attempts: Some(3),
                ..Default::default()
            },
        ),
    )
    .await
    .unwrap();

    for _ in 0..3 {
        let result = receive(
            &controller,
            &outcome.vault_id,
            &outcome.key_fragment,
            Some(SecretString::from("nope")),
        )
        .await;
        assert!(matches!(result, Err(CinderError::Integrity(_))));
    }

    // Locked out: even the correct password is now denied
    let result = receive(
        &controller,
        &outcome.vault_id,
        &outcome.key_fragment,
        Some(SecretString::from("right")),
    )
    .await;
    assert!(matches!(result, Err(CinderError::AccessDenied)));
}

#[tokio::test]
async fn legacy_record_without_check_fails_on_first_chunk() {
    let (controller, store) = test_setup();

    let outcome = send(
        &controller,
        b"legacy-style record",
        ContentType::Text,
        protected_opts("right", PolicyRequest { max_views: Some(2), ..Default::default() }),
    )
    .await
    .unwrap();

    // Strip the password check to simulate a record from before the
    // check existed
    store
        .update(&outcome.vault_id, &|r| {
            r.crypto_params.password_check = None;
            Ok(())
        })
        .await
        .unwrap();

    // Wrong password now surfaces at chunk decryption; the view is
    // already spent by then (consumed views are never returned)
    let result = receive(
        &controller,
        &outcome.vault_id,
        &outcome.key_fragment,
        Some(SecretString::from("wrong")),
    )
    .await;
    assert!(matches!(result, Err(CinderError::Integrity(_))));

    let record = store.get(&outcome.vault_id).await.unwrap().unwrap();
    assert_eq!(record.failed_attempts, 1);
    assert_eq!(record.remaining_views, 1, "one of two views spent");

    // Right password consumes the second view
    receive(
        &controller,
        &outcome.vault_id,
        &outcome.key_fragment,
        Some(SecretString::from("right")),
    )
    .await
    .expect("legacy record still opens with the right password");
}
