//! Integration tests for key lifecycle and crypto operations

mod common;

use ::common::native::local::{codes, KEY_SIZE, SIGNATURE_SIZE};

fn code(err: &::common::bridge::BridgeError) -> Option<i32> {
    err.native().map(|e| e.code)
}

#[tokio::test]
async fn test_sign_and_verify() {
    let test = common::setup_test_app();
    let crypto = test.app().crypto();

    let pair = crypto.generate_sign_key_pair().await.unwrap();
    let signed = crypto.sign(&pair.secret, b"hello world").await.unwrap();
    assert_eq!(signed.len(), SIGNATURE_SIZE + b"hello world".len());
    assert_eq!(&signed[SIGNATURE_SIZE..], b"hello world");

    let message = crypto.verify(&pair.public, &signed).await.unwrap();
    assert_eq!(message, b"hello world");

    drop(pair);
    test.wait_for_baseline().await.unwrap();
}

#[tokio::test]
async fn test_verify_rejects_tampering_and_wrong_key() {
    let test = common::setup_test_app();
    let crypto = test.app().crypto();

    let pair = crypto.generate_sign_key_pair().await.unwrap();
    let other = crypto.generate_sign_key_pair().await.unwrap();
    let mut signed = crypto.sign(&pair.secret, b"pay alice 10").await.unwrap();

    let err = crypto.verify(&other.public, &signed).await.unwrap_err();
    assert_eq!(code(&err), Some(codes::INVALID_SIGNATURE));

    let last = signed.len() - 1;
    signed[last] ^= 0x01;
    let err = crypto.verify(&pair.public, &signed).await.unwrap_err();
    assert_eq!(code(&err), Some(codes::INVALID_SIGNATURE));

    let err = crypto.verify(&pair.public, &signed[..10]).await.unwrap_err();
    assert_eq!(code(&err), Some(codes::INVALID_SIGNATURE));
}

#[tokio::test]
async fn test_box_encryption_between_two_parties() {
    let test = common::setup_test_app();
    let crypto = test.app().crypto();

    let alice = crypto.generate_encrypt_key_pair().await.unwrap();
    let bob = crypto.generate_encrypt_key_pair().await.unwrap();

    let ciphertext = crypto
        .encrypt(&bob.public, &alice.secret, b"meet at noon")
        .await
        .unwrap();
    assert_ne!(ciphertext, b"meet at noon");

    let plaintext = crypto
        .decrypt(&alice.public, &bob.secret, &ciphertext)
        .await
        .unwrap();
    assert_eq!(plaintext, b"meet at noon");

    // somebody else's secret key cannot open it
    let eve = crypto.generate_encrypt_key_pair().await.unwrap();
    let err = crypto
        .decrypt(&alice.public, &eve.secret, &ciphertext)
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some(codes::DECRYPTION));

    drop((alice, bob, eve));
    test.wait_for_baseline().await.unwrap();
}

#[tokio::test]
async fn test_tampered_box_is_rejected() {
    let test = common::setup_test_app();
    let crypto = test.app().crypto();

    let alice = crypto.generate_encrypt_key_pair().await.unwrap();
    let bob = crypto.generate_encrypt_key_pair().await.unwrap();
    let mut ciphertext = crypto
        .encrypt(&bob.public, &alice.secret, b"integrity")
        .await
        .unwrap();
    let last = ciphertext.len() - 1;
    ciphertext[last] ^= 0x80;

    let err = crypto
        .decrypt(&alice.public, &bob.secret, &ciphertext)
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some(codes::DECRYPTION));
}

#[tokio::test]
async fn test_sealed_box() {
    let test = common::setup_test_app();
    let crypto = test.app().crypto();

    let recipient = crypto.generate_encrypt_key_pair().await.unwrap();
    let sealed = crypto
        .encrypt_sealed_box(&recipient.public, b"anonymous tip")
        .await
        .unwrap();

    let opened = crypto
        .decrypt_sealed_box(&recipient.secret, &sealed)
        .await
        .unwrap();
    assert_eq!(opened, b"anonymous tip");

    // opening must not produce another sealed box
    assert_ne!(opened.len(), sealed.len());

    let other = crypto.generate_encrypt_key_pair().await.unwrap();
    let err = crypto
        .decrypt_sealed_box(&other.secret, &sealed)
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some(codes::DECRYPTION));

    let mut tampered = sealed.clone();
    tampered[KEY_SIZE] ^= 0x01;
    let err = crypto
        .decrypt_sealed_box(&recipient.secret, &tampered)
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some(codes::DECRYPTION));
}

#[tokio::test]
async fn test_import_and_export_keys() {
    let test = common::setup_test_app();
    let crypto = test.app().crypto();

    let pair = crypto.generate_sign_key_pair().await.unwrap();
    let bytes = crypto.public_sign_key_bytes(&pair.public).await.unwrap();
    assert_eq!(bytes.len(), KEY_SIZE);

    // an imported copy of the public key verifies the original's signatures
    let imported = crypto.public_sign_key(&bytes).await.unwrap();
    assert_ne!(imported.handle(), pair.public.handle());
    let signed = crypto.sign(&pair.secret, b"exported").await.unwrap();
    assert_eq!(
        crypto.verify(&imported, &signed).await.unwrap(),
        b"exported"
    );

    // a secret sign key imported from a seed signs like any other
    let seeded = crypto.secret_sign_key(&[3u8; KEY_SIZE]).await.unwrap();
    let signed = crypto.sign(&seeded, b"seeded").await.unwrap();
    assert_eq!(&signed[SIGNATURE_SIZE..], b"seeded");

    // encrypt keys: import the recipient's public key from its bytes
    let recipient = crypto.generate_encrypt_key_pair().await.unwrap();
    let bytes = crypto
        .public_encrypt_key_bytes(&recipient.public)
        .await
        .unwrap();
    let public = crypto.public_encrypt_key(&bytes).await.unwrap();
    let sealed = crypto.encrypt_sealed_box(&public, b"imported").await.unwrap();
    assert_eq!(
        crypto
            .decrypt_sealed_box(&recipient.secret, &sealed)
            .await
            .unwrap(),
        b"imported"
    );

    let secret = crypto.secret_encrypt_key(&[9u8; KEY_SIZE]).await.unwrap();
    drop((pair, imported, seeded, recipient, public, secret));
    test.wait_for_baseline().await.unwrap();
}

#[tokio::test]
async fn test_malformed_key_bytes_are_rejected() {
    let test = common::setup_test_app();
    let crypto = test.app().crypto();

    let err = crypto.public_sign_key(&[1u8; 16]).await.unwrap_err();
    assert_eq!(code(&err), Some(codes::INVALID_KEY));

    let err = crypto.secret_sign_key(&[]).await.unwrap_err();
    assert_eq!(code(&err), Some(codes::INVALID_KEY));

    let err = crypto
        .public_encrypt_key(&[1u8; KEY_SIZE + 1])
        .await
        .unwrap_err();
    assert_eq!(code(&err), Some(codes::INVALID_KEY));

    let err = crypto.secret_encrypt_key(&[1u8; 31]).await.unwrap_err();
    assert_eq!(code(&err), Some(codes::INVALID_KEY));

    // failures leave nothing behind
    test.wait_for_baseline().await.unwrap();
}

#[tokio::test]
async fn test_app_keys_are_stable() {
    let test = common::setup_test_app();
    let crypto = test.app().crypto();

    let first = crypto.app_public_sign_key().await.unwrap();
    let second = crypto.app_public_sign_key().await.unwrap();
    assert_ne!(first.handle(), second.handle());
    assert_eq!(
        crypto.public_sign_key_bytes(&first).await.unwrap(),
        crypto.public_sign_key_bytes(&second).await.unwrap()
    );

    let first = crypto.app_public_encrypt_key().await.unwrap();
    let second = crypto.app_public_encrypt_key().await.unwrap();
    assert_eq!(
        crypto.public_encrypt_key_bytes(&first).await.unwrap(),
        crypto.public_encrypt_key_bytes(&second).await.unwrap()
    );
}

#[tokio::test]
async fn test_key_release_paths() {
    let test = common::setup_test_app();
    let crypto = test.app().crypto();

    // explicit release
    let pair = crypto.generate_sign_key_pair().await.unwrap();
    assert_eq!(test.live_handles(), 2);
    pair.public.release();
    pair.secret.release();
    test.wait_for_baseline().await.unwrap();

    // halves of a pair live independently
    let pair = crypto.generate_encrypt_key_pair().await.unwrap();
    drop(pair.secret);
    test.wait_for_live_handles(1).await.unwrap();
    let sealed = crypto
        .encrypt_sealed_box(&pair.public, b"still usable")
        .await
        .unwrap();
    assert!(!sealed.is_empty());
    drop(pair.public);
    test.wait_for_baseline().await.unwrap();

    // into_raw hands ownership back to the caller
    let key = crypto.app_public_sign_key().await.unwrap();
    let raw = key.into_raw();
    test.wait_for_live_handles(1).await.unwrap();
    ::common::crypto::PublicSignKey::from_raw(test.app(), raw).release();
    test.wait_for_baseline().await.unwrap();
}

#[tokio::test]
async fn test_abandoned_requests_do_not_leak_keys() {
    let test = common::setup_test_app();
    let crypto = test.app().crypto();

    // the request is already issued, dropping the future orphans its result
    for _ in 0..10 {
        drop(crypto.generate_sign_key_pair());
        drop(crypto.generate_encrypt_key_pair());
        drop(crypto.app_public_sign_key());
    }
    test.wait_for_baseline().await.unwrap();
}
