//! Signing and box encryption over Ed25519, X25519 and ChaCha20-Poly1305
//!
//! - **Signing**: Ed25519 in combined mode, `signature (64 bytes) || message`.
//!   Verification is strict and returns the message.
//! - **Box**: X25519 ECDH between the sender's secret key and the
//!   recipient's public key, keyed into ChaCha20-Poly1305 with BLAKE3
//!   `derive_key`. Output is `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
//! - **Sealed box**: an ephemeral X25519 key replaces the sender's key, so
//!   only the recipient's key pair is needed to open it. Key and nonce are
//!   derived from the shared secret and both public keys. Output is
//!   `ephemeral_pubkey (32 bytes) || ciphertext || tag (16 bytes)`.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};

use super::codes;
use crate::bridge::NativeError;

/// Size of every key accepted by the import calls
pub const KEY_SIZE: usize = 32;
/// Size of an Ed25519 signature in bytes
pub const SIGNATURE_SIZE: usize = 64;
/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of the Poly1305 authentication tag in bytes
pub const TAG_SIZE: usize = 16;

const BOX_CONTEXT: &str = "safe-common 2024-06 box key";
const SEALED_KEY_CONTEXT: &str = "safe-common 2024-06 sealed box key";
const SEALED_NONCE_CONTEXT: &str = "safe-common 2024-06 sealed box nonce";

fn random_bytes<const N: usize>() -> Result<[u8; N], NativeError> {
    let mut buff = [0u8; N];
    getrandom::getrandom(&mut buff).map_err(|e| {
        NativeError::new(
            codes::RANDOMNESS,
            format!("failed to generate random bytes: {}", e),
        )
    })?;
    Ok(buff)
}

fn key_bytes(bytes: &[u8], what: &str) -> Result<[u8; KEY_SIZE], NativeError> {
    bytes.try_into().map_err(|_| {
        NativeError::new(
            codes::INVALID_KEY,
            format!(
                "invalid {} size, expected {}, got {}",
                what,
                KEY_SIZE,
                bytes.len()
            ),
        )
    })
}

pub fn generate_sign_key() -> Result<SigningKey, NativeError> {
    Ok(SigningKey::from_bytes(&random_bytes()?))
}

pub fn generate_encrypt_key() -> Result<StaticSecret, NativeError> {
    Ok(StaticSecret::from(random_bytes::<KEY_SIZE>()?))
}

pub fn sign_public_key(bytes: &[u8]) -> Result<VerifyingKey, NativeError> {
    VerifyingKey::from_bytes(&key_bytes(bytes, "public sign key")?).map_err(|e| {
        NativeError::new(
            codes::INVALID_KEY,
            format!("invalid public sign key: {}", e),
        )
    })
}

pub fn sign_secret_key(bytes: &[u8]) -> Result<SigningKey, NativeError> {
    Ok(SigningKey::from_bytes(&key_bytes(bytes, "secret sign key")?))
}

pub fn encrypt_public_key(bytes: &[u8]) -> Result<X25519PublicKey, NativeError> {
    Ok(X25519PublicKey::from(key_bytes(bytes, "public encrypt key")?))
}

pub fn encrypt_secret_key(bytes: &[u8]) -> Result<StaticSecret, NativeError> {
    Ok(StaticSecret::from(key_bytes(bytes, "secret encrypt key")?))
}

/// Sign `data`, returning `signature || data`
pub fn sign(key: &SigningKey, data: &[u8]) -> Vec<u8> {
    let signature = key.sign(data);
    let mut out = Vec::with_capacity(SIGNATURE_SIZE + data.len());
    out.extend_from_slice(&signature.to_bytes());
    out.extend_from_slice(data);
    out
}

/// Verify a `signature || data` buffer and return `data`
pub fn verify(key: &VerifyingKey, signed: &[u8]) -> Result<Vec<u8>, NativeError> {
    if signed.len() < SIGNATURE_SIZE {
        return Err(NativeError::new(
            codes::INVALID_SIGNATURE,
            "signed data too short for signature",
        ));
    }
    let (signature, data) = signed.split_at(SIGNATURE_SIZE);
    let signature = Signature::from_slice(signature)
        .map_err(|e| NativeError::new(codes::INVALID_SIGNATURE, e.to_string()))?;
    key.verify_strict(data, &signature)
        .map_err(|_| NativeError::new(codes::INVALID_SIGNATURE, "signature verification failed"))?;
    Ok(data.to_vec())
}

fn shared_key(
    secret: &StaticSecret,
    public: &X25519PublicKey,
) -> Result<x25519_dalek::SharedSecret, NativeError> {
    let shared = secret.diffie_hellman(public);
    if !shared.was_contributory() {
        return Err(NativeError::new(
            codes::INVALID_KEY,
            "public encrypt key is a low order point",
        ));
    }
    Ok(shared)
}

fn seal(key: &[u8; KEY_SIZE], nonce: &[u8; NONCE_SIZE], data: &[u8]) -> Result<Vec<u8>, NativeError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(Nonce::from_slice(nonce), data)
        .map_err(|_| NativeError::new(codes::ENCRYPTION, "encrypt error"))
}

fn open(key: &[u8; KEY_SIZE], nonce: &[u8], data: &[u8]) -> Result<Vec<u8>, NativeError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(Nonce::from_slice(nonce), data)
        .map_err(|_| NativeError::new(codes::DECRYPTION, "decrypt error"))
}

/// Authenticated encryption from `our_secret` to `their_public`
pub fn encrypt(
    data: &[u8],
    their_public: &X25519PublicKey,
    our_secret: &StaticSecret,
) -> Result<Vec<u8>, NativeError> {
    let shared = shared_key(our_secret, their_public)?;
    let key = blake3::derive_key(BOX_CONTEXT, shared.as_bytes());
    let nonce = random_bytes::<NONCE_SIZE>()?;

    let ciphertext = seal(&key, &nonce, data)?;
    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a box sent by `their_public` to `our_secret`
pub fn decrypt(
    data: &[u8],
    their_public: &X25519PublicKey,
    our_secret: &StaticSecret,
) -> Result<Vec<u8>, NativeError> {
    if data.len() < NONCE_SIZE + TAG_SIZE {
        return Err(NativeError::new(codes::DECRYPTION, "data too short for nonce"));
    }
    let shared = shared_key(our_secret, their_public)?;
    let key = blake3::derive_key(BOX_CONTEXT, shared.as_bytes());
    let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
    open(&key, nonce, ciphertext)
}

fn sealed_params(
    shared: &[u8],
    ephemeral: &X25519PublicKey,
    recipient: &X25519PublicKey,
) -> ([u8; KEY_SIZE], [u8; NONCE_SIZE]) {
    let mut key = blake3::Hasher::new_derive_key(SEALED_KEY_CONTEXT);
    key.update(shared);
    key.update(ephemeral.as_bytes());
    key.update(recipient.as_bytes());

    let mut nonce_hasher = blake3::Hasher::new_derive_key(SEALED_NONCE_CONTEXT);
    nonce_hasher.update(ephemeral.as_bytes());
    nonce_hasher.update(recipient.as_bytes());
    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(&nonce_hasher.finalize().as_bytes()[..NONCE_SIZE]);

    (*key.finalize().as_bytes(), nonce)
}

/// Anonymous encryption to `recipient`
pub fn encrypt_sealed(data: &[u8], recipient: &X25519PublicKey) -> Result<Vec<u8>, NativeError> {
    let ephemeral_secret = generate_encrypt_key()?;
    let ephemeral_public = X25519PublicKey::from(&ephemeral_secret);
    let shared = shared_key(&ephemeral_secret, recipient)?;
    let (key, nonce) = sealed_params(shared.as_bytes(), &ephemeral_public, recipient);

    let ciphertext = seal(&key, &nonce, data)?;
    let mut out = Vec::with_capacity(KEY_SIZE + ciphertext.len());
    out.extend_from_slice(ephemeral_public.as_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a sealed box with the recipient's secret key
pub fn decrypt_sealed(data: &[u8], recipient_secret: &StaticSecret) -> Result<Vec<u8>, NativeError> {
    if data.len() < KEY_SIZE + TAG_SIZE {
        return Err(NativeError::new(
            codes::DECRYPTION,
            "sealed box too short for ephemeral key",
        ));
    }
    let (ephemeral, ciphertext) = data.split_at(KEY_SIZE);
    let ephemeral_public = encrypt_public_key(ephemeral)?;
    let recipient_public = X25519PublicKey::from(recipient_secret);
    let shared = shared_key(recipient_secret, &ephemeral_public)
        .map_err(|e| NativeError::new(codes::DECRYPTION, e.description))?;
    let (key, nonce) = sealed_params(shared.as_bytes(), &ephemeral_public, &recipient_public);
    open(&key, &nonce, ciphertext)
}
