// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Tamper-resistance suite: every mutation of stored ciphertext or
//! envelope metadata must surface the documented error kind.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use sealed_store::{
    from_io_error, ClientConfig, CommitmentPolicy, ContentEncryptionAlgorithm, EncryptionClient, GetOptions, Material,
    ObjectBody, PutOptions, SecurityProfile, StringMap,
};
use sealed_store_domain::ClientError;

use crate::common::{init_tracing, InMemoryObjectStore, MockKeyProvider, BUCKET};

async fn committing_fixture() -> (std::sync::Arc<InMemoryObjectStore>, EncryptionClient, Vec<u8>) {
    init_tracing();
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let context = StringMap::from([("purpose".to_string(), "doc".to_string())]);
    let client = EncryptionClient::new(
        store.clone(),
        Material::kms_context("k1", context).unwrap(),
        Some(kms),
        ClientConfig::default(),
    )
    .unwrap();
    let plaintext = vec![0xB7u8; 2048];
    client
        .put_object(BUCKET, "target", ObjectBody::from_bytes(plaintext.clone()), PutOptions::default())
        .await
        .unwrap();
    (store, client, plaintext)
}

async fn v2_fixture() -> (std::sync::Arc<InMemoryObjectStore>, EncryptionClient, Vec<u8>) {
    init_tracing();
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let config = ClientConfig::default()
        .with_security_profile(SecurityProfile::V4AndLegacy)
        .with_commitment_policy(CommitmentPolicy::ForbidEncryptAllowDecrypt)
        .with_content_algorithm(ContentEncryptionAlgorithm::AesGcm);
    let client = EncryptionClient::new(
        store.clone(),
        Material::kms_context("k1", StringMap::new()).unwrap(),
        Some(kms),
        config,
    )
    .unwrap();
    let plaintext = vec![0x2Eu8; 2048];
    client
        .put_object(BUCKET, "target", ObjectBody::from_bytes(plaintext.clone()), PutOptions::default())
        .await
        .unwrap();
    (store, client, plaintext)
}

fn flip_base64_bit(value: &str) -> String {
    let mut bytes = BASE64.decode(value).unwrap();
    bytes[0] ^= 0x01;
    BASE64.encode(bytes)
}

/// Flipping any ciphertext or tag bit fails the full read with a
/// CryptoError, surfaced on the read that reaches end-of-stream.
#[tokio::test]
async fn test_ciphertext_bit_flip() {
    for position in [0usize, 1000, 2047, 2048, 2063] {
        let (store, client, _) = v2_fixture().await;
        store.corrupt(BUCKET, "target", |stored| {
            stored.bytes[position] ^= 0x04;
        });
        let (_, body) = client.get_object(BUCKET, "target", GetOptions::default()).await.unwrap();
        let err = body.collect().await.unwrap_err();
        assert!(
            matches!(err, ClientError::CryptoError(_)),
            "flip at {position}: {err:?}"
        );
    }
}

/// S5: flipping a bit of the stored key commitment fails decrypt with
/// KeyCommitmentMismatch before any content is read.
#[tokio::test]
async fn test_commitment_tamper() {
    let (store, client, _) = committing_fixture().await;
    store.corrupt(BUCKET, "target", |stored| {
        let flipped = flip_base64_bit(stored.metadata.get("x-amz-d").unwrap());
        stored.metadata.insert("x-amz-d".to_string(), flipped);
    });
    let err = client.get_object(BUCKET, "target", GetOptions::default()).await.unwrap_err();
    assert!(matches!(err, ClientError::KeyCommitmentMismatch(_)));
}

/// The commitment check runs before the content key is derived: with both
/// the commitment and the ciphertext mutated, the commitment error wins.
#[tokio::test]
async fn test_commitment_checked_before_content() {
    let (store, client, _) = committing_fixture().await;
    store.corrupt(BUCKET, "target", |stored| {
        let flipped = flip_base64_bit(stored.metadata.get("x-amz-d").unwrap());
        stored.metadata.insert("x-amz-d".to_string(), flipped);
        stored.bytes[0] ^= 0xFF;
    });
    let err = client.get_object(BUCKET, "target", GetOptions::default()).await.unwrap_err();
    assert!(matches!(err, ClientError::KeyCommitmentMismatch(_)));
}

/// Replacing the commitment with a same-length foreign value fails the
/// same way.
#[tokio::test]
async fn test_commitment_replacement() {
    let (store, client, _) = committing_fixture().await;
    store.corrupt(BUCKET, "target", |stored| {
        stored
            .metadata
            .insert("x-amz-d".to_string(), BASE64.encode([0x55u8; 32]));
    });
    let err = client.get_object(BUCKET, "target", GetOptions::default()).await.unwrap_err();
    assert!(matches!(err, ClientError::KeyCommitmentMismatch(_)));
}

/// Rewriting `x-amz-cek-alg` to another supported value breaks the
/// envelope structurally: InvalidData, not a successful decrypt under the
/// wrong cipher.
#[tokio::test]
async fn test_cek_algorithm_binding() {
    let (store, client, _) = v2_fixture().await;
    store.corrupt(BUCKET, "target", |stored| {
        stored
            .metadata
            .insert("x-amz-cek-alg".to_string(), "AES/CBC/PKCS5Padding".to_string());
    });
    let err = client.get_object(BUCKET, "target", GetOptions::default()).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidData(_)));
}

/// Mutating the V2 material description desynchronizes the KMS encryption
/// context: the provider refuses the decrypt.
#[tokio::test]
async fn test_context_binding_v2() {
    let (store, client, _) = v2_fixture().await;
    store.corrupt(BUCKET, "target", |stored| {
        stored.metadata.insert(
            "x-amz-matdesc".to_string(),
            r#"{"aws:x-amz-cek-alg":"AES/GCM/NoPadding","tenant":"intruder"}"#.to_string(),
        );
    });
    let err = client.get_object(BUCKET, "target", GetOptions::default()).await.unwrap_err();
    assert!(
        matches!(err, ClientError::CryptoError(_) | ClientError::EncryptionContextMismatch(_)),
        "{err:?}"
    );
}

/// Mutating `x-amz-t` on a V3 object fails the same way.
#[tokio::test]
async fn test_context_binding_v3() {
    let (store, client, _) = committing_fixture().await;
    store.corrupt(BUCKET, "target", |stored| {
        stored
            .metadata
            .insert("x-amz-t".to_string(), r#"{"purpose":"exfiltration"}"#.to_string());
    });
    let err = client.get_object(BUCKET, "target", GetOptions::default()).await.unwrap_err();
    assert!(
        matches!(err, ClientError::CryptoError(_) | ClientError::EncryptionContextMismatch(_)),
        "{err:?}"
    );
}

/// A caller-supplied decrypt context that disagrees with the stored one
/// is refused; the exact stored context is accepted.
#[tokio::test]
async fn test_caller_supplied_context() {
    let (_store, client, plaintext) = committing_fixture().await;

    let good = StringMap::from([("purpose".to_string(), "doc".to_string())]);
    let (_, body) = client
        .get_object(
            BUCKET,
            "target",
            GetOptions {
                encryption_context: Some(good),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(body.collect().await.unwrap(), plaintext);

    let bad = StringMap::from([("purpose".to_string(), "other".to_string())]);
    let err = client
        .get_object(
            BUCKET,
            "target",
            GetOptions {
                encryption_context: Some(bad),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(
        matches!(err, ClientError::CryptoError(_) | ClientError::EncryptionContextMismatch(_)),
        "{err:?}"
    );
}

/// A reserved-key context is rejected at the boundary; nothing reaches the
/// store.
#[tokio::test]
async fn test_reserved_key_rejection() {
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let client = EncryptionClient::new(
        store.clone(),
        Material::kms_context("k1", StringMap::new()).unwrap(),
        Some(kms),
        ClientConfig::default(),
    )
    .unwrap();

    let poisoned = StringMap::from([("aws:x-amz-cek-alg".to_string(), "AES/GCM/NoPadding".to_string())]);
    let err = client
        .put_object(
            BUCKET,
            "never-written",
            ObjectBody::from_bytes(b"data".to_vec()),
            PutOptions {
                encryption_context: Some(poisoned),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));
    assert_eq!(store.object_count(), 0);
}

/// An unknown V3 short wrap code is rejected, never guessed.
#[tokio::test]
async fn test_unknown_short_wrap_code() {
    let (store, client, _) = committing_fixture().await;
    store.corrupt(BUCKET, "target", |stored| {
        stored.metadata.insert("x-amz-w".to_string(), "99".to_string());
    });
    let err = client.get_object(BUCKET, "target", GetOptions::default()).await.unwrap_err();
    assert!(matches!(err, ClientError::UnsupportedAlgorithm(_)));
}

// Keep the io-error unwrapping helper honest.
#[tokio::test]
async fn test_error_unwrapping_helper() {
    let io = std::io::Error::new(
        std::io::ErrorKind::Other,
        ClientError::crypto_error("authentication tag mismatch"),
    );
    assert!(matches!(from_io_error(io), ClientError::CryptoError(_)));
}
