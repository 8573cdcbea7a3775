// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Ranged-read decryption: block alignment, tag-region truncation, and the
//! committing-suite derivation on the ranged path.

use sealed_store::{
    ByteRange, ClientConfig, CommitmentPolicy, ContentEncryptionAlgorithm, EncryptionClient, GetOptions, Material,
    ObjectBody, PutOptions, SecurityProfile, StringMap,
};
use sealed_store_domain::ClientError;

use crate::common::{InMemoryObjectStore, MockKeyProvider, BUCKET};

async fn fixture(config: ClientConfig) -> (EncryptionClient, Vec<u8>) {
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let client = EncryptionClient::new(
        store,
        Material::kms_context("k1", StringMap::new()).unwrap(),
        Some(kms),
        config,
    )
    .unwrap();
    let plaintext: Vec<u8> = (0..4096u32).map(|i| (i % 256) as u8).collect();
    client
        .put_object(BUCKET, "ranged", ObjectBody::from_bytes(plaintext.clone()), PutOptions::default())
        .await
        .unwrap();
    (client, plaintext)
}

fn v2_config() -> ClientConfig {
    ClientConfig::default()
        .with_security_profile(SecurityProfile::V2)
        .with_commitment_policy(CommitmentPolicy::ForbidEncryptAllowDecrypt)
        .with_content_algorithm(ContentEncryptionAlgorithm::AesGcm)
}

async fn read_range(client: &EncryptionClient, range: ByteRange) -> Result<Vec<u8>, ClientError> {
    let (_, body) = client
        .get_object(
            BUCKET,
            "ranged",
            GetOptions {
                range: Some(range),
                ..Default::default()
            },
        )
        .await?;
    body.collect().await
}

/// Interior aligned ranges decrypt to the matching plaintext slice.
#[tokio::test]
async fn test_aligned_ranges() {
    let (client, plaintext) = fixture(v2_config()).await;
    for (start, end) in [(0u64, 15u64), (16, 47), (1024, 2047), (4080, 4095)] {
        let out = read_range(&client, ByteRange::new(start, end).unwrap()).await.unwrap();
        assert_eq!(out, &plaintext[start as usize..=end as usize], "range {start}-{end}");
    }
}

/// A start offset that is not a multiple of the cipher block is an
/// InvalidArgument before any ciphertext is fetched.
#[tokio::test]
async fn test_misaligned_start_rejected() {
    let (client, _) = fixture(v2_config()).await;
    let err = read_range(&client, ByteRange::new(8, 31).unwrap()).await.unwrap_err();
    assert!(matches!(err, ClientError::InvalidArgument(_)));
}

/// A range overlapping the trailing tag region truncates at the end of
/// the content; the tag bytes are never surfaced as plaintext.
#[tokio::test]
async fn test_tag_region_truncation() {
    let (client, plaintext) = fixture(v2_config()).await;
    // Ciphertext is 4096 content bytes + 16 tag bytes.
    let out = read_range(&client, ByteRange::new(4080, 4111).unwrap()).await.unwrap();
    assert_eq!(out, &plaintext[4080..4096]);

    // A range entirely inside the tag region yields nothing.
    let out = read_range(&client, ByteRange::new(4096, 4111).unwrap()).await.unwrap();
    assert!(out.is_empty());
}

/// Ranged reads of committing-suite objects derive the content key (and
/// verify the commitment) before the CTR translation.
#[tokio::test]
async fn test_ranged_read_committing_suite() {
    let (client, plaintext) = fixture(ClientConfig::default()).await;
    let out = read_range(&client, ByteRange::new(256, 511).unwrap()).await.unwrap();
    assert_eq!(out, &plaintext[256..512]);
}
