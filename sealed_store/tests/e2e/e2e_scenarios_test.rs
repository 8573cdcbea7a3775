// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! End-to-end scenarios: round-trips through every supported material and
//! format generation, multipart uploads, instruction-file mode, and the
//! legacy read path.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use sealed_store::{
    ClientConfig, CommitmentPolicy, ContentEncryptionAlgorithm, EncryptionClient, GetOptions, Material, ObjectBody,
    PutOptions, SecurityProfile, StorageMode, StringMap,
};
use sealed_store_domain::{ClientError, ObjectStore as _};

use crate::common::{init_tracing, InMemoryObjectStore, MockKeyProvider, BUCKET};

fn v2_kms_config() -> ClientConfig {
    ClientConfig::default()
        .with_security_profile(SecurityProfile::V2)
        .with_commitment_policy(CommitmentPolicy::ForbidEncryptAllowDecrypt)
        .with_content_algorithm(ContentEncryptionAlgorithm::AesGcm)
}

fn kms_material(context: StringMap) -> Material {
    Material::kms_context("k1", context).unwrap()
}

async fn get_plaintext(client: &EncryptionClient, key: &str) -> Result<Vec<u8>, ClientError> {
    let (_, body) = client.get_object(BUCKET, key, GetOptions::default()).await?;
    body.collect().await
}

/// S1: V2 KMS round-trip. A 26-byte plaintext encrypted under a KMS data
/// key with the V2 metadata schema.
/// Validates that:
/// - All six V2 mapkeys are present with the documented values
/// - The IV is 12 base64-decoded bytes
/// - The material description carries the reserved CEK-alg entry
/// - Decryption returns the original bytes
#[tokio::test]
async fn test_s1_v2_kms_round_trip() {
    init_tracing();
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let client = EncryptionClient::new(
        store.clone(),
        kms_material(StringMap::new()),
        Some(kms),
        v2_kms_config(),
    )
    .unwrap();

    let plaintext = b"Encryption Client Testing!".to_vec();
    assert_eq!(plaintext.len(), 26);
    client
        .put_object(BUCKET, "s1", ObjectBody::from_bytes(plaintext.clone()), PutOptions::default())
        .await
        .unwrap();

    let stored = store.object(BUCKET, "s1").unwrap();
    assert!(stored.metadata.contains_key("x-amz-key-v2"));
    let iv = BASE64.decode(stored.metadata.get("x-amz-iv").unwrap()).unwrap();
    assert_eq!(iv.len(), 12);
    assert_eq!(stored.metadata.get("x-amz-wrap-alg").unwrap(), "kms+context");
    assert_eq!(stored.metadata.get("x-amz-cek-alg").unwrap(), "AES/GCM/NoPadding");
    assert_eq!(stored.metadata.get("x-amz-tag-len").unwrap(), "128");
    assert!(stored
        .metadata
        .get("x-amz-matdesc")
        .unwrap()
        .contains(r#""aws:x-amz-cek-alg":"AES/GCM/NoPadding""#));
    // Ciphertext is plaintext length plus the 16-byte tag, never plaintext.
    assert_eq!(stored.bytes.len(), 26 + 16);
    assert_ne!(&stored.bytes[..26], &plaintext[..]);

    assert_eq!(get_plaintext(&client, "s1").await.unwrap(), plaintext);
}

/// S2: V3 committing round-trip with 15 MiB of 0xAA under
/// RequireEncryptRequireDecrypt.
/// Validates that:
/// - The object carries `x-amz-c = 115`, a commitment, and a nonzero
///   12-byte message id
/// - The user's encryption context is stored verbatim in `x-amz-t`
/// - Decryption returns all 15 MiB intact
#[tokio::test]
async fn test_s2_v3_committing_round_trip() {
    init_tracing();
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let context = StringMap::from([("purpose".to_string(), "doc".to_string())]);
    let config = ClientConfig::default()
        .with_security_profile(SecurityProfile::V4)
        .with_commitment_policy(CommitmentPolicy::RequireEncryptRequireDecrypt)
        .with_content_algorithm(ContentEncryptionAlgorithm::AesGcmWithCommitment);
    let client = EncryptionClient::new(store.clone(), kms_material(context), Some(kms), config).unwrap();

    let plaintext = vec![0xAAu8; 15 * 1024 * 1024];
    client
        .put_object(BUCKET, "s2", ObjectBody::from_bytes(plaintext.clone()), PutOptions::default())
        .await
        .unwrap();

    let stored = store.object(BUCKET, "s2").unwrap();
    assert_eq!(stored.metadata.get("x-amz-c").unwrap(), "115");
    assert!(stored.metadata.contains_key("x-amz-d"));
    let message_id = BASE64.decode(stored.metadata.get("x-amz-i").unwrap()).unwrap();
    assert_eq!(message_id.len(), 12);
    assert!(message_id.iter().any(|&b| b != 0));
    assert_eq!(stored.metadata.get("x-amz-t").unwrap(), r#"{"purpose":"doc"}"#);

    assert_eq!(get_plaintext(&client, "s2").await.unwrap(), plaintext);
}

/// S3: V1 legacy read. A pre-built CBC object with only the V1 mapkeys
/// decrypts under V2AndLegacy and is refused under V2.
#[tokio::test]
async fn test_s3_v1_legacy_read() {
    use aes::cipher::Array as GenericArray;
    use aes::cipher::{block_padding::Pkcs7, BlockModeEncrypt, KeyInit, KeyIvInit};

    let store = InMemoryObjectStore::new();
    let kek = vec![0x44u8; 32];
    let cek = [0x17u8; 32];
    let iv = [0x29u8; 16];
    let plaintext = b"written by a very old client".to_vec();

    // CBC-PKCS7 content under the CEK.
    let ciphertext =
        cbc::Encryptor::<aes::Aes256>::new((&cek).into(), (&iv).into()).encrypt_padded_vec::<Pkcs7>(&plaintext);

    // V1 symmetric key wrap: AES-ECB over the PKCS7-padded CEK.
    let mut wrapped = cek.to_vec();
    wrapped.extend_from_slice(&[16u8; 16]);
    let mut enc = ecb::Encryptor::<aes::Aes256>::new(GenericArray::from_slice(&kek));
    for chunk in wrapped.chunks_exact_mut(16) {
        enc.encrypt_block(GenericArray::from_mut_slice(chunk));
    }

    let mut metadata = StringMap::new();
    metadata.insert("x-amz-key".to_string(), BASE64.encode(&wrapped));
    metadata.insert("x-amz-iv".to_string(), BASE64.encode(iv));
    metadata.insert("x-amz-matdesc".to_string(), "{}".to_string());
    store
        .put_object(BUCKET, "s3", &metadata, ObjectBody::from_bytes(ciphertext))
        .await
        .unwrap();

    let legacy_config = ClientConfig::default()
        .with_security_profile(SecurityProfile::V2AndLegacy)
        .with_commitment_policy(CommitmentPolicy::ForbidEncryptAllowDecrypt)
        .with_content_algorithm(ContentEncryptionAlgorithm::AesGcm);
    let legacy_client = EncryptionClient::new(
        store.clone(),
        Material::aes_gcm(kek.clone()).unwrap(),
        None,
        legacy_config,
    )
    .unwrap();
    assert_eq!(get_plaintext(&legacy_client, "s3").await.unwrap(), plaintext);

    let strict_client =
        EncryptionClient::new(store.clone(), Material::aes_gcm(kek).unwrap(), None, v2_kms_config()).unwrap();
    let err = get_plaintext(&strict_client, "s3").await.unwrap_err();
    assert!(matches!(err, ClientError::UnsupportedAlgorithm(_)));
}

/// S4: multipart V2 upload. Three 5 MiB parts stream through one GCM
/// message; a single download decrypts to the concatenated plaintext.
#[tokio::test]
async fn test_s4_multipart_v2() {
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let client = EncryptionClient::new(
        store.clone(),
        kms_material(StringMap::new()),
        Some(kms),
        v2_kms_config(),
    )
    .unwrap();

    let parts: Vec<Vec<u8>> = (0..3u8).map(|i| vec![0x40 + i; 5 * 1024 * 1024]).collect();
    let handle = client
        .initiate_multipart_upload(BUCKET, "s4", PutOptions::default())
        .await
        .unwrap();
    assert_eq!(
        client.upload_id_for_handle(handle.request_handle).as_deref(),
        Some(handle.upload_id.as_str())
    );

    for (index, part) in parts.iter().enumerate() {
        let part_number = index as u64 + 1;
        let is_last = index == parts.len() - 1;
        client
            .upload_part(
                BUCKET,
                "s4",
                &handle.upload_id,
                part_number,
                ObjectBody::from_bytes(part.clone()),
                is_last,
                Default::default(),
            )
            .await
            .unwrap();
    }
    client
        .complete_multipart_upload(BUCKET, "s4", &handle.upload_id)
        .await
        .unwrap();

    let expected: Vec<u8> = parts.concat();
    assert_eq!(store.object(BUCKET, "s4").unwrap().bytes.len(), expected.len() + 16);
    assert_eq!(get_plaintext(&client, "s4").await.unwrap(), expected);
}

/// Out-of-order and concurrent part numbers are protocol violations.
#[tokio::test]
async fn test_multipart_part_ordering() {
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let client = EncryptionClient::new(
        store.clone(),
        kms_material(StringMap::new()),
        Some(kms),
        v2_kms_config(),
    )
    .unwrap();

    let handle = client
        .initiate_multipart_upload(BUCKET, "ooo", PutOptions::default())
        .await
        .unwrap();
    let err = client
        .upload_part(
            BUCKET,
            "ooo",
            &handle.upload_id,
            2,
            ObjectBody::from_bytes(vec![1u8; 16]),
            false,
            Default::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ProtocolViolation(_)));

    // Completion before the final part is refused as well.
    client
        .upload_part(
            BUCKET,
            "ooo",
            &handle.upload_id,
            1,
            ObjectBody::from_bytes(vec![1u8; 16]),
            false,
            Default::default(),
        )
        .await
        .unwrap();
    let err = client
        .complete_multipart_upload(BUCKET, "ooo", &handle.upload_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ProtocolViolation(_)));
}

/// Abort drops the upload context; further parts are unknown to the
/// client.
#[tokio::test]
async fn test_multipart_abort() {
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let client = EncryptionClient::new(
        store.clone(),
        kms_material(StringMap::new()),
        Some(kms),
        v2_kms_config(),
    )
    .unwrap();

    let handle = client
        .initiate_multipart_upload(BUCKET, "aborted", PutOptions::default())
        .await
        .unwrap();
    client
        .abort_multipart_upload(BUCKET, "aborted", &handle.upload_id)
        .await
        .unwrap();
    let err = client
        .upload_part(
            BUCKET,
            "aborted",
            &handle.upload_id,
            1,
            ObjectBody::from_bytes(vec![0u8; 8]),
            true,
            Default::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::ProtocolViolation(_)));
}

/// S6: instruction-file mode V2. The object itself carries no envelope
/// mapkeys; the `.instruction` sidecar holds them all. Removing the
/// sidecar makes the object unreadable as NotEncrypted.
#[tokio::test]
async fn test_s6_instruction_file_mode() {
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let config = v2_kms_config().with_storage_mode(StorageMode::InstructionFile);
    let client = EncryptionClient::new(store.clone(), kms_material(StringMap::new()), Some(kms), config).unwrap();

    let plaintext = b"Encryption Client Testing!".to_vec();
    client
        .put_object(BUCKET, "s6", ObjectBody::from_bytes(plaintext.clone()), PutOptions::default())
        .await
        .unwrap();

    let stored = store.object(BUCKET, "s6").unwrap();
    assert!(!stored.metadata.contains_key("x-amz-key-v2"));
    assert!(!stored.metadata.contains_key("x-amz-iv"));

    let sidecar = store.object(BUCKET, "s6.instruction").unwrap();
    let envelope: StringMap = serde_json::from_slice(&sidecar.bytes).unwrap();
    assert!(envelope.contains_key("x-amz-key-v2"));
    assert_eq!(envelope.get("x-amz-wrap-alg").unwrap(), "kms+context");

    assert_eq!(get_plaintext(&client, "s6").await.unwrap(), plaintext);

    store.delete(BUCKET, "s6.instruction");
    let err = get_plaintext(&client, "s6").await.unwrap_err();
    assert!(matches!(err, ClientError::NotEncrypted(_)));
}

/// V3 committing objects in instruction-file mode split the envelope:
/// content keys on the object, wrap keys in the sidecar.
#[tokio::test]
async fn test_v3_instruction_file_mode() {
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let config = ClientConfig::default().with_storage_mode(StorageMode::InstructionFile);
    let client = EncryptionClient::new(store.clone(), kms_material(StringMap::new()), Some(kms), config).unwrap();

    let plaintext = vec![0x9Cu8; 4096];
    client
        .put_object(BUCKET, "v3if", ObjectBody::from_bytes(plaintext.clone()), PutOptions::default())
        .await
        .unwrap();

    let stored = store.object(BUCKET, "v3if").unwrap();
    assert!(stored.metadata.contains_key("x-amz-c"));
    assert!(stored.metadata.contains_key("x-amz-d"));
    assert!(stored.metadata.contains_key("x-amz-i"));
    assert!(!stored.metadata.contains_key("x-amz-k"));

    let sidecar = store.object(BUCKET, "v3if.instruction").unwrap();
    let envelope: StringMap = serde_json::from_slice(&sidecar.bytes).unwrap();
    assert!(envelope.contains_key("x-amz-k"));
    assert_eq!(envelope.get("x-amz-w").unwrap(), "23");

    assert_eq!(get_plaintext(&client, "v3if").await.unwrap(), plaintext);
}

/// Round-trip through RSA materials: the inner-wrap travels under
/// RSA-OAEP-SHA1 and unwraps on the way back.
#[tokio::test]
async fn test_rsa_material_round_trip() {
    let mut rng = rand::rngs::OsRng;
    let key_pair = rsa::RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let store = InMemoryObjectStore::new();
    let client = EncryptionClient::new(
        store.clone(),
        Material::rsa_oaep_sha1(key_pair),
        None,
        v2_kms_config(),
    )
    .unwrap();

    let plaintext = b"asymmetric wrap".to_vec();
    client
        .put_object(BUCKET, "rsa", ObjectBody::from_bytes(plaintext.clone()), PutOptions::default())
        .await
        .unwrap();
    let stored = store.object(BUCKET, "rsa").unwrap();
    assert_eq!(stored.metadata.get("x-amz-wrap-alg").unwrap(), "RSA-OAEP-SHA1");
    assert_eq!(get_plaintext(&client, "rsa").await.unwrap(), plaintext);
}

/// Round-trip through symmetric AES materials with the V3 committing
/// suite and the `02` short wrap code on the wire.
#[tokio::test]
async fn test_aes_material_committing_round_trip() {
    let store = InMemoryObjectStore::new();
    let client = EncryptionClient::new(
        store.clone(),
        Material::aes_gcm(vec![0x0Fu8; 32]).unwrap(),
        None,
        ClientConfig::default(),
    )
    .unwrap();

    let plaintext = vec![0x61u8; 70_000];
    client
        .put_object(BUCKET, "aeskek", ObjectBody::from_bytes(plaintext.clone()), PutOptions::default())
        .await
        .unwrap();
    let stored = store.object(BUCKET, "aeskek").unwrap();
    assert_eq!(stored.metadata.get("x-amz-w").unwrap(), "02");
    assert_eq!(get_plaintext(&client, "aeskek").await.unwrap(), plaintext);
}

/// Decrypting the same object twice yields bit-identical plaintext.
#[tokio::test]
async fn test_idempotent_decrypt() {
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    let client = EncryptionClient::new(
        store.clone(),
        kms_material(StringMap::new()),
        Some(kms),
        ClientConfig::default(),
    )
    .unwrap();

    let plaintext: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
    client
        .put_object(BUCKET, "twice", ObjectBody::from_bytes(plaintext.clone()), PutOptions::default())
        .await
        .unwrap();
    let first = get_plaintext(&client, "twice").await.unwrap();
    let second = get_plaintext(&client, "twice").await.unwrap();
    assert_eq!(first, plaintext);
    assert_eq!(first, second);
}

/// Plain objects without any envelope are refused as NotEncrypted.
#[tokio::test]
async fn test_unencrypted_object() {
    let store = InMemoryObjectStore::new();
    let kms = MockKeyProvider::new();
    store
        .put_object(BUCKET, "plain", &StringMap::new(), ObjectBody::from_bytes(b"clear".to_vec()))
        .await
        .unwrap();
    let client = EncryptionClient::new(
        store.clone(),
        kms_material(StringMap::new()),
        Some(kms),
        ClientConfig::default(),
    )
    .unwrap();
    let err = get_plaintext(&client, "plain").await.unwrap_err();
    assert!(matches!(err, ClientError::NotEncrypted(_)));
}
