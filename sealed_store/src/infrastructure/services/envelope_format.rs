// /////////////////////////////////////////////////////////////////////////////
// Sealed Store
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Envelope Format Service
//!
//! Codec between runtime [`EncryptionInstructions`] and the stored envelope
//! representations. Three generations of mapkey schema must be understood:
//!
//! | Schema | Keys |
//! |--------|------|
//! | V1 | `x-amz-key`, `x-amz-iv`, `x-amz-matdesc` |
//! | V2 | `x-amz-key-v2`, `x-amz-iv`, `x-amz-wrap-alg`, `x-amz-cek-alg`, `x-amz-tag-len`, `x-amz-matdesc` |
//! | V3 | `x-amz-c`, `x-amz-k`, `x-amz-w`, `x-amz-d`, `x-amz-i`, and `x-amz-m` or `x-amz-t` |
//!
//! In instruction-file mode the envelope rides in a `<key>.instruction`
//! sidecar object whose body is a JSON map of the same keys (V2), or is
//! split between object metadata (`x-amz-c`, `x-amz-d`, `x-amz-i`) and the
//! sidecar (`x-amz-k`, `x-amz-w`, `x-amz-m`/`x-amz-t`) for V3.
//!
//! The short V3 wrap codes and the canonical algorithm strings each have a
//! single source-of-truth table here; unknown codes are rejected, never
//! guessed. Values pass through unmodified - any HTTP-layer re-encoding of
//! metadata is outside this codec.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use zeroize::Zeroizing;

use sealed_store_domain::services::object_store::ObjectMetadata;
use sealed_store_domain::{AlgorithmSuite, ClientError, EncryptionInstructions, StringMap};

// Envelope metadata keys, V1/V2 generation.
pub const KEY_V1: &str = "x-amz-key";
pub const KEY_V2: &str = "x-amz-key-v2";
pub const IV: &str = "x-amz-iv";
pub const MATDESC: &str = "x-amz-matdesc";
pub const WRAP_ALG: &str = "x-amz-wrap-alg";
pub const CEK_ALG: &str = "x-amz-cek-alg";
pub const TAG_LEN: &str = "x-amz-tag-len";
pub const UNENCRYPTED_CONTENT_LENGTH: &str = "x-amz-unencrypted-content-length";

// Envelope metadata keys, V3 generation (compressed names).
pub const V3_CONTENT_CIPHER: &str = "x-amz-c";
pub const V3_ENCRYPTED_KEY: &str = "x-amz-k";
pub const V3_WRAP: &str = "x-amz-w";
pub const V3_COMMITMENT: &str = "x-amz-d";
pub const V3_MESSAGE_ID: &str = "x-amz-i";
pub const V3_MATDESC: &str = "x-amz-m";
pub const V3_CONTEXT: &str = "x-amz-t";

/// Suffix of the sidecar object in instruction-file mode.
pub const INSTRUCTION_FILE_SUFFIX: &str = ".instruction";

// Canonical wrap-algorithm strings.
pub const WRAP_KMS: &str = "kms";
pub const WRAP_KMS_CONTEXT: &str = "kms+context";
pub const WRAP_RSA_OAEP_SHA1: &str = "RSA-OAEP-SHA1";
pub const WRAP_AES_GCM: &str = "AES/GCM";

/// GCM tag length advertised in V2 envelopes, in bits.
pub const GCM_TAG_LEN_BITS: &str = "128";

/// Fixed content IV of the committing suite. The real nonce material is
/// the message id, folded in through HKDF; the GCM IV itself is constant.
pub const V3_CONTENT_IV: [u8; 12] = [0x01; 12];

/// Single source of truth for the V3 short wrap codes.
const SHORT_WRAP_CODES: &[(&str, &str)] = &[
    ("02", WRAP_AES_GCM),
    ("22", WRAP_RSA_OAEP_SHA1),
    ("23", WRAP_KMS_CONTEXT),
];

/// Translates a V3 short wrap code to its canonical string.
pub fn short_code_to_wrap(code: &str) -> Result<&'static str, ClientError> {
    SHORT_WRAP_CODES
        .iter()
        .find(|(short, _)| *short == code)
        .map(|(_, wrap)| *wrap)
        .ok_or_else(|| ClientError::unsupported_algorithm(format!("unknown wrap algorithm code {code:?}")))
}

/// Translates a canonical wrap string to its V3 short code.
pub fn wrap_to_short_code(wrap: &str) -> Result<&'static str, ClientError> {
    SHORT_WRAP_CODES
        .iter()
        .find(|(_, canonical)| *canonical == wrap)
        .map(|(short, _)| *short)
        .ok_or_else(|| ClientError::unsupported_algorithm(format!("wrap algorithm {wrap:?} has no compressed code")))
}

/// Packs the inner-wrap structure for non-KMS key wraps:
/// `[1 byte: keylen] ‖ [keylen bytes: CEK] ‖ [UTF-8: canonical CEK-alg]`.
pub fn pack_inner_wrap(cek: &[u8], cek_algorithm: &str) -> Result<Zeroizing<Vec<u8>>, ClientError> {
    let key_len = u8::try_from(cek.len())
        .map_err(|_| ClientError::invalid_data(format!("CEK of {} bytes cannot be inner-wrapped", cek.len())))?;
    let mut packed = Zeroizing::new(Vec::with_capacity(1 + cek.len() + cek_algorithm.len()));
    packed.push(key_len);
    packed.extend_from_slice(cek);
    packed.extend_from_slice(cek_algorithm.as_bytes());
    Ok(packed)
}

/// Parses an inner-wrap structure, verifying the embedded CEK algorithm
/// matches the suite being decrypted.
pub fn parse_inner_wrap(data: &[u8], expected_cek_algorithm: &str) -> Result<Zeroizing<Vec<u8>>, ClientError> {
    let (&key_len, rest) = data
        .split_first()
        .ok_or_else(|| ClientError::invalid_data("inner wrap is empty"))?;
    let key_len = key_len as usize;
    if rest.len() < key_len {
        return Err(ClientError::invalid_data(format!(
            "inner wrap declares a {}-byte key but carries {} bytes",
            key_len,
            rest.len()
        )));
    }
    let (cek, alg_bytes) = rest.split_at(key_len);
    let embedded_alg = std::str::from_utf8(alg_bytes)
        .map_err(|_| ClientError::invalid_data("inner wrap algorithm string is not UTF-8"))?;
    if embedded_alg != expected_cek_algorithm {
        return Err(ClientError::invalid_data(format!(
            "inner wrap algorithm {embedded_alg:?} does not match content algorithm {expected_cek_algorithm:?}"
        )));
    }
    Ok(Zeroizing::new(cek.to_vec()))
}

/// Which stored schema an object uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeSchema {
    V1,
    V2,
    V3Metadata,
    V3InstructionFile,
}

/// Classifies an object's metadata map against the known schemas, in
/// priority order. `None` means no envelope keys were found and an
/// instruction-file probe is the caller's next step.
pub fn classify_metadata(metadata: &ObjectMetadata) -> Option<EnvelopeSchema> {
    if metadata.contains_key(V3_CONTENT_CIPHER) {
        if metadata.contains_key(V3_ENCRYPTED_KEY) {
            return Some(EnvelopeSchema::V3Metadata);
        }
        return Some(EnvelopeSchema::V3InstructionFile);
    }
    if metadata.contains_key(KEY_V2) && metadata.contains_key(IV) {
        return Some(EnvelopeSchema::V2);
    }
    if metadata.contains_key(KEY_V1) && metadata.contains_key(IV) {
        return Some(EnvelopeSchema::V1);
    }
    None
}

/// An envelope recovered from stored metadata, before key unwrap.
#[derive(Debug)]
pub struct DecodedEnvelope {
    pub schema: EnvelopeSchema,
    pub suite: AlgorithmSuite,
    pub encrypted_key: Vec<u8>,
    pub iv: Vec<u8>,
    /// Canonical wrap string; absent on V1 envelopes, which predate the
    /// field (the material kind selects the unwrap path).
    pub wrap_algorithm: Option<String>,
    pub material_description: StringMap,
    pub encryption_context: StringMap,
    pub message_id: Option<Vec<u8>>,
    pub key_commitment: Option<Vec<u8>>,
}

fn required_field<'a>(metadata: &'a ObjectMetadata, key: &str) -> Result<&'a str, ClientError> {
    metadata
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ClientError::invalid_data(format!("envelope is missing {key}")))
}

fn b64_field(metadata: &ObjectMetadata, key: &str) -> Result<Vec<u8>, ClientError> {
    let value = required_field(metadata, key)?;
    BASE64
        .decode(value)
        .map_err(|e| ClientError::invalid_data(format!("{key} is not valid base64: {e}")))
}

fn json_map_field(metadata: &ObjectMetadata, key: &str) -> Result<StringMap, ClientError> {
    match metadata.get(key) {
        None => Ok(StringMap::new()),
        Some(raw) => serde_json::from_str(raw)
            .map_err(|e| ClientError::invalid_data(format!("{key} is not a valid JSON map: {e}"))),
    }
}

fn reject_zero(bytes: &[u8], what: &str) -> Result<(), ClientError> {
    if !bytes.is_empty() && bytes.iter().all(|&b| b == 0) {
        return Err(ClientError::invalid_data(format!("{what} is all zero")));
    }
    Ok(())
}

/// Decodes a V1 legacy envelope. The content suite is CBC and the wrap
/// algorithm is implied by the configured material.
pub fn decode_v1(metadata: &ObjectMetadata) -> Result<DecodedEnvelope, ClientError> {
    let suite = AlgorithmSuite::AES_256_CBC_IV16_NO_KDF;
    let iv = b64_field(metadata, IV)?;
    if iv.len() != suite.iv_len() {
        return Err(ClientError::invalid_data(format!(
            "V1 IV is {} bytes, expected {}",
            iv.len(),
            suite.iv_len()
        )));
    }
    reject_zero(&iv, "IV")?;
    Ok(DecodedEnvelope {
        schema: EnvelopeSchema::V1,
        suite,
        encrypted_key: b64_field(metadata, KEY_V1)?,
        iv,
        wrap_algorithm: None,
        material_description: json_map_field(metadata, MATDESC)?,
        encryption_context: StringMap::new(),
        message_id: None,
        key_commitment: None,
    })
}

/// Decodes a V2 envelope.
pub fn decode_v2(metadata: &ObjectMetadata) -> Result<DecodedEnvelope, ClientError> {
    let cek_alg = required_field(metadata, CEK_ALG)?;
    let suite = AlgorithmSuite::from_cek_algorithm(cek_alg)
        .ok_or_else(|| ClientError::unsupported_algorithm(format!("content algorithm {cek_alg:?}")))?;
    if suite.is_committing() {
        // The committing suite is a V3-only format.
        return Err(ClientError::invalid_data(
            "committing content algorithm inside a V2 envelope",
        ));
    }

    let wrap = required_field(metadata, WRAP_ALG)?;
    if ![WRAP_KMS, WRAP_KMS_CONTEXT, WRAP_RSA_OAEP_SHA1, WRAP_AES_GCM].contains(&wrap) {
        return Err(ClientError::unsupported_algorithm(format!("wrap algorithm {wrap:?}")));
    }

    if let Some(tag_len) = metadata.get(TAG_LEN) {
        if suite.is_authenticated() && tag_len != GCM_TAG_LEN_BITS {
            return Err(ClientError::invalid_data(format!(
                "tag length {tag_len:?} is not {GCM_TAG_LEN_BITS}"
            )));
        }
    }

    let iv = b64_field(metadata, IV)?;
    if iv.len() != suite.iv_len() {
        return Err(ClientError::invalid_data(format!(
            "IV is {} bytes, suite requires {}",
            iv.len(),
            suite.iv_len()
        )));
    }
    reject_zero(&iv, "IV")?;

    Ok(DecodedEnvelope {
        schema: EnvelopeSchema::V2,
        suite,
        encrypted_key: b64_field(metadata, KEY_V2)?,
        iv,
        wrap_algorithm: Some(wrap.to_string()),
        material_description: json_map_field(metadata, MATDESC)?,
        encryption_context: StringMap::new(),
        message_id: None,
        key_commitment: None,
    })
}

/// Decodes a V3 envelope from object metadata, merged with the sidecar map
/// in instruction-file mode.
pub fn decode_v3(
    object_metadata: &ObjectMetadata,
    sidecar: Option<&ObjectMetadata>,
    schema: EnvelopeSchema,
) -> Result<DecodedEnvelope, ClientError> {
    // x-amz-c, x-amz-d, x-amz-i always ride on the object itself; the
    // remaining fields come from the sidecar when one is in play.
    let wrap_source = sidecar.unwrap_or(object_metadata);

    let content_id = required_field(object_metadata, V3_CONTENT_CIPHER)?;
    let suite = AlgorithmSuite::from_cek_algorithm(content_id)
        .ok_or_else(|| ClientError::unsupported_algorithm(format!("content algorithm {content_id:?}")))?;
    if !suite.is_committing() {
        return Err(ClientError::unsupported_algorithm(format!(
            "content algorithm {content_id:?} inside a V3 envelope"
        )));
    }

    let message_id = b64_field(object_metadata, V3_MESSAGE_ID)?;
    if message_id.len() != suite.message_id_len() {
        return Err(ClientError::invalid_data(format!(
            "message id is {} bytes, suite requires {}",
            message_id.len(),
            suite.message_id_len()
        )));
    }
    reject_zero(&message_id, "message id")?;

    let key_commitment = b64_field(object_metadata, V3_COMMITMENT)?;

    let wrap_code = required_field(wrap_source, V3_WRAP)?;
    let wrap = short_code_to_wrap(wrap_code)?;

    Ok(DecodedEnvelope {
        schema,
        suite,
        encrypted_key: b64_field(wrap_source, V3_ENCRYPTED_KEY)?,
        iv: V3_CONTENT_IV.to_vec(),
        wrap_algorithm: Some(wrap.to_string()),
        material_description: json_map_field(wrap_source, V3_MATDESC)?,
        encryption_context: json_map_field(wrap_source, V3_CONTEXT)?,
        message_id: Some(message_id),
        key_commitment: Some(key_commitment),
    })
}

fn json_map(map: &StringMap) -> Result<String, ClientError> {
    Ok(serde_json::to_string(map)?)
}

/// Serializes a V2 envelope into metadata mapkeys.
pub fn encode_v2(instructions: &EncryptionInstructions) -> Result<ObjectMetadata, ClientError> {
    let suite = instructions.algorithm_suite();
    let mut metadata = ObjectMetadata::new();
    metadata.insert(KEY_V2.into(), BASE64.encode(instructions.encrypted_envelope_key()));
    metadata.insert(IV.into(), BASE64.encode(instructions.iv()));
    metadata.insert(WRAP_ALG.into(), instructions.wrap_algorithm().to_string());
    metadata.insert(CEK_ALG.into(), suite.cek_algorithm().to_string());
    if suite.is_authenticated() {
        metadata.insert(TAG_LEN.into(), GCM_TAG_LEN_BITS.to_string());
    }
    metadata.insert(MATDESC.into(), json_map(instructions.material_description())?);
    Ok(metadata)
}

/// Serializes a V3 envelope entirely into metadata mapkeys.
pub fn encode_v3(instructions: &EncryptionInstructions) -> Result<ObjectMetadata, ClientError> {
    let mut metadata = encode_v3_object_keys(instructions)?;
    metadata.append(&mut encode_v3_wrap_keys(instructions)?);
    Ok(metadata)
}

/// The V3 keys that always ride on the object: content cipher id, key
/// commitment, and message id.
pub fn encode_v3_object_keys(instructions: &EncryptionInstructions) -> Result<ObjectMetadata, ClientError> {
    let suite = instructions.algorithm_suite();
    let commitment = instructions
        .key_commitment()
        .ok_or_else(|| ClientError::internal_error("V3 envelope serialized before commitment derivation"))?;
    let message_id = instructions
        .message_id()
        .ok_or_else(|| ClientError::internal_error("V3 envelope has no message id"))?;
    let mut metadata = ObjectMetadata::new();
    metadata.insert(V3_CONTENT_CIPHER.into(), suite.cek_algorithm().to_string());
    metadata.insert(V3_COMMITMENT.into(), BASE64.encode(commitment));
    metadata.insert(V3_MESSAGE_ID.into(), BASE64.encode(message_id));
    Ok(metadata)
}

/// The V3 keys that move to the sidecar in instruction-file mode: wrapped
/// key, wrap code, and the description or context map.
pub fn encode_v3_wrap_keys(instructions: &EncryptionInstructions) -> Result<ObjectMetadata, ClientError> {
    let mut metadata = ObjectMetadata::new();
    metadata.insert(V3_ENCRYPTED_KEY.into(), BASE64.encode(instructions.encrypted_envelope_key()));
    metadata.insert(V3_WRAP.into(), wrap_to_short_code(instructions.wrap_algorithm())?.to_string());
    if !instructions.encryption_context().is_empty() || instructions.wrap_algorithm() == WRAP_KMS_CONTEXT {
        metadata.insert(V3_CONTEXT.into(), json_map(instructions.encryption_context())?);
    } else {
        metadata.insert(V3_MATDESC.into(), json_map(instructions.material_description())?);
    }
    Ok(metadata)
}

/// Renders an envelope map as the sole JSON content of an instruction-file
/// sidecar.
pub fn sidecar_body(envelope: &ObjectMetadata) -> Result<Vec<u8>, ClientError> {
    Ok(serde_json::to_vec(envelope)?)
}

/// Parses a sidecar body back into an envelope map.
pub fn parse_sidecar_body(body: &[u8]) -> Result<ObjectMetadata, ClientError> {
    serde_json::from_slice(body)
        .map_err(|e| ClientError::invalid_data(format!("instruction file is not a JSON map: {e}")))
}

/// The sidecar object key for a given object key.
pub fn instruction_file_key(object_key: &str) -> String {
    format!("{object_key}{INSTRUCTION_FILE_SUFFIX}")
}
