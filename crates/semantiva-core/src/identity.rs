// crates/semantiva-core/src/identity.rs
// ============================================================================
// Module: Identity Kit
// Description: Canonical hashing and deterministic identity derivation.
// Purpose: Provide the single canonicalizer and ID constructors reused by
//          every component that needs a stable, content-addressed identity.
// Dependencies: serde, serde_jcs, serde_json, sha2, uuid
// ============================================================================

//! ## Overview
//! Every identity in this crate (`PipelineId`, `node_uuid`, run-space spec and
//! launch identities) is derived from the same canonicalization routine. This
//! module is the only place canonical bytes are produced, so that identity
//! determinism (whitespace/key-order invariance) holds crate-wide.
//!
//! Invariants:
//! - `canonicalize` never fails for well-formed `Serialize` inputs (these are
//!   constructed internally, not from untrusted bytes) except when the value
//!   contains a non-finite float or a non-UTF-8 map key, which RFC 8785
//!   canonicalization cannot represent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use uuid::Uuid;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised while canonicalizing a value for identity derivation.
#[derive(Debug, thiserror::Error)]
pub enum CanonicalizationError {
    /// The value could not be serialized into canonical JSON form.
    #[error("value is not canonicalizable: {0}")]
    NotSerializable(String),
}

// ============================================================================
// SECTION: Canonicalization
// ============================================================================

/// Recursively sorts object keys, preserves array order, and normalizes
/// scalars into RFC 8785 canonical JSON bytes.
///
/// # Errors
///
/// Returns [`CanonicalizationError`] when `value` contains data that cannot
/// be represented in canonical JSON (for example a non-finite float).
pub fn canonicalize<T>(value: &T) -> Result<Vec<u8>, CanonicalizationError>
where
    T: Serialize + ?Sized,
{
    serde_jcs::to_vec(value).map_err(|err| CanonicalizationError::NotSerializable(err.to_string()))
}

/// Lowercase hex alphabet used for digest rendering.
const HEX: &[u8; 16] = b"0123456789abcdef";

/// Encodes a byte slice as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

/// Computes the lowercase hex SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

/// Computes the lowercase hex SHA-256 digest of the canonical encoding of `value`.
///
/// # Errors
///
/// Returns [`CanonicalizationError`] when `value` cannot be canonicalized.
pub fn sha256_canonical<T>(value: &T) -> Result<String, CanonicalizationError>
where
    T: Serialize + ?Sized,
{
    Ok(sha256_hex(&canonicalize(value)?))
}

// ============================================================================
// SECTION: Pipeline & Node Identities
// ============================================================================

/// Prefix applied to every `PipelineId`.
const PIPELINE_ID_PREFIX: &str = "plid-";

/// Prefix applied to every `run_space_spec_id`.
const RUN_SPACE_SPEC_ID_PREFIX: &str = "rsid-";

/// Domain separator mixed into the run-space spec id hash.
const RUN_SPACE_SPEC_DOMAIN: &str = "semantiva:rscf1:";

/// Fixed UUIDv5 namespace used for all `node_uuid` derivations.
///
/// This is a crate-local constant, not a value drawn from the node's own
/// fields; changing it would silently change every `node_uuid` in existence.
const NODE_UUID_NAMESPACE: Uuid = Uuid::from_bytes([
    0xb3, 0xb4, 0xa6, 0xc0, 0x6e, 0x9f, 0x5b, 0x7e, 0x9b, 0x1b, 0x73, 0xa2, 0xc6, 0xd6, 0xf9, 0xa1,
]);

/// Computes `PipelineId = "plid-" + sha256(canonicalize(graph_public_fields))`.
///
/// # Errors
///
/// Returns [`CanonicalizationError`] when `graph_public_fields` cannot be
/// canonicalized.
pub fn pipeline_id<T>(graph_public_fields: &T) -> Result<String, CanonicalizationError>
where
    T: Serialize + ?Sized,
{
    Ok(format!("{PIPELINE_ID_PREFIX}{}", sha256_canonical(graph_public_fields)?))
}

/// Computes a deterministic `node_uuid` as `UUIDv5(namespace, canonical_fields)`.
///
/// `canonical_node_fields` MUST contain exactly `{role, processor_ref, params,
/// ports}` — preprocessor-derived fields must never be included, or the
/// identity-stability invariant (`node_uuid` independent of `derive` blocks)
/// is violated.
///
/// # Errors
///
/// Returns [`CanonicalizationError`] when `canonical_node_fields` cannot be
/// canonicalized.
pub fn node_uuid<T>(canonical_node_fields: &T) -> Result<Uuid, CanonicalizationError>
where
    T: Serialize + ?Sized,
{
    let bytes = canonicalize(canonical_node_fields)?;
    Ok(Uuid::new_v5(&NODE_UUID_NAMESPACE, &bytes))
}

/// Computes `run_space_spec_id = "rsid-" + sha256(domain || canonicalize(spec))`.
///
/// # Errors
///
/// Returns [`CanonicalizationError`] when `spec` cannot be canonicalized.
pub fn run_space_spec_id<T>(spec: &T) -> Result<String, CanonicalizationError>
where
    T: Serialize + ?Sized,
{
    let mut material = RUN_SPACE_SPEC_DOMAIN.as_bytes().to_vec();
    material.extend_from_slice(&canonicalize(spec)?);
    Ok(format!("{RUN_SPACE_SPEC_ID_PREFIX}{}", sha256_hex(&material)))
}

/// Generates a unique `run_id`, monotonic-looking with a high-entropy suffix.
///
/// The core never reads wall-clock time to compute identities; entropy comes
/// from a UUIDv4-equivalent random source via [`Uuid::new_v4`].
#[must_use]
pub fn run_id() -> String {
    format!("run-{}", Uuid::new_v4().simple())
}

/// Generates a unique `run_space_launch_id` (UUIDv7: time-ordered + random).
#[must_use]
pub fn run_space_launch_id() -> String {
    format!("rsl-{}", Uuid::now_v7().simple())
}
