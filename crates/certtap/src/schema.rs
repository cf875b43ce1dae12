//! ACME state schema detection and normalization.
//!
//! The proxy's state file has shipped in several incompatible layouts over
//! its lifetime. This module sniffs which layout a document uses by
//! structure, never by probing field accesses and catching the fallout,
//! and maps each layout to a uniform stream of [`CertificateRecord`]s.
//!
//! Observed layouts:
//!
//! - **V1**: certificates under a top-level `DomainsCertificate.Certs`
//!   container, each entry either nesting its material under a
//!   `Certificate` object or (older still) carrying it at entry level.
//! - **V2**: a top-level `Certificates` array, recognized by the account
//!   registration URI pointing at a v2 ACME endpoint.
//! - **V2 challenge-wrapped**: one or more V2-shaped sections keyed by
//!   challenge/resolver name, with lowercased field names.

use serde_json::Value;
use tracing::{debug, info};

use crate::errors::{ExtractError, RecordError};

/// Marker distinguishing a v2 ACME registration URI from a v1 one.
const ACME_V2_MARKER: &str = "acme-v02";

/// Which field layout a state document uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Legacy layout with a `DomainsCertificate` container.
    V1,
    /// Layout written by proxies registered against a v2 ACME endpoint.
    V2,
    /// V2 layout nested under a named challenge section.
    V2Challenge { challenge: String },
}

/// Normalized view of one certificate entry, still base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateRecord {
    /// The certificate's primary domain name.
    pub primary_name: String,
    /// Alternate names covered by the same certificate, in document order.
    pub alternate_names: Vec<String>,
    /// Base64 private key material.
    pub encoded_key: String,
    /// Base64 certificate bundle (leaf concatenated with its chain).
    pub encoded_bundle: String,
}

/// Outcome of normalizing one entry: a record, or a record-scoped error
/// the caller logs before moving on.
pub type RecordOutcome = Result<CertificateRecord, RecordError>;

/// Field paths one layout uses for the four required pieces of a record.
struct FieldMap {
    primary: &'static [&'static str],
    sans: &'static [&'static str],
    key: &'static [&'static str],
    bundle: &'static [&'static str],
}

const V2_FIELDS: FieldMap = FieldMap {
    primary: &["Domain", "Main"],
    sans: &["Domain", "SANs"],
    key: &["Key"],
    bundle: &["Certificate"],
};

const V2_CHALLENGE_FIELDS: FieldMap = FieldMap {
    primary: &["domain", "main"],
    sans: &["domain", "sans"],
    key: &["key"],
    bundle: &["certificate"],
};

/// Detect which layout a state document uses.
///
/// Detection order matters: the v2 registration marker wins, then the
/// legacy container, then the challenge-keyed wrapper around either. A
/// wrapper with exactly one section selects it automatically; more than
/// one requires `declared_challenge`.
pub fn sniff_version(
    doc: &Value,
    declared_challenge: Option<&str>,
) -> Result<SchemaVersion, ExtractError> {
    let Some(obj) = doc.as_object() else {
        return Err(ExtractError::UnrecognizedSchema(
            "top level is not an object".to_string(),
        ));
    };

    if registration_uri(doc).is_some_and(|uri| uri.contains(ACME_V2_MARKER)) {
        return Ok(SchemaVersion::V2);
    }
    if obj.contains_key("DomainsCertificate") {
        return Ok(SchemaVersion::V1);
    }

    // Multi-challenge wrapper: every top-level value is itself a state
    // section, keyed by the challenge/resolver name.
    let sections: Vec<&String> = obj
        .iter()
        .filter(|(_, value)| looks_like_section(value))
        .map(|(key, _)| key)
        .collect();

    if !sections.is_empty() && sections.len() == obj.len() {
        if let Some(declared) = declared_challenge {
            if sections.iter().any(|key| *key == declared) {
                debug!(challenge = %declared, "using declared challenge section");
                return Ok(SchemaVersion::V2Challenge {
                    challenge: declared.to_string(),
                });
            }
            return Err(ExtractError::UnrecognizedSchema(format!(
                "challenge section {declared:?} not present (available: {})",
                sections
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }
        if sections.len() == 1 {
            info!(challenge = %sections[0], "auto-selected the only challenge section");
            return Ok(SchemaVersion::V2Challenge {
                challenge: sections[0].clone(),
            });
        }
        return Err(ExtractError::AmbiguousChallenge {
            available: sections.into_iter().cloned().collect(),
        });
    }

    Err(ExtractError::UnrecognizedSchema(
        "no certificate collection found".to_string(),
    ))
}

/// Extract a uniform record list from a state document.
///
/// Malformed entries surface as `Err` outcomes in place of their record so
/// one bad certificate never hides the rest of the document.
pub fn normalize(
    doc: &Value,
    declared_challenge: Option<&str>,
) -> Result<Vec<RecordOutcome>, ExtractError> {
    let version = sniff_version(doc, declared_challenge)?;
    debug!(version = ?version, "detected state schema");

    match version {
        SchemaVersion::V1 => {
            let certs = record_array(doc.pointer("/DomainsCertificate/Certs"), "DomainsCertificate.Certs")?;
            Ok(certs
                .iter()
                .enumerate()
                .map(|(index, entry)| v1_record(index, entry))
                .collect())
        }
        SchemaVersion::V2 => {
            let certs = record_array(doc.get("Certificates"), "Certificates")?;
            Ok(certs
                .iter()
                .enumerate()
                .map(|(index, entry)| mapped_record(index, entry, &V2_FIELDS))
                .collect())
        }
        SchemaVersion::V2Challenge { challenge } => {
            let certs = record_array(
                doc.get(&challenge).and_then(|section| section.get("Certificates")),
                "Certificates",
            )?;
            Ok(certs
                .iter()
                .enumerate()
                .map(|(index, entry)| mapped_record(index, entry, &V2_CHALLENGE_FIELDS))
                .collect())
        }
    }
}

/// The certificate collection, tolerating `null`/absent as "no
/// certificates yet" (a freshly initialized state file looks like that).
fn record_array<'a>(
    value: Option<&'a Value>,
    what: &str,
) -> Result<&'a [Value], ExtractError> {
    match value {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err(ExtractError::UnrecognizedSchema(format!(
            "{what} is not an array"
        ))),
    }
}

fn registration_uri(doc: &Value) -> Option<&str> {
    doc.get("Account")?.get("Registration")?.get("uri")?.as_str()
}

fn looks_like_section(value: &Value) -> bool {
    value.as_object().is_some_and(|section| {
        section.contains_key("Certificates")
            || section.contains_key("Account")
            || section.contains_key("DomainsCertificate")
    })
}

/// Map a V1 entry.
///
/// Nested and legacy-flat V1 entries are distinguished by the type of the
/// entry's `Certificate` field: an object nests the material, a string is
/// the bundle itself.
fn v1_record(index: usize, entry: &Value) -> RecordOutcome {
    let alternate_names = optional_string_list(index, entry, &["Domains", "SANs"])?;

    let (primary_name, encoded_key, encoded_bundle) = match entry.get("Certificate") {
        Some(Value::Object(_)) => (
            required_str(index, entry, &["Certificate", "Domain"])?,
            required_str(index, entry, &["Certificate", "PrivateKey"])?,
            required_str(index, entry, &["Certificate", "Certificate"])?,
        ),
        _ => (
            required_str(index, entry, &["Domains", "Main"])?,
            required_str(index, entry, &["PrivateKey"])?,
            required_str(index, entry, &["Certificate"])?,
        ),
    };

    Ok(CertificateRecord {
        primary_name,
        alternate_names,
        encoded_key,
        encoded_bundle,
    })
}

/// Map a V2-shaped entry through the layout's field paths.
fn mapped_record(index: usize, entry: &Value, fields: &FieldMap) -> RecordOutcome {
    Ok(CertificateRecord {
        primary_name: required_str(index, entry, fields.primary)?,
        alternate_names: optional_string_list(index, entry, fields.sans)?,
        encoded_key: required_str(index, entry, fields.key)?,
        encoded_bundle: required_str(index, entry, fields.bundle)?,
    })
}

fn lookup<'a>(entry: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(entry, |value, key| value.get(key))
}

fn required_str(
    index: usize,
    entry: &Value,
    path: &[&'static str],
) -> Result<String, RecordError> {
    lookup(entry, path)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| RecordError::MissingField {
            index,
            field: path.join("."),
        })
}

/// Absent or `null` means an empty list; anything other than an array of
/// strings is a malformed record.
fn optional_string_list(
    index: usize,
    entry: &Value,
    path: &[&'static str],
) -> Result<Vec<String>, RecordError> {
    match lookup(entry, path) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or_else(|| RecordError::MissingField {
                        index,
                        field: path.join("."),
                    })
            })
            .collect(),
        Some(_) => Err(RecordError::MissingField {
            index,
            field: path.join("."),
        }),
    }
}
