//! Keyed hashing
//!
//! HMAC over the UTF-8 value, written as lower-case hex. In length-preserving
//! mode the digest is folded into a digits-only string as long as the input.
//! FHIR `reference` values only hash their id part so that references stay
//! resolvable inside an anonymized bundle.

use hmac::{Hmac, Mac};
use regex::Regex;
use sha2::{Sha256, Sha384, Sha512};
use std::sync::OnceLock;
use zeroize::Zeroizing;

use super::Outcome;
use crate::anonymization::config::HashAlgorithm;
use crate::anonymization::context::OperationKind;
use crate::domain::{NodeId, RecordFormat, RecordTree, Result, Scalar, VeilError};

/// Resolved crypto-hash settings
#[derive(Clone)]
pub struct CryptoHashSettings {
    pub key: Zeroizing<String>,
    pub algorithm: HashAlgorithm,
    /// Replace with digits only, keeping the input length
    pub match_input_length: bool,
}

impl std::fmt::Debug for CryptoHashSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoHashSettings")
            .field("key", &"[REDACTED]")
            .field("algorithm", &self.algorithm)
            .field("match_input_length", &self.match_input_length)
            .finish()
    }
}

fn literal_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(.*?)([A-Z][A-Za-z]+/)([A-Za-z0-9\-\.]{1,64})(/_history/[A-Za-z0-9\-\.]{1,64})?$",
        )
        .expect("static reference pattern")
    })
}

/// Raw HMAC digest
pub fn digest(key: &[u8], algorithm: HashAlgorithm, input: &[u8]) -> Result<Vec<u8>> {
    fn run<M: Mac + hmac::digest::KeyInit>(key: &[u8], input: &[u8]) -> Result<Vec<u8>> {
        let mut mac = <M as hmac::digest::KeyInit>::new_from_slice(key)
            .map_err(|e| VeilError::invalid_settings(format!("invalid HMAC key: {e}")))?;
        mac.update(input);
        Ok(mac.finalize().into_bytes().to_vec())
    }

    match algorithm {
        HashAlgorithm::Sha256 => run::<Hmac<Sha256>>(key, input),
        HashAlgorithm::Sha384 => run::<Hmac<Sha384>>(key, input),
        HashAlgorithm::Sha512 => run::<Hmac<Sha512>>(key, input),
    }
}

/// Hex HMAC of `input`
pub fn hash_hex(settings: &CryptoHashSettings, input: &str) -> Result<String> {
    Ok(hex::encode(digest(
        settings.key.as_bytes(),
        settings.algorithm,
        input.as_bytes(),
    )?))
}

/// Digits-only replacement exactly as long as `input`
///
/// The first four digest bytes, read little-endian and divided by
/// `u32::MAX`, pick a number in `[10^(n-1), 10^n - 1]` (`[0, 9]` for one
/// character). Inputs longer than eighteen characters continue with digits
/// taken from the remaining digest bytes.
pub fn hash_digits(settings: &CryptoHashSettings, input: &str) -> Result<String> {
    let length = input.chars().count();
    if length == 0 {
        return Ok(String::new());
    }

    let bytes = digest(settings.key.as_bytes(), settings.algorithm, input.as_bytes())?;
    let fraction = f64::from(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
        / f64::from(u32::MAX);

    let head = length.min(18);
    let low: u64 = if head == 1 { 0 } else { 10u64.pow(head as u32 - 1) };
    let high: u64 = 10u64.pow(head as u32) - 1;
    let span = high - low;
    let picked = low + ((fraction * span as f64).floor() as u64).min(span);

    let mut out = format!("{picked:0head$}");
    out.extend(
        bytes
            .iter()
            .cycle()
            .skip(4)
            .take(length - head)
            .map(|b| char::from(b'0' + b % 10)),
    );
    Ok(out)
}

fn hash_value(settings: &CryptoHashSettings, input: &str) -> Result<String> {
    if settings.match_input_length {
        hash_digits(settings, input)
    } else {
        hash_hex(settings, input)
    }
}

/// Hashes only the id part of a FHIR reference
pub fn hash_reference(settings: &CryptoHashSettings, reference: &str) -> Result<String> {
    if let Some(local) = reference.strip_prefix('#') {
        return Ok(format!("#{}", hash_value(settings, local)?));
    }
    for prefix in ["urn:uuid:", "urn:oid:"] {
        if let Some(id) = reference.strip_prefix(prefix) {
            return Ok(format!("{prefix}{}", hash_value(settings, id)?));
        }
    }
    if let Some(captures) = literal_reference().captures(reference) {
        let history = captures.get(4).map_or("", |m| m.as_str());
        return Ok(format!(
            "{}{}{}{}",
            &captures[1],
            &captures[2],
            hash_value(settings, &captures[3])?,
            history
        ));
    }
    hash_value(settings, reference)
}

/// Hashes one node's value
pub fn hash(tree: &mut RecordTree, node: NodeId, settings: &CryptoHashSettings) -> Result<Outcome> {
    let Some(value) = tree.value(node) else {
        return Ok(Outcome::unchanged());
    };
    let text = value.to_text();
    let was_integer = matches!(value, Scalar::Integer(_));

    let is_reference = tree.format() == RecordFormat::Fhir && tree.node(node).name == "reference";
    let hashed = if is_reference {
        hash_reference(settings, &text)?
    } else {
        hash_value(settings, &text)?
    };

    let replacement = match (was_integer && settings.match_input_length, hashed.parse::<i64>()) {
        (true, Ok(number)) => Scalar::Integer(number),
        _ => Scalar::String(hashed),
    };
    tree.set_value(node, Some(replacement));
    Ok(Outcome::changed(OperationKind::CryptoHashed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Node;
    use test_case::test_case;

    fn settings(key: &str, match_input_length: bool) -> CryptoHashSettings {
        CryptoHashSettings {
            key: Zeroizing::new(key.to_string()),
            algorithm: HashAlgorithm::Sha256,
            match_input_length,
        }
    }

    #[test]
    fn test_known_hmac_vector() {
        // RFC 4231 test case 2
        let out = digest(
            b"Jefe",
            HashAlgorithm::Sha256,
            b"what do ya want for nothing?",
        )
        .unwrap();
        assert_eq!(
            hex::encode(out),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hash_is_deterministic_and_key_sensitive() {
        let a = hash_hex(&settings("key-a", false), "123").unwrap();
        assert_eq!(a, hash_hex(&settings("key-a", false), "123").unwrap());
        assert_ne!(a, hash_hex(&settings("key-b", false), "123").unwrap());
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test_case(HashAlgorithm::Sha384, 96 ; "sha384")]
    #[test_case(HashAlgorithm::Sha512, 128 ; "sha512")]
    fn test_algorithm_lengths(algorithm: HashAlgorithm, hex_len: usize) {
        let s = CryptoHashSettings {
            algorithm,
            ..settings("k", false)
        };
        assert_eq!(hash_hex(&s, "value").unwrap().len(), hex_len);
    }

    #[test_case("7" ; "one")]
    #[test_case("12345" ; "five")]
    #[test_case("ABC-123-XYZ" ; "mixed")]
    #[test_case("123456789012345678901234" ; "longer than eighteen")]
    fn test_length_preserving_digits(input: &str) {
        let out = hash_digits(&settings("k", true), input).unwrap();
        assert_eq!(out.chars().count(), input.chars().count());
        assert!(out.chars().all(|c| c.is_ascii_digit()));
        if input.len() > 1 {
            assert!(!out.starts_with('0'));
        }
    }

    #[test]
    fn test_empty_input_in_length_preserving_mode() {
        assert_eq!(hash_digits(&settings("k", true), "").unwrap(), "");
    }

    #[test]
    fn test_reference_forms() {
        let s = settings("k", false);
        let id = hash_hex(&s, "123").unwrap();

        assert_eq!(hash_reference(&s, "Patient/123").unwrap(), format!("Patient/{id}"));
        assert_eq!(
            hash_reference(&s, "http://example.org/fhir/Patient/123/_history/2").unwrap(),
            format!("http://example.org/fhir/Patient/{id}/_history/2")
        );
        assert_eq!(hash_reference(&s, "#123").unwrap(), format!("#{id}"));
        assert_eq!(hash_reference(&s, "urn:uuid:123").unwrap(), format!("urn:uuid:{id}"));
    }

    #[test]
    fn test_reference_node_only_hashes_id() {
        let mut tree = RecordTree::new(RecordFormat::Fhir, Node::new("Observation", "Observation"));
        let root = tree.root();
        let subject = tree.add_child(root, Node::new("subject", "Reference"));
        let reference = tree.add_child(
            subject,
            Node::leaf("reference", "string", Scalar::from("Patient/example")),
        );

        let outcome = hash(&mut tree, reference, &settings("k", false)).unwrap();
        assert_eq!(outcome.kind, Some(OperationKind::CryptoHashed));
        let text = tree.value(reference).unwrap().to_text();
        assert!(text.starts_with("Patient/"));
        assert_eq!(text.len(), "Patient/".len() + 64);
    }

    #[test]
    fn test_integer_stays_integer_when_length_preserving() {
        let mut tree = RecordTree::new(RecordFormat::Fhir, Node::new("Patient", "Patient"));
        let root = tree.root();
        let id = tree.add_child(root, Node::leaf("count", "integer", Scalar::Integer(4711)));
        hash(&mut tree, id, &settings("k", true)).unwrap();
        match tree.value(id) {
            Some(Scalar::Integer(n)) => assert!((1000..=9999).contains(n)),
            other => panic!("expected integer, got {other:?}"),
        }
    }
}
