//! Individual configuration checks.
//!
//! Every check returns result values; none of them fail with an error. The
//! caller attaches whatever [`FixTarget`] it knows when a check cannot.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use std::path::Path;

use super::result::{DocumentFormat, FixAction, FixTarget, Ownership, Severity, ValidationResult};
use crate::config::defaults::{ENCRYPTION_CIPHER, MIN_KEY_BYTES, MIN_SECRET_KEY_LEN};
use crate::store::{document, is_blank_value, permissions, EnvFile};

/// Fields every encryption-key entry must carry.
pub const ENCRYPTION_KEY_FIELDS: [&str; 4] = ["id", "key", "cipher", "revoked"];

/// Standard-alphabet base64 with canonical padding, decoding to at least
/// `min_bytes` bytes.
pub fn validate_base64(value: &str, field: &str, min_bytes: usize) -> ValidationResult {
    let check = format!("base64:{field}");
    if value.trim().is_empty() {
        return ValidationResult::fixable(
            &check,
            format!("{field} is empty"),
            FixAction::GenerateBase64Key,
        );
    }
    match STANDARD.decode(value.trim()) {
        Ok(bytes) if bytes.len() >= min_bytes => {
            ValidationResult::pass(&check, format!("{field} is valid base64 ({} bytes)", bytes.len()))
        }
        Ok(bytes) => ValidationResult::fixable(
            &check,
            format!(
                "{field} decodes to {} bytes, minimum is {min_bytes}",
                bytes.len()
            ),
            FixAction::GenerateBase64Key,
        ),
        Err(e) => ValidationResult::fixable(
            &check,
            format!("{field} is not valid base64: {e}"),
            FixAction::GenerateBase64Key,
        ),
    }
}

/// Parse `payload` and require the given top-level keys.
pub fn validate_structure(
    payload: &str,
    format: DocumentFormat,
    required_keys: &[String],
    label: &str,
) -> ValidationResult {
    let check = format!("structure:{label}");
    let value = match document::parse(payload, format) {
        Ok(v) => v,
        Err(e) => {
            return ValidationResult::fixable(
                &check,
                format!("{label} does not parse: {e}"),
                FixAction::FixJsonStructure,
            )
        }
    };
    let missing = document::missing_keys(&value, required_keys);
    if missing.is_empty() {
        ValidationResult::pass(&check, format!("{label} has all required keys"))
    } else {
        ValidationResult::fixable(
            &check,
            format!("{label} is missing required keys: {}", missing.join(", ")),
            FixAction::FixJsonStructure,
        )
    }
}

/// The JSON encryption-key list held in env variable `var` of `path`.
pub fn validate_encryption_keys(raw: &str, path: &Path, var: &str) -> Vec<ValidationResult> {
    let check = format!("encryption_keys:{var}");
    let field_target = FixTarget::EnvField {
        path: path.to_path_buf(),
        key: var.to_string(),
    };
    let regenerate_all = |message: String| {
        vec![ValidationResult::fixable(&check, message, FixAction::GenerateEncryptionKeys)
            .with_target(field_target.clone())]
    };

    let entries = match serde_json::from_str::<Value>(raw) {
        Ok(Value::Array(entries)) if !entries.is_empty() => entries,
        Ok(Value::Array(_)) => return regenerate_all(format!("{var} is an empty list")),
        Ok(_) => return regenerate_all(format!("{var} is not a JSON list")),
        Err(e) => return regenerate_all(format!("{var} is not valid JSON: {e}")),
    };

    let mut results = Vec::new();
    for (index, entry) in entries.iter().enumerate() {
        let entry_target = FixTarget::EncryptionKey {
            path: path.to_path_buf(),
            key: var.to_string(),
            index,
        };
        let missing: Vec<&str> = match entry.as_object() {
            Some(map) => ENCRYPTION_KEY_FIELDS
                .into_iter()
                .filter(|f| !map.contains_key(*f))
                .collect(),
            None => ENCRYPTION_KEY_FIELDS.to_vec(),
        };
        if !missing.is_empty() {
            results.push(
                ValidationResult::fixable(
                    &check,
                    format!("{var}[{index}] is missing fields: {}", missing.join(", ")),
                    FixAction::FixEncryptionKeyStructure,
                )
                .with_target(entry_target),
            );
            continue;
        }

        let key = entry["key"].as_str().unwrap_or_default();
        let key_result = validate_base64(key, &format!("{var}[{index}].key"), MIN_KEY_BYTES);
        if !key_result.passed {
            results.push(
                ValidationResult::fixable(
                    &check,
                    key_result.message,
                    FixAction::RegenerateEncryptionKey,
                )
                .with_target(entry_target),
            );
        }

        let cipher = entry["cipher"].as_str().unwrap_or_default();
        if cipher != ENCRYPTION_CIPHER {
            results.push(
                ValidationResult::fail(
                    &check,
                    format!("{var}[{index}] uses cipher '{cipher}', expected {ENCRYPTION_CIPHER}"),
                )
                .with_severity(Severity::Warning),
            );
        }
    }

    if results.is_empty() {
        results.push(ValidationResult::pass(
            &check,
            format!("{var} holds {} valid key(s)", entries.len()),
        ));
    }
    results
}

/// Required variables: missing ones first, then present-but-blank ones.
pub fn validate_presence(env: &EnvFile, required: &[String], path: &Path) -> Vec<ValidationResult> {
    let missing: Vec<String> = required
        .iter()
        .filter(|k| !env.contains(k))
        .cloned()
        .collect();
    let blank: Vec<String> = required
        .iter()
        .filter(|k| env.get(k).is_some_and(is_blank_value))
        .cloned()
        .collect();

    let mut results = Vec::new();
    if !missing.is_empty() {
        results.push(
            ValidationResult::fixable(
                "required_vars",
                format!("{} is missing variables: {}", path.display(), missing.join(", ")),
                FixAction::AddMissingEnvVars,
            )
            .with_target(FixTarget::EnvVars {
                path: path.to_path_buf(),
                keys: missing,
            }),
        );
    }
    if !blank.is_empty() {
        results.push(
            ValidationResult::fixable(
                "required_vars",
                format!("{} has empty variables: {}", path.display(), blank.join(", ")),
                FixAction::PopulateEmptyEnvVars,
            )
            .with_target(FixTarget::EnvVars {
                path: path.to_path_buf(),
                keys: blank,
            }),
        );
    }
    if results.is_empty() {
        results.push(ValidationResult::pass(
            "required_vars",
            format!("{} defines all {} required variables", path.display(), required.len()),
        ));
    }
    results
}

/// Existence, owner and permission bits.
pub fn validate_permissions(path: &Path, expected: Ownership) -> ValidationResult {
    if !path.exists() {
        return ValidationResult::fixable(
            "permissions",
            format!("{} does not exist", path.display()),
            FixAction::CreateFromTemplate,
        )
        .with_target(FixTarget::File {
            path: path.to_path_buf(),
        });
    }
    match permissions::inspect(path) {
        Ok(actual) if actual == expected => ValidationResult::pass(
            "permissions",
            format!("{} is {actual}", path.display()),
        ),
        Ok(actual) => ValidationResult::fixable(
            "permissions",
            format!("{} is {actual}, expected {expected}", path.display()),
            FixAction::FixPermissions,
        )
        .with_target(FixTarget::Permissions {
            path: path.to_path_buf(),
            expected,
        }),
        Err(e) => ValidationResult::fail(
            "permissions",
            format!("cannot stat {}: {e}", path.display()),
        ),
    }
}

/// Lines that are not blank, comments or well-formed `KEY=VALUE`.
pub fn validate_env_syntax(env: &EnvFile, path: &Path) -> ValidationResult {
    let malformed = env.malformed();
    if malformed.is_empty() {
        return ValidationResult::pass("env_syntax", format!("{} parses cleanly", path.display()));
    }
    let lines: Vec<String> = malformed.iter().map(|(n, _)| n.to_string()).collect();
    ValidationResult::fixable(
        "env_syntax",
        format!(
            "{} has malformed lines: {}",
            path.display(),
            lines.join(", ")
        ),
        FixAction::RepairConfigSyntax,
    )
    .with_target(FixTarget::File {
        path: path.to_path_buf(),
    })
}

/// Framework secret key strength. Short keys are a warning.
pub fn validate_secret_key(value: &str, path: &Path, var: &str) -> ValidationResult {
    let len = value.chars().count();
    if len >= MIN_SECRET_KEY_LEN {
        return ValidationResult::pass("secret_key", format!("{var} is {len} characters"));
    }
    ValidationResult::fixable(
        "secret_key",
        format!("{var} is {len} characters, minimum is {MIN_SECRET_KEY_LEN}"),
        FixAction::GenerateSecretKey,
    )
    .with_severity(Severity::Warning)
    .with_target(FixTarget::EnvField {
        path: path.to_path_buf(),
        key: var.to_string(),
    })
}

/// A file that must exist.
pub fn validate_exists(path: &Path, check: &str, action: FixAction) -> ValidationResult {
    if path.exists() {
        ValidationResult::pass(check, format!("{} exists", path.display()))
    } else {
        ValidationResult::fixable(check, format!("{} does not exist", path.display()), action)
            .with_target(FixTarget::File {
                path: path.to_path_buf(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const GOOD_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";

    fn env_path() -> PathBuf {
        PathBuf::from("/srv/app/.env")
    }

    #[test]
    fn base64_rejects_bad_alphabet_and_short_keys() {
        assert!(validate_base64(GOOD_KEY, "K", 16).passed);

        let bad = validate_base64("InvalidBase64!", "K", 16);
        assert!(!bad.passed);
        assert_eq!(bad.fix_action, Some(FixAction::GenerateBase64Key));

        // 8 bytes
        let short = validate_base64("MDEyMzQ1Njc=", "K", 16);
        assert!(!short.passed);
        assert!(short.message.contains("8 bytes"));

        assert!(!validate_base64("", "K", 16).passed);
    }

    #[test]
    fn base64_requires_padding() {
        assert!(!validate_base64("MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY", "K", 16).passed);
    }

    #[test]
    fn structure_reports_missing_keys() {
        let ok = validate_structure("{\"a\": 1, \"b\": 2}", DocumentFormat::Json, &["a".into()], "doc");
        assert!(ok.passed);

        let missing = validate_structure("a: 1\n", DocumentFormat::Yaml, &["a".into(), "b".into()], "doc");
        assert!(!missing.passed);
        assert!(missing.message.contains('b'));
        assert_eq!(missing.fix_action, Some(FixAction::FixJsonStructure));

        let broken = validate_structure("{", DocumentFormat::Json, &[], "doc");
        assert_eq!(broken.fix_action, Some(FixAction::FixJsonStructure));
    }

    #[test]
    fn encryption_keys_unparseable_or_empty_regenerate_all() {
        for raw in ["not json", "[]", "{\"id\": 1}"] {
            let results = validate_encryption_keys(raw, &env_path(), "ENCRYPTION_KEYS");
            assert_eq!(results.len(), 1, "{raw}");
            assert_eq!(results[0].fix_action, Some(FixAction::GenerateEncryptionKeys));
            assert!(matches!(results[0].target, Some(FixTarget::EnvField { .. })));
        }
    }

    #[test]
    fn encryption_keys_per_entry_failures_carry_index() {
        let raw = format!(
            r#"[{{"id":"a","key":"{GOOD_KEY}","cipher":"AES-GCM","revoked":false}},
                {{"id":"b","key":"InvalidBase64!","cipher":"AES-GCM","revoked":false}},
                {{"id":"c","key":"{GOOD_KEY}"}},
                {{"id":"d","key":"{GOOD_KEY}","cipher":"DES","revoked":true}}]"#
        );
        let results = validate_encryption_keys(&raw, &env_path(), "ENCRYPTION_KEYS");
        assert_eq!(results.len(), 3);

        assert_eq!(results[0].fix_action, Some(FixAction::RegenerateEncryptionKey));
        assert!(matches!(results[0].target, Some(FixTarget::EncryptionKey { index: 1, .. })));

        assert_eq!(results[1].fix_action, Some(FixAction::FixEncryptionKeyStructure));
        assert!(results[1].message.contains("cipher, revoked"));
        assert!(matches!(results[1].target, Some(FixTarget::EncryptionKey { index: 2, .. })));

        assert!(!results[2].passed);
        assert!(!results[2].auto_fixable);
        assert_eq!(results[2].severity, Severity::Warning);
    }

    #[test]
    fn presence_reports_missing_before_blank() {
        let env = EnvFile::parse("A=1\nB=\nC=\"\"\n");
        let required: Vec<String> = ["A", "B", "C", "D"].iter().map(|s| s.to_string()).collect();
        let results = validate_presence(&env, &required, &env_path());

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].fix_action, Some(FixAction::AddMissingEnvVars));
        assert_eq!(
            results[0].target,
            Some(FixTarget::EnvVars { path: env_path(), keys: vec!["D".into()] })
        );
        assert_eq!(results[1].fix_action, Some(FixAction::PopulateEmptyEnvVars));
        assert_eq!(
            results[1].target,
            Some(FixTarget::EnvVars { path: env_path(), keys: vec!["B".into(), "C".into()] })
        );
    }

    #[test]
    fn permissions_missing_then_mismatch() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let file = tmp.path().join("app.env");
        let (uid, gid) = permissions::current_owner();
        let expected = Ownership { uid, gid, mode: 0o600 };

        let missing = validate_permissions(&file, expected);
        assert_eq!(missing.fix_action, Some(FixAction::CreateFromTemplate));

        std::fs::write(&file, "").unwrap();
        permissions::apply(&file, Ownership { mode: 0o644, ..expected }).unwrap();
        let mismatch = validate_permissions(&file, expected);
        assert_eq!(mismatch.fix_action, Some(FixAction::FixPermissions));
        assert!(mismatch.message.contains("644"));

        permissions::apply(&file, expected).unwrap();
        assert!(validate_permissions(&file, expected).passed);
    }

    #[test]
    fn short_secret_is_a_fixable_warning() {
        let r = validate_secret_key("short", &env_path(), "SECRET_KEY");
        assert!(!r.passed);
        assert!(!r.is_blocking());
        assert_eq!(r.fix_action, Some(FixAction::GenerateSecretKey));
        assert!(validate_secret_key(&"x".repeat(50), &env_path(), "SECRET_KEY").passed);
    }
}
