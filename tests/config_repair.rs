//! Validate → repair → re-validate scenarios against real files.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use fleet_healer::clock::ManualClock;
use fleet_healer::config::{DocumentSpec, PathKind, PathSpec, ServiceProfile};
use fleet_healer::repair::{AutoRepair, RepairStatus};
use fleet_healer::store::{permissions, EnvFile};
use fleet_healer::validation::{
    ConfigValidator, DocumentFormat, FixAction, FixTarget, Ownership, ValidationSummary,
};

const GOOD_KEY: &str = "MDEyMzQ1Njc4OWFiY2RlZjAxMjM0NTY3ODlhYmNkZWY=";
const GOOD_SECRET: &str = "k3v9Qz!x7Lm2Rt8Wb4Nc6Yd1Hf5Jg0Ps3Ua7Ve9Xi2Ko4Mq6Sw8Zy1Bn5Cr7Dt";

fn repairer(profiles: Vec<ServiceProfile>) -> AutoRepair {
    let validator = ConfigValidator::new(profiles, Duration::from_secs(1));
    AutoRepair::new(validator, Arc::new(ManualClock::default()))
}

fn reporting_profile(env: &Path) -> ServiceProfile {
    let mut profile = ServiceProfile::named("reporting");
    profile.env_file = Some(env.to_path_buf());
    profile.required_vars = [
        "DATABASE_HOST",
        "DATABASE_NAME",
        "DATABASE_USER",
        "DATABASE_PASSWORD",
        "REDIS_HOST",
        "REDIS_PASSWORD",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    profile.secret_key_var = Some("SECRET_KEY".into());
    profile.encryption_keys_var = Some("ENCRYPTION_KEYS".into());
    profile.paths.push(PathSpec {
        path: env.to_path_buf(),
        owner: None,
        mode: Some("0600".into()),
        kind: PathKind::File,
    });
    profile
}

fn write_env(path: &Path, contents: &str) {
    fs::write(path, contents).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).unwrap();
}

fn backups_in(dir: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().contains(".bak."))
        .collect();
    found.sort();
    found
}

fn key_list(env: &EnvFile) -> Vec<serde_json::Value> {
    let raw = env.value("ENCRYPTION_KEYS").unwrap();
    serde_json::from_str::<serde_json::Value>(raw)
        .unwrap()
        .as_array()
        .unwrap()
        .clone()
}

fn good_env(db_port: u16) -> String {
    format!(
        "# reporting\n\
         DATABASE_HOST=127.0.0.1\n\
         DATABASE_PORT={db_port}\n\
         DATABASE_NAME=reports\n\
         DATABASE_USER=reports\n\
         DATABASE_PASSWORD=hunter2hunter2\n\
         REDIS_HOST=cache\n\
         REDIS_PASSWORD=cachepass\n\
         SECRET_KEY={GOOD_SECRET}\n\
         ENCRYPTION_KEYS=[{{\"id\":\"k1\",\"key\":\"{GOOD_KEY}\",\"cipher\":\"AES-GCM\",\"revoked\":false}}]\n\
         DEFAULT_ENCRYPTION_KEY_ID=k1\n"
    )
}

#[tokio::test]
async fn known_good_configuration_has_no_failures() {
    let tmp = tempfile::tempdir().unwrap();
    let db = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = db.local_addr().unwrap().port();

    let env = tmp.path().join("app.env");
    write_env(&env, &good_env(port));
    let doc = tmp.path().join("agent.yaml");
    fs::write(&doc, "agent:\n  listen_port: 443\nserver:\n  url: https://api\n").unwrap();
    let data = tmp.path().join("state.db");
    fs::write(&data, "").unwrap();

    let mut profile = reporting_profile(&env);
    profile.probe_database = true;
    profile.documents.push(DocumentSpec {
        path: doc,
        format: DocumentFormat::Yaml,
        required_keys: vec!["agent".into(), "server".into()],
        template: None,
    });
    profile.data_files.push(data);

    let repair = repairer(vec![profile]);
    let summary = repair.validator().validate_all().await;
    let failures: Vec<_> = summary.failures().map(|r| r.message.clone()).collect();
    assert!(failures.is_empty(), "unexpected failures: {failures:?}");
    assert_eq!(summary.overall_status(), "PASS");
    assert!(summary.results.iter().any(|r| r.check == "database" && r.passed));

    let cycle = repair.repair_cycle().await;
    assert!(cycle.success);
    assert!(cycle.repairs.is_none());
    assert!(backups_in(tmp.path()).is_empty());
}

#[tokio::test]
async fn repair_cycle_is_idempotent() {
    let tmp = tempfile::tempdir().unwrap();
    let env = tmp.path().join("app.env");
    write_env(
        &env,
        &format!(
            "# reporting service\n\
             DATABASE_HOST=database\n\
             DATABASE_NAME=\n\
             SECRET_KEY=short\n\
             ENCRYPTION_KEYS=[{{\"id\":\"k1\",\"key\":\"InvalidBase64!\",\"cipher\":\"AES-GCM\",\"revoked\":false}}]\n\
             DEFAULT_ENCRYPTION_KEY_ID=k1\n\
             this line is broken\n"
        ),
    );
    fs::set_permissions(&env, fs::Permissions::from_mode(0o644)).unwrap();

    let repair = repairer(vec![reporting_profile(&env)]);
    let first = repair.repair_cycle().await;
    assert!(first.success);
    assert!(first.post_repair.passed(), "left over: {:?}", first.post_repair.failures().collect::<Vec<_>>());
    let repairs = first.repairs.as_ref().unwrap();
    assert_eq!(repairs.failed_repairs, 0);
    assert!(!repairs.backups.is_empty());

    let contents = fs::read_to_string(&env).unwrap();
    assert!(contents.starts_with("# reporting service\n"));
    assert!(contents.contains("# this line is broken"));

    let backups = backups_in(tmp.path());
    let mode = fs::metadata(&env).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o600);

    let second = repair.repair_cycle().await;
    assert!(second.success);
    assert!(second.repairs.is_none());
    assert_eq!(fs::read_to_string(&env).unwrap(), contents);
    assert_eq!(backups_in(tmp.path()), backups);

    // Forcing the actions again must not touch anything either
    let summary = repair.repair(&first.initial.results);
    assert!(summary.backups.is_empty());
    assert_eq!(fs::read_to_string(&env).unwrap(), contents);
    assert_eq!(backups_in(tmp.path()), backups);
}

#[tokio::test]
async fn missing_cache_variables_are_added() {
    let tmp = tempfile::tempdir().unwrap();
    let env = tmp.path().join("app.env");
    let original = good_env(5432)
        .lines()
        .filter(|l| !l.starts_with("REDIS_"))
        .map(|l| format!("{l}\n"))
        .collect::<String>();
    write_env(&env, &original);

    let repair = repairer(vec![reporting_profile(&env)]);
    let initial = ValidationSummary::from_results(repair.validator().validate_service("reporting").await);
    let failing: Vec<_> = initial.failures().collect();
    assert_eq!(failing.len(), 1);
    assert_eq!(failing[0].fix_action, Some(FixAction::AddMissingEnvVars));
    assert!(failing[0].auto_fixable);
    assert_eq!(
        failing[0].target,
        Some(FixTarget::EnvVars {
            path: env.clone(),
            keys: vec!["REDIS_HOST".into(), "REDIS_PASSWORD".into()],
        })
    );

    let cycle = repair.repair_service("reporting").await;
    assert!(cycle.success);
    assert!(cycle.post_repair.passed());

    let contents = fs::read_to_string(&env).unwrap();
    assert!(contents.starts_with(&original));
    assert!(contents.contains("# Added by auto-repair\n"));
    let repaired = EnvFile::parse(&contents);
    assert_eq!(repaired.value("REDIS_HOST"), Some("cache"));
    assert!(repaired.value("REDIS_PASSWORD").is_some_and(|p| p.len() >= 16));
}

#[tokio::test]
async fn invalid_encryption_key_is_regenerated_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    let env = tmp.path().join("app.env");
    let contents = good_env(5432).replace(
        &format!("[{{\"id\":\"k1\",\"key\":\"{GOOD_KEY}\",\"cipher\":\"AES-GCM\",\"revoked\":false}}]"),
        &format!(
            "[{{\"id\":\"k1\",\"key\":\"InvalidBase64!\",\"cipher\":\"AES-GCM\",\"revoked\":false}},\
             {{\"id\":\"k0\",\"key\":\"{GOOD_KEY}\",\"cipher\":\"AES-GCM\",\"revoked\":true}}]"
        ),
    );
    write_env(&env, &contents);

    let repair = repairer(vec![reporting_profile(&env)]);
    let initial = repair.validator().validate_all().await;
    let failing: Vec<_> = initial.failures().collect();
    assert_eq!(failing.len(), 1);
    assert!(failing[0].auto_fixable);
    assert_eq!(failing[0].fix_action, Some(FixAction::RegenerateEncryptionKey));

    let cycle = repair.repair_cycle().await;
    assert!(cycle.success);
    assert!(cycle.post_repair.passed());

    let repaired = EnvFile::read(&env).unwrap();
    let keys = key_list(&repaired);
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0]["cipher"], "AES-GCM");
    assert_eq!(keys[0]["revoked"], false);
    assert_ne!(keys[0]["id"], "k1");
    let decoded = STANDARD.decode(keys[0]["key"].as_str().unwrap()).unwrap();
    assert!(decoded.len() >= 16);
    // sibling untouched
    assert_eq!(keys[1]["id"], "k0");
    assert_eq!(keys[1]["key"], GOOD_KEY);
    assert_eq!(keys[1]["revoked"], true);
    // active key id follows the regenerated entry
    assert_eq!(
        repaired.value("DEFAULT_ENCRYPTION_KEY_ID"),
        keys[0]["id"].as_str()
    );
}

#[tokio::test]
async fn permission_fix_materializes_missing_file() {
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("uploads").join("index.dat");
    let mut profile = ServiceProfile::named("uploads");
    profile.paths.push(PathSpec {
        path: target.clone(),
        owner: None,
        mode: Some("0640".into()),
        kind: PathKind::File,
    });
    let repair = repairer(vec![profile]);

    let (uid, gid) = permissions::current_owner();
    let expected = Ownership { uid, gid, mode: 0o640 };
    let failing = fleet_healer::ValidationResult::fixable(
        "permissions",
        "index.dat has the wrong mode",
        FixAction::FixPermissions,
    )
    .with_target(FixTarget::Permissions {
        path: target.clone(),
        expected,
    });

    let summary = repair.repair(&[failing]);
    assert_eq!(summary.successful_repairs, 1);
    assert!(target.is_file());
    assert_eq!(permissions::inspect(&target).unwrap(), expected);

    let post = repair.validator().validate_all().await;
    assert!(post.passed());
}

#[tokio::test]
async fn setgid_directory_mode_is_repaired_and_stays_fixed() {
    let tmp = tempfile::tempdir().unwrap();
    let shared = tmp.path().join("shared");
    fs::create_dir(&shared).unwrap();
    fs::set_permissions(&shared, fs::Permissions::from_mode(0o775)).unwrap();
    let mut profile = ServiceProfile::named("volumes");
    profile.paths.push(PathSpec {
        path: shared.clone(),
        owner: None,
        mode: Some("2775".into()),
        kind: PathKind::Directory,
    });
    let repair = repairer(vec![profile]);

    let cycle = repair.repair_cycle().await;
    assert_eq!(cycle.initial.failed_checks, 1);
    assert_eq!(cycle.post_repair.failed_checks, 0, "{:?}", cycle.post_repair.results);
    assert!(cycle.success);
    assert!(cycle.blocking_failures().is_empty());
    assert_eq!(fs::metadata(&shared).unwrap().permissions().mode() & 0o7777, 0o2775);

    let again = repair.repair_cycle().await;
    assert!(again.initial.passed());
    assert!(again.repairs.is_none());
}

#[tokio::test]
async fn unreachable_database_is_not_a_false_success() {
    let tmp = tempfile::tempdir().unwrap();
    let closed_port = {
        let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    };
    let env = tmp.path().join("app.env");
    write_env(&env, &good_env(closed_port));

    let mut profile = reporting_profile(&env);
    profile.probe_database = true;
    let repair = repairer(vec![profile]);

    let cycle = repair.repair_cycle().await;
    let db = cycle
        .initial
        .failures()
        .find(|r| r.check == "database")
        .expect("database probe should fail");
    assert!(!db.auto_fixable);
    assert_eq!(db.fix_action, None);

    assert!(!cycle.success);
    assert_eq!(cycle.post_repair.failed_checks, cycle.initial.failed_checks);
    let repairs = cycle.repairs.as_ref().unwrap();
    assert_eq!(repairs.total_failures, 0);
    assert!(backups_in(tmp.path()).is_empty());
    assert_eq!(cycle.blocking_failures().len(), 1);
}

#[tokio::test]
async fn mismatched_target_is_skipped_and_counted() {
    let tmp = tempfile::tempdir().unwrap();
    let env = tmp.path().join("app.env");
    write_env(&env, "A=1\n");
    let repair = repairer(vec![reporting_profile(&env)]);

    let bogus = fleet_healer::ValidationResult::fixable(
        "secret_key",
        "secret too short",
        FixAction::GenerateSecretKey,
    )
    .with_target(FixTarget::File { path: env.clone() });
    let untargeted = fleet_healer::ValidationResult::fixable(
        "required_vars",
        "missing",
        FixAction::AddMissingEnvVars,
    );

    let summary = repair.repair(&[bogus, untargeted]);
    assert_eq!(summary.total_failures, 2);
    assert_eq!(summary.attempted_repairs, 0);
    assert_eq!(summary.failed_repairs, 2);
    assert!(summary
        .outcomes
        .iter()
        .all(|o| o.status == RepairStatus::Skipped));
    assert_eq!(fs::read_to_string(&env).unwrap(), "A=1\n");
}
