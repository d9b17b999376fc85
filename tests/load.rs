use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use envfile::{EnvLoader, Error, ParseErrorKind, SubstitutionMode, TargetEnv};

#[test]
fn load_keeps_existing_values() {
    let dir = make_temp_dir("load-keeps");
    let file = dir.join(".env");
    write_file(&file, "X=new\nB=2\n");

    let mut initial = BTreeMap::new();
    initial.insert("X".to_string(), "old".to_string());

    let mut loader = EnvLoader::new()
        .path(&file)
        .target(TargetEnv::from_memory(initial))
        .override_existing(false);

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.files_read, 1);
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped_existing, 1);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("X").expect("X should exist"), "old");
    assert_eq!(map.get("B").expect("B should exist"), "2");
}

#[test]
fn overload_replaces_existing_values() {
    let dir = make_temp_dir("overload");
    let file = dir.join(".env");
    write_file(&file, "X=new\n");

    let mut initial = BTreeMap::new();
    initial.insert("X".to_string(), "old".to_string());

    let mut loader = EnvLoader::new()
        .path(&file)
        .target(TargetEnv::from_memory(initial))
        .override_existing(true);

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped_existing, 0);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("X").expect("X should exist"), "new");
}

#[test]
fn load_into_writes_to_injected_store() {
    let dir = make_temp_dir("load-into");
    let file = dir.join(".env");
    write_file(&file, "A=1\nB=2\n");

    let mut store = HashMap::new();
    store.insert("A".to_string(), "kept".to_string());

    let report = EnvLoader::new()
        .path(&file)
        .load_into(&mut store)
        .expect("load should succeed");

    assert_eq!(report.loaded, 1);
    assert_eq!(report.skipped_existing, 1);
    assert_eq!(store["A"], "kept");
    assert_eq!(store["B"], "2");
}

#[test]
fn multi_file_load_uses_last_file_precedence() {
    let dir = make_temp_dir("precedence");
    let first = dir.join(".env.base");
    let second = dir.join(".env.local");
    write_file(&first, "A=base\nB=base\n");
    write_file(&second, "B=local\nC=local\n");

    let mut loader = EnvLoader::new()
        .paths([first, second])
        .target(TargetEnv::memory());

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.files_read, 2);
    assert_eq!(report.loaded, 3);
    assert_eq!(report.skipped_existing, 0);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("A").expect("A should exist"), "base");
    assert_eq!(map.get("B").expect("B should exist"), "local");
    assert_eq!(map.get("C").expect("C should exist"), "local");
}

#[test]
fn read_merges_files_without_touching_target() {
    let dir = make_temp_dir("read");
    let first = dir.join("one.env");
    let second = dir.join("two.env");
    write_file(&first, "A=1\nB=1\n");
    write_file(&second, "B=2\n");

    let loader = EnvLoader::new().paths([&first, &second]);
    let map = loader.read_map().expect("read should succeed");

    assert_eq!(map.len(), 2);
    assert_eq!(map["A"], "1");
    assert_eq!(map["B"], "2");
    assert!(loader.target_env().as_memory().expect("memory").is_empty());

    let entries = loader.read().expect("read should succeed");
    assert_eq!(entries[1].source.as_deref(), Some(second.as_path()));
    assert_eq!(entries[1].line, 1);
}

#[test]
fn base_dir_resolves_relative_paths() {
    let dir = make_temp_dir("base-dir");
    write_file(&dir.join(".env"), "FROM=default\n");
    write_file(&dir.join("extra.env"), "EXTRA=yes\n");

    let map = EnvLoader::new()
        .base_dir(&dir)
        .read_map()
        .expect("default file should resolve against base dir");
    assert_eq!(map["FROM"], "default");

    let map = EnvLoader::new()
        .base_dir(&dir)
        .path("extra.env")
        .read_map()
        .expect("relative file should resolve against base dir");
    assert_eq!(map["EXTRA"], "yes");
}

#[test]
fn missing_file_returns_io_error_in_strict_mode() {
    let dir = make_temp_dir("missing");
    let present = dir.join("present.env");
    write_file(&present, "A=1\n");

    let mut loader = EnvLoader::new()
        .paths([present, dir.join("missing.env")])
        .target(TargetEnv::memory());
    let err = loader.load().expect_err("expected I/O error");

    match err {
        Error::Io(_) => {}
        other => panic!("unexpected error: {other:?}"),
    }
    let map = loader.target_env().as_memory().expect("memory target");
    assert!(map.is_empty(), "strict failure must not apply earlier files");
}

#[test]
fn malformed_file_returns_parse_error_with_path() {
    let dir = make_temp_dir("malformed");
    let file = dir.join(".env");
    write_file(&file, "A=ok\nBAD LINE\n");

    let mut loader = EnvLoader::new().path(&file);
    let err = loader.load().expect_err("expected parse error");

    match err {
        Error::Parse(parse_err) => {
            assert_eq!(parse_err.kind, ParseErrorKind::MissingSeparator);
            assert_eq!(parse_err.line, 2);
            assert_eq!(parse_err.path.as_deref(), Some(file.as_path()));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn lenient_mode_skips_broken_files() {
    let dir = make_temp_dir("lenient");
    let broken = dir.join("broken.env");
    let good = dir.join("good.env");
    write_file(&broken, "A=\"open\n");
    write_file(&good, "B=ok\n");

    let mut loader = EnvLoader::new()
        .paths([dir.join("missing.env"), broken, good])
        .strict(false)
        .target(TargetEnv::memory());

    let report = loader.load().expect("load should succeed");
    assert_eq!(report.files_read, 1);
    assert_eq!(report.files_skipped, 2);
    assert_eq!(report.loaded, 1);

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.len(), 1);
    assert_eq!(map["B"], "ok");
}

#[test]
fn lenient_mode_without_any_file_reports_no_file_loaded() {
    let dir = make_temp_dir("none-loaded");

    let mut loader = EnvLoader::new()
        .paths([dir.join("a.env"), dir.join("b.env")])
        .strict(false);
    let err = loader.load().expect_err("expected failure");
    assert!(matches!(err, Error::NoFileLoaded), "unexpected error: {err:?}");

    let err = EnvLoader::new()
        .path(dir.join("a.env"))
        .strict(false)
        .read_map()
        .expect_err("expected failure");
    assert!(matches!(err, Error::NoFileLoaded), "unexpected error: {err:?}");
}

#[test]
fn substitution_uses_target_environment_for_missing_values() {
    let dir = make_temp_dir("substitution-target-fallback");
    let file = dir.join(".env");
    write_file(&file, "OUT=${BASE}/bin\n");

    let mut initial = BTreeMap::new();
    initial.insert("BASE".to_string(), "/opt/app".to_string());

    let mut loader = EnvLoader::new()
        .path(file)
        .target(TargetEnv::from_memory(initial));

    loader.load().expect("load should succeed");

    let map = loader.target_env().as_memory().expect("memory target");
    assert_eq!(map.get("OUT").expect("OUT should exist"), "/opt/app/bin");
}

#[test]
fn substitution_does_not_resolve_forward_references() {
    let dir = make_temp_dir("substitution-forward");
    let file = dir.join(".env");
    write_file(&file, "A=$B\nB=2\n");

    let map = EnvLoader::new()
        .path(file)
        .read_map()
        .expect("read should succeed");
    assert_eq!(map["A"], "");
    assert_eq!(map["B"], "2");
}

#[test]
fn later_files_see_earlier_files_like_a_sequential_load() {
    let dir = make_temp_dir("substitution-across-files");
    let first = dir.join("first.env");
    let second = dir.join("second.env");
    write_file(&first, "HOST=file\nPORT=8080\n");
    write_file(&second, "URL=http://$HOST:$PORT\n");

    let mut initial = BTreeMap::new();
    initial.insert("HOST".to_string(), "existing".to_string());

    let loaded = EnvLoader::new()
        .paths([&first, &second])
        .target(TargetEnv::from_memory(initial.clone()))
        .read_map()
        .expect("read should succeed");
    assert_eq!(loaded["URL"], "http://existing:8080");

    let overloaded = EnvLoader::new()
        .paths([&first, &second])
        .override_existing(true)
        .target(TargetEnv::from_memory(initial))
        .read_map()
        .expect("read should succeed");
    assert_eq!(overloaded["URL"], "http://file:8080");
}

#[test]
fn disabled_substitution_keeps_placeholders() {
    let dir = make_temp_dir("substitution-disabled");
    let file = dir.join(".env");
    write_file(&file, "A=1\nB=${A}\n");

    let map = EnvLoader::new()
        .path(file)
        .substitution_mode(SubstitutionMode::Disabled)
        .read_map()
        .expect("read should succeed");
    assert_eq!(map["B"], "${A}");
}

#[test]
fn write_file_round_trips_through_loader() {
    let dir = make_temp_dir("write");
    let file = dir.join("out.env");

    let mut original = BTreeMap::new();
    original.insert("PORT".to_string(), "8080".to_string());
    original.insert("MOTD".to_string(), "hello\n\"world\" $USER!".to_string());

    envfile::write_file(&original, &file).expect("write should succeed");
    let written = std::fs::read_to_string(&file).expect("read back");
    assert_eq!(
        written,
        "MOTD=\"hello\\n\\\"world\\\" \\$USER\\!\"\nPORT=8080\n"
    );

    let decoded = EnvLoader::new()
        .path(&file)
        .read_map()
        .expect("read should succeed");
    assert_eq!(decoded, original);
}

#[test]
fn write_file_refuses_unencodable_key_without_creating_file() {
    let dir = make_temp_dir("write-bad-key");
    let file = dir.join("out.env");

    let mut original = BTreeMap::new();
    original.insert("PORT".to_string(), "8080".to_string());
    original.insert("export HOST".to_string(), "db".to_string());

    let err = envfile::write_file(&original, &file).expect_err("key should be refused");
    assert!(matches!(err, Error::UnencodableKey(ref key) if key == "export HOST"));
    assert!(!file.exists());
}

#[test]
fn free_read_defaults_to_process_lookup() {
    let dir = make_temp_dir("free-read");
    let file = dir.join("vars.env");
    write_file(&file, "PLAIN=value\n");

    let map = envfile::read(true, [&file]).expect("read should succeed");
    assert_eq!(map["PLAIN"], "value");
}

fn make_temp_dir(name: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock should be after unix epoch")
        .as_nanos();
    path.push(format!("envfile-{name}-{}-{nanos}", std::process::id()));
    std::fs::create_dir_all(&path).expect("failed to create temp dir");
    path
}

fn write_file(path: &Path, content: &str) {
    std::fs::write(path, content).expect("failed to write test file");
}
