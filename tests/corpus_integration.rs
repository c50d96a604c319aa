mod support;

use std::path::{Path, PathBuf};
use support::{JS_CMD, RB_CMD, TempCorpus};
use vibe_oracle::corpus::{self, rehash_corpus};
use vibe_oracle::oracle::{ColumnRange, OracleDocument};
use vibe_oracle::{
    Anchor, Error, FindingInstance, IntegrityViolation, Language, Severity, VulnerabilityClass,
    load_corpus,
};

fn violations(err: Error) -> Vec<IntegrityViolation> {
    match err {
        Error::Integrity(e) => e.violations,
        other => panic!("expected an integrity error, got {other:?}"),
    }
}

fn cmd(file: &str, line: u32) -> FindingInstance {
    FindingInstance::new(
        VulnerabilityClass::CommandInjection,
        Anchor::at(file, line),
        Severity::Critical,
    )
}

#[test]
fn sample_corpus_is_valid() {
    let corpus = load_corpus(Path::new("corpus")).unwrap();

    assert_eq!(corpus.len(), 12);
    let ids: Vec<&str> = corpus.entries().iter().map(|e| e.fixture.id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            "js-api",
            "js-index",
            "js-utils",
            "rb-application",
            "rb-controllers",
            "rb-files",
            "rb-home",
            "rb-lib-utils",
            "rb-models",
            "rb-sessions",
            "ts-index",
            "ts-utils",
        ]
    );
    assert_eq!(
        corpus.languages(),
        vec![Language::JavaScript, Language::TypeScript, Language::Ruby]
    );

    let rb = &corpus.get("rb-controllers").unwrap().fixture;
    assert_eq!(rb.language, Language::Ruby);
    assert_eq!(rb.files.len(), 2);
    assert_eq!(rb.lint_profile, Some(PathBuf::from("ruby-test-app/.rubocop.yml")));

    let models = &corpus.get("rb-models").unwrap().fixture;
    assert_eq!(models.files.len(), 2);
    let lib = &corpus.get("rb-lib-utils").unwrap().fixture;
    assert_eq!(lib.language, Language::Ruby);
    assert_eq!(lib.lint_profile, Some(PathBuf::from("ruby-test-app/.rubocop.yml")));

    let js = &corpus.get("js-index").unwrap().fixture;
    assert_eq!(js.lint_profile, Some(PathBuf::from("js-test-app/.eslintrc.js")));
    let ts = &corpus.get("ts-utils").unwrap().fixture;
    assert_eq!(ts.language, Language::TypeScript);
    assert_eq!(ts.lint_profile, Some(PathBuf::from("typescript-test-app/.eslintrc.js")));

    let total: usize = corpus.entries().iter().map(|e| e.oracle.findings.len()).sum();
    assert_eq!(total, 87);
}

#[test]
fn sample_oracles_survive_a_save_and_reload() {
    let path = Path::new("corpus/js-test-app/js.oracle.json");
    let doc = OracleDocument::load(path).unwrap();
    let reloaded = OracleDocument::from_json(&doc.to_json_pretty().unwrap()).unwrap();
    assert_eq!(doc, reloaded);
    assert_eq!(reloaded.oracles().len(), 3);
}

#[test]
fn mutated_fixture_is_stale() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("js-cmd", "js/cmd.js", JS_CMD, vec![cmd("js/cmd.js", 3)]);
    assert!(load_corpus(corpus.root()).is_ok());

    // flip one byte
    let mut bytes = std::fs::read(corpus.root().join("js/cmd.js")).unwrap();
    bytes[0] = b'l';
    std::fs::write(corpus.root().join("js/cmd.js"), bytes).unwrap();

    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert_eq!(v.len(), 1);
    assert!(matches!(&v[0], IntegrityViolation::StaleHash { fixture_id, .. } if fixture_id == "js-cmd"));
}

#[test]
fn rehash_repairs_stale_oracles_only() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("js-cmd", "js/cmd.js", JS_CMD, vec![cmd("js/cmd.js", 3)]);
    corpus.add_fixture("rb-cmd", "rb/cmd.rb", RB_CMD, vec![cmd("rb/cmd.rb", 3)]);
    corpus.write("js/cmd.js", &format!("// edited\n{JS_CMD}"));

    // line 3 is still inside the edited file
    let changed = rehash_corpus(corpus.root()).unwrap();
    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].fixture_id, "js-cmd");
    assert_ne!(changed[0].previous, changed[0].current);

    let loaded = load_corpus(corpus.root()).unwrap();
    assert_eq!(loaded.get("js-cmd").unwrap().fixture.content_hash, changed[0].current);
    assert!(rehash_corpus(corpus.root()).unwrap().is_empty());
}

#[test]
fn rehash_still_rejects_bad_anchors() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("js-cmd", "js/cmd.js", JS_CMD, vec![cmd("js/cmd.js", 3)]);
    corpus.write("js/cmd.js", "exec(cmd);\n");

    let v = violations(rehash_corpus(corpus.root()).unwrap_err());
    assert!(v.iter().any(|v| matches!(v, IntegrityViolation::AnchorOutOfRange { line: 3, .. })));

    // nothing was rewritten
    let doc = OracleDocument::load(&corpus.root().join("js-cmd.oracle.json")).unwrap();
    assert_eq!(doc.oracles()[0].findings[0].anchor.line, 3);
    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert!(v.iter().any(|v| matches!(v, IntegrityViolation::StaleHash { .. })));
}

#[test]
fn anchor_past_last_line_is_rejected() {
    let corpus = TempCorpus::new();
    // JS_CMD has four lines and a trailing newline
    corpus.add_fixture("js-cmd", "js/cmd.js", JS_CMD, vec![cmd("js/cmd.js", 5)]);

    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert_eq!(v.len(), 1);
    assert!(matches!(
        &v[0],
        IntegrityViolation::AnchorOutOfRange { line: 5, .. }
    ));
}

#[test]
fn last_line_and_columns_are_accepted() {
    let corpus = TempCorpus::new();
    let f = FindingInstance::new(
        VulnerabilityClass::CommandInjection,
        Anchor::at("js/cmd.js", 4).with_columns(1, 1),
        Severity::Critical,
    );
    corpus.add_fixture("js-cmd", "js/cmd.js", JS_CMD, vec![f]);
    assert!(load_corpus(corpus.root()).is_ok());
}

#[test]
fn column_past_end_of_line_is_rejected() {
    let corpus = TempCorpus::new();
    let mut f = cmd("js/cmd.js", 4);
    f.anchor.columns = Some(ColumnRange { start: 5, end: 9 });
    corpus.add_fixture("js-cmd", "js/cmd.js", JS_CMD, vec![f]);

    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert!(matches!(&v[0], IntegrityViolation::AnchorOutOfRange { line: 4, .. }));
}

#[test]
fn line_zero_is_rejected() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("js-cmd", "js/cmd.js", JS_CMD, vec![cmd("js/cmd.js", 0)]);
    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert!(matches!(&v[0], IntegrityViolation::AnchorOutOfRange { line: 0, .. }));
}

#[test]
fn duplicate_fixture_ids_are_rejected() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("cmd", "js/cmd.js", JS_CMD, vec![cmd("js/cmd.js", 3)]);
    corpus.write("rb/cmd.rb", RB_CMD);
    let other = corpus.oracle("cmd", None, &["rb/cmd.rb"], vec![cmd("rb/cmd.rb", 3)]);
    corpus.save_oracle("zz-second.oracle.json", other);

    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert!(v.iter().any(|v| matches!(
        v,
        IntegrityViolation::DuplicateFixtureId { fixture_id, .. } if fixture_id == "cmd"
    )));
}

#[test]
fn two_oracles_claiming_one_file_are_rejected() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("a", "js/cmd.js", JS_CMD, vec![cmd("js/cmd.js", 3)]);
    let again = corpus.oracle("b", None, &["./js/cmd.js"], vec![]);
    corpus.save_oracle("b.oracle.json", again);

    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert!(v.iter().any(|v| matches!(
        v,
        IntegrityViolation::DuplicateFixturePath { path, .. } if path == Path::new("js/cmd.js")
    )));
}

#[test]
fn missing_fixture_file_is_rejected() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("js-cmd", "js/cmd.js", JS_CMD, vec![cmd("js/cmd.js", 3)]);
    std::fs::remove_file(corpus.root().join("js/cmd.js")).unwrap();

    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert_eq!(v.len(), 1);
    assert!(matches!(
        &v[0],
        IntegrityViolation::MissingFixture { path, .. } if path == Path::new("js/cmd.js")
    ));
}

#[test]
fn every_violation_is_reported_at_once() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("js-cmd", "js/cmd.js", JS_CMD, vec![cmd("js/cmd.js", 40)]);
    corpus.add_fixture("rb-cmd", "rb/cmd.rb", RB_CMD, vec![cmd("rb/other.rb", 3)]);
    corpus.write("broken.oracle.json", "{ not json");

    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert_eq!(v.len(), 3);
    assert!(v.iter().any(|v| matches!(v, IntegrityViolation::MalformedOracle { .. })));
    assert!(v.iter().any(|v| matches!(v, IntegrityViolation::AnchorOutOfRange { .. })));
    assert!(v.iter().any(|v| matches!(v, IntegrityViolation::FileNotInFixture { .. })));
}

#[test]
fn escaping_paths_are_rejected() {
    let corpus = TempCorpus::new();
    corpus.write("js/cmd.js", JS_CMD);
    let mut oracle = corpus.oracle("js-cmd", None, &["js/cmd.js"], vec![]);
    oracle.files = vec![PathBuf::from("../outside.js")];
    corpus.save_oracle("js-cmd.oracle.json", oracle);

    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert!(matches!(&v[0], IntegrityViolation::PathEscapesRoot { .. }));
}

#[cfg(unix)]
#[test]
fn symlinked_oracle_is_followed() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("js-cmd", "js/cmd.js", JS_CMD, vec![cmd("js/cmd.js", 3)]);
    let outside = tempfile::tempdir().unwrap();
    let target = outside.path().join("js-cmd.oracle.json");
    std::fs::rename(corpus.root().join("js-cmd.oracle.json"), &target).unwrap();
    std::os::unix::fs::symlink(&target, corpus.root().join("js-cmd.oracle.json")).unwrap();

    let loaded = load_corpus(corpus.root()).unwrap();
    assert_eq!(loaded.len(), 1);
    assert!(loaded.get("js-cmd").is_some());
}

#[cfg(unix)]
#[test]
fn dangling_oracle_symlink_is_rejected() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("js-cmd", "js/cmd.js", JS_CMD, vec![cmd("js/cmd.js", 3)]);
    std::os::unix::fs::symlink(
        corpus.root().join("gone.json"),
        corpus.root().join("rb-cmd.oracle.json"),
    )
    .unwrap();

    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert_eq!(v.len(), 1);
    assert!(matches!(
        &v[0],
        IntegrityViolation::Unreadable { path, .. } if path.ends_with("rb-cmd.oracle.json")
    ));
}

#[test]
fn language_is_inferred_from_extension() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("rb-cmd", "rb/cmd.rb", RB_CMD, vec![cmd("rb/cmd.rb", 3)]);
    let loaded = load_corpus(corpus.root()).unwrap();
    assert_eq!(loaded.get("rb-cmd").unwrap().fixture.language, Language::Ruby);
}

#[test]
fn extensionless_file_uses_project_markers() {
    let corpus = TempCorpus::new();
    corpus.write("web/package.json", "{}");
    corpus.add_fixture("web-bin", "web/server", JS_CMD, vec![cmd("web/server", 3)]);
    let loaded = load_corpus(corpus.root()).unwrap();
    assert_eq!(
        loaded.get("web-bin").unwrap().fixture.language,
        Language::JavaScript
    );
}

#[test]
fn unknown_extension_without_tag_is_rejected() {
    let corpus = TempCorpus::new();
    corpus.add_fixture("txt", "notes/readme.txt", "hello\n", vec![]);
    let v = violations(load_corpus(corpus.root()).unwrap_err());
    assert!(matches!(&v[0], IntegrityViolation::UnknownLanguage { .. }));
}

#[test]
fn missing_root_is_a_configuration_error() {
    let err = corpus::load_corpus(Path::new("/definitely/not/a/corpus")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
