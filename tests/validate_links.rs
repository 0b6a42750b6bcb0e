use std::fs;
use std::path::Path;

use formlinks::formats::{ChangeAction, ChangeRecord};
use formlinks::language::Language;
use predicates::prelude::*;

mod forms_stub;

const EN_TABLE: &str = r#"<!doctype html>
<html lang="en">
<head><meta charset="utf-8"><title>5000-S2</title></head>
<body>
<table class="table table-bordered">
<thead><tr><th>Year</th><th>PDF</th><th>Fillable PDF</th></tr></thead>
<tbody>
<tr>
<td>2023</td>
<td><a href="/pdf/5000-s2-23e.pdf">5000-S2 <span class="nowrap">(PDF)</span></a></td>
<td><a href="/pdf/5000-s2-fill-23e.pdf">Fillable</a></td>
</tr>
<tr>
<td>2022</td>
<td><a href="/pdf/5000-s2-22e.pdf">5000-S2</a></td>
<td><span class="small text-muted">Not available</span></td>
</tr>
<tr>
<td>2021</td>
<td><a href="/pdf/5000-s2-21e.pdf">5000-S2</a></td>
<td><a href="/pdf/5000-s2-21e.pdf">Same file</a></td>
</tr>
</tbody>
</table>
<p>Date modified: 2024-01-15</p>
</body>
</html>
"#;

const FR_TABLE: &str = r#"<!doctype html>
<html lang="fr">
<head><meta charset="utf-8"><title>5000-S2</title></head>
<body>
<table class="table table-bordered">
<thead><tr><th>Année</th><th>PDF</th><th>PDF à remplir</th></tr></thead>
<tbody>
<tr>
<td>2023</td>
<td><a href="/pdf/5000-s2-23f.pdf">5000-S2</a></td>
<td><a href="/pdf/5000-s2-fill-23f.pdf">À remplir</a></td>
</tr>
</tbody>
</table>
</body>
</html>
"#;

const LIVE: &[&str] = &[
    "/pdf/5000-s2-23e.pdf",
    "/pdf/5100-s2-fill-23e.pdf",
    "/pdf/5000-s2-23f.pdf",
];
const HEAD_REJECTED: &[&str] = &["/pdf/5000-s2-21e.pdf"];

fn write_results(dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dir.join("results"))?;
    fs::write(dir.join("forms.txt"), "# 5000 family\n5000-s2\n")?;
    fs::write(dir.join("results/5000-s2-table-e.htm"), EN_TABLE)?;
    fs::write(dir.join("results/5000-s2-table-f.htm"), FR_TABLE)?;
    Ok(())
}

fn expected_en() -> String {
    EN_TABLE
        .replace("/pdf/5000-s2-fill-23e.pdf", "/pdf/5100-s2-fill-23e.pdf")
        .replace(
            r#"<td><a href="/pdf/5000-s2-22e.pdf">5000-S2</a></td>"#,
            &format!("<td>{}</td>", Language::En.placeholder()),
        )
}

fn expected_fr() -> String {
    FR_TABLE.replace(
        r#"<td><a href="/pdf/5000-s2-fill-23f.pdf">À remplir</a></td>"#,
        &format!("<td>{}</td>", Language::Fr.placeholder()),
    )
}

fn backups_in(dir: &Path) -> anyhow::Result<usize> {
    let mut count = 0usize;
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name();
        if name.to_string_lossy().contains(".bak-") {
            count += 1;
        }
    }
    Ok(count)
}

fn read_change_log(path: &Path) -> anyhow::Result<Vec<ChangeRecord>> {
    let mut records = Vec::new();
    for line in fs::read_to_string(path)?.lines() {
        records.push(serde_json::from_str(line)?);
    }
    Ok(records)
}

#[test]
fn validate_replaces_blanks_and_keeps_links() -> anyhow::Result<()> {
    let stub = forms_stub::FormsStub::spawn(LIVE, HEAD_REJECTED);
    let temp = tempfile::TempDir::new()?;
    write_results(temp.path())?;
    let change_log = temp.path().join("changes.jsonl");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("formlinks");
    cmd.args([
        "validate",
        "--manifest",
        temp.path().join("forms.txt").to_str().unwrap(),
        "--results",
        temp.path().join("results").to_str().unwrap(),
        "--base-url",
        &stub.base_url,
        "--change-log",
        change_log.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("documents=2"))
    .stdout(predicate::str::contains("written=2"))
    .stdout(predicate::str::contains("links_checked=7"))
    .stdout(predicate::str::contains("cells_changed=3"))
    .stdout(predicate::str::contains("fatal_errors=0"));

    let results = temp.path().join("results");
    assert_eq!(
        fs::read_to_string(results.join("5000-s2-table-e.htm"))?,
        expected_en()
    );
    assert_eq!(
        fs::read_to_string(results.join("5000-s2-table-f.htm"))?,
        expected_fr()
    );
    assert_eq!(backups_in(&results)?, 2);

    // HEAD then GET once, although two cells share the URL.
    assert_eq!(stub.hits("/pdf/5000-s2-21e.pdf"), 2);
    assert_eq!(stub.hits("/pdf/5000-s2-23e.pdf"), 1);

    let records = read_change_log(&change_log)?;
    assert_eq!(records.len(), 3);
    assert!(records.iter().any(|r| r.action == ChangeAction::Replaced
        && r.year == "2023"
        && r.language == Language::En
        && r.replacement_href.as_deref() == Some("/pdf/5100-s2-fill-23e.pdf")));
    assert!(records.iter().any(|r| r.action == ChangeAction::Blanked
        && r.year == "2022"
        && r.removed_href == "/pdf/5000-s2-22e.pdf"));
    assert!(records.iter().any(|r| r.action == ChangeAction::Blanked
        && r.language == Language::Fr
        && r.column == 2));

    Ok(())
}

#[test]
fn validate_dry_run_leaves_documents_alone() -> anyhow::Result<()> {
    let stub = forms_stub::FormsStub::spawn(LIVE, HEAD_REJECTED);
    let temp = tempfile::TempDir::new()?;
    write_results(temp.path())?;

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("formlinks");
    cmd.args([
        "validate",
        "--dry-run",
        "--manifest",
        temp.path().join("forms.txt").to_str().unwrap(),
        "--results",
        temp.path().join("results").to_str().unwrap(),
        "--base-url",
        &stub.base_url,
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("cells_changed=3"))
    .stdout(predicate::str::contains("written=0"));

    let results = temp.path().join("results");
    assert_eq!(fs::read_to_string(results.join("5000-s2-table-e.htm"))?, EN_TABLE);
    assert_eq!(fs::read_to_string(results.join("5000-s2-table-f.htm"))?, FR_TABLE);
    assert_eq!(backups_in(&results)?, 0);
    Ok(())
}

#[test]
fn repair_runs_parity_over_validated_documents() -> anyhow::Result<()> {
    let stub = forms_stub::FormsStub::spawn(LIVE, HEAD_REJECTED);
    let temp = tempfile::TempDir::new()?;
    write_results(temp.path())?;
    let change_log = temp.path().join("changes.jsonl");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("formlinks");
    cmd.args([
        "repair",
        "--manifest",
        temp.path().join("forms.txt").to_str().unwrap(),
        "--results",
        temp.path().join("results").to_str().unwrap(),
        "--base-url",
        &stub.base_url,
        "--change-log",
        change_log.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("cells_changed=4"))
    .stderr(predicate::str::contains("year 2022 is missing from the fr table"));

    // The fillable link survived validation in English only, so parity
    // removes it.
    let records = read_change_log(&change_log)?;
    let parity = records
        .iter()
        .filter(|r| r.action == ChangeAction::ParityBlanked)
        .collect::<Vec<_>>();
    assert_eq!(parity.len(), 1);
    assert_eq!(parity[0].language, Language::En);
    assert_eq!(parity[0].removed_href, "/pdf/5100-s2-fill-23e.pdf");

    let en = fs::read_to_string(temp.path().join("results/5000-s2-table-e.htm"))?;
    assert!(!en.contains("5000-s2-fill-23e"));
    assert!(!en.contains("5100-s2-fill-23e"));
    assert!(en.contains("<p>Date modified: 2024-01-15</p>"));
    Ok(())
}

#[test]
fn repair_dry_run_previews_exactly_what_repair_changes() -> anyhow::Result<()> {
    let stub = forms_stub::FormsStub::spawn(LIVE, HEAD_REJECTED);
    let temp = tempfile::TempDir::new()?;
    write_results(temp.path())?;
    let manifest = temp.path().join("forms.txt");
    let results = temp.path().join("results");
    let preview_log = temp.path().join("preview.jsonl");
    let applied_log = temp.path().join("applied.jsonl");

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("formlinks");
    cmd.args([
        "repair",
        "--dry-run",
        "--manifest",
        manifest.to_str().unwrap(),
        "--results",
        results.to_str().unwrap(),
        "--base-url",
        &stub.base_url,
        "--change-log",
        preview_log.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("cells_changed=4"))
    .stdout(predicate::str::contains("written=0"));

    assert_eq!(fs::read_to_string(results.join("5000-s2-table-e.htm"))?, EN_TABLE);
    assert_eq!(fs::read_to_string(results.join("5000-s2-table-f.htm"))?, FR_TABLE);
    assert_eq!(backups_in(&results)?, 0);

    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("formlinks");
    cmd.args([
        "repair",
        "--manifest",
        manifest.to_str().unwrap(),
        "--results",
        results.to_str().unwrap(),
        "--base-url",
        &stub.base_url,
        "--change-log",
        applied_log.to_str().unwrap(),
    ])
    .assert()
    .success()
    .stdout(predicate::str::contains("cells_changed=4"));

    let preview = read_change_log(&preview_log)?;
    assert_eq!(preview, read_change_log(&applied_log)?);
    // The fillable link is replaced during validation and then blanked for
    // parity; it must not be counted twice under its original target.
    assert_eq!(
        preview
            .iter()
            .filter(|r| r.year == "2023" && r.language == Language::En && r.column == 2)
            .map(|r| r.action)
            .collect::<Vec<_>>(),
        vec![ChangeAction::Replaced, ChangeAction::ParityBlanked]
    );
    Ok(())
}
