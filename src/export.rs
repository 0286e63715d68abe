use crate::records::{ExportRow, StudentRecord};
use crate::store::Store;
use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const CSV_HEADER: &str = "roll_number,name,subject,grade";

const MANIFEST_ENTRY: &str = "manifest.json";
const CSV_ENTRY: &str = "students.csv";
const JSON_ENTRY: &str = "students.json";
pub const BUNDLE_FORMAT_V1: &str = "rollbook-export-v1";

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// One header line plus one line per row; absent subject/grade become empty fields.
pub fn to_csv(rows: &[ExportRow]) -> String {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for row in rows {
        csv.push_str(&format!(
            "{},{},{},{}\n",
            csv_quote(&row.roll_number),
            csv_quote(&row.name),
            csv_quote(row.subject.as_deref().unwrap_or("")),
            row.grade.map(|g| g.to_string()).unwrap_or_default()
        ));
    }
    csv
}

/// Folds flat export rows (ordered by roll number) back into per-student records.
pub fn group_rows(rows: &[ExportRow]) -> Vec<StudentRecord> {
    let mut out: Vec<StudentRecord> = Vec::new();
    for row in rows {
        let same_student = out
            .last()
            .map(|r| r.roll_number == row.roll_number)
            .unwrap_or(false);
        if !same_student {
            out.push(StudentRecord {
                name: row.name.clone(),
                roll_number: row.roll_number.clone(),
                grades: BTreeMap::new(),
            });
        }
        if let (Some(subject), Some(grade), Some(record)) =
            (row.subject.as_ref(), row.grade, out.last_mut())
        {
            record.grades.insert(subject.clone(), grade);
        }
    }
    out
}

pub fn to_json(records: &[StudentRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryDigest {
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleManifest {
    pub format: String,
    pub app_version: String,
    pub exported_at: String,
    pub students: usize,
    pub rows: usize,
    pub entries: BTreeMap<String, EntryDigest>,
}

#[derive(Debug, Clone)]
pub struct BundleSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub students: usize,
    pub rows: usize,
}

fn digest(data: &[u8]) -> EntryDigest {
    EntryDigest {
        sha256: format!("{:x}", Sha256::digest(data)),
        bytes: data.len() as u64,
    }
}

/// Writes a zip holding the CSV and JSON exports plus a manifest with their digests.
pub fn write_bundle(store: &Store, out_path: &Path) -> anyhow::Result<BundleSummary> {
    let rows = store.export_all().context("failed to read export rows")?;
    let records = group_rows(&rows);
    let csv = to_csv(&rows);
    let json = to_json(&records).context("failed to serialize students")?;

    let mut entries = BTreeMap::new();
    entries.insert(CSV_ENTRY.to_string(), digest(csv.as_bytes()));
    entries.insert(JSON_ENTRY.to_string(), digest(json.as_bytes()));
    let manifest = BundleManifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        students: records.len(),
        rows: rows.len(),
        entries,
    };

    if let Some(parent) = out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(MANIFEST_ENTRY, opts)
        .context("failed to start manifest entry")?;
    zip.write_all(
        serde_json::to_string_pretty(&manifest)
            .context("failed to serialize manifest")?
            .as_bytes(),
    )
    .context("failed to write manifest entry")?;

    zip.start_file(CSV_ENTRY, opts)
        .context("failed to start csv entry")?;
    zip.write_all(csv.as_bytes())
        .context("failed to write csv entry")?;

    zip.start_file(JSON_ENTRY, opts)
        .context("failed to start json entry")?;
    zip.write_all(json.as_bytes())
        .context("failed to write json entry")?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(BundleSummary {
        bundle_format: BUNDLE_FORMAT_V1.to_string(),
        entry_count: 3,
        students: manifest.students,
        rows: manifest.rows,
    })
}

/// Opens a bundle, checks its format, and verifies every listed entry digest.
pub fn read_bundle_manifest(in_path: &Path) -> anyhow::Result<BundleManifest> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: BundleManifest =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        return Err(anyhow!("unsupported bundle format: {}", manifest.format));
    }

    for (name, expected) in &manifest.entries {
        let mut data = Vec::new();
        archive
            .by_name(name)
            .with_context(|| format!("bundle missing {}", name))?
            .read_to_end(&mut data)
            .with_context(|| format!("failed to read {}", name))?;
        if &digest(&data) != expected {
            return Err(anyhow!("checksum mismatch for {}", name));
        }
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(roll: &str, name: &str, subject: Option<&str>, grade: Option<i64>) -> ExportRow {
        ExportRow {
            roll_number: roll.into(),
            name: name.into(),
            subject: subject.map(|s| s.to_string()),
            grade,
        }
    }

    #[test]
    fn csv_quotes_only_when_needed() {
        let csv = to_csv(&[
            row("R1", "Lovelace, Ada", Some("Math"), Some(90)),
            row("R2", "Bob \"B\"", None, None),
            row("R3", "Cy", Some("Art"), Some(0)),
        ]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "roll_number,name,subject,grade");
        assert_eq!(lines[1], "R1,\"Lovelace, Ada\",Math,90");
        assert_eq!(lines[2], "R2,\"Bob \"\"B\"\"\",,");
        assert_eq!(lines[3], "R3,Cy,Art,0");
        assert_eq!(lines.len(), 4);
    }

    #[test]
    fn group_rows_keeps_students_without_grades() {
        let grouped = group_rows(&[
            row("R1", "Alice", Some("Math"), Some(70)),
            row("R1", "Alice", Some("Science"), Some(80)),
            row("R2", "Bob", None, None),
        ]);
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].grades.get("Science"), Some(&80));
        assert_eq!(grouped[0].grades.len(), 2);
        assert_eq!(grouped[1].roll_number, "R2");
        assert!(grouped[1].grades.is_empty());
    }

    #[test]
    fn json_uses_snake_case_keys() {
        let json = to_json(&group_rows(&[row("R1", "Alice", Some("Math"), Some(70))]))
            .expect("json");
        let value: serde_json::Value = serde_json::from_str(&json).expect("parse");
        assert_eq!(value[0]["roll_number"], "R1");
        assert_eq!(value[0]["name"], "Alice");
        assert_eq!(value[0]["grades"]["Math"], 70);
        assert!(json.contains('\n'), "expected pretty-printed output");
    }
}
