use painter_binding::TextureSetTask;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const DEFAULT_SAVE_DELAY_SECS: f64 = 3.0;
pub const DEFAULT_REOPEN_DELAY_SECS: f64 = 1.5;

#[derive(Debug, thiserror::Error)]
pub enum JobFileError {
    #[error("read job file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid job file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("exportFolder missing in job file")]
    MissingExportFolder,
    #[error("{0} missing in job file")]
    MissingField(&'static str),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawJob {
    painter_exe_path: Option<String>,
    output_project_path: Option<String>,
    export_folder: Option<String>,
    mesh_path: Option<String>,
    save_delay_sec: Option<Value>,
    reopen_delay_sec: Option<Value>,
    texture_sets: Option<Value>,
}

/// Validated job description.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDescription {
    pub source: PathBuf,
    pub painter_exe_path: Option<PathBuf>,
    pub output_project_path: String,
    pub export_folder: PathBuf,
    pub mesh_path: String,
    pub save_delay_secs: f64,
    pub reopen_delay_secs: f64,
    pub tasks: Vec<TextureSetTask>,
    pub warnings: Vec<String>,
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().trim_matches('"').trim().to_string())
        .filter(|v| !v.is_empty())
}

pub fn load_job_file(path: &Path) -> Result<JobDescription, JobFileError> {
    let bytes = fs::read(path).map_err(|source| JobFileError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_job(path, &bytes)
}

/// Parses job JSON. A UTF-8 byte order mark is accepted.
pub fn parse_job(path: &Path, bytes: &[u8]) -> Result<JobDescription, JobFileError> {
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
    let raw: RawJob = serde_json::from_slice(bytes).map_err(|source| JobFileError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let export_folder = clean(raw.export_folder).ok_or(JobFileError::MissingExportFolder)?;
    let output_project_path =
        clean(raw.output_project_path).ok_or(JobFileError::MissingField("outputProjectPath"))?;
    let mesh_path = clean(raw.mesh_path).ok_or(JobFileError::MissingField("meshPath"))?;

    let mut warnings = Vec::new();
    let save_delay_secs = delay_secs(
        "saveDelaySec",
        raw.save_delay_sec.as_ref(),
        DEFAULT_SAVE_DELAY_SECS,
        &mut warnings,
    );
    let reopen_delay_secs = delay_secs(
        "reopenDelaySec",
        raw.reopen_delay_sec.as_ref(),
        DEFAULT_REOPEN_DELAY_SECS,
        &mut warnings,
    );
    let tasks = extract_tasks(raw.texture_sets.as_ref(), &mut warnings);
    for warning in &warnings {
        warn!(job = %path.display(), "{warning}");
    }

    Ok(JobDescription {
        source: path.to_path_buf(),
        painter_exe_path: clean(raw.painter_exe_path).map(PathBuf::from),
        output_project_path,
        export_folder: PathBuf::from(export_folder),
        mesh_path,
        save_delay_secs,
        reopen_delay_secs,
        tasks,
        warnings,
    })
}

/// Delays may be numbers or numeric strings. Anything else falls back to the
/// default with a warning.
fn delay_secs(
    name: &str,
    value: Option<&Value>,
    default: f64,
    warnings: &mut Vec<String>,
) -> f64 {
    let parsed = match value {
        None | Some(Value::Null) => return default,
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse::<f64>().ok(),
        Some(_) => None,
    };
    match parsed.filter(|secs| secs.is_finite()) {
        Some(secs) => secs,
        None => {
            warnings.push(format!("{name} is not a number, using {default}"));
            default
        }
    }
}

fn text_field(entry: &Value, name: &str) -> Option<String> {
    clean(entry.get(name).and_then(Value::as_str).map(str::to_string))
}

/// Malformed entries are skipped rather than rejected.
fn extract_tasks(texture_sets: Option<&Value>, warnings: &mut Vec<String>) -> Vec<TextureSetTask> {
    let Some(sets) = texture_sets.and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut tasks: Vec<TextureSetTask> = Vec::new();
    for set in sets {
        let Some(name) = text_field(set, "name") else {
            continue;
        };
        let mut task = TextureSetTask::new(name.clone());
        for entry in set
            .get("textures")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
        {
            let Some(key) = text_field(entry, "key") else {
                continue;
            };
            let Some(path) = text_field(entry, "value").or_else(|| text_field(entry, "path"))
            else {
                continue;
            };
            if task.bind(key.clone(), path) {
                warnings.push(format!(
                    "texture set {name}: duplicate key {key}, last path wins"
                ));
            }
        }
        if task.is_empty() {
            continue;
        }
        if tasks.iter().any(|t| t.name == task.name) {
            warnings.push(format!("duplicate texture set {name} ignored"));
            continue;
        }
        tasks.push(task);
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<JobDescription, JobFileError> {
        parse_job(Path::new("job.json"), json.as_bytes())
    }

    #[test]
    fn parses_full_job_with_bom() {
        let json = r#"{
            "painterExePath": " C:/Painter/Painter.exe ",
            "outputProjectPath": "D:/out/model.spp",
            "exportFolder": "D:/out/export",
            "meshPath": "D:/out/mesh.fbx",
            "saveDelaySec": 1.0,
            "unknownKey": 5,
            "textureSets": [
                { "name": "Body", "textures": [
                    { "key": "BaseColor", "path": "D:/t/a.png" },
                    { "key": "Normal", "value": "D:/t/n.png" }
                ] }
            ]
        }"#;
        let mut bytes = b"\xEF\xBB\xBF".to_vec();
        bytes.extend_from_slice(json.as_bytes());
        let job = parse_job(Path::new("job.json"), &bytes).expect("job");

        assert_eq!(
            job.painter_exe_path,
            Some(PathBuf::from("C:/Painter/Painter.exe"))
        );
        assert_eq!(job.save_delay_secs, 1.0);
        assert_eq!(job.reopen_delay_secs, DEFAULT_REOPEN_DELAY_SECS);
        assert_eq!(job.tasks.len(), 1);
        assert_eq!(job.tasks[0].keys(), vec!["BaseColor", "Normal"]);
        assert_eq!(job.tasks[0].bindings[1].path, "D:/t/n.png");
    }

    #[test]
    fn export_folder_is_required() {
        let err = parse(r#"{ "outputProjectPath": "a.spp", "meshPath": "m.fbx" }"#)
            .expect_err("missing export");
        assert!(matches!(err, JobFileError::MissingExportFolder));
        let err = parse(r#"{ "exportFolder": " ", "meshPath": "m.fbx" }"#).expect_err("blank");
        assert!(matches!(err, JobFileError::MissingExportFolder));
    }

    #[test]
    fn mesh_and_output_are_required() {
        let err = parse(r#"{ "exportFolder": "e", "meshPath": "m.fbx" }"#).expect_err("output");
        assert!(matches!(err, JobFileError::MissingField("outputProjectPath")));
        let err = parse(r#"{ "exportFolder": "e", "outputProjectPath": "o.spp" }"#)
            .expect_err("mesh");
        assert!(matches!(err, JobFileError::MissingField("meshPath")));
    }

    #[test]
    fn malformed_and_duplicate_entries_are_dropped() {
        let job = parse(
            r#"{
            "exportFolder": "e", "outputProjectPath": "o.spp", "meshPath": "m.fbx",
            "textureSets": [
                { "name": "", "textures": [ { "key": "A", "path": "a.png" } ] },
                { "name": "Empty", "textures": [] },
                { "name": "Body", "textures": [
                    { "key": "BaseColor", "path": "a.png" },
                    { "key": "", "path": "x.png" },
                    { "key": "Normal" },
                    "not an object",
                    { "key": "BaseColor", "path": "b.png" }
                ] },
                { "name": "Body", "textures": [ { "key": "AO", "path": "ao.png" } ] }
            ]
        }"#,
        )
        .expect("job");

        assert_eq!(job.tasks.len(), 1);
        assert_eq!(job.tasks[0].keys(), vec!["BaseColor"]);
        assert_eq!(job.tasks[0].bindings[0].path, "b.png");
        assert_eq!(job.warnings.len(), 2);
        assert!(job.painter_exe_path.is_none());
    }

    #[test]
    fn value_wins_over_path_and_delays_accept_numeric_strings() {
        let job = parse(
            r#"{
            "exportFolder": "e", "outputProjectPath": "o.spp", "meshPath": "m.fbx",
            "saveDelaySec": " 0.5 ",
            "reopenDelaySec": "soon",
            "textureSets": [
                { "name": "Body", "textures": [
                    { "key": "BaseColor", "path": "old.png", "value": "new.png" }
                ] }
            ]
        }"#,
        )
        .expect("job");

        assert_eq!(job.tasks[0].bindings[0].path, "new.png");
        assert_eq!(job.save_delay_secs, 0.5);
        assert_eq!(job.reopen_delay_secs, DEFAULT_REOPEN_DELAY_SECS);
        assert_eq!(job.warnings.len(), 1);
        assert!(job.warnings[0].contains("reopenDelaySec"));
    }

    #[test]
    fn invalid_json_is_a_parse_error() {
        assert!(matches!(parse("{"), Err(JobFileError::Parse { .. })));
    }
}
