use std::fs;
use std::path::{Path, PathBuf};

use time::OffsetDateTime;

pub const VERSIONS_DIR_NAME: &str = ".versions";
pub const INDEX_FILE_NAME: &str = "index.json";
pub const DEFAULT_ARTIFACT_EXTENSION: &str = "ino";

/// Sibling versions directory for an artifact.
#[must_use]
pub fn versions_dir(artifact_path: &Path) -> PathBuf {
    artifact_path
        .parent()
        .unwrap_or_else(|| Path::new("."))
        .join(VERSIONS_DIR_NAME)
}

#[must_use]
pub fn index_path(versions_dir: &Path) -> PathBuf {
    versions_dir.join(INDEX_FILE_NAME)
}

/// Extension snapshots inherit from the artifact they copy.
#[must_use]
pub fn artifact_extension(artifact_path: &Path) -> String {
    artifact_path
        .extension()
        .and_then(|extension| extension.to_str())
        .filter(|extension| !extension.is_empty())
        .unwrap_or(DEFAULT_ARTIFACT_EXTENSION)
        .to_string()
}

/// UTC timestamp with `:` and `.` replaced so it is filename-safe and sorts
/// lexicographically in creation order.
#[must_use]
pub fn snapshot_stamp(now: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02}T{:02}-{:02}-{:02}-{:03}Z",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second(),
        now.millisecond()
    )
}

#[must_use]
pub fn snapshot_file_name(stamp: &str, extension: &str) -> String {
    format!("{stamp}.{extension}")
}

/// Resolves the primary artifact of a project directory: `<dir>/<dirname>.ino`,
/// else the lexicographically first `.ino` file in the directory.
#[must_use]
pub fn main_artifact_path(project_dir: &Path) -> Option<PathBuf> {
    let project_name = project_dir.file_name()?.to_str()?;
    let conventional =
        project_dir.join(format!("{project_name}.{DEFAULT_ARTIFACT_EXTENSION}"));
    if conventional.is_file() {
        return Some(conventional);
    }

    let entries = match fs::read_dir(project_dir) {
        Ok(entries) => entries,
        Err(error) => {
            tracing::warn!(
                project = %project_dir.display(),
                %error,
                "cannot scan project for artifact"
            );
            return None;
        }
    };

    let mut candidates: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path.extension().and_then(|extension| extension.to_str())
                    == Some(DEFAULT_ARTIFACT_EXTENSION)
        })
        .collect();
    candidates.sort();

    let fallback = candidates.into_iter().next();
    match &fallback {
        Some(path) => tracing::warn!(
            project = %project_dir.display(),
            artifact = %path.display(),
            "conventional artifact missing, using first match"
        ),
        None => tracing::warn!(project = %project_dir.display(), "no artifact found in project"),
    }
    fallback
}

#[cfg(test)]
mod tests {
    use time::{Date, Month};

    use super::*;

    #[test]
    fn snapshot_stamp_is_filename_safe_and_zero_padded() {
        let now = Date::from_calendar_date(2026, Month::March, 4)
            .and_then(|date| date.with_hms_milli(5, 6, 7, 89))
            .expect("valid test timestamp")
            .assume_utc();
        let stamp = snapshot_stamp(now);
        assert_eq!(stamp, "2026-03-04T05-06-07-089Z");
        assert!(!stamp.contains(':'));
        assert!(!stamp.contains('.'));
    }

    #[test]
    fn snapshot_file_name_appends_extension() {
        assert_eq!(
            snapshot_file_name("2026-03-04T05-06-07-089Z", "ino"),
            "2026-03-04T05-06-07-089Z.ino"
        );
    }

    #[test]
    fn versions_dir_is_sibling_of_artifact() {
        assert_eq!(
            versions_dir(Path::new("/work/blink/blink.ino")),
            PathBuf::from("/work/blink/.versions")
        );
        assert_eq!(
            index_path(Path::new("/work/blink/.versions")),
            PathBuf::from("/work/blink/.versions/index.json")
        );
    }

    #[test]
    fn artifact_extension_defaults_when_missing() {
        assert_eq!(artifact_extension(Path::new("/work/blink/blink.ino")), "ino");
        assert_eq!(artifact_extension(Path::new("/work/notes/main.cpp")), "cpp");
        assert_eq!(artifact_extension(Path::new("/work/blink/Makefile")), "ino");
    }
}
