//! Session management for organized artifact handling.
//!
//! Provides centralized management of playback sessions with:
//! - Unique session directories under a global base location
//! - Automatic cleanup unless explicitly preserved
//! - Screenshot artifact paths and JSON sidecars
//! - Session metadata tracking

use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::config;
use crate::recording::StepAction;
use crate::report::PlaybackResult;

/// A playback session with organized file management
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session ID
    pub id: String,
    /// Root directory for this session
    pub dir: PathBuf,
    /// Whether to keep files after the session ends
    pub keep: bool,
    /// Locale this session was played in (if applicable)
    pub locale: Option<String>,
}

impl Session {
    /// Create a new session with a unique ID
    pub fn new() -> Self {
        let id = generate_session_id();
        let dir = PathBuf::from(config::session_base_dir()).join(&id);

        Self {
            id,
            dir,
            keep: false,
            locale: None,
        }
    }

    /// Create a session named after a recording
    pub fn for_recording(recording_id: &str) -> Self {
        let timestamp = generate_timestamp_suffix();
        let id = format!("{}_{}", sanitize_name(recording_id), timestamp);
        let dir = PathBuf::from(config::session_base_dir()).join(&id);

        Self {
            id,
            dir,
            keep: false,
            locale: None,
        }
    }

    /// Create a session in a specific directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(generate_session_id);

        Self {
            id,
            dir,
            keep: true, // User-specified directories are kept by default
            locale: None,
        }
    }

    /// Set whether to keep files after the session ends
    pub fn keep(mut self, keep: bool) -> Self {
        self.keep = keep;
        self
    }

    /// Set the locale for this session
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Initialize the session directory
    pub fn init(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        // Write session metadata
        let metadata = serde_json::json!({
            "id": self.id,
            "created": chrono::Utc::now().to_rfc3339(),
            "locale": self.locale,
        });

        let metadata_path = self.dir.join(".session.json");
        fs::write(metadata_path, serde_json::to_string_pretty(&metadata)?)?;

        Ok(())
    }

    /// Get the artifact path for a step capture
    pub fn step_artifact_path(&self, step_index: usize, action: StepAction) -> PathBuf {
        self.dir
            .join(format!("step_{:02}_{}.png", step_index, action.as_str()))
    }

    /// Save screenshot bytes for a step and write a JSON sidecar.
    ///
    /// The sidecar records the capture source and, when the bytes decode as
    /// an image, the pixel dimensions.
    pub fn save_step_artifact(
        &self,
        step_index: usize,
        action: StepAction,
        source: &str,
        bytes: &[u8],
    ) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.step_artifact_path(step_index, action);
        fs::write(&path, bytes)?;

        let dimensions = image::load_from_memory(bytes).ok().map(|img| {
            let rgb = img.to_rgb8();
            (rgb.width(), rgb.height())
        });

        let mut metadata = serde_json::Map::new();
        metadata.insert("step".to_string(), serde_json::Value::from(step_index));
        metadata.insert(
            "action".to_string(),
            serde_json::Value::String(action.as_str().to_string()),
        );
        metadata.insert(
            "source".to_string(),
            serde_json::Value::String(source.to_string()),
        );
        metadata.insert(
            "timestamp".to_string(),
            serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
        );
        if let Some((width, height)) = dimensions {
            metadata.insert("width".to_string(), serde_json::Value::from(width));
            metadata.insert("height".to_string(), serde_json::Value::from(height));
        }

        let sidecar_path = path.with_extension("json");
        fs::write(
            sidecar_path,
            serde_json::to_string_pretty(&serde_json::Value::Object(metadata))?,
        )?;

        debug!(path = %path.display(), "artifact saved");
        Ok(path)
    }

    /// Write the run result manifest into the session directory
    pub fn write_result(&self, result: &PlaybackResult) -> std::io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join("result.json");
        fs::write(&path, serde_json::to_string_pretty(result)?)?;
        Ok(path)
    }

    /// List all PNG artifacts in the session
    pub fn list_artifacts(&self) -> std::io::Result<Vec<PathBuf>> {
        let mut artifacts = Vec::new();
        if self.dir.exists() {
            for entry in fs::read_dir(&self.dir)? {
                let entry = entry?;
                let path = entry.path();
                if path.extension().map(|e| e == "png").unwrap_or(false) {
                    artifacts.push(path);
                }
            }
        }
        artifacts.sort();
        Ok(artifacts)
    }

    /// Clean up the session directory
    pub fn cleanup(&self) -> std::io::Result<()> {
        if self.dir.exists() && !self.keep {
            fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.keep {
            let _ = fs::remove_dir_all(&self.dir);
        }
    }
}

/// Generate a unique session ID
fn generate_session_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let pid = std::process::id();
    format!("session_{}_{}", timestamp, pid)
}

/// Generate a timestamp suffix
fn generate_timestamp_suffix() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Sanitize a name for use in filenames
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            ' ' | '+' | '/' | '\\' => '_',
            _ => '_',
        })
        .collect()
}

/// Clean up old sessions older than the specified duration
pub fn cleanup_old_sessions(max_age: std::time::Duration) -> std::io::Result<usize> {
    let base = PathBuf::from(config::session_base_dir());
    if !base.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let mut cleaned = 0;

    for entry in fs::read_dir(&base)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            if let Ok(metadata) = entry.metadata() {
                if let Ok(modified) = metadata.modified() {
                    if let Ok(age) = now.duration_since(modified) {
                        if age > max_age && fs::remove_dir_all(&path).is_ok() {
                            cleaned += 1;
                        }
                    }
                }
            }
        }
    }

    Ok(cleaned)
}

/// List all existing sessions
pub fn list_sessions() -> std::io::Result<Vec<PathBuf>> {
    let base = PathBuf::from(config::session_base_dir());
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in fs::read_dir(&base)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            sessions.push(path);
        }
    }
    sessions.sort();
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_session_new() {
        let session = Session::new();
        assert!(session.id.starts_with("session_"));
        assert!(!session.keep);
    }

    #[test]
    fn test_session_for_recording() {
        let session = Session::for_recording("checkout flow");
        assert!(session.id.starts_with("checkout_flow_"));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("hello world"), "hello_world");
        assert_eq!(sanitize_name("en-US"), "en-US");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
    }

    #[test]
    fn test_step_artifact_path() {
        let session = Session::new();
        assert!(
            session
                .step_artifact_path(3, StepAction::Tap)
                .ends_with("step_03_tap.png")
        );
        assert!(
            session
                .step_artifact_path(12, StepAction::Swipe)
                .ends_with("step_12_swipe.png")
        );
    }

    #[test]
    fn test_save_artifact_writes_sidecar() {
        let dir = tempdir().unwrap();
        let session = Session::in_dir(dir.path().join("run"));

        let path = session
            .save_step_artifact(0, StepAction::Tap, "mock", &[1, 2, 3])
            .unwrap();
        assert!(path.exists());

        let sidecar = path.with_extension("json");
        assert!(sidecar.exists());
        let metadata: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(sidecar).unwrap()).unwrap();
        assert_eq!(metadata["step"], 0);
        assert_eq!(metadata["source"], "mock");
        // Not a decodable image, so no dimensions recorded
        assert!(metadata.get("width").is_none());
    }

    #[test]
    fn test_list_artifacts_sorted() {
        let dir = tempdir().unwrap();
        let session = Session::in_dir(dir.path().join("run"));
        session
            .save_step_artifact(2, StepAction::Tap, "mock", &[0])
            .unwrap();
        session
            .save_step_artifact(0, StepAction::Wait, "mock", &[0])
            .unwrap();

        let artifacts = session.list_artifacts().unwrap();
        assert_eq!(artifacts.len(), 2);
        assert!(artifacts[0].ends_with("step_00_wait.png"));
        assert!(artifacts[1].ends_with("step_02_tap.png"));
    }
}
