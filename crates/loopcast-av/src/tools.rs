//! External tool detection.

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Encoder binary name.
pub const FFMPEG: &str = "ffmpeg";

/// Resolver binary name.
pub const YT_DLP: &str = "yt-dlp";

/// Information about an external tool.
#[derive(Debug, Clone)]
pub struct ToolInfo {
    /// Name of the tool.
    pub name: String,
    /// Whether the tool is available.
    pub available: bool,
    /// First line of the version output, if available.
    pub version: Option<String>,
    /// Path to the tool executable.
    pub path: Option<PathBuf>,
}

/// Check if a tool is available and get its information.
///
/// # Example
///
/// ```no_run
/// use loopcast_av::check_tool;
///
/// let info = check_tool("yt-dlp");
/// if info.available {
///     println!("yt-dlp version: {:?}", info.version);
/// }
/// ```
pub fn check_tool(name: &str) -> ToolInfo {
    check_tool_with_arg(name, "--version")
}

/// Check if a tool is available using a custom version argument.
pub fn check_tool_with_arg(name: &str, version_arg: &str) -> ToolInfo {
    check_tool_at(name, None, version_arg)
}

/// Check a tool, running the configured binary when one is given and exists.
pub fn check_tool_at(name: &str, configured: Option<&Path>, version_arg: &str) -> ToolInfo {
    let missing = || ToolInfo {
        name: name.to_string(),
        available: false,
        version: None,
        path: None,
    };

    let Ok(path) = get_tool_path(name, configured) else {
        return missing();
    };

    match Command::new(&path).arg(version_arg).output() {
        Ok(output) if output.status.success() => {
            let version = String::from_utf8_lossy(&output.stdout)
                .lines()
                .next()
                .map(|s| s.to_string());

            ToolInfo {
                name: name.to_string(),
                available: true,
                version,
                path: Some(path),
            }
        }
        _ => missing(),
    }
}

/// Check the encoder and resolver binaries on `PATH`.
pub fn check_tools() -> Vec<ToolInfo> {
    check_configured_tools(None, None)
}

/// Check the encoder and resolver, preferring explicitly configured binaries.
pub fn check_configured_tools(ffmpeg: Option<&Path>, yt_dlp: Option<&Path>) -> Vec<ToolInfo> {
    vec![
        check_tool_at(FFMPEG, ffmpeg, "-version"),
        check_tool_at(YT_DLP, yt_dlp, "--version"),
    ]
}

/// Get the path to a tool, preferring a configured path over PATH lookup.
///
/// # Errors
///
/// Returns [`Error::ToolNotFound`] if neither the configured path nor `PATH`
/// has the tool.
pub fn get_tool_path(name: &str, config_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = config_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }

        #[cfg(feature = "tracing")]
        tracing::warn!(
            "Configured {} not found at {}, falling back to PATH",
            name,
            path.display()
        );
    }

    which::which(name).map_err(|_| Error::tool_not_found(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tool_not_found() {
        let info = check_tool("nonexistent_tool_12345");
        assert!(!info.available);
        assert!(info.version.is_none());
        assert!(info.path.is_none());
    }

    #[test]
    fn test_get_tool_path_prefers_existing_config_path() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("ffmpeg-custom");
        std::fs::write(&fake, b"").unwrap();

        let path = get_tool_path("nonexistent_tool_12345", Some(&fake)).unwrap();
        assert_eq!(path, fake);
    }

    #[test]
    fn test_configured_tool_missing_is_unavailable() {
        let info = check_tool_at(
            "nonexistent_tool_12345",
            Some(Path::new("/no/such/bin")),
            "--version",
        );
        assert!(!info.available);
        assert!(info.path.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_configured_tool_is_checked_instead_of_path() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("ffmpeg-custom");
        std::fs::write(&fake, "#!/bin/sh\necho 'ffmpeg version 7.0-custom'\n").unwrap();
        std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();

        let tools = check_configured_tools(Some(&fake), Some(Path::new("/no/such/yt-dlp")));
        assert_eq!(tools[0].name, FFMPEG);
        assert!(tools[0].available);
        assert_eq!(tools[0].version.as_deref(), Some("ffmpeg version 7.0-custom"));
        assert_eq!(tools[0].path.as_deref(), Some(fake.as_path()));
        assert_eq!(tools[1].name, YT_DLP);
    }

    #[test]
    fn test_get_tool_path_missing_everywhere() {
        let err = get_tool_path("nonexistent_tool_12345", Some(Path::new("/no/such/bin")))
            .unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }
}
