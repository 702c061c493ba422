//! Common test utilities
//!
//! Shared by the integration tests: a test configuration rooted in a temp
//! directory, executable shell stubs standing in for yt-dlp/ffmpeg, and
//! helpers for inspecting the download directory.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::time::Duration;

use reelpipe::core::config::TranscodeTimeouts;
use reelpipe::PipelineConfig;

/// Scratch space for one test: tool stubs and the download root live apart
pub struct TestDirs {
    _root: tempfile::TempDir,
    pub tools: PathBuf,
    pub downloads: PathBuf,
}

impl TestDirs {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        let tools = root.path().join("tools");
        let downloads = root.path().join("downloads");
        std::fs::create_dir_all(&tools).unwrap();
        std::fs::create_dir_all(&downloads).unwrap();
        Self {
            _root: root,
            tools,
            downloads,
        }
    }

    /// Config pointing at the download root, missing tools, and short timeouts
    pub fn config(&self) -> PipelineConfig {
        let mut config = PipelineConfig::with_download_dir(&self.downloads);
        config.ytdlp_bin = "/nonexistent/yt-dlp".to_string();
        config.ffmpeg_bin = "/nonexistent/ffmpeg".to_string();
        config.ffprobe_bin = "/nonexistent/ffprobe".to_string();
        config.timeouts = TranscodeTimeouts {
            base: Duration::from_secs(20),
            per_media_second: 0.0,
            max: Duration::from_secs(30),
        };
        config
    }

    /// Names of everything in the download root, sorted
    pub fn download_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.downloads)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    /// Writes an executable `#!/bin/sh` script into the tools dir.
    #[cfg(unix)]
    pub fn stub(&self, name: &str, body: &str) -> String {
        write_stub(&self.tools.join(name), body)
    }

    pub fn tool_file(&self, name: &str) -> PathBuf {
        self.tools.join(name)
    }
}

#[cfg(unix)]
pub fn write_stub(path: &Path, body: &str) -> String {
    use std::io::Write;
    use std::os::unix::fs::PermissionsExt;

    {
        let mut file = std::fs::File::create(path).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.sync_all().unwrap();
    }
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().to_string()
}

/// ffmpeg stand-in: records its arguments and copies the input to the output.
pub fn copying_ffmpeg(args_log: &Path) -> String {
    format!(
        r#"
echo "$@" > "{log}"
prev=""; input=""; out=""
for arg in "$@"; do
  if [ "$prev" = "-i" ]; then input="$arg"; fi
  prev="$arg"; out="$arg"
done
cp "$input" "$out"
"#,
        log = args_log.display()
    )
}

/// ffmpeg stand-in that writes a partial output, then fails
pub const FAILING_FFMPEG: &str = r#"
for arg in "$@"; do out="$arg"; done
printf 'partial' > "$out"
echo "Error while decoding stream #0:0: Invalid data found when processing input" >&2
exit 1
"#;

/// ffmpeg stand-in that writes a partial output, then hangs
pub const HANGING_FFMPEG: &str = r#"
for arg in "$@"; do out="$arg"; done
printf 'partial' > "$out"
exec sleep 30
"#;
