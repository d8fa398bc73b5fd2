use std::path::PathBuf;
use std::sync::OnceLock;

use url::Url;

/// How often `on_progress` fires while downloading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStep {
    /// Every time this many bytes have accumulated since the last
    /// notification
    Bytes(u64),
    /// Every time the integer percentage crosses a multiple of this step
    Percent(u8),
}

impl Default for ProgressStep {
    fn default() -> Self {
        // notify every 4 KiB unless configured otherwise
        ProgressStep::Bytes(4096)
    }
}

/// Identifies one download. Immutable once a task has been created from
/// it; the resolved save path is the task identity.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub url: Url,
    pub save_dir: PathBuf,
    pub file_name: Option<String>,
    pub progress_step: ProgressStep,
    derived_name: OnceLock<String>,
}

impl DownloadConfig {
    pub fn new(url: Url, save_dir: impl Into<PathBuf>) -> Self {
        Self {
            url,
            save_dir: save_dir.into(),
            file_name: None,
            progress_step: ProgressStep::default(),
            derived_name: OnceLock::new(),
        }
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn with_progress_step(mut self, progress_step: ProgressStep) -> Self {
        self.progress_step = progress_step;
        self
    }

    /// Explicit name if set, otherwise the last path segment of the url.
    /// Derived once, cached after first access.
    pub fn file_name(&self) -> &str {
        if let Some(name) = &self.file_name {
            return name;
        }
        self.derived_name.get_or_init(|| {
            self.url
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .unwrap_or("download")
                .to_string()
        })
    }

    pub fn save_path(&self) -> PathBuf {
        self.save_dir.join(self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_derives_from_url() {
        let config = DownloadConfig::new(
            Url::parse("http://clips.vorwaerts-gmbh.de/big_buck_bunny.mp4").unwrap(),
            "/tmp/downloads",
        );
        assert_eq!(config.file_name(), "big_buck_bunny.mp4");
        assert_eq!(
            config.save_path(),
            PathBuf::from("/tmp/downloads/big_buck_bunny.mp4")
        );
    }

    #[test]
    fn explicit_file_name_wins() {
        let config = DownloadConfig::new(Url::parse("http://x/file.bin").unwrap(), "/tmp")
            .with_file_name("renamed.bin");
        assert_eq!(config.file_name(), "renamed.bin");
        assert_eq!(config.save_path(), PathBuf::from("/tmp/renamed.bin"));
    }

    #[test]
    fn url_without_segments_falls_back() {
        let config = DownloadConfig::new(Url::parse("http://example.com/").unwrap(), "/tmp");
        assert_eq!(config.file_name(), "download");
    }
}
