// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use mediarr_domain::{Media, MediaInfo};
use regex::Regex;

use crate::error::CollaboratorError;

/// Read-only view of the file system used by import rules.
pub trait DiskProvider: Send + Sync {
    fn file_size(&self, path: &Path) -> Result<u64, CollaboratorError>;

    /// Regular files directly inside `dir`.
    fn files_in(&self, dir: &Path) -> Result<Vec<PathBuf>, CollaboratorError>;

    fn last_write_time(&self, path: &Path) -> Result<DateTime<Utc>, CollaboratorError>;

    fn is_case_insensitive(&self) -> bool {
        cfg!(any(windows, target_os = "macos"))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsDiskProvider;

impl DiskProvider for FsDiskProvider {
    fn file_size(&self, path: &Path) -> Result<u64, CollaboratorError> {
        std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| CollaboratorError::io(path, e))
    }

    fn files_in(&self, dir: &Path) -> Result<Vec<PathBuf>, CollaboratorError> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(|e| CollaboratorError::io(dir, e))? {
            let entry = entry.map_err(|e| CollaboratorError::io(dir, e))?;
            let file_type = entry.file_type().map_err(|e| CollaboratorError::io(entry.path(), e))?;
            if file_type.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        Ok(files)
    }

    fn last_write_time(&self, path: &Path) -> Result<DateTime<Utc>, CollaboratorError> {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| CollaboratorError::io(path, e))?;
        Ok(DateTime::<Utc>::from(modified))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleResult {
    NotSample,
    Sample,
    Indeterminate,
}

pub trait SampleDetector: Send + Sync {
    fn is_sample(&self, media: &Media, path: &Path) -> Result<SampleResult, CollaboratorError>;
}

pub trait MediaInfoProbe: Send + Sync {
    fn probe(&self, path: &Path) -> Result<Option<MediaInfo>, CollaboratorError>;
}

/// Probe used when no media-info tool is installed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMediaInfo;

impl MediaInfoProbe for NoMediaInfo {
    fn probe(&self, _path: &Path) -> Result<Option<MediaInfo>, CollaboratorError> {
        Ok(None)
    }
}

/// Flags files whose runtime is too short to be the feature.
pub struct RuntimeSampleDetector {
    probe: Arc<dyn MediaInfoProbe>,
    minimum_runtime_seconds: u32,
}

impl RuntimeSampleDetector {
    pub fn new(probe: Arc<dyn MediaInfoProbe>, minimum_runtime_seconds: u32) -> Self {
        Self {
            probe,
            minimum_runtime_seconds,
        }
    }
}

lazy_static! {
    static ref SAMPLE_NAME_REGEX: Regex =
        Regex::new(r"(?i)(?:^|[\W_])sample(?:$|[\W_])").expect("valid sample regex");
}

impl SampleDetector for RuntimeSampleDetector {
    fn is_sample(&self, _media: &Media, path: &Path) -> Result<SampleResult, CollaboratorError> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        // Disc images and stream stubs carry no runtime worth checking.
        if matches!(extension.as_deref(), Some("iso" | "img" | "strm" | "flv")) {
            return Ok(SampleResult::NotSample);
        }

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if SAMPLE_NAME_REGEX.is_match(file_name) {
            return Ok(SampleResult::Sample);
        }

        match self.probe.probe(path)?.and_then(|info| info.run_time_seconds) {
            None | Some(0) => Ok(SampleResult::Indeterminate),
            Some(runtime) if runtime < self.minimum_runtime_seconds => Ok(SampleResult::Sample),
            Some(_) => Ok(SampleResult::NotSample),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mediarr_domain::ProfileId;
    use std::io::Write;

    struct FixedProbe(Option<u32>);

    impl MediaInfoProbe for FixedProbe {
        fn probe(&self, _path: &Path) -> Result<Option<MediaInfo>, CollaboratorError> {
            Ok(Some(MediaInfo {
                audio_stream_count: 1,
                run_time_seconds: self.0,
                ..MediaInfo::default()
            }))
        }
    }

    fn media() -> Media {
        Media::new("Movie", "/library/Movie (2020)", ProfileId(1))
    }

    #[test]
    fn fs_provider_lists_files_and_sizes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_path = dir.path().join("Movie.2020.mkv");
        let mut file = std::fs::File::create(&file_path).expect("create file");
        file.write_all(&[0u8; 128]).expect("write");
        std::fs::create_dir(dir.path().join("Subs")).expect("subdir");

        let disk = FsDiskProvider;
        assert_eq!(disk.file_size(&file_path).unwrap(), 128);
        assert_eq!(disk.files_in(dir.path()).unwrap(), vec![file_path.clone()]);
        assert!(disk.last_write_time(&file_path).unwrap() <= Utc::now());
        assert!(disk.file_size(&dir.path().join("missing.mkv")).is_err());
    }

    #[test]
    fn short_runtime_is_a_sample() {
        let detector = RuntimeSampleDetector::new(Arc::new(FixedProbe(Some(60))), 600);
        let result = detector
            .is_sample(&media(), Path::new("/downloads/Movie.2020.mkv"))
            .unwrap();
        assert_eq!(result, SampleResult::Sample);
    }

    #[test]
    fn unknown_runtime_is_indeterminate() {
        let detector = RuntimeSampleDetector::new(Arc::new(FixedProbe(None)), 600);
        let result = detector
            .is_sample(&media(), Path::new("/downloads/Movie.2020.mkv"))
            .unwrap();
        assert_eq!(result, SampleResult::Indeterminate);
    }

    #[test]
    fn sample_in_name_and_disc_images() {
        let detector = RuntimeSampleDetector::new(Arc::new(FixedProbe(Some(7200))), 600);
        assert_eq!(
            detector
                .is_sample(&media(), Path::new("/downloads/movie-sample.mkv"))
                .unwrap(),
            SampleResult::Sample
        );
        assert_eq!(
            detector
                .is_sample(&media(), Path::new("/downloads/Movie.2020.iso"))
                .unwrap(),
            SampleResult::NotSample
        );
        assert_eq!(
            detector
                .is_sample(&media(), Path::new("/downloads/Movie.2020.mkv"))
                .unwrap(),
            SampleResult::NotSample
        );
    }
}
