// SPDX-License-Identifier: GPL-3.0-or-later
//! Heuristics for files that are one piece of a release split across discs or parts.
//! The library stores a single file per media, so fragments are rejected.

use std::path::Path;
use std::sync::Arc;

use lazy_static::lazy_static;
use mediarr_domain::{Decision, LocalCandidate, RejectionKind, SearchContext};
use regex::Regex;

use super::{collaborator_unavailable, Priority, Rule};
use crate::disk::DiskProvider;

lazy_static! {
    static ref DISC_FOLDER_REGEX: Regex =
        Regex::new(r"(?i)^(?:cd|dvd|dis[ck])[ _.-]*(?:[0-9]+|[a-d])$").expect("valid disc folder regex");
    static ref PART_IDENTIFIER_REGEX: Regex = Regex::new(
        r"(?i)[ _.-]+(?:cd|dvd|p(?:ar)?t|dis[ck])[ _.-]*(?:[0-9]{1,2}|[a-d])\b"
    )
    .expect("valid part identifier regex");
}

fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|stem| stem.to_str())
}

/// The stem with its part identifier removed, when it carries one.
pub fn strip_part_identifier(stem: &str) -> Option<String> {
    let found = PART_IDENTIFIER_REGEX.find(stem)?;
    if found.start() == 0 {
        return None;
    }
    let mut stripped = String::with_capacity(stem.len());
    stripped.push_str(&stem[..found.start()]);
    stripped.push_str(&stem[found.end()..]);
    Some(stripped.to_lowercase())
}

/// Rejects files sitting in a `CD1` / `Disc 2` style folder.
pub struct NotMultiDiscSpecification;

impl Rule<LocalCandidate> for NotMultiDiscSpecification {
    fn name(&self) -> &'static str {
        "not-multi-disc"
    }

    fn evaluate(&self, candidate: &LocalCandidate, _context: Option<&SearchContext>) -> Decision {
        let folder = candidate
            .path
            .parent()
            .and_then(|parent| parent.file_name())
            .and_then(|name| name.to_str());
        match folder {
            Some(folder) if DISC_FOLDER_REGEX.is_match(folder) => Decision::reject(
                RejectionKind::MultiDisc,
                format!("File is part of a multi-disc release ({folder})"),
            ),
            _ => Decision::accept(),
        }
    }
}

/// Rejects `.cd1` / `.part2` files only when a sibling shares the stripped name.
pub struct NotMultiPartSpecification {
    disk: Arc<dyn DiskProvider>,
}

impl NotMultiPartSpecification {
    pub fn new(disk: Arc<dyn DiskProvider>) -> Self {
        Self { disk }
    }
}

impl Rule<LocalCandidate> for NotMultiPartSpecification {
    fn name(&self) -> &'static str {
        "not-multi-part"
    }

    fn priority(&self) -> Priority {
        Priority::Disk
    }

    fn evaluate(&self, candidate: &LocalCandidate, _context: Option<&SearchContext>) -> Decision {
        let Some(stripped) = file_stem(&candidate.path).and_then(strip_part_identifier) else {
            return Decision::accept();
        };
        let Some(dir) = candidate.path.parent() else {
            return Decision::accept();
        };
        let siblings = match self.disk.files_in(dir) {
            Ok(siblings) => siblings,
            Err(err) => return collaborator_unavailable(self.name(), &err),
        };

        let parts = siblings
            .iter()
            .filter_map(|sibling| file_stem(sibling).and_then(strip_part_identifier))
            .filter(|sibling| *sibling == stripped)
            .count();
        if parts > 1 {
            return Decision::reject(
                RejectionKind::MultiPart,
                format!("File is one of {parts} parts of a multi-part release"),
            );
        }
        Decision::accept()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::FsDiskProvider;
    use crate::specifications::import::test_support::local;
    use mediarr_domain::{Quality, QualityModel};

    #[test]
    fn strips_common_part_tokens() {
        assert_eq!(
            strip_part_identifier("Movie.Title.2020.cd1").as_deref(),
            Some("movie.title.2020")
        );
        assert_eq!(
            strip_part_identifier("Movie Title 2020 Part 2 1080p").as_deref(),
            Some("movie title 2020 1080p")
        );
        assert_eq!(
            strip_part_identifier("Movie.Title.2020.pt.b").as_deref(),
            Some("movie.title.2020")
        );
        assert_eq!(strip_part_identifier("Movie.Title.2020.1080p"), None);
        assert_eq!(strip_part_identifier("Discovery.2020"), None);
        assert_eq!(strip_part_identifier("cd1"), None);
    }

    #[test]
    fn disc_folders_are_rejected() {
        let q = QualityModel::new(Quality::DVD);
        let c = local("/downloads/Movie.2020/CD1/movie.avi", q);
        assert_eq!(
            NotMultiDiscSpecification.evaluate(&c, None).rejection().map(|r| r.kind),
            Some(RejectionKind::MultiDisc)
        );
        let c = local("/downloads/Movie.2020/Disc B/movie.avi", q);
        assert!(!NotMultiDiscSpecification.evaluate(&c, None).is_accepted());
        let c = local("/downloads/Movie.2020/movie.avi", q);
        assert!(NotMultiDiscSpecification.evaluate(&c, None).is_accepted());
    }

    #[test]
    fn parts_with_siblings_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let first = dir.path().join("Movie.Title.2020.cd1.mkv");
        let second = dir.path().join("Movie.Title.2020.cd2.mkv");
        std::fs::write(&first, b"one").expect("write");
        std::fs::write(&second, b"two").expect("write");

        let rule = NotMultiPartSpecification::new(Arc::new(FsDiskProvider));
        let q = QualityModel::new(Quality::HDTV_720P);
        for path in [&first, &second] {
            let c = local(path.to_str().expect("utf-8 path"), q);
            assert_eq!(
                rule.evaluate(&c, None).rejection().map(|r| r.kind),
                Some(RejectionKind::MultiPart)
            );
        }
    }

    #[test]
    fn lone_part_is_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        let only = dir.path().join("Movie.Title.2020.cd1.mkv");
        std::fs::write(&only, b"one").expect("write");
        std::fs::write(dir.path().join("Other.Movie.2019.cd2.mkv"), b"x").expect("write");

        let rule = NotMultiPartSpecification::new(Arc::new(FsDiskProvider));
        let c = local(only.to_str().expect("utf-8 path"), QualityModel::new(Quality::HDTV_720P));
        assert!(rule.evaluate(&c, None).is_accepted());
    }
}
