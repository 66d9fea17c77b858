// SPDX-License-Identifier: GPL-3.0-or-later
use std::path::Path;

use lazy_static::lazy_static;
use mediarr_domain::{Language, ParsedReleaseInfo, Quality, QualityModel, Revision};
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Source {
    Remux,
    Bluray,
    Web,
    Hdtv,
    Dvd,
    Sdtv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    R480,
    R720,
    R1080,
    R2160,
}

lazy_static! {
    static ref RESOLUTION_REGEX: Regex =
        Regex::new(r"(?i)\b(?:(?P<r2160>2160p|4k|uhd)|(?P<r1080>1080[pi])|(?P<r720>720p)|(?P<r480>480p|576p))\b")
            .expect("valid resolution regex");
    static ref SOURCE_REGEX: Regex = Regex::new(
        r"(?i)\b(?:(?P<remux>remux)|(?P<bluray>blu-?ray|bdrip|brrip|bd25|bd50)|(?P<web>web-?dl|webrip|web|amzn|nf)|(?P<hdtv>hdtv)|(?P<dvd>dvdrip|dvd-?r|dvd)|(?P<sdtv>sdtv|pdtv|tvrip))\b"
    )
    .expect("valid source regex");
    static ref PROPER_REGEX: Regex =
        Regex::new(r"(?i)\b(?:proper|repack|rerip)\b").expect("valid proper regex");
    static ref VERSION_REGEX: Regex =
        Regex::new(r"(?i)\bv(?P<version>[2-4])\b").expect("valid version regex");
    // REAL is only meaningful upper-case; "Real" is usually part of a title.
    static ref REAL_REGEX: Regex = Regex::new(r"\bREAL\b").expect("valid real regex");
    static ref AUDIO_REGEX: Regex =
        Regex::new(r"(?i)\b(?:(?P<flac>flac)|(?P<mp3>mp3|320kbps|320k))\b").expect("valid audio regex");
    static ref YEAR_REGEX: Regex =
        Regex::new(r"\b(?P<year>(?:19|20)\d{2})\b").expect("valid year regex");
    static ref GROUP_REGEX: Regex =
        Regex::new(r"-(?P<group>[A-Za-z0-9]{2,32})$").expect("valid group regex");
    static ref LANGUAGE_REGEX: Regex = Regex::new(
        r"(?i)\b(?:(?P<french>french|vff|truefrench)|(?P<german>german)|(?P<spanish>spanish|castellano)|(?P<italian>italian|ita)|(?P<japanese>japanese|jap)|(?P<dutch>dutch|nl)|(?P<portuguese>portuguese)|(?P<russian>russian|rus))\b"
    )
    .expect("valid language regex");
}

/// Parse a release or file title into its quality and revision.
pub fn parse_quality(title: &str) -> QualityModel {
    let (stem, extension) = split_extension(title);
    let quality = detect_quality(&normalize(stem), extension);
    QualityModel::with_revision(quality, detect_revision(title))
}

/// Parse a release title or file name.
pub fn parse_release_title(title: &str) -> ParsedReleaseInfo {
    let (stem, extension) = split_extension(title);
    let normalized = normalize(stem);

    let year = YEAR_REGEX
        .captures_iter(&normalized)
        .filter_map(|c| c.name("year").and_then(|m| m.as_str().parse::<u16>().ok()))
        .last();

    let media_title = YEAR_REGEX
        .find(&normalized)
        .map(|m| normalized[..m.start()].trim().to_string())
        .filter(|t| !t.is_empty());

    let release_group = GROUP_REGEX
        .captures(stem.trim())
        .and_then(|c| c.name("group").map(|m| m.as_str().to_string()))
        .filter(|group| !group.eq_ignore_ascii_case("dl"));

    ParsedReleaseInfo {
        title: title.to_string(),
        media_title,
        year,
        quality: QualityModel::with_revision(
            detect_quality(&normalized, extension),
            detect_revision(stem),
        ),
        languages: detect_languages(&normalized),
        release_group,
    }
}

/// Parse the file name component of `path`, or `None` when it has no usable name.
pub fn parse_path(path: &Path) -> Option<ParsedReleaseInfo> {
    let name = path.file_name()?.to_str()?;
    if name.trim().is_empty() {
        return None;
    }
    Some(parse_release_title(name))
}

fn normalize(input: &str) -> String {
    input
        .replace(['.', '_'], " ")
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

/// Known media extensions and the quality a file carries when its name says nothing else.
const EXTENSION_QUALITIES: [(&str, Quality); 21] = [
    ("avi", Quality::SDTV),
    ("divx", Quality::SDTV),
    ("wmv", Quality::SDTV),
    ("mpg", Quality::SDTV),
    ("mpeg", Quality::SDTV),
    ("3gp", Quality::SDTV),
    ("flv", Quality::SDTV),
    ("ogm", Quality::SDTV),
    ("rm", Quality::SDTV),
    ("m2ts", Quality::SDTV),
    ("ts", Quality::SDTV),
    ("vob", Quality::DVD),
    ("iso", Quality::DVD),
    ("img", Quality::DVD),
    ("mkv", Quality::HDTV_720P),
    ("mp4", Quality::HDTV_720P),
    ("m4v", Quality::HDTV_720P),
    ("mov", Quality::HDTV_720P),
    ("webm", Quality::WEBDL_480P),
    ("flac", Quality::FLAC),
    ("mp3", Quality::MP3_320),
];

/// Splits a recognised media extension off `title`.
fn split_extension(title: &str) -> (&str, Option<&str>) {
    match title.rsplit_once('.') {
        Some((stem, ext))
            if EXTENSION_QUALITIES
                .iter()
                .any(|(known, _)| known.eq_ignore_ascii_case(ext)) =>
        {
            (stem, Some(ext))
        }
        _ => (title, None),
    }
}

fn extension_quality(extension: &str) -> Quality {
    EXTENSION_QUALITIES
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(extension))
        .map(|(_, quality)| *quality)
        .unwrap_or(Quality::UNKNOWN)
}

fn detect_source(title: &str) -> Option<Source> {
    let mut found = None;
    for captures in SOURCE_REGEX.captures_iter(title) {
        let source = if captures.name("remux").is_some() {
            Source::Remux
        } else if captures.name("bluray").is_some() {
            Source::Bluray
        } else if captures.name("web").is_some() {
            Source::Web
        } else if captures.name("hdtv").is_some() {
            Source::Hdtv
        } else if captures.name("dvd").is_some() {
            Source::Dvd
        } else {
            Source::Sdtv
        };
        // "BluRay REMUX" names both; remux wins.
        if found != Some(Source::Remux) {
            found = Some(source);
        }
    }
    found
}

fn detect_resolution(title: &str) -> Option<Resolution> {
    let captures = RESOLUTION_REGEX.captures(title)?;
    if captures.name("r2160").is_some() {
        Some(Resolution::R2160)
    } else if captures.name("r1080").is_some() {
        Some(Resolution::R1080)
    } else if captures.name("r720").is_some() {
        Some(Resolution::R720)
    } else {
        Some(Resolution::R480)
    }
}

fn detect_quality(title: &str, extension: Option<&str>) -> Quality {
    let source = detect_source(title);
    let resolution = detect_resolution(title);

    match (source, resolution) {
        (Some(Source::Remux), Some(Resolution::R2160)) => Quality::REMUX_2160P,
        (Some(Source::Remux), _) => Quality::REMUX_1080P,
        (Some(Source::Bluray), Some(Resolution::R2160)) => Quality::BLURAY_2160P,
        (Some(Source::Bluray), Some(Resolution::R1080)) => Quality::BLURAY_1080P,
        (Some(Source::Bluray), Some(Resolution::R720)) => Quality::BLURAY_720P,
        (Some(Source::Bluray), _) => Quality::DVD,
        (Some(Source::Web), Some(Resolution::R2160)) => Quality::WEBDL_2160P,
        (Some(Source::Web), Some(Resolution::R1080)) => Quality::WEBDL_1080P,
        (Some(Source::Web), Some(Resolution::R720)) => Quality::WEBDL_720P,
        (Some(Source::Web), _) => Quality::WEBDL_480P,
        (Some(Source::Hdtv), Some(Resolution::R2160)) => Quality::HDTV_2160P,
        (Some(Source::Hdtv), Some(Resolution::R1080)) => Quality::HDTV_1080P,
        (Some(Source::Hdtv), Some(Resolution::R720)) => Quality::HDTV_720P,
        (Some(Source::Hdtv), _) => Quality::SDTV,
        (Some(Source::Dvd), _) => Quality::DVD,
        (Some(Source::Sdtv), _) => Quality::SDTV,
        (None, Some(Resolution::R2160)) => Quality::HDTV_2160P,
        (None, Some(Resolution::R1080)) => Quality::HDTV_1080P,
        (None, Some(Resolution::R720)) => Quality::HDTV_720P,
        (None, Some(Resolution::R480)) => Quality::SDTV,
        (None, None) => match detect_audio_quality(title) {
            quality if quality.is_unknown() => extension.map(extension_quality).unwrap_or(Quality::UNKNOWN),
            quality => quality,
        },
    }
}

fn detect_audio_quality(title: &str) -> Quality {
    match AUDIO_REGEX.captures(title) {
        Some(c) if c.name("flac").is_some() => Quality::FLAC,
        Some(_) => Quality::MP3_320,
        None => Quality::UNKNOWN,
    }
}

fn detect_revision(title: &str) -> Revision {
    let mut revision = Revision::default();

    if PROPER_REGEX.is_match(title) {
        revision.version = 2;
    }

    if let Some(version) = VERSION_REGEX
        .captures(title)
        .and_then(|c| c.name("version"))
        .and_then(|m| m.as_str().parse::<u32>().ok())
    {
        revision.version = version;
    }

    revision.real = REAL_REGEX.find_iter(title).count() as u32;
    revision
}

fn detect_languages(title: &str) -> Vec<Language> {
    let mut languages = Vec::new();
    for captures in LANGUAGE_REGEX.captures_iter(title) {
        let language = [
            ("french", Language::French),
            ("german", Language::German),
            ("spanish", Language::Spanish),
            ("italian", Language::Italian),
            ("japanese", Language::Japanese),
            ("dutch", Language::Dutch),
            ("portuguese", Language::Portuguese),
            ("russian", Language::Russian),
        ]
        .into_iter()
        .find(|(group, _)| captures.name(group).is_some())
        .map(|(_, language)| language);

        if let Some(language) = language {
            if !languages.contains(&language) {
                languages.push(language);
            }
        }
    }
    if languages.is_empty() {
        languages.push(Language::English);
    }
    languages
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn parses_source_and_resolution() {
        assert_eq!(parse_quality("Movie.Title.2020.1080p.BluRay.x264-GRP").quality, Quality::BLURAY_1080P);
        assert_eq!(parse_quality("Movie Title 2020 720p HDTV x264").quality, Quality::HDTV_720P);
        assert_eq!(parse_quality("Movie.2019.2160p.WEB-DL.DDP5.1").quality, Quality::WEBDL_2160P);
        assert_eq!(parse_quality("Movie.2019.1080p.BluRay.REMUX.AVC").quality, Quality::REMUX_1080P);
        assert_eq!(parse_quality("Movie.2001.DVDRip.XviD").quality, Quality::DVD);
        assert_eq!(parse_quality("Some Album FLAC").quality, Quality::FLAC);
        assert_eq!(parse_quality("Totally Opaque Name").quality, Quality::UNKNOWN);
    }

    #[test]
    fn parses_revisions() {
        let proper = parse_quality("Movie.2020.720p.HDTV.PROPER.x264-GRP");
        assert_eq!(proper.revision, Revision::new(2, 0));

        let v3 = parse_quality("Movie.2020.720p.HDTV.v3.x264-GRP");
        assert_eq!(v3.revision.version, 3);

        let real = parse_quality("Movie.2020.REAL.720p.HDTV.x264-GRP");
        assert_eq!(real.revision, Revision::new(1, 1));

        let title_word = parse_quality("The.Real.Movie.2020.720p.HDTV.x264-GRP");
        assert_eq!(title_word.revision, Revision::default());
    }

    #[test]
    fn parses_title_year_and_group() {
        let parsed = parse_release_title("Movie.Title.2020.1080p.WEB-DL.x264-GRP.mkv");
        assert_eq!(parsed.media_title.as_deref(), Some("Movie Title"));
        assert_eq!(parsed.year, Some(2020));
        assert_eq!(parsed.release_group.as_deref(), Some("GRP"));
        assert_eq!(parsed.quality.quality, Quality::WEBDL_1080P);
        assert_eq!(parsed.languages, vec![Language::English]);
    }

    #[test]
    fn release_title_without_extension_keeps_resolution() {
        let parsed = parse_release_title("Movie.Title.2020.720p");
        assert_eq!(parsed.quality.quality, Quality::HDTV_720P);
        assert_eq!(parsed.release_group, None);
        assert_eq!(parse_release_title("Movie.2020.1080p.WEB-DL").release_group, None);
    }

    #[test]
    fn detects_languages() {
        let parsed = parse_release_title("Movie.2020.FRENCH.1080p.BluRay.x264-GRP");
        assert_eq!(parsed.languages, vec![Language::French]);
    }

    #[test]
    fn path_without_file_name_is_unparseable() {
        assert!(parse_path(&PathBuf::from("/")).is_none());
        assert!(parse_path(&PathBuf::from("/downloads/Movie.2020.720p.HDTV.mkv")).is_some());
    }

    #[test]
    fn bare_file_name_falls_back_to_extension() {
        assert_eq!(parse_quality("Movie.Title.2020.avi").quality, Quality::SDTV);
        assert_eq!(parse_quality("Movie.Title.2020.WMV").quality, Quality::SDTV);
        assert_eq!(parse_quality("Movie.Title.2020.mkv").quality, Quality::HDTV_720P);
        assert_eq!(parse_quality("Movie.Title.2020.m4v").quality, Quality::HDTV_720P);
        assert_eq!(parse_quality("Movie.Title.2020.iso").quality, Quality::DVD);

        let parsed = parse_path(&PathBuf::from("/downloads/Movie.Title.2020.avi")).expect("parsed");
        assert_eq!(parsed.quality.quality, Quality::SDTV);
        assert_eq!(parsed.year, Some(2020));
    }

    #[test]
    fn title_tokens_outrank_extension() {
        assert_eq!(parse_quality("Movie.Title.2020.1080p.BluRay.x264-GRP.avi").quality, Quality::BLURAY_1080P);
        assert_eq!(parse_quality("Movie.Title.2020.DVDRip.mkv").quality, Quality::DVD);
        assert_eq!(parse_quality("Movie.Title.2020.xyz").quality, Quality::UNKNOWN);
    }
}
