use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::path::Path;

use super::CaptureTimestamp;
use crate::error::RestoreError;

/// One filename convention: a regex with a `date` group and an optional
/// `time` group, plus the chrono layouts to read them.
#[derive(Debug, Clone)]
pub struct FilenamePattern {
    pub name: &'static str,
    regex: Regex,
    date_format: &'static str,
    time_format: Option<&'static str>,
}

impl FilenamePattern {
    pub fn new(
        name: &'static str,
        pattern: &str,
        date_format: &'static str,
        time_format: Option<&'static str>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            regex: Regex::new(pattern)?,
            date_format,
            time_format,
        })
    }

    /// Every valid datetime this pattern finds in `stem`, in match order.
    fn candidates<'a>(&'a self, stem: &'a str) -> impl Iterator<Item = NaiveDateTime> + 'a {
        self.regex.captures_iter(stem).filter_map(move |caps| {
            let date = caps.name("date")?.as_str();
            match (caps.name("time"), self.time_format) {
                (Some(time), Some(time_format)) => NaiveDateTime::parse_from_str(
                    &format!("{} {}", date, time.as_str()),
                    &format!("{} {}", self.date_format, time_format),
                )
                .ok(),
                _ => NaiveDate::parse_from_str(date, self.date_format)
                    .ok()?
                    .and_hms_opt(0, 0, 0),
            }
        })
    }
}

/// Built-in conventions in priority order.
fn builtin_patterns() -> Vec<FilenamePattern> {
    // (name, regex, date layout, time layout)
    let table: &[(&'static str, &str, &'static str, Option<&'static str>)] = &[
        (
            "whatsapp",
            r"(?i)(?:IMG|VID)-(?P<date>\d{8})-WA\d{4}",
            "%Y%m%d",
            None,
        ),
        (
            "google-photos",
            r"(?i)(?:IMG|mms|Resized)_(?P<date>\d{8})_(?P<time>\d{6})(?:_\d{3})?",
            "%Y%m%d",
            Some("%H%M%S"),
        ),
        (
            "screenshot",
            r"(?i)Screenshot_(?P<date>\d{8})-(?P<time>\d{6})",
            "%Y%m%d",
            Some("%H%M%S"),
        ),
        (
            "screenshot-dashed",
            r"(?i)Screenshot_(?P<date>\d{4}-\d{2}-\d{2})-(?P<time>\d{2}-\d{2}-\d{2})",
            "%Y-%m-%d",
            Some("%H-%M-%S"),
        ),
        (
            "clumsy-ninja",
            r"(?i)ClumsyNinja_(?P<date>\d{8})_(?P<time>\d{6})",
            "%d%m%Y",
            Some("%H%M%S"),
        ),
        (
            "signal",
            r"(?i)signal-(?P<date>\d{4}-\d{2}-\d{2})-(?P<time>\d{6})",
            "%Y-%m-%d",
            Some("%H%M%S"),
        ),
        (
            "underscored",
            r"(?P<date>(?:20|19)\d{2}_\d{2}_\d{2})_(?P<time>\d{2}_\d{2}_\d{2})",
            "%Y_%m_%d",
            Some("%H_%M_%S"),
        ),
        (
            "generic",
            r"(?P<date>\d{8})(?:[_-]?(?P<time>\d{6}))?",
            "%Y%m%d",
            Some("%H%M%S"),
        ),
    ];

    table
        .iter()
        .map(|(name, re, date_format, time_format)| {
            FilenamePattern::new(name, re, date_format, *time_format)
                .expect("built-in filename pattern must compile")
        })
        .collect()
}

/// Ordered table of filename conventions. The first valid match wins.
#[derive(Debug, Clone)]
pub struct FilenameParser {
    patterns: Vec<FilenamePattern>,
}

impl Default for FilenameParser {
    fn default() -> Self {
        Self {
            patterns: builtin_patterns(),
        }
    }
}

impl FilenameParser {
    /// A parser with no patterns at all.
    pub fn empty() -> Self {
        Self {
            patterns: Vec::new(),
        }
    }

    /// Append a pattern with the lowest priority.
    pub fn with_pattern(mut self, pattern: FilenamePattern) -> Self {
        self.patterns.push(pattern);
        self
    }

    /// Insert a pattern ahead of every existing one.
    pub fn with_priority_pattern(mut self, pattern: FilenamePattern) -> Self {
        self.patterns.insert(0, pattern);
        self
    }

    pub fn pattern_names(&self) -> Vec<&'static str> {
        self.patterns.iter().map(|p| p.name).collect()
    }

    /// Decode the capture date encoded in `filename`.
    pub fn parse(&self, filename: &str) -> Result<CaptureTimestamp, RestoreError> {
        let basename = Path::new(filename)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(filename);
        let stem = Path::new(basename)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(basename);

        for pat in &self.patterns {
            if let Some(dt) = pat.candidates(stem).next() {
                return Ok(CaptureTimestamp::new(dt, pat.name));
            }
        }

        Err(RestoreError::UnrecognizedFilenameFormat(filename.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dt(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
    }

    fn parse(name: &str) -> CaptureTimestamp {
        FilenameParser::default().parse(name).unwrap()
    }

    #[test]
    fn test_builtin_table_is_complete() {
        assert_eq!(
            FilenameParser::default().pattern_names(),
            vec![
                "whatsapp",
                "google-photos",
                "screenshot",
                "screenshot-dashed",
                "clumsy-ninja",
                "signal",
                "underscored",
                "generic",
            ]
        );
    }

    #[test]
    fn test_whatsapp() {
        let ts = parse("IMG-20210315-WA0007.jpg");
        assert_eq!(ts.datetime, dt(2021, 3, 15, 0, 0, 0));
        assert_eq!(ts.source, "whatsapp");
        assert_eq!(parse("VID-20190101-WA0012.mp4").datetime, dt(2019, 1, 1, 0, 0, 0));
    }

    #[test]
    fn test_google_photos_family() {
        assert_eq!(
            parse("IMG_20210315_143000_001.jpg").datetime,
            dt(2021, 3, 15, 14, 30, 0)
        );
        assert_eq!(parse("IMG_20190509_154733.jpg").datetime, dt(2019, 5, 9, 15, 47, 33));
        assert_eq!(parse("mms_20180102_030405.jpg").datetime, dt(2018, 1, 2, 3, 4, 5));
        assert_eq!(
            parse("Resized_20200630_235959.jpeg").datetime,
            dt(2020, 6, 30, 23, 59, 59)
        );
        assert_eq!(parse("IMG_20190509_154733.jpg").source, "google-photos");
    }

    #[test]
    fn test_screenshots() {
        assert_eq!(
            parse("Screenshot_20190919-053857.png").datetime,
            dt(2019, 9, 19, 5, 38, 57)
        );
        let dashed = parse("Screenshot_2019-09-19-05-38-57.png");
        assert_eq!(dashed.datetime, dt(2019, 9, 19, 5, 38, 57));
        assert_eq!(dashed.source, "screenshot-dashed");
    }

    #[test]
    fn test_clumsy_ninja_swaps_day_and_month() {
        let ts = parse("ClumsyNinja_15032021_101112.jpg");
        assert_eq!(ts.datetime, dt(2021, 3, 15, 10, 11, 12));
        assert_eq!(ts.source, "clumsy-ninja");
    }

    #[test]
    fn test_takeout_layouts() {
        assert_eq!(
            parse("signal-2020-10-26-163832.jpg").datetime,
            dt(2020, 10, 26, 16, 38, 32)
        );
        assert_eq!(parse("2016_01_30_11_49_15.mp4").datetime, dt(2016, 1, 30, 11, 49, 15));
    }

    #[test]
    fn test_generic_fallback() {
        assert_eq!(parse("PXL_20211224_181500123.jpg").datetime, dt(2021, 12, 24, 18, 15, 0));
        assert_eq!(parse("20200101.jpg").datetime, dt(2020, 1, 1, 0, 0, 0));
        assert_eq!(parse("holiday 20200704.mov").source, "generic");
    }

    #[test]
    fn test_copy_suffixes_are_tolerated() {
        assert_eq!(parse("IMG-20210315-WA0007(1).jpg").datetime, dt(2021, 3, 15, 0, 0, 0));
        assert_eq!(parse("IMG-20210315-WA0007 (2).jpg").datetime, dt(2021, 3, 15, 0, 0, 0));
        assert_eq!(parse("img-20210315-wa0007.JPG").datetime, dt(2021, 3, 15, 0, 0, 0));
    }

    #[test]
    fn test_invalid_candidates_are_skipped() {
        // 2021-13-45 is not a date; the later run is.
        let ts = parse("x_20211345_y_20210102.jpg");
        assert_eq!(ts.datetime, dt(2021, 1, 2, 0, 0, 0));
        // Invalid WhatsApp date falls through to the generic pattern and fails there too.
        assert!(FilenameParser::default().parse("IMG-20219999-WA0001.jpg").is_err());
    }

    #[test]
    fn test_unrecognized() {
        let err = FilenameParser::default().parse("random.jpg").unwrap_err();
        assert!(matches!(err, RestoreError::UnrecognizedFilenameFormat(ref n) if n == "random.jpg"));
        assert!(FilenameParser::default().parse("random_photo.jpg").is_err());
    }

    #[test]
    fn test_extension_is_stripped() {
        // The extension digits must not complete an 8-digit run.
        assert!(FilenameParser::default().parse("photo1234.5678").is_err());
    }

    #[test]
    fn test_custom_patterns() {
        let custom = FilenamePattern::new(
            "dotted",
            r"(?P<date>\d{4}\.\d{2}\.\d{2})",
            "%Y.%m.%d",
            None,
        )
        .unwrap();
        let parser = FilenameParser::empty().with_pattern(custom.clone());
        assert_eq!(parser.parse("trip 2019.08.01.jpg").unwrap().datetime, dt(2019, 8, 1, 0, 0, 0));
        assert!(parser.parse("IMG-20210315-WA0007.jpg").is_err());

        let parser = FilenameParser::default().with_priority_pattern(custom);
        assert_eq!(parser.pattern_names()[0], "dotted");
    }
}
