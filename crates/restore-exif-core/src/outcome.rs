use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::media::MediaKind;

/// How a single file was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    ImagesModified,
    ImagesSkipped,
    ImagesError,
    VideosModified,
    VideosSkipped,
    VideosError,
    UnsupportedExtension,
}

impl Outcome {
    pub fn modified(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Photo => Outcome::ImagesModified,
            MediaKind::Video => Outcome::VideosModified,
        }
    }

    pub fn skipped(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Photo => Outcome::ImagesSkipped,
            MediaKind::Video => Outcome::VideosSkipped,
        }
    }

    pub fn error(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Photo => Outcome::ImagesError,
            MediaKind::Video => Outcome::VideosError,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::ImagesModified => "images_modified",
            Outcome::ImagesSkipped => "images_skipped",
            Outcome::ImagesError => "images_error",
            Outcome::VideosModified => "videos_modified",
            Outcome::VideosSkipped => "videos_skipped",
            Outcome::VideosError => "videos_error",
            Outcome::UnsupportedExtension => "unsupported_extension",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome counts for a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tally {
    counts: BTreeMap<Outcome, u64>,
}

impl Tally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: Outcome) {
        self.add(outcome, 1);
    }

    pub fn add(&mut self, outcome: Outcome, n: u64) {
        if n > 0 {
            *self.counts.entry(outcome).or_insert(0) += n;
        }
    }

    pub fn merge(&mut self, other: &Tally) {
        for (&outcome, &n) in &other.counts {
            self.add(outcome, n);
        }
    }

    pub fn get(&self, outcome: Outcome) -> u64 {
        self.counts.get(&outcome).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Outcome, u64)> + '_ {
        self.counts.iter().map(|(&o, &n)| (o, n))
    }
}

impl FromIterator<Outcome> for Tally {
    fn from_iter<I: IntoIterator<Item = Outcome>>(iter: I) -> Self {
        let mut tally = Tally::new();
        for outcome in iter {
            tally.record(outcome);
        }
        tally
    }
}
