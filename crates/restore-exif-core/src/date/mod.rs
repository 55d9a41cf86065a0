pub mod exif;
pub mod guess;
pub mod tz;

use chrono::NaiveDateTime;

/// Capture date decoded from a filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTimestamp {
    /// Local wall time; filenames carry no zone
    pub datetime: NaiveDateTime,
    /// Name of the pattern family that matched
    pub source: &'static str,
    /// UTC offset such as `+02:00`, set by a timezone policy
    pub offset: Option<String>,
}

impl CaptureTimestamp {
    pub fn new(datetime: NaiveDateTime, source: &'static str) -> Self {
        Self {
            datetime,
            source,
            offset: None,
        }
    }

    /// Attach the offset chosen by `policy`.
    pub fn with_offset_from(mut self, policy: &dyn tz::TimezonePolicy) -> Self {
        self.offset = policy.offset_for(self.datetime);
        self
    }

    /// `YYYY:MM:DD HH:MM:SS`, the layout exiftool expects.
    pub fn exif_string(&self) -> String {
        exif::format_exif_datetime(&self.datetime)
    }
}
