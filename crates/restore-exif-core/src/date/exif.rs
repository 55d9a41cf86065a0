use chrono::NaiveDateTime;

/// Format a datetime as EXIF expects it.
pub fn format_exif_datetime(dt: &NaiveDateTime) -> String {
    dt.format("%Y:%m:%d %H:%M:%S").to_string()
}

/// Parse an EXIF-style datetime as reported by exiftool.
/// Separators vary between writers, and a trailing offset or subseconds may
/// follow the time; both are ignored.
pub fn parse_exif_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if s.len() < 10 {
        return None;
    }
    let cleaned = s
        .replace('-', ":")
        .replace('/', ":")
        .replace('\\', ":")
        .replace('.', ":");

    let head: String = cleaned.chars().take(19).collect();
    if let Ok(dt) = NaiveDateTime::parse_from_str(&head, "%Y:%m:%d %H:%M:%S") {
        return Some(dt);
    }

    if let Ok(d) = chrono::NaiveDate::parse_from_str(cleaned.split(' ').next()?, "%Y:%m:%d") {
        return d.and_hms_opt(0, 0, 0);
    }

    None
}

/// Whether a tag value holds a usable date. Cameras and phones write
/// `0000:00:00 00:00:00` as a placeholder when the clock was never set.
pub fn is_meaningful_date(value: &str) -> bool {
    let v = value.trim();
    !v.is_empty() && !v.starts_with("0000") && parse_exif_datetime(v).is_some()
}
