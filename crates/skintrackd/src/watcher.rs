//! Photo directory discovery and scan scheduling.

use chrono::{DateTime, Duration, Utc};
use skintrack_core::is_photo;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Whether a periodic scan should run now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanDecision {
    /// Never checked before: record the time, scan next period.
    Baseline,
    /// Checked within the interval.
    TooSoon,
    Due,
}

pub fn scan_decision(
    last_checked: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    interval: Duration,
) -> ScanDecision {
    match last_checked {
        None => ScanDecision::Baseline,
        Some(last) if now - last < interval => ScanDecision::TooSoon,
        Some(_) => ScanDecision::Due,
    }
}

/// Image files in `dir`, oldest first (modification time, then name).
pub fn list_photos(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut photos: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if !is_photo(&path) {
            continue;
        }
        let meta = entry.metadata()?;
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        photos.push((modified, path));
    }
    photos.sort();
    Ok(photos.into_iter().map(|(_, p)| p).collect())
}

/// Photos not yet recorded as processed, keeping order.
pub fn new_photos(all: Vec<PathBuf>, processed: &HashSet<String>) -> Vec<PathBuf> {
    all.into_iter()
        .filter(|p| !processed.contains(&photo_key(p)))
        .collect()
}

/// Identifier a photo is stored under.
pub fn photo_key(path: &Path) -> String {
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, day, 8, 0, 0).unwrap()
    }

    #[test]
    fn test_first_check_is_baseline() {
        assert_eq!(scan_decision(None, at(1), Duration::days(20)), ScanDecision::Baseline);
    }

    #[test]
    fn test_within_interval_too_soon() {
        assert_eq!(scan_decision(Some(at(1)), at(20), Duration::days(20)), ScanDecision::TooSoon);
    }

    #[test]
    fn test_interval_elapsed_due() {
        assert_eq!(scan_decision(Some(at(1)), at(21), Duration::days(20)), ScanDecision::Due);
    }

    #[test]
    fn test_list_and_filter_photos() {
        let dir = std::env::temp_dir().join(format!("skintrack-watch-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for name in ["b.jpg", "a.png", "skip.txt"] {
            std::fs::write(dir.join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.join("sub.jpg")).unwrap();

        let all = list_photos(&dir).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|p| is_photo(p)));

        let processed: HashSet<String> = [photo_key(&dir.join("a.png"))].into_iter().collect();
        let fresh = new_photos(all, &processed);
        assert_eq!(fresh, vec![dir.join("b.jpg")]);

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
