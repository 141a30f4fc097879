//! Plain-text rendering of bucket and object listings.
//!
//! A listing is a header line followed by one tab-separated line per entry:
//!
//! ```text
//! Name    Size    Date
//! a.txt   12      2024-01-02T03:04:05Z
//! logs/   ---     2024-01-02T03:04:05Z
//! ```

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write;

use crate::storage::backend::{BucketEntry, ObjectEntry};

pub const HEADER: &str = "Name\tSize\tDate\n";

/// Rendered in place of a size the backend did not report.
pub const NO_SIZE: &str = "---";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub name: String,
    pub size: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Ordered listing, in the order the backend returned it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub entries: Vec<ListingEntry>,
}

impl Listing {
    pub fn from_buckets(buckets: Vec<BucketEntry>) -> Self {
        let entries = buckets
            .into_iter()
            .map(|b| ListingEntry {
                name: b.name,
                size: None,
                timestamp: b.creation_date,
            })
            .collect();
        Self { entries }
    }

    pub fn from_objects(objects: Vec<ObjectEntry>) -> Self {
        let entries = objects
            .into_iter()
            .map(|o| ListingEntry {
                name: o.key,
                size: o.size,
                timestamp: o.last_modified,
            })
            .collect();
        Self { entries }
    }

    pub fn render(&self) -> String {
        let mut out = String::from(HEADER);
        for entry in &self.entries {
            let date = entry
                .timestamp
                .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
                .unwrap_or_default();
            // Writing to a String cannot fail.
            let _ = match entry.size {
                Some(size) => writeln!(out, "{}\t{}\t{}", entry.name, size, date),
                None => writeln!(out, "{}\t{}\t{}", entry.name, NO_SIZE, date),
            };
        }
        out
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap()
    }

    #[test]
    fn test_empty_listing_is_header_only() {
        assert_eq!(Listing::default().render(), "Name\tSize\tDate\n");
    }

    #[test]
    fn test_render_objects() {
        let listing = Listing::from_objects(vec![
            ObjectEntry {
                key: "a.txt".into(),
                size: Some(12),
                last_modified: Some(t()),
            },
            ObjectEntry {
                key: "logs/".into(),
                size: None,
                last_modified: None,
            },
        ]);
        assert_eq!(
            listing.render(),
            "Name\tSize\tDate\na.txt\t12\t2024-01-02T03:04:05Z\nlogs/\t---\t\n"
        );
    }

    #[test]
    fn test_buckets_have_no_size() {
        let listing = Listing::from_buckets(vec![
            BucketEntry {
                name: "zeta".into(),
                creation_date: Some(t()),
            },
            BucketEntry {
                name: "alpha".into(),
                creation_date: Some(t()),
            },
        ]);
        // Order is preserved as given.
        assert_eq!(listing.entries[0].name, "zeta");
        assert!(listing.entries.iter().all(|e| e.size.is_none()));
        assert_eq!(
            listing.render(),
            "Name\tSize\tDate\nzeta\t---\t2024-01-02T03:04:05Z\nalpha\t---\t2024-01-02T03:04:05Z\n"
        );
    }
}
