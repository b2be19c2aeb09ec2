//! Naming scheme for timestamped data file backups.

use chrono::NaiveDateTime;
use regex::Regex;

/// Second-precision timestamp embedded in every backup file name.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Build the backup file name for a copy taken at `taken_at`.
///
/// `seq` tells apart copies taken within the same second: `0` yields
/// `<timestamp><suffix>`, later copies `<timestamp>.<seq><suffix>`.
pub fn backup_file_name(taken_at: NaiveDateTime, seq: u32, suffix: &str) -> String {
    let stamp = taken_at.format(TIMESTAMP_FORMAT);
    if seq == 0 {
        format!("{stamp}{suffix}")
    } else {
        format!("{stamp}.{seq}{suffix}")
    }
}

/// Parse the timestamp and sequence number out of a backup file name.
///
/// Returns `None` for names that do not follow the scheme of
/// [`backup_file_name`], so unrelated files sharing the backup directory are
/// ignored.
pub fn parse_backup_name(name: &str, suffix: &str) -> Option<(NaiveDateTime, u32)> {
    let pattern = format!(
        r"^(\d{{4}}-\d{{2}}-\d{{2}}_\d{{2}}-\d{{2}}-\d{{2}})(?:\.([1-9]\d*))?{}$",
        regex::escape(suffix)
    );
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(name)?;
    let taken_at = NaiveDateTime::parse_from_str(&caps[1], TIMESTAMP_FORMAT).ok()?;
    let seq = match caps.get(2) {
        Some(seq) => seq.as_str().parse().ok()?,
        None => 0,
    };
    Some((taken_at, seq))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19)
            .and_then(|d| d.and_hms_opt(h, m, s))
            .expect("valid timestamp")
    }

    #[test]
    fn name_embeds_second_precision_timestamp() {
        let name = backup_file_name(at(7, 5, 9), 0, "_airline.db.bak");
        assert_eq!(name, "2026-10-19_07-05-09_airline.db.bak");
    }

    #[test]
    fn same_second_copies_get_a_sequence_number() {
        let name = backup_file_name(at(7, 5, 9), 2, "_airline.db.bak");
        assert_eq!(name, "2026-10-19_07-05-09.2_airline.db.bak");
        assert_eq!(
            parse_backup_name(&name, "_airline.db.bak"),
            Some((at(7, 5, 9), 2))
        );
    }

    #[test]
    fn parse_recovers_timestamp() {
        let name = backup_file_name(at(23, 59, 1), 0, "_airline.db.bak");
        assert_eq!(
            parse_backup_name(&name, "_airline.db.bak"),
            Some((at(23, 59, 1), 0))
        );
    }

    #[test]
    fn parse_rejects_foreign_names() {
        let suffix = "_airline.db.bak";
        assert_eq!(parse_backup_name("airline.db", suffix), None);
        assert_eq!(
            parse_backup_name("2026-10-19_07-05-09_other.db.bak", suffix),
            None
        );
        assert_eq!(
            parse_backup_name("2026-13-40_07-05-09_airline.db.bak", suffix),
            None
        );
        assert_eq!(
            parse_backup_name("2026-10-19_07-05-09.0_airline.db.bak", suffix),
            None
        );
    }

    #[test]
    fn suffix_is_matched_literally() {
        // `.` in the suffix must not act as a wildcard.
        assert_eq!(
            parse_backup_name("2026-10-19_07-05-09_airlineXdbXbak", "_airline.db.bak"),
            None
        );
    }
}
