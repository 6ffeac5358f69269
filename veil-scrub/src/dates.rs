//! Date pattern construction and date blurring.
//!
//! Two jobs: expand one *known* date (a date of birth, say) into a pattern
//! matching any common rendering of it, and find *arbitrary* dates in free
//! text so they can be removed or blurred to month/year.

use chrono::{Datelike, NaiveDate};
use regex::{Captures, Regex};

use veil_core::config::ScrubOptions;
use veil_core::errors::ScrubError;

use crate::patterns::at_word_boundaries;

const MONTHS: [(&str, &str); 12] = [
    ("jan", "uary"),
    ("feb", "ruary"),
    ("mar", "ch"),
    ("apr", "il"),
    ("may", ""),
    ("jun", "e"),
    ("jul", "y"),
    ("aug", "ust"),
    ("sep", "tember"),
    ("oct", "ober"),
    ("nov", "ember"),
    ("dec", "ember"),
];

const ORDINALS: &str = r"(?:st|nd|rd|th)?";
const SEP: &str = r"[\s/.\-]*";

/// Formats tried when interpreting a scrub-source cell as a date.
const PARSE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y-%m-%d %H:%M:%S",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d %Y",
    "%Y%m%d",
];

/// Try hard to read a date out of a source cell.
pub fn parse_source_date(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    for format in PARSE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return Some(date);
        }
    }
    None
}

/// Pattern matching any common rendering of one specific date: all three
/// component orderings, numeric / abbreviated / full month names, the usual
/// separators or none, ordinal day suffixes, and two- or four-digit years.
pub fn date_value_pattern(date: NaiveDate, options: &ScrubOptions) -> String {
    let day = date.day();
    let month = date.month();
    let year = date.year();

    let day_re = format!("0?{day}{ORDINALS}");
    let (short, rest) = MONTHS[(month - 1) as usize];
    let month_alpha = if rest.is_empty() {
        short.to_string()
    } else {
        format!("{short}(?:{rest})?")
    };
    let month_re = format!("(?:0?{month}|{month_alpha})");
    let yy = year.rem_euclid(100);
    let year_re = format!("(?:{year}|{yy:02})");

    let dmy = format!("{day_re}{SEP}{month_re}{SEP}{year_re}");
    let mdy = format!("{month_re}{SEP}{day_re}{SEP}{year_re}");
    let ymd = format!("{year_re}{SEP}{month_re}{SEP}0?{day}");
    let combined = format!("(?:{dmy}|{mdy}|{ymd})");

    if options.effective_dates_at_word_boundaries() {
        at_word_boundaries(&combined)
    } else {
        combined
    }
}

/// Finds arbitrary dates in free text and replaces them, optionally
/// reformatting through a blur template (`[%b %Y]` and friends).
pub struct DateScrubber {
    rules: Vec<Regex>,
    blur_template: Option<String>,
    replacement: String,
}

impl DateScrubber {
    pub fn new(options: &ScrubOptions, replacement: &str) -> Result<Self, ScrubError> {
        let month_names = MONTHS
            .iter()
            .map(|(short, rest)| {
                if rest.is_empty() {
                    (*short).to_string()
                } else {
                    format!("{short}(?:{rest})?")
                }
            })
            .collect::<Vec<_>>()
            .join("|");

        // Tried in order; first match wins at each position. Day-first is
        // the assumed reading of ambiguous numeric dates.
        let sources = [
            // 2 Sep 1990, 2nd September 1990, 02-Sep-90
            format!(
                r"(?i)\b(?P<d>\d{{1,2}}){ORDINALS}{SEP}(?P<mon>{month_names}){SEP}(?P<y>\d{{2,4}})\b"
            ),
            // Sep 2 1990, September 2nd, 1990
            format!(
                r"(?i)\b(?P<mon>{month_names}){SEP}(?P<d>\d{{1,2}}){ORDINALS},?{SEP}(?P<y>\d{{2,4}})\b"
            ),
            // 1990-09-02 (ISO)
            r"\b(?P<y>\d{4})[\s/.\-](?P<m>\d{1,2})[\s/.\-](?P<d>\d{1,2})\b".to_string(),
            // 2/9/1990, 02.09.90
            r"\b(?P<d>\d{1,2})[/.\-](?P<m>\d{1,2})[/.\-](?P<y>\d{2,4})\b".to_string(),
        ];

        let mut rules = Vec::with_capacity(sources.len());
        for source in &sources {
            rules.push(Regex::new(source).map_err(|e| ScrubError::Pattern {
                pattern: source.clone(),
                message: e.to_string(),
            })?);
        }

        Ok(Self {
            rules,
            blur_template: options.replace_all_dates_with.clone(),
            replacement: replacement.to_string(),
        })
    }

    /// Replace every date in `text`. Unparseable near-dates still get the
    /// plain replacement; they must not survive.
    pub fn apply(&self, text: &str) -> String {
        let mut current = text.to_string();
        for rule in &self.rules {
            current = rule
                .replace_all(&current, |caps: &Captures<'_>| self.replace_one(caps))
                .into_owned();
        }
        current
    }

    fn replace_one(&self, caps: &Captures<'_>) -> String {
        let Some(template) = &self.blur_template else {
            return self.replacement.clone();
        };
        match captured_date(caps) {
            Some(date) => date.format(template).to_string(),
            None => self.replacement.clone(),
        }
    }
}

fn captured_date(caps: &Captures<'_>) -> Option<NaiveDate> {
    let day: u32 = caps.name("d")?.as_str().parse().ok()?;
    let year_raw: i32 = caps.name("y")?.as_str().parse().ok()?;
    let year = normalise_year(year_raw);
    let month: u32 = match caps.name("m") {
        Some(m) => m.as_str().parse().ok()?,
        None => {
            let mon = caps.name("mon")?.as_str().to_ascii_lowercase();
            MONTHS
                .iter()
                .position(|(short, _)| mon.starts_with(short))
                .map(|i| (i + 1) as u32)?
        }
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

/// Two-digit years pivot at 50: 49 → 2049, 50 → 1950.
fn normalise_year(year: i32) -> i32 {
    if year >= 100 {
        year
    } else if year < 50 {
        2000 + year
    } else {
        1900 + year
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> ScrubOptions {
        ScrubOptions::default()
    }

    #[test]
    fn known_date_matches_many_renderings() {
        let date = NaiveDate::from_ymd_opt(1990, 9, 2).unwrap();
        let source = date_value_pattern(date, &options());
        let re = fancy_regex::Regex::new(&format!("(?i){source}")).unwrap();
        for rendering in [
            "2 Sep 1990",
            "2nd September 1990",
            "02/09/1990",
            "2.9.90",
            "1990-09-02",
            "Sep 2 1990",
            "02 09 1990",
        ] {
            assert!(
                re.is_match(rendering).unwrap(),
                "should match {rendering:?}"
            );
        }
        assert!(!re.is_match("3 Sep 1990").unwrap());
        assert!(!re.is_match("2 Oct 1990").unwrap());
    }

    #[test]
    fn blurring_keeps_month_and_year_only() {
        let mut opts = options();
        opts.replace_all_dates_with = Some("[%b %Y]".to_string());
        let scrubber = DateScrubber::new(&opts, "[~~~]").unwrap();
        assert_eq!(
            scrubber.apply("Seen on 2 Sep 1990 and 03.09.1990."),
            "Seen on [Sep 1990] and [Sep 1990]."
        );
    }

    #[test]
    fn without_blur_dates_vanish() {
        let scrubber = DateScrubber::new(&options(), "[~~~]").unwrap();
        assert_eq!(
            scrubber.apply("admitted 1990-09-02, discharged 5th October 1990"),
            "admitted [~~~], discharged [~~~]"
        );
    }

    #[test]
    fn invalid_calendar_dates_still_removed() {
        let mut opts = options();
        opts.replace_all_dates_with = Some("[%b %Y]".to_string());
        let scrubber = DateScrubber::new(&opts, "[~~~]").unwrap();
        // 31 Feb does not parse; plain replacement is the fallback.
        assert_eq!(scrubber.apply("on 31/02/1990 x"), "on [~~~] x");
    }

    #[test]
    fn two_digit_years_pivot() {
        assert_eq!(normalise_year(49), 2049);
        assert_eq!(normalise_year(50), 1950);
        assert_eq!(normalise_year(1990), 1990);
    }

    #[test]
    fn source_date_parsing_is_forgiving() {
        let expected = NaiveDate::from_ymd_opt(1990, 9, 2).unwrap();
        for text in ["1990-09-02", "02/09/1990", "2 Sep 1990", "19900902"] {
            assert_eq!(parse_source_date(text), Some(expected), "{text:?}");
        }
        assert!(parse_source_date("not a date").is_none());
    }
}
