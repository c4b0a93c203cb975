//! Partial date and date-time values
//!
//! FHIR allows `YYYY`, `YYYY-MM`, `YYYY-MM-DD` and full date-times with an
//! optional zone; DICOM uses `YYYYMMDD` (DA) and `YYYYMMDDHHMMSS.FFFFFF&ZZXX`
//! (DT). [`PartialDate`] keeps whatever precision the source had so that
//! transforms never invent precision.

use chrono::{Datelike, Duration, NaiveDate};
use regex::Regex;
use std::sync::OnceLock;

use super::errors::VeilError;
use super::result::Result;

/// Textual convention a date was read from, used to write it back
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateStyle {
    /// FHIR `date`
    FhirDate,
    /// FHIR `dateTime` / `instant`
    FhirDateTime,
    /// DICOM DA
    DicomDate,
    /// DICOM DT
    DicomDateTime,
}

/// A calendar date with optional month, day, time and zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialDate {
    pub year: i32,
    pub month: Option<u32>,
    pub day: Option<u32>,
    /// Raw time-of-day text, kept only to know that one was present
    pub time: Option<String>,
    /// Zone designator as written (`Z`, `+01:00`, `&+0100`)
    pub offset: Option<String>,
    pub style: DateStyle,
}

fn fhir_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(\d{4})(?:-(\d{2})(?:-(\d{2})(?:T(\d{2}:\d{2}(?::\d{2}(?:\.\d+)?)?)(Z|[+-]\d{2}:\d{2})?)?)?)?$",
        )
        .expect("static FHIR date pattern")
    })
}

fn dicom_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d{4})(\d{2})?(\d{2})?(\d{2}(?:\d{2}(?:\d{2}(?:\.\d{1,6})?)?)?)?([+-]\d{4})?$")
            .expect("static DICOM date pattern")
    })
}

impl PartialDate {
    /// Parses a FHIR `date`, `dateTime` or `instant`
    pub fn parse_fhir(text: &str, style: DateStyle) -> Result<Self> {
        let captures = fhir_pattern()
            .captures(text.trim())
            .ok_or_else(|| VeilError::format(format!("Invalid FHIR date: '{text}'")))?;
        let date = Self {
            year: parse_number(captures.get(1).map(|m| m.as_str()), text)?,
            month: parse_optional(captures.get(2).map(|m| m.as_str()), text)?,
            day: parse_optional(captures.get(3).map(|m| m.as_str()), text)?,
            time: captures.get(4).map(|m| m.as_str().to_string()),
            offset: captures.get(5).map(|m| m.as_str().to_string()),
            style,
        };
        date.check_calendar(text)?;
        Ok(date)
    }

    /// Parses a DICOM DA or DT value
    pub fn parse_dicom(text: &str, style: DateStyle) -> Result<Self> {
        let captures = dicom_pattern()
            .captures(text.trim())
            .ok_or_else(|| VeilError::format(format!("Invalid DICOM date: '{text}'")))?;
        let date = Self {
            year: parse_number(captures.get(1).map(|m| m.as_str()), text)?,
            month: parse_optional(captures.get(2).map(|m| m.as_str()), text)?,
            day: parse_optional(captures.get(3).map(|m| m.as_str()), text)?,
            time: captures.get(4).map(|m| m.as_str().to_string()),
            offset: captures.get(5).map(|m| m.as_str().to_string()),
            style,
        };
        date.check_calendar(text)?;
        Ok(date)
    }

    /// Parses according to `style`
    pub fn parse(text: &str, style: DateStyle) -> Result<Self> {
        match style {
            DateStyle::FhirDate | DateStyle::FhirDateTime => Self::parse_fhir(text, style),
            DateStyle::DicomDate | DateStyle::DicomDateTime => Self::parse_dicom(text, style),
        }
    }

    fn check_calendar(&self, text: &str) -> Result<()> {
        if let Some(month) = self.month {
            if !(1..=12).contains(&month) {
                return Err(VeilError::format(format!("Invalid month in date '{text}'")));
            }
        }
        if self.day.is_some() && self.to_naive_date().is_none() {
            return Err(VeilError::format(format!("Invalid day in date '{text}'")));
        }
        Ok(())
    }

    /// True when the value carries day-of-month precision
    pub fn has_day(&self) -> bool {
        self.month.is_some() && self.day.is_some()
    }

    /// Calendar date, available only with full day precision
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month?, self.day?)
    }

    /// Completed years between this date and `today`
    ///
    /// Missing month or day count as January/first so partial dates give the
    /// largest plausible age.
    pub fn age_on(&self, today: NaiveDate) -> i32 {
        let month = self.month.unwrap_or(1);
        let day = self.day.unwrap_or(1);
        let mut age = today.year() - self.year;
        if (today.month(), today.day()) < (month, day) {
            age -= 1;
        }
        age
    }

    /// Moves the date by `days`, zeroing any time-of-day
    ///
    /// Returns `None` when the date lacks day precision.
    pub fn shifted(&self, days: i64) -> Option<Self> {
        let shifted = self.to_naive_date()?.checked_add_signed(Duration::days(days))?;
        Some(Self {
            year: shifted.year(),
            month: Some(shifted.month()),
            day: Some(shifted.day()),
            time: self.time.as_ref().map(|_| String::new()),
            offset: self.offset.clone(),
            style: self.style,
        })
    }

    /// Year-only rendering in the source convention
    pub fn year_only(&self) -> String {
        format!("{:04}", self.year)
    }

    /// Renders the value back in its source convention; times are written as midnight
    pub fn render(&self) -> String {
        let mut out = format!("{:04}", self.year);
        let dicom = matches!(self.style, DateStyle::DicomDate | DateStyle::DicomDateTime);
        if let Some(month) = self.month {
            if dicom {
                out.push_str(&format!("{month:02}"));
            } else {
                out.push_str(&format!("-{month:02}"));
            }
            if let Some(day) = self.day {
                if dicom {
                    out.push_str(&format!("{day:02}"));
                } else {
                    out.push_str(&format!("-{day:02}"));
                }
            }
        }
        if let Some(time) = &self.time {
            if time.is_empty() {
                out.push_str(if dicom { "000000" } else { "T00:00:00" });
            } else if dicom {
                out.push_str(time);
            } else {
                out.push('T');
                out.push_str(time);
            }
            if let Some(offset) = &self.offset {
                out.push_str(offset);
            }
        }
        out
    }
}

fn parse_number(part: Option<&str>, text: &str) -> Result<i32> {
    part.and_then(|p| p.parse().ok())
        .ok_or_else(|| VeilError::format(format!("Invalid date '{text}'")))
}

fn parse_optional(part: Option<&str>, text: &str) -> Result<Option<u32>> {
    part.map(|p| {
        p.parse::<u32>()
            .map_err(|_| VeilError::format(format!("Invalid date '{text}'")))
    })
    .transpose()
}

/// Age value in years parsed from a DICOM AS string (`092Y`, `006M`, `003W`, `010D`)
pub fn parse_dicom_age(text: &str) -> Result<f64> {
    let text = text.trim();
    if text.len() != 4 {
        return Err(VeilError::format(format!("Invalid DICOM age string: '{text}'")));
    }
    let (digits, unit) = text.split_at(3);
    let amount: f64 = digits
        .parse::<u32>()
        .map_err(|_| VeilError::format(format!("Invalid DICOM age string: '{text}'")))?
        .into();
    match unit {
        "Y" => Ok(amount),
        "M" => Ok(amount / 12.0),
        "W" => Ok(amount * 7.0 / 365.25),
        "D" => Ok(amount / 365.25),
        _ => Err(VeilError::format(format!("Invalid DICOM age unit in '{text}'"))),
    }
}
