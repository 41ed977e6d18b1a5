//! Personnummer and samordningsnummer parsing.
//!
//! Accepts 10- or 12-digit forms with an optional `-` or `+` separator.
//! A `+` separator on the 10-digit form means the person is over 100 years
//! old. Day components 61–91 denote samordningsnummer.

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::luhn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PersonnummerError {
    #[error("expected 10 or 12 digits, found {0}")]
    InvalidLength(usize),
    #[error("input contains a non-digit character")]
    NonDigit,
    #[error("no such calendar date")]
    InvalidDate,
    #[error("checksum mismatch")]
    ChecksumMismatch,
    #[error("century digits out of range")]
    InvalidCentury,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// A validated Swedish personal identity number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Personnummer {
    /// Normalized 12-digit form, no separator
    pub normalized: String,
    pub birth_date: NaiveDate,
    pub gender: Gender,
    pub is_samordningsnummer: bool,
}

impl Personnummer {
    /// Parse and validate; see module docs for accepted forms.
    pub fn parse(input: &str) -> Result<Self, PersonnummerError> {
        let trimmed = input.trim();
        let plus_separator = trimmed.contains('+');

        let mut digits: Vec<u8> = Vec::with_capacity(12);
        for c in trimmed.chars() {
            match c {
                '0'..='9' => digits.push(c as u8 - b'0'),
                '-' | '+' | ' ' => continue,
                _ => return Err(PersonnummerError::NonDigit),
            }
        }

        let (year, rest) = match digits.len() {
            12 => {
                let century = u32::from(digits[0]) * 10 + u32::from(digits[1]);
                if !(18..=20).contains(&century) {
                    return Err(PersonnummerError::InvalidCentury);
                }
                let year = century as i32 * 100
                    + i32::from(digits[2]) * 10
                    + i32::from(digits[3]);
                (year, &digits[2..])
            }
            10 => {
                let yy = i32::from(digits[0]) * 10 + i32::from(digits[1]);
                let current_two = Utc::now().year() % 100;
                let mut year = if yy > current_two { 1900 + yy } else { 2000 + yy };
                if plus_separator {
                    year -= 100;
                }
                (year, &digits[..])
            }
            n => return Err(PersonnummerError::InvalidLength(n)),
        };

        // rest is yymmddnnnc (10 digits)
        let month = u32::from(rest[2]) * 10 + u32::from(rest[3]);
        let raw_day = u32::from(rest[4]) * 10 + u32::from(rest[5]);
        let is_samordningsnummer = (61..=91).contains(&raw_day);
        let day = if is_samordningsnummer { raw_day - 60 } else { raw_day };

        let birth_date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or(PersonnummerError::InvalidDate)?;

        if !luhn::verify(rest) {
            return Err(PersonnummerError::ChecksumMismatch);
        }

        let gender = if rest[8] % 2 == 1 {
            Gender::Male
        } else {
            Gender::Female
        };

        let normalized = format!(
            "{:04}{}",
            year,
            rest[2..]
                .iter()
                .map(|d| char::from(b'0' + d))
                .collect::<String>()
        );

        Ok(Self {
            normalized,
            birth_date,
            gender,
            is_samordningsnummer,
        })
    }

    /// `YYYYMMDD-XXXX` display form
    pub fn format_display(&self) -> String {
        format!("{}-{}", &self.normalized[..8], &self.normalized[8..])
    }

    pub fn birth_year(&self) -> i32 {
        self.birth_date.year()
    }
}
