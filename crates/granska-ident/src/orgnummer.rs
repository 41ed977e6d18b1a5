//! Organisationsnummer parsing and classification.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::luhn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OrgnummerError {
    #[error("expected 10 digits (12 with '16' prefix), found {0}")]
    InvalidLength(usize),
    #[error("input contains a non-digit character")]
    NonDigit,
    #[error("group digits below 20: this is a personnummer")]
    LooksLikePersonnummer,
    #[error("checksum mismatch")]
    ChecksumMismatch,
}

/// Organization class by leading digit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgType {
    /// 1 — dödsbo
    Estate,
    /// 2 — stat, region, kommun
    StateMunicipal,
    /// 5 — partnership group
    Partnership,
    /// 6 — limited partnership
    LimitedPartnership,
    /// 7 — economic association or foundation
    EconomicAssociation,
    /// 8 — non-profit or foundation
    NonProfit,
    /// 9 — foreign company branch
    Foreign,
    Unknown,
}

impl OrgType {
    fn from_leading_digit(d: u8) -> Self {
        match d {
            1 => Self::Estate,
            2 => Self::StateMunicipal,
            5 => Self::Partnership,
            6 => Self::LimitedPartnership,
            7 => Self::EconomicAssociation,
            8 => Self::NonProfit,
            9 => Self::Foreign,
            _ => Self::Unknown,
        }
    }
}

/// A validated Swedish organization number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Orgnummer {
    /// Normalized 10-digit form, no separator, no `16` prefix
    pub normalized: String,
    pub org_type: OrgType,
    /// Heuristic: leading digit 5 with group number 56–99
    pub is_aktiebolag: bool,
}

impl Orgnummer {
    pub fn parse(input: &str) -> Result<Self, OrgnummerError> {
        let mut digits: Vec<u8> = Vec::with_capacity(12);
        for c in input.trim().chars() {
            match c {
                '0'..='9' => digits.push(c as u8 - b'0'),
                '-' | ' ' => continue,
                _ => return Err(OrgnummerError::NonDigit),
            }
        }

        // Skatteverket's 12-digit form carries a '16' prefix
        if digits.len() == 12 && digits[0] == 1 && digits[1] == 6 {
            digits.drain(..2);
        }
        if digits.len() != 10 {
            return Err(OrgnummerError::InvalidLength(digits.len()));
        }

        let group = u32::from(digits[2]) * 10 + u32::from(digits[3]);
        if group < 20 {
            return Err(OrgnummerError::LooksLikePersonnummer);
        }

        if !luhn::verify(&digits) {
            return Err(OrgnummerError::ChecksumMismatch);
        }

        let org_type = OrgType::from_leading_digit(digits[0]);
        let is_aktiebolag = digits[0] == 5 && (56..=99).contains(&group);

        let normalized: String = digits.iter().map(|d| char::from(b'0' + d)).collect();
        Ok(Self {
            normalized,
            org_type,
            is_aktiebolag,
        })
    }

    /// `XXXXXX-XXXX` display form
    pub fn format_display(&self) -> String {
        format!("{}-{}", &self.normalized[..6], &self.normalized[6..])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_ten_digit_form_parses() {
        let o = Orgnummer::parse("5561234567").unwrap();
        assert_eq!(o.normalized, "5561234567");
        assert_eq!(o.org_type, OrgType::Partnership);
        assert!(o.is_aktiebolag);
    }

    #[test]
    fn separator_and_prefix_stripped() {
        assert_eq!(
            Orgnummer::parse("556123-4567").unwrap().normalized,
            "5561234567"
        );
        assert_eq!(
            Orgnummer::parse("165561234567").unwrap().normalized,
            "5561234567"
        );
    }

    #[test]
    fn state_numbers_classified() {
        let o = Orgnummer::parse("212000-0142").unwrap();
        assert_eq!(o.org_type, OrgType::StateMunicipal);
        assert!(!o.is_aktiebolag);
    }

    #[test]
    fn group_below_twenty_is_a_personnummer() {
        assert_eq!(
            Orgnummer::parse("5511234560"),
            Err(OrgnummerError::LooksLikePersonnummer)
        );
    }

    #[test]
    fn checksum_mismatch_rejected() {
        assert_eq!(
            Orgnummer::parse("5561234568"),
            Err(OrgnummerError::ChecksumMismatch)
        );
    }

    #[test]
    fn display_format() {
        let o = Orgnummer::parse("5561234567").unwrap();
        assert_eq!(o.format_display(), "556123-4567");
    }

    #[test]
    fn unknown_leading_digit() {
        // 3 is not an assigned class; number must still Luhn-validate
        // 332000014 -> products 6,3,4,0,0,0,0,1,8 -> sum 22 -> check 8
        let o = Orgnummer::parse("3320000148").unwrap();
        assert_eq!(o.org_type, OrgType::Unknown);
    }
}
