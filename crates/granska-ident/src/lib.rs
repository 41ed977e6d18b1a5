//! # Granska Ident
//!
//! Pure validators and normalizers for Swedish identity data:
//!
//! - [`Personnummer`] — personal identity numbers, incl. samordningsnummer
//! - [`Orgnummer`] — organization numbers with type classification
//! - [`normalize_company_name`] / [`company_name_similarity`]
//! - [`parse_address`] / [`address_similarity`]
//!
//! Everything here is CPU-only and side-effect free.

mod luhn;

pub mod address;
pub mod name;
pub mod orgnummer;
pub mod personnummer;

pub use address::{address_similarity, parse_address, street_match_key, ParsedAddress};
pub use name::{
    company_name_similarity, match_key, normalize_company_name, token_jaccard, LegalForm,
    NormalizedName,
};
pub use orgnummer::{OrgType, Orgnummer, OrgnummerError};
pub use personnummer::{Gender, Personnummer, PersonnummerError};
