//! Terminology code validity checks

use std::fmt;

use async_trait::async_trait;

/// Code systems a field can bind to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodeSystem {
    Snomed,
    Loinc,
}

impl fmt::Display for CodeSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodeSystem::Snomed => f.write_str("SNOMED"),
            CodeSystem::Loinc => f.write_str("LOINC"),
        }
    }
}

/// Answers whether a code exists in a code system
#[async_trait]
pub trait TerminologyChecker: Send + Sync {
    async fn is_valid(&self, system: CodeSystem, code: &str) -> bool;
}

/// Offline checker that only verifies code shape.
///
/// SNOMED CT identifiers must be 6 to 18 digits without a leading zero.
/// LOINC codes must be `digits-checkdigit` with a correct mod-10 check digit.
pub struct FormatTerminologyChecker;

#[async_trait]
impl TerminologyChecker for FormatTerminologyChecker {
    async fn is_valid(&self, system: CodeSystem, code: &str) -> bool {
        match system {
            CodeSystem::Snomed => is_snomed_shaped(code),
            CodeSystem::Loinc => is_loinc_shaped(code),
        }
    }
}

fn is_snomed_shaped(code: &str) -> bool {
    (6..=18).contains(&code.len())
        && code.chars().all(|c| c.is_ascii_digit())
        && !code.starts_with('0')
}

fn is_loinc_shaped(code: &str) -> bool {
    let Some((number, check)) = code.split_once('-') else {
        return false;
    };
    if number.is_empty()
        || number.len() > 7
        || check.len() != 1
        || !number.chars().all(|c| c.is_ascii_digit())
    {
        return false;
    }
    let Some(check_digit) = check.chars().next().and_then(|c| c.to_digit(10)) else {
        return false;
    };

    mod10_check_digit(number) == check_digit
}

/// Mod-10 check digit over the digits of `number`, doubling from the right
fn mod10_check_digit(number: &str) -> u32 {
    let sum: u32 = number
        .chars()
        .rev()
        .filter_map(|c| c.to_digit(10))
        .enumerate()
        .map(|(i, d)| {
            if i % 2 == 0 {
                let doubled = d * 2;
                doubled / 10 + doubled % 10
            } else {
                d
            }
        })
        .sum();

    (10 - sum % 10) % 10
}
