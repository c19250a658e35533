//! Declared variable validation rules

use regex::Regex;

use crate::template::ValidationRule;

/// Check one rule against a resolved value, returning the violation if any.
///
/// Empty values only fail `Required`; the other rules apply to non-empty
/// values so an optional variable can be left blank.
pub fn check_rule(rule: &ValidationRule, value: &str) -> Option<String> {
    let trimmed = value.trim();

    match rule {
        ValidationRule::Required => trimmed
            .is_empty()
            .then(|| "Value is required".to_string()),

        _ if trimmed.is_empty() => None,

        ValidationRule::Regex { pattern } => match Regex::new(pattern) {
            Ok(re) if re.is_match(value) => None,
            Ok(_) => Some(format!("Value does not match pattern '{}'", pattern)),
            Err(e) => Some(format!("Invalid pattern '{}': {}", pattern, e)),
        },

        ValidationRule::Range { min, max } => {
            let Ok(number) = trimmed.parse::<f64>() else {
                return Some(format!("Value '{}' is not a number", trimmed));
            };
            if let Some(min) = min.filter(|min| number < *min) {
                return Some(format!("Value {} is below minimum {}", number, min));
            }
            if let Some(max) = max.filter(|max| number > *max) {
                return Some(format!("Value {} is above maximum {}", number, max));
            }
            None
        }

        ValidationRule::Length { min, max } => {
            let length = value.chars().count();
            if let Some(min) = min.filter(|min| length < *min) {
                return Some(format!("Length {} is below minimum {}", length, min));
            }
            if let Some(max) = max.filter(|max| length > *max) {
                return Some(format!("Length {} is above maximum {}", length, max));
            }
            None
        }
    }
}
