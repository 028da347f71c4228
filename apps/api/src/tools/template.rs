//! Literal prompt templating: `{name}` slots replaced with supplied values,
//! nothing else. No escaping, no nesting, no logic.

use crate::errors::AppError;

/// Every placeholder name any tool template may use. After substitution,
/// a surviving slot from this list means a required value was never supplied.
const KNOWN_PLACEHOLDERS: [&str; 2] = ["job_description", "resume_text"];

/// Substitutes each `(name, value)` pair into the template.
/// Fails with `MissingPlaceholder` when a value is empty after trimming, or
/// when a known placeholder survives substitution (required key absent).
/// No model call happens on failure: callers render before invoking.
pub fn render(template: &str, context: &[(&'static str, &str)]) -> Result<String, AppError> {
    let mut out = template.to_string();

    for (name, value) in context {
        if value.trim().is_empty() {
            return Err(AppError::MissingPlaceholder(name));
        }
        out = out.replace(&format!("{{{name}}}"), value);
    }

    for name in KNOWN_PLACEHOLDERS {
        if out.contains(&format!("{{{name}}}")) {
            return Err(AppError::MissingPlaceholder(name));
        }
    }

    Ok(out)
}
