use std::sync::LazyLock;

use regex::Regex;

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?[0-9]*\.?[0-9]+").unwrap());

/// First signed decimal substring of `text`, parsed.
///
/// Property cells come back as free text ("54.4±3.0 °C", "12.5 mg/mol");
/// everything after the first number is unit noise.
pub fn first_number(text: &str) -> Option<f64> {
    let matched = first_number_str(text)?;
    matched.parse::<f64>().ok()
}

/// First signed decimal substring of `text`, unparsed.
pub fn first_number_str(text: &str) -> Option<String> {
    NUMBER_RE.find(text).map(|m| m.as_str().to_string())
}
