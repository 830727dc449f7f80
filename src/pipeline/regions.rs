//! Region canonicalization: map city names onto their state or territory.
//!
//! Models mix cities, states and alternate spellings freely. Downstream
//! consumers want one administrative name per region, so every region string
//! is trimmed, looked up in a static alias table and otherwise title-cased.

use once_cell::sync::Lazy;
use std::collections::HashMap;

/// City (and legacy city name) → state/territory.
static REGION_ALIASES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Mumbai", "Maharashtra"),
        ("Bombay", "Maharashtra"),
        ("Pune", "Maharashtra"),
        ("Nagpur", "Maharashtra"),
        ("Delhi", "Delhi"),
        ("New Delhi", "Delhi"),
        ("Bangalore", "Karnataka"),
        ("Bengaluru", "Karnataka"),
        ("Mysore", "Karnataka"),
        ("Chennai", "Tamil Nadu"),
        ("Madras", "Tamil Nadu"),
        ("Kolkata", "West Bengal"),
        ("Calcutta", "West Bengal"),
        ("Hyderabad", "Telangana"),
        ("Ahmedabad", "Gujarat"),
        ("Surat", "Gujarat"),
        ("Gurgaon", "Haryana"),
        ("Gurugram", "Haryana"),
        ("Noida", "Uttar Pradesh"),
        ("Lucknow", "Uttar Pradesh"),
        ("Jaipur", "Rajasthan"),
        ("Patna", "Bihar"),
        ("Bhopal", "Madhya Pradesh"),
        ("Kochi", "Kerala"),
        ("Cochin", "Kerala"),
        ("Thiruvananthapuram", "Kerala"),
        ("Bhubaneswar", "Odisha"),
        ("Chandigarh", "Chandigarh"),
    ])
});

/// Look up a trimmed region name in the alias table.
pub fn lookup_alias(region: &str) -> Option<&'static str> {
    REGION_ALIASES.get(region).copied()
}

/// Title-case: upper-case every letter that follows a non-letter, lower-case
/// the rest. `"uttar pradesh"` → `"Uttar Pradesh"`, `"jammu-kashmir"` →
/// `"Jammu-Kashmir"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_is_letter = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_is_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(c);
            prev_is_letter = false;
        }
    }
    out
}

/// Canonical form of one region string, or `None` when it is blank.
pub fn canonical_region(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Some(state) = lookup_alias(trimmed) {
        return Some(state.to_string());
    }
    let titled = title_case(trimmed);
    // Second lookup keeps lower-cased city names ("mumbai") stable.
    Some(
        lookup_alias(&titled)
            .map(str::to_string)
            .unwrap_or(titled),
    )
}

/// Canonicalize a list of regions, dropping blanks and duplicates while
/// keeping first-occurrence order.
pub fn canonicalize_regions<I, S>(regions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out: Vec<String> = Vec::new();
    for r in regions {
        if let Some(canon) = canonical_region(r.as_ref()) {
            if !out.contains(&canon) {
                out.push(canon);
            }
        }
    }
    out
}
