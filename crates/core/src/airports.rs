use std::collections::HashMap;

use once_cell::sync::Lazy;

const AIRPORTS_JSON: &str = include_str!("../../../data/taxonomy/airports.json");

static COUNTRY_BY_AIRPORT: Lazy<HashMap<String, String>> = Lazy::new(|| {
    serde_json::from_str(AIRPORTS_JSON).expect("embedded airport table is valid")
});

/// ISO country code for a three-letter airport code, when known. The full
/// airport directory is an external service; this table covers the routes
/// the regulation data speaks about.
pub fn country_of(airport: &str) -> Option<&'static str> {
    COUNTRY_BY_AIRPORT
        .get(&airport.trim().to_uppercase())
        .map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_airports_resolve() {
        assert_eq!(country_of("icn"), Some("KR"));
        assert_eq!(country_of("LAX"), Some("US"));
        assert_eq!(country_of(" pvg "), Some("CN"));
    }

    #[test]
    fn unknown_airports_are_none() {
        assert_eq!(country_of("XXX"), None);
    }
}
