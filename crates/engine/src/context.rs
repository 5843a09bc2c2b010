use std::collections::HashSet;

use carryon_core::country_of;
use carryon_core::models::{CabinClass, DutyFreeInfo, Itinerary, RouteType, Segment};

/// Pre-computed view of one itinerary used while matching rules.
#[derive(Debug, Clone)]
pub struct ItineraryContext {
    pub airports: Vec<String>,
    /// Ordered, deduplicated country path: origin, vias, destination.
    pub countries: Vec<String>,
    pub via_countries: Vec<String>,
    /// Countries whose checkpoint screens this carry-on: the origin, plus
    /// each via-point only when the itinerary rescreens at the transfer.
    pub security_countries: Vec<String>,
    pub route_type: RouteType,
    pub rescreening: bool,
    pub carriers: Vec<String>,
    pub cabin_classes: HashSet<CabinClass>,
    pub fare_classes: HashSet<String>,
    pub duty_free: DutyFreeInfo,
}

impl ItineraryContext {
    pub fn new(itinerary: &Itinerary, segments: &[Segment], duty_free: DutyFreeInfo) -> Self {
        let airports = itinerary.airports();

        let mut countries = Vec::new();
        for airport in &airports {
            if let Some(country) = country_of(airport) {
                if !countries.iter().any(|existing| existing == country) {
                    countries.push(country.to_string());
                }
            }
        }

        let via_countries: Vec<String> = itinerary
            .via
            .iter()
            .filter_map(|airport| country_of(airport))
            .map(str::to_string)
            .collect();

        let mut security_countries = Vec::new();
        if let Some(country) = country_of(&itinerary.origin) {
            security_countries.push(country.to_string());
        }
        if itinerary.rescreening {
            for country in &via_countries {
                if !security_countries.contains(country) {
                    security_countries.push(country.clone());
                }
            }
        }

        let origin_country = country_of(&itinerary.origin);
        let destination_country = country_of(&itinerary.destination);
        let route_type = match (origin_country, destination_country) {
            (Some(origin), Some(destination)) if origin == destination => RouteType::Domestic,
            _ => RouteType::International,
        };

        let mut carriers = Vec::new();
        for segment in segments {
            let code = segment.operating.trim().to_uppercase();
            if !code.is_empty() && !carriers.contains(&code) {
                carriers.push(code);
            }
        }

        let cabin_classes = segments
            .iter()
            .filter_map(|segment| segment.cabin_class)
            .collect();
        let fare_classes = segments
            .iter()
            .filter_map(|segment| segment.fare_class.as_deref())
            .map(|fare| fare.trim().to_uppercase())
            .filter(|fare| !fare.is_empty())
            .collect();

        Self {
            airports,
            countries,
            via_countries,
            security_countries,
            route_type,
            rescreening: itinerary.rescreening,
            carriers,
            cabin_classes,
            fare_classes,
            duty_free,
        }
    }

    pub fn has_security_country(&self, code: &str) -> bool {
        self.security_countries.iter().any(|country| country == code)
    }

    pub fn matches_route(&self, wanted: Option<RouteType>) -> bool {
        wanted.map(|route| route == self.route_type).unwrap_or(true)
    }

    pub fn matches_cabin(&self, wanted: Option<CabinClass>) -> bool {
        wanted
            .map(|cabin| self.cabin_classes.contains(&cabin))
            .unwrap_or(true)
    }

    pub fn matches_fare(&self, wanted: Option<&str>) -> bool {
        wanted
            .map(|fare| self.fare_classes.contains(&fare.to_uppercase()))
            .unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn itinerary(origin: &str, via: &[&str], destination: &str, rescreening: bool) -> Itinerary {
        Itinerary {
            origin: origin.to_string(),
            via: via.iter().map(|code| code.to_string()).collect(),
            destination: destination.to_string(),
            rescreening,
        }
    }

    #[test]
    fn route_type_follows_shared_country_codes() {
        let domestic = ItineraryContext::new(&itinerary("GMP", &[], "CJU", false), &[], Default::default());
        assert_eq!(domestic.route_type, RouteType::Domestic);

        let international =
            ItineraryContext::new(&itinerary("ICN", &[], "LAX", false), &[], Default::default());
        assert_eq!(international.route_type, RouteType::International);
    }

    #[test]
    fn country_path_is_ordered_and_deduplicated() {
        let ctx = ItineraryContext::new(
            &itinerary("ICN", &["PVG"], "LAX", true),
            &[],
            Default::default(),
        );
        assert_eq!(ctx.countries, vec!["KR", "CN", "US"]);
        assert_eq!(ctx.via_countries, vec!["CN"]);
    }

    #[test]
    fn rescreening_adds_via_points_to_the_security_set() {
        let screened = ItineraryContext::new(
            &itinerary("ICN", &["PVG"], "LAX", true),
            &[],
            Default::default(),
        );
        assert_eq!(screened.security_countries, vec!["KR", "CN"]);
        assert!(screened.has_security_country("CN"));

        let unscreened = ItineraryContext::new(
            &itinerary("ICN", &["PVG"], "LAX", false),
            &[],
            Default::default(),
        );
        assert_eq!(unscreened.security_countries, vec!["KR"]);
        assert!(!unscreened.has_security_country("CN"));
        // The destination never screens the onward carry-on.
        assert!(!unscreened.has_security_country("US"));
    }

    #[test]
    fn unknown_airports_default_to_international() {
        let ctx = ItineraryContext::new(&itinerary("XXX", &[], "YYY", false), &[], Default::default());
        assert_eq!(ctx.route_type, RouteType::International);
        assert!(ctx.countries.is_empty());
    }

    #[test]
    fn segment_attributes_are_collected() {
        let segments = vec![Segment {
            leg: "ICN-LAX".to_string(),
            operating: "ke".to_string(),
            cabin_class: Some(CabinClass::Prestige),
            fare_class: Some("j".to_string()),
        }];
        let ctx = ItineraryContext::new(&itinerary("ICN", &[], "LAX", false), &segments, Default::default());
        assert_eq!(ctx.carriers, vec!["KE"]);
        assert!(ctx.matches_cabin(Some(CabinClass::Prestige)));
        assert!(!ctx.matches_cabin(Some(CabinClass::Economy)));
        assert!(ctx.matches_fare(Some("J")));
        assert!(ctx.matches_fare(None));
    }
}
