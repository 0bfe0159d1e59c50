//! Zone identifier resolution over an injectable catalog.
//!
//! The registry owns the set of zones it will resolve. [`ZoneRegistry::new`] uses
//! the IANA database compiled into `chrono-tz`; [`ZoneRegistry::with_zones`] builds a
//! frozen fixture catalog so results do not depend on which database happens to be
//! bundled.

use std::fmt;

use chrono_tz::{Tz, TZ_VARIANTS};
use serde::Serialize;
use tracing::{debug, trace};

use crate::error::{Result, ScheduleError};

/// Common abbreviations and the one canonical zone each resolves to.
///
/// Real-world abbreviations are ambiguous (`CST`, `IST`, `BST` all name several
/// zones); each entry here is the documented choice.
pub const ABBREVIATIONS: &[(&str, &str)] = &[
    ("UTC", "UTC"),
    ("GMT", "Europe/London"),
    ("BST", "Europe/London"),
    ("WET", "Europe/Lisbon"),
    ("CET", "Europe/Paris"),
    ("CEST", "Europe/Paris"),
    ("EET", "Europe/Athens"),
    ("EEST", "Europe/Athens"),
    ("MSK", "Europe/Moscow"),
    ("EST", "America/New_York"),
    ("EDT", "America/New_York"),
    ("CST", "America/Chicago"),
    ("CDT", "America/Chicago"),
    ("MST", "America/Denver"),
    ("MDT", "America/Denver"),
    ("PST", "America/Los_Angeles"),
    ("PDT", "America/Los_Angeles"),
    ("AKST", "America/Anchorage"),
    ("AKDT", "America/Anchorage"),
    ("HST", "Pacific/Honolulu"),
    ("BRT", "America/Sao_Paulo"),
    ("GST", "Asia/Dubai"),
    ("IST", "Asia/Kolkata"),
    ("SGT", "Asia/Singapore"),
    ("HKT", "Asia/Hong_Kong"),
    ("CCT", "Asia/Shanghai"),
    ("KST", "Asia/Seoul"),
    ("JST", "Asia/Tokyo"),
    ("AWST", "Australia/Perth"),
    ("ACST", "Australia/Adelaide"),
    ("AEST", "Australia/Sydney"),
    ("AEDT", "Australia/Sydney"),
    ("NZST", "Pacific/Auckland"),
    ("NZDT", "Pacific/Auckland"),
];

/// Region label for zone names without a `/` (e.g. `UTC`, `EST5EDT`).
pub const OTHER_REGION: &str = "Other";

fn region_of(name: &str) -> &str {
    name.split_once('/').map_or(OTHER_REGION, |(region, _)| region)
}

// ── ZoneHandle ──────────────────────────────────────────────────────────────

/// A resolved time zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneHandle {
    name: &'static str,
    #[serde(skip)]
    tz: Tz,
    abbreviations: Vec<&'static str>,
}

impl ZoneHandle {
    fn from_tz(tz: Tz) -> Self {
        let name = tz.name();
        let abbreviations = ABBREVIATIONS
            .iter()
            .filter(|(_, canonical)| *canonical == name)
            .map(|(abbr, _)| *abbr)
            .collect();
        ZoneHandle {
            name,
            tz,
            abbreviations,
        }
    }

    /// Canonical IANA name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }

    /// Abbreviations from [`ABBREVIATIONS`] that resolve to this zone.
    pub fn abbreviations(&self) -> &[&'static str] {
        &self.abbreviations
    }

    /// Continent/region prefix of the name, or [`OTHER_REGION`].
    pub fn region(&self) -> &'static str {
        region_of(self.name)
    }
}

impl fmt::Display for ZoneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl From<Tz> for ZoneHandle {
    fn from(tz: Tz) -> Self {
        ZoneHandle::from_tz(tz)
    }
}

/// Zones sharing a region prefix, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoneGroup {
    pub region: &'static str,
    pub zones: Vec<ZoneHandle>,
}

// ── ZoneRegistry ────────────────────────────────────────────────────────────

/// Resolves raw zone identifiers against a fixed catalog.
#[derive(Debug, Clone)]
pub struct ZoneRegistry {
    /// Sorted by region, then name.
    zones: Vec<Tz>,
}

impl Default for ZoneRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoneRegistry {
    /// Registry over every zone bundled with `chrono-tz`.
    pub fn new() -> Self {
        Self::from_catalog(TZ_VARIANTS.to_vec())
    }

    /// Registry restricted to the named zones.
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::UnknownZone`] for a name that is not a valid IANA zone.
    pub fn with_zones<'a>(names: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let zones = names
            .into_iter()
            .map(|name| {
                name.parse::<Tz>()
                    .map_err(|_| ScheduleError::UnknownZone(name.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_catalog(zones))
    }

    fn from_catalog(mut zones: Vec<Tz>) -> Self {
        zones.sort_by_key(|tz| (region_of(tz.name()), tz.name()));
        zones.dedup();
        ZoneRegistry { zones }
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }

    fn contains(&self, tz: &Tz) -> bool {
        self.zones.contains(tz)
    }

    /// Resolve a known abbreviation (case-insensitive) or an IANA name (case-sensitive).
    ///
    /// # Errors
    ///
    /// Returns [`ScheduleError::UnknownZone`] if neither lookup matches a zone in
    /// this registry's catalog.
    ///
    /// # Examples
    ///
    /// ```
    /// use scheduling_engine::zone::ZoneRegistry;
    ///
    /// let registry = ZoneRegistry::new();
    /// assert_eq!(registry.resolve("pst").unwrap().name(), "America/Los_Angeles");
    /// assert_eq!(registry.resolve("Asia/Tokyo").unwrap().name(), "Asia/Tokyo");
    /// assert!(registry.resolve("Mars/Olympus_Mons").is_err());
    /// ```
    pub fn resolve(&self, raw: &str) -> Result<ZoneHandle> {
        let raw = raw.trim();

        // Abbreviations win over the legacy fixed-offset IANA names they collide
        // with (`EST`, `MST`, `GMT`).
        let abbreviation = ABBREVIATIONS
            .iter()
            .find(|(abbr, _)| abbr.eq_ignore_ascii_case(raw));
        if let Some((_, canonical)) = abbreviation {
            if let Some(tz) = canonical.parse::<Tz>().ok().filter(|tz| self.contains(tz)) {
                trace!(raw, zone = tz.name(), "resolved zone abbreviation");
                return Ok(ZoneHandle::from_tz(tz));
            }
        }

        match raw.parse::<Tz>() {
            Ok(tz) if self.contains(&tz) => Ok(ZoneHandle::from_tz(tz)),
            _ => {
                debug!(raw, "unknown zone identifier");
                Err(ScheduleError::UnknownZone(raw.to_string()))
            }
        }
    }

    /// Zones in catalog order, optionally filtered by a case-insensitive substring of
    /// the canonical name. Each call starts a fresh iteration.
    pub fn list<'a>(&'a self, filter: Option<&str>) -> impl Iterator<Item = ZoneHandle> + 'a {
        let needle = filter.map(str::to_lowercase);
        self.zones
            .iter()
            .filter(move |tz| {
                needle
                    .as_deref()
                    .is_none_or(|n| tz.name().to_lowercase().contains(n))
            })
            .map(|tz| ZoneHandle::from_tz(*tz))
    }

    /// [`list`](Self::list) grouped by region.
    pub fn groups(&self, filter: Option<&str>) -> Vec<ZoneGroup> {
        let mut groups: Vec<ZoneGroup> = Vec::new();
        for handle in self.list(filter) {
            match groups.last_mut() {
                Some(group) if group.region == handle.region() => group.zones.push(handle),
                _ => groups.push(ZoneGroup {
                    region: handle.region(),
                    zones: vec![handle],
                }),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_iana_name() {
        let registry = ZoneRegistry::new();
        let handle = registry.resolve("America/New_York").unwrap();
        assert_eq!(handle.name(), "America/New_York");
        assert_eq!(handle.tz(), Tz::America__New_York);
        assert_eq!(handle.region(), "America");
        assert!(handle.abbreviations().contains(&"EST"));
        assert!(handle.abbreviations().contains(&"EDT"));
    }

    #[test]
    fn test_resolve_iana_name_is_case_sensitive() {
        let registry = ZoneRegistry::new();
        let err = registry.resolve("america/new_york").unwrap_err();
        assert_eq!(err, ScheduleError::UnknownZone("america/new_york".to_string()));
    }

    #[test]
    fn test_resolve_abbreviations() {
        let registry = ZoneRegistry::new();
        let cases = [
            ("PST", "America/Los_Angeles"),
            ("pst", "America/Los_Angeles"),
            ("EsT", "America/New_York"),
            ("IST", "Asia/Kolkata"),
            ("GMT", "Europe/London"),
            ("JST", "Asia/Tokyo"),
            ("CST", "America/Chicago"),
            (" UTC ", "UTC"),
            ("EST", "America/New_York"),
            ("MST", "America/Denver"),
        ];
        for (raw, expected) in cases {
            assert_eq!(registry.resolve(raw).unwrap().name(), expected, "{raw}");
        }
    }

    #[test]
    fn test_resolve_unknown() {
        let registry = ZoneRegistry::new();
        let err = registry.resolve("XYZ").unwrap_err();
        assert!(err.to_string().contains("Unknown zone"), "got: {err}");
    }

    #[test]
    fn test_every_abbreviation_targets_a_real_zone() {
        for (abbr, canonical) in ABBREVIATIONS {
            assert!(canonical.parse::<Tz>().is_ok(), "{abbr} -> {canonical}");
        }
    }

    #[test]
    fn test_fixture_registry_limits_catalog() {
        let registry = ZoneRegistry::with_zones(["UTC", "Asia/Tokyo"]).unwrap();
        assert_eq!(registry.len(), 2);
        assert!(registry.resolve("Asia/Tokyo").is_ok());
        assert!(registry.resolve("JST").is_ok());
        assert!(registry.resolve("Europe/Paris").is_err());
        // Abbreviation maps to a zone outside the fixture.
        assert!(registry.resolve("PST").is_err());
        assert!(registry.resolve("EST").is_err());
    }

    #[test]
    fn test_fixture_registry_rejects_bad_name() {
        let err = ZoneRegistry::with_zones(["UTC", "Nowhere/Land"]).unwrap_err();
        assert_eq!(err, ScheduleError::UnknownZone("Nowhere/Land".to_string()));
    }

    #[test]
    fn test_list_filter_case_insensitive() {
        let registry = ZoneRegistry::new();
        let names: Vec<_> = registry.list(Some("new_YORK")).map(|z| z.name()).collect();
        assert!(names.contains(&"America/New_York"));
        assert!(names.iter().all(|n| n.to_lowercase().contains("new_york")));
    }

    #[test]
    fn test_list_is_restartable_and_ordered() {
        let names = ["Europe/Paris", "UTC", "America/Chicago", "Asia/Tokyo"];
        let registry = ZoneRegistry::with_zones(names).unwrap();
        let first: Vec<_> = registry.list(None).map(|z| z.name()).collect();
        let second: Vec<_> = registry.list(None).map(|z| z.name()).collect();
        assert_eq!(first, second);
        assert_eq!(first, vec!["America/Chicago", "Asia/Tokyo", "Europe/Paris", "UTC"]);
    }

    #[test]
    fn test_groups_by_region() {
        let registry = ZoneRegistry::with_zones([
            "Europe/Paris",
            "Europe/Berlin",
            "UTC",
            "America/Chicago",
            "America/Denver",
        ])
        .unwrap();
        let groups = registry.groups(None);
        let regions: Vec<_> = groups.iter().map(|g| g.region).collect();
        assert_eq!(regions, vec!["America", "Europe", "Other"]);
        assert_eq!(groups[1].zones[0].name(), "Europe/Berlin");
        assert_eq!(groups[2].zones[0].name(), "UTC");

        let filtered = registry.groups(Some("paris"));
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].zones.len(), 1);
    }

    #[test]
    fn test_full_catalog_is_large() {
        let registry = ZoneRegistry::new();
        assert!(registry.len() > 300);
        assert!(!registry.is_empty());
    }
}
