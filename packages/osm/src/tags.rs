//! OSM tag filters for the drivable network and traffic controls.

/// `highway=*` values that make up the drivable network.
pub const DRIVABLE_HIGHWAYS: &[&str] = &[
    "motorway",
    "motorway_link",
    "trunk",
    "trunk_link",
    "primary",
    "primary_link",
    "secondary",
    "secondary_link",
    "tertiary",
    "tertiary_link",
    "unclassified",
    "residential",
    "living_street",
    "road",
    "service",
];

/// `service=*` values excluded from the drivable network.
pub const EXCLUDED_SERVICES: &[&str] = &[
    "alley",
    "driveway",
    "emergency_access",
    "parking",
    "parking_aisle",
    "private",
];

/// `highway=*` values on a node that mark a traffic control.
pub const SIGNAL_HIGHWAYS: &[&str] = &["traffic_signals", "stop"];

/// `crossing=*` values on a node that mark a traffic control.
pub const SIGNAL_CROSSINGS: &[&str] = &["traffic_signals"];

/// Whether a way's tags describe a public drivable road.
pub fn is_drivable<'a>(tags: impl IntoIterator<Item = (&'a str, &'a str)>) -> bool {
    let mut highway = None;
    for (key, value) in tags {
        match key {
            "highway" => highway = Some(value),
            "area" if value == "yes" => return false,
            "access" if value == "private" => return false,
            "motor_vehicle" | "motorcar" if value == "no" => return false,
            "service" if EXCLUDED_SERVICES.contains(&value) => return false,
            _ => {}
        }
    }
    highway.is_some_and(|h| DRIVABLE_HIGHWAYS.contains(&h))
}

/// Whether a node's tags mark a traffic signal, stop sign, or signalized
/// crossing.
pub fn is_signal<'a>(tags: impl IntoIterator<Item = (&'a str, &'a str)>) -> bool {
    tags.into_iter().any(|(key, value)| match key {
        "highway" => SIGNAL_HIGHWAYS.contains(&value),
        "crossing" => SIGNAL_CROSSINGS.contains(&value),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_drivable_roads() {
        assert!(is_drivable([("highway", "residential"), ("name", "Pine St")]));
        assert!(is_drivable([("highway", "primary_link")]));
        assert!(is_drivable([("highway", "service")]));
    }

    #[test]
    fn rejects_non_drivable_ways() {
        assert!(!is_drivable([("highway", "footway")]));
        assert!(!is_drivable([("highway", "cycleway")]));
        assert!(!is_drivable([("building", "yes")]));
        assert!(!is_drivable([("highway", "service"), ("service", "parking_aisle")]));
        assert!(!is_drivable([("highway", "service"), ("service", "driveway")]));
        assert!(!is_drivable([("highway", "residential"), ("access", "private")]));
        assert!(!is_drivable([("highway", "pedestrian"), ("area", "yes")]));
        assert!(!is_drivable([("highway", "tertiary"), ("motor_vehicle", "no")]));
    }

    #[test]
    fn recognizes_traffic_controls() {
        assert!(is_signal([("highway", "traffic_signals")]));
        assert!(is_signal([("highway", "stop")]));
        assert!(is_signal([("highway", "crossing"), ("crossing", "traffic_signals")]));
        assert!(!is_signal([("highway", "crossing"), ("crossing", "zebra")]));
        assert!(!is_signal([("highway", "give_way")]));
        assert!(!is_signal(std::iter::empty()));
    }
}
