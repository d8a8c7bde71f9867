use crate::model::Condition;

pub const UNKNOWN_LABEL: &str = "Unknown";
pub const UNKNOWN_ICON: &str = "?";

const COMPASS_POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Maps a WMO weather code to the `(label, icon)` pair shown on the panel.
pub fn lookup(code: i32) -> (&'static str, &'static str) {
    match code {
        0 => ("Clear", "☀"),
        1 => ("Mostly Clear", "🌤"),
        2 => ("Partly Cloudy", "⛅"),
        3 => ("Overcast", "☁"),
        45 => ("Foggy", "🌫"),
        48 => ("Rime Fog", "🌫"),
        51 => ("Light Drizzle", "🌦"),
        53 => ("Drizzle", "🌦"),
        55 => ("Heavy Drizzle", "🌦"),
        61 => ("Light Rain", "🌧"),
        63 => ("Rain", "🌧"),
        65 => ("Heavy Rain", "🌧"),
        71 => ("Light Snow", "❄"),
        73 => ("Snow", "❄"),
        75 => ("Heavy Snow", "❄"),
        95 => ("Thunderstorm", "⛈"),
        _ => (UNKNOWN_LABEL, UNKNOWN_ICON),
    }
}

pub fn condition(code: Option<i32>) -> Condition {
    let (label, icon) = code.map(lookup).unwrap_or((UNKNOWN_LABEL, UNKNOWN_ICON));
    Condition {
        code,
        label: label.to_string(),
        icon: icon.to_string(),
    }
}

/// 16-point compass label: `round(degrees / 22.5) mod 16`.
pub fn compass(degrees: f64) -> &'static str {
    if !degrees.is_finite() {
        return COMPASS_POINTS[0];
    }

    let sector = (degrees.rem_euclid(360.0) / 22.5).round() as usize;
    COMPASS_POINTS[sector % COMPASS_POINTS.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weather_code_maps_clear_sky() {
        assert_eq!(lookup(0), ("Clear", "☀"));
    }

    #[test]
    fn weather_code_maps_rain_family() {
        assert_eq!(lookup(61).0, "Light Rain");
        assert_eq!(lookup(65).0, "Heavy Rain");
    }

    #[test]
    fn weather_code_unknown_codes_map_to_sentinel() {
        for code in [-1, 4, 80, 96, 99, 999] {
            assert_eq!(lookup(code), ("Unknown", "?"), "code {code}");
        }
    }

    #[test]
    fn weather_code_missing_code_keeps_sentinel_condition() {
        let condition = condition(None);
        assert_eq!(condition.code, None);
        assert_eq!(condition.label, "Unknown");
        assert_eq!(condition.icon, "?");
    }

    #[test]
    fn compass_rounds_to_nearest_sector() {
        assert_eq!(compass(354.0), "N");
        assert_eq!(compass(11.0), "N");
        assert_eq!(compass(12.0), "NNE");
        assert_eq!(compass(225.0), "SW");
        assert_eq!(compass(337.5), "NNW");
    }

    #[test]
    fn compass_wraps_full_turns() {
        assert_eq!(compass(360.0), compass(0.0));
        assert_eq!(compass(-90.0), "W");

        let mut degrees = 0.0;
        while degrees < 360.0 {
            assert_eq!(compass(degrees), compass(degrees + 360.0), "degrees {degrees}");
            degrees += 7.5;
        }
    }
}
