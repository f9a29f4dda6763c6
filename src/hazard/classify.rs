/// Per-sample hazard classification.
///
/// Each hazard kind is evaluated independently, so one sample may be
/// flagged for several kinds at once:
///
/// - wind:          present and strictly above `wind_speed`
/// - temperature:   present and at or below `temperature_low`
/// - precipitation: rain > 0, or snowfall > 0, or the weather code is in
///                  `precipitation_codes`
///
/// Precipitation magnitude is the rain amount when positive, else the
/// snowfall amount when positive, else 0 (flagged by code alone).
/// Missing or non-finite values are never hazardous.

use tracing::{trace, warn};

use crate::config::HazardThresholds;
use crate::model::{HazardKind, Sample};

/// Flags for one sample: `Some(magnitude)` for each hazardous kind.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Classification {
    pub wind: Option<f64>,
    pub temperature: Option<f64>,
    pub precipitation: Option<f64>,
}

impl Classification {
    pub fn get(&self, kind: HazardKind) -> Option<f64> {
        match kind {
            HazardKind::Wind => self.wind,
            HazardKind::Temperature => self.temperature,
            HazardKind::Precipitation => self.precipitation,
        }
    }

    pub fn is_clear(&self) -> bool {
        self.wind.is_none() && self.temperature.is_none() && self.precipitation.is_none()
    }
}

/// Stateless classifier over a fixed set of thresholds.
#[derive(Debug, Clone)]
pub struct HazardClassifier {
    thresholds: HazardThresholds,
}

impl HazardClassifier {
    pub fn new(thresholds: HazardThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &HazardThresholds {
        &self.thresholds
    }

    pub fn classify(&self, sample: &Sample) -> Classification {
        let wind = usable(sample, HazardKind::Wind, "wind_speed", sample.wind_speed)
            .filter(|w| *w > self.thresholds.wind_speed);

        let temperature = usable(sample, HazardKind::Temperature, "temperature", sample.temperature)
            .filter(|t| *t <= self.thresholds.temperature_low);

        let rain = usable(sample, HazardKind::Precipitation, "rain", sample.rain).filter(|r| *r > 0.0);
        let snowfall =
            usable(sample, HazardKind::Precipitation, "snowfall", sample.snowfall).filter(|s| *s > 0.0);
        let by_code = sample
            .weather_code
            .is_some_and(|c| self.thresholds.precipitation_codes.contains(&c));

        let precipitation = match (rain, snowfall) {
            (Some(r), _) => Some(r),
            (None, Some(s)) => Some(s),
            (None, None) if by_code => Some(0.0),
            (None, None) => None,
        };

        Classification {
            wind,
            temperature,
            precipitation,
        }
    }
}

/// Passes finite values through; anything else is "not hazardous" and logged.
fn usable(sample: &Sample, kind: HazardKind, field: &'static str, value: Option<f64>) -> Option<f64> {
    match value {
        Some(v) if v.is_finite() => Some(v),
        Some(v) => {
            warn!(timestamp = %sample.timestamp, hazard = %kind, field, value = v, "non-finite value, not classified");
            None
        }
        None => {
            trace!(timestamp = %sample.timestamp, hazard = %kind, field, "value missing, not classified");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn classifier() -> HazardClassifier {
        HazardClassifier::new(HazardThresholds::default())
    }

    fn blank() -> Sample {
        Sample::at(Utc.with_ymd_and_hms(2024, 1, 5, 12, 0, 0).unwrap())
    }

    #[test]
    fn test_wind_threshold_is_strict() {
        let c = classifier();
        let at = |w| c.classify(&Sample { wind_speed: Some(w), ..blank() }).wind;
        assert_eq!(at(58.0), None);
        assert_eq!(at(58.1), Some(58.1));
    }

    #[test]
    fn test_temperature_threshold_is_inclusive() {
        let c = classifier();
        let at = |t| c.classify(&Sample { temperature: Some(t), ..blank() }).temperature;
        assert_eq!(at(-10.0), Some(-10.0));
        assert_eq!(at(-9.9), None);
        assert_eq!(at(-25.0), Some(-25.0));
    }

    #[test]
    fn test_precipitation_magnitude_prefers_rain() {
        let c = classifier();
        let s = Sample { rain: Some(1.2), snowfall: Some(3.0), ..blank() };
        assert_eq!(c.classify(&s).precipitation, Some(1.2));

        let s = Sample { rain: Some(0.0), snowfall: Some(0.7), ..blank() };
        assert_eq!(c.classify(&s).precipitation, Some(0.7));
    }

    #[test]
    fn test_precipitation_code_only_has_zero_magnitude() {
        let c = classifier();
        let s = Sample { rain: Some(0.0), snowfall: Some(0.0), weather_code: Some(61), ..blank() };
        assert_eq!(c.classify(&s).precipitation, Some(0.0));

        let s = Sample { weather_code: Some(3), ..blank() };
        assert_eq!(c.classify(&s).precipitation, None);
    }

    #[test]
    fn test_missing_and_non_finite_values_are_not_hazardous() {
        let c = classifier();
        assert!(c.classify(&blank()).is_clear());

        let s = Sample {
            wind_speed: Some(f64::NAN),
            temperature: Some(f64::NEG_INFINITY),
            rain: Some(f64::INFINITY),
            ..blank()
        };
        assert!(c.classify(&s).is_clear());
    }

    #[test]
    fn test_one_sample_can_raise_several_kinds() {
        let c = classifier();
        let s = Sample {
            wind_speed: Some(70.0),
            temperature: Some(-15.0),
            snowfall: Some(0.4),
            ..blank()
        };
        let flags = c.classify(&s);
        for kind in HazardKind::ALL {
            assert!(flags.get(kind).is_some(), "{kind} should be flagged");
        }
    }

    #[test]
    fn test_configured_thresholds_are_used() {
        let c = HazardClassifier::new(HazardThresholds {
            wind_speed: 30.0,
            temperature_low: -19.0,
            precipitation_codes: [71].into_iter().collect(),
        });
        let s = Sample {
            wind_speed: Some(31.0),
            temperature: Some(-15.0),
            weather_code: Some(61),
            ..blank()
        };
        let flags = c.classify(&s);
        assert_eq!(flags.wind, Some(31.0));
        assert_eq!(flags.temperature, None);
        assert_eq!(flags.precipitation, None);
    }
}
