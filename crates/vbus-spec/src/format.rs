//! Locale-aware text rendering of raw values.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, TimeZone, Utc};

use crate::model::{RootKind, Type};
use crate::units::Unit;

/// Seconds between the Unix epoch and 2001-01-01T00:00:00Z.
const DATETIME_EPOCH_OFFSET: i64 = 978_307_200;

/// Locale data used for formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Locale {
    pub language: &'static str,
    pub decimal_separator: char,
    /// Two-letter abbreviations, Monday first
    pub weekdays: [&'static str; 7],
    /// `strftime` pattern for DateTime values
    pub datetime_pattern: &'static str,
}

const EN: Locale = Locale {
    language: "en",
    decimal_separator: '.',
    weekdays: ["Mo", "Tu", "We", "Th", "Fr", "Sa", "Su"],
    datetime_pattern: "%m/%d/%Y %H:%M:%S",
};

const DE: Locale = Locale {
    language: "de",
    decimal_separator: ',',
    weekdays: ["Mo", "Di", "Mi", "Do", "Fr", "Sa", "So"],
    datetime_pattern: "%d.%m.%Y %H:%M:%S",
};

const FR: Locale = Locale {
    language: "fr",
    decimal_separator: ',',
    weekdays: ["Lu", "Ma", "Me", "Je", "Ve", "Sa", "Di"],
    datetime_pattern: "%d/%m/%Y %H:%M:%S",
};

impl Locale {
    /// Locale for a language tag; unknown tags use English.
    pub fn for_language(language: &str) -> &'static Locale {
        let primary = language.split(['-', '_']).next().unwrap_or(language);
        match primary.to_ascii_lowercase().as_str() {
            "de" => &DE,
            "fr" => &FR,
            _ => &EN,
        }
    }
}

/// Render `raw_value` per root kind.
///
/// `precision` of `None` renders numbers in their shortest form. The unit
/// suffix is omitted for the `None` unit or when no unit is given.
pub fn format_raw_value(
    raw_value: Option<f64>,
    unit: Option<&Unit>,
    root_kind: RootKind,
    precision: Option<u32>,
    locale: &Locale,
) -> String {
    let Some(raw_value) = raw_value else {
        return String::new();
    };

    match root_kind {
        RootKind::Number => {
            let mut text = format_number(raw_value, precision, locale);
            if let Some(unit) = unit.filter(|unit| !unit.is_none_unit()) {
                text.push(' ');
                text.push_str(&unit.unit_text);
            }
            text
        }
        RootKind::Time => format_time(raw_value),
        RootKind::Weektime => {
            let total = raw_value.round() as i64;
            let day = total.div_euclid(1440).rem_euclid(7) as usize;
            format!("{},{}", locale.weekdays[day], format_time(raw_value))
        }
        RootKind::DateTime => format_datetime(raw_value, locale),
    }
}

/// A deferred rendering of one value.
///
/// Holds everything needed by value, so it can be rendered repeatedly and
/// from any thread.
#[derive(Debug, Clone)]
pub struct TextRenderer {
    raw_value: Option<f64>,
    field_type: Option<Arc<Type>>,
    locale: &'static Locale,
}

impl TextRenderer {
    pub fn new(raw_value: Option<f64>, field_type: Option<Arc<Type>>, locale: &'static Locale) -> Self {
        Self {
            raw_value,
            field_type,
            locale,
        }
    }

    pub fn render(&self) -> String {
        match &self.field_type {
            Some(field_type) => format_raw_value(
                self.raw_value,
                Some(field_type.unit.as_ref()),
                field_type.root_kind,
                Some(field_type.precision),
                self.locale,
            ),
            None => format_raw_value(self.raw_value, None, RootKind::Number, None, self.locale),
        }
    }
}

fn format_number(value: f64, precision: Option<u32>, locale: &Locale) -> String {
    let text = match precision {
        Some(precision) => format_fixed(value, precision),
        None => value.to_string(),
    };
    if locale.decimal_separator == '.' {
        text
    } else {
        text.replace('.', &locale.decimal_separator.to_string())
    }
}

/// Fixed-point rendering with half-away-from-zero rounding.
fn format_fixed(value: f64, precision: u32) -> String {
    let scale = 10f64.powi(precision as i32);
    let scaled = (value * scale).round();
    if !scaled.is_finite() || scaled.abs() >= 1e30 {
        return format!("{:.*}", precision as usize, value);
    }

    let negative = scaled < 0.0;
    let digits = (scaled.abs() as u128).to_string();
    let precision = precision as usize;

    let mut text = String::with_capacity(digits.len() + 3);
    if negative {
        text.push('-');
    }
    if precision == 0 {
        text.push_str(&digits);
    } else {
        let padded = format!("{:0>width$}", digits, width = precision + 1);
        let (integer, fraction) = padded.split_at(padded.len() - precision);
        text.push_str(integer);
        text.push('.');
        text.push_str(fraction);
    }
    text
}

fn format_time(raw_value: f64) -> String {
    let minutes = (raw_value.round() as i64).rem_euclid(1440);
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

fn format_datetime(raw_value: f64, locale: &Locale) -> String {
    let epoch: DateTime<Utc> = match Utc.timestamp_opt(DATETIME_EPOCH_OFFSET, 0).single() {
        Some(epoch) => epoch,
        None => return String::new(),
    };
    TimeDelta::try_seconds(raw_value.round() as i64)
        .and_then(|offset| epoch.checked_add_signed(offset))
        .map(|timestamp| timestamp.format(locale.datetime_pattern).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn en() -> &'static Locale {
        Locale::for_language("en")
    }

    #[test]
    fn test_number_precisions() {
        let cases = [
            (12345.6789, 0, "12346"),
            (12345.6789, 1, "12345.7"),
            (12345.6789, 2, "12345.68"),
            (12345.6789, 3, "12345.679"),
            (12345.6789, 4, "12345.6789"),
            (1.23456789, 10, "1.2345678900"),
        ];
        for (value, precision, expected) in cases {
            assert_eq!(
                format_raw_value(Some(value), None, RootKind::Number, Some(precision), en()),
                expected
            );
        }
    }

    #[test]
    fn test_half_away_from_zero() {
        assert_eq!(format_fixed(0.5, 0), "1");
        assert_eq!(format_fixed(-0.5, 0), "-1");
        assert_eq!(format_fixed(2.5, 0), "3");
        assert_eq!(format_fixed(-0.04, 1), "0.0");
        assert_eq!(format_fixed(0.05, 2), "0.05");
        assert_eq!(format_fixed(-888.8, 1), "-888.8");
    }

    #[test]
    fn test_unit_suffix() {
        let celsius = Unit::new("DegreesCelsius", "°C");
        let none = Unit::new("None", "");
        assert_eq!(
            format_raw_value(Some(888.8), Some(&celsius), RootKind::Number, Some(1), en()),
            "888.8 °C"
        );
        assert_eq!(
            format_raw_value(Some(888.8), Some(&none), RootKind::Number, Some(1), en()),
            "888.8"
        );
        assert_eq!(
            format_raw_value(Some(888.8), Some(&celsius), RootKind::Number, None, en()),
            "888.8 °C"
        );
        assert_eq!(
            format_raw_value(None, Some(&celsius), RootKind::Number, Some(1), en()),
            ""
        );
    }

    #[test]
    fn test_temporal_kinds() {
        assert_eq!(format_raw_value(Some(721.0), None, RootKind::Time, None, en()), "12:01");
        assert_eq!(
            format_raw_value(Some(3.0 * 1440.0 + 721.0), None, RootKind::Weektime, None, en()),
            "Th,12:01"
        );
        assert_eq!(
            format_raw_value(Some(409418262.0), None, RootKind::DateTime, None, en()),
            "12/22/2013 15:17:42"
        );
    }

    #[test]
    fn test_german_locale() {
        let de = Locale::for_language("de");
        assert_eq!(format_raw_value(Some(888.8), None, RootKind::Number, Some(1), de), "888,8");
        assert_eq!(
            format_raw_value(Some(3.0 * 1440.0 + 721.0), None, RootKind::Weektime, None, de),
            "Do,12:01"
        );
        assert_eq!(
            format_raw_value(Some(409418262.0), None, RootKind::DateTime, None, de),
            "22.12.2013 15:17:42"
        );
    }

    #[test]
    fn test_locale_lookup() {
        assert_eq!(Locale::for_language("de-AT").language, "de");
        assert_eq!(Locale::for_language("FR").language, "fr");
        assert_eq!(Locale::for_language("xx").language, "en");
    }

    #[test]
    fn test_renderer_is_repeatable() {
        let renderer = TextRenderer::new(Some(12.0), None, en());
        assert_eq!(renderer.render(), "12");
        assert_eq!(renderer.render(), renderer.render());
        assert_eq!(TextRenderer::new(None, None, en()).render(), "");
    }
}
