//! Conversion of raw field text into typed values

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use rust_decimal::Decimal;
use std::str::FromStr;

use super::{ColumnType, Value};
use crate::error::{CsvError, Result};

/// A time zone given by name: `UTC`, `GMT`, a fixed offset such as
/// `+02:00` / `GMT-05:30`, or an IANA zone like `Europe/Berlin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeZoneSpec {
    Fixed(FixedOffset),
    Named(Tz),
}

impl TimeZoneSpec {
    pub fn utc() -> Self {
        TimeZoneSpec::Fixed(Utc.fix())
    }

    pub fn parse(name: &str) -> Result<Self> {
        let trimmed = name.trim();
        if let Some(offset) = parse_fixed_offset(trimmed) {
            return Ok(TimeZoneSpec::Fixed(offset));
        }
        Tz::from_str(trimmed)
            .map(TimeZoneSpec::Named)
            .map_err(|_| CsvError::Config(format!("Unsupported time zone: {}", trimmed)))
    }

    /// UTC offset in effect at `instant`. Named zones follow their DST rules.
    pub fn offset_at(&self, instant: &DateTime<Utc>) -> FixedOffset {
        match self {
            TimeZoneSpec::Fixed(offset) => *offset,
            TimeZoneSpec::Named(tz) => tz.offset_from_utc_datetime(&instant.naive_utc()).fix(),
        }
    }

    /// Wall-clock time in this zone at `instant`.
    pub fn local_time(&self, instant: &DateTime<Utc>) -> NaiveDateTime {
        instant.with_timezone(&self.offset_at(instant)).naive_local()
    }
}

fn parse_fixed_offset(name: &str) -> Option<FixedOffset> {
    let upper = name.to_ascii_uppercase();
    let rest = upper
        .strip_prefix("UTC")
        .or_else(|| upper.strip_prefix("GMT"))
        .unwrap_or(&upper);
    if rest.is_empty() || rest == "Z" {
        return Some(Utc.fix());
    }

    let (sign, digits) = match rest.as_bytes().first() {
        Some(b'+') => (1, &rest[1..]),
        Some(b'-') => (-1, &rest[1..]),
        _ => return None,
    };
    let (hours, minutes) = match digits.split_once(':') {
        Some((h, m)) => (h, m),
        None if digits.len() == 4 => digits.split_at(2),
        None => (digits, "0"),
    };
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Translate a `YYYY-MM-DD HH:mm:ss` style pattern into a chrono format string.
pub(crate) fn translate_format(pattern: &str) -> String {
    const TOKENS: &[(&str, &str)] = &[
        ("YYYY", "%Y"),
        ("yyyy", "%Y"),
        ("SSS", "%3f"),
        ("YY", "%y"),
        ("yy", "%y"),
        ("MM", "%m"),
        ("DD", "%d"),
        ("dd", "%d"),
        ("HH", "%H"),
        ("hh", "%I"),
        ("mm", "%M"),
        ("ss", "%S"),
        ("a", "%p"),
    ];

    let mut out = String::with_capacity(pattern.len() * 2);
    let mut rest = pattern;
    'outer: while !rest.is_empty() {
        for (token, replacement) in TOKENS {
            if let Some(tail) = rest.strip_prefix(token) {
                out.push_str(replacement);
                rest = tail;
                continue 'outer;
            }
        }
        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            if c == '%' {
                out.push_str("%%");
            } else {
                out.push(c);
            }
        }
        rest = chars.as_str();
    }
    out
}

/// Converts field text to typed values using configured formats.
///
/// Dates use the proleptic Gregorian calendar throughout, matching SQL `DATE`.
#[derive(Debug, Clone)]
pub struct Converter {
    date_format: String,
    time_format: String,
    timestamp_format: String,
    zone: TimeZoneSpec,
}

impl Default for Converter {
    fn default() -> Self {
        Self {
            date_format: translate_format("YYYY-MM-DD"),
            time_format: translate_format("HH:mm:ss"),
            timestamp_format: translate_format("YYYY-MM-DD HH:mm:ss"),
            zone: TimeZoneSpec::utc(),
        }
    }
}

impl Converter {
    pub fn new(date_format: &str, time_format: &str, timestamp_format: &str, zone: &str) -> Result<Self> {
        Ok(Self {
            date_format: translate_format(date_format),
            time_format: translate_format(time_format),
            timestamp_format: translate_format(timestamp_format),
            zone: TimeZoneSpec::parse(zone)?,
        })
    }

    /// Today's date in the configured zone.
    pub fn current_date(&self) -> NaiveDate {
        self.zone.local_time(&Utc::now()).date()
    }

    /// Convert one raw field into its declared type. Absent and empty fields
    /// become `Null`.
    pub fn convert(&self, raw: Option<&str>, ty: ColumnType) -> Result<Value> {
        let text = match raw {
            Some(s) if !s.is_empty() => s,
            _ => return Ok(Value::Null),
        };

        let value = match ty {
            ColumnType::String | ColumnType::Clob => Value::Text(text.to_string()),
            ColumnType::Boolean => Value::Bool(parse_bool(text)?),
            ColumnType::Byte => Value::Byte(parse_number(text, "Byte")?),
            ColumnType::Short => Value::Short(parse_number(text, "Short")?),
            ColumnType::Int => Value::Int(parse_number(text, "Int")?),
            ColumnType::Long => Value::Long(parse_number(text, "Long")?),
            ColumnType::Float => Value::Float(parse_number(text, "Float")?),
            ColumnType::Double => Value::Double(parse_number(text, "Double")?),
            ColumnType::BigDecimal => Value::Decimal(parse_decimal(text)?),
            ColumnType::Date => Value::Date(self.parse_date(text)?),
            ColumnType::Time => Value::Time(self.parse_time(text)?),
            ColumnType::Timestamp => Value::Timestamp(self.parse_timestamp(text)?),
            ColumnType::Blob => Value::Bytes(text.as_bytes().to_vec()),
        };
        Ok(value)
    }

    /// Representative literal of a declared type, used for static type inference.
    pub fn literal_for(ty: ColumnType) -> Value {
        match ty {
            ColumnType::String | ColumnType::Clob => Value::Text(String::new()),
            ColumnType::Boolean => Value::Bool(false),
            ColumnType::Byte => Value::Byte(0),
            ColumnType::Short => Value::Short(0),
            ColumnType::Int => Value::Int(0),
            ColumnType::Long => Value::Long(0),
            ColumnType::Float => Value::Float(0.0),
            ColumnType::Double => Value::Double(0.0),
            ColumnType::BigDecimal => Value::Decimal(Decimal::ZERO),
            ColumnType::Date => Value::Date(NaiveDate::default()),
            ColumnType::Time => Value::Time(NaiveTime::MIN),
            ColumnType::Timestamp => Value::Timestamp(NaiveDateTime::default()),
            ColumnType::Blob => Value::Bytes(Vec::new()),
        }
    }

    pub fn parse_date(&self, text: &str) -> Result<NaiveDate> {
        let text = text.trim();
        NaiveDate::parse_from_str(text, &self.date_format)
            .or_else(|_| NaiveDate::parse_from_str(text, "%Y-%m-%d"))
            .map_err(|e| CsvError::TypeConversion(format!("Invalid date '{}': {}", text, e)))
    }

    pub fn parse_time(&self, text: &str) -> Result<NaiveTime> {
        let text = text.trim();
        NaiveTime::parse_from_str(text, &self.time_format)
            .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M:%S%.f"))
            .map_err(|e| CsvError::TypeConversion(format!("Invalid time '{}': {}", text, e)))
    }

    /// Parse a timestamp as wall-clock time in the configured zone. Text that
    /// carries its own offset is shifted into the configured zone.
    pub fn parse_timestamp(&self, text: &str) -> Result<NaiveDateTime> {
        let text = text.trim();
        if let Ok(ts) = NaiveDateTime::parse_from_str(text, &self.timestamp_format) {
            return Ok(ts);
        }
        if let Ok(ts) = DateTime::parse_from_rfc3339(text) {
            return Ok(self.zone.local_time(&ts.with_timezone(&Utc)));
        }
        for fallback in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
            if let Ok(ts) = NaiveDateTime::parse_from_str(text, fallback) {
                return Ok(ts);
            }
        }
        self.parse_date(text)
            .map(|d| d.and_time(NaiveTime::MIN))
            .map_err(|_| CsvError::TypeConversion(format!("Invalid timestamp '{}'", text)))
    }

    // Accessor conversions. `Ok(None)` means the value was null.

    pub fn to_bool(&self, value: &Value) -> Result<Option<bool>> {
        match value {
            Value::Null => Ok(None),
            Value::Bool(b) => Ok(Some(*b)),
            Value::Text(s) => parse_bool(s).map(Some),
            other => match other.as_i64() {
                Some(n) => Ok(Some(n != 0)),
                None => Err(type_error(other, "Boolean")),
            },
        }
    }

    pub fn to_i64(&self, value: &Value, type_name: &'static str) -> Result<Option<i64>> {
        match value {
            Value::Null => Ok(None),
            Value::Text(s) => parse_number(s, type_name).map(Some),
            Value::Bool(b) => Ok(Some(*b as i64)),
            other => match other.as_i64() {
                Some(n) => Ok(Some(n)),
                None => other
                    .as_f64()
                    .map(|f| Some(f.trunc() as i64))
                    .ok_or_else(|| type_error(other, type_name)),
            },
        }
    }

    pub fn to_f64(&self, value: &Value) -> Result<Option<f64>> {
        match value {
            Value::Null => Ok(None),
            Value::Text(s) => parse_number(s, "Double").map(Some),
            other => other.as_f64().map(Some).ok_or_else(|| type_error(other, "Double")),
        }
    }

    pub fn to_decimal(&self, value: &Value) -> Result<Option<Decimal>> {
        match value {
            Value::Null => Ok(None),
            Value::Text(s) => parse_decimal(s).map(Some),
            other => other
                .as_decimal()
                .map(Some)
                .ok_or_else(|| type_error(other, "BigDecimal")),
        }
    }

    pub fn to_date(&self, value: &Value) -> Result<Option<NaiveDate>> {
        match value {
            Value::Null => Ok(None),
            Value::Date(d) => Ok(Some(*d)),
            Value::Timestamp(ts) => Ok(Some(ts.date())),
            Value::Text(s) => self.parse_date(s).map(Some),
            other => Err(type_error(other, "Date")),
        }
    }

    pub fn to_time(&self, value: &Value) -> Result<Option<NaiveTime>> {
        match value {
            Value::Null => Ok(None),
            Value::Time(t) => Ok(Some(*t)),
            Value::Timestamp(ts) => Ok(Some(ts.time())),
            Value::Text(s) => self.parse_time(s).map(Some),
            other => Err(type_error(other, "Time")),
        }
    }

    pub fn to_timestamp(&self, value: &Value) -> Result<Option<NaiveDateTime>> {
        match value {
            Value::Null => Ok(None),
            Value::Timestamp(ts) => Ok(Some(*ts)),
            Value::Date(d) => Ok(Some(d.and_time(NaiveTime::MIN))),
            Value::Text(s) => self.parse_timestamp(s).map(Some),
            other => Err(type_error(other, "Timestamp")),
        }
    }

    /// Try to read `text` as a value of the same kind as `like`, so that a
    /// text literal can be compared with a typed column.
    pub fn coerce_text(&self, text: &str, like: &Value) -> Option<Value> {
        match like {
            Value::Date(_) => self.parse_date(text).ok().map(Value::Date),
            Value::Time(_) => self.parse_time(text).ok().map(Value::Time),
            Value::Timestamp(_) => self.parse_timestamp(text).ok().map(Value::Timestamp),
            Value::Bool(_) => parse_bool(text).ok().map(Value::Bool),
            Value::Decimal(_) => parse_decimal(text).ok().map(Value::Decimal),
            v if v.is_numeric() => {
                let trimmed = text.trim();
                trimmed
                    .parse::<i64>()
                    .map(Value::Long)
                    .or_else(|_| trimmed.parse::<f64>().map(Value::Double))
                    .ok()
            }
            _ => None,
        }
    }
}

fn type_error(value: &Value, target: &str) -> CsvError {
    CsvError::TypeConversion(format!(
        "Cannot convert {} value '{}' to {}",
        value.type_name(),
        value,
        target
    ))
}

pub(crate) fn parse_bool(text: &str) -> Result<bool> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(CsvError::TypeConversion(format!("Invalid boolean '{}'", text))),
    }
}

fn parse_number<T: FromStr>(text: &str, type_name: &'static str) -> Result<T> {
    let trimmed = text.trim();
    trimmed.parse::<T>().map_err(|_| CsvError::NumberFormat {
        value: trimmed.to_string(),
        type_name,
    })
}

fn parse_decimal(text: &str) -> Result<Decimal> {
    let trimmed = text.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| CsvError::NumberFormat {
            value: trimmed.to_string(),
            type_name: "BigDecimal",
        })
}

/// Days between two dates, as used by date subtraction.
pub(crate) fn days_between(a: NaiveDate, b: NaiveDate) -> i64 {
    a.num_days_from_ce() as i64 - b.num_days_from_ce() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_format() {
        assert_eq!(translate_format("YYYY-MM-DD"), "%Y-%m-%d");
        assert_eq!(translate_format("HH:mm:ss.SSS"), "%H:%M:%S.%3f");
        assert_eq!(translate_format("dd/MM/yyyy"), "%d/%m/%Y");
    }

    #[test]
    fn test_convert_scalars() {
        let conv = Converter::default();
        assert_eq!(conv.convert(Some("42"), ColumnType::Int).unwrap(), Value::Int(42));
        assert_eq!(conv.convert(Some("TRUE"), ColumnType::Boolean).unwrap(), Value::Bool(true));
        assert_eq!(conv.convert(Some("0"), ColumnType::Boolean).unwrap(), Value::Bool(false));
        assert_eq!(conv.convert(Some(""), ColumnType::Int).unwrap(), Value::Null);
        assert_eq!(conv.convert(None, ColumnType::String).unwrap(), Value::Null);
        assert_eq!(
            conv.convert(Some("1.25"), ColumnType::BigDecimal).unwrap(),
            Value::Decimal(Decimal::new(125, 2))
        );
    }

    #[test]
    fn test_number_format_error() {
        let conv = Converter::default();
        let err = conv.convert(Some("12x"), ColumnType::Long).unwrap_err();
        assert!(matches!(err, CsvError::NumberFormat { type_name: "Long", .. }));
        assert!(conv.convert(Some("300"), ColumnType::Byte).is_err());
    }

    #[test]
    fn test_convert_dates_with_custom_format() {
        let conv = Converter::new("DD.MM.YYYY", "HH:mm", "DD.MM.YYYY HH:mm", "UTC").unwrap();
        let date = conv.convert(Some("09.03.2024"), ColumnType::Date).unwrap();
        assert_eq!(date, Value::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap()));
        let time = conv.convert(Some("13:45"), ColumnType::Time).unwrap();
        assert_eq!(time, Value::Time(NaiveTime::from_hms_opt(13, 45, 0).unwrap()));
        let ts = conv.convert(Some("09.03.2024 13:45"), ColumnType::Timestamp).unwrap();
        assert_eq!(ts.to_string(), "2024-03-09 13:45:00");
    }

    #[test]
    fn test_time_zone_offsets() {
        assert_eq!(TimeZoneSpec::parse("GMT").unwrap(), TimeZoneSpec::utc());
        let now = Utc::now();
        let tz = TimeZoneSpec::parse("GMT+02:00").unwrap();
        assert_eq!(tz.offset_at(&now).local_minus_utc(), 7200);
        let tz = TimeZoneSpec::parse("-0530").unwrap();
        assert_eq!(tz.offset_at(&now).local_minus_utc(), -(5 * 3600 + 30 * 60));
        assert!(TimeZoneSpec::parse("Europe/Nowhere").is_err());

        let conv = Converter::new("YYYY-MM-DD", "HH:mm:ss", "YYYY-MM-DD HH:mm:ss", "+01:00").unwrap();
        let ts = conv.parse_timestamp("2024-01-01T10:00:00Z").unwrap();
        assert_eq!(ts.to_string(), "2024-01-01 11:00:00");
    }

    #[test]
    fn test_named_time_zone_follows_dst() {
        let tz = TimeZoneSpec::parse("Europe/Berlin").unwrap();
        assert!(matches!(tz, TimeZoneSpec::Named(_)));
        let winter = Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap();
        let summer = Utc.with_ymd_and_hms(2024, 7, 15, 12, 0, 0).unwrap();
        assert_eq!(tz.offset_at(&winter).local_minus_utc(), 3600);
        assert_eq!(tz.offset_at(&summer).local_minus_utc(), 7200);

        let conv = Converter::new("YYYY-MM-DD", "HH:mm:ss", "YYYY-MM-DD HH:mm:ss", "Europe/Berlin").unwrap();
        let ts = conv.parse_timestamp("2024-01-15T10:00:00Z").unwrap();
        assert_eq!(ts.to_string(), "2024-01-15 11:00:00");
        let ts = conv.parse_timestamp("2024-07-15T10:00:00+00:00").unwrap();
        assert_eq!(ts.to_string(), "2024-07-15 12:00:00");
        // plain wall-clock text stays as written
        let ts = conv.parse_timestamp("2024-07-15 10:00:00").unwrap();
        assert_eq!(ts.to_string(), "2024-07-15 10:00:00");
    }

    #[test]
    fn test_accessor_conversions() {
        let conv = Converter::default();
        assert_eq!(conv.to_i64(&Value::Text(" 7 ".into()), "Int").unwrap(), Some(7));
        assert_eq!(conv.to_i64(&Value::Double(2.9), "Int").unwrap(), Some(2));
        assert_eq!(conv.to_i64(&Value::Null, "Int").unwrap(), None);
        assert_eq!(conv.to_f64(&Value::Int(3)).unwrap(), Some(3.0));
        assert!(conv.to_date(&Value::Int(3)).is_err());
    }

    #[test]
    fn test_coerce_text() {
        let conv = Converter::default();
        let like = Value::Date(NaiveDate::default());
        assert_eq!(
            conv.coerce_text("2020-02-29", &like),
            Some(Value::Date(NaiveDate::from_ymd_opt(2020, 2, 29).unwrap()))
        );
        assert_eq!(conv.coerce_text("12", &Value::Int(0)), Some(Value::Long(12)));
        assert_eq!(conv.coerce_text("abc", &Value::Int(0)), None);
    }
}
