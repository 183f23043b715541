use std::collections::BTreeSet;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// =============================================================================
// Enums
// =============================================================================

/// Device segment recorded in the `device` column of the funnel table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceSegment {
    Mobile,
    Desktop,
}

impl DeviceSegment {
    /// Value stored in the warehouse column.
    pub fn as_column_value(&self) -> &'static str {
        match self {
            DeviceSegment::Mobile => "mobile",
            DeviceSegment::Desktop => "desktop",
        }
    }
}

impl fmt::Display for DeviceSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_column_value())
    }
}

/// Traffic source recorded in the `traffic_type` column.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrafficSource {
    /// Direct and SEO traffic.
    Organico,
    /// Paid advertising traffic.
    Pagado,
    /// Social media and promotional traffic.
    Promoted,
}

impl TrafficSource {
    /// Value stored in the warehouse column.
    pub fn as_column_value(&self) -> &'static str {
        match self {
            TrafficSource::Organico => "Organico",
            TrafficSource::Pagado => "Pagado",
            TrafficSource::Promoted => "Promoted",
        }
    }
}

impl fmt::Display for TrafficSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_column_value())
    }
}

// =============================================================================
// DateRange
// =============================================================================

/// Inclusive calendar date range.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Build a range, swapping the bounds if they arrive reversed.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        if start <= end {
            Self { start, end }
        } else {
            Self {
                start: end,
                end: start,
            }
        }
    }

    /// A range covering a single day.
    pub fn single_day(day: NaiveDate) -> Self {
        Self {
            start: day,
            end: day,
        }
    }

    /// Number of days covered, inclusive of both bounds.
    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }

    /// Whether the given day falls inside the range.
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "from {} to {}",
            self.start.format("%Y-%m-%d"),
            self.end.format("%Y-%m-%d")
        )
    }
}

// =============================================================================
// ParameterSet
// =============================================================================

/// Resolved filter context for a question.
///
/// Every field is independently optional: `None` or an empty set means
/// "unspecified", never "zero".
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub date_range: Option<DateRange>,
    /// Market codes such as `BR` or `CL`.
    pub markets: BTreeSet<String>,
    pub devices: BTreeSet<DeviceSegment>,
    pub traffic_source: Option<TrafficSource>,
}

impl ParameterSet {
    /// True when no field is specified.
    pub fn is_empty(&self) -> bool {
        self.date_range.is_none()
            && self.markets.is_empty()
            && self.devices.is_empty()
            && self.traffic_source.is_none()
    }

    /// Render as a single line for prompts and logs.
    ///
    /// Unspecified fields are spelled out as "all" so that downstream prompts
    /// make the default assumption explicit.
    pub fn describe(&self) -> String {
        let dates = self
            .date_range
            .map(|r| r.to_string())
            .unwrap_or_else(|| "unspecified (use the current year)".to_string());
        let markets = if self.markets.is_empty() {
            "all".to_string()
        } else {
            self.markets.iter().cloned().collect::<Vec<_>>().join(", ")
        };
        let devices = if self.devices.is_empty() {
            "all".to_string()
        } else {
            self.devices
                .iter()
                .map(|d| d.as_column_value())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let traffic = self
            .traffic_source
            .map(|t| t.as_column_value().to_string())
            .unwrap_or_else(|| "all".to_string());
        format!(
            "dates: {}; markets: {}; devices: {}; traffic_type: {}",
            dates, markets, devices, traffic
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_date_range_new_orders_bounds() {
        let r = DateRange::new(d(2024, 12, 31), d(2024, 12, 1));
        assert_eq!(r.start, d(2024, 12, 1));
        assert_eq!(r.end, d(2024, 12, 31));
    }

    #[test]
    fn test_date_range_days_inclusive() {
        assert_eq!(DateRange::new(d(2024, 12, 1), d(2024, 12, 31)).days(), 31);
        assert_eq!(DateRange::single_day(d(2024, 2, 29)).days(), 1);
    }

    #[test]
    fn test_date_range_display() {
        let r = DateRange::new(d(2024, 12, 1), d(2024, 12, 31));
        assert_eq!(r.to_string(), "from 2024-12-01 to 2024-12-31");
    }

    #[test]
    fn test_date_range_contains() {
        let r = DateRange::new(d(2024, 12, 1), d(2024, 12, 31));
        assert!(r.contains(d(2024, 12, 15)));
        assert!(r.contains(d(2024, 12, 31)));
        assert!(!r.contains(d(2025, 1, 1)));
    }

    #[test]
    fn test_parameter_set_default_is_empty() {
        assert!(ParameterSet::default().is_empty());
    }

    #[test]
    fn test_parameter_set_describe_defaults() {
        let desc = ParameterSet::default().describe();
        assert!(desc.contains("markets: all"));
        assert!(desc.contains("devices: all"));
        assert!(desc.contains("traffic_type: all"));
    }

    #[test]
    fn test_parameter_set_describe_values() {
        let mut p = ParameterSet::default();
        p.markets.insert("BR".into());
        p.devices.insert(DeviceSegment::Mobile);
        p.traffic_source = Some(TrafficSource::Pagado);
        p.date_range = Some(DateRange::new(d(2024, 12, 1), d(2024, 12, 31)));
        let desc = p.describe();
        assert!(desc.contains("markets: BR"));
        assert!(desc.contains("devices: mobile"));
        assert!(desc.contains("traffic_type: Pagado"));
        assert!(desc.contains("from 2024-12-01 to 2024-12-31"));
    }

    #[test]
    fn test_device_segment_serde() {
        let json = serde_json::to_string(&DeviceSegment::Desktop).unwrap();
        assert_eq!(json, "\"desktop\"");
    }
}
