//! Demo funnel data for local runs.
//!
//! Values are deterministic so that repeated seeds produce the same replica.

use chrono::{Duration, NaiveDate};

use smartito_warehouse::schema::FunnelRecord;

/// Market code and average daily visits per segment.
const MARKETS: &[(&str, i64)] = &[
    ("BR", 9_000),
    ("CL", 6_000),
    ("PE", 4_500),
    ("PY", 1_200),
    ("US", 3_000),
    ("CO", 4_000),
    ("AR", 5_000),
    ("EC", 1_800),
    ("UY", 1_000),
];

/// Device, traffic share in percent, payment conversion in basis points.
const DEVICES: &[(&str, i64, i64)] = &[("mobile", 60, 420), ("desktop", 40, 610)];

/// Traffic type and traffic share in percent.
const TRAFFIC_TYPES: &[(&str, i64)] = &[("Organico", 55), ("Pagado", 30), ("Promoted", 15)];

/// Records for every market, device and traffic type over `days` days
/// ending on `end`.
pub fn demo_records(end: NaiveDate, days: u32) -> Vec<FunnelRecord> {
    let mut records = Vec::with_capacity(days as usize * MARKETS.len() * 6);
    for offset in (0..days as i64).rev() {
        let date = end - Duration::days(offset);
        for (m, (culture, base)) in MARKETS.iter().enumerate() {
            for (d, (device, device_share, conversion_bp)) in DEVICES.iter().enumerate() {
                for (t, (traffic_type, type_share)) in TRAFFIC_TYPES.iter().enumerate() {
                    // Swing between 85% and 114% of the base, varying by day and segment.
                    let swing = 85 + (offset * 7 + m as i64 * 13 + d as i64 * 5 + t as i64 * 3) % 30;
                    let traffic = base * device_share / 100 * type_share / 100 * swing / 100;
                    let payments = traffic * conversion_bp / 10_000;
                    records.push(FunnelRecord {
                        date: date.format("%Y-%m-%d").to_string(),
                        culture: culture.to_string(),
                        device: device.to_string(),
                        traffic_type: traffic_type.to_string(),
                        traffic,
                        flight_dom_loaded_flight: traffic * 45 / 100,
                        payment_confirmation_loaded: payments,
                        median_time_seconds: 420.0 + (swing as f64) * 3.0,
                    });
                }
            }
        }
    }
    records
}
