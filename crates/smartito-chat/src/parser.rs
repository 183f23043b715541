//! Natural-language parameter extraction.
//!
//! Pulls date ranges, markets, device segments and traffic sources out of a
//! single user message (English or Spanish) and produces a partial
//! [`ParameterSet`]. Extraction is pure: relative dates resolve against the
//! `now` passed in, and nothing here reads the system clock.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{Datelike, Duration, Months, NaiveDate};
use regex::Regex;
use tracing::warn;

use smartito_core::config::MarketConfig;
use smartito_core::types::{DateRange, DeviceSegment, ParameterSet, TrafficSource};

use crate::types::{Language, MetricFocus};

// =============================================================================
// Compiled patterns (matched against accent-folded, lowercased text)
// =============================================================================

static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").expect("Invalid ISO date regex"));

static DMY_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").expect("Invalid dmy date regex"));

struct RelativePatterns {
    last_n_days: Regex,
    last_n_months: Regex,
    today: Regex,
    yesterday: Regex,
    this_week: Regex,
    last_week: Regex,
    this_month: Regex,
    last_month: Regex,
    this_year: Regex,
    last_year: Regex,
}

static RELATIVE_PATTERNS: LazyLock<RelativePatterns> = LazyLock::new(|| {
    let mk = |p: &str| Regex::new(p).expect("Invalid relative date regex");
    RelativePatterns {
        last_n_days: mk(r"\b(?:last|past|ultimos|ultimas)\s+(\d{1,3})\s+(?:days|dias)\b"),
        last_n_months: mk(r"\b(?:last|past|ultimos|ultimas)\s+(\d{1,2})\s+(?:months|meses)\b"),
        today: mk(r"\b(?:today|hoy)\b"),
        yesterday: mk(r"\b(?:yesterday|ayer)\b"),
        this_week: mk(r"\b(?:this\s+week|esta\s+semana)\b"),
        last_week: mk(
            r"\b(?:last\s+week|previous\s+week|semana\s+pasada|semana\s+anterior|ultima\s+semana)\b",
        ),
        this_month: mk(r"\b(?:this\s+month|current\s+month|este\s+mes|mes\s+actual)\b"),
        last_month: mk(
            r"\b(?:last\s+month|previous\s+month|mes\s+pasado|mes\s+anterior|ultimo\s+mes)\b",
        ),
        this_year: mk(r"\b(?:this\s+year|current\s+year|este\s+ano|ano\s+actual)\b"),
        last_year: mk(r"\b(?:last\s+year|previous\s+year|ano\s+pasado|ano\s+anterior)\b"),
    }
});

static QUARTER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:q([1-4])|(first|second|third|fourth)\s+quarter|(primer|segundo|tercer|cuarto)\s+trimestre)(?:\s+(?:of\s+|de\s+|del\s+)?(\d{4}))?\b",
    )
    .expect("Invalid quarter regex")
});

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("enero", 1),
    ("february", 2),
    ("febrero", 2),
    ("march", 3),
    ("marzo", 3),
    ("april", 4),
    ("abril", 4),
    ("may", 5),
    ("mayo", 5),
    ("june", 6),
    ("junio", 6),
    ("july", 7),
    ("julio", 7),
    ("august", 8),
    ("agosto", 8),
    ("september", 9),
    ("septiembre", 9),
    ("setiembre", 9),
    ("october", 10),
    ("octubre", 10),
    ("november", 11),
    ("noviembre", 11),
    ("december", 12),
    ("diciembre", 12),
];

static MONTH_RE: LazyLock<Regex> = LazyLock::new(|| {
    let names: Vec<&str> = MONTHS.iter().map(|(name, _)| *name).collect();
    Regex::new(&format!(
        r"\b({})\b(?:\s+(?:of\s+|de\s+|del\s+)?(\d{{4}})\b)?",
        names.join("|")
    ))
    .expect("Invalid month regex")
});

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b((?:19|20)\d{2})\b").expect("Invalid year regex"));

static MOBILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:mobile|movil(?:es)?|celular(?:es)?|smartphones?|phones?)\b")
        .expect("Invalid mobile regex")
});

static DESKTOP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:desktop|escritorio|computers?|computadoras?|pcs?)\b")
        .expect("Invalid desktop regex")
});

static TRAFFIC_PATTERNS: LazyLock<Vec<(TrafficSource, Regex)>> = LazyLock::new(|| {
    let mk = |p: &str| Regex::new(p).expect("Invalid traffic regex");
    vec![
        (TrafficSource::Organico, mk(r"\b(?:organic|organico|seo)\b")),
        (TrafficSource::Pagado, mk(r"\b(?:paid|pagado|pago|ads|cpc|sem)\b")),
        (
            TrafficSource::Promoted,
            mk(r"\b(?:promoted|promocionado|social)\b"),
        ),
    ]
});

/// Phrases that ask for a fuller answer.
const DETAIL_CUES: &[&str] = &[
    "mas detalles",
    "mas informacion",
    "explica",
    "explicame",
    "recomendaciones",
    "insights",
    "explain",
    "more details",
    "more information",
    "recommendations",
    "elaborate",
    "analyze",
    "analiza",
];

/// Metric keywords, checked in order. Conversion comes first because
/// conversion questions usually mention traffic and payments too.
const METRIC_KEYWORDS: &[(MetricFocus, &[&str])] = &[
    (MetricFocus::ConversionRate, &["conversion", "convierte", "convirtio", "tasa"]),
    (
        MetricFocus::PaymentConfirmations,
        &["payment", "confirmacion", "confirmaciones", "reservas", "bookings", "compras"],
    ),
    (
        MetricFocus::FlightPageLoads,
        &["flight", "vuelo", "vuelos", "busquedas", "searches"],
    ),
    (MetricFocus::CompletionTime, &["tiempo", "time", "duracion", "minutos", "segundos"]),
    (MetricFocus::Traffic, &["traffic", "trafico", "visitas", "visits", "sesiones", "usuarios"]),
];

const SPANISH_WORDS: &[&str] = &[
    "el", "la", "los", "las", "de", "del", "en", "que", "cual", "cuales", "cuanto", "cuantos",
    "como", "para", "por", "y", "tasa", "mes", "ano", "dame", "muestra", "mercado", "trafico",
    "es", "fue", "con", "sobre", "semana", "hoy", "ayer",
];

const ENGLISH_WORDS: &[&str] = &[
    "the", "what", "which", "how", "is", "was", "of", "in", "for", "and", "rate", "month",
    "year", "show", "give", "me", "market", "traffic", "with", "about", "week", "today",
    "yesterday", "many", "much",
];

// =============================================================================
// ParameterExtractor
// =============================================================================

struct MarketMatcher {
    code: String,
    code_re: Regex,
    alias_re: Option<Regex>,
}

/// Rule-based extractor for query parameters.
pub struct ParameterExtractor {
    markets: Vec<MarketMatcher>,
}

impl ParameterExtractor {
    /// Build an extractor for the given known markets.
    pub fn new(known_markets: &[MarketConfig]) -> Self {
        let markets = known_markets
            .iter()
            .filter_map(|m| {
                let code = m.code.trim().to_uppercase();
                let code_re = match Regex::new(&format!(r"\b{}\b", regex::escape(&code))) {
                    Ok(re) => re,
                    Err(e) => {
                        warn!(market = %code, error = %e, "Skipping market with unusable code");
                        return None;
                    }
                };
                let aliases: Vec<String> = m
                    .aliases
                    .iter()
                    .map(|a| regex::escape(&fold(a.trim())))
                    .filter(|a| !a.is_empty())
                    .collect();
                let alias_re = if aliases.is_empty() {
                    None
                } else {
                    Regex::new(&format!(
                        r"(?:^|[^a-z0-9])(?:{})(?:$|[^a-z0-9])",
                        aliases.join("|")
                    ))
                    .map_err(|e| warn!(market = %code, error = %e, "Ignoring market aliases"))
                    .ok()
                };
                Some(MarketMatcher {
                    code,
                    code_re,
                    alias_re,
                })
            })
            .collect();
        Self { markets }
    }

    /// Extract every parameter mentioned in `text`.
    ///
    /// Fields that the text does not mention stay unspecified.
    pub fn extract(&self, text: &str, now: NaiveDate) -> ParameterSet {
        let folded = fold(text);
        ParameterSet {
            date_range: extract_date_range(&folded, now),
            markets: self.extract_markets(text, &folded),
            devices: extract_devices(&folded),
            traffic_source: extract_traffic_source(&folded),
        }
    }

    fn extract_markets(&self, original: &str, folded: &str) -> BTreeSet<String> {
        self.markets
            .iter()
            .filter(|m| {
                m.code_re.is_match(original)
                    || m.alias_re.as_ref().is_some_and(|re| re.is_match(folded))
            })
            .map(|m| m.code.clone())
            .collect()
    }
}

/// One-shot extraction against a market list.
pub fn extract(text: &str, known_markets: &[MarketConfig], now: NaiveDate) -> ParameterSet {
    ParameterExtractor::new(known_markets).extract(text, now)
}

/// True when the message asks for a detailed answer.
pub fn wants_detail(text: &str) -> bool {
    let folded = fold(text);
    DETAIL_CUES.iter().any(|cue| folded.contains(cue))
}

/// Main metric the question asks about.
pub fn detect_metric(text: &str) -> MetricFocus {
    let folded = fold(text);
    let words: Vec<&str> = folded
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    METRIC_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|k| words.contains(k)))
        .map(|(metric, _)| *metric)
        .unwrap_or(MetricFocus::General)
}

/// Guess whether the user writes in Spanish or English.
pub fn detect_language(text: &str) -> Language {
    if text.contains(['¿', '¡', 'ñ', 'Ñ']) || text.chars().any(|c| "áéíóúÁÉÍÓÚ".contains(c)) {
        return Language::Spanish;
    }
    let folded = fold(text);
    let words: Vec<&str> = folded
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();
    let spanish = words.iter().filter(|w| SPANISH_WORDS.contains(w)).count();
    let english = words.iter().filter(|w| ENGLISH_WORDS.contains(w)).count();
    if spanish > english {
        Language::Spanish
    } else {
        Language::English
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Lowercase and strip Spanish diacritics.
pub(crate) fn fold(text: &str) -> String {
    text.chars()
        .flat_map(|c| c.to_lowercase())
        .map(|c| match c {
            'á' | 'à' | 'ä' | 'â' => 'a',
            'é' | 'è' | 'ë' | 'ê' => 'e',
            'í' | 'ì' | 'ï' | 'î' => 'i',
            'ó' | 'ò' | 'ö' | 'ô' => 'o',
            'ú' | 'ù' | 'ü' | 'û' => 'u',
            'ñ' => 'n',
            other => other,
        })
        .collect()
}

fn extract_devices(folded: &str) -> BTreeSet<DeviceSegment> {
    let mut devices = BTreeSet::new();
    if MOBILE_RE.is_match(folded) {
        devices.insert(DeviceSegment::Mobile);
    }
    if DESKTOP_RE.is_match(folded) {
        devices.insert(DeviceSegment::Desktop);
    }
    devices
}

/// The earliest traffic-source mention wins.
fn extract_traffic_source(folded: &str) -> Option<TrafficSource> {
    TRAFFIC_PATTERNS
        .iter()
        .filter_map(|(source, re)| re.find(folded).map(|m| (m.start(), *source)))
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, source)| source)
}

fn extract_date_range(folded: &str, now: NaiveDate) -> Option<DateRange> {
    explicit_dates(folded)
        .or_else(|| relative_range(folded, now))
        .or_else(|| quarter_range(folded, now))
        .or_else(|| month_range(folded, now))
        .or_else(|| year_range(folded))
}

fn explicit_dates(folded: &str) -> Option<DateRange> {
    let mut found: Vec<(usize, NaiveDate)> = Vec::new();
    for caps in ISO_DATE_RE.captures_iter(folded) {
        let date = ymd(&caps[1], &caps[2], &caps[3]);
        if let (Some(date), Some(m)) = (date, caps.get(0)) {
            found.push((m.start(), date));
        }
    }
    for caps in DMY_DATE_RE.captures_iter(folded) {
        let date = ymd(&caps[3], &caps[2], &caps[1]);
        if let (Some(date), Some(m)) = (date, caps.get(0)) {
            found.push((m.start(), date));
        }
    }
    found.sort_by_key(|(pos, _)| *pos);
    match found.as_slice() {
        [] => None,
        [(_, day)] => Some(DateRange::single_day(*day)),
        [(_, first), (_, second), ..] => Some(DateRange::new(*first, *second)),
    }
}

fn ymd(year: &str, month: &str, day: &str) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year.parse().ok()?, month.parse().ok()?, day.parse().ok()?)
}

fn relative_range(folded: &str, now: NaiveDate) -> Option<DateRange> {
    let rp = &*RELATIVE_PATTERNS;

    if let Some(caps) = rp.last_n_days.captures(folded) {
        let n: i64 = caps[1].parse().ok()?;
        let n = n.max(1);
        return Some(DateRange::new(now - Duration::days(n - 1), now));
    }
    if let Some(caps) = rp.last_n_months.captures(folded) {
        let n: u32 = caps[1].parse().ok()?;
        let start = now.checked_sub_months(Months::new(n.max(1)))?;
        return Some(DateRange::new(start, now));
    }
    if rp.yesterday.is_match(folded) {
        return Some(DateRange::single_day(now - Duration::days(1)));
    }
    if rp.today.is_match(folded) {
        return Some(DateRange::single_day(now));
    }
    if rp.last_week.is_match(folded) {
        let monday = now - Duration::days(now.weekday().num_days_from_monday() as i64);
        let prev_monday = monday - Duration::days(7);
        return Some(DateRange::new(prev_monday, monday - Duration::days(1)));
    }
    if rp.this_week.is_match(folded) {
        let monday = now - Duration::days(now.weekday().num_days_from_monday() as i64);
        return Some(DateRange::new(monday, now));
    }
    if rp.last_month.is_match(folded) {
        let first_this = now.with_day(1)?;
        let last_prev = first_this - Duration::days(1);
        return whole_month(last_prev.year(), last_prev.month());
    }
    if rp.this_month.is_match(folded) {
        return Some(DateRange::new(now.with_day(1)?, now));
    }
    if rp.last_year.is_match(folded) {
        return whole_year(now.year() - 1);
    }
    if rp.this_year.is_match(folded) {
        return Some(DateRange::new(NaiveDate::from_ymd_opt(now.year(), 1, 1)?, now));
    }
    None
}

fn quarter_range(folded: &str, now: NaiveDate) -> Option<DateRange> {
    let caps = QUARTER_RE.captures(folded)?;
    let quarter: u32 = if let Some(q) = caps.get(1) {
        q.as_str().parse().ok()?
    } else {
        let word = caps.get(2).or_else(|| caps.get(3))?.as_str();
        match word {
            "first" | "primer" => 1,
            "second" | "segundo" => 2,
            "third" | "tercer" => 3,
            _ => 4,
        }
    };
    let year = match caps.get(4) {
        Some(y) => y.as_str().parse().ok()?,
        None => now.year(),
    };
    let first_month = (quarter - 1) * 3 + 1;
    let start = NaiveDate::from_ymd_opt(year, first_month, 1)?;
    let end = whole_month(year, first_month + 2)?.end;
    Some(DateRange::new(start, end))
}

/// One or two month names. A month without a year borrows the year written
/// next to the other month. With no year written at all, the span ends at
/// the most recent occurrence of the last month named: this year when that
/// month has started, else last year.
fn month_range(folded: &str, now: NaiveDate) -> Option<DateRange> {
    let mentions: Vec<(u32, Option<i32>)> = MONTH_RE
        .captures_iter(folded)
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str();
            let year = caps.get(2).and_then(|y| y.as_str().parse::<i32>().ok());
            // "may" is too common an English word to trust without a year.
            if name == "may" && year.is_none() {
                return None;
            }
            let month = MONTHS.iter().find(|(n, _)| *n == name)?.1;
            Some((month, year))
        })
        .collect();

    let (first, last) = match mentions.as_slice() {
        [] => return None,
        [only] => (*only, *only),
        [first, .., last] => (*first, *last),
    };
    let fallback = first.1.or(last.1).unwrap_or(if last.0 > now.month() {
        now.year() - 1
    } else {
        now.year()
    });
    let start = whole_month(first.1.unwrap_or(fallback), first.0)?;
    let end = whole_month(last.1.unwrap_or(fallback), last.0)?;
    Some(DateRange::new(
        start.start.min(end.start),
        start.end.max(end.end),
    ))
}

fn year_range(folded: &str) -> Option<DateRange> {
    let caps = YEAR_RE.captures(folded)?;
    whole_year(caps[1].parse().ok()?)
}

fn whole_month(year: i32, month: u32) -> Option<DateRange> {
    let start = NaiveDate::from_ymd_opt(year, month, 1)?;
    let next = start.checked_add_months(Months::new(1))?;
    Some(DateRange::new(start, next - Duration::days(1)))
}

fn whole_year(year: i32) -> Option<DateRange> {
    Some(DateRange::new(
        NaiveDate::from_ymd_opt(year, 1, 1)?,
        NaiveDate::from_ymd_opt(year, 12, 31)?,
    ))
}

// =============================================================================
// Tests
// =============================================================================
