//! End-to-end turns against a SQLite replica of the funnel table.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::json;

use smartito_chat::{FixedClock, Orchestrator, TechnicalResult, TurnStatus};
use smartito_core::config::SmartitoConfig;
use smartito_core::types::{DateRange, DeviceSegment};
use smartito_llm::{Message, ScriptedCapability};
use smartito_warehouse::schema::{create_funnel_table, FunnelRecord};
use smartito_warehouse::SqliteWarehouse;

const TABLE: &str = "amplitude.funnels_resumido";

fn record(date: &str, culture: &str, device: &str, traffic: i64, payments: i64) -> FunnelRecord {
    FunnelRecord {
        date: date.into(),
        culture: culture.into(),
        device: device.into(),
        traffic_type: "Organico".into(),
        traffic,
        flight_dom_loaded_flight: traffic / 3,
        payment_confirmation_loaded: payments,
        median_time_seconds: 540.0,
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    business: Arc<ScriptedCapability>,
    data: Arc<ScriptedCapability>,
    orchestrator: Orchestrator,
}

/// Brazil, December 2024: 734 confirmations over 10 000 visits.
fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("funnels.db");
    create_funnel_table(
        &path,
        TABLE,
        &[
            record("2024-12-03", "BR", "mobile", 3_000, 240),
            record("2024-12-17", "BR", "mobile", 3_000, 240),
            record("2024-12-03", "BR", "desktop", 4_000, 254),
            record("2024-12-10", "CL", "desktop", 2_000, 90),
            record("2024-11-20", "BR", "mobile", 5_000, 100),
        ],
    )
    .unwrap();
    let warehouse = SqliteWarehouse::open(&path, TABLE, Duration::from_millis(500)).unwrap();

    let business = Arc::new(ScriptedCapability::new("business"));
    let data = Arc::new(ScriptedCapability::new("data"));
    let orchestrator = Orchestrator::from_config(
        &SmartitoConfig::default(),
        business.clone(),
        data.clone(),
        Arc::new(warehouse),
    )
    .with_clock(FixedClock::on(NaiveDate::from_ymd_opt(2025, 1, 15).unwrap()));

    Fixture {
        _dir: dir,
        business,
        data,
        orchestrator,
    }
}

fn december_2024() -> DateRange {
    DateRange::new(
        NaiveDate::from_ymd_opt(2024, 12, 1).unwrap(),
        NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
    )
}

fn last_prompt(llm: &ScriptedCapability) -> String {
    match llm.requests().last().and_then(|r| r.messages.last().cloned()) {
        Some(Message::User { content }) => content,
        other => panic!("unexpected message: {:?}", other),
    }
}

#[tokio::test]
async fn brazil_december_then_mobile_follow_up() {
    let mut f = fixture();

    f.business
        .push_message("Conversion rate for Brazil in December 2024, all devices.")
        .push_message("La tasa de conversión de Brasil en diciembre fue 7.34%.");
    f.data.push_sql(
        "SELECT SUM(payment_confirmation_loaded) AS payments, SUM(traffic) AS traffic, \
         SUM(payment_confirmation_loaded) * 1.0 / NULLIF(SUM(traffic), 0) AS conversion_rate \
         FROM amplitude.funnels_resumido \
         WHERE culture = 'BR' AND date BETWEEN '2024-12-01' AND '2024-12-31'",
    );

    let first = f
        .orchestrator
        .handle_turn("¿Cuál es la tasa de conversión en Brasil para diciembre?")
        .await
        .unwrap();
    assert_eq!(first.status, TurnStatus::Completed);
    assert_eq!(first.parameters.markets, BTreeSet::from(["BR".to_string()]));
    assert_eq!(first.parameters.date_range, Some(december_2024()));
    assert!(last_prompt(&f.business).contains("Overall conversion rate: 7.34%"));
    match &f.orchestrator.memory().history()[0].technical_result {
        Some(TechnicalResult::Rows { finding, partial, .. }) => {
            assert_eq!(finding.conversion_rate, Some(0.0734));
            assert!(!partial);
        }
        other => panic!("unexpected result: {:?}", other),
    }

    f.business
        .push_message("Same period and market, mobile only.")
        .push_message("En móvil la conversión fue 8.00%.");
    f.data.push_sql(
        "SELECT SUM(payment_confirmation_loaded) AS payments, SUM(traffic) AS traffic \
         FROM amplitude.funnels_resumido \
         WHERE culture = 'BR' AND device = 'mobile' AND date BETWEEN '2024-12-01' AND '2024-12-31'",
    );

    let second = f.orchestrator.handle_turn("¿y en móvil?").await.unwrap();
    assert_eq!(second.final_answer, "En móvil la conversión fue 8.00%.");

    let turn = &f.orchestrator.memory().history()[1];
    let request = turn.business_request.as_ref().unwrap();
    assert_eq!(request.resolved.markets, BTreeSet::from(["BR".to_string()]));
    assert_eq!(request.resolved.date_range, Some(december_2024()));
    assert_eq!(request.resolved.devices, BTreeSet::from([DeviceSegment::Mobile]));
    match &turn.technical_result {
        Some(TechnicalResult::Rows { finding, .. }) => {
            assert_eq!(finding.conversion_rate, Some(0.08));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}

#[tokio::test]
async fn integer_ratio_is_reported_as_decimal() {
    let mut f = fixture();

    f.business
        .push_message("Conversion rate for Brazil in December 2024.")
        .push_message("7.34%");
    f.data.push_sql(
        "SELECT SUM(payment_confirmation_loaded) / SUM(traffic) AS conversion_rate \
         FROM amplitude.funnels_resumido \
         WHERE culture = 'BR' AND date BETWEEN '2024-12-01' AND '2024-12-31'",
    );

    f.orchestrator
        .handle_turn("What was the conversion rate in Brazil in December 2024?")
        .await
        .unwrap();

    let turn = &f.orchestrator.memory().history()[0];
    let query = turn.technical_query.as_deref().unwrap();
    assert!(query.contains("SUM(payment_confirmation_loaded) * 1.0 / SUM(traffic)"));
    match &turn.technical_result {
        Some(TechnicalResult::Rows { finding, .. }) => {
            assert_eq!(finding.rows[0].get_f64("conversion_rate"), Some(0.0734));
        }
        other => panic!("unexpected result: {:?}", other),
    }
    assert!(last_prompt(&f.business).contains("0.0734"));
}

#[tokio::test]
async fn zero_rows_answer_has_no_figures() {
    let mut f = fixture();

    f.business.push_message("Conversion for Uruguay in March 2024.");
    f.data.push_sql(
        "SELECT culture, SUM(payment_confirmation_loaded) * 1.0 / NULLIF(SUM(traffic), 0) AS conversion_rate \
         FROM amplitude.funnels_resumido \
         WHERE culture = 'UY' AND date BETWEEN '2024-03-01' AND '2024-03-31' \
         GROUP BY culture",
    );

    let outcome = f
        .orchestrator
        .handle_turn("¿Cuál fue la conversión de Uruguay en marzo de 2024?")
        .await
        .unwrap();

    assert_eq!(outcome.status, TurnStatus::Completed);
    assert!(outcome.final_answer.contains("No encontré datos"));
    assert!(!outcome.final_answer.chars().any(|c| c.is_ascii_digit()));
    assert!(matches!(
        f.orchestrator.memory().history()[0].technical_result,
        Some(TechnicalResult::EmptyResult { .. })
    ));
    // Formulate only; the empty result is explained without the LLM.
    assert_eq!(f.business.request_count(), 1);
}

#[tokio::test]
async fn three_unsafe_queries_end_unanswerable() {
    let mut f = fixture();

    f.business.push_message("Conversion for Chile.");
    f.data
        .push_sql("DELETE FROM amplitude.funnels_resumido WHERE culture = 'CL'")
        .push_sql("SELECT * FROM amplitude.funnels_resumido; DROP TABLE amplitude.funnels_resumido")
        .push_sql("UPDATE amplitude.funnels_resumido SET traffic = 0");

    let outcome = f
        .orchestrator
        .handle_turn("What was the conversion rate in Chile?")
        .await
        .unwrap();

    assert!(outcome.final_answer.contains("Unanswerable: unsafe-query"));
    assert_eq!(f.orchestrator.memory().len(), 1);
    let turn = &f.orchestrator.memory().history()[0];
    assert_eq!(turn.technical_query, None);
    assert_eq!(turn.extracted.markets, BTreeSet::from(["CL".to_string()]));
    assert_eq!(f.data.request_count(), 3);
}

#[tokio::test]
async fn schema_lookup_then_query() {
    let mut f = fixture();

    f.business
        .push_message("Traffic for Chile in December 2024.")
        .push_message("Chile had 2,000 visits.");
    f.data
        .push_tool_call("get_schema_info", json!({}))
        .push_sql(
            "SELECT SUM(traffic) AS traffic FROM amplitude.funnels_resumido \
             WHERE culture = 'CL' AND date BETWEEN '2024-12-01' AND '2024-12-31'",
        );

    let outcome = f
        .orchestrator
        .handle_turn("What was the traffic in Chile in December 2024?")
        .await
        .unwrap();

    assert_eq!(outcome.final_answer, "Chile had 2,000 visits.");
    let turn = &f.orchestrator.memory().history()[0];
    match &turn.technical_result {
        Some(TechnicalResult::Rows { finding, .. }) => {
            assert_eq!(finding.rows[0].get_f64("traffic"), Some(2000.0));
        }
        other => panic!("unexpected result: {:?}", other),
    }
}
