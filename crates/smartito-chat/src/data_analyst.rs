//! Data-Analyst role.
//!
//! Turns a [`BusinessRequest`] into a single safe `SELECT`, runs it against
//! the warehouse and condenses the rows into a [`Finding`]. The model only
//! ever reaches the warehouse through the `run_sql` tool, and every query it
//! proposes passes the [`SqlSafetyGate`] first.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use smartito_core::config::AnalystConfig;
use smartito_core::safety::{GateWarning, SqlCandidate, SqlSafetyGate};
use smartito_core::types::ParameterSet;
use smartito_llm::{LlmCapability, LlmError, Message, Reply, ToolSpec};
use smartito_warehouse::schema::{column_summary, schema_info};
use smartito_warehouse::{Row, Warehouse, WarehouseError};

use crate::error::ChatError;
use crate::state_machine::advance;
use crate::types::{AnalystState, BusinessRequest, Finding, TechnicalResult, UnanswerableReason};

pub const RUN_SQL_TOOL: &str = "run_sql";
pub const SCHEMA_TOOL: &str = "get_schema_info";

/// Feedback sent when the model answers without calling `run_sql`.
const NO_QUERY_FEEDBACK: &str =
    "No query was executed. Call run_sql with a single SELECT statement.";

/// Column-name fragments that mark a ratio column.
const RATIO_TOKENS: &[&str] = &["rate", "ratio", "tasa", "cr", "cvr", "pct", "percent", "percentage", "porcentaje"];
const PERCENT_TOKENS: &[&str] = &["pct", "percent", "percentage", "porcentaje"];

/// Tool definitions offered to the model.
pub fn tool_specs() -> Vec<ToolSpec> {
    vec![
        ToolSpec {
            name: RUN_SQL_TOOL.to_string(),
            description: "Execute one read-only SELECT statement against the funnel table and return the rows."
                .to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "A single SELECT statement" }
                },
                "required": ["query"]
            }),
        },
        ToolSpec {
            name: SCHEMA_TOOL.to_string(),
            description: "Describe the funnel table: columns, types and the current date."
                .to_string(),
            parameters: json!({ "type": "object", "properties": {} }),
        },
    ]
}

/// System prompt for the Data-Analyst role.
pub fn system_prompt(table: &str, now: NaiveDate) -> String {
    format!(
        "You are a senior data analyst for an airline website.\n\
         You answer business questions by writing one SQL query against `{table}`.\n\
         Current date: {today}\n\n\
         Columns:\n{columns}\n\n\
         Rules:\n\
         - Only a single SELECT statement. No semicolons, no data modification.\n\
         - Always use `{table}` as the table name.\n\
         - Compare `date` with 'YYYY-MM-DD' literals.\n\
         - `culture` holds market codes (BR, CL, PE, PY, US, CO, AR, EC, UY).\n\
         - `device` is 'mobile' or 'desktop'. `traffic_type` is 'Organico', 'Pagado' or 'Promoted'.\n\
         - Conversion rate is SUM(payment_confirmation_loaded) * 1.0 / NULLIF(SUM(traffic), 0). \
           Always multiply the numerator of a ratio by 1.0.\n\
         - Select the raw SUM(payment_confirmation_loaded) and SUM(traffic) next to any ratio.\n\
         - When a filter is unspecified include all values. With no dates use the current year.\n\
         - Never refuse for missing details; make the assumption and query.\n\n\
         Call {run_sql} to execute the query. Call {schema} if you need the schema.",
        table = table,
        today = now.format("%Y-%m-%d"),
        columns = column_summary(),
        run_sql = RUN_SQL_TOOL,
        schema = SCHEMA_TOOL,
    )
}

/// SQL filter predicates implied by the resolved parameters.
pub fn filter_predicates(params: &ParameterSet) -> Vec<String> {
    let mut predicates = Vec::new();
    if let Some(range) = params.date_range {
        predicates.push(format!(
            "date BETWEEN '{}' AND '{}'",
            range.start.format("%Y-%m-%d"),
            range.end.format("%Y-%m-%d")
        ));
    }
    if !params.markets.is_empty() {
        let codes: Vec<String> = params.markets.iter().map(|m| format!("'{}'", m)).collect();
        predicates.push(format!("culture IN ({})", codes.join(", ")));
    }
    if !params.devices.is_empty() {
        let devices: Vec<String> = params
            .devices
            .iter()
            .map(|d| format!("'{}'", d.as_column_value()))
            .collect();
        predicates.push(format!("device IN ({})", devices.join(", ")));
    }
    if let Some(source) = params.traffic_source {
        predicates.push(format!("traffic_type = '{}'", source.as_column_value()));
    }
    predicates
}

fn request_prompt(request: &BusinessRequest, context: &[String]) -> String {
    let predicates = filter_predicates(&request.resolved);
    let filters = if predicates.is_empty() {
        "none (all data for the current year)".to_string()
    } else {
        predicates.join(" AND ")
    };
    let mut prompt = format!(
        "Business question: {}\nMetric focus: {}\nInterpretation: {}\nParameters: {}\nRequired filters: {}",
        request.question,
        request.metric_focus,
        request.interpretation,
        request.resolved.describe(),
        filters
    );
    if !context.is_empty() {
        prompt.push_str("\n\nConversation so far:\n");
        prompt.push_str(&context.join("\n"));
    }
    prompt
}

// =============================================================================
// DataAnalyst
// =============================================================================

pub struct DataAnalyst {
    llm: Arc<dyn LlmCapability>,
    warehouse: Arc<dyn Warehouse>,
    gate: SqlSafetyGate,
    table: String,
    max_attempts: u32,
    max_tool_steps: u32,
}

impl DataAnalyst {
    pub fn new(
        llm: Arc<dyn LlmCapability>,
        warehouse: Arc<dyn Warehouse>,
        table: &str,
        config: &AnalystConfig,
    ) -> Self {
        Self {
            llm,
            warehouse,
            gate: SqlSafetyGate::new(),
            table: table.to_string(),
            max_attempts: config.max_query_attempts.max(1),
            max_tool_steps: config.max_tool_steps.max(config.max_query_attempts),
        }
    }

    /// Answer a business request with data.
    ///
    /// Collaborator faults end in [`TechnicalResult::Unanswerable`]; only an
    /// invalid state transition is returned as an error.
    pub async fn analyze(
        &self,
        request: &BusinessRequest,
        context: &[String],
        now: NaiveDate,
    ) -> Result<TechnicalResult, ChatError> {
        let mut state = AnalystState::AwaitingQuery;

        let mut partial = false;
        if let Some(range) = request.resolved.date_range {
            if range.start > now {
                info!(range = %range, "Requested period is in the future");
                advance(&mut state, AnalystState::Done)?;
                return Ok(TechnicalResult::Unanswerable(
                    UnanswerableReason::DataNotAvailable,
                ));
            }
            partial = range.end > now;
        }

        let tools = tool_specs();
        let mut messages = vec![
            Message::system(system_prompt(&self.table, now)),
            Message::user(request_prompt(request, context)),
        ];
        let mut attempts = 0u32;
        let mut steps = 0u32;
        let mut proposed = false;

        loop {
            if attempts >= self.max_attempts || steps >= self.max_tool_steps {
                let reason = if proposed {
                    UnanswerableReason::UnsafeQuery
                } else {
                    UnanswerableReason::NoQuery
                };
                warn!(attempts, steps, reason = %reason, "Data analyst gave up");
                advance(&mut state, AnalystState::Done)?;
                return Ok(TechnicalResult::Unanswerable(reason));
            }
            steps += 1;

            let reply = match self.respond_with_retry(&messages, &tools).await {
                Ok(reply) => reply,
                Err(e) => {
                    advance(&mut state, AnalystState::Done)?;
                    return Ok(TechnicalResult::Unanswerable(
                        UnanswerableReason::ExecutionError {
                            detail: e.to_string(),
                        },
                    ));
                }
            };

            let call = match reply {
                Reply::ToolCall(call) if call.name == SCHEMA_TOOL => {
                    debug!("Schema requested");
                    let info = schema_info(&self.table, &now.format("%Y-%m-%d").to_string());
                    messages.push(Message::AssistantToolCall { call: call.clone() });
                    messages.push(Message::tool_result(call.id, info.to_string()));
                    continue;
                }
                Reply::ToolCall(call) if call.name == RUN_SQL_TOOL => call,
                Reply::ToolCall(call) => {
                    attempts += 1;
                    warn!(attempt = attempts, tool = %call.name, "Unknown tool requested");
                    advance(&mut state, AnalystState::Reformulating)?;
                    messages.push(Message::AssistantToolCall { call: call.clone() });
                    messages.push(Message::tool_result(
                        call.id,
                        format!("Unknown tool `{}`. {}", call.name, NO_QUERY_FEEDBACK),
                    ));
                    advance(&mut state, AnalystState::AwaitingQuery)?;
                    continue;
                }
                Reply::Message(text) => {
                    attempts += 1;
                    debug!(attempt = attempts, "Reply without a query");
                    advance(&mut state, AnalystState::Reformulating)?;
                    messages.push(Message::assistant(text));
                    messages.push(Message::user(NO_QUERY_FEEDBACK));
                    advance(&mut state, AnalystState::AwaitingQuery)?;
                    continue;
                }
            };

            attempts += 1;
            proposed = true;
            advance(&mut state, AnalystState::Validating)?;
            let query = call.str_arg("query").unwrap_or_default();
            let candidate = self.check(query);

            if !candidate.validation_result.is_accepted() {
                let reason = candidate
                    .reason
                    .clone()
                    .unwrap_or_else(|| "query rejected".to_string());
                warn!(attempt = attempts, reason = %reason, "Query rejected by safety gate");
                advance(&mut state, AnalystState::Reformulating)?;
                messages.push(Message::AssistantToolCall { call: call.clone() });
                messages.push(Message::tool_result(
                    call.id.clone(),
                    format!("Rejected: {}. Propose a single SELECT statement.", reason),
                ));
                advance(&mut state, AnalystState::AwaitingQuery)?;
                continue;
            }

            advance(&mut state, AnalystState::Executing)?;
            let sql = candidate.normalized_text;
            info!(attempt = attempts, sql = %sql, "Executing query");

            let rows = match self.execute_with_retry(&sql).await {
                Ok(rows) => rows,
                Err(e) => {
                    advance(&mut state, AnalystState::Done)?;
                    return Ok(TechnicalResult::Unanswerable(
                        UnanswerableReason::ExecutionError {
                            detail: e.to_string(),
                        },
                    ));
                }
            };

            if rows.is_empty() {
                info!("Query returned no rows");
                advance(&mut state, AnalystState::Done)?;
                return Ok(TechnicalResult::EmptyResult {
                    query: sql,
                    partial,
                });
            }

            advance(&mut state, AnalystState::Summarizing)?;
            let finding = summarize(rows);
            if !finding.corrected_columns.is_empty() {
                info!(columns = ?finding.corrected_columns, "Recomputed truncated ratios");
            }
            let narrative = self.narrate(request, &finding).await;
            advance(&mut state, AnalystState::Done)?;

            return Ok(TechnicalResult::Rows {
                query: sql,
                finding,
                partial,
                narrative,
            });
        }
    }

    /// Validate a query and correct integer-domain ratios.
    fn check(&self, query: &str) -> SqlCandidate {
        let candidate = self.gate.validate(query);
        if !candidate.validation_result.is_accepted() || candidate.warnings.is_empty() {
            return candidate;
        }
        for warning in &candidate.warnings {
            debug!(warning = %warning, "Correcting ratio");
        }
        let corrected = correct_integer_division(&candidate.normalized_text, &candidate.warnings);
        let revalidated = self.gate.validate(&corrected);
        if revalidated.validation_result.is_accepted() {
            revalidated
        } else {
            candidate
        }
    }

    async fn respond_with_retry(
        &self,
        messages: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Reply, LlmError> {
        match self.llm.respond(messages, tools).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                warn!(error = %e, model = self.llm.model_name(), "LLM request failed, retrying once");
                self.llm.respond(messages, tools).await
            }
        }
    }

    async fn execute_with_retry(&self, sql: &str) -> Result<Vec<Row>, WarehouseError> {
        match self.warehouse.execute(sql).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                warn!(error = %e, "Warehouse query failed, retrying once");
                self.warehouse.execute(sql).await
            }
        }
    }

    /// Short technical summary of the finding. Failures are ignored.
    async fn narrate(&self, request: &BusinessRequest, finding: &Finding) -> Option<String> {
        let payload = serde_json::to_string(finding).ok()?;
        let messages = [
            Message::system(
                "You are a data analyst. Summarize the result in two or three sentences \
                 using only the numbers given. Ratios are fractions, not percentages.",
            ),
            Message::user(format!("Question: {}\nResult: {}", request.question, payload)),
        ];
        match self.llm.respond(&messages, &[]).await {
            Ok(Reply::Message(text)) if !text.trim().is_empty() => Some(text),
            Ok(_) => None,
            Err(e) => {
                debug!(error = %e, "Narrative unavailable");
                None
            }
        }
    }
}

/// Insert `* 1.0` after each flagged numerator.
///
/// Edits run from the last span to the first so earlier offsets stay valid.
pub fn correct_integer_division(text: &str, warnings: &[GateWarning]) -> String {
    let mut ends: Vec<usize> = warnings
        .iter()
        .map(|w| match w {
            GateWarning::IntegerDivision { numerator, .. } => numerator.end,
        })
        .filter(|end| *end <= text.len() && text.is_char_boundary(*end))
        .collect();
    ends.sort_unstable_by(|a, b| b.cmp(a));
    ends.dedup();

    let mut out = text.to_string();
    for end in ends {
        out.insert_str(end, " * 1.0");
    }
    out
}

// =============================================================================
// Findings
// =============================================================================

/// Lowercased name split on anything that is not a letter or digit, so
/// `conversion_rate` yields `conversion` and `rate`.
fn name_tokens(name: &str) -> Vec<String> {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn is_ratio_column(name: &str) -> bool {
    name_tokens(name).iter().any(|t| RATIO_TOKENS.contains(&t.as_str()))
}

fn is_percent_column(name: &str) -> bool {
    name_tokens(name).iter().any(|t| PERCENT_TOKENS.contains(&t.as_str()))
}

fn find_column<'a>(columns: &'a [String], fragment: &str) -> Option<&'a str> {
    columns
        .iter()
        .map(String::as_str)
        .find(|c| {
            let lower = c.to_lowercase();
            lower.contains(fragment) && !lower.contains("type") && !is_ratio_column(c)
        })
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn number(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// Condense result rows into grounded numbers.
///
/// Ratio columns are rounded to 4 decimal places. When a row carries the
/// payment and traffic counts, a ratio that came back as a whole number
/// different from the true quotient is recomputed from them.
pub fn summarize(rows: Vec<Row>) -> Finding {
    let columns: Vec<String> = rows
        .first()
        .map(|r| r.columns().map(str::to_string).collect())
        .unwrap_or_default();
    let payment_col = find_column(&columns, "payment").map(str::to_string);
    let traffic_col = find_column(&columns, "traffic").map(str::to_string);

    let mut corrected_columns: Vec<String> = Vec::new();
    let mut total_payments = 0.0;
    let mut total_traffic = 0.0;
    let mut normalized = Vec::with_capacity(rows.len());

    for row in rows {
        let payments = payment_col.as_deref().and_then(|c| row.get_f64(c));
        let traffic = traffic_col.as_deref().and_then(|c| row.get_f64(c));
        if let (Some(p), Some(t)) = (payments, traffic) {
            total_payments += p;
            total_traffic += t;
        }

        let mut out = Row::new();
        for (name, value) in row.iter() {
            if !is_ratio_column(name) {
                out.push(name, value.clone());
                continue;
            }
            let Some(reported) = value.as_f64() else {
                out.push(name, value.clone());
                continue;
            };
            let recomputed = match (payments, traffic) {
                (Some(p), Some(t)) if t > 0.0 => {
                    Some(if is_percent_column(name) { p / t * 100.0 } else { p / t })
                }
                _ => None,
            };
            let truncated = reported.fract() == 0.0;
            let fixed = match recomputed {
                Some(r) if truncated && (r - reported).abs() > 1e-9 => {
                    if !corrected_columns.iter().any(|c| c == name) {
                        corrected_columns.push(name.to_string());
                    }
                    r
                }
                _ => reported,
            };
            out.push(name, number(round4(fixed)));
        }
        normalized.push(out);
    }

    let conversion_rate = (total_traffic > 0.0).then(|| round4(total_payments / total_traffic));

    Finding {
        columns,
        rows: normalized,
        conversion_rate,
        corrected_columns,
    }
}

// =============================================================================
// Tests
// =============================================================================
