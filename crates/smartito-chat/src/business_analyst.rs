//! Business-Analyst role.
//!
//! Frames the user's question for the Data-Analyst (`formulate`) and turns
//! the technical result back into business language (`explain`).

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use smartito_core::config::MarketConfig;
use smartito_core::types::ParameterSet;
use smartito_llm::{LlmCapability, Message, Reply};

use crate::context::merge;
use crate::error::ChatError;
use crate::parser::{detect_language, detect_metric, wants_detail, ParameterExtractor};
use crate::response::{self, format_percent, PerformanceBand, PERFORMANCE_GUIDE};
use crate::types::{BusinessRequest, Finding, Language, TechnicalResult};

const SYSTEM_PROMPT: &str = "You are a business analyst for an airline website, specialized in \
funnel metrics.\n\n\
The funnel: traffic (visits), flight page loads (flight_dom_loaded_flight), payment \
confirmations (payment_confirmation_loaded). Conversion rate = payment confirmations / traffic.\n\
Markets: BR (Brazil), CL (Chile), PE (Peru), PY (Paraguay), US (United States), CO (Colombia), \
AR (Argentina), EC (Ecuador), UY (Uruguay). Devices: desktop, mobile. Traffic sources: \
Organico (direct and SEO), Pagado (paid ads), Promoted (social and promotions).\n\n\
When something is unspecified assume all devices, all markets, all traffic types and the \
current year, and say so. Never ask a clarifying question instead of answering.\n\
Never invent numbers. Use only figures present in the results you are given.";

pub struct BusinessAnalyst {
    llm: Arc<dyn LlmCapability>,
    extractor: ParameterExtractor,
}

impl BusinessAnalyst {
    pub fn new(llm: Arc<dyn LlmCapability>, markets: &[MarketConfig]) -> Self {
        Self {
            llm,
            extractor: ParameterExtractor::new(markets),
        }
    }

    /// Parameters stated in this message alone.
    pub fn extract(&self, user_text: &str, now: NaiveDate) -> ParameterSet {
        self.extractor.extract(user_text, now)
    }

    /// Build the request the Data-Analyst will answer.
    ///
    /// Parameters from this message override the snapshot field by field, so
    /// a follow-up like "¿y en móvil?" keeps the earlier market and dates.
    pub async fn formulate(
        &self,
        user_text: &str,
        snapshot: &ParameterSet,
        context: &[String],
        now: NaiveDate,
    ) -> Result<BusinessRequest, ChatError> {
        let extracted = self.extract(user_text, now);
        let resolved = merge(snapshot, &extracted);
        let metric_focus = detect_metric(user_text);

        let mut prompt = format!(
            "Question: {}\nToday: {}\nMetric: {}\nResolved parameters: {}\n\n\
             In one or two sentences, restate what the user wants to know and the \
             assumptions you make for anything unspecified.",
            user_text,
            now.format("%Y-%m-%d"),
            metric_focus,
            resolved.describe()
        );
        push_context(&mut prompt, context);

        let messages = [Message::system(SYSTEM_PROMPT), Message::user(prompt)];
        let interpretation = match self.llm.respond(&messages, &[]).await? {
            Reply::Message(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => format!("{} for {}", metric_focus, resolved.describe()),
        };
        debug!(interpretation = %interpretation, "Question formulated");

        Ok(BusinessRequest {
            question: user_text.to_string(),
            metric_focus,
            extracted,
            resolved,
            wants_detail: wants_detail(user_text),
            language: detect_language(user_text),
            interpretation,
        })
    }

    /// Render the final answer.
    ///
    /// Only results with rows go through the LLM. Empty and unanswerable
    /// outcomes use fixed templates.
    pub async fn explain(
        &self,
        result: &TechnicalResult,
        user_text: &str,
        context: &[String],
    ) -> Result<String, ChatError> {
        let language = detect_language(user_text);
        match result {
            TechnicalResult::EmptyResult { partial, .. } => {
                Ok(response::empty_result(language, *partial))
            }
            TechnicalResult::Unanswerable(reason) => Ok(response::unanswerable(reason, language)),
            TechnicalResult::Rows {
                query,
                finding,
                partial,
                narrative,
            } => {
                let detailed = wants_detail(user_text) || *partial;
                let prompt = explain_prompt(
                    user_text,
                    query,
                    finding,
                    narrative.as_deref(),
                    detailed,
                    language,
                    context,
                );
                let messages = [Message::system(SYSTEM_PROMPT), Message::user(prompt)];
                let answer = match self.llm.respond(&messages, &[]).await? {
                    Reply::Message(text) => text.trim().to_string(),
                    Reply::ToolCall(call) => {
                        return Err(ChatError::Internal(format!(
                            "unexpected tool call `{}` while explaining",
                            call.name
                        )))
                    }
                };
                if *partial {
                    Ok(format!("{}\n\n{}", answer, response::partial_notice(language)))
                } else {
                    Ok(answer)
                }
            }
        }
    }
}

fn push_context(prompt: &mut String, context: &[String]) {
    if !context.is_empty() {
        prompt.push_str("\n\nConversation so far:\n");
        prompt.push_str(&context.join("\n"));
    }
}

fn explain_prompt(
    user_text: &str,
    query: &str,
    finding: &Finding,
    narrative: Option<&str>,
    detailed: bool,
    language: Language,
    context: &[String],
) -> String {
    let results = serde_json::to_string(&finding.rows).unwrap_or_else(|_| "[]".to_string());
    let mut prompt = format!(
        "Question: {}\nQuery executed: {}\nResults: {}",
        user_text, query, results
    );
    if let Some(rate) = finding.conversion_rate {
        prompt.push_str(&format!("\nOverall conversion rate: {}", format_percent(rate)));
        if detailed {
            let band = PerformanceBand::classify(rate);
            prompt.push_str(&format!(" ({})\n{}", band.label(language), PERFORMANCE_GUIDE));
        }
    }
    if let Some(text) = narrative {
        prompt.push_str(&format!("\nData analyst notes: {}", text));
    }

    let reply_language = match language {
        Language::Spanish => "Spanish",
        Language::English => "English",
    };
    if detailed {
        prompt.push_str(&format!(
            "\n\nAnswer in {}. Give a detailed analysis: the key figures, how they compare, \
             what drives them and two or three recommendations.",
            reply_language
        ));
    } else {
        prompt.push_str(&format!(
            "\n\nAnswer in {}. Be concise: two or three sentences that answer the question \
             directly with the key figure. The user can ask for more detail.",
            reply_language
        ));
    }
    push_context(&mut prompt, context);
    prompt
}
