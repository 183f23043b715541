//! Deterministic answer text.
//!
//! Outcomes that carry no numbers are answered from fixed templates without
//! the LLM, so an empty or failed analysis can never produce a plausible
//! looking figure. Also holds the formatting helpers shared by the
//! Business-Analyst prompts.

use crate::types::{Language, UnanswerableReason};

// =============================================================================
// PerformanceBand
// =============================================================================

/// Business rating of a conversion rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PerformanceBand {
    /// Above 5%.
    Excellent,
    /// 3% to 5%.
    Good,
    /// 1% to 3%.
    NeedsImprovement,
    /// Below 1%.
    Poor,
}

impl PerformanceBand {
    /// Classify a conversion rate given as a fraction (0.0734 for 7.34%).
    pub fn classify(rate: f64) -> Self {
        let pct = rate * 100.0;
        if pct > 5.0 {
            PerformanceBand::Excellent
        } else if pct >= 3.0 {
            PerformanceBand::Good
        } else if pct >= 1.0 {
            PerformanceBand::NeedsImprovement
        } else {
            PerformanceBand::Poor
        }
    }

    pub fn label(&self, language: Language) -> &'static str {
        match (self, language) {
            (PerformanceBand::Excellent, Language::Spanish) => "excelente",
            (PerformanceBand::Good, Language::Spanish) => "bueno",
            (PerformanceBand::NeedsImprovement, Language::Spanish) => "necesita mejorar",
            (PerformanceBand::Poor, Language::Spanish) => "bajo",
            (PerformanceBand::Excellent, Language::English) => "excellent",
            (PerformanceBand::Good, Language::English) => "good",
            (PerformanceBand::NeedsImprovement, Language::English) => "needs improvement",
            (PerformanceBand::Poor, Language::English) => "poor",
        }
    }
}

/// Reference bands quoted in detailed prompts.
pub const PERFORMANCE_GUIDE: &str = "Conversion rate benchmarks: above 5% excellent, 3-5% good, \
     1-3% needs improvement, below 1% poor.";

/// Render a fractional rate as a percentage with two decimals.
pub fn format_percent(rate: f64) -> String {
    format!("{:.2}%", rate * 100.0)
}

// =============================================================================
// Templates
// =============================================================================

/// Answer for a query that matched no rows.
pub fn empty_result(language: Language, partial: bool) -> String {
    let mut answer = match language {
        Language::Spanish => "No encontré datos que coincidan con los filtros de tu pregunta. \
             No hay registros para ese período, mercado o segmento, así que no puedo dar una cifra. \
             Prueba con otro rango de fechas o con menos filtros."
            .to_string(),
        Language::English => "I found no data matching the filters in your question. \
             There are no records for that period, market or segment, so I cannot give a figure. \
             Try a different date range or fewer filters."
            .to_string(),
    };
    if partial {
        answer.push(' ');
        answer.push_str(partial_notice(language));
    }
    answer
}

/// Answer for an analysis that ended without a result.
///
/// The reason code is always spelled out so the outcome is recognizable in
/// transcripts.
pub fn unanswerable(reason: &UnanswerableReason, language: Language) -> String {
    let body = match (reason, language) {
        (UnanswerableReason::UnsafeQuery, Language::Spanish) => {
            "No pude construir una consulta segura para responder esta pregunta, así que prefiero no dar una cifra."
        }
        (UnanswerableReason::UnsafeQuery, Language::English) => {
            "I could not build a safe query for this question, so I would rather not give a figure."
        }
        (UnanswerableReason::NoQuery, Language::Spanish) => {
            "No logré traducir tu pregunta en una consulta de datos. Intenta reformularla."
        }
        (UnanswerableReason::NoQuery, Language::English) => {
            "I could not turn your question into a data query. Please try rephrasing it."
        }
        (UnanswerableReason::ExecutionError { .. }, Language::Spanish) => {
            "La consulta a la base de datos falló y no tengo resultados. Vuelve a intentarlo en unos minutos."
        }
        (UnanswerableReason::ExecutionError { .. }, Language::English) => {
            "The database query failed and I have no results. Please try again in a few minutes."
        }
        (UnanswerableReason::DataNotAvailable, Language::Spanish) => {
            "Todavía no hay datos para ese período porque aún no ha ocurrido."
        }
        (UnanswerableReason::DataNotAvailable, Language::English) => {
            "There is no data for that period yet because it has not happened."
        }
        (UnanswerableReason::InternalError, Language::Spanish) => {
            "Ocurrió un error interno al procesar tu pregunta."
        }
        (UnanswerableReason::InternalError, Language::English) => {
            "An internal error occurred while processing your question."
        }
    };
    format!("{} (Unanswerable: {})", body, reason.code())
}

/// Note appended when the requested range runs past today.
pub fn partial_notice(language: Language) -> &'static str {
    match language {
        Language::Spanish => {
            "Nota: el período solicitado aún no termina, así que los datos son parciales."
        }
        Language::English => {
            "Note: the requested period is not over yet, so the data is partial."
        }
    }
}
