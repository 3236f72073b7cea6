use serde_json::{json, Value as JsonValue};

/// System prompt guiding the provider when elaborating conflict findings.
pub fn conflict_briefing_system_prompt() -> &'static str {
    r#"You are a resource planning copilot for staffing managers. You receive a JSON
object describing employees whose booked hours exceed standard monthly capacity,
largest overload first, with a per-project breakdown for each. Write a short plain-text
briefing (3-5 sentences) a manager can act on: name who is most overloaded, which
projects drive the overload, and what to deprioritize first. Do not use markdown,
bullet lists, or code blocks. Do not invent employees, projects, or numbers that are
not in the payload."#
}

/// System prompt guiding the provider when elaborating a capacity forecast.
pub fn forecast_outlook_system_prompt() -> &'static str {
    r#"You are a resource planning copilot for staffing managers. You receive a JSON
object with a month-by-month projection of team capacity versus already-booked hours,
each month classified as shortage, underutilized, or balanced. Write a short plain-text
outlook (3-5 sentences): state the overall direction, call out the riskiest month, and
recommend one concrete staffing action. Do not use markdown, bullet lists, or code
blocks. Do not invent months or numbers that are not in the payload."#
}

/// System prompt guiding the provider when elaborating rebalancing suggestions.
pub fn rebalance_plan_system_prompt() -> &'static str {
    r#"You are a resource planning copilot for staffing managers. You receive a JSON
object listing proposed hour transfers from over-allocated employees to under-allocated
ones, including before/after utilization and the projects involved. Write a short
plain-text plan (3-5 sentences) summarizing the highest-impact transfers and what the
manager should adjust in the affected projects. Treat every transfer as advisory. Do
not use markdown, bullet lists, or code blocks. Do not invent employees, projects, or
numbers that are not in the payload."#
}

pub fn build_conflict_payload(findings: &JsonValue) -> JsonValue {
    json!({
        "operation": "conflictBriefing",
        "facts": { "conflicts": findings },
        "expectations": {
            "format": "plainText",
            "maxSentences": 5
        }
    })
}

pub fn build_forecast_payload(predictions: &JsonValue) -> JsonValue {
    json!({
        "operation": "forecastOutlook",
        "facts": { "predictions": predictions },
        "expectations": {
            "format": "plainText",
            "maxSentences": 5
        }
    })
}

pub fn build_rebalance_payload(suggestions: &JsonValue) -> JsonValue {
    json!({
        "operation": "rebalancePlan",
        "facts": { "suggestions": suggestions },
        "expectations": {
            "format": "plainText",
            "maxSentences": 5
        }
    })
}
