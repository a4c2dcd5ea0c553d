use anyhow::Result;
use log::{debug, error, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::email::MessageMeta;
use crate::openai_client::CompletionService;

/// An accepted tee-time confirmation. Field order matches the ledger columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRecord {
    pub course_name: String,
    /// Tee date, "mm/dd/yy"
    pub date: String,
    pub course_fees: f64,
    pub convenience_fees: f64,
    pub is_golf_confirmation: bool,
    pub is_cancellation: bool,
    pub due_at_course: f64,
    pub paid_online: f64,
    pub number_of_players: u32,
}

/// Why an email produced no record
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("extraction response could not be parsed as a JSON object")]
    UnparsableResponse { raw: String },

    #[error("not an accepted confirmation (missing confirmation flag or zero course fee)")]
    Filtered { candidate: Value },

    #[error("candidate is missing fields required for validation")]
    MalformedCandidate { candidate: Value },
}

/// Outcome of one extraction attempt. Transport failures of the completion
/// service are reported as errors, not rejections.
#[derive(Debug)]
pub enum Extraction {
    Accepted(ConfirmationRecord),
    Rejected(Rejection),
}

/// Extracts tee-time confirmations from flattened email bodies through a
/// completion service.
pub struct ConfirmationExtractor<S: CompletionService> {
    service: S,
}

impl<S: CompletionService> ConfirmationExtractor<S> {
    pub fn new(service: S) -> Self {
        ConfirmationExtractor { service }
    }

    /// Access the underlying completion service (stubs inspect it in tests)
    pub fn service(&self) -> &S {
        &self.service
    }

    /// Run one body through the service and validate the result. Exactly one
    /// service call per message, no retries; an empty body is still sent and
    /// the engine is expected to answer with a non-confirmation.
    pub async fn extract_confirmation(&self, body: &str, meta: &MessageMeta) -> Result<Extraction> {
        let instruction = build_instruction(body);

        let raw = self.service.complete(&instruction).await?;

        let normalized = normalize_response(&raw);

        let candidate = match serde_json::from_str::<Value>(&normalized) {
            Ok(value) if value.is_object() => value,
            _ => {
                error!(
                    "Error parsing extraction response for email '{}', raw response:\n{}",
                    meta.subject,
                    raw.trim()
                );
                return Ok(Extraction::Rejected(Rejection::UnparsableResponse { raw }));
            }
        };

        let rejection = match validate_candidate(&candidate) {
            Ok(record) => {
                debug!(
                    "Accepted confirmation for '{}' on {} ({} player(s))",
                    record.course_name, record.date, record.number_of_players
                );
                return Ok(Extraction::Accepted(record));
            }
            Err(rejection) => rejection,
        };

        match &rejection {
            Rejection::Filtered { candidate } => {
                info!("Skipping email '{}': {} - {}", meta.subject, rejection, candidate);
            }
            Rejection::MalformedCandidate { candidate } => {
                warn!("Skipping email '{}': {} - {}", meta.subject, rejection, candidate);
            }
            Rejection::UnparsableResponse { .. } => {}
        }

        Ok(Extraction::Rejected(rejection))
    }
}

/// Fixed instruction template; the body is the only substitution.
fn build_instruction(body: &str) -> String {
    format!(
        r#"Determine if this is a golf confirmation email and extract the following details in the specified types.
Only consider golf confirmations with complete tee time details, not reminders and other emails.
If the body is empty or it's strictly not a golf confirmation - return 0 for is_golf_confirmation and empty fields for the others:

- Course Fees (number)
- Convenience Fees if any (number)
- Course Name (string)
- Date (mm/dd/yy string)
- Is this a cancellation email vs confirmation (0/1)
- How much of the price is still due at course? (number)
- How much of the price was paid online? (number)
- Number of players (number)

Email body:
{body}

Provide the details as **valid JSON output**, ensuring:
- No additional formatting, explanations, or extra text.
- The JSON starts with '{{' and ends with '}}'.
- The keys are always enclosed in double quotes.
- The values are properly formatted for JSON.
- Any boolean values are represented as 0 or 1.

JSON format:
{{
    "is_golf_confirmation": 1,
    "course_fees": "42.50",
    "convenience_fees": "2.50",
    "course_name": "Blue Water Golf Course",
    "date": "05/10/24",
    "is_cancellation": 0,
    "due_at_course": "42.50",
    "paid_online": "2.50",
    "number_of_players": 2
}}

Return only this JSON object with no extra text/quotations/formatting."#,
        body = body
    )
}

/// Clean up a completion before any parse attempt: drop wrapping quotes,
/// then stray "json" code-fence tags, then surrounding whitespace.
fn normalize_response(raw: &str) -> String {
    let unquoted = strip_wrapping_quotes(raw.trim());
    strip_json_tags(&unquoted)
}

fn strip_wrapping_quotes(text: &str) -> String {
    let quote_re = Regex::new(r#"^["']+|["']+$"#).unwrap();
    quote_re.replace_all(text, "").trim().to_string()
}

fn strip_json_tags(text: &str) -> String {
    let tag_re = Regex::new(r"(?i)\bjson\b").unwrap();
    tag_re.replace_all(text, "").trim().to_string()
}

/// Apply the acceptance test to a parsed candidate and coerce it into a
/// typed record.
fn validate_candidate(candidate: &Value) -> Result<ConfirmationRecord, Rejection> {
    // A missing flag counts as falsy, not as malformed
    if !truthy(candidate.get("is_golf_confirmation")) {
        return Err(Rejection::Filtered {
            candidate: candidate.clone(),
        });
    }

    let course_fees = match candidate.get("course_fees").and_then(as_number) {
        Some(fees) => fees,
        None => {
            return Err(Rejection::MalformedCandidate {
                candidate: candidate.clone(),
            })
        }
    };

    // Integer truncation on purpose: a fee of "0.50" counts as zero
    if course_fees.trunc() as i64 == 0 {
        return Err(Rejection::Filtered {
            candidate: candidate.clone(),
        });
    }

    Ok(ConfirmationRecord {
        course_name: string_field(candidate, "course_name"),
        date: string_field(candidate, "date"),
        course_fees,
        convenience_fees: number_field(candidate, "convenience_fees"),
        is_golf_confirmation: true,
        is_cancellation: truthy(candidate.get("is_cancellation")),
        due_at_course: number_field(candidate, "due_at_course"),
        paid_online: number_field(candidate, "paid_online"),
        number_of_players: count_field(candidate, "number_of_players"),
    })
}

fn truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Some(Value::String(s)) => !s.is_empty(),
        _ => false,
    }
}

/// The engine answers with decimal strings most of the time, bare numbers
/// some of the time; accept both.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn number_field(candidate: &Value, key: &str) -> f64 {
    candidate.get(key).and_then(as_number).unwrap_or(0.0)
}

fn string_field(candidate: &Value, key: &str) -> String {
    candidate
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string()
}

fn count_field(candidate: &Value, key: &str) -> u32 {
    candidate
        .get(key)
        .and_then(as_number)
        .map(|n| if n > 0.0 { n.trunc() as u32 } else { 0 })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_instruction_embeds_body_and_field_names() {
        let instruction = build_instruction("Tee time at 9:04 AM");
        assert!(instruction.contains("Tee time at 9:04 AM"));
        for field in [
            "is_golf_confirmation",
            "course_fees",
            "convenience_fees",
            "course_name",
            "date",
            "is_cancellation",
            "due_at_course",
            "paid_online",
            "number_of_players",
        ] {
            assert!(instruction.contains(field), "missing field {}", field);
        }
    }

    #[test]
    fn test_instruction_still_built_for_empty_body() {
        let instruction = build_instruction("");
        assert!(instruction.contains("Email body:"));
    }

    #[test]
    fn test_strip_wrapping_quotes() {
        assert_eq!(strip_wrapping_quotes("\"{\\\"a\\\":1}\""), "{\\\"a\\\":1}");
        assert_eq!(strip_wrapping_quotes("'{}'"), "{}");
        assert_eq!(strip_wrapping_quotes("{}"), "{}");
        // Quotes inside the text are left alone
        assert_eq!(strip_wrapping_quotes("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_json_tags() {
        assert_eq!(strip_json_tags("json\n{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_json_tags("JSON {\"a\":1}"), "{\"a\":1}");
        // Word boundary: does not eat substrings of longer words
        assert_eq!(strip_json_tags("jsonp(1)"), "jsonp(1)");
    }

    #[test]
    fn test_normalize_fence_tag_then_parse() {
        let normalized = normalize_response("json\n{\"is_golf_confirmation\":0}");
        assert_eq!(normalized, "{\"is_golf_confirmation\":0}");
        assert!(serde_json::from_str::<Value>(&normalized).is_ok());
    }

    #[test]
    fn test_truthy() {
        assert!(truthy(Some(&json!(1))));
        assert!(truthy(Some(&json!(true))));
        assert!(truthy(Some(&json!("1"))));
        assert!(!truthy(Some(&json!(0))));
        assert!(!truthy(Some(&json!(false))));
        assert!(!truthy(Some(&json!(""))));
        assert!(!truthy(Some(&json!(null))));
        assert!(!truthy(None));
    }

    #[test]
    fn test_as_number_accepts_strings_and_numbers() {
        assert_eq!(as_number(&json!("42.50")), Some(42.5));
        assert_eq!(as_number(&json!(42.5)), Some(42.5));
        assert_eq!(as_number(&json!(2)), Some(2.0));
        assert_eq!(as_number(&json!("not a fee")), None);
        assert_eq!(as_number(&json!(null)), None);
    }

    #[test]
    fn test_validate_rejects_non_confirmation_as_filtered() {
        let candidate = json!({"is_golf_confirmation": 0});
        match validate_candidate(&candidate) {
            Err(Rejection::Filtered { .. }) => {}
            other => panic!("expected Filtered, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_missing_flag_is_filtered_not_malformed() {
        let candidate = json!({"course_fees": "42.50"});
        match validate_candidate(&candidate) {
            Err(Rejection::Filtered { .. }) => {}
            other => panic!("expected Filtered, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_zero_fee_as_filtered() {
        let candidate = json!({"is_golf_confirmation": 1, "course_fees": "0"});
        match validate_candidate(&candidate) {
            Err(Rejection::Filtered { .. }) => {}
            other => panic!("expected Filtered, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_truncates_fractional_fee_to_zero() {
        // "0.50" truncates to 0 and is filtered out, by design
        let candidate = json!({"is_golf_confirmation": 1, "course_fees": "0.50"});
        match validate_candidate(&candidate) {
            Err(Rejection::Filtered { .. }) => {}
            other => panic!("expected Filtered, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_missing_fee_is_malformed() {
        let candidate = json!({"is_golf_confirmation": 1, "course_name": "Blue Water Golf Course"});
        match validate_candidate(&candidate) {
            Err(Rejection::MalformedCandidate { .. }) => {}
            other => panic!("expected MalformedCandidate, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_uncoercible_fee_is_malformed() {
        let candidate = json!({"is_golf_confirmation": 1, "course_fees": "forty-two"});
        match validate_candidate(&candidate) {
            Err(Rejection::MalformedCandidate { .. }) => {}
            other => panic!("expected MalformedCandidate, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_accepts_complete_candidate() {
        let candidate = json!({
            "is_golf_confirmation": 1,
            "course_fees": "42.50",
            "convenience_fees": "2.50",
            "course_name": "Blue Water Golf Course",
            "date": "05/10/24",
            "is_cancellation": 0,
            "due_at_course": "42.50",
            "paid_online": "0",
            "number_of_players": 2
        });

        let record = validate_candidate(&candidate).expect("candidate should be accepted");
        assert_eq!(record.course_name, "Blue Water Golf Course");
        assert_eq!(record.date, "05/10/24");
        assert_eq!(record.course_fees, 42.5);
        assert_eq!(record.convenience_fees, 2.5);
        assert!(record.is_golf_confirmation);
        assert!(!record.is_cancellation);
        assert_eq!(record.due_at_course, 42.5);
        assert_eq!(record.paid_online, 0.0);
        assert_eq!(record.number_of_players, 2);
    }

    #[test]
    fn test_validate_defaults_for_optional_fields() {
        let candidate = json!({"is_golf_confirmation": 1, "course_fees": 55});
        let record = validate_candidate(&candidate).expect("candidate should be accepted");
        assert_eq!(record.course_name, "");
        assert_eq!(record.date, "");
        assert_eq!(record.convenience_fees, 0.0);
        assert_eq!(record.number_of_players, 0);
        assert!(!record.is_cancellation);
    }

    struct CannedService(String);

    impl CompletionService for CannedService {
        fn complete<'a>(&'a self, _instruction: &'a str) ->
            std::pin::Pin<Box<dyn std::future::Future<Output = Result<String>> + Send + 'a>> {
            let response = self.0.clone();
            Box::pin(async move { Ok(response) })
        }
    }

    #[test]
    fn test_extract_confirmation_end_to_end() {
        let extractor = ConfirmationExtractor::new(CannedService(
            "{\"is_golf_confirmation\": 1, \"course_fees\": \"42.50\"}".to_string(),
        ));

        let extraction = tokio_test::block_on(
            extractor.extract_confirmation("some body", &MessageMeta::default()),
        )
        .expect("stub call should succeed");

        match extraction {
            Extraction::Accepted(record) => assert_eq!(record.course_fees, 42.5),
            other => panic!("expected acceptance, got {:?}", other),
        }
    }
}
