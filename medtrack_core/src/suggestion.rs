//! Smart schedule suggestions from an external text-generation model.
//!
//! [`SuggestionClient`] fills a fixed instruction template with four
//! free-text fields, sends it to a [`SuggestionBackend`] and validates that
//! the model answered with exactly the two-field JSON shape
//! `{"suggestedSchedule": ..., "explanation": ...}`.
//!
//! One call is one round trip. There is no retry and no caching; the caller
//! decides what to do with a [`Error::SuggestionFailure`].

use crate::adherence::adherence_summary;
use crate::{DoseLog, Error, Medication, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default upper bound on a single suggestion round trip
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const PROMPT_TEMPLATE: &str = "\
You are an AI medication adherence assistant. You will analyze the user medication adherence patterns and suggest optimized reminder schedules, taking into account the user daily routines and past adherence behavior, so that the user can improve their medication adherence.

Medication Name: {medication_name}
Current Schedule: {current_schedule}
Adherence Data: {adherence_data}
User Daily Routine: {user_daily_routine}

Based on this information, suggest an optimized medication schedule and explain why it is better than the current schedule.

Be sure to take into account factors such as:

* The user daily routine.
* The user past adherence behavior.
* The medication properties.

Ensure to suggest a schedule that is realistic and achievable for the user.

Respond with a JSON object with exactly two string fields: \"suggestedSchedule\" and \"explanation\".
";

/// Input to a schedule suggestion. All four fields are required free text.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    pub medication_name: String,
    pub current_schedule: String,
    pub adherence_data: String,
    pub user_daily_routine: String,
}

impl SuggestionRequest {
    /// Reject requests with any empty field
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("medicationName", &self.medication_name),
            ("currentSchedule", &self.current_schedule),
            ("adherenceData", &self.adherence_data),
            ("userDailyRoutine", &self.user_daily_routine),
        ];

        for (name, value) in fields {
            if value.trim().is_empty() {
                return Err(Error::validation(name, "must not be empty"));
            }
        }
        Ok(())
    }

    /// Build a request for one medication from its log history
    pub fn for_medication(
        medication: &Medication,
        logs: &[DoseLog],
        user_daily_routine: impl Into<String>,
    ) -> Self {
        Self {
            medication_name: medication.name.clone(),
            current_schedule: medication.schedule.describe(),
            adherence_data: adherence_summary(medication, logs),
            user_daily_routine: user_daily_routine.into(),
        }
    }

    /// Render the instruction prompt sent to the model
    pub fn render_prompt(&self) -> String {
        PROMPT_TEMPLATE
            .replace("{medication_name}", self.medication_name.trim())
            .replace("{current_schedule}", self.current_schedule.trim())
            .replace("{adherence_data}", self.adherence_data.trim())
            .replace("{user_daily_routine}", self.user_daily_routine.trim())
    }
}

/// A validated suggestion returned by the model
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleSuggestion {
    pub suggested_schedule: String,
    pub explanation: String,
}

/// Schema the model is asked to honour, used by backends that support
/// constrained JSON output
pub fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "OBJECT",
        "properties": {
            "suggestedSchedule": {
                "type": "STRING",
                "description": "A suggested medication schedule, optimized for the user adherence patterns and daily routine."
            },
            "explanation": {
                "type": "STRING",
                "description": "An explanation of why the suggested schedule is better than the current schedule."
            }
        },
        "required": ["suggestedSchedule", "explanation"]
    })
}

/// Transport to an external text-generation model
///
/// Implementations return the raw model text. Transport failures must be
/// reported as [`Error::SuggestionFailure`].
#[async_trait]
pub trait SuggestionBackend: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[async_trait]
impl<B: SuggestionBackend + ?Sized> SuggestionBackend for Box<B> {
    async fn generate(&self, prompt: &str) -> Result<String> {
        (**self).generate(prompt).await
    }
}

/// Client that turns a [`SuggestionRequest`] into a [`ScheduleSuggestion`]
pub struct SuggestionClient<B> {
    backend: B,
    timeout: Duration,
}

impl<B: SuggestionBackend> SuggestionClient<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Request a schedule suggestion
    pub async fn suggest(&self, request: &SuggestionRequest) -> Result<ScheduleSuggestion> {
        self.suggest_with_cancel(request, &CancellationToken::new()).await
    }

    /// Request a schedule suggestion, abandoning it if `cancel` fires first
    pub async fn suggest_with_cancel(
        &self,
        request: &SuggestionRequest,
        cancel: &CancellationToken,
    ) -> Result<ScheduleSuggestion> {
        request.validate()?;
        let prompt = request.render_prompt();

        tracing::info!(
            medication = %request.medication_name,
            timeout_secs = self.timeout.as_secs(),
            "Requesting schedule suggestion"
        );

        let raw = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::warn!("Schedule suggestion cancelled");
                return Err(Error::SuggestionFailure("request was cancelled".into()));
            }
            outcome = tokio::time::timeout(self.timeout, self.backend.generate(&prompt)) => {
                match outcome {
                    Ok(result) => result.map_err(into_suggestion_failure)?,
                    Err(_) => {
                        tracing::warn!("Schedule suggestion timed out after {:?}", self.timeout);
                        return Err(Error::SuggestionFailure(format!(
                            "no response within {} seconds",
                            self.timeout.as_secs()
                        )));
                    }
                }
            }
        };

        let suggestion = parse_suggestion(&raw)?;
        tracing::debug!("Received schedule suggestion: {}", suggestion.suggested_schedule);
        Ok(suggestion)
    }
}

fn into_suggestion_failure(err: Error) -> Error {
    match err {
        Error::SuggestionFailure(_) => err,
        other => Error::SuggestionFailure(other.to_string()),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSuggestion {
    suggested_schedule: Option<String>,
    explanation: Option<String>,
}

/// Validate raw model output against the two-field shape
///
/// Tolerates a surrounding Markdown code fence, which some models add even
/// when asked for bare JSON.
pub fn parse_suggestion(raw: &str) -> Result<ScheduleSuggestion> {
    let body = strip_code_fence(raw);
    let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
        tracing::warn!("Model output is not JSON: {}", e);
        Error::SuggestionFailure(format!("model output is not valid JSON: {}", e))
    })?;
    if !value.is_object() {
        return Err(Error::SuggestionFailure(
            "model output is not a JSON object".into(),
        ));
    }
    let parsed: RawSuggestion = serde_json::from_value(value)
        .map_err(|e| Error::SuggestionFailure(format!("model output has the wrong shape: {}", e)))?;

    let suggested_schedule = required_field("suggestedSchedule", parsed.suggested_schedule)?;
    let explanation = required_field("explanation", parsed.explanation)?;

    Ok(ScheduleSuggestion {
        suggested_schedule,
        explanation,
    })
}

fn required_field(name: &str, value: Option<String>) -> Result<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::SuggestionFailure(format!(
            "model output is missing '{}'",
            name
        ))),
    }
}

fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the language tag line, whatever it says
    let body = match rest.split_once('\n') {
        Some((tag, body)) if !tag.trim_start().starts_with(&['{', '['][..]) => body,
        _ => rest,
    };
    let body = body.trim();
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Backend that returns a canned reply and counts calls
    struct StubBackend {
        reply: Result<String>,
        delay: Option<Duration>,
        calls: Arc<AtomicUsize>,
    }

    impl StubBackend {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_string()),
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn failing(err: Error) -> Self {
            Self {
                reply: Err(err),
                delay: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::replying(r#"{"suggestedSchedule":"x","explanation":"y"}"#)
            }
        }
    }

    #[async_trait]
    impl SuggestionBackend for StubBackend {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(Error::Other(e.to_string())),
            }
        }
    }

    fn request() -> SuggestionRequest {
        SuggestionRequest {
            medication_name: "Metformin".into(),
            current_schedule: "Daily at 09:00, 21:00".into(),
            adherence_data: "User has taken 40 doses and skipped 8 doses for Metformin.".into(),
            user_daily_routine: "I wake up around 7 AM and go to bed around 11 PM.".into(),
        }
    }

    #[test]
    fn test_prompt_interpolates_all_fields() {
        let prompt = request().render_prompt();
        assert!(prompt.contains("Medication Name: Metformin"));
        assert!(prompt.contains("Current Schedule: Daily at 09:00, 21:00"));
        assert!(prompt.contains("Adherence Data: User has taken 40 doses"));
        assert!(prompt.contains("User Daily Routine: I wake up around 7 AM"));
        assert!(!prompt.contains("{medication_name}"));
    }

    #[test]
    fn test_request_for_medication() {
        let med = crate::sample::sample_medications().remove(1);
        let now = chrono::Utc::now();
        let logs: Vec<DoseLog> = [crate::DoseStatus::Taken, crate::DoseStatus::Skipped]
            .into_iter()
            .map(|status| DoseLog {
                id: uuid::Uuid::new_v4(),
                medication_id: med.id,
                scheduled_time: now,
                action_time: now,
                status,
            })
            .collect();

        let req = SuggestionRequest::for_medication(&med, &logs, "Early riser");
        assert_eq!(req.medication_name, "Metformin");
        assert_eq!(req.current_schedule, "Daily at 09:00, 21:00");
        assert_eq!(
            req.adherence_data,
            "User has taken 1 doses and skipped 1 doses for Metformin."
        );
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_parse_suggestion_accepts_fenced_json() {
        let raw = "```json\n{\"suggestedSchedule\": \"08:00 and 20:00\", \"explanation\": \"Fits meals.\"}\n```";
        let s = parse_suggestion(raw).unwrap();
        assert_eq!(s.suggested_schedule, "08:00 and 20:00");
        assert_eq!(s.explanation, "Fits meals.");
    }

    #[test]
    fn test_parse_suggestion_accepts_any_fence_tag() {
        let body = "{\"suggestedSchedule\": \"08:00\", \"explanation\": \"Before work.\"}";
        for fence in ["```JSON\n", "```javascript\n", "```\n", "``` json \n"] {
            let raw = format!("{}{}\n```", fence, body);
            let s = parse_suggestion(&raw).unwrap();
            assert_eq!(s.suggested_schedule, "08:00", "fence {:?}", fence);
        }

        let inline = format!("```{}```", body);
        assert_eq!(parse_suggestion(&inline).unwrap().explanation, "Before work.");
    }

    #[test]
    fn test_parse_suggestion_rejects_wrong_shapes() {
        for raw in [
            "not json at all",
            r#"{"suggestedSchedule": "08:00"}"#,
            r#"{"explanation": "because"}"#,
            r#"{"suggestedSchedule": "", "explanation": "because"}"#,
            r#"["08:00", "because"]"#,
        ] {
            let err = parse_suggestion(raw).unwrap_err();
            assert!(
                matches!(err, Error::SuggestionFailure(_)),
                "expected SuggestionFailure for {:?}, got {:?}",
                raw,
                err
            );
        }
    }

    #[tokio::test]
    async fn test_suggest_success() {
        let backend = StubBackend::replying(
            r#"{"suggestedSchedule": "Take at 07:30 and 19:30", "explanation": "Aligns with breakfast and dinner."}"#,
        );
        let client = SuggestionClient::new(backend);

        let s = client.suggest(&request()).await.unwrap();
        assert!(!s.suggested_schedule.is_empty());
        assert!(!s.explanation.is_empty());
    }

    #[tokio::test]
    async fn test_suggest_fails_on_missing_field() {
        let client = SuggestionClient::new(StubBackend::replying(r#"{"suggestedSchedule": "07:30"}"#));
        let err = client.suggest(&request()).await.unwrap_err();
        assert!(matches!(err, Error::SuggestionFailure(_)));
    }

    #[tokio::test]
    async fn test_empty_field_is_rejected_before_calling_backend() {
        let backend = StubBackend::replying("{}");
        let calls = backend.calls.clone();
        let client = SuggestionClient::new(backend);

        let mut req = request();
        req.user_daily_routine = "   ".into();
        let err = client.suggest(&req).await.unwrap_err();

        assert!(err.is_validation());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_backend_error_becomes_suggestion_failure() {
        let client = SuggestionClient::new(StubBackend::failing(Error::Other("connection refused".into())));
        let err = client.suggest(&request()).await.unwrap_err();
        match err {
            Error::SuggestionFailure(msg) => assert!(msg.contains("connection refused")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_no_retry_and_no_caching() {
        let backend = StubBackend::replying(r#"{"suggestedSchedule": "a"}"#);
        let calls = backend.calls.clone();
        let client = SuggestionClient::new(backend);

        assert!(client.suggest(&request()).await.is_err());
        assert!(client.suggest(&request()).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_enforced() {
        let client = SuggestionClient::new(StubBackend::slow(Duration::from_secs(60)))
            .with_timeout(Duration::from_secs(30));

        let err = client.suggest(&request()).await.unwrap_err();
        match err {
            Error::SuggestionFailure(msg) => assert!(msg.contains("30 seconds")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancellation_stops_waiting() {
        let client = SuggestionClient::new(StubBackend::slow(Duration::from_secs(60)));
        let token = CancellationToken::new();
        token.cancel();

        let err = client.suggest_with_cancel(&request(), &token).await.unwrap_err();
        match err {
            Error::SuggestionFailure(msg) => assert!(msg.contains("cancelled")),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
