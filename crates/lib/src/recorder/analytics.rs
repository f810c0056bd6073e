//! Analytics for the review view: per-session summaries and totals across sessions.

use crate::recorder::{SessionId, SessionMode, SessionRecord};
use crate::remote::Role;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub mode: SessionMode,
    /// Whole seconds between start and end time.
    pub total_time_secs: i64,
    pub message_count: usize,
    /// Mean assistant response time in ms; messages without a duration count as 0.
    pub average_response_ms: u64,
}

impl SessionSummary {
    pub fn of(session: &SessionRecord) -> Self {
        let elapsed_ms = (session.end_time - session.start_time).num_milliseconds();
        let total_time_secs = (elapsed_ms as f64 / 1000.0).round() as i64;

        let durations: Vec<u64> = session
            .messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .map(|m| m.duration.unwrap_or(0))
            .collect();
        let average_response_ms = if durations.is_empty() {
            0
        } else {
            let sum: u64 = durations.iter().sum();
            (sum as f64 / durations.len() as f64).round() as u64
        };

        Self {
            session_id: session.id.clone(),
            mode: session.mode,
            total_time_secs,
            message_count: session.messages.len(),
            average_response_ms,
        }
    }
}

/// Totals across every recorded session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub total_sessions: usize,
    pub text_only_sessions: usize,
    pub avatar_sessions: usize,
    pub total_messages: usize,
}

impl AnalyticsOverview {
    pub fn of(sessions: &[SessionRecord]) -> Self {
        sessions.iter().fold(Self::default(), |mut acc, s| {
            acc.total_sessions += 1;
            match s.mode {
                SessionMode::TextOnly => acc.text_only_sessions += 1,
                SessionMode::Avatar => acc.avatar_sessions += 1,
            }
            acc.total_messages += s.messages.len();
            acc
        })
    }
}
