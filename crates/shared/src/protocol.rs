use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{
    domain::{EndpointId, EndpointState, InstanceId},
    error::InvalidPayload,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub question: String,
    #[serde(default)]
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub topic: String,
    pub difficulty: String,
    pub questions: Vec<Question>,
}

impl SessionData {
    /// Clamp a requested question index into the session's range.
    pub fn clamp_index(&self, index: usize) -> usize {
        index.min(self.questions.len().saturating_sub(1))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionIndex {
    pub index: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeakCommand {
    pub index: usize,
    pub text: String,
}

/// Result of the speech-to-text step for one question. Exactly one of
/// `text` and `error` is set on a valid payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptionResult {
    pub index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscriptionResult {
    pub fn text(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: Some(text.into()),
            error: None,
        }
    }

    pub fn failed(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            text: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerAnalysis {
    #[serde(default)]
    pub relevance_score: f64,
    #[serde(default)]
    pub completeness_score: f64,
    #[serde(default)]
    pub clarity_score: f64,
    #[serde(default)]
    pub accuracy_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_score: Option<f64>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub improvements: Vec<String>,
    #[serde(default)]
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisData {
    #[serde(default)]
    pub analysis_results: BTreeMap<usize, AnswerAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_analysis: Option<serde_json::Value>,
    #[serde(default)]
    pub overall_score: f64,
    pub topic: String,
    pub difficulty: String,
}

/// Mean of the per-answer overall scores rounded to one decimal.
/// Missing scores count as zero, NaN scores are skipped.
pub fn overall_score(results: &BTreeMap<usize, AnswerAnalysis>) -> f64 {
    let scores: Vec<f64> = results
        .values()
        .map(|result| result.overall_score.unwrap_or(0.0))
        .filter(|score| !score.is_nan())
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    let mean = scores.iter().sum::<f64>() / scores.len() as f64;
    (mean * 10.0).round() / 10.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigate {
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollCommand {
    pub direction: ScrollDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisTab {
    #[default]
    Radar,
    Bar,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabChange {
    pub tab: AnalysisTab,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum QuestionDetails {
    Show { index: usize },
    Close,
}

/// Replay policy class of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Latest value is cached on the host and replayed to late joiners.
    State,
    /// Transient instruction, never cached or replayed.
    Command,
}

/// The closed channel registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Channel {
    SessionStart,
    QuestionIndex,
    Speak,
    TranscriptionResult,
    AnalysisData,
    Navigate,
    Scroll,
    TabChange,
    QuestionDetails,
}

impl Channel {
    pub const ALL: [Channel; 9] = [
        Channel::SessionStart,
        Channel::QuestionIndex,
        Channel::Speak,
        Channel::TranscriptionResult,
        Channel::AnalysisData,
        Channel::Navigate,
        Channel::Scroll,
        Channel::TabChange,
        Channel::QuestionDetails,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Channel::SessionStart => "session-start",
            Channel::QuestionIndex => "question-index",
            Channel::Speak => "speak",
            Channel::TranscriptionResult => "transcription-result",
            Channel::AnalysisData => "analysis-data",
            Channel::Navigate => "navigate",
            Channel::Scroll => "scroll",
            Channel::TabChange => "tab-change",
            Channel::QuestionDetails => "question-details",
        }
    }

    pub fn kind(self) -> ChannelKind {
        match self {
            Channel::SessionStart
            | Channel::QuestionIndex
            | Channel::TranscriptionResult
            | Channel::AnalysisData => ChannelKind::State,
            Channel::Speak
            | Channel::Navigate
            | Channel::Scroll
            | Channel::TabChange
            | Channel::QuestionDetails => ChannelKind::Command,
        }
    }

    pub fn is_state(self) -> bool {
        self.kind() == ChannelKind::State
    }
}

/// A relayed message: a channel name plus its typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "channel", content = "payload", rename_all = "kebab-case")]
pub enum Message {
    SessionStart(SessionData),
    QuestionIndex(QuestionIndex),
    Speak(SpeakCommand),
    TranscriptionResult(TranscriptionResult),
    AnalysisData(AnalysisData),
    Navigate(Navigate),
    Scroll(ScrollCommand),
    TabChange(TabChange),
    QuestionDetails(QuestionDetails),
}

impl Message {
    pub fn channel(&self) -> Channel {
        match self {
            Message::SessionStart(_) => Channel::SessionStart,
            Message::QuestionIndex(_) => Channel::QuestionIndex,
            Message::Speak(_) => Channel::Speak,
            Message::TranscriptionResult(_) => Channel::TranscriptionResult,
            Message::AnalysisData(_) => Channel::AnalysisData,
            Message::Navigate(_) => Channel::Navigate,
            Message::Scroll(_) => Channel::Scroll,
            Message::TabChange(_) => Channel::TabChange,
            Message::QuestionDetails(_) => Channel::QuestionDetails,
        }
    }

    pub fn validate(&self) -> Result<(), InvalidPayload> {
        match self {
            Message::SessionStart(session) => {
                if session.questions.is_empty() {
                    return Err(InvalidPayload::EmptySession);
                }
                if let Some(index) = session
                    .questions
                    .iter()
                    .position(|q| q.question.trim().is_empty())
                {
                    return Err(InvalidPayload::BlankQuestion { index });
                }
                Ok(())
            }
            Message::TranscriptionResult(result) => {
                if result.text.is_some() == result.error.is_some() {
                    return Err(InvalidPayload::AmbiguousTranscription {
                        index: result.index,
                    });
                }
                Ok(())
            }
            Message::AnalysisData(analysis) => {
                if analysis.analysis_results.is_empty() && analysis.overall_analysis.is_none() {
                    return Err(InvalidPayload::EmptyAnalysis);
                }
                let scores_finite = analysis.overall_score.is_finite()
                    && analysis.analysis_results.values().all(|result| {
                        [
                            result.relevance_score,
                            result.completeness_score,
                            result.clarity_score,
                            result.accuracy_score,
                            result.overall_score.unwrap_or(0.0),
                        ]
                        .iter()
                        .all(|score| score.is_finite())
                    });
                if !scores_finite {
                    return Err(InvalidPayload::NonFiniteScore);
                }
                Ok(())
            }
            Message::Navigate(navigate) => {
                if !navigate.path.starts_with('/') {
                    return Err(InvalidPayload::RelativePath(navigate.path.clone()));
                }
                Ok(())
            }
            Message::QuestionIndex(_)
            | Message::Speak(_)
            | Message::Scroll(_)
            | Message::TabChange(_)
            | Message::QuestionDetails(_) => Ok(()),
        }
    }
}

/// Endpoint -> host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientRequest {
    Ready,
    Send {
        destination: EndpointId,
        message: Message,
    },
    RequestResend,
}

/// Host -> endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Attached {
        endpoint: EndpointId,
        instance_id: InstanceId,
    },
    Delivery {
        message: Message,
        #[serde(default)]
        replayed: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointStatus {
    pub endpoint: EndpointId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<InstanceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<EndpointState>,
    pub queued: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub question_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_index: Option<usize>,
    pub transcriptions: usize,
    pub has_analysis: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub endpoints: Vec<EndpointStatus>,
    pub cache: CacheSummary,
}
