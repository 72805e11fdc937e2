//! Last-known-good interview state.
//!
//! The host keeps the authoritative copy and replays it to late joiners;
//! each endpoint mirrors it into local storage to survive its own reloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::protocol::{
    AnalysisData, CacheSummary, Message, QuestionIndex, SessionData, TranscriptionResult,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionCache {
    #[serde(default)]
    current_session: Option<SessionData>,
    #[serde(default)]
    question_index: Option<usize>,
    #[serde(default)]
    transcriptions_by_index: BTreeMap<usize, TranscriptionResult>,
    #[serde(default)]
    latest_analysis: Option<AnalysisData>,
}

impl SessionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a message into the cache. Returns whether anything changed;
    /// command messages never change the cache.
    pub fn record(&mut self, message: &Message) -> bool {
        match message {
            Message::SessionStart(session) => self.replace_session(session),
            Message::QuestionIndex(QuestionIndex { index }) => {
                if self.question_index == Some(*index) {
                    return false;
                }
                self.question_index = Some(*index);
                true
            }
            Message::TranscriptionResult(result) => {
                if self.transcriptions_by_index.get(&result.index) == Some(result) {
                    return false;
                }
                self.transcriptions_by_index
                    .insert(result.index, result.clone());
                true
            }
            Message::AnalysisData(analysis) => {
                if self.latest_analysis.as_ref() == Some(analysis) {
                    return false;
                }
                self.latest_analysis = Some(analysis.clone());
                true
            }
            Message::Speak(_)
            | Message::Navigate(_)
            | Message::Scroll(_)
            | Message::TabChange(_)
            | Message::QuestionDetails(_) => false,
        }
    }

    /// Every session-start begins a new attempt, even with identical content.
    pub fn replace_session(&mut self, session: &SessionData) -> bool {
        let changed = self.current_session.as_ref() != Some(session)
            || self.question_index.is_some()
            || !self.transcriptions_by_index.is_empty()
            || self.latest_analysis.is_some();
        *self = Self {
            current_session: Some(session.clone()),
            ..Self::default()
        };
        changed
    }

    pub fn is_empty(&self) -> bool {
        self.current_session.is_none()
            && self.question_index.is_none()
            && self.transcriptions_by_index.is_empty()
            && self.latest_analysis.is_none()
    }

    pub fn session(&self) -> Option<&SessionData> {
        self.current_session.as_ref()
    }

    pub fn question_index(&self) -> Option<usize> {
        self.question_index
    }

    pub fn transcription(&self, index: usize) -> Option<&TranscriptionResult> {
        self.transcriptions_by_index.get(&index)
    }

    pub fn transcriptions(&self) -> &BTreeMap<usize, TranscriptionResult> {
        &self.transcriptions_by_index
    }

    pub fn analysis(&self) -> Option<&AnalysisData> {
        self.latest_analysis.as_ref()
    }

    /// Every cached state message in canonical order: session, index,
    /// transcriptions by ascending question, analysis.
    pub fn replay(&self) -> Vec<Message> {
        let mut messages: Vec<Message> = self
            .current_session
            .iter()
            .cloned()
            .map(Message::SessionStart)
            .collect();
        if let Some(index) = self.question_index {
            messages.push(Message::QuestionIndex(QuestionIndex { index }));
        }
        messages.extend(
            self.transcriptions_by_index
                .values()
                .cloned()
                .map(Message::TranscriptionResult),
        );
        if let Some(analysis) = &self.latest_analysis {
            messages.push(Message::AnalysisData(analysis.clone()));
        }
        messages
    }

    pub fn summary(&self) -> CacheSummary {
        CacheSummary {
            topic: self.current_session.as_ref().map(|s| s.topic.clone()),
            question_count: self
                .current_session
                .as_ref()
                .map(|s| s.questions.len())
                .unwrap_or_default(),
            question_index: self.question_index,
            transcriptions: self.transcriptions_by_index.len(),
            has_analysis: self.latest_analysis.is_some(),
        }
    }
}

#[cfg(test)]
#[path = "tests/cache_tests.rs"]
mod tests;
