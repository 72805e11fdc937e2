use std::collections::BTreeMap;

use shared::{
    cache::SessionCache,
    protocol::{
        AnalysisData, AnalysisTab, Message, Question, QuestionDetails, ScrollDirection,
        SessionData, SpeakCommand, TranscriptionResult,
    },
};

/// What an endpoint currently shows, rebuilt from delivered messages.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    pub session: Option<SessionData>,
    /// Always within the session's question range once a session is present.
    pub current_index: usize,
    pub transcriptions: BTreeMap<usize, TranscriptionResult>,
    pub analysis: Option<AnalysisData>,
    pub active_tab: AnalysisTab,
    pub open_details: Option<usize>,
    pub pending_scroll: Option<ScrollDirection>,
    pub navigation: Option<String>,
    pub spoken: Option<SpeakCommand>,
}

impl ViewState {
    pub fn from_cache(cache: &SessionCache) -> Self {
        let mut view = Self::default();
        for message in cache.replay() {
            view.apply(&message);
        }
        view
    }

    /// Apply one message. Returns whether the view changed; re-applying the
    /// same state is a no-op. A session-start always starts from scratch.
    pub fn apply(&mut self, message: &Message) -> bool {
        match message {
            Message::SessionStart(session) => replace(
                self,
                Self {
                    session: Some(session.clone()),
                    ..Self::default()
                },
            ),
            Message::QuestionIndex(index) => {
                let index = match &self.session {
                    Some(session) => session.clamp_index(index.index),
                    None => index.index,
                };
                replace(&mut self.current_index, index)
            }
            Message::TranscriptionResult(result) => {
                if self.transcriptions.get(&result.index) == Some(result) {
                    return false;
                }
                self.transcriptions.insert(result.index, result.clone());
                true
            }
            Message::AnalysisData(analysis) => {
                if self.analysis.as_ref() == Some(analysis) {
                    return false;
                }
                self.analysis = Some(analysis.clone());
                if self
                    .open_details
                    .is_some_and(|index| !analysis.analysis_results.contains_key(&index))
                {
                    self.open_details = None;
                }
                true
            }
            Message::Speak(command) => {
                self.spoken = Some(command.clone());
                true
            }
            Message::Navigate(navigate) => {
                replace(&mut self.navigation, Some(navigate.path.clone()))
            }
            Message::Scroll(scroll) => {
                self.pending_scroll = Some(scroll.direction);
                true
            }
            Message::TabChange(change) => replace(&mut self.active_tab, change.tab),
            Message::QuestionDetails(QuestionDetails::Show { index }) => {
                let has_analysis = self
                    .analysis
                    .as_ref()
                    .is_some_and(|analysis| analysis.analysis_results.contains_key(index));
                if !has_analysis {
                    return false;
                }
                replace(&mut self.open_details, Some(*index))
            }
            Message::QuestionDetails(QuestionDetails::Close) => {
                replace(&mut self.open_details, None)
            }
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.session
            .as_ref()
            .and_then(|session| session.questions.get(self.current_index))
    }

    pub fn current_transcript(&self) -> Option<&TranscriptionResult> {
        self.transcriptions.get(&self.current_index)
    }

    /// Hand the last scroll request to the renderer, once.
    pub fn take_scroll(&mut self) -> Option<ScrollDirection> {
        self.pending_scroll.take()
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
