//! HTTP client for the interview backend (question generation and answer scoring).

use std::collections::BTreeMap;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::protocol::{overall_score, AnalysisData, AnswerAnalysis, Question, SessionData};
use thiserror::Error;
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("invalid backend url '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("request to {endpoint} failed: {source}")]
    Request {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("backend returned no questions for topic '{topic}'")]
    NoQuestions { topic: String },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QuestionsRequest<'a> {
    topic: &'a str,
    difficulty: String,
    num_questions: usize,
}

#[derive(Debug, Deserialize)]
struct QuestionsResponse {
    #[serde(default)]
    questions: Vec<Question>,
}

#[derive(Debug, Serialize)]
struct AnalyzeAnswerRequest<'a> {
    question: &'a str,
    answer: &'a str,
    context: &'a str,
    difficulty: &'a str,
}

#[derive(Debug, Serialize)]
struct AnalyzeInterviewRequest<'a> {
    questions: &'a [Question],
    answers: &'a BTreeMap<usize, String>,
    topic: &'a str,
    difficulty: &'a str,
}

#[derive(Clone)]
pub struct InterviewBackend {
    http: Client,
    base_url: Url,
}

impl InterviewBackend {
    pub fn new(base_url: &str) -> Result<Self, BackendError> {
        let base_url = Url::parse(base_url).map_err(|source| BackendError::InvalidUrl {
            url: base_url.to_string(),
            source,
        })?;
        Ok(Self {
            http: Client::new(),
            base_url,
        })
    }

    fn endpoint(&self, name: &str) -> Result<Url, BackendError> {
        let path = format!("api/interview/{name}");
        self.base_url
            .join(&path)
            .map_err(|source| BackendError::InvalidUrl { url: path, source })
    }

    async fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        name: &str,
        body: &B,
    ) -> Result<R, BackendError> {
        let url = self.endpoint(name)?;
        let request_error = |source: reqwest::Error| BackendError::Request {
            endpoint: url.to_string(),
            source,
        };
        self.http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(request_error)?
            .error_for_status()
            .map_err(request_error)?
            .json()
            .await
            .map_err(request_error)
    }

    /// Generate a question set. The returned session keeps the caller's
    /// difficulty label; the backend receives it lowercased.
    pub async fn fetch_questions(
        &self,
        topic: &str,
        difficulty: &str,
        num_questions: usize,
    ) -> Result<SessionData, BackendError> {
        let response: QuestionsResponse = self
            .post(
                "questions",
                &QuestionsRequest {
                    topic,
                    difficulty: difficulty.to_lowercase(),
                    num_questions,
                },
            )
            .await?;
        if response.questions.is_empty() {
            return Err(BackendError::NoQuestions {
                topic: topic.to_string(),
            });
        }
        info!(
            topic,
            questions = response.questions.len(),
            "backend: question set generated"
        );
        Ok(SessionData {
            topic: topic.to_string(),
            difficulty: difficulty.to_string(),
            questions: response.questions,
        })
    }

    pub async fn analyze_answer(
        &self,
        session: &SessionData,
        question: &str,
        answer: &str,
    ) -> Result<AnswerAnalysis, BackendError> {
        self.post(
            "analyze-answer",
            &AnalyzeAnswerRequest {
                question,
                answer,
                context: &session.topic,
                difficulty: &session.difficulty,
            },
        )
        .await
    }

    pub async fn analyze_interview(
        &self,
        session: &SessionData,
        answers: &BTreeMap<usize, String>,
    ) -> Result<serde_json::Value, BackendError> {
        self.post(
            "analyze-interview",
            &AnalyzeInterviewRequest {
                questions: &session.questions,
                answers,
                topic: &session.topic,
                difficulty: &session.difficulty,
            },
        )
        .await
    }

    /// Score every transcribed answer, then ask for the overall analysis.
    /// A failed overall analysis leaves `overall_analysis` empty; a failed
    /// per-answer call aborts.
    pub async fn analyze_session(
        &self,
        session: &SessionData,
        answers: &BTreeMap<usize, String>,
    ) -> Result<AnalysisData, BackendError> {
        let mut results = BTreeMap::new();
        for (index, answer) in answers {
            let Some(question) = session.questions.get(*index) else {
                warn!(index, "backend: answer for unknown question skipped");
                continue;
            };
            let analysis = self
                .analyze_answer(session, &question.question, answer)
                .await?;
            results.insert(*index, analysis);
        }

        let overall_analysis = if results.is_empty() {
            None
        } else {
            match self.analyze_interview(session, answers).await {
                Ok(value) => Some(value),
                Err(error) => {
                    warn!(%error, "backend: overall analysis unavailable");
                    None
                }
            }
        };

        Ok(build_analysis(session, results, overall_analysis))
    }
}

pub fn build_analysis(
    session: &SessionData,
    results: BTreeMap<usize, AnswerAnalysis>,
    overall_analysis: Option<serde_json::Value>,
) -> AnalysisData {
    AnalysisData {
        overall_score: overall_score(&results),
        analysis_results: results,
        overall_analysis,
        topic: session.topic.clone(),
        difficulty: session.difficulty.clone(),
    }
}

#[cfg(test)]
#[path = "tests/backend_tests.rs"]
mod tests;
