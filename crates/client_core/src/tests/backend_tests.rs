use super::*;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Clone, Default)]
struct BackendState {
    requests: Arc<Mutex<Vec<(String, Value)>>>,
    fail_overall: bool,
}

async fn questions(State(state): State<BackendState>, Json(body): Json<Value>) -> Json<Value> {
    state
        .requests
        .lock()
        .await
        .push(("questions".into(), body.clone()));
    let count = body["numQuestions"].as_u64().unwrap_or(0);
    let questions: Vec<Value> = (0..count)
        .map(|i| json!({ "question": format!("Q{i}"), "answer": format!("A{i}") }))
        .collect();
    Json(json!({ "questions": questions }))
}

async fn analyze_answer(
    State(state): State<BackendState>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .requests
        .lock()
        .await
        .push(("analyze-answer".into(), body.clone()));
    let score = if body["answer"] == "strong" { 9.0 } else { 4.0 };
    Json(json!({
        "relevanceScore": score,
        "completenessScore": score,
        "clarityScore": score,
        "accuracyScore": score,
        "overallScore": score,
        "strengths": [],
        "improvements": [],
        "feedback": "ok"
    }))
}

async fn analyze_interview(
    State(state): State<BackendState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    state
        .requests
        .lock()
        .await
        .push(("analyze-interview".into(), body));
    if state.fail_overall {
        return Err(StatusCode::INTERNAL_SERVER_ERROR);
    }
    Ok(Json(json!({ "summary": "solid" })))
}

async fn spawn_backend(state: BackendState) -> String {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let app = Router::new()
        .route("/api/interview/questions", post(questions))
        .route("/api/interview/analyze-answer", post(analyze_answer))
        .route("/api/interview/analyze-interview", post(analyze_interview))
        .with_state(state);
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    format!("http://{addr}")
}

fn session() -> SessionData {
    SessionData {
        topic: "Rust".into(),
        difficulty: "Hard".into(),
        questions: vec![
            Question {
                question: "Q0".into(),
                answer: String::new(),
            },
            Question {
                question: "Q1".into(),
                answer: String::new(),
            },
        ],
    }
}

#[tokio::test]
async fn fetch_questions_lowercases_difficulty_but_keeps_label() {
    let state = BackendState::default();
    let base = spawn_backend(state.clone()).await;
    let backend = InterviewBackend::new(&base).expect("backend");

    let session = backend
        .fetch_questions("Rust", "Hard", 3)
        .await
        .expect("questions");
    assert_eq!(session.questions.len(), 3);
    assert_eq!(session.difficulty, "Hard");

    let requests = state.requests.lock().await;
    assert_eq!(requests[0].1["difficulty"], "hard");
    assert_eq!(requests[0].1["numQuestions"], 3);
}

#[tokio::test]
async fn empty_question_set_is_an_error() {
    let base = spawn_backend(BackendState::default()).await;
    let backend = InterviewBackend::new(&base).expect("backend");

    let error = backend
        .fetch_questions("Rust", "Easy", 0)
        .await
        .expect_err("no questions");
    assert!(matches!(error, BackendError::NoQuestions { .. }));
}

#[tokio::test]
async fn analyze_session_scores_each_answer_and_averages() {
    let state = BackendState::default();
    let base = spawn_backend(state.clone()).await;
    let backend = InterviewBackend::new(&base).expect("backend");

    let answers = BTreeMap::from([(0, "strong".to_string()), (1, "weak".to_string())]);
    let analysis = backend
        .analyze_session(&session(), &answers)
        .await
        .expect("analysis");

    assert_eq!(analysis.analysis_results.len(), 2);
    assert_eq!(analysis.overall_score, 6.5);
    assert_eq!(analysis.overall_analysis, Some(json!({ "summary": "solid" })));

    let requests = state.requests.lock().await;
    let answer_request = requests
        .iter()
        .find(|(name, _)| name == "analyze-answer")
        .expect("answer request");
    assert_eq!(answer_request.1["context"], "Rust");
}

#[tokio::test]
async fn failed_overall_analysis_is_not_fatal() {
    let state = BackendState {
        fail_overall: true,
        ..BackendState::default()
    };
    let base = spawn_backend(state).await;
    let backend = InterviewBackend::new(&base).expect("backend");

    let answers = BTreeMap::from([(0, "strong".to_string())]);
    let analysis = backend
        .analyze_session(&session(), &answers)
        .await
        .expect("analysis");
    assert!(analysis.overall_analysis.is_none());
    assert_eq!(analysis.overall_score, 9.0);
}

#[tokio::test]
async fn unreachable_backend_surfaces_request_error() {
    let backend = InterviewBackend::new("http://127.0.0.1:9").expect("backend");
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let error = backend
        .analyze_answer(&session(), "Q0", "anything")
        .await
        .expect_err("unreachable");
    assert!(matches!(error, BackendError::Request { .. }));
}

#[test]
fn invalid_base_url_is_rejected() {
    assert!(matches!(
        InterviewBackend::new("not a url"),
        Err(BackendError::InvalidUrl { .. })
    ));
}
