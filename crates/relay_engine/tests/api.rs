use pretty_assertions::assert_eq;
use relay_core::{Attachment, JobActivity, JobRequest, Question};
use relay_engine::{BackendClient, BackendSettings, FailureKind, JobStatus};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client(server: &MockServer) -> BackendClient {
    BackendClient::new(BackendSettings {
        base_url: server.uri(),
        ..BackendSettings::default()
    })
    .expect("client")
}

fn request(message: &str) -> JobRequest {
    JobRequest {
        message: message.to_string(),
        attachments: vec![Attachment {
            name: "notes.txt".to_string(),
            content: "remember the tests".to_string(),
        }],
        project: Some("demo".to_string()),
        model: None,
        follow_up_of: None,
    }
}

#[tokio::test]
async fn start_job_returns_backend_job_id() {
    engine_logging::initialize_for_tests();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/job/start"))
        .and(body_partial_json(json!({
            "message": "Explain the build",
            "project": "demo",
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"job_id": "job-42"})))
        .expect(1)
        .mount(&server)
        .await;

    let job_id = client(&server)
        .start_job(&request("Explain the build"))
        .await
        .expect("job started");
    assert_eq!(job_id, "job-42");
}

#[tokio::test]
async fn start_job_without_id_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/job/start"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"error": "project not found"})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .start_job(&request("hello"))
        .await
        .expect_err("rejected");
    assert_eq!(err.kind, FailureKind::Rejected);
    assert_eq!(err.user_message(), "project not found");
}

#[tokio::test]
async fn start_job_surfaces_http_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/job/start"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let err = client(&server)
        .start_job(&request("hello"))
        .await
        .expect_err("http error");
    assert_eq!(err.kind, FailureKind::HttpStatus(503));
}

#[tokio::test]
async fn poll_status_parses_questions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/job/status"))
        .and(body_partial_json(json!({"job_id": "job-1"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "waiting_for_answers",
            "stream": "I need to know one thing.",
            "questions": [{"id": "q1", "question": "Which crate?", "options": ["core", "engine"]}],
        })))
        .mount(&server)
        .await;

    let payload = client(&server).poll_status("job-1").await.expect("status");
    assert_eq!(payload.status, JobStatus::WaitingForAnswers);
    assert_eq!(payload.stream.as_deref(), Some("I need to know one thing."));
    let questions: Vec<Question> = payload.questions.into_iter().map(Question::from).collect();
    assert_eq!(
        questions,
        vec![Question {
            id: "q1".to_string(),
            text: "Which crate?".to_string(),
            options: vec!["core".to_string(), "engine".to_string()],
        }]
    );
}

#[tokio::test]
async fn check_activity_maps_backend_answers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/job/status"))
        .and(body_partial_json(json!({"job_id": "running"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "processing", "activity": "Reading files"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/job/status"))
        .and(body_partial_json(json!({"job_id": "done"})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": "complete", "result": "All finished."})),
        )
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/job/status"))
        .and(body_partial_json(json!({"job_id": "gone"})))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let client = client(&server);
    assert_eq!(client.check_activity("running").await, JobActivity::Active);
    assert_eq!(
        client.check_activity("done").await,
        JobActivity::Finished {
            result: Some("All finished.".to_string())
        }
    );
    assert_eq!(client.check_activity("gone").await, JobActivity::Unknown);
}

#[tokio::test]
async fn check_activity_reports_unreachable_backend() {
    let client = BackendClient::new(BackendSettings {
        base_url: "http://127.0.0.1:1".to_string(),
        ..BackendSettings::default()
    })
    .expect("client");
    assert_eq!(client.check_activity("job-1").await, JobActivity::Unreachable);
}

#[tokio::test]
async fn submit_answers_posts_to_backend() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/job/answers"))
        .and(body_partial_json(json!({"job_id": "job-1", "answers": ["core"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&server)
        .await;

    client(&server)
        .submit_answers("job-1", &["core".to_string()])
        .await
        .expect("answers accepted");
}

#[test]
fn invalid_base_url_is_rejected() {
    let err = BackendClient::new(BackendSettings {
        base_url: "not a url".to_string(),
        ..BackendSettings::default()
    })
    .expect_err("invalid url");
    assert_eq!(err.kind, FailureKind::InvalidUrl);
}
