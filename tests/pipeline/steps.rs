use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cucumber::{given, then, when, World};
use serde_json::{json, Value};
use tower::ServiceExt;

use dentists::handlers::router;
use dentists::pipe::{BatchReport, ContactEnricher, Pipe};
use dentists::queue::{DispatchMessage, MockDispatchQueue};
use dentists::storage::{InMemoryAppointmentStore, InMemoryContactDirectory};
use dentists::stream::{ChangeStream, MemoryChangeStream, StartingPosition, StreamCursor};
use dentists::utils::retry::RetryConfig;

const LINEAGE: &str = "lineage-0000";

/// Test world: store, stream, directory and queue for one scenario.
#[derive(World)]
#[world(init = Self::new)]
pub struct PipelineWorld {
    stream: Arc<MemoryChangeStream>,
    store: Arc<InMemoryAppointmentStore>,
    directory: Arc<InMemoryContactDirectory>,
    queue: Arc<MockDispatchQueue>,
    pipe: Pipe,
    cursor: StreamCursor,
    /// Created record by patient email.
    created: HashMap<String, Value>,
    last_status: Option<StatusCode>,
    last_report: Option<Result<BatchReport, String>>,
}

impl std::fmt::Debug for PipelineWorld {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineWorld")
            .field("cursor", &self.cursor)
            .field("created", &self.created.keys().collect::<Vec<_>>())
            .field("last_status", &self.last_status)
            .finish()
    }
}

impl PipelineWorld {
    async fn new() -> Self {
        let stream = Arc::new(MemoryChangeStream::new(1));
        let store = Arc::new(InMemoryAppointmentStore::new(Arc::clone(&stream)));
        let directory = Arc::new(InMemoryContactDirectory::new());
        let queue = Arc::new(MockDispatchQueue::new());

        let pipe = Pipe::new(
            Arc::new(ContactEnricher::new(directory.clone())),
            queue.clone(),
        )
        .with_dispatch_retry(RetryConfig {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            max_retries: Some(2),
            jitter: 0.0,
        });

        let cursor = stream
            .open(LINEAGE, StartingPosition::TrimHorizon)
            .await
            .unwrap();

        Self {
            stream,
            store,
            directory,
            queue,
            pipe,
            cursor,
            created: HashMap::new(),
            last_status: None,
            last_report: None,
        }
    }

    async fn create(&mut self, body: Value) -> Option<Value> {
        let request = Request::builder()
            .method("POST")
            .uri("/appointments")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();

        let response = router(self.store.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        self.last_status = Some(status);

        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        if status != StatusCode::CREATED {
            return None;
        }
        let created: Value = serde_json::from_slice(&bytes).unwrap();
        Some(created["message"].clone())
    }

    fn appointment_id(&self, email: &str) -> String {
        self.created[email]["id"].as_str().unwrap().to_string()
    }

    async fn message_for(&self, email: &str) -> DispatchMessage {
        let id = self.appointment_id(email);
        self.queue
            .sent()
            .await
            .into_iter()
            .find(|m| m.partition_key == id)
            .unwrap_or_else(|| panic!("no message dispatched for {}", email))
    }
}

// Given

#[given("an empty appointment store")]
async fn given_empty_store(world: &mut PipelineWorld) {
    assert!(world.store.is_empty().await);
}

#[given(expr = "a contact {string} preferring {string}")]
async fn given_contact(world: &mut PipelineWorld, email: String, method: String) {
    world.directory.insert(&email, &method).await;
}

#[given("the contact directory is unavailable")]
async fn given_directory_unavailable(world: &mut PipelineWorld) {
    world.directory.set_fail_on_get(true).await;
}

#[given("the appointment store rejects writes")]
async fn given_store_rejects(world: &mut PipelineWorld) {
    world.store.set_fail_on_put(true).await;
}

// When

#[when(expr = "an appointment is created for {string}")]
async fn when_created(world: &mut PipelineWorld, email: String) {
    let body = json!({
        "patient": {"email": email, "name": "Patient"},
        "date": "2026-11-02T09:30:00Z",
        "dentist": "Dr. Molar"
    });
    if let Some(record) = world.create(body).await {
        world.created.insert(email, record);
    }
}

#[when("an appointment without a patient email is created")]
async fn when_created_without_email(world: &mut PipelineWorld) {
    let body = json!({"patient": {"name": "Anonymous"}, "date": "2026-11-02T10:00:00Z"});
    world.create(body).await;
}

#[when(expr = "the appointment for {string} is rewritten")]
async fn when_rewritten(world: &mut PipelineWorld, email: String) {
    use dentists::model::AppointmentRecord;
    use dentists::storage::AppointmentStore;

    let record: AppointmentRecord =
        serde_json::from_value(world.created[&email].clone()).unwrap();
    world.store.put(&record).await.unwrap();
}

#[when(expr = "the appointment for {string} is deleted")]
async fn when_deleted(world: &mut PipelineWorld, email: String) {
    let id = world.appointment_id(&email);
    assert!(world.store.delete(&id).await);
}

#[when("the contact directory recovers")]
async fn when_directory_recovers(world: &mut PipelineWorld) {
    world.directory.set_fail_on_get(false).await;
}

#[when("the pipe processes the stream")]
async fn when_pipe_processes(world: &mut PipelineWorld) {
    let batch = world.stream.read(&world.cursor, 100).await.unwrap();
    let result = world.pipe.process_batch(&batch.records).await;
    if result.is_ok() {
        if let Some(next) = batch.next {
            world.cursor = next;
        }
    }
    world.last_report = Some(result.map_err(|e| e.to_string()));
}

// Then

#[then(expr = "the dispatch queue holds {int} message(s)")]
async fn then_queue_holds(world: &mut PipelineWorld, count: usize) {
    assert_eq!(world.queue.sent().await.len(), count);
}

#[then(expr = "the message for {string} has preferred method {string}")]
async fn then_preferred_method(world: &mut PipelineWorld, email: String, method: String) {
    let message = world.message_for(&email).await;
    assert_eq!(message.body.preferred_method(), Some(method.as_str()));
}

#[then(expr = "the message for {string} keeps its original fields")]
async fn then_keeps_fields(world: &mut PipelineWorld, email: String) {
    let message = world.message_for(&email).await;
    let body = serde_json::to_value(&message.body).unwrap();
    let created = &world.created[&email];

    for (field, value) in created.as_object().unwrap() {
        assert_eq!(&body[field], value, "field {} changed", field);
    }
}

#[then(expr = "{int} message(s) is/are a soft failure mentioning {string}")]
async fn then_soft_failures(world: &mut PipelineWorld, count: usize, fragment: String) {
    let soft: Vec<Value> = world
        .queue
        .sent()
        .await
        .iter()
        .filter(|m| m.body.is_soft_fail())
        .map(|m| serde_json::to_value(&m.body).unwrap())
        .collect();

    assert_eq!(soft.len(), count);
    for body in soft {
        let error = body["error"].as_str().unwrap();
        assert!(error.starts_with("Exception="), "unexpected error: {}", error);
        assert!(error.contains(&fragment), "unexpected error: {}", error);
        assert!(body["body"].is_object());
    }
}

#[then(expr = "the batch reports {int} events filtered out")]
async fn then_filtered_out(world: &mut PipelineWorld, count: usize) {
    let report = world.last_report.as_ref().unwrap().as_ref().unwrap();
    assert_eq!(report.filtered_out, count);
}

#[then("the batch fails")]
async fn then_batch_fails(world: &mut PipelineWorld) {
    let result = world.last_report.as_ref().unwrap();
    assert!(result.is_err(), "expected failure, got {:?}", result);
}

#[then(expr = "the API responds with status {int}")]
async fn then_status(world: &mut PipelineWorld, status: u16) {
    assert_eq!(world.last_status.map(|s| s.as_u16()), Some(status));
}
