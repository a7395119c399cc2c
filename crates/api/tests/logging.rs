//! Each engine action is logged once per request.

mod common;

use std::sync::{Arc, Mutex};

use axum::http::StatusCode;
use common::build_test_app;
use serde_json::json;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

/// Collects the `message` of every event.
#[derive(Clone, Default)]
struct Messages(Arc<Mutex<Vec<String>>>);

impl Messages {
    fn count(&self, message: &str) -> usize {
        self.0
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.as_str() == message)
            .count()
    }
}

struct MessageVisitor<'a>(&'a mut Option<String>);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = Some(format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for Messages {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = None;
        event.record(&mut MessageVisitor(&mut message));
        if let Some(message) = message {
            self.0.lock().unwrap().push(message);
        }
    }
}

#[tokio::test]
async fn create_and_extend_are_logged_once() {
    let messages = Messages::default();
    let subscriber = tracing_subscriber::registry().with(messages.clone());
    let _guard = tracing::subscriber::set_default(subscriber);

    let app = build_test_app();
    let worker = app.online_worker(20).await;
    let dispatcher = app.dispatcher_token();
    let task_id = app.create_task(30).await;
    app.post_empty(&format!("/api/v1/tasks/{task_id}/accept"), &worker)
        .await;
    app.post_empty(&format!("/api/v1/tasks/{task_id}/start"), &worker)
        .await;

    let response = app
        .post(
            &format!("/api/v1/tasks/{task_id}/extend"),
            &dispatcher,
            json!({ "minutes": 15, "reason": "Late delivery" }),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(messages.count("Task created"), 1);
    assert_eq!(messages.count("Task extended directly"), 1);
    assert_eq!(messages.count("Session opened"), 1);
}
