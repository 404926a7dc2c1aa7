//! Clockify REST client.
//!
//! One delivery is three calls: find or create the project, find or
//! create the task under it, then create a time entry ending now.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};

use super::{TrackingConfig, TrackingError, TrackingSink};

/// Production Clockify API root.
pub const CLOCKIFY_BASE_URL: &str = "https://api.clockify.me/api/v1";

const API_KEY_HEADER: &str = "X-Api-Key";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, Deserialize)]
struct Project {
    id: String,
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct Task {
    id: String,
    name: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewProject<'a> {
    name: &'a str,
    is_public: bool,
}

#[derive(Serialize)]
struct NewTask<'a> {
    name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NewTimeEntry<'a> {
    start: String,
    end: String,
    project_id: &'a str,
    task_id: &'a str,
    description: &'a str,
}

/// [`TrackingSink`] backed by the Clockify API.
pub struct ClockifySink {
    client: Client,
    base_url: String,
    clock: Arc<dyn Clock>,
}

impl ClockifySink {
    /// Creates a sink talking to `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TrackingError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TrackingError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            clock: Arc::new(SystemClock),
        })
    }

    /// Uses `clock` to timestamp time entries.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authed(&self, request: RequestBuilder, config: &TrackingConfig) -> RequestBuilder {
        request.header(API_KEY_HEADER, &config.api_key)
    }

    async fn find_or_create_project(&self, config: &TrackingConfig) -> Result<Project, TrackingError> {
        let path = format!("/workspaces/{}/projects", config.workspace_id);

        let response = self
            .authed(self.client.get(self.url(&path)), config)
            .query(&[("name", config.project_name.as_str())])
            .send()
            .await?;
        let projects: Vec<Project> = read_json(response, "search projects").await?;

        if let Some(project) = projects
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(&config.project_name))
        {
            return Ok(project);
        }

        tracing::info!(project = %config.project_name, "Creating Clockify project");
        let response = self
            .authed(self.client.post(self.url(&path)), config)
            .json(&NewProject {
                name: &config.project_name,
                is_public: false,
            })
            .send()
            .await?;
        read_json(response, "create project").await
    }

    async fn find_or_create_task(
        &self,
        config: &TrackingConfig,
        project_id: &str,
        task_name: &str,
    ) -> Result<Task, TrackingError> {
        let path = format!(
            "/workspaces/{}/projects/{}/tasks",
            config.workspace_id, project_id
        );

        let response = self
            .authed(self.client.get(self.url(&path)), config)
            .send()
            .await?;
        let tasks: Vec<Task> = read_json(response, "list tasks").await?;

        // task names are assumed unique ignoring case
        if let Some(task) = tasks
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(task_name))
        {
            return Ok(task);
        }

        tracing::info!(task = %task_name, "Creating Clockify task");
        let response = self
            .authed(self.client.post(self.url(&path)), config)
            .json(&NewTask { name: task_name })
            .send()
            .await?;
        read_json(response, "create task").await
    }

    async fn create_time_entry(
        &self,
        config: &TrackingConfig,
        project: &Project,
        task: &Task,
        description: &str,
        duration_seconds: u32,
    ) -> Result<(), TrackingError> {
        let end = self.clock.now();
        let start = end - chrono::Duration::seconds(i64::from(duration_seconds));
        let path = format!("/workspaces/{}/time-entries", config.workspace_id);

        let response = self
            .authed(self.client.post(self.url(&path)), config)
            .json(&NewTimeEntry {
                start: timestamp(start),
                end: timestamp(end),
                project_id: &project.id,
                task_id: &task.id,
                description,
            })
            .send()
            .await?;
        check_status(response, "create time entry").await?;
        Ok(())
    }
}

#[async_trait]
impl TrackingSink for ClockifySink {
    async fn send(
        &self,
        config: &TrackingConfig,
        task_label: &str,
        duration_seconds: u32,
    ) -> Result<(), TrackingError> {
        if !config.is_complete() {
            return Err(TrackingError::NotConfigured);
        }

        let project = self.find_or_create_project(config).await?;
        let task = self
            .find_or_create_task(config, &project.id, task_label)
            .await?;
        self.create_time_entry(config, &project, &task, task_label, duration_seconds)
            .await?;

        tracing::debug!(
            project = %project.name,
            task = %task.name,
            duration_seconds,
            "Created Clockify time entry"
        );
        Ok(())
    }
}

impl std::fmt::Debug for ClockifySink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClockifySink")
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

async fn check_status(response: Response, action: &str) -> Result<Response, TrackingError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let reason = status.canonical_reason().unwrap_or("unknown status");
    let message = if body.is_empty() {
        format!("failed to {}: {}", action, reason)
    } else {
        format!("failed to {}: {} ({})", action, reason, body)
    };
    Err(TrackingError::Status {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(response: Response, action: &str) -> Result<T, TrackingError> {
    let response = check_status(response, action).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| TrackingError::Decode(format!("{}: {}", action, e)))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config() -> TrackingConfig {
        TrackingConfig::new("Yoga", "secret-key", "ws1")
    }

    fn sink(server: &MockServer) -> ClockifySink {
        let clock = ManualClock::new(
            DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        );
        ClockifySink::new(server.uri())
            .unwrap()
            .with_clock(Arc::new(clock))
    }

    #[tokio::test]
    async fn test_existing_project_and_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces/ws1/projects"))
            .and(query_param("name", "Yoga"))
            .and(header("X-Api-Key", "secret-key"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": "p1", "name": "yoga"}])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/workspaces/ws1/projects/p1/tasks"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"id": "t1", "name": "KIRTAN"}])),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/workspaces/ws1/time-entries"))
            .and(body_partial_json(json!({
                "start": "2024-05-01T09:50:00.000Z",
                "end": "2024-05-01T10:00:00.000Z",
                "projectId": "p1",
                "taskId": "t1",
                "description": "Kirtan",
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "e1"})))
            .expect(1)
            .mount(&server)
            .await;

        sink(&server).send(&config(), "Kirtan", 600).await.unwrap();
    }

    #[tokio::test]
    async fn test_creates_missing_project_and_task() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/workspaces/ws1/projects"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/workspaces/ws1/projects"))
            .and(body_partial_json(json!({"name": "Yoga", "isPublic": false})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "p9", "name": "Yoga"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/workspaces/ws1/projects/p9/tasks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/workspaces/ws1/projects/p9/tasks"))
            .and(body_partial_json(json!({"name": "Meditation"})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"id": "t9", "name": "Meditation"})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/workspaces/ws1/time-entries"))
            .and(body_partial_json(json!({"projectId": "p9", "taskId": "t9"})))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        sink(&server)
            .send(&config(), "Meditation", 1200)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad key"))
            .mount(&server)
            .await;

        let err = sink(&server).send(&config(), "Kirtan", 600).await.unwrap_err();
        match err {
            TrackingError::Status { status, message } => {
                assert_eq!(status, 401);
                assert!(message.contains("bad key"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = sink(&server).send(&config(), "Kirtan", 600).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_incomplete_config_makes_no_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = sink(&server)
            .send(&TrackingConfig::default(), "Kirtan", 600)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackingError::NotConfigured));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_network_error() {
        let sink = ClockifySink::new("http://127.0.0.1:9").unwrap();
        let err = sink.send(&config(), "Kirtan", 600).await.unwrap_err();
        assert!(matches!(err, TrackingError::Network(_)));
    }

    #[test]
    fn test_timestamp_format() {
        let at = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(timestamp(at), "2024-05-01T10:00:00.000Z");
    }
}
