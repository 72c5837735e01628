use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tokio::sync::broadcast;
use uuid::Uuid;

pub mod loggable;
pub use loggable::{Loggable, Severity};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent<T> {
    pub id: Uuid,
    pub name: String,
    pub occurred_at: DateTime<Utc>,
    pub actor_id: Option<Uuid>,
    /// A user id or a role name, depending on the entity
    pub subject_id: Option<String>,
    pub payload: T,
}

impl<T> DomainEvent<T> {
    pub fn new(name: impl Into<String>, actor_id: Option<Uuid>, subject_id: Option<String>, payload: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            occurred_at: Utc::now(),
            actor_id,
            subject_id,
            payload,
        }
    }
}

pub type EventBus = broadcast::Sender<Value>;

pub fn init_event_bus() -> (EventBus, broadcast::Receiver<Value>) {
    broadcast::channel(1024)
}

/// Request context for activity logging (IP, User-Agent)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl RequestContext {
    pub fn from_headers(headers: &axum::http::HeaderMap) -> Self {
        let ip = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.split(',').next())
            .map(|s| s.trim().to_string())
            .or_else(|| {
                headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(String::from)
            });

        let user_agent = headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(String::from);

        Self { ip, user_agent }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityPayload {
    /// State after the change
    #[serde(rename = "new")]
    pub current: Value,
    /// State before the change, for revocations and redefinitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    pub severity: Severity,
}

pub fn log_activity<T: Loggable>(event_bus: &EventBus, action: &str, actor_id: Option<Uuid>, entity: &T) {
    log_activity_with_context(event_bus, action, actor_id, entity, None, None);
}

/// Publishes `<entity_type>.<action>` with old/new state and request context.
/// Publishing never fails the caller; an event bus without listeners drops it.
pub fn log_activity_with_context<T: Loggable>(
    event_bus: &EventBus,
    action: &str,
    actor_id: Option<Uuid>,
    entity: &T,
    old_entity: Option<&T>,
    context: Option<RequestContext>,
) {
    let event_name = format!("{}.{}", T::entity_type(), action);

    let payload = ActivityPayload {
        current: serde_json::to_value(entity).unwrap_or_default(),
        old: old_entity.map(|e| serde_json::to_value(e).unwrap_or_default()),
        context,
        severity: entity.severity_for_action(action),
    };

    let event = DomainEvent::new(
        event_name,
        actor_id,
        Some(entity.subject_id()),
        serde_json::to_value(&payload).unwrap_or_default(),
    );

    if event_bus.send(serde_json::to_value(event).unwrap_or_default()).is_err() {
        tracing::debug!(action, entity = T::entity_type(), "no activity listener; event dropped");
    }
}

fn describe(name: &str) -> &'static str {
    match name {
        "user.login" => "User signed in",
        "user.logout" => "User signed out",
        "user_role.assigned" => "Role assigned to user",
        "user_role.revoked" => "Role revoked from user",
        "role_permission.granted" => "Permission granted to role",
        "role_permission.revoked" => "Permission revoked from role",
        "role.redefined" => "Role permissions redefined",
        "permission_cache.flushed" => "Permission cache flushed",
        _ => "System event",
    }
}

/// Writes one published event to `activity_log` and appends it to the
/// hash-chained `event_store`.
pub async fn persist_event(pool: &SqlitePool, event: &Value) -> Result<(), sqlx::Error> {
    let name = event.get("name").and_then(|v| v.as_str()).unwrap_or("unknown");
    let actor_id = event
        .get("actor_id")
        .and_then(|v| v.as_str())
        .and_then(|s| Uuid::parse_str(s).ok())
        .map(|u| u.to_string());
    let subject_id = event.get("subject_id").and_then(|v| v.as_str()).map(String::from);
    let occurred_at = event
        .get("occurred_at")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);
    let severity = event
        .get("payload")
        .and_then(|p| p.get("severity"))
        .and_then(|s| s.as_str())
        .unwrap_or(Severity::Important.as_str());
    let payload = serde_json::to_string(event).unwrap_or_default();

    sqlx::query(
        r#"
        INSERT INTO activity_log (id, event_name, description, actor_id, subject_id, occurred_at, properties, severity)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(describe(name))
    .bind(&actor_id)
    .bind(&subject_id)
    .bind(occurred_at)
    .bind(&payload)
    .bind(severity)
    .execute(pool)
    .await?;

    let mut tx = pool.begin().await?;

    let prev_hash: Option<String> = sqlx::query_scalar("SELECT hash FROM event_store ORDER BY rowid DESC LIMIT 1")
        .fetch_optional(&mut *tx)
        .await?;

    // SHA256(prev_hash || payload)
    let mut hasher = Sha256::new();
    if let Some(ref ph) = prev_hash {
        hasher.update(ph.as_bytes());
    }
    hasher.update(payload.as_bytes());
    let hash = hex::encode(hasher.finalize());

    sqlx::query(
        r#"
        INSERT INTO event_store (id, event_name, occurred_at, actor_id, subject_id, payload, severity, prev_hash, hash)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(name)
    .bind(occurred_at)
    .bind(&actor_id)
    .bind(&subject_id)
    .bind(&payload)
    .bind(severity)
    .bind(&prev_hash)
    .bind(&hash)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}

pub async fn start_activity_listener(mut rx: broadcast::Receiver<Value>, pool: SqlitePool) {
    tracing::info!("activity listener started");
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Err(err) = persist_event(&pool, &event).await {
                    tracing::error!(error = %err, "failed to persist activity event");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "activity listener lagged; events dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
