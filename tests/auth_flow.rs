mod common;

use anyhow::Result;
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use eventdesk::client::SessionPermissionSnapshot;
use eventdesk::jwt::JwtConfig;

use common::{setup, JWT_SECRET, PASSWORD};

#[tokio::test]
async fn login_returns_token_and_permission_snapshot() -> Result<()> {
    let t = setup().await?;
    let id = t.user("Carla", &["coordinator"]).await?;

    let resp = t
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "CARLA@example.com ", "password": PASSWORD })),
        )
        .await?;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.body);

    let snapshot = SessionPermissionSnapshot::from_json(&resp.body["user"].to_string())?;
    assert_eq!(snapshot.id, id);
    assert_eq!(snapshot.primary_role(), Some("coordinator"));
    assert_eq!(snapshot.roles[0].display_name, "Coordinator");
    assert!(snapshot.permissions.contains(&"coordinator.dashboard.view".to_string()));
    assert!(!snapshot.permissions.contains(&"admin.dashboard.view".to_string()));

    Ok(())
}

#[tokio::test]
async fn bad_credentials_are_rejected() -> Result<()> {
    let t = setup().await?;
    t.user("Carla", &["coordinator"]).await?;

    let wrong = t
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "carla@example.com", "password": "wrongpassword" })),
        )
        .await?;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let unknown = t
        .send(
            "POST",
            "/auth/login",
            None,
            Some(json!({ "email": "nobody@example.com", "password": PASSWORD })),
        )
        .await?;
    assert_eq!(unknown.status, StatusCode::UNAUTHORIZED);

    Ok(())
}

#[tokio::test]
async fn session_failures_carry_error_codes() -> Result<()> {
    let t = setup().await?;
    let id = t.user("Carla", &["coordinator"]).await?;

    let absent = t.send("GET", "/auth/session", None, None).await?;
    assert_eq!(absent.status, StatusCode::UNAUTHORIZED);
    assert_eq!(absent.body["error_code"], json!("ABSENT"));
    assert_eq!(absent.body["redirect_to"], json!("/sign-in"));
    assert_eq!(absent.body["success"], json!(false));

    let invalid = t.get("/auth/session", "not-a-token").await?;
    assert_eq!(invalid.status, StatusCode::UNAUTHORIZED);
    assert_eq!(invalid.body["error_code"], json!("INVALID"));

    let forged = JwtConfig::new("another-secret", 1).encode(id)?;
    let forged = t.get("/auth/session", &forged).await?;
    assert_eq!(forged.body["error_code"], json!("INVALID"));

    let expired = JwtConfig::new(JWT_SECRET, 1).encode_at(id, Utc::now() - Duration::hours(3))?;
    let expired = t.get("/auth/session", &expired).await?;
    assert_eq!(expired.status, StatusCode::UNAUTHORIZED);
    assert_eq!(expired.body["error_code"], json!("EXPIRED"));
    assert_eq!(expired.body["redirect_to"], json!("/sign-in"));

    Ok(())
}

#[tokio::test]
async fn deleted_account_is_identity_not_found() -> Result<()> {
    let t = setup().await?;
    let id = t.user("Carla", &["coordinator"]).await?;
    let token = t.login("Carla").await?;

    assert_eq!(t.get("/auth/session", &token).await?.status, StatusCode::OK);

    sqlx::query("UPDATE users SET deleted_at = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(id.to_string())
        .execute(&t.pool)
        .await?;

    let resp = t.get("/auth/session", &token).await?;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);
    assert_eq!(resp.body["error_code"], json!("IDENTITY_NOT_FOUND"));

    Ok(())
}

#[tokio::test]
async fn navigation_follows_permissions_and_selected_event() -> Result<()> {
    let t = setup().await?;
    t.user("Sam", &["seedbed_leader"]).await?;
    let token = t.login("Sam").await?;

    let hrefs = |body: &Value| -> Vec<String> {
        body.as_array()
            .into_iter()
            .flatten()
            .flat_map(|group| group["items"].as_array().cloned().unwrap_or_default())
            .filter_map(|item| item["href"].as_str().map(String::from))
            .collect()
    };

    let plain = t.get("/auth/navigation", &token).await?;
    assert_eq!(plain.status, StatusCode::OK);
    let plain = hrefs(&plain.body);
    assert!(plain.contains(&"/seedbed-leader".to_string()));
    assert!(!plain.contains(&"/admin".to_string()));
    assert!(!plain.contains(&"/admin/users".to_string()));
    assert!(!plain.iter().any(|h| h.ends_with("/tasks")));

    let event = uuid::Uuid::new_v4();
    let selected = t.get(&format!("/auth/navigation?event_id={event}"), &token).await?;
    let selected = hrefs(&selected.body);
    assert!(selected.contains(&format!("/events/{event}/tasks")));
    assert!(selected.contains(&format!("/events/{event}/participants")));
    // seedbed leaders cannot view committees or export reports
    assert!(!selected.contains(&format!("/events/{event}/committees")));
    assert!(!selected.contains(&format!("/events/{event}/reports")));

    Ok(())
}

#[tokio::test]
async fn logout_requires_authentication() -> Result<()> {
    let t = setup().await?;
    t.user("Carla", &["coordinator"]).await?;
    let token = t.login("Carla").await?;

    assert_eq!(t.send("POST", "/auth/logout", None, None).await?.status, StatusCode::UNAUTHORIZED);
    let ok = t.send("POST", "/auth/logout", Some(&token), None).await?;
    assert_eq!(ok.status, StatusCode::OK);

    Ok(())
}
