// ABOUTME: Integration tests for API endpoints and the vault room protocol
// ABOUTME: Drives the full router over a temporary database and upload directory

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::realtime::ServerEvent;
    use axum::http::{header, HeaderValue, StatusCode};
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use tokio::sync::mpsc::UnboundedReceiver;
    use uuid::Uuid;

    struct TestApp {
        server: TestServer,
        state: AppState,
        _temp_dir: TempDir,
    }

    struct TestUser {
        id: Uuid,
        name: String,
        cookie: HeaderValue,
    }

    impl TestUser {
        fn identity(&self) -> auth_helpers::AuthUser {
            auth_helpers::AuthUser {
                user_id: self.id,
                email: format!("{}@example.com", self.name.to_lowercase()),
                name: self.name.clone(),
            }
        }
    }

    async fn create_test_app() -> TestApp {
        let temp_dir = TempDir::new().unwrap();
        let config = ServerConfig {
            database_url: format!(
                "sqlite:{}?mode=rwc",
                temp_dir.path().join("test.db").display()
            ),
            upload_dir: temp_dir.path().join("uploads"),
            ..ServerConfig::default()
        };

        let state = AppState::new(config).await.unwrap();
        let app = server::build_router(state.clone()).unwrap();

        TestApp {
            server: TestServer::new(app).unwrap(),
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Creates an account directly in storage and opens a session for it.
    async fn sign_in(app: &TestApp, name: &str) -> TestUser {
        let email = format!("{}@example.com", name.to_lowercase());
        let user = app
            .state
            .storage
            .create_user(&email, name, "unused-hash")
            .await
            .unwrap();
        let session_id = app
            .state
            .sessions
            .create_session(user.id, user.email.clone(), user.name.clone());

        TestUser {
            id: user.id,
            name: user.name,
            cookie: HeaderValue::from_str(&format!(
                "{}={}",
                session::SESSION_COOKIE_NAME,
                session_id
            ))
            .unwrap(),
        }
    }

    async fn create_vault(app: &TestApp, owner: &TestUser, name: &str) -> String {
        let response = app
            .server
            .post("/api/vaults")
            .add_header(header::COOKIE, owner.cookie.clone())
            .json(&json!({ "name": name }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()["data"]["id"]
            .as_str()
            .unwrap()
            .to_string()
    }

    async fn add_member(app: &TestApp, vault_id: &str, user: &TestUser, role: permissions::Role) {
        app.state
            .storage
            .add_membership(user.id, Uuid::parse_str(vault_id).unwrap(), role)
            .await
            .unwrap();
    }

    async fn create_source(app: &TestApp, user: &TestUser, vault_id: &str, title: &str) -> axum_test::TestResponse {
        app.server
            .post(&format!("/api/vaults/{}/sources", vault_id))
            .add_header(header::COOKIE, user.cookie.clone())
            .json(&json!({ "title": title, "url": "https://example.org/paper" }))
            .await
    }

    fn error_code(response: &axum_test::TestResponse) -> String {
        let body = response.json::<Value>();
        assert_eq!(body["success"], false);
        body["error"]["code"].as_str().unwrap().to_string()
    }

    /// Joins a vault room through the socket message handler, returning the reply.
    async fn join_room(
        app: &TestApp,
        user: &TestUser,
        vault_id: &str,
    ) -> (realtime::ConnectionId, UnboundedReceiver<ServerEvent>, ServerEvent) {
        let identity = user.identity();
        let (connection_id, mut events) = app.state.hub.register(identity.clone());
        let frame = json!({ "event": "vault:join", "data": vault_id }).to_string();
        socket::handle_client_message(&app.state, connection_id, &identity, &frame).await;
        let reply = events.try_recv().unwrap();
        (connection_id, events, reply)
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = create_test_app().await;

        let response = app.server.get("/health").await;
        response.assert_status_ok();
        response.assert_text("ok");
        assert_eq!(
            response.header("x-content-type-options"),
            HeaderValue::from_static("nosniff")
        );
    }

    #[tokio::test]
    async fn test_signup_login_session_logout() {
        let app = create_test_app().await;

        let response = app
            .server
            .post("/api/auth/signup")
            .json(&json!({ "email": "ada@example.com", "password": "secret1", "name": "Ada" }))
            .await;
        response.assert_status(StatusCode::CREATED);
        let body = response.json::<Value>();
        assert_eq!(body["data"]["email"], "ada@example.com");
        assert!(body["data"].get("passwordHash").is_none());

        let duplicate = app
            .server
            .post("/api/auth/signup")
            .json(&json!({ "email": "ada@example.com", "password": "secret1", "name": "Ada" }))
            .await;
        duplicate.assert_status(StatusCode::CONFLICT);

        let wrong = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "ada@example.com", "password": "nope123" }))
            .await;
        wrong.assert_status(StatusCode::UNAUTHORIZED);

        let login = app
            .server
            .post("/api/auth/login")
            .json(&json!({ "email": "ada@example.com", "password": "secret1" }))
            .await;
        login.assert_status_ok();
        let session_id = login.cookie(session::SESSION_COOKIE_NAME).value().to_string();
        let cookie =
            HeaderValue::from_str(&format!("{}={}", session::SESSION_COOKIE_NAME, session_id))
                .unwrap();

        let current = app
            .server
            .get("/api/auth/session")
            .add_header(header::COOKIE, cookie.clone())
            .await;
        current.assert_status_ok();
        assert_eq!(current.json::<Value>()["data"]["name"], "Ada");

        app.server
            .post("/api/auth/logout")
            .add_header(header::COOKIE, cookie.clone())
            .await
            .assert_status_ok();

        let after = app
            .server
            .get("/api/auth/session")
            .add_header(header::COOKIE, cookie)
            .await;
        after.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_signup_validation_lists_every_problem() {
        let app = create_test_app().await;

        let response = app
            .server
            .post("/api/auth/signup")
            .json(&json!({ "email": "nope", "password": "123", "name": "A" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        let body = response.json::<Value>();
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
        let message = body["error"]["message"].as_str().unwrap();
        assert!(message.starts_with("Validation failed: "));
        assert!(message.contains("Invalid email address"));
        assert!(message.contains("Password must be at least 6 characters"));
    }

    #[tokio::test]
    async fn test_requests_without_session_are_unauthorized() {
        let app = create_test_app().await;

        let response = app.server.get("/api/vaults").await;
        response.assert_status(StatusCode::UNAUTHORIZED);
        assert_eq!(error_code(&response), "UNAUTHORIZED");

        let forged = app
            .server
            .get("/api/vaults")
            .add_header(header::COOKIE, HeaderValue::from_static("syncscript_session=forged"))
            .await;
        forged.assert_status(StatusCode::UNAUTHORIZED);

        let socket = app.server.get("/ws").await;
        socket.assert_status(StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_owner_creates_vault() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;

        let vault_id = create_vault(&app, &owner, "Research").await;

        let membership = app
            .state
            .storage
            .find_membership(owner.id, Uuid::parse_str(&vault_id).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(membership.role, permissions::Role::Owner);

        let list = app
            .server
            .get("/api/vaults")
            .add_header(header::COOKIE, owner.cookie.clone())
            .await;
        list.assert_status_ok();
        let body = list.json::<Value>();
        assert_eq!(body["data"][0]["name"], "Research");
        assert_eq!(body["data"][0]["userRole"], "owner");
        assert_eq!(body["data"][0]["sourceCount"], 0);

        let empty = app
            .server
            .post("/api/vaults")
            .add_header(header::COOKIE, owner.cookie.clone())
            .json(&json!({ "name": "" }))
            .await;
        empty.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&empty), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_vault_detail_requires_membership() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let outsider = sign_in(&app, "Outsider").await;
        let vault_id = create_vault(&app, &owner, "Research").await;

        let detail = app
            .server
            .get(&format!("/api/vaults/{}", vault_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .await;
        detail.assert_status_ok();
        let body = detail.json::<Value>();
        assert_eq!(body["data"]["userRole"], "owner");
        assert_eq!(body["data"]["members"][0]["user"]["name"], "Owner");

        let denied = app
            .server
            .get(&format!("/api/vaults/{}", vault_id))
            .add_header(header::COOKIE, outsider.cookie.clone())
            .await;
        denied.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(error_code(&denied), "FORBIDDEN");

        let missing = app
            .server
            .get(&format!("/api/vaults/{}", Uuid::new_v4()))
            .add_header(header::COOKIE, owner.cookie.clone())
            .await;
        missing.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_invite_flow_is_single_use() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let contributor = sign_in(&app, "Contributor").await;
        let latecomer = sign_in(&app, "Latecomer").await;
        let vault_id = create_vault(&app, &owner, "Research").await;

        let created = app
            .server
            .post(&format!("/api/vaults/{}/invite", vault_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .await;
        created.assert_status_ok();
        let token = created.json::<Value>()["data"]["inviteToken"]
            .as_str()
            .unwrap()
            .to_string();

        let info = app.server.get(&format!("/api/invites/{}", token)).await;
        info.assert_status_ok();
        let body = info.json::<Value>();
        assert_eq!(body["data"]["vaultName"], "Research");
        assert_eq!(body["data"]["inviterName"], "Owner");
        assert_eq!(body["data"]["valid"], true);

        let accepted = app
            .server
            .post(&format!("/api/invites/{}/accept", token))
            .add_header(header::COOKIE, contributor.cookie.clone())
            .await;
        accepted.assert_status_ok();

        let membership = app
            .state
            .storage
            .find_membership(contributor.id, Uuid::parse_str(&vault_id).unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(membership.role, permissions::Role::Contributor);

        let again = app
            .server
            .post(&format!("/api/invites/{}/accept", token))
            .add_header(header::COOKIE, latecomer.cookie.clone())
            .await;
        again.assert_status(StatusCode::GONE);
        assert_eq!(error_code(&again), "USED");

        let revalidated = app.server.get(&format!("/api/invites/{}", token)).await;
        revalidated.assert_status(StatusCode::GONE);

        let unknown = app.server.get("/api/invites/not-a-token").await;
        unknown.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_only_owner_may_invite_or_read_audit() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let contributor = sign_in(&app, "Contributor").await;
        let vault_id = create_vault(&app, &owner, "Research").await;
        add_member(&app, &vault_id, &contributor, permissions::Role::Contributor).await;

        let invite = app
            .server
            .post(&format!("/api/vaults/{}/invite", vault_id))
            .add_header(header::COOKIE, contributor.cookie.clone())
            .await;
        invite.assert_status(StatusCode::FORBIDDEN);

        let audit = app
            .server
            .get(&format!("/api/vaults/{}/audit", vault_id))
            .add_header(header::COOKIE, contributor.cookie.clone())
            .await;
        audit.assert_status(StatusCode::FORBIDDEN);

        create_source(&app, &contributor, &vault_id, "Paper")
            .await
            .assert_status(StatusCode::CREATED);

        let audit = app
            .server
            .get(&format!("/api/vaults/{}/audit", vault_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .await;
        audit.assert_status_ok();
        let entries = audit.json::<Value>()["data"]["auditLogs"].clone();
        assert_eq!(entries[0]["action"], "SOURCE_ADDED");
        assert_eq!(entries[0]["details"], "Contributor added source \"Paper\"");
    }

    #[tokio::test]
    async fn test_source_created_reaches_joined_owner() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let contributor = sign_in(&app, "Contributor").await;
        let vault_id = create_vault(&app, &owner, "Research").await;
        let other_vault = create_vault(&app, &owner, "Elsewhere").await;
        add_member(&app, &vault_id, &contributor, permissions::Role::Contributor).await;

        let (_owner_conn, mut owner_events, reply) = join_room(&app, &owner, &vault_id).await;
        match reply {
            ServerEvent::VaultJoined(joined) => {
                assert_eq!(joined.vault_id, vault_id);
                assert_eq!(joined.role, permissions::Role::Owner);
            }
            other => panic!("expected vault:joined, got {:?}", other),
        }
        let (_elsewhere_conn, mut elsewhere_events, _) = join_room(&app, &owner, &other_vault).await;

        let response = create_source(&app, &contributor, &vault_id, "Live paper").await;
        response.assert_status(StatusCode::CREATED);

        match owner_events.try_recv().unwrap() {
            ServerEvent::SourceCreated(event) => {
                assert_eq!(event.source.title, "Live paper");
                assert_eq!(event.actor.user_id, contributor.id);
                assert_eq!(event.actor.user_name, "Contributor");
                assert_eq!(event.actor.role, permissions::Role::Contributor);
            }
            other => panic!("expected source:created, got {:?}", other),
        }
        assert!(elsewhere_events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_join_without_membership_is_refused() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let outsider = sign_in(&app, "Outsider").await;
        let vault_id = create_vault(&app, &owner, "Research").await;

        let (_conn, mut events, reply) = join_room(&app, &outsider, &vault_id).await;
        match reply {
            ServerEvent::Error(err) => assert_eq!(err.message, "Access denied to vault"),
            other => panic!("expected error, got {:?}", other),
        }
        assert_eq!(app.state.hub.room_size(&vault_id), 0);

        create_source(&app, &owner, &vault_id, "Secret")
            .await
            .assert_status(StatusCode::CREATED);
        assert!(events.try_recv().is_err());

        let (_conn, _events, reply) = join_room(&app, &outsider, "").await;
        match reply {
            ServerEvent::Error(err) => assert_eq!(err.message, "Invalid vault ID"),
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_leave_stops_delivery_and_bad_frames_get_errors() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let vault_id = create_vault(&app, &owner, "Research").await;
        let identity = owner.identity();

        let (conn, mut events, _) = join_room(&app, &owner, &vault_id).await;
        let leave = json!({ "event": "vault:leave", "data": vault_id }).to_string();
        socket::handle_client_message(&app.state, conn, &identity, &leave).await;
        assert_eq!(app.state.hub.room_size(&vault_id), 0);

        socket::handle_client_message(&app.state, conn, &identity, "not json").await;
        assert!(matches!(events.try_recv(), Ok(ServerEvent::Error(_))));

        let unknown = json!({ "event": "vault:explode", "data": null }).to_string();
        socket::handle_client_message(&app.state, conn, &identity, &unknown).await;
        assert!(matches!(events.try_recv(), Ok(ServerEvent::Error(_))));

        create_source(&app, &owner, &vault_id, "Quiet")
            .await
            .assert_status(StatusCode::CREATED);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_viewer_cannot_delete_source() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let viewer = sign_in(&app, "Viewer").await;
        let vault_id = create_vault(&app, &owner, "Research").await;
        add_member(&app, &vault_id, &viewer, permissions::Role::Viewer).await;

        let created = create_source(&app, &owner, &vault_id, "Keep me").await;
        let source_id = created.json::<Value>()["data"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let denied = app
            .server
            .delete(&format!("/api/vaults/{}/sources/{}", vault_id, source_id))
            .add_header(header::COOKIE, viewer.cookie.clone())
            .await;
        denied.assert_status(StatusCode::FORBIDDEN);
        assert_eq!(error_code(&denied), "FORBIDDEN");

        let add = create_source(&app, &viewer, &vault_id, "Nope").await;
        add.assert_status(StatusCode::FORBIDDEN);

        let list = app
            .server
            .get(&format!("/api/vaults/{}/sources", vault_id))
            .add_header(header::COOKIE, viewer.cookie.clone())
            .await;
        list.assert_status_ok();
        let sources = list.json::<Value>()["data"].clone();
        assert_eq!(sources.as_array().unwrap().len(), 1);
        assert_eq!(sources[0]["id"], source_id.as_str());
    }

    #[tokio::test]
    async fn test_owner_deletes_source_and_room_is_told() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let vault_id = create_vault(&app, &owner, "Research").await;
        let created = create_source(&app, &owner, &vault_id, "Old").await;
        let source_id = created.json::<Value>()["data"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let (_conn, mut events, _) = join_room(&app, &owner, &vault_id).await;

        app.server
            .delete(&format!("/api/vaults/{}/sources/{}", vault_id, source_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .await
            .assert_status_ok();

        match events.try_recv().unwrap() {
            ServerEvent::SourceDeleted(event) => {
                assert_eq!(event.source_id.to_string(), source_id);
                assert_eq!(event.actor.role, permissions::Role::Owner);
            }
            other => panic!("expected source:deleted, got {:?}", other),
        }

        let again = app
            .server
            .delete(&format!("/api/vaults/{}/sources/{}", vault_id, source_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .await;
        again.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_owner_cannot_change_own_role() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let member = sign_in(&app, "Member").await;
        let vault_id = create_vault(&app, &owner, "Research").await;
        add_member(&app, &vault_id, &member, permissions::Role::Viewer).await;

        let own = app
            .server
            .patch(&format!("/api/vaults/{}/members/{}", vault_id, owner.id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .json(&json!({ "role": "viewer" }))
            .await;
        own.assert_status(StatusCode::BAD_REQUEST);
        let body = own.json::<Value>();
        assert_eq!(body["error"]["code"], "INVALID_INPUT");
        assert_eq!(body["error"]["message"], "Cannot change your own role");

        let by_member = app
            .server
            .patch(&format!("/api/vaults/{}/members/{}", vault_id, owner.id))
            .add_header(header::COOKIE, member.cookie.clone())
            .json(&json!({ "role": "viewer" }))
            .await;
        by_member.assert_status(StatusCode::FORBIDDEN);

        let bad_role = app
            .server
            .patch(&format!("/api/vaults/{}/members/{}", vault_id, member.id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .json(&json!({ "role": "admin" }))
            .await;
        bad_role.assert_status(StatusCode::BAD_REQUEST);

        let promoted = app
            .server
            .patch(&format!("/api/vaults/{}/members/{}", vault_id, member.id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .json(&json!({ "role": "contributor" }))
            .await;
        promoted.assert_status_ok();
        assert_eq!(promoted.json::<Value>()["data"]["role"], "contributor");

        let stranger = app
            .server
            .patch(&format!("/api/vaults/{}/members/{}", vault_id, Uuid::new_v4()))
            .add_header(header::COOKIE, owner.cookie.clone())
            .json(&json!({ "role": "viewer" }))
            .await;
        stranger.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_rename_and_delete_follow_permissions() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let contributor = sign_in(&app, "Contributor").await;
        let vault_id = create_vault(&app, &owner, "Draft").await;
        add_member(&app, &vault_id, &contributor, permissions::Role::Contributor).await;

        let renamed = app
            .server
            .patch(&format!("/api/vaults/{}", vault_id))
            .add_header(header::COOKIE, contributor.cookie.clone())
            .json(&json!({ "name": "Final" }))
            .await;
        renamed.assert_status_ok();
        assert_eq!(renamed.json::<Value>()["data"]["name"], "Final");

        let denied = app
            .server
            .delete(&format!("/api/vaults/{}", vault_id))
            .add_header(header::COOKIE, contributor.cookie.clone())
            .await;
        denied.assert_status(StatusCode::FORBIDDEN);

        create_source(&app, &owner, &vault_id, "Gone soon")
            .await
            .assert_status(StatusCode::CREATED);

        app.server
            .delete(&format!("/api/vaults/{}", vault_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .await
            .assert_status_ok();

        let sources = app
            .state
            .storage
            .list_sources(Uuid::parse_str(&vault_id).unwrap())
            .await
            .unwrap();
        assert!(sources.is_empty());

        let gone = app
            .server
            .get(&format!("/api/vaults/{}", vault_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .await;
        gone.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_pdf_upload_round_trip() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let viewer = sign_in(&app, "Viewer").await;
        let vault_id = create_vault(&app, &owner, "Research").await;
        add_member(&app, &vault_id, &viewer, permissions::Role::Viewer).await;

        let pdf = b"%PDF-1.7 test document".to_vec();
        let form = MultipartForm::new().add_part(
            "file",
            Part::bytes(pdf.clone())
                .file_name("paper.pdf")
                .mime_type("application/pdf"),
        );
        let uploaded = app
            .server
            .post(&format!("/api/vaults/{}/upload", vault_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .multipart(form)
            .await;
        uploaded.assert_status_ok();
        let body = uploaded.json::<Value>();
        assert_eq!(body["data"]["mimeType"], "application/pdf");
        assert_eq!(body["data"]["fileSize"], pdf.len());
        let url = body["data"]["url"].as_str().unwrap().to_string();

        let downloaded = app
            .server
            .get(&url)
            .add_header(header::COOKIE, viewer.cookie.clone())
            .await;
        downloaded.assert_status_ok();
        assert_eq!(downloaded.as_bytes().to_vec(), pdf);

        let text = MultipartForm::new().add_part(
            "file",
            Part::bytes(b"hello".to_vec())
                .file_name("notes.txt")
                .mime_type("text/plain"),
        );
        let rejected = app
            .server
            .post(&format!("/api/vaults/{}/upload", vault_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .multipart(text)
            .await;
        rejected.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(
            rejected.json::<Value>()["error"]["message"],
            "Only PDF files are allowed"
        );

        let viewer_upload = app
            .server
            .post(&format!("/api/vaults/{}/upload", vault_id))
            .add_header(header::COOKIE, viewer.cookie.clone())
            .multipart(MultipartForm::new().add_part(
                "file",
                Part::bytes(pdf).file_name("paper.pdf").mime_type("application/pdf"),
            ))
            .await;
        viewer_upload.assert_status(StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_file_key_cannot_be_shared_between_sources() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let contributor = sign_in(&app, "Contributor").await;
        let vault_id = create_vault(&app, &owner, "Research").await;
        add_member(&app, &vault_id, &contributor, permissions::Role::Contributor).await;

        let uploaded = app
            .server
            .post(&format!("/api/vaults/{}/upload", vault_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .multipart(MultipartForm::new().add_part(
                "file",
                Part::bytes(b"%PDF-1.7 shared".to_vec())
                    .file_name("paper.pdf")
                    .mime_type("application/pdf"),
            ))
            .await;
        uploaded.assert_status_ok();
        let upload = uploaded.json::<Value>()["data"].clone();
        let url = upload["url"].as_str().unwrap().to_string();
        let attachment = |title: &str| {
            json!({
                "title": title,
                "fileUrl": upload["url"],
                "fileKey": upload["fileKey"],
                "fileSize": upload["fileSize"],
            })
        };

        let original = app
            .server
            .post(&format!("/api/vaults/{}/sources", vault_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .json(&attachment("Original"))
            .await;
        original.assert_status(StatusCode::CREATED);
        let original_id = original.json::<Value>()["data"]["id"]
            .as_str()
            .unwrap()
            .to_string();

        let alias = app
            .server
            .post(&format!("/api/vaults/{}/sources", vault_id))
            .add_header(header::COOKIE, contributor.cookie.clone())
            .json(&attachment("Alias"))
            .await;
        alias.assert_status(StatusCode::CONFLICT);
        assert_eq!(error_code(&alias), "CONFLICT");

        let sources = app
            .server
            .get(&format!("/api/vaults/{}/sources", vault_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .await;
        assert_eq!(sources.json::<Value>()["data"].as_array().unwrap().len(), 1);

        app.server
            .get(&url)
            .add_header(header::COOKIE, owner.cookie.clone())
            .await
            .assert_status_ok();

        app.server
            .delete(&format!("/api/vaults/{}/sources/{}", vault_id, original_id))
            .add_header(header::COOKIE, owner.cookie.clone())
            .await
            .assert_status_ok();

        let gone = app
            .server
            .get(&url)
            .add_header(header::COOKIE, owner.cookie.clone())
            .await;
        gone.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_websocket_join_and_close_over_the_wire() {
        let temp_dir = TempDir::new().unwrap();
        let config = ServerConfig {
            database_url: format!(
                "sqlite:{}?mode=rwc",
                temp_dir.path().join("test.db").display()
            ),
            upload_dir: temp_dir.path().join("uploads"),
            ..ServerConfig::default()
        };
        let state = AppState::new(config).await.unwrap();
        let server = TestServer::builder()
            .http_transport()
            .build(server::build_router(state.clone()).unwrap())
            .unwrap();
        let app = TestApp {
            server,
            state,
            _temp_dir: temp_dir,
        };

        let owner = sign_in(&app, "Owner").await;
        let vault_id = create_vault(&app, &owner, "Research").await;

        let mut websocket = app
            .server
            .get_websocket("/ws")
            .add_header(header::COOKIE, owner.cookie.clone())
            .await
            .into_websocket()
            .await;

        websocket
            .send_json(&json!({ "event": "vault:join", "data": vault_id }))
            .await;
        let reply = websocket.receive_json::<Value>().await;
        assert_eq!(reply["event"], "vault:joined");
        assert_eq!(reply["data"]["vaultId"], vault_id);
        assert_eq!(reply["data"]["role"], "owner");
        assert_eq!(app.state.hub.connection_count(), 1);
        assert_eq!(app.state.hub.room_size(&vault_id), 1);

        websocket.send_text("not json").await;
        let error = websocket.receive_json::<Value>().await;
        assert_eq!(error["event"], "error");
        assert_eq!(error["data"]["message"], "Malformed message");

        websocket.close().await;

        let mut remaining = app.state.hub.connection_count();
        for _ in 0..100 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            remaining = app.state.hub.connection_count();
        }
        assert_eq!(remaining, 0);
        assert_eq!(app.state.hub.room_size(&vault_id), 0);
    }

    #[tokio::test]
    async fn test_join_from_unregistered_socket_is_not_acknowledged() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;
        let vault_id = create_vault(&app, &owner, "Research").await;

        let identity = owner.identity();
        let (connection_id, mut events) = app.state.hub.register(identity.clone());
        app.state.hub.unregister(connection_id);

        let frame = json!({ "event": "vault:join", "data": vault_id }).to_string();
        socket::handle_client_message(&app.state, connection_id, &identity, &frame).await;

        assert_eq!(app.state.hub.room_size(&vault_id), 0);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_json_uses_envelope() {
        let app = create_test_app().await;
        let owner = sign_in(&app, "Owner").await;

        let response = app
            .server
            .post("/api/vaults")
            .add_header(header::COOKIE, owner.cookie.clone())
            .json(&json!({ "title": "wrong field" }))
            .await;
        response.assert_status(StatusCode::BAD_REQUEST);
        assert_eq!(error_code(&response), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_seed_demo_is_idempotent() {
        let app = create_test_app().await;

        seed::seed_demo(&app.state.storage).await.unwrap();
        seed::seed_demo(&app.state.storage).await.unwrap();

        let owner = app
            .state
            .storage
            .find_user_by_email("owner@demo.com")
            .await
            .unwrap()
            .unwrap();
        let vaults = app.state.storage.list_vaults_for_user(owner.id).await.unwrap();
        assert_eq!(vaults.len(), 2);

        let viewer = app
            .state
            .storage
            .find_user_by_email("viewer@demo.com")
            .await
            .unwrap()
            .unwrap();
        let viewer_vaults = app.state.storage.list_vaults_for_user(viewer.id).await.unwrap();
        assert_eq!(viewer_vaults.len(), 1);
        assert_eq!(viewer_vaults[0].user_role, permissions::Role::Viewer);
    }
}
