use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use votechain::{app, config::Config, db, AppState};

const ADMIN_EMAIL: &str = "root@votechain.test";

async fn test_app() -> Router {
    let mut config = Config::development();
    config.admin_emails = vec![ADMIN_EMAIL.to_owned()];
    let db_pool = db::memory_pool().await.unwrap();
    app(AppState::new(config, db_pool).unwrap())
}

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, value)
}

async fn signup(app: &Router, email: &str) -> String {
    let (status, body) = send(app, Method::POST, "/auth/signup", None, Some(json!({
        "email": email,
        "password": "correct horse",
        "full_name": "Test User",
    }))).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["access_token"].as_str().unwrap().to_owned()
}

async fn verify_identity(app: &Router, token: &str, email: &str, voter_id: &str) -> (StatusCode, Value) {
    let (status, body) = send(app, Method::POST, "/functions/request-code", Some(token), Some(json!({
        "voter_id": voter_id,
        "email": email,
    }))).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    let code = body["debug_otp"].as_str().unwrap().to_owned();

    send(app, Method::POST, "/functions/verify-code", Some(token), Some(json!({ "otp_code": code }))).await
}

#[tokio::test]
async fn signup_login_and_logout() {
    let app = test_app().await;
    signup(&app, "voter@votechain.test").await;

    let (status, body) = send(&app, Method::POST, "/auth/signup", None, Some(json!({
        "email": "VOTER@votechain.test",
        "password": "another one",
    }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "User already registered");

    let (status, body) = send(&app, Method::POST, "/auth/login", None, Some(json!({
        "email": "voter@votechain.test",
        "password": "wrong password",
    }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid login credentials");

    let (status, body) = send(&app, Method::POST, "/auth/login", None, Some(json!({
        "email": "nobody@votechain.test",
        "password": "correct horse",
    }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid login credentials");

    let (status, body) = send(&app, Method::POST, "/auth/login", None, Some(json!({
        "email": "voter@votechain.test",
        "password": "correct horse",
    }))).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["access_token"].as_str().unwrap().to_owned();

    let (status, body) = send(&app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "voter@votechain.test");
    assert_eq!(body["profile"]["is_verified"], false);

    let (status, _) = send(&app, Method::POST, "/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, "/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Unauthorized");
}

#[tokio::test]
async fn malformed_bodies_are_rejected_as_json() {
    let app = test_app().await;
    let (status, body) = send(&app, Method::POST, "/auth/signup", None, Some(json!({ "email": 42 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn otp_verification_over_http() {
    let app = test_app().await;
    let token = signup(&app, "voter@votechain.test").await;

    let (status, body) = send(&app, Method::POST, "/functions/request-code", Some(&token), Some(json!({ "voter_id": "" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Voter ID and email are required");

    let (status, body) = send(&app, Method::POST, "/functions/verify-code", Some(&token), Some(json!({ "otp_code": "12ab56" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Valid 6-digit OTP code is required");

    let (status, body) = verify_identity(&app, &token, "voter@votechain.test", "VOTER-001").await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["voter_id"], "VOTER-001");

    let (status, body) = send(&app, Method::GET, "/verification/status", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "verified");
    assert_eq!(body["voter_id"], "VOTER-001");
}

#[tokio::test]
async fn voter_id_can_only_be_claimed_once() {
    let app = test_app().await;
    let first = signup(&app, "first@votechain.test").await;
    let second = signup(&app, "second@votechain.test").await;

    let (status, _) = verify_identity(&app, &first, "first@votechain.test", "VOTER-001").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = verify_identity(&app, &second, "second@votechain.test", "VOTER-001").await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "This Voter ID is already registered to another account");
}

#[tokio::test]
async fn admin_check_and_admin_routes() {
    let app = test_app().await;
    let admin = signup(&app, ADMIN_EMAIL).await;
    let voter = signup(&app, "voter@votechain.test").await;

    let (status, body) = send(&app, Method::POST, "/functions/verify-admin", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, json!({ "isAdmin": false, "error": "No authorization header" }));

    let (status, body) = send(&app, Method::POST, "/functions/verify-admin", Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "Invalid token");

    let (status, body) = send(&app, Method::POST, "/functions/verify-admin", Some(&voter), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isAdmin"], false);

    let (status, body) = send(&app, Method::POST, "/functions/verify-admin", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["isAdmin"], true);

    let (status, _) = send(&app, Method::GET, "/admin/dashboard", Some(&voter), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::GET, "/admin/dashboard", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_voters"], 2);
}

#[tokio::test]
async fn one_ballot_per_voter_over_http() {
    let app = test_app().await;
    let admin = signup(&app, ADMIN_EMAIL).await;
    let voter = signup(&app, "voter@votechain.test").await;

    let (status, election) = send(&app, Method::POST, "/admin/elections", Some(&admin), Some(json!({
        "title": "Board",
        "start_date": 0,
        "end_date": 4_102_444_800i64,
    }))).await;
    assert_eq!(status, StatusCode::CREATED, "{election}");
    let election_id = election["id"].as_str().unwrap().to_owned();

    let (status, candidate) = send(&app, Method::POST, "/admin/candidates", Some(&admin), Some(json!({
        "election_id": election_id,
        "name": "Alice",
    }))).await;
    assert_eq!(status, StatusCode::CREATED, "{candidate}");
    let candidate_id = candidate["id"].as_str().unwrap().to_owned();

    let ballot = json!({ "candidate_id": candidate_id });
    let votes_uri = format!("/elections/{election_id}/votes");

    let (status, body) = send(&app, Method::POST, &votes_uri, Some(&voter), Some(ballot.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "You must verify your identity before voting");

    let (status, _) = verify_identity(&app, &voter, "voter@votechain.test", "VOTER-001").await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, &votes_uri, Some(&voter), Some(ballot.clone())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "This election is not open for voting");

    let (status, _) = send(&app, Method::PATCH, &format!("/admin/elections/{election_id}"), Some(&admin), Some(json!({ "status": "active" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::POST, &votes_uri, Some(&voter), Some(ballot.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["success"], true);

    let (status, body) = send(&app, Method::POST, &votes_uri, Some(&voter), Some(ballot)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "You have already voted in this election");

    let (status, body) = send(&app, Method::GET, &format!("/elections/{election_id}/vote"), Some(&voter), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_voted"], true);

    let (status, body) = send(&app, Method::GET, &format!("/elections/{election_id}/results"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_votes"], 1);
    assert_eq!(body["candidates"][0]["votes"], 1);
    assert!(body["candidates"][0].get("user_id").is_none());
}

async fn create_election(app: &Router, admin: &str, title: &str) -> String {
    let (status, election) = send(app, Method::POST, "/admin/elections", Some(admin), Some(json!({
        "title": title,
        "start_date": 0,
        "end_date": 4_102_444_800i64,
    }))).await;
    assert_eq!(status, StatusCode::CREATED, "{election}");
    election["id"].as_str().unwrap().to_owned()
}

#[tokio::test]
async fn document_review_workflow() {
    let app = test_app().await;
    let admin = signup(&app, ADMIN_EMAIL).await;
    let voter = signup(&app, "voter@votechain.test").await;
    let squatter = signup(&app, "squatter@votechain.test").await;

    let document = json!({
        "document_url": "https://files.votechain.test/passport.png",
        "document_type": "passport",
        "voter_id": "VOTER-009",
    });
    let (status, request) = send(&app, Method::POST, "/verification/requests", Some(&voter), Some(document.clone())).await;
    assert_eq!(status, StatusCode::CREATED, "{request}");
    assert_eq!(request["status"], "pending");
    let first_id = request["id"].as_str().unwrap().to_owned();

    let (status, body) = send(&app, Method::POST, "/verification/requests", Some(&voter), Some(document)).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "A verification request is already pending");

    let (status, _) = send(&app, Method::GET, "/admin/verifications", Some(&voter), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, Method::GET, "/admin/verifications?status=bogus", Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");

    let (status, queue) = send(&app, Method::GET, "/admin/verifications?status=pending", Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue.as_array().unwrap().len(), 1);
    assert_eq!(queue[0]["email"], "voter@votechain.test");

    // someone else claims the voter id while the request waits
    let (status, _) = verify_identity(&app, &squatter, "squatter@votechain.test", "VOTER-009").await;
    assert_eq!(status, StatusCode::OK);

    let approve_first = format!("/admin/verifications/{first_id}/approve");
    let (status, body) = send(&app, Method::POST, &approve_first, Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "This Voter ID is already registered to another account");

    let (_, queue) = send(&app, Method::GET, "/admin/verifications?status=pending", Some(&admin), None).await;
    assert_eq!(queue[0]["id"], first_id.as_str());

    let (status, request) = send(&app, Method::POST, &format!("/admin/verifications/{first_id}/reject"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK, "{request}");
    assert_eq!(request["status"], "rejected");
    assert_eq!(request["rejection_reason"], "Document not acceptable");

    let (status, body) = send(&app, Method::POST, &approve_first, Some(&admin), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Only pending requests can be reviewed");

    let (status, request) = send(&app, Method::POST, "/verification/requests", Some(&voter), Some(json!({
        "document_url": "https://files.votechain.test/licence.png",
        "document_type": "drivers_license",
        "voter_id": "VOTER-010",
    }))).await;
    assert_eq!(status, StatusCode::CREATED, "{request}");
    let second_id = request["id"].as_str().unwrap().to_owned();

    let (status, request) = send(&app, Method::POST, &format!("/admin/verifications/{second_id}/approve"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::OK, "{request}");
    assert_eq!(request["status"], "approved");

    let (_, me) = send(&app, Method::GET, "/auth/me", Some(&voter), None).await;
    assert_eq!(me["profile"]["is_verified"], true);
    assert_eq!(me["profile"]["voter_id"], "VOTER-010");

    let (_, own) = send(&app, Method::GET, "/verification/requests", Some(&voter), None).await;
    assert_eq!(own.as_array().unwrap().len(), 2);

    let (status, body) = send(&app, Method::POST, "/verification/requests", Some(&voter), Some(json!({
        "document_url": "https://files.votechain.test/again.png",
        "document_type": "passport",
    }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Your identity is already verified");
}

#[tokio::test]
async fn candidates_with_ballots_stay_put_until_the_election_goes() {
    let app = test_app().await;
    let admin = signup(&app, ADMIN_EMAIL).await;
    let voter = signup(&app, "voter@votechain.test").await;
    let (status, _) = verify_identity(&app, &voter, "voter@votechain.test", "VOTER-001").await;
    assert_eq!(status, StatusCode::OK);

    let board = create_election(&app, &admin, "Board").await;
    let council = create_election(&app, &admin, "Council").await;
    let (status, _) = send(&app, Method::PATCH, &format!("/admin/elections/{board}"), Some(&admin), Some(json!({ "status": "active" }))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, candidate) = send(&app, Method::POST, "/admin/candidates", Some(&admin), Some(json!({
        "election_id": board,
        "name": "Alice",
    }))).await;
    let candidate_uri = format!("/admin/candidates/{}", candidate["id"].as_str().unwrap());

    let (status, _) = send(&app, Method::POST, &format!("/elections/{board}/votes"), Some(&voter), Some(json!({
        "candidate_id": candidate["id"],
    }))).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(&app, Method::DELETE, &candidate_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Candidate already has votes and cannot be removed");

    let (status, body) = send(&app, Method::PUT, &candidate_uri, Some(&admin), Some(json!({
        "election_id": council,
        "name": "Alice",
    }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "Candidate already has votes in another election");

    let (status, renamed) = send(&app, Method::PUT, &candidate_uri, Some(&admin), Some(json!({
        "election_id": board,
        "name": "Alice Liddell",
    }))).await;
    assert_eq!(status, StatusCode::OK, "{renamed}");
    assert_eq!(renamed["name"], "Alice Liddell");

    let (status, _) = send(&app, Method::DELETE, &format!("/admin/elections/{board}"), Some(&admin), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, body) = send(&app, Method::GET, &format!("/elections/{board}"), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "election not found");

    let (status, body) = send(&app, Method::DELETE, &candidate_uri, Some(&admin), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "candidate not found");

    let (status, _) = send(&app, Method::GET, &format!("/elections/{council}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn chain_routes_need_a_contract() {
    let app = test_app().await;
    let admin = signup(&app, ADMIN_EMAIL).await;

    let (status, body) = send(&app, Method::GET, "/chain/status", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Smart contract not configured");

    let (status, body) = send(&app, Method::POST, "/admin/chain/voters", Some(&admin), Some(json!({
        "from": "0x90f8bf6a479f320ead074411a4b0e7944ea8c9c1",
        "voter_address": "0xffcf8fdee72ac11b5c542428b35eef5769c409f0",
        "voter_id": "VOTER-001",
    }))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Smart contract not configured");
}
