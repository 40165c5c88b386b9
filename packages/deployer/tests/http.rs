use alloy_primitives::Address;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use contract_deployer::{
    http::{
        error::ErrorResponse,
        handlers::{NetworksResponse, SubmitJobResponse, VerifyContractResponse},
    },
    test_utils::{
        app::TestApp,
        http::{map_response, user_token, TestHttpApp, TEST_CHAIN, TEST_DEADLINE},
        mock::{MockRunner, FAIL_DEPLOY_TOKEN},
    },
};
use deployer_types::{JobError, JobState, JobStatus, PoolStatus};
use http_body_util::BodyExt;
use serde_json::{json, Value};

const ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

fn job_body(chain_name: &str, token_name: &str) -> Value {
    json!({
        "deployedAddress": ADDRESS,
        "constructorArguments": ["My Token", "MTK", 1000000],
        "templateNumber": 0,
        "tokenName": token_name,
        "chainName": chain_name
    })
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .header(header::CONTENT_TYPE, "application/json")
        .uri(uri)
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn http_not_found() {
    let mut app = TestHttpApp::new().await;

    let response = app.call(get("/does_not_exist")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.shutdown().await;
}

#[tokio::test]
async fn http_verify_contract() {
    let mut app = TestHttpApp::new().await;

    let response = app.call(post("/verify-contract", &job_body(TEST_CHAIN, "My Token"))).await;

    assert_eq!(response.status(), StatusCode::OK);

    let response: VerifyContractResponse = map_response(response).await;
    assert!(response.success);
    assert_eq!(
        response.contract_address.parse::<Address>().unwrap(),
        ADDRESS.parse::<Address>().unwrap()
    );
    assert_eq!(response.network, TEST_CHAIN);
    assert_eq!(response.verification_result.as_deref(), Some("success"));
    assert_eq!(app.runner.finished().len(), 1);

    app.shutdown().await;
}

#[tokio::test]
async fn http_unsupported_network() {
    let mut app = TestHttpApp::new().await;

    let response = app.call(post("/verify-contract", &job_body("MARS_MAINNET", "My Token"))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response: ErrorResponse = map_response(response).await;
    assert!(!response.success);
    assert_eq!(
        response.job_error,
        Some(JobError::unsupported_network("MARS_MAINNET"))
    );
    assert!(app.runner.started().is_empty());

    app.shutdown().await;
}

#[tokio::test]
async fn http_malformed_body() {
    let mut app = TestHttpApp::new().await;

    // chainName is required
    let response = app.call(post("/verify-contract", &json!({"deployedAddress": ADDRESS}))).await;

    assert!(response.status().is_client_error());
    assert!(app.runner.started().is_empty());

    app.shutdown().await;
}

#[tokio::test]
async fn http_deployment_failure() {
    let mut app = TestHttpApp::new().await;

    let response = app.call(post(
            "/verify-contract",
            &job_body(TEST_CHAIN, FAIL_DEPLOY_TOKEN),
        )).await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let response: ErrorResponse = map_response(response).await;
    assert!(matches!(
        response.job_error,
        Some(JobError::Deployment { .. })
    ));

    app.shutdown().await;
}

#[tokio::test]
async fn http_submit_and_poll_job() {
    let runner = MockRunner::gated();
    let mut app = TestHttpApp::new_with_runner(runner.clone(), TestApp::zeroed_cli_args()).await;

    let response = app.call(post("/jobs", &job_body(TEST_CHAIN, "My Token"))).await;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let SubmitJobResponse { job_id } = map_response(response).await;

    tokio::time::timeout(TEST_DEADLINE, runner.wait_started(1))
        .await
        .unwrap();

    let response = app.call(get(&format!("/job/{job_id}"))).await;

    assert_eq!(response.status(), StatusCode::OK);
    let status: JobStatus = map_response(response).await;
    assert_eq!(status.job_id, job_id);
    assert!(matches!(status.state, JobState::Running { .. }));

    runner.release(1);

    // completed jobs are no longer tracked
    let response = tokio::time::timeout(TEST_DEADLINE, async {
        loop {
            let response = app.call(get(&format!("/job/{job_id}"))).await;
            if response.status() == StatusCode::NOT_FOUND {
                return response;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(runner.finished().len(), 1);
    let response: ErrorResponse = map_response(response).await;
    assert!(!response.success);

    app.shutdown().await;
}

#[tokio::test]
async fn http_bearer_token_guards_submissions() {
    let cli_args = contract_deployer::args::CliArgs {
        bearer_token: Some("s3cr3t".to_string()),
        ..TestApp::zeroed_cli_args()
    };
    let mut app = TestHttpApp::new_with_runner(MockRunner::new(), cli_args).await;

    let body = job_body(TEST_CHAIN, "My Token");

    let response = app.call(post("/jobs", &body)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let mut req = post("/jobs", &body);
    req.headers_mut()
        .insert(header::AUTHORIZATION, "Bearer s3cr3t".parse().unwrap());
    let response = app.call(req).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // read routes stay public
    let response = app.call(get("/info")).await;
    assert_eq!(response.status(), StatusCode::OK);

    app.shutdown().await;
}

fn with_auth(mut req: Request<Body>, token: &str) -> Request<Body> {
    req.headers_mut().insert(
        header::AUTHORIZATION,
        format!("Bearer {token}").parse().unwrap(),
    );
    req
}

#[tokio::test]
async fn http_user_token_guards_job_routes() {
    let cli_args = contract_deployer::args::CliArgs {
        jwt_secret: Some("jwt-s3cr3t".to_string()),
        ..TestApp::zeroed_cli_args()
    };
    let mut app = TestHttpApp::new_with_runner(MockRunner::new(), cli_args).await;
    let body = job_body(TEST_CHAIN, "My Token");

    for req in [
        post("/verify-contract", &body),
        post("/jobs", &body),
        get("/job/0"),
    ] {
        let response = app.call(req).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    let forged = user_token("another-secret", "user-1");
    let response = app.call(with_auth(post("/jobs", &body), &forged)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.runner.started().is_empty());

    // read routes stay public
    let response = app.call(get("/info")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let token = user_token("jwt-s3cr3t", "user-1");
    let response = app
        .call(with_auth(post("/verify-contract", &body), &token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.call(with_auth(get("/job/999"), &token)).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    app.shutdown().await;
}

#[tokio::test]
async fn http_jobs_are_attributed_to_token_user() {
    let cli_args = contract_deployer::args::CliArgs {
        jwt_secret: Some("jwt-s3cr3t".to_string()),
        ..TestApp::zeroed_cli_args()
    };
    let mut app = TestHttpApp::new_with_runner(MockRunner::new(), cli_args).await;

    // a userId in the body never wins over the token
    let mut body = job_body(TEST_CHAIN, "My Token");
    body["userId"] = json!("someone-else");

    let token = user_token("jwt-s3cr3t", "user-1");
    let response = app
        .call(with_auth(post("/verify-contract", &body), &token))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.runner.users(), vec![Some("user-1".to_string())]);

    app.shutdown().await;
}

#[tokio::test]
async fn http_networks_hide_api_keys() {
    let mut app = TestHttpApp::new().await;

    let response = app.call(get("/networks")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(!String::from_utf8_lossy(&bytes).contains("test-key"));

    let response: NetworksResponse = serde_json::from_slice(&bytes).unwrap();
    let test_chain = response
        .networks
        .iter()
        .find(|n| n.chain_name == TEST_CHAIN)
        .unwrap();
    assert!(test_chain.verification_enabled);
    assert_eq!(test_chain.tool_network, "localhost");

    let somnia = response
        .networks
        .iter()
        .find(|n| n.chain_name == "somnia-testnet")
        .unwrap();
    assert!(!somnia.verification_enabled);

    app.shutdown().await;
}

#[tokio::test]
async fn http_info() {
    let mut app = TestHttpApp::new().await;

    let response = app.call(get("/info")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let status: PoolStatus = map_response(response).await;
    assert_eq!(status.pool_size, app.inner.config.workers.min(2));
    assert_eq!(status.queued, 0);
    assert!(!status.shutting_down);

    app.shutdown().await;
}

#[tokio::test]
async fn http_after_shutdown() {
    let mut app = TestHttpApp::new().await;
    app.shutdown().await;

    let response = app.call(post("/verify-contract", &job_body(TEST_CHAIN, "My Token"))).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = app.call(get("/info")).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn http_openapi() {
    let mut app = TestHttpApp::new().await;

    let response = app.call(get("/api-docs/openapi.json")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc: Value = map_response(response).await;
    assert!(doc["paths"]["/verify-contract"].is_object());
    assert!(doc["paths"]["/job/{job_id}"].is_object());

    app.shutdown().await;
}
