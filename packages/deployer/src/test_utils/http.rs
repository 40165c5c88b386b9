use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, Response},
};
use deployer_types::{ChainName, NetworkConfig};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tower::Service;
use utils::http::UserClaims;

use crate::{
    args::CliArgs,
    config::Config,
    dispatcher::{Dispatcher, DispatcherHandle, InProcessLauncher},
};

use super::{app::TestApp, mock::MockRunner};

/// Chain every test app can deploy to
pub const TEST_CHAIN: &str = "test-chain";

/// Upper bound for one request or a shutdown, so a stuck dispatcher fails the test
pub const TEST_DEADLINE: Duration = Duration::from_secs(10);

/// Router backed by a real dispatcher whose workers run [`MockRunner`] in-process
pub struct TestHttpApp {
    pub inner: TestApp,
    pub runner: MockRunner,
    pub dispatcher: DispatcherHandle,
    dispatcher_task: Option<JoinHandle<()>>,
    _http_router: axum::Router,
}

impl TestHttpApp {
    pub async fn new() -> Self {
        Self::new_with_runner(MockRunner::new(), TestApp::zeroed_cli_args()).await
    }

    pub async fn new_with_runner(runner: MockRunner, cli_args: CliArgs) -> Self {
        let inner = TestApp::new_with_args(cli_args);

        let mut config: Config = inner.config.as_ref().clone();
        config.workers = config.workers.min(2);
        config.networks.insert(
            ChainName::new(TEST_CHAIN).unwrap(),
            NetworkConfig::new("http://127.0.0.1:8545", "localhost").with_api_key("test-key"),
        );

        let launcher = InProcessLauncher::with_runner(Arc::new(runner.clone()));
        let (dispatcher, dispatcher_task) =
            Dispatcher::start(config.dispatcher_config().unwrap(), Arc::new(launcher));

        let http_router = crate::http::server::make_router(config, dispatcher.clone());

        Self {
            inner,
            runner,
            dispatcher,
            dispatcher_task: Some(dispatcher_task),
            _http_router: http_router,
        }
    }

    pub async fn http_router(&mut self) -> &mut axum::Router {
        // wait till it's ready
        <axum::Router as tower::ServiceExt<axum::extract::Request<axum::body::Body>>>::ready(
            &mut self._http_router,
        )
        .await
        .unwrap();

        &mut self._http_router
    }

    /// Sends one request through the router, failing after [`TEST_DEADLINE`]
    pub async fn call(&mut self, req: Request<Body>) -> Response<Body> {
        let router = self.http_router().await;
        tokio::time::timeout(TEST_DEADLINE, router.call(req))
            .await
            .expect("request timed out")
            .unwrap()
    }

    /// Stops the pool and waits for the dispatcher task to finish
    pub async fn shutdown(&mut self) {
        tokio::time::timeout(TEST_DEADLINE, self.dispatcher.shutdown())
            .await
            .expect("dispatcher shutdown timed out");
        if let Some(task) = self.dispatcher_task.take() {
            tokio::time::timeout(TEST_DEADLINE, task)
                .await
                .expect("dispatcher task did not finish")
                .unwrap();
        }
    }
}

/// An HS256 user token signed with `secret`
pub fn user_token(secret: &str, user_id: &str) -> String {
    let claims = UserClaims {
        id: user_id.to_string(),
        exp: None,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap()
}

pub async fn map_response<T: DeserializeOwned>(response: axum::http::Response<Body>) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
