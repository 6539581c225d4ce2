//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use chatads_client::api::types::RequestPayload;
use chatads_client::pool::{RawResponse, Transport, TransportError, TransportFactory};
use chatads_client::{ChatAdsClient, ClientConfig, Credential};

pub const API_KEY: &str = "sk_test_9f8e7d6c5b4a3f2e1d0c";

pub const MESSAGE: &str = "what are the best running shoes for beginners";

/// One scripted upstream reaction.
#[derive(Debug, Clone)]
pub enum Reply {
    Respond(u16, String),
    Fail(TransportError),
    /// Answers after a delay.
    Slow(Duration, u16, String),
    /// Never answers; the attempt deadline fires first.
    Hang,
}

impl Reply {
    pub fn json(status: u16, body: serde_json::Value) -> Self {
        Self::Respond(status, body.to_string())
    }
}

/// Transport that plays back a script, then repeats a fallback reply.
#[derive(Debug)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Reply>>,
    fallback: Reply,
    calls: AtomicU32,
    payloads: Mutex<Vec<RequestPayload>>,
    closed: AtomicU32,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Reply>, fallback: Reply) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: AtomicU32::new(0),
            payloads: Mutex::new(Vec::new()),
            closed: AtomicU32::new(0),
        })
    }

    /// Always answers with `reply`.
    pub fn repeating(reply: Reply) -> Arc<Self> {
        Self::new(Vec::new(), reply)
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn payloads(&self) -> Vec<RequestPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, payload: &RequestPayload) -> Result<RawResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.payloads.lock().unwrap().push(payload.clone());

        let reply = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match reply {
            Reply::Respond(status, body) => Ok(RawResponse::new(status, body.into_bytes())),
            Reply::Fail(err) => Err(err),
            Reply::Slow(delay, status, body) => {
                tokio::time::sleep(delay).await;
                Ok(RawResponse::new(status, body.into_bytes()))
            }
            Reply::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(TransportError::Request("hung transport woke up".into()))
            }
        }
    }

    fn close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Factory that hands out one shared scripted transport and records builds.
pub struct ScriptedFactory {
    transport: Arc<ScriptedTransport>,
    builds: Mutex<Vec<String>>,
}

impl ScriptedFactory {
    pub fn new(transport: Arc<ScriptedTransport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            builds: Mutex::new(Vec::new()),
        })
    }

    pub fn builds(&self) -> usize {
        self.builds.lock().unwrap().len()
    }

    pub fn built_for(&self) -> Vec<String> {
        self.builds.lock().unwrap().clone()
    }
}

impl TransportFactory for ScriptedFactory {
    fn build(&self, credential: &Credential) -> Result<Arc<dyn Transport>, TransportError> {
        self.builds.lock().unwrap().push(credential.expose().to_string());
        let transport: Arc<dyn Transport> = self.transport.clone();
        Ok(transport)
    }
}

/// Config with a credential and fast backoff.
pub fn test_config() -> ClientConfig {
    let mut config = ClientConfig::default();
    config.api.api_key = Some(Credential::new(API_KEY));
    config.retries.max_attempts = 3;
    config.retries.initial_backoff_secs = 0.6;
    config.retries.max_backoff_secs = 10.0;
    config.timeouts.attempt_secs = 10.0;
    config.circuit_breaker.failure_threshold = 5;
    config.circuit_breaker.cooldown_secs = 60.0;
    config
}

/// Client wired to a scripted transport.
pub fn scripted_client(
    config: ClientConfig,
    transport: Arc<ScriptedTransport>,
) -> (ChatAdsClient, Arc<ScriptedFactory>) {
    let factory = ScriptedFactory::new(transport);
    let client = ChatAdsClient::with_factory(config, factory.clone()).unwrap();
    (client, factory)
}

/// Client whose base URL points at a mock server.
pub fn http_client(base_url: &str) -> ChatAdsClient {
    let mut config = test_config();
    config.api.base_url = base_url.to_string();
    config.retries.initial_backoff_secs = 0.01;
    config.retries.max_backoff_secs = 0.05;
    config.timeouts.attempt_secs = 2.0;
    ChatAdsClient::new(config).unwrap()
}

pub fn match_body() -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "matched": true,
            "ad": {
                "product": "Trail Runner 5",
                "link": "https://shop.example.com/trail-runner-5?ref=chatads",
                "category": "footwear",
                "message": "Beginners love the Trail Runner 5."
            }
        },
        "meta": {
            "request_id": "req_abc123",
            "country": "US",
            "language": "en"
        }
    })
}

pub fn no_match_body() -> serde_json::Value {
    json!({
        "success": true,
        "data": { "matched": false, "reason": "no_match: insufficient data" },
        "meta": { "request_id": "req_nomatch" }
    })
}

pub fn usage_body(monthly_used: u64, monthly_limit: u64) -> serde_json::Value {
    json!({
        "success": true,
        "data": { "matched": false },
        "meta": {
            "request_id": "req_usage",
            "usage": {
                "monthly_requests": monthly_used,
                "free_tier_limit": monthly_limit,
                "is_free_tier": true
            }
        }
    })
}

pub fn error_body(code: &str, message: &str) -> serde_json::Value {
    json!({
        "success": false,
        "error": { "code": code, "message": message }
    })
}
