//! Scripted transport for unit tests

use crate::client::{ApiTransport, Method};
use crate::error::{KamateraError, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

impl Call {
    pub fn is_queue_poll(&self) -> bool {
        self.path.starts_with("service/queue")
    }
}

type Responder = Box<dyn Fn(&Call) -> Result<Value> + Send + Sync>;

/// Records every call and answers through a closure
pub(crate) struct ScriptedApi {
    calls: Mutex<Vec<Call>>,
    responder: Responder,
}

impl ScriptedApi {
    pub fn new(responder: impl Fn(&Call) -> Result<Value> + Send + Sync + 'static) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    /// Mutating calls return one command id; every queue poll reports completion
    pub fn completing() -> Self {
        Self::new(|call| {
            if call.is_queue_poll() {
                Ok(json!([{"status": "complete", "log": "done"}]))
            } else {
                Ok(json!(["cmd-1"]))
            }
        })
    }

    /// Answers calls in order from a fixed script
    pub fn sequence(responses: Vec<Result<Value>>) -> Self {
        let queue = Mutex::new(VecDeque::from(responses));
        Self::new(move |call| {
            queue.lock().unwrap().pop_front().unwrap_or_else(|| {
                Err(KamateraError::malformed(format!(
                    "unscripted call to {}",
                    call.path
                )))
            })
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls other than command status polls
    pub fn requests(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| !c.is_queue_poll())
            .collect()
    }

    pub fn bodies(&self) -> Vec<Value> {
        self.requests()
            .into_iter()
            .filter_map(|c| c.body)
            .collect()
    }
}

#[async_trait]
impl ApiTransport for ScriptedApi {
    async fn request(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value> {
        let call = Call {
            method,
            path: path.to_string(),
            body,
        };
        self.calls.lock().unwrap().push(call.clone());
        (self.responder)(&call)
    }
}
