//! In-memory connector used by tests and local experiments.
//!
//! Stands in for a real engine: records every executed statement and
//! replays a configured outcome.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    ConnectionConfig, Connector, ConnectorError, ConnectorFactory, QueryResult, TableInfo,
};

#[derive(Debug, Clone)]
pub enum StubOutcome {
    Rows(QueryResult),
    ConnectError(String),
    ExecuteError(String),
}

pub struct StubConnectorFactory {
    outcome: Mutex<StubOutcome>,
    execute_delay: Mutex<Option<Duration>>,
    executed: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
}

impl StubConnectorFactory {
    pub fn returning(result: QueryResult) -> Self {
        Self {
            outcome: Mutex::new(StubOutcome::Rows(result)),
            execute_delay: Mutex::new(None),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn empty() -> Self {
        Self::returning(QueryResult::default())
    }

    pub fn set_outcome(&self, outcome: StubOutcome) {
        *self.outcome.lock().unwrap() = outcome;
    }

    /// Delays each execute; lets tests drive the per-call timeout.
    pub fn set_execute_delay(&self, delay: Option<Duration>) {
        *self.execute_delay.lock().unwrap() = delay;
    }

    /// Every `(sql, args)` pair that reached `execute`, in order.
    pub fn executed(&self) -> Vec<(String, Vec<Value>)> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectorFactory for StubConnectorFactory {
    async fn connect(
        &self,
        _config: &ConnectionConfig,
    ) -> Result<Box<dyn Connector>, ConnectorError> {
        let outcome = self.outcome.lock().unwrap().clone();
        if let StubOutcome::ConnectError(message) = &outcome {
            return Err(ConnectorError::Connect(message.clone()));
        }
        Ok(Box::new(StubConnector {
            outcome,
            execute_delay: *self.execute_delay.lock().unwrap(),
            executed: self.executed.clone(),
        }))
    }
}

struct StubConnector {
    outcome: StubOutcome,
    execute_delay: Option<Duration>,
    executed: Arc<Mutex<Vec<(String, Vec<Value>)>>>,
}

#[async_trait]
impl Connector for StubConnector {
    async fn ping(&self) -> Result<(), ConnectorError> {
        Ok(())
    }

    async fn execute(&self, sql: &str, args: &[Value]) -> Result<QueryResult, ConnectorError> {
        self.executed
            .lock()
            .unwrap()
            .push((sql.to_string(), args.to_vec()));

        if let Some(delay) = self.execute_delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            StubOutcome::Rows(result) => Ok(result.clone()),
            StubOutcome::ExecuteError(message) => Err(ConnectorError::Execute(message.clone())),
            StubOutcome::ConnectError(message) => Err(ConnectorError::Connect(message.clone())),
        }
    }

    async fn schema(&self) -> Result<Vec<TableInfo>, ConnectorError> {
        Ok(Vec::new())
    }

    async fn close(&self) {}
}
