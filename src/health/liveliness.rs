use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{CheckError, CheckRegistration, HealthCenter, HealthCheck, HealthError};
use crate::store::SharedClient;

pub const DB_LIVELINESS_CHECK: &str = "db-liveliness";
pub const DB_LIVELINESS_PERIOD: Duration = Duration::from_secs(30);
pub const DB_LIVELINESS_DELAY: Duration = Duration::from_secs(5);

/// Reports whether the graph store answers a version probe.
pub struct DbLivelinessCheck {
    client: SharedClient,
}

impl DbLivelinessCheck {
    pub fn new(client: SharedClient) -> Self { Self { client } }

    pub fn registration() -> CheckRegistration {
        CheckRegistration::new(DB_LIVELINESS_CHECK, DB_LIVELINESS_PERIOD)
            .initial_delay(DB_LIVELINESS_DELAY)
            .initially_passing(false)
    }

    pub async fn register(self, center: &HealthCenter) -> Result<(), HealthError> {
        center.register_check(Self::registration(), Arc::new(self)).await
    }
}

#[async_trait]
impl HealthCheck for DbLivelinessCheck {
    async fn execute(&self) -> Result<Value, CheckError> {
        match self.client.version().await {
            Ok(version) => Ok(json!({ "status": "database connected", "version": version })),
            Err(e) => Err(CheckError::new(format!("database unreachable: {e}")).with_details(json!({ "status": "database unavailable" }))),
        }
    }
}
