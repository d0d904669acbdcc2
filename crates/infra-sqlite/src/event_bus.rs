// SQLite PersistentBus Implementation
//
// Events are appended to `bus_events`; delivery to subscribers is out of
// process and reads the table in record order.

use crate::error::map_sqlx_error;
use async_trait::async_trait;
use entitlement_core::domain::BusEvent;
use entitlement_core::error::{AppError, Result};
use entitlement_core::port::{PersistentBus, TimeProvider};
use sqlx::{Sqlite, SqlitePool};
use std::sync::Arc;
use tracing::debug;

/// Append one event using any executor (pool or open transaction)
pub(crate) async fn insert_bus_event<'e, E>(
    executor: E,
    event: &BusEvent,
    created_date: i64,
) -> Result<()>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let (search_key1, search_key2) = match event {
        BusEvent::BlockingTransition(e) => (e.search_key1, e.search_key2),
        BusEvent::BlockingStatesChanged(e) => (e.search_key1, e.search_key2),
    };
    let event_json = serde_json::to_string(event)?;

    sqlx::query(
        r#"
        INSERT INTO bus_events (event_type, event_json, user_token, search_key1, search_key2, created_date)
        VALUES (?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(event.event_type())
    .bind(event_json)
    .bind(event.user_token().map(|t| t.to_string()))
    .bind(search_key1)
    .bind(search_key2)
    .bind(created_date)
    .execute(executor)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}

pub struct SqlitePersistentBus {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqlitePersistentBus {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// Posted events of one type, oldest first
    pub async fn events_of_type(&self, event_type: &str) -> Result<Vec<BusEvent>> {
        let rows: Vec<String> = sqlx::query_scalar(
            "SELECT event_json FROM bus_events WHERE event_type = ? ORDER BY record_id ASC",
        )
        .bind(event_type)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.iter()
            .map(|json| serde_json::from_str(json).map_err(AppError::from))
            .collect()
    }
}

#[async_trait]
impl PersistentBus for SqlitePersistentBus {
    async fn post(&self, event: BusEvent) -> Result<()> {
        insert_bus_event(&self.pool, &event, self.time_provider.now_millis())
            .await
            .map_err(|e| AppError::EventBus(e.to_string()))?;

        debug!(event_type = event.event_type(), "Bus event posted");
        Ok(())
    }
}
