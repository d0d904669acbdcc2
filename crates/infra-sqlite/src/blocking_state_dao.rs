// SQLite BlockingStateDao Implementation

use crate::error::{from_millis, map_sqlx_error, parse_uuid};
use crate::event_bus::insert_bus_event;
use async_trait::async_trait;
use entitlement_core::domain::{
    BlockingState, BlockingStateId, BlockingStatesChangedEvent, BlockingType, BundleId, BusEvent,
    InternalCallContext,
};
use entitlement_core::error::{AppError, Result};
use entitlement_core::port::{BlockingStateDao, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SqliteBlockingStateDao {
    pool: SqlitePool,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteBlockingStateDao {
    pub fn new(pool: SqlitePool, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            pool,
            time_provider,
        }
    }

    /// All states of one blockable entity ordered by effective date
    pub async fn get_for_blockable(&self, blockable_id: uuid::Uuid) -> Result<Vec<BlockingState>> {
        let rows = sqlx::query_as::<_, BlockingStateRow>(
            "SELECT * FROM blocking_states WHERE blockable_id = ? ORDER BY effective_date ASC, id ASC",
        )
        .bind(blockable_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(BlockingStateRow::into_state).collect()
    }

    /// Remove a state (e.g. an operator undoing a block)
    pub async fn delete(&self, id: BlockingStateId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM blocking_states WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl BlockingStateDao for SqliteBlockingStateDao {
    async fn get_by_id(
        &self,
        id: BlockingStateId,
        context: &InternalCallContext,
    ) -> Result<Option<BlockingState>> {
        let row = sqlx::query_as::<_, BlockingStateRow>(
            r#"
            SELECT * FROM blocking_states
            WHERE id = ?
              AND (? IS NULL OR tenant_record_id IS NULL OR tenant_record_id = ?)
            "#,
        )
        .bind(id.to_string())
        .bind(context.tenant_record_id)
        .bind(context.tenant_record_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        row.map(BlockingStateRow::into_state).transpose()
    }

    async fn set_blocking_states_and_post_blocking_transition_event(
        &self,
        states: &[BlockingState],
        bundle_id: BundleId,
        context: &InternalCallContext,
    ) -> Result<()> {
        let now = self.time_provider.now_millis();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for state in states {
            // Natural-key upsert: the latest write replaces the row, id included
            sqlx::query(
                r#"
                INSERT INTO blocking_states (
                    id, blockable_id, blocking_type, state_name, service,
                    block_change, block_entitlement, block_billing, effective_date,
                    account_record_id, tenant_record_id, updated_date
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (blockable_id, service, state_name, effective_date) DO UPDATE SET
                    id = excluded.id,
                    blocking_type = excluded.blocking_type,
                    block_change = excluded.block_change,
                    block_entitlement = excluded.block_entitlement,
                    block_billing = excluded.block_billing,
                    account_record_id = excluded.account_record_id,
                    tenant_record_id = excluded.tenant_record_id,
                    updated_date = excluded.updated_date
                "#,
            )
            .bind(state.id.to_string())
            .bind(state.blocked_id.to_string())
            .bind(state.blocking_type.to_string())
            .bind(&state.state_name)
            .bind(&state.service)
            .bind(state.block_change)
            .bind(state.block_entitlement)
            .bind(state.block_billing)
            .bind(state.effective_date.timestamp_millis())
            .bind(context.account_record_id)
            .bind(context.tenant_record_id)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        }

        let signal = BusEvent::BlockingStatesChanged(BlockingStatesChangedEvent {
            bundle_id,
            blocking_states: states.to_vec(),
            search_key1: context.account_record_id,
            search_key2: context.tenant_record_id,
            user_token: context.user_token,
        });
        insert_bus_event(&mut *tx, &signal, now).await?;

        tx.commit().await.map_err(map_sqlx_error)?;

        info!(
            bundle_id = %bundle_id,
            count = states.len(),
            "Blocking states persisted"
        );
        debug!(states = ?states.iter().map(|s| s.id).collect::<Vec<_>>(), "Persisted blocking state ids");
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct BlockingStateRow {
    id: String,
    blockable_id: String,
    blocking_type: String,
    state_name: String,
    service: String,
    block_change: bool,
    block_entitlement: bool,
    block_billing: bool,
    effective_date: i64,
}

impl BlockingStateRow {
    fn into_state(self) -> Result<BlockingState> {
        Ok(BlockingState {
            id: parse_uuid("blocking_states.id", &self.id)?,
            blocked_id: parse_uuid("blocking_states.blockable_id", &self.blockable_id)?,
            blocking_type: self
                .blocking_type
                .parse::<BlockingType>()
                .map_err(AppError::from)?,
            state_name: self.state_name,
            service: self.service,
            block_change: self.block_change,
            block_entitlement: self.block_entitlement,
            block_billing: self.block_billing,
            effective_date: from_millis("blocking_states.effective_date", self.effective_date)?,
        })
    }
}
