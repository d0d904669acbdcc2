// SQLite EntitlementInternalApi Implementation
//
// Reads entitlements from `entitlements`; pause/resume are bundle-level
// blocking states written through the blocking-state DAO so they carry the
// same state-changed signal as add-on blocks.

use crate::error::{from_millis, map_sqlx_error, parse_uuid};
use async_trait::async_trait;
use chrono::NaiveDate;
use entitlement_core::domain::entitlement::{ENT_BLOCKED, ENT_CANCELLED, ENT_CLEAR};
use entitlement_core::domain::{
    AddOn, BlockingState, BlockingType, BundleId, DomainError, Entitlement, EntitlementId,
    InternalCallContext, PluginProperty, ProductCategory, ENTITLEMENT_SERVICE_NAME,
};
use entitlement_core::error::{AppError, Result};
use entitlement_core::port::{BlockingStateDao, EntitlementInternalApi, IdProvider, TimeProvider};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{debug, info};

pub struct SqliteEntitlementApi {
    pool: SqlitePool,
    blocking_state_dao: Arc<dyn BlockingStateDao>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SqliteEntitlementApi {
    pub fn new(
        pool: SqlitePool,
        blocking_state_dao: Arc<dyn BlockingStateDao>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            pool,
            blocking_state_dao,
            id_provider,
            time_provider,
        }
    }

    /// Register an entitlement row (provisioning and tests)
    pub async fn insert(
        &self,
        entitlement: &Entitlement,
        available_on_base_plan: bool,
        context: &InternalCallContext,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO entitlements (
                id, bundle_id, category, available_on_base_plan, cancelled_date,
                account_record_id, tenant_record_id
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entitlement.id.to_string())
        .bind(entitlement.bundle_id.to_string())
        .bind(entitlement.category.to_string())
        .bind(available_on_base_plan)
        .bind(entitlement.cancelled_date.map(|d| d.timestamp_millis()))
        .bind(context.account_record_id)
        .bind(context.tenant_record_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn bundle_exists(&self, bundle_id: BundleId) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entitlements WHERE bundle_id = ?")
            .bind(bundle_id.to_string())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(count > 0)
    }

    /// An add-on counts as blocked once an ENT_CANCELLED state is in effect;
    /// a future one is recomputed (and upserted) on every evaluation
    async fn load_add_ons(&self, bundle_id: BundleId) -> Result<Vec<AddOn>> {
        let rows = sqlx::query_as::<_, AddOnRow>(
            r#"
            SELECT e.id, e.available_on_base_plan,
                   EXISTS (
                       SELECT 1 FROM blocking_states b
                       WHERE b.blockable_id = e.id AND b.service = ? AND b.state_name = ?
                         AND b.effective_date <= ?
                   ) AS blocked
            FROM entitlements e
            WHERE e.bundle_id = ? AND e.category = ?
            ORDER BY e.id ASC
            "#,
        )
        .bind(ENTITLEMENT_SERVICE_NAME)
        .bind(ENT_CANCELLED)
        .bind(self.time_provider.now_millis())
        .bind(bundle_id.to_string())
        .bind(ProductCategory::AddOn.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                Ok(AddOn {
                    id: parse_uuid("entitlements.id", &row.id)?,
                    available_on_base_plan: row.available_on_base_plan,
                    blocked: row.blocked,
                })
            })
            .collect()
    }

    /// Write a bundle-level state at the first instant of the local date
    async fn set_bundle_state(
        &self,
        bundle_id: BundleId,
        local_effective_date: NaiveDate,
        state_name: &str,
        blocked: bool,
        properties: &[PluginProperty],
        context: &InternalCallContext,
    ) -> Result<()> {
        if !self.bundle_exists(bundle_id).await? {
            return Err(AppError::NotFound(format!("bundle {}", bundle_id)));
        }
        debug!(
            bundle_id = %bundle_id,
            properties = properties.len(),
            "Plugin properties are not interpreted by the SQLite adapter"
        );

        let state = BlockingState {
            id: self.id_provider.generate_id(),
            blocked_id: bundle_id,
            blocking_type: BlockingType::SubscriptionBundle,
            state_name: state_name.to_string(),
            service: ENTITLEMENT_SERVICE_NAME.to_string(),
            block_change: blocked,
            block_entitlement: blocked,
            block_billing: blocked,
            effective_date: context.to_utc_start_of_day(local_effective_date),
        };
        self.blocking_state_dao
            .set_blocking_states_and_post_blocking_transition_event(&[state], bundle_id, context)
            .await?;

        info!(
            bundle_id = %bundle_id,
            state = state_name,
            local_effective_date = %local_effective_date,
            "Bundle blocking state written"
        );
        Ok(())
    }
}

#[async_trait]
impl EntitlementInternalApi for SqliteEntitlementApi {
    async fn get_entitlement_for_id(
        &self,
        entitlement_id: EntitlementId,
        context: &InternalCallContext,
    ) -> Result<Entitlement> {
        let row = sqlx::query_as::<_, EntitlementRow>(
            r#"
            SELECT id, bundle_id, category, cancelled_date FROM entitlements
            WHERE id = ?
              AND (? IS NULL OR tenant_record_id IS NULL OR tenant_record_id = ?)
            "#,
        )
        .bind(entitlement_id.to_string())
        .bind(context.tenant_record_id)
        .bind(context.tenant_record_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(DomainError::EntitlementNotFound(entitlement_id))?;

        let category = row
            .category
            .parse::<ProductCategory>()
            .map_err(AppError::from)?;
        let bundle_id = parse_uuid("entitlements.bundle_id", &row.bundle_id)?;
        let add_ons = if category == ProductCategory::Base {
            self.load_add_ons(bundle_id).await?
        } else {
            Vec::new()
        };

        Ok(Entitlement {
            id: parse_uuid("entitlements.id", &row.id)?,
            bundle_id,
            category,
            cancelled_date: row
                .cancelled_date
                .map(|millis| from_millis("entitlements.cancelled_date", millis))
                .transpose()?,
            add_ons,
        })
    }

    async fn pause(
        &self,
        bundle_id: BundleId,
        local_effective_date: NaiveDate,
        properties: &[PluginProperty],
        context: &InternalCallContext,
    ) -> Result<()> {
        self.set_bundle_state(bundle_id, local_effective_date, ENT_BLOCKED, true, properties, context)
            .await
    }

    async fn resume(
        &self,
        bundle_id: BundleId,
        local_effective_date: NaiveDate,
        properties: &[PluginProperty],
        context: &InternalCallContext,
    ) -> Result<()> {
        self.set_bundle_state(bundle_id, local_effective_date, ENT_CLEAR, false, properties, context)
            .await
    }
}

#[derive(sqlx::FromRow)]
struct EntitlementRow {
    id: String,
    bundle_id: String,
    category: String,
    cancelled_date: Option<i64>,
}

#[derive(sqlx::FromRow)]
struct AddOnRow {
    id: String,
    available_on_base_plan: bool,
    blocked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{create_pool, run_migrations, SqliteBlockingStateDao};
    use chrono::{FixedOffset, TimeZone, Utc};
    use entitlement_core::domain::{CallOrigin, UserType};
    use entitlement_core::port::id_provider::UuidProvider;
    use entitlement_core::port::time_provider::SystemTimeProvider;
    use uuid::Uuid;

    struct Fixture {
        api: SqliteEntitlementApi,
        dao: Arc<SqliteBlockingStateDao>,
    }

    async fn setup() -> Fixture {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        let dao = Arc::new(SqliteBlockingStateDao::new(
            pool.clone(),
            Arc::new(SystemTimeProvider),
        ));
        let api = SqliteEntitlementApi::new(
            pool,
            dao.clone(),
            Arc::new(UuidProvider),
            Arc::new(SystemTimeProvider),
        );
        Fixture { api, dao }
    }

    fn context(offset_secs: i32) -> InternalCallContext {
        InternalCallContext {
            tenant_record_id: Some(1),
            account_record_id: Some(2),
            user_token: None,
            created_by: "test".to_string(),
            call_origin: CallOrigin::Internal,
            user_type: UserType::System,
            time_zone: FixedOffset::east_opt(offset_secs).unwrap(),
        }
    }

    fn entitlement(bundle_id: Uuid, category: ProductCategory) -> Entitlement {
        Entitlement {
            id: Uuid::new_v4(),
            bundle_id,
            category,
            cancelled_date: None,
            add_ons: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_base_entitlement_loads_bundle_add_ons() {
        let f = setup().await;
        let ctx = context(0);
        let bundle = Uuid::new_v4();
        let base = entitlement(bundle, ProductCategory::Base);
        let add_on = entitlement(bundle, ProductCategory::AddOn);
        f.api.insert(&base, true, &ctx).await.unwrap();
        f.api.insert(&add_on, false, &ctx).await.unwrap();

        let loaded = f.api.get_entitlement_for_id(base.id, &ctx).await.unwrap();

        assert_eq!(loaded.bundle_id, bundle);
        assert_eq!(
            loaded.add_ons,
            vec![AddOn {
                id: add_on.id,
                available_on_base_plan: false,
                blocked: false,
            }]
        );
    }

    #[tokio::test]
    async fn test_add_on_is_blocked_only_once_cancellation_is_in_effect() {
        let f = setup().await;
        let ctx = context(0);
        let bundle = Uuid::new_v4();
        let base = entitlement(bundle, ProductCategory::Base);
        let past = entitlement(bundle, ProductCategory::AddOn);
        let future = entitlement(bundle, ProductCategory::AddOn);
        for (e, available) in [(&base, true), (&past, true), (&future, true)] {
            f.api.insert(e, available, &ctx).await.unwrap();
        }
        let cancelled = |blocked_id, effective_date| BlockingState {
            id: Uuid::new_v4(),
            blocked_id,
            blocking_type: BlockingType::Subscription,
            state_name: ENT_CANCELLED.to_string(),
            service: ENTITLEMENT_SERVICE_NAME.to_string(),
            block_change: true,
            block_entitlement: true,
            block_billing: true,
            effective_date,
        };
        f.dao
            .set_blocking_states_and_post_blocking_transition_event(
                &[
                    cancelled(past.id, Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap()),
                    cancelled(future.id, Utc.with_ymd_and_hms(2100, 1, 1, 0, 0, 0).unwrap()),
                ],
                bundle,
                &ctx,
            )
            .await
            .unwrap();

        let loaded = f.api.get_entitlement_for_id(base.id, &ctx).await.unwrap();

        let blocked = |id| loaded.add_ons.iter().find(|a| a.id == id).unwrap().blocked;
        assert!(blocked(past.id));
        assert!(!blocked(future.id));
    }

    #[tokio::test]
    async fn test_missing_entitlement_is_domain_error() {
        let f = setup().await;
        let id = Uuid::new_v4();

        let result = f.api.get_entitlement_for_id(id, &context(0)).await;

        assert!(matches!(
            result,
            Err(AppError::Domain(DomainError::EntitlementNotFound(missing))) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_pause_writes_bundle_state_at_local_midnight() {
        let f = setup().await;
        // UTC-05:00 account
        let ctx = context(-5 * 3600);
        let bundle = Uuid::new_v4();
        f.api
            .insert(&entitlement(bundle, ProductCategory::Base), true, &ctx)
            .await
            .unwrap();

        f.api
            .pause(bundle, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), &[], &ctx)
            .await
            .unwrap();

        let states = f.dao.get_for_blockable(bundle).await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].state_name, ENT_BLOCKED);
        assert_eq!(states[0].blocking_type, BlockingType::SubscriptionBundle);
        assert!(states[0].block_billing);
        assert_eq!(
            states[0].effective_date,
            Utc.with_ymd_and_hms(2024, 3, 1, 5, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn test_resume_clears_bundle() {
        let f = setup().await;
        let ctx = context(0);
        let bundle = Uuid::new_v4();
        f.api
            .insert(&entitlement(bundle, ProductCategory::Base), true, &ctx)
            .await
            .unwrap();

        f.api
            .resume(bundle, NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(), &[], &ctx)
            .await
            .unwrap();

        let states = f.dao.get_for_blockable(bundle).await.unwrap();
        assert_eq!(states.len(), 1);
        assert_eq!(states[0].state_name, ENT_CLEAR);
        assert!(!states[0].block_change && !states[0].block_entitlement && !states[0].block_billing);
    }

    #[tokio::test]
    async fn test_pause_unknown_bundle_is_not_found() {
        let f = setup().await;

        let result = f
            .api
            .pause(Uuid::new_v4(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(), &[], &context(0))
            .await;

        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
