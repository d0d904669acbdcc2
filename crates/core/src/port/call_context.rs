// Call Context Factory Port

use crate::domain::{CallOrigin, InternalCallContext, UserType};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use chrono::{FixedOffset, Offset, Utc};
use uuid::Uuid;

/// Builds request-scoped contexts from the scalar fields carried by a notification
#[async_trait]
pub trait InternalCallContextFactory: Send + Sync {
    async fn create_internal_call_context(
        &self,
        tenant_record_id: Option<i64>,
        account_record_id: Option<i64>,
        user_name: &str,
        call_origin: CallOrigin,
        user_type: UserType,
        user_token: Option<Uuid>,
    ) -> Result<InternalCallContext>;
}

/// Every account shares one reference time zone
pub struct FixedOffsetCallContextFactory {
    time_zone: FixedOffset,
}

impl FixedOffsetCallContextFactory {
    pub fn new(offset_secs: i32) -> Result<Self> {
        let time_zone = FixedOffset::east_opt(offset_secs).ok_or_else(|| {
            AppError::Config(format!("time zone offset out of range: {}s", offset_secs))
        })?;
        Ok(Self { time_zone })
    }

    pub fn utc() -> Self {
        Self {
            time_zone: Utc.fix(),
        }
    }
}

#[async_trait]
impl InternalCallContextFactory for FixedOffsetCallContextFactory {
    async fn create_internal_call_context(
        &self,
        tenant_record_id: Option<i64>,
        account_record_id: Option<i64>,
        user_name: &str,
        call_origin: CallOrigin,
        user_type: UserType,
        user_token: Option<Uuid>,
    ) -> Result<InternalCallContext> {
        Ok(InternalCallContext {
            tenant_record_id,
            account_record_id,
            user_token,
            created_by: user_name.to_string(),
            call_origin,
            user_type,
            time_zone: self.time_zone,
        })
    }
}
