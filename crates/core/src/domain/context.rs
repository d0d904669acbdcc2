// Call Context Domain Model

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOrigin {
    Internal,
    External,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserType {
    System,
    Admin,
    Customer,
}

/// Request-scoped tenant/account context; every downstream call is scoped by it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InternalCallContext {
    pub tenant_record_id: Option<i64>,
    pub account_record_id: Option<i64>,
    pub user_token: Option<Uuid>,
    pub created_by: String,
    pub call_origin: CallOrigin,
    pub user_type: UserType,
    /// Account reference time zone, used to map instants to calendar dates
    pub time_zone: FixedOffset,
}

impl InternalCallContext {
    /// Calendar date of `instant` in the account's time zone
    pub fn to_local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.time_zone).date_naive()
    }

    /// First instant of `date` in the account's time zone
    pub fn to_utc_start_of_day(&self, date: NaiveDate) -> DateTime<Utc> {
        (date.and_time(NaiveTime::MIN) - self.time_zone).and_utc()
    }
}
