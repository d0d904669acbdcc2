// Domain Layer - Pure business logic and entities

pub mod blocking;
pub mod context;
pub mod entitlement;
pub mod error;
pub mod event;
pub mod notification;

// Re-exports
pub use blocking::{BlockingState, BlockingStateId, BlockingType};
pub use context::{CallOrigin, InternalCallContext, UserType};
pub use entitlement::{
    AddOn, AddOnBlockingPlan, BundleId, Entitlement, EntitlementId, PluginProperty,
    ProductCategory, ENTITLEMENT_SERVICE_NAME,
};
pub use error::DomainError;
pub use event::{BlockingStatesChangedEvent, BlockingTransitionInternalEvent, BusEvent};
pub use notification::{
    BlockingTransitionKey, DecodedNotification, EntitlementAction, EntitlementActionKey,
    NotificationKey, NotificationKind, NotificationPayload,
};
