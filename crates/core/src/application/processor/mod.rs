// Notification processors, one per NotificationKey variant

mod blocking_transition;
mod entitlement_action;

pub use blocking_transition::BlockingTransitionProcessor;
pub use entitlement_action::EntitlementActionProcessor;
