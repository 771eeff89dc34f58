// Services module - Business logic

pub mod card_locks;
pub mod notifier;
pub mod registry;
pub mod tracker;
