// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (ids, OrderStatus, OrderLineItem, cart lines)
// - Events (OrderCreated, Paid, Cancelled, CourierAssigned, Delivered)
// - Commands (Pay, Cancel, AssignCourier, Deliver)
// - Errors (OrderError enum)
// - State machine (TransitionPolicy and the transition table)
// - Aggregate (Order snapshot with business rules)
// - Command Handler (OrderLifecycleEngine)
//
// Persistence lives behind the traits in `crate::storage`.
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod state_machine;
pub mod aggregate;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use state_machine::*;
pub use aggregate::*;
pub use command_handler::*;
