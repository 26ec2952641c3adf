use serde::{Deserialize, Serialize};

use super::commands::OrderCommand;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Status State Machine
// ============================================================================
//
//   Created ──pay──► Paid ──assign_courier──► GivenToCourier ──deliver──► Delivered
//      │              │ └───────────deliver────────────────────────────────▲
//      └───cancel─────┴──cancel──► Cancelled
//
// The table is a pure function of (policy, current status, command). All
// side effects (courier lookup, persistence) live in the command handler.
//
// ============================================================================

const FROM_CREATED: &[OrderStatus] = &[OrderStatus::Created];
const FROM_PAID: &[OrderStatus] = &[OrderStatus::Paid];
const FROM_CREATED_OR_PAID: &[OrderStatus] = &[OrderStatus::Created, OrderStatus::Paid];
const FROM_GIVEN_TO_COURIER: &[OrderStatus] = &[OrderStatus::GivenToCourier];
const FROM_PAID_OR_GIVEN_TO_COURIER: &[OrderStatus] =
    &[OrderStatus::Paid, OrderStatus::GivenToCourier];

/// Guards that differ between deployments.
///
/// The default reproduces the reference table: Cancel from `Created` or
/// `Paid`, Deliver from `Paid` or `GivenToCourier`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPolicy {
    /// Deliver only after the order was handed to a courier
    pub deliver_requires_courier: bool,
    /// Allow cancelling an order that has already been paid
    pub cancel_after_payment: bool,
}

impl Default for TransitionPolicy {
    fn default() -> Self {
        Self {
            deliver_requires_courier: false,
            cancel_after_payment: true,
        }
    }
}

impl TransitionPolicy {
    /// Statuses from which `command` is accepted
    pub fn allowed_sources(&self, command: &OrderCommand) -> &'static [OrderStatus] {
        match command {
            OrderCommand::Pay => FROM_CREATED,
            OrderCommand::Cancel if self.cancel_after_payment => FROM_CREATED_OR_PAID,
            OrderCommand::Cancel => FROM_CREATED,
            OrderCommand::AssignCourier { .. } => FROM_PAID,
            OrderCommand::Deliver if self.deliver_requires_courier => FROM_GIVEN_TO_COURIER,
            OrderCommand::Deliver => FROM_PAID_OR_GIVEN_TO_COURIER,
        }
    }

    /// Status reached by applying `command` from `from`, or `None` when the
    /// edge does not exist.
    pub fn next_status(&self, from: OrderStatus, command: &OrderCommand) -> Option<OrderStatus> {
        if !self.allowed_sources(command).contains(&from) {
            return None;
        }

        Some(match command {
            OrderCommand::Pay => OrderStatus::Paid,
            OrderCommand::Cancel => OrderStatus::Cancelled,
            OrderCommand::AssignCourier { .. } => OrderStatus::GivenToCourier,
            OrderCommand::Deliver => OrderStatus::Delivered,
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::CourierId;

    fn all_commands() -> Vec<OrderCommand> {
        vec![
            OrderCommand::Pay,
            OrderCommand::Cancel,
            OrderCommand::AssignCourier { courier_id: CourierId(7) },
            OrderCommand::Deliver,
        ]
    }

    #[test]
    fn test_reference_table() {
        let policy = TransitionPolicy::default();
        let courier = OrderCommand::AssignCourier { courier_id: CourierId(7) };

        assert_eq!(policy.next_status(OrderStatus::Created, &OrderCommand::Pay), Some(OrderStatus::Paid));
        assert_eq!(policy.next_status(OrderStatus::Created, &OrderCommand::Cancel), Some(OrderStatus::Cancelled));
        assert_eq!(policy.next_status(OrderStatus::Paid, &OrderCommand::Cancel), Some(OrderStatus::Cancelled));
        assert_eq!(policy.next_status(OrderStatus::Paid, &courier), Some(OrderStatus::GivenToCourier));
        assert_eq!(policy.next_status(OrderStatus::Paid, &OrderCommand::Deliver), Some(OrderStatus::Delivered));
        assert_eq!(
            policy.next_status(OrderStatus::GivenToCourier, &OrderCommand::Deliver),
            Some(OrderStatus::Delivered)
        );
    }

    #[test]
    fn test_edge_count_matches_table() {
        let policy = TransitionPolicy::default();
        let edges = OrderStatus::ALL
            .iter()
            .flat_map(|from| all_commands().into_iter().map(move |cmd| (*from, cmd)))
            .filter(|(from, cmd)| policy.next_status(*from, cmd).is_some())
            .count();

        assert_eq!(edges, 6);
    }

    #[test]
    fn test_terminal_states_have_no_outgoing_edges() {
        for policy in [
            TransitionPolicy::default(),
            TransitionPolicy { deliver_requires_courier: true, cancel_after_payment: false },
        ] {
            for command in all_commands() {
                assert_eq!(policy.next_status(OrderStatus::Delivered, &command), None);
                assert_eq!(policy.next_status(OrderStatus::Cancelled, &command), None);
            }
        }
    }

    #[test]
    fn test_cannot_cancel_after_courier_pickup() {
        let policy = TransitionPolicy::default();
        assert_eq!(policy.next_status(OrderStatus::GivenToCourier, &OrderCommand::Cancel), None);
    }

    #[test]
    fn test_strict_policy_requires_courier_for_delivery() {
        let policy = TransitionPolicy { deliver_requires_courier: true, ..Default::default() };

        assert_eq!(policy.next_status(OrderStatus::Paid, &OrderCommand::Deliver), None);
        assert_eq!(
            policy.next_status(OrderStatus::GivenToCourier, &OrderCommand::Deliver),
            Some(OrderStatus::Delivered)
        );
    }

    #[test]
    fn test_policy_without_paid_cancellation() {
        let policy = TransitionPolicy { cancel_after_payment: false, ..Default::default() };

        assert_eq!(policy.next_status(OrderStatus::Paid, &OrderCommand::Cancel), None);
        assert_eq!(
            policy.next_status(OrderStatus::Created, &OrderCommand::Cancel),
            Some(OrderStatus::Cancelled)
        );
    }
}
