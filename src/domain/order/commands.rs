use std::fmt;

use serde::{Deserialize, Serialize};

use super::value_objects::CourierId;

// ============================================================================
// Order Commands - Staff and customer intent on an existing order
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderCommand {
    Pay,
    Cancel,
    AssignCourier { courier_id: CourierId },
    Deliver,
}

impl OrderCommand {
    /// Stable label used in logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::Pay => "pay",
            OrderCommand::Cancel => "cancel",
            OrderCommand::AssignCourier { .. } => "assign_courier",
            OrderCommand::Deliver => "deliver",
        }
    }
}

impl fmt::Display for OrderCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderCommand::AssignCourier { courier_id } => {
                write!(f, "assign_courier({})", courier_id)
            }
            other => f.write_str(other.name()),
        }
    }
}
