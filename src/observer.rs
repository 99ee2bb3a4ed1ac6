//! Hooks for reporting query plans.

use crate::transaction::TransactionId;
use log::info;

/// Receives the physical plan chosen for a transaction's query.
///
/// Called synchronously by whatever builds the plan; implementations should
/// return quickly.
pub trait QueryPlanObserver: Send + Sync {
    fn on_physical_plan(&self, tid: TransactionId, plan: &str);
}

/// Ignores every plan.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl QueryPlanObserver for NoopObserver {
    fn on_physical_plan(&self, _tid: TransactionId, _plan: &str) {}
}

/// Writes every plan to the log at `info` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl QueryPlanObserver for LoggingObserver {
    fn on_physical_plan(&self, tid: TransactionId, plan: &str) {
        info!("{} plan: {}", tid, plan);
    }
}
