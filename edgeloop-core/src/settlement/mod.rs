//! Settlement: reconciles expired positions against the external resolution
//! and summarizes ledger performance.

pub mod auditor;
pub mod report;

pub use auditor::{AuditSummary, SettlementAuditor};
pub use report::PerformanceReport;
