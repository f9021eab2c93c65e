//! Background workers (spec.md §4.5-§4.9): each is a long-lived polling
//! loop over the durable queue and the row store, grounded in the
//! teacher's `services::timeout_scheduler::TimeoutScheduler::run` shape
//! (`tokio::time::interval` + `loop { ticker.tick().await; ... }`, guard
//! each iteration so a handler error never kills the loop).

pub mod lifecycle_worker;
pub mod qc_explosion_worker;
pub mod rate_check;
pub mod repair_worker;
pub mod session_batcher;
pub mod session_sync_worker;
