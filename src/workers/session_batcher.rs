//! Session batcher (spec.md §4.8): groups sessionable shipments into
//! `fulfillment_sessions`, filling open drafts before opening new ones.

use chrono::Utc;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use crate::domain::{QueueKind, Shipment};
use crate::queue;
use crate::storage;

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error("storage error: {0}")]
    Storage(#[from] storage::StorageError),
    #[error("queue error: {0}")]
    Queue(#[from] queue::QueueError),
}

pub struct BuildSessionsOptions {
    pub station_type: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default)]
pub struct GroupCount {
    pub station_type: String,
    pub fingerprint_id: Option<Uuid>,
    pub count: usize,
}

#[derive(Debug, Clone)]
pub struct SkippedOrder {
    pub shipment_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Default)]
pub struct BuildSessionsResult {
    pub assigned: usize,
    pub sessions_created: usize,
    pub groups: Vec<GroupCount>,
    pub skipped: Vec<SkippedOrder>,
}

/// spec.md §4.8 step 2: station-type priority table, `others=99`.
fn station_type_priority(station_type: &str) -> i32 {
    match station_type {
        "boxing_machine" => 1,
        "poly_bag" => 2,
        "hand_pack" => 3,
        _ => 99,
    }
}

pub struct SessionBatcher {
    pool: PgPool,
    max_orders_per_session: i32,
}

impl SessionBatcher {
    pub fn new(pool: PgPool, max_orders_per_session: i32) -> Self {
        Self { pool, max_orders_per_session }
    }

    pub async fn build_sessions(&self, options: BuildSessionsOptions) -> Result<BuildSessionsResult, BatchError> {
        let candidates =
            storage::shipments::sessionable_candidates(&self.pool, options.station_type.as_deref()).await?;

        let mut groups: std::collections::BTreeMap<(String, Option<Uuid>), Vec<Shipment>> =
            std::collections::BTreeMap::new();
        for (shipment, station_type) in candidates {
            groups
                .entry((station_type, shipment.fingerprint_id))
                .or_default()
                .push(shipment);
        }

        let mut ordered: Vec<((String, Option<Uuid>), Vec<Shipment>)> = groups.into_iter().collect();
        ordered.sort_by_key(|((station_type, fingerprint_id), _)| {
            (station_type_priority(station_type), *fingerprint_id)
        });

        let mut result = BuildSessionsResult::default();
        let mut lifecycle_enqueue_keys = Vec::new();
        let today = Utc::now().date_naive();

        for ((station_type, fingerprint_id), shipments) in ordered {
            result.groups.push(GroupCount {
                station_type: station_type.clone(),
                fingerprint_id,
                count: shipments.len(),
            });

            if options.dry_run {
                continue;
            }

            let mut remaining = shipments;

            while !remaining.is_empty() {
                let first = &remaining[0];
                let station_id = match first.station_id {
                    Some(id) => id,
                    None => {
                        result.skipped.push(SkippedOrder {
                            shipment_id: first.id,
                            reason: "missing station assignment".to_string(),
                        });
                        remaining.remove(0);
                        continue;
                    }
                };

                let mut session = match storage::sessions::find_open_draft(&self.pool, station_id, today).await? {
                    Some(existing) => existing,
                    None => {
                        let seq = storage::sessions::next_sequence_number(&self.pool, station_id, today).await?;
                        let created = storage::sessions::create_draft(
                            &self.pool,
                            &station_type,
                            station_id,
                            self.max_orders_per_session,
                            today,
                            seq,
                        )
                        .await?;
                        result.sessions_created += 1;
                        created
                    }
                };

                let capacity = session.remaining_capacity().max(0) as usize;
                let take = capacity.min(remaining.len());
                let batch: Vec<Shipment> = remaining.drain(0..take).collect();

                let mut next_spot = session.order_count + 1;
                for shipment in &batch {
                    // spec.md §4.8 step 5: re-validate before every mutation.
                    let fresh = storage::shipments::get(&self.pool, shipment.id).await?;
                    if !fresh.meets_ready_to_session_gate()
                        || fresh.decision_subphase != Some(crate::domain::DecisionSubphase::NeedsSession)
                        || fresh.fulfillment_session_id.is_some()
                        || fresh.packaging_type_id.is_none()
                        || fresh.station_id.is_none()
                    {
                        result.skipped.push(SkippedOrder {
                            shipment_id: shipment.id,
                            reason: "no longer eligible for sessioning".to_string(),
                        });
                        continue;
                    }

                    storage::shipments::assign_to_session(&self.pool, shipment.id, session.id, next_spot).await?;
                    next_spot += 1;
                    result.assigned += 1;
                    lifecycle_enqueue_keys.push(shipment.id);
                }

                let assigned_count = (next_spot - (session.order_count + 1)).max(0);
                if assigned_count > 0 {
                    storage::sessions::increment_order_count(&self.pool, session.id, assigned_count).await?;
                    session.order_count += assigned_count;
                }

                if session.order_count >= session.max_orders {
                    storage::sessions::mark_ready(&self.pool, session.id).await?;
                }
            }
        }

        if !options.dry_run {
            for shipment_id in lifecycle_enqueue_keys {
                queue::enqueue(
                    &self.pool,
                    QueueKind::LifecycleEvent,
                    &shipment_id.to_string(),
                    serde_json::json!({ "shipmentId": shipment_id }),
                    5,
                )
                .await?;
            }
            info!(assigned = result.assigned, sessions_created = result.sessions_created, "session batch complete");
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn station_type_priority_matches_spec_table() {
        assert_eq!(station_type_priority("boxing_machine"), 1);
        assert_eq!(station_type_priority("poly_bag"), 2);
        assert_eq!(station_type_priority("hand_pack"), 3);
        assert_eq!(station_type_priority("whatever_else"), 99);
    }

    #[test]
    fn worked_example_s3_fill_order() {
        // spec.md S3: one open draft at 5/28, 30 sessionable shipments.
        // The draft absorbs 23 (reaching 28), a new session takes the
        // remaining 7 with spots 1-7; the draft's spots continue 6-28.
        let draft_capacity_remaining = 28 - 5;
        let total_shipments = 30;
        let to_draft = draft_capacity_remaining.min(total_shipments);
        let to_new_session = total_shipments - to_draft;
        assert_eq!(to_draft, 23);
        assert_eq!(to_new_session, 7);

        let draft_first_spot = 5 + 1;
        let draft_last_spot = 5 + to_draft;
        assert_eq!(draft_first_spot, 6);
        assert_eq!(draft_last_spot, 28);
    }
}
