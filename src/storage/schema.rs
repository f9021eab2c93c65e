//! `sea_query::Iden` column identifiers for tables the core mutates through
//! dynamically built statements, mirroring the teacher's
//! `storage::schema::Snapshots` style (one `Iden` enum per table, variants
//! matching column names, `to_string` gives the snake_case column name via
//! `#[derive(Iden)]`'s default rendering).

use sea_query::Iden;

#[derive(Iden)]
pub enum Shipments {
    Table,
    Id,
    ExternalShipmentKey,
    ExternalOrderNumber,
    Carrier,
    ServiceCode,
    DestinationPostalCode,
    DestinationState,
    TrackingNumber,
    ShipmentStatus,
    DeliveryStatusCode,
    SessionStatus,
    LifecyclePhase,
    DecisionSubphase,
    #[iden = "fingerprint_status"]
    FingerprintStatus,
    FingerprintId,
    PackagingTypeId,
    StationId,
    FulfillmentSessionId,
    SmartSessionSpot,
    RateCheckStatus,
    ProactiveHydration,
    HasMoveOverTag,
    Cancelled,
    ExternalSessionId,
    ExternalDocumentId,
    #[iden = "picked_by_user_id"]
    PickedByUserId,
    #[iden = "picked_by_user_name"]
    PickedByUserName,
    #[iden = "saved_custom_field_2"]
    SavedCustomField2,
    PickStartedAt,
    PickEndedAt,
    ShippedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum QueueRecords {
    Table,
    Id,
    Kind,
    CorrelationKey,
    Payload,
    Status,
    RetryCount,
    MaxRetries,
    NextRetryAt,
    LastError,
    LastHttpStatus,
    ProcessedAt,
    CreatedAt,
}

#[derive(Iden)]
pub enum RateAnalyses {
    Table,
    Id,
    ShipmentId,
    #[iden = "external_shipment_key"]
    ExternalShipmentKey,
    SmartShippingMethod,
    Savings,
    Reasoning,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
pub enum FulfillmentSessions {
    Table,
    Id,
    StationType,
    StationId,
    OrderCount,
    MaxOrders,
    Status,
    SequenceNumber,
    DayKey,
    ReadyAt,
    PickingAt,
    PackingAt,
    CompletedAt,
    CreatedAt,
}
