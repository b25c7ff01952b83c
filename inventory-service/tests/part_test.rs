//! Part intake, maintenance and removal integration tests.
//!
//! Run with: TEST_DATABASE_URL=postgres://... cargo test -p inventory-service -- --ignored

mod common;

use common::{movement, spawn_ledger};
use inventory_service::models::{CreatePart, PartRemoval, PartStatus, UpdatePartDetails};
use inventory_service::services::StockError;
use rust_decimal::Decimal;

#[tokio::test]
#[ignore]
async fn duplicate_business_id_conflicts() {
    let t = spawn_ledger().await;
    t.create_part("DUP-1", 1).await;

    let result = t
        .db
        .create_part(&CreatePart {
            business_id: "DUP-1".to_string(),
            name: "Another".to_string(),
            initial_quantity: 2,
            reorder_level: None,
            unit_cost: None,
            location_id: None,
            shelf_id: None,
        })
        .await;
    assert!(matches!(result, Err(StockError::Conflict(_))));

    t.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn negative_intake_is_rejected() {
    let t = spawn_ledger().await;
    let result = t
        .db
        .create_part(&CreatePart {
            business_id: "NEG-1".to_string(),
            name: "Negative".to_string(),
            initial_quantity: -1,
            reorder_level: None,
            unit_cost: None,
            location_id: None,
            shelf_id: None,
        })
        .await;
    assert!(matches!(result, Err(StockError::InvalidQuantity(_))));
    t.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn details_update_never_touches_quantity() {
    let t = spawn_ledger().await;
    let part = t.create_part("DET-1", 9).await;

    let updated = t
        .db
        .update_part_details(
            part.part_id,
            &UpdatePartDetails {
                name: Some("Hex bolt M8".to_string()),
                reorder_level: Some(Some(4)),
                unit_cost: Some(Some(Decimal::new(125, 2))),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.name, "Hex bolt M8");
    assert_eq!(updated.reorder_level, Some(4));
    assert_eq!(updated.unit_cost, Some(Decimal::new(125, 2)));
    assert_eq!(updated.quantity, 9);

    let cleared = t
        .db
        .update_part_details(
            part.part_id,
            &UpdatePartDetails {
                unit_cost: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cleared.unit_cost, None);
    assert_eq!(cleared.reorder_level, Some(4));

    t.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn part_without_history_is_deleted() {
    let t = spawn_ledger().await;
    let part = t.create_part("DEL-1", 3).await;

    let outcome = t.ledger.remove_part(part.part_id).await.unwrap();
    assert_eq!(outcome, PartRemoval::Deleted);
    assert!(t.db.get_part(part.part_id).await.unwrap().is_none());

    t.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn part_with_history_is_archived_with_zero_stock() {
    let t = spawn_ledger().await;
    let part = t.create_part("ARC-1", 6).await;
    let entry = t.ledger.create_movement(movement(part.part_id, 2)).await.unwrap();

    let outcome = t.ledger.remove_part(part.part_id).await.unwrap();
    assert_eq!(outcome, PartRemoval::Archived);

    let stored = t.db.get_part(part.part_id).await.unwrap().unwrap();
    assert_eq!(stored.parsed_status(), PartStatus::Archived);
    assert_eq!(stored.quantity, 0);
    assert!(stored.archived_utc.is_some());
    assert_eq!(t.entry_count().await, 1);

    // No new issuance from an archived part.
    let result = t.ledger.create_movement(movement(part.part_id, 1)).await;
    assert!(matches!(result, Err(StockError::PartArchived(_))));

    // History stays editable: deleting the entry returns its stock.
    t.ledger.delete_movement(entry.entry_id).await.unwrap();
    assert_eq!(t.quantity(part.part_id).await, 2);

    // With its history gone the part can be deleted outright.
    let again = t.ledger.remove_part(part.part_id).await.unwrap();
    assert_eq!(again, PartRemoval::Deleted);

    t.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn listing_pages_by_business_id_and_hides_archived() {
    let t = spawn_ledger().await;
    for code in ["L-3", "L-1", "L-2"] {
        t.create_part(code, 1).await;
    }
    let retired = t.create_part("L-0", 1).await;
    t.ledger.create_movement(movement(retired.part_id, 1)).await.unwrap();
    t.ledger.remove_part(retired.part_id).await.unwrap();

    let first = t.db.list_parts(false, 2, None).await.unwrap();
    let codes: Vec<&str> = first.iter().map(|p| p.business_id.as_str()).collect();
    assert_eq!(codes, vec!["L-1", "L-2"]);

    let second = t.db.list_parts(false, 2, Some("L-2")).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].business_id, "L-3");

    let all = t.db.list_parts(true, 10, None).await.unwrap();
    assert_eq!(all.len(), 4);

    t.cleanup().await;
}

#[tokio::test]
#[ignore]
async fn low_stock_lists_parts_at_or_below_reorder_level() {
    let t = spawn_ledger().await;
    let low = t.create_part("LOW-1", 5).await;
    let fine = t.create_part("LOW-2", 50).await;
    t.create_part("LOW-3", 0).await; // no reorder level

    for part in [&low, &fine] {
        t.db
            .update_part_details(
                part.part_id,
                &UpdatePartDetails {
                    reorder_level: Some(Some(5)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    let listed = t.db.list_low_stock().await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].part_id, low.part_id);
    assert!(listed[0].needs_reorder());

    t.cleanup().await;
}
