//! Behavioural suite every `ScanStore` backend must pass.
//!
//! Each check takes a fresh, uninitialized store and panics on the first
//! deviation. Backend crates call [`run_all`] from their own tests with a
//! factory that builds a new empty store per check.

use std::future::Future;

use crate::{
    scan::{NewScan, ScanLocation},
    store::{ScanStore, ScanStoreError},
};

/// Run every check, each against a store produced by `make`.
pub async fn run_all<S, F, Fut>(mut make: F)
where
    S: ScanStore,
    F: FnMut() -> Fut,
    Fut: Future<Output = S>,
{
    uninitialized_store_is_unavailable(&make().await).await;
    initialize_is_idempotent(&make().await).await;
    empty_store_lists_nothing(&make().await).await;
    add_then_find_returns_input(&make().await).await;
    full_precision_coordinates_are_exact(&make().await).await;
    list_is_newest_first(&make().await).await;
    equal_timestamps_keep_insertion_order(&make().await).await;
    delete_unknown_id_changes_nothing(&make().await).await;
    delete_removes_exactly_one(&make().await).await;
    ids_increase_after_deletions(&make().await).await;
    invalid_scan_is_rejected(&make().await).await;
    add_list_delete_scenario(&make().await).await;
}

fn scan_at(qr_data: &str, timestamp: i64) -> NewScan {
    NewScan::new(qr_data, timestamp)
}

async fn ready<S: ScanStore>(store: &S) {
    store.initialize().await.expect("initialize");
}

pub async fn uninitialized_store_is_unavailable<S: ScanStore>(store: &S) {
    let err = store.list_all().await.expect_err("list before initialize");
    assert!(matches!(err, ScanStoreError::Unavailable { .. }), "{err:?}");

    let err = store
        .add(scan_at("early", 1))
        .await
        .expect_err("add before initialize");
    assert!(matches!(err, ScanStoreError::Unavailable { .. }), "{err:?}");

    let err = store.find_by_id(1).await.expect_err("find before initialize");
    assert!(matches!(err, ScanStoreError::Unavailable { .. }), "{err:?}");

    let err = store
        .delete_by_id(1)
        .await
        .expect_err("delete before initialize");
    assert!(matches!(err, ScanStoreError::Unavailable { .. }), "{err:?}");
}

pub async fn initialize_is_idempotent<S: ScanStore>(store: &S) {
    ready(store).await;
    let id = store.add(scan_at("first", 10)).await.expect("add");
    store.initialize().await.expect("second initialize");

    let listed = store.list_all().await.expect("list");
    assert_eq!(listed.len(), 1, "re-initializing must not drop records");
    assert_eq!(listed[0].id, id);
}

pub async fn empty_store_lists_nothing<S: ScanStore>(store: &S) {
    ready(store).await;
    assert!(store.list_all().await.expect("list").is_empty());
    assert_eq!(store.find_by_id(42).await.expect("find"), None);
}

pub async fn add_then_find_returns_input<S: ScanStore>(store: &S) {
    ready(store).await;
    let input = NewScan::new("WIFI:S:home;T:WPA;P:secret;;", 1_700_000_000_123).with_location(
        Some(ScanLocation {
            latitude: 52.520008,
            longitude: 13.404954,
            altitude: Some(34.5),
            accuracy: Some(12.25),
        }),
    );

    let id = store.add(input.clone()).await.expect("add");
    let found = store
        .find_by_id(id)
        .await
        .expect("find")
        .expect("record should exist");

    assert_eq!(found.id, id);
    assert_eq!(found.to_new_scan(), input);
    assert!(!found.created_at.is_empty(), "created_at must be assigned");
}

pub async fn full_precision_coordinates_are_exact<S: ScanStore>(store: &S) {
    ready(store).await;
    let input = NewScan::new("geo:-33.8688,151.2093", 1_700_000_000_000).with_location(Some(
        ScanLocation {
            latitude: 1.0715660391465826e-75,
            longitude: -116.83361554809613,
            altitude: Some(0.1 + 0.2),
            accuracy: Some(f64::MIN_POSITIVE),
        },
    ));

    let id = store.add(input.clone()).await.expect("add");
    let found = store
        .find_by_id(id)
        .await
        .expect("find")
        .expect("record should exist");
    assert_eq!(found.to_new_scan(), input);

    let listed = store.list_all().await.expect("list");
    assert_eq!(listed[0].longitude.map(f64::to_bits), input.longitude.map(f64::to_bits));
}

pub async fn list_is_newest_first<S: ScanStore>(store: &S) {
    ready(store).await;
    for ts in [100, 300, 200] {
        store.add(scan_at(&format!("ts-{ts}"), ts)).await.expect("add");
    }

    let timestamps: Vec<i64> = store
        .list_all()
        .await
        .expect("list")
        .iter()
        .map(|r| r.timestamp)
        .collect();
    assert_eq!(timestamps, vec![300, 200, 100]);
}

pub async fn equal_timestamps_keep_insertion_order<S: ScanStore>(store: &S) {
    ready(store).await;
    let first = store.add(scan_at("a", 500)).await.expect("add a");
    let older = store.add(scan_at("b", 100)).await.expect("add b");
    let second = store.add(scan_at("c", 500)).await.expect("add c");

    let ids: Vec<i64> = store
        .list_all()
        .await
        .expect("list")
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![first, second, older]);
}

pub async fn delete_unknown_id_changes_nothing<S: ScanStore>(store: &S) {
    ready(store).await;
    let id = store.add(scan_at("keep", 1)).await.expect("add");
    let before = store.list_all().await.expect("list");

    assert!(!store.delete_by_id(id + 1000).await.expect("delete"));
    assert!(!store.delete_by_id(-1).await.expect("delete"));

    assert_eq!(store.list_all().await.expect("list"), before);
}

pub async fn delete_removes_exactly_one<S: ScanStore>(store: &S) {
    ready(store).await;
    let a = store.add(scan_at("a", 1)).await.expect("add a");
    let b = store.add(scan_at("b", 2)).await.expect("add b");
    let c = store.add(scan_at("c", 3)).await.expect("add c");

    assert!(store.delete_by_id(b).await.expect("delete b"));
    assert_eq!(store.find_by_id(b).await.expect("find b"), None);
    assert!(!store.delete_by_id(b).await.expect("delete b again"));

    let ids: Vec<i64> = store
        .list_all()
        .await
        .expect("list")
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![c, a]);
}

pub async fn ids_increase_after_deletions<S: ScanStore>(store: &S) {
    ready(store).await;
    let mut last = 0;
    for n in 0..3 {
        let id = store.add(scan_at("seq", n)).await.expect("add");
        assert!(id > last, "id {id} must exceed {last}");
        last = id;
    }

    // Dropping the highest id must not let it be issued again.
    assert!(store.delete_by_id(last).await.expect("delete newest"));
    let next = store.add(scan_at("after-delete", 10)).await.expect("add");
    assert!(next > last, "id {next} reused or regressed after deleting {last}");
}

pub async fn invalid_scan_is_rejected<S: ScanStore>(store: &S) {
    ready(store).await;
    let err = store
        .add(scan_at("", 1))
        .await
        .expect_err("empty payload must be rejected");
    assert!(matches!(err, ScanStoreError::InvalidScan { .. }), "{err:?}");

    let mut bad = scan_at("nan", 1);
    bad.longitude = Some(f64::NAN);
    let err = store.add(bad).await.expect_err("NaN must be rejected");
    assert!(matches!(err, ScanStoreError::InvalidScan { .. }), "{err:?}");

    assert!(store.list_all().await.expect("list").is_empty());
}

pub async fn add_list_delete_scenario<S: ScanStore>(store: &S) {
    ready(store).await;
    let scan = NewScan {
        qr_data: "https://example.com".to_string(),
        latitude: Some(40.0),
        longitude: Some(-3.0),
        altitude: None,
        accuracy: Some(5.0),
        timestamp: 1000,
    };

    let id = store.add(scan.clone()).await.expect("add");
    assert_eq!(id, 1);

    let listed = store.list_all().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, 1);
    assert_eq!(listed[0].to_new_scan(), scan);
    assert!(!listed[0].created_at.is_empty());

    assert!(store.delete_by_id(1).await.expect("delete"));
    assert!(store.list_all().await.expect("list").is_empty());
}
