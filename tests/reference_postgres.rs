/// Integration tests for the Postgres climate-region reference store
///
/// Tests verify:
/// 1. Rows written with `insert_row` are read back unchanged
/// 2. The latest snapshot wins when several are stored
///
/// Prerequisites:
/// - PostgreSQL with the climate_regions table (sql/001_climate_regions.sql)
/// - DATABASE_URL set in .env
///
/// Run with: cargo test --test reference_postgres -- --ignored --test-threads=1

use chrono::{TimeZone, Utc};
use postgres::{Client, NoTls};
use std::env;

use hazard_trigger_service::reference::{PostgresReferenceStore, ReferenceRow, ReferenceStore};

const TEST_COUNTRY: &str = "TST";

// ---------------------------------------------------------------------------
// Test Helpers
// ---------------------------------------------------------------------------

fn setup_test_store() -> PostgresReferenceStore {
    dotenv::dotenv().ok();
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let mut client = Client::connect(&database_url, NoTls).expect("Failed to connect to test database");
    client
        .execute("DELETE FROM climate_regions WHERE country = $1", &[&TEST_COUNTRY])
        .expect("Failed to clear test rows");
    PostgresReferenceStore::from_client(client)
}

fn test_row(month: u32, code: &str, pcodes: &str) -> ReferenceRow {
    ReferenceRow {
        country: TEST_COUNTRY.to_string(),
        timestamp: Utc.with_ymd_and_hms(2025, month, 1, 0, 0, 0).unwrap(),
        climate_region_code: code.to_string(),
        climate_region_name: format!("Test region {}", code),
        adm_level: 1,
        pcodes: pcodes.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[test]
#[ignore] // Requires DATABASE_URL and the climate_regions table
fn test_insert_and_fetch_rows() {
    let mut store = setup_test_store();
    let row = test_row(1, "1", r#"{"1": ["TS01", "TS02"]}"#);
    store.insert_row(&row).expect("Failed to insert row");

    let rows = store.fetch_rows(TEST_COUNTRY).expect("Failed to fetch rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].climate_region_code, "1");
    assert_eq!(rows[0].timestamp, row.timestamp);

    // Upsert on the same key replaces the row.
    store.insert_row(&test_row(1, "1", r#"{"1": ["TS03"]}"#)).unwrap();
    let regions = store.climate_regions(TEST_COUNTRY).unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions.get_data_unit("1").unwrap().pcodes_at(1), ["TS03".to_string()]);
}

#[test]
#[ignore] // Requires DATABASE_URL and the climate_regions table
fn test_latest_snapshot_from_database() {
    let mut store = setup_test_store();
    store.insert_row(&test_row(1, "1", r#"{"1": ["TS01"]}"#)).unwrap();
    store.insert_row(&test_row(1, "2", r#"{"1": ["TS02"]}"#)).unwrap();
    store.insert_row(&test_row(2, "1", r#"{"1": ["TS01", "TS02"]}"#)).unwrap();

    let regions = store.climate_regions(TEST_COUNTRY).unwrap();
    assert_eq!(regions.len(), 1);
    assert_eq!(regions.timestamp(), Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap());
}
