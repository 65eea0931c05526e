//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{Duration, NaiveDateTime};

use fifo_ledger::config::{
    Config, DatabaseConfig, LedgerConfig, ServerConfig, StorageBackend, StorageConfig,
};
use fifo_ledger::models::{
    parse_time, Barcode, CreateSaleInput, CreateSupplyInput, Pagination, Sale, Supply,
};
use fifo_ledger::store::{EventFilter, EventStore, MemoryEventStore};
use fifo_ledger::AppState;

pub const BARCODE: Barcode = 4_600_000_000_123;

/// Small chunks and batches so every test crosses chunk boundaries
pub fn test_config() -> Config {
    Config {
        environment: "test".to_string(),
        server: ServerConfig::default(),
        database: DatabaseConfig {
            url: String::new(),
            max_connections: 1,
            min_connections: 1,
        },
        storage: StorageConfig {
            backend: StorageBackend::Memory,
        },
        ledger: LedgerConfig {
            batch_size: 2,
            scan_chunk_size: 3,
        },
    }
}

pub fn test_state() -> AppState {
    let store: Arc<dyn EventStore> = Arc::new(MemoryEventStore::new());
    AppState::new(store, test_config())
}

/// `2024-01-01 00:00:00` plus `hours`
pub fn at(hours: i64) -> NaiveDateTime {
    parse_time("2024-01-01 00:00:00").unwrap() + Duration::hours(hours)
}

pub fn sale_input(quantity: i32, price: i32, hours: i64) -> CreateSaleInput {
    CreateSaleInput {
        barcode: BARCODE,
        quantity,
        price,
        sale_time: at(hours),
    }
}

pub fn supply_input(quantity: i32, price: i32, hours: i64) -> CreateSupplyInput {
    CreateSupplyInput {
        barcode: BARCODE,
        quantity,
        price,
        supply_time: at(hours),
    }
}

fn everything() -> Pagination {
    Pagination {
        page: 1,
        per_page: 100_000,
    }
}

/// Every sale of `barcode` in (time, id) order
pub async fn all_sales(state: &AppState, barcode: Barcode) -> Vec<Sale> {
    let filter = EventFilter {
        barcode: Some(barcode),
        ..Default::default()
    };
    state.store.list_sales(&filter, &everything()).await.unwrap().0
}

/// Every supply of `barcode` in (time, id) order
pub async fn all_supplies(state: &AppState, barcode: Barcode) -> Vec<Supply> {
    let filter = EventFilter {
        barcode: Some(barcode),
        ..Default::default()
    };
    state
        .store
        .list_supplies(&filter, &everything())
        .await
        .unwrap()
        .0
}
