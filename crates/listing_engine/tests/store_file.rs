use pretty_assertions::assert_eq;

use listing_core::{CellAddress, RowRange};
use listing_engine::{CellWrite, JsonFileStore, RangeWrite, StoreError, TabularStore};

fn cell(row: usize, col: usize, value: &str) -> CellWrite {
    CellWrite {
        address: CellAddress { row, col },
        value: value.to_string(),
    }
}

#[tokio::test]
async fn fresh_store_starts_with_the_header_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonFileStore::open(dir.path().join("grid.json")).expect("open");

    assert_eq!(store.read_cell(1, 1).await.unwrap(), "number");
    assert_eq!(store.read_cell(1, 2).await.unwrap(), "url");
    assert_eq!(store.read_cell(1, 23).await.unwrap(), "update_time");
    assert_eq!(store.read_column(2).await.unwrap(), vec!["url"]);
}

#[tokio::test]
async fn cells_round_trip_and_survive_reopen() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("grid.json");
    {
        let store = JsonFileStore::open(&path).expect("open");
        store
            .write_cells(&[
                cell(2, 2, "https://example.test/jnc_1/"),
                cell(4, 2, "https://example.test/jnc_3/"),
            ])
            .await
            .expect("write");
    }

    let reopened = JsonFileStore::open(&path).expect("reopen");
    assert_eq!(
        reopened.read_cell(2, 2).await.unwrap(),
        "https://example.test/jnc_1/"
    );
    // Row 3 was never written; it reads as empty, not an error.
    assert_eq!(reopened.read_cell(3, 2).await.unwrap(), "");
    assert_eq!(
        reopened.read_column(2).await.unwrap(),
        vec![
            "url",
            "https://example.test/jnc_1/",
            "",
            "https://example.test/jnc_3/"
        ]
    );
}

#[tokio::test]
async fn range_writes_fill_a_contiguous_span() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonFileStore::open(dir.path().join("grid.json")).expect("open");

    store
        .write_ranges(&[RangeWrite {
            range: RowRange {
                row: 2,
                first_col: 1,
                last_col: 4,
            },
            values: vec![
                "1".to_string(),
                "https://example.test/jnc_1/".to_string(),
                "000000000001".to_string(),
                String::new(),
            ],
        }])
        .await
        .expect("write range");

    assert_eq!(store.read_cell(2, 1).await.unwrap(), "1");
    assert_eq!(store.read_cell(2, 3).await.unwrap(), "000000000001");
    assert_eq!(store.read_cell(2, 4).await.unwrap(), "");
}

#[tokio::test]
async fn range_width_must_match_the_value_count() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonFileStore::open(dir.path().join("grid.json")).expect("open");

    let err = store
        .write_ranges(&[RangeWrite {
            range: RowRange {
                row: 2,
                first_col: 1,
                last_col: 3,
            },
            values: vec!["only one".to_string()],
        }])
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::Permanent(_)));
}

#[tokio::test]
async fn read_column_stops_at_the_last_non_empty_cell() {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = JsonFileStore::open(dir.path().join("grid.json")).expect("open");

    store
        .write_cells(&[cell(2, 2, "https://example.test/jnc_1/"), cell(5, 3, "id")])
        .await
        .expect("write");

    // Column 2 has data through row 2 only; rows 3..5 are trailing blanks.
    assert_eq!(
        store.read_column(2).await.unwrap(),
        vec!["url", "https://example.test/jnc_1/"]
    );
}
