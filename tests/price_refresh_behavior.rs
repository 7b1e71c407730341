//! Behavior-driven tests for the incremental price refresh
//!
//! These tests drive the real Stooq and Kabutan adapters over an offline
//! transport and verify what ends up in the warehouse.

use std::sync::Arc;

use kabuka_core::{
    CompanyRecord, EntityStatus, FetchAction, FixtureHttpClient, HttpClient, HttpError,
    HttpResponse, KabutanAdapter, KeyColumns, PriceRecord, PriceRefresher, RefreshConfig,
    StooqAdapter, Warehouse, WarehouseConfig,
};
use tempfile::{tempdir, TempDir};
use time::macros::date;
use time::Date;

const STOOQ_6028: &str = "Date,Open,High,Low,Close,Volume
2020-02-25,3300,3350,3250,3320,812000
2020-02-26,3320,3330,3180,3200,905000
2020-02-27,3200,3260,3150,3240,1010300
";

const KABUTAN_6028: &str = r#"<html><body>
<table class="stock_kabuka0">
<tbody>
<tr>
<th scope="row"><time datetime="2020-02-28">20/02/28</time></th>
<td>3,215</td><td>3,290</td><td>3,120</td><td>3,195</td>
<td>-45</td><td>-1.39</td><td>1,027,700</td>
</tr>
</tbody>
</table>
</body></html>"#;

fn open_warehouse() -> (TempDir, Warehouse) {
    let temp = tempdir().expect("tempdir");
    let warehouse = Warehouse::open(WarehouseConfig {
        kabuka_home: temp.path().to_path_buf(),
        db_path: temp.path().join("warehouse.duckdb"),
        max_pool_size: 2,
    })
    .expect("warehouse open");
    (temp, warehouse)
}

fn company(company_id: &str, stock_code: &str, country_code: &str) -> CompanyRecord {
    CompanyRecord {
        company_id: company_id.to_owned(),
        company_name: format!("Company {company_id}"),
        stock_code: stock_code.to_owned(),
        country_code: country_code.to_owned(),
        listed_market: String::from("TSE"),
        foundation_date: None,
        longitude: None,
        latitude: None,
    }
}

fn stored_price(company_id: &str, trade_date: Date, close: f64) -> PriceRecord {
    PriceRecord {
        company_id: company_id.to_owned(),
        trade_date,
        open: close,
        high: close,
        low: close,
        close,
        volume: 1000.0,
    }
}

fn seed_prices(warehouse: &Warehouse, rows: &[PriceRecord]) {
    let keys = KeyColumns::<PriceRecord>::resolve(&["company_id", "trade_date"]).expect("keys");
    warehouse.bulk_merge(rows, &keys).expect("seed prices");
}

fn refresher(warehouse: &Warehouse, http: &FixtureHttpClient) -> PriceRefresher {
    let client: Arc<dyn HttpClient> = Arc::new(http.clone());
    PriceRefresher::new(
        warehouse.clone(),
        Arc::new(StooqAdapter::with_http_client(Arc::clone(&client))),
        Arc::new(KabutanAdapter::with_http_client(client)),
        RefreshConfig::default(),
    )
}

// =============================================================================
// Refresh: first load and incremental ranges
// =============================================================================

#[tokio::test]
async fn when_a_company_has_no_prices_its_full_history_is_loaded_from_stooq() {
    // Given: A listed company with nothing stored yet
    let (_temp, warehouse) = open_warehouse();
    warehouse
        .upsert_companies(&[company("0001", "6028", "JP")])
        .expect("companies");
    let http = FixtureHttpClient::new().with_route("s=6028.jp", Ok(HttpResponse::ok(STOOQ_6028)));

    // When: The refresh runs on a Friday
    let report = refresher(&warehouse, &http)
        .refresh_at(date!(2020 - 02 - 28))
        .await
        .expect("refresh");

    // Then: Stooq is asked from the default start date up to today
    let requests = http.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.contains("d1=20000101"), "url: {}", requests[0].url);
    assert!(requests[0].url.contains("d2=20200228"), "url: {}", requests[0].url);

    // And: Every returned session is stored
    assert_eq!(report.fetched, 1);
    assert_eq!(report.merge.inserted, 3);
    assert_eq!(
        report.entities[0].action,
        Some(FetchAction::QueryRange {
            from: date!(2000 - 01 - 01)
        })
    );
    let history = warehouse.price_history("0001").expect("history");
    assert_eq!(history.len(), 3);
    assert_eq!(history[2].row.trade_date, date!(2020 - 02 - 27));
    assert_eq!(history[2].row.close, 3240.0);
    assert_eq!(history[2].row.volume, 1_010_300.0);
}

#[tokio::test]
async fn when_prices_are_stale_only_the_missing_days_are_requested() {
    // Given: History ending on a Monday, checked ten days later
    let (_temp, warehouse) = open_warehouse();
    warehouse
        .upsert_companies(&[company("0001", "6028", "JP")])
        .expect("companies");
    seed_prices(&warehouse, &[stored_price("0001", date!(2020 - 02 - 17), 3000.0)]);
    let http = FixtureHttpClient::new().with_route("s=6028.jp", Ok(HttpResponse::ok(STOOQ_6028)));

    // When: The refresh runs
    let report = refresher(&warehouse, &http)
        .refresh_at(date!(2020 - 02 - 27))
        .await
        .expect("refresh");

    // Then: The range starts the day after the stored date
    assert!(http.requests()[0].url.contains("d1=20200218"));
    assert_eq!(report.merge.inserted, 3);
    assert_eq!(warehouse.price_history("0001").expect("history").len(), 4);
}

// =============================================================================
// Refresh: weekday handling
// =============================================================================

#[tokio::test]
async fn when_history_ends_on_a_recent_thursday_the_latest_day_comes_from_kabutan() {
    // Given: Prices stored through Thursday 2020-02-27
    let (_temp, warehouse) = open_warehouse();
    warehouse
        .upsert_companies(&[company("0001", "6028", "JP")])
        .expect("companies");
    seed_prices(&warehouse, &[stored_price("0001", date!(2020 - 02 - 27), 3240.0)]);
    let http = FixtureHttpClient::new()
        .with_route("kabutan.jp", Ok(HttpResponse::ok(KABUTAN_6028)))
        .with_route("stooq.com", Ok(HttpResponse::ok(STOOQ_6028)));

    // When: The refresh runs on Saturday
    let report = refresher(&warehouse, &http)
        .refresh_at(date!(2020 - 02 - 29))
        .await
        .expect("refresh");

    // Then: Only the single-day source is asked
    let requests = http.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.contains("kabutan.jp/stock/kabuka?code=6028"));

    // And: Friday's session is appended with separators stripped
    assert_eq!(report.entities[0].action, Some(FetchAction::CrawlLatestDay));
    let history = warehouse.price_history("0001").expect("history");
    assert_eq!(history.len(), 2);
    assert_eq!(history[1].row.trade_date, date!(2020 - 02 - 28));
    assert_eq!(history[1].row.open, 3215.0);
    assert_eq!(history[1].row.volume, 1_027_700.0);
}

#[tokio::test]
async fn when_history_ends_on_a_recent_friday_nothing_is_requested() {
    // Given: Prices stored through Friday 2020-02-28
    let (_temp, warehouse) = open_warehouse();
    warehouse
        .upsert_companies(&[company("0001", "6028", "JP")])
        .expect("companies");
    seed_prices(&warehouse, &[stored_price("0001", date!(2020 - 02 - 28), 3195.0)]);
    let http = FixtureHttpClient::new();

    // When: The refresh runs over the weekend
    let report = refresher(&warehouse, &http)
        .refresh_at(date!(2020 - 03 - 01))
        .await
        .expect("refresh");

    // Then: The company is skipped without any request
    assert!(http.requests().is_empty());
    assert_eq!(report.skipped, 1);
    assert_eq!(report.entities[0].status, EntityStatus::Skipped);
    assert_eq!(report.merge.inserted + report.merge.updated, 0);
}

#[tokio::test]
async fn when_stooq_has_nothing_after_stored_history_the_company_has_no_new_data() {
    // Given: Prices stored through Friday 2020-02-28
    let (_temp, warehouse) = open_warehouse();
    warehouse
        .upsert_companies(&[company("0001", "6028", "JP")])
        .expect("companies");
    seed_prices(&warehouse, &[stored_price("0001", date!(2020 - 02 - 28), 3195.0)]);
    let http = FixtureHttpClient::new().with_route("s=6028.jp", Ok(HttpResponse::ok(STOOQ_6028)));

    // When: Tuesday's refresh finds only sessions older than the stored one
    let report = refresher(&warehouse, &http)
        .refresh_at(date!(2020 - 03 - 03))
        .await
        .expect("refresh");

    // Then: The range was queried from Saturday
    let requests = http.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].url.contains("d1=20200229"), "url: {}", requests[0].url);

    // And: The empty answer is reported as no new data rather than a failure
    assert_eq!(report.failed, 0);
    assert_eq!(report.no_new_data, 1);
    assert_eq!(report.entities[0].status, EntityStatus::NoNewData);
    assert_eq!(report.merge.inserted + report.merge.updated, 0);
    assert_eq!(warehouse.price_history("0001").expect("history").len(), 1);
}

// =============================================================================
// Refresh: failures stay per company
// =============================================================================

#[tokio::test]
async fn when_one_source_call_fails_the_other_companies_are_still_stored() {
    // Given: Two companies; Stooq has no data for the first and fails for a third
    let (_temp, warehouse) = open_warehouse();
    warehouse
        .upsert_companies(&[
            company("0001", "3906", "JP"),
            company("0002", "6028", "JP"),
            company("0003", "9433", "JP"),
        ])
        .expect("companies");
    let http = FixtureHttpClient::new()
        .with_route("s=3906.jp", Ok(HttpResponse::ok("No data")))
        .with_route("s=6028.jp", Ok(HttpResponse::ok(STOOQ_6028)))
        .with_route("s=9433.jp", Err(HttpError::new("connection reset")));

    // When: The refresh runs
    let report = refresher(&warehouse, &http)
        .refresh_at(date!(2020 - 02 - 28))
        .await
        .expect("refresh");

    // Then: Each failure is reported with its category
    assert_eq!(report.targets, 3);
    assert_eq!(report.failed, 2);
    assert_eq!(report.fetched, 1);
    assert_eq!(report.entities[0].error_code.as_deref(), Some("source.not_found"));
    assert_eq!(report.entities[2].error_code.as_deref(), Some("source.unavailable"));

    // And: The successful company's prices are stored
    assert_eq!(warehouse.price_history("0002").expect("history").len(), 3);
    assert!(warehouse.price_history("0001").expect("history").is_empty());
}

#[tokio::test]
async fn when_a_stock_code_is_ambiguous_the_company_is_reported_and_skipped() {
    // Given: Two master rows sharing stock code 6028 in the same country
    let (_temp, warehouse) = open_warehouse();
    warehouse
        .upsert_companies(&[
            company("0001", "6028", "JP"),
            company("0002", "6028", "JP"),
            company("0003", "9433", "JP"),
        ])
        .expect("companies");
    let http = FixtureHttpClient::new().with_route("s=9433.jp", Ok(HttpResponse::ok(STOOQ_6028)));

    // When: The refresh runs
    let report = refresher(&warehouse, &http)
        .refresh_at(date!(2020 - 02 - 28))
        .await
        .expect("refresh");

    // Then: Both ambiguous rows fail the lookup and are never fetched
    assert_eq!(report.failed, 2);
    assert!(report
        .entities
        .iter()
        .filter(|entity| entity.stock_code == "6028")
        .all(|entity| entity.error_code.as_deref() == Some("warehouse.lookup_failed")));
    assert_eq!(http.requests().len(), 1);
    assert_eq!(warehouse.price_history("0003").expect("history").len(), 3);
}

#[tokio::test]
async fn when_refresh_targets_a_country_other_companies_are_ignored() {
    // Given: One Japanese and one US company
    let (_temp, warehouse) = open_warehouse();
    warehouse
        .upsert_companies(&[company("0001", "6028", "JP"), company("0002", "AAPL", "US")])
        .expect("companies");
    let http = FixtureHttpClient::new().with_route("stooq.com", Ok(HttpResponse::ok(STOOQ_6028)));

    // When: The default Japanese refresh runs
    let report = refresher(&warehouse, &http)
        .refresh_at(date!(2020 - 02 - 28))
        .await
        .expect("refresh");

    // Then: Only the Japanese company is a target
    assert_eq!(report.targets, 1);
    assert_eq!(report.entities[0].company_id.as_deref(), Some("0001"));
    assert!(warehouse.price_history("0002").expect("history").is_empty());
}

#[tokio::test]
async fn when_refresh_is_repeated_only_new_sessions_are_added() {
    // Given: A first refresh on Wednesday that stored the sessions up to then
    let (_temp, warehouse) = open_warehouse();
    warehouse
        .upsert_companies(&[company("0001", "6028", "JP")])
        .expect("companies");
    seed_prices(&warehouse, &[stored_price("0001", date!(2020 - 02 - 17), 3000.0)]);
    let http = FixtureHttpClient::new().with_route("s=6028.jp", Ok(HttpResponse::ok(STOOQ_6028)));
    let first_report = refresher(&warehouse, &http)
        .refresh_at(date!(2020 - 02 - 26))
        .await
        .expect("first refresh");
    assert_eq!(first_report.merge.inserted, 2);
    let first = warehouse.price_history("0001").expect("history");

    // When: The refresh runs again on Friday with the same source data
    let second_http =
        FixtureHttpClient::new().with_route("s=6028.jp", Ok(HttpResponse::ok(STOOQ_6028)));
    let report = refresher(&warehouse, &second_http)
        .refresh_at(date!(2020 - 02 - 28))
        .await
        .expect("second refresh");

    // Then: Only the session after the stored date is requested and written
    assert!(second_http.requests()[0].url.contains("d1=20200227"));
    assert_eq!(report.merge.inserted, 1);
    assert_eq!(report.merge.updated, 0);

    // And: Earlier rows keep their original insertion time
    let history = warehouse.price_history("0001").expect("history");
    assert_eq!(history.len(), 4);
    assert_eq!(history[1].inserted_at, first[1].inserted_at);
}
