pub mod migrations;
pub mod pool;
pub mod records;
pub mod table;

use std::collections::{HashMap, HashSet};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::types::Value;
use ::duckdb::{params, params_from_iter, Connection};
use serde::Serialize;
use thiserror::Error;
use time::macros::format_description;
use time::Date;
use tracing::Span;

pub use pool::{ConnectionPool, PooledConnection};
pub use records::{CompanyRecord, IndicatorRecord, PriceRecord, Stored};
pub use table::{ColumnDef, ColumnType, KeyColumns, KeyPart, RowKey, TableRow};

#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("table '{table}' has no key column '{column}'")]
    UnknownKeyColumn { table: &'static str, column: String },

    #[error("key columns for table '{table}' must not be empty")]
    EmptyKeyColumns { table: &'static str },

    #[error("batch for table '{table}' repeats key ({key})")]
    DuplicateKey { table: &'static str, key: String },

    #[error(
        "expected exactly one company for stock code '{stock_code}' in '{country_code}', found {matches}"
    )]
    LookupFailed {
        stock_code: String,
        country_code: String,
        matches: usize,
    },

    #[error("connection pool lock poisoned")]
    PoolPoisoned,

    #[error("stored value '{value}' in column '{column}' is invalid")]
    InvalidStoredValue { column: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub kabuka_home: PathBuf,
    pub db_path: PathBuf,
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        let kabuka_home = resolve_kabuka_home();
        let db_path = kabuka_home.join("warehouse.duckdb");
        Self {
            kabuka_home,
            db_path,
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    /// Default configuration pointed at an explicit database file.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}

/// Row counts of one `bulk_merge` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub updated: usize,
    pub inserted: usize,
}

/// Row counts of one `bulk_replace` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceReport {
    pub deleted: usize,
    pub inserted: usize,
}

#[derive(Clone)]
pub struct Warehouse {
    config: WarehouseConfig,
    pool: ConnectionPool,
    span: Span,
}

impl Warehouse {
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::open(config.db_path.clone(), config.max_pool_size)?;
        let warehouse = Self {
            config,
            pool,
            span: Span::none(),
        };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Log gateway operations inside `span`.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.pool.acquire()?;
        let applied = migrations::apply_migrations(&connection)?;
        if applied > 0 {
            tracing::info!(parent: &self.span, applied, "applied warehouse migrations");
        }
        Ok(())
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    pub fn db_path(&self) -> &Path {
        self.pool.db_path()
    }

    /// Upsert `rows` keyed by `keys` in one transaction.
    ///
    /// Rows whose key already exists are updated in place and keep their
    /// stored `inserted_at`; new keys are inserted. Rows already in the table
    /// that match no incoming key are left alone. When the batch repeats a key
    /// the last occurrence wins. `updated_at` is set to the call time for
    /// every touched row.
    pub fn bulk_merge<R: TableRow>(
        &self,
        rows: &[R],
        keys: &KeyColumns<R>,
    ) -> Result<MergeReport, WarehouseError> {
        if rows.is_empty() {
            tracing::info!(parent: &self.span, table = R::TABLE, updated = 0, inserted = 0, "merged rows");
            return Ok(MergeReport::default());
        }

        let batch = dedupe_last_wins(rows, keys);
        let layout = ColumnLayout::for_keys::<R>(keys);

        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<MergeReport, WarehouseError> {
            let existing = existing_keys::<R>(&connection, keys)?;

            let mut update = connection.prepare(&layout.update_sql(R::TABLE))?;
            let mut insert = connection.prepare(&insert_sql::<R>())?;
            let mut report = MergeReport::default();

            for (key, row) in batch {
                let values = row.values();
                if existing.contains(&key) {
                    update.execute(params_from_iter(layout.update_params(&values)))?;
                    report.updated += 1;
                } else {
                    insert.execute(params_from_iter(values.iter()))?;
                    report.inserted += 1;
                }
            }

            Ok(report)
        })();

        let report = finalize_transaction(&connection, result)?;
        tracing::info!(
            parent: &self.span,
            table = R::TABLE,
            updated = report.updated,
            inserted = report.inserted,
            "merged rows"
        );
        Ok(report)
    }

    /// Delete every row of the target table and insert `rows`, atomically.
    ///
    /// The batch must not repeat a key, so the table ends up holding exactly
    /// `rows.len()` rows.
    pub fn bulk_replace<R: TableRow>(
        &self,
        rows: &[R],
        keys: &KeyColumns<R>,
    ) -> Result<ReplaceReport, WarehouseError> {
        let mut seen = HashSet::with_capacity(rows.len());
        for row in rows {
            let key = keys.key_of(row);
            if !seen.insert(key.clone()) {
                return Err(WarehouseError::DuplicateKey {
                    table: R::TABLE,
                    key: render_key(keys, &key),
                });
            }
        }

        let connection = self.pool.acquire()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<ReplaceReport, WarehouseError> {
            let deleted = connection.execute(&format!("DELETE FROM {}", R::TABLE), params![])?;

            let mut insert = connection.prepare(&insert_sql::<R>())?;
            for row in rows {
                insert.execute(params_from_iter(row.values().iter()))?;
            }

            Ok(ReplaceReport {
                deleted,
                inserted: rows.len(),
            })
        })();

        let report = finalize_transaction(&connection, result)?;
        tracing::info!(
            parent: &self.span,
            table = R::TABLE,
            deleted = report.deleted,
            inserted = report.inserted,
            "replaced rows"
        );
        Ok(report)
    }

    /// Upsert master data keyed by `company_id`.
    pub fn upsert_companies(&self, rows: &[CompanyRecord]) -> Result<MergeReport, WarehouseError> {
        let keys = KeyColumns::<CompanyRecord>::resolve(&["company_id"])?;
        self.bulk_merge(rows, &keys)
    }

    /// Newest stored trade date for one company.
    pub fn latest_price_date(&self, company_id: &str) -> Result<Option<Date>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let latest: Option<String> = connection.query_row(
            "SELECT CAST(MAX(trade_date) AS VARCHAR) FROM stock_prices WHERE company_id = ?",
            params![company_id],
            |row| row.get(0),
        )?;

        latest
            .map(|text| parse_stored_date("trade_date", &text))
            .transpose()
    }

    /// Full price history of one company, oldest first.
    pub fn price_history(&self, company_id: &str) -> Result<Vec<Stored<PriceRecord>>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(
            r#"
SELECT company_id, CAST(trade_date AS VARCHAR), open, high, low, close, volume,
       CAST(inserted_at AS VARCHAR), CAST(updated_at AS VARCHAR)
FROM stock_prices
WHERE company_id = ?
ORDER BY trade_date
"#,
        )?;

        let raw = statement
            .query_map(params![company_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    [
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                        row.get::<_, f64>(5)?,
                        row.get::<_, f64>(6)?,
                    ],
                    row.get::<_, String>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(company_id, trade_date, [open, high, low, close, volume], inserted_at, updated_at)| {
                Ok(Stored {
                    row: PriceRecord {
                        company_id,
                        trade_date: parse_stored_date("trade_date", &trade_date)?,
                        open,
                        high,
                        low,
                        close,
                        volume,
                    },
                    inserted_at,
                    updated_at,
                })
            })
            .collect()
    }

    /// Ids of every company with at least one stored price, sorted.
    pub fn companies_with_prices(&self) -> Result<Vec<String>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let mut statement = connection
            .prepare("SELECT DISTINCT company_id FROM stock_prices ORDER BY company_id")?;
        let ids = statement
            .query_map(params![], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn companies(&self) -> Result<Vec<CompanyRecord>, WarehouseError> {
        self.query_companies(None)
    }

    pub fn companies_in_country(&self, country_code: &str) -> Result<Vec<CompanyRecord>, WarehouseError> {
        self.query_companies(Some(country_code))
    }

    /// Resolve a stock code to its single company id.
    ///
    /// Zero or several matches are a master-data error.
    pub fn company_id_for(&self, stock_code: &str, country_code: &str) -> Result<String, WarehouseError> {
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(
            "SELECT company_id FROM companies WHERE stock_code = ? AND country_code = ?",
        )?;
        let mut ids = statement
            .query_map(params![stock_code, country_code], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        if ids.len() == 1 {
            if let Some(id) = ids.pop() {
                return Ok(id);
            }
        }

        Err(WarehouseError::LookupFailed {
            stock_code: stock_code.to_owned(),
            country_code: country_code.to_owned(),
            matches: ids.len(),
        })
    }

    /// Stored indicator rows, optionally for one company, ordered by key.
    pub fn indicator_rows(
        &self,
        company_id: Option<&str>,
    ) -> Result<Vec<Stored<IndicatorRecord>>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(
            r#"
SELECT company_id, CAST(trade_date AS VARCHAR), ma_type, ma_value,
       CAST(inserted_at AS VARCHAR), CAST(updated_at AS VARCHAR)
FROM stock_price_ma
WHERE CAST(? AS VARCHAR) IS NULL OR company_id = ?
ORDER BY company_id, ma_type, trade_date
"#,
        )?;

        let raw = statement
            .query_map(params![company_id, company_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, String>(4)?,
                    row.get::<_, String>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(|(company_id, trade_date, ma_type, ma_value, inserted_at, updated_at)| {
                Ok(Stored {
                    row: IndicatorRecord {
                        company_id,
                        trade_date: parse_stored_date("trade_date", &trade_date)?,
                        ma_type,
                        ma_value,
                    },
                    inserted_at,
                    updated_at,
                })
            })
            .collect()
    }

    fn query_companies(&self, country_code: Option<&str>) -> Result<Vec<CompanyRecord>, WarehouseError> {
        let connection = self.pool.acquire()?;
        let mut statement = connection.prepare(
            r#"
SELECT company_id, company_name, stock_code, country_code, listed_market,
       CAST(foundation_date AS VARCHAR), longitude, latitude
FROM companies
WHERE CAST(? AS VARCHAR) IS NULL OR country_code = ?
ORDER BY company_id
"#,
        )?;

        let raw = statement
            .query_map(params![country_code, country_code], |row| {
                Ok((
                    [
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ],
                    row.get::<_, Option<String>>(5)?,
                    row.get::<_, Option<f64>>(6)?,
                    row.get::<_, Option<f64>>(7)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        raw.into_iter()
            .map(
                |([company_id, company_name, stock_code, country_code, listed_market], founded, longitude, latitude)| {
                    Ok(CompanyRecord {
                        company_id,
                        company_name,
                        stock_code,
                        country_code,
                        listed_market,
                        foundation_date: founded
                            .map(|text| parse_stored_date("foundation_date", &text))
                            .transpose()?,
                        longitude,
                        latitude,
                    })
                },
            )
            .collect()
    }
}

/// Positions of key and non-key columns within `TableRow::values`.
struct ColumnLayout {
    keys: Vec<(usize, ColumnDef)>,
    others: Vec<(usize, ColumnDef)>,
}

impl ColumnLayout {
    fn for_keys<R: TableRow>(keys: &KeyColumns<R>) -> Self {
        let position = |name: &str| R::COLUMNS.iter().position(|column| column.name == name);
        let keys_in_order = keys
            .columns()
            .iter()
            .filter_map(|name| position(name).map(|index| (index, R::COLUMNS[index])))
            .collect::<Vec<_>>();
        let others = R::COLUMNS
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, column)| !keys.columns().contains(&column.name))
            .collect();

        Self {
            keys: keys_in_order,
            others,
        }
    }

    fn update_sql(&self, table: &str) -> String {
        let mut assignments = self
            .others
            .iter()
            .map(|(_, column)| format!("{} = {}", column.name, column.column_type.placeholder()))
            .collect::<Vec<_>>();
        assignments.push(String::from("updated_at = CURRENT_TIMESTAMP"));

        let predicate = self
            .keys
            .iter()
            .map(|(_, column)| format!("{} = {}", column.name, column.column_type.placeholder()))
            .collect::<Vec<_>>()
            .join(" AND ");

        format!(
            "UPDATE {table} SET {} WHERE {predicate}",
            assignments.join(", ")
        )
    }

    fn update_params<'a>(&self, values: &'a [Value]) -> Vec<&'a Value> {
        self.others
            .iter()
            .chain(self.keys.iter())
            .map(|(index, _)| &values[*index])
            .collect()
    }
}

fn insert_sql<R: TableRow>() -> String {
    let names = R::COLUMNS
        .iter()
        .map(|column| column.name)
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = R::COLUMNS
        .iter()
        .map(|column| column.column_type.placeholder())
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "INSERT INTO {} ({names}, inserted_at, updated_at) \
         VALUES ({placeholders}, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
        R::TABLE
    )
}

fn existing_keys<R: TableRow>(
    connection: &Connection,
    keys: &KeyColumns<R>,
) -> Result<HashSet<RowKey>, WarehouseError> {
    let projection = keys
        .columns()
        .iter()
        .map(|name| format!("CAST({name} AS VARCHAR)"))
        .collect::<Vec<_>>()
        .join(", ");
    let width = keys.columns().len();

    let mut statement = connection.prepare(&format!("SELECT {projection} FROM {}", R::TABLE))?;
    let existing = statement
        .query_map(params![], |row| {
            (0..width)
                .map(|index| row.get::<_, String>(index).map(KeyPart::from))
                .collect::<Result<RowKey, _>>()
        })?
        .collect::<Result<HashSet<_>, _>>()?;
    Ok(existing)
}

fn dedupe_last_wins<'a, R: TableRow>(rows: &'a [R], keys: &KeyColumns<R>) -> Vec<(RowKey, &'a R)> {
    let mut positions: HashMap<RowKey, usize> = HashMap::with_capacity(rows.len());
    let mut batch: Vec<(RowKey, &R)> = Vec::with_capacity(rows.len());
    for row in rows {
        let key = keys.key_of(row);
        match positions.get(&key) {
            Some(&index) => batch[index].1 = row,
            None => {
                positions.insert(key.clone(), batch.len());
                batch.push((key, row));
            }
        }
    }
    batch
}

fn render_key<R: TableRow>(keys: &KeyColumns<R>, key: &RowKey) -> String {
    keys.columns()
        .iter()
        .zip(key)
        .map(|(name, part)| format!("{name}={part}"))
        .collect::<Vec<_>>()
        .join(", ")
}

fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

fn parse_stored_date(column: &'static str, text: &str) -> Result<Date, WarehouseError> {
    Date::parse(text, format_description!("[year]-[month]-[day]")).map_err(|_| {
        WarehouseError::InvalidStoredValue {
            column,
            value: text.to_owned(),
        }
    })
}

fn resolve_kabuka_home() -> PathBuf {
    if let Some(path) = env::var_os("KABUKA_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".kabuka");
    }

    PathBuf::from(".kabuka")
}
