//! Row types stored by the warehouse.

use ::duckdb::types::Value;
use serde::{Deserialize, Serialize};
use time::Date;

use crate::table::{ColumnDef, KeyAccessor, KeyPart, TableRow};

/// Master data for a tracked company.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub company_id: String,
    pub company_name: String,
    pub stock_code: String,
    pub country_code: String,
    pub listed_market: String,
    #[serde(default)]
    pub foundation_date: Option<Date>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub latitude: Option<f64>,
}

/// One day's OHLCV observation for one company.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceRecord {
    pub company_id: String,
    pub trade_date: Date,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One moving-average value for one company, date and indicator type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndicatorRecord {
    pub company_id: String,
    pub trade_date: Date,
    /// Algorithm and span label, e.g. `sma5`.
    pub ma_type: String,
    pub ma_value: f64,
}

/// A row as read back from storage, with its bookkeeping timestamps.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stored<R> {
    #[serde(flatten)]
    pub row: R,
    pub inserted_at: String,
    pub updated_at: String,
}

impl TableRow for CompanyRecord {
    const TABLE: &'static str = "companies";
    const COLUMNS: &'static [ColumnDef] = &[
        ColumnDef::text("company_id"),
        ColumnDef::text("company_name"),
        ColumnDef::text("stock_code"),
        ColumnDef::text("country_code"),
        ColumnDef::text("listed_market"),
        ColumnDef::date("foundation_date"),
        ColumnDef::double("longitude"),
        ColumnDef::double("latitude"),
    ];

    fn key_accessor(column: &str) -> Option<KeyAccessor<Self>> {
        match column {
            "company_id" => Some(|row: &Self| KeyPart::from(row.company_id.as_str())),
            "stock_code" => Some(|row: &Self| KeyPart::from(row.stock_code.as_str())),
            "country_code" => Some(|row: &Self| KeyPart::from(row.country_code.as_str())),
            _ => None,
        }
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.company_id.clone()),
            Value::Text(self.company_name.clone()),
            Value::Text(self.stock_code.clone()),
            Value::Text(self.country_code.clone()),
            Value::Text(self.listed_market.clone()),
            self.foundation_date
                .map_or(Value::Null, |date| Value::Text(date.to_string())),
            self.longitude.map_or(Value::Null, Value::Double),
            self.latitude.map_or(Value::Null, Value::Double),
        ]
    }
}

impl TableRow for PriceRecord {
    const TABLE: &'static str = "stock_prices";
    const COLUMNS: &'static [ColumnDef] = &[
        ColumnDef::text("company_id"),
        ColumnDef::date("trade_date"),
        ColumnDef::double("open"),
        ColumnDef::double("high"),
        ColumnDef::double("low"),
        ColumnDef::double("close"),
        ColumnDef::double("volume"),
    ];

    fn key_accessor(column: &str) -> Option<KeyAccessor<Self>> {
        match column {
            "company_id" => Some(|row: &Self| KeyPart::from(row.company_id.as_str())),
            "trade_date" => Some(|row: &Self| KeyPart::from(row.trade_date)),
            _ => None,
        }
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.company_id.clone()),
            Value::Text(self.trade_date.to_string()),
            Value::Double(self.open),
            Value::Double(self.high),
            Value::Double(self.low),
            Value::Double(self.close),
            Value::Double(self.volume),
        ]
    }
}

impl TableRow for IndicatorRecord {
    const TABLE: &'static str = "stock_price_ma";
    const COLUMNS: &'static [ColumnDef] = &[
        ColumnDef::text("company_id"),
        ColumnDef::date("trade_date"),
        ColumnDef::text("ma_type"),
        ColumnDef::double("ma_value"),
    ];

    fn key_accessor(column: &str) -> Option<KeyAccessor<Self>> {
        match column {
            "company_id" => Some(|row: &Self| KeyPart::from(row.company_id.as_str())),
            "trade_date" => Some(|row: &Self| KeyPart::from(row.trade_date)),
            "ma_type" => Some(|row: &Self| KeyPart::from(row.ma_type.as_str())),
            _ => None,
        }
    }

    fn values(&self) -> Vec<Value> {
        vec![
            Value::Text(self.company_id.clone()),
            Value::Text(self.trade_date.to_string()),
            Value::Text(self.ma_type.clone()),
            Value::Double(self.ma_value),
        ]
    }
}
