//! Company master data loaded from CSV.
//!
//! Expected header: `company_id,company_name,stock_code,country_code,
//! listed_market,foundation_date,longitude,latitude`; the last three columns
//! may be empty.

use std::io::Read;

use serde::Deserialize;
use thiserror::Error;

use kabuka_warehouse::CompanyRecord;

use crate::{parse_trading_date, StockCode, ValidationError};

#[derive(Debug, Error)]
pub enum MasterDataError {
    #[error("invalid company csv: {0}")]
    Csv(#[from] csv::Error),

    #[error("company csv line {line}: {source}")]
    Invalid {
        line: u64,
        #[source]
        source: ValidationError,
    },
}

#[derive(Debug, Deserialize)]
struct CompanyRow {
    company_id: String,
    company_name: String,
    stock_code: String,
    country_code: String,
    listed_market: String,
    #[serde(default)]
    foundation_date: Option<String>,
    #[serde(default)]
    longitude: Option<f64>,
    #[serde(default)]
    latitude: Option<f64>,
}

/// Parse and validate every company row of a CSV document.
pub fn read_companies(reader: impl Read) -> Result<Vec<CompanyRecord>, MasterDataError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut companies = Vec::new();
    for result in csv_reader.deserialize::<CompanyRow>() {
        let row = result?;
        let line = companies.len() as u64 + 2;
        let invalid = |source| MasterDataError::Invalid { line, source };

        let stock_code = StockCode::parse(&row.stock_code).map_err(invalid)?;
        let foundation_date = row
            .foundation_date
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(parse_trading_date)
            .transpose()
            .map_err(invalid)?;

        companies.push(CompanyRecord {
            company_id: row.company_id,
            company_name: row.company_name,
            stock_code: stock_code.into(),
            country_code: row.country_code.to_ascii_uppercase(),
            listed_market: row.listed_market,
            foundation_date,
            longitude: row.longitude,
            latitude: row.latitude,
        });
    }

    Ok(companies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn reads_rows_with_optional_columns() {
        let csv = "company_id,company_name,stock_code,country_code,listed_market,foundation_date,longitude,latitude\n\
0001,Technopro,6028,jp,TSE Prime,1997-06-01,139.73,35.66\n\
0002,ALBERT,3906,JP,TSE Growth,,,\n";

        let companies = read_companies(csv.as_bytes()).expect("companies");

        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].country_code, "JP");
        assert_eq!(companies[0].foundation_date, Some(date!(1997 - 06 - 01)));
        assert_eq!(companies[0].longitude, Some(139.73));
        assert_eq!(companies[1].foundation_date, None);
        assert_eq!(companies[1].latitude, None);
    }

    #[test]
    fn reports_the_line_of_an_invalid_row() {
        let csv = "company_id,company_name,stock_code,country_code,listed_market,foundation_date,longitude,latitude\n\
0001,Technopro,6028,JP,TSE,1997-06-01,,\n\
0002,Broken,39-06,JP,TSE,,,\n";

        let err = read_companies(csv.as_bytes()).expect_err("invalid stock code");
        assert!(matches!(err, MasterDataError::Invalid { line: 3, .. }));
    }
}
