use std::fs::File;
use std::io::BufReader;

use serde::Serialize;
use serde_json::Value;
use tracing::Span;

use kabuka_core::{read_companies, CompanyRecord, MergeReport, Warehouse};

use crate::cli::{ImportArgs, ListArgs};
use crate::error::CliError;

#[derive(Debug, Serialize)]
struct ImportResponseData {
    path: String,
    rows: usize,
    merge: MergeReport,
}

#[derive(Debug, Serialize)]
struct ListResponseData {
    companies: Vec<CompanyRecord>,
}

pub fn import(args: &ImportArgs, warehouse: &Warehouse, span: &Span) -> Result<Value, CliError> {
    let file = File::open(&args.path)?;
    let companies = read_companies(BufReader::new(file))?;
    let merge = warehouse.upsert_companies(&companies)?;
    tracing::info!(
        parent: span,
        path = %args.path.display(),
        rows = companies.len(),
        updated = merge.updated,
        inserted = merge.inserted,
        "imported companies"
    );

    Ok(serde_json::to_value(ImportResponseData {
        path: args.path.display().to_string(),
        rows: companies.len(),
        merge,
    })?)
}

pub fn list(args: &ListArgs, warehouse: &Warehouse) -> Result<Value, CliError> {
    let companies = match args.country.as_deref() {
        Some(country) => warehouse.companies_in_country(&country.trim().to_ascii_uppercase())?,
        None => warehouse.companies()?,
    };
    Ok(serde_json::to_value(ListResponseData { companies })?)
}
