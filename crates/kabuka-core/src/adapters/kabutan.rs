//! Single-day source scraped from the Kabutan daily price page.
//!
//! The first body row of the `stock_kabuka0` table holds the latest session:
//! a `<th>` with a `<time datetime=..>` followed by open, high, low, close,
//! change, change % and volume cells.
//!
//! The page is matched with regular expressions keyed on the table's class
//! name and the tag shape of its cells, not with an HTML parser. Attribute
//! order and inline markup inside cells are tolerated. A redesign that
//! renames the class or drops the `datetime` attribute is not: it surfaces
//! as `NotFound` (table gone) or `Parse` (row shape changed).

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};

use regex::Regex;

use super::{status_error, transport_error};
use crate::http_client::{HttpClient, HttpRequest, ReqwestHttpClient};
use crate::source_policy::{SourcePolicy, MIN_SCRAPE_INTERVAL};
use crate::throttling::RequestPacer;
use crate::{
    parse_decimal, parse_trading_date, PriceBar, PriceRequest, PriceSource, SourceError, SourceId,
};

const BASE_URL: &str = "https://kabutan.jp/stock/kabuka";

struct Patterns {
    table: Regex,
    body: Regex,
    row: Regex,
    time: Regex,
    cell: Regex,
    tag: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        // Literal patterns; compilation cannot fail.
        let compile = |pattern: &str| Regex::new(pattern).expect("valid literal pattern");
        Patterns {
            table: compile(r#"(?is)<table[^>]*class="[^"]*\bstock_kabuka0\b[^"]*"[^>]*>(.*?)</table>"#),
            body: compile(r"(?is)<tbody[^>]*>(.*?)</tbody>"),
            row: compile(r"(?is)<tr[^>]*>(.*?)</tr>"),
            time: compile(r#"(?is)<time[^>]*datetime="([^"]+)""#),
            cell: compile(r"(?is)<td[^>]*>(.*?)</td>"),
            tag: compile(r"(?s)<[^>]*>"),
        }
    })
}

#[derive(Clone)]
pub struct KabutanAdapter {
    http_client: Arc<dyn HttpClient>,
    policy: SourcePolicy,
    pacer: RequestPacer,
}

impl Default for KabutanAdapter {
    fn default() -> Self {
        Self::with_http_client(Arc::new(ReqwestHttpClient::new()))
    }
}

impl KabutanAdapter {
    pub fn with_http_client(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_policy(http_client, SourcePolicy::kabutan_default())
    }

    /// The pacing interval is never shorter than one second.
    pub fn with_policy(http_client: Arc<dyn HttpClient>, policy: SourcePolicy) -> Self {
        let pacer = RequestPacer::from_policy(&policy, MIN_SCRAPE_INTERVAL);
        Self {
            http_client,
            policy,
            pacer,
        }
    }

    pub fn pacer(&self) -> &RequestPacer {
        &self.pacer
    }
}

impl PriceSource for KabutanAdapter {
    fn id(&self) -> SourceId {
        SourceId::Kabutan
    }

    fn fetch<'a>(
        &'a self,
        req: PriceRequest,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<PriceBar>, SourceError>> + Send + 'a>> {
        Box::pin(async move {
            let url = format!(
                "{BASE_URL}?code={}",
                urlencoding::encode(req.stock_code.as_str())
            );
            let request = HttpRequest::get(url).with_timeout(self.policy.timeout);

            self.pacer.ready().await;
            let response = self
                .http_client
                .execute(request)
                .await
                .map_err(|error| transport_error("kabutan", &error))?;
            if !response.is_success() {
                return Err(status_error("kabutan", response.status));
            }

            let bar = parse_latest_row(&response.body).map_err(|error| {
                SourceError::parse(format!("kabutan page for {}: {}", req.stock_code, error.message()))
            })?;
            match bar {
                Some(bar) => Ok(vec![bar]),
                None => Err(SourceError::not_found(format!(
                    "kabutan has no price table for {}",
                    req.stock_code
                ))),
            }
        })
    }
}

/// Extract the newest session from a price page; `None` when the page has no
/// price table or the table has no rows.
fn parse_latest_row(html: &str) -> Result<Option<PriceBar>, SourceError> {
    let patterns = patterns();

    let Some(table) = patterns.table.captures(html).and_then(|c| c.get(1)) else {
        return Ok(None);
    };
    let Some(body) = patterns.body.captures(table.as_str()).and_then(|c| c.get(1)) else {
        return Ok(None);
    };
    let Some(row) = patterns.row.captures(body.as_str()).and_then(|c| c.get(1)) else {
        return Ok(None);
    };
    let row = row.as_str();

    let datetime = patterns
        .time
        .captures(row)
        .and_then(|c| c.get(1))
        .ok_or_else(|| SourceError::parse("row has no <time datetime> header"))?
        .as_str();
    let trade_date = parse_trading_date(datetime.get(..10).unwrap_or(datetime))?;

    let cells = patterns
        .cell
        .captures_iter(row)
        .filter_map(|c| c.get(1))
        .map(|m| patterns.tag.replace_all(m.as_str(), "").trim().to_owned())
        .collect::<Vec<_>>();
    if cells.len() < 7 {
        return Err(SourceError::parse(format!(
            "expected 7 price cells, found {}",
            cells.len()
        )));
    }

    let bar = PriceBar::new(
        trade_date,
        parse_decimal("open", &cells[0])?,
        parse_decimal("high", &cells[1])?,
        parse_decimal("low", &cells[2])?,
        parse_decimal("close", &cells[3])?,
        parse_decimal("volume", &cells[6])?,
    )?;
    Ok(Some(bar))
}
