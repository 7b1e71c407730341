//! Domain types shared by the sources, the engine and the pipelines.

mod ma_type;
mod price_bar;
mod stock_code;
mod trading_day;

pub use ma_type::{MaKind, MaType};
pub use price_bar::PriceBar;
pub use stock_code::StockCode;
pub use trading_day::{parse_decimal, parse_trading_date};
