//! Vendor profiles: how one vendor's scrip master maps onto
//! [`NormalizedInstrument`](crate::domain::NormalizedInstrument).

use crate::domain::InstrumentColumn;
use serde::{Deserialize, Serialize};

/// Column layout and row filter for one vendor feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorProfile {
    pub name: String,
    /// Column holding the vendor's exchange/segment id.
    pub exchange_column: String,
    /// Value of `exchange_column` a row must carry to qualify.
    pub target_exchange: String,
    pub instrument_type_column: String,
    /// Matched case-insensitively.
    #[serde(default = "default_instrument_type")]
    pub instrument_type: String,
    /// Exchange written into every normalized record.
    pub normalized_exchange: String,
    /// Columns of this source's "only in" report, in order.
    pub report_columns: Vec<InstrumentColumn>,
    pub columns: ColumnMapping,
}

/// Vendor header names for each normalized field. `None` means the vendor
/// does not supply the field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    pub instrument_key: String,
    pub trading_symbol: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub short_name: Option<String>,
    /// Required in the header whenever it is mapped.
    #[serde(default)]
    pub security_id: Option<String>,
    #[serde(default)]
    pub symbol_name: Option<String>,
    #[serde(default)]
    pub isin: Option<String>,
}

fn default_instrument_type() -> String {
    "EQUITY".to_string()
}

impl VendorProfile {
    pub const UPSTOX_NSE: &'static str = "upstox_nse";
    pub const DHAN_NSE: &'static str = "dhan_nse";

    /// Look up a built-in profile by name.
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            Self::UPSTOX_NSE => Some(Self::upstox_nse()),
            Self::DHAN_NSE => Some(Self::dhan_nse()),
            _ => None,
        }
    }

    pub fn preset_names() -> &'static [&'static str] {
        &[Self::UPSTOX_NSE, Self::DHAN_NSE]
    }

    /// Upstox NSE instrument master (`NSE.csv.gz`).
    pub fn upstox_nse() -> Self {
        Self {
            name: "upstox".into(),
            exchange_column: "exchange".into(),
            target_exchange: "NSE_EQ".into(),
            instrument_type_column: "instrument_type".into(),
            instrument_type: default_instrument_type(),
            normalized_exchange: "NSE".into(),
            columns: ColumnMapping {
                instrument_key: "instrument_key".into(),
                trading_symbol: "tradingsymbol".into(),
                name: Some("name".into()),
                short_name: Some("name".into()),
                security_id: None,
                symbol_name: None,
                isin: None,
            },
            report_columns: vec![
                InstrumentColumn::InstrumentKey,
                InstrumentColumn::TradingSymbol,
                InstrumentColumn::Name,
                InstrumentColumn::Exchange,
                InstrumentColumn::ShortName,
                InstrumentColumn::Isin,
            ],
        }
    }

    /// Dhan API scrip master (`api-scrip-master.csv`).
    pub fn dhan_nse() -> Self {
        Self {
            name: "dhan".into(),
            exchange_column: "SEM_EXM_EXCH_ID".into(),
            target_exchange: "NSE".into(),
            instrument_type_column: "SEM_INSTRUMENT_NAME".into(),
            instrument_type: default_instrument_type(),
            normalized_exchange: "NSE".into(),
            columns: ColumnMapping {
                instrument_key: "SEM_SMST_SECURITY_ID".into(),
                trading_symbol: "SEM_TRADING_SYMBOL".into(),
                name: Some("SEM_CUSTOM_SYMBOL".into()),
                short_name: None,
                security_id: Some("SEM_SMST_SECURITY_ID".into()),
                symbol_name: Some("SM_SYMBOL_NAME".into()),
                isin: None,
            },
            report_columns: vec![
                InstrumentColumn::Exchange,
                InstrumentColumn::InstrumentKey,
                InstrumentColumn::SecurityId,
                InstrumentColumn::TradingSymbol,
                InstrumentColumn::SymbolName,
                InstrumentColumn::Name,
            ],
        }
    }

    /// Header names that must be present, in the order they are checked.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut cols = vec![
            self.exchange_column.as_str(),
            self.instrument_type_column.as_str(),
            self.columns.instrument_key.as_str(),
            self.columns.trading_symbol.as_str(),
        ];
        if let Some(sec) = &self.columns.security_id {
            cols.push(sec.as_str());
        }
        cols
    }
}
