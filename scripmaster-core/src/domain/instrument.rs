use serde::{Deserialize, Serialize};

/// One equity instrument from a vendor scrip master, in the shared shape.
///
/// Fields a vendor does not supply are empty strings, never `None`, so every
/// record serializes to the same column set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedInstrument {
    pub exchange: String,
    pub instrument_key: String,
    /// Trimmed and uppercased. Join key within one source.
    pub trading_symbol: String,
    pub name: String,
    pub security_id: String,
    pub symbol_name: String,
    pub short_name: String,
    pub isin: String,
}

impl NormalizedInstrument {
    /// Join key used by the reconciler.
    pub fn join_key(&self) -> (&str, &str) {
        (&self.exchange, &self.trading_symbol)
    }

    /// Value of a single column, for column-driven report writers.
    pub fn field(&self, column: InstrumentColumn) -> &str {
        match column {
            InstrumentColumn::Exchange => &self.exchange,
            InstrumentColumn::InstrumentKey => &self.instrument_key,
            InstrumentColumn::TradingSymbol => &self.trading_symbol,
            InstrumentColumn::Name => &self.name,
            InstrumentColumn::SecurityId => &self.security_id,
            InstrumentColumn::SymbolName => &self.symbol_name,
            InstrumentColumn::ShortName => &self.short_name,
            InstrumentColumn::Isin => &self.isin,
        }
    }
}

/// Canonical trading-symbol form: surrounding whitespace removed, uppercased.
pub fn normalize_symbol(raw: &str) -> String {
    raw.trim().to_uppercase()
}

/// Column of a [`NormalizedInstrument`], named as it appears in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentColumn {
    Exchange,
    InstrumentKey,
    TradingSymbol,
    Name,
    SecurityId,
    SymbolName,
    ShortName,
    Isin,
}

impl InstrumentColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exchange => "exchange",
            Self::InstrumentKey => "instrument_key",
            Self::TradingSymbol => "trading_symbol",
            Self::Name => "name",
            Self::SecurityId => "security_id",
            Self::SymbolName => "symbol_name",
            Self::ShortName => "short_name",
            Self::Isin => "isin",
        }
    }
}

impl std::fmt::Display for InstrumentColumn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trading symbol listed by both sources, merged field by field.
///
/// Serialized field order is the report column order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonInstrument {
    pub exchange: String,
    pub instrument_key: String,
    pub security_id: String,
    pub symbol_name: String,
    pub short_name: String,
    pub name: String,
    pub isin: String,
    pub trading_symbol: String,
}

impl CommonInstrument {
    /// Merge two records sharing a join key. Source A wins every field it
    /// fills; source B only fills A's gaps.
    pub fn merge(a: &NormalizedInstrument, b: &NormalizedInstrument) -> Self {
        fn pick(a: &str, b: &str) -> String {
            let chosen = if a.is_empty() { b } else { a };
            chosen.to_string()
        }

        Self {
            exchange: a.exchange.clone(),
            instrument_key: pick(&a.instrument_key, &b.instrument_key),
            security_id: pick(&a.security_id, &b.security_id),
            symbol_name: pick(&a.symbol_name, &b.symbol_name),
            short_name: pick(&a.short_name, &b.short_name),
            name: pick(&a.name, &b.name),
            isin: pick(&a.isin, &b.isin),
            trading_symbol: a.trading_symbol.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstox(symbol: &str, key: &str) -> NormalizedInstrument {
        NormalizedInstrument {
            exchange: "NSE".into(),
            instrument_key: key.into(),
            trading_symbol: symbol.into(),
            name: format!("{symbol} LTD"),
            short_name: format!("{symbol} LTD"),
            ..Default::default()
        }
    }

    #[test]
    fn normalize_symbol_trims_and_uppercases() {
        assert_eq!(normalize_symbol(" infy "), "INFY");
        assert_eq!(normalize_symbol("\tm&m\n"), "M&M");
        assert_eq!(normalize_symbol("TCS"), "TCS");
    }

    #[test]
    fn merge_prefers_source_a_and_fills_gaps_from_b() {
        let a = upstox("INFY", "NSE_EQ|INE009A01021");
        let b = NormalizedInstrument {
            exchange: "NSE".into(),
            instrument_key: "1594".into(),
            trading_symbol: "INFY".into(),
            name: "INFOSYS".into(),
            security_id: "1594".into(),
            symbol_name: "INFOSYS LIMITED".into(),
            ..Default::default()
        };

        let merged = CommonInstrument::merge(&a, &b);
        assert_eq!(merged.instrument_key, "NSE_EQ|INE009A01021");
        assert_eq!(merged.name, "INFY LTD");
        assert_eq!(merged.security_id, "1594");
        assert_eq!(merged.symbol_name, "INFOSYS LIMITED");
        assert_eq!(merged.isin, "");
    }

    #[test]
    fn field_lookup_matches_column_names() {
        let rec = upstox("TCS", "key3");
        assert_eq!(rec.field(InstrumentColumn::TradingSymbol), "TCS");
        assert_eq!(rec.field(InstrumentColumn::InstrumentKey), "key3");
        assert_eq!(InstrumentColumn::SecurityId.to_string(), "security_id");
    }
}
