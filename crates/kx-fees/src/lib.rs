//! Commission and transaction-tax computation for fills (C2).
//!
//! Constructor-injected, no global singleton: a `FeeCalculator` is built once
//! at wiring time from configuration and threaded through the reconciliation
//! listener that builds `Fill`s.

use kx_schemas::{round_half_up, Side};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Instrument classes the default tax ruleset distinguishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentClass {
    Kospi,
    Kosdaq,
    Konex,
    Etf,
}

/// Resolves a symbol to an instrument class. Replaceable so the mapping can
/// move to a reference-data table without touching `FeeCalculator`.
pub trait SymbolClassifier: Send + Sync {
    fn classify(&self, symbol: &str) -> InstrumentClass;
}

/// Prefix-convention classifier: ETF tickers are distinguished by a
/// configured prefix set, KONEX by another, everything else falls back to
/// KOSDAQ/KOSPI split on a configured prefix set as well. Good enough in the
/// absence of a reference-data service; swap in a DB-backed classifier later
/// without touching callers.
#[derive(Clone, Debug, Default)]
pub struct PrefixSymbolClassifier {
    pub etf_prefixes: Vec<String>,
    pub konex_prefixes: Vec<String>,
    pub kosdaq_prefixes: Vec<String>,
}

impl SymbolClassifier for PrefixSymbolClassifier {
    fn classify(&self, symbol: &str) -> InstrumentClass {
        if self.etf_prefixes.iter().any(|p| symbol.starts_with(p)) {
            InstrumentClass::Etf
        } else if self.konex_prefixes.iter().any(|p| symbol.starts_with(p)) {
            InstrumentClass::Konex
        } else if self.kosdaq_prefixes.iter().any(|p| symbol.starts_with(p)) {
            InstrumentClass::Kosdaq
        } else {
            InstrumentClass::Kospi
        }
    }
}

/// Transaction tax rate per instrument class. Runtime-replaceable so policy
/// changes don't require touching the fee calculator itself.
pub trait TaxRuleSet: Send + Sync {
    fn sell_tax_rate(&self, class: InstrumentClass) -> Decimal;
}

#[derive(Clone, Debug)]
pub struct DefaultTaxRuleSet;

impl TaxRuleSet for DefaultTaxRuleSet {
    fn sell_tax_rate(&self, class: InstrumentClass) -> Decimal {
        match class {
            InstrumentClass::Kospi => Decimal::new(23, 4),   // 0.23%
            InstrumentClass::Kosdaq => Decimal::new(23, 4),  // 0.23%
            InstrumentClass::Konex => Decimal::new(10, 4),   // 0.10%
            InstrumentClass::Etf => Decimal::ZERO,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CommissionSchedule {
    pub rate: Decimal,
    pub minimum: Decimal,
}

impl CommissionSchedule {
    pub fn sane_default() -> Self {
        Self {
            rate: Decimal::new(15, 5), // 0.015%
            minimum: Decimal::ZERO,
        }
    }
}

pub struct FeeCalculator {
    commission: CommissionSchedule,
    tax_rules: Box<dyn TaxRuleSet>,
    classifier: Box<dyn SymbolClassifier>,
}

impl FeeCalculator {
    pub fn new(
        commission: CommissionSchedule,
        tax_rules: Box<dyn TaxRuleSet>,
        classifier: Box<dyn SymbolClassifier>,
    ) -> Self {
        Self {
            commission,
            tax_rules,
            classifier,
        }
    }

    pub fn sane_default() -> Self {
        Self::new(
            CommissionSchedule::sane_default(),
            Box::new(DefaultTaxRuleSet),
            Box::new(PrefixSymbolClassifier::default()),
        )
    }

    /// Commission on either side, rounded to whole KRW, HALF_UP, floored at
    /// the configured minimum.
    pub fn calculate_fee(&self, price: Decimal, qty: i64) -> Decimal {
        let gross = price * Decimal::from(qty) * self.commission.rate;
        let rounded = round_half_up(gross, 0);
        rounded.max(self.commission.minimum)
    }

    /// Transaction tax: zero on BUY, instrument-class rate on SELL.
    pub fn calculate_tax(&self, symbol: &str, price: Decimal, qty: i64, side: Side) -> Decimal {
        if side == Side::Buy {
            return Decimal::ZERO;
        }
        let class = self.classifier.classify(symbol);
        let rate = self.tax_rules.sell_tax_rate(class);
        round_half_up(price * Decimal::from(qty) * rate, 0)
    }
}
