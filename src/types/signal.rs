//! Entry-engine context and output types (spec.md §4.2, §9).
//!
//! The entry engine returns a polymorphic "signal or none"; spec.md §9
//! calls for modelling that as a sum type rather than a dict-shaped
//! optional, so `Signal` carries `None`/`Long`/`Short` variants with a
//! single confidence/strategy tag each.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrendDirection {
    Uptrend,
    Downtrend,
    Sideways,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VolumeTrend {
    Increasing,
    Decreasing,
    Unknown,
}

/// BTC or coin trend classification, computed once per bar and shared
/// across all three advanced strategies (spec.md §9: "pass them explicitly
/// rather than re-fetching").
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendSnapshot {
    pub trend: TrendDirection,
    pub strength: Decimal,
    pub price_change_pct: Decimal,
    pub ma5: Decimal,
    pub ma20: Decimal,
    pub volume_trend: VolumeTrend,
}

impl TrendSnapshot {
    pub fn unknown() -> Self {
        Self {
            trend: TrendDirection::Unknown,
            strength: Decimal::ZERO,
            price_change_pct: Decimal::ZERO,
            ma5: Decimal::ZERO,
            ma20: Decimal::ZERO,
            volume_trend: VolumeTrend::Unknown,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FundingSentiment {
    LongHeavy,
    ShortHeavy,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FundingInfo {
    pub funding_rate: Decimal,
    pub sentiment: FundingSentiment,
}

impl FundingInfo {
    /// A symbol with an empty ticker is treated as neutral with a zero
    /// rate (spec.md §9 Open Question, resolved: matches the original's
    /// silent catch).
    pub fn neutral() -> Self {
        Self {
            funding_rate: Decimal::ZERO,
            sentiment: FundingSentiment::Neutral,
        }
    }

    pub fn from_rate(funding_rate: Decimal) -> Self {
        use rust_decimal_macros::dec;
        let sentiment = if funding_rate > dec!(0.0001) {
            FundingSentiment::LongHeavy
        } else if funding_rate < dec!(-0.0001) {
            FundingSentiment::ShortHeavy
        } else {
            FundingSentiment::Neutral
        };
        Self {
            funding_rate,
            sentiment,
        }
    }
}

/// Everything the three advanced strategies need and would otherwise each
/// recompute: trend/funding/fibonacci context for one bar (spec.md §9).
#[derive(Debug, Clone)]
pub struct EntryContext {
    pub btc_trend: TrendSnapshot,
    pub coin_trend: TrendSnapshot,
    pub funding: FundingInfo,
    pub fib_levels: std::collections::HashMap<String, Decimal>,
}

/// Which of the engine's five strategies produced a signal, or that none
/// did / the attempt errored — mirrors spec.md §3's `best_strategy` domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BestStrategy {
    Basic,
    Advanced,
    None,
    Error,
}

/// Internal tag for which of the five named strategies fired, used to
/// classify a `Signal` into `BestStrategy::Basic`/`Advanced` and for
/// aggregation (spec.md §9's mode-of-strategy-column aggregation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    DowntrendShort,
    UptrendLong,
    SupportBounceLong,
    BasicLong,
    BasicShort,
}

impl StrategyKind {
    pub fn classify(&self) -> BestStrategy {
        match self {
            StrategyKind::DowntrendShort
            | StrategyKind::UptrendLong
            | StrategyKind::SupportBounceLong => BestStrategy::Advanced,
            StrategyKind::BasicLong | StrategyKind::BasicShort => BestStrategy::Basic,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectionalSignal {
    pub strategy: StrategyKind,
    pub confidence: Decimal,
    pub entry_price: Decimal,
    pub stop_loss: Decimal,
    pub take_profit: Decimal,
    pub expected_profit: Decimal,
    pub expected_loss: Decimal,
    pub fees: Decimal,
    pub net_profit: Decimal,
    pub rsi: Decimal,
    pub bb_position: Decimal,
    pub bb_width: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// The entry engine's output: no signal, a long, or a short.
#[derive(Debug, Clone)]
pub enum Signal {
    None,
    Long(DirectionalSignal),
    Short(DirectionalSignal),
}

impl Signal {
    pub fn is_some(&self) -> bool {
        !matches!(self, Signal::None)
    }

    pub fn confidence(&self) -> Decimal {
        match self {
            Signal::None => Decimal::ZERO,
            Signal::Long(s) | Signal::Short(s) => s.confidence,
        }
    }
}
