//! Built-in strategy engines (C10). Each is a pure function of its context
//! and parameters — no IO, no mutable state carried between calls.

use rust_decimal::Decimal;

use crate::types::{ParamError, SignalDecision, StrategyContext, StrategyEngine, StrategyParams};

fn sma(closes: &[Decimal], period: usize) -> Option<Decimal> {
    if closes.len() < period || period == 0 {
        return None;
    }
    let window = &closes[closes.len() - period..];
    let sum: Decimal = window.iter().copied().sum();
    Some(sum / Decimal::from(period as i64))
}

fn ema_series(closes: &[Decimal], period: usize) -> Vec<Decimal> {
    if closes.is_empty() || period == 0 {
        return Vec::new();
    }
    let alpha = Decimal::from(2) / Decimal::from((period + 1) as i64);
    let mut out = Vec::with_capacity(closes.len());
    let mut prev = closes[0];
    out.push(prev);
    for &c in &closes[1..] {
        prev = alpha * c + (Decimal::ONE - alpha) * prev;
        out.push(prev);
    }
    out
}

/// Moving-average crossover: BUY when the fast SMA crosses above the slow
/// SMA, SELL on a cross below, HOLD otherwise.
pub struct MovingAverageCrossover;

impl StrategyEngine for MovingAverageCrossover {
    fn evaluate(&self, ctx: &StrategyContext, params: &StrategyParams) -> SignalDecision {
        let fast_period = params.get_i64_or("fast_period", 5) as usize;
        let slow_period = params.get_i64_or("slow_period", 20) as usize;
        let closes = ctx.recent.closes();

        if closes.len() < slow_period + 1 {
            return SignalDecision::hold();
        }

        let prev_closes = &closes[..closes.len() - 1];
        let (Some(fast_now), Some(slow_now), Some(fast_prev), Some(slow_prev)) = (
            sma(&closes, fast_period),
            sma(&closes, slow_period),
            sma(prev_closes, fast_period),
            sma(prev_closes, slow_period),
        ) else {
            return SignalDecision::hold();
        };

        if fast_prev <= slow_prev && fast_now > slow_now {
            SignalDecision::buy("ma_crossover: fast crossed above slow")
        } else if fast_prev >= slow_prev && fast_now < slow_now {
            SignalDecision::sell("ma_crossover: fast crossed below slow")
        } else {
            SignalDecision::hold()
        }
    }

    fn validate_params(&self, params: &StrategyParams) -> Result<(), ParamError> {
        let fast = params.get_i64_or("fast_period", 5);
        let slow = params.get_i64_or("slow_period", 20);
        if fast <= 0 || slow <= 0 {
            return Err(ParamError("fast_period/slow_period must be > 0".into()));
        }
        if fast >= slow {
            return Err(ParamError("fast_period must be < slow_period".into()));
        }
        Ok(())
    }

    fn indicator_periods(&self, params: &StrategyParams) -> Vec<i64> {
        vec![
            params.get_i64_or("fast_period", 5),
            params.get_i64_or("slow_period", 20),
        ]
    }
}

/// RSI mean-reversion: BUY below the oversold threshold, SELL above the
/// overbought threshold.
pub struct RelativeStrengthIndex;

impl RelativeStrengthIndex {
    fn rsi(closes: &[Decimal], period: usize) -> Option<Decimal> {
        if closes.len() < period + 1 {
            return None;
        }
        let window = &closes[closes.len() - period - 1..];
        let mut gain_sum = Decimal::ZERO;
        let mut loss_sum = Decimal::ZERO;
        for pair in window.windows(2) {
            let delta = pair[1] - pair[0];
            if delta > Decimal::ZERO {
                gain_sum += delta;
            } else {
                loss_sum += -delta;
            }
        }
        let avg_gain = gain_sum / Decimal::from(period as i64);
        let avg_loss = loss_sum / Decimal::from(period as i64);
        if avg_loss == Decimal::ZERO {
            return Some(Decimal::from(100));
        }
        let rs = avg_gain / avg_loss;
        Some(Decimal::from(100) - Decimal::from(100) / (Decimal::ONE + rs))
    }
}

impl StrategyEngine for RelativeStrengthIndex {
    fn evaluate(&self, ctx: &StrategyContext, params: &StrategyParams) -> SignalDecision {
        let period = params.get_i64_or("period", 14) as usize;
        let oversold = Decimal::from(params.get_i64_or("oversold", 30));
        let overbought = Decimal::from(params.get_i64_or("overbought", 70));
        let closes = ctx.recent.closes();

        match Self::rsi(&closes, period) {
            Some(rsi) if rsi < oversold => SignalDecision::buy(format!("rsi {rsi} < oversold {oversold}")),
            Some(rsi) if rsi > overbought => {
                SignalDecision::sell(format!("rsi {rsi} > overbought {overbought}"))
            }
            _ => SignalDecision::hold(),
        }
    }

    fn validate_params(&self, params: &StrategyParams) -> Result<(), ParamError> {
        if params.get_i64_or("period", 14) <= 1 {
            return Err(ParamError("period must be > 1".into()));
        }
        Ok(())
    }

    fn indicator_periods(&self, params: &StrategyParams) -> Vec<i64> {
        vec![params.get_i64_or("period", 14)]
    }
}

/// Bollinger Bands: BUY when price closes below the lower band, SELL when it
/// closes above the upper band.
pub struct BollingerBands;

impl StrategyEngine for BollingerBands {
    fn evaluate(&self, ctx: &StrategyContext, params: &StrategyParams) -> SignalDecision {
        let period = params.get_i64_or("period", 20) as usize;
        let num_std = params.get_i64_or("num_std", 2);
        let closes = ctx.recent.closes();

        let Some(mean) = sma(&closes, period) else {
            return SignalDecision::hold();
        };
        let window = &closes[closes.len() - period..];
        let variance: Decimal = window
            .iter()
            .map(|c| (*c - mean) * (*c - mean))
            .sum::<Decimal>()
            / Decimal::from(period as i64);
        let variance_f64: f64 = variance.to_string().parse().unwrap_or(0.0);
        let std_dev = Decimal::try_from(variance_f64.sqrt()).unwrap_or(Decimal::ZERO);
        let band = std_dev * Decimal::from(num_std);
        let last = *closes.last().expect("checked non-empty via sma");

        if last < mean - band {
            SignalDecision::buy("price below lower bollinger band")
        } else if last > mean + band {
            SignalDecision::sell("price above upper bollinger band")
        } else {
            SignalDecision::hold()
        }
    }

    fn validate_params(&self, params: &StrategyParams) -> Result<(), ParamError> {
        if params.get_i64_or("period", 20) <= 1 {
            return Err(ParamError("period must be > 1".into()));
        }
        Ok(())
    }

    fn indicator_periods(&self, params: &StrategyParams) -> Vec<i64> {
        vec![params.get_i64_or("period", 20)]
    }
}

/// MACD: BUY when the MACD line crosses above its signal line, SELL on a
/// cross below.
pub struct Macd;

impl StrategyEngine for Macd {
    fn evaluate(&self, ctx: &StrategyContext, params: &StrategyParams) -> SignalDecision {
        let fast = params.get_i64_or("fast_period", 12) as usize;
        let slow = params.get_i64_or("slow_period", 26) as usize;
        let signal = params.get_i64_or("signal_period", 9) as usize;
        let closes = ctx.recent.closes();

        if closes.len() < slow + signal + 1 {
            return SignalDecision::hold();
        }

        let ema_fast = ema_series(&closes, fast);
        let ema_slow = ema_series(&closes, slow);
        let macd_line: Vec<Decimal> = ema_fast
            .iter()
            .zip(ema_slow.iter())
            .map(|(f, s)| *f - *s)
            .collect();
        let signal_line = ema_series(&macd_line, signal);

        let n = macd_line.len();
        let m = signal_line.len();
        if n < 2 || m < 2 {
            return SignalDecision::hold();
        }
        let macd_now = macd_line[n - 1];
        let macd_prev = macd_line[n - 2];
        let sig_now = signal_line[m - 1];
        let sig_prev = signal_line[m - 2];

        if macd_prev <= sig_prev && macd_now > sig_now {
            SignalDecision::buy("macd crossed above signal")
        } else if macd_prev >= sig_prev && macd_now < sig_now {
            SignalDecision::sell("macd crossed below signal")
        } else {
            SignalDecision::hold()
        }
    }

    fn validate_params(&self, params: &StrategyParams) -> Result<(), ParamError> {
        let fast = params.get_i64_or("fast_period", 12);
        let slow = params.get_i64_or("slow_period", 26);
        if fast <= 0 || slow <= 0 || fast >= slow {
            return Err(ParamError("fast_period must be > 0 and < slow_period".into()));
        }
        Ok(())
    }

    fn indicator_periods(&self, params: &StrategyParams) -> Vec<i64> {
        vec![
            params.get_i64_or("fast_period", 12),
            params.get_i64_or("slow_period", 26),
            params.get_i64_or("signal_period", 9),
        ]
    }
}
