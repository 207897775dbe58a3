//! Index formulas for synthetic instruments.
//!
//! Each formula names one or more alternative component sets and combines one
//! price per component (given in the set's order) into the index value.

/// Combination formula of a synthetic instrument.
pub trait IndexFormula: Send + Sync {
    /// Name of the synthetic instrument.
    fn name(&self) -> &'static str;

    /// Alternative component sets, most preferred first.
    fn component_sets(&self) -> &'static [&'static [&'static str]];

    /// Index value for one price per component, ordered like the chosen set.
    fn compute(&self, prices: &[f64]) -> f64;
}

/// Looks up the formula of a synthetic instrument by name.
pub fn formula_for(name: &str) -> Option<Box<dyn IndexFormula>> {
    match name.trim().to_uppercase().as_str() {
        "USDLFX" => Some(Box::new(Usdlfx)),
        "EURLFX" => Some(Box::new(Eurlfx)),
        "USDX" => Some(Box::new(Usdx)),
        _ => None,
    }
}

const MAJORS: &[&str] = &["AUDUSD", "EURUSD", "GBPUSD", "USDCAD", "USDCHF", "USDJPY"];

/// LiteForex US dollar index.
///
/// `USDLFX = (USDCAD * USDCHF * USDJPY / (AUDUSD * EURUSD * GBPUSD)) ^ (1/7)`
pub struct Usdlfx;

impl IndexFormula for Usdlfx {
    fn name(&self) -> &'static str {
        "USDLFX"
    }

    fn component_sets(&self) -> &'static [&'static [&'static str]] {
        &[MAJORS]
    }

    fn compute(&self, p: &[f64]) -> f64 {
        usdlfx(p)
    }
}

fn usdlfx(p: &[f64]) -> f64 {
    let (audusd, eurusd, gbpusd, usdcad, usdchf, usdjpy) = (p[0], p[1], p[2], p[3], p[4], p[5]);
    (usdcad * usdchf * usdjpy / (audusd * eurusd * gbpusd)).powf(1.0 / 7.0)
}

/// LiteForex euro index, `EURLFX = USDLFX * EURUSD`.
pub struct Eurlfx;

impl IndexFormula for Eurlfx {
    fn name(&self) -> &'static str {
        "EURLFX"
    }

    fn component_sets(&self) -> &'static [&'static [&'static str]] {
        &[MAJORS]
    }

    fn compute(&self, p: &[f64]) -> f64 {
        usdlfx(p) * p[1]
    }
}

/// ICE US dollar index.
///
/// `USDX = 50.14348112 * EURUSD^-0.576 * USDJPY^0.136 * GBPUSD^-0.119
///        * USDCAD^0.091 * USDSEK^0.042 * USDCHF^0.036`
pub struct Usdx;

impl IndexFormula for Usdx {
    fn name(&self) -> &'static str {
        "USDX"
    }

    fn component_sets(&self) -> &'static [&'static [&'static str]] {
        &[&["EURUSD", "USDJPY", "GBPUSD", "USDCAD", "USDSEK", "USDCHF"]]
    }

    fn compute(&self, p: &[f64]) -> f64 {
        const WEIGHTS: [f64; 6] = [-0.576, 0.136, -0.119, 0.091, 0.042, 0.036];
        WEIGHTS
            .iter()
            .zip(p)
            .fold(50.143_481_12, |acc, (w, price)| acc * price.powf(*w))
    }
}
