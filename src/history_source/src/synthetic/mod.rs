//! Synthetic instruments computed from the M1 history of their components.
//!
//! A [`Synthesizer`] owns the target instrument, its [`IndexFormula`] and a
//! borrowed [`InstrumentRegistry`]. For one FXT day it:
//! 1. resolves the first component set whose instruments are all known,
//! 2. loads every component's stored M1 bars for the day (all or nothing),
//! 3. applies the formula to the aligned `open` and `close` prices, and
//! 4. derives `high`/`low`/`ticks` from the two rounded results.
//!
//! The synthesizer implements [`HistoryProvider`], so its output is stored
//! exactly like bars read from disk.

pub mod index;

use indexmap::IndexMap;
use snafu::ensure;
use tracing::{debug, error, info};

pub use index::{IndexFormula, formula_for};

use crate::{
    fxt,
    models::{
        bar::{Bar, round_price, to_points},
        instrument::Instrument,
        period::Period,
    },
    providers::{
        HistoryProvider, InstrumentRegistry, ProviderError,
        errors::{UnimplementedSnafu, UnknownInstrumentSnafu},
    },
};

/// Calculates the history of one synthetic instrument.
pub struct Synthesizer<'r, R: InstrumentRegistry + ?Sized> {
    instrument: Instrument,
    formula: Box<dyn IndexFormula>,
    registry: &'r R,
    loaded: IndexMap<String, Instrument>,
}

impl<'r, R: InstrumentRegistry + ?Sized> Synthesizer<'r, R> {
    /// Creates a synthesizer using the built-in formula for `instrument`.
    ///
    /// Errors:
    /// - [`ProviderError::UnknownInstrument`] if no formula exists for the name
    pub fn new(instrument: Instrument, registry: &'r R) -> Result<Self, ProviderError> {
        let Some(formula) = formula_for(&instrument.name) else {
            return UnknownInstrumentSnafu {
                name: format!("{} (no synthetic formula)", instrument.name),
            }
            .fail();
        };
        Ok(Self::with_formula(instrument, formula, registry))
    }

    /// Creates a synthesizer with an explicit formula.
    pub fn with_formula(instrument: Instrument, formula: Box<dyn IndexFormula>, registry: &'r R) -> Self {
        Self {
            instrument,
            formula,
            registry,
            loaded: IndexMap::new(),
        }
    }

    /// Resolves `names` to instruments, in order.
    ///
    /// Returns an empty vector as soon as one name is unknown; a partial set
    /// is never returned.
    pub fn resolve_components(&mut self, names: &[&str]) -> Vec<Instrument> {
        let mut out = Vec::with_capacity(names.len());
        for name in names {
            if let Some(known) = self.loaded.get(*name) {
                out.push(known.clone());
                continue;
            }
            match self.registry.find(name) {
                Some(instrument) => {
                    self.loaded.insert((*name).to_string(), instrument.clone());
                    out.push(instrument);
                }
                None => {
                    error!(instrument = %self.instrument.name, component = %name, "required instrument not available");
                    return Vec::new();
                }
            }
        }
        out
    }

    /// The first component set of the formula that fully resolves.
    pub fn select_components(&mut self) -> Vec<Instrument> {
        for set in self.formula.component_sets() {
            let components = self.resolve_components(set);
            if !components.is_empty() {
                return components;
            }
        }
        Vec::new()
    }

    /// Latest of the components' first stored M1 days, i.e. the first day for
    /// which every component has history.
    ///
    /// Returns `0` if any component has no stored history.
    pub fn find_common_history_start(&self, components: &[Instrument]) -> Result<i64, ProviderError> {
        let mut day = 0;
        for component in components {
            match self.registry.history_start_m1(component)? {
                Some(start) if start > 0 => day = day.max(start),
                _ => {
                    error!(instrument = %self.instrument.name, component = %component.name, "required M1 history not available");
                    return Ok(0);
                }
            }
        }
        info!(
            instrument = %self.instrument.name,
            start = %fxt::format_day(day),
            "available M1 history for all components"
        );
        Ok(day)
    }

    /// Earliest of the components' last stored M1 days, i.e. the last day for
    /// which every component has history.
    ///
    /// Returns `None` if any component's history end is unknown.
    pub fn find_common_history_end(&self, components: &[Instrument]) -> Result<Option<i64>, ProviderError> {
        let mut end: Option<i64> = None;
        for component in components {
            match self.registry.history_end_m1(component)? {
                Some(last) => end = Some(end.map_or(last, |e| e.min(last))),
                None => return Ok(None),
            }
        }
        Ok(end)
    }

    /// M1 bars of every component for `day`, in component order.
    ///
    /// Returns an empty vector if any component lacks history for the day or
    /// if the component series are not aligned bar by bar.
    pub fn components_history(&self, components: &[Instrument], day: i64) -> Result<Vec<Vec<Bar>>, ProviderError> {
        let mut series = Vec::with_capacity(components.len());
        for component in components {
            let bars = self.registry.history_m1(component, day)?;
            if bars.is_empty() {
                error!(
                    instrument = %self.instrument.name,
                    component = %component.name,
                    day = %fxt::format_day(day),
                    "required component history not available"
                );
                return Ok(Vec::new());
            }
            series.push(bars);
        }
        if let Some((reference, rest)) = series.split_first() {
            for (component, bars) in components[1..].iter().zip(rest) {
                let aligned = bars.len() == reference.len()
                    && bars.iter().zip(reference).all(|(a, b)| a.time == b.time);
                if !aligned {
                    error!(
                        instrument = %self.instrument.name,
                        component = %component.name,
                        day = %fxt::format_day(day),
                        "component history not aligned with {}",
                        components[0].name
                    );
                    return Ok(Vec::new());
                }
            }
        }
        Ok(series)
    }

    /// Calculates the bars of `period` for the FXT day containing `day`.
    ///
    /// A `day` of `0` starts at the components' common history start. Non-trading
    /// days and days with incomplete component history yield no bars.
    ///
    /// Errors:
    /// - [`ProviderError::Unimplemented`] for any period other than M1
    pub fn calculate_day(&mut self, period: Period, day: i64) -> Result<Vec<Bar>, ProviderError> {
        ensure!(
            period == Period::M1,
            UnimplementedSnafu {
                message: format!("{} history for synthetic {}", period, self.instrument.name),
            }
        );

        let components = self.select_components();
        if components.is_empty() {
            return Ok(Vec::new());
        }
        let day = match day {
            0 => match self.find_common_history_start(&components)? {
                0 => return Ok(Vec::new()),
                start => start,
            },
            d => fxt::day_start(d),
        };
        if !self.instrument.is_trading_day(day) {
            debug!(instrument = %self.instrument.name, day = %fxt::format_day(day), "skipping non-trading day");
            return Ok(Vec::new());
        }
        let series = self.components_history(&components, day)?;
        if series.is_empty() {
            return Ok(Vec::new());
        }
        info!(
            instrument = %self.instrument.name,
            day = %fxt::format_day(day),
            "calculating M1 history"
        );
        Ok(self.combine(&series))
    }

    fn combine(&self, series: &[Vec<Bar>]) -> Vec<Bar> {
        let digits = self.instrument.digits;
        let point = self.instrument.point();
        let mut opens = vec![0.0; series.len()];
        let mut closes = vec![0.0; series.len()];

        let count = series.first().map_or(0, Vec::len);
        let mut bars = Vec::with_capacity(count);
        for i in 0..count {
            for (c, component) in series.iter().enumerate() {
                opens[c] = component[i].open;
                closes[c] = component[i].close;
            }
            let open = round_price(self.formula.compute(&opens), digits);
            let close = round_price(self.formula.compute(&closes), digits);
            let (i_open, i_close) = (to_points(open, point), to_points(close, point));

            bars.push(Bar {
                time: series[0][i].time,
                open,
                high: if i_open > i_close { open } else { close },
                low: if i_open < i_close { open } else { close },
                close,
                ticks: if i_open == i_close {
                    1
                } else {
                    i_open.abs_diff(i_close) << 1
                },
            });
        }
        bars
    }
}

impl<R: InstrumentRegistry + ?Sized> HistoryProvider for Synthesizer<'_, R> {
    fn history(&mut self, period: Period, day: i64) -> Result<Vec<Bar>, ProviderError> {
        self.calculate_day(period, day)
    }

    fn history_start(&mut self, period: Period) -> Result<Option<i64>, ProviderError> {
        ensure!(
            period == Period::M1,
            UnimplementedSnafu {
                message: format!("{} history for synthetic {}", period, self.instrument.name),
            }
        );
        if let Some(start) = self.instrument.history_m1_start {
            return Ok(Some(start));
        }
        let components = self.select_components();
        if components.is_empty() {
            return Ok(None);
        }
        let start = self.find_common_history_start(&components)?;
        Ok((start > 0).then_some(start))
    }

    fn history_end(&mut self, period: Period) -> Result<Option<i64>, ProviderError> {
        ensure!(
            period == Period::M1,
            UnimplementedSnafu {
                message: format!("{} history for synthetic {}", period, self.instrument.name),
            }
        );
        if let Some(end) = self.instrument.history_m1_end {
            return Ok(Some(end));
        }
        let components = self.select_components();
        if components.is_empty() {
            return Ok(None);
        }
        self.find_common_history_end(&components)
    }
}
