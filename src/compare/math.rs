//! User-defined channels computed from a formula over raw channels.

use serde::Serialize;

use crate::error::{Error, Result};
use crate::expression::Expr;
use crate::parsers::LogRecord;

/// A named formula, compiled once when added
#[derive(Clone, Debug, Serialize)]
pub struct MathChannel {
    name: String,
    formula: String,
    #[serde(skip)]
    expr: Expr,
}

impl MathChannel {
    pub fn new(name: &str, formula: &str) -> Result<Self> {
        let expr = Expr::parse(formula).map_err(|reason| Error::InvalidFormula {
            name: name.to_string(),
            reason,
        })?;
        Ok(Self {
            name: name.to_string(),
            formula: formula.to_string(),
            expr,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The formula exactly as given
    pub fn formula(&self) -> &str {
        &self.formula
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// True if every referenced channel exists in `record`
    pub fn applies_to(&self, record: &LogRecord) -> bool {
        self.expr.variables().iter().all(|name| record.has_channel(name))
    }

    /// Evaluate at every sample, or `None` if the record lacks an input
    pub fn compute(&self, record: &LogRecord) -> Option<Vec<Option<f64>>> {
        if !self.applies_to(record) {
            return None;
        }
        let values = (0..record.len())
            .map(|i| self.value_at(record, i))
            .collect();
        Some(values)
    }

    /// Evaluate at one sample
    pub fn value_at(&self, record: &LogRecord, index: usize) -> Option<f64> {
        self.expr
            .evaluate(&|name: &str| record.value_at(name, index))
    }
}
