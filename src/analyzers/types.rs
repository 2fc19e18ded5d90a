//! Data types shared by the metric stages.

use std::fmt;

/// Column a stage uses to find its row in the metrics table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyColumn {
    MiddleDate,
    StartDate,
}

impl KeyColumn {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyColumn::MiddleDate => "middle_date",
            KeyColumn::StartDate => "start_date",
        }
    }
}

impl fmt::Display for KeyColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Text(String),
    Number(f64),
}

impl MetricValue {
    /// Cell text as written to CSV. NaN becomes an empty cell and integral
    /// numbers drop their fraction.
    pub fn to_cell(&self) -> String {
        match self {
            MetricValue::Text(s) => s.clone(),
            MetricValue::Number(v) => format_number(*v),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Number(v) => Some(*v),
            MetricValue::Text(_) => None,
        }
    }
}

pub fn format_number(v: f64) -> String {
    if v.is_nan() {
        String::new()
    } else if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{v}")
    }
}

/// One stage's output for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsRow {
    pub key: String,
    pub values: Vec<(String, MetricValue)>,
}

impl MetricsRow {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            values: Vec::new(),
        }
    }

    pub fn text(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.push((name.into(), MetricValue::Text(value.into())));
    }

    pub fn number(&mut self, name: impl Into<String>, value: f64) {
        self.values.push((name.into(), MetricValue::Number(value)));
    }

    pub fn count(&mut self, name: impl Into<String>, value: usize) {
        self.number(name, value as f64);
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.values.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(MetricValue::as_f64)
    }
}
