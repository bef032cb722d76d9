//! Quartile grading and RFV score composition

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use thiserror::Error;

use crate::actions::ActionTable;
use crate::data::{aggregate_against, compute_reference_date, CustomerAggregate, PurchaseRecord};
use crate::error::{DataError, DataResult};

/// Quartile letter; `A` is always the most valuable band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Grade {
    A,
    B,
    C,
    D,
}

impl Grade {
    pub fn as_char(self) -> char {
        match self {
            Grade::A => 'A',
            Grade::B => 'B',
            Grade::C => 'C',
            Grade::D => 'D',
        }
    }

    pub fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'A' => Some(Grade::A),
            'B' => Some(Grade::B),
            'C' => Some(Grade::C),
            'D' => Some(Grade::D),
            _ => None,
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// Three-letter segment key, always in recency, frequency, value order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Score {
    pub recency: Grade,
    pub frequency: Grade,
    pub value: Grade,
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.recency, self.frequency, self.value)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid RFV score '{0}', expected three letters from A to D")]
pub struct ScoreParseError(pub String);

impl FromStr for Score {
    type Err = ScoreParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let grades: Vec<Grade> = s
            .trim()
            .chars()
            .map(Grade::from_char)
            .collect::<Option<_>>()
            .ok_or_else(|| ScoreParseError(s.to_string()))?;
        match grades.as_slice() {
            [r, f, v] => Ok(compose_score(*r, *f, *v)),
            _ => Err(ScoreParseError(s.to_string())),
        }
    }
}

/// 25th, 50th and 75th percentile of one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quartiles {
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
}

impl Quartiles {
    /// Compute quartiles over unsorted values; `None` when `values` is empty
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        Some(Self {
            q25: quantile(&sorted, 0.25)?,
            q50: quantile(&sorted, 0.50)?,
            q75: quantile(&sorted, 0.75)?,
        })
    }
}

/// Thresholds for all three metrics of one run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RfvQuartiles {
    pub recency: Quartiles,
    pub frequency: Quartiles,
    pub value: Quartiles,
}

/// Linear-interpolation quantile of an ascending slice
///
/// The quantile at fraction `p` sits at index `p * (n - 1)`; fractional indices
/// interpolate between the two neighbouring values.
pub fn quantile(sorted: &[f64], p: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let position = p.clamp(0.0, 1.0) * last as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;

    let low = *sorted.get(lower)?;
    let high = *sorted.get(upper)?;
    Some(low + (high - low) * fraction)
}

/// Quartile thresholds per metric across every customer
pub fn compute_quartiles(customers: &BTreeMap<String, CustomerAggregate>) -> DataResult<RfvQuartiles> {
    if customers.len() < 4 {
        warn!(
            "Only {} customers; quartile thresholds are interpolated from very few points",
            customers.len()
        );
    }

    let metric = |extract: fn(&CustomerAggregate) -> f64| {
        let values: Vec<f64> = customers.values().map(extract).collect();
        Quartiles::from_values(&values).ok_or(DataError::Empty)
    };

    let quartiles = RfvQuartiles {
        recency: metric(|c| c.recency_days as f64)?,
        frequency: metric(|c| c.frequency as f64)?,
        value: metric(|c| c.value)?,
    };
    debug!("Quartile thresholds: {:?}", quartiles);
    Ok(quartiles)
}

/// Fewer days since the last purchase earns a better grade
pub fn classify_recency(x: f64, thresholds: &Quartiles) -> Grade {
    if x <= thresholds.q25 {
        Grade::A
    } else if x <= thresholds.q50 {
        Grade::B
    } else if x <= thresholds.q75 {
        Grade::C
    } else {
        Grade::D
    }
}

/// More purchases or more spend earns a better grade
pub fn classify_freq_or_value(x: f64, thresholds: &Quartiles) -> Grade {
    if x <= thresholds.q25 {
        Grade::D
    } else if x <= thresholds.q50 {
        Grade::C
    } else if x <= thresholds.q75 {
        Grade::B
    } else {
        Grade::A
    }
}

pub fn compose_score(recency: Grade, frequency: Grade, value: Grade) -> Score {
    Score {
        recency,
        frequency,
        value,
    }
}

/// Fully graded customer
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRfv {
    pub customer_id: String,
    pub recency_days: i64,
    pub frequency: u64,
    pub value: f64,
    pub r_grade: Grade,
    pub f_grade: Grade,
    pub v_grade: Grade,
    pub score: Score,
    /// `None` when the score has no entry in the action table
    pub action: Option<String>,
}

/// Result of one segmentation run
#[derive(Debug, Clone, PartialEq)]
pub struct RfvReport {
    /// Latest purchase date in the dataset; recency is measured from here
    pub reference_date: NaiveDateTime,
    pub quartiles: RfvQuartiles,
    /// Ordered by customer identifier
    pub customers: Vec<CustomerRfv>,
}

impl RfvReport {
    pub fn summarize(&self) -> BTreeMap<Score, usize> {
        summarize(&self.customers)
    }

    /// Score counts, largest segment first; ties keep score order
    pub fn ranked_summary(&self) -> Vec<(Score, usize)> {
        let mut ranked: Vec<(Score, usize)> = self.summarize().into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ranked
    }
}

/// Number of customers per score
pub fn summarize(customers: &[CustomerRfv]) -> BTreeMap<Score, usize> {
    let mut counts = BTreeMap::new();
    for customer in customers {
        *counts.entry(customer.score).or_insert(0) += 1;
    }
    counts
}

/// Run the whole segmentation over one purchase log
///
/// # Arguments
/// * `records` - Every purchase in the uploaded dataset
/// * `actions` - Marketing recommendation per score
///
/// # Returns
/// * `RfvReport` with one graded row per distinct customer
pub fn compute_rfv(records: &[PurchaseRecord], actions: &ActionTable) -> DataResult<RfvReport> {
    let reference_date = compute_reference_date(records)?;
    let aggregated = aggregate_against(records, reference_date)?;
    let quartiles = compute_quartiles(&aggregated)?;

    let customers: Vec<CustomerRfv> = aggregated
        .into_values()
        .map(|customer| grade_customer(customer, &quartiles, actions))
        .collect();

    let unmapped = customers.iter().filter(|c| c.action.is_none()).count();
    info!(
        "Segmented {} customers as of {} ({} without a mapped action)",
        customers.len(),
        reference_date,
        unmapped
    );

    Ok(RfvReport {
        reference_date,
        quartiles,
        customers,
    })
}

fn grade_customer(
    customer: CustomerAggregate,
    quartiles: &RfvQuartiles,
    actions: &ActionTable,
) -> CustomerRfv {
    let r_grade = classify_recency(customer.recency_days as f64, &quartiles.recency);
    let f_grade = classify_freq_or_value(customer.frequency as f64, &quartiles.frequency);
    let v_grade = classify_freq_or_value(customer.value, &quartiles.value);
    let score = compose_score(r_grade, f_grade, v_grade);

    CustomerRfv {
        customer_id: customer.customer_id,
        recency_days: customer.recency_days,
        frequency: customer.frequency,
        value: customer.value,
        r_grade,
        f_grade,
        v_grade,
        score,
        action: actions.map_action(&score).map(str::to_owned),
    }
}
