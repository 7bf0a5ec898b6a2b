//! Confidence-valued predicates over live inputs.
//!
//! Conditions read their inputs on every evaluation; nothing is cached, so the
//! same tree evaluated twice a minute apart sees two different stoves.
//!
//! - `Membership`: sigmoid thresholds mapping a reading to a confidence.
//! - `Condition`: atoms combined with `&` (min), `|` (probabilistic sum), `!` (complement).
//! - `Valued`: `condition.implies(value)` and the weighted disjunction that
//!   blends several implications into one value and one confidence.

use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::sync::Arc;
use std::time::Duration;

/// A live input. `None` means the input is currently unknown (e.g. stale).
pub type Reading = Arc<dyn Fn() -> Option<f64> + Send + Sync>;

/// A value with the degree of truth it holds with, in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceValue<V> {
    pub value: V,
    pub confidence: f64,
}

impl<V> ConfidenceValue<V> {
    pub fn new(value: V, confidence: f64) -> Self {
        Self { value, confidence }
    }
}

/// `1 / (1 + 10^z)`, saturating to 0 or 1 instead of overflowing.
#[inline]
fn logistic10(z: f64) -> f64 {
    1.0 / (1.0 + 10f64.powf(z))
}

/// Sigmoid membership shapes. `give_or_take` is the distance from the threshold
/// at which confidence reaches roughly 0.09 / 0.91.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Membership {
    /// Rising: 0.5 at `from`, towards 1 above it.
    TrueFrom { from: f64, give_or_take: f64 },
    /// Falling: 0.5 at `until`, towards 1 below it.
    TrueUntil { until: f64, give_or_take: f64 },
    /// Minimum of a rising edge at `from` and a falling edge at `until`.
    TrueInRange {
        from: f64,
        until: f64,
        give_or_take_below: f64,
        give_or_take_above: f64,
    },
}

impl Membership {
    pub fn true_from(from: f64, give_or_take: f64) -> Self {
        Self::TrueFrom { from, give_or_take }
    }

    pub fn true_until(until: f64, give_or_take: f64) -> Self {
        Self::TrueUntil {
            until,
            give_or_take,
        }
    }

    pub fn true_in_range(from: f64, until: f64, give_or_take: f64) -> Self {
        Self::true_in_range_sloped(from, until, give_or_take, give_or_take)
    }

    pub fn true_in_range_sloped(from: f64, until: f64, below: f64, above: f64) -> Self {
        Self::TrueInRange {
            from,
            until,
            give_or_take_below: below,
            give_or_take_above: above,
        }
    }

    /// Falling edge over elapsed time; evaluated on readings in seconds.
    pub fn true_until_duration(until: Duration, give_or_take: Duration) -> Self {
        Self::true_until(until.as_secs_f64(), give_or_take.as_secs_f64())
    }

    /// Confidence for `x`. NaN is treated as "no evidence" (0); infinities saturate.
    pub fn confidence(&self, x: f64) -> f64 {
        if x.is_nan() {
            return 0.0;
        }
        let c = match *self {
            Membership::TrueFrom { from, give_or_take } => rising(x, from, give_or_take),
            Membership::TrueUntil {
                until,
                give_or_take,
            } => falling(x, until, give_or_take),
            Membership::TrueInRange {
                from,
                until,
                give_or_take_below,
                give_or_take_above,
            } => rising(x, from, give_or_take_below).min(falling(x, until, give_or_take_above)),
        };
        if c.is_nan() { 0.0 } else { c }
    }
}

#[inline]
fn rising(x: f64, from: f64, give_or_take: f64) -> f64 {
    logistic10(-(x - from) / give_or_take)
}

#[inline]
fn falling(x: f64, until: f64, give_or_take: f64) -> f64 {
    logistic10((x - until) / give_or_take)
}

/// A membership function applied to a live reading.
pub struct Atom {
    name: String,
    membership: Membership,
    input: Reading,
}

impl Atom {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn membership(&self) -> Membership {
        self.membership
    }

    /// Confidence for the current reading; an unknown reading yields 0.
    pub fn confidence(&self) -> f64 {
        (self.input)().map_or(0.0, |x| self.membership.confidence(x))
    }
}

/// A confidence-only predicate tree.
#[derive(Clone)]
pub enum Condition {
    Atom(Arc<Atom>),
    /// Minimum of the operands' confidences.
    And(Vec<Condition>),
    /// `1 - Π(1 - c_i)`.
    Or(Vec<Condition>),
    /// `1 - c`.
    Not(Box<Condition>),
}

impl Condition {
    pub fn atom(
        name: impl Into<String>,
        membership: Membership,
        input: impl Fn() -> Option<f64> + Send + Sync + 'static,
    ) -> Self {
        Self::Atom(Arc::new(Atom {
            name: name.into(),
            membership,
            input: Arc::new(input),
        }))
    }

    /// Atom over an elapsed-time input; pair with `Membership::true_until_duration`.
    pub fn duration_atom(
        name: impl Into<String>,
        membership: Membership,
        elapsed: impl Fn() -> Option<Duration> + Send + Sync + 'static,
    ) -> Self {
        Self::atom(name, membership, move || elapsed().map(|d| d.as_secs_f64()))
    }

    pub fn confidence(&self) -> f64 {
        match self {
            Condition::Atom(a) => a.confidence(),
            Condition::And(ops) => ops
                .iter()
                .map(Condition::confidence)
                .fold(1.0, f64::min),
            Condition::Or(ops) => 1.0 - ops.iter().map(|c| 1.0 - c.confidence()).product::<f64>(),
            Condition::Not(c) => 1.0 - c.confidence(),
        }
    }

    /// Attach a value: confidence stays this condition's, value is the consequence's.
    pub fn implies(self, consequence: impl Into<Consequence>) -> Valued {
        Valued::Implication {
            condition: self,
            consequence: consequence.into(),
        }
    }
}

impl BitAnd for Condition {
    type Output = Condition;

    fn bitand(self, rhs: Condition) -> Condition {
        match self {
            Condition::And(mut ops) => {
                ops.push(rhs);
                Condition::And(ops)
            }
            lhs => Condition::And(vec![lhs, rhs]),
        }
    }
}

impl BitOr for Condition {
    type Output = Condition;

    fn bitor(self, rhs: Condition) -> Condition {
        match self {
            Condition::Or(mut ops) => {
                ops.push(rhs);
                Condition::Or(ops)
            }
            lhs => Condition::Or(vec![lhs, rhs]),
        }
    }
}

impl Not for Condition {
    type Output = Condition;

    fn not(self) -> Condition {
        Condition::Not(Box::new(self))
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn join(f: &mut fmt::Formatter<'_>, ops: &[Condition], sep: &str) -> fmt::Result {
            f.write_str("(")?;
            for (i, op) in ops.iter().enumerate() {
                if i > 0 {
                    f.write_str(sep)?;
                }
                write!(f, "{op}")?;
            }
            f.write_str(")")
        }
        match self {
            Condition::Atom(a) => f.write_str(&a.name),
            Condition::And(ops) => join(f, ops, " & "),
            Condition::Or(ops) => join(f, ops, " | "),
            Condition::Not(c) => write!(f, "!{c}"),
        }
    }
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self} [{:.3}]", self.confidence())
    }
}

/// The value side of an implication.
#[derive(Clone)]
pub enum Consequence {
    Constant(f64),
    Live(Reading),
}

impl Consequence {
    pub fn live(f: impl Fn() -> Option<f64> + Send + Sync + 'static) -> Self {
        Self::Live(Arc::new(f))
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Consequence::Constant(v) => Some(*v),
            Consequence::Live(f) => f(),
        }
    }
}

impl From<f64> for Consequence {
    fn from(v: f64) -> Self {
        Consequence::Constant(v)
    }
}

/// Value-carrying predicates.
#[derive(Clone)]
pub enum Valued {
    Implication {
        condition: Condition,
        consequence: Consequence,
    },
    /// Confidence-weighted blend of the operands; see [`Valued::weighted_or`].
    WeightedOr(Vec<Valued>),
}

impl Valued {
    /// Blend several valued predicates.
    ///
    /// The value is the confidence-weighted average. The confidence is high when
    /// confident operands agree with that average: each operand's distance to the
    /// average is normalised by the largest distance, and
    /// `confidence = 1 - Π(1 - c_i · (1 - d_i))`.
    pub fn weighted_or(operands: Vec<Valued>) -> Self {
        Valued::WeightedOr(operands)
    }

    /// Evaluate against the current inputs. `None` means no actionable signal:
    /// the consequence is unknown, or every operand has zero confidence.
    pub fn evaluate(&self) -> Option<ConfidenceValue<f64>> {
        match self {
            Valued::Implication {
                condition,
                consequence,
            } => {
                let value = consequence.value().filter(|v| v.is_finite())?;
                Some(ConfidenceValue::new(value, condition.confidence()))
            }
            Valued::WeightedOr(operands) => {
                let evaluated: Vec<_> = operands.iter().filter_map(Valued::evaluate).collect();
                aggregate(&evaluated)
            }
        }
    }
}

/// Weighted blend of `(value, confidence)` pairs, `None` when the weights sum to 0.
pub fn aggregate(pairs: &[ConfidenceValue<f64>]) -> Option<ConfidenceValue<f64>> {
    let total_weight: f64 = pairs.iter().map(|p| p.confidence).sum();
    if total_weight.is_nan() || total_weight <= 0.0 {
        return None;
    }
    let avg = pairs.iter().map(|p| p.value * p.confidence).sum::<f64>() / total_weight;
    let largest = pairs
        .iter()
        .map(|p| (p.value - avg).abs())
        .fold(0.0, f64::max);
    let miss = pairs
        .iter()
        .map(|p| {
            // All operands agreeing exactly leaves nothing to normalise by
            let rel = if largest > 0.0 {
                (p.value - avg).abs() / largest
            } else {
                0.0
            };
            1.0 - p.confidence * (1.0 - rel)
        })
        .product::<f64>();
    Some(ConfidenceValue::new(avg, 1.0 - miss))
}
