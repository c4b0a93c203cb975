//! Numeric noise
//!
//! `span` is either an absolute width or, in proportional mode, a fraction
//! of the value. Noise is drawn uniformly from `[-span/2, span/2]` through a
//! [`NoiseSampler`] so callers can inject deterministic noise.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::Outcome;
use crate::anonymization::context::OperationKind;
use crate::domain::{classify, NodeId, RecordTree, Result, Scalar, ValueKind, VeilError};

/// Thread-safe source of uniform noise
pub trait NoiseSampler: Send + Sync {
    /// Sample from `[low, high]`
    fn sample(&self, low: f64, high: f64) -> f64;
}

/// Draws from the thread-local RNG on every call
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngSampler;

impl NoiseSampler for ThreadRngSampler {
    fn sample(&self, low: f64, high: f64) -> f64 {
        if !low.is_finite() || !high.is_finite() {
            return 0.0;
        }
        if low >= high {
            return low;
        }
        rand::thread_rng().gen_range(low..=high)
    }
}

/// Adapts a closure into a sampler
pub struct FnSampler<F>(pub F);

impl<F> NoiseSampler for FnSampler<F>
where
    F: Fn(f64, f64) -> f64 + Send + Sync,
{
    fn sample(&self, low: f64, high: f64) -> f64 {
        (self.0)(low, high)
    }
}

/// How `span` is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RangeType {
    #[default]
    Fixed,
    Proportional,
}

/// Resolved perturb settings
#[derive(Debug, Clone, PartialEq)]
pub struct PerturbSettings {
    pub span: f64,
    pub range_type: RangeType,
    pub round_to: u32,
}

impl PerturbSettings {
    /// Perturbs one number of the given kind
    ///
    /// Fails when the noise width or the result leaves the finite range.
    pub fn perturb_number(
        &self,
        value: f64,
        kind: ValueKind,
        noise: &dyn NoiseSampler,
    ) -> Result<f64> {
        let span = match self.range_type {
            RangeType::Fixed => self.span,
            RangeType::Proportional => (value * self.span).abs(),
        };
        if !value.is_finite() || !span.is_finite() {
            return Err(VeilError::format(format!(
                "cannot perturb {value} by a span of {span}"
            )));
        }
        let jitter = if span > 0.0 {
            noise.sample(-span / 2.0, span / 2.0)
        } else {
            0.0
        };

        let decimals = match kind {
            ValueKind::Integer | ValueKind::Unsigned => 0,
            _ => self.round_to,
        };
        let factor = 10f64.powi(decimals as i32);
        let noisy = value + jitter;
        if !noisy.is_finite() {
            return Err(VeilError::format(format!(
                "perturbing {value} overflows the numeric range"
            )));
        }
        let scaled = noisy * factor;
        let rounded = if scaled.is_finite() {
            scaled.round() / factor
        } else {
            noisy
        };

        Ok(if kind == ValueKind::Unsigned {
            rounded.max(0.0)
        } else {
            rounded
        })
    }
}

/// Perturbs a numeric node
///
/// Quantity-family nodes are left alone so that the walk reaches their
/// numeric `value` child.
pub fn perturb(
    tree: &mut RecordTree,
    node: NodeId,
    settings: &PerturbSettings,
    noise: &dyn NoiseSampler,
) -> Result<Outcome> {
    let kind = classify(&tree.node(node).type_name);
    if !kind.is_numeric() {
        return Ok(Outcome::unchanged());
    }
    let Some(value) = tree.value(node) else {
        return Ok(Outcome::unchanged());
    };

    let replacement = match value {
        Scalar::Integer(i) => {
            let out = settings.perturb_number(*i as f64, kind, noise)?;
            if out.fract() == 0.0 {
                Scalar::Integer(out as i64)
            } else {
                Scalar::Decimal(out)
            }
        }
        Scalar::Decimal(d) => Scalar::Decimal(settings.perturb_number(*d, kind, noise)?),
        Scalar::String(text) => {
            let decimals = match kind {
                ValueKind::Integer | ValueKind::Unsigned => 0,
                _ => settings.round_to as usize,
            };
            let parts = text
                .split('\\')
                .map(|part| {
                    let number: f64 = part.trim().parse().map_err(|_| {
                        VeilError::format(format!("'{part}' is not a number"))
                    })?;
                    let out = settings.perturb_number(number, kind, noise)?;
                    Ok(format!("{out:.decimals$}"))
                })
                .collect::<Result<Vec<_>>>()?;
            Scalar::String(parts.join("\\"))
        }
        Scalar::Boolean(_) => return Ok(Outcome::unchanged()),
    };

    tree.set_value(node, Some(replacement));
    Ok(Outcome::changed(OperationKind::Perturbed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Node, RecordFormat};

    fn fixed(span: f64, round_to: u32) -> PerturbSettings {
        PerturbSettings {
            span,
            range_type: RangeType::Fixed,
            round_to,
        }
    }

    fn upper() -> FnSampler<impl Fn(f64, f64) -> f64 + Send + Sync> {
        FnSampler(|_low: f64, high: f64| high)
    }

    fn node(format: RecordFormat, type_name: &str, value: Scalar) -> (RecordTree, NodeId) {
        let mut tree = RecordTree::new(format, Node::new("Observation", "Observation"));
        let root = tree.root();
        let id = tree.add_child(root, Node::leaf("value", type_name, value));
        (tree, id)
    }

    #[test]
    fn test_fixed_span_with_injected_noise() {
        let out = fixed(2.0, 2).perturb_number(10.0, ValueKind::Decimal, &upper())
            .unwrap();
        assert_eq!(out, 11.0);
    }

    #[test]
    fn test_proportional_span() {
        let settings = PerturbSettings {
            span: 0.1,
            range_type: RangeType::Proportional,
            round_to: 2,
        };
        let out = settings.perturb_number(-50.0, ValueKind::Decimal, &upper())
            .unwrap();
        assert_eq!(out, -47.5);
    }

    #[test]
    fn test_unsigned_clamps_at_zero() {
        let low = FnSampler(|low: f64, _high: f64| low);
        let out = fixed(10.0, 2).perturb_number(1.0, ValueKind::Unsigned, &low)
            .unwrap();
        assert_eq!(out, 0.0);
    }

    #[test]
    fn test_thread_rng_stays_in_range() {
        let settings = fixed(4.0, 3);
        for _ in 0..200 {
            let out = settings
                .perturb_number(100.0, ValueKind::Decimal, &ThreadRngSampler)
                .unwrap();
            assert!((98.0..=102.0).contains(&out));
        }
    }

    #[test]
    fn test_proportional_overflow_is_a_format_error() {
        let settings = PerturbSettings {
            span: 10.0,
            range_type: RangeType::Proportional,
            round_to: 2,
        };
        let err = settings
            .perturb_number(1e308, ValueKind::Decimal, &ThreadRngSampler)
            .unwrap_err();
        assert!(matches!(err, VeilError::Format(_)));
    }

    #[test]
    fn test_noise_pushing_past_max_is_a_format_error() {
        let err = fixed(f64::MAX, 2)
            .perturb_number(f64::MAX, ValueKind::Decimal, &upper())
            .unwrap_err();
        assert!(matches!(err, VeilError::Format(_)));
    }

    #[test]
    fn test_thread_rng_ignores_infinite_bounds() {
        let out = ThreadRngSampler.sample(f64::NEG_INFINITY, f64::INFINITY);
        assert_eq!(out, 0.0);
    }

    #[test]
    fn test_overflowing_node_is_left_untouched() {
        let (mut tree, id) = node(RecordFormat::Fhir, "decimal", Scalar::Decimal(1e308));
        let settings = PerturbSettings {
            span: 10.0,
            range_type: RangeType::Proportional,
            round_to: 2,
        };
        assert!(perturb(&mut tree, id, &settings, &ThreadRngSampler).is_err());
        assert_eq!(tree.value(id), Some(&Scalar::Decimal(1e308)));
    }

    #[test]
    fn test_integer_node_rounds_to_whole() {
        let (mut tree, id) = node(RecordFormat::Fhir, "integer", Scalar::Integer(10));
        let quarter = FnSampler(|_l: f64, _h: f64| 0.4);
        perturb(&mut tree, id, &fixed(1.0, 2), &quarter).unwrap();
        assert_eq!(tree.value(id), Some(&Scalar::Integer(10)));
    }

    #[test]
    fn test_dicom_multi_valued_decimal_string() {
        let (mut tree, id) = node(RecordFormat::Dicom, "DS", Scalar::from("1.5\\2.5"));
        let outcome = perturb(&mut tree, id, &fixed(1.0, 1), &upper()).unwrap();
        assert_eq!(outcome.kind, Some(OperationKind::Perturbed));
        assert_eq!(tree.value(id), Some(&Scalar::from("2.0\\3.0")));
    }

    #[test]
    fn test_quantity_and_text_are_skipped() {
        let (mut tree, id) = node(RecordFormat::Fhir, "Quantity", Scalar::from("x"));
        assert_eq!(perturb(&mut tree, id, &fixed(1.0, 1), &upper()).unwrap().kind, None);

        let (mut tree, id) = node(RecordFormat::Fhir, "string", Scalar::from("12"));
        assert_eq!(perturb(&mut tree, id, &fixed(1.0, 1), &upper()).unwrap().kind, None);
        assert_eq!(tree.value(id), Some(&Scalar::from("12")));
    }

    #[test]
    fn test_non_numeric_dicom_string_is_format_error() {
        let (mut tree, id) = node(RecordFormat::Dicom, "IS", Scalar::from("abc"));
        assert!(matches!(
            perturb(&mut tree, id, &fixed(1.0, 1), &upper()),
            Err(VeilError::Format(_))
        ));
    }
}
