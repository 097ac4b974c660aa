//! Pearson correlation with two-sided significance, and the square matrices
//! the table summary reports.
//!
//! The p-value comes from Student's t with `n - 2` degrees of freedom. Since
//! `t² = r²·df / (1 - r²)`, the two-sided tail collapses to the regularized
//! incomplete beta `I_{1-r²}(df/2, 1/2)`.

use std::f64::consts::PI;

use serde::{Serialize, Serializer, ser::SerializeMap};

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pearson {
    #[serde(rename = "correlacion")]
    pub coefficient: f64,
    #[serde(rename = "p_valor")]
    pub p_value: f64,
    #[serde(rename = "observaciones")]
    pub observations: usize,
}

impl Pearson {
    fn undefined(observations: usize) -> Self {
        Self {
            coefficient: f64::NAN,
            p_value: f64::NAN,
            observations,
        }
    }
}

/// Correlates the rows where both sides are present.
pub fn pearson_pairwise(left: &[Option<f64>], right: &[Option<f64>]) -> Pearson {
    let (xs, ys): (Vec<f64>, Vec<f64>) = left
        .iter()
        .zip(right)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .unzip();
    pearson(&xs, &ys)
}

pub fn pearson(xs: &[f64], ys: &[f64]) -> Pearson {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return Pearson::undefined(n);
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return Pearson::undefined(n);
    }
    let coefficient = (sxy / (sxx * syy).sqrt()).clamp(-1.0, 1.0);
    Pearson {
        coefficient,
        p_value: two_sided_p_value(coefficient, n),
        observations: n,
    }
}

pub fn two_sided_p_value(r: f64, n: usize) -> f64 {
    if n < 3 || r.is_nan() {
        return f64::NAN;
    }
    if r.abs() >= 1.0 {
        return 0.0;
    }
    let df = (n - 2) as f64;
    regularized_incomplete_beta(df / 2.0, 0.5, 1.0 - r * r)
}

const LANCZOS_G: f64 = 7.0;
const LANCZOS_COEFFICIENTS: [f64; 9] = [
    0.999_999_999_999_809_9,
    676.520_368_121_885_1,
    -1_259.139_216_722_402_8,
    771.323_428_777_653_1,
    -176.615_029_162_140_6,
    12.507_343_278_686_905,
    -0.138_571_095_265_720_12,
    9.984_369_578_019_572e-6,
    1.505_632_735_149_311_6e-7,
];

fn ln_gamma(x: f64) -> f64 {
    if x < 0.5 {
        // Reflection formula.
        return PI.ln() - (PI * x).sin().ln() - ln_gamma(1.0 - x);
    }
    let x = x - 1.0;
    let t = x + LANCZOS_G + 0.5;
    let series = LANCZOS_COEFFICIENTS
        .iter()
        .enumerate()
        .skip(1)
        .fold(LANCZOS_COEFFICIENTS[0], |acc, (i, c)| acc + c / (x + i as f64));
    0.5 * (2.0 * PI).ln() + (x + 0.5) * t.ln() - t + series.ln()
}

fn regularized_incomplete_beta(a: f64, b: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }
    if x >= 1.0 {
        return 1.0;
    }
    let ln_front = ln_gamma(a + b) - ln_gamma(a) - ln_gamma(b) + a * x.ln() + b * (1.0 - x).ln();
    let front = ln_front.exp();
    // The continued fraction converges fastest on this side of the mean.
    if x < (a + 1.0) / (a + b + 2.0) {
        front * beta_continued_fraction(a, b, x) / a
    } else {
        1.0 - front * beta_continued_fraction(b, a, 1.0 - x) / b
    }
}

fn beta_continued_fraction(a: f64, b: f64, x: f64) -> f64 {
    const MAX_ITERATIONS: usize = 300;
    const EPSILON: f64 = 1e-15;
    const TINY: f64 = 1e-300;

    let not_tiny = |v: f64| if v.abs() < TINY { TINY } else { v };

    let qab = a + b;
    let qap = a + 1.0;
    let qam = a - 1.0;
    let mut c = 1.0;
    let mut d = 1.0 / not_tiny(1.0 - qab * x / qap);
    let mut h = d;
    for m in 1..=MAX_ITERATIONS {
        let m = m as f64;
        let m2 = 2.0 * m;

        let even = m * (b - m) * x / ((qam + m2) * (a + m2));
        d = 1.0 / not_tiny(1.0 + even * d);
        c = not_tiny(1.0 + even / c);
        h *= d * c;

        let odd = -(a + m) * (qab + m) * x / ((a + m2) * (qap + m2));
        d = 1.0 / not_tiny(1.0 + odd * d);
        c = not_tiny(1.0 + odd / c);
        let delta = d * c;
        h *= delta;

        if (delta - 1.0).abs() < EPSILON {
            break;
        }
    }
    h
}

/// Square matrix keyed by column name on both axes. Serializes as nested
/// maps in column order; NaN cells come out as `null`.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    columns: Vec<String>,
    cells: Vec<Vec<f64>>,
}

impl CorrelationMatrix {
    fn filled(columns: Vec<String>, value: f64) -> Self {
        let size = columns.len();
        Self {
            columns,
            cells: vec![vec![value; size]; size],
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn get(&self, row: &str, column: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == row)?;
        let j = self.columns.iter().position(|c| c == column)?;
        Some(self.cells[i][j])
    }

    pub fn is_symmetric(&self) -> bool {
        let size = self.columns.len();
        (0..size).all(|i| {
            (0..size).all(|j| {
                let (a, b) = (self.cells[i][j], self.cells[j][i]);
                a == b || (a.is_nan() && b.is_nan())
            })
        })
    }
}

struct MatrixRow<'a> {
    columns: &'a [String],
    cells: &'a [f64],
}

impl Serialize for MatrixRow<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, cell) in self.columns.iter().zip(self.cells) {
            map.serialize_entry(column, cell)?;
        }
        map.end()
    }
}

impl Serialize for CorrelationMatrix {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, cells) in self.columns.iter().zip(&self.cells) {
            map.serialize_entry(
                column,
                &MatrixRow {
                    columns: &self.columns,
                    cells,
                },
            )?;
        }
        map.end()
    }
}

/// Pairwise Pearson over every pair of columns. A `None` column is
/// non-numeric and yields NaN cells instead of aborting the matrix.
pub fn correlation_matrices(
    columns: &[(String, Option<Vec<Option<f64>>>)],
) -> (CorrelationMatrix, CorrelationMatrix) {
    let names = columns.iter().map(|(name, _)| name.clone()).collect::<Vec<_>>();
    let mut coefficients = CorrelationMatrix::filled(names.clone(), f64::NAN);
    let mut p_values = CorrelationMatrix::filled(names, f64::NAN);

    for (i, (_, left)) in columns.iter().enumerate() {
        for (j, (_, right)) in columns.iter().enumerate().skip(i) {
            let (Some(left), Some(right)) = (left, right) else {
                continue;
            };
            let mut result = pearson_pairwise(left, right);
            if i == j && !result.coefficient.is_nan() {
                result.coefficient = 1.0;
                result.p_value = 0.0;
            }
            coefficients.cells[i][j] = result.coefficient;
            coefficients.cells[j][i] = result.coefficient;
            p_values.cells[i][j] = result.p_value;
            p_values.cells[j][i] = result.p_value;
        }
    }
    (coefficients, p_values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn p_value_matches_closed_forms() {
        // df = 1: I_{1-r²}(1/2, 1/2) = (2/π)·asin(√(1-r²)).
        assert!(close(two_sided_p_value(0.5, 3), 2.0 / 3.0));
        // df = 2: I_x(1, 1/2) = 1 - √(1-x) = 1 - |r|.
        assert!(close(two_sided_p_value(0.8, 4), 0.2));
        assert!(close(two_sided_p_value(-0.8, 4), 0.2));
    }

    #[test]
    fn pearson_matches_reference_example() {
        let result = pearson(&[1.0, 2.0, 3.0, 4.0, 5.0], &[2.0, 4.0, 5.0, 4.0, 5.0]);
        assert!(close(result.coefficient, 0.774_596_669_241_483_4));
        assert!((result.p_value - 0.124_027_062_657_554_5).abs() < 1e-7);
        assert_eq!(result.observations, 5);
    }

    #[test]
    fn perfect_and_degenerate_inputs() {
        let perfect = pearson(&[1.0, 2.0, 3.0], &[-2.0, -4.0, -6.0]);
        assert_eq!(perfect.coefficient, -1.0);
        assert_eq!(perfect.p_value, 0.0);

        let constant = pearson(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]);
        assert!(constant.coefficient.is_nan());

        let two = pearson(&[1.0, 2.0], &[3.0, 1.0]);
        assert_eq!(two.coefficient, -1.0);
        assert!(two.p_value.is_nan());

        assert!(pearson(&[1.0], &[1.0]).coefficient.is_nan());
    }

    #[test]
    fn pairwise_skips_incomplete_rows() {
        let left = [Some(1.0), Some(2.0), None, Some(4.0)];
        let right = [Some(1.0), Some(3.0), Some(9.0), Some(4.0)];
        let result = pearson_pairwise(&left, &right);
        assert_eq!(result.observations, 3);
    }

    #[test]
    fn matrix_is_symmetric_with_unit_diagonal() {
        let columns = vec![
            ("a".to_string(), Some(vec![Some(1.0), Some(2.0), Some(3.0), Some(5.0)])),
            ("b".to_string(), Some(vec![Some(2.0), Some(1.0), Some(4.0), Some(3.0)])),
            ("c".to_string(), None),
        ];
        let (r, p) = correlation_matrices(&columns);
        assert!(r.is_symmetric());
        assert!(p.is_symmetric());
        assert_eq!(r.get("a", "a"), Some(1.0));
        assert_eq!(r.get("b", "b"), Some(1.0));
        assert!(r.get("a", "c").unwrap().is_nan());
        assert!(r.get("c", "c").unwrap().is_nan());
        assert_eq!(r.get("a", "b"), r.get("b", "a"));
        assert_eq!(r.get("a", "zz"), None);
    }

    #[test]
    fn matrix_serializes_nan_as_null_in_column_order() {
        let columns = vec![
            ("z".to_string(), Some(vec![Some(1.0), Some(2.0), Some(3.0)])),
            ("a".to_string(), None),
        ];
        let (r, _) = correlation_matrices(&columns);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"z":{"z":1.0,"a":null},"a":{"z":null,"a":null}}"#);
    }
}
