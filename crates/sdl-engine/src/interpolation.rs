//! Interpolation between a variable's sparse `(year, value)` anchor points
//! (spec §4.5 step 4): linear or natural cubic spline, with the boundary
//! policy "outside the convex hull, hold the nearest anchor or extend the
//! end-slope" (we extend the end-slope, since a constant-hold discontinuity
//! at the last two anchors would be a worse default for growth scenarios).

use sdl_parser::Interpolation;

/// Anchors must be sorted by year and have at least one point; callers
/// guarantee this (the parser preserves declaration order, and the engine
/// sorts once before simulating).
pub fn interpolate(anchors: &[(i32, f64)], kind: Interpolation, t: f64) -> f64 {
    match anchors.len() {
        0 => 0.0,
        1 => anchors[0].1,
        _ => match kind {
            Interpolation::Linear => linear(anchors, t),
            Interpolation::Spline => natural_cubic_spline(anchors, t),
        },
    }
}

fn linear(anchors: &[(i32, f64)], t: f64) -> f64 {
    if t <= anchors[0].0 as f64 {
        return extend_slope(anchors[0], anchors[1], t);
    }
    let last = anchors.len() - 1;
    if t >= anchors[last].0 as f64 {
        return extend_slope(anchors[last - 1], anchors[last], t);
    }
    for w in anchors.windows(2) {
        let (x0, y0) = (w[0].0 as f64, w[0].1);
        let (x1, y1) = (w[1].0 as f64, w[1].1);
        if t >= x0 && t <= x1 {
            if (x1 - x0).abs() < f64::EPSILON {
                return y0;
            }
            let frac = (t - x0) / (x1 - x0);
            return y0 + frac * (y1 - y0);
        }
    }
    anchors[last].1
}

fn extend_slope(a: (i32, f64), b: (i32, f64), t: f64) -> f64 {
    let (x0, y0) = (a.0 as f64, a.1);
    let (x1, y1) = (b.0 as f64, b.1);
    if (x1 - x0).abs() < f64::EPSILON {
        return y0;
    }
    let slope = (y1 - y0) / (x1 - x0);
    y0 + slope * (t - x0)
}

/// Natural cubic spline (second derivative zero at both ends), solved via the
/// standard tridiagonal Thomas algorithm over the anchor points. Outside the
/// anchor range, extends using the end segment's local slope rather than the
/// polynomial (cubic extrapolation diverges too fast to be a sane default).
fn natural_cubic_spline(anchors: &[(i32, f64)], t: f64) -> f64 {
    let n = anchors.len();
    let xs: Vec<f64> = anchors.iter().map(|(x, _)| *x as f64).collect();
    let ys: Vec<f64> = anchors.iter().map(|(_, y)| *y).collect();

    if t <= xs[0] {
        return extend_slope(anchors[0], anchors[1], t);
    }
    if t >= xs[n - 1] {
        return extend_slope(anchors[n - 2], anchors[n - 1], t);
    }

    let second_derivs = solve_second_derivatives(&xs, &ys);

    let i = match xs.windows(2).position(|w| t >= w[0] && t <= w[1]) {
        Some(i) => i,
        None => n - 2,
    };
    let h = xs[i + 1] - xs[i];
    let a = (xs[i + 1] - t) / h;
    let b = (t - xs[i]) / h;
    a * ys[i]
        + b * ys[i + 1]
        + ((a.powi(3) - a) * second_derivs[i] + (b.powi(3) - b) * second_derivs[i + 1]) * (h * h) / 6.0
}

fn solve_second_derivatives(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len();
    let mut y2 = vec![0.0; n];
    if n < 3 {
        return y2;
    }
    let mut u = vec![0.0; n];

    for i in 1..n - 1 {
        let sig = (xs[i] - xs[i - 1]) / (xs[i + 1] - xs[i - 1]);
        let p = sig * y2[i - 1] + 2.0;
        y2[i] = (sig - 1.0) / p;
        let d = (ys[i + 1] - ys[i]) / (xs[i + 1] - xs[i]) - (ys[i] - ys[i - 1]) / (xs[i] - xs[i - 1]);
        u[i] = (6.0 * d / (xs[i + 1] - xs[i - 1]) - sig * u[i - 1]) / p;
    }

    for k in (0..n - 1).rev() {
        y2[k] = y2[k] * y2[k + 1] + u[k];
    }
    y2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_interpolates_midpoint() {
        let anchors = [(2025, 100.0), (2030, 200.0)];
        assert_eq!(interpolate(&anchors, Interpolation::Linear, 2025.0), 100.0);
        assert_eq!(interpolate(&anchors, Interpolation::Linear, 2030.0), 200.0);
        assert!((interpolate(&anchors, Interpolation::Linear, 2027.5) - 150.0).abs() < 1e-9);
    }

    #[test]
    fn linear_extrapolates_by_end_slope() {
        let anchors = [(2025, 100.0), (2030, 200.0)];
        let before = interpolate(&anchors, Interpolation::Linear, 2020.0);
        assert!((before - 0.0).abs() < 1e-9);
        let after = interpolate(&anchors, Interpolation::Linear, 2035.0);
        assert!((after - 300.0).abs() < 1e-9);
    }

    #[test]
    fn spline_passes_through_every_anchor() {
        let anchors = [(2020, 10.0), (2025, 40.0), (2030, 20.0), (2035, 60.0)];
        for &(year, value) in &anchors {
            let v = interpolate(&anchors, Interpolation::Spline, year as f64);
            assert!((v - value).abs() < 1e-6, "year {year}: got {v}, want {value}");
        }
    }

    #[test]
    fn spline_is_smoother_than_linear_between_anchors() {
        let anchors = [(2020, 0.0), (2025, 100.0), (2030, 100.0), (2035, 0.0)];
        // Spline evaluated at the midpoint should stay finite and within a
        // sane envelope around the neighbouring anchors.
        let v = interpolate(&anchors, Interpolation::Spline, 2027.5);
        assert!(v.is_finite());
        assert!((-50.0..=200.0).contains(&v));
    }

    #[test]
    fn single_anchor_is_constant() {
        let anchors = [(2025, 42.0)];
        assert_eq!(interpolate(&anchors, Interpolation::Linear, 2030.0), 42.0);
    }
}
