//! Robust Soliton degree distribution.
//!
//! An encoded block XORs together `d` source chunks; `d` is drawn from the
//! Robust Soliton Distribution over `1..=K`. The distribution is the sum of
//! the ideal soliton component and a spike near `K/S` that keeps enough
//! low-degree blocks in flight for peeling to make progress, normalized into
//! a cumulative table that both encoder and decoder derive independently.
//!
//! The table is a pure function of `(K, delta, c)`. Identical inputs must
//! produce identical tables on every host, so the math below sticks to
//! operations with fully-determined IEEE semantics (no fused multiply-add,
//! no platform math shortcuts).

/// Cumulative degree-sampling table for a fixed source-block count.
#[derive(Debug, Clone, PartialEq)]
pub struct DegreeTable {
    k: u32,
    cdf: Vec<f64>,
}

impl DegreeTable {
    /// Build the cumulative Robust Soliton table for `k` source blocks.
    ///
    /// `k` of zero yields an empty table; callers reject that case before
    /// sampling. `delta` and `c` are validated by the config layer.
    pub fn new(k: u32, delta: f64, c: f64) -> Self {
        if k == 0 {
            return Self { k, cdf: Vec::new() };
        }
        let kf = f64::from(k);
        let s = c * (kf / delta).ln() * kf.sqrt();

        // Ideal soliton: rho(1) = 1/K, rho(d) = 1/(d(d-1)).
        let mut weights = vec![0.0f64; k as usize];
        weights[0] = 1.0 / kf;
        for d in 2..=u64::from(k) {
            weights[(d - 1) as usize] = 1.0 / ((d * (d - 1)) as f64);
        }

        // Robust spike: tau(d) = S/(Kd) below the pivot K/S, a single
        // ln(S/delta) spike at the pivot, zero beyond it.
        if s > 0.0 {
            let pivot = (kf / s).floor() as u64;
            if pivot >= 1 {
                let below = pivot.min(u64::from(k) + 1);
                for d in 1..below {
                    weights[(d - 1) as usize] += s / (kf * d as f64);
                }
                if pivot <= u64::from(k) {
                    let spike = s / kf * (s / delta).ln();
                    if spike.is_finite() && spike > 0.0 {
                        weights[(pivot - 1) as usize] += spike;
                    }
                }
            }
        }

        let total: f64 = weights.iter().sum();
        let mut cdf = Vec::with_capacity(k as usize);
        let mut acc = 0.0f64;
        for w in &weights {
            acc += w / total;
            cdf.push(acc);
        }
        // Rounding can leave the last entry a hair under 1.0; lift it so a
        // uniform draw can never scan past the end.
        if let Some(last) = cdf.last_mut() {
            *last = last.max(1.0);
        }
        Self { k, cdf }
    }

    /// Number of source blocks the table covers.
    pub fn k(&self) -> u32 {
        self.k
    }

    /// Map a uniform draw in `[0, 1)` to a degree in `1..=k`.
    ///
    /// Linear scan for the first cumulative value exceeding the draw. The
    /// table is heavily front-loaded (over half the mass sits on degrees 1
    /// and 2), so the scan terminates after a couple of entries in the
    /// common case.
    pub fn degree_for(&self, u: f64) -> u32 {
        for (i, &cum) in self.cdf.iter().enumerate() {
            if cum > u {
                return i as u32 + 1;
            }
        }
        self.k
    }

    /// The raw cumulative probabilities, one entry per degree.
    pub fn cdf(&self) -> &[f64] {
        &self.cdf
    }
}
