//! Gauss-Hermite quadrature against the standard normal density.

/// Nodes and weights approximating `E[f(θ)]` for `θ ~ N(0, 1)`.
#[derive(Debug, Clone)]
pub struct Quadrature {
    nodes: Vec<f64>,
    weights: Vec<f64>,
}

// Physicists' 7-point Gauss-Hermite rule (weight e^{-t²}), non-negative half.
const GH7_NODES: [f64; 4] = [
    0.0,
    0.816_287_882_858_964_7,
    1.673_551_628_767_471_4,
    2.651_961_356_835_233_5,
];
const GH7_WEIGHTS: [f64; 4] = [
    0.810_264_617_556_807_3,
    0.425_607_252_610_127_8,
    0.054_515_582_819_127_03,
    0.000_971_781_245_099_519_2,
];

impl Quadrature {
    /// Seven-point rule rescaled to the standard normal: `θ = √2·t`, `w / √π`.
    pub fn standard_normal_7() -> Self {
        let scale = std::f64::consts::SQRT_2;
        let norm = std::f64::consts::PI.sqrt();

        let mut points: Vec<(f64, f64)> = Vec::with_capacity(7);
        for (&t, &w) in GH7_NODES.iter().zip(GH7_WEIGHTS.iter()) {
            points.push((scale * t, w / norm));
            if t > 0.0 {
                points.push((-scale * t, w / norm));
            }
        }
        points.sort_by(|a, b| a.0.total_cmp(&b.0));

        Self {
            nodes: points.iter().map(|p| p.0).collect(),
            weights: points.iter().map(|p| p.1).collect(),
        }
    }

    pub fn nodes(&self) -> &[f64] {
        &self.nodes
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
