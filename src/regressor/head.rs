use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::scoring::{BodyScores, RaceScores, BODY_CLASSES, RACE_CLASSES};

/// Auxiliary inputs appended to the image embedding.
pub const AUX_FEATURES: usize = RACE_CLASSES + BODY_CLASSES;
pub const HIDDEN_SIZE: usize = 128;

const ADAM_BETA1: f32 = 0.9;
const ADAM_BETA2: f32 = 0.999;
const ADAM_EPS: f32 = 1e-8;

/// Concatenates `embedding ‖ race ‖ body` into one head input.
pub fn input_vector(embedding: &[f32], race: &RaceScores, body: &BodyScores) -> Vec<f32> {
    let mut x = Vec::with_capacity(embedding.len() + AUX_FEATURES);
    x.extend_from_slice(embedding);
    x.extend_from_slice(race);
    x.extend_from_slice(body);
    x
}

/// Trainable regression head: `Linear(input → hidden) → ReLU → Linear(hidden → 1) → tanh`.
///
/// Weights are stored row-major, `weights1[h * input_len + i]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressorHead {
    pub input_len: usize,
    pub hidden_size: usize,
    pub weights1: Vec<f32>,
    pub bias1: Vec<f32>,
    pub weights2: Vec<f32>,
    pub bias2: f32,
}

impl RegressorHead {
    /// Fresh head with small uniform weights scaled by fan-in.
    pub fn new<R: Rng>(input_len: usize, hidden_size: usize, rng: &mut R) -> Self {
        let input_len = input_len.max(1);
        let hidden_size = hidden_size.max(1);
        let limit1 = (1.0 / input_len as f32).sqrt();
        let limit2 = (1.0 / hidden_size as f32).sqrt();
        let weights1 = (0..hidden_size * input_len)
            .map(|_| rng.random_range(-limit1..limit1))
            .collect();
        let weights2 = (0..hidden_size)
            .map(|_| rng.random_range(-limit2..limit2))
            .collect();
        Self {
            input_len,
            hidden_size,
            weights1,
            bias1: vec![0.0; hidden_size],
            weights2,
            bias2: 0.0,
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.weights1.len() != self.hidden_size * self.input_len {
            return Err(format!(
                "weights1 has {} values, expected {}",
                self.weights1.len(),
                self.hidden_size * self.input_len
            ));
        }
        if self.bias1.len() != self.hidden_size || self.weights2.len() != self.hidden_size {
            return Err(format!("hidden layer size mismatch (expected {})", self.hidden_size));
        }
        Ok(())
    }

    /// Predicted interest in [-1, 1].
    pub fn forward(&self, x: &[f32]) -> f32 {
        let mut hidden = vec![0.0f32; self.hidden_size];
        self.forward_into(x, &mut hidden)
    }

    fn forward_into(&self, x: &[f32], hidden_act: &mut [f32]) -> f32 {
        let d = self.input_len;
        let mut out = self.bias2;
        for h in 0..self.hidden_size {
            let row = &self.weights1[h * d..(h + 1) * d];
            let mut sum = self.bias1[h];
            for (w, xi) in row.iter().zip(x) {
                sum += w * xi;
            }
            let act = sum.max(0.0);
            hidden_act[h] = act;
            out += self.weights2[h] * act;
        }
        out.tanh()
    }

    /// Adds the squared-error gradient for one sample into `grads` and
    /// returns that sample's loss.
    pub fn accumulate(&self, x: &[f32], target: f32, grads: &mut Gradients) -> f32 {
        let d = self.input_len;
        let mut hidden_act = vec![0.0f32; self.hidden_size];
        let y = self.forward_into(x, &mut hidden_act);
        let err = y - target;
        // d(err^2)/dz through tanh
        let dz = 2.0 * err * (1.0 - y * y);

        grads.bias2 += dz;
        for h in 0..self.hidden_size {
            grads.weights2[h] += dz * hidden_act[h];
            if hidden_act[h] <= 0.0 {
                continue;
            }
            let dh = dz * self.weights2[h];
            grads.bias1[h] += dh;
            let row = &mut grads.weights1[h * d..(h + 1) * d];
            for (g, xi) in row.iter_mut().zip(x) {
                *g += dh * xi;
            }
        }
        err * err
    }

    /// Mean squared error over `(input, target)` pairs; `None` when empty.
    pub fn mse<'a, I>(&self, samples: I) -> Option<f32>
    where
        I: IntoIterator<Item = (&'a [f32], f32)>,
    {
        let mut hidden = vec![0.0f32; self.hidden_size];
        let mut total = 0.0f32;
        let mut count = 0usize;
        for (x, target) in samples {
            let err = self.forward_into(x, &mut hidden) - target;
            total += err * err;
            count += 1;
        }
        (count > 0).then(|| total / count as f32)
    }
}

/// Parameter-shaped buffer used for gradients and Adam moments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradients {
    pub weights1: Vec<f32>,
    pub bias1: Vec<f32>,
    pub weights2: Vec<f32>,
    pub bias2: f32,
}

impl Gradients {
    pub fn zeros_like(head: &RegressorHead) -> Self {
        Self {
            weights1: vec![0.0; head.weights1.len()],
            bias1: vec![0.0; head.bias1.len()],
            weights2: vec![0.0; head.weights2.len()],
            bias2: 0.0,
        }
    }

    pub fn scale(&mut self, factor: f32) {
        for g in self
            .weights1
            .iter_mut()
            .chain(self.bias1.iter_mut())
            .chain(self.weights2.iter_mut())
        {
            *g *= factor;
        }
        self.bias2 *= factor;
    }
}

/// Adam optimizer state, persisted with the head so training resumes exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamState {
    pub step: u64,
    pub m: Gradients,
    pub v: Gradients,
}

impl AdamState {
    pub fn new(head: &RegressorHead) -> Self {
        Self {
            step: 0,
            m: Gradients::zeros_like(head),
            v: Gradients::zeros_like(head),
        }
    }

    pub fn matches(&self, head: &RegressorHead) -> bool {
        self.m.weights1.len() == head.weights1.len() && self.v.weights1.len() == head.weights1.len()
    }

    pub fn apply(&mut self, head: &mut RegressorHead, grads: &Gradients, learning_rate: f32) {
        self.step += 1;
        let t = self.step as i32;
        let lr_t = learning_rate * (1.0 - ADAM_BETA2.powi(t)).sqrt() / (1.0 - ADAM_BETA1.powi(t));

        adam_step(
            &mut head.weights1,
            &grads.weights1,
            &mut self.m.weights1,
            &mut self.v.weights1,
            lr_t,
        );
        adam_step(&mut head.bias1, &grads.bias1, &mut self.m.bias1, &mut self.v.bias1, lr_t);
        adam_step(
            &mut head.weights2,
            &grads.weights2,
            &mut self.m.weights2,
            &mut self.v.weights2,
            lr_t,
        );
        adam_step(
            std::slice::from_mut(&mut head.bias2),
            &[grads.bias2],
            std::slice::from_mut(&mut self.m.bias2),
            std::slice::from_mut(&mut self.v.bias2),
            lr_t,
        );
    }
}

fn adam_step(params: &mut [f32], grads: &[f32], m: &mut [f32], v: &mut [f32], lr_t: f32) {
    for i in 0..params.len() {
        let g = grads[i];
        m[i] = ADAM_BETA1 * m[i] + (1.0 - ADAM_BETA1) * g;
        v[i] = ADAM_BETA2 * v[i] + (1.0 - ADAM_BETA2) * g * g;
        params[i] -= lr_t * m[i] / (v[i].sqrt() + ADAM_EPS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_output_is_bounded() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut head = RegressorHead::new(4, 8, &mut rng);
        head.bias2 = 50.0;
        let y = head.forward(&[1.0, 2.0, 3.0, 4.0]);
        assert!(y <= 1.0 && y >= -1.0);
    }

    #[test]
    fn test_gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(3);
        let head = RegressorHead::new(3, 5, &mut rng);
        let x = [0.3, -0.2, 0.8];
        let target = 0.5;

        let mut grads = Gradients::zeros_like(&head);
        head.accumulate(&x, target, &mut grads);

        let eps = 1e-3;
        let loss = |h: &RegressorHead| {
            let e = h.forward(&x) - target;
            e * e
        };
        let mut plus = head.clone();
        plus.bias2 += eps;
        let mut minus = head.clone();
        minus.bias2 -= eps;
        let numeric = (loss(&plus) - loss(&minus)) / (2.0 * eps);
        assert!((numeric - grads.bias2).abs() < 1e-2, "{} vs {}", numeric, grads.bias2);
    }

    #[test]
    fn test_adam_reduces_loss() {
        let mut rng = StdRng::seed_from_u64(11);
        let mut head = RegressorHead::new(2, 16, &mut rng);
        let mut adam = AdamState::new(&head);
        let samples: Vec<([f32; 2], f32)> = vec![([1.0, 0.0], 0.8), ([0.0, 1.0], -0.8)];
        let before = head.mse(samples.iter().map(|(x, t)| (&x[..], *t))).unwrap();
        for _ in 0..200 {
            let mut grads = Gradients::zeros_like(&head);
            for (x, t) in &samples {
                head.accumulate(x, *t, &mut grads);
            }
            grads.scale(1.0 / samples.len() as f32);
            adam.apply(&mut head, &grads, 1e-2);
        }
        let after = head.mse(samples.iter().map(|(x, t)| (&x[..], *t))).unwrap();
        assert!(after < before * 0.5, "{} -> {}", before, after);
        assert_eq!(adam.step, 200);
    }

    #[test]
    fn test_input_vector_layout() {
        let x = input_vector(&[9.0, 8.0], &[0.0; RACE_CLASSES], &[0.1, 0.2, 0.7]);
        assert_eq!(x.len(), 2 + AUX_FEATURES);
        assert_eq!(x[0], 9.0);
        assert_eq!(x[x.len() - 1], 0.7);
    }
}
