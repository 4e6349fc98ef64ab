use burn::{prelude::*, tensor::Distribution};
use rand::RngCore;

/// Creates a tensor of the given shape with values drawn from `N(mean, std^2)`.
///
/// Sampling uses `rng` rather than the backend's global generator, so the same
/// seed always yields the same values regardless of backend state.
pub fn seeded_normal<B: Backend, const D: usize, R: RngCore>(
    dims: [usize; D],
    mean: f64,
    std: f64,
    rng: &mut R,
    device: &Device<B>,
) -> Tensor<B, D> {
    let data = TensorData::random::<f32, _, _>(dims, Distribution::Normal(mean, std), rng);

    Tensor::from_data(data, device)
}
