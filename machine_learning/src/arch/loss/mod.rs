mod cross_entropy;
mod loss_fn;
mod regression;

pub use cross_entropy::CrossEntropy;
pub use loss_fn::LossFn;
pub use regression::{Mae, Mse};
