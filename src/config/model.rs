use machine_learning::{
    arch::{
        Sequential,
        activations::ActFn,
        layers::Layer,
        loss::{CrossEntropy, LossFn, Mae, Mse},
    },
    initialization::ParamGen,
    optimization::{Adam, GradientDescent, GradientDescentWithMomentum, Optimizer},
};
use serde::{Deserialize, Serialize};

use super::ensure;
use crate::error::Result;

/// A dense network: `hidden` layers with `act_fn`, then a linear output layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelConfig {
    #[serde(default)]
    pub hidden: Vec<usize>,
    #[serde(default = "default_act_fn")]
    pub act_fn: ActFnConfig,
    #[serde(default = "default_init")]
    pub init: ParamGenConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFnConfig {
    Sigmoid { amp: f32 },
    Relu,
    Tanh,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamGenConfig {
    Const { value: f32 },
    Uniform { low: f32, high: f32 },
    XavierUniform,
    LecunUniform,
    Normal { mean: f32, std_dev: f32 },
    Kaiming,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerConfig {
    Adam {
        learning_rate: f32,
        #[serde(default = "default_beta1")]
        beta1: f32,
        #[serde(default = "default_beta2")]
        beta2: f32,
        #[serde(default = "default_epsilon")]
        epsilon: f32,
    },
    GradientDescent {
        learning_rate: f32,
    },
    GradientDescentWithMomentum {
        learning_rate: f32,
        momentum: f32,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LossFnConfig {
    Mse,
    Mae,
    CrossEntropy,
}

fn default_act_fn() -> ActFnConfig {
    ActFnConfig::Relu
}

fn default_init() -> ParamGenConfig {
    ParamGenConfig::XavierUniform
}

fn default_beta1() -> f32 {
    0.9
}

fn default_beta2() -> f32 {
    0.999
}

fn default_epsilon() -> f32 {
    1e-7
}

impl ModelConfig {
    /// Builds the network for the given input and output widths.
    pub fn build(&self, input: usize, output: usize) -> Sequential {
        let act_fn = self.act_fn.resolve();
        let mut layers = Vec::with_capacity(self.hidden.len() + 1);
        let mut prev = input;

        for &width in &self.hidden {
            layers.push(Layer::dense((prev, width), Some(act_fn)));
            prev = width;
        }
        layers.push(Layer::dense((prev, output), None));

        Sequential::new(layers)
    }

    pub(super) fn validate(&self, owner: &str) -> Result<()> {
        ensure(self.hidden.iter().all(|&w| w > 0), || {
            format!("{owner} hidden layer widths must be > 0, got {:?}", self.hidden)
        })?;

        if let ActFnConfig::Sigmoid { amp } = self.act_fn {
            ensure(amp.is_finite() && amp > 0.0, || {
                format!("{owner} sigmoid amp must be positive, got {amp}")
            })?;
        }

        Ok(())
    }
}

impl ActFnConfig {
    pub fn resolve(self) -> ActFn {
        match self {
            Self::Sigmoid { amp } => ActFn::sigmoid(amp),
            Self::Relu => ActFn::relu(),
            Self::Tanh => ActFn::tanh(),
        }
    }
}

impl ParamGenConfig {
    pub fn resolve(self) -> ParamGen {
        match self {
            Self::Const { value } => ParamGen::Const { value },
            Self::Uniform { low, high } => ParamGen::Uniform { low, high },
            Self::XavierUniform => ParamGen::XavierUniform,
            Self::LecunUniform => ParamGen::LecunUniform,
            Self::Normal { mean, std_dev } => ParamGen::Normal { mean, std_dev },
            Self::Kaiming => ParamGen::Kaiming,
        }
    }
}

impl OptimizerConfig {
    /// Builds an optimizer holding state for `len` parameters.
    pub fn build(self, len: usize) -> Box<dyn Optimizer> {
        match self {
            Self::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon)),
            Self::GradientDescent { learning_rate } => {
                Box::new(GradientDescent::new(learning_rate))
            }
            Self::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => Box::new(GradientDescentWithMomentum::new(
                len,
                learning_rate,
                momentum,
            )),
        }
    }

    pub(super) fn validate(&self, owner: &str) -> Result<()> {
        let lr = match *self {
            Self::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => {
                ensure((0.0..1.0).contains(&beta1) && (0.0..1.0).contains(&beta2), || {
                    format!("{owner} adam betas must be in [0, 1)")
                })?;
                ensure(epsilon > 0.0, || format!("{owner} adam epsilon must be > 0"))?;
                learning_rate
            }
            Self::GradientDescent { learning_rate } => learning_rate,
            Self::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => {
                ensure((0.0..1.0).contains(&momentum), || {
                    format!("{owner} momentum must be in [0, 1), got {momentum}")
                })?;
                learning_rate
            }
        };

        ensure(lr.is_finite() && lr > 0.0, || {
            format!("{owner} learning_rate must be positive, got {lr}")
        })
    }
}

impl LossFnConfig {
    pub fn build(self) -> Box<dyn LossFn> {
        match self {
            Self::Mse => Box::new(Mse::new()),
            Self::Mae => Box::new(Mae::new()),
            Self::CrossEntropy => Box::new(CrossEntropy::new()),
        }
    }
}
