/// An element-wise activation applied after a layer's affine transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActFn {
    /// `amp / (1 + e^-z)`.
    Sigmoid { amp: f32 },
    Relu,
    Tanh,
}

impl ActFn {
    pub fn sigmoid(amp: f32) -> Self {
        Self::Sigmoid { amp }
    }

    pub fn relu() -> Self {
        Self::Relu
    }

    pub fn tanh() -> Self {
        Self::Tanh
    }

    /// Evaluates the activation at `z`.
    pub fn f(&self, z: f32) -> f32 {
        match *self {
            Self::Sigmoid { amp } => amp * logistic(z),
            Self::Relu => z.max(0.),
            Self::Tanh => z.tanh(),
        }
    }

    /// Evaluates the activation's derivative at the pre-activation value `z`.
    pub fn df(&self, z: f32) -> f32 {
        match *self {
            Self::Sigmoid { amp } => {
                let s = logistic(z);
                amp * s * (1. - s)
            }
            Self::Relu => {
                if z > 0. {
                    1.
                } else {
                    0.
                }
            }
            Self::Tanh => 1. - z.tanh().powi(2),
        }
    }
}

fn logistic(z: f32) -> f32 {
    1. / (1. + (-z).exp())
}
