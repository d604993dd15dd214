mod param_gen;

pub use param_gen::ParamGen;
