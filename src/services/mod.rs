pub mod aggregator;
pub mod matrix;
pub mod model_cache;
pub mod scorer;
pub mod trainer;
pub mod training;
