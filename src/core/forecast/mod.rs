pub mod alerts;
pub mod burn_rate;
pub mod predictor;
pub mod sources;
