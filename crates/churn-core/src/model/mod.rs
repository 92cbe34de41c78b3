//! The churn classifier: a Random Forest built from CART-style binary
//! classification trees. Both layers serialize with serde so a fitted model
//! round-trips through the model store unchanged.
pub mod forest;
pub mod tree;

pub use forest::RandomForest;
