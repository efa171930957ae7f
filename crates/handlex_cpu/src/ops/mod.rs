pub mod binary;
pub mod reduction;
pub mod unary;
