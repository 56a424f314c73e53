pub mod labels;
pub mod predict;
