pub mod hrm;
pub mod text;
