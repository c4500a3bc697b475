pub mod check;
pub mod resume;
