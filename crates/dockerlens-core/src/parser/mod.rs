pub mod dockerfile;
pub mod runtime;
