pub mod bar;
pub mod instrument;
pub mod period;
