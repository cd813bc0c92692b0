//! Generic infrastructure modules with no protocol knowledge.
pub mod ring;
