pub mod fetch;
pub mod optimistic;
pub mod reduce;
pub mod seq;
