//! Coupon domain: value objects, the coupon aggregate, its events and the pure engine
pub mod aggregates;
pub mod engine;
pub mod events;
pub mod value_objects;
