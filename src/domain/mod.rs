// Domain layer - Core types and negotiation rules

pub mod model;
pub mod priority;
pub mod rules;
