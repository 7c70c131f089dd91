//! Application layer orchestrating the domain: the payment confirmation
//! workflow and the delinquency notification sweep. This is the only layer
//! that enforces role and state-machine preconditions.

pub mod stager;
pub mod workflow;
