//! Checking and reasoning on temporal constraint networks with uncertainty
//! and conditioning.
//!
//! The crate implements a family of related models over one integer
//! constraint-graph data model:
//!
//! - **STN**: consistency via shortest paths, all-pairs minimal distance
//!   form, Muscettola minimal-dispatchable form;
//! - **STNU**: dynamic controllability via RUL-family rule propagation, with
//!   semi-reducible negative-cycle witnesses and dispatchability
//!   minimization;
//! - **CSTN / CSTNU**: labeled-value propagation under Std / IR / ε
//!   semantics, with the labeled liftings of the uncertainty rules;
//! - **PSTN**: approximation of log-normal contingent durations by a
//!   dynamically controllable STNU of maximum captured probability mass.
//!
//! Each variant exposes an algorithm object ([`checkers::stn::Stn`],
//! [`checkers::stnu::Stnu`], [`checkers::cstn::Cstn`],
//! [`checkers::cstnu::Cstnu`], [`checkers::pstn::Pstn`]) that owns a
//! [`graph::TNGraph`], normalizes it in place (`init_and_check`), runs its
//! checking kernel and records a [`checkers::CheckStatus`]. Algorithm objects
//! are single-threaded owners; run independent checks on separate objects
//! over separate graphs.

pub mod checkers;
pub mod collections;
pub mod core;
pub mod graph;
pub mod io;
pub mod utils;

pub mod prelude {
    pub use crate::checkers::cstn::Cstn;
    pub use crate::checkers::cstnu::{cstnu_to_cstn, Cstnu};
    pub use crate::checkers::pstn::{OptimizationEngine, Pstn, PstnConfig};
    pub use crate::checkers::stn::Stn;
    pub use crate::checkers::stnu::Stnu;
    pub use crate::checkers::{
        CheckError, CheckStatus, CstnAlg, CstnConfig, PstnCheckStatus, Semantics, StnAlg, StnConfig, StnuAlg,
        StnuConfig,
    };
    pub use crate::core::{ALetter, IntCst, Label, LitState, Prop, SatInt};
    pub use crate::graph::{ConstraintType, Edge, LogNormal, Node, NodeId, TNGraph};
    pub use crate::io::luke::NetworkKind;
}
