//! Time-points of a temporal network.

use crate::core::{ALetter, Label, Prop};

/// Parameters of a log-normal duration distribution (PSTN contingents).
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LogNormal {
    pub mu: f64,
    pub sigma: f64,
}

/// A time-point: a uniquely named node of the network.
#[derive(Clone, Debug)]
pub struct Node {
    name: String,
    /// Scenarios in which the time-point participates. Streamlined networks
    /// keep this empty everywhere.
    pub label: Label,
    /// Set iff this is an observation time-point: executing it reveals the
    /// truth value of the proposition.
    pub observes: Option<Prop>,
    /// Set iff this is a contingent time-point; names it in upper/lower-case
    /// weights.
    pub aletter: Option<ALetter>,
    /// Layout position, opaque to the checking kernels.
    pub x: f64,
    pub y: f64,
    /// Duration distribution of the incoming contingent link (PSTN only).
    pub log_normal: Option<LogNormal>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Node {
        Node {
            name: name.into(),
            label: Label::empty(),
            observes: None,
            aletter: None,
            x: 0.0,
            y: 0.0,
            log_normal: None,
        }
    }

    pub fn observer(name: impl Into<String>, p: Prop) -> Node {
        let mut n = Node::new(name);
        n.observes = Some(p);
        n
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_observer(&self) -> bool {
        self.observes.is_some()
    }

    pub fn is_contingent(&self) -> bool {
        self.aletter.is_some()
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(p) = self.observes {
            write!(f, "?{p}")?;
        }
        if !self.label.is_empty() {
            write!(f, "[{}]", self.label)?;
        }
        Ok(())
    }
}
