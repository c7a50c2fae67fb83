//! Host network stack contract.

use crate::ndis::MacAddress;
use thiserror::Error;

/// Interface registration errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NetdevError {
    /// Name template is not of the `<basename>%d` form.
    #[error("Invalid interface name template: {0}")]
    InvalidTemplate(String),

    /// No free index left for the template.
    #[error("No free interface name for {0}")]
    NamesExhausted(String),

    /// Interface is not registered.
    #[error("Unknown interface: {0}")]
    UnknownInterface(String),
}

/// Host network stack: interface registration and frame delivery.
pub trait NetStack: Send + Sync {
    /// Register an interface. `template` carries a `%d` placeholder that the
    /// stack replaces with the lowest free index. Returns the final name.
    fn register_netdev(&self, template: &str, mac: MacAddress) -> Result<String, NetdevError>;

    /// Remove an interface registered earlier.
    fn unregister_netdev(&self, name: &str) -> Result<(), NetdevError>;

    /// Deliver a received frame to the stack.
    fn receive(&self, _name: &str, _frame: &[u8]) {}
}
