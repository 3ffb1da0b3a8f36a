// protocol/roles.rs - Protocol Roles

//! Agents bound to the roles named by a grammar's transitions.
//!
//! A transition may name the role sending the message (`from`) and the role
//! receiving it (`to`). The first accepted message that names a role binds
//! it: the sender for `from`, the receivers for `to`. Later messages must
//! come from and go to the agents bound to those roles. Agents are compared
//! by name; messages without a sender or receivers leave that side unchecked.

use super::state_machine::Transition;
use crate::acl_message::AclMessage;
use std::collections::BTreeMap;

/// Role name -> names of the agents playing it
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleBindings {
    roles: BTreeMap<String, Vec<String>>,
}

/// An agent sending or receiving outside the role bound for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleViolation {
    pub role: String,
    pub agent: String,
}

impl RoleBindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn agents(&self, role: &str) -> Option<&[String]> {
        self.roles.get(role).map(Vec::as_slice)
    }

    /// Bind `role` unless it is already bound. Empty agent lists bind nothing.
    pub fn bind(&mut self, role: &str, agents: Vec<String>) {
        if !agents.is_empty() && !self.roles.contains_key(role) {
            self.roles.insert(role.to_string(), agents);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.roles.is_empty()
    }

    /// Check `message` against the roles of `transition`. On success returns
    /// the bindings taking the transition would add.
    pub(crate) fn admit(
        &self,
        transition: &Transition,
        message: &AclMessage,
    ) -> Result<Vec<(String, Vec<String>)>, RoleViolation> {
        let mut added = Vec::new();

        if let (Some(role), Some(sender)) = (&transition.from, message.sender()) {
            match self.agents(role) {
                Some(bound) if !bound.iter().any(|name| name == sender.name()) => {
                    return Err(RoleViolation {
                        role: role.clone(),
                        agent: sender.name().to_string(),
                    });
                }
                Some(_) => {}
                None => added.push((role.clone(), vec![sender.name().to_string()])),
            }
        }

        if let Some(role) = &transition.to {
            let receivers: Vec<String> = message
                .receivers()
                .iter()
                .map(|agent| agent.name().to_string())
                .collect();
            match self.agents(role) {
                Some(bound) => {
                    if let Some(stranger) = receivers.iter().find(|name| !bound.contains(name)) {
                        return Err(RoleViolation {
                            role: role.clone(),
                            agent: stranger.clone(),
                        });
                    }
                }
                None if !receivers.is_empty() => added.push((role.clone(), receivers)),
                None => {}
            }
        }

        Ok(added)
    }
}
