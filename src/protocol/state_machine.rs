// protocol/state_machine.rs - Protocol State Machine

//! Table-driven protocol state machine
//!
//! A protocol is a set of named states connected by performative-labelled
//! transitions. The same performative may lead to several states, so a
//! conversation is tracked as a *set* of current states: the machine is
//! stepped like a nondeterministic automaton and a conversation has ended
//! once every state it could be in is final.
//!
//! Transitions may also name the roles sending and receiving the message;
//! see [`RoleBindings`].

use super::roles::{RoleBindings, RoleViolation};
use crate::acl_message::{AclMessage, Performative};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;

/// States a conversation may currently be in
pub type StateSet = BTreeSet<String>;

/// Errors building or loading a grammar
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("Grammar '{0}' has no initial state")]
    MissingInitialState(String),

    #[error("Grammar '{grammar}' references unknown state '{state}'")]
    UnknownState { grammar: String, state: String },

    #[error("Grammar '{grammar}' defines state '{state}' twice")]
    DuplicateState { grammar: String, state: String },

    #[error("Failed to read grammar file {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid grammar JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Performative-labelled edge to another state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(with = "performative_text")]
    pub performative: Performative,
    pub target: String,
    /// Role of the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    /// Role of the receivers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
}

/// Why a message cannot advance a conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepError {
    /// No current state has a transition for the performative
    IllegalPerformative,
    /// Transitions exist, but the sender or a receiver is outside its role
    Role(RoleViolation),
}

/// Named protocol state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    #[serde(default, rename = "final")]
    pub is_final: bool,
    #[serde(default)]
    pub transitions: Vec<Transition>,
}

impl State {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_final: false,
            transitions: Vec::new(),
        }
    }
}

/// Protocol grammar
///
/// The JSON form is what `DirectoryGrammar` reads from disk:
///
/// ```json
/// {
///   "name": "fipa-request",
///   "initial": "start",
///   "states": [
///     { "name": "start", "transitions": [
///       { "performative": "request", "target": "requested", "from": "initiator", "to": "participant" }
///     ] },
///     { "name": "requested", "transitions": [ { "performative": "inform", "target": "done" } ] },
///     { "name": "done", "final": true }
///   ]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateMachine {
    name: String,
    initial: String,
    states: Vec<State>,
}

impl StateMachine {
    pub fn builder(name: impl Into<String>) -> StateMachineBuilder {
        StateMachineBuilder {
            name: name.into(),
            initial: None,
            states: Vec::new(),
            roles: (None, None),
        }
    }

    /// Parse and check a grammar in its JSON form
    pub fn from_json(json: &str) -> Result<Self, GrammarError> {
        let machine: StateMachine = serde_json::from_str(json)?;
        machine.validate()?;
        Ok(machine)
    }

    pub fn to_json(&self) -> Result<String, GrammarError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn initial(&self) -> &str {
        &self.initial
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name == name)
    }

    pub fn is_final(&self, name: &str) -> bool {
        self.state(name).is_some_and(|s| s.is_final)
    }

    /// States before any message has been seen
    pub fn start_states(&self) -> StateSet {
        StateSet::from([self.initial.clone()])
    }

    /// States reachable from `current` by `performative`; empty when the
    /// performative is not legal in any of them.
    pub fn next_states(&self, current: &StateSet, performative: &Performative) -> StateSet {
        current
            .iter()
            .filter_map(|name| self.state(name))
            .flat_map(|state| state.transitions.iter())
            .filter(|t| &t.performative == performative)
            .map(|t| t.target.clone())
            .collect()
    }

    /// Step `current` by `message`, honouring the roles bound so far. Roles
    /// first named by a taken transition are bound in `roles`.
    ///
    /// A role mismatch is only reported when no transition accepts the
    /// message at all.
    pub fn advance(
        &self,
        current: &StateSet,
        message: &AclMessage,
        roles: &mut RoleBindings,
    ) -> Result<StateSet, StepError> {
        let mut next = StateSet::new();
        let mut bindings = Vec::new();
        let mut violation = None;

        for transition in current
            .iter()
            .filter_map(|name| self.state(name))
            .flat_map(|state| state.transitions.iter())
            .filter(|t| &t.performative == message.performative())
        {
            match roles.admit(transition, message) {
                Ok(added) => {
                    next.insert(transition.target.clone());
                    bindings.extend(added);
                }
                Err(err) => {
                    violation.get_or_insert(err);
                }
            }
        }

        if next.is_empty() {
            return Err(violation.map_or(StepError::IllegalPerformative, StepError::Role));
        }
        for (role, agents) in bindings {
            roles.bind(&role, agents);
        }
        Ok(next)
    }

    /// Whether every state in `states` is final
    pub fn is_terminal(&self, states: &StateSet) -> bool {
        !states.is_empty() && states.iter().all(|name| self.is_final(name))
    }

    /// Performatives legal from `states`, without duplicates
    pub fn expected_performatives(&self, states: &StateSet) -> Vec<Performative> {
        let mut expected: Vec<Performative> = Vec::new();
        for transition in states
            .iter()
            .filter_map(|name| self.state(name))
            .flat_map(|state| state.transitions.iter())
        {
            if !expected.contains(&transition.performative) {
                expected.push(transition.performative.clone());
            }
        }
        expected
    }

    fn validate(&self) -> Result<(), GrammarError> {
        let mut seen = BTreeSet::new();
        for state in &self.states {
            if !seen.insert(state.name.as_str()) {
                return Err(GrammarError::DuplicateState {
                    grammar: self.name.clone(),
                    state: state.name.clone(),
                });
            }
        }
        if self.initial.is_empty() {
            return Err(GrammarError::MissingInitialState(self.name.clone()));
        }

        let targets = self
            .states
            .iter()
            .flat_map(|s| s.transitions.iter().map(|t| t.target.as_str()));
        for name in std::iter::once(self.initial.as_str()).chain(targets) {
            if !seen.contains(name) {
                return Err(GrammarError::UnknownState {
                    grammar: self.name.clone(),
                    state: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Builder for [`StateMachine`]. States are created on first mention.
#[derive(Debug, Clone)]
pub struct StateMachineBuilder {
    name: String,
    initial: Option<String>,
    states: Vec<State>,
    /// Roles given to transitions added from here on
    roles: (Option<String>, Option<String>),
}

impl StateMachineBuilder {
    pub fn initial(mut self, name: &str) -> Self {
        self.ensure(name);
        self.initial = Some(name.to_string());
        self
    }

    /// Sender and receiver roles for the transitions added after this call
    pub fn roles(mut self, sender: &str, receiver: &str) -> Self {
        self.roles = (Some(sender.to_string()), Some(receiver.to_string()));
        self
    }

    pub fn transition(mut self, from: &str, performative: Performative, to: &str) -> Self {
        let (sender, receiver) = self.roles.clone();
        self.ensure(to);
        self.ensure(from).transitions.push(Transition {
            performative,
            target: to.to_string(),
            from: sender,
            to: receiver,
        });
        self
    }

    pub fn final_state(mut self, name: &str) -> Self {
        self.ensure(name).is_final = true;
        self
    }

    /// Add `performative -> to` to every state declared so far that is
    /// neither initial nor final.
    pub fn any_state(mut self, performative: Performative, to: &str) -> Self {
        let sources: Vec<String> = self
            .states
            .iter()
            .filter(|s| !s.is_final && Some(&s.name) != self.initial.as_ref() && s.name != to)
            .map(|s| s.name.clone())
            .collect();
        for from in sources {
            self = self.transition(&from, performative.clone(), to);
        }
        self.ensure(to);
        self
    }

    pub fn build(self) -> Result<StateMachine, GrammarError> {
        let initial = self
            .initial
            .ok_or_else(|| GrammarError::MissingInitialState(self.name.clone()))?;
        let machine = StateMachine {
            name: self.name,
            initial,
            states: self.states,
        };
        machine.validate()?;
        Ok(machine)
    }

    fn ensure(&mut self, name: &str) -> &mut State {
        let idx = match self.states.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.states.push(State::new(name));
                self.states.len() - 1
            }
        };
        &mut self.states[idx]
    }
}

/// Performatives appear in grammar files by their FIPA name.
mod performative_text {
    use crate::acl_message::Performative;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(performative: &Performative, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(performative.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Performative, D::Error> {
        let text = String::deserialize(d)?;
        Ok(Performative::parse_lenient(&text))
    }
}
