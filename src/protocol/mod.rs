// protocol/mod.rs - FIPA Interaction Protocol Grammars

//! Protocol grammars conversations are validated against.
//!
//! - [`StateMachine`] - performative-labelled state table, built in code or
//!   read from JSON
//! - [`RoleBindings`] - agents bound to the roles transitions name
//! - [`GrammarLibrary`] - in-memory grammars, including the FIPA standard
//!   interaction protocols
//! - [`DirectoryGrammar`] - grammars read from a protocol resource directory
//! - [`CachedGrammar`] - read-through cache in front of either
//!
//! # Example
//!
//! ```ignore
//! use fipa_acl::protocol::*;
//!
//! let grammar = default_grammar();
//! let request = grammar.resolve("fipa-request", dir).unwrap();
//!
//! let states = request.next_states(&request.start_states(), &Performative::Request);
//! assert!(!request.is_terminal(&states));
//! ```

mod grammar;
mod roles;
mod standard;
mod state_machine;

pub use grammar::{CachedGrammar, DirectoryGrammar, GrammarLibrary, ProtocolGrammar, default_grammar};
pub use roles::{RoleBindings, RoleViolation};
pub use state_machine::{
    GrammarError, State, StateMachine, StateMachineBuilder, StateSet, StepError, Transition,
};
