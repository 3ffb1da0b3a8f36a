// protocol/standard.rs - FIPA Standard Interaction Protocols

//! Transition tables for the FIPA interaction protocols shipped with
//! [`GrammarLibrary::fipa_standard`](super::GrammarLibrary::fipa_standard).

use super::state_machine::{GrammarError, StateMachine};
use crate::acl_message::Performative::*;

/// Role of the agent opening the conversation
pub const INITIATOR: &str = "initiator";
/// Role of the agents it addresses
pub const PARTICIPANT: &str = "participant";

/// FIPA Request (SC00026)
pub fn request() -> Result<StateMachine, GrammarError> {
    StateMachine::builder("request")
        .initial("start")
        .roles(INITIATOR, PARTICIPANT)
        .transition("start", Request, "requested")
        .roles(PARTICIPANT, INITIATOR)
        .transition("requested", Agree, "agreed")
        .transition("requested", Refuse, "refused")
        .transition("requested", NotUnderstood, "not-understood")
        .transition("requested", Inform, "done")
        .transition("requested", Failure, "failed")
        .transition("agreed", Inform, "done")
        .transition("agreed", Failure, "failed")
        .final_state("refused")
        .final_state("not-understood")
        .final_state("done")
        .final_state("failed")
        .roles(INITIATOR, PARTICIPANT)
        .any_state(Cancel, "cancelled")
        .final_state("cancelled")
        .build()
}

/// FIPA Query (SC00027), both query-if and query-ref
pub fn query() -> Result<StateMachine, GrammarError> {
    StateMachine::builder("query")
        .initial("start")
        .roles(INITIATOR, PARTICIPANT)
        .transition("start", QueryIf, "queried")
        .transition("start", QueryRef, "queried")
        .roles(PARTICIPANT, INITIATOR)
        .transition("queried", Agree, "agreed")
        .transition("queried", Refuse, "refused")
        .transition("queried", NotUnderstood, "not-understood")
        .transition("queried", Inform, "done")
        .transition("queried", Failure, "failed")
        .transition("agreed", Inform, "done")
        .transition("agreed", Failure, "failed")
        .final_state("refused")
        .final_state("not-understood")
        .final_state("done")
        .final_state("failed")
        .roles(INITIATOR, PARTICIPANT)
        .any_state(Cancel, "cancelled")
        .final_state("cancelled")
        .build()
}

/// FIPA Request When (SC00028)
pub fn request_when() -> Result<StateMachine, GrammarError> {
    StateMachine::builder("request-when")
        .initial("start")
        .roles(INITIATOR, PARTICIPANT)
        .transition("start", RequestWhen, "requested")
        .roles(PARTICIPANT, INITIATOR)
        .transition("requested", Agree, "agreed")
        .transition("requested", Refuse, "refused")
        .transition("requested", NotUnderstood, "not-understood")
        .transition("agreed", Inform, "done")
        .transition("agreed", Failure, "failed")
        .final_state("refused")
        .final_state("not-understood")
        .final_state("done")
        .final_state("failed")
        .roles(INITIATOR, PARTICIPANT)
        .any_state(Cancel, "cancelled")
        .final_state("cancelled")
        .build()
}

/// FIPA Contract Net (SC00029)
///
/// Several participants answer one call, so proposals and refusals repeat,
/// and the initiator may accept or reject each proposal separately.
pub fn contract_net() -> Result<StateMachine, GrammarError> {
    StateMachine::builder("contract-net")
        .initial("start")
        .roles(INITIATOR, PARTICIPANT)
        .transition("start", Cfp, "solicited")
        .transition("proposed", RejectProposal, "proposed")
        .transition("proposed", AcceptProposal, "awarded")
        .transition("awarded", AcceptProposal, "awarded")
        .transition("awarded", RejectProposal, "awarded")
        .roles(PARTICIPANT, INITIATOR)
        .transition("solicited", Propose, "proposed")
        .transition("solicited", Refuse, "solicited")
        .transition("solicited", NotUnderstood, "solicited")
        .transition("proposed", Propose, "proposed")
        .transition("proposed", Refuse, "proposed")
        .transition("awarded", Inform, "done")
        .transition("awarded", Failure, "failed")
        .final_state("done")
        .final_state("failed")
        .roles(INITIATOR, PARTICIPANT)
        .any_state(Cancel, "cancelled")
        .final_state("cancelled")
        .build()
}

/// FIPA Subscribe (SC00035)
pub fn subscribe() -> Result<StateMachine, GrammarError> {
    StateMachine::builder("subscribe")
        .initial("start")
        .roles(INITIATOR, PARTICIPANT)
        .transition("start", Subscribe, "subscribed")
        .roles(PARTICIPANT, INITIATOR)
        .transition("subscribed", Agree, "active")
        .transition("subscribed", Refuse, "refused")
        .transition("subscribed", NotUnderstood, "not-understood")
        .transition("subscribed", Inform, "active")
        .transition("active", Inform, "active")
        .transition("active", Failure, "failed")
        .transition("subscribed", Failure, "failed")
        .final_state("refused")
        .final_state("not-understood")
        .final_state("failed")
        .roles(INITIATOR, PARTICIPANT)
        .any_state(Cancel, "cancelled")
        .final_state("cancelled")
        .build()
}

/// FIPA Propose (SC00036)
pub fn propose() -> Result<StateMachine, GrammarError> {
    StateMachine::builder("propose")
        .initial("start")
        .roles(INITIATOR, PARTICIPANT)
        .transition("start", Propose, "proposed")
        .roles(PARTICIPANT, INITIATOR)
        .transition("proposed", AcceptProposal, "accepted")
        .transition("proposed", RejectProposal, "rejected")
        .transition("proposed", NotUnderstood, "not-understood")
        .final_state("accepted")
        .final_state("rejected")
        .final_state("not-understood")
        .roles(INITIATOR, PARTICIPANT)
        .any_state(Cancel, "cancelled")
        .final_state("cancelled")
        .build()
}

/// All standard protocols
pub fn all() -> Result<Vec<StateMachine>, GrammarError> {
    Ok(vec![
        request()?,
        query()?,
        request_when()?,
        contract_net()?,
        subscribe()?,
        propose()?,
    ])
}
