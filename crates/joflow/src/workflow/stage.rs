//! Workflow stages and the transition table.
//!
//! The approval chain is a fixed sequence of stages; the persisted
//! `stage` column stores the sequence position. All stage-dependent
//! behavior is looked up in the tables below rather than compared
//! against raw sequence integers.

use super::status::RequestStatus;

/// One stage of the routing chain, in chain order. The discriminant is
/// the persisted sequence position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Auto-created record of the submission itself.
    Submission = 0,
    FirstApproval = 1,
    SecondApproval = 2,
    ThirdApproval = 3,
    /// Last approver; approval hands the request to the facilitator.
    FinalApproval = 4,
    /// Facilitator names an execution owner.
    Assignment = 5,
    /// Execution owner performs the work.
    Execution = 6,
    /// Checker reviews the completed work.
    Checking = 7,
    /// Submitter confirms closure.
    Closure = 8,
}

/// How the next acting user is resolved when a stage is approved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextActor {
    /// The approver configured for the current actor.
    ConfiguredApprover,
    /// The facilitator designee for the module.
    Facilitator,
    /// The checker configured for the submitter.
    RequestChecker,
    /// The user who submitted the request.
    Submitter,
}

/// Everything that happens when a stage's holder approves.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceRule {
    /// Stage of the step to append. `None` ends the chain.
    pub next_stage: Option<Stage>,
    /// Who holds the appended step.
    pub next_actor: Option<NextActor>,
    /// New request status, when the transition changes it.
    pub request_status: Option<RequestStatus>,
}

/// What a rejection at a stage does to the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectRule {
    /// Hard stop: the request is terminally rejected.
    Terminal,
    /// Send back: reopen the execution step and resume routing.
    SendBack,
}

impl Stage {
    /// Persisted sequence position.
    pub fn sequence(self) -> i64 {
        self as i64
    }

    /// Stage for a persisted sequence position.
    pub fn from_sequence(seq: i64) -> Option<Stage> {
        match seq {
            0 => Some(Stage::Submission),
            1 => Some(Stage::FirstApproval),
            2 => Some(Stage::SecondApproval),
            3 => Some(Stage::ThirdApproval),
            4 => Some(Stage::FinalApproval),
            5 => Some(Stage::Assignment),
            6 => Some(Stage::Execution),
            7 => Some(Stage::Checking),
            8 => Some(Stage::Closure),
            _ => None,
        }
    }

    /// Rule applied by the `advance` operation at this stage. `None`
    /// means the stage is not advanced through `advance`: submission is
    /// automatic, and assignment and execution have their own
    /// operations.
    pub fn advance_rule(self) -> Option<AdvanceRule> {
        match self {
            Stage::FirstApproval | Stage::SecondApproval | Stage::ThirdApproval => {
                Some(AdvanceRule {
                    next_stage: Stage::from_sequence(self.sequence() + 1),
                    next_actor: Some(NextActor::ConfiguredApprover),
                    request_status: None,
                })
            }
            Stage::FinalApproval => Some(AdvanceRule {
                next_stage: Some(Stage::Assignment),
                next_actor: Some(NextActor::Facilitator),
                request_status: None,
            }),
            Stage::Checking => Some(AdvanceRule {
                next_stage: Some(Stage::Closure),
                next_actor: Some(NextActor::Submitter),
                request_status: Some(RequestStatus::Checked),
            }),
            Stage::Closure => Some(AdvanceRule {
                next_stage: None,
                next_actor: None,
                request_status: Some(RequestStatus::Closed),
            }),
            Stage::Submission | Stage::Assignment | Stage::Execution => None,
        }
    }

    /// Rule applied by the `reject` operation at this stage. `None`
    /// means the stage cannot be rejected.
    pub fn reject_rule(self) -> Option<RejectRule> {
        match self {
            Stage::FirstApproval
            | Stage::SecondApproval
            | Stage::ThirdApproval
            | Stage::FinalApproval => Some(RejectRule::Terminal),
            Stage::Checking => Some(RejectRule::SendBack),
            Stage::Submission | Stage::Assignment | Stage::Execution | Stage::Closure => None,
        }
    }
}
