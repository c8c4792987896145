//! The routing workflow engine.
//!
//! Every operation validates authorization and request status first,
//! then performs all of its writes inside one IMMEDIATE transaction, so
//! a request can never be left between states. Notifications are
//! collected during the transaction and dispatched after commit.

use std::sync::Arc;

use chrono::NaiveDate;
use log::info;
use rusqlite::Transaction;
use serde::Serialize;
use thiserror::Error;

use crate::db::request_repo::{self, RequestRow};
use crate::db::retry::Retryable;
use crate::db::routing_repo::{self, RoutingStepRow};
use crate::db::user_repo::{
    self, UserRow, MODULE_JOB_ORDER, ROLE_APPROVER, ROLE_CHECKER, ROLE_FACILITATOR,
    ROLE_MAINTENANCE,
};
use crate::db::{self, Database, DatabaseError, RetryPolicy};
use crate::notify::NotificationSink;

use super::stage::{NextActor, RejectRule, Stage};
use super::status::{Category, RequestStatus, StepStatus};

/// Title used for every workflow notification.
const NOTIFY_TITLE: &str = "Approval";

/// Orange-category natures that must carry a complaint description.
const COMPLAINT_NATURES: &[&str] = &["countermeasure-cri", "countermeasure-ecc", "safety"];

/// Errors from workflow operations. Preconditions fail closed: by the
/// time any of these is raised, either nothing has been written or the
/// transaction has been rolled back.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Job request {request_id} not found")]
    NotFound { request_id: i64 },

    #[error("User {user_id} does not exist")]
    UnknownUser { user_id: i64 },

    #[error("User {actor_id} does not hold the current step of request {request_id}")]
    NotAuthorized { request_id: i64, actor_id: i64 },

    #[error("Request is already {status} and can no longer be processed")]
    AlreadyProcessed { status: RequestStatus },

    #[error("Request in status {status} can no longer be cancelled")]
    NotCancellable { status: RequestStatus },

    #[error("A rejection reason is required")]
    MissingReason,

    #[error("Stage {stage:?} does not support this operation")]
    UnsupportedTransition { stage: Stage },

    #[error("Request {request_id} has no completed execution step to reopen")]
    NothingToReopen { request_id: i64 },

    #[error("Required field '{field}' is missing")]
    MissingField { field: &'static str },

    #[error("Orange requests of this nature require a complaint")]
    MissingComplaint,

    #[error("Invalid target date '{value}': expected YYYY-MM-DD")]
    InvalidTargetDate { value: String },

    #[error("No approver configured for user {user_id}")]
    NoConfiguredApprover { user_id: i64 },

    #[error("No checker configured for user {user_id}")]
    NoConfiguredChecker { user_id: i64 },

    #[error("No facilitator designated")]
    NoFacilitator,

    #[error("User {user_id} is not a maintenance designee")]
    NotMaintenance { user_id: i64 },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl Retryable for WorkflowError {
    fn is_busy(&self) -> bool {
        matches!(self, WorkflowError::Database(e) if e.is_busy())
    }

    fn exhausted(retries: u32) -> Self {
        WorkflowError::Database(DatabaseError::exhausted(retries))
    }
}

/// Input for submitting a new job request.
#[derive(Debug, Clone)]
pub struct NewRequest {
    pub category: Category,
    pub tool: String,
    pub nature: String,
    /// Complaint description, folded into the nature text when present.
    pub complaint: Option<String>,
    pub details: String,
    pub line: String,
    /// Free-text name of the person the work is requested for.
    pub requested_for: String,
}

/// A request plus its full ordered routing history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetail {
    pub request: RequestRow,
    pub routing: Vec<RoutingStepRow>,
}

/// A notification queued during a transaction, sent after commit.
struct Message {
    sender_id: i64,
    recipient_id: i64,
    body: String,
}

/// The routing workflow engine. Cheap to construct; holds a cloneable
/// database handle and a shared notification sink.
pub struct WorkflowEngine {
    db: Database,
    notifier: Arc<dyn NotificationSink>,
    retry: RetryPolicy,
}

impl WorkflowEngine {
    pub fn new(db: Database, notifier: Arc<dyn NotificationSink>) -> Self {
        Self {
            db,
            notifier,
            retry: RetryPolicy::default(),
        }
    }

    /// Replaces the default retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Builds an engine from loaded configuration.
    pub fn from_config(config: &crate::config::Config, db: Database, notifier: Arc<dyn NotificationSink>) -> Self {
        Self::new(db, notifier).with_retry(config.retry.policy())
    }

    /// Submits a new job request: allocates its control number and
    /// creates the submission record plus the first approver's
    /// `Processing` step.
    pub fn submit(
        &self,
        requester_id: i64,
        input: &NewRequest,
    ) -> Result<RequestDetail, WorkflowError> {
        for (field, value) in [
            ("tool", &input.tool),
            ("nature", &input.nature),
            ("details", &input.details),
            ("line", &input.line),
            ("requested_for", &input.requested_for),
        ] {
            if value.trim().is_empty() {
                return Err(WorkflowError::MissingField { field });
            }
        }
        if input.category == Category::Orange
            && COMPLAINT_NATURES.contains(&input.nature.as_str())
            && input
                .complaint
                .as_deref()
                .map_or(true, |c| c.trim().is_empty())
        {
            return Err(WorkflowError::MissingComplaint);
        }

        let nature = match input.complaint.as_deref() {
            Some(complaint) if !complaint.trim().is_empty() => {
                format!("{}: {}", input.nature, complaint.trim())
            }
            _ => input.nature.clone(),
        };

        let now = db::now();
        let (detail, messages) = self.transact(|tx| {
            let requester = user_repo::find_by_id(tx, requester_id)?
                .ok_or(WorkflowError::UnknownUser { user_id: requester_id })?;
            let approver = user_repo::approver_for(tx, requester_id, MODULE_JOB_ORDER, ROLE_APPROVER)?
                .ok_or(WorkflowError::NoConfiguredApprover { user_id: requester_id })?;

            let control_number =
                request_repo::next_control_number(tx, input.category.as_str(), input.category.prefix())?;

            let row = RequestRow {
                id: 0,
                control_number: control_number.clone(),
                category: input.category.as_str().to_string(),
                tool: input.tool.clone(),
                nature: nature.clone(),
                details: input.details.clone(),
                line: input.line.clone(),
                requested_for: input.requested_for.clone(),
                requester_id,
                status: RequestStatus::Routing.as_str().to_string(),
                current_stage: Stage::FirstApproval.sequence(),
                assignee_id: None,
                action_taken: None,
                created_at: now.clone(),
                received_at: None,
                target_date: None,
                target_date_reason: None,
                completed_at: None,
            };
            let request_id = request_repo::insert(tx, &row)?;

            let submitted = routing_repo::insert(
                tx,
                request_id,
                requester_id,
                Stage::Submission.sequence(),
                StepStatus::Submitted.as_str(),
                &now,
            )?;
            let first = routing_repo::insert(
                tx,
                request_id,
                approver.id,
                Stage::FirstApproval.sequence(),
                StepStatus::Processing.as_str(),
                &now,
            )?;

            let messages = vec![Message {
                sender_id: requester_id,
                recipient_id: approver.id,
                body: format!(
                    "You have a job order request from {} awaiting your approval.",
                    requester.name
                ),
            }];

            let request = RequestRow { id: request_id, ..row };
            Ok((
                RequestDetail {
                    request,
                    routing: vec![submitted, first],
                },
                messages,
            ))
        })?;

        info!("Submitted job order {}", detail.request.control_number);
        self.dispatch(messages);
        Ok(detail)
    }

    /// Approves the current step and hands the request to the next role
    /// in the chain. Valid at the approval stages, at checking, and at
    /// closure (which ends the chain).
    pub fn advance(
        &self,
        request_id: i64,
        actor_id: i64,
        remarks: &str,
    ) -> Result<RoutingStepRow, WorkflowError> {
        let now = db::now();
        let (step, control_number, messages) = self.transact(|tx| {
            let request = require_request(tx, request_id)?;
            let status = require_open(&request)?;
            let step = require_holder(tx, request_id, actor_id)?;
            let stage = step_stage(&step)?;
            let rule = stage
                .advance_rule()
                .ok_or(WorkflowError::UnsupportedTransition { stage })?;

            // Closure needs the checker's sign-off on record.
            if stage == Stage::Closure && status != RequestStatus::Checked {
                return Err(WorkflowError::UnsupportedTransition { stage });
            }

            routing_repo::finish(tx, step.id, StepStatus::Approved.as_str(), remarks, &now)?;

            let mut messages = Vec::new();
            let result = match (rule.next_stage, rule.next_actor) {
                (Some(next_stage), Some(actor_rule)) => {
                    let next_user = resolve_actor(tx, actor_rule, &request, actor_id)?;
                    let created = routing_repo::insert(
                        tx,
                        request_id,
                        next_user.id,
                        next_stage.sequence(),
                        StepStatus::Processing.as_str(),
                        &now,
                    )?;
                    let new_status = rule.request_status.unwrap_or(status);
                    request_repo::update_status(
                        tx,
                        request_id,
                        new_status.as_str(),
                        next_stage.sequence(),
                    )?;
                    messages.push(Message {
                        sender_id: actor_id,
                        recipient_id: next_user.id,
                        body: format!(
                            "Job order {} is awaiting your action.",
                            request.control_number
                        ),
                    });
                    created
                }
                _ => {
                    // End of the chain: no step is appended.
                    let new_status = rule.request_status.unwrap_or(status);
                    request_repo::update_status(
                        tx,
                        request_id,
                        new_status.as_str(),
                        stage.sequence(),
                    )?;
                    let mut closed = step.clone();
                    closed.status = StepStatus::Approved.as_str().to_string();
                    closed.remarks = remarks.to_string();
                    closed.completed_at = Some(now.clone());
                    closed
                }
            };
            Ok((result, request.control_number, messages))
        })?;

        info!(
            "Job order {} advanced to stage {} by user {}",
            control_number, step.stage, actor_id
        );
        self.dispatch(messages);
        Ok(step)
    }

    /// Rejects the current step. At the approval stages this terminates
    /// the request; at checking it sends the work back to the execution
    /// owner instead.
    pub fn reject(
        &self,
        request_id: i64,
        actor_id: i64,
        remarks: &str,
    ) -> Result<RoutingStepRow, WorkflowError> {
        if remarks.trim().is_empty() {
            return Err(WorkflowError::MissingReason);
        }

        let now = db::now();
        let (step, control_number, messages) = self.transact(|tx| {
            let request = require_request(tx, request_id)?;
            require_open(&request)?;
            let step = require_holder(tx, request_id, actor_id)?;
            let stage = step_stage(&step)?;
            let rule = stage
                .reject_rule()
                .ok_or(WorkflowError::UnsupportedTransition { stage })?;
            let actor = user_repo::find_by_id(tx, actor_id)?
                .ok_or(WorkflowError::UnknownUser { user_id: actor_id })?;

            routing_repo::finish(tx, step.id, StepStatus::Rejected.as_str(), remarks, &now)?;

            let mut messages = Vec::new();
            let result = match rule {
                RejectRule::Terminal => {
                    request_repo::update_status(
                        tx,
                        request_id,
                        RequestStatus::Rejected.as_str(),
                        stage.sequence(),
                    )?;
                    messages.push(Message {
                        sender_id: actor_id,
                        recipient_id: request.requester_id,
                        body: format!(
                            "Your job order {} was declined by {}. Review the remarks for details.",
                            request.control_number, actor.name
                        ),
                    });
                    let mut rejected = step.clone();
                    rejected.status = StepStatus::Rejected.as_str().to_string();
                    rejected.remarks = remarks.to_string();
                    rejected.completed_at = Some(now.clone());
                    rejected
                }
                RejectRule::SendBack => {
                    let prior = routing_repo::find_by_stage(
                        tx,
                        request_id,
                        Stage::Execution.sequence(),
                        StepStatus::Approved.as_str(),
                    )?
                    .ok_or(WorkflowError::NothingToReopen { request_id })?;

                    routing_repo::reopen(tx, prior.id)?;
                    request_repo::clear_completion(tx, request_id)?;
                    request_repo::update_status(
                        tx,
                        request_id,
                        RequestStatus::Routing.as_str(),
                        Stage::Execution.sequence(),
                    )?;
                    messages.push(Message {
                        sender_id: actor_id,
                        recipient_id: prior.actor_id,
                        body: format!(
                            "Job order {} was rejected by {} upon checking. Review the remarks for further information.",
                            request.control_number, actor.name
                        ),
                    });
                    let mut reopened = prior.clone();
                    reopened.status = StepStatus::Processing.as_str().to_string();
                    reopened.completed_at = None;
                    reopened
                }
            };
            Ok((result, request.control_number, messages))
        })?;

        info!(
            "Job order {} rejected at stage {} by user {}",
            control_number, step.stage, actor_id
        );
        self.dispatch(messages);
        Ok(step)
    }

    /// Facilitator operation: names the execution owner and hands the
    /// request over to them.
    pub fn assign(
        &self,
        request_id: i64,
        facilitator_id: i64,
        assignee_id: i64,
    ) -> Result<RoutingStepRow, WorkflowError> {
        let now = db::now();
        let (step, control_number, messages) = self.transact(|tx| {
            let request = require_request(tx, request_id)?;
            require_open(&request)?;
            let step = require_holder(tx, request_id, facilitator_id)?;
            let stage = step_stage(&step)?;
            if stage != Stage::Assignment {
                return Err(WorkflowError::UnsupportedTransition { stage });
            }
            if !user_repo::is_designee(tx, MODULE_JOB_ORDER, ROLE_MAINTENANCE, assignee_id)? {
                return Err(WorkflowError::NotMaintenance { user_id: assignee_id });
            }

            request_repo::set_assignment(tx, request_id, assignee_id, &now)?;
            routing_repo::finish(tx, step.id, StepStatus::Approved.as_str(), "", &now)?;
            let created = routing_repo::insert(
                tx,
                request_id,
                assignee_id,
                Stage::Execution.sequence(),
                StepStatus::Processing.as_str(),
                &now,
            )?;
            request_repo::update_status(
                tx,
                request_id,
                RequestStatus::Routing.as_str(),
                Stage::Execution.sequence(),
            )?;

            let messages = vec![Message {
                sender_id: facilitator_id,
                recipient_id: assignee_id,
                body: format!("Job order {} has been assigned to you.", request.control_number),
            }];
            Ok((created, request.control_number, messages))
        })?;

        info!(
            "Job order {} assigned to user {} by facilitator {}",
            control_number, assignee_id, facilitator_id
        );
        self.dispatch(messages);
        Ok(step)
    }

    /// Execution-owner operation: records the work done and hands the
    /// request to the checker. After a send-back, the checker's earlier
    /// step is reopened instead of a new one being appended.
    pub fn complete(
        &self,
        request_id: i64,
        actor_id: i64,
        action_taken: &str,
        remarks: &str,
    ) -> Result<RoutingStepRow, WorkflowError> {
        if action_taken.trim().is_empty() {
            return Err(WorkflowError::MissingField {
                field: "action_taken",
            });
        }

        let now = db::now();
        let (step, control_number, messages) = self.transact(|tx| {
            let request = require_request(tx, request_id)?;
            require_open(&request)?;
            let step = require_holder(tx, request_id, actor_id)?;
            let stage = step_stage(&step)?;
            if stage != Stage::Execution {
                return Err(WorkflowError::UnsupportedTransition { stage });
            }
            let checker =
                user_repo::approver_for(tx, request.requester_id, MODULE_JOB_ORDER, ROLE_CHECKER)?
                    .ok_or(WorkflowError::NoConfiguredChecker {
                        user_id: request.requester_id,
                    })?;

            request_repo::set_completion(tx, request_id, action_taken, &now)?;
            request_repo::update_status(
                tx,
                request_id,
                RequestStatus::Completed.as_str(),
                Stage::Checking.sequence(),
            )?;
            routing_repo::finish(tx, step.id, StepStatus::Approved.as_str(), remarks, &now)?;

            let checker_step = match routing_repo::find_by_stage(
                tx,
                request_id,
                Stage::Checking.sequence(),
                StepStatus::Rejected.as_str(),
            )? {
                Some(prior) => {
                    // Rework round: give the step back to the same checker.
                    routing_repo::reopen(tx, prior.id)?;
                    let mut reopened = prior.clone();
                    reopened.status = StepStatus::Processing.as_str().to_string();
                    reopened.completed_at = None;
                    reopened
                }
                None => routing_repo::insert(
                    tx,
                    request_id,
                    checker.id,
                    Stage::Checking.sequence(),
                    StepStatus::Processing.as_str(),
                    &now,
                )?,
            };

            let messages = vec![Message {
                sender_id: actor_id,
                recipient_id: checker_step.actor_id,
                body: format!("Job order {} is ready for checking.", request.control_number),
            }];
            Ok((checker_step, request.control_number, messages))
        })?;

        info!(
            "Job order {} completed by user {}, pending check",
            control_number, actor_id
        );
        self.dispatch(messages);
        Ok(step)
    }

    /// Cancels a request that is still routing. Only the submitter may
    /// cancel. Open steps are marked `Cancelled`; history is kept.
    pub fn cancel(&self, request_id: i64, actor_id: i64) -> Result<(), WorkflowError> {
        let now = db::now();
        let control_number = self.transact(|tx| {
            let request = require_request(tx, request_id)?;
            if request.requester_id != actor_id {
                return Err(WorkflowError::NotAuthorized {
                    request_id,
                    actor_id,
                });
            }
            let status = require_open(&request)?;
            if status != RequestStatus::Routing {
                return Err(WorkflowError::NotCancellable { status });
            }

            request_repo::update_status(
                tx,
                request_id,
                RequestStatus::Cancelled.as_str(),
                request.current_stage,
            )?;
            routing_repo::cancel_open_steps(tx, request_id, &now)?;
            Ok(request.control_number)
        })?;

        info!("Job order {} cancelled by user {}", control_number, actor_id);
        Ok(())
    }

    /// Execution-owner operation: sets the target completion date and
    /// its justification.
    pub fn set_target_date(
        &self,
        request_id: i64,
        actor_id: i64,
        target_date: &str,
        reason: &str,
    ) -> Result<(), WorkflowError> {
        let date = NaiveDate::parse_from_str(target_date, "%Y-%m-%d").map_err(|_| {
            WorkflowError::InvalidTargetDate {
                value: target_date.to_string(),
            }
        })?;

        self.transact(|tx| {
            let request = require_request(tx, request_id)?;
            require_open(&request)?;
            if request.assignee_id != Some(actor_id) {
                return Err(WorkflowError::NotAuthorized {
                    request_id,
                    actor_id,
                });
            }
            request_repo::set_target(tx, request_id, &date.to_string(), reason)?;
            Ok(())
        })
    }

    /// The request plus its full ordered routing history.
    pub fn detail(&self, request_id: i64) -> Result<RequestDetail, WorkflowError> {
        let found = self.db.with_conn(|conn| {
            let Some(request) = request_repo::find_by_id(conn, request_id)? else {
                return Ok(None);
            };
            let routing = routing_repo::history(conn, request_id)?;
            Ok(Some(RequestDetail { request, routing }))
        })?;
        found.ok_or(WorkflowError::NotFound { request_id })
    }

    /// Runs `f` in one IMMEDIATE transaction with the retry policy
    /// applied around the whole attempt.
    fn transact<T>(
        &self,
        mut f: impl FnMut(&Transaction<'_>) -> Result<T, WorkflowError>,
    ) -> Result<T, WorkflowError> {
        self.retry.run(|| self.db.with_tx(&mut f))
    }

    fn dispatch(&self, messages: Vec<Message>) {
        for message in messages {
            self.notifier
                .notify(message.sender_id, message.recipient_id, NOTIFY_TITLE, &message.body);
        }
    }
}

fn require_request(tx: &Transaction<'_>, request_id: i64) -> Result<RequestRow, WorkflowError> {
    request_repo::find_by_id(tx, request_id)?.ok_or(WorkflowError::NotFound { request_id })
}

/// Parses the stored status and refuses terminal requests.
fn require_open(request: &RequestRow) -> Result<RequestStatus, WorkflowError> {
    let status = RequestStatus::parse(&request.status).ok_or_else(|| {
        WorkflowError::Database(DatabaseError::UnexpectedValue {
            column: "requests.status",
            value: request.status.clone(),
        })
    })?;
    if status.is_terminal() {
        return Err(WorkflowError::AlreadyProcessed { status });
    }
    Ok(status)
}

/// The actor's `Processing` step, or the authorization failure.
fn require_holder(
    tx: &Transaction<'_>,
    request_id: i64,
    actor_id: i64,
) -> Result<RoutingStepRow, WorkflowError> {
    routing_repo::holder_step(tx, request_id, actor_id)?.ok_or(WorkflowError::NotAuthorized {
        request_id,
        actor_id,
    })
}

fn step_stage(step: &RoutingStepRow) -> Result<Stage, WorkflowError> {
    Stage::from_sequence(step.stage).ok_or_else(|| {
        WorkflowError::Database(DatabaseError::UnexpectedValue {
            column: "routing_steps.stage",
            value: step.stage.to_string(),
        })
    })
}

/// Resolves the user who holds the next step.
fn resolve_actor(
    tx: &Transaction<'_>,
    rule: NextActor,
    request: &RequestRow,
    actor_id: i64,
) -> Result<UserRow, WorkflowError> {
    match rule {
        NextActor::ConfiguredApprover => {
            user_repo::approver_for(tx, actor_id, MODULE_JOB_ORDER, ROLE_APPROVER)?
                .ok_or(WorkflowError::NoConfiguredApprover { user_id: actor_id })
        }
        NextActor::Facilitator => {
            user_repo::first_designee(tx, MODULE_JOB_ORDER, ROLE_FACILITATOR)?
                .ok_or(WorkflowError::NoFacilitator)
        }
        NextActor::RequestChecker => {
            user_repo::approver_for(tx, request.requester_id, MODULE_JOB_ORDER, ROLE_CHECKER)?
                .ok_or(WorkflowError::NoConfiguredChecker {
                    user_id: request.requester_id,
                })
        }
        NextActor::Submitter => user_repo::find_by_id(tx, request.requester_id)?
            .ok_or(WorkflowError::UnknownUser {
                user_id: request.requester_id,
            }),
    }
}
