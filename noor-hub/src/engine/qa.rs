//! Q&A state engine
//!
//! Question lifecycle per session:
//!
//! ```text
//! Queued --vote--> Queued
//! Queued --answer--> Answered
//! Queued | Answered --delete--> Deleted
//! ```
//!
//! Vote, answer and delete on one question are serialized by a per-question
//! lock that is held until the resulting broadcast has been queued, so every
//! member sees those events in commit order. Vote tallies are always read
//! back from the vote rows inside the upsert transaction.

use noor_common::config::HubSettings;
use noor_common::groups::SessionId;
use noor_common::models::{ConnectionId, Question, QuestionId, QuestionStatus, Session, VotePolicy};
use noor_common::{time, GroupKind, HubEvent};
use std::sync::Arc;
use tracing::{debug, info};

use super::locks::KeyedLocks;
use super::retry_on_conflict;
use crate::auth::{Actor, Authorizer, Operation, Resource};
use crate::dispatcher::BroadcastDispatcher;
use crate::error::{HubError, Result};
use crate::store::Store;

pub struct QaEngine {
    store: Arc<dyn Store>,
    dispatcher: Arc<BroadcastDispatcher>,
    authorizer: Arc<dyn Authorizer>,
    locks: KeyedLocks<QuestionId>,
    max_chars: usize,
    vote_policy: VotePolicy,
    retry_limit: u32,
}

impl QaEngine {
    pub fn new(
        store: Arc<dyn Store>,
        dispatcher: Arc<BroadcastDispatcher>,
        authorizer: Arc<dyn Authorizer>,
        settings: &HubSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            authorizer,
            locks: KeyedLocks::new(),
            max_chars: settings.question_max_chars,
            vote_policy: settings.vote_policy,
            retry_limit: settings.vote_retry_limit,
        }
    }

    /// Queue a new question
    ///
    /// Broadcasts `QuestionQueued` to the Q&A group, alerts the host group,
    /// then confirms to `caller` only.
    pub async fn submit(
        &self,
        caller: &ConnectionId,
        session_id: SessionId,
        author_id: &str,
        text: &str,
    ) -> Result<Question> {
        let text = text.trim();
        if text.is_empty() {
            return Err(HubError::Validation("Question text is required".into()));
        }
        let length = text.chars().count();
        if length > self.max_chars {
            return Err(HubError::Validation(format!(
                "Question is {} characters, maximum is {}",
                length, self.max_chars
            )));
        }
        if author_id.trim().is_empty() {
            return Err(HubError::Validation("Author id is required".into()));
        }

        let session = self.open_session(session_id).await?;
        let question = self
            .store
            .insert_question(session_id, author_id, text, time::now())
            .await?;

        info!(
            session_id,
            question_id = question.question_id,
            author_id,
            "Question queued"
        );

        self.dispatcher
            .send_to_group(
                &GroupKind::Qa(session_id),
                HubEvent::QuestionQueued { question: question.clone() },
                None,
            )
            .await;
        self.dispatcher
            .send_to_group(
                &GroupKind::Host(session.host_token),
                HubEvent::HostQuestionAlert { question: question.clone() },
                None,
            )
            .await;
        self.dispatcher
            .send_to_connection(
                caller,
                HubEvent::QuestionSubmitted {
                    success: true,
                    question_id: question.question_id,
                },
            )
            .await;

        Ok(question)
    }

    /// Record `voter_id`'s vote, replacing any earlier one, and return the tally
    pub async fn vote(
        &self,
        caller: &ConnectionId,
        question_id: QuestionId,
        voter_id: &str,
        value: i64,
    ) -> Result<i64> {
        if !self.vote_policy.allows(value) {
            return Err(HubError::Validation(format!(
                "Vote value {} not allowed, expected {}",
                value,
                self.vote_policy.describe()
            )));
        }
        if voter_id.trim().is_empty() {
            return Err(HubError::Validation("Voter id is required".into()));
        }

        let _guard = self.locks.lock(question_id).await;

        let question = self.live_question(question_id).await?;
        if question.status == QuestionStatus::Answered {
            return Err(HubError::Validation(format!(
                "Question {} has already been answered",
                question_id
            )));
        }
        self.open_session(question.session_id).await?;

        let store = &self.store;
        let at = time::now();
        let vote_count = retry_on_conflict(self.retry_limit, "vote", move || {
            store.upsert_vote(question_id, voter_id, value, at)
        })
        .await?;

        debug!(question_id, voter_id, value, vote_count, "Vote recorded");

        self.dispatcher
            .send_to_group(
                &GroupKind::Qa(question.session_id),
                HubEvent::QuestionVoteUpdated {
                    question_id,
                    session_id: question.session_id,
                    vote_count,
                    timestamp: at,
                },
                None,
            )
            .await;
        self.dispatcher
            .send_to_connection(
                caller,
                HubEvent::VoteSubmitted {
                    success: true,
                    question_id,
                    vote_count,
                },
            )
            .await;

        Ok(vote_count)
    }

    /// Mark a question answered
    ///
    /// Returns false (and broadcasts nothing) when it was already answered.
    pub async fn answer(&self, question_id: QuestionId) -> Result<bool> {
        let _guard = self.locks.lock(question_id).await;

        let question = self.live_question(question_id).await?;
        if question.status == QuestionStatus::Answered {
            debug!(question_id, "Question already answered");
            return Ok(false);
        }

        let store = &self.store;
        let at = time::now();
        let changed = retry_on_conflict(self.retry_limit, "answer", move || {
            store.mark_answered(question_id, at)
        })
        .await?;
        if !changed {
            return Ok(false);
        }

        info!(question_id, session_id = question.session_id, "Question answered");
        self.dispatcher
            .send_to_group(
                &GroupKind::Qa(question.session_id),
                HubEvent::QuestionAnswered {
                    question_id,
                    session_id: question.session_id,
                    answered_at: at,
                },
                None,
            )
            .await;

        Ok(true)
    }

    /// Remove a question on behalf of its author or the host
    ///
    /// Returns false when it was already deleted.
    pub async fn delete(&self, question_id: QuestionId, actor: &Actor) -> Result<bool> {
        let _guard = self.locks.lock(question_id).await;

        let question = self
            .store
            .get_question(question_id)
            .await?
            .ok_or_else(|| question_not_found(question_id))?;
        if question.status == QuestionStatus::Deleted {
            debug!(question_id, "Question already deleted");
            return Ok(false);
        }

        let verdict = self
            .authorizer
            .authorize(actor, Resource::Question(question_id), Operation::DeleteQuestion)
            .await?;
        if !verdict.is_allowed() {
            return Err(HubError::Unauthorized(format!(
                "Only the author or the host may delete question {}",
                question_id
            )));
        }

        let store = &self.store;
        let removed = retry_on_conflict(self.retry_limit, "delete question", move || {
            store.delete_question(question_id)
        })
        .await?;
        if !removed {
            return Ok(false);
        }

        info!(question_id, session_id = question.session_id, deleted_by = %actor.id, "Question deleted");
        self.dispatcher
            .send_to_group(
                &GroupKind::Qa(question.session_id),
                HubEvent::QuestionDeleted {
                    question_id,
                    session_id: question.session_id,
                    deleted_by: actor.id.clone(),
                    timestamp: time::now(),
                },
                None,
            )
            .await;

        Ok(true)
    }

    /// Send the current queue to `caller` only
    pub async fn load_questions(&self, caller: &ConnectionId, session_id: SessionId) -> Result<Vec<Question>> {
        self.session(session_id).await?;
        let questions = self.store.list_questions(session_id).await?;

        self.dispatcher
            .send_to_connection(
                caller,
                HubEvent::LoadQuestions {
                    session_id,
                    questions: questions.clone(),
                },
            )
            .await;

        Ok(questions)
    }

    async fn session(&self, session_id: SessionId) -> Result<Session> {
        self.store
            .get_session(session_id)
            .await?
            .ok_or_else(|| HubError::NotFound(format!("Session {} not found", session_id)))
    }

    async fn open_session(&self, session_id: SessionId) -> Result<Session> {
        let session = self.session(session_id).await?;
        if !session.is_open() {
            return Err(HubError::Validation(format!(
                "Session {} is {}",
                session_id,
                session.effective_status().as_str()
            )));
        }
        Ok(session)
    }

    async fn live_question(&self, question_id: QuestionId) -> Result<Question> {
        self.store
            .get_question(question_id)
            .await?
            .filter(|q| q.status != QuestionStatus::Deleted)
            .ok_or_else(|| question_not_found(question_id))
    }
}

fn question_not_found(question_id: QuestionId) -> HubError {
    HubError::NotFound(format!("Question {} not found", question_id))
}
