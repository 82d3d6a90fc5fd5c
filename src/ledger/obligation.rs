use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::recurrence::{RecurrenceRule, RuleSpec};
use super::time_interval::Frequency;
use super::transaction::TransactionDraft;
use crate::core::collaborators::TransactionSink;
use crate::core::errors::{ObligationError, Result};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ObligationKind {
    Expense,
    Income,
    Budget,
}

impl ObligationKind {
    /// Sign applied to the stored magnitude when the obligation is materialized.
    pub fn sign(self) -> f64 {
        match self {
            ObligationKind::Income => 1.0,
            ObligationKind::Expense | ObligationKind::Budget => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum ObligationStatus {
    #[default]
    Active,
    Paused,
    Completed,
}

/// Request shape for creating an obligation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObligationDraft {
    pub owner_id: Uuid,
    pub kind: ObligationKind,
    pub title: String,
    pub amount: f64,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    pub rule: RuleSpec,
}

/// Partial edit of an obligation's rule. `end_date: Some(None)` clears the end date.
#[derive(Debug, Clone, Default)]
pub struct RuleChanges {
    pub frequency: Option<Frequency>,
    pub interval: Option<u32>,
    pub end_date: Option<Option<NaiveDate>>,
}

/// Result of a single materialization attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum MaterializeOutcome {
    NotDue,
    Materialized {
        transaction_id: Uuid,
        trigger_date: NaiveDate,
        next_trigger_date: NaiveDate,
        completed: bool,
    },
}

/// A recurring expense, income or budget template bound to one [`RecurrenceRule`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecurringObligation {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: ObligationKind,
    title: String,
    amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    category_id: Option<Uuid>,
    rule: RecurrenceRule,
    #[serde(default)]
    status: ObligationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringObligation {
    pub fn new(
        owner_id: Uuid,
        kind: ObligationKind,
        title: impl Into<String>,
        amount: f64,
        rule: RecurrenceRule,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let title = title.into();
        validate_title(&title)?;
        validate_amount(amount)?;
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id,
            kind,
            title,
            amount,
            notes: None,
            category_id: None,
            rule,
            status: ObligationStatus::Active,
            created_at: now,
            updated_at: now,
        })
    }

    /// Builds an obligation from an API request.
    pub fn from_draft(draft: ObligationDraft, now: DateTime<Utc>) -> Result<Self> {
        let rule = RecurrenceRule::from_spec(&draft.rule)?;
        let mut obligation = Self::new(
            draft.owner_id,
            draft.kind,
            draft.title,
            draft.amount,
            rule,
            now,
        )?;
        obligation.notes = normalize_notes(draft.notes);
        obligation.set_category(draft.category_id)?;
        Ok(obligation)
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = normalize_notes(Some(notes.into()));
        self
    }

    pub fn with_category(mut self, category_id: Uuid) -> Result<Self> {
        self.set_category(Some(category_id))?;
        Ok(self)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Amount carrying the sign implied by the obligation kind.
    pub fn signed_amount(&self) -> f64 {
        self.kind.sign() * self.amount
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn category_id(&self) -> Option<Uuid> {
        self.category_id
    }

    pub fn rule(&self) -> &RecurrenceRule {
        &self.rule
    }

    pub fn status(&self) -> ObligationStatus {
        self.status
    }

    pub fn next_trigger_date(&self) -> NaiveDate {
        self.rule.next_trigger_date()
    }

    pub fn is_active(&self) -> bool {
        self.status == ObligationStatus::Active
    }

    pub fn is_due(&self, now: NaiveDate) -> bool {
        self.is_active() && self.rule.should_trigger(now) && !self.rule.should_end()
    }

    pub fn draft_for(&self, now: NaiveDate) -> TransactionDraft {
        TransactionDraft {
            obligation_id: self.id,
            owner_id: self.owner_id,
            kind: self.kind,
            title: self.title.clone(),
            amount: self.signed_amount(),
            date: now,
            notes: self.notes.clone(),
            category_id: self.category_id,
            trigger_date: self.rule.next_trigger_date(),
        }
    }

    /// Creates the concrete transaction for a due obligation and advances its rule.
    ///
    /// A sink failure leaves the rule where it was so the next pass retries the same
    /// trigger date.
    pub fn materialize(
        &mut self,
        now: NaiveDate,
        sink: &dyn TransactionSink,
    ) -> Result<MaterializeOutcome> {
        if !self.is_due(now) {
            return Ok(MaterializeOutcome::NotDue);
        }
        let draft = self.draft_for(now);
        let advanced = self.rule.advanced(now)?;
        let transaction_id =
            sink.create_transaction(&draft)
                .map_err(|err| ObligationError::Sink {
                    obligation_id: self.id,
                    message: err.to_string(),
                })?;

        self.rule = advanced;
        let next_trigger_date = self.rule.next_trigger_date();
        let completed = self.rule.should_end();
        if completed {
            self.status = ObligationStatus::Completed;
        }
        self.updated_at = Utc::now();
        debug!(
            obligation = %self.id,
            transaction = %transaction_id,
            trigger = %draft.trigger_date,
            next = %next_trigger_date,
            completed,
            "materialized obligation"
        );
        Ok(MaterializeOutcome::Materialized {
            transaction_id,
            trigger_date: draft.trigger_date,
            next_trigger_date,
            completed,
        })
    }

    /// Edits the descriptive fields. The rule is never touched here.
    pub fn update_details(
        &mut self,
        title: Option<String>,
        amount: Option<f64>,
        notes: Option<Option<String>>,
    ) -> Result<()> {
        if let Some(title) = title.as_deref() {
            validate_title(title)?;
        }
        if let Some(amount) = amount {
            validate_amount(amount)?;
        }
        if let Some(title) = title {
            self.title = title;
        }
        if let Some(amount) = amount {
            self.amount = amount;
        }
        if let Some(notes) = notes {
            self.notes = normalize_notes(notes);
        }
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_category(&mut self, category_id: Option<Uuid>) -> Result<()> {
        if category_id.is_some() && self.kind == ObligationKind::Income {
            return Err(ObligationError::Validation(
                "income obligations cannot reference a spending category".into(),
            ));
        }
        self.category_id = category_id;
        Ok(())
    }

    /// Applies a cadence or end-date edit, then revalidates the stored trigger date against
    /// `today`. Returns whether the trigger date moved.
    pub fn update_rule(&mut self, changes: RuleChanges, today: NaiveDate) -> Result<bool> {
        let mut rule = self.rule.clone();
        if changes.frequency.is_some() || changes.interval.is_some() {
            let frequency = changes.frequency.unwrap_or(rule.frequency());
            let interval = changes.interval.unwrap_or(rule.interval());
            rule.set_cadence(frequency, interval)?;
        }
        if let Some(end_date) = changes.end_date {
            rule.set_end_date(end_date)?;
        }
        let moved = rule.revalidate(today)?;
        self.rule = rule;
        if self.status == ObligationStatus::Active && self.rule.should_end() {
            self.status = ObligationStatus::Completed;
        }
        self.updated_at = Utc::now();
        Ok(moved)
    }

    pub fn pause(&mut self) -> Result<()> {
        match self.status {
            ObligationStatus::Active => {
                self.status = ObligationStatus::Paused;
                self.updated_at = Utc::now();
                Ok(())
            }
            ObligationStatus::Paused => Ok(()),
            ObligationStatus::Completed => Err(ObligationError::Validation(
                "completed obligations cannot be paused".into(),
            )),
        }
    }

    /// Resumes a paused obligation. Periods that elapsed while paused collapse into one
    /// catch-up on the next pass.
    pub fn resume(&mut self, today: NaiveDate) -> Result<()> {
        match self.status {
            ObligationStatus::Paused => self.reactivate(today),
            ObligationStatus::Active => Ok(()),
            ObligationStatus::Completed => Err(ObligationError::Validation(
                "completed obligations must be reactivated, not resumed".into(),
            )),
        }
    }

    /// Returns a paused or completed obligation to `Active`, provided its rule can still
    /// produce triggers.
    pub fn reactivate(&mut self, today: NaiveDate) -> Result<()> {
        let mut rule = self.rule.clone();
        rule.revalidate(today)?;
        self.rule = rule;
        if self.rule.should_end() {
            return Err(ObligationError::Validation(format!(
                "obligation {} has reached its end date {}",
                self.id,
                self.rule
                    .end_date()
                    .map(|date| date.to_string())
                    .unwrap_or_default()
            )));
        }
        self.status = ObligationStatus::Active;
        self.updated_at = Utc::now();
        Ok(())
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(ObligationError::Validation("title must not be blank".into()));
    }
    Ok(())
}

fn validate_amount(amount: f64) -> Result<()> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(ObligationError::Validation(format!(
            "amount must be a positive number, got {amount}"
        )));
    }
    Ok(())
}

fn normalize_notes(notes: Option<String>) -> Option<String> {
    notes
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
